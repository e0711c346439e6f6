#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_core::{
    build_stream, decode_message_buffer, linearize_ring, words_from_le_bytes, Cursor,
    DiagnosticCounters, Device, Limit, NoRegisterNames, Provenance, RecordingPresenter, RingDump,
    RingWindow, SparseMemory, StreamKind,
};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let kind = StreamKind::ALL[usize::from(data[0]) % StreamKind::ALL.len()];
    let words = words_from_le_bytes(&data[4..]);

    // The input doubles as VM memory so references resolve to fuzzed words.
    let mut memory = SparseMemory::new();
    memory.map_any(0, data[4..].to_vec());
    let mut diagnostics = DiagnosticCounters::new();
    let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
    let origin = Provenance {
        vmid: u32::from(data[1] & 0xF),
        address: 0,
        partition: 0,
    };
    if let Ok(stream) = build_stream(kind, &words, origin, &mut device) {
        let mut presenter = RecordingPresenter::new();
        let cursor = stream.decode(Cursor::Start, Limit::All, data[2] & 1 == 1, &mut device, &mut presenter);
        assert_eq!(cursor, Cursor::End);
    }

    let _ = decode_message_buffer(&data[4..], &mut DiagnosticCounters::new());

    let dump = RingDump {
        words,
        base_address: 0,
        vmid: 0,
    };
    let _ = linearize_ring(&dump, RingWindow::Live);
});
