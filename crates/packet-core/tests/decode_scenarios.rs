//! End-to-end decoding: register fields, video messages, listings and rings.

use std::collections::HashMap;

use packet_core::encoding::{pm4, sdma};
use packet_core::{
    listing_rows, render_listing, Cursor, DecoderError, Device, DiagnosticCounters,
    DiagnosticKind, Limit, NoRegisterNames, PacketDecoder, PresentEvent, Provenance,
    RecordingPresenter, RegisterTable, RingDump, RingReadError, RingSource, RingWindow,
    SparseMemory, StreamKind, words_from_le_bytes,
};
use proptest as _;
use rstest::rstest;
use thiserror as _;
use tracing as _;

#[cfg(feature = "serde")]
use serde as _;

fn at(vmid: u32, address: u64) -> Provenance {
    Provenance {
        vmid,
        address,
        partition: 0,
    }
}

fn decode_all(
    kind: StreamKind,
    words: &[u32],
    memory: &mut SparseMemory,
    registers: &RegisterTable,
    diagnostics: &mut DiagnosticCounters,
) -> RecordingPresenter {
    let device = Device::new(memory, registers, diagnostics);
    let mut decoder =
        PacketDecoder::from_words(kind, words, at(1, 0x1000), device, RecordingPresenter::new())
            .expect("built");
    assert_eq!(decoder.decode(Limit::All, true), Cursor::End);
    decoder.into_presenter()
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(8)]
fn set_register_packets_name_consecutive_registers(#[case] count: u32) {
    let mut registers = RegisterTable::new();
    registers.insert(0xC040, "mmGRBM_GFX_INDEX");
    registers.insert(0xC041, "mmVGT_PRIMITIVE_TYPE");
    let mut words = vec![pm4::type3(0x79, count + 1), 0x40];
    words.extend(0..count);

    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let out = decode_all(StreamKind::Pm4, &words, &mut memory, &registers, &mut diagnostics);

    let fields: Vec<_> = out.fields().collect();
    assert_eq!(fields.len(), count as usize);
    for (i, field) in fields.iter().enumerate() {
        assert_eq!(field.address, 0x1000 + 4 * (2 + i as u64));
        assert_eq!(field.value, i as u64);
    }
    assert_eq!(fields[0].name, "mmGRBM_GFX_INDEX");
    if count > 2 {
        assert_eq!(fields[2].name, "0x0c042");
    }
}

fn message_buffer(id: u32, body: &[u8]) -> Vec<u8> {
    let offset = 24 + 16;
    let total = offset + body.len();
    let mut bytes = Vec::new();
    for word in [offset, total, 1, 0, 0x77, 3] {
        bytes.extend((word as u32).to_le_bytes());
    }
    for word in [id, offset as u32, body.len() as u32, 1] {
        bytes.extend(word.to_le_bytes());
    }
    bytes.extend_from_slice(body);
    bytes
}

fn gpcom_registers() -> RegisterTable {
    let mut registers = RegisterTable::new();
    registers.insert(0x3C10, "mmUVD_GPCOM_VCPU_DATA0");
    registers.insert(0x3C11, "mmUVD_GPCOM_VCPU_DATA1");
    registers.insert(0x3C12, "mmUVD_GPCOM_VCPU_CMD");
    registers
}

#[test]
fn av1_message_is_decoded_from_the_gpcom_mailbox() {
    let mut body = vec![0u8; 1372];
    body[84..88].copy_from_slice(&3u32.to_le_bytes());
    let bytes = message_buffer(0x13, &body);
    let mut memory = SparseMemory::new();
    memory.map(1, 0x2_0000, bytes.clone());

    let words = [pm4::type0(0x3C10, 3), 0x2_0000, 0, 0];
    let mut diagnostics = DiagnosticCounters::new();
    let out = decode_all(
        StreamKind::Pm4Lite,
        &words,
        &mut memory,
        &gpcom_registers(),
        &mut diagnostics,
    );

    assert!(diagnostics.is_empty(), "{:?}", diagnostics.records);
    let blocks: Vec<_> = out
        .events
        .iter()
        .filter_map(|event| match event {
            PresentEvent::DataBlock(block) => Some(block),
            _ => None,
        })
        .collect();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].bytes, bytes);
    let tiles = out
        .fields()
        .filter(|field| field.name.starts_with("av1.tile_offset["))
        .count();
    assert_eq!(tiles, 256);
    assert_eq!(out.field("av1.tile_count").map(|f| f.value), Some(3));
    assert_eq!(out.field("index[0].message_id").map(|f| f.value), Some(0x13));

    let last_field = out
        .events
        .iter()
        .rposition(|event| matches!(event, PresentEvent::Field(_)))
        .expect("fields");
    let block_event = out
        .events
        .iter()
        .position(|event| matches!(event, PresentEvent::DataBlock(_)))
        .expect("data block");
    assert!(last_field < block_event);

    let rows = listing_rows(&out);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].notes, vec![format!("data block vmid 1 @0x20000 {} bytes", bytes.len())]);
}

#[test]
fn gpcom_command_other_than_message_is_ignored() {
    let mut memory = SparseMemory::new();
    memory.map(1, 0x2_0000, message_buffer(0x01, &[0; 16]));
    let words = [pm4::type0(0x3C10, 3), 0x2_0000, 0, 4];
    let mut diagnostics = DiagnosticCounters::new();
    let out = decode_all(
        StreamKind::Pm4Lite,
        &words,
        &mut memory,
        &gpcom_registers(),
        &mut diagnostics,
    );
    assert_eq!(memory.reads(), 0);
    assert!(out.field("create.stream_type").is_none());
}

#[test]
fn truncated_video_message_is_dumped_as_raw_words() {
    let mut bytes = message_buffer(0x01, &[0x11; 16]);
    // Declare the create message one word longer than its layout.
    bytes[32..36].copy_from_slice(&20u32.to_le_bytes());
    bytes.extend([0x22; 4]);
    let len = bytes.len() as u32;
    bytes[4..8].copy_from_slice(&len.to_le_bytes());
    let mut memory = SparseMemory::new();
    memory.map(1, 0x2_0000, bytes);
    let words = [pm4::type0(0x3C10, 3), 0x2_0000, 0, 0];
    let mut diagnostics = DiagnosticCounters::new();
    let out = decode_all(
        StreamKind::Pm4Lite,
        &words,
        &mut memory,
        &gpcom_registers(),
        &mut diagnostics,
    );
    assert_eq!(diagnostics.count(DiagnosticKind::MessageSizeMismatch), 1);
    assert_eq!(out.field("create.raw[4]").map(|f| f.value), Some(0x2222_2222));
}

#[test]
fn nested_buffers_are_listed_indented_under_their_packet() {
    let mut memory = SparseMemory::new();
    memory.map_words(5, 0x3000, &[pm4::type3(0x10, 1), 0]);
    let words = [
        pm4::type3(pm4::OP_INDIRECT_BUFFER, 3),
        0x3000,
        0,
        (5 << 24) | 2,
        pm4::TYPE2,
    ];
    let mut diagnostics = DiagnosticCounters::new();
    let out = decode_all(
        StreamKind::Pm4,
        &words,
        &mut memory,
        &RegisterTable::new(),
        &mut diagnostics,
    );

    let rows = listing_rows(&out);
    let shape: Vec<_> = rows.iter().map(|row| (row.depth, row.name.as_str())).collect();
    assert_eq!(
        shape,
        vec![(0, "INDIRECT_BUFFER"), (1, "NOP"), (0, "TYPE2")]
    );
    assert_eq!(rows[1].vmid, 5);
    assert_eq!(rows[1].address, 0x3000);
    let text = render_listing(&rows);
    assert!(text.contains("\n  5:000000003000 [c0001000 00000000] NOP\n"), "{text}");
}

#[test]
fn unfollowed_decode_lists_only_the_top_level() {
    let mut memory = SparseMemory::new();
    memory.map_words(1, 0x3000, &[pm4::TYPE2]);
    let words = [pm4::type3(pm4::OP_INDIRECT_BUFFER, 3), 0x3000, 0, 1];
    let mut diagnostics = DiagnosticCounters::new();
    let registers = RegisterTable::new();
    let device = Device::new(&mut memory, &registers, &mut diagnostics);
    let mut decoder = PacketDecoder::from_words(
        StreamKind::Pm4,
        &words,
        at(1, 0),
        device,
        RecordingPresenter::new(),
    )
    .expect("built");
    decoder.decode(Limit::All, false);
    assert_eq!(decoder.stream().map(|s| s.stream_count()), Some(2));
    assert_eq!(decoder.presenter().packets().count(), 1);
}

#[derive(Default)]
struct Rings {
    dumps: HashMap<String, RingDump>,
}

impl RingSource for Rings {
    fn read_ring(&mut self, name: &str) -> Result<RingDump, RingReadError> {
        self.dumps
            .get(name)
            .cloned()
            .ok_or_else(|| RingReadError::UnknownRing(name.to_string()))
    }
}

fn trap(tag: u32) -> [u32; 2] {
    [sdma::header(sdma::SDMA_OP_TRAP, 0, 0), tag]
}

fn wrapped_dma_ring() -> Rings {
    let mut words = vec![4, 2, 0];
    words.extend(trap(2));
    words.extend([0xDEAD_BEEF, 0xDEAD_BEEF]);
    words.extend(trap(1));
    let mut rings = Rings::default();
    rings.dumps.insert(
        "sdma0".to_string(),
        RingDump {
            words,
            base_address: 0x8000,
            vmid: 0,
        },
    );
    rings
}

#[test]
fn live_ring_window_wraps_and_decodes_incrementally() {
    let mut rings = wrapped_dma_ring();
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
    let mut decoder = PacketDecoder::from_ring(
        &mut rings,
        "sdma0",
        None,
        RingWindow::Live,
        0,
        device,
        RecordingPresenter::new(),
    )
    .expect("ring");

    assert_eq!(decoder.kind(), StreamKind::Sdma);
    assert_eq!(decoder.decode(Limit::Packets(1), true), Cursor::Packet(1));
    assert_eq!(decoder.decode(Limit::Packets(1), true), Cursor::End);
    let tags: Vec<_> = decoder
        .presenter()
        .packets()
        .map(|packet| (packet.address, packet.words[1]))
        .collect();
    assert_eq!(tags, vec![(0x8010, 1), (0x8000, 2)]);
}

#[test]
fn packet_split_by_the_ring_end_keeps_real_slot_addresses() {
    let mut words = vec![4, 1, 0];
    words.extend([7, 0, 0, 0, sdma::header(sdma::SDMA_OP_TRAP, 0, 0)]);
    let dump = RingDump {
        words,
        base_address: 0x8000,
        vmid: 0,
    };
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
    let mut decoder = PacketDecoder::from_ring_dump(
        &dump,
        StreamKind::Sdma,
        RingWindow::Live,
        0,
        device,
        RecordingPresenter::new(),
    )
    .expect("ring");
    assert_eq!(decoder.decode(Limit::All, true), Cursor::End);

    let out = decoder.presenter();
    assert_eq!(out.packets().map(|p| p.address).collect::<Vec<_>>(), vec![0x8010]);
    let context = out.field("int_context").expect("int_context");
    assert_eq!((context.address, context.value), (0x8000, 7));
}

#[test]
fn buffers_at_the_top_of_the_address_space_decode() {
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
    let mut decoder = PacketDecoder::from_words(
        StreamKind::Pm4,
        &[pm4::TYPE2, pm4::TYPE2],
        at(0, 0xFFFF_FFFF_FFFF_FFFC),
        device,
        RecordingPresenter::new(),
    )
    .expect("built");
    assert_eq!(decoder.decode(Limit::All, true), Cursor::End);
    let addresses: Vec<_> = decoder.presenter().packets().map(|p| p.address).collect();
    assert_eq!(addresses, vec![0xFFFF_FFFF_FFFF_FFFC, 0]);
}

#[test]
fn explicit_window_overrides_ring_pointers() {
    let mut rings = wrapped_dma_ring();
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
    let decoder = PacketDecoder::from_ring(
        &mut rings,
        "sdma0",
        Some(StreamKind::Sdma),
        RingWindow::Span { start: 0, end: 2 },
        0,
        device,
        RecordingPresenter::new(),
    )
    .expect("ring");
    assert_eq!(decoder.stream().map(|s| s.packet_lengths()), Some(vec![2]));
}

#[rstest]
#[case("mystery", None)]
#[case("gfx_0.0.0", Some("gfx_0.0.0"))]
fn ring_lookup_failures_are_reported(#[case] name: &str, #[case] missing: Option<&str>) {
    let mut rings = wrapped_dma_ring();
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
    let err = PacketDecoder::from_ring(
        &mut rings,
        name,
        None,
        RingWindow::Live,
        0,
        device,
        RecordingPresenter::new(),
    )
    .err()
    .expect("lookup fails");
    match missing {
        None => assert_eq!(err, DecoderError::UnknownRingKind(name.to_string())),
        Some(ring) => assert_eq!(
            err,
            DecoderError::Ring(RingReadError::UnknownRing(ring.to_string()))
        ),
    }
}

#[test]
fn little_endian_capture_bytes_decode_like_words() {
    let bytes: Vec<u8> = trap(9).iter().flat_map(|word| word.to_le_bytes()).collect();
    let words = words_from_le_bytes(&bytes);
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let out = decode_all(
        StreamKind::Sdma,
        &words,
        &mut memory,
        &RegisterTable::new(),
        &mut diagnostics,
    );
    assert_eq!(out.packets().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["TRAP"]);
}
