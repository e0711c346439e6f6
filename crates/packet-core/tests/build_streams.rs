//! Builder behavior across dialects: lengths, truncation, references and recovery.

use packet_core::encoding::{pm4, sdma, vcn};
use packet_core::{
    build_stream, build_stream_with, AnyStream, BuildError, BuildOptions, DecoderConfig, Device,
    DeviceFeatures, DiagnosticCounters, DiagnosticKind, GfxLevel, NoRegisterNames, Provenance,
    RegisterTable, SparseMemory, StreamKind, UnknownPacket,
};
use proptest::prelude::*;
use rstest::rstest;
use thiserror as _;
use tracing as _;

#[cfg(feature = "serde")]
use serde as _;

fn origin() -> Provenance {
    Provenance {
        vmid: 1,
        address: 0x10_0000,
        partition: 0,
    }
}

fn build(kind: StreamKind, words: &[u32]) -> Result<AnyStream, BuildError> {
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
    build_stream(kind, words, origin(), &mut device)
}

fn sdma_packet(op: u8, extra: &[u32]) -> Vec<u32> {
    let mut words = vec![sdma::header(op, 0, 0)];
    words.extend_from_slice(extra);
    words
}

proptest! {
    #[test]
    fn cp_packet_length_is_count_plus_header(opcode in any::<u8>(), payload in 1u32..64) {
        let mut words = vec![pm4::type3(opcode, payload)];
        words.extend(std::iter::repeat(0).take(payload as usize));
        let stream = build(StreamKind::Pm4, &words).expect("self-describing");
        prop_assert_eq!(stream.packet_lengths(), vec![payload as usize + 1]);
    }

    #[test]
    fn truncated_buffers_end_at_last_complete_packet(
        counts in prop::collection::vec(0u32..6, 1..12),
        cut in any::<prop::sample::Index>(),
    ) {
        let packets: Vec<Vec<u32>> = counts
            .iter()
            .map(|&count| {
                let mut words = vec![sdma::header(sdma::SDMA_OP_WRITE, 0, 0), 0, 0, count];
                words.extend(std::iter::repeat(7).take(count as usize + 1));
                words
            })
            .collect();
        let words: Vec<u32> = packets.concat();
        let cut = cut.index(words.len() + 1);

        let mut complete = Vec::new();
        let mut end = 0;
        for packet in &packets {
            if end + packet.len() > cut {
                break;
            }
            end += packet.len();
            complete.push(packet.len());
        }

        match build(StreamKind::Sdma, &words[..cut]) {
            Ok(stream) => prop_assert_eq!(stream.packet_lengths(), complete),
            Err(BuildError::EmptyBuffer { .. }) => prop_assert_eq!(cut, 0),
            Err(BuildError::InsufficientWords { available, .. }) => {
                prop_assert!(complete.is_empty());
                prop_assert_eq!(available, cut);
            }
            Err(other) => prop_assert!(false, "unexpected {other}"),
        }
    }
}

#[test]
fn type2_filler_is_a_single_word_packet() {
    let stream = build(StreamKind::Pm4, &[pm4::TYPE2]).expect("filler");
    let AnyStream::Pm4(arena) = &stream else {
        panic!("pm4 stream expected");
    };
    let node = arena.packet(arena.root(), 0).expect("node");
    assert_eq!(stream.len(), 1);
    assert_eq!(node.payload_len(), 0);
    assert!(arena.packet(arena.root(), 1).is_none());
}

#[test]
fn dma_trap_without_payload_is_insufficient() {
    let err = build(StreamKind::Sdma, &[sdma::header(sdma::SDMA_OP_TRAP, 0, 0)])
        .expect_err("trap needs two words");
    assert_eq!(
        err,
        BuildError::InsufficientWords {
            kind: StreamKind::Sdma,
            needed: 2,
            available: 1,
        }
    );
}

#[rstest]
#[case(StreamKind::Sdma)]
#[case(StreamKind::Vpe)]
#[case(StreamKind::Mes)]
#[case(StreamKind::Vcn)]
fn unknown_table_opcode_fails_without_recovery(#[case] kind: StreamKind) {
    let err = build(kind, &[0x0000_00F7, 0, 0]).expect_err("unknown opcode");
    assert!(matches!(err, BuildError::UnknownOpcode { offset: 0, .. }), "{err:?}");
    assert_eq!(err.kind(), kind);
}

#[test]
fn recovery_callback_supplies_length() {
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let mut seen = Vec::new();
    let mut recover = |packet: &UnknownPacket<'_>| {
        seen.push(packet.header);
        Some(3)
    };
    let mut words = vec![0x0000_00F7, 1, 2];
    words.extend(sdma_packet(sdma::SDMA_OP_TRAP, &[0]));
    let stream = {
        let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
        build_stream_with(
            StreamKind::Sdma,
            &words,
            BuildOptions::new(origin()).recovery(&mut recover),
            &mut device,
        )
        .expect("recovered")
    };
    assert_eq!(stream.packet_lengths(), vec![3, 2]);
    assert_eq!(seen, vec![0x0000_00F7]);
    assert_eq!(diagnostics.count(DiagnosticKind::UnknownOpcodeRecovered), 1);
}

#[test]
fn zero_size_indirect_buffer_is_not_followed() {
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let words = [pm4::type3(pm4::OP_INDIRECT_BUFFER, 3), 0x20_0000, 0, 0];
    let stream = {
        let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
        build_stream(StreamKind::Pm4, &words, origin(), &mut device).expect("built")
    };
    let arena = stream.as_cp().expect("cp");
    let node = arena.packet(arena.root(), 0).expect("ib packet");
    assert_eq!(node.nested.and_then(|nested| nested.stream), None);
    assert_eq!(memory.reads(), 0);
    assert!(diagnostics.is_empty());
}

#[test]
fn oversized_reference_is_logged_not_read() {
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let config = DecoderConfig {
        max_reference_bytes: 64,
        ..DecoderConfig::default()
    };
    let words = [pm4::type3(pm4::OP_INDIRECT_BUFFER, 3), 0x20_0000, 0, 32];
    {
        let mut device =
            Device::new(&mut memory, &NoRegisterNames, &mut diagnostics).with_config(config);
        build_stream(StreamKind::Pm4, &words, origin(), &mut device).expect("built");
    }
    assert_eq!(memory.reads(), 0);
    assert_eq!(diagnostics.count(DiagnosticKind::OversizedReference), 1);
}

#[test]
fn unreadable_reference_keeps_the_packet() {
    let mut memory = SparseMemory::new();
    let mut diagnostics = DiagnosticCounters::new();
    let ib = sdma_packet(sdma::SDMA_OP_INDIRECT, &[0x4000, 0, 2, 0, 0]);
    let stream = {
        let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
        build_stream(StreamKind::Sdma, &ib, origin(), &mut device).expect("built")
    };
    assert_eq!(stream.len(), 1);
    assert_eq!(stream.stream_count(), 1);
    assert_eq!(diagnostics.count(DiagnosticKind::UnreadableReference), 1);
}

#[test]
fn nested_dma_buffers_are_built_in_parent_kind() {
    let mut memory = SparseMemory::new();
    let inner = [sdma_packet(sdma::SDMA_OP_TRAP, &[1]), sdma_packet(sdma::SDMA_OP_TRAP, &[2])].concat();
    memory.map_words(3, 0x4000, &inner);
    let vmid_three = sdma::header(sdma::SDMA_OP_INDIRECT, 0, 3 << 16);
    let words = [vmid_three, 0x4000, 0, 4, 0, 0];
    let mut diagnostics = DiagnosticCounters::new();
    let stream = {
        let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
        build_stream(StreamKind::Sdma, &words, origin(), &mut device).expect("built")
    };
    let AnyStream::Sdma(arena) = &stream else {
        panic!("sdma stream expected");
    };
    let nested = arena
        .packet(arena.root(), 0)
        .and_then(|node| node.nested)
        .expect("reference");
    assert_eq!(nested.buffer.vmid, 3);
    let child = nested.stream.expect("followed");
    assert_eq!(arena.record(child).kind, StreamKind::Sdma);
    assert_eq!(arena.record(child).len(), 2);
    assert!(diagnostics.is_empty());
}

#[test]
fn self_referencing_buffer_stops_at_the_cycle() {
    let mut memory = SparseMemory::new();
    let address = origin().address;
    let ib = [
        vcn::CMD_IB,
        origin().vmid,
        address as u32,
        (address >> 32) as u32,
        5,
    ];
    memory.map_words(origin().vmid, address, &ib);
    let mut diagnostics = DiagnosticCounters::new();
    let stream = {
        let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
        build_stream(StreamKind::Vcn, &ib, origin(), &mut device).expect("built")
    };
    assert_eq!(stream.stream_count(), 1);
    assert_eq!(memory.reads(), 0);
    assert_eq!(diagnostics.count(DiagnosticKind::ReferenceCycle), 1);
}

#[test]
fn disabled_following_skips_every_reference() {
    let mut memory = SparseMemory::new();
    memory.map_words(2, 0x8000, &[vcn::CMD_TRAP]);
    let words = [vcn::CMD_IB, 2, 0x8000, 0, 1];
    let mut diagnostics = DiagnosticCounters::new();
    let stream = {
        let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
        build_stream_with(
            StreamKind::Vcn,
            &words,
            BuildOptions::new(origin()).follow(false),
            &mut device,
        )
        .expect("built")
    };
    assert_eq!(stream.stream_count(), 1);
    assert_eq!(memory.reads(), 0);
}

#[test]
fn legacy_video_registers_reference_an_indirect_buffer() {
    let mut registers = RegisterTable::new();
    registers.insert(0x3C00, "mmUVD_LMI_RBC_IB_VMID");
    registers.insert(0x3C01, "mmUVD_LMI_RBC_IB_64BIT_BAR_LOW");
    registers.insert(0x3C02, "mmUVD_LMI_RBC_IB_64BIT_BAR_HIGH");
    registers.insert(0x3C03, "mmUVD_RBC_IB_SIZE");
    let mut memory = SparseMemory::new();
    memory.map_words(2, 0x9000, &[pm4::TYPE2, pm4::TYPE2]);
    let words = [pm4::type0(0x3C00, 4), 2, 0x9000, 0, 2];
    let mut diagnostics = DiagnosticCounters::new();
    let stream = {
        let mut device = Device::new(&mut memory, &registers, &mut diagnostics);
        build_stream(StreamKind::Pm4Lite, &words, origin(), &mut device).expect("built")
    };
    let arena = stream.as_cp().expect("cp");
    let nested = arena
        .packet(arena.root(), 0)
        .and_then(|node| node.nested)
        .expect("ib");
    assert_eq!(nested.buffer.size, 8);
    let child = nested.stream.expect("followed");
    assert_eq!(arena.record(child).len(), 2);
    assert_eq!(arena.record(child).kind, StreamKind::Pm4Lite);
}

#[test]
fn second_reference_in_one_packet_is_reported_not_read() {
    let mut registers = RegisterTable::new();
    registers.insert(0x3C00, "mmUVD_LMI_RBC_IB_VMID");
    registers.insert(0x3C01, "mmUVD_LMI_RBC_IB_64BIT_BAR_LOW");
    registers.insert(0x3C02, "mmUVD_LMI_RBC_IB_64BIT_BAR_HIGH");
    registers.insert(0x3C03, "mmUVD_RBC_IB_SIZE");
    registers.insert(0x3C04, "mmUVD_RBC_IB_SIZE");
    let mut memory = SparseMemory::new();
    memory.map_words(2, 0x9000, &[pm4::TYPE2, pm4::TYPE2]);
    let words = [pm4::type0(0x3C00, 5), 2, 0x9000, 0, 2, 2];
    let mut diagnostics = DiagnosticCounters::new();
    let stream = {
        let mut device = Device::new(&mut memory, &registers, &mut diagnostics);
        build_stream(StreamKind::Pm4Lite, &words, origin(), &mut device).expect("built")
    };

    assert_eq!(stream.stream_count(), 2);
    assert_eq!(memory.reads(), 1);
    assert_eq!(diagnostics.count(DiagnosticKind::ExtraReference), 1);
    let arena = stream.as_cp().expect("cp");
    let nested = arena
        .packet(arena.root(), 0)
        .and_then(|node| node.nested)
        .expect("ib");
    assert!(nested.stream.is_some());
}

fn shader_registers() -> RegisterTable {
    let mut registers = RegisterTable::new();
    registers.insert(0x2C08, "mmSPI_SHADER_PGM_LO_PS");
    registers.insert(0x2C09, "mmSPI_SHADER_PGM_HI_PS");
    registers
}

fn scan(memory: &mut SparseMemory, diagnostics: &mut DiagnosticCounters, limit: u64) -> u64 {
    let registers = shader_registers();
    let config = DecoderConfig {
        shader_scan_page_bytes: 64,
        shader_scan_limit_bytes: limit,
        features: DeviceFeatures {
            gfx_level: GfxLevel::Gfx9,
            ..DeviceFeatures::default()
        },
        ..DecoderConfig::default()
    };
    // Program at 0x1000 (lo = 0x10, hi = 0).
    let words = [pm4::type3(0x76, 3), 8, 0x10, 0];
    let mut device = Device::new(memory, &registers, diagnostics).with_config(config);
    let stream = build_stream(StreamKind::Pm4, &words, origin(), &mut device).expect("built");
    let programs = stream.programs();
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].address, 0x1000);
    programs[0].size
}

#[test]
fn sentinel_scan_crosses_pages() {
    let end = GfxLevel::Gfx9.terminator_word();
    let mut body = vec![0xBE80_0080u32; 13];
    body.extend([end; 5]);
    body.resize(32, 0);
    let mut memory = SparseMemory::new();
    memory.map_words(1, 0x1000, &body);
    let mut diagnostics = DiagnosticCounters::new();
    assert_eq!(scan(&mut memory, &mut diagnostics, 1 << 20), 18 * 4);
    assert!(diagnostics.is_empty());
}

#[test]
fn sentinel_scan_stops_at_unmapped_page() {
    let mut memory = SparseMemory::new();
    memory.map_words(1, 0x1000, &[0; 16]);
    let mut diagnostics = DiagnosticCounters::new();
    assert_eq!(scan(&mut memory, &mut diagnostics, 1 << 20), 64);
    assert!(diagnostics.is_empty());
}

#[test]
fn sentinel_scan_limit_is_logged() {
    let mut memory = SparseMemory::new();
    memory.map_words(1, 0x1000, &[0; 64]);
    let mut diagnostics = DiagnosticCounters::new();
    assert_eq!(scan(&mut memory, &mut diagnostics, 128), 128);
    assert_eq!(diagnostics.count(DiagnosticKind::ShaderScanLimit), 1);
}
