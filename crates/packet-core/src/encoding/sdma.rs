//! DMA-dialect encodings: the system DMA engine and the video processing
//! engine, which share the opcode/sub-opcode header shape.

use super::{
    bits, FieldSpec as F, Layout, OpcodeEntry, PacketLength, ReferenceSpec, RegisterBase,
    SymbolTable, VmidSource, ANY_SUB,
};
use crate::arena::PacketHeader;
use crate::present::Radix;

/// Decoded DMA header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmaHeader {
    raw: u32,
}

impl DmaHeader {
    /// Opcode, bits 7:0.
    #[must_use]
    pub const fn op(self) -> u8 {
        bits(self.raw, 0, 7) as u8
    }

    /// Sub-opcode, bits 15:8.
    #[must_use]
    pub const fn sub_op(self) -> u8 {
        bits(self.raw, 8, 15) as u8
    }
}

impl PacketHeader for DmaHeader {
    fn from_word(word: u32) -> Self {
        Self { raw: word }
    }

    fn raw(&self) -> u32 {
        self.raw
    }

    fn opcode(&self) -> u32 {
        u32::from(self.op())
    }

    fn sub_opcode(&self) -> u32 {
        u32::from(self.sub_op())
    }
}

/// Builds a DMA header word.
#[must_use]
pub const fn header(op: u8, sub_op: u8, extra: u32) -> u32 {
    (extra & 0xFFFF_0000) | ((sub_op as u32) << 8) | op as u32
}

/// SDMA `NOP`.
pub const SDMA_OP_NOP: u8 = 0;
/// SDMA `COPY`.
pub const SDMA_OP_COPY: u8 = 1;
/// SDMA `WRITE`.
pub const SDMA_OP_WRITE: u8 = 2;
/// SDMA `INDIRECT_BUFFER`.
pub const SDMA_OP_INDIRECT: u8 = 4;
/// SDMA `FENCE`.
pub const SDMA_OP_FENCE: u8 = 5;
/// SDMA `TRAP`.
pub const SDMA_OP_TRAP: u8 = 6;
/// SDMA `SRBM_WRITE`.
pub const SDMA_OP_SRBM_WRITE: u8 = 14;

/// VPE `INDIRECT_BUFFER`.
pub const VPE_OP_INDIRECT: u8 = 4;

/// Poll compare function shared by both engines.
pub const POLL_FUNCTION: SymbolTable = &[
    (0, "always"),
    (1, "<"),
    (2, "<="),
    (3, "=="),
    (4, "!="),
    (5, ">="),
    (6, ">"),
    (7, "reserved"),
];

/// `POLL_REGMEM` memory space.
pub const POLL_SPACE: SymbolTable = &[(0, "register"), (1, "memory")];

/// `ATOMIC` operations.
pub const ATOMIC_OPS: SymbolTable = &[
    (0x08, "SWAP_RTN"),
    (0x09, "ADD_RTN"),
    (0x0A, "SUB_RTN"),
    (0x0B, "SMIN_RTN"),
    (0x0C, "UMIN_RTN"),
    (0x0D, "SMAX_RTN"),
    (0x0E, "UMAX_RTN"),
    (0x0F, "AND_RTN"),
    (0x10, "OR_RTN"),
    (0x11, "XOR_RTN"),
    (0x12, "INC_RTN"),
    (0x13, "DEC_RTN"),
    (0x28, "SWAP_RTN_64"),
    (0x29, "ADD_RTN_64"),
    (0x48, "CMPSWAP_RTN_64"),
];

/// `CONST_FILL` element size.
pub const FILL_SIZE: SymbolTable = &[(0, "byte"), (1, "reserved"), (2, "dword"), (3, "reserved")];

const INDIRECT_REFERENCE: ReferenceSpec = ReferenceSpec {
    lo: 1,
    hi: 2,
    hi_bits: 32,
    align: 5,
    size_word: 3,
    size_lo: 0,
    size_hi: 19,
    vmid: VmidSource::Bits {
        word: 0,
        lo: 16,
        hi: 19,
    },
};

const NOP: Layout = &[F::bits("count", 0, 16, 29)];
const COPY_LINEAR: Layout = &[
    F::bits("tmz", 0, 18, 18),
    F::bits("count", 1, 0, 21),
    F::bits("dst_swap", 2, 16, 17),
    F::bits("src_swap", 2, 24, 25),
    F::wide("src_address", 3),
    F::wide("dst_address", 5),
];
const COPY_TILED: Layout = &[
    F::bits("detile", 0, 31, 31),
    F::wide("tiled_address", 1),
    F::bits("width", 3, 0, 13),
    F::bits("height", 4, 0, 13),
    F::bits("depth", 4, 16, 28),
    F::bits("element_size", 5, 0, 2),
    F::bits("swizzle_mode", 5, 3, 7),
    F::bits("dimension", 5, 9, 10),
    F::bits("mip_max", 5, 16, 19),
    F::bits("x", 6, 0, 13),
    F::bits("y", 6, 16, 29),
    F::bits("z", 7, 0, 12),
    F::bits("linear_swap", 7, 24, 25),
    F::wide("linear_address", 8),
    F::bits("linear_pitch", 10, 0, 18),
    F::bits("count", 11, 0, 19),
];
const COPY_LINEAR_SUB_WINDOW: Layout = &[
    F::bits("element_size", 0, 29, 31),
    F::wide("src_address", 1),
    F::bits("src_x", 3, 0, 13),
    F::bits("src_y", 3, 16, 29),
    F::bits("src_z", 4, 0, 10),
    F::bits("src_pitch", 4, 13, 31),
    F::hex("src_slice_pitch", 5),
    F::wide("dst_address", 6),
    F::bits("dst_x", 8, 0, 13),
    F::bits("dst_y", 8, 16, 29),
    F::bits("dst_z", 9, 0, 10),
    F::bits("dst_pitch", 9, 13, 31),
    F::hex("dst_slice_pitch", 10),
    F::bits("rect_x", 11, 0, 13),
    F::bits("rect_y", 11, 16, 29),
    F::bits("rect_z", 12, 0, 10),
];
const WRITE_LINEAR: Layout = &[
    F::wide("dst_address", 1),
    F::bits("count", 3, 0, 19),
    F::data("data", 4),
];
const INDIRECT: Layout = &[
    F::bits("vmid", 0, 16, 19),
    F::bits("priv", 0, 31, 31),
    F::address("ib_base", 1, 2, 32, 5),
    F::bits("ib_size", 3, 0, 19),
    F::wide("csa_address", 4),
];
const FENCE: Layout = &[
    F::bits("mtype", 0, 16, 18),
    F::bits("gcc", 0, 19, 19),
    F::address("address", 1, 2, 32, 2),
    F::hex("data", 3),
];
const TRAP: Layout = &[F::bits("int_context", 1, 0, 27).radix(Radix::Hex)];
const SEMAPHORE: Layout = &[
    F::bits("write_one", 0, 29, 29),
    F::bits("signal", 0, 30, 30),
    F::bits("mailbox", 0, 31, 31),
    F::address("address", 1, 2, 32, 3),
];
const POLL_REGMEM: Layout = &[
    F::bits("hdp_flush", 0, 26, 26),
    F::bits("function", 0, 28, 30).symbols(POLL_FUNCTION),
    F::bits("mem_poll", 0, 31, 31).symbols(POLL_SPACE),
    F::register("register", 1, 0, 17, 0).when(0, 31, 31, 0),
    F::address("address", 1, 2, 32, 2).when(0, 31, 31, 1),
    F::hex("value", 3),
    F::hex("mask", 4),
    F::bits("interval", 5, 0, 15),
    F::bits("retry_count", 5, 16, 27),
];
const COND_EXE: Layout = &[
    F::address("address", 1, 2, 32, 2),
    F::hex("reference", 3),
    F::bits("exec_count", 4, 0, 13),
];
const ATOMIC: Layout = &[
    F::bits("loop", 0, 16, 16),
    F::bits("tmz", 0, 18, 18),
    F::bits("atomic_op", 0, 25, 31).symbols(ATOMIC_OPS),
    F::address("address", 1, 2, 32, 3),
    F::wide("src_data", 3),
    F::wide("cmp_data", 5),
    F::bits("loop_interval", 7, 0, 12),
];
const CONST_FILL: Layout = &[
    F::bits("fill_size", 0, 30, 31).symbols(FILL_SIZE),
    F::wide("dst_address", 1),
    F::hex("data", 3),
    F::bits("count", 4, 0, 21),
];
const GEN_PTEPDE: Layout = &[
    F::wide("dst_address", 1),
    F::wide("mask", 3),
    F::wide("init_value", 5),
    F::wide("increment", 7),
    F::bits("count", 9, 0, 18),
];
const TIMESTAMP: Layout = &[F::address("address", 1, 2, 32, 3)];
const SRBM_WRITE: Layout = &[
    F::bits("byte_enable", 0, 28, 31).radix(Radix::Hex),
    F::register_data(
        2,
        RegisterBase::Word {
            word: 1,
            lo: 0,
            hi: 17,
            space: 0,
        },
    ),
];
const PRE_EXE: Layout = &[
    F::bits("dev_sel", 0, 16, 23).radix(Radix::Hex),
    F::bits("exec_count", 1, 0, 13),
];
const GCR_REQ: Layout = &[
    F::address("base_va", 1, 2, 16, 7),
    F::bits("gcr_control_lo", 2, 16, 31).radix(Radix::Hex),
    F::bits("gcr_control_hi", 3, 0, 2).radix(Radix::Hex),
    F::address("limit_va", 3, 4, 16, 7),
    F::bits("vmid", 4, 24, 27),
];

const fn fixed(op: u8, sub: u32, name: &'static str, words: usize, layout: Layout) -> OpcodeEntry {
    OpcodeEntry::new(op as u32, sub, name, PacketLength::Fixed(words)).fields(layout)
}

const NOP_LENGTH: PacketLength = PacketLength::HeaderCount {
    base: 1,
    lo: 16,
    hi: 29,
    scale: 1,
};

/// System DMA opcodes.
pub const SDMA_OPCODES: &[OpcodeEntry] = &[
    OpcodeEntry::new(SDMA_OP_NOP as u32, ANY_SUB, "NOP", NOP_LENGTH).fields(NOP),
    fixed(SDMA_OP_COPY, 0, "COPY_LINEAR", 7, COPY_LINEAR),
    fixed(SDMA_OP_COPY, 1, "COPY_TILED", 12, COPY_TILED),
    OpcodeEntry::new(SDMA_OP_COPY as u32, 3, "COPY_STRUCT", PacketLength::Fixed(8)),
    fixed(SDMA_OP_COPY, 4, "COPY_LINEAR_SUB_WINDOW", 13, COPY_LINEAR_SUB_WINDOW),
    OpcodeEntry::new(SDMA_OP_COPY as u32, 5, "COPY_TILED_SUB_WINDOW", PacketLength::Fixed(14)),
    OpcodeEntry::new(SDMA_OP_COPY as u32, 6, "COPY_T2T_SUB_WINDOW", PacketLength::Fixed(15)),
    OpcodeEntry::new(
        SDMA_OP_WRITE as u32,
        0,
        "WRITE_LINEAR",
        PacketLength::PayloadCount {
            base: 5,
            word: 3,
            lo: 0,
            hi: 19,
            scale: 1,
        },
    )
    .fields(WRITE_LINEAR),
    fixed(SDMA_OP_INDIRECT, ANY_SUB, "INDIRECT_BUFFER", 6, INDIRECT).reference(INDIRECT_REFERENCE),
    fixed(SDMA_OP_FENCE, ANY_SUB, "FENCE", 4, FENCE),
    fixed(SDMA_OP_TRAP, ANY_SUB, "TRAP", 2, TRAP),
    fixed(7, ANY_SUB, "SEMAPHORE", 3, SEMAPHORE),
    fixed(8, ANY_SUB, "POLL_REGMEM", 6, POLL_REGMEM),
    fixed(9, ANY_SUB, "COND_EXE", 5, COND_EXE),
    fixed(10, ANY_SUB, "ATOMIC", 8, ATOMIC),
    fixed(11, ANY_SUB, "CONST_FILL", 5, CONST_FILL),
    fixed(12, 0, "GEN_PTEPDE", 10, GEN_PTEPDE),
    OpcodeEntry::new(12, 1, "COPY_PTEPDE", PacketLength::Fixed(10)),
    fixed(13, ANY_SUB, "TIMESTAMP", 3, TIMESTAMP),
    fixed(SDMA_OP_SRBM_WRITE, ANY_SUB, "SRBM_WRITE", 3, SRBM_WRITE),
    fixed(15, ANY_SUB, "PRE_EXE", 2, PRE_EXE),
    fixed(17, ANY_SUB, "GCR_REQ", 5, GCR_REQ),
    fixed(32, ANY_SUB, "DUMMY_TRAP", 2, TRAP),
];

const VPE_DESCRIPTOR: Layout = &[
    F::bits("config_desc_count", 0, 24, 27),
    F::wide("plane_desc_address", 1),
    F::data("config_desc", 3),
];
const VPE_REG_WRITE: Layout = &[
    F::register_data(
        2,
        RegisterBase::Word {
            word: 1,
            lo: 2,
            hi: 19,
            space: 0,
        },
    ),
];
const VPE_POLL_REGMEM: Layout = &[
    F::bits("function", 0, 28, 30).symbols(POLL_FUNCTION),
    F::bits("mem_poll", 0, 31, 31).symbols(POLL_SPACE),
    F::register("register", 1, 2, 19, 0).when(0, 31, 31, 0),
    F::address("address", 1, 2, 32, 2).when(0, 31, 31, 1),
    F::hex("value", 3),
    F::hex("mask", 4),
    F::bits("interval", 5, 0, 15),
    F::bits("retry_count", 5, 16, 27),
];
const COLLABORATE_SYNC: Layout = &[F::hex("sync_data", 1)];

/// Video processing engine opcodes.
pub const VPE_OPCODES: &[OpcodeEntry] = &[
    OpcodeEntry::new(0, ANY_SUB, "NOP", NOP_LENGTH).fields(NOP),
    OpcodeEntry::new(
        1,
        ANY_SUB,
        "VPE_DESCRIPTOR",
        PacketLength::HeaderCount {
            base: 5,
            lo: 24,
            hi: 27,
            scale: 2,
        },
    )
    .fields(VPE_DESCRIPTOR),
    fixed(VPE_OP_INDIRECT, ANY_SUB, "INDIRECT_BUFFER", 6, INDIRECT).reference(INDIRECT_REFERENCE),
    fixed(5, ANY_SUB, "FENCE", 4, FENCE),
    fixed(6, ANY_SUB, "TRAP", 2, TRAP),
    fixed(7, ANY_SUB, "REG_WRITE", 3, VPE_REG_WRITE),
    fixed(8, ANY_SUB, "POLL_REGMEM", 6, VPE_POLL_REGMEM),
    fixed(9, ANY_SUB, "COND_EXE", 5, COND_EXE),
    fixed(12, ANY_SUB, "COLLABORATE_SYNC", 2, COLLABORATE_SYNC),
    fixed(13, ANY_SUB, "TIMESTAMP", 3, TIMESTAMP),
];
