//! Command-processor (PM4) packet encoding.

use super::{
    bits, lookup, FieldSpec as F, Layout, OpcodeEntry, PacketLength, ReferenceSpec,
    RegisterBase, SymbolTable, VmidSource,
};
use crate::arena::PacketHeader;
use crate::present::Radix;

/// Base of the config register space.
pub const CONFIG_SPACE: u32 = 0x2000;
/// Base of the persistent-state (SH) register space.
pub const SH_SPACE: u32 = 0x2C00;
/// Base of the context register space.
pub const CONTEXT_SPACE: u32 = 0xA000;
/// Base of the user-config register space.
pub const UCONFIG_SPACE: u32 = 0xC000;

/// `INDIRECT_BUFFER_CONST` opcode.
pub const OP_INDIRECT_BUFFER_CONST: u8 = 0x33;
/// `INDIRECT_BUFFER` opcode.
pub const OP_INDIRECT_BUFFER: u8 = 0x3F;

/// Packet type from header bits 31:30.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pm4Type {
    /// Register run.
    Type0,
    /// Reserved; consumed as one word.
    Type1,
    /// One-word filler.
    Type2,
    /// Opcode packet.
    Type3,
}

/// Decoded command-processor header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pm4Header {
    raw: u32,
}

impl Pm4Header {
    /// Packet type.
    #[must_use]
    pub const fn packet_type(self) -> Pm4Type {
        match self.raw >> 30 {
            0 => Pm4Type::Type0,
            1 => Pm4Type::Type1,
            2 => Pm4Type::Type2,
            _ => Pm4Type::Type3,
        }
    }

    /// 14-bit count field (payload words minus one).
    #[must_use]
    pub const fn count(self) -> u32 {
        bits(self.raw, 16, 29)
    }

    /// Type-3 opcode byte.
    #[must_use]
    pub const fn opcode_byte(self) -> u8 {
        bits(self.raw, 8, 15) as u8
    }

    /// Type-0 first register.
    #[must_use]
    pub const fn base_register(self) -> u32 {
        bits(self.raw, 0, 15)
    }

    /// Type-3 shader-type bit (compute when set).
    #[must_use]
    pub const fn shader_type(self) -> u32 {
        bits(self.raw, 1, 1)
    }

    /// Type-3 predicate bit.
    #[must_use]
    pub const fn predicate(self) -> u32 {
        bits(self.raw, 0, 0)
    }

    /// Words the packet occupies, header included.
    #[must_use]
    pub const fn total_words(self) -> usize {
        match self.packet_type() {
            Pm4Type::Type0 | Pm4Type::Type3 => self.count() as usize + 2,
            Pm4Type::Type1 | Pm4Type::Type2 => 1,
        }
    }

    /// Table entry of a type-3 packet.
    #[must_use]
    pub fn entry(self) -> Option<&'static OpcodeEntry> {
        match self.packet_type() {
            Pm4Type::Type3 => lookup(OPCODES, u32::from(self.opcode_byte()), 0),
            _ => None,
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self.packet_type() {
            Pm4Type::Type0 => "TYPE0",
            Pm4Type::Type1 => "TYPE1",
            Pm4Type::Type2 => "TYPE2",
            Pm4Type::Type3 => self.entry().map_or("UNKNOWN", |entry| entry.name),
        }
    }
}

impl PacketHeader for Pm4Header {
    fn from_word(word: u32) -> Self {
        Self { raw: word }
    }

    fn raw(&self) -> u32 {
        self.raw
    }

    fn opcode(&self) -> u32 {
        match self.packet_type() {
            Pm4Type::Type3 => u32::from(self.opcode_byte()),
            _ => 0,
        }
    }

    fn sub_opcode(&self) -> u32 {
        self.raw >> 30
    }
}

/// Builds a type-3 header word.
#[must_use]
pub const fn type3(opcode: u8, payload_words: u32) -> u32 {
    (3 << 30) | ((payload_words.wrapping_sub(1) & 0x3FFF) << 16) | ((opcode as u32) << 8)
}

/// Builds a type-0 header word.
#[must_use]
pub const fn type0(register: u32, data_words: u32) -> u32 {
    ((data_words.wrapping_sub(1) & 0x3FFF) << 16) | (register & 0xFFFF)
}

/// Type-2 filler word.
pub const TYPE2: u32 = 2 << 30;

/// VGT event types used by the `EVENT_WRITE` family.
pub const EVENT_TYPES: SymbolTable = &[
    (0x00, "Reserved_0x00"),
    (0x01, "SAMPLE_STREAMOUTSTATS1"),
    (0x02, "SAMPLE_STREAMOUTSTATS2"),
    (0x03, "SAMPLE_STREAMOUTSTATS3"),
    (0x04, "CACHE_FLUSH_TS"),
    (0x05, "CONTEXT_DONE"),
    (0x06, "CACHE_FLUSH"),
    (0x07, "CS_PARTIAL_FLUSH"),
    (0x08, "VGT_STREAMOUT_SYNC"),
    (0x09, "Reserved_0x09"),
    (0x0A, "VGT_STREAMOUT_RESET"),
    (0x0B, "END_OF_PIPE_INCR_DE"),
    (0x0C, "END_OF_PIPE_IB_END"),
    (0x0D, "RST_PIX_CNT"),
    (0x0E, "BREAK_BATCH"),
    (0x0F, "VS_PARTIAL_FLUSH"),
    (0x10, "PS_PARTIAL_FLUSH"),
    (0x11, "FLUSH_HS_OUTPUT"),
    (0x12, "FLUSH_DFSM"),
    (0x13, "RESET_TO_LOWEST_VGT"),
    (0x14, "CACHE_FLUSH_AND_INV_TS_EVENT"),
    (0x15, "ZPASS_DONE"),
    (0x16, "CACHE_FLUSH_AND_INV_EVENT"),
    (0x17, "PERFCOUNTER_START"),
    (0x18, "PERFCOUNTER_STOP"),
    (0x19, "PIPELINESTAT_START"),
    (0x1A, "PIPELINESTAT_STOP"),
    (0x1B, "PERFCOUNTER_SAMPLE"),
    (0x1C, "FLUSH_ES_OUTPUT"),
    (0x1D, "FLUSH_GS_OUTPUT"),
    (0x1E, "SAMPLE_PIPELINESTAT"),
    (0x1F, "SO_VGTSTREAMOUT_FLUSH"),
    (0x20, "SAMPLE_STREAMOUTSTATS"),
    (0x21, "RESET_VTX_CNT"),
    (0x22, "BLOCK_CONTEXT_DONE"),
    (0x23, "CS_CONTEXT_DONE"),
    (0x24, "VGT_FLUSH"),
    (0x25, "TGID_ROLLOVER"),
    (0x26, "SQ_NON_EVENT"),
    (0x27, "SC_SEND_DB_VPZ"),
    (0x28, "BOTTOM_OF_PIPE_TS"),
    (0x29, "FLUSH_SX_TS"),
    (0x2A, "DB_CACHE_FLUSH_AND_INV"),
    (0x2B, "FLUSH_AND_INV_DB_DATA_TS"),
    (0x2C, "FLUSH_AND_INV_DB_META"),
    (0x2D, "FLUSH_AND_INV_CB_DATA_TS"),
    (0x2E, "FLUSH_AND_INV_CB_META"),
    (0x2F, "CS_DONE"),
    (0x30, "PS_DONE"),
    (0x31, "FLUSH_AND_INV_CB_PIXEL_DATA"),
    (0x32, "SX_CB_RAT_ACK_REQUEST"),
    (0x33, "THREAD_TRACE_START"),
    (0x34, "THREAD_TRACE_STOP"),
    (0x35, "THREAD_TRACE_MARKER"),
    (0x36, "THREAD_TRACE_DRAW"),
    (0x37, "THREAD_TRACE_FINISH"),
    (0x38, "PIXEL_PIPE_STAT_CONTROL"),
    (0x39, "PIXEL_PIPE_STAT_DUMP"),
    (0x3A, "PIXEL_PIPE_STAT_RESET"),
    (0x3B, "CONTEXT_SUSPEND"),
    (0x3C, "OFFCHIP_HS_DEALLOC"),
    (0x3D, "ENABLE_NGG_PIPELINE"),
    (0x3E, "ENABLE_LEGACY_PIPELINE"),
    (0x3F, "DRAW_DONE"),
];

/// Engine selector of ME-executed packets.
pub const ENGINE_SEL: SymbolTable = &[(0, "ME"), (1, "PFP"), (2, "CE"), (3, "reserved")];

/// `WRITE_DATA` destination selector.
pub const WRITE_DATA_DST: SymbolTable = &[
    (0, "mem-mapped register"),
    (1, "memory sync"),
    (2, "TC/L2"),
    (3, "GDS"),
    (4, "reserved"),
    (5, "memory async"),
];

/// `COPY_DATA` source selector.
pub const COPY_DATA_SRC: SymbolTable = &[
    (0, "mem-mapped register"),
    (1, "memory"),
    (2, "TC/L2"),
    (3, "GDS"),
    (4, "perfcounters"),
    (5, "immediate data"),
    (6, "atomic return data"),
    (7, "GDS atomic return data0"),
    (8, "GDS atomic return data1"),
    (9, "GPU clock count"),
    (10, "system clock count"),
];

/// `COPY_DATA` destination selector.
pub const COPY_DATA_DST: SymbolTable = &[
    (0, "mem-mapped register"),
    (1, "memory sync"),
    (2, "TC/L2"),
    (3, "GDS"),
    (4, "perfcounters"),
    (5, "memory async"),
    (6, "reserved"),
    (7, "reserved"),
    (8, "system memory"),
];

/// `WAIT_REG_MEM` compare function.
pub const COMPARE_FUNCTION: SymbolTable = &[
    (0, "always"),
    (1, "<"),
    (2, "<="),
    (3, "=="),
    (4, "!="),
    (5, ">="),
    (6, ">"),
    (7, "reserved"),
];

/// `WAIT_REG_MEM` memory space.
pub const MEM_SPACE: SymbolTable = &[(0, "register"), (1, "memory")];

/// `WAIT_REG_MEM` operation.
pub const WAIT_OPERATION: SymbolTable = &[
    (0, "wait_reg_mem"),
    (1, "wr_wait_wr_reg"),
    (2, "reserved"),
    (3, "wait_mem_preemptable"),
];

/// End-of-pipe data selector.
pub const EOP_DATA_SEL: SymbolTable = &[
    (0, "none"),
    (1, "32-bit low"),
    (2, "64-bit"),
    (3, "GPU clock counter"),
    (4, "system clock counter"),
    (5, "store GDS data"),
    (6, "reserved"),
    (7, "reserved"),
];

/// End-of-pipe interrupt selector.
pub const EOP_INT_SEL: SymbolTable = &[
    (0, "none"),
    (1, "send interrupt only"),
    (2, "send interrupt on write confirm"),
    (3, "send data on write confirm"),
];

/// `RELEASE_MEM` destination selector.
pub const RELEASE_MEM_DST: SymbolTable = &[(0, "memory controller"), (1, "TC/L2"), (2, "reserved")];

/// `DMA_DATA` source selector.
pub const DMA_DATA_SRC: SymbolTable = &[(0, "src_addr"), (1, "GDS"), (2, "data"), (3, "src_addr TC/L2")];

/// `DMA_DATA` destination selector.
pub const DMA_DATA_DST: SymbolTable = &[(0, "dst_addr"), (1, "GDS"), (2, "reserved"), (3, "dst_addr TC/L2")];

/// `INDEX_TYPE` index size.
pub const INDEX_TYPE: SymbolTable = &[(0, "16-bit"), (1, "32-bit"), (2, "8-bit"), (3, "reserved")];

/// KIQ queue type.
pub const QUEUE_TYPE: SymbolTable = &[
    (0, "normal compute"),
    (1, "debug interface queue"),
    (2, "normal latency static"),
    (3, "low latency static"),
];

/// KIQ engine selector.
pub const KIQ_ENGINE: SymbolTable = &[
    (0, "compute"),
    (1, "SDMA0"),
    (2, "SDMA1"),
    (3, "SDMA2"),
    (4, "gfx"),
    (5, "reserved"),
    (6, "reserved"),
    (7, "reserved"),
];

/// `UNMAP_QUEUES` action.
pub const UNMAP_ACTION: SymbolTable = &[
    (0, "preempt queues"),
    (1, "reset queues"),
    (2, "disable process queues"),
    (3, "preempt queues no unmap"),
];

/// `FRAME_CONTROL` command.
pub const FRAME_COMMAND: SymbolTable = &[(0, "kmd frame begin"), (1, "kmd frame end")];

const fn set_reg(space: u32) -> [F; 1] {
    [F::register_data(
        2,
        RegisterBase::Word {
            word: 1,
            lo: 0,
            hi: 15,
            space,
        },
    )]
}

const fn load_reg(space: u32) -> [F; 2] {
    [
        F::address("base_address", 1, 2, 16, 2),
        F::register_pairs(3, space),
    ]
}

/// Fields of a type-0 register run: one per data word.
pub const TYPE0_LAYOUT: Layout = &[F::register_data(1, RegisterBase::Header)];

const NOP: Layout = &[];
const SET_BASE: Layout = &[
    F::bits("base_index", 1, 0, 3),
    F::address("address", 2, 3, 16, 3),
];
const CLEAR_STATE: Layout = &[F::hex("cmd", 1)];
const INDEX_BUFFER_SIZE: Layout = &[F::word("index_count", 1)];
const DISPATCH_DIRECT: Layout = &[
    F::word("dim_x", 1),
    F::word("dim_y", 2),
    F::word("dim_z", 3),
    F::hex("dispatch_initiator", 4),
];
const DISPATCH_INDIRECT: Layout = &[F::hex("data_offset", 1), F::hex("dispatch_initiator", 2)];
const ATOMIC_MEM: Layout = &[
    F::bits("atomic", 1, 0, 6),
    F::bits("command", 1, 8, 11),
    F::bits("cache_policy", 1, 25, 26),
    F::address("address", 2, 3, 32, 3),
    F::wide("src_data", 4),
    F::wide("cmp_data", 6),
    F::bits("loop_interval", 8, 0, 12),
];
const OCCLUSION_QUERY: Layout = &[
    F::address("start_address", 1, 2, 16, 4),
    F::address("zpass_done_address", 3, 4, 16, 4),
];
const SET_PREDICATION: Layout = &[
    F::bits("pred_bool", 1, 8, 8),
    F::bits("hint", 1, 12, 12),
    F::bits("pred_op", 1, 16, 18),
    F::bits("continue_bit", 1, 31, 31),
    F::address("start_address", 2, 3, 16, 4),
];
const REG_RMW: Layout = &[
    F::register("mod_addr", 1, 0, 13, 0),
    F::hex("and_mask", 2),
    F::hex("or_mask", 3),
];
const COND_EXEC: Layout = &[
    F::address("bool_address", 1, 2, 16, 2),
    F::hex("control", 3),
    F::bits("exec_count", 4, 0, 13),
];
const PRED_EXEC: Layout = &[
    F::bits("exec_count", 1, 0, 13),
    F::bits("device_select", 1, 24, 31).radix(Radix::Hex),
];
const DRAW_INDIRECT: Layout = &[
    F::hex("data_offset", 1),
    F::bits("base_vtx_loc", 2, 0, 15).radix(Radix::Hex),
    F::bits("start_inst_loc", 3, 0, 15).radix(Radix::Hex),
    F::hex("draw_initiator", 4),
];
const INDEX_BASE: Layout = &[F::address("index_base", 1, 2, 16, 1)];
const DRAW_INDEX_2: Layout = &[
    F::word("max_size", 1),
    F::address("index_base", 2, 3, 16, 1),
    F::word("index_count", 4),
    F::hex("draw_initiator", 5),
];
const CONTEXT_CONTROL: Layout = &[F::hex("load_control", 1), F::hex("shadow_enable", 2)];
const INDEX_TYPE_LAYOUT: Layout = &[
    F::bits("index_type", 1, 0, 1).symbols(INDEX_TYPE),
    F::bits("swap_mode", 1, 2, 3),
];
const DRAW_INDIRECT_MULTI: Layout = &[
    F::hex("data_offset", 1),
    F::bits("base_vtx_loc", 2, 0, 15).radix(Radix::Hex),
    F::bits("start_inst_loc", 3, 0, 15).radix(Radix::Hex),
    F::bits("draw_index_loc", 4, 0, 15).radix(Radix::Hex),
    F::bits("count_indirect_enable", 4, 30, 30),
    F::bits("draw_index_enable", 4, 31, 31),
    F::word("count", 5),
    F::address("count_address", 6, 7, 16, 2),
    F::word("stride", 8),
    F::hex("draw_initiator", 9),
];
const DRAW_INDEX_AUTO: Layout = &[F::word("index_count", 1), F::hex("draw_initiator", 2)];
const NUM_INSTANCES: Layout = &[F::word("num_instances", 1)];
const INDIRECT_BUFFER: Layout = &[
    F::address("ib_base", 1, 2, 16, 2),
    F::bits("ib_size", 3, 0, 19),
    F::bits("chain", 3, 20, 20),
    F::bits("pre_ena", 3, 21, 21),
    F::bits("vmid", 3, 24, 27),
    F::bits("cache_policy", 3, 28, 29),
    F::bits("priv", 3, 31, 31),
];
const STRMOUT_BUFFER_UPDATE: Layout = &[
    F::bits("update_memory", 1, 0, 0),
    F::bits("source_select", 1, 1, 2),
    F::bits("buffer_select", 1, 8, 9),
    F::address("dst_address", 2, 3, 16, 2),
    F::address("src_address", 4, 5, 16, 2),
];
const DRAW_INDEX_OFFSET_2: Layout = &[
    F::word("max_size", 1),
    F::hex("index_offset", 2),
    F::word("index_count", 3),
    F::hex("draw_initiator", 4),
];
const WRITE_DATA: Layout = &[
    F::bits("dst_sel", 1, 8, 11).symbols(WRITE_DATA_DST),
    F::bits("wr_one_addr", 1, 16, 16),
    F::bits("wr_confirm", 1, 20, 20),
    F::bits("cache_policy", 1, 25, 26),
    F::bits("engine_sel", 1, 30, 31).symbols(ENGINE_SEL),
    F::register("dst_register", 2, 0, 17, 0).when(1, 8, 11, 0),
    F::register_data(
        4,
        RegisterBase::Word {
            word: 2,
            lo: 0,
            hi: 17,
            space: 0,
        },
    )
    .when(1, 8, 11, 0),
    F::address("dst_address", 2, 3, 32, 2).unless(1, 8, 11, 0),
    F::data("data", 4).unless(1, 8, 11, 0),
];
const MEM_SEMAPHORE: Layout = &[
    F::address("address", 1, 2, 16, 3),
    F::bits("use_mailbox", 3, 16, 16),
    F::bits("signal_type", 3, 20, 20),
    F::bits("client_code", 3, 24, 25),
    F::bits("sem_sel", 3, 29, 31),
];
const WAIT_REG_MEM: Layout = &[
    F::bits("function", 1, 0, 2).symbols(COMPARE_FUNCTION),
    F::bits("mem_space", 1, 4, 4).symbols(MEM_SPACE),
    F::bits("operation", 1, 6, 7).symbols(WAIT_OPERATION),
    F::bits("engine", 1, 8, 9).symbols(ENGINE_SEL),
    F::register("poll_register", 2, 0, 17, 0).when(1, 4, 4, 0),
    F::address("poll_address", 2, 3, 16, 2).when(1, 4, 4, 1),
    F::hex("reference", 4),
    F::hex("mask", 5),
    F::bits("poll_interval", 6, 0, 15),
];
const COPY_DATA: Layout = &[
    F::bits("src_sel", 1, 0, 3).symbols(COPY_DATA_SRC),
    F::bits("dst_sel", 1, 8, 11).symbols(COPY_DATA_DST),
    F::bits("count_sel", 1, 16, 16),
    F::bits("wr_confirm", 1, 20, 20),
    F::bits("engine_sel", 1, 30, 31).symbols(ENGINE_SEL),
    F::register("src_register", 2, 0, 17, 0).when(1, 0, 3, 0),
    F::wide("src_imm_data", 2).when(1, 0, 3, 5),
    F::address("src_address", 2, 3, 32, 2).when(1, 0, 3, 1),
    F::address("src_address", 2, 3, 32, 2).when(1, 0, 3, 2),
    F::register("dst_register", 4, 0, 17, 0).when(1, 8, 11, 0),
    F::address("dst_address", 4, 5, 32, 2).unless(1, 8, 11, 0),
];
const PFP_SYNC_ME: Layout = &[F::hex("dummy", 1)];
const SURFACE_SYNC: Layout = &[
    F::hex("coher_cntl", 1),
    F::hex("coher_size", 2),
    F::hex("coher_base", 3),
    F::bits("poll_interval", 4, 0, 15),
];
const COND_WRITE: Layout = &[
    F::bits("function", 1, 0, 2).symbols(COMPARE_FUNCTION),
    F::bits("poll_space", 1, 4, 4).symbols(MEM_SPACE),
    F::bits("write_space", 1, 8, 9),
    F::address("poll_address", 2, 3, 16, 2),
    F::hex("reference", 4),
    F::hex("mask", 5),
    F::address("write_address", 6, 7, 16, 2),
    F::hex("write_data", 8),
];
const EVENT_WRITE: Layout = &[
    F::bits("event_type", 1, 0, 5).symbols(EVENT_TYPES),
    F::bits("event_index", 1, 8, 11),
    F::address("address", 2, 3, 16, 3),
];
const EVENT_WRITE_EOP: Layout = &[
    F::bits("event_type", 1, 0, 5).symbols(EVENT_TYPES),
    F::bits("event_index", 1, 8, 11),
    F::address("address", 2, 3, 16, 2),
    F::bits("int_sel", 3, 24, 25).symbols(EOP_INT_SEL),
    F::bits("data_sel", 3, 29, 31).symbols(EOP_DATA_SEL),
    F::wide("data", 4),
];
const EVENT_WRITE_EOS: Layout = &[
    F::bits("event_type", 1, 0, 5).symbols(EVENT_TYPES),
    F::bits("event_index", 1, 8, 11),
    F::address("address", 2, 3, 16, 2),
    F::bits("command", 3, 29, 31),
    F::hex("data", 4),
];
const RELEASE_MEM: Layout = &[
    F::bits("event_type", 1, 0, 5).symbols(EVENT_TYPES),
    F::bits("event_index", 1, 8, 11),
    F::bits("cache_policy", 1, 25, 26),
    F::bits("dst_sel", 2, 16, 17).symbols(RELEASE_MEM_DST),
    F::bits("int_sel", 2, 24, 26).symbols(EOP_INT_SEL),
    F::bits("data_sel", 2, 29, 31).symbols(EOP_DATA_SEL),
    F::address("address", 3, 4, 32, 2),
    F::wide("data", 5),
];
const PREAMBLE_CNTL: Layout = &[F::bits("command", 1, 28, 31)];
const DMA_DATA: Layout = &[
    F::bits("engine", 1, 0, 0).symbols(ENGINE_SEL),
    F::bits("dst_sel", 1, 20, 21).symbols(DMA_DATA_DST),
    F::bits("src_sel", 1, 29, 30).symbols(DMA_DATA_SRC),
    F::bits("cp_sync", 1, 31, 31),
    F::address("src_address", 2, 3, 32, 0),
    F::address("dst_address", 4, 5, 32, 0),
    F::bits("byte_count", 6, 0, 25),
    F::bits("dis_wc", 6, 31, 31),
];
const CONTEXT_REG_RMW: Layout = &[
    F::register("reg_offset", 1, 0, 15, CONTEXT_SPACE),
    F::hex("reg_mask", 2),
    F::hex("reg_data", 3),
];
const ACQUIRE_MEM: Layout = &[
    F::bits("coher_cntl", 1, 0, 30).radix(Radix::Hex),
    F::bits("engine", 1, 31, 31).symbols(ENGINE_SEL),
    F::hex("coher_size", 2),
    F::bits("coher_size_hi", 3, 0, 7).radix(Radix::Hex),
    F::address("coher_base", 4, 5, 24, 0),
    F::bits("poll_interval", 6, 0, 15),
    F::hex("gcr_cntl", 7),
];
const LOAD_UCONFIG_REG: [F; 2] = load_reg(UCONFIG_SPACE);
const LOAD_SH_REG: [F; 2] = load_reg(SH_SPACE);
const LOAD_CONFIG_REG: [F; 2] = load_reg(CONFIG_SPACE);
const LOAD_CONTEXT_REG: [F; 2] = load_reg(CONTEXT_SPACE);
const SET_CONFIG_REG: [F; 1] = set_reg(CONFIG_SPACE);
const SET_CONTEXT_REG: [F; 1] = set_reg(CONTEXT_SPACE);
const SET_SH_REG: [F; 1] = set_reg(SH_SPACE);
const SET_UCONFIG_REG: [F; 1] = set_reg(UCONFIG_SPACE);
const SET_SH_REG_OFFSET: Layout = &[
    F::register("reg_offset", 1, 0, 15, SH_SPACE),
    F::hex("data_offset", 2),
    F::hex("data", 3),
];
const LOAD_CONST_RAM: Layout = &[
    F::address("address", 1, 2, 16, 5),
    F::bits("num_dw", 3, 0, 14),
    F::bits("start_address", 4, 0, 15).radix(Radix::Hex),
];
const WRITE_CONST_RAM: Layout = &[
    F::bits("offset", 1, 0, 15).radix(Radix::Hex),
    F::data("data", 2),
];
const DUMP_CONST_RAM: Layout = &[
    F::bits("offset", 1, 0, 15).radix(Radix::Hex),
    F::bits("num_dw", 2, 0, 14),
    F::address("address", 3, 4, 32, 5),
];
const INCREMENT_CE_COUNTER: Layout = &[F::bits("cntrsel", 1, 0, 1)];
const DUMMY: Layout = &[F::hex("dummy", 1)];
const WAIT_ON_CE_COUNTER: Layout = &[
    F::bits("cond_acquire_mem", 1, 0, 0),
    F::bits("force_sync", 1, 1, 1),
];
const WAIT_ON_DE_COUNTER_DIFF: Layout = &[F::word("diff", 1)];
const FRAME_CONTROL: Layout = &[
    F::bits("tmz", 1, 0, 0),
    F::bits("command", 1, 28, 31).symbols(FRAME_COMMAND),
];
const INVALIDATE_TLBS: Layout = &[
    F::bits("dst_sel", 1, 0, 0),
    F::bits("all_hub", 1, 4, 4),
    F::bits("pasid", 1, 5, 20),
    F::bits("flush_type", 1, 25, 27),
];
const SET_RESOURCES: Layout = &[
    F::bits("vmid_mask", 1, 0, 15).radix(Radix::Hex),
    F::bits("unmap_latency", 1, 16, 23),
    F::bits("queue_type", 1, 29, 31).symbols(QUEUE_TYPE),
    F::wide("queue_mask", 2),
    F::wide("gws_mask", 4),
    F::bits("oac_mask", 6, 0, 15).radix(Radix::Hex),
    F::bits("gds_heap_base", 7, 0, 10).radix(Radix::Hex),
    F::bits("gds_heap_size", 7, 11, 22),
];
const MAP_PROCESS: Layout = &[
    F::bits("pasid", 1, 0, 15),
    F::bits("debug_vmid", 1, 18, 21),
    F::bits("debug_flag", 1, 22, 22),
    F::bits("tmz", 1, 23, 23),
    F::bits("diq_enable", 1, 24, 24),
    F::bits("process_quantum", 1, 25, 31),
    F::wide("page_table_base", 2),
    F::hex("sh_mem_bases", 4),
    F::hex("sh_mem_config", 5),
];
const MAP_QUEUES: Layout = &[
    F::bits("queue_sel", 1, 4, 5),
    F::bits("vmid", 1, 8, 11),
    F::bits("queue", 1, 13, 15),
    F::bits("pipe", 1, 16, 17),
    F::bits("me", 1, 18, 19),
    F::bits("queue_type", 1, 21, 23).symbols(QUEUE_TYPE),
    F::bits("alloc_format", 1, 24, 25),
    F::bits("engine_sel", 1, 26, 28).symbols(KIQ_ENGINE),
    F::bits("num_queues", 1, 29, 31),
    F::bits("doorbell_offset", 2, 2, 27).radix(Radix::Hex),
    F::address("mqd_address", 3, 4, 32, 2),
    F::address("wptr_address", 5, 6, 32, 2),
];
const UNMAP_QUEUES: Layout = &[
    F::bits("action", 1, 0, 1).symbols(UNMAP_ACTION),
    F::bits("queue_sel", 1, 4, 5),
    F::bits("engine_sel", 1, 26, 28).symbols(KIQ_ENGINE),
    F::bits("num_queues", 1, 29, 31),
    F::bits("pasid", 2, 0, 15).when(1, 4, 5, 1),
    F::bits("doorbell_offset0", 2, 2, 27).radix(Radix::Hex).unless(1, 4, 5, 1),
    F::bits("doorbell_offset1", 3, 2, 27).radix(Radix::Hex),
    F::bits("doorbell_offset2", 4, 2, 27).radix(Radix::Hex),
    F::bits("doorbell_offset3", 5, 2, 27).radix(Radix::Hex),
];
const QUERY_STATUS: Layout = &[
    F::bits("context_id", 1, 0, 27).radix(Radix::Hex),
    F::bits("interrupt_sel", 1, 28, 29),
    F::bits("command", 1, 30, 31),
    F::bits("pasid", 2, 0, 15),
    F::bits("engine_sel", 2, 26, 28).symbols(KIQ_ENGINE),
    F::address("address", 3, 4, 16, 3),
    F::wide("data", 5),
];
const RUN_LIST: Layout = &[
    F::address("ib_base", 1, 2, 16, 2),
    F::bits("ib_size", 3, 0, 19),
    F::bits("chain", 3, 20, 20),
    F::bits("offload_polling", 3, 21, 21),
    F::bits("valid", 3, 23, 23),
    F::bits("process_cnt", 3, 24, 27),
];

const IB_REFERENCE: ReferenceSpec = ReferenceSpec {
    lo: 1,
    hi: 2,
    hi_bits: 16,
    align: 2,
    size_word: 3,
    size_lo: 0,
    size_hi: 19,
    vmid: VmidSource::Bits {
        word: 3,
        lo: 24,
        hi: 27,
    },
};

const fn op(opcode: u32, name: &'static str, layout: Layout) -> OpcodeEntry {
    OpcodeEntry::new(opcode, 0, name, PacketLength::SelfDescribing).fields(layout)
}

/// Type-3 opcodes with known field layouts.
pub const OPCODES: &[OpcodeEntry] = &[
    op(0x10, "NOP", NOP),
    op(0x11, "SET_BASE", SET_BASE),
    op(0x12, "CLEAR_STATE", CLEAR_STATE),
    op(0x13, "INDEX_BUFFER_SIZE", INDEX_BUFFER_SIZE),
    op(0x15, "DISPATCH_DIRECT", DISPATCH_DIRECT),
    op(0x16, "DISPATCH_INDIRECT", DISPATCH_INDIRECT),
    op(0x1E, "ATOMIC_MEM", ATOMIC_MEM),
    op(0x1F, "OCCLUSION_QUERY", OCCLUSION_QUERY),
    op(0x20, "SET_PREDICATION", SET_PREDICATION),
    op(0x21, "REG_RMW", REG_RMW),
    op(0x22, "COND_EXEC", COND_EXEC),
    op(0x23, "PRED_EXEC", PRED_EXEC),
    op(0x24, "DRAW_INDIRECT", DRAW_INDIRECT),
    op(0x25, "DRAW_INDEX_INDIRECT", DRAW_INDIRECT),
    op(0x26, "INDEX_BASE", INDEX_BASE),
    op(0x27, "DRAW_INDEX_2", DRAW_INDEX_2),
    op(0x28, "CONTEXT_CONTROL", CONTEXT_CONTROL),
    op(0x2A, "INDEX_TYPE", INDEX_TYPE_LAYOUT),
    op(0x2C, "DRAW_INDIRECT_MULTI", DRAW_INDIRECT_MULTI),
    op(0x2D, "DRAW_INDEX_AUTO", DRAW_INDEX_AUTO),
    op(0x2F, "NUM_INSTANCES", NUM_INSTANCES),
    op(0x30, "DRAW_INDEX_MULTI_AUTO", NOP),
    op(OP_INDIRECT_BUFFER_CONST as u32, "INDIRECT_BUFFER_CONST", INDIRECT_BUFFER)
        .reference(IB_REFERENCE),
    op(0x34, "STRMOUT_BUFFER_UPDATE", STRMOUT_BUFFER_UPDATE),
    op(0x35, "DRAW_INDEX_OFFSET_2", DRAW_INDEX_OFFSET_2),
    op(0x37, "WRITE_DATA", WRITE_DATA),
    op(0x38, "DRAW_INDEX_INDIRECT_MULTI", DRAW_INDIRECT_MULTI),
    op(0x39, "MEM_SEMAPHORE", MEM_SEMAPHORE),
    op(0x3C, "WAIT_REG_MEM", WAIT_REG_MEM),
    op(OP_INDIRECT_BUFFER as u32, "INDIRECT_BUFFER", INDIRECT_BUFFER).reference(IB_REFERENCE),
    op(0x40, "COPY_DATA", COPY_DATA),
    op(0x42, "PFP_SYNC_ME", PFP_SYNC_ME),
    op(0x43, "SURFACE_SYNC", SURFACE_SYNC),
    op(0x45, "COND_WRITE", COND_WRITE),
    op(0x46, "EVENT_WRITE", EVENT_WRITE),
    op(0x47, "EVENT_WRITE_EOP", EVENT_WRITE_EOP),
    op(0x48, "EVENT_WRITE_EOS", EVENT_WRITE_EOS),
    op(0x49, "RELEASE_MEM", RELEASE_MEM),
    op(0x4A, "PREAMBLE_CNTL", PREAMBLE_CNTL),
    op(0x50, "DMA_DATA", DMA_DATA),
    op(0x51, "CONTEXT_REG_RMW", CONTEXT_REG_RMW),
    op(0x58, "ACQUIRE_MEM", ACQUIRE_MEM),
    op(0x5E, "LOAD_UCONFIG_REG", &LOAD_UCONFIG_REG),
    op(0x5F, "LOAD_SH_REG", &LOAD_SH_REG),
    op(0x60, "LOAD_CONFIG_REG", &LOAD_CONFIG_REG),
    op(0x61, "LOAD_CONTEXT_REG", &LOAD_CONTEXT_REG),
    op(0x68, "SET_CONFIG_REG", &SET_CONFIG_REG),
    op(0x69, "SET_CONTEXT_REG", &SET_CONTEXT_REG),
    op(0x76, "SET_SH_REG", &SET_SH_REG),
    op(0x77, "SET_SH_REG_OFFSET", SET_SH_REG_OFFSET),
    op(0x79, "SET_UCONFIG_REG", &SET_UCONFIG_REG),
    op(0x80, "LOAD_CONST_RAM", LOAD_CONST_RAM),
    op(0x81, "WRITE_CONST_RAM", WRITE_CONST_RAM),
    op(0x83, "DUMP_CONST_RAM", DUMP_CONST_RAM),
    op(0x84, "INCREMENT_CE_COUNTER", INCREMENT_CE_COUNTER),
    op(0x85, "INCREMENT_DE_COUNTER", DUMMY),
    op(0x86, "WAIT_ON_CE_COUNTER", WAIT_ON_CE_COUNTER),
    op(0x88, "WAIT_ON_DE_COUNTER_DIFF", WAIT_ON_DE_COUNTER_DIFF),
    op(0x8B, "SWITCH_BUFFER", DUMMY),
    op(0x90, "FRAME_CONTROL", FRAME_CONTROL),
    op(0x98, "INVALIDATE_TLBS", INVALIDATE_TLBS),
    op(0xA0, "SET_RESOURCES", SET_RESOURCES),
    op(0xA1, "MAP_PROCESS", MAP_PROCESS),
    op(0xA2, "MAP_QUEUES", MAP_QUEUES),
    op(0xA3, "UNMAP_QUEUES", UNMAP_QUEUES),
    op(0xA4, "QUERY_STATUS", QUERY_STATUS),
    op(0xA5, "RUN_LIST", RUN_LIST),
];

/// Register space a `SET_*_REG` opcode writes into.
#[must_use]
pub const fn set_reg_space(opcode: u8) -> Option<u32> {
    match opcode {
        0x68 => Some(CONFIG_SPACE),
        0x69 => Some(CONTEXT_SPACE),
        0x76 => Some(SH_SPACE),
        0x79 => Some(UCONFIG_SPACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(type3(0x10, 1), Pm4Type::Type3, 3)]
    #[case(type3(0x3F, 4), Pm4Type::Type3, 6)]
    #[case(type0(0x2C08, 2), Pm4Type::Type0, 4)]
    #[case(TYPE2, Pm4Type::Type2, 1)]
    #[case(0x4000_0000, Pm4Type::Type1, 1)]
    fn header_lengths(#[case] word: u32, #[case] ty: Pm4Type, #[case] total: usize) {
        let header = Pm4Header::from_word(word);
        assert_eq!(header.packet_type(), ty);
        assert_eq!(header.total_words(), total);
    }

    #[test]
    fn type3_fields_extracted() {
        let header = Pm4Header::from_word(type3(0x76, 3) | 0b11);
        assert_eq!(header.opcode_byte(), 0x76);
        assert_eq!(header.count(), 2);
        assert_eq!(header.shader_type(), 1);
        assert_eq!(header.predicate(), 1);
        assert_eq!(header.name(), "SET_SH_REG");
    }

    #[test]
    fn unknown_type3_opcode_still_has_length() {
        let header = Pm4Header::from_word(type3(0xEE, 5));
        assert_eq!(header.name(), "UNKNOWN");
        assert_eq!(header.total_words(), 6);
        assert!(header.entry().is_none());
    }

    #[test]
    fn indirect_buffers_carry_references() {
        for opcode in [OP_INDIRECT_BUFFER, OP_INDIRECT_BUFFER_CONST] {
            let header = Pm4Header::from_word(type3(opcode, 3));
            assert!(header.entry().and_then(|e| e.reference).is_some());
        }
    }

    #[test]
    fn event_table_covers_six_bit_range() {
        for value in 0..0x40 {
            assert!(super::super::symbol(EVENT_TYPES, value).is_some());
        }
    }

    #[test]
    fn set_reg_spaces() {
        assert_eq!(set_reg_space(0x76), Some(SH_SPACE));
        assert_eq!(set_reg_space(0x69), Some(CONTEXT_SPACE));
        assert_eq!(set_reg_space(0x10), None);
    }
}
