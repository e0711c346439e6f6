//! Scheduler firmware API frames (MES and UMSCH).
//!
//! Every frame is a fixed 64-dword record whose header names an API type
//! and opcode. Only scheduler-type frames are tabled.

use super::{bits, FieldSpec as F, Layout, OpcodeEntry, PacketLength, SymbolTable};
use crate::arena::PacketHeader;

/// Dwords in every scheduler API frame.
pub const API_FRAME_DWORDS: usize = 64;

/// API type of scheduler frames.
pub const API_TYPE_SCHEDULER: u32 = 1;

/// Decoded scheduler API header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedHeader {
    raw: u32,
}

impl SchedHeader {
    /// API type, bits 3:0.
    #[must_use]
    pub const fn api_type(self) -> u32 {
        bits(self.raw, 0, 3)
    }

    /// API opcode, bits 11:4.
    #[must_use]
    pub const fn api_opcode(self) -> u32 {
        bits(self.raw, 4, 11)
    }

    /// Declared frame size in dwords, bits 19:12.
    #[must_use]
    pub const fn dwsize(self) -> u32 {
        bits(self.raw, 12, 19)
    }
}

impl PacketHeader for SchedHeader {
    fn from_word(word: u32) -> Self {
        Self { raw: word }
    }

    fn raw(&self) -> u32 {
        self.raw
    }

    fn opcode(&self) -> u32 {
        self.api_opcode()
    }

    fn sub_opcode(&self) -> u32 {
        self.api_type()
    }
}

/// Builds a scheduler-type API header.
#[must_use]
pub const fn header(opcode: u32) -> u32 {
    ((API_FRAME_DWORDS as u32 & 0xFF) << 12) | ((opcode & 0xFF) << 4) | API_TYPE_SCHEDULER
}

/// MES queue types.
pub const MES_QUEUE_TYPE: SymbolTable = &[
    (0, "GFX"),
    (1, "COMPUTE"),
    (2, "SDMA"),
    (3, "MAX"),
];

/// MES `MISC` sub-operations.
pub const MISC_OPCODES: SymbolTable = &[
    (0, "WRITE_REG"),
    (1, "INV_GART"),
    (2, "QUERY_STATUS"),
    (3, "READ_REG"),
    (4, "WAIT_REG_MEM"),
    (5, "SET_SHADER_DEBUGGER"),
];

/// UMSCH engine types.
pub const UMSCH_ENGINE_TYPE: SymbolTable = &[(0, "VCN0"), (1, "VCN1"), (2, "VCN"), (3, "VPE")];

const MES_SET_HW_RSRC: Layout = &[
    F::hex("vmid_mask_mmhub", 1),
    F::hex("vmid_mask_gfxhub", 2),
    F::hex("gds_size", 3),
    F::word("paging_vmid", 4),
    F::array("compute_hqd_mask", 5, 8),
    F::array("gfx_hqd_mask", 13, 2),
    F::array("sdma_hqd_mask", 15, 2),
    F::array("aggregated_doorbells", 17, 5),
    F::wide("g_sch_ctx_gpu_mc_ptr", 22),
    F::wide("query_status_fence_gpu_mc_ptr", 24),
];
const MES_SET_SCHEDULING_CONFIG: Layout = &[
    F::array("grace_period_other_levels", 1, 5),
    F::array("process_quantum_for_level", 6, 5),
    F::array("process_grace_period_same_level", 11, 5),
    F::word("normal_yield_percent", 16),
];
const MES_ADD_QUEUE: Layout = &[
    F::word("process_id", 1),
    F::wide("page_table_base_addr", 2),
    F::wide("process_va_start", 4),
    F::wide("process_va_end", 6),
    F::wide("process_quantum", 8),
    F::wide("process_context_addr", 10),
    F::wide("gang_quantum", 12),
    F::wide("gang_context_addr", 14),
    F::word("inprocess_gang_priority", 16),
    F::word("gang_global_priority_level", 17),
    F::hex("doorbell_offset", 18),
    F::wide("mqd_addr", 19),
    F::wide("wptr_addr", 21),
    F::wide("h_context", 23),
    F::wide("h_queue", 25),
    F::word("queue_type", 27).symbols(MES_QUEUE_TYPE),
    F::hex("gws_base", 28),
    F::hex("gws_size", 29),
    F::hex("oa_mask", 30),
    F::wide("trap_handler_addr", 31),
    F::hex("vm_context_cntl", 33),
];
const MES_REMOVE_QUEUE: Layout = &[
    F::hex("doorbell_offset", 1),
    F::wide("gang_context_addr", 2),
    F::bits("unmap_legacy_gfx_queue", 4, 0, 0),
    F::bits("unmap_kiq_utility_queue", 4, 1, 1),
    F::bits("preempt_legacy_gfx_queue", 4, 2, 2),
    F::word("pipe_id", 5),
    F::word("queue_id", 6),
    F::wide("tf_addr", 7),
    F::hex("tf_data", 9),
    F::word("queue_type", 10).symbols(MES_QUEUE_TYPE),
];
const MES_SUSPEND: Layout = &[
    F::bits("suspend_all_gangs", 1, 0, 0),
    F::wide("gang_context_addr", 2),
    F::wide("suspend_fence_addr", 4),
    F::hex("suspend_fence_value", 6),
    F::hex("doorbell_offset", 7),
];
const MES_RESUME: Layout = &[
    F::bits("resume_all_gangs", 1, 0, 0),
    F::wide("gang_context_addr", 2),
    F::hex("doorbell_offset", 4),
];
const MES_RESET: Layout = &[
    F::bits("reset_queue_only", 1, 0, 0),
    F::bits("hang_detect_then_reset", 1, 1, 1),
    F::bits("hang_detect_only", 1, 2, 2),
    F::bits("reset_legacy_gfx", 1, 3, 3),
    F::hex("doorbell_offset", 2),
    F::wide("gang_context_addr", 3),
    F::word("pipe_id", 5),
    F::word("queue_id", 6),
    F::word("vmid_id", 7),
    F::word("queue_type", 8).symbols(MES_QUEUE_TYPE),
];
const MES_SET_LOG_BUFFER: Layout = &[
    F::wide("log_buffer_addr", 1),
    F::hex("log_buffer_size", 3),
];
const MES_QUERY_STATUS: Layout = &[
    F::wide("api_completion_fence_addr", 1),
    F::wide("api_completion_fence_value", 3),
];
const MES_MISC: Layout = &[
    F::word("misc_opcode", 1).symbols(MISC_OPCODES),
    F::register("reg_offset", 2, 0, 31, 0).when(1, 0, 31, 0),
    F::hex("reg_value", 3).when(1, 0, 31, 0),
    F::register("reg_offset", 2, 0, 31, 0).when(1, 0, 31, 3),
    F::wide("buffer_addr", 3).when(1, 0, 31, 3),
    F::register("reg_offset", 2, 0, 31, 0).when(1, 0, 31, 4),
    F::hex("reference", 3).when(1, 0, 31, 4),
    F::hex("mask", 4).when(1, 0, 31, 4),
];

const fn frame(opcode: u32, name: &'static str) -> OpcodeEntry {
    OpcodeEntry::new(
        opcode,
        API_TYPE_SCHEDULER,
        name,
        PacketLength::Fixed(API_FRAME_DWORDS),
    )
}

/// MES scheduler API frames.
pub const MES_OPCODES: &[OpcodeEntry] = &[
    frame(0, "SET_HW_RSRC").fields(MES_SET_HW_RSRC),
    frame(1, "SET_SCHEDULING_CONFIG").fields(MES_SET_SCHEDULING_CONFIG),
    frame(2, "ADD_QUEUE").fields(MES_ADD_QUEUE),
    frame(3, "REMOVE_QUEUE").fields(MES_REMOVE_QUEUE),
    frame(4, "PERFORM_YIELD"),
    frame(5, "SET_GANG_PRIORITY_LEVEL"),
    frame(6, "SUSPEND").fields(MES_SUSPEND),
    frame(7, "RESUME").fields(MES_RESUME),
    frame(8, "RESET").fields(MES_RESET),
    frame(9, "SET_LOG_BUFFER").fields(MES_SET_LOG_BUFFER),
    frame(10, "CHANGE_GANG_PRIORITY"),
    frame(11, "QUERY_SCHEDULER_STATUS").fields(MES_QUERY_STATUS),
    frame(12, "PROGRAM_GDS"),
    frame(13, "SET_DEBUG_VMID"),
    frame(14, "MISC").fields(MES_MISC),
    frame(15, "UPDATE_ROOT_PAGE_TABLE"),
    frame(16, "AMD_LOG"),
];

const UMSCH_SET_HW_RSRC: Layout = &[
    F::hex("vmid_mask_mm_vcn", 1),
    F::hex("vmid_mask_mm_vpe", 2),
    F::hex("collaboration_mask_vpe", 3),
    F::hex("engine_mask", 4),
    F::word("logging_vmid", 5),
    F::array("vcn0_hqd_mask", 6, 2),
    F::array("vcn1_hqd_mask", 8, 2),
    F::array("vpe_hqd_mask", 10, 2),
    F::wide("g_sch_ctx_gpu_mc_ptr", 12),
];
const UMSCH_ADD_QUEUE: Layout = &[
    F::word("process_id", 1),
    F::wide("page_table_base_addr", 2),
    F::wide("process_va_start", 4),
    F::wide("process_va_end", 6),
    F::wide("process_quantum", 8),
    F::wide("process_csa_addr", 10),
    F::wide("context_quantum", 12),
    F::wide("context_csa_addr", 14),
    F::word("inprocess_context_priority", 16),
    F::word("context_global_priority_level", 17),
    F::hex("doorbell_offset_0", 18),
    F::hex("doorbell_offset_1", 19),
    F::hex("affinity", 20),
    F::wide("mqd_addr", 21),
    F::wide("h_context", 23),
    F::wide("h_queue", 25),
    F::word("engine_type", 27).symbols(UMSCH_ENGINE_TYPE),
    F::hex("vm_context_cntl", 28),
];
const UMSCH_REMOVE_QUEUE: Layout = &[
    F::hex("doorbell_offset_0", 1),
    F::hex("doorbell_offset_1", 2),
    F::wide("context_csa_addr", 3),
];
const UMSCH_SUSPEND: Layout = &[
    F::wide("context_csa_addr", 1),
    F::wide("suspend_fence_addr", 3),
    F::hex("suspend_fence_value", 5),
];
const UMSCH_RESUME: Layout = &[F::wide("context_csa_addr", 1)];
const UMSCH_RESET: Layout = &[
    F::hex("doorbell_offset", 1),
    F::word("engine_type", 2).symbols(UMSCH_ENGINE_TYPE),
];

/// UMSCH scheduler API frames.
pub const UMSCH_OPCODES: &[OpcodeEntry] = &[
    frame(0, "SET_HW_RSRC").fields(UMSCH_SET_HW_RSRC),
    frame(1, "SET_SCHEDULING_CONFIG"),
    frame(2, "ADD_QUEUE").fields(UMSCH_ADD_QUEUE),
    frame(3, "REMOVE_QUEUE").fields(UMSCH_REMOVE_QUEUE),
    frame(4, "PERFORM_YIELD"),
    frame(5, "SUSPEND").fields(UMSCH_SUSPEND),
    frame(6, "RESUME").fields(UMSCH_RESUME),
    frame(7, "RESET").fields(UMSCH_RESET),
    frame(8, "SET_LOG_BUFFER").fields(MES_SET_LOG_BUFFER),
    frame(9, "CHANGE_CONTEXT_PRIORITY_LEVEL"),
    frame(10, "QUERY_SCHEDULER_STATUS").fields(MES_QUERY_STATUS),
    frame(11, "UPDATE_AFFINITY"),
];
