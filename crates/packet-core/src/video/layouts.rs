//! Byte layouts of the video decode firmware messages.
//!
//! Fields are packed in declaration order; explicit `reserved_*` members
//! stand in for the firmware structures' padding.

use crate::present::Radix;

/// Scalar type of one message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    /// Unsigned byte.
    U8,
    /// Signed byte.
    I8,
    /// Unsigned little-endian half word.
    U16,
    /// Signed little-endian half word.
    I16,
    /// Unsigned little-endian word.
    U32,
    /// Signed little-endian word.
    I32,
}

impl MsgType {
    /// Width in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 => 4,
        }
    }

    /// Whether values are sign-extended.
    #[must_use]
    pub const fn signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32)
    }
}

/// Scalar or fixed array of scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgField {
    /// Field name; arrays emit `name[i]`.
    pub name: &'static str,
    /// Element type.
    pub ty: MsgType,
    /// Element count; 1 for scalars.
    pub count: usize,
    /// Display hint.
    pub radix: Radix,
}

impl MsgField {
    /// Bytes occupied by the field.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.ty.size() * self.count
    }
}

/// One layout item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgItem {
    /// A scalar or fixed array.
    Field(MsgField),
    /// A fixed number of repeated records; members emit `name[i].member`.
    Group {
        /// Group name.
        name: &'static str,
        /// Repetitions.
        count: usize,
        /// Members of one repetition.
        fields: &'static [MsgField],
    },
    /// Records repeated as many times as an earlier field says, capped at `max`.
    Bounded {
        /// Group name.
        name: &'static str,
        /// Scalar holding the repetition count.
        count_field: &'static str,
        /// Largest accepted count.
        max: usize,
        /// Members of one repetition.
        fields: &'static [MsgField],
    },
}

/// A message body layout.
pub type MsgLayout = &'static [MsgItem];

const fn record_size(fields: &[MsgField]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < fields.len() {
        total += fields[i].size();
        i += 1;
    }
    total
}

impl MsgItem {
    /// Bytes of one repetition of a group; the whole size for plain fields.
    #[must_use]
    pub const fn record_size(&self) -> usize {
        match self {
            Self::Field(field) => field.size(),
            Self::Group { fields, .. } | Self::Bounded { fields, .. } => record_size(fields),
        }
    }
}

/// Bytes a layout occupies when every bounded group repeats `bounded` times.
#[must_use]
pub const fn layout_size(layout: MsgLayout, bounded: usize) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < layout.len() {
        total += match &layout[i] {
            MsgItem::Field(field) => field.size(),
            MsgItem::Group { count, fields, .. } => *count * record_size(fields),
            MsgItem::Bounded { fields, .. } => bounded * record_size(fields),
        };
        i += 1;
    }
    total
}

const fn scalar(name: &'static str, ty: MsgType, count: usize, radix: Radix) -> MsgField {
    MsgField {
        name,
        ty,
        count,
        radix,
    }
}

const fn u8f(name: &'static str) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::U8, 1, Radix::Decimal))
}
const fn i8f(name: &'static str) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::I8, 1, Radix::Signed))
}
const fn u16f(name: &'static str) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::U16, 1, Radix::Decimal))
}
const fn u32f(name: &'static str) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::U32, 1, Radix::Decimal))
}
const fn i32f(name: &'static str) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::I32, 1, Radix::Signed))
}
const fn hex32(name: &'static str) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::U32, 1, Radix::Hex))
}
const fn u8a(name: &'static str, count: usize) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::U8, count, Radix::Decimal))
}
const fn i8a(name: &'static str, count: usize) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::I8, count, Radix::Signed))
}
const fn u16a(name: &'static str, count: usize) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::U16, count, Radix::Decimal))
}
const fn u32a(name: &'static str, count: usize) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::U32, count, Radix::Decimal))
}
const fn hex32a(name: &'static str, count: usize) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::U32, count, Radix::Hex))
}
const fn i32a(name: &'static str, count: usize) -> MsgItem {
    MsgItem::Field(scalar(name, MsgType::I32, count, Radix::Signed))
}

/// Message buffer header.
pub const HEADER: MsgLayout = &[
    u32f("header_size"),
    u32f("total_size"),
    u32f("num_buffers"),
    u32f("msg_type"),
    hex32("stream_handle"),
    u32f("status_report_feedback_number"),
];

/// One index entry following the header.
pub const INDEX_ENTRY: &[MsgField] = &[
    scalar("message_id", MsgType::U32, 1, Radix::Hex),
    scalar("offset", MsgType::U32, 1, Radix::Hex),
    scalar("size", MsgType::U32, 1, Radix::Decimal),
    scalar("filled", MsgType::U32, 1, Radix::Decimal),
];

/// Session creation message.
pub const CREATE: MsgLayout = &[
    u32f("stream_type"),
    hex32("session_flags"),
    u32f("width_in_samples"),
    u32f("height_in_samples"),
];

/// Content protection message.
pub const DRM: MsgLayout = &[
    hex32a("drm_key", 4),
    hex32a("drm_counter", 4),
    hex32("drm_cntl"),
    u32f("drm_offset"),
];

/// Decode target message.
pub const DECODE: MsgLayout = &[
    u32f("stream_type"),
    hex32("decode_flags"),
    u32f("width_in_samples"),
    u32f("height_in_samples"),
    u32f("bsd_size"),
    u32f("dpb_size"),
    u32f("dt_size"),
    u32f("sct_size"),
    u32f("sc_coeff_size"),
    u32f("hw_ctxt_size"),
    u32f("sw_ctxt_size"),
    u32f("pic_param_size"),
    u32f("mb_cntl_size"),
    hex32a("reserved0", 4),
    hex32("decode_buffer_flags"),
    u32f("db_pitch"),
    u32f("db_aligned_height"),
    u32f("db_tiling_mode"),
    u32f("db_swizzle_mode"),
    u32f("db_array_mode"),
    u32f("db_field_mode"),
    hex32("db_surf_tile_config"),
    u32f("dt_pitch"),
    u32f("dt_uv_pitch"),
    u32f("dt_tiling_mode"),
    u32f("dt_swizzle_mode"),
    u32f("dt_array_mode"),
    u32f("dt_field_mode"),
    u32f("dt_out_format"),
    hex32("dt_surf_tile_config"),
    hex32("dt_uv_surf_tile_config"),
    hex32("dt_luma_top_offset"),
    hex32("dt_luma_bottom_offset"),
    hex32("dt_chroma_top_offset"),
    hex32("dt_chroma_bottom_offset"),
    hex32("dt_chromav_top_offset"),
    hex32("dt_chromav_bottom_offset"),
    u8a("dpb_ref_array_slice", 16),
    u8f("dpb_cur_array_slice"),
    u8a("dpb_reserved", 3),
];

/// H.264 parameters.
pub const AVC: MsgLayout = &[
    u32f("profile"),
    u32f("level"),
    hex32("sps_info_flags"),
    hex32("pps_info_flags"),
    u8f("chroma_format"),
    u8f("bit_depth_luma_minus8"),
    u8f("bit_depth_chroma_minus8"),
    u8f("log2_max_frame_num_minus4"),
    u8f("pic_order_cnt_type"),
    u8f("log2_max_pic_order_cnt_lsb_minus4"),
    u8f("num_ref_frames"),
    u8f("reserved_8bit"),
    i8f("pic_init_qp_minus26"),
    i8f("pic_init_qs_minus26"),
    i8f("chroma_qp_index_offset"),
    i8f("second_chroma_qp_index_offset"),
    u8f("num_slice_groups_minus1"),
    u8f("slice_group_map_type"),
    u8f("num_ref_idx_l0_active_minus1"),
    u8f("num_ref_idx_l1_active_minus1"),
    u16f("slice_group_change_rate_minus1"),
    u16f("reserved_16bit_1"),
    u8a("scaling_list_4x4", 96),
    u8a("scaling_list_8x8", 128),
    u32f("frame_num"),
    u32a("frame_num_list", 16),
    i32a("curr_field_order_cnt_list", 2),
    i32a("field_order_cnt_list", 32),
    u32f("decoded_pic_idx"),
    u32f("curr_pic_ref_frame_num"),
    u8a("ref_frame_list", 16),
    hex32a("reserved", 122),
];

/// VC-1 parameters.
pub const VC1: MsgLayout = &[
    u32f("profile"),
    u32f("level"),
    hex32("sps_info_flags"),
    hex32("pps_info_flags"),
    u32f("pic_structure"),
    u32f("chroma_format"),
    u16f("decoded_pic_idx"),
    u16f("deblocked_pic_idx"),
    u16f("forward_ref_idx"),
    u16f("backward_ref_idx"),
    u32f("cached_frame_flag"),
];

/// MPEG-2 parameters.
pub const MPEG2_VLD: MsgLayout = &[
    u32f("decoded_pic_idx"),
    u32f("forward_ref_pic_idx"),
    u32f("backward_ref_pic_idx"),
    u8f("load_intra_quantiser_matrix"),
    u8f("load_nonintra_quantiser_matrix"),
    u8a("reserved_quantiser_alignment", 2),
    u8a("intra_quantiser_matrix", 64),
    u8a("nonintra_quantiser_matrix", 64),
    u8f("profile_and_level_indication"),
    u8f("chroma_format"),
    u8f("picture_coding_type"),
    u8f("reserved_1"),
    u8a("f_code", 4),
    u8f("intra_dc_precision"),
    u8f("pic_structure"),
    u8f("top_field_first"),
    u8f("frame_pred_frame_dct"),
    u8f("concealment_motion_vectors"),
    u8f("q_scale_type"),
    u8f("intra_vlc_format"),
    u8f("alternate_scan"),
];

/// MPEG-4 part 2 parameters.
pub const MPEG4_ASP_VLD: MsgLayout = &[
    u32f("decoded_pic_idx"),
    u32f("forward_ref_pic_idx"),
    u32f("backward_ref_pic_idx"),
    u32f("variant_type"),
    u8f("profile_and_level_indication"),
    u8f("video_object_layer_verid"),
    u8f("video_object_layer_shape"),
    u8f("reserved_1"),
    u16f("video_object_layer_width"),
    u16f("video_object_layer_height"),
    u16f("vop_time_increment_resolution"),
    u16f("reserved_2"),
    hex32("flags"),
    u8f("quant_type"),
    u8a("reserved_3", 3),
    u8a("intra_quant_mat", 64),
    u8a("nonintra_quant_mat", 64),
];

/// H.265 parameters.
pub const HEVC: MsgLayout = &[
    hex32("sps_info_flags"),
    hex32("pps_info_flags"),
    u8f("chroma_format"),
    u8f("bit_depth_luma_minus8"),
    u8f("bit_depth_chroma_minus8"),
    u8f("log2_max_pic_order_cnt_lsb_minus4"),
    u8f("sps_max_dec_pic_buffering_minus1"),
    u8f("log2_min_luma_coding_block_size_minus3"),
    u8f("log2_diff_max_min_luma_coding_block_size"),
    u8f("log2_min_transform_block_size_minus2"),
    u8f("log2_diff_max_min_transform_block_size"),
    u8f("max_transform_hierarchy_depth_inter"),
    u8f("max_transform_hierarchy_depth_intra"),
    u8f("pcm_sample_bit_depth_luma_minus1"),
    u8f("pcm_sample_bit_depth_chroma_minus1"),
    u8f("log2_min_pcm_luma_coding_block_size_minus3"),
    u8f("log2_diff_max_min_pcm_luma_coding_block_size"),
    u8f("num_extra_slice_header_bits"),
    u8f("num_short_term_ref_pic_sets"),
    u8f("num_long_term_ref_pic_sps"),
    u8f("num_ref_idx_l0_default_active_minus1"),
    u8f("num_ref_idx_l1_default_active_minus1"),
    i8f("pps_cb_qp_offset"),
    i8f("pps_cr_qp_offset"),
    i8f("pps_beta_offset_div2"),
    i8f("pps_tc_offset_div2"),
    u8f("diff_cu_qp_delta_depth"),
    u8f("num_tile_columns_minus1"),
    u8f("num_tile_rows_minus1"),
    u8f("log2_parallel_merge_level_minus2"),
    u16a("column_width_minus1", 19),
    u16a("row_height_minus1", 21),
    i8f("init_qp_minus26"),
    u8f("num_delta_pocs_ref_rps_idx"),
    u8f("curr_idx"),
    u8f("reserved_1"),
    i32f("curr_poc"),
    u8a("ref_pic_list", 16),
    i32a("poc_list", 16),
    u8a("ref_pic_set_st_curr_before", 8),
    u8a("ref_pic_set_st_curr_after", 8),
    u8a("ref_pic_set_lt_curr", 8),
    u8a("scaling_list_dc_coef_size_id2", 6),
    u8a("scaling_list_dc_coef_size_id3", 2),
    u8f("highest_tid"),
    u8f("is_non_ref"),
    u8f("p010_mode"),
    u8f("msb_mode"),
    u8f("luma_10to8"),
    u8f("chroma_10to8"),
    u8a("hevc_reserved", 2),
    u8a("direct_reflist", 30),
    u8a("reserved_2", 2),
    u32f("st_rps_bits"),
];

/// VP9 parameters.
pub const VP9: MsgLayout = &[
    hex32("frame_header_flags"),
    u8f("frame_context_idx"),
    u8f("reset_frame_context"),
    u8f("curr_pic_idx"),
    u8f("interp_filter"),
    u8f("filter_level"),
    u8f("sharpness_level"),
    u8a("lf_adj_level", 64),
    u8f("base_qindex"),
    i8f("y_dc_delta_q"),
    i8f("uv_ac_delta_q"),
    i8f("uv_dc_delta_q"),
    u8f("log2_tile_cols"),
    u8f("log2_tile_rows"),
    u8f("tx_mode"),
    u8f("reference_mode"),
    u8f("chroma_format"),
    u8a("ref_frame_map", 8),
    u8a("frame_refs", 3),
    u8a("ref_frame_sign_bias", 3),
    u8f("frame_to_show"),
    u8f("bit_depth_luma_minus8"),
    u8f("bit_depth_chroma_minus8"),
    u8f("p010_mode"),
    u8f("msb_mode"),
    u8f("luma_10to8"),
    u8f("chroma_10to8"),
    u32f("vp9_frame_size"),
    u32f("compressed_header_size"),
    u32f("uncompressed_header_size"),
];

const DPB_SURFACE: &[MsgItem] = &[
    hex32("dpb_config_flags"),
    u32f("dpb_luma_pitch"),
    u32f("dpb_luma_aligned_height"),
    u32f("dpb_luma_aligned_size"),
    u32f("dpb_chroma_pitch"),
    u32f("dpb_chroma_aligned_height"),
    u32f("dpb_chroma_aligned_size"),
];

/// Dynamic DPB with array slices and offsets.
pub const DYNAMIC_DPB: MsgLayout = &[
    DPB_SURFACE[0],
    DPB_SURFACE[1],
    DPB_SURFACE[2],
    DPB_SURFACE[3],
    DPB_SURFACE[4],
    DPB_SURFACE[5],
    DPB_SURFACE[6],
    u8f("dpb_array_size"),
    u8f("dpb_cur_array_slice"),
    u8a("dpb_ref_array_slice", 16),
    u8a("dpb_reserved0", 2),
    hex32("dpb_curr_offset"),
    hex32a("dpb_addr_offset", 16),
];

const DPB_ADDRESS: &[MsgField] = &[
    scalar("luma_addr_lo", MsgType::U32, 1, Radix::Hex),
    scalar("luma_addr_hi", MsgType::U32, 1, Radix::Hex),
    scalar("chroma_addr_lo", MsgType::U32, 1, Radix::Hex),
    scalar("chroma_addr_hi", MsgType::U32, 1, Radix::Hex),
];

/// Dynamic DPB with explicit surface addresses.
pub const DYNAMIC_DPB_ADDRESSED: MsgLayout = &[
    DPB_SURFACE[0],
    DPB_SURFACE[1],
    DPB_SURFACE[2],
    DPB_SURFACE[3],
    DPB_SURFACE[4],
    DPB_SURFACE[5],
    DPB_SURFACE[6],
    u32f("dpb_array_size"),
    hex32("dpb_curr_luma_addr_lo"),
    hex32("dpb_curr_luma_addr_hi"),
    hex32("dpb_curr_chroma_addr_lo"),
    hex32("dpb_curr_chroma_addr_hi"),
    MsgItem::Group {
        name: "dpb_addr",
        count: 16,
        fields: DPB_ADDRESS,
    },
];

const DIRECT_REFLIST: &[MsgField] = &[
    scalar("ref_list_l0", MsgType::U8, 15, Radix::Decimal),
    scalar("ref_list_l1", MsgType::U8, 15, Radix::Decimal),
];

/// Largest accepted `num_direct_reflist`.
pub const MAX_DIRECT_REFLISTS: usize = 128;

/// H.265 direct reference lists; the only variable-length message.
pub const HEVC_DIRECT_REF_LIST: MsgLayout = &[
    u32f("num_direct_reflist"),
    MsgItem::Bounded {
        name: "multi_direct_reflist",
        count_field: "num_direct_reflist",
        max: MAX_DIRECT_REFLISTS,
        fields: DIRECT_REFLIST,
    },
];

/// Tile offset slots; always present regardless of `tile_count`.
pub const AV1_TILE_SLOTS: usize = 256;

/// AV1 parameters.
pub const AV1: MsgLayout = &[
    u32f("width"),
    u32f("height"),
    u32f("max_width"),
    u32f("max_height"),
    hex32("seq_info_flags"),
    hex32("pic_info_flags"),
    u8f("seq_profile"),
    u8f("frame_type"),
    u8f("primary_ref_frame"),
    u8f("order_hint_bits"),
    u8f("bit_depth"),
    u8f("chroma_format"),
    u8f("interp_filter"),
    u8f("tx_mode"),
    u8f("base_q_idx"),
    u8a("reserved_0", 3),
    i8f("y_dc_delta_q"),
    i8f("u_dc_delta_q"),
    i8f("u_ac_delta_q"),
    i8f("v_dc_delta_q"),
    i8f("v_ac_delta_q"),
    u8a("reserved_1", 3),
    u8a("ref_frame_map", 8),
    u8a("ref_frame_idx", 7),
    u8f("reserved_2"),
    u8a("loop_filter_level", 4),
    u8f("loop_filter_sharpness"),
    u8a("reserved_3", 3),
    i8a("loop_filter_ref_deltas", 8),
    i8a("loop_filter_mode_deltas", 2),
    u8a("reserved_4", 2),
    u8f("tile_cols"),
    u8f("tile_rows"),
    u16f("context_update_tile_id"),
    u32f("tile_count"),
    u16a("tile_col_start_sb", 65),
    u16a("tile_row_start_sb", 65),
    hex32a("tile_offset", AV1_TILE_SLOTS),
];

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(HEADER, 24)]
    #[case(CREATE, 16)]
    #[case(DRM, 40)]
    #[case(DECODE, 180)]
    #[case(AVC, 976)]
    #[case(VC1, 36)]
    #[case(MPEG2_VLD, 160)]
    #[case(MPEG4_ASP_VLD, 164)]
    #[case(HEVC, 280)]
    #[case(VP9, 116)]
    #[case(DYNAMIC_DPB, 116)]
    #[case(DYNAMIC_DPB_ADDRESSED, 304)]
    #[case(AV1, 1372)]
    fn fixed_layout_sizes(#[case] layout: MsgLayout, #[case] size: usize) {
        assert_eq!(layout_size(layout, 0), size);
    }

    #[test]
    fn bounded_group_scales_with_count() {
        assert_eq!(layout_size(HEVC_DIRECT_REF_LIST, 0), 4);
        assert_eq!(layout_size(HEVC_DIRECT_REF_LIST, 3), 4 + 3 * 30);
    }

    #[test]
    fn index_entry_is_sixteen_bytes() {
        assert_eq!(record_size(INDEX_ENTRY), 16);
    }
}
