// SPDX-License-Identifier: MIT

//! Flat record types accumulated by the parse driver. Records store file
//! offsets, never borrowed pointers into the mapped input, so they outlive
//! the mapping (see the design notes on ownership).

/// One MP4 box header. `offset`/`size` include the 8-byte header itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxRecord {
    pub offset: u64,
    pub size: u64,
    pub tag: [u8; 4],
}

impl BoxRecord {
    pub fn tag_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.tag)
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// The derived frame/slice classification carried by a slice NAL unit.
/// Kept as a proper enum (rather than a single character) so `Sp`/`Si`
/// remain distinguishable; only CSV/XML text forms collapse to `SP`/`SI`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceTag {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceTag {
    /// Table 7-6: derive from `slice_type mod 5`.
    pub fn from_slice_type(slice_type: u32) -> SliceTag {
        match slice_type % 5 {
            0 => SliceTag::P,
            1 => SliceTag::B,
            2 => SliceTag::I,
            3 => SliceTag::Sp,
            4 => SliceTag::Si,
            _ => unreachable!("n % 5 < 5"),
        }
    }

    /// The CSV/XML text form: `P`, `B`, `I`, `SP`, `SI`.
    pub fn as_str(self) -> &'static str {
        match self {
            SliceTag::P => "P",
            SliceTag::B => "B",
            SliceTag::I => "I",
            SliceTag::Sp => "SP",
            SliceTag::Si => "SI",
        }
    }
}

/// One NAL unit inside an `mdat` payload. `offset` points at the 4-byte
/// length prefix; `size` is `length + 4`, matching box-record semantics.
#[derive(Clone, Debug)]
pub struct NalUnit {
    pub offset: u64,
    pub size: u64,
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
    /// Byte-ceil of the slice header's bit length; zero for non-slice units.
    pub slice_header_size: u32,
    pub slice_tag: Option<SliceTag>,
}

impl NalUnit {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Short tag used in the ranges CSV for non-slice NAL kinds (type 0 or > 5).
    pub fn short_kind(&self) -> &'static str {
        match self.nal_unit_type {
            0 => "unspecified",
            1 => "slice",
            2 => "dpa",
            3 => "dpb",
            4 => "dpc",
            5 => "idr",
            6 => "sei",
            7 => "sps",
            8 => "pps",
            9 => "aud",
            10 => "eoseq",
            11 => "eostream",
            12 => "filler",
            _ => "other",
        }
    }
}

/// Sequence Parameter Set fields that gate later syntax (ISO/IEC 14496-10 §7.3.2.1.1).
#[derive(Clone, Debug)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_set_flags: [bool; 6],
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    pub seq_scaling_matrix_present_flag: bool,
    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,
    pub frame_cropping_flag: bool,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,
    pub vui_parameters_present_flag: bool,
}

impl Sps {
    /// The profile set that gates the chroma/bit-depth block (§3).
    pub const CHROMA_BLOCK_PROFILES: [u8; 12] =
        [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134];

    pub fn has_chroma_block(profile_idc: u8) -> bool {
        Self::CHROMA_BLOCK_PROFILES.contains(&profile_idc)
    }

    pub fn chroma_array_type(&self) -> u32 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc
        }
    }
}

/// The slice-group-map-type-dependent fields of a PPS (§7.3.2.2), modeled as
/// a sum type per variant rather than a bag of optionals.
#[derive(Clone, Debug)]
pub enum SliceGroupMap {
    /// map_type 0.
    Interleaved { run_length_minus1: Vec<u32> },
    /// map_type 1: fully derived from `num_slice_groups_minus1`, no extra fields.
    Dispersed,
    /// map_type 2.
    ForegroundWithLeftOver {
        top_left: Vec<u32>,
        bottom_right: Vec<u32>,
    },
    /// map_type 3, 4, or 5 (changing slice groups).
    Changing {
        map_type: u32,
        slice_group_change_direction_flag: bool,
        slice_group_change_rate_minus1: u32,
    },
    /// map_type 6: explicit per-map-unit assignment.
    Explicit {
        pic_size_in_map_units_minus1: u32,
        slice_group_id: Vec<u32>,
    },
}

/// Picture Parameter Set fields (§7.3.2.2).
#[derive(Clone, Debug)]
pub struct Pps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub num_slice_groups_minus1: u32,
    pub slice_group_map: Option<SliceGroupMap>,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
}

/// One entry of a ref-pic-list-modification loop (§7.3.3.1).
#[derive(Clone, Debug)]
pub struct RefPicListModEntry {
    pub modification_of_pic_nums_idc: u32,
    pub abs_diff_pic_num_minus1: Option<u32>,
    pub long_term_pic_num: Option<u32>,
}

/// One entry of a prediction-weight-table reference list (§7.3.3.2).
#[derive(Clone, Debug, Default)]
pub struct PredWeightEntry {
    pub luma_weight: Option<(i32, i32)>,
    pub chroma_weight: Option<[(i32, i32); 2]>,
}

#[derive(Clone, Debug)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    pub chroma_log2_weight_denom: Option<u32>,
    pub l0: Vec<PredWeightEntry>,
    pub l1: Vec<PredWeightEntry>,
}

/// One `memory_management_control_operation` entry (§7.3.3.3).
#[derive(Clone, Debug)]
pub struct MmcoOp {
    pub op: u32,
    pub arg1: Option<u32>,
    pub arg2: Option<u32>,
}

#[derive(Clone, Debug)]
pub enum DecRefPicMarking {
    Idr {
        no_output_of_prior_pics_flag: bool,
        long_term_reference_flag: bool,
    },
    NonIdr {
        adaptive_ref_pic_marking_mode_flag: bool,
        ops: Vec<MmcoOp>,
    },
}

/// Slice header fields (§7.3.3), all conditionally parsed per §4.4.3.
#[derive(Clone, Debug)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: u32,
    pub pic_parameter_set_id: u32,
    pub colour_plane_id: Option<u32>,
    pub frame_num: u32,
    pub field_pic_flag: Option<bool>,
    pub bottom_field_flag: Option<bool>,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_lsb: Option<u32>,
    pub delta_pic_order_cnt_bottom: Option<i32>,
    pub delta_pic_order_cnt: Option<(i32, Option<i32>)>,
    pub redundant_pic_cnt: Option<u32>,
    pub direct_spatial_mv_pred_flag: Option<bool>,
    /// `(num_ref_idx_l0_active_minus1, num_ref_idx_l1_active_minus1)`.
    pub num_ref_idx_active_override: Option<(u32, Option<u32>)>,
    pub ref_pic_list_modification_l0: Vec<RefPicListModEntry>,
    pub ref_pic_list_modification_l1: Vec<RefPicListModEntry>,
    pub pred_weight_table: Option<PredWeightTable>,
    pub dec_ref_pic_marking: Option<DecRefPicMarking>,
    pub cabac_init_idc: Option<u32>,
    pub slice_qp_delta: i32,
    pub sp_for_switch_flag: Option<bool>,
    pub slice_qs_delta: Option<i32>,
    pub disable_deblocking_filter_idc: Option<u32>,
    pub deblocking_filter_offsets: Option<(i32, i32)>,
    pub slice_group_change_cycle: Option<u32>,
}

/// The four parsed-structure lists plus box records, kept in ascending
/// file-offset order; parsing only ever appends.
#[derive(Default)]
pub struct ParsedStreams {
    pub boxes: Vec<BoxRecord>,
    pub nal_units: Vec<NalUnit>,
    pub sps: Vec<Sps>,
    pub pps: Vec<Pps>,
    pub slice_headers: Vec<SliceHeader>,
}
