// SPDX-License-Identifier: MIT

//! Picture Parameter Set parsing (§4.4.2, ISO/IEC 14496-10 §7.3.2.2).

use crate::bitreader::{ceil_log2, BitReader};
use crate::error::Error;
use crate::model::{Pps, SliceGroupMap};

pub fn parse_pps(r: &mut BitReader) -> Result<Pps, Error> {
    let pic_parameter_set_id = r.decode_ue_traced("pic_parameter_set_id")?;
    let seq_parameter_set_id = r.decode_ue_traced("seq_parameter_set_id")?;
    let entropy_coding_mode_flag = r.read_flag("entropy_coding_mode_flag")?;
    let bottom_field_pic_order_in_frame_present_flag =
        r.read_flag("bottom_field_pic_order_in_frame_present_flag")?;
    let num_slice_groups_minus1 = r.decode_ue_traced("num_slice_groups_minus1")?;

    let slice_group_map = if num_slice_groups_minus1 > 0 {
        let map_type = r.decode_ue_traced("slice_group_map_type")?;
        Some(parse_slice_group_map(r, map_type, num_slice_groups_minus1)?)
    } else {
        None
    };

    let num_ref_idx_l0_default_active_minus1 =
        r.decode_ue_traced("num_ref_idx_l0_default_active_minus1")?;
    let num_ref_idx_l1_default_active_minus1 =
        r.decode_ue_traced("num_ref_idx_l1_default_active_minus1")?;
    let weighted_pred_flag = r.read_flag("weighted_pred_flag")?;
    let weighted_bipred_idc = r.read_n_bits_traced(2, "weighted_bipred_idc")?;
    let pic_init_qp_minus26 = r.decode_se_traced("pic_init_qp_minus26")?;
    let pic_init_qs_minus26 = r.decode_se_traced("pic_init_qs_minus26")?;
    let chroma_qp_index_offset = r.decode_se_traced("chroma_qp_index_offset")?;
    let deblocking_filter_control_present_flag =
        r.read_flag("deblocking_filter_control_present_flag")?;
    let constrained_intra_pred_flag = r.read_flag("constrained_intra_pred_flag")?;
    let redundant_pic_cnt_present_flag = r.read_flag("redundant_pic_cnt_present_flag")?;
    // more_rbsp_data trailer is not parsed (§4.4.2).

    Ok(Pps {
        pic_parameter_set_id,
        seq_parameter_set_id,
        entropy_coding_mode_flag,
        bottom_field_pic_order_in_frame_present_flag,
        num_slice_groups_minus1,
        slice_group_map,
        num_ref_idx_l0_default_active_minus1,
        num_ref_idx_l1_default_active_minus1,
        weighted_pred_flag,
        weighted_bipred_idc,
        pic_init_qp_minus26,
        pic_init_qs_minus26,
        chroma_qp_index_offset,
        deblocking_filter_control_present_flag,
        constrained_intra_pred_flag,
        redundant_pic_cnt_present_flag,
    })
}

fn parse_slice_group_map(
    r: &mut BitReader,
    map_type: u32,
    num_slice_groups_minus1: u32,
) -> Result<SliceGroupMap, Error> {
    Ok(match map_type {
        0 => {
            let mut run_length_minus1 = Vec::with_capacity(num_slice_groups_minus1 as usize + 1);
            for _ in 0..=num_slice_groups_minus1 {
                run_length_minus1.push(r.decode_ue_traced("run_length_minus1")?);
            }
            SliceGroupMap::Interleaved { run_length_minus1 }
        }
        1 => SliceGroupMap::Dispersed,
        2 => {
            let mut top_left = Vec::with_capacity(num_slice_groups_minus1 as usize);
            let mut bottom_right = Vec::with_capacity(num_slice_groups_minus1 as usize);
            for _ in 0..num_slice_groups_minus1 {
                top_left.push(r.decode_ue_traced("top_left")?);
                bottom_right.push(r.decode_ue_traced("bottom_right")?);
            }
            SliceGroupMap::ForegroundWithLeftOver {
                top_left,
                bottom_right,
            }
        }
        3 | 4 | 5 => {
            let slice_group_change_direction_flag =
                r.read_flag("slice_group_change_direction_flag")?;
            let slice_group_change_rate_minus1 =
                r.decode_ue_traced("slice_group_change_rate_minus1")?;
            SliceGroupMap::Changing {
                map_type,
                slice_group_change_direction_flag,
                slice_group_change_rate_minus1,
            }
        }
        6 => {
            let pic_size_in_map_units_minus1 = r.decode_ue_traced("pic_size_in_map_units_minus1")?;
            let width = ceil_log2(num_slice_groups_minus1);
            let mut slice_group_id = Vec::with_capacity(pic_size_in_map_units_minus1 as usize);
            // Intentional off-by-one relative to the standard's "<=" bound
            // (§9, "known quirks to preserve"): this loop runs
            // pic_size_in_map_units_minus1 times, not +1.
            for _ in 0..pic_size_in_map_units_minus1 {
                slice_group_id.push(r.read_n_bits_traced(width, "slice_group_id")?);
            }
            SliceGroupMap::Explicit {
                pic_size_in_map_units_minus1,
                slice_group_id,
            }
        }
        _ => {
            crate::bail!(UnsupportedSyntax, msg("unknown slice_group_map_type {map_type}"));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_type_0_reads_one_run_length_per_group() {
        // run_length_minus1 for groups 0 and 1: ue(2)="011", ue(0)="1", then padding.
        let data = [0b011_1_0000u8];
        let mut r = BitReader::new(&data, 0);
        let map = parse_slice_group_map(&mut r, 0, 1).unwrap();
        match map {
            SliceGroupMap::Interleaved { run_length_minus1 } => {
                assert_eq!(run_length_minus1, vec![2, 0]);
            }
            _ => panic!("expected Interleaved"),
        }
    }

    #[test]
    fn map_type_6_undercounts_by_one() {
        // pic_size_in_map_units_minus1 = 3 (ue(v) = "00100"), num_slice_groups_minus1 = 2
        // so slice_group_id width = ceil_log2(2) = 2 bits; loop should run 3 times, not 4.
        // bits: 00100 | 01 10 11 | 00000 (padding)
        let data = [0b0010_0011, 0b0110_0000];
        let mut r = BitReader::new(&data, 0);
        let map = parse_slice_group_map(&mut r, 6, 2).unwrap();
        match map {
            SliceGroupMap::Explicit {
                pic_size_in_map_units_minus1,
                slice_group_id,
            } => {
                assert_eq!(pic_size_in_map_units_minus1, 3);
                assert_eq!(slice_group_id, vec![1, 2, 3]);
            }
            _ => panic!("expected Explicit"),
        }
    }

    #[test]
    fn map_type_6_width_matches_ceil_log2() {
        assert_eq!(ceil_log2(0), 0);
        assert_eq!(ceil_log2(1), 1);
        assert_eq!(ceil_log2(2), 2);
        assert_eq!(ceil_log2(3), 2);
    }
}
