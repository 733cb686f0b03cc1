// SPDX-License-Identifier: MIT

//! The segment correlator (§4.7): walks the parsed box/NAL lists in lockstep
//! with the MPD's `SegmentURL` ranges, classifying each segment's slices and
//! writing the resulting attributes back onto the MPD.

use crate::bail;
use crate::error::Error;
use crate::mpd::Mpd;
use crate::model::{ParsedStreams, SliceTag};

fn range_str(offset: u64, end_inclusive: u64) -> String {
    format!("{offset}-{end_inclusive}")
}

/// Correlates `streams` against `mpd`'s SegmentURL list, starting at `mpd`'s
/// current cursor position, and saves the MPD once all segments are done.
pub fn correlate(streams: &ParsedStreams, mpd: &mut Mpd) -> Result<(), Error> {
    let mut box_idx = 0usize;
    let mut nal_idx = 0usize;

    // Init segment: box records before the first SegmentURL's range_start
    // belong to the Initialization segment and are never classified.
    let (first_start, _) = mpd.current_range()?;
    while box_idx < streams.boxes.len() && streams.boxes[box_idx].offset < first_start {
        box_idx += 1;
    }

    loop {
        let (s, e) = mpd.current_range()?;

        let mut found_mdat = false;
        while box_idx < streams.boxes.len() && streams.boxes[box_idx].offset < e {
            let b = streams.boxes[box_idx];
            box_idx += 1;
            if b.tag == *b"mdat" {
                found_mdat = true;
                break;
            }
        }
        if !found_mdat {
            bail!(GapBeforeMdat, msg("segment {s}-{e} has no mdat box before its end"));
        }

        let mut i_end: Option<u64> = None;
        let mut p_ranges: Vec<String> = Vec::new();
        let mut b_ranges: Vec<String> = Vec::new();
        let mut p_size: u64 = 0;
        let mut b_size: u64 = 0;

        while nal_idx < streams.nal_units.len() && streams.nal_units[nal_idx].offset < e {
            let n = &streams.nal_units[nal_idx];
            nal_idx += 1;
            let end_inclusive = n.end() - 1;
            match n.slice_tag {
                // SP behaves as a P-type slice, SI as an I-type slice (§9 open
                // question: the spec only names plain I/P/B; switching slices
                // follow their base type for correlation purposes).
                Some(SliceTag::I) | Some(SliceTag::Si) => i_end = Some(end_inclusive),
                Some(SliceTag::P) | Some(SliceTag::Sp) => {
                    p_ranges.push(range_str(n.offset, end_inclusive));
                    p_size += n.size;
                }
                Some(SliceTag::B) => {
                    b_ranges.push(range_str(n.offset, end_inclusive));
                    b_size += n.size;
                }
                None => {
                    // Known quirk (§9), preserved: a non-slice NAL reappearing
                    // inside a segment (e.g. a refreshed PPS) is prepended to
                    // the P-frame range list and counted as P-frame size.
                    p_ranges.insert(0, range_str(n.offset, end_inclusive));
                    p_size += n.size;
                }
            }
        }

        mpd.set_attribute("pSize", p_size.to_string());
        mpd.set_attribute("bSize", b_size.to_string());
        mpd.set_attribute("pFrames", p_ranges.join(","));
        mpd.set_attribute("bFrames", b_ranges.join(","));
        if let Some(i_end) = i_end {
            mpd.set_attribute("iEnd", i_end.to_string());
        }

        if !mpd.next_segment() {
            break;
        }
    }

    mpd.save()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoxRecord, NalUnit};

    const SAMPLE_MPD: &str = r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011">
  <Period>
    <AdaptationSet>
      <Representation>
        <BaseURL>video-dash.mp4</BaseURL>
        <SegmentList>
          <Initialization sourceURL="init.mp4"/>
          <SegmentURL mediaRange="100-499"/>
          <SegmentURL mediaRange="500-899"/>
        </SegmentList>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>
"#;

    fn nal(tag: Option<SliceTag>, offset: u64, size: u64) -> NalUnit {
        NalUnit {
            offset,
            size,
            nal_ref_idc: 1,
            nal_unit_type: match tag {
                Some(_) => 1,
                None => 8,
            },
            slice_header_size: 4,
            slice_tag: tag,
        }
    }

    // scenario 6: two SegmentURLs (100-499, 500-899); I at 120/80, P at
    // 200/50, B at 600/40 -> iEnd=199, pFrames=200-249, pSize=50, bFrames
    // empty, bSize=0 for segment one; bFrames=600-639, bSize=40, pSize=0 for
    // segment two.
    #[test]
    fn correlates_segments_per_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.mpd");
        std::fs::write(&path, SAMPLE_MPD).unwrap();
        let mut mpd = Mpd::open(&path, "video-dash.mp4").unwrap();

        let mut streams = ParsedStreams::default();
        streams.boxes.push(BoxRecord {
            offset: 112,
            size: 8,
            tag: *b"mdat",
        });
        streams.nal_units.push(nal(Some(SliceTag::I), 120, 80));
        streams.nal_units.push(nal(Some(SliceTag::P), 200, 50));
        streams.boxes.push(BoxRecord {
            offset: 500,
            size: 50,
            tag: *b"mdat",
        });
        streams.nal_units.push(nal(Some(SliceTag::B), 600, 40));

        correlate(&streams, &mut mpd).unwrap();

        let mut mpd = Mpd::open(&path, "video-dash.mp4").unwrap();
        assert_eq!(mpd.current_range().unwrap(), (100, 499));
        assert_eq!(mpd.current_attr("iEnd"), Some("199"));
        assert_eq!(mpd.current_attr("pFrames"), Some("200-249"));
        assert_eq!(mpd.current_attr("pSize"), Some("50"));
        assert_eq!(mpd.current_attr("bFrames"), Some(""));
        assert_eq!(mpd.current_attr("bSize"), Some("0"));

        assert!(mpd.next_segment());
        assert_eq!(mpd.current_range().unwrap(), (500, 899));
        assert_eq!(mpd.current_attr("bFrames"), Some("600-639"));
        assert_eq!(mpd.current_attr("bSize"), Some("40"));
        assert_eq!(mpd.current_attr("pSize"), Some("0"));
        assert_eq!(mpd.current_attr("iEnd"), None);
    }

    #[test]
    fn missing_mdat_before_segment_end_is_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.mpd");
        std::fs::write(&path, SAMPLE_MPD).unwrap();
        let mut mpd = Mpd::open(&path, "video-dash.mp4").unwrap();

        let streams = ParsedStreams::default();
        let err = correlate(&streams, &mut mpd).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::GapBeforeMdat);
    }

    #[test]
    fn nonslice_nal_prepends_to_p_list_and_counts_as_p_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.mpd");
        std::fs::write(&path, SAMPLE_MPD).unwrap();
        let mut mpd = Mpd::open(&path, "video-dash.mp4").unwrap();

        let mut streams = ParsedStreams::default();
        streams.boxes.push(BoxRecord {
            offset: 112,
            size: 8,
            tag: *b"mdat",
        });
        streams.nal_units.push(nal(Some(SliceTag::P), 200, 50));
        streams.nal_units.push(nal(None, 260, 10));

        correlate(&streams, &mut mpd).unwrap();

        let mpd = Mpd::open(&path, "video-dash.mp4").unwrap();
        assert_eq!(mpd.current_attr("pFrames"), Some("260-269,200-249"));
        assert_eq!(mpd.current_attr("pSize"), Some("60"));
    }
}
