// SPDX-License-Identifier: MIT

//! The range emitter (§4.6): writes the per-frame and byte-range CSV views
//! of the parsed bytestream layout.

use crate::error::Error;
use crate::model::{BoxRecord, NalUnit, ParsedStreams};
use crate::{bail, err};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct FrameRow {
    #[serde(rename = "type")]
    kind: String,
    num: u64,
    size: u64,
}

#[derive(Serialize)]
struct RangeRow {
    category: String,
    #[serde(rename = "type")]
    kind: String,
    start: u64,
    end: u64,
}

/// One entry in file order, merging the boxes and NAL units lists by offset
/// so the per-frame CSV reflects actual encounter order.
enum Entry<'a> {
    Box(&'a BoxRecord),
    Nal(&'a NalUnit),
}

fn merged_entries<'a>(streams: &'a ParsedStreams) -> Vec<Entry<'a>> {
    let mut entries: Vec<Entry<'a>> = streams
        .boxes
        .iter()
        .map(Entry::Box)
        .chain(streams.nal_units.iter().map(Entry::Nal))
        .collect();
    entries.sort_by_key(|e| match e {
        Entry::Box(b) => b.offset,
        Entry::Nal(n) => n.offset,
    });
    entries
}

/// Writes the per-frame CSV (`type,num,size`) to `path`.
pub fn write_frame_csv(path: &Path, streams: &ParsedStreams) -> Result<(), Error> {
    let mut w = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(|e| err!(Io, msg("unable to open {}", path.display()), source(e)))?;

    let mut frame_num: u64 = 1;
    for entry in merged_entries(streams) {
        match entry {
            Entry::Box(b) => {
                // mdat's payload is already covered by the per-NAL rows below;
                // count only its 8-byte header so totals stay gap-free.
                let size = if b.tag == *b"mdat" { 8 } else { b.size };
                w.serialize(FrameRow {
                    kind: "H".to_string(),
                    num: 0,
                    size,
                })
                .map_err(|e| err!(Io, msg("writing frame csv"), source(e)))?;
            }
            Entry::Nal(n) => match n.slice_tag {
                Some(tag) => {
                    w.serialize(FrameRow {
                        kind: tag.as_str().to_string(),
                        num: frame_num,
                        size: n.size,
                    })
                    .map_err(|e| err!(Io, msg("writing frame csv"), source(e)))?;
                    frame_num += 1;
                }
                None => {
                    w.serialize(FrameRow {
                        kind: "H".to_string(),
                        num: 0,
                        size: n.size,
                    })
                    .map_err(|e| err!(Io, msg("writing frame csv"), source(e)))?;
                }
            },
        }
    }
    w.flush().map_err(|e| err!(Io, msg("flushing frame csv"), source(e)))?;
    Ok(())
}

/// Writes the ranges CSV (`category,type,start,end`) to `path`.
pub fn write_ranges_csv(path: &Path, streams: &ParsedStreams) -> Result<(), Error> {
    let mut w = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(|e| err!(Io, msg("unable to open {}", path.display()), source(e)))?;

    for b in &streams.boxes {
        w.serialize(RangeRow {
            category: "mp4".to_string(),
            kind: b.tag_str().into_owned(),
            start: b.offset,
            end: b.end() - 1,
        })
        .map_err(|e| err!(Io, msg("writing ranges csv"), source(e)))?;
    }

    for n in &streams.nal_units {
        match n.slice_tag {
            Some(tag) => {
                // Slice NAL (type 1 or 5): two rows, header then content.
                let header_end = n.offset + 4 + n.slice_header_size as u64;
                w.serialize(RangeRow {
                    category: "h264".to_string(),
                    kind: format!("{}_header", tag.as_str()),
                    start: n.offset,
                    end: header_end,
                })
                .map_err(|e| err!(Io, msg("writing ranges csv"), source(e)))?;
                w.serialize(RangeRow {
                    category: "h264".to_string(),
                    kind: format!("{}_content", tag.as_str()),
                    start: header_end + 1,
                    end: n.end() - 1,
                })
                .map_err(|e| err!(Io, msg("writing ranges csv"), source(e)))?;
            }
            None => {
                if (2..=4).contains(&n.nal_unit_type) {
                    tracing::warn!(offset = n.offset, "slice partitions are not supported");
                }
                w.serialize(RangeRow {
                    category: "h264".to_string(),
                    kind: n.short_kind().to_string(),
                    start: n.offset,
                    end: n.end() - 1,
                })
                .map_err(|e| err!(Io, msg("writing ranges csv"), source(e)))?;
            }
        }
    }

    w.flush().map_err(|e| err!(Io, msg("flushing ranges csv"), source(e)))?;
    Ok(())
}

/// Derives the default ranges-CSV path: the video basename with its last
/// three characters dropped, plus `-ranges.csv`, alongside the video.
pub fn default_ranges_path(video_path: &Path) -> Result<std::path::PathBuf, Error> {
    let stem = video_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| err!(InvalidArgument, msg("video path has no file name")).build())?;
    if stem.len() < 3 {
        bail!(InvalidArgument, msg("video file name {stem:?} is too short to truncate"));
    }
    let truncated = &stem[..stem.len() - 3];
    let file_name = format!("{truncated}-ranges.csv");
    Ok(video_path.with_file_name(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SliceTag;

    #[test]
    fn default_ranges_path_truncates_three_chars() {
        let p = Path::new("/tmp/video-dash.mp4");
        let out = default_ranges_path(p).unwrap();
        assert_eq!(out, Path::new("/tmp/video-dash-ranges.csv"));
    }

    // scenario 5: I,1,<s> P,2,<s> B,3,<s> row shapes.
    #[test]
    fn frame_csv_numbers_slices_in_encounter_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.csv");
        let mut streams = ParsedStreams::default();
        for (tag, offset, size) in [
            (SliceTag::I, 100u64, 80u64),
            (SliceTag::P, 200, 50),
            (SliceTag::B, 300, 40),
        ] {
            streams.nal_units.push(NalUnit {
                offset,
                size,
                nal_ref_idc: 1,
                nal_unit_type: 1,
                slice_header_size: 4,
                slice_tag: Some(tag),
            });
        }
        write_frame_csv(&path, &streams).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "type,num,size");
        assert_eq!(lines.next().unwrap(), "I,1,80");
        assert_eq!(lines.next().unwrap(), "P,2,50");
        assert_eq!(lines.next().unwrap(), "B,3,40");
    }
}
