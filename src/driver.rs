// SPDX-License-Identifier: MIT

//! The parse driver (§4.5): a single pass in file order over the mapped
//! input, threading a parse context through the box and NAL walkers and
//! returning the accumulated lists. No globals; no concurrency within a file.

use crate::error::Error;
use crate::model::ParsedStreams;
use crate::mp4::BoxStep;
use crate::nal::NalBody;

/// Runs the whole-file parse and returns the accumulated, offset-ordered lists.
pub fn parse(data: &[u8]) -> Result<ParsedStreams, Error> {
    let mut streams = ParsedStreams::default();
    let mut walker = crate::mp4::BoxWalker::new(data, 0);

    // "Last parsed wins" SPS/PPS resolution (§4.4.3, §9): inputs emit SPS/PPS
    // immediately before use, so we only ever need the most recent of each.
    let mut current_sps: Option<crate::model::Sps> = None;
    let mut current_pps: Option<crate::model::Pps> = None;

    while !walker.is_at_eof() {
        match walker.next()? {
            BoxStep::Header(record) => {
                streams.boxes.push(record);
            }
            BoxStep::Mdat { record, payload } => {
                streams.boxes.push(record);
                parse_mdat(data, payload, &mut streams, &mut current_sps, &mut current_pps)?;
                walker.offset = record.end();
            }
        }
    }

    Ok(streams)
}

fn parse_mdat(
    data: &[u8],
    payload: std::ops::Range<u64>,
    streams: &mut ParsedStreams,
    current_sps: &mut Option<crate::model::Sps>,
    current_pps: &mut Option<crate::model::Pps>,
) -> Result<(), Error> {
    let mut offset = payload.start;
    while offset < payload.end {
        let (record, body, next_offset) =
            crate::nal::read_nal_unit(data, offset, current_sps.as_ref(), current_pps.as_ref())?;
        streams.nal_units.push(record);
        match body {
            NalBody::Sps(sps) => {
                streams.sps.push(sps.clone());
                *current_sps = Some(sps);
            }
            NalBody::Pps(pps) => {
                streams.pps.push(pps.clone());
                *current_pps = Some(pps);
            }
            NalBody::Slice(header) => streams.slice_headers.push(header),
            NalBody::Opaque => {}
        }
        offset = next_offset;
    }
    Ok(())
}
