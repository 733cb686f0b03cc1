// SPDX-License-Identifier: MIT

//! The MP4 box walker (§4.2): sequentially decodes 8-byte box headers over
//! the mapped input, skipping non-`mdat` bodies and yielding the `mdat`
//! payload extent to the NAL unit walker.

use crate::error::Error;
use crate::model::BoxRecord;
use crate::{bail, err};
use byteorder::{BigEndian, ByteOrder};
use std::fs::File;
use std::path::Path;

/// A read-only, sequential-access-advised mapping of the input video file.
pub struct MappedFile {
    mmap: memmap2::Mmap,
}

impl MappedFile {
    pub fn open(path: &Path) -> Result<MappedFile, Error> {
        let file = File::open(path)
            .map_err(|e| err!(Io, msg("unable to open {}", path.display()), source(e)))?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| err!(Io, msg("unable to mmap {}", path.display()), source(e)))?;
        if let Err(e) = mmap.advise(memmap2::Advice::Sequential) {
            tracing::warn!(error = %e, "madvise(MADV_SEQUENTIAL) failed; continuing without it");
        }
        Ok(MappedFile { mmap })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }
}

/// One step of the box walk: either a non-`mdat` header (already recorded)
/// or an `mdat` header together with its payload extent.
pub enum BoxStep {
    Header(BoxRecord),
    Mdat { record: BoxRecord, payload: std::ops::Range<u64> },
}

/// Decodes the box header at `offset`. `data` is the whole mapped file.
pub fn read_box_header(data: &[u8], offset: u64) -> Result<BoxStep, Error> {
    let off = offset as usize;
    if off + 8 > data.len() {
        bail!(MalformedBox, msg("box header at {offset} runs past end of file"));
    }
    let size = BigEndian::read_u32(&data[off..off + 4]) as u64;
    let tag = [data[off + 4], data[off + 5], data[off + 6], data[off + 7]];

    if size == 0 || size == 1 {
        bail!(
            UnsupportedBoxSize,
            msg("box at {offset} has size {size} (eof-sized or 64-bit largesize unsupported)")
        );
    }
    if size < 8 {
        bail!(MalformedBox, msg("box at {offset} has size {size} < 8"));
    }
    if off as u64 + size > data.len() as u64 {
        bail!(MalformedBox, msg("box at {offset} size {size} runs past end of file"));
    }

    let record = BoxRecord { offset, size, tag };
    if &tag == b"mdat" {
        Ok(BoxStep::Mdat {
            record,
            payload: (offset + 8)..(offset + size),
        })
    } else {
        Ok(BoxStep::Header(record))
    }
}

/// Iterates box headers starting at `offset`, stopping (without consuming)
/// right before the first `mdat`, or at end of file.
pub struct BoxWalker<'a> {
    data: &'a [u8],
    pub offset: u64,
}

impl<'a> BoxWalker<'a> {
    pub fn new(data: &'a [u8], offset: u64) -> Self {
        BoxWalker { data, offset }
    }

    pub fn is_at_eof(&self) -> bool {
        self.offset >= self.data.len() as u64
    }

    /// Reads and advances past the next box header.
    pub fn next(&mut self) -> Result<BoxStep, Error> {
        let step = read_box_header(self.data, self.offset)?;
        match &step {
            BoxStep::Header(r) => self.offset = r.end(),
            BoxStep::Mdat { record, .. } => self.offset = record.offset + 8,
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // scenario 3: two-box file [ftyp size=24][mdat size=1000].
    #[test]
    fn box_walk_scenario() {
        let mut data = vec![0u8; 24 + 1000];
        BigEndian::write_u32(&mut data[0..4], 24);
        data[4..8].copy_from_slice(b"ftyp");
        BigEndian::write_u32(&mut data[24..28], 1000);
        data[28..32].copy_from_slice(b"mdat");

        let mut walker = BoxWalker::new(&data, 0);
        match walker.next().unwrap() {
            BoxStep::Header(r) => {
                assert_eq!(r.offset, 0);
                assert_eq!(r.size, 24);
                assert_eq!(&r.tag, b"ftyp");
            }
            _ => panic!("expected header"),
        }
        match walker.next().unwrap() {
            BoxStep::Mdat { record, payload } => {
                assert_eq!(record.offset, 24);
                assert_eq!(record.size, 1000);
                assert_eq!(payload, 32..1024);
            }
            _ => panic!("expected mdat"),
        }
    }

    #[test]
    fn size_one_is_unsupported() {
        let mut data = vec![0u8; 16];
        BigEndian::write_u32(&mut data[0..4], 1);
        data[4..8].copy_from_slice(b"mdat");
        assert_eq!(
            read_box_header(&data, 0).unwrap_err().kind(),
            crate::error::ErrorKind::UnsupportedBoxSize
        );
    }

    #[test]
    fn size_under_8_is_malformed() {
        let mut data = vec![0u8; 16];
        BigEndian::write_u32(&mut data[0..4], 4);
        data[4..8].copy_from_slice(b"mdat");
        assert_eq!(
            read_box_header(&data, 0).unwrap_err().kind(),
            crate::error::ErrorKind::MalformedBox
        );
    }
}
