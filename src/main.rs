// SPDX-License-Identifier: MIT

//! `dashrange`: analyzes the byte-range layout of H.264 slices inside a
//! DASH-segmented MP4 video, optionally writing CSV views and correlating
//! the result against a DASH MPD manifest.

use bpaf::Bpaf;
use std::ffi::OsStr;
use std::path::PathBuf;
use tracing::{debug, error};

mod bitreader;
mod csv_out;
mod driver;
mod error;
mod h264;
mod model;
mod mp4;
mod mpd;
mod nal;
mod segment;
mod tracing_setup;

use error::Error;

/// Analyzes DASH-segmented MP4/H.264 byte-range layout.
#[derive(Bpaf, Debug)]
#[bpaf(options, version(env!("CARGO_PKG_VERSION")))]
struct Args {
    /// Path to the segmented MP4 video file.
    #[bpaf(positional("VIDEO"))]
    video: PathBuf,

    /// Write the per-frame CSV view (`type,num,size`) to this path.
    #[bpaf(long("csv"), argument("PATH"))]
    csv: Option<PathBuf>,

    /// Path to the DASH MPD manifest to correlate against and rewrite in place.
    #[bpaf(long("mpd"), argument("PATH"))]
    mpd: Option<PathBuf>,

    /// Write the byte-ranges CSV next to the video.
    #[bpaf(long("ranges"), switch)]
    ranges: bool,
}

impl Args {
    fn run(self) -> Result<i32, Error> {
        let mapped = mp4::MappedFile::open(&self.video)?;
        let streams = driver::parse(mapped.bytes())?;

        if let Some(csv_path) = &self.csv {
            csv_out::write_frame_csv(csv_path, &streams)?;
        }

        if self.ranges {
            let ranges_path = csv_out::default_ranges_path(&self.video)?;
            csv_out::write_ranges_csv(&ranges_path, &streams)?;
        }

        if let Some(mpd_path) = &self.mpd {
            let basename = self.video.file_name().and_then(OsStr::to_str).ok_or_else(|| {
                crate::err!(InvalidArgument, msg("video path has no file name")).build()
            })?;
            let mut m = mpd::Mpd::open(mpd_path, basename)?;
            segment::correlate(&streams, &mut m)?;
        }

        Ok(0)
    }
}

fn main() {
    tracing_setup::install();

    let progname = std::env::args_os()
        .next()
        .map(PathBuf::from)
        .as_deref()
        .and_then(std::path::Path::file_name)
        .and_then(OsStr::to_str)
        .map(str::to_string)
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    let args = match args()
        .fallback_to_usage()
        .run_inner(bpaf::Args::current_args().set_name(&progname))
    {
        Ok(a) => a,
        Err(e) => std::process::exit(e.exit_code()),
    };
    tracing::trace!("parsed command-line arguments: {args:#?}");

    match args.run() {
        Err(e) => {
            error!(err = %error::prettify_failure(&e), "exiting due to error");
            std::process::exit(e.kind().exit_code());
        }
        Ok(rv) => {
            debug!("exiting with status {}", rv);
            std::process::exit(rv)
        }
    }
}
