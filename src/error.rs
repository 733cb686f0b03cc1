// SPDX-License-Identifier: MIT

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Write};

/// Returns a pretty-and-informative rendering of `e`, including its cause chain
/// and a backtrace when one was captured.
pub fn prettify_failure(e: &Error) -> String {
    let mut msg = e.to_string();
    for cause in Fail::iter_causes(e) {
        write!(&mut msg, "\ncaused by: {}", cause).unwrap();
    }
    match Fail::backtrace(e) {
        Some(bt) if !bt.to_string().is_empty() => {
            write!(&mut msg, "\n\nBacktrace:\n{}", bt).unwrap();
        }
        _ => {
            write!(
                &mut msg,
                "\n\n(set environment variable RUST_BACKTRACE=1 to see backtraces)"
            )
            .unwrap();
        }
    }
    msg
}

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        *self.inner.get_context()
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error {
            inner: e.context(ErrorKind::Io),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.cause() {
            None => fmt::Display::fmt(&self.kind(), f),
            Some(c) => write!(f, "{}: {}", self.kind(), c),
        }
    }
}

/// Error kind, surfaced to the CLI as the basis for the process exit code.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
#[rustfmt::skip]
pub enum ErrorKind {
    #[fail(display = "truncated")] Truncated,
    #[fail(display = "malformed box")] MalformedBox,
    #[fail(display = "unsupported box size")] UnsupportedBoxSize,
    #[fail(display = "unsupported syntax")] UnsupportedSyntax,
    #[fail(display = "malformed mpd")] MalformedMpd,
    #[fail(display = "mpd target not found")] MpdTargetNotFound,
    #[fail(display = "gap before mdat")] GapBeforeMdat,
    #[fail(display = "invalid argument")] InvalidArgument,
    #[fail(display = "i/o error")] Io,
}

impl ErrorKind {
    /// Exit code this kind should surface as on the CLI, per the error handling policy:
    /// argument/IO problems are 1, everything the parsing/correlation pipeline raises is 2.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InvalidArgument | ErrorKind::Io => 1,
            _ => 2,
        }
    }
}

/// Extension methods for `Result`.
pub trait ResultExt<T, E> {
    /// Annotates an error with the given kind.
    fn err_kind(self, k: ErrorKind) -> Result<T, Error>;
}

impl<T, E> ResultExt<T, E> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn err_kind(self, k: ErrorKind) -> Result<T, Error> {
        self.map_err(|e| failure::Error::from_boxed_compat(Box::new(e)).context(k).into())
    }
}

/// Builds an [`Error`] from a kind, an optional formatted message, and an optional source.
///
/// Not constructed directly; use the [`err!`] macro.
pub struct ErrorBuilder {
    kind: ErrorKind,
    msg: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ErrorBuilder {
    pub fn new(kind: ErrorKind) -> Self {
        ErrorBuilder {
            kind,
            msg: None,
            source: None,
        }
    }

    pub fn msg(mut self, msg: String) -> Self {
        self.msg = Some(msg);
        self
    }

    pub fn source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn build(self) -> Error {
        let ctx = match (self.msg, self.source) {
            (Some(msg), Some(source)) => failure::Error::from_boxed_compat(source)
                .context(msg)
                .context(self.kind),
            (Some(msg), None) => failure::err_msg(msg).context(self.kind),
            (None, Some(source)) => failure::Error::from_boxed_compat(source).context(self.kind),
            (None, None) => Context::new(self.kind),
        };
        Error::from(ctx)
    }
}

impl From<ErrorBuilder> for Error {
    fn from(b: ErrorBuilder) -> Error {
        b.build()
    }
}

/// Builds an [`Error`] from a kind and, optionally, `msg(...)`/`source(...)` clauses.
///
/// ```ignore
/// err!(Truncated, msg("need {} more bits", n))
/// err!(Io, msg("unable to open {}", path.display()), source(e))
/// ```
#[macro_export]
macro_rules! err {
    ($kind:ident) => {
        $crate::error::ErrorBuilder::new($crate::error::ErrorKind::$kind)
    };
    ($kind:ident, msg($($arg:tt)+)) => {
        $crate::error::ErrorBuilder::new($crate::error::ErrorKind::$kind).msg(format!($($arg)+))
    };
    ($kind:ident, msg($($arg:tt)+), source($source:expr)) => {
        $crate::error::ErrorBuilder::new($crate::error::ErrorKind::$kind)
            .msg(format!($($arg)+))
            .source($source)
    };
}

/// Like [`err!`], but returns early with `Err(...)`.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)+) => {
        return Err($crate::err!($($arg)+).into())
    };
}
