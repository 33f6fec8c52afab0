use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// Result type of every fallible operation in this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Describes an error encountered while extracting component planes.
#[derive(Error, Debug)]
pub enum Error {
    /// There was an error reading or writing a file that is not tied to a path.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// There was an error reading or writing the file at `path`.
    #[error("{}: {source}", path.display())]
    File {
        /// The file being accessed
        path: PathBuf,
        /// The underlying system error
        #[source]
        source: std::io::Error,
    },
    /// A buffer could not be reserved.
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
    /// A sample plane would not fit in the address space.
    #[error("Sample plane of {0}x{1} samples is too large")]
    PlaneTooLarge(usize, usize),
    /// A sample plane with no samples was requested.
    #[error("Invalid sample plane size {0}x{1}")]
    EmptyPlane(usize, usize),
    /// The input file was empty.
    #[error("Input file contains no data")]
    EmptyInput,
    /// The image uses a sample precision other than 8 or 12 bits.
    #[error("Unsupported data precision: {0}")]
    UnsupportedPrecision(u8),
    /// A feature is not supported by the decoder
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(&'static str),
    /// The image is malformed in some way. The string describes how.
    #[error("Corrupt JPEG data: {0}")]
    Malformed(&'static str),
    /// A component's clipped extent does not fit in its block-aligned plane.
    #[error("Component {index}: {}x{} samples do not fit in a {}x{} plane", clipped.0, clipped.1, padded.0, padded.1)]
    ExtentMismatch {
        /// Component index
        index: usize,
        /// Clipped size, (width, height)
        clipped: (usize, usize),
        /// Size of the plane, (width, height)
        padded: (usize, usize),
    },
    /// The decoder was driven out of order.
    #[error("Decoder misuse: {0}")]
    InvalidState(&'static str),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File open, read or write failure
    Io,
    /// Memory exhaustion
    Allocation,
    /// Input the tool does not handle: unsupported precision or process, empty input
    Format,
    /// Corruption reported by the decoder, or an aborted decode
    Decode,
}

impl Error {
    /// Wraps an I/O error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::File {
            path: path.into(),
            source,
        }
    }

    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::File { .. } => ErrorKind::Io,
            Error::OutOfMemory(_) | Error::PlaneTooLarge(..) => ErrorKind::Allocation,
            Error::EmptyPlane(..)
            | Error::EmptyInput
            | Error::UnsupportedPrecision(_)
            | Error::UnsupportedFeature(_) => ErrorKind::Format,
            Error::Malformed(_) | Error::InvalidState(_) | Error::ExtentMismatch { .. } => {
                ErrorKind::Decode
            }
        }
    }
}
