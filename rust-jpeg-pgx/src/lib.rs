#![warn(missing_docs)]

//! Extracts the component planes of JPEG images at their native resolution and writes them as
//! PGX file sets: a manifest plus one descriptor and one raw sample file per component.
mod bitstream;
mod error;
/// Component sizes on the block grid and after clipping
pub mod dimensions;
/// Runs a decoder from header to written files
pub mod extract;
/// Defines types for raw-data decoding
pub mod image;
/// Decoder for JPEG images
pub mod jpeg;
/// Writer for PGX file sets
pub mod pgx;
/// Sample planes filled by a raw decoder
pub mod plane;

pub use error::{Error, ErrorKind, Result};
pub use extract::{extract_to_pgx, ExtractOptions, ExtractionSummary};
