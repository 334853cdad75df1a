//! Ogg container encoding for Opus streams
//!
//! Implements just enough of RFC 3533 (framing) and RFC 7845 (Opus mapping)
//! to produce files standard decoders accept.

pub mod crc;
pub mod encoder;
pub mod opus_headers;
pub mod page;

use std::io;
use thiserror::Error;

pub use encoder::OggOpusEncoder;
pub use opus_headers::OpusHeaders;
pub use page::Page;

/// Serial number of the only logical stream in each file
pub const STREAM_SERIAL: u32 = 1;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("segment of {0} bytes exceeds the 255-byte limit")]
    SegmentTooLong(usize),
    #[error("page segment table is full")]
    SegmentTableFull,
    #[error("failed to write {what}: {source}")]
    Io {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}
