//! Single-stream Ogg Opus writer
//!
//! Simplified for replay files:
//! - exactly one logical bitstream per output
//! - one packet per page
//! - the end-of-stream flag is never set; RFC 3533 requires readers to cope
//!   with truncated streams

use std::io::Write;
use tracing::trace;

use super::page::Page;
use super::{EncodeError, OpusHeaders, STREAM_SERIAL};

/// Writes Opus packets into an Ogg container.
///
/// Holds sequencing state, so one instance serves one stream from one thread.
pub struct OggOpusEncoder<W: Write> {
    writer: W,
    serial: u32,
    sequence: u32,
}

impl<W: Write> OggOpusEncoder<W> {
    /// Create an encoder and write both header pages at granule position 0
    pub fn new(writer: W, headers: &OpusHeaders) -> Result<Self, EncodeError> {
        let mut encoder = Self {
            writer,
            serial: STREAM_SERIAL,
            sequence: 0,
        };

        encoder.write_packet(&headers.identification_packet(), 0, "identification header page")?;
        encoder.write_packet(&headers.comment_packet(), 0, "comment header page")?;

        Ok(encoder)
    }

    /// Write one audio packet on its own page
    pub fn encode(&mut self, packet: &[u8], granule_position: i64) -> Result<(), EncodeError> {
        self.write_packet(packet, granule_position, "audio page")
    }

    fn write_packet(
        &mut self,
        packet: &[u8],
        granule_position: i64,
        what: &'static str,
    ) -> Result<(), EncodeError> {
        let mut page = Page::with_packet(self.serial, self.sequence, granule_position, packet)?;
        page.first_page = self.sequence == 0;

        // The whole page goes out in one write so a failure leaves no partial header.
        let bytes = page.to_bytes();
        self.writer
            .write_all(&bytes)
            .map_err(|source| EncodeError::Io { what, source })?;

        trace!(
            sequence = self.sequence,
            granule_position,
            len = packet.len(),
            "wrote ogg page"
        );
        self.sequence += 1;
        Ok(())
    }

    /// Number of pages written so far, headers included
    pub fn pages_written(&self) -> u32 {
        self.sequence
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}
