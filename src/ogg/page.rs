//! Ogg page framing
//!
//! ```text
//!  byte  field
//!  0-3   capture pattern "OggS"
//!  4     stream structure version (0)
//!  5     header type flags
//!  6-13  granule position (i64 LE)
//!  14-17 bitstream serial number (u32 LE)
//!  18-21 page sequence number (u32 LE)
//!  22-25 CRC checksum (u32 LE)
//!  26    number of segments
//!  27-   segment table, then segment data
//! ```

use super::crc;
use super::EncodeError;

pub const CAPTURE_PATTERN: [u8; 4] = *b"OggS";
pub const MAX_SEGMENT_LEN: usize = 255;
pub const MAX_SEGMENTS: usize = 255;
pub const HEADER_LEN: usize = 27;
const CRC_OFFSET: usize = 22;

pub const CONTINUED_FLAG: u8 = 1 << 0;
pub const FIRST_PAGE_FLAG: u8 = 1 << 1;
pub const LAST_PAGE_FLAG: u8 = 1 << 2;

/// A single page under construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub continued: bool,
    pub first_page: bool,
    pub last_page: bool,
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    segment_table: Vec<u8>,
    body: Vec<u8>,
}

impl Page {
    pub fn new(serial: u32, sequence: u32, granule_position: i64) -> Self {
        Self {
            serial,
            sequence,
            granule_position,
            ..Default::default()
        }
    }

    /// Build a page holding exactly one complete packet.
    ///
    /// A packet whose length is a multiple of 255 (including 0) ends with a
    /// zero-length segment, since only a short segment marks a packet end.
    pub fn with_packet(
        serial: u32,
        sequence: u32,
        granule_position: i64,
        packet: &[u8],
    ) -> Result<Self, EncodeError> {
        let mut page = Self::new(serial, sequence, granule_position);
        for segment in packet.chunks(MAX_SEGMENT_LEN) {
            page.add_segment(segment)?;
        }
        if packet.len() % MAX_SEGMENT_LEN == 0 {
            page.add_segment(&[])?;
        }
        Ok(page)
    }

    pub fn add_segment(&mut self, segment: &[u8]) -> Result<(), EncodeError> {
        if segment.len() > MAX_SEGMENT_LEN {
            return Err(EncodeError::SegmentTooLong(segment.len()));
        }
        if self.segment_table.len() == MAX_SEGMENTS {
            return Err(EncodeError::SegmentTableFull);
        }

        self.segment_table.push(segment.len() as u8);
        self.body.extend_from_slice(segment);
        Ok(())
    }

    pub fn segment_table(&self) -> &[u8] {
        &self.segment_table
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn header_type(&self) -> u8 {
        let mut flags = 0;
        if self.continued {
            flags |= CONTINUED_FLAG;
        }
        if self.first_page {
            flags |= FIRST_PAGE_FLAG;
        }
        if self.last_page {
            flags |= LAST_PAGE_FLAG;
        }
        flags
    }

    /// Serialize the page with its checksum filled in
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(HEADER_LEN + self.segment_table.len() + self.body.len());
        out.extend_from_slice(&CAPTURE_PATTERN);
        out.push(0); // version
        out.push(self.header_type());
        out.extend_from_slice(&self.granule_position.to_le_bytes());
        out.extend_from_slice(&self.serial.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.push(self.segment_table.len() as u8);
        out.extend_from_slice(&self.segment_table);
        out.extend_from_slice(&self.body);

        let checksum = crc::checksum(&out);
        out[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        out
    }
}
