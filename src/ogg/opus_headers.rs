//! Opus-in-Ogg header packets (RFC 7845 §5)

use crate::audio::{CHANNELS, SAMPLE_RATE};

pub const ID_MAGIC: [u8; 8] = *b"OpusHead";
pub const COMMENT_MAGIC: [u8; 8] = *b"OpusTags";
pub const VERSION: u8 = 1;

/// Pre-skip recommended by RFC 7845 for a 48 kHz encoder
pub const PRE_SKIP: u16 = 3840;
/// Q7.8 dB
pub const OUTPUT_GAIN: i16 = 0;
/// Mono/stereo, no mapping table
pub const MAPPING_FAMILY: u8 = 0;

/// Stream-level values written into the two header packets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusHeaders {
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
    pub vendor: String,
}

impl Default for OpusHeaders {
    fn default() -> Self {
        Self {
            channels: CHANNELS,
            pre_skip: PRE_SKIP,
            input_sample_rate: SAMPLE_RATE,
            output_gain: OUTPUT_GAIN,
            mapping_family: MAPPING_FAMILY,
            vendor: "voice-replay".to_string(),
        }
    }
}

impl OpusHeaders {
    pub fn with_vendor(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            ..Default::default()
        }
    }

    /// Identification header: magic, version, channel count, pre-skip,
    /// input sample rate, output gain, mapping family
    pub fn identification_packet(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(19);
        out.extend_from_slice(&ID_MAGIC);
        out.push(VERSION);
        out.push(self.channels);
        out.extend_from_slice(&self.pre_skip.to_le_bytes());
        out.extend_from_slice(&self.input_sample_rate.to_le_bytes());
        out.extend_from_slice(&self.output_gain.to_le_bytes());
        out.push(self.mapping_family);
        out
    }

    /// Comment header: magic, length-prefixed vendor string, empty comment list
    pub fn comment_packet(&self) -> Vec<u8> {
        let vendor = self.vendor.as_bytes();
        let mut out = Vec::with_capacity(16 + vendor.len());
        out.extend_from_slice(&COMMENT_MAGIC);
        out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        out.extend_from_slice(vendor);
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identification_layout() {
        let packet = OpusHeaders::default().identification_packet();
        assert_eq!(
            packet,
            vec![
                b'O', b'p', b'u', b's', b'H', b'e', b'a', b'd', // magic
                1,    // version
                2,    // channels
                0x00, 0x0F, // pre-skip 3840
                0x80, 0xBB, 0x00, 0x00, // 48000 Hz
                0x00, 0x00, // gain
                0,    // mapping family
            ]
        );
    }

    #[test]
    fn test_comment_layout() {
        let packet = OpusHeaders::with_vendor("abc").comment_packet();
        assert_eq!(&packet[..8], b"OpusTags");
        assert_eq!(&packet[8..12], &[3, 0, 0, 0]);
        assert_eq!(&packet[12..15], b"abc");
        assert_eq!(&packet[15..], &[0, 0, 0, 0]);
    }
}
