//! Audio module for capture buffering and replay assembly
//!
//! Holds the rolling packet history and turns it into per-speaker Opus files

pub mod ring_buffer;
pub mod sink;
pub mod synchronizer;

use std::time::Duration;

pub use ring_buffer::{AudioPacket, BufferError, PacketIter, RingBuffer, SpeakerId};
pub use sink::{MemorySinks, SinkProvider, TempDirSinks};
pub use synchronizer::StreamSynchronizer;

/// Audio sample rate (Discord uses 48kHz)
pub const SAMPLE_RATE: u32 = 48_000;

/// Audio channels (Discord uses stereo)
pub const CHANNELS: u8 = 2;

/// Duration of one Opus frame on the voice stream
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Samples covered by one frame at [`SAMPLE_RATE`]
pub const FRAME_SAMPLES: i64 = SAMPLE_RATE as i64 * 20 / 1000;

/// A single 20ms Opus frame of digital silence
pub const SILENT_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// Convert an elapsed duration to a sample count at [`SAMPLE_RATE`]
pub fn duration_to_samples(elapsed: Duration) -> i64 {
    (elapsed.as_nanos() * SAMPLE_RATE as u128 / 1_000_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(FRAME_SAMPLES, 960);
        assert_eq!(duration_to_samples(FRAME_DURATION), FRAME_SAMPLES);
        assert_eq!(duration_to_samples(Duration::from_millis(500)), 24_000);
    }
}
