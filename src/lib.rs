//! Voice Replay
//!
//! Keeps a rolling window of per-speaker Opus packets from a voice channel
//! and, on request, writes one time-aligned Ogg Opus file per speaker so an
//! external mixer can combine them into a single clip.

pub mod audio;
pub mod config;
pub mod ogg;
pub mod recorder;
pub mod registry;

pub use audio::{AudioPacket, RingBuffer, SpeakerId, StreamSynchronizer};
pub use config::{Config, ConfigError};
pub use crate::ogg::{OggOpusEncoder, OpusHeaders};
pub use recorder::{Clock, RecorderError, ReplayFiles, ReplayRecorder, SpeakerFile, SystemClock};
pub use registry::RecorderRegistry;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`; returns false if a subscriber was already set.
pub fn init_logging() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,voice_replay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        assert!(!init_logging());
    }
}
