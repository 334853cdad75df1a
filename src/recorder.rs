//! Rolling voice recorder with on-demand replay export
//!
//! Keeps the last stretch of compressed voice packets for a capture context
//! and writes one time-aligned Ogg Opus file per speaker when asked.

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::{RingBuffer, SpeakerId, StreamSynchronizer, TempDirSinks};
use crate::config::Config;
use crate::ogg::{EncodeError, OpusHeaders};

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("No audio data available")]
    NoAudioData,
    #[error("Failed to create output for speaker {speaker}: {source}")]
    CreateSink {
        speaker: SpeakerId,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode stream for speaker {speaker}: {source}")]
    Encode {
        speaker: SpeakerId,
        #[source]
        source: EncodeError,
    },
    #[error("Failed to finish output for speaker {speaker}: {source}")]
    FinishSink {
        speaker: SpeakerId,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Replay task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RecorderError {
    /// True for the expected "nothing recorded yet" outcome
    pub fn is_no_audio(&self) -> bool {
        matches!(self, RecorderError::NoAudioData)
    }
}

/// Monotonic time source used for age filtering
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The system monotonic clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<F> Clock for F
where
    F: Fn() -> Instant + Send + Sync,
{
    fn now(&self) -> Instant {
        self()
    }
}

/// One finished per-speaker file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerFile {
    pub speaker: SpeakerId,
    pub path: PathBuf,
}

/// The files produced by one replay build, in order of first appearance
#[derive(Debug, Default)]
pub struct ReplayFiles {
    files: Vec<SpeakerFile>,
}

impl ReplayFiles {
    pub fn files(&self) -> &[SpeakerFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }

    /// Delete the files once the mixer is done with them
    pub fn cleanup(self) {
        for file in self.files {
            match fs::remove_file(&file.path) {
                Ok(_) => debug!("Removed temp file: {:?}", file.path),
                Err(e) => warn!("Failed to remove {:?}: {}", file.path, e),
            }
        }
    }
}

impl IntoIterator for ReplayFiles {
    type Item = SpeakerFile;
    type IntoIter = std::vec::IntoIter<SpeakerFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Packet history for one capture context plus the replay exporter
pub struct ReplayRecorder {
    buffer: RingBuffer,
    clock: Arc<dyn Clock>,
    headers: OpusHeaders,
    temp_dir: PathBuf,
    /// Replay length bounds
    limits: Config,
    /// Voice channel currently being captured
    channel: Mutex<Option<u64>>,
}

impl ReplayRecorder {
    /// Create a recorder using the system clock
    pub fn new(config: &Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            buffer: RingBuffer::with_capacity(config.buffer_capacity()),
            clock,
            headers: OpusHeaders::with_vendor(config.vendor.clone()),
            temp_dir: config.temp_audio_dir.clone(),
            limits: config.clone(),
            channel: Mutex::new(None),
        }
    }

    /// Record one incoming voice packet, stamped with the recorder's clock
    pub fn add_packet(&self, speaker: SpeakerId, sample_index: u32, payload: &[u8]) {
        self.add_packet_at(self.clock.now(), speaker, sample_index, payload);
    }

    /// Record one incoming voice packet with an explicit capture time
    pub fn add_packet_at(&self, captured_at: Instant, speaker: SpeakerId, sample_index: u32, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        self.buffer.add(captured_at, speaker, sample_index, payload.to_vec());
    }

    /// Forget all captured history
    pub fn reset(&self) {
        self.buffer.reset();
        debug!("Replay history cleared");
    }

    /// Switch the capture context, clearing history when it changes.
    ///
    /// Returns whether the buffer was reset.
    pub fn move_to_channel(&self, channel: Option<u64>) -> bool {
        let mut current = self.channel.lock();
        if *current == channel {
            return false;
        }

        info!("Capture moved from {:?} to {:?}, clearing history", *current, channel);
        *current = channel;
        self.reset();
        true
    }

    pub fn current_channel(&self) -> Option<u64> {
        *self.channel.lock()
    }

    /// Number of packets currently held
    pub fn buffered_packets(&self) -> usize {
        self.buffer.len()
    }

    /// Maximum number of packets kept before the oldest are overwritten
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn has_data(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Write one aligned Ogg Opus file per speaker heard in the last `duration`.
    ///
    /// `duration` is clamped to the configured minimum and maximum replay
    /// length. The eligible packets are copied out first so ingestion is only
    /// blocked for the copy, not for encoding.
    pub fn build_replay(&self, duration: Duration) -> Result<ReplayFiles, RecorderError> {
        let duration = self.limits.replay_duration(Some(duration));
        let now = self.clock.now();
        let packets = self.buffer.collect_recent(now, duration);
        info!(
            "Building replay of {:?} from {} buffered packets",
            duration,
            packets.len()
        );

        if packets.is_empty() {
            info!("No audio in the last {:?}", duration);
            return Err(RecorderError::NoAudioData);
        }

        let mut sinks = TempDirSinks::new(&self.temp_dir)?;
        let synchronizer = StreamSynchronizer::new(now, duration, self.headers.clone());
        let outputs = synchronizer.run(&packets, &mut sinks)?;

        let files: Vec<SpeakerFile> = outputs
            .into_iter()
            .map(|(speaker, path)| SpeakerFile { speaker, path })
            .collect();
        info!("Replay ready: {} speaker file(s)", files.len());

        Ok(ReplayFiles { files })
    }

    /// [`build_replay`](Self::build_replay) on the blocking thread pool
    pub async fn build_replay_async(
        self: &Arc<Self>,
        duration: Duration,
    ) -> Result<ReplayFiles, RecorderError> {
        let recorder = Arc::clone(self);
        tokio::task::spawn_blocking(move || recorder.build_replay(duration)).await?
    }
}
