//! Aligns every speaker in a snapshot to one shared timeline
//!
//! Each speaker gets its own Ogg Opus stream. Streams start at the replay
//! origin (the first eligible packet) and gaps are filled with silent
//! frames, so all files have the same time base and can be mixed directly.

use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{duration_to_samples, AudioPacket, SinkProvider, SpeakerId, FRAME_SAMPLES, SILENT_FRAME};
use crate::ogg::{EncodeError, OggOpusEncoder, OpusHeaders};
use crate::recorder::RecorderError;

/// Backward counter jumps up to this size are treated as reordered or
/// duplicate packets; anything larger means the sender restarted its counter.
const MAX_REORDER: i64 = 5 * FRAME_SAMPLES;

/// The shared time base of one build
#[derive(Debug, Clone, Copy)]
struct Timeline {
    /// Capture time of the first eligible packet
    start: Instant,
    /// Samples from `start` to the build time; no gap can be longer
    span: i64,
}

impl Timeline {
    fn new(start: Instant, now: Instant) -> Self {
        Self {
            start,
            span: duration_to_samples(now.saturating_duration_since(start)),
        }
    }

    /// Timeline position implied by a capture time
    fn position_at(&self, captured_at: Instant) -> i64 {
        duration_to_samples(captured_at.saturating_duration_since(self.start)).min(self.span)
    }
}

/// Per-speaker state, alive for one build only
struct StreamState<W: io::Write> {
    speaker: SpeakerId,
    encoder: OggOpusEncoder<W>,
    /// Raw counter of the last packet seen
    anchor_raw: u32,
    /// Timeline position matching `anchor_raw`
    anchor_position: i64,
    /// Timeline start of the last frame written
    last_emitted: i64,
    real_frames: u64,
    silent_frames: u64,
}

impl<W: io::Write> StreamState<W> {
    /// Map a raw 32-bit counter onto the timeline, unwrapping relative to the anchor
    fn position(&self, raw: u32) -> i64 {
        self.anchor_position + raw.wrapping_sub(self.anchor_raw) as i32 as i64
    }

    /// Place a packet by its capture time when its counter can't be trusted,
    /// never before the frame already written
    fn reanchor(&mut self, packet: &AudioPacket, timeline: &Timeline) -> i64 {
        let position = timeline
            .position_at(packet.captured_at)
            .max(self.last_emitted + FRAME_SAMPLES);
        self.anchor_raw = packet.sample_index;
        self.anchor_position = position;
        position
    }
}

/// Builds one replay stream per speaker from an ordered packet sequence
pub struct StreamSynchronizer {
    now: Instant,
    window: Duration,
    headers: OpusHeaders,
}

impl StreamSynchronizer {
    /// Keep packets captured less than `window` before `now`
    pub fn new(now: Instant, window: Duration, headers: OpusHeaders) -> Self {
        Self {
            now,
            window,
            headers,
        }
    }

    fn is_eligible(&self, packet: &AudioPacket) -> bool {
        self.now.saturating_duration_since(packet.captured_at) < self.window
    }

    /// Encode `packets` (oldest first) into one output per speaker.
    ///
    /// Outputs are returned in order of each speaker's first appearance.
    /// Returns [`RecorderError::NoAudioData`] when nothing is recent enough.
    /// On failure the provider is told to abort.
    pub fn run<'a, I, P>(
        &self,
        packets: I,
        sinks: &mut P,
    ) -> Result<Vec<(SpeakerId, P::Output)>, RecorderError>
    where
        I: IntoIterator<Item = &'a AudioPacket>,
        P: SinkProvider,
    {
        let result = self.encode_streams(packets, sinks);
        if result.is_err() {
            sinks.abort();
        }
        result
    }

    fn encode_streams<'a, I, P>(
        &self,
        packets: I,
        sinks: &mut P,
    ) -> Result<Vec<(SpeakerId, P::Output)>, RecorderError>
    where
        I: IntoIterator<Item = &'a AudioPacket>,
        P: SinkProvider,
    {
        let mut streams: Vec<StreamState<P::Sink>> = Vec::new();
        let mut index: HashMap<SpeakerId, usize> = HashMap::new();
        let mut timeline: Option<Timeline> = None;

        for packet in packets {
            if !self.is_eligible(packet) {
                continue;
            }

            // Packets are ordered, so the first eligible one is the replay origin.
            let timeline = *timeline.get_or_insert_with(|| {
                debug!("Replay stream starts at {:?}", packet.captured_at);
                Timeline::new(packet.captured_at, self.now)
            });

            let slot = match index.get(&packet.speaker) {
                Some(&slot) => slot,
                None => {
                    let state = self.open_stream(packet, &timeline, sinks)?;
                    streams.push(state);
                    index.insert(packet.speaker, streams.len() - 1);
                    streams.len() - 1
                }
            };

            emit(&mut streams[slot], packet, &timeline)?;
        }

        if streams.is_empty() {
            return Err(RecorderError::NoAudioData);
        }

        let mut outputs = Vec::with_capacity(streams.len());
        for state in streams {
            info!(
                "Speaker {}: {} frames, {} silent frames inserted",
                state.speaker, state.real_frames, state.silent_frames
            );
            let speaker = state.speaker;
            let output = sinks
                .finish(speaker, state.encoder.into_inner())
                .map_err(|source| RecorderError::FinishSink { speaker, source })?;
            outputs.push((speaker, output));
        }

        Ok(outputs)
    }

    fn open_stream<P: SinkProvider>(
        &self,
        packet: &AudioPacket,
        timeline: &Timeline,
        sinks: &mut P,
    ) -> Result<StreamState<P::Sink>, RecorderError> {
        let speaker = packet.speaker;
        let sink = sinks
            .open(speaker)
            .map_err(|source| RecorderError::CreateSink { speaker, source })?;
        let encoder = OggOpusEncoder::new(sink, &self.headers)
            .map_err(|source| RecorderError::Encode { speaker, source })?;

        // Place the first frame where it belongs on the shared timeline and
        // pretend the previous frame ended at the origin, so the regular gap
        // handling writes exactly `lead_in` samples of silence.
        let lead_in = timeline.position_at(packet.captured_at);
        debug!("New stream for speaker {} with {} samples of lead-in", speaker, lead_in);

        Ok(StreamState {
            speaker,
            encoder,
            anchor_raw: packet.sample_index,
            anchor_position: lead_in,
            last_emitted: -FRAME_SAMPLES,
            real_frames: 0,
            silent_frames: 0,
        })
    }
}

/// Write `packet` for its stream, preceded by silence covering any gap
fn emit<W: io::Write>(
    state: &mut StreamState<W>,
    packet: &AudioPacket,
    timeline: &Timeline,
) -> Result<(), RecorderError> {
    let speaker = state.speaker;
    let mut position = state.position(packet.sample_index);

    if position <= state.last_emitted {
        if state.last_emitted - position <= MAX_REORDER {
            debug!(
                "Dropping out-of-order packet for speaker {} ({} <= {})",
                speaker, position, state.last_emitted
            );
            return Ok(());
        }
        position = state.reanchor(packet, timeline);
        warn!(
            "Speaker {}: sample counter went back to {}, re-anchored at {}",
            speaker, packet.sample_index, position
        );
    } else if position - (state.last_emitted + FRAME_SAMPLES) > timeline.span {
        position = state.reanchor(packet, timeline);
        warn!(
            "Speaker {}: sample counter jumped to {}, longer than the replay; re-anchored at {}",
            speaker, packet.sample_index, position
        );
    }

    let gap = position - (state.last_emitted + FRAME_SAMPLES);
    let missing = gap / FRAME_SAMPLES;
    if missing > 0 && state.real_frames > 0 {
        debug!("Speaker {}: padding {} lost frames", speaker, missing);
    }

    let encode_err = |source: EncodeError| RecorderError::Encode { speaker, source };

    // Granule positions count samples up to the end of each frame.
    for k in (1..=missing).rev() {
        let frame_start = position - k * FRAME_SAMPLES;
        state
            .encoder
            .encode(&SILENT_FRAME, frame_start + FRAME_SAMPLES)
            .map_err(encode_err)?;
        state.silent_frames += 1;
    }

    state
        .encoder
        .encode(&packet.payload, position + FRAME_SAMPLES)
        .map_err(encode_err)?;
    state.real_frames += 1;

    state.anchor_raw = packet.sample_index;
    state.anchor_position = position;
    state.last_emitted = position;
    Ok(())
}
