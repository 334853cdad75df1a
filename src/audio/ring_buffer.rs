//! Fixed-capacity packet history shared by every speaker
//!
//! Ingestion appends at ~50 Hz per active speaker; replay builds read a
//! consistent oldest-to-newest view through [`RingBuffer::snapshot`].

use parking_lot::RwLock;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("packet iterator is exhausted")]
    Exhausted,
}

/// Stable identifier of one audio source in the captured window (the RTP SSRC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpeakerId(pub u32);

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One compressed frame as received from the voice stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Local arrival time
    pub captured_at: Instant,
    pub speaker: SpeakerId,
    /// Decoded-sample counter of the sender, wraps at 2^32
    pub sample_index: u32,
    /// Opaque Opus payload
    pub payload: Vec<u8>,
}

struct Slots {
    packets: Vec<AudioPacket>,
    /// Next slot to write
    cursor: usize,
    /// Number of live packets
    len: usize,
}

/// Thread-safe circular store of the most recent packets
pub struct RingBuffer {
    slots: RwLock<Slots>,
    capacity: usize,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` packets (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(Slots {
                packets: Vec::new(),
                cursor: 0,
                len: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a packet, evicting the oldest one once the buffer is full
    pub fn add(&self, captured_at: Instant, speaker: SpeakerId, sample_index: u32, payload: Vec<u8>) {
        let packet = AudioPacket {
            captured_at,
            speaker,
            sample_index,
            payload,
        };

        let mut slots = self.slots.write();
        let cursor = slots.cursor;
        // Storage grows lazily up to capacity, then slots are reused in place.
        if cursor == slots.packets.len() {
            slots.packets.push(packet);
        } else {
            slots.packets[cursor] = packet;
        }

        if slots.len < self.capacity {
            slots.len += 1;
        }
        slots.cursor = (cursor + 1) % self.capacity;
    }

    /// Drop every held packet
    pub fn reset(&self) {
        let mut slots = self.slots.write();
        slots.packets.clear();
        slots.cursor = 0;
        slots.len = 0;
    }

    /// Run `f` over an oldest-to-newest view of the buffer.
    ///
    /// Writers are blocked until `f` returns, so the view is a contiguous
    /// window of the add sequence.
    pub fn snapshot<R>(&self, f: impl FnOnce(PacketIter<'_>) -> R) -> R {
        let slots = self.slots.read();
        let oldest = (slots.cursor + self.capacity - slots.len) % self.capacity;
        f(PacketIter {
            packets: &slots.packets,
            capacity: self.capacity,
            position: oldest,
            remaining: slots.len,
        })
    }

    /// Clone out the packets captured strictly less than `window` before `now`.
    ///
    /// The lock is released before returning, so heavy work on the result
    /// does not stall ingestion.
    pub fn collect_recent(&self, now: Instant, window: Duration) -> Vec<AudioPacket> {
        self.snapshot(|iter| {
            iter.filter(|packet| now.saturating_duration_since(packet.captured_at) < window)
                .cloned()
                .collect()
        })
    }
}

/// Forward cursor over a [`RingBuffer::snapshot`]
pub struct PacketIter<'a> {
    packets: &'a [AudioPacket],
    capacity: usize,
    position: usize,
    remaining: usize,
}

impl<'a> PacketIter<'a> {
    pub fn has_next(&self) -> bool {
        self.remaining > 0
    }

    /// Advance to the next packet; callers must check [`has_next`](Self::has_next) first
    pub fn next_packet(&mut self) -> Result<&'a AudioPacket, BufferError> {
        if !self.has_next() {
            return Err(BufferError::Exhausted);
        }

        let packet = &self.packets[self.position];
        self.position = (self.position + 1) % self.capacity;
        self.remaining -= 1;
        Ok(packet)
    }
}

impl<'a> Iterator for PacketIter<'a> {
    type Item = &'a AudioPacket;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PacketIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const CAPACITY: usize = 100;

    fn fill(buffer: &RingBuffer, base: Instant, count: usize) {
        for i in 0..count {
            buffer.add(
                base + Duration::from_secs(i as u64),
                SpeakerId(i as u32),
                i as u32,
                vec![i as u8],
            );
        }
    }

    fn collect_indices(buffer: &RingBuffer) -> Vec<u32> {
        buffer.snapshot(|iter| iter.map(|p| p.sample_index).collect())
    }

    #[test]
    fn test_snapshot_sizes() {
        let cases = [
            (10, 10, 0),
            (CAPACITY, CAPACITY, 0),
            (CAPACITY * 3 / 2, CAPACITY, CAPACITY / 2),
            (CAPACITY * 2, CAPACITY, CAPACITY),
        ];

        for (inserted, expected_count, oldest) in cases {
            let buffer = RingBuffer::with_capacity(CAPACITY);
            let base = Instant::now();
            fill(&buffer, base, inserted);

            let mut counter = 0;
            buffer.snapshot(|mut iter| {
                while iter.has_next() {
                    let packet = iter.next_packet().unwrap();
                    let expected = counter + oldest;
                    assert_eq!(packet.captured_at, base + Duration::from_secs(expected as u64));
                    assert_eq!(packet.speaker, SpeakerId(expected as u32));
                    assert_eq!(packet.sample_index, expected as u32);
                    counter += 1;
                }
            });
            assert_eq!(counter, expected_count, "{} inserted", inserted);
        }
    }

    #[test]
    fn test_exhausted_iterator() {
        let buffer = RingBuffer::with_capacity(4);
        fill(&buffer, Instant::now(), 1);

        buffer.snapshot(|mut iter| {
            assert!(iter.next_packet().is_ok());
            assert!(!iter.has_next());
            assert_eq!(iter.next_packet(), Err(BufferError::Exhausted));
        });
    }

    #[test]
    fn test_reset() {
        let buffer = RingBuffer::with_capacity(8);
        fill(&buffer, Instant::now(), 20);
        assert_eq!(buffer.len(), 8);

        buffer.reset();
        assert!(buffer.is_empty());
        assert!(collect_indices(&buffer).is_empty());

        buffer.add(Instant::now(), SpeakerId(7), 42, vec![1, 2, 3]);
        assert_eq!(collect_indices(&buffer), vec![42]);
    }

    #[test]
    fn test_minimum_capacity() {
        assert_eq!(RingBuffer::with_capacity(90_000).capacity(), 90_000);
        assert_eq!(RingBuffer::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn test_collect_recent() {
        let buffer = RingBuffer::with_capacity(CAPACITY);
        let base = Instant::now();
        fill(&buffer, base, 10);

        let now = base + Duration::from_secs(9);
        let recent = buffer.collect_recent(now, Duration::from_secs(3));
        let indices: Vec<u32> = recent.iter().map(|p| p.sample_index).collect();
        assert_eq!(indices, vec![7, 8, 9]);
    }

    #[test]
    fn test_concurrent_adds_keep_order() {
        let buffer = Arc::new(RingBuffer::with_capacity(1_000));
        let base = Instant::now();

        let writers: Vec<_> = (0..4u32)
            .map(|speaker| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for i in 0..200u32 {
                        buffer.add(base, SpeakerId(speaker), i * 960, vec![0]);
                    }
                })
            })
            .collect();

        for _ in 0..10 {
            // Per-speaker order is preserved in every snapshot.
            buffer.snapshot(|iter| {
                let mut last = [None::<u32>; 4];
                for packet in iter {
                    let slot = &mut last[packet.speaker.0 as usize];
                    if let Some(prev) = *slot {
                        assert!(packet.sample_index > prev);
                    }
                    *slot = Some(packet.sample_index);
                }
            });
        }

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(buffer.len(), 800);
    }
}
