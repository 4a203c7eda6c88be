//! # Receive Handoff
//!
//! Moves frames from the radio's reader task to the main loop.
//!
//! The staging slot is a bounded `mpsc` channel with room for one frame. The
//! producer ([`ReceiveContext`]) reserves that room before it reads a single
//! byte from the radio; when the room is taken it drains the radio and drops
//! the new frame, so the last unconsumed frame always wins over a newer one.
//! The consumer ([`StagedFrames`]) takes the frame out, which frees the slot.
//!
//! Dropping the producer (the reader task exited) disconnects the channel, and
//! the consumer reports that instead of waiting forever.

use std::sync::atomic::{AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::packet::protocol::MAX_FRAME_SIZE;
use crate::radio::{FrameCallback, FrameReader};

/// Staging buffer size in bytes
pub const STAGING_CAPACITY: usize = MAX_FRAME_SIZE;

/// Frames that may wait for the main loop
const SLOT_COUNT: usize = 1;

/// Create the producer and consumer ends of the handoff
pub fn channel() -> (ReceiveContext, StagedFrames) {
    let (tx, rx) = mpsc::channel(SLOT_COUNT);
    let stats = Arc::new(LinkStats::default());

    let producer = ReceiveContext {
        tx,
        stats: Arc::clone(&stats),
    };
    (producer, StagedFrames { rx, stats })
}

/// Owned copy of a staged frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFrame {
    bytes: [u8; STAGING_CAPACITY],
    len: usize,
}

impl StagedFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Link-level counters, updated by the producer
#[derive(Debug, Default)]
pub struct LinkStats {
    frames_staged: AtomicU64,
    overruns: AtomicU64,
    truncated: AtomicU64,
    short_reads: AtomicU64,
    last_rssi: AtomicI16,
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatsSnapshot {
    pub frames_staged: u64,
    pub overruns: u64,
    pub truncated: u64,
    pub short_reads: u64,
    pub last_rssi: i16,
}

impl LinkStats {
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            frames_staged: self.frames_staged.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
            last_rssi: self.last_rssi.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for LinkStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "staged={} overruns={} truncated={} short_reads={} last_rssi={} dBm",
            self.frames_staged, self.overruns, self.truncated, self.short_reads, self.last_rssi
        )
    }
}

/// What the handoff did with one arriving frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// Whole frame staged
    Staged { len: usize },

    /// Slot occupied (or main loop gone); frame drained and dropped
    Dropped { drained: usize },

    /// Frame longer than the staging buffer; the excess was drained
    Truncated { staged: usize, dropped: usize },

    /// Radio ran out of bytes early; what was read is staged
    ShortRead { expected: usize, staged: usize },
}

/// Producer end, owned by the radio callback
#[derive(Debug)]
pub struct ReceiveContext {
    tx: mpsc::Sender<StagedFrame>,
    stats: Arc<LinkStats>,
}

impl ReceiveContext {
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Handle one frame arrival
    ///
    /// Never blocks and never writes past the staging buffer.
    ///
    /// # Arguments
    ///
    /// * `reader` - Byte access to the frame that just arrived
    /// * `length` - Frame length reported by the radio
    pub fn on_frame_received(&self, reader: &mut dyn FrameReader, length: usize) -> HandoffOutcome {
        let rssi = reader.signal_strength();

        let permit = match self.tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                let drained = drain(reader, length);
                self.stats.overruns.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Overrun: dropped {} byte frame, previous frame not yet consumed",
                    length
                );
                return HandoffOutcome::Dropped { drained };
            }
            Err(TrySendError::Closed(())) => {
                let drained = drain(reader, length);
                debug!("Main loop gone, dropped {} byte frame", length);
                return HandoffOutcome::Dropped { drained };
            }
        };

        let wanted = length.min(STAGING_CAPACITY);
        let mut frame = StagedFrame {
            bytes: [0; STAGING_CAPACITY],
            len: 0,
        };
        while frame.len < wanted {
            match reader.read_byte() {
                Some(byte) => {
                    frame.bytes[frame.len] = byte;
                    frame.len += 1;
                }
                None => break,
            }
        }

        let staged = frame.len;
        permit.send(frame);
        self.stats.frames_staged.fetch_add(1, Ordering::Relaxed);
        self.stats.last_rssi.store(rssi, Ordering::Relaxed);

        if staged < wanted {
            self.stats.short_reads.fetch_add(1, Ordering::Relaxed);
            warn!("Short read: radio reported {} bytes, delivered {}", length, staged);
            return HandoffOutcome::ShortRead {
                expected: length,
                staged,
            };
        }

        if length > STAGING_CAPACITY {
            let dropped = drain(reader, length - STAGING_CAPACITY);
            self.stats.truncated.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Frame of {} bytes exceeds staging capacity {}, {} bytes dropped",
                length, STAGING_CAPACITY, dropped
            );
            return HandoffOutcome::Truncated { staged, dropped };
        }

        debug!("Staged {} byte frame (RSSI {} dBm)", staged, rssi);
        HandoffOutcome::Staged { len: staged }
    }

    /// Radio callback that feeds this producer
    ///
    /// The channel disconnects when the radio drops the callback.
    pub fn into_callback(self) -> FrameCallback {
        Box::new(move |reader: &mut dyn FrameReader, length: usize| {
            self.on_frame_received(reader, length);
        })
    }
}

/// Consumer end, owned by the main loop
#[derive(Debug)]
pub struct StagedFrames {
    rx: mpsc::Receiver<StagedFrame>,
    stats: Arc<LinkStats>,
}

impl StagedFrames {
    /// Whether a frame is waiting
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Take the staged frame, if any, freeing the slot
    ///
    /// # Errors
    ///
    /// Returns error once the producer is gone and nothing is left to take
    pub fn take(&mut self) -> Result<Option<StagedFrame>> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(GatewayError::Radio(
                "radio listener stopped, no further frames can arrive".to_string(),
            )),
        }
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}

/// Discard up to `count` bytes from the radio
fn drain(reader: &mut dyn FrameReader, count: usize) -> usize {
    (0..count).take_while(|_| reader.read_byte().is_some()).count()
}
