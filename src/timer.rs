//! Timers
//!
//! Pollable one-shot timers driven by an injectable clock. Components that
//! need delayed work (chord debounce, snapshot cadence, playback scheduling)
//! push tokens into a [`TimerQueue`] and drain the due ones from their pump
//! path; hosts decide how often to pump and may sleep until
//! [`TimerQueue::next_deadline`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic milliseconds for timers and event timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since the clock's fixed origin.
    fn now_ms(&self) -> u64;
}

/// Wall clock measured from the moment it was created.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is "now".
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-advanced clock for deterministic timing tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock stopped at 0 ms.
    pub fn new() -> Self {
        ManualClock {
            now: AtomicU64::new(0),
        }
    }

    /// Move the clock forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Identifies a scheduled timer so it can be canceled before it fires.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct TimerEntry<T> {
    id: u64,
    deadline_ms: u64,
    token: T,
}

/// One-shot timers keyed by a caller-defined token type.
///
/// Firing order is by deadline, then by scheduling order for equal
/// deadlines. The queue holds no clock; callers pass the current time in.
#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: Vec<TimerEntry<T>>,
    next_id: u64,
}

impl<T> TimerQueue<T> {
    /// An empty queue.
    pub fn new() -> Self {
        TimerQueue {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule `token` to become due `delay_ms` after `now_ms`.
    pub fn schedule_after(&mut self, now_ms: u64, delay_ms: u64, token: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(TimerEntry {
            id,
            deadline_ms: now_ms.saturating_add(delay_ms),
            token,
        });
        TimerHandle(id)
    }

    /// Cancel a pending timer. Returns whether it was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.entries.iter().position(|e| e.id == handle.0) {
            Some(idx) => {
                self.entries.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Remove and return the next due token, if any.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<T> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.deadline_ms, e.id))
            .map(|(idx, _)| idx)?;
        if self.entries[idx].deadline_ms > now_ms {
            return None;
        }
        Some(self.entries.swap_remove(idx).token)
    }

    /// Earliest pending deadline, if any timer is scheduled.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.deadline_ms).min()
    }

    /// Drop every pending timer.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether no timers are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
