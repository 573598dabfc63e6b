//! Sliding time-window event counter.
//!
//! # Responsibilities
//! - Count events in fixed 15 second slots
//! - Expire slots lazily as time moves forward
//! - Report the number of events seen in the last 10 minutes
//!
//! # Design Decisions
//! - Rotation happens on read and on write, there is no background ticker
//! - A gap of a full horizon or more clears every slot at once
//! - The last-move instant advances in whole slots so partial slots never drift

use std::time::{Duration, Instant};

/// Number of slots in the ring.
pub const SLOT_COUNT: usize = 40;

/// Time covered by a single slot.
pub const SLOT_DURATION: Duration = Duration::from_secs(15);

/// Total time covered by the window.
pub const HORIZON: Duration = Duration::from_secs(15 * SLOT_COUNT as u64);

/// Fixed-size ring of per-slot event counts covering [`HORIZON`].
///
/// The window never reads a clock itself; callers pass the current instant so
/// the owner decides where time comes from.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    slots: [u64; SLOT_COUNT],
    position: usize,
    last_move: Instant,
}

impl SlidingWindowCounter {
    /// Create an empty window anchored at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            slots: [0; SLOT_COUNT],
            position: 0,
            last_move: now,
        }
    }

    /// Add `n` events to the current slot.
    pub fn increment(&mut self, n: u64, now: Instant) {
        self.advance(now);
        self.slots[self.position] = self.slots[self.position].saturating_add(n);
    }

    /// Number of events inside the horizon ending at `now`.
    pub fn total(&mut self, now: Instant) -> u64 {
        self.advance(now);
        self.slots.iter().sum()
    }

    fn advance(&mut self, now: Instant) {
        // Instants earlier than the last move (clock anomalies) count as no time.
        let elapsed = now.saturating_duration_since(self.last_move);
        let steps = elapsed.as_nanos() / SLOT_DURATION.as_nanos();
        if steps == 0 {
            return;
        }

        if steps >= SLOT_COUNT as u128 {
            self.slots = [0; SLOT_COUNT];
            self.last_move = now;
            return;
        }

        let steps = steps as usize;
        for _ in 0..steps {
            self.position = (self.position + 1) % SLOT_COUNT;
            self.slots[self.position] = 0;
        }
        self.last_move += SLOT_DURATION * steps as u32;
    }
}
