//! Windowed aging shared by every filter in the crate.
//!
//! None of the filters store timestamps. Each slot (cell or bucket entry)
//! carries a single "touched" bit instead, and an operation budget counts
//! down on every call. When a slot is swept, an untouched slot is evicted and
//! a touched one has its bit cleared, so it survives exactly one more window
//! unless something references it again.
//!
//! ```text
//! ACTIVE(touched) --sweep, untouched--> EVICTED
//! ACTIVE(touched) --sweep, touched----> ACTIVE(untouched)
//! any reference ----------------------> ACTIVE(touched)
//! ```
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How the aging pass is scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepMode {
    /// Sweep the whole table once every `window` operations.
    #[default]
    Full,
    /// Sweep a rotating slice of roughly `len / window` slots on every
    /// operation. Each slot is visited exactly once per window, so an entry
    /// untouched for two windows is gone, without the latency spike of a
    /// full pass.
    Incremental,
}

/// Operation budget driving the aging sweeps of one filter instance.
#[derive(Clone, Debug)]
pub struct AgingClock {
    window: usize,
    remaining: usize,
    mode: SweepMode,
    cursor: usize,
}

impl AgingClock {
    pub fn new(window: usize, mode: SweepMode) -> Self {
        debug_assert!(window > 0, "aging window must be non-zero");
        Self {
            window,
            remaining: window,
            mode,
            cursor: 0,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn mode(&self) -> SweepMode {
        self.mode
    }

    /// Operations left before the next full sweep. Always equals the window
    /// in incremental mode.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Records one operation on a table of `len` slots and returns the slots
    /// that must be swept now, if any.
    pub fn tick(&mut self, len: usize) -> Option<Range<usize>> {
        if len == 0 {
            return None;
        }
        match self.mode {
            SweepMode::Full => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.remaining = self.window;
                    Some(0..len)
                } else {
                    None
                }
            }
            SweepMode::Incremental => {
                // `cursor` is the position inside the window; slot boundaries
                // are spread evenly over it.
                let boundary = |pos: usize| {
                    (pos as u128 * len as u128 / self.window as u128) as usize
                };
                let start = boundary(self.cursor);
                let end = boundary(self.cursor + 1);
                self.cursor = (self.cursor + 1) % self.window;
                (start < end).then_some(start..end)
            }
        }
    }

    /// Re-arms the budget after an out-of-band full sweep.
    pub fn reset(&mut self) {
        self.remaining = self.window;
        self.cursor = 0;
    }
}
