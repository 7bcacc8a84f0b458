//! Vertical scan position.
//!
//! `ScanState` is the line/frame state machine: a phase from
//! [`LinePhase`] plus the line counter within that phase. It advances exactly
//! once per tick and has no failure modes.

use platform::{LinePhase, TimingDescriptor};

/// Current vertical phase and line within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanState {
    phase: LinePhase,
    counter: u32,
}

impl ScanState {
    /// Start of the front porch, line 0.
    pub const fn new() -> Self {
        Self {
            phase: LinePhase::FrontPorch,
            counter: 0,
        }
    }

    /// Move to the next line, entering the next phase when the current one
    /// is exhausted.
    pub fn advance(&mut self, timing: &TimingDescriptor) {
        self.counter = self.counter.saturating_add(1);
        if self.counter >= timing.phase_length(self.phase) {
            self.phase = self.phase.next();
            self.counter = 0;
        }
    }

    /// Back to the start of the front porch.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current phase.
    pub fn phase(&self) -> LinePhase {
        self.phase
    }

    /// Line within the current phase.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}
