//! Countdown state machine.
//!
//! `Idle -> Running -> Finished`. Each run is tagged with a [`Generation`];
//! ticks carrying an older generation are stale and do nothing. The
//! machine never schedules anything itself: the session actor arranges
//! one pending tick per generation and feeds it back through [`Countdown::tick`].

use serde::Serialize;

/// Identity of one countdown run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownStatus {
    Idle,
    Running,
    Finished,
}

/// Outcome of processing one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Tick belongs to a cancelled or restarted run; emit nothing.
    Stale,
    /// Emit the value and schedule the next tick.
    Remaining(u64),
    /// Emit 0 and the finish notification. Returned once per run.
    Finished,
}

#[derive(Debug)]
pub struct Countdown {
    generation: u64,
    remaining: u64,
    status: CountdownStatus,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Countdown {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: 0,
            remaining: 0,
            status: CountdownStatus::Idle,
        }
    }

    /// Start (or restart) a run of `duration_secs` seconds.
    ///
    /// Any tick from an earlier run becomes stale.
    pub fn start(&mut self, duration_secs: u64) -> Generation {
        self.generation += 1;
        self.remaining = duration_secs;
        self.status = CountdownStatus::Running;
        Generation(self.generation)
    }

    /// Process a tick for `generation`.
    pub fn tick(&mut self, generation: Generation) -> Tick {
        if generation.0 != self.generation || self.status != CountdownStatus::Running {
            return Tick::Stale;
        }

        if self.remaining == 0 {
            self.status = CountdownStatus::Finished;
            return Tick::Finished;
        }

        let emitted = self.remaining;
        self.remaining -= 1;
        Tick::Remaining(emitted)
    }

    /// Invalidate the current run. Status is left as it was.
    pub fn cancel(&mut self) {
        self.generation += 1;
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn status(&self) -> CountdownStatus {
        self.status
    }
}
