use spin_sleep::SpinSleeper;
use std::time::{Duration, Instant};

/// Source of monotonic time for the dispatch loop.
///
/// `now` is measured from an arbitrary fixed origin and never goes backwards.
pub trait Clock {
    fn now(&mut self) -> Duration;

    /// Block until `now()` reaches `deadline`. Returns immediately if it
    /// already has.
    fn sleep_until(&mut self, deadline: Duration);
}

/// Wall clock backed by `Instant`, so system clock adjustments cannot
/// reorder or stretch playback. Waits spin out the last stretch instead of
/// relying on OS timer granularity.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
    sleeper: SpinSleeper,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sleeper: SpinSleeper::default(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&mut self, deadline: Duration) {
        let now = self.origin.elapsed();
        if deadline > now {
            self.sleeper.sleep(deadline - now);
        }
    }
}

/// Clock that only moves when told to. Sleeping jumps straight to the
/// deadline; `lag` adds a fixed overshoot to every sleep to imitate a busy
/// machine.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Duration,
    lag: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lag(lag: Duration) -> Self {
        Self {
            now: Duration::ZERO,
            lag,
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> Duration {
        self.now
    }

    fn sleep_until(&mut self, deadline: Duration) {
        if deadline > self.now {
            self.now = deadline;
        }
        self.now += self.lag;
    }
}
