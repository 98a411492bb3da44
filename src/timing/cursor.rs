use crate::events::TimedEvent;

use super::{EventTimeline, TimeMode};

/// Forward-only reader over an absolute-time timeline.
///
/// Everything before `marker` has been handed out exactly once; everything
/// from `marker` on has not.
#[derive(Debug)]
pub struct DispatchCursor {
    timeline: EventTimeline,
    marker: usize,
    last_elapsed: f64,
}

impl DispatchCursor {
    /// Panics if the timeline is still in delta mode.
    pub fn new(timeline: EventTimeline) -> Self {
        assert_eq!(
            timeline.mode(),
            TimeMode::Absolute,
            "dispatch cursor requires an absolute-time timeline"
        );
        Self {
            timeline,
            marker: 0,
            last_elapsed: 0.0,
        }
    }

    /// Returns the run of unsent events due at `elapsed` seconds, in file
    /// order, and moves past them.
    ///
    /// Stops at the first event that is not yet due. Absolute times never
    /// decrease, so nothing after it can be due either.
    pub fn take_due(&mut self, elapsed: f64) -> &[TimedEvent] {
        debug_assert!(
            elapsed >= self.last_elapsed,
            "elapsed time went backwards: {elapsed} < {}",
            self.last_elapsed
        );
        self.last_elapsed = elapsed;

        let events = self.timeline.events();
        let start = self.marker;
        let due = events[start..]
            .iter()
            .take_while(|e| e.time <= elapsed)
            .count();
        self.marker = start + due;
        &events[start..self.marker]
    }

    pub fn is_drained(&self) -> bool {
        self.marker == self.timeline.len()
    }

    pub fn position(&self) -> usize {
        self.marker
    }

    pub fn remaining(&self) -> usize {
        self.timeline.len() - self.marker
    }

    /// Scheduled time of the next unsent event.
    pub fn next_due(&self) -> Option<f64> {
        self.timeline.events().get(self.marker).map(|e| e.time)
    }

    pub fn timeline(&self) -> &EventTimeline {
        &self.timeline
    }
}
