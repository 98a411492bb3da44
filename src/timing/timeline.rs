use std::fmt;

use crate::events::TimedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    /// Each time is the gap since the previous event.
    Delta,
    /// Each time is the offset from the start of the sequence.
    Absolute,
}

/// Events in file order. The order is never changed; only the meaning of
/// each event's `time` is converted.
///
/// Conversions use `f64` arithmetic. A round trip through `to_absolute` and
/// `to_relative` is exact for values that sum without rounding (dyadic
/// fractions such as 0.5 or 0.125) and otherwise accurate to a few ULPs of
/// the running total.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTimeline {
    events: Vec<TimedEvent>,
    mode: TimeMode,
}

impl EventTimeline {
    pub fn from_deltas(events: Vec<TimedEvent>) -> Self {
        debug_assert!(events.iter().all(|e| e.time >= 0.0));
        Self {
            events,
            mode: TimeMode::Delta,
        }
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total length of the sequence in seconds.
    pub fn duration(&self) -> f64 {
        match self.mode {
            TimeMode::Delta => self.events.iter().map(|e| e.time).sum(),
            TimeMode::Absolute => self.events.last().map_or(0.0, |e| e.time),
        }
    }

    /// (e1, 0.5), (e2, 1.0), (e3, 0.5) -> (e1, 0.5), (e2, 1.5), (e3, 2.0)
    ///
    /// Panics if the timeline is already in absolute mode.
    pub fn to_absolute(&mut self) {
        assert_eq!(
            self.mode,
            TimeMode::Delta,
            "timeline is already in absolute time"
        );
        for i in 1..self.events.len() {
            self.events[i].time += self.events[i - 1].time;
        }
        self.mode = TimeMode::Absolute;
    }

    /// (e1, 0.5), (e2, 1.5), (e3, 2.0) -> (e1, 0.5), (e2, 1.0), (e3, 0.5)
    ///
    /// Walks from the tail so every difference reads an unconverted
    /// neighbour. Panics if the timeline is already in delta mode.
    pub fn to_relative(&mut self) {
        assert_eq!(
            self.mode,
            TimeMode::Absolute,
            "timeline is already in delta time"
        );
        for i in (1..self.events.len()).rev() {
            self.events[i].time -= self.events[i - 1].time;
        }
        self.mode = TimeMode::Delta;
    }
}

impl fmt::Display for EventTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "> | time, status, data1, data2")?;
        for event in &self.events {
            writeln!(f, "> | {:.3}, {}", event.time, event.payload)?;
        }
        Ok(())
    }
}
