use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace};

use super::{Clock, DispatchCursor, EventTimeline};
use crate::output::{OutputSink, SinkError, SinkGuard};
use crate::send_log::SendLog;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("tick interval must be positive, got {0:?}")]
    InvalidInterval(Duration),
    #[error("failed to send event {index}: {source}")]
    Send {
        index: usize,
        #[source]
        source: SinkError,
        /// Everything that went out before the failure.
        partial: SendLog,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Loaded, still in delta time.
    Priming,
    /// Absolute time, cursor advancing.
    Running,
    /// Every event has been sent.
    Drained,
}

/// Fixed-interval polling loop that replays a timeline through a sink.
///
/// Latency between an event's scheduled instant and its send is bounded by
/// roughly one tick interval plus scheduler wake-up delay. A smaller interval
/// lowers jitter at the cost of more wake-ups; it never changes which events
/// are sent or their order.
#[derive(Debug)]
pub struct Dispatcher {
    pending: Option<EventTimeline>,
    cursor: Option<DispatchCursor>,
    tick_interval: Duration,
    start: Duration,
    next_tick: Duration,
    ticks: u64,
    log: SendLog,
}

impl Dispatcher {
    pub fn new(timeline: EventTimeline, tick_interval: Duration) -> Result<Self, DispatchError> {
        if tick_interval.is_zero() {
            return Err(DispatchError::InvalidInterval(tick_interval));
        }
        Ok(Self {
            log: SendLog::with_capacity(timeline.len()),
            pending: Some(timeline),
            cursor: None,
            tick_interval,
            start: Duration::ZERO,
            next_tick: Duration::ZERO,
            ticks: 0,
        })
    }

    pub fn state(&self) -> PlaybackState {
        match (&self.pending, &self.cursor) {
            (Some(_), _) => PlaybackState::Priming,
            (None, Some(cursor)) if !cursor.is_drained() => PlaybackState::Running,
            _ => PlaybackState::Drained,
        }
    }

    pub fn log(&self) -> &SendLog {
        &self.log
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Priming -> Running: convert to absolute time and pin the start
    /// instant. Panics if already started.
    pub fn start(&mut self, clock: &mut impl Clock) {
        let Some(mut timeline) = self.pending.take() else {
            panic!("dispatcher already started");
        };
        timeline.to_absolute();
        info!(
            events = timeline.len(),
            duration_secs = timeline.duration(),
            tick_ms = self.tick_interval.as_secs_f64() * 1000.0,
            "starting playback"
        );
        self.cursor = Some(DispatchCursor::new(timeline));
        self.start = clock.now();
        self.next_tick = self.start;
    }

    /// Send everything due right now. Calling this once drained does
    /// nothing and reports `Drained` again.
    pub fn tick(
        &mut self,
        sink: &mut impl OutputSink,
        clock: &mut impl Clock,
    ) -> Result<PlaybackState, DispatchError> {
        let Some(cursor) = self.cursor.as_mut() else {
            panic!("dispatcher ticked before start");
        };
        if cursor.is_drained() {
            return Ok(PlaybackState::Drained);
        }
        self.ticks += 1;

        let elapsed = clock.now().saturating_sub(self.start);
        let first = cursor.position();
        let batch = cursor.take_due(elapsed.as_secs_f64());
        if !batch.is_empty() {
            trace!(
                elapsed_secs = elapsed.as_secs_f64(),
                due = batch.len(),
                "tick"
            );
        }

        for (offset, event) in batch.iter().enumerate() {
            if let Err(source) = sink.send(&event.payload) {
                return Err(DispatchError::Send {
                    index: first + offset,
                    source,
                    partial: std::mem::take(&mut self.log),
                });
            }
            let sent_at = clock.now().saturating_sub(self.start);
            debug!(
                message = %event.payload,
                at_secs = sent_at.as_secs_f64(),
                "MIDI out"
            );
            self.log.record(event.payload, event.time, sent_at);
        }

        if cursor.is_drained() {
            info!(sent = self.log.len(), ticks = self.ticks, "playback drained");
            Ok(PlaybackState::Drained)
        } else {
            Ok(PlaybackState::Running)
        }
    }

    /// Sleep until the next tick boundary. Boundaries sit at
    /// `start + k * tick_interval`; any already passed are skipped.
    pub fn wait_for_next_tick(&mut self, clock: &mut impl Clock) {
        self.next_tick += self.tick_interval;
        let now = clock.now();
        if self.next_tick < now {
            let interval = self.tick_interval.as_nanos();
            let behind = (now - self.start).as_nanos();
            let k = behind / interval + 1;
            let skipped = k.saturating_sub((self.next_tick - self.start).as_nanos() / interval) as u64;
            self.next_tick = self.start + Duration::from_nanos((k * interval) as u64);
            debug!(skipped, "tick overran, skipping missed boundaries");
        }
        clock.sleep_until(self.next_tick);
    }

    /// Drive the loop to completion. The sink is closed on every exit path,
    /// including a failed send.
    pub fn run(
        &mut self,
        sink: impl OutputSink,
        clock: &mut impl Clock,
    ) -> Result<SendLog, DispatchError> {
        let mut sink = SinkGuard::new(sink);
        if self.state() == PlaybackState::Priming {
            self.start(clock);
        }
        let outcome = loop {
            match self.tick(&mut *sink, clock) {
                Ok(PlaybackState::Running) => self.wait_for_next_tick(clock),
                Ok(_) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        sink.close();
        outcome.map(|()| std::mem::take(&mut self.log))
    }
}

/// Replay `timeline` through `sink` in one go.
pub fn play(
    timeline: EventTimeline,
    sink: impl OutputSink,
    clock: &mut impl Clock,
    tick_interval: Duration,
) -> Result<SendLog, DispatchError> {
    Dispatcher::new(timeline, tick_interval)?.run(sink, clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Payload, TimedEvent};
    use crate::output::testing::RecordingSink;
    use crate::timing::ManualClock;

    fn timeline(deltas: &[f64]) -> EventTimeline {
        let events = deltas
            .iter()
            .enumerate()
            .map(|(i, &t)| TimedEvent::new(Payload::new(0x90, i as u8, 100), t))
            .collect();
        EventTimeline::from_deltas(events)
    }

    fn keys(payloads: &[Payload]) -> Vec<u8> {
        payloads.iter().map(|p| p.data1().unwrap()).collect()
    }

    #[test]
    fn plays_every_event_in_order() {
        let mut sink = RecordingSink::default();
        let mut clock = ManualClock::new();
        let interval = Duration::from_millis(100);

        let log = play(
            timeline(&[0.0, 0.5, 0.0, 0.7]),
            &mut sink,
            &mut clock,
            interval,
        )
        .unwrap();

        assert_eq!(keys(&sink.sent), vec![0, 1, 2, 3]);
        assert_eq!(sink.close_calls, 1);
        assert_eq!(log.len(), 4);
        for record in log.records() {
            assert!(record.jitter() >= -1e-9);
            assert!(record.jitter() < interval.as_secs_f64());
        }
    }

    #[test]
    fn ties_share_a_tick() {
        let mut sink = RecordingSink::default();
        let mut clock = ManualClock::new();

        let log = play(
            timeline(&[0.25, 0.0, 0.0]),
            &mut sink,
            &mut clock,
            Duration::from_millis(100),
        )
        .unwrap();

        let sent: Vec<Duration> = log.records().iter().map(|r| r.sent_at).collect();
        assert_eq!(sent, vec![Duration::from_millis(300); 3]);
        assert_eq!(keys(&sink.sent), vec![0, 1, 2]);
    }

    #[test]
    fn lagging_ticks_still_send_everything_once() {
        let mut sink = RecordingSink::default();
        let mut clock = ManualClock::with_lag(Duration::from_millis(35));
        let deltas = [0.0, 0.001, 0.002, 0.0, 0.01, 0.05, 0.0, 0.003, 0.2];

        let log = play(timeline(&deltas), &mut sink, &mut clock, Duration::from_millis(10)).unwrap();

        assert_eq!(keys(&sink.sent), (0..deltas.len() as u8).collect::<Vec<_>>());
        assert_eq!(log.len(), deltas.len());
        for pair in log.records().windows(2) {
            assert!(pair[1].sent_at >= pair[0].sent_at);
        }
    }

    #[test]
    fn send_failure_aborts_and_closes() {
        let mut sink = RecordingSink::failing_on(2);
        let mut clock = ManualClock::new();

        let err = play(
            timeline(&[0.0, 0.1, 0.1, 0.1]),
            &mut sink,
            &mut clock,
            Duration::from_millis(50),
        )
        .unwrap_err();

        match err {
            DispatchError::Send { index, partial, .. } => {
                assert_eq!(index, 2);
                assert_eq!(partial.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(keys(&sink.sent), vec![0, 1]);
        assert_eq!(sink.close_calls, 1);
    }

    #[test]
    fn empty_timeline_drains_immediately() {
        let mut sink = RecordingSink::default();
        let mut clock = ManualClock::new();

        let mut dispatcher = Dispatcher::new(timeline(&[]), Duration::from_millis(2)).unwrap();
        dispatcher.start(&mut clock);
        assert_eq!(dispatcher.state(), PlaybackState::Drained);

        let log = dispatcher.run(&mut sink, &mut clock).unwrap();
        assert!(log.is_empty());
        assert_eq!(sink.close_calls, 1);
    }

    #[test]
    fn steps_through_states() {
        let mut sink = RecordingSink::default();
        let mut clock = ManualClock::new();
        let mut dispatcher = Dispatcher::new(timeline(&[0.0, 1.0]), Duration::from_millis(500)).unwrap();
        assert_eq!(dispatcher.state(), PlaybackState::Priming);

        dispatcher.start(&mut clock);
        assert_eq!(dispatcher.state(), PlaybackState::Running);

        assert_eq!(dispatcher.tick(&mut sink, &mut clock).unwrap(), PlaybackState::Running);
        assert_eq!(sink.sent.len(), 1);

        dispatcher.wait_for_next_tick(&mut clock);
        assert_eq!(clock.now(), Duration::from_millis(500));
        assert_eq!(dispatcher.tick(&mut sink, &mut clock).unwrap(), PlaybackState::Running);
        assert_eq!(sink.sent.len(), 1);

        dispatcher.wait_for_next_tick(&mut clock);
        assert_eq!(dispatcher.tick(&mut sink, &mut clock).unwrap(), PlaybackState::Drained);
        assert_eq!(dispatcher.tick(&mut sink, &mut clock).unwrap(), PlaybackState::Drained);
        assert_eq!(sink.sent.len(), 2);
        assert_eq!(dispatcher.ticks(), 3);
    }

    #[test]
    fn overrun_skips_to_next_boundary() {
        let mut clock = ManualClock::new();
        let mut dispatcher = Dispatcher::new(timeline(&[5.0]), Duration::from_millis(10)).unwrap();
        dispatcher.start(&mut clock);

        clock.advance(Duration::from_millis(37));
        dispatcher.wait_for_next_tick(&mut clock);
        assert_eq!(clock.now(), Duration::from_millis(40));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = Dispatcher::new(timeline(&[0.0]), Duration::ZERO).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInterval(_)));
    }

    #[test]
    #[should_panic(expected = "ticked before start")]
    fn tick_before_start_panics() {
        let mut dispatcher = Dispatcher::new(timeline(&[0.0]), Duration::from_millis(1)).unwrap();
        dispatcher
            .tick(&mut RecordingSink::default(), &mut ManualClock::new())
            .unwrap();
    }
}
