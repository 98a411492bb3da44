use std::fmt::Write;
use std::time::Duration;

use crate::events::Payload;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendRecord {
    pub payload: Payload,
    /// Absolute time the event was due, in seconds from run start.
    pub scheduled: f64,
    /// Time since run start, read right after the send returned.
    pub sent_at: Duration,
}

impl SendRecord {
    /// Seconds between the scheduled instant and the actual send.
    pub fn jitter(&self) -> f64 {
        self.sent_at.as_secs_f64() - self.scheduled
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterSummary {
    pub max: f64,
    pub mean: f64,
}

/// Append-only record of what was sent and when.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendLog {
    records: Vec<SendRecord>,
}

impl SendLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, payload: Payload, scheduled: f64, sent_at: Duration) {
        self.records.push(SendRecord {
            payload,
            scheduled,
            sent_at,
        });
    }

    pub fn records(&self) -> &[SendRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn jitter_summary(&self) -> Option<JitterSummary> {
        if self.records.is_empty() {
            return None;
        }
        let (max, sum) = self
            .records
            .iter()
            .map(SendRecord::jitter)
            .fold((f64::MIN, 0.0), |(max, sum), j| (max.max(j), sum + j));
        Some(JitterSummary {
            max,
            mean: sum / self.records.len() as f64,
        })
    }

    /// Table of every send, followed by a jitter summary line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "> | sent, scheduled, jitter(ms), status, data1, data2");
        for record in &self.records {
            let _ = writeln!(
                out,
                "> | {:.3}, {:.3}, {:.3}, {}",
                record.sent_at.as_secs_f64(),
                record.scheduled,
                record.jitter() * 1000.0,
                record.payload
            );
        }
        if let Some(summary) = self.jitter_summary() {
            let _ = writeln!(
                out,
                "{} events, jitter max {:.3} ms, mean {:.3} ms",
                self.records.len(),
                summary.max * 1000.0,
                summary.mean * 1000.0
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_records_in_append_order() {
        let mut log = SendLog::new();
        log.record(Payload::new(0x90, 60, 100), 0.0, Duration::from_millis(1));
        log.record(Payload::new(0x80, 60, 0), 0.5, Duration::from_millis(502));

        let keys: Vec<u8> = log.records().iter().map(|r| r.payload.status()).collect();
        assert_eq!(keys, vec![0x90, 0x80]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn summarizes_jitter() {
        let mut log = SendLog::new();
        log.record(Payload::new(0x90, 60, 100), 0.0, Duration::from_millis(1));
        log.record(Payload::new(0x80, 60, 0), 0.5, Duration::from_millis(503));

        let summary = log.jitter_summary().unwrap();
        assert!((summary.max - 0.003).abs() < 1e-9);
        assert!((summary.mean - 0.002).abs() < 1e-9);
    }

    #[test]
    fn empty_log_has_no_summary() {
        let log = SendLog::new();
        assert!(log.jitter_summary().is_none());
        assert_eq!(
            log.render(),
            "> | sent, scheduled, jitter(ms), status, data1, data2\n"
        );
    }

    #[test]
    fn renders_each_send() {
        let mut log = SendLog::new();
        log.record(Payload::new(0x90, 64, 90), 0.25, Duration::from_millis(252));
        let text = log.render();
        assert!(text.contains("> | 0.252, 0.250, 2.000, 144, 64, 90"));
        assert!(text.contains("1 events, jitter max 2.000 ms"));
    }
}
