use midir::{MidiOutput, MidiOutputConnection};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::Payload;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create MIDI output client: {0}")]
    Init(#[from] midir::InitError),
    #[error("no MIDI output ports available")]
    NoPorts,
    #[error("no MIDI output port matching '{0}'")]
    PortNotFound(String),
    #[error("failed to connect to MIDI output '{port}': {reason}")]
    Connect { port: String, reason: String },
    #[error("failed to send MIDI message: {0}")]
    Send(#[from] midir::SendError),
    #[error("MIDI output is closed")]
    Closed,
}

/// Destination for dispatched payloads.
pub trait OutputSink {
    fn send(&mut self, payload: &Payload) -> Result<(), SinkError>;

    /// Release the underlying channel. Later sends fail with
    /// [`SinkError::Closed`]; closing twice is a no-op.
    fn close(&mut self);
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn send(&mut self, payload: &Payload) -> Result<(), SinkError> {
        (**self).send(payload)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// A midir output connection.
pub struct MidiOutSink {
    conn: Option<MidiOutputConnection>,
    port_name: String,
}

impl MidiOutSink {
    /// Connect to the first output port whose name contains `port_filter`,
    /// or to the first port at all when no filter is given.
    pub fn open(client_name: &str, port_filter: Option<&str>) -> Result<Self, SinkError> {
        let midi_out = MidiOutput::new(client_name)?;
        let ports = midi_out.ports();
        if ports.is_empty() {
            return Err(SinkError::NoPorts);
        }

        for port in &ports {
            debug!(port = %midi_out.port_name(port).unwrap_or_default(), "found MIDI output");
        }

        let port = match port_filter {
            Some(filter) => ports
                .iter()
                .find(|p| midi_out.port_name(p).unwrap_or_default().contains(filter))
                .ok_or_else(|| SinkError::PortNotFound(filter.to_string()))?,
            None => &ports[0],
        };
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let conn = midi_out
            .connect(port, &format!("{client_name}-out"))
            .map_err(|e| SinkError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        info!(port = %port_name, "opened MIDI output");
        Ok(Self {
            conn: Some(conn),
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl OutputSink for MidiOutSink {
    fn send(&mut self, payload: &Payload) -> Result<(), SinkError> {
        let conn = self.conn.as_mut().ok_or(SinkError::Closed)?;
        conn.send(payload.as_bytes())?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
            info!(port = %self.port_name, "closed MIDI output");
        }
    }
}

/// Owns an open sink and closes it exactly once: explicitly through
/// [`SinkGuard::close`], or on drop when a run bails out early.
pub struct SinkGuard<S: OutputSink> {
    sink: S,
    closed: bool,
}

impl<S: OutputSink> SinkGuard<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.closed {
            self.sink.close();
            self.closed = true;
        }
    }
}

impl<S: OutputSink> std::ops::Deref for SinkGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.sink
    }
}

impl<S: OutputSink> std::ops::DerefMut for SinkGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<S: OutputSink> Drop for SinkGuard<S> {
    fn drop(&mut self) {
        if !self.closed {
            warn!("output dropped without an explicit close");
        }
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Sink that remembers what it was sent and can be told to fail.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub sent: Vec<Payload>,
        pub close_calls: usize,
        pub fail_on: Option<usize>,
    }

    impl RecordingSink {
        pub fn failing_on(index: usize) -> Self {
            Self {
                fail_on: Some(index),
                ..Self::default()
            }
        }
    }

    impl OutputSink for RecordingSink {
        fn send(&mut self, payload: &Payload) -> Result<(), SinkError> {
            if self.close_calls > 0 {
                return Err(SinkError::Closed);
            }
            if self.fail_on == Some(self.sent.len()) {
                return Err(SinkError::Connect {
                    port: "test".to_string(),
                    reason: "device unplugged".to_string(),
                });
            }
            self.sent.push(*payload);
            Ok(())
        }

        fn close(&mut self) {
            self.close_calls += 1;
        }
    }
}
