use std::fmt;

/// Raw MIDI message bytes: a status byte followed by up to two data bytes.
///
/// The dispatch engine never looks inside; it only hands the bytes to the
/// output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    bytes: [u8; 3],
    len: u8,
}

impl Payload {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            bytes: [status, data1, data2],
            len: 3,
        }
    }

    /// Returns `None` for an empty slice or one longer than three bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 3 {
            return None;
        }
        let mut buf = [0u8; 3];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            bytes: buf,
            len: bytes.len() as u8,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    pub fn data1(&self) -> Option<u8> {
        (self.len > 1).then_some(self.bytes[1])
    }

    pub fn data2(&self) -> Option<u8> {
        (self.len > 2).then_some(self.bytes[2])
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |b: Option<u8>| b.map_or_else(|| "-".to_string(), |b| b.to_string());
        write!(
            f,
            "{}, {}, {}",
            self.status(),
            field(self.data1()),
            field(self.data2())
        )
    }
}

/// A payload paired with a time in seconds.
///
/// Whether `time` is a delta from the previous event or an offset from the
/// start of the sequence depends on the mode of the owning timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    pub payload: Payload,
    pub time: f64,
}

impl TimedEvent {
    pub fn new(payload: Payload, time: f64) -> Self {
        debug_assert!(time >= 0.0, "event time must be non-negative");
        Self { payload, time }
    }
}
