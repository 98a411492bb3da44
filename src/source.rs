//! Reads a Standard MIDI File into a delta-time [`EventTimeline`].
//!
//! Tracks are merged into a single stream ordered by absolute tick (ties keep
//! track order), tick deltas are turned into seconds using the tempo in
//! effect, and only channel messages are kept. Time spent on skipped meta and
//! sysex events is carried into the next kept event so nothing drifts.

use std::fs;
use std::path::{Path, PathBuf};

use midly::live::LiveEvent;
use midly::{Format, MetaMessage, Smf, Timing, TrackEventKind};
use thiserror::Error;
use tracing::{debug, info};

use crate::events::{Payload, TimedEvent};
use crate::timing::EventTimeline;

/// 120 BPM.
const DEFAULT_TEMPO_US_PER_QN: u32 = 500_000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),
    #[error("MIDI file declares {0} ticks per beat")]
    InvalidTiming(u16),
    #[error("failed to encode MIDI message: {0}")]
    Encode(#[source] std::io::Error),
    #[error("MIDI message of {0} bytes does not fit a payload")]
    Oversized(usize),
}

pub fn load(path: &Path) -> Result<EventTimeline, LoadError> {
    let data = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let timeline = decode(&data)?;
    info!(
        path = %path.display(),
        events = timeline.len(),
        duration_secs = timeline.duration(),
        "loaded MIDI file"
    );
    Ok(timeline)
}

pub fn decode(data: &[u8]) -> Result<EventTimeline, LoadError> {
    let smf = Smf::parse(data)?;
    let tick_seconds = TickClock::new(smf.header.timing)?;

    let merged = merge_tracks(&smf);
    debug!(
        format = ?smf.header.format,
        tracks = smf.tracks.len(),
        raw_events = merged.len(),
        "merged tracks"
    );

    let mut events = Vec::new();
    let mut tempo = DEFAULT_TEMPO_US_PER_QN;
    let mut last_tick = 0u64;
    let mut carried = 0.0;
    let mut buf = Vec::with_capacity(3);

    for (tick, kind) in merged {
        carried += tick_seconds.seconds(tick - last_tick, tempo);
        last_tick = tick;

        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => tempo = t.as_int(),
            TrackEventKind::Midi { channel, message } => {
                buf.clear();
                LiveEvent::Midi { channel, message }
                    .write_std(&mut buf)
                    .map_err(LoadError::Encode)?;
                let payload =
                    Payload::from_slice(&buf).ok_or(LoadError::Oversized(buf.len()))?;
                events.push(TimedEvent::new(payload, carried));
                carried = 0.0;
            }
            _ => {}
        }
    }

    Ok(EventTimeline::from_deltas(events))
}

/// Every track event tagged with its absolute tick, in playback order.
fn merge_tracks<'a>(smf: &Smf<'a>) -> Vec<(u64, TrackEventKind<'a>)> {
    let mut merged = Vec::new();
    let mut offset = 0u64;
    for track in &smf.tracks {
        let mut tick = offset;
        for event in track {
            tick += u64::from(event.delta.as_int());
            merged.push((tick, event.kind));
        }
        // Sequential files play their tracks back to back.
        if smf.header.format == Format::Sequential {
            offset = tick;
        }
    }
    merged.sort_by_key(|(tick, _)| *tick);
    merged
}

enum TickClock {
    Metrical { ticks_per_beat: f64 },
    Timecode { seconds_per_tick: f64 },
}

impl TickClock {
    fn new(timing: Timing) -> Result<Self, LoadError> {
        match timing {
            Timing::Metrical(tpb) if tpb.as_int() == 0 => Err(LoadError::InvalidTiming(0)),
            Timing::Metrical(tpb) => Ok(Self::Metrical {
                ticks_per_beat: f64::from(tpb.as_int()),
            }),
            Timing::Timecode(fps, subframes) => Ok(Self::Timecode {
                seconds_per_tick: 1.0 / (f64::from(fps.as_f32()) * f64::from(subframes.max(1))),
            }),
        }
    }

    fn seconds(&self, ticks: u64, tempo_us_per_qn: u32) -> f64 {
        if ticks == 0 {
            return 0.0;
        }
        match self {
            Self::Metrical { ticks_per_beat } => {
                ticks as f64 * f64::from(tempo_us_per_qn) / (ticks_per_beat * 1_000_000.0)
            }
            Self::Timecode { seconds_per_tick } => ticks as f64 * seconds_per_tick,
        }
    }
}
