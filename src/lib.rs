mod config;
mod events;
mod output;
mod send_log;
pub mod source;
pub mod timing;

pub use config::{ConfigError, DEFAULT_TICK_INTERVAL_SECS, ReplayConfig};
pub use events::{Payload, TimedEvent};
pub use output::{MidiOutSink, OutputSink, SinkError, SinkGuard};
pub use send_log::{JitterSummary, SendLog, SendRecord};
pub use source::LoadError;
pub use timing::{
    Clock, DispatchCursor, DispatchError, Dispatcher, EventTimeline, ManualClock, MonotonicClock,
    PlaybackState, TimeMode, play,
};
