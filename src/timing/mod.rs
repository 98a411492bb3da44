mod clock;
mod cursor;
mod dispatch;
mod timeline;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use cursor::DispatchCursor;
pub use dispatch::{DispatchError, Dispatcher, PlaybackState, play};
pub use timeline::{EventTimeline, TimeMode};
