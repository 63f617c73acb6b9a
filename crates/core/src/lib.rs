pub mod config;
pub mod index;
pub mod model;
pub mod persist;
pub mod playback;
pub mod source;
pub mod viewport;
pub mod views;

pub use config::{ConfigError, TimelineConfig};
pub use index::{DEFAULT_QUERY_CAP, IntervalEntry, IntervalIndex, Overlaps};
pub use model::{Collection, LoadOutcome, LoadTicket, Reload, TimelineSession};
pub use playback::{PlaybackNotice, PlaybackPhase, PlaybackState, PlaybackSynchronizer, Transition};
pub use source::{NormalizedCollection, SourceError};
pub use viewport::{ViewportController, ViewportState, WheelDelta};
