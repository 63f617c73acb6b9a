pub mod media;
pub mod site;
pub mod types;
pub mod view_state;

pub use media::MediaCommand;
pub use site::SiteId;
pub use types::{CollectionKind, Interval, IntervalError, Location, Record, RecordId};
pub use view_state::{ViewStateParseError, ViewStateToken};
