pub mod collection;
pub mod session;

pub use collection::{Collection, LoadOutcome, LoadTicket};
pub use session::{Reload, TimelineSession};
