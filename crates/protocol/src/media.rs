use serde::{Deserialize, Serialize};

use crate::types::RecordId;

/// Instruction from the playback engine to the host's audio element.
///
/// The engine never touches the media element itself. Each state transition
/// yields at most one command and the host applies it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaCommand {
    /// Nothing for the media element to do.
    Idle,
    /// Swap the element's source to `record` and start it at `local_seconds`.
    Load {
        record: RecordId,
        local_seconds: f64,
    },
    /// Move the current source's clock to `local_seconds`.
    Seek { local_seconds: f64 },
    /// Pause the current source.
    Pause,
}

impl MediaCommand {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}
