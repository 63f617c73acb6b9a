use std::time::Duration;

use sensorline_core::TimelineSession;
use sensorline_core::playback::Transition;
use sensorline_protocol::{CollectionKind, MediaCommand, RecordId};

/// Stand-in for an audio element: no sound, only a clock that advances while
/// playing and reports the clip end.
#[derive(Debug, Default)]
pub struct SimulatedAudio {
    clip: Option<Clip>,
    local_seconds: f64,
    playing: bool,
}

#[derive(Debug, Clone, Copy)]
struct Clip {
    id: RecordId,
    duration_secs: f64,
}

impl SimulatedAudio {
    pub fn local_seconds(&self) -> f64 {
        self.local_seconds
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn clip(&self) -> Option<RecordId> {
        self.clip.map(|c| c.id)
    }

    pub fn apply(&mut self, command: &MediaCommand, session: &TimelineSession) {
        match *command {
            MediaCommand::Idle => {}
            MediaCommand::Load {
                record,
                local_seconds,
            } => {
                let ups = session.config().playback.units_per_second;
                let duration_secs = session
                    .collection(CollectionKind::Audio)
                    .record(record)
                    .map_or(0.0, |r| r.interval.length() / ups);
                self.clip = Some(Clip {
                    id: record,
                    duration_secs,
                });
                self.local_seconds = local_seconds;
                self.playing = true;
            }
            MediaCommand::Seek { local_seconds } => self.local_seconds = local_seconds,
            MediaCommand::Pause => self.playing = false,
        }
    }

    /// Advance the clock and feed the session. At the clip end the session's
    /// follow-up transition is returned for the caller to apply.
    pub fn tick(&mut self, elapsed: Duration, session: &mut TimelineSession) -> Option<Transition> {
        if !self.playing {
            return None;
        }
        let clip = self.clip?;
        self.local_seconds = (self.local_seconds + elapsed.as_secs_f64()).min(clip.duration_secs);
        session.on_time_update(self.local_seconds);
        if self.local_seconds < clip.duration_secs {
            return None;
        }
        self.playing = false;
        Some(session.on_ended())
    }
}
