//! Playback synchronization between the audio element's local clock and the
//! global timeline position.
//!
//! The synchronizer owns [`PlaybackState`] and answers every input (seek,
//! play/pause, clock tick, clip end) with one [`Transition`]: the media
//! command for the host plus any notice worth surfacing. The audio index is
//! passed in per call because it is rebuilt whenever the audio collection
//! reloads.

use serde::Serialize;
use tracing::{info, warn};

use sensorline_protocol::{Interval, MediaCommand, RecordId};

use crate::config::PlaybackConfig;
use crate::index::IntervalIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    Stopped,
    Playing,
}

/// The record whose clip drives (or will drive) the audio element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveRecord {
    pub id: RecordId,
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    pub global_position: Option<f64>,
    pub active: Option<ActiveRecord>,
}

impl PlaybackState {
    pub fn active_record_id(&self) -> Option<RecordId> {
        self.active.map(|a| a.id)
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Stopped,
            global_position: None,
            active: None,
        }
    }
}

/// Non-fatal conditions met while resolving a position to a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackNotice {
    /// Several clips cover the position; `chosen` is the lowest id.
    AmbiguousOverlap {
        position: f64,
        candidates: Vec<RecordId>,
        chosen: RecordId,
    },
    /// No clip covers the position.
    EmptyOverlap { position: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub command: MediaCommand,
    pub notice: Option<PlaybackNotice>,
}

impl Transition {
    fn idle() -> Self {
        Self::command(MediaCommand::Idle)
    }

    fn command(command: MediaCommand) -> Self {
        Self {
            command,
            notice: None,
        }
    }

    fn with_notice(mut self, notice: Option<PlaybackNotice>) -> Self {
        self.notice = notice;
        self
    }
}

/// Outcome of matching a global position against the audio index.
enum Resolution {
    None,
    /// The currently active record still covers the position.
    Current(ActiveRecord),
    Picked(ActiveRecord, Option<PlaybackNotice>),
}

pub fn map_local_to_global(record_start: f64, local_seconds: f64, units_per_second: f64) -> f64 {
    record_start + local_seconds * units_per_second
}

pub fn map_global_to_local(record_start: f64, global_position: f64, units_per_second: f64) -> f64 {
    (global_position - record_start).max(0.0) / units_per_second
}

#[derive(Debug, Clone)]
pub struct PlaybackSynchronizer {
    state: PlaybackState,
    config: PlaybackConfig,
}

impl PlaybackSynchronizer {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            state: PlaybackState::default(),
            config,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn local_to_global(&self, record_start: f64, local_seconds: f64) -> f64 {
        map_local_to_global(record_start, local_seconds, self.config.units_per_second)
    }

    pub fn global_to_local(&self, record_start: f64, global_position: f64) -> f64 {
        map_global_to_local(record_start, global_position, self.config.units_per_second)
    }

    /// Whether play should be offered at `position`.
    pub fn can_play(&self, audio: &IntervalIndex, position: Option<f64>) -> bool {
        position.is_some_and(|p| audio.at(p).next().is_some())
    }

    /// Move the playback cursor to `position` (timeline click, restored state).
    pub fn on_seek(&mut self, audio: &IntervalIndex, position: f64) -> Transition {
        let was_playing = self.state.is_playing();
        match self.resolve(audio, position) {
            Resolution::None => {
                if was_playing {
                    info!(position, "no audio at seek position, stopping");
                }
                self.state = PlaybackState {
                    phase: PlaybackPhase::Stopped,
                    global_position: Some(position),
                    active: None,
                };
                let command = if was_playing {
                    MediaCommand::Pause
                } else {
                    MediaCommand::Idle
                };
                Transition::command(command).with_notice(Some(PlaybackNotice::EmptyOverlap {
                    position,
                }))
            }
            Resolution::Current(active) => {
                self.state = PlaybackState {
                    global_position: Some(position),
                    active: Some(active),
                    ..self.state
                };
                if was_playing {
                    Transition::command(MediaCommand::Seek {
                        local_seconds: self.global_to_local(active.interval.low(), position),
                    })
                } else {
                    Transition::idle()
                }
            }
            Resolution::Picked(active, notice) => {
                self.state = PlaybackState {
                    global_position: Some(position),
                    active: Some(active),
                    ..self.state
                };
                let transition = if was_playing {
                    Transition::command(MediaCommand::Load {
                        record: active.id,
                        local_seconds: self.global_to_local(active.interval.low(), position),
                    })
                } else {
                    Transition::idle()
                };
                transition.with_notice(notice)
            }
        }
    }

    /// Start playback at the current position.
    pub fn play(&mut self, audio: &IntervalIndex) -> Transition {
        if self.state.is_playing() {
            return Transition::idle();
        }
        let Some(position) = self.state.global_position else {
            info!("play requested without a playback position");
            return Transition::idle();
        };
        match self.resolve(audio, position) {
            Resolution::None => {
                info!(position, "no audio at playback position");
                self.state.active = None;
                Transition::idle().with_notice(Some(PlaybackNotice::EmptyOverlap { position }))
            }
            Resolution::Current(active) => self.start(active, position, None),
            Resolution::Picked(active, notice) => self.start(active, position, notice),
        }
    }

    fn start(
        &mut self,
        active: ActiveRecord,
        position: f64,
        notice: Option<PlaybackNotice>,
    ) -> Transition {
        self.state = PlaybackState {
            phase: PlaybackPhase::Playing,
            global_position: Some(position),
            active: Some(active),
        };
        Transition::command(MediaCommand::Load {
            record: active.id,
            local_seconds: self.global_to_local(active.interval.low(), position),
        })
        .with_notice(notice)
    }

    pub fn pause(&mut self) -> Transition {
        if !self.state.is_playing() {
            return Transition::idle();
        }
        self.state.phase = PlaybackPhase::Stopped;
        Transition::command(MediaCommand::Pause)
    }

    pub fn toggle(&mut self, audio: &IntervalIndex) -> Transition {
        if self.state.is_playing() {
            self.pause()
        } else {
            self.play(audio)
        }
    }

    /// Clock tick from the playing medium. Returns the new global position,
    /// or `None` when nothing is playing and the tick was ignored.
    pub fn on_playback_advance(&mut self, local_seconds: f64) -> Option<f64> {
        if !self.state.is_playing() {
            return None;
        }
        let active = self.state.active?;
        let position = self.local_to_global(active.interval.low(), local_seconds.max(0.0));
        self.state.global_position = Some(position);
        Some(position)
    }

    /// The active clip finished. Continue with the next clip that starts
    /// within the guard band after it, or stop at the boundary.
    pub fn on_record_end(&mut self, audio: &IntervalIndex) -> Transition {
        let Some(active) = self.state.active else {
            self.state.phase = PlaybackPhase::Stopped;
            return Transition::idle();
        };
        let boundary = self
            .state
            .global_position
            .map_or(active.interval.high(), |p| p.max(active.interval.high()));
        let lookup = boundary + self.config.guard_band();

        let next = match self.resolve_excluding(audio, lookup, active.id) {
            Resolution::Picked(next, notice) => Some((next, notice)),
            Resolution::Current(_) | Resolution::None => None,
        };
        let Some((next, notice)) = next else {
            info!(position = boundary, "no further audio, stopping at clip end");
            self.state = PlaybackState {
                phase: PlaybackPhase::Stopped,
                global_position: Some(boundary),
                active: Some(active),
            };
            return Transition::command(MediaCommand::Pause).with_notice(Some(
                PlaybackNotice::EmptyOverlap { position: lookup },
            ));
        };

        let local_seconds = self.global_to_local(next.interval.low(), boundary);
        self.state = PlaybackState {
            phase: PlaybackPhase::Playing,
            global_position: Some(self.local_to_global(next.interval.low(), local_seconds)),
            active: Some(next),
        };
        Transition::command(MediaCommand::Load {
            record: next.id,
            local_seconds,
        })
        .with_notice(notice)
    }

    /// Forget the active record, e.g. after the audio collection reloaded and
    /// ids changed meaning. The position is kept.
    pub fn reset_active(&mut self) -> Transition {
        let was_playing = self.state.is_playing();
        self.state.phase = PlaybackPhase::Stopped;
        self.state.active = None;
        if was_playing {
            Transition::command(MediaCommand::Pause)
        } else {
            Transition::idle()
        }
    }

    /// Set the cursor without consulting the index (restored view state).
    /// A playing clip that still covers the new position is seeked in place;
    /// one that no longer does is paused and dropped.
    pub fn set_position(&mut self, position: Option<f64>) -> Transition {
        self.state.global_position = position;
        let Some(active) = self.state.active else {
            return Transition::idle();
        };
        let was_playing = self.state.is_playing();
        match position {
            Some(p) if active.interval.contains(p) => {
                if was_playing {
                    Transition::command(MediaCommand::Seek {
                        local_seconds: self.global_to_local(active.interval.low(), p),
                    })
                } else {
                    Transition::idle()
                }
            }
            Some(_) => {
                self.state.active = None;
                self.state.phase = PlaybackPhase::Stopped;
                if was_playing {
                    info!("restored position left the playing clip, stopping");
                    Transition::command(MediaCommand::Pause)
                } else {
                    Transition::idle()
                }
            }
            None => Transition::idle(),
        }
    }

    fn resolve(&self, audio: &IntervalIndex, position: f64) -> Resolution {
        let current = self.state.active.map(|a| a.id);
        let mut candidates: Vec<ActiveRecord> = audio
            .at(position)
            .map(|e| ActiveRecord {
                id: e.id,
                interval: e.interval,
            })
            .collect();
        if let Some(active) = candidates.iter().find(|c| Some(c.id) == current) {
            return Resolution::Current(*active);
        }
        pick_lowest(&mut candidates, position)
    }

    fn resolve_excluding(&self, audio: &IntervalIndex, position: f64, exclude: RecordId) -> Resolution {
        let mut candidates: Vec<ActiveRecord> = audio
            .at(position)
            .filter(|e| e.id != exclude)
            .map(|e| ActiveRecord {
                id: e.id,
                interval: e.interval,
            })
            .collect();
        pick_lowest(&mut candidates, position)
    }
}

/// Lowest-id tie-break for overlapping clips. Arbitrary but deterministic;
/// which clip audibly plays depends on it, so it must stay stable.
fn pick_lowest(candidates: &mut [ActiveRecord], position: f64) -> Resolution {
    candidates.sort_unstable_by_key(|c| c.id);
    let Some(chosen) = candidates.first().copied() else {
        return Resolution::None;
    };
    let notice = (candidates.len() > 1).then(|| {
        let ids: Vec<RecordId> = candidates.iter().map(|c| c.id).collect();
        warn!(
            position,
            count = ids.len(),
            chosen = chosen.id,
            "ambiguous audio overlap, playing lowest id"
        );
        PlaybackNotice::AmbiguousOverlap {
            position,
            candidates: ids,
            chosen: chosen.id,
        }
    });
    Resolution::Picked(chosen, notice)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPS: f64 = 1.0 / 60.0;

    fn iv(low: f64, high: f64) -> Interval {
        Interval::new(low, high).unwrap_or(Interval::point(f64::NAN))
    }

    fn index(entries: &[(f64, f64, RecordId)]) -> IntervalIndex {
        entries.iter().map(|&(l, h, id)| (iv(l, h), id)).collect()
    }

    fn sync() -> PlaybackSynchronizer {
        PlaybackSynchronizer::new(PlaybackConfig::default())
    }

    #[test]
    fn clock_mapping() {
        assert_eq!(map_global_to_local(100.0, 100.0, UPS), 0.0);
        assert_eq!(map_global_to_local(100.0, 90.0, UPS), 0.0);
        assert!((map_global_to_local(100.0, 101.0, UPS) - 60.0).abs() < 1e-9);
        assert!((map_local_to_global(100.0, 30.0, UPS) - 100.5).abs() < 1e-12);
    }

    #[test]
    fn seek_into_gap_stops_and_clears() {
        let audio = index(&[(100.0, 160.0, 1)]);
        let mut s = sync();
        s.on_seek(&audio, 120.0);
        s.play(&audio);
        assert!(s.state().is_playing());

        let t = s.on_seek(&audio, 500.0);
        assert_eq!(t.command, MediaCommand::Pause);
        assert_eq!(t.notice, Some(PlaybackNotice::EmptyOverlap { position: 500.0 }));
        assert_eq!(s.state().phase, PlaybackPhase::Stopped);
        assert_eq!(s.state().active_record_id(), None);
        assert_eq!(s.state().global_position, Some(500.0));
    }

    #[test]
    fn seek_onto_single_record_activates_it() {
        let audio = index(&[(100.0, 160.0, 3), (200.0, 260.0, 4)]);
        let mut s = sync();
        let t = s.on_seek(&audio, 100.0);
        assert_eq!(t.command, MediaCommand::Idle);
        assert_eq!(s.state().active_record_id(), Some(3));
        assert_eq!(s.global_to_local(100.0, 100.0), 0.0);
    }

    #[test]
    fn seek_while_playing_switches_or_seeks_in_place() {
        let audio = index(&[(100.0, 160.0, 3), (200.0, 260.0, 4)]);
        let mut s = sync();
        s.on_seek(&audio, 110.0);
        let t = s.play(&audio);
        assert!(matches!(t.command, MediaCommand::Load { record: 3, .. }));

        let t = s.on_seek(&audio, 130.0);
        let MediaCommand::Seek { local_seconds } = t.command else {
            panic!("expected in-place seek, got {:?}", t.command);
        };
        assert!((local_seconds - 1800.0).abs() < 1e-6);

        let t = s.on_seek(&audio, 201.0);
        let MediaCommand::Load { record, local_seconds } = t.command else {
            panic!("expected load, got {:?}", t.command);
        };
        assert_eq!(record, 4);
        assert!((local_seconds - 60.0).abs() < 1e-6);
        assert_eq!(s.state().active_record_id(), Some(4));
        assert!(s.state().is_playing());
    }

    #[test]
    fn ambiguous_seek_picks_lowest_id() {
        let audio = index(&[(90.0, 150.0, 8), (100.0, 160.0, 5), (95.0, 130.0, 6)]);
        let mut s = sync();
        let t = s.on_seek(&audio, 120.0);
        assert_eq!(s.state().active_record_id(), Some(5));
        assert_eq!(
            t.notice,
            Some(PlaybackNotice::AmbiguousOverlap {
                position: 120.0,
                candidates: vec![5, 6, 8],
                chosen: 5,
            })
        );
    }

    #[test]
    fn ambiguous_seek_keeps_current_record() {
        let audio = index(&[(90.0, 150.0, 8), (100.0, 160.0, 5)]);
        let mut s = sync();
        s.on_seek(&audio, 95.0);
        assert_eq!(s.state().active_record_id(), Some(8));
        s.play(&audio);
        let t = s.on_seek(&audio, 120.0);
        assert!(matches!(t.command, MediaCommand::Seek { .. }));
        assert_eq!(t.notice, None);
        assert_eq!(s.state().active_record_id(), Some(8));
    }

    #[test]
    fn play_without_audio_is_a_notice() {
        let audio = index(&[(100.0, 160.0, 1)]);
        let mut s = sync();
        assert_eq!(s.play(&audio).command, MediaCommand::Idle);
        s.on_seek(&audio, 10.0);
        let t = s.play(&audio);
        assert_eq!(t.command, MediaCommand::Idle);
        assert_eq!(t.notice, Some(PlaybackNotice::EmptyOverlap { position: 10.0 }));
        assert_eq!(s.state().phase, PlaybackPhase::Stopped);
    }

    #[test]
    fn advance_tracks_local_clock_only_while_playing() {
        let audio = index(&[(100.0, 160.0, 1)]);
        let mut s = sync();
        s.on_seek(&audio, 100.0);
        assert_eq!(s.on_playback_advance(30.0), None);
        s.play(&audio);
        let pos = s.on_playback_advance(30.0).unwrap_or_default();
        assert!((pos - 100.5).abs() < 1e-12);
        assert_eq!(s.state().global_position, Some(pos));
        assert_eq!(s.pause().command, MediaCommand::Pause);
        assert_eq!(s.on_playback_advance(60.0), None);
    }

    #[test]
    fn record_end_continues_with_next_clip() {
        let audio = index(&[(100.0, 160.0, 1), (160.1, 220.0, 2)]);
        let mut s = sync();
        s.on_seek(&audio, 159.0);
        s.play(&audio);
        s.on_playback_advance(3600.0);
        let t = s.on_record_end(&audio);
        assert_eq!(
            t.command,
            MediaCommand::Load {
                record: 2,
                local_seconds: 0.0
            }
        );
        assert_eq!(s.state().active_record_id(), Some(2));
        assert_eq!(s.state().global_position, Some(160.1));
        assert!(s.state().is_playing());
    }

    #[test]
    fn record_end_without_successor_stops_at_boundary() {
        let audio = index(&[(100.0, 160.0, 1), (300.0, 360.0, 2)]);
        let mut s = sync();
        s.on_seek(&audio, 150.0);
        s.play(&audio);
        let t = s.on_record_end(&audio);
        assert_eq!(t.command, MediaCommand::Pause);
        assert_eq!(s.state().phase, PlaybackPhase::Stopped);
        assert_eq!(s.state().global_position, Some(160.0));
        assert_eq!(s.state().active_record_id(), Some(1));
    }

    #[test]
    fn record_end_skips_the_clip_that_just_ended() {
        // A long clip still covering the lookup point must not restart itself.
        let audio = index(&[(100.0, 160.0, 1), (100.0, 500.0, 2)]);
        let mut s = sync();
        s.on_seek(&audio, 150.0);
        s.play(&audio);
        assert_eq!(s.state().active_record_id(), Some(1));
        s.on_playback_advance(3600.0);
        let t = s.on_record_end(&audio);
        assert!(matches!(t.command, MediaCommand::Load { record: 2, .. }));
    }

    #[test]
    fn can_play_reflects_coverage() {
        let audio = index(&[(100.0, 160.0, 1)]);
        let s = sync();
        assert!(s.can_play(&audio, Some(160.0)));
        assert!(!s.can_play(&audio, Some(161.0)));
        assert!(!s.can_play(&audio, None));
        assert!(!s.can_play(&IntervalIndex::new(), Some(120.0)));
    }

    #[test]
    fn set_position_drops_stale_active_record() {
        let audio = index(&[(100.0, 160.0, 1)]);
        let mut s = sync();
        s.on_seek(&audio, 120.0);
        assert_eq!(s.set_position(Some(130.0)).command, MediaCommand::Idle);
        assert_eq!(s.state().active_record_id(), Some(1));
        assert_eq!(s.set_position(Some(400.0)).command, MediaCommand::Idle);
        assert_eq!(s.state().active_record_id(), None);
    }

    #[test]
    fn set_position_pauses_or_seeks_playing_clip() {
        let audio = index(&[(100.0, 160.0, 1)]);
        let mut s = sync();
        s.on_seek(&audio, 120.0);
        s.play(&audio);

        let t = s.set_position(Some(130.0));
        let MediaCommand::Seek { local_seconds } = t.command else {
            panic!("expected in-place seek, got {:?}", t.command);
        };
        assert!((local_seconds - 1800.0).abs() < 1e-6);
        assert!(s.state().is_playing());

        assert_eq!(s.set_position(Some(500.0)).command, MediaCommand::Pause);
        assert_eq!(s.state().phase, PlaybackPhase::Stopped);
        assert_eq!(s.state().active_record_id(), None);
    }

    #[test]
    fn record_end_with_overlapping_successors_picks_lowest_id() {
        let audio = index(&[
            (100.0, 160.0, 1),
            (160.05, 220.0, 7),
            (160.1, 200.0, 4),
            (160.0, 230.0, 9),
        ]);
        let mut s = sync();
        s.on_seek(&audio, 150.0);
        s.play(&audio);
        s.on_playback_advance(3600.0);

        let t = s.on_record_end(&audio);
        let MediaCommand::Load { record, .. } = t.command else {
            panic!("expected load, got {:?}", t.command);
        };
        assert_eq!(record, 4);
        assert_eq!(s.state().active_record_id(), Some(4));
        let Some(PlaybackNotice::AmbiguousOverlap {
            candidates, chosen, ..
        }) = t.notice
        else {
            panic!("expected ambiguity notice, got {:?}", t.notice);
        };
        assert_eq!(candidates, vec![4, 7, 9]);
        assert_eq!(chosen, 4);
    }
}
