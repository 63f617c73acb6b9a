use serde::Serialize;
use tracing::{info, warn};

use sensorline_protocol::{
    CollectionKind, Interval, MediaCommand, Record, SiteId, ViewStateParseError,
};

use crate::config::TimelineConfig;
use crate::model::collection::{Collection, LoadOutcome, LoadTicket};
use crate::persist::HashSync;
use crate::playback::{PlaybackState, PlaybackSynchronizer, Transition};
use crate::source::NormalizedCollection;
use crate::viewport::ViewportController;

/// What the host must do after the selection or filter changed: fetch every
/// ticket, and apply `command` to the audio element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reload {
    pub tickets: Vec<LoadTicket>,
    pub command: MediaCommand,
}

impl Reload {
    fn none() -> Self {
        Self {
            tickets: Vec::new(),
            command: MediaCommand::Idle,
        }
    }
}

/// One user's timeline: the site selection, both record collections, the
/// viewport and the playback cursor, plus the hash round trip.
#[derive(Debug, Clone)]
pub struct TimelineSession {
    config: TimelineConfig,
    selection: Vec<SiteId>,
    labeled_only: bool,
    images: Collection,
    audio: Collection,
    viewport: ViewportController,
    playback: PlaybackSynchronizer,
    hash: HashSync,
    width_px: f64,
}

impl TimelineSession {
    pub fn new(config: TimelineConfig) -> Self {
        Self {
            viewport: ViewportController::new(
                config.viewport.clone(),
                config.playback.units_per_second,
            ),
            playback: PlaybackSynchronizer::new(config.playback.clone()),
            hash: HashSync::new(&config.persist),
            selection: Vec::new(),
            labeled_only: false,
            images: Collection::new(CollectionKind::Images),
            audio: Collection::new(CollectionKind::Audio),
            width_px: 0.0,
            config,
        }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn selection(&self) -> &[SiteId] {
        &self.selection
    }

    pub fn labeled_only(&self) -> bool {
        self.labeled_only
    }

    pub fn collection(&self, kind: CollectionKind) -> &Collection {
        match kind {
            CollectionKind::Images => &self.images,
            CollectionKind::Audio => &self.audio,
        }
    }

    fn collection_mut(&mut self, kind: CollectionKind) -> &mut Collection {
        match kind {
            CollectionKind::Images => &mut self.images,
            CollectionKind::Audio => &mut self.audio,
        }
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn viewport_width(&self) -> f64 {
        self.width_px
    }

    pub fn set_viewport_width(&mut self, width_px: f64) {
        if width_px.is_finite() && width_px >= 0.0 {
            self.width_px = width_px;
        }
    }

    /// Union of the loaded collection extents.
    pub fn domain(&self) -> Option<Interval> {
        match (self.images.extent(), self.audio.extent()) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        }
    }

    /// Visible time range without margins, `None` until a domain is known.
    pub fn visible_range(&self) -> Option<(f64, f64)> {
        self.viewport
            .domain()
            .map(|_| self.viewport.visible_range(self.width_px))
    }

    // Selection

    pub fn select_sites(&mut self, sites: Vec<SiteId>) -> Reload {
        self.selection = sites;
        self.reload()
    }

    pub fn set_labeled_only(&mut self, labeled_only: bool) -> Reload {
        if self.labeled_only == labeled_only {
            return Reload::none();
        }
        self.labeled_only = labeled_only;
        self.reload()
    }

    fn reload(&mut self) -> Reload {
        let command = self.playback.reset_active().command;
        let tickets = if self.selection.is_empty() {
            self.images.invalidate();
            self.audio.invalidate();
            Vec::new()
        } else {
            CollectionKind::ALL
                .into_iter()
                .map(|kind| {
                    let (sites, labeled_only) = (self.selection.clone(), self.labeled_only);
                    self.collection_mut(kind).begin_load(&sites, labeled_only)
                })
                .collect()
        };
        self.refresh_domain();
        Reload { tickets, command }
    }

    /// Apply a load response. Responses for superseded tickets are dropped.
    pub fn apply_load(&mut self, ticket: &LoadTicket, loaded: NormalizedCollection) -> LoadOutcome {
        let outcome = self.collection_mut(ticket.kind).apply(ticket, loaded);
        if let LoadOutcome::Applied { records } = outcome {
            info!(kind = %ticket.kind, records, epoch = ticket.epoch, "applied load");
            self.refresh_domain();
        }
        outcome
    }

    /// Push the recomputed domain to the viewport. A pending restore resolves
    /// here; otherwise the time at the left edge stays put when the domain
    /// start moves.
    fn refresh_domain(&mut self) {
        let domain = self.domain();
        let anchor = self
            .viewport
            .domain()
            .zip(domain)
            .filter(|(old, new)| old.low() != new.low())
            .map(|_| self.viewport.pixel_to_time(0.0));
        if self.viewport.set_domain(domain).is_some() {
            return;
        }
        if let (Some(anchor), Some(domain)) = (anchor, domain) {
            self.viewport
                .scroll_to((anchor - domain.low()) * self.viewport.scale(), self.width_px);
        }
    }

    // Rendering queries

    /// Records of `kind` overlapping the visible window (margins included),
    /// capped at the configured maximum.
    pub fn visible_records(&self, kind: CollectionKind) -> Vec<&Record> {
        if self.viewport.domain().is_none() {
            return Vec::new();
        }
        let window = self.viewport.visible_window(self.width_px);
        let collection = self.collection(kind);
        collection
            .index()
            .range_query(window)
            .take(self.config.viewport.max_visible_records)
            .filter_map(|entry| collection.record(entry.id))
            .collect()
    }

    /// Whether a play control should be enabled.
    pub fn can_play(&self) -> bool {
        self.playback
            .can_play(self.audio.index(), self.playback.state().global_position)
    }

    // Playback

    pub fn seek(&mut self, position: f64) -> Transition {
        self.playback.on_seek(self.audio.index(), position)
    }

    /// Seek to the time under viewport pixel `px` (a click on the timeline).
    pub fn seek_at_pixel(&mut self, px: f64) -> Transition {
        let position = self.viewport.pixel_to_time(px);
        self.seek(position)
    }

    pub fn play(&mut self) -> Transition {
        self.playback.play(self.audio.index())
    }

    pub fn pause(&mut self) -> Transition {
        self.playback.pause()
    }

    pub fn toggle_play(&mut self) -> Transition {
        self.playback.toggle(self.audio.index())
    }

    /// The audio element reported its current time.
    pub fn on_time_update(&mut self, local_seconds: f64) -> Option<f64> {
        self.playback.on_playback_advance(local_seconds)
    }

    /// The audio element finished the active clip.
    pub fn on_ended(&mut self) -> Transition {
        self.playback.on_record_end(self.audio.index())
    }

    // View state

    /// Apply an encoded view state. A changed selection reloads both
    /// collections and defers the scroll until the new domain is known.
    pub fn restore(&mut self, raw: &str, width_px: f64) -> Result<Reload, ViewStateParseError> {
        let decoded = self.viewport.decode_state(raw).inspect_err(|e| {
            warn!(error = %e, state = raw, "rejected view state");
        })?;
        self.set_viewport_width(width_px);

        let mut reload = if decoded.selection != self.selection {
            self.select_sites(decoded.selection)
        } else {
            Reload::none()
        };
        let defer = !reload.tickets.is_empty();
        self.viewport
            .restore(decoded.start, decoded.end, self.width_px, defer);

        let position = (decoded.playback > 0.0).then_some(decoded.playback);
        let moved = self.playback.set_position(position);
        if reload.command.is_idle() {
            reload.command = moved.command;
        }
        Ok(reload)
    }

    /// Encode the current view if it is settled and queue it for writing.
    pub fn note_view_changed(&mut self, now_ms: u64) {
        let Some((start, end)) = self.visible_range() else {
            return;
        };
        let encoded = self.viewport.encode_state(
            &self.selection,
            start,
            end,
            self.playback.state().global_position,
        );
        if let Some(encoded) = encoded {
            self.hash.queue(encoded, now_ms);
        }
    }

    /// A view-state string due to be written to the hash, if any.
    pub fn poll_persist(&mut self, now_ms: u64) -> Option<String> {
        self.hash.poll(now_ms)
    }

    /// When the host should next call [`poll_persist`](Self::poll_persist).
    pub fn persist_deadline(&self) -> Option<u64> {
        self.hash.deadline()
    }

    /// The hash changed outside this session (history navigation, pasted
    /// link). Echoes of this session's own writes are ignored.
    pub fn on_external_hash(
        &mut self,
        raw: &str,
        width_px: f64,
    ) -> Result<Option<Reload>, ViewStateParseError> {
        if !self.hash.is_external(raw) {
            return Ok(None);
        }
        let reload = self.restore(raw, width_px)?;
        self.hash.adopt(raw);
        Ok(Some(reload))
    }
}
