use serde::Serialize;
use sensorline_core::model::LoadTicket;
use sensorline_core::playback::PlaybackState;
use sensorline_core::source::parse_rows;
use sensorline_core::views::{POINT_WIDTH_PX, layout_lane};
use sensorline_core::{TimelineConfig, TimelineSession, ViewportState, WheelDelta};
use sensorline_protocol::{CollectionKind, SiteId};
use wasm_bindgen::prelude::*;

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&e.to_string()))
}

fn parse_kind(kind: &str) -> Result<CollectionKind, String> {
    CollectionKind::ALL
        .into_iter()
        .find(|k| k.to_string() == kind)
        .ok_or_else(|| format!("unknown collection: {kind}"))
}

fn kind(kind: &str) -> Result<CollectionKind, JsError> {
    parse_kind(kind).map_err(|e| JsError::new(&e))
}

#[derive(Serialize)]
struct Snapshot {
    viewport: ViewportState,
    playback: PlaybackState,
    visible_range: Option<(f64, f64)>,
    content_width_px: f64,
    can_play: bool,
}

/// One timeline session driven by a browser host. Inputs and outputs that are
/// not plain numbers travel as JSON.
#[wasm_bindgen]
pub struct SessionHandle {
    session: TimelineSession,
}

#[wasm_bindgen]
impl SessionHandle {
    /// Create a session, optionally overriding defaults with a TOML config.
    #[wasm_bindgen(constructor)]
    pub fn new(config_toml: Option<String>) -> Result<SessionHandle, JsError> {
        let config = match config_toml {
            Some(raw) => {
                TimelineConfig::from_toml_str(&raw).map_err(|e| JsError::new(&e.to_string()))?
            }
            None => TimelineConfig::default(),
        };
        Ok(Self {
            session: TimelineSession::new(config),
        })
    }

    /// Select sites from a JSON string array. Returns the reload (tickets to
    /// fetch and the media command) as JSON.
    pub fn select_sites(&mut self, sites_json: &str) -> Result<String, JsError> {
        let sites: Vec<SiteId> =
            serde_json::from_str(sites_json).map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&self.session.select_sites(sites))
    }

    pub fn set_labeled_only(&mut self, labeled_only: bool) -> Result<String, JsError> {
        to_json(&self.session.set_labeled_only(labeled_only))
    }

    /// Apply a fetched response body for a ticket previously handed out.
    pub fn apply_load(&mut self, ticket_json: &str, body: &[u8]) -> Result<String, JsError> {
        let ticket: LoadTicket =
            serde_json::from_str(ticket_json).map_err(|e| JsError::new(&e.to_string()))?;
        let rows = parse_rows(ticket.kind, body, &self.session.config().source)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&self.session.apply_load(&ticket, rows))
    }

    pub fn set_viewport_width(&mut self, width_px: f64) {
        self.session.set_viewport_width(width_px);
    }

    pub fn zoom_at(&mut self, pointer_px: f64, wheel_dy: f64, wheel_dx: f64) -> Result<String, JsError> {
        to_json(&self.session.viewport_mut().zoom_at(pointer_px, wheel_dy, wheel_dx))
    }

    /// Coalesced wheel events as a JSON array of `{dy, dx}`.
    pub fn zoom_batch(&mut self, pointer_px: f64, deltas_json: &str) -> Result<String, JsError> {
        let deltas: Vec<WheelDelta> =
            serde_json::from_str(deltas_json).map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&self.session.viewport_mut().zoom_batch(pointer_px, &deltas))
    }

    pub fn scroll_to(&mut self, scroll_offset_px: f64) {
        let width = self.session.viewport_width();
        self.session.viewport_mut().scroll_to(scroll_offset_px, width);
    }

    pub fn seek_at_pixel(&mut self, px: f64) -> Result<String, JsError> {
        to_json(&self.session.seek_at_pixel(px))
    }

    pub fn toggle_play(&mut self) -> Result<String, JsError> {
        to_json(&self.session.toggle_play())
    }

    /// `timeupdate` from the audio element; returns the new global position.
    pub fn on_time_update(&mut self, local_seconds: f64) -> Option<f64> {
        self.session.on_time_update(local_seconds)
    }

    pub fn on_ended(&mut self) -> Result<String, JsError> {
        to_json(&self.session.on_ended())
    }

    pub fn can_play(&self) -> bool {
        self.session.can_play()
    }

    pub fn visible_records(&self, collection: &str) -> Result<String, JsError> {
        to_json(&self.session.visible_records(kind(collection)?))
    }

    /// Lane placement of the visible records, in content pixels.
    pub fn lane_layout(&self, collection: &str) -> Result<String, JsError> {
        let kind = kind(collection)?;
        let records = self.session.visible_records(kind);
        let items = layout_lane(
            kind,
            records.iter().map(|r| (r.id, r.interval)),
            self.session.viewport(),
            POINT_WIDTH_PX,
        );
        to_json(&items)
    }

    pub fn snapshot(&self) -> Result<String, JsError> {
        let viewport = self.session.viewport();
        to_json(&Snapshot {
            viewport: viewport.state(),
            playback: self.session.playback(),
            visible_range: self.session.visible_range(),
            content_width_px: viewport.content_width_px(),
            can_play: self.session.can_play(),
        })
    }

    pub fn note_view_changed(&mut self, now_ms: f64) {
        self.session.note_view_changed(now_ms.max(0.0) as u64);
    }

    /// A hash to write now, if the debounce elapsed and it changed.
    pub fn poll_persist(&mut self, now_ms: f64) -> Option<String> {
        self.session.poll_persist(now_ms.max(0.0) as u64)
    }

    pub fn restore(&mut self, hash: &str, width_px: f64) -> Result<String, JsError> {
        let reload = self
            .session
            .restore(hash, width_px)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&reload)
    }

    /// `hashchange` from the browser. `None` when the hash is this session's
    /// own write.
    pub fn on_external_hash(&mut self, hash: &str, width_px: f64) -> Result<Option<String>, JsError> {
        let reload = self
            .session
            .on_external_hash(hash, width_px)
            .map_err(|e| JsError::new(&e.to_string()))?;
        reload.map(|r| to_json(&r)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names() {
        assert_eq!(parse_kind("images"), Ok(CollectionKind::Images));
        assert_eq!(parse_kind("audio"), Ok(CollectionKind::Audio));
        assert!(parse_kind("video").is_err());
    }
}
