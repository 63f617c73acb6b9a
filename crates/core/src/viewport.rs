//! Pixel ↔ time transform under zoom and scroll.
//!
//! The timeline is a horizontally scrollable strip. Content pixel `x` shows
//! time `domain.min + x / scale`; the viewport's left edge sits at content
//! pixel `scroll_offset_px`. Scale and scroll only ever change together
//! through a whole [`ViewportState`] assignment, so a reader never sees a new
//! scale paired with a stale scroll.

use serde::{Deserialize, Serialize};
use tracing::debug;

use sensorline_protocol::{Interval, SiteId, ViewStateParseError, ViewStateToken};

use crate::config::ViewportConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportState {
    /// Pixels per timeline unit.
    pub scale: f64,
    /// Content pixel at the viewport's left edge.
    pub scroll_offset_px: f64,
}

/// A restored start time waiting for the domain to become known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRestore {
    pub start: f64,
}

/// One wheel event's deltas.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WheelDelta {
    pub dy: f64,
    pub dx: f64,
}

/// A decoded view-state string with times back in timeline units.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedViewState {
    pub selection: Vec<SiteId>,
    pub start: f64,
    pub end: f64,
    pub playback: f64,
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    state: ViewportState,
    domain: Option<Interval>,
    pending: Option<PendingRestore>,
    config: ViewportConfig,
    units_per_second: f64,
}

impl ViewportController {
    pub fn new(config: ViewportConfig, units_per_second: f64) -> Self {
        let scale = 1.0_f64.clamp(config.scale_min, config.scale_max);
        Self {
            state: ViewportState {
                scale,
                scroll_offset_px: 0.0,
            },
            domain: None,
            pending: None,
            config,
            units_per_second,
        }
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn scale(&self) -> f64 {
        self.state.scale
    }

    pub fn scroll_offset_px(&self) -> f64 {
        self.state.scroll_offset_px
    }

    pub fn domain(&self) -> Option<Interval> {
        self.domain
    }

    pub fn pending_restore(&self) -> Option<PendingRestore> {
        self.pending
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    fn domain_min(&self) -> f64 {
        self.domain.map_or(0.0, |d| d.low())
    }

    fn clamp_scale(&self, scale: f64) -> f64 {
        if scale.is_nan() {
            return self.state.scale;
        }
        scale.clamp(self.config.scale_min, self.config.scale_max)
    }

    fn commit(&mut self, next: ViewportState) {
        debug!(
            scale = next.scale,
            scroll = next.scroll_offset_px,
            "viewport transform"
        );
        self.state = next;
    }

    /// Replace the domain. A known domain resolves any pending restore; the
    /// resolved restore is returned so callers can tell it happened.
    pub fn set_domain(&mut self, domain: Option<Interval>) -> Option<PendingRestore> {
        self.domain = domain;
        let domain = domain?;
        let pending = self.pending.take()?;
        let scroll = ((pending.start - domain.low()) * self.state.scale).max(0.0);
        self.commit(ViewportState {
            scale: self.state.scale,
            scroll_offset_px: scroll,
        });
        debug!(start = pending.start, "applied deferred restore");
        Some(pending)
    }

    /// Time under viewport pixel `px` (measured from the viewport's left edge).
    pub fn pixel_to_time(&self, px: f64) -> f64 {
        (px + self.state.scroll_offset_px) / self.state.scale + self.domain_min()
    }

    /// Content pixel of time `t`.
    pub fn time_to_pixel(&self, t: f64) -> f64 {
        (t - self.domain_min()) * self.state.scale
    }

    /// Viewport pixel of time `t`; negative or beyond the width when off screen.
    pub fn time_to_screen(&self, t: f64) -> f64 {
        self.time_to_pixel(t) - self.state.scroll_offset_px
    }

    /// Total scrollable width, zero while the domain is unknown.
    pub fn content_width_px(&self) -> f64 {
        self.domain.map_or(0.0, |d| d.length() * self.state.scale)
    }

    /// Zoom around `pointer_px`, keeping the time under the pointer fixed.
    /// `wheel_dx` pans horizontally in the same transition.
    pub fn zoom_at(&mut self, pointer_px: f64, wheel_dy: f64, wheel_dx: f64) -> ViewportState {
        let next = self.zoomed(self.state, pointer_px, wheel_dy, wheel_dx);
        self.commit(next);
        next
    }

    /// Apply coalesced wheel deltas as one transition.
    pub fn zoom_batch(&mut self, pointer_px: f64, deltas: &[WheelDelta]) -> ViewportState {
        let next = deltas
            .iter()
            .fold(self.state, |state, d| self.zoomed(state, pointer_px, d.dy, d.dx));
        self.commit(next);
        next
    }

    fn zoomed(&self, from: ViewportState, pointer_px: f64, dy: f64, dx: f64) -> ViewportState {
        let scale = self.clamp_scale((from.scale.ln() - dy / self.config.zoom_sensitivity).exp());
        let scroll = dx + (scale / from.scale) * (from.scroll_offset_px + pointer_px) - pointer_px;
        ViewportState {
            scale,
            scroll_offset_px: sanitize_scroll(scroll),
        }
    }

    /// Zoom by `factor` around the viewport centre (keyboard zoom).
    pub fn zoom_by(&mut self, factor: f64, viewport_width_px: f64) -> ViewportState {
        let dy = -factor.ln() * self.config.zoom_sensitivity;
        self.zoom_at(viewport_width_px / 2.0, dy, 0.0)
    }

    /// The host scrolled the strip natively. Once the domain is known the
    /// offset stops where the content's right edge meets the viewport's.
    pub fn scroll_to(&mut self, scroll_offset_px: f64, viewport_width_px: f64) {
        let mut scroll = sanitize_scroll(scroll_offset_px);
        if self.domain.is_some() {
            let max = (self.content_width_px() - viewport_width_px.max(0.0)).max(0.0);
            scroll = scroll.min(max);
        }
        self.commit(ViewportState {
            scale: self.state.scale,
            scroll_offset_px: scroll,
        });
    }

    pub fn pan_by(&mut self, dx_px: f64, viewport_width_px: f64) {
        self.scroll_to(self.state.scroll_offset_px + dx_px, viewport_width_px);
    }

    /// Time range actually on screen, without prefetch margins.
    pub fn visible_range(&self, viewport_width_px: f64) -> (f64, f64) {
        (
            self.pixel_to_time(0.0),
            self.pixel_to_time(viewport_width_px.max(0.0)),
        )
    }

    /// Time range to query for rendering: the visible range widened by the
    /// lookback/lookahead margins.
    pub fn visible_window(&self, viewport_width_px: f64) -> Interval {
        let (start, end) = self.visible_range(viewport_width_px);
        let low = start - self.config.margin_left.max(0.0);
        let high = end + self.config.margin_right.max(0.0);
        Interval::new(low, high).unwrap_or(Interval::point(low))
    }

    /// Show `[start, end]` across `viewport_width_px`. When the domain is not
    /// known yet, or `defer` says it is about to be replaced, the scroll is
    /// provisional and `start` is kept as a pending restore.
    pub fn restore(&mut self, start: f64, end: f64, viewport_width_px: f64, defer: bool) {
        let span = end - start;
        let scale = if span > 0.0 {
            self.clamp_scale(viewport_width_px / span)
        } else {
            self.config.scale_max
        };
        let scroll = sanitize_scroll((start - self.domain_min()) * scale);
        self.pending = if defer || self.domain.is_none() {
            Some(PendingRestore { start })
        } else {
            None
        };
        self.commit(ViewportState {
            scale,
            scroll_offset_px: scroll,
        });
    }

    /// Encode the shareable view state. Returns `None` unless the view is
    /// settled: something selected, a positive start, and no restore pending.
    pub fn encode_state(
        &self,
        selection: &[SiteId],
        start: f64,
        end: f64,
        playback: Option<f64>,
    ) -> Option<String> {
        if selection.is_empty() || start <= 0.0 || self.pending.is_some() {
            return None;
        }
        let token = ViewStateToken {
            selection: selection.to_vec(),
            start_secs: self.to_seconds(start),
            end_secs: self.to_seconds(end),
            playback_secs: playback.map_or(0, |p| self.to_seconds(p)),
        };
        Some(token.encode())
    }

    pub fn decode_state(&self, raw: &str) -> Result<DecodedViewState, ViewStateParseError> {
        let token: ViewStateToken = raw.parse()?;
        Ok(DecodedViewState {
            start: self.from_seconds(token.start_secs),
            end: self.from_seconds(token.end_secs),
            playback: self.from_seconds(token.playback_secs),
            selection: token.selection,
        })
    }

    fn to_seconds(&self, t: f64) -> i64 {
        (t / self.units_per_second).round() as i64
    }

    fn from_seconds(&self, secs: i64) -> f64 {
        secs as f64 * self.units_per_second
    }
}

fn sanitize_scroll(scroll: f64) -> f64 {
    if scroll.is_finite() { scroll.max(0.0) } else { 0.0 }
}
