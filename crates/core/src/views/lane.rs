use serde::Serialize;

use sensorline_protocol::{CollectionKind, Interval, RecordId};

use crate::viewport::ViewportController;

/// On-screen width of a point event, whatever the zoom level.
pub const POINT_WIDTH_PX: f64 = 64.0;

/// Narrowest interval event still drawn.
const MIN_WIDTH_PX: f64 = 1.0;

/// One record placed on a lane, in content pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LaneItem {
    pub id: RecordId,
    pub left_px: f64,
    pub width_px: f64,
}

impl LaneItem {
    /// Left edge relative to the viewport.
    pub fn screen_left(&self, scroll_offset_px: f64) -> f64 {
        self.left_px - scroll_offset_px
    }

    pub fn right_px(&self) -> f64 {
        self.left_px + self.width_px
    }
}

/// Lay out query results on one lane. Point events keep `point_width_px`
/// at every scale (the thumbnail is counter-scaled); interval events span
/// their interval.
pub fn layout_lane(
    kind: CollectionKind,
    entries: impl IntoIterator<Item = (RecordId, Interval)>,
    viewport: &ViewportController,
    point_width_px: f64,
) -> Vec<LaneItem> {
    entries
        .into_iter()
        .map(|(id, interval)| {
            let left_px = viewport.time_to_pixel(interval.low());
            let width_px = if kind.is_point_event() {
                point_width_px
            } else {
                (interval.length() * viewport.scale()).max(MIN_WIDTH_PX)
            };
            LaneItem {
                id,
                left_px,
                width_px,
            }
        })
        .collect()
}

/// Content pixel of the playback indicator, if there is a position.
pub fn playback_indicator_px(viewport: &ViewportController, position: Option<f64>) -> Option<f64> {
    let position = position?;
    viewport.domain()?;
    Some(viewport.time_to_pixel(position))
}
