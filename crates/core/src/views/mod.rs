pub mod lane;
pub mod overview;

pub use lane::{LaneItem, POINT_WIDTH_PX, layout_lane, playback_indicator_px};
pub use overview::{density_bins, overview_band};
