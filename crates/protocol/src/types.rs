use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::site::SiteId;

/// Record identifier, stable within one load of a collection.
pub type RecordId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum IntervalError {
    #[error("interval bound is not a number")]
    NotANumber,
    #[error("interval low {low} is greater than high {high}")]
    Inverted { low: f64, high: f64 },
}

/// A closed interval `[low, high]` on the timeline, in timeline units.
///
/// Serialized as a two-element array. Construction rejects NaN bounds and
/// `low > high`, so every `Interval` in circulation satisfies `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct Interval {
    low: f64,
    high: f64,
}

impl Interval {
    pub fn new(low: f64, high: f64) -> Result<Self, IntervalError> {
        if low.is_nan() || high.is_nan() {
            return Err(IntervalError::NotANumber);
        }
        if low > high {
            return Err(IntervalError::Inverted { low, high });
        }
        Ok(Self { low, high })
    }

    /// Degenerate interval used for "what covers instant `t`" lookups.
    ///
    /// A NaN instant yields an interval that overlaps nothing.
    pub fn point(t: f64) -> Self {
        Self { low: t, high: t }
    }

    #[inline]
    pub fn low(&self) -> f64 {
        self.low
    }

    #[inline]
    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn length(&self) -> f64 {
        self.high - self.low
    }

    pub fn midpoint(&self) -> f64 {
        self.low + self.length() / 2.0
    }

    /// Closed-interval overlap test.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.low <= other.high && self.high >= other.low
    }

    pub fn contains(&self, t: f64) -> bool {
        self.low <= t && t <= self.high
    }

    /// Smallest interval covering both.
    pub fn union(&self, other: &Interval) -> Interval {
        Interval {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }
}

impl TryFrom<[f64; 2]> for Interval {
    type Error = IntervalError;

    fn try_from([low, high]: [f64; 2]) -> Result<Self, Self::Error> {
        Interval::new(low, high)
    }
}

impl From<Interval> for [f64; 2] {
    fn from(interval: Interval) -> Self {
        [interval.low, interval.high]
    }
}

/// The two record collections shown on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Still images: point events lasting one timeline unit.
    Images,
    /// Audio clips: interval events with a real duration.
    Audio,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Images, CollectionKind::Audio];

    pub fn is_point_event(self) -> bool {
        matches!(self, Self::Images)
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Images => write!(f, "images"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// A single sensor observation placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Time span in timeline units.
    pub interval: Interval,
    pub location: Option<Location>,
    /// Site the observation was recorded at, when the source reports it.
    pub site: Option<SiteId>,
    /// URL or handle of the media; never interpreted by the engine.
    pub payload_ref: Option<String>,
}

impl Record {
    pub fn start(&self) -> f64 {
        self.interval.low()
    }

    pub fn end(&self) -> f64 {
        self.interval.high()
    }
}
