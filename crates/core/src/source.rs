//! Normalization of raw backend rows into timeline records.
//!
//! The backend serves JSON arrays per collection. Timestamps arrive as RFC 3339
//! strings, naive `YYYY-MM-DDTHH:MM:SS` strings (read as UTC) or epoch
//! milliseconds, and are converted to timeline units (minutes since the epoch).

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use sensorline_protocol::{CollectionKind, Interval, Location, Record, RecordId, SiteId};

use crate::config::SourceConfig;
use crate::index::IntervalIndex;

const MS_PER_UNIT: f64 = 60_000.0;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("malformed {kind} rows: {source}")]
    Json {
        kind: CollectionKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("unrecognized timestamp {0:?}")]
    InvalidTime(String),
}

/// Backend resource serving a collection, filtered to labeled rows or not.
pub fn resource_name(kind: CollectionKind, labeled_only: bool) -> &'static str {
    match (kind, labeled_only) {
        (CollectionKind::Images, false) => "image_files",
        (CollectionKind::Images, true) => "image_labels",
        (CollectionKind::Audio, false) => "audio_files",
        (CollectionKind::Audio, true) => "audio_labels",
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTime {
    EpochMillis(f64),
    Text(String),
}

impl RawTime {
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, SourceError> {
        match self {
            RawTime::EpochMillis(ms) => {
                if !ms.is_finite() {
                    return Err(SourceError::InvalidTime(ms.to_string()));
                }
                DateTime::from_timestamp_millis(*ms as i64)
                    .ok_or_else(|| SourceError::InvalidTime(ms.to_string()))
            }
            RawTime::Text(raw) => parse_text(raw.trim()),
        }
    }
}

fn parse_text(raw: &str) -> Result<DateTime<Utc>, SourceError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SourceError::InvalidTime(raw.to_string()))
}

pub fn to_timeline_units(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / MS_PER_UNIT
}

pub fn from_timeline_units(t: f64) -> Option<DateTime<Utc>> {
    if !t.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((t * MS_PER_UNIT).round() as i64)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawImageRow {
    pub datetime: RawTime,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAudioRow {
    pub start: RawTime,
    pub end: RawTime,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
}

/// Records of one collection plus their overall time extent.
#[derive(Debug, Clone, Default)]
pub struct NormalizedCollection {
    pub records: Vec<Record>,
    pub extent: Option<Interval>,
}

impl NormalizedCollection {
    pub fn from_records(records: Vec<Record>) -> Self {
        let extent = records
            .iter()
            .map(|r| r.interval)
            .reduce(|acc, i| acc.union(&i));
        Self { records, extent }
    }

    pub fn index(&self) -> IntervalIndex {
        self.records.iter().map(|r| (r.interval, r.id)).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn location(latitude: Option<f64>, longitude: Option<f64>) -> Option<Location> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) if latitude.is_finite() && longitude.is_finite() => {
            Some(Location {
                latitude,
                longitude,
            })
        }
        _ => None,
    }
}

/// Images become one-unit point events. Rows dated before
/// `config.earliest_image_year` come from unset camera clocks and are dropped.
pub fn normalize_images(rows: Vec<RawImageRow>, config: &SourceConfig) -> NormalizedCollection {
    let total = rows.len();
    let mut dropped = 0usize;
    let records: Vec<Record> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(row, raw)| {
            let dt = match raw.datetime.to_datetime() {
                Ok(dt) => dt,
                Err(e) => {
                    warn!(row, error = %e, "skipping image row");
                    return None;
                }
            };
            if dt.year() < config.earliest_image_year {
                dropped += 1;
                return None;
            }
            let start = to_timeline_units(dt);
            let interval = Interval::new(start, start + 1.0).ok()?;
            Some(Record {
                id: row as RecordId,
                interval,
                location: location(raw.latitude, raw.longitude),
                site: raw.site.map(SiteId::from),
                payload_ref: raw.filename,
            })
        })
        .collect();
    if dropped > 0 {
        info!(dropped, total, "dropped images with implausible dates");
    }
    NormalizedCollection::from_records(records)
}

/// Audio clips keep their real duration. Inverted or unparsable rows are
/// skipped with a warning.
pub fn normalize_audio(rows: Vec<RawAudioRow>) -> NormalizedCollection {
    let records = rows
        .into_iter()
        .enumerate()
        .filter_map(|(row, raw)| {
            let bounds = raw
                .start
                .to_datetime()
                .and_then(|s| Ok((s, raw.end.to_datetime()?)));
            let (start, end) = match bounds {
                Ok((s, e)) => (to_timeline_units(s), to_timeline_units(e)),
                Err(e) => {
                    warn!(row, error = %e, "skipping audio row");
                    return None;
                }
            };
            let interval = match Interval::new(start, end) {
                Ok(interval) => interval,
                Err(e) => {
                    warn!(row, error = %e, "skipping audio row");
                    return None;
                }
            };
            Some(Record {
                id: row as RecordId,
                interval,
                location: location(raw.latitude, raw.longitude),
                site: raw.site.map(SiteId::from),
                payload_ref: raw.audio_url.or(raw.filename),
            })
        })
        .collect();
    NormalizedCollection::from_records(records)
}

/// Parse and normalize a JSON array response for `kind`.
pub fn parse_rows(
    kind: CollectionKind,
    bytes: &[u8],
    config: &SourceConfig,
) -> Result<NormalizedCollection, SourceError> {
    let json_err = |source| SourceError::Json { kind, source };
    Ok(match kind {
        CollectionKind::Images => {
            normalize_images(serde_json::from_slice(bytes).map_err(json_err)?, config)
        }
        CollectionKind::Audio => normalize_audio(serde_json::from_slice(bytes).map_err(json_err)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(kind: CollectionKind, raw: &str) -> NormalizedCollection {
        parse_rows(kind, raw.as_bytes(), &SourceConfig::default()).unwrap_or_default()
    }

    #[test]
    fn timestamp_forms_agree() {
        let rfc = RawTime::Text("2023-05-01T12:00:00Z".into()).to_datetime().ok();
        let offset = RawTime::Text("2023-05-01T14:00:00+02:00".into()).to_datetime().ok();
        let naive = RawTime::Text("2023-05-01T12:00:00".into()).to_datetime().ok();
        let spaced = RawTime::Text("2023-05-01 12:00:00.000".into()).to_datetime().ok();
        let millis = RawTime::EpochMillis(1_682_942_400_000.0).to_datetime().ok();
        assert!(rfc.is_some());
        assert_eq!(rfc, offset);
        assert_eq!(rfc, naive);
        assert_eq!(rfc, spaced);
        assert_eq!(rfc, millis);
        assert!(RawTime::Text("yesterday".into()).to_datetime().is_err());
        assert!(RawTime::EpochMillis(f64::NAN).to_datetime().is_err());
    }

    #[test]
    fn timeline_units_are_minutes() {
        let dt = RawTime::EpochMillis(120_000.0).to_datetime().ok();
        assert_eq!(dt.map(to_timeline_units), Some(2.0));
        assert_eq!(from_timeline_units(2.0), dt);
    }

    #[test]
    fn images_are_point_events_and_old_dates_dropped() {
        let raw = r#"[
            {"datetime": "2023-01-01T00:00:00Z", "latitude": 9.1, "longitude": -79.8, "filename": "a.jpg", "site": "RBS01"},
            {"datetime": "2019-01-01T00:00:00Z", "filename": "bad-clock.jpg"},
            {"datetime": "2023-01-01T00:10:00", "latitude": 9.1, "filename": "b.jpg"}
        ]"#;
        let c = parse(CollectionKind::Images, raw);
        assert_eq!(c.len(), 2);
        let first = &c.records[0];
        assert_eq!(first.id, 0);
        assert_eq!(first.interval.length(), 1.0);
        assert_eq!(first.site.as_ref().map(|s| s.as_str()), Some("RBS01"));
        assert!(first.location.is_some());
        assert_eq!(c.records[1].id, 2);
        assert_eq!(c.records[1].location, None);
        assert_eq!(c.records[1].interval.low() - first.interval.low(), 10.0);
        let extent = c.extent.map(|e| (e.low(), e.high()));
        assert_eq!(extent, Some((first.interval.low(), first.interval.low() + 11.0)));
    }

    #[test]
    fn audio_rows_keep_duration_and_skip_bad_rows() {
        let raw = r#"[
            {"start": "2023-01-01T00:00:00Z", "end": "2023-01-01T00:01:00Z", "audio_url": "https://x/1.wav", "filename": "1.wav"},
            {"start": "2023-01-01T00:05:00Z", "end": "2023-01-01T00:04:00Z"},
            {"start": "soon", "end": "2023-01-01T00:04:00Z"},
            {"start": 1672531500000, "end": 1672531560000, "filename": "4.wav"}
        ]"#;
        let c = parse(CollectionKind::Audio, raw);
        let ids: Vec<RecordId> = c.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 3]);
        assert_eq!(c.records[0].interval.length(), 1.0);
        assert_eq!(c.records[0].payload_ref.as_deref(), Some("https://x/1.wav"));
        assert_eq!(c.records[1].payload_ref.as_deref(), Some("4.wav"));
        assert_eq!(c.index().at(c.records[1].interval.low()).count(), 1);
    }

    #[test]
    fn empty_and_malformed_input() {
        let empty = parse(CollectionKind::Audio, "[]");
        assert!(empty.is_empty());
        assert_eq!(empty.extent, None);
        assert!(matches!(
            parse_rows(CollectionKind::Images, b"{\"not\": \"a list\"}", &SourceConfig::default()),
            Err(SourceError::Json { kind: CollectionKind::Images, .. })
        ));
    }

    #[test]
    fn resource_names() {
        assert_eq!(resource_name(CollectionKind::Images, false), "image_files");
        assert_eq!(resource_name(CollectionKind::Images, true), "image_labels");
        assert_eq!(resource_name(CollectionKind::Audio, false), "audio_files");
        assert_eq!(resource_name(CollectionKind::Audio, true), "audio_labels");
    }
}
