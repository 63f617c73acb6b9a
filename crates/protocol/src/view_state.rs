//! Wire format of the shareable view state (the URL fragment).
//!
//! ```text
//! <site1>,<site2>,...-<startSeconds>-<endSeconds>-<playbackSeconds>
//! ```
//!
//! Times are whole seconds since the Unix epoch. Site names are escaped so
//! that `-`, `,` and `%` inside a name cannot break the field structure;
//! names without those characters encode verbatim.

use std::str::FromStr;

use thiserror::Error;

use crate::site::SiteId;

const FIELD_SEPARATOR: char = '-';
const SITE_SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewStateParseError {
    #[error("view state is empty")]
    Empty,
    #[error("expected 4 '-' separated fields, found {found}")]
    WrongFieldCount { found: usize },
    #[error("site selection is empty")]
    EmptySelection,
    #[error("{field} is not a whole number: {value:?}")]
    NotANumber { field: &'static str, value: String },
    #[error("end {end} is before start {start}")]
    EndBeforeStart { start: i64, end: i64 },
    #[error("invalid escape in site name {0:?}")]
    InvalidEscape(String),
}

/// Decoded view state with times in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewStateToken {
    pub selection: Vec<SiteId>,
    pub start_secs: i64,
    pub end_secs: i64,
    pub playback_secs: i64,
}

impl ViewStateToken {
    pub fn encode(&self) -> String {
        let sites: Vec<String> = self.selection.iter().map(|s| escape_site(s)).collect();
        format!(
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            sites.join(","),
            self.start_secs,
            self.end_secs,
            self.playback_secs,
        )
    }
}

impl std::fmt::Display for ViewStateToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ViewStateToken {
    type Err = ViewStateParseError;

    /// Parse a fragment, with or without its leading `#`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.strip_prefix('#').unwrap_or(raw).trim();
        if raw.is_empty() {
            return Err(ViewStateParseError::Empty);
        }

        let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
        let [sites, start, end, playback] = fields.as_slice() else {
            return Err(ViewStateParseError::WrongFieldCount {
                found: fields.len(),
            });
        };

        let selection = sites
            .split(SITE_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(|s| unescape_site(s).map(SiteId::from))
            .collect::<Result<Vec<_>, _>>()?;
        if selection.is_empty() {
            return Err(ViewStateParseError::EmptySelection);
        }

        let start_secs = parse_seconds("start", start)?;
        let end_secs = parse_seconds("end", end)?;
        let playback_secs = parse_seconds("playback", playback)?;
        if end_secs < start_secs {
            return Err(ViewStateParseError::EndBeforeStart {
                start: start_secs,
                end: end_secs,
            });
        }

        Ok(Self {
            selection,
            start_secs,
            end_secs,
            playback_secs,
        })
    }
}

fn parse_seconds(field: &'static str, value: &str) -> Result<i64, ViewStateParseError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ViewStateParseError::NotANumber {
            field,
            value: value.to_string(),
        })
}

fn escape_site(site: &str) -> String {
    let mut out = String::with_capacity(site.len());
    for ch in site.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ',' => out.push_str("%2C"),
            '-' => out.push_str("%2D"),
            _ => out.push(ch),
        }
    }
    out
}

/// Percent-decodes a site name. Also accepts escapes a browser may have
/// applied to the fragment (e.g. `%20`).
fn unescape_site(raw: &str) -> Result<String, ViewStateParseError> {
    let invalid = || ViewStateParseError::InvalidEscape(raw.to_string());
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or_else(invalid)?;
            let hex = std::str::from_utf8(hex).map_err(|_| invalid())?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| invalid())?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(sites: &[&str], start: i64, end: i64, playback: i64) -> ViewStateToken {
        ViewStateToken {
            selection: sites.iter().map(|s| SiteId::from(*s)).collect(),
            start_secs: start,
            end_secs: end,
            playback_secs: playback,
        }
    }

    #[test]
    fn encodes_plain_format() {
        let t = token(&["RBS10", "RBS11"], 1_650_000_000, 1_650_003_600, 1_650_000_120);
        assert_eq!(t.encode(), "RBS10,RBS11-1650000000-1650003600-1650000120");
    }

    #[test]
    fn parses_with_leading_hash() {
        let t: ViewStateToken = "#RBS10-100-200-150".parse().unwrap_or_else(|_| token(&[], 0, 0, 0));
        assert_eq!(t, token(&["RBS10"], 100, 200, 150));
    }

    #[test]
    fn preserves_selection_order() {
        let t: Result<ViewStateToken, _> = "b,a,c-1-2-0".parse();
        let names: Vec<String> = t
            .map(|t| t.selection.iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn escapes_separators_in_site_names() {
        let t = token(&["North-East, 50%"], 10, 20, 15);
        let encoded = t.encode();
        assert_eq!(encoded, "North%2DEast%2C 50%25-10-20-15");
        assert_eq!(encoded.parse::<ViewStateToken>(), Ok(t));
    }

    #[test]
    fn decodes_browser_escapes() {
        let t = "RBS%20Grid%201-1-2-0".parse::<ViewStateToken>();
        assert_eq!(t.map(|t| t.selection), Ok(vec![SiteId::from("RBS Grid 1")]));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            "RBS10-100-200".parse::<ViewStateToken>(),
            Err(ViewStateParseError::WrongFieldCount { found: 3 })
        );
        assert_eq!(
            "RBS10-1-2-3-4".parse::<ViewStateToken>(),
            Err(ViewStateParseError::WrongFieldCount { found: 5 })
        );
    }

    #[test]
    fn rejects_non_numeric_fields() {
        assert!(matches!(
            "RBS10-abc-200-0".parse::<ViewStateToken>(),
            Err(ViewStateParseError::NotANumber { field: "start", .. })
        ));
        assert!(matches!(
            "RBS10-1-2-NaN".parse::<ViewStateToken>(),
            Err(ViewStateParseError::NotANumber { field: "playback", .. })
        ));
    }

    #[test]
    fn rejects_empty_inputs() {
        assert_eq!("".parse::<ViewStateToken>(), Err(ViewStateParseError::Empty));
        assert_eq!("#".parse::<ViewStateToken>(), Err(ViewStateParseError::Empty));
        assert_eq!(
            ",-1-2-3".parse::<ViewStateToken>(),
            Err(ViewStateParseError::EmptySelection)
        );
    }

    #[test]
    fn rejects_inverted_range_and_bad_escape() {
        assert_eq!(
            "a-20-10-0".parse::<ViewStateToken>(),
            Err(ViewStateParseError::EndBeforeStart { start: 20, end: 10 })
        );
        assert!(matches!(
            "a%2-1-2-0".parse::<ViewStateToken>(),
            Err(ViewStateParseError::InvalidEscape(_))
        ));
    }
}
