//! Date ranges and the symbolic selections the UI offers.
//!
//! A [`DateRangeSelection`] (live, a named preset, or a custom window) is
//! resolved against "now" into a concrete [`DateRange`]. Bounded ranges can
//! be shifted left or right by their own duration for previous/next paging.

use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DateRangeError;

/// How far back a live range reaches
pub const LIVE_LOOKBACK_MINUTES: i64 = 10;

/// Serde helpers writing dates as `2024-10-17T16:00:00.000Z`
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn serialize_option<S: Serializer>(
        date: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serialize(date, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|raw| super::parse_date(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Parse an ISO-8601 / RFC 3339 timestamp into UTC
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, DateRangeError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| DateRangeError::InvalidDate(raw.to_string()))
}

pub fn to_iso_string(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A concrete time window. `until == None` means open-ended (live).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedDateRange")]
pub struct DateRange {
    #[serde(with = "iso_millis")]
    pub since: DateTime<Utc>,
    #[serde(
        serialize_with = "iso_millis::serialize_option",
        deserialize_with = "iso_millis::deserialize_option",
        default
    )]
    pub until: Option<DateTime<Utc>>,
}

/// Wire shape of [`DateRange`], checked before it becomes one
#[derive(Deserialize)]
struct UncheckedDateRange {
    #[serde(with = "iso_millis")]
    since: DateTime<Utc>,
    #[serde(deserialize_with = "iso_millis::deserialize_option", default)]
    until: Option<DateTime<Utc>>,
}

impl TryFrom<UncheckedDateRange> for DateRange {
    type Error = DateRangeError;

    fn try_from(raw: UncheckedDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.since, raw.until)
    }
}

impl DateRange {
    pub fn new(since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Result<Self, DateRangeError> {
        if let Some(until) = until {
            if since > until {
                return Err(DateRangeError::Inverted {
                    since: to_iso_string(&since),
                    until: to_iso_string(&until),
                });
            }
        }
        Ok(Self { since, until })
    }

    pub fn live(since: DateTime<Utc>) -> Self {
        Self { since, until: None }
    }

    pub fn is_live(&self) -> bool {
        self.until.is_none()
    }

    /// Length of a bounded range
    pub fn duration(&self) -> Option<Duration> {
        self.until.map(|until| until - self.since)
    }

    pub fn contains(&self, date: &DateTime<Utc>) -> bool {
        *date >= self.since && self.until.is_none_or(|until| *date <= until)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.until {
            Some(until) => write!(f, "{} .. {}", to_iso_string(&self.since), to_iso_string(&until)),
            None => write!(f, "{} .. (live)", to_iso_string(&self.since)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateRangePreset {
    LastHour,
    #[serde(rename = "last4Hours")]
    Last4Hours,
    #[serde(rename = "last7Days")]
    Last7Days,
    Today,
    Yesterday,
}

impl DateRangePreset {
    pub const ALL: [DateRangePreset; 5] = [
        DateRangePreset::LastHour,
        DateRangePreset::Last4Hours,
        DateRangePreset::Last7Days,
        DateRangePreset::Today,
        DateRangePreset::Yesterday,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DateRangePreset::LastHour => "lastHour",
            DateRangePreset::Last4Hours => "last4Hours",
            DateRangePreset::Last7Days => "last7Days",
            DateRangePreset::Today => "today",
            DateRangePreset::Yesterday => "yesterday",
        }
    }
}

impl FromStr for DateRangePreset {
    type Err = DateRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateRangePreset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DateRangeError::UnknownPreset(s.to_string()))
    }
}

/// What the user picked in the date range selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DateRangeSelection {
    Live,
    Preset {
        preset: DateRangePreset,
    },
    Custom {
        #[serde(with = "iso_millis")]
        since: DateTime<Utc>,
        #[serde(
            serialize_with = "iso_millis::serialize_option",
            deserialize_with = "iso_millis::deserialize_option",
            default
        )]
        until: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    Left,
    Right,
}

fn start_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
    date.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Resolve a selection against `now`. Pure: the same inputs give the same range.
///
/// Only a custom window can fail, when it ends before it starts.
pub fn resolve(selection: &DateRangeSelection, now: DateTime<Utc>) -> Result<DateRange, DateRangeError> {
    match selection {
        DateRangeSelection::Live => Ok(DateRange::live(now - Duration::minutes(LIVE_LOOKBACK_MINUTES))),
        DateRangeSelection::Preset { preset } => {
            let (since, until) = match preset {
                DateRangePreset::LastHour => (now - Duration::hours(1), now),
                DateRangePreset::Last4Hours => (now - Duration::hours(4), now),
                DateRangePreset::Last7Days => (start_of_day(now) - Duration::days(7), now),
                DateRangePreset::Today => (start_of_day(now), now),
                DateRangePreset::Yesterday => {
                    let today = start_of_day(now);
                    (today - Duration::days(1), today - Duration::milliseconds(1))
                }
            };
            Ok(DateRange {
                since,
                until: Some(until),
            })
        }
        DateRangeSelection::Custom { since, until } => DateRange::new(*since, *until),
    }
}

pub fn resolve_now(selection: &DateRangeSelection) -> Result<DateRange, DateRangeError> {
    resolve(selection, Utc::now())
}

/// The adjacent window of equal length. Live ranges cannot be shifted.
pub fn shift_date_range(range: &DateRange, direction: ShiftDirection) -> Result<DateRange, DateRangeError> {
    let until = range.until.ok_or(DateRangeError::LiveRange)?;
    let duration = until - range.since;
    let offset = match direction {
        ShiftDirection::Left => -duration,
        ShiftDirection::Right => duration,
    };
    Ok(DateRange {
        since: range.since + offset,
        until: Some(until + offset),
    })
}

/// End a range at the last record received, used after discarding an overflow
/// so the next page starts exactly where the stream stopped.
pub fn shrink_until(range: &DateRange, last_log_date: DateTime<Utc>) -> DateRange {
    let until = match range.until {
        Some(until) if until < last_log_date => until,
        _ => last_log_date.max(range.since),
    };
    DateRange {
        since: range.since,
        until: Some(until),
    }
}
