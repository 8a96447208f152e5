//! Time-gap vocabulary.
//!
//! The generation stage writes gaps as short English phrases ("two weeks
//! later", "a year after", "2 sessions later"). The accepted set is closed:
//! anything outside it is a resolution error, never a silent zero.
//!
//! Units: day = 1, week = 7, month = 30, year = 365 days. "a few" and
//! "several" count as 3, "a couple of" as 2, "half a" as half the unit.

use crate::CuebenchError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeGap {
    /// Query later the same day as the cue.
    SameDay,
    /// Query lands on the Nth session after the anchor.
    Sessions { count: u32 },
    /// Explicit offset; negative when the phrase points backwards.
    Days { days: i64 },
}

impl std::fmt::Display for TimeGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeGap::SameDay => write!(f, "same day"),
            TimeGap::Sessions { count } => write!(f, "{count} session(s) later"),
            TimeGap::Days { days } => write!(f, "{days} day(s)"),
        }
    }
}

/// `time_gap` as written in a record: a phrase or `{"count": 2, "unit": "weeks"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimeGapSource {
    Text(String),
    Structured { count: i64, unit: String },
}

impl TimeGapSource {
    /// Human-readable form carried into outputs.
    pub fn describe(&self) -> String {
        match self {
            TimeGapSource::Text(s) => s.trim().to_string(),
            TimeGapSource::Structured { count, unit } => format!("{count} {unit} later"),
        }
    }

    pub fn resolve(&self) -> Result<TimeGap, CuebenchError> {
        match self {
            TimeGapSource::Text(s) => parse_time_gap(s),
            TimeGapSource::Structured { count, unit } => {
                let unit = unit.trim().to_lowercase();
                if unit.starts_with("session") {
                    let count = u32::try_from(*count).map_err(|_| {
                        CuebenchError::TimeGapResolution(format!("session count {count} out of range"))
                    })?;
                    return Ok(sessions(count));
                }
                let per_unit = unit_days(&unit).ok_or_else(|| {
                    CuebenchError::TimeGapResolution(format!("unknown time unit {unit:?}"))
                })?;
                let total = count.checked_mul(per_unit).ok_or_else(|| {
                    CuebenchError::TimeGapResolution(format!("{count} {unit} is out of range"))
                })?;
                Ok(days(total))
            }
        }
    }
}

static ISO_DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^p(\d+)([dwmy])$").unwrap());

static SAME_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(same (day|session|evening|afternoon|night)|later (that|the same) day|that (evening|afternoon|night)|(a few|several|\d+|an?) hours? later|immediately|right after)\b",
    )
    .unwrap()
});

static SESSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(next session|(\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|a couple of|a few|several|an?)\s+sessions?)\b",
    )
    .unwrap()
});

static NEXT_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(tomorrow|(next|following) (day|week|month|year))\b").unwrap());

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(a couple of|couple of|a few|few|several|half an?|\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|an?)\s*(days?|weeks?|months?|years?)\b",
    )
    .unwrap()
});

static BACKWARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(earlier|before|ago|prior)\b").unwrap());

fn sessions(count: u32) -> TimeGap {
    if count == 0 { TimeGap::SameDay } else { TimeGap::Sessions { count } }
}

fn days(n: i64) -> TimeGap {
    if n == 0 { TimeGap::SameDay } else { TimeGap::Days { days: n } }
}

fn unit_days(unit: &str) -> Option<i64> {
    if unit.starts_with("day") {
        Some(1)
    } else if unit.starts_with("week") {
        Some(7)
    } else if unit.starts_with("month") {
        Some(30)
    } else if unit.starts_with("year") {
        Some(365)
    } else {
        None
    }
}

fn count_word(word: &str) -> Option<i64> {
    let n = match word {
        "a" | "an" | "one" => 1,
        "two" | "a couple of" | "couple of" => 2,
        "three" | "a few" | "few" | "several" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        digits => return digits.parse().ok(),
    };
    Some(n)
}

/// Parse a time-gap phrase into a concrete [`TimeGap`].
pub fn parse_time_gap(raw: &str) -> Result<TimeGap, CuebenchError> {
    let s = raw.trim().to_lowercase();
    let unrecognised = || CuebenchError::TimeGapResolution(format!("unrecognised time gap {raw:?}"));

    if let Some(c) = ISO_DURATION.captures(&s) {
        let n: i64 = c[1].parse().map_err(|_| unrecognised())?;
        let per_unit = match &c[2] {
            "d" => 1,
            "w" => 7,
            "m" => 30,
            _ => 365,
        };
        return n.checked_mul(per_unit).map(days).ok_or_else(unrecognised);
    }

    if SAME_DAY.is_match(&s) {
        return Ok(TimeGap::SameDay);
    }

    if let Some(c) = SESSIONS.captures(&s) {
        if c[1].starts_with("next") {
            return Ok(sessions(1));
        }
        let n = c
            .get(2)
            .and_then(|m| count_word(m.as_str()))
            .ok_or_else(unrecognised)?;
        let n = u32::try_from(n).map_err(|_| unrecognised())?;
        return Ok(sessions(n));
    }

    let sign = if BACKWARD.is_match(&s) { -1 } else { 1 };

    if let Some(c) = NEXT_UNIT.captures(&s) {
        let unit = c.get(3).map_or("day", |m| m.as_str());
        let per_unit = unit_days(unit).ok_or_else(unrecognised)?;
        return Ok(days(sign * per_unit));
    }

    if let Some(c) = DURATION.captures(&s) {
        let per_unit = unit_days(&c[2]).ok_or_else(unrecognised)?;
        let total = if c[1].starts_with("half") {
            Some(per_unit / 2)
        } else {
            count_word(&c[1]).ok_or_else(unrecognised)?.checked_mul(per_unit)
        };
        return total
            .and_then(|t| t.checked_mul(sign))
            .map(days)
            .ok_or_else(unrecognised);
    }

    Err(unrecognised())
}
