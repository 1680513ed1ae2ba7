//! Multi-format timestamp extraction.
//!
//! A [`TimeParser`] pulls a timestamp out of a designated field using one of
//! four layout families:
//!
//! - `native`: the value must already be an RFC 3339 timestamp string.
//! - `strptime`: `%`-directive layouts; unknown directives fail at build.
//! - `gotime`: Go reference-time layouts (`2006-01-02 15:04:05`), translated
//!   to the equivalent strptime form at build time. For every matching
//!   layout pair the two families parse identically.
//! - `epoch`: integer or fractional epoch offsets in the unit named by the
//!   layout (`s`, `ms`, `us`, `ns`, `s.ms`, `s.us`, `s.ns`).
//!
//! Layouts without an offset are interpreted as UTC; missing date components
//! default to year 0, January 1, so incomplete dates (syslog-style layouts
//! without a year) still parse deterministically.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sift_entry::{Entry, Field, FieldError, Value};

use crate::error::{ConfigError, ProcessingError};

/// The layout family used to interpret the source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutType {
    Native,
    Gotime,
    #[default]
    Strptime,
    Epoch,
}

/// Configuration for a [`TimeParser`], embedded in parser operators under
/// the `timestamp` key or used standalone by the `time_parser` operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeParserConfig {
    #[serde(default)]
    pub layout_type: LayoutType,
    #[serde(default)]
    pub layout: String,
    #[serde(default)]
    pub parse_from: Field,
    /// When false, the source field is removed after a successful parse.
    #[serde(default)]
    pub preserve: bool,
}

impl TimeParserConfig {
    /// True when no layout was configured at all.
    pub fn is_zero(&self) -> bool {
        self.layout.is_empty()
    }

    /// Validates the layout and compiles the parser.
    pub fn build(&self) -> Result<TimeParser, ConfigError> {
        let strategy = match self.layout_type {
            LayoutType::Native => Strategy::Native,
            LayoutType::Strptime => Strategy::Textual(strptime_to_chrono(&self.layout)?),
            LayoutType::Gotime => Strategy::Textual(gotime_to_chrono(&self.layout)),
            LayoutType::Epoch => Strategy::Epoch(EpochLayout::parse(&self.layout)?),
        };
        Ok(TimeParser {
            strategy,
            parse_from: self.parse_from.clone(),
            preserve: self.preserve,
        })
    }
}

#[derive(Debug, Clone)]
enum Strategy {
    Native,
    /// A chrono format string, already translated from its source family.
    Textual(String),
    Epoch(EpochLayout),
}

/// A compiled timestamp extractor.
#[derive(Debug, Clone)]
pub struct TimeParser {
    strategy: Strategy,
    parse_from: Field,
    preserve: bool,
}

impl TimeParser {
    /// Parses the source field and assigns the entry timestamp. Unless
    /// `preserve` was set, the source field is removed afterwards.
    pub fn parse(&self, entry: &mut Entry) -> Result<(), ProcessingError> {
        let value = self
            .parse_from
            .get(entry)
            .ok_or_else(|| FieldError::Missing {
                field: self.parse_from.to_string(),
            })?
            .into_owned();

        entry.timestamp = self.parse_value(&value)?;
        if !self.preserve {
            self.parse_from.delete(entry);
        }
        Ok(())
    }

    /// Parses a raw value into a timestamp without touching an entry.
    pub fn parse_value(&self, value: &Value) -> Result<DateTime<Utc>, ProcessingError> {
        match &self.strategy {
            Strategy::Native => {
                let text = value.as_text().ok_or_else(|| {
                    ProcessingError::Time(format!(
                        "value of type '{}' is not a timestamp",
                        value.kind()
                    ))
                })?;
                DateTime::parse_from_rfc3339(&text)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|err| ProcessingError::Time(format!("'{text}': {err}")))
            }
            Strategy::Textual(layout) => {
                let text = value.as_text().ok_or_else(|| {
                    ProcessingError::Time(format!(
                        "cannot parse a timestamp from a value of type '{}'",
                        value.kind()
                    ))
                })?;
                parse_textual(&text, layout)
            }
            Strategy::Epoch(layout) => parse_epoch(value, *layout),
        }
    }
}

/// Parses a textual timestamp with a chrono layout, falling back through
/// progressively less complete forms: zoned, naive, date-only, year-less
/// (defaulted to year 0), and time-only.
fn parse_textual(text: &str, layout: &str) -> Result<DateTime<Utc>, ProcessingError> {
    if let Ok(zoned) = DateTime::parse_from_str(text, layout) {
        return Ok(zoned.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, layout) {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    // Layouts without a year: retry with year 0 appended.
    let layout_with_year = format!("{layout} %Y");
    let text_with_year = format!("{text} 0");
    if let Ok(zoned) = DateTime::parse_from_str(&text_with_year, &layout_with_year) {
        return Ok(zoned.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&text_with_year, &layout_with_year) {
        return Ok(naive.and_utc());
    }

    if let Ok(time) = NaiveTime::parse_from_str(text, layout) {
        if let Some(date) = NaiveDate::from_ymd_opt(0, 1, 1) {
            return Ok(date.and_time(time).and_utc());
        }
    }

    Err(ProcessingError::Time(format!(
        "'{text}' cannot be parsed with layout '{layout}'"
    )))
}

/// Go reference-time tokens and their chrono equivalents, longest spelling
/// first so the scan is greedy. Anything unmatched is a literal.
const GOTIME_TOKENS: &[(&str, &str)] = &[
    ("2006", "%Y"),
    ("January", "%B"),
    ("Monday", "%A"),
    ("Jan", "%b"),
    ("Mon", "%a"),
    (".999999999", "%.f"),
    (".999999", "%.f"),
    (".999", "%.f"),
    (".000000000", "%.9f"),
    (".000000", "%.6f"),
    (".000", "%.3f"),
    ("-07:00", "%:z"),
    ("-0700", "%z"),
    ("Z07:00", "%:z"),
    ("Z0700", "%z"),
    ("MST", "%Z"),
    ("15", "%H"),
    ("01", "%m"),
    ("02", "%d"),
    ("03", "%I"),
    ("04", "%M"),
    ("05", "%S"),
    ("06", "%y"),
    ("_2", "%e"),
    ("PM", "%p"),
    ("pm", "%P"),
    ("1", "%-m"),
    ("2", "%-d"),
    ("3", "%-I"),
    ("4", "%-M"),
    ("5", "%-S"),
];

/// Translates a Go reference-time layout into a chrono format string.
fn gotime_to_chrono(layout: &str) -> String {
    let mut out = String::with_capacity(layout.len() + 8);
    let mut rest = layout;
    'scan: while !rest.is_empty() {
        for (token, replacement) in GOTIME_TOKENS {
            if let Some(remaining) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = remaining;
                continue 'scan;
            }
        }
        let ch = rest.chars().next().unwrap_or_default();
        if ch == '%' {
            out.push_str("%%");
        } else {
            out.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }
    out
}

/// Translates a strptime layout into a chrono format string, rejecting
/// unknown directives at build time.
fn strptime_to_chrono(layout: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(layout.len() + 8);
    let mut chars = layout.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let directive = chars.next().ok_or_else(|| {
            ConfigError::InvalidTimeLayout(format!("'{layout}' ends with a bare '%'"))
        })?;
        let replacement = match directive {
            'Y' => "%Y",
            'y' => "%y",
            'm' => "%m",
            'q' => "%-m",
            'b' | 'h' => "%b",
            'B' => "%B",
            'd' => "%d",
            'e' => "%e",
            'g' => "%-d",
            'a' => "%a",
            'A' => "%A",
            'H' => "%H",
            'I' => "%I",
            'l' => "%-I",
            'p' => "%p",
            'P' => "%P",
            'M' => "%M",
            'S' => "%S",
            // Fractional seconds by precision: milli, micro, nano.
            'L' => "%3f",
            'f' => "%6f",
            's' => "%9f",
            'z' => "%z",
            'j' => "%:z",
            'Z' => "%Z",
            'D' => "%m/%d/%y",
            'F' => "%Y-%m-%d",
            'T' => "%H:%M:%S",
            'n' => "\n",
            't' => "\t",
            '%' => "%%",
            other => {
                return Err(ConfigError::InvalidTimeLayout(format!(
                    "invalid strptime directive '%{other}'"
                )))
            }
        };
        out.push_str(replacement);
    }
    Ok(out)
}

/// Epoch layout: the unit of the integer part and the precision of the
/// fractional part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpochLayout {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
    SecondsMs,
    SecondsUs,
    SecondsNs,
}

impl EpochLayout {
    fn parse(layout: &str) -> Result<Self, ConfigError> {
        match layout {
            "s" => Ok(EpochLayout::Seconds),
            "ms" => Ok(EpochLayout::Milliseconds),
            "us" => Ok(EpochLayout::Microseconds),
            "ns" => Ok(EpochLayout::Nanoseconds),
            "s.ms" => Ok(EpochLayout::SecondsMs),
            "s.us" => Ok(EpochLayout::SecondsUs),
            "s.ns" => Ok(EpochLayout::SecondsNs),
            other => Err(ConfigError::InvalidTimeLayout(format!(
                "unsupported epoch layout '{other}'"
            ))),
        }
    }

    /// Nanoseconds per unit for the plain-integer layouts.
    fn unit_nanos(self) -> i128 {
        match self {
            EpochLayout::Seconds => 1_000_000_000,
            EpochLayout::Milliseconds => 1_000_000,
            EpochLayout::Microseconds => 1_000,
            _ => 1,
        }
    }

    /// Fractional digits carried by the `s.*` layouts.
    fn frac_digits(self) -> Option<usize> {
        match self {
            EpochLayout::SecondsMs => Some(3),
            EpochLayout::SecondsUs => Some(6),
            EpochLayout::SecondsNs => Some(9),
            _ => None,
        }
    }
}

fn parse_epoch(value: &Value, layout: EpochLayout) -> Result<DateTime<Utc>, ProcessingError> {
    if let Some(text) = value.as_text() {
        return parse_epoch_text(text.trim(), layout);
    }
    match value {
        Value::Int(i) => epoch_from_int(*i, layout),
        // Floats route through their shortest decimal form so integral
        // values stay exact; precision beyond ~100ns is lost for large
        // nanosecond epochs.
        Value::Float(f) if f.is_finite() => parse_epoch_text(&format!("{f}"), layout),
        other => Err(ProcessingError::Time(format!(
            "cannot parse an epoch time from a value of type '{}'",
            other.kind()
        ))),
    }
}

fn parse_epoch_text(text: &str, layout: EpochLayout) -> Result<DateTime<Utc>, ProcessingError> {
    let invalid =
        || ProcessingError::Time(format!("'{text}' cannot be parsed as an epoch timestamp"));

    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (text, ""),
    };
    let int: i128 = int_part.parse().map_err(|_| invalid())?;
    if !frac_part.is_empty() && frac_part.bytes().any(|b| !b.is_ascii_digit()) {
        return Err(invalid());
    }

    let total_nanos = match layout.frac_digits() {
        // `s.*` layouts: integer seconds plus a fraction truncated to the
        // layout's precision.
        Some(digits) => {
            let mut frac = frac_part.to_string();
            frac.truncate(digits);
            while frac.len() < digits {
                frac.push('0');
            }
            let frac: i128 = frac.parse().map_err(|_| invalid())?;
            let scale = 10_i128.pow(9 - digits as u32);
            int * 1_000_000_000 + frac * scale
        }
        // Plain-unit layouts: the whole number is in that unit; any
        // fraction is sub-unit.
        None => {
            let unit = layout.unit_nanos();
            let frac_nanos = if frac_part.is_empty() {
                0
            } else {
                let frac_value: f64 = format!("0.{frac_part}").parse().map_err(|_| invalid())?;
                (frac_value * unit as f64).round() as i128
            };
            int * unit + frac_nanos
        }
    };

    nanos_to_datetime(total_nanos)
}

fn epoch_from_int(value: i64, layout: EpochLayout) -> Result<DateTime<Utc>, ProcessingError> {
    let total_nanos = if layout.frac_digits().is_some() {
        // Integer input with a fractional layout carries seconds only; the
        // sub-second part is dropped.
        value as i128 * 1_000_000_000
    } else {
        value as i128 * layout.unit_nanos()
    };
    nanos_to_datetime(total_nanos)
}

fn nanos_to_datetime(total_nanos: i128) -> Result<DateTime<Utc>, ProcessingError> {
    let secs = i64::try_from(total_nanos.div_euclid(1_000_000_000))
        .map_err(|_| ProcessingError::Time("epoch timestamp out of range".to_string()))?;
    let nanos = total_nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| ProcessingError::Time("epoch timestamp out of range".to_string()))
}
