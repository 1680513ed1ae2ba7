//! A length of time decoded from configuration.

use std::cell::Cell;
use std::fmt;
use std::time::Duration as StdDuration;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;

/// A signed length of time decoded from a bare number (seconds, fractional
/// permitted) or a duration string (`1m`, `60s`, `1h30m`, `250ms`).
///
/// Decoding is format-sensitive: the YAML entry points normalize negative
/// values to their absolute value, while the JSON path preserves the sign.
/// The asymmetry is kept for input compatibility with existing
/// configuration documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration {
    nanos: i64,
}

impl Duration {
    pub const fn from_secs(secs: i64) -> Self {
        Duration {
            nanos: secs * NANOS_PER_SEC,
        }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Duration {
            nanos: millis * 1_000_000,
        }
    }

    /// The raw signed length in nanoseconds, without modification.
    pub fn as_nanos(&self) -> i64 {
        self.nanos
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn is_positive(&self) -> bool {
        self.nanos > 0
    }

    /// The duration as unsigned std time; non-positive durations clamp to
    /// zero.
    pub fn raw(&self) -> StdDuration {
        if self.nanos <= 0 {
            StdDuration::ZERO
        } else {
            StdDuration::from_nanos(self.nanos as u64)
        }
    }
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

thread_local! {
    static YAML_NORMALIZE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as decoding a YAML-sourced document until the
/// returned guard drops. While set, negative durations normalize to their
/// absolute value; the JSON path never sets it, so its signs survive.
pub(crate) fn yaml_decode_scope() -> YamlDecodeScope {
    let previous = YAML_NORMALIZE.with(|flag| flag.replace(true));
    YamlDecodeScope { previous }
}

pub(crate) struct YamlDecodeScope {
    previous: bool,
}

impl Drop for YamlDecodeScope {
    fn drop(&mut self) {
        let previous = self.previous;
        YAML_NORMALIZE.with(|flag| flag.set(previous));
    }
}

/// Finishes a decode, applying the YAML sign normalization when active.
fn from_decoded(nanos: i64) -> Duration {
    if YAML_NORMALIZE.with(Cell::get) {
        Duration {
            nanos: nanos.saturating_abs(),
        }
    } else {
        Duration { nanos }
    }
}

/// Duration units accepted by the string grammar, longest spelling first so
/// `ms` wins over `m` during the scan.
const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", NANOS_PER_SEC as u128),
    ("m", 60 * NANOS_PER_SEC as u128),
    ("h", 3600 * NANOS_PER_SEC as u128),
];

/// Parses the duration grammar: a signed sequence of `<decimal><unit>`
/// segments, e.g. `1h30m`, `1.5s`, `-250ms`. The sign is preserved.
fn parse_duration_str(input: &str) -> Result<i64, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let mut s = input.trim();
    let mut negative = false;
    if let Some(stripped) = s.strip_prefix('-') {
        negative = true;
        s = stripped;
    } else if let Some(stripped) = s.strip_prefix('+') {
        s = stripped;
    }
    if s == "0" {
        return Ok(0);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos: u128 = 0;
    while !s.is_empty() {
        let number_len = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        let (number, rest) = s.split_at(number_len);
        if number.is_empty() {
            return Err(invalid());
        }

        let (unit, multiplier) = UNITS
            .iter()
            .find(|(unit, _)| rest.starts_with(unit))
            .ok_or_else(invalid)?;
        s = &rest[unit.len()..];

        let nanos = match number.split_once('.') {
            None => {
                let whole: u128 = number.parse().map_err(|_| invalid())?;
                whole * multiplier
            }
            Some((whole, frac)) => {
                let whole: u128 = if whole.is_empty() {
                    0
                } else {
                    whole.parse().map_err(|_| invalid())?
                };
                let frac_value: f64 = format!("0.{frac}").parse().map_err(|_| invalid())?;
                whole * multiplier + (frac_value * *multiplier as f64).round() as u128
            }
        };
        total_nanos += nanos;
    }

    let nanos = i64::try_from(total_nanos).map_err(|_| invalid())?;
    Ok(if negative { -nanos } else { nanos })
}

/// Writes a scaled value with its fraction, trimming trailing zeros
/// (`1.5ms`, not `1.500000ms`).
fn write_scaled(f: &mut fmt::Formatter<'_>, nanos: u128, scale: u128, unit: &str) -> fmt::Result {
    let whole = nanos / scale;
    let frac = nanos % scale;
    if frac == 0 {
        write!(f, "{whole}{unit}")
    } else {
        let mut digits = format!("{:0width$}", frac, width = scale.ilog10() as usize);
        while digits.ends_with('0') {
            digits.pop();
        }
        write!(f, "{whole}.{digits}{unit}")
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos < 0 {
            f.write_str("-")?;
        }
        let nanos = self.nanos.unsigned_abs() as u128;
        if nanos == 0 {
            return f.write_str("0s");
        }
        if nanos < 1_000 {
            return write!(f, "{nanos}ns");
        }
        if nanos < 1_000_000 {
            return write_scaled(f, nanos, 1_000, "us");
        }
        if nanos < NANOS_PER_SEC as u128 {
            return write_scaled(f, nanos, 1_000_000, "ms");
        }

        let secs = (nanos / NANOS_PER_SEC as u128) as u64;
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        if hours > 0 {
            write!(f, "{hours}h{minutes}m")?;
        } else if minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        let sec_nanos = nanos % (60 * NANOS_PER_SEC as u128);
        write_scaled(f, sec_nanos, NANOS_PER_SEC as u128, "s")
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number of seconds or a duration string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                let nanos = v
                    .checked_mul(NANOS_PER_SEC)
                    .ok_or_else(|| de::Error::custom("duration out of range"))?;
                Ok(from_decoded(nanos))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                let secs =
                    i64::try_from(v).map_err(|_| de::Error::custom("duration out of range"))?;
                self.visit_i64(secs)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Duration, E> {
                let nanos = v * NANOS_PER_SEC as f64;
                if !nanos.is_finite() || nanos >= i64::MAX as f64 || nanos <= i64::MIN as f64 {
                    return Err(de::Error::custom("duration out of range"));
                }
                Ok(from_decoded(nanos as i64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                parse_duration_str(v)
                    .map(from_decoded)
                    .map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
