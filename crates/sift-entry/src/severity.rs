//! Ordinal severity levels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The ordinal severity of a log entry.
///
/// Levels are spaced ten apart so sources with finer-grained ladders can be
/// mapped between the named levels without collisions.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Severity(pub u8);

impl Severity {
    pub const DEFAULT: Severity = Severity(0);
    pub const TRACE: Severity = Severity(10);
    pub const DEBUG: Severity = Severity(20);
    pub const INFO: Severity = Severity(30);
    pub const NOTICE: Severity = Severity(40);
    pub const WARNING: Severity = Severity(50);
    pub const ERROR: Severity = Severity(60);
    pub const CRITICAL: Severity = Severity(70);
    pub const ALERT: Severity = Severity(80);
    pub const EMERGENCY: Severity = Severity(90);
    pub const CATASTROPHE: Severity = Severity(100);

    /// The name of the nearest named level at or below this severity.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            0..=9 => "default",
            10..=19 => "trace",
            20..=29 => "debug",
            30..=39 => "info",
            40..=49 => "notice",
            50..=59 => "warning",
            60..=69 => "error",
            70..=79 => "critical",
            80..=89 => "alert",
            90..=99 => "emergency",
            _ => "catastrophe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
