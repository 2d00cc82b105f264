//! Timestamp-derived identifiers
//!
//! Analysis records and optimized instructions are named after the moment
//! they were created, so everything here is built on the local clock.

use chrono::{DateTime, Local};

/// Current local time as an ISO-8601 string with microseconds
///
/// Example: `2026-10-19T14:03:07.123456`
pub fn now_iso() -> String {
    iso_timestamp(&Local::now())
}

/// Format a timestamp the same way [`now_iso`] does
pub fn iso_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`
pub fn safe_filename(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Name for an instruction produced by the optimizer
///
/// Format: `optimized_{YYYYmmdd}_{HHMMSS}`
pub fn optimized_name(at: &DateTime<Local>) -> String {
    format!("optimized_{}", at.format("%Y%m%d_%H%M%S"))
}

/// Disambiguate a name that is already taken
///
/// Attempt 0 is the base itself, attempt n appends `_{n}`.
pub fn with_attempt(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{}_{}", base, attempt)
    }
}
