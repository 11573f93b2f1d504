//! Centralized datetime handling utilities
//!
//! Provides consistent datetime parsing and formatting across the
//! application: flexible parsing of provider timestamps, SQLite storage
//! format, and the XMLTV wire format (`YYYYMMDDHHMMSS +0000`, always UTC).

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Errors that can occur during datetime operations
#[derive(Error, Debug)]
pub enum DateTimeError {
    /// Invalid datetime format provided
    #[error("Invalid datetime format: '{input}'")]
    InvalidFormat { input: String },
}

/// Centralized datetime parsing and formatting utilities
pub struct DateTimeParser;

impl DateTimeParser {
    /// Parse datetime from the formats seen across providers and storage.
    ///
    /// Supports:
    /// - RFC3339 with timezone: "2025-12-14T20:00:00Z", "2025-12-14T20:00Z"
    /// - RFC3339 with offset: "2025-12-14T20:00:00+02:00"
    /// - SQLite format (assumes UTC): "2025-12-14 20:00:00"
    /// - XMLTV format: "20251214200000 +0000"
    pub fn parse_flexible(datetime_str: &str) -> Result<DateTime<Utc>, DateTimeError> {
        let trimmed = datetime_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }

        // ESPN occasionally omits seconds ("2025-12-14T20:00Z")
        if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M%#z") {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S %z") {
            return Ok(dt.with_timezone(&Utc));
        }

        let naive_formats = [
            "%Y-%m-%d %H:%M:%S",    // SQLite format
            "%Y-%m-%d %H:%M:%S%.f", // SQLite with fractional seconds
            "%Y-%m-%dT%H:%M:%S",    // ISO without timezone
            "%Y-%m-%dT%H:%M:%S%.f", // ISO with fractional seconds
        ];

        for format in &naive_formats {
            if let Ok(naive_dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
            }
        }

        Err(DateTimeError::InvalidFormat {
            input: datetime_str.to_string(),
        })
    }

    /// Format datetime for storage in SQLite ("YYYY-MM-DD HH:MM:SS").
    pub fn format_for_storage(dt: &DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Format a datetime for XMLTV output. Always UTC with an explicit
    /// +0000 offset per the XMLTV convention.
    pub fn format_xmltv(dt: &DateTime<Utc>) -> String {
        dt.format("%Y%m%d%H%M%S +0000").to_string()
    }

    /// Parse an XMLTV timestamp back into UTC (used by the consolidator
    /// when re-reading fragments).
    pub fn parse_xmltv(s: &str) -> Result<DateTime<Utc>, DateTimeError> {
        DateTime::parse_from_str(s.trim(), "%Y%m%d%H%M%S %z")
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| DateTimeError::InvalidFormat {
                input: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_parse_rfc3339() {
        let dt = DateTimeParser::parse_flexible("2025-12-14T20:00:00Z").unwrap();
        assert_eq!(dt.year(), 2025);
        assert_eq!(dt.month(), 12);
        assert_eq!(dt.day(), 14);
        assert_eq!(dt.hour(), 20);
    }

    #[test]
    fn test_parse_espn_minute_precision() {
        let dt = DateTimeParser::parse_flexible("2025-12-14T20:00Z").unwrap();
        assert_eq!(dt.hour(), 20);
        assert_eq!(dt.second(), 0);
    }

    #[test]
    fn test_parse_sqlite_format() {
        let dt = DateTimeParser::parse_flexible("2025-12-14 20:00:00").unwrap();
        assert_eq!(dt.day(), 14);
    }

    #[test]
    fn test_parse_with_offset_converts_to_utc() {
        let dt = DateTimeParser::parse_flexible("2025-12-14T20:00:00+02:00").unwrap();
        assert_eq!(dt.hour(), 18);
    }

    #[test]
    fn test_xmltv_round_trip() {
        let dt = Utc.with_ymd_and_hms(2025, 12, 14, 20, 30, 0).unwrap();
        let formatted = DateTimeParser::format_xmltv(&dt);
        assert_eq!(formatted, "20251214203000 +0000");
        assert_eq!(DateTimeParser::parse_xmltv(&formatted).unwrap(), dt);
    }

    #[test]
    fn test_invalid_format() {
        assert!(DateTimeParser::parse_flexible("not-a-date").is_err());
    }
}
