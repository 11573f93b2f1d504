//! Local-time display helpers
//!
//! A single configured IANA zone drives all local-date boundaries and
//! user-facing time strings; XMLTV output stays in UTC. Formatting
//! honors the 12h/24h and timezone-abbreviation display preferences.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Fallback zone when the configured value does not parse.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Parse an IANA zone name, falling back to the default.
pub fn parse_timezone(name: &str) -> Tz {
    name.parse::<Tz>()
        .unwrap_or_else(|_| DEFAULT_TIMEZONE.parse().expect("default timezone is valid"))
}

/// Convert a UTC instant into the configured local zone.
pub fn to_local(dt: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    dt.with_timezone(&tz)
}

/// The local calendar date of a UTC instant.
pub fn local_date(dt: DateTime<Utc>, tz: Tz) -> NaiveDate {
    dt.with_timezone(&tz).date_naive()
}

/// Today's date in the configured zone. A 7pm EST game on Dec 6 is
/// midnight UTC Dec 7; comparisons must use the user's notion of "today".
pub fn today_local(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Local midnight (00:00:00) of the given date, as a UTC instant.
pub fn local_midnight_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
    resolve_local(naive, tz)
}

/// Local end-of-day (23:59:59) of the given date, as a UTC instant.
pub fn local_end_of_day_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_hms_opt(23, 59, 59).expect("end of day is valid");
    resolve_local(naive, tz)
}

fn resolve_local(naive: chrono::NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    // DST gaps/folds: take the earliest valid interpretation.
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(first, _) => first.with_timezone(&Utc),
        chrono::LocalResult::None => {
            let shifted = naive + chrono::Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// Time display preferences carried through template resolution.
#[derive(Debug, Clone, Copy)]
pub struct TimeFormatSettings {
    pub use_24h: bool,
    pub show_timezone: bool,
}

impl Default for TimeFormatSettings {
    fn default() -> Self {
        Self {
            use_24h: false,
            show_timezone: true,
        }
    }
}

/// Format a time-of-day per display preferences, e.g. "7:30 PM EST" or "19:30".
pub fn format_time(dt: &DateTime<Tz>, settings: TimeFormatSettings) -> String {
    let fmt = match (settings.use_24h, settings.show_timezone) {
        (true, true) => "%H:%M %Z",
        (true, false) => "%H:%M",
        (false, true) => "%I:%M %p %Z",
        (false, false) => "%I:%M %p",
    };
    let result = dt.format(fmt).to_string();
    // Strip leading zero in 12h format ("07:30 PM" -> "7:30 PM")
    if !settings.use_24h && result.starts_with('0') {
        result[1..].to_string()
    } else {
        result
    }
}

/// Full date string, e.g. "Sunday, December 14, 2025".
pub fn format_date_long(dt: &DateTime<Tz>) -> String {
    dt.format("%A, %B %d, %Y").to_string()
}

/// Short date string, e.g. "Dec 14".
pub fn format_date_short(dt: &DateTime<Tz>) -> String {
    dt.format("%b %d").to_string()
}

/// "tonight" for local 5pm onward, "today" otherwise.
pub fn today_tonight(dt: &DateTime<Tz>) -> &'static str {
    if dt.hour() >= 17 {
        "tonight"
    } else {
        "today"
    }
}

/// Local YYYYMMDD string used for the programme `<date>` element.
pub fn format_programme_date(dt: &DateTime<Tz>) -> String {
    format!("{:04}{:02}{:02}", dt.year(), dt.month(), dt.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eastern() -> Tz {
        parse_timezone("America/New_York")
    }

    #[test]
    fn test_local_date_crosses_midnight_utc() {
        // 7pm EST Dec 6 is midnight UTC Dec 7
        let dt = Utc.with_ymd_and_hms(2025, 12, 7, 0, 0, 0).unwrap();
        assert_eq!(
            local_date(dt, eastern()),
            NaiveDate::from_ymd_opt(2025, 12, 6).unwrap()
        );
    }

    #[test]
    fn test_local_end_of_day_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
        let eod = local_end_of_day_utc(date, eastern());
        // 23:59:59 EST == 04:59:59 UTC next day
        assert_eq!(eod, Utc.with_ymd_and_hms(2025, 12, 17, 4, 59, 59).unwrap());
    }

    #[test]
    fn test_format_time_12h_strips_leading_zero() {
        let dt = eastern().with_ymd_and_hms(2025, 12, 14, 19, 30, 0).unwrap();
        let formatted = format_time(
            &dt,
            TimeFormatSettings {
                use_24h: false,
                show_timezone: false,
            },
        );
        assert_eq!(formatted, "7:30 PM");
    }

    #[test]
    fn test_format_time_24h() {
        let dt = eastern().with_ymd_and_hms(2025, 12, 14, 19, 30, 0).unwrap();
        let formatted = format_time(
            &dt,
            TimeFormatSettings {
                use_24h: true,
                show_timezone: false,
            },
        );
        assert_eq!(formatted, "19:30");
    }

    #[test]
    fn test_today_tonight_cutoff() {
        let afternoon = eastern().with_ymd_and_hms(2025, 12, 14, 13, 0, 0).unwrap();
        let evening = eastern().with_ymd_and_hms(2025, 12, 14, 19, 0, 0).unwrap();
        assert_eq!(today_tonight(&afternoon), "today");
        assert_eq!(today_tonight(&evening), "tonight");
    }

    #[test]
    fn test_invalid_timezone_falls_back() {
        let tz = parse_timezone("Not/AZone");
        assert_eq!(tz.name(), DEFAULT_TIMEZONE);
    }
}
