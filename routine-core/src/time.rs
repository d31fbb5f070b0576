//! Time utilities: timezone-aware day boundaries and local clock times.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;

fn invalid(input: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidTime {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Parse an IANA tz like "America/Chicago".
pub fn parse_tz(tz: &str) -> Result<Tz, ValidationError> {
    tz.parse().map_err(|_| invalid(tz, "invalid timezone"))
}

/// Parse a wall-clock time like "21:00".
pub fn parse_clock_time(s: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|e| invalid(s, e.to_string()))
}

/// Resolve a local date + wall-clock time in `tz` to UTC.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant;
/// nonexistent ones (spring-forward gap) are rejected.
pub fn local_to_utc(
    date: NaiveDate,
    time: NaiveTime,
    tz: Tz,
) -> Result<DateTime<Utc>, ValidationError> {
    let ndt = NaiveDateTime::new(date, time);
    let local = tz
        .from_local_datetime(&ndt)
        .earliest()
        .ok_or_else(|| invalid(&ndt.to_string(), format!("does not exist in {tz} (DST?)")))?;
    Ok(local.with_timezone(&Utc))
}

/// The local calendar date of `now` in `tz`.
pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Local midnight of `date`, as UTC.
pub fn day_start(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, ValidationError> {
    local_to_utc(date, NaiveTime::MIN, tz)
}

/// Format an instant as local "HH:MM".
pub fn format_clock(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chicago_midnight_is_six_utc_in_winter() {
        let tz = parse_tz("America/Chicago").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 20, 18, 0, 0).unwrap();
        let start = day_start(local_date(now, tz), tz).unwrap();
        assert_eq!(start.to_rfc3339(), "2026-02-20T06:00:00+00:00");
    }

    #[test]
    fn local_date_crosses_utc_midnight() {
        let tz = parse_tz("America/Chicago").unwrap();
        // 03:00 UTC on the 21st is still the evening of the 20th in Chicago.
        let now = Utc.with_ymd_and_hms(2026, 2, 21, 3, 0, 0).unwrap();
        assert_eq!(local_date(now, tz), NaiveDate::from_ymd_opt(2026, 2, 20).unwrap());
    }

    #[test]
    fn parses_clock_times() {
        assert_eq!(
            parse_clock_time("21:00").unwrap(),
            NaiveTime::from_hms_opt(21, 0, 0).unwrap()
        );
        assert!(parse_clock_time("25:00").is_err());
        assert!(parse_tz("Mars/Olympus").is_err());
    }

    #[test]
    fn spring_forward_gap_is_rejected() {
        let tz = parse_tz("America/Chicago").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let t = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        assert!(local_to_utc(date, t, tz).is_err());
    }
}
