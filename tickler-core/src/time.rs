//! Time utilities: the single authoritative due-date resolution step, plus
//! the human rendering used in drafts.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::{Result, TaskError};

/// Rendering used when a task has no deadline.
pub const NO_DUE_DATE: &str = "no due date";

/// Source of "now" for the lifecycle manager and scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^in\s+(\d+|an?|one)\s+(minute|min|hour|hr|day|week)s?$")
        .expect("relative offset pattern compiles")
});

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").expect("clock pattern compiles")
});

/// Resolves due-date expressions ("tomorrow", "2026-02-20 23:59", "in 2 hours")
/// to absolute UTC instants. Wall-clock values are read in `tz`.
///
/// Anything that does not map to exactly one instant is `AmbiguousDueDate`.
#[derive(Debug, Clone, Copy)]
pub struct DueDateResolver {
    tz: Tz,
    default_hour: u32,
}

impl Default for DueDateResolver {
    fn default() -> Self {
        Self {
            tz: Tz::UTC,
            default_hour: 9,
        }
    }
}

impl DueDateResolver {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            ..Self::default()
        }
    }

    /// Parse an IANA zone like "America/Chicago".
    pub fn from_timezone_name(name: &str) -> Result<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|_| TaskError::Validation(format!("invalid timezone: {name}")))?;
        Ok(Self::new(tz))
    }

    /// Hour used for date-only expressions. Clamped to 0..=23.
    pub fn with_default_hour(mut self, hour: u32) -> Self {
        self.default_hour = hour.min(23);
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn resolve(&self, expression: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let raw = expression.trim();
        let ambiguous = || TaskError::AmbiguousDueDate {
            expression: raw.to_string(),
        };
        if raw.is_empty() {
            return Err(ambiguous());
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, fmt) {
                return self.local_to_utc(ndt).ok_or_else(ambiguous);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return self
                .at_clock(date, self.default_hour, 0)
                .ok_or_else(ambiguous);
        }

        let expr = raw.trim_end_matches('.').to_lowercase();
        let expr = expr.split_whitespace().collect::<Vec<_>>().join(" ");

        if expr == "now" {
            return Ok(now);
        }
        if let Some(caps) = RELATIVE_RE.captures(&expr) {
            let n: i64 = match &caps[1] {
                "a" | "an" | "one" => 1,
                digits => digits.parse().map_err(|_| ambiguous())?,
            };
            let offset = match &caps[2] {
                "minute" | "min" => Duration::try_minutes(n),
                "hour" | "hr" => Duration::try_hours(n),
                "day" => Duration::try_days(n),
                _ => Duration::try_weeks(n),
            };
            return offset
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(ambiguous);
        }

        let (day_part, clock_part) = match expr.rsplit_once(" at ") {
            Some((day, clock)) => (day, Some(clock)),
            None => (expr.as_str(), None),
        };

        let today = now.with_timezone(&self.tz).date_naive();
        let (date, implied_hour) = self.resolve_day(day_part, today).ok_or_else(ambiguous)?;

        let (hour, minute) = match (clock_part, implied_hour) {
            (Some(clock), implied) => {
                let clock = parse_clock(clock).ok_or_else(ambiguous)?;
                match implied {
                    // "tonight at 9" is 21:00; a morning time contradicts the day word.
                    Some(evening) if evening >= 12 => {
                        let hour = if !clock.qualified && (1..12).contains(&clock.hour) {
                            clock.hour + 12
                        } else {
                            clock.hour
                        };
                        if hour < 12 {
                            return Err(ambiguous());
                        }
                        (hour, clock.minute)
                    }
                    _ => (clock.hour, clock.minute),
                }
            }
            (None, implied) => (implied.unwrap_or(self.default_hour), 0),
        };

        self.at_clock(date, hour, minute).ok_or_else(ambiguous)
    }

    /// Human-readable due rendering for drafts.
    pub fn render(&self, due_at: Option<DateTime<Utc>>) -> String {
        match due_at {
            Some(due) => due
                .with_timezone(&self.tz)
                .format("%A, %B %-d %Y at %H:%M %Z")
                .to_string(),
            None => NO_DUE_DATE.to_string(),
        }
    }

    fn resolve_day(&self, day: &str, today: NaiveDate) -> Option<(NaiveDate, Option<u32>)> {
        match day {
            "today" => Some((today, None)),
            "tonight" => Some((today, Some(20))),
            "tomorrow" => Some((today.checked_add_days(Days::new(1))?, None)),
            "day after tomorrow" => Some((today.checked_add_days(Days::new(2))?, None)),
            "next week" => Some((today.checked_add_days(Days::new(7))?, None)),
            other => {
                let name = other
                    .strip_prefix("next ")
                    .or_else(|| other.strip_prefix("on "))
                    .unwrap_or(other);
                let weekday: Weekday = name.parse().ok()?;
                Some((next_weekday(today, weekday)?, None))
            }
        }
    }

    fn at_clock(&self, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
        self.local_to_utc(date.and_hms_opt(hour, minute, 0)?)
    }

    fn local_to_utc(&self, ndt: NaiveDateTime) -> Option<DateTime<Utc>> {
        // DST gaps and folds have no single instant.
        self.tz
            .from_local_datetime(&ndt)
            .single()
            .map(|local| local.with_timezone(&Utc))
    }
}

/// Strictly after `today`.
fn next_weekday(today: NaiveDate, target: Weekday) -> Option<NaiveDate> {
    let current = today.weekday().num_days_from_monday();
    let wanted = target.num_days_from_monday();
    let ahead = match (wanted + 7 - current) % 7 {
        0 => 7,
        n => n,
    };
    today.checked_add_days(Days::new(u64::from(ahead)))
}

struct ClockTime {
    hour: u32,
    minute: u32,
    /// Carried am/pm or a named time, so the hour is not open to reading.
    qualified: bool,
}

fn parse_clock(clock: &str) -> Option<ClockTime> {
    let named = |hour| {
        Some(ClockTime {
            hour,
            minute: 0,
            qualified: true,
        })
    };
    match clock {
        "noon" => return named(12),
        "midnight" => return named(0),
        _ => {}
    }
    let caps = CLOCK_RE.captures(clock)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    if minute > 59 {
        return None;
    }
    let meridiem = caps.get(3).map(|m| m.as_str());
    match meridiem {
        Some(meridiem) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            hour %= 12;
            if meridiem == "pm" {
                hour += 12;
            }
        }
        None if hour > 23 => return None,
        None => {}
    }
    Some(ClockTime {
        hour,
        minute,
        qualified: meridiem.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        // Wednesday
        Utc.with_ymd_and_hms(2026, 3, 4, 15, 30, 0).unwrap()
    }

    #[test]
    fn parses_chicago_local_deadline() {
        // Feb is CST (UTC-6)
        let r = DueDateResolver::from_timezone_name("America/Chicago").unwrap();
        let utc = r.resolve("2026-02-20 23:59", now()).unwrap();
        assert_eq!(utc.to_rfc3339(), "2026-02-21T05:59:00+00:00");
    }

    #[test]
    fn rfc3339_passes_through() {
        let r = DueDateResolver::default();
        let utc = r.resolve("2026-05-01T10:00:00+02:00", now()).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn tomorrow_uses_default_hour() {
        let r = DueDateResolver::default();
        let utc = r.resolve("tomorrow", now()).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap());
    }

    #[test]
    fn tomorrow_with_clock() {
        let r = DueDateResolver::default();
        let utc = r.resolve("Tomorrow at 5:15pm", now()).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 5, 17, 15, 0).unwrap());
        let noon = r.resolve("tomorrow at noon", now()).unwrap();
        assert_eq!(noon, Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap());
    }

    #[test]
    fn tonight_reads_bare_hours_as_evening() {
        let r = DueDateResolver::default();
        let nine = r.resolve("tonight at 9", now()).unwrap();
        assert_eq!(nine, Utc.with_ymd_and_hms(2026, 3, 4, 21, 0, 0).unwrap());
        assert!(nine > now());
        assert_eq!(
            r.resolve("tonight at 10:30pm", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 22, 30, 0).unwrap()
        );
        assert_eq!(
            r.resolve("tonight at 19:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 19, 0, 0).unwrap()
        );
        assert_eq!(
            r.resolve("tonight", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 20, 0, 0).unwrap()
        );
    }

    #[test]
    fn tonight_with_a_morning_time_is_ambiguous() {
        let r = DueDateResolver::default();
        for expr in ["tonight at 8am", "tonight at midnight", "tonight at 0"] {
            let err = r.resolve(expr, now()).unwrap_err();
            assert_eq!(err.kind(), "ambiguous_due_date", "{expr}");
        }
    }

    #[test]
    fn relative_offsets() {
        let r = DueDateResolver::default();
        assert_eq!(r.resolve("in 2 hours", now()).unwrap(), now() + Duration::hours(2));
        assert_eq!(r.resolve("in an hour", now()).unwrap(), now() + Duration::hours(1));
        assert_eq!(r.resolve("in 3 days", now()).unwrap(), now() + Duration::days(3));
        assert_eq!(r.resolve("now", now()).unwrap(), now());
    }

    #[test]
    fn next_week_and_weekdays() {
        let r = DueDateResolver::default();
        assert_eq!(
            r.resolve("next week", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap()
        );
        assert_eq!(
            r.resolve("friday", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 6, 9, 0, 0).unwrap()
        );
        // Same weekday as today rolls a full week.
        assert_eq!(
            r.resolve("next wednesday at 8am", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn today_is_read_in_the_configured_zone() {
        // 03:00 UTC on Mar 5 is still Mar 4 in Chicago.
        let late = Utc.with_ymd_and_hms(2026, 3, 5, 3, 0, 0).unwrap();
        let r = DueDateResolver::from_timezone_name("America/Chicago").unwrap();
        let utc = r.resolve("tomorrow", late).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 5, 15, 0, 0).unwrap());
    }

    #[test]
    fn vague_expressions_are_ambiguous() {
        let r = DueDateResolver::default();
        for expr in ["ambiguous", "soon", "sometime next month", "", "tomorrow at 25:00", "this friday"] {
            let err = r.resolve(expr, now()).unwrap_err();
            assert_eq!(err.kind(), "ambiguous_due_date", "{expr}");
        }
    }

    #[test]
    fn dst_gap_is_ambiguous() {
        // 2026-03-08 02:30 does not exist in Chicago.
        let r = DueDateResolver::from_timezone_name("America/Chicago").unwrap();
        assert!(r.resolve("2026-03-08 02:30", now()).is_err());
    }

    #[test]
    fn renders_due_and_missing_due() {
        let r = DueDateResolver::default();
        let due = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();
        assert_eq!(r.render(Some(due)), "Thursday, March 5 2026 at 09:00 UTC");
        assert_eq!(r.render(None), NO_DUE_DATE);
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(DueDateResolver::from_timezone_name("Mars/Olympus").is_err());
    }
}
