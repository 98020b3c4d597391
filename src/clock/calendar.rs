use crate::core::{LedgerError, Result};
use chrono::{DateTime, Duration, FixedOffset, Local, LocalResult, NaiveTime, Offset, TimeZone, Utc};

const SECONDS_PER_DAY: i64 = 86_400;
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Time zone whose midnights delimit accrual days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccrualZone {
    /// The host's local time zone (DST-aware).
    #[default]
    ServerLocal,
    /// A fixed offset from UTC, east-positive.
    Fixed(FixedOffset),
}

impl AccrualZone {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// `None` keeps server-local time; `Some(m)` pins a fixed offset of `m`
    /// minutes east of UTC.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Result<Self> {
        match minutes {
            None => Ok(Self::ServerLocal),
            Some(m) if m.abs() <= MAX_OFFSET_MINUTES => FixedOffset::east_opt(m * 60)
                .map(Self::Fixed)
                .ok_or_else(|| LedgerError::Validation(format!("invalid accrual offset {}", m))),
            Some(m) => Err(LedgerError::Validation(format!(
                "accrual offset must be within +/-{} minutes, got {}",
                MAX_OFFSET_MINUTES, m
            ))),
        }
    }

    /// The most recent midnight in this zone at or before `instant`.
    pub fn day_start(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::ServerLocal => midnight_in(&Local, instant),
            Self::Fixed(offset) => midnight_in(offset, instant),
        }
    }
}

fn midnight_in<Tz: TimeZone>(tz: &Tz, instant: DateTime<Utc>) -> DateTime<Utc> {
    let local = instant.with_timezone(tz);
    let naive_midnight = local.date_naive().and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive_midnight) {
        LocalResult::Single(midnight) => midnight.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // midnight skipped by a DST jump; anchor on the offset in force at `instant`
            let offset = local.offset().fix().local_minus_utc() as i64;
            (naive_midnight - Duration::seconds(offset)).and_utc()
        }
    }
}

/// Whole days from `from` to `to`, rounded toward negative infinity.
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Converts a browser-style offset (`Date#getTimezoneOffset`: minutes,
/// positive west of UTC) into a `FixedOffset`.
pub fn client_offset(tz_offset_minutes: i32) -> Result<FixedOffset> {
    if tz_offset_minutes.abs() > MAX_OFFSET_MINUTES {
        return Err(LedgerError::Validation(format!(
            "timezone offset must be within +/-{} minutes, got {}",
            MAX_OFFSET_MINUTES, tz_offset_minutes
        )));
    }
    FixedOffset::west_opt(tz_offset_minutes * 60)
        .ok_or_else(|| LedgerError::Validation(format!("invalid timezone offset {}", tz_offset_minutes)))
}

/// `YYYY-MM-DD` of `instant` as seen by a client at `tz_offset_minutes`.
pub fn client_day_string(instant: DateTime<Utc>, tz_offset_minutes: i32) -> Result<String> {
    let offset = client_offset(tz_offset_minutes)?;
    Ok(instant.with_timezone(&offset).format("%Y-%m-%d").to_string())
}
