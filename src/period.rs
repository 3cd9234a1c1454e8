//! Local calendar periods. All boundaries are computed in the wall-clock time of the timezone
//! `now` is expressed in, never in UTC, because a tracker resets with the user's day.

use std::fmt::Display;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How often the count of a tracker starts over. Nothing is physically reset, only the window
/// used for counting moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResetPeriod {
    Never,
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Display for ResetPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetPeriod::Never => write!(f, "never"),
            ResetPeriod::Daily => write!(f, "daily"),
            ResetPeriod::Weekly => write!(f, "weekly"),
            ResetPeriod::Monthly => write!(f, "monthly"),
            ResetPeriod::Yearly => write!(f, "yearly"),
        }
    }
}

/// Day a week starts on. Stored in settings as `0` (Sunday) or `1` (Monday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

impl WeekStart {
    /// Anything other than `1` is treated as Sunday.
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => WeekStart::Monday,
            _ => WeekStart::Sunday,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            WeekStart::Sunday => 0,
            WeekStart::Monday => 1,
        }
    }
}

/// Returns the first instant of `date` in `tz`. If local midnight doesn't exist (a DST jump at
/// midnight) the day starts an hour later.
pub fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}

/// Local noon of `date`. Used for events logged against a past day, so that a timezone or DST
/// shift can't move them to a neighbouring day.
pub fn noon_of<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let noon = date.and_time(NaiveTime::MIN) + Duration::hours(12);
    tz.from_local_datetime(&noon)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&noon))
}

/// Half-open bounds `[midnight, next midnight)` of a local calendar day.
pub fn day_bounds<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> (DateTime<Tz>, DateTime<Tz>) {
    (start_of_day(tz, date), start_of_day(tz, date + Days::new(1)))
}

/// Midnight of the most recent day (at most 6 days back) that falls on `week_start`.
pub fn start_of_week<Tz: TimeZone>(now: &DateTime<Tz>, week_start: WeekStart) -> DateTime<Tz> {
    let date = now.date_naive();
    let weekday = date.weekday().num_days_from_sunday();
    let diff = (weekday + 7 - u32::from(week_start.index())) % 7;
    start_of_day(&now.timezone(), date - Days::new(u64::from(diff)))
}

/// Start of the period containing `now`.
pub fn period_start<Tz: TimeZone>(
    period: ResetPeriod,
    now: &DateTime<Tz>,
    week_start: WeekStart,
) -> DateTime<Tz> {
    let tz = now.timezone();
    let date = now.date_naive();
    match period {
        ResetPeriod::Never => DateTime::<Utc>::default().with_timezone(&tz),
        ResetPeriod::Daily => start_of_day(&tz, date),
        ResetPeriod::Weekly => start_of_week(now, week_start),
        ResetPeriod::Monthly => start_of_day(&tz, date.with_day(1).unwrap_or(date)),
        ResetPeriod::Yearly => start_of_day(&tz, date.with_ordinal(1).unwrap_or(date)),
    }
}

/// Whether an event belongs to the current period. There is no upper bound, `now` is one by
/// construction. Events without a readable instant only belong to [ResetPeriod::Never].
pub fn is_in_period<Tz: TimeZone>(
    instant: Option<&DateTime<Utc>>,
    period: ResetPeriod,
    now: &DateTime<Tz>,
    week_start: WeekStart,
) -> bool {
    if period == ResetPeriod::Never {
        return true;
    }
    let start = period_start(period, now, week_start).with_timezone(&Utc);
    instant.is_some_and(|instant| *instant >= start)
}
