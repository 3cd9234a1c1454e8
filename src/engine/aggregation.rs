//! Reductions over a tracker's event stream. Nothing here touches storage: callers load the
//! events (sorted by timestamp) and these functions turn them into counts and goal states.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::{
    period::{ResetPeriod, WeekStart, day_bounds, is_in_period},
    storage::entities::{GoalType, RatchetEvent, TrackerConfig},
};

/// Goal state of a single day. [DayStatus::NoData] separates "nothing logged" from "logged and
/// failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Met,
    NotMet,
    NoData,
}

/// One row of a day-by-day history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEntry {
    pub date: NaiveDate,
    pub count: i64,
    pub event_count: usize,
    /// Some event of the day is a "done" marker.
    pub has_done_marker: bool,
}

impl DayEntry {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            count: 0,
            event_count: 0,
            has_done_marker: false,
        }
    }

    pub fn status(&self, tracker: &TrackerConfig) -> DayStatus {
        day_status(tracker, self.count, self.event_count)
    }
}

/// Saturates instead of overflowing on hand-edited values.
pub fn sum(events: &[RatchetEvent]) -> i64 {
    events
        .iter()
        .fold(0i64, |total, event| total.saturating_add(event.value.amount()))
}

/// Keeps the events that belong to the period containing `now`.
pub fn in_period<Tz: TimeZone>(
    events: Vec<RatchetEvent>,
    period: ResetPeriod,
    now: &DateTime<Tz>,
    week_start: WeekStart,
) -> Vec<RatchetEvent> {
    events
        .into_iter()
        .filter(|event| is_in_period(event.timestamp.as_ref(), period, now, week_start))
        .collect()
}

/// Whether the goal counts as met for a period, given its events in ascending order.
///
/// For "at least" goals the running sum only has to reach the goal once: logging and then
/// undoing back to zero still counts as met. A goal of zero or less is always met. "At most"
/// goals only look at the final sum.
pub fn goal_ever_met(tracker: &TrackerConfig, period_events: &[RatchetEvent]) -> bool {
    match tracker.goal_type {
        GoalType::NoGoal => false,
        GoalType::AtMost => sum(period_events) <= tracker.goal,
        GoalType::AtLeast if tracker.goal <= 0 => true,
        GoalType::AtLeast => period_events
            .iter()
            .scan(0i64, |running, event| {
                *running = running.saturating_add(event.value.amount());
                Some(*running)
            })
            .any(|running| running >= tracker.goal),
    }
}

/// Events that happened during the local calendar day `date`.
pub fn on_day<Tz: TimeZone>(
    events: Vec<RatchetEvent>,
    tz: &Tz,
    date: NaiveDate,
) -> Vec<RatchetEvent> {
    let (start, end) = day_bounds(tz, date);
    let (start, end) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
    events
        .into_iter()
        .filter(|event| {
            event
                .timestamp
                .is_some_and(|timestamp| timestamp >= start && timestamp < end)
        })
        .collect()
}

pub fn day_status(tracker: &TrackerConfig, count: i64, event_count: usize) -> DayStatus {
    if tracker.goal_type == GoalType::NoGoal || event_count == 0 {
        return DayStatus::NoData;
    }
    if tracker.is_goal_met(count) {
        DayStatus::Met
    } else {
        DayStatus::NotMet
    }
}

/// Groups events into one row per local day from `start` to `end` (inclusive), most recent day
/// first. Days without events still get a row.
pub fn bucket_days<Tz: TimeZone>(
    events: &[RatchetEvent],
    tz: &Tz,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DayEntry> {
    let mut days = start
        .iter_days()
        .take_while(|date| *date <= end)
        .map(|date| (date, DayEntry::empty(date)))
        .collect::<BTreeMap<_, _>>();

    for event in events {
        let Some(timestamp) = event.timestamp else {
            continue;
        };
        let date = timestamp.with_timezone(tz).date_naive();
        if let Some(entry) = days.get_mut(&date) {
            entry.count = entry.count.saturating_add(event.value.amount());
            entry.event_count += 1;
            entry.has_done_marker |= event.value.is_marker();
        }
    }

    days.into_values().rev().collect()
}
