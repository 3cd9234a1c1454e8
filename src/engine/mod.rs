//! Engine facing the front ends. Reads go straight to storage and degrade to empty data when
//! something is missing or broken. Writes are funneled through a single [writer::WriterModule],
//! so concurrent callers can't overwrite each other's changes.

pub mod aggregation;
pub mod writer;

use std::{path::Path, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use aggregation::{DayEntry, DayStatus, bucket_days, day_status, goal_ever_met, in_period, on_day, sum};
use writer::WriterHandle;

use crate::{
    period::{WeekStart, noon_of, start_of_day},
    storage::{
        adapter::{FileAdapter, LocalFileAdapter},
        entities::{EventValue, GoalType, RatchetEvent, TrackerConfig, TrackerUpdate},
        event_log::{EventLog, MonthKey, PartitionWindow},
        tracker_store::TrackerStore,
    },
    utils::clock::{Clock, DefaultClock},
};

/// Note attached to events created by editing a day's total.
pub const EDIT_NOTE: &str = "edit";
/// Note attached to "done" markers created by editing a day's total.
pub const DONE_NOTE: &str = "done";

/// Snapshot of a tracker in its current period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub tracker: TrackerConfig,
    pub count: i64,
    pub goal_met: bool,
}

/// Entry point for everything that reads or logs tracker data. Cheap to clone, all clones share
/// the same writer.
#[derive(Clone)]
pub struct TrackerEngine {
    store: TrackerStore,
    log: EventLog,
    writer: WriterHandle,
    clock: Arc<dyn Clock>,
    week_start: WeekStart,
}

impl TrackerEngine {
    /// Creates an engine over `data_folder` and starts its writer task. Has to be called from
    /// within a tokio runtime.
    pub fn new(
        adapter: Arc<dyn FileAdapter>,
        data_folder: &Path,
        week_start: WeekStart,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = TrackerStore::new(adapter.clone(), data_folder);
        let log = EventLog::new(adapter, data_folder);
        let writer = WriterHandle::spawn(store.clone(), log.clone());
        Self {
            store,
            log,
            writer,
            clock,
            week_start,
        }
    }

    /// Engine over the local file system using the system clock.
    pub fn open_local(data_folder: &Path, week_start: WeekStart) -> Self {
        Self::new(
            Arc::new(LocalFileAdapter),
            data_folder,
            week_start,
            Arc::new(DefaultClock),
        )
    }

    pub async fn get_all_trackers(&self) -> Vec<TrackerConfig> {
        self.store.list().await
    }

    pub async fn get_tracker(&self, id: &str) -> Option<TrackerConfig> {
        self.store.get(id).await
    }

    /// Stores a tracker, replacing any tracker with the same id.
    pub async fn create_tracker(&self, config: TrackerConfig) -> Result<()> {
        self.writer.create_tracker(config).await
    }

    /// Returns `false` if there is no such tracker.
    pub async fn update_tracker(&self, id: &str, update: TrackerUpdate) -> Result<bool> {
        self.writer.update_tracker(id, update).await
    }

    /// Removes the tracker definition. Its events are kept.
    pub async fn delete_tracker(&self, id: &str) -> Result<bool> {
        self.writer.delete_tracker(id).await
    }

    /// Events of the period that contains "now", oldest first.
    async fn current_period_events(&self, tracker: &TrackerConfig) -> Vec<RatchetEvent> {
        let now = self.clock.time();
        let window = PartitionWindow::for_period(tracker.reset_period, &now);
        let events = self.log.events_for(&tracker.id, &window).await;
        in_period(events, tracker.reset_period, &now, self.week_start)
    }

    /// Sum of the tracker's events in its current period. `0` for unknown trackers.
    pub async fn get_current_count(&self, id: &str) -> i64 {
        match self.get_tracker_status(id).await {
            Some(status) => status.count,
            None => 0,
        }
    }

    /// Whether the goal was reached at some point of the current period, see
    /// [aggregation::goal_ever_met]. `false` for unknown trackers.
    pub async fn get_goal_was_ever_met_this_period(&self, id: &str) -> bool {
        self.get_tracker_status(id)
            .await
            .is_some_and(|status| status.goal_met)
    }

    /// Count and goal state of the current period, computed from a single read.
    #[instrument(skip(self))]
    pub async fn get_tracker_status(&self, id: &str) -> Option<TrackerStatus> {
        let tracker = self.get_tracker(id).await?;
        let events = self.current_period_events(&tracker).await;
        let status = TrackerStatus {
            count: sum(&events),
            goal_met: goal_ever_met(&tracker, &events),
            tracker,
        };
        debug!("Current period has {} events", events.len());
        Some(status)
    }

    async fn day_events(&self, id: &str, date: NaiveDate) -> Vec<RatchetEvent> {
        let window = PartitionWindow::Months(vec![MonthKey::of_date(date)]);
        let events = self.log.events_for(id, &window).await;
        on_day(events, &Local, date)
    }

    /// Sum of the events logged during the local day `date`.
    pub async fn get_count_for_day(&self, id: &str, date: NaiveDate) -> i64 {
        sum(&self.day_events(id, date).await)
    }

    pub async fn get_goal_status_for_day(&self, id: &str, date: NaiveDate) -> DayStatus {
        let Some(tracker) = self.get_tracker(id).await else {
            return DayStatus::NoData;
        };
        let events = self.day_events(id, date).await;
        day_status(&tracker, sum(&events), events.len())
    }

    /// One row per day from `start` to `end` (inclusive), most recent first.
    #[instrument(skip(self))]
    pub async fn get_day_entries(&self, id: &str, start: NaiveDate, end: NaiveDate) -> Vec<DayEntry> {
        if start > end {
            return vec![];
        }
        let window = PartitionWindow::Months(MonthKey::range(
            MonthKey::of_date(start),
            MonthKey::of_date(end),
        ));
        let events = self.log.events_for(id, &window).await;
        bucket_days(&events, &Local, start, end)
    }

    /// Raw events with a timestamp inside `[start, end]`, oldest first.
    #[instrument(skip(self))]
    pub async fn get_history(
        &self,
        id: &str,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Vec<RatchetEvent> {
        if start > end {
            return vec![];
        }
        let events = self
            .log
            .events_for(id, &PartitionWindow::between(&start, &end))
            .await;
        let (start, end) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
        events
            .into_iter()
            .filter(|event| {
                event
                    .timestamp
                    .is_some_and(|timestamp| timestamp >= start && timestamp <= end)
            })
            .collect()
    }

    async fn log_event(
        &self,
        id: &str,
        delta: i64,
        timestamp: DateTime<Utc>,
        note: &str,
    ) -> Result<RatchetEvent> {
        let event = RatchetEvent::new(id, EventValue::from(delta), timestamp, note);
        self.writer.append(event.clone()).await?;
        Ok(event)
    }

    /// Logs `delta` now. A delta of `0` logs a "done" marker.
    pub async fn increment(&self, id: &str, delta: i64, note: &str) -> Result<RatchetEvent> {
        let now = self.clock.time().with_timezone(&Utc);
        self.log_event(id, delta, now, note).await
    }

    /// Logs `delta` against a past or future day. The event is placed at local noon of `date`.
    pub async fn increment_on_date(
        &self,
        id: &str,
        delta: i64,
        date: NaiveDate,
        note: &str,
    ) -> Result<RatchetEvent> {
        let timestamp = noon_of(&Local, date).with_timezone(&Utc);
        self.log_event(id, delta, timestamp, note).await
    }

    /// Changes the total of a day to `new_value` by logging the difference. Returns whether an
    /// event was logged.
    ///
    /// Setting an empty day to `0` on an "at most 0" tracker logs a "done" marker, so the day
    /// reads as met instead of having no data.
    #[instrument(skip(self))]
    pub async fn set_day_total(&self, id: &str, date: NaiveDate, new_value: i64) -> Result<bool> {
        if new_value < 0 {
            debug!("Ignoring negative day total");
            return Ok(false);
        }
        let events = self.day_events(id, date).await;
        let current = sum(&events);
        let tracker = self.get_tracker(id).await;
        let marks_clean_day = tracker
            .as_ref()
            .is_some_and(|t| t.goal_type == GoalType::AtMost && t.goal == 0)
            && new_value == 0
            && events.is_empty();

        if marks_clean_day {
            self.increment_on_date(id, 0, date, DONE_NOTE).await?;
            return Ok(true);
        }
        let delta = new_value.saturating_sub(current);
        if delta == 0 {
            return Ok(false);
        }
        self.increment_on_date(id, delta, date, EDIT_NOTE).await?;
        Ok(true)
    }

    /// Current "today" according to the engine clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.time().date_naive()
    }

    /// Local midnight of `date`.
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Local> {
        start_of_day(&Local, date)
    }
}
