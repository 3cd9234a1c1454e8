use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use futures::{StreamExt, stream};
use tracing::{debug, instrument, warn};

use crate::period::ResetPeriod;

use super::{
    adapter::FileAdapter,
    codec::{decode_events, encode_event},
    entities::RatchetEvent,
    is_not_found,
};

pub const EVENTS_DIR: &str = "events";
const PARTITION_EXTENSION: &str = "jsonl";

/// How many partitions are read at the same time.
const PARALLEL_READS: usize = 4;

/// Key of a partition: one local calendar month, written as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Month of the wall-clock date of `instant` in its own timezone.
    pub fn of<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        Self::of_date(instant.date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn previous(self) -> Self {
        match self.month {
            1 => Self {
                year: self.year - 1,
                month: 12,
            },
            month => Self {
                month: month - 1,
                ..self
            },
        }
    }

    pub fn next(self) -> Self {
        match self.month {
            12 => Self {
                year: self.year + 1,
                month: 1,
            },
            month => Self {
                month: month + 1,
                ..self
            },
        }
    }

    /// All months from `start` to `end`, both inclusive.
    pub fn range(start: MonthKey, end: MonthKey) -> Vec<MonthKey> {
        let mut keys = vec![];
        let mut current = start;
        while current <= end {
            keys.push(current);
            current = current.next();
        }
        keys
    }

    pub fn file_name(&self) -> String {
        format!("{self}.{PARTITION_EXTENSION}")
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        name.strip_suffix(PARTITION_EXTENSION)?
            .strip_suffix('.')?
            .parse()
            .ok()
    }
}

impl Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| anyhow!("Month key {s} should look like YYYY-MM"))?;
        if year.len() != 4 || month.len() != 2 {
            bail!("Month key {s} should look like YYYY-MM");
        }
        MonthKey::new(year.parse()?, month.parse()?)
            .ok_or_else(|| anyhow!("Month key {s} has an invalid month"))
    }
}

/// Set of partitions a query has to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionWindow {
    /// Every partition that exists on disk.
    All,
    Months(Vec<MonthKey>),
}

impl PartitionWindow {
    /// Partitions that may contain events of the period that contains `now`. Daily and weekly
    /// periods can start in the previous month, yearly ones need the whole year.
    pub fn for_period<Tz: TimeZone>(period: ResetPeriod, now: &DateTime<Tz>) -> Self {
        let current = MonthKey::of(now);
        match period {
            ResetPeriod::Never => PartitionWindow::All,
            ResetPeriod::Daily | ResetPeriod::Weekly => {
                PartitionWindow::Months(vec![current.previous(), current])
            }
            ResetPeriod::Monthly => PartitionWindow::Months(vec![current]),
            ResetPeriod::Yearly => PartitionWindow::Months(
                (1..=12)
                    .filter_map(|month| MonthKey::new(current.year(), month))
                    .collect(),
            ),
        }
    }

    /// Partitions covering `start..=end`.
    pub fn between<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> Self {
        PartitionWindow::Months(MonthKey::range(MonthKey::of(start), MonthKey::of(end)))
    }
}

/// Append-only event log with one file per local calendar month. Events of all trackers are
/// interleaved, and a single file is not necessarily sorted.
#[derive(Clone)]
pub struct EventLog {
    adapter: Arc<dyn FileAdapter>,
    events_dir: PathBuf,
}

impl EventLog {
    pub fn new(adapter: Arc<dyn FileAdapter>, data_folder: &Path) -> Self {
        Self {
            adapter,
            events_dir: data_folder.join(EVENTS_DIR),
        }
    }

    pub fn partition_path(&self, key: MonthKey) -> PathBuf {
        self.events_dir.join(key.file_name())
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        if !self.adapter.exists(&self.events_dir).await? {
            self.adapter.mkdir(&self.events_dir).await?;
        }
        Ok(())
    }

    /// Appends an event to the partition of its local month. The file is read in full, extended
    /// and written back. A missing partition is created.
    #[instrument(skip_all, fields(tracker = %event.tracker))]
    pub async fn append(&self, event: &RatchetEvent) -> Result<()> {
        let Some(timestamp) = event.timestamp else {
            bail!("Event {} for {} has no timestamp", event.id, event.tracker);
        };
        let key = MonthKey::of(&timestamp.with_timezone(&Local));
        self.ensure_dir().await?;

        let path = self.partition_path(key);
        let mut content = match self.adapter.read(&path).await {
            Ok(content) => content,
            Err(e) if is_not_found(&e) => String::new(),
            Err(e) => return Err(e.context(format!("Failed to read partition {key}"))),
        };
        // A torn last line must not swallow the new event.
        if !content.is_empty() && !content.ends_with('\n') {
            warn!("Partition {key} doesn't end with a line break");
            content.push('\n');
        }
        content += &encode_event(event)?;

        self.adapter
            .write(&path, &content)
            .await
            .with_context(|| format!("Failed to write partition {key}"))?;
        debug!("Appended event {} to {key}", event.id);
        Ok(())
    }

    /// Reads all events of a partition. Missing or unreadable partitions are empty.
    pub async fn read_partition(&self, key: MonthKey) -> Vec<RatchetEvent> {
        let path = self.partition_path(key);
        match self.adapter.read(&path).await {
            Ok(content) => {
                let events = decode_events(&content).collect::<Vec<_>>();
                debug!("Read {} events from partition {key}", events.len());
                events
            }
            Err(e) if is_not_found(&e) => {
                debug!("Partition {key} doesn't exist");
                vec![]
            }
            Err(e) => {
                warn!("Failed to read partition {key}: {e:?}");
                vec![]
            }
        }
    }

    /// Every partition present on disk, oldest first.
    pub async fn partitions(&self) -> Vec<MonthKey> {
        let files = match self.adapter.list(&self.events_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list partitions in {:?}: {e:?}", self.events_dir);
                return vec![];
            }
        };
        let mut keys = files
            .iter()
            .filter_map(|name| MonthKey::from_file_name(name))
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Events of `tracker` from every partition of `window`, sorted by timestamp. Partitions are
    /// read in no particular order and merged afterwards.
    pub async fn events_for(&self, tracker: &str, window: &PartitionWindow) -> Vec<RatchetEvent> {
        let mut keys = match window {
            PartitionWindow::All => self.partitions().await,
            PartitionWindow::Months(keys) => keys.clone(),
        };
        keys.sort();
        keys.dedup();

        let partitions = stream::iter(keys)
            .map(|key| self.read_partition(key))
            .buffer_unordered(PARALLEL_READS)
            .collect::<Vec<_>>()
            .await;

        let mut events = partitions
            .into_iter()
            .flatten()
            .filter(|event| event.tracker == tracker)
            .collect::<Vec<_>>();
        events.sort_by_key(|event| event.timestamp);
        events
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use anyhow::{Result, anyhow};
    use chrono::{DateTime, Duration, FixedOffset, Local, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        period::ResetPeriod,
        storage::{
            adapter::{FileAdapter, LocalFileAdapter, MockFileAdapter},
            codec::encode_event,
            entities::{EventValue, RatchetEvent},
        },
        utils::logging::TEST_LOGGING,
    };

    use super::{EventLog, MonthKey, PartitionWindow};

    fn key(year: i32, month: u32) -> MonthKey {
        MonthKey::new(year, month).unwrap()
    }

    fn local_noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event(tracker: &str, value: i64, timestamp: DateTime<Utc>) -> RatchetEvent {
        RatchetEvent::new(tracker, EventValue::from(value), timestamp, "")
    }

    #[test]
    fn test_month_key_arithmetic() {
        assert_eq!(key(2024, 1).previous(), key(2023, 12));
        assert_eq!(key(2023, 12).next(), key(2024, 1));
        assert_eq!(key(2024, 3).to_string(), "2024-03");
        assert_eq!(key(2024, 3).file_name(), "2024-03.jsonl");
        assert_eq!(
            MonthKey::range(key(2023, 11), key(2024, 2)),
            vec![key(2023, 11), key(2023, 12), key(2024, 1), key(2024, 2)]
        );
        assert!(MonthKey::range(key(2024, 2), key(2024, 1)).is_empty());
        assert_eq!(MonthKey::new(2024, 13), None);
    }

    #[test]
    fn test_month_key_parsing() {
        assert_eq!("2024-03".parse::<MonthKey>().unwrap(), key(2024, 3));
        assert!("2024-3".parse::<MonthKey>().is_err());
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("notes".parse::<MonthKey>().is_err());
        assert_eq!(MonthKey::from_file_name("2024-03.jsonl"), Some(key(2024, 3)));
        assert_eq!(MonthKey::from_file_name("2024-03.json"), None);
        assert_eq!(MonthKey::from_file_name("backup.jsonl"), None);
    }

    #[test]
    fn test_month_key_uses_wall_clock_month() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        // Still February in UTC, already March locally.
        let instant = Utc.with_ymd_and_hms(2024, 2, 29, 22, 0, 0).unwrap();
        assert_eq!(MonthKey::of(&instant), key(2024, 2));
        assert_eq!(MonthKey::of(&instant.with_timezone(&tz)), key(2024, 3));
    }

    #[test]
    fn test_window_for_period() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        assert_eq!(
            PartitionWindow::for_period(ResetPeriod::Weekly, &now),
            PartitionWindow::Months(vec![key(2023, 12), key(2024, 1)])
        );
        assert_eq!(
            PartitionWindow::for_period(ResetPeriod::Daily, &now),
            PartitionWindow::Months(vec![key(2023, 12), key(2024, 1)])
        );
        assert_eq!(
            PartitionWindow::for_period(ResetPeriod::Monthly, &now),
            PartitionWindow::Months(vec![key(2024, 1)])
        );
        assert_eq!(
            PartitionWindow::for_period(ResetPeriod::Never, &now),
            PartitionWindow::All
        );
        let PartitionWindow::Months(year) = PartitionWindow::for_period(ResetPeriod::Yearly, &now)
        else {
            panic!("yearly window should list months");
        };
        assert_eq!(year.len(), 12);
        assert_eq!(year[0], key(2024, 1));
        assert_eq!(year[11], key(2024, 12));
    }

    #[tokio::test]
    async fn test_append_creates_partition_per_local_month() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let log = EventLog::new(Arc::new(LocalFileAdapter), dir.path());

        log.append(&event("coffee", 1, local_noon(2024, 1, 31))).await?;
        log.append(&event("tea", 2, local_noon(2024, 2, 1))).await?;
        log.append(&event("coffee", 3, local_noon(2024, 2, 2))).await?;

        assert_eq!(log.partitions().await, vec![key(2024, 1), key(2024, 2)]);
        assert_eq!(log.read_partition(key(2024, 2)).await.len(), 2);

        let coffee = log
            .events_for("coffee", &PartitionWindow::Months(vec![key(2024, 1), key(2024, 2)]))
            .await;
        assert_eq!(
            coffee.iter().map(|e| e.value.amount()).collect::<Vec<_>>(),
            vec![1, 3]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_events_are_sorted_across_unsorted_partitions() -> Result<()> {
        let dir = tempdir()?;
        let adapter = LocalFileAdapter;
        let log = EventLog::new(Arc::new(LocalFileAdapter), dir.path());
        log.ensure_dir().await?;

        let late = event("coffee", 2, local_noon(2024, 3, 20));
        let early = event("coffee", 1, local_noon(2024, 3, 2));
        let previous_month = event("coffee", 5, local_noon(2024, 2, 10));
        let other = event("tea", 9, local_noon(2024, 3, 1));
        let march = [&late, &other, &early]
            .into_iter()
            .map(encode_event)
            .collect::<Result<String>>()?;
        adapter
            .write(&log.partition_path(key(2024, 3)), &march)
            .await?;
        adapter
            .write(&log.partition_path(key(2024, 2)), &encode_event(&previous_month)?)
            .await?;

        let events = log.events_for("coffee", &PartitionWindow::All).await;
        assert_eq!(events, vec![previous_month, early, late]);
        Ok(())
    }

    #[tokio::test]
    async fn test_append_repairs_torn_last_line() -> Result<()> {
        let dir = tempdir()?;
        let log = EventLog::new(Arc::new(LocalFileAdapter), dir.path());
        log.ensure_dir().await?;
        let path = log.partition_path(key(2024, 3));
        LocalFileAdapter
            .write(&path, "{\"tracker\":\"coffee\",\"val")
            .await?;

        log.append(&event("coffee", 4, local_noon(2024, 3, 5))).await?;

        let events = log.read_partition(key(2024, 3)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value, EventValue::Delta(4));
        Ok(())
    }

    #[tokio::test]
    async fn test_partition_torn_inside_emoji_keeps_other_lines() -> Result<()> {
        let dir = tempdir()?;
        let log = EventLog::new(Arc::new(LocalFileAdapter), dir.path());
        log.ensure_dir().await?;
        let path = log.partition_path(key(2024, 3));
        let mut content = encode_event(&event("coffee", 2, local_noon(2024, 3, 4)))?.into_bytes();
        content.extend_from_slice(b"{\"tracker\":\"coffee\",\"value\":1,\"note\":\"\xF0\x9F");
        std::fs::write(&path, content)?;

        let window = PartitionWindow::Months(vec![key(2024, 3)]);
        assert_eq!(log.events_for("coffee", &window).await.len(), 1);

        log.append(&event("coffee", 3, local_noon(2024, 3, 5))).await?;
        let events = log.events_for("coffee", &window).await;
        assert_eq!(
            events.iter().map(|e| e.value.amount()).collect::<Vec<_>>(),
            vec![2, 3]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_partition_is_empty() {
        let mut adapter = MockFileAdapter::new();
        adapter
            .expect_read()
            .returning(|_| Err(anyhow!("device not ready")));
        let log = EventLog::new(Arc::new(adapter), Path::new("data"));

        assert!(log.read_partition(key(2024, 3)).await.is_empty());
    }

    #[tokio::test]
    async fn test_append_propagates_write_failure() {
        let mut adapter = MockFileAdapter::new();
        adapter.expect_exists().returning(|_| Ok(true));
        adapter.expect_read().returning(|_| Ok(String::new()));
        adapter
            .expect_write()
            .returning(|_, _| Err(anyhow!("disk full")));
        let log = EventLog::new(Arc::new(adapter), Path::new("data"));

        let result = log
            .append(&event("coffee", 1, Utc::now() - Duration::hours(1)))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_append_refuses_to_overwrite_unreadable_partition() {
        let mut adapter = MockFileAdapter::new();
        adapter.expect_exists().returning(|_| Ok(true));
        adapter
            .expect_read()
            .returning(|_| Err(anyhow!("permission denied")));
        adapter.expect_write().never();
        let log = EventLog::new(Arc::new(adapter), Path::new("data"));

        assert!(log.append(&event("coffee", 1, Utc::now())).await.is_err());
    }
}
