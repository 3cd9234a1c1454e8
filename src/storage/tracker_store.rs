use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, ser::PrettyFormatter};
use tracing::{debug, instrument, warn};

use super::{
    adapter::FileAdapter,
    entities::{CONFIG_VERSION, ConfigFile, TrackerConfig, TrackerUpdate},
    is_not_found,
};

pub const CONFIG_FILE: &str = "config.json";

/// Tracker definitions kept in a single json document. Every mutation reads the document,
/// changes it and writes the whole document back.
#[derive(Clone)]
pub struct TrackerStore {
    adapter: Arc<dyn FileAdapter>,
    data_folder: PathBuf,
}

impl TrackerStore {
    pub fn new(adapter: Arc<dyn FileAdapter>, data_folder: &Path) -> Self {
        Self {
            adapter,
            data_folder: data_folder.to_path_buf(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_folder.join(CONFIG_FILE)
    }

    /// Reads the document. A missing or corrupt document is an empty store.
    pub async fn read_config(&self) -> ConfigFile {
        let path = self.config_path();
        match self.adapter.read(&path).await {
            Ok(raw) => parse_config(&raw),
            Err(e) if is_not_found(&e) => {
                debug!("No config at {path:?}");
                ConfigFile::default()
            }
            Err(e) => {
                warn!("Failed to read config at {path:?}: {e:?}");
                ConfigFile::default()
            }
        }
    }

    async fn write_config(&self, config: &ConfigFile) -> Result<()> {
        if !self.adapter.exists(&self.data_folder).await? {
            self.adapter.mkdir(&self.data_folder).await?;
        }
        let content = to_pretty_json(config)?;
        self.adapter
            .write(&self.config_path(), &content)
            .await
            .context("Failed to write tracker config")
    }

    /// All trackers, oldest first.
    pub async fn list(&self) -> Vec<TrackerConfig> {
        let mut trackers = self
            .read_config()
            .await
            .trackers
            .into_values()
            .collect::<Vec<_>>();
        trackers.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        trackers
    }

    pub async fn get(&self, id: &str) -> Option<TrackerConfig> {
        self.read_config().await.trackers.remove(id)
    }

    /// Stores a tracker. An existing tracker with the same id is replaced.
    #[instrument(skip_all, fields(id = %config.id))]
    pub async fn create(&self, config: TrackerConfig) -> Result<()> {
        let mut data = self.read_config().await;
        if data.trackers.contains_key(&config.id) || data.unreadable.remove(&config.id).is_some() {
            warn!("Replacing existing tracker");
        }
        data.trackers.insert(config.id.clone(), config.normalized());
        self.write_config(&data).await
    }

    /// Merges `update` into an existing tracker. Returns `false` without touching the document
    /// if there is no such tracker.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: &str, update: TrackerUpdate) -> Result<bool> {
        let mut data = self.read_config().await;
        let Some(existing) = data.trackers.get_mut(id) else {
            debug!("Nothing to update");
            return Ok(false);
        };
        update.apply(existing);
        self.write_config(&data).await?;
        Ok(true)
    }

    /// Removes a tracker. Its events stay in the log.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut data = self.read_config().await;
        let removed = data.trackers.remove(id).is_some() | data.unreadable.remove(id).is_some();
        if !removed {
            debug!("Nothing to delete");
            return Ok(false);
        }
        self.write_config(&data).await?;
        Ok(true)
    }
}

/// Document as written, with unreadable entries put back next to the trackers.
#[derive(Serialize)]
struct ConfigDocument<'a> {
    version: &'a str,
    trackers: BTreeMap<&'a str, ConfigEntry<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ConfigEntry<'a> {
    Tracker(&'a TrackerConfig),
    Unreadable(&'a Value),
}

/// Pretty printed with tabs.
fn to_pretty_json(config: &ConfigFile) -> Result<String> {
    let mut trackers = config
        .unreadable
        .iter()
        .map(|(id, raw)| (id.as_str(), ConfigEntry::Unreadable(raw)))
        .collect::<BTreeMap<_, _>>();
    trackers.extend(
        config
            .trackers
            .iter()
            .map(|(id, tracker)| (id.as_str(), ConfigEntry::Tracker(tracker))),
    );
    let document = ConfigDocument {
        version: &config.version,
        trackers,
    };

    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"\t"));
    document.serialize(&mut serializer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Parses the document entry by entry, so one broken tracker doesn't hide the others.
fn parse_config(raw: &str) -> ConfigFile {
    let document = match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Config is not valid json, treating it as empty: {e}");
            return ConfigFile::default();
        }
    };
    let Some(trackers) = document.get("trackers").and_then(Value::as_object) else {
        warn!("Config has no trackers object, treating it as empty");
        return ConfigFile::default();
    };

    let mut config = ConfigFile {
        version: document
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(CONFIG_VERSION)
            .to_string(),
        ..Default::default()
    };
    for (id, value) in trackers {
        match serde_json::from_value::<TrackerConfig>(value.clone()) {
            Ok(mut tracker) => {
                if tracker.id.is_empty() {
                    tracker.id = id.clone();
                }
                config.trackers.insert(id.clone(), tracker);
            }
            Err(e) => {
                warn!("Skipping tracker {id} that can't be read, it is kept as is: {e}");
                config.unreadable.insert(id.clone(), value.clone());
            }
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use anyhow::{Result, anyhow};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        period::ResetPeriod,
        storage::{
            adapter::{FileAdapter, LocalFileAdapter, MockFileAdapter},
            entities::{GoalType, TrackerConfig, TrackerUpdate},
        },
        utils::logging::TEST_LOGGING,
    };

    use super::TrackerStore;

    fn coffee() -> TrackerConfig {
        TrackerConfig::new("Coffee", Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap())
            .with_goal(GoalType::AtLeast, 3)
    }

    #[tokio::test]
    async fn test_missing_document_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = TrackerStore::new(Arc::new(LocalFileAdapter), &dir.path().join("data"));
        assert!(store.list().await.is_empty());
        assert_eq!(store.get("coffee").await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_crud() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = TrackerStore::new(Arc::new(LocalFileAdapter), &dir.path().join("data"));

        store.create(coffee()).await?;
        let tea = TrackerConfig::new("Tea", coffee().created + Duration::hours(1))
            .with_reset_period(ResetPeriod::Weekly);
        store.create(tea.clone()).await?;

        assert_eq!(store.get("coffee").await, Some(coffee()));
        assert_eq!(
            store.list().await.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["coffee", "tea"]
        );

        let updated = store
            .update(
                "coffee",
                TrackerUpdate {
                    goal: Some(4),
                    unit: Some("cups".into()),
                    ..Default::default()
                },
            )
            .await?;
        assert!(updated);
        let stored = store.get("coffee").await.unwrap();
        assert_eq!(stored.goal, 4);
        assert_eq!(stored.unit, "cups");
        assert_eq!(stored.name, "Coffee");

        assert!(store.delete("coffee").await?);
        assert_eq!(store.get("coffee").await, None);
        assert_eq!(store.list().await, vec![tea]);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_overwrites_colliding_id() -> Result<()> {
        let dir = tempdir()?;
        let store = TrackerStore::new(Arc::new(LocalFileAdapter), dir.path());
        store.create(coffee()).await?;
        store
            .create(coffee().with_goal(GoalType::AtMost, 1))
            .await?;

        let trackers = store.list().await;
        assert_eq!(trackers.len(), 1);
        assert_eq!(trackers[0].goal_type, GoalType::AtMost);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_id_is_noop() -> Result<()> {
        let dir = tempdir()?;
        let store = TrackerStore::new(Arc::new(LocalFileAdapter), dir.path());
        store.create(coffee()).await?;
        let before = LocalFileAdapter.read(&store.config_path()).await?;

        let update = TrackerUpdate {
            name: Some("Ghost".into()),
            ..Default::default()
        };
        assert!(!store.update("missing-id", update).await?);
        assert!(!store.delete("missing-id").await?);

        let after = LocalFileAdapter.read(&store.config_path()).await?;
        assert_eq!(before, after);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_document_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = TrackerStore::new(Arc::new(LocalFileAdapter), dir.path());
        LocalFileAdapter
            .write(&store.config_path(), "{\"version\": \"1.0.0\", \"trackers\": ")
            .await?;
        assert!(store.list().await.is_empty());

        LocalFileAdapter
            .write(&store.config_path(), "{\"version\": \"1.0.0\", \"trackers\": []}")
            .await?;
        assert!(store.list().await.is_empty());

        // Recovers on the next write.
        store.create(coffee()).await?;
        assert_eq!(store.list().await, vec![coffee()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_broken_entry_does_not_hide_others() -> Result<()> {
        let dir = tempdir()?;
        let store = TrackerStore::new(Arc::new(LocalFileAdapter), dir.path());
        let document = serde_json::json!({
            "version": "1.0.0",
            "trackers": {
                "coffee": serde_json::to_value(coffee())?,
                "broken": { "resetPeriod": "hourly" },
                "sparse": { "name": "Sparse" },
                "pushups": { "name": "Pushups", "created": "2024-01-01" },
            }
        });
        LocalFileAdapter
            .write(&store.config_path(), &document.to_string())
            .await?;

        let trackers = store.list().await;
        assert_eq!(trackers.len(), 2);
        let sparse = store.get("sparse").await.unwrap();
        assert_eq!(sparse.id, "sparse");
        assert_eq!(sparse.increment_buttons, vec![1]);
        assert_eq!(sparse.goal_type, GoalType::AtLeast);

        // Rewriting the document keeps the entries it couldn't read.
        store
            .create(TrackerConfig::new("Tea", coffee().created))
            .await?;
        let raw = LocalFileAdapter.read(&store.config_path()).await?;
        let written: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(
            written["trackers"]["pushups"],
            document["trackers"]["pushups"]
        );
        assert_eq!(written["trackers"]["broken"], document["trackers"]["broken"]);
        assert_eq!(store.list().await.len(), 3);

        assert!(store.delete("broken").await?);
        let raw = LocalFileAdapter.read(&store.config_path()).await?;
        let written: serde_json::Value = serde_json::from_str(&raw)?;
        assert!(written["trackers"].get("broken").is_none());
        assert!(written["trackers"].get("pushups").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_document_is_pretty_printed() -> Result<()> {
        let dir = tempdir()?;
        let store = TrackerStore::new(Arc::new(LocalFileAdapter), dir.path());
        store.create(coffee()).await?;

        let raw = LocalFileAdapter.read(&store.config_path()).await?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["trackers"]["coffee"]["goalType"], "at least");
        assert!(raw.contains("\n\t\"trackers\""));
        Ok(())
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let mut adapter = MockFileAdapter::new();
        adapter
            .expect_read()
            .returning(|_| Err(anyhow!("missing")));
        adapter.expect_exists().returning(|_| Ok(true));
        adapter
            .expect_write()
            .returning(|_, _| Err(anyhow!("read-only file system")));
        let store = TrackerStore::new(Arc::new(adapter), Path::new("data"));

        assert!(store.create(coffee()).await.is_err());
    }
}
