use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::period::WeekStart;

pub const SETTINGS_FILE: &str = "settings.json";

/// User settings, read from `settings.json` in the application directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Where `config.json` and `events/` live. Relative paths are resolved against the
    /// application directory, which is also the default.
    pub data_folder: Option<PathBuf>,
    /// `0` for Sunday, `1` for Monday.
    pub first_day_of_week: u8,
    /// Buttons given to new trackers when none are specified.
    pub default_increment_buttons: Vec<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_folder: None,
            first_day_of_week: 0,
            default_increment_buttons: vec![1, 5],
        }
    }
}

impl Settings {
    /// Loads settings from `app_dir`. A missing or malformed file gives the defaults.
    pub async fn load(app_dir: &Path) -> Self {
        let path = app_dir.join(SETTINGS_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings at {path:?}, using defaults");
                return Settings::default();
            }
            Err(e) => {
                warn!("Failed to read settings at {path:?}: {e}");
                return Settings::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Settings at {path:?} are malformed, using defaults: {e}");
            Settings::default()
        })
    }

    pub fn week_start(&self) -> WeekStart {
        WeekStart::from_index(self.first_day_of_week)
    }

    pub fn resolve_data_folder(&self, app_dir: &Path) -> PathBuf {
        match &self.data_folder {
            Some(folder) => app_dir.join(folder),
            None => app_dir.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::period::WeekStart;

    use super::{SETTINGS_FILE, Settings};

    #[tokio::test]
    async fn test_missing_settings_are_default() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(Settings::load(dir.path()).await, Settings::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_settings_are_filled() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            "{\"firstDayOfWeek\": 1, \"dataFolder\": \".ratchet\"}",
        )?;
        let settings = Settings::load(dir.path()).await;
        assert_eq!(settings.week_start(), WeekStart::Monday);
        assert_eq!(settings.default_increment_buttons, vec![1, 5]);
        assert_eq!(
            settings.resolve_data_folder(dir.path()),
            dir.path().join(".ratchet")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_settings_are_default() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ firstDayOfWeek")?;
        assert_eq!(Settings::load(dir.path()).await, Settings::default());
        Ok(())
    }

    #[test]
    fn test_absolute_data_folder_wins() {
        let settings = Settings {
            data_folder: Some(PathBuf::from("/srv/ratchet")),
            ..Default::default()
        };
        assert_eq!(
            settings.resolve_data_folder(Path::new("/home/user/.local/share/ratchet")),
            PathBuf::from("/srv/ratchet")
        );
    }
}
