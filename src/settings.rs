use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// Close the session automatically once both transfer legs finish.
    pub auto_close: bool,
    /// Scheduled wakeup, minutes after midnight. `None` = disabled.
    pub wakeup_time: Option<u16>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            auto_close: false,
            wakeup_time: None,
        }
    }
}

/// Persisted configuration, written immediately on every change.
/// A missing or corrupt file degrades to defaults rather than failing.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ExportSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            ExportSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> ExportSettings {
        self.data.read().unwrap().clone()
    }

    pub fn set_auto_close(&self, auto_close: bool) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.auto_close = auto_close;
        self.persist(&guard)
    }

    pub fn set_wakeup_time(&self, wakeup_time: Option<u16>) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.wakeup_time = wakeup_time;
        self.persist(&guard)
    }

    fn persist(&self, data: &ExportSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.get(), ExportSettings::default());
    }

    #[test]
    fn changes_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        store.set_auto_close(true).unwrap();
        store.set_wakeup_time(Some(7 * 60 + 30)).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(
            reopened.get(),
            ExportSettings {
                auto_close: true,
                wakeup_time: Some(450),
            }
        );
    }

    #[test]
    fn corrupt_file_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.get(), ExportSettings::default());
    }
}
