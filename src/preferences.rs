/// Persisted UI preferences
///
/// Playback state is never written to disk; only the handful of fields the
/// player widgets want back after a reload.
use crate::models::Backend;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const PREFERENCES_FILE: &str = "ui_preferences.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPreferences {
    /// Last committed volume (0-100)
    pub volume: u8,
    pub preferred_backend: Option<Backend>,
    pub mini_player_expanded: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            volume: 50,
            preferred_backend: None,
            mini_player_expanded: false,
        }
    }
}

/// JSON file holding [`UiPreferences`]
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store inside `data_dir` under the default file name
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(PREFERENCES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` if nothing has been saved yet
    pub async fn load(&self) -> Result<Option<UiPreferences>> {
        if !fs::try_exists(&self.path)
            .await
            .with_context(|| format!("Failed to check {:?}", self.path))?
        {
            tracing::info!("No saved UI preferences found");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let mut preferences: UiPreferences =
            serde_json::from_str(&json).context("Failed to parse UI preferences")?;
        preferences.volume = preferences.volume.min(100);

        tracing::info!("Loaded UI preferences from {:?}", self.path);
        Ok(Some(preferences))
    }

    pub async fn save(&self, preferences: &UiPreferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(preferences)
            .context("Failed to serialize UI preferences")?;
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {:?}", self.path))?;

        tracing::debug!("Saved UI preferences to {:?}", self.path);
        Ok(())
    }

    pub async fn delete(&self) -> Result<()> {
        if fs::try_exists(&self.path).await? {
            fs::remove_file(&self.path)
                .await
                .with_context(|| format!("Failed to delete {:?}", self.path))?;
            tracing::info!("Deleted UI preferences file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::in_dir(dir.path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::in_dir(&dir.path().join("nested"));
        let preferences = UiPreferences {
            volume: 35,
            preferred_backend: Some(Backend::Embedded),
            mini_player_expanded: true,
        };

        store.save(&preferences).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(preferences));

        store.delete().await.unwrap();
        assert!(!store.path().exists());
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::in_dir(dir.path());
        tokio::fs::write(store.path(), r#"{ "volume": 250 }"#)
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.volume, 100);
        assert_eq!(loaded.preferred_backend, None);
        assert!(!loaded.mini_player_expanded);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::in_dir(dir.path());
        tokio::fs::write(store.path(), "not json").await.unwrap();
        assert!(store.load().await.is_err());
    }
}
