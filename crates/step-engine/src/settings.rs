//! Host settings storage
//!
//! Settings live as JSON in the user's config directory and remember things
//! between sessions, such as the last workflow location.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

const SETTINGS_FILE: &str = "settings.json";
const MAX_RECENT: usize = 10;

/// Persisted host settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Directory of the last workflow opened or created
    #[serde(default)]
    pub previous_location: Option<PathBuf>,
    /// Recently used workflow directories, newest first
    #[serde(default)]
    pub recent_workflows: Vec<PathBuf>,
    /// Refuse to run workflows with unsaved changes
    #[serde(default = "default_require_saved")]
    pub require_saved_before_run: bool,
}

fn default_require_saved() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            previous_location: None,
            recent_workflows: Vec::new(),
            require_saved_before_run: default_require_saved(),
        }
    }
}

impl Settings {
    /// Default settings directory, `<config dir>/stepflow`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stepflow"))
    }

    /// Load settings from `dir`, falling back to defaults if none are saved
    pub async fn load(dir: &Path) -> Result<Self, SettingsError> {
        let path = dir.join(SETTINGS_FILE);

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).await?;
        serde_json::from_str(&contents).map_err(SettingsError::Parse)
    }

    /// Save settings to `dir`, creating it if needed
    pub async fn save(&self, dir: &Path) -> Result<(), SettingsError> {
        fs::create_dir_all(dir).await?;

        let path = dir.join(SETTINGS_FILE);
        let contents = serde_json::to_string_pretty(self).map_err(SettingsError::Serialize)?;
        fs::write(&path, contents).await?;

        log::info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Record `location` as the most recent workflow
    pub fn remember(&mut self, location: &Path) {
        let location = location.to_path_buf();
        self.recent_workflows.retain(|p| p != &location);
        self.recent_workflows.insert(0, location.clone());
        self.recent_workflows.truncate(MAX_RECENT);
        self.previous_location = Some(location);
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path()).await.unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.require_saved_before_run);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("stepflow");

        let mut settings = Settings::default();
        settings.remember(Path::new("/work/one"));
        settings.require_saved_before_run = false;
        settings.save(&nested).await.unwrap();

        let loaded = Settings::load(&nested).await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(SETTINGS_FILE), "{ not json")
            .await
            .unwrap();
        assert!(matches!(
            Settings::load(dir.path()).await,
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_remember_dedups_and_caps() {
        let mut settings = Settings::default();
        for i in 0..12 {
            settings.remember(Path::new(&format!("/w/{}", i)));
        }
        settings.remember(Path::new("/w/5"));

        assert_eq!(settings.recent_workflows.len(), MAX_RECENT);
        assert_eq!(settings.recent_workflows[0], PathBuf::from("/w/5"));
        assert_eq!(
            settings.recent_workflows.iter().filter(|p| p.ends_with("5")).count(),
            1
        );
        assert_eq!(settings.previous_location, Some(PathBuf::from("/w/5")));
    }
}
