use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::layout::DragDirection;

/// Persistent editor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Byte order picked for signals created by a free drag
    pub drag_direction: DragDirection,
    /// Write `<file>.tmp` snapshots after each edit
    pub auto_save: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            drag_direction: DragDirection::MsbFirst,
            auto_save: true,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dbc-bitview").join("settings.json"))
    }

    /// Load from the user config directory, falling back to defaults
    pub fn load() -> Self {
        Self::config_path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::read(path) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Ignoring unreadable settings {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("No config directory on this platform")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write settings: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.drag_direction, DragDirection::MsbFirst);
        assert!(settings.auto_save);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings { drag_direction: DragDirection::AlwaysBE, auto_save: false };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "drag_direction": "LsbFirst" }"#).unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.drag_direction, DragDirection::LsbFirst);
        assert!(settings.auto_save);
    }
}
