//! Configuration for reel
//!
//! Stored as config.toml next to the snapshot files

use crate::card::{SchedulingStatus, StageId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

const APP_DIR: &str = "reel";

/// reel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Card ID prefix (e.g., "card", "vid")
    pub id_prefix: String,

    /// Status a card falls back to when its date is cleared
    pub unschedule_to: SchedulingStatus,

    /// Stage that repurposed cards land in
    pub repurpose_stage: StageId,

    /// Search settings
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_prefix: "card".to_string(),
            unschedule_to: SchedulingStatus::ToSchedule,
            repurpose_stage: StageId::ShapeIdeas,
            search: SearchConfig::default(),
        }
    }
}

/// Archive search configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Cap on returned results (unlimited if not set)
    pub max_results: Option<usize>,
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.id_prefix.trim().is_empty() {
            return Err(crate::Error::Config("id_prefix must not be empty".to_string()));
        }
        if self.unschedule_to == SchedulingStatus::Scheduled {
            return Err(crate::Error::Config(
                "unschedule_to must be \"to-schedule\" or \"none\"".to_string(),
            ));
        }
        if self.search.max_results == Some(0) {
            return Err(crate::Error::Config(
                "search.max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Default data directory (e.g. ~/.local/share/reel)
    pub fn default_data_dir() -> crate::Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| {
                crate::Error::StorageUnavailable("Could not determine data directory".into())
            })
    }

    /// Generate a default config file with comments
    pub fn default_with_comments() -> String {
        r#"# reel configuration

# Card ID prefix (e.g., "card", "vid")
id_prefix = "card"

# Status a card falls back to when its date is cleared ("to-schedule" or "none")
unschedule_to = "to-schedule"

# Stage that repurposed archive cards land in
# (ideate, shape-ideas, to-film, to-edit, to-schedule, posted)
repurpose_stage = "shape-ideas"

[search]
# Cap on archive search results (unlimited if not set)
# max_results = 50
"#
        .to_string()
    }
}
