use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Status given to newly created events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Publish,
    Draft,
}

/// How often the scheduler triggers an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Hourly,
    TwiceDaily,
    Daily,
}

impl Schedule {
    pub fn interval(self) -> Duration {
        match self {
            Schedule::Hourly => Duration::from_secs(60 * 60),
            Schedule::TwiceDaily => Duration::from_secs(12 * 60 * 60),
            Schedule::Daily => Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub feed_url: String,
    /// Hours added to the start when an item carries no end date.
    #[serde(rename = "duration")]
    pub duration_hours: u32,
    pub default_status: PostStatus,
    pub update_existing: bool,
    pub schedule: Schedule,
    pub timezone: Tz,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            feed_url: String::new(),
            duration_hours: 2,
            default_status: PostStatus::Publish,
            update_existing: true,
            schedule: Schedule::Hourly,
            timezone: Tz::UTC,
            request_timeout_seconds: 30,
            user_agent: format!("event-feed/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ImportSettings {
    /// Default location: `<config dir>/event-feed/settings.json`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("event-feed").join("settings.json"))
    }

    /// Loads settings from `path`. A missing or empty file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Loads from the default location, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = match Self::default_path() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "using default settings");
                return Self::default();
            }
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load settings, using defaults");
                Self::default()
            }
        }
    }

    /// Writes the settings as pretty JSON through a temp file and rename.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn set_timezone(&mut self, name: &str) -> Result<(), ConfigError> {
        self.timezone = name
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(name.to_owned()))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
