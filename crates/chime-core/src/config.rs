//! Sound configuration.
//!
//! JSON file plus environment overrides:
//!
//! | key                   | env                   | default       |
//! |-----------------------|-----------------------|---------------|
//! | `volume`              | `CHIME_VOLUME`        | `1.0`         |
//! | `looping`             | `CHIME_LOOPING`       | `false`       |
//! | `resource_root`       | `CHIME_RESOURCE_ROOT` | `.`           |
//! | `diagnostic_category` | —                     | `Media.Sound` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostics::DEFAULT_CATEGORY;
use crate::error::ConfigError;

pub const ENV_VOLUME: &str = "CHIME_VOLUME";
pub const ENV_LOOPING: &str = "CHIME_LOOPING";
pub const ENV_RESOURCE_ROOT: &str = "CHIME_RESOURCE_ROOT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Initial volume; clamped when applied.
    pub volume: f64,
    pub looping: bool,
    /// Directory `app://` locators resolve against.
    pub resource_root: PathBuf,
    pub diagnostic_category: String,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            looping: false,
            resource_root: PathBuf::from("."),
            diagnostic_category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

impl SoundConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Apply `CHIME_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (env-shaped keys).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(ENV_VOLUME) {
            self.volume = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or(ConfigError::InvalidValue {
                    key: ENV_VOLUME,
                    value: raw,
                })?;
        }
        if let Some(raw) = lookup(ENV_LOOPING) {
            self.looping = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_LOOPING,
                        value: raw,
                    })
                }
            };
        }
        if let Some(raw) = lookup(ENV_RESOURCE_ROOT) {
            if !raw.is_empty() {
                self.resource_root = PathBuf::from(raw);
            }
        }
        Ok(self)
    }
}
