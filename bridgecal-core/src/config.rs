//! Agent configuration.
//!
//! Loaded from `~/.config/bridgecal/config.toml`. Window bounds and the tick
//! interval have defaults; the two adapter tables are mandatory because
//! provider wiring cannot be guessed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeCalError, BridgeCalResult};
use crate::window::{SyncWindow, DEFAULT_FUTURE_DAYS, DEFAULT_PAST_DAYS};

/// Content suppression applied to mirror payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedactionMode {
    /// Mirrors carry the source's summary, location and description.
    #[default]
    None,
    /// Mirrors carry summary "Busy" and nothing else.
    BusyOnly,
}

/// Provider wiring for one side: the provider binary name plus flattened
/// provider-specific keys passed through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub provider: String,
    #[serde(flatten)]
    pub options: HashMap<String, toml::Value>,
}

fn default_past_days() -> i64 {
    DEFAULT_PAST_DAYS
}

fn default_future_days() -> i64 {
    DEFAULT_FUTURE_DAYS
}

fn default_interval_seconds() -> u64 {
    300
}

fn default_store_path() -> PathBuf {
    PathBuf::from("~/.local/share/bridgecal/mapping.db")
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Window left edge, in days before now.
    #[serde(default = "default_past_days")]
    pub past_days: i64,

    /// Window right edge, in days after now.
    #[serde(default = "default_future_days")]
    pub future_days: i64,

    /// Tick period in loop mode.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    #[serde(default)]
    pub redaction_mode: RedactionMode,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    pub outlook: AdapterConfig,
    pub google: AdapterConfig,
}

impl BridgeConfig {
    pub fn config_path() -> BridgeCalResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| BridgeCalError::Config("Could not determine config directory".into()))?
            .join("bridgecal");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location.
    pub fn load() -> BridgeCalResult<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Err(BridgeCalError::Config(format!(
                "Config file not found: {}\n\n\
                 Create it with [outlook] and [google] tables, each naming a provider:\n  \
                 [outlook]\n  provider = \"outlook\"\n\n  \
                 [google]\n  provider = \"google\"",
                path.display()
            )));
        }

        Self::load_from(&path)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> BridgeCalResult<Self> {
        let config: BridgeConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()))
            .build()
            .map_err(|e| BridgeCalError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| BridgeCalError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BridgeCalResult<()> {
        if self.past_days < 0 || self.future_days < 0 {
            return Err(BridgeCalError::Config(
                "past_days and future_days must be non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn window(&self) -> SyncWindow {
        SyncWindow {
            past_days: self.past_days,
            future_days: self.future_days,
        }
    }

    /// Mapping store path with `~` expanded.
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.store_path.to_string_lossy()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_omitted() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [outlook]
            provider = "outlook"

            [google]
            provider = "google"
            google_calendar_id = "primary"
            "#,
        )
        .unwrap();

        assert_eq!(config.past_days, 30);
        assert_eq!(config.future_days, 180);
        assert_eq!(config.interval_seconds, 300);
        assert_eq!(config.redaction_mode, RedactionMode::None);
        assert_eq!(
            config.google.options.get("google_calendar_id"),
            Some(&toml::Value::String("primary".to_string()))
        );
    }

    #[test]
    fn redaction_mode_uses_kebab_case() {
        let config: BridgeConfig = toml::from_str(
            r#"
            redaction_mode = "busy-only"

            [outlook]
            provider = "outlook"

            [google]
            provider = "google"
            "#,
        )
        .unwrap();

        assert_eq!(config.redaction_mode, RedactionMode::BusyOnly);
    }

    #[test]
    fn negative_window_is_rejected() {
        let config: BridgeConfig = toml::from_str(
            r#"
            past_days = -1

            [outlook]
            provider = "outlook"

            [google]
            provider = "google"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }
}
