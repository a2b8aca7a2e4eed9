//! Runtime settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tessera_core::ecs::EcsSettings;

/// Runtime configuration, read from a JSON file. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Directory assets are read from.
    pub asset_root: PathBuf,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub tick_rate_hz: u32,
    /// Stop after this many ticks. Runs until killed when unset.
    pub max_ticks: Option<u64>,
    /// Poll assets for changes every N ticks. 0 disables hot reload.
    pub reload_interval_ticks: u64,
    /// Sleep between ticks to hold the tick rate in wall-clock time.
    pub realtime: bool,
    /// Level loaded before the first tick.
    pub level: Option<String>,
    /// Blueprints to spawn one entity each from.
    pub spawn: Vec<String>,
    /// Where to write the world when the run ends.
    pub save_path: Option<PathBuf>,
    pub ecs: EcsSettings,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            log_level: "info".into(),
            tick_rate_hz: tessera_core::time::TICK_RATE_HZ,
            max_ticks: None,
            reload_interval_ticks: 30,
            realtime: true,
            level: None,
            spawn: Vec::new(),
            save_path: None,
            ecs: EcsSettings::default(),
        }
    }
}

impl RuntimeSettings {
    /// Read settings from `path`. Returns `Ok(None)` if the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading settings from {}", path.display()))
            }
        };
        let settings = Self::from_json(&text)
            .with_context(|| format!("parsing settings from {}", path.display()))?;
        Ok(Some(settings))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        // Derived struct impls also accept arrays; settings are always an object.
        let value: serde_json::Value = serde_json::from_str(text)?;
        anyhow::ensure!(value.is_object(), "settings must be a JSON object");
        let settings: Self = serde_json::from_value(value)?;
        anyhow::ensure!(settings.tick_rate_hz > 0, "tick_rate_hz must be positive");
        anyhow::ensure!(
            settings.ecs.pool_chunk_size.is_power_of_two(),
            "ecs.pool_chunk_size must be a power of two, got {}",
            settings.ecs.pool_chunk_size
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let settings = RuntimeSettings::from_json(
            r#"{ "spawn": ["crate", "barrel"], "max_ticks": 10, "ecs": { "deletion_batch": 4 } }"#,
        )
        .expect("valid settings");
        assert_eq!(settings.spawn, vec!["crate", "barrel"]);
        assert_eq!(settings.max_ticks, Some(10));
        assert_eq!(settings.tick_rate_hz, 60);
        assert_eq!(settings.ecs.deletion_batch, 4);
        assert_eq!(settings.ecs.insertion_batch, 8);
        assert_eq!(settings.asset_root, PathBuf::from("assets"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(RuntimeSettings::from_json(r#"{ "tick_rate_hz": 0 }"#).is_err());
        assert!(RuntimeSettings::from_json(r#"{ "ecs": { "pool_chunk_size": 100 } }"#).is_err());
        assert!(RuntimeSettings::from_json("[]").is_err());
        assert!(RuntimeSettings::from_json(r#"["assets", "info"]"#).is_err());
        assert!(RuntimeSettings::from_json("null").is_err());
    }

    #[test]
    fn empty_object_is_all_defaults() {
        let settings = RuntimeSettings::from_json("{}").expect("valid settings");
        assert_eq!(settings.reload_interval_ticks, 30);
        assert!(settings.realtime);
        assert!(settings.level.is_none());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = std::env::temp_dir().join("tessera-settings-does-not-exist.json");
        assert!(RuntimeSettings::load(&path).expect("no io error").is_none());
    }
}
