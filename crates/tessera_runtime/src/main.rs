//! Tessera runtime
//!
//! Boots a world from a settings file, spawns blueprints, and runs the
//! fixed-step simulation with asset hot reload.
//!
//! Usage: `tessera [settings.json]`

mod app;
mod components;
mod level;
mod settings;
mod systems;

use anyhow::{Context, Result};
use app::App;
use settings::RuntimeSettings;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_asset::DirectorySource;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tessera.json"));
    let loaded = RuntimeSettings::load(&path)?;
    let settings = loaded.clone().unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Tessera v{}", tessera_core::VERSION);
    if loaded.is_none() {
        warn!(path = %path.display(), "settings file not found, using defaults");
    }

    let source = Arc::new(DirectorySource::new(&settings.asset_root));
    info!(root = %settings.asset_root.display(), "serving assets");
    let save_path = settings.save_path.clone();

    let mut app = App::new(settings, source);
    app.populate()?;
    info!(
        blueprints = app.assets().list("blueprint").len(),
        "blueprints cached"
    );
    app.run();

    if let Some(save_path) = save_path {
        let snapshot = app.snapshot()?;
        let text = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&save_path, text)
            .with_context(|| format!("writing world to {}", save_path.display()))?;
        info!(
            path = %save_path.display(),
            entities = app.world().alive_count(),
            tick = app.time().tick_count(),
            "world saved"
        );
    }
    Ok(())
}
