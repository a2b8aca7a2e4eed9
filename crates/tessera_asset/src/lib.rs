//! Tessera Asset Pipeline
//!
//! Asset loading, hot reload, and the blueprint prototype system.
//!
//! # Usage
//!
//! ```ignore
//! let assets = AssetManager::new(Arc::new(DirectorySource::new("assets")));
//! init_blueprints(&mut world);
//!
//! let crate_entity = world.create();
//! apply_blueprint(&world, &assets, crate_entity, "crate");
//! world.process_queued_actions();
//!
//! // once per frame, after draining
//! assets.reload(&world);
//! ```

mod blueprint;
mod error;
mod manager;
mod source;

pub use blueprint::{
    apply_blueprint, blueprint_component_type, init_blueprints, Blueprint, BlueprintComponent,
};
pub use error::AssetError;
pub use manager::{Asset, AssetId, AssetManager, LoadRequest, WatchId};
pub use source::{AssetSource, DirectorySource, MemorySource};
