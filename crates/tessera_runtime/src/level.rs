//! Level documents: a JSON array of saved entities.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tessera_asset::{Asset, AssetError, LoadRequest};
use tessera_core::ecs::World;
use tracing::info;

pub struct Level {
    entities: RwLock<Value>,
}

impl Level {
    pub fn entities(&self) -> Value {
        self.entities.read().clone()
    }

    fn parse(request: &LoadRequest<'_>) -> Result<Value, AssetError> {
        let value: Value = serde_json::from_str(request.content)
            .map_err(|e| AssetError::parse(request.id, &e))?;
        if !value.is_array() {
            return Err(AssetError::invalid(request.id, "a level must be an array of entities"));
        }
        Ok(value)
    }
}

impl Asset for Level {
    const KIND: &'static str = "level";
    const EXTENSION: &'static str = "json";

    fn load(request: &LoadRequest<'_>) -> Result<Arc<Self>, AssetError> {
        Ok(Arc::new(Level {
            entities: RwLock::new(Self::parse(request)?),
        }))
    }

    // Already spawned entities are left alone; the new content is used on the next load.
    fn reload(&self, request: &LoadRequest<'_>, _world: &World) -> Result<(), AssetError> {
        let value = Self::parse(request)?;
        *self.entities.write() = value;
        info!(level = %request.id, "level changed on disk");
        Ok(())
    }
}
