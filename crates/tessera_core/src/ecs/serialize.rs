//! JSON (de)serialization of entities keyed by component name
//!
//! An entity is written as `{ "<component name>": <payload>, ... }`. Loading
//! looks each key up in the world's name table and hands the payload to that
//! container's restore hook, which queues an `emplace` like any other
//! producer.

use crate::ecs::{ComponentTypeId, Entity, World};
use serde_json::{Map, Value};
use std::any::Any;
use thiserror::Error;
use tracing::{debug, error};

/// Key reserved for blueprint inheritance. Never treated as a component.
pub const IMPORT_KEY: &str = "$import";

/// Returns `true` for component types that should be (de)serialized.
pub type ComponentFilter<'a> = &'a dyn Fn(ComponentTypeId) -> bool;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("expected a JSON {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("component `{component}`: {source}")]
    Json {
        component: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("component `{component}`: {message}")]
    Invalid {
        component: &'static str,
        message: String,
    },
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub struct SaveContext<'a> {
    pub world: &'a World,
    pub filter: Option<ComponentFilter<'a>>,
}

impl<'a> SaveContext<'a> {
    pub fn new(world: &'a World) -> Self {
        Self {
            world,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: ComponentFilter<'a>) -> Self {
        self.filter = Some(filter);
        self
    }

    fn accepts(&self, ty: ComponentTypeId) -> bool {
        self.filter.map_or(true, |f| f(ty))
    }
}

/// Everything a component's load hook may need.
pub struct LoadContext<'a> {
    pub world: &'a World,
    /// Name of the document being read, for diagnostics.
    pub source: &'a str,
    pub filter: Option<ComponentFilter<'a>>,
    /// Service handed through to components that need one while loading.
    pub extension: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> LoadContext<'a> {
    pub fn new(world: &'a World, source: &'a str) -> Self {
        Self {
            world,
            source,
            filter: None,
            extension: None,
        }
    }

    pub fn with_filter(mut self, filter: ComponentFilter<'a>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_extension(mut self, extension: &'a (dyn Any + Send + Sync)) -> Self {
        self.extension = Some(extension);
        self
    }

    /// The extension, if one was attached and it is a `T`.
    pub fn extension<T: 'static>(&self) -> Option<&'a T> {
        self.extension.and_then(|ext| ext.downcast_ref::<T>())
    }

    fn accepts(&self, ty: ComponentTypeId) -> bool {
        self.filter.map_or(true, |f| f(ty))
    }
}

/// Serialize every committed component of `entity` that passes the filter.
pub fn save_entity(ctx: &SaveContext<'_>, entity: Entity) -> Result<Map<String, Value>, SerializeError> {
    let mut out = Map::new();
    let mut result = Ok(());
    ctx.world.for_each_container(|container| {
        if result.is_err() || !ctx.accepts(container.component_type()) {
            return;
        }
        match container.save(entity, ctx) {
            Ok(Some(value)) => {
                out.insert(container.name().to_owned(), value);
            }
            Ok(None) => {}
            Err(e) => result = Err(e),
        }
    });
    result.map(|()| out)
}

/// Queue the components described by `value` onto `entity`.
///
/// A fresh entity is created when `entity` is not valid; the handle actually
/// loaded into is returned. Unknown and filtered component names are
/// skipped. A component whose payload fails to deserialize is logged and
/// skipped while the rest of the entity still loads.
pub fn load_entity(ctx: &LoadContext<'_>, entity: Entity, value: &Value) -> Result<Entity, SerializeError> {
    let Value::Object(components) = value else {
        return Err(SerializeError::UnexpectedType {
            expected: "object",
            found: json_type_name(value),
        });
    };

    let world = ctx.world;
    let entity = if world.validate(entity) {
        entity
    } else {
        world.create()
    };

    for (key, payload) in components {
        if key == IMPORT_KEY {
            continue;
        }
        let Some(ty) = world.list_by_name(key) else {
            debug!(source = ctx.source, component = %key, "skipped unknown component");
            continue;
        };
        if !ctx.accepts(ty) {
            debug!(source = ctx.source, component = %key, "skipped filtered component");
            continue;
        }
        let Some(container) = world.container_by_id(ty) else {
            continue;
        };
        match container.restore(payload, ctx, entity) {
            Ok(true) => {}
            Ok(false) => {
                debug!(source = ctx.source, component = %key, "component does not restore from data");
            }
            Err(e) => {
                error!(source = ctx.source, %entity, "error loading component: {e}");
            }
        }
    }
    Ok(entity)
}

/// Serialize every live entity as a JSON array.
pub fn save_world(ctx: &SaveContext<'_>) -> Result<Value, SerializeError> {
    ctx.world
        .entities()
        .into_iter()
        .map(|entity| save_entity(ctx, entity).map(Value::Object))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Load an array of entity objects, creating one entity per element.
///
/// With `clear_existing` every live entity is destroyed first.
pub fn load_world(
    ctx: &LoadContext<'_>,
    value: &Value,
    clear_existing: bool,
) -> Result<Vec<Entity>, SerializeError> {
    let Value::Array(entities) = value else {
        return Err(SerializeError::UnexpectedType {
            expected: "array",
            found: json_type_name(value),
        });
    };

    if clear_existing {
        for entity in ctx.world.entities() {
            ctx.world.destroy(entity);
        }
    }

    entities
        .iter()
        .map(|data| load_entity(ctx, Entity::INVALID, data))
        .collect()
}
