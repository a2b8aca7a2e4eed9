// ============================================================================
// Components
// ============================================================================

use serde::{Deserialize, Serialize};
use tessera_core::define_component;
use tessera_core::ecs::{CompactIndex, World};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}
define_component!(Transform, "Transform", serde, CompactIndex);

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}
define_component!(Velocity, "Velocity", serde);

/// Free-form label, handy for finding entities in logs and save files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag(pub String);
define_component!(Tag, "Tag", serde);

pub fn register_all(world: &mut World) {
    world.register_component_type::<Transform>();
    world.register_component_type::<Velocity>();
    world.register_component_type::<Tag>();
    tessera_asset::init_blueprints(world);
}
