// ============================================================================
// Systems
// ============================================================================

use crate::components::{Transform, Velocity};
use tessera_core::ecs::World;

/// Move every entity that has both a `Transform` and a `Velocity`.
pub fn movement_system(world: &mut World, dt: f32) {
    // Collect first; committed storage can't be borrowed twice.
    let moves: Vec<_> = world
        .container::<Velocity>()
        .iter()
        .map(|(entity, v)| (entity, v.x * dt, v.y * dt))
        .collect();

    for (entity, dx, dy) in moves {
        if let Some(transform) = world.get_mut::<Transform>(entity) {
            transform.x += dx;
            transform.y += dy;
        }
    }
}
