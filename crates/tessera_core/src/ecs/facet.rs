//! Entity-scoped view of the world

use crate::ecs::{component_type_id, Component, ComponentTypeId, Entity, World};

/// A fixed group of component types, named as a tuple.
pub trait ComponentSet {
    fn type_ids() -> Vec<ComponentTypeId>;
}

macro_rules! impl_component_set {
    ($($t:ident),+) => {
        impl<$($t: Component),+> ComponentSet for ($($t,)+) {
            fn type_ids() -> Vec<ComponentTypeId> {
                vec![$(component_type_id::<$t>()),+]
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

/// An entity handle paired with the world it lives in.
#[derive(Clone, Copy)]
pub struct EntityFacet<'w> {
    world: &'w World,
    owner: Entity,
}

impl<'w> EntityFacet<'w> {
    pub(crate) fn new(world: &'w World, owner: Entity) -> Self {
        Self { world, owner }
    }

    pub fn handle(&self) -> Entity {
        self.owner
    }

    pub fn world(&self) -> &'w World {
        self.world
    }

    pub fn valid(&self) -> bool {
        self.world.validate(self.owner)
    }

    pub fn get<T: Component>(&self) -> Option<&'w T> {
        self.world.get::<T>(self.owner)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.world.has::<T>(self.owner)
    }

    pub fn emplace<T: Component>(&self, value: T) {
        self.world.emplace(self.owner, value);
    }

    pub fn erase<T: Component>(&self) {
        self.world.erase::<T>(self.owner);
    }

    /// Queue removal of every component not named in `S`.
    ///
    /// ```ignore
    /// world.facet(e).erase_other::<(Transform, BlueprintComponent)>();
    /// ```
    pub fn erase_other<S: ComponentSet>(&self) {
        self.world
            .erase_all_components_except(self.owner, &S::type_ids());
    }

    pub fn destroy(self) {
        self.world.destroy(self.owner);
    }
}

impl std::fmt::Debug for EntityFacet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityFacet").field("owner", &self.owner).finish()
    }
}
