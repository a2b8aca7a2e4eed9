// world.rs - Entity registry owning the generation table and every component container

use crate::ecs::{
    component_type_id, Component, ComponentContainer, ComponentTypeId, DrainReport, EcsSettings,
    Entity, EntityFacet, EntityTable, ErasedContainer,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// The entity registry.
///
/// Entity creation and destruction take `&self` so they can happen while
/// components are being iterated; destruction only queues the component
/// removals. Committed storage changes once per tick in
/// [`World::process_queued_actions`].
pub struct World {
    entities: RwLock<EntityTable>,
    containers: Vec<Option<Box<dyn ErasedContainer>>>,
    names: HashMap<&'static str, ComponentTypeId>,
    settings: EcsSettings,
}

impl World {
    pub fn new() -> Self {
        Self::with_settings(EcsSettings::default())
    }

    pub fn with_settings(settings: EcsSettings) -> Self {
        Self {
            entities: RwLock::new(EntityTable::new()),
            containers: Vec::new(),
            names: HashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &EcsSettings {
        &self.settings
    }

    // --- entities -----------------------------------------------------------

    pub fn create(&self) -> Entity {
        self.entities.write().create()
    }

    /// Invalidate `entity` now and queue removal of all its components.
    pub fn destroy(&self, entity: Entity) {
        if !self.entities.write().destroy(entity) {
            warn!(%entity, "destroy called on an invalid entity");
            return;
        }
        for container in self.containers.iter().flatten() {
            container.erase(entity);
        }
    }

    #[inline]
    pub fn validate(&self, entity: Entity) -> bool {
        self.entities.read().validate(entity)
    }

    pub fn alive_count(&self) -> usize {
        self.entities.read().alive_count()
    }

    /// Snapshot of every live handle, in id order.
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.read().iter().collect()
    }

    pub fn facet(&self, entity: Entity) -> EntityFacet<'_> {
        EntityFacet::new(self, entity)
    }

    // --- component types ----------------------------------------------------

    /// Create the container for `T`. Registering twice is a no-op.
    ///
    /// # Panics
    /// If another type already registered under `T::NAME`.
    pub fn register_component_type<T: Component>(&mut self) -> ComponentTypeId {
        let ty = component_type_id::<T>();
        let at = ty as usize;
        if self.containers.len() <= at {
            self.containers.resize_with(at + 1, || None);
        }
        if self.containers[at].is_some() {
            return ty;
        }

        if let Some(&other) = self.names.get(T::NAME) {
            panic!(
                "component name `{}` is already registered by type id {other}",
                T::NAME
            );
        }
        self.containers[at] = Some(Box::new(ComponentContainer::<T>::new(&self.settings)));
        self.names.insert(T::NAME, ty);
        debug!(component = T::NAME, id = ty, "registered component type");
        ty
    }

    pub fn is_registered<T: Component>(&self) -> bool {
        self.container_by_id(component_type_id::<T>()).is_some()
    }

    /// Resolve a serialized component name.
    pub fn list_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.names.get(name).copied()
    }

    pub fn component_name(&self, ty: ComponentTypeId) -> Option<&'static str> {
        self.container_by_id(ty).map(|c| c.name())
    }

    pub fn container_by_id(&self, ty: ComponentTypeId) -> Option<&dyn ErasedContainer> {
        self.containers.get(ty as usize)?.as_deref()
    }

    pub fn try_container<T: Component>(&self) -> Option<&ComponentContainer<T>> {
        self.container_by_id(component_type_id::<T>())?
            .as_any()
            .downcast_ref()
    }

    /// # Panics
    /// If `T` was never registered.
    #[track_caller]
    pub fn container<T: Component>(&self) -> &ComponentContainer<T> {
        match self.try_container::<T>() {
            Some(container) => container,
            None => panic!("component type `{}` is not registered", T::NAME),
        }
    }

    /// # Panics
    /// If `T` was never registered.
    #[track_caller]
    pub fn container_mut<T: Component>(&mut self) -> &mut ComponentContainer<T> {
        let container = self
            .containers
            .get_mut(component_type_id::<T>() as usize)
            .and_then(|slot| slot.as_deref_mut())
            .and_then(|c| c.as_any_mut().downcast_mut());
        match container {
            Some(container) => container,
            None => panic!("component type `{}` is not registered", T::NAME),
        }
    }

    /// Visit every registered container in type id order.
    pub fn for_each_container(&self, mut f: impl FnMut(&dyn ErasedContainer)) {
        for container in self.containers.iter().flatten() {
            f(container.as_ref());
        }
    }

    /// Queue removal of every component of `entity` whose type is not in `keep`.
    pub fn erase_all_components_except(&self, entity: Entity, keep: &[ComponentTypeId]) {
        for container in self.containers.iter().flatten() {
            if !keep.contains(&container.component_type()) {
                container.erase(entity);
            }
        }
    }

    /// Drain every container's queues. Call once per tick.
    pub fn process_queued_actions(&mut self) -> DrainReport {
        let entities = self.entities.get_mut();
        let mut total = DrainReport::default();
        for container in self.containers.iter_mut().flatten() {
            total += container.process_queued_actions(entities);
        }
        if !total.is_empty() {
            trace!(?total, "processed queued actions");
        }
        total
    }

    // --- typed shortcuts ----------------------------------------------------

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.container::<T>().find(entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.container_mut::<T>().find_mut(entity)
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.container::<T>().has(entity)
    }

    pub fn emplace<T: Component>(&self, entity: Entity, value: T) {
        self.container::<T>().emplace(entity, value);
    }

    pub fn erase<T: Component>(&self, entity: Entity) {
        self.container::<T>().erase(entity);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    crate::define_component!(Health, "Health");

    #[derive(Debug, PartialEq)]
    struct Armor(u32);
    crate::define_component!(Armor, "Armor");

    struct Impostor;
    crate::define_component!(Impostor, "Health");

    fn world() -> World {
        let mut world = World::new();
        world.register_component_type::<Health>();
        world.register_component_type::<Armor>();
        world
    }

    #[test]
    fn registration_is_idempotent_and_named() {
        let mut world = world();
        let first = component_type_id::<Health>();
        assert_eq!(world.register_component_type::<Health>(), first);
        assert_eq!(world.list_by_name("Health"), Some(first));
        assert_eq!(world.component_name(first), Some("Health"));
        assert_eq!(world.list_by_name("Mana"), None);
        assert!(world.is_registered::<Armor>());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_name_panics() {
        let mut world = world();
        world.register_component_type::<Impostor>();
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn unregistered_type_panics() {
        struct Stranger;
        crate::define_component!(Stranger, "Stranger");
        let world = world();
        let e = world.create();
        world.get::<Stranger>(e);
    }

    #[test]
    fn destroy_queues_component_removal() {
        let mut world = world();
        let e = world.create();
        world.emplace(e, Health(3));
        world.emplace(e, Armor(1));
        world.process_queued_actions();

        world.destroy(e);
        assert!(!world.validate(e));
        let report = world.process_queued_actions();
        assert_eq!(report.erased, 2);
        assert!(world.container::<Health>().is_empty());
        assert!(world.container::<Armor>().is_empty());
    }

    #[test]
    fn destroying_invalid_entity_is_a_no_op() {
        let mut world = world();
        let e = world.create();
        world.destroy(e);
        world.destroy(e);
        assert_eq!(world.alive_count(), 0);
        assert!(world.process_queued_actions().is_empty());
    }

    #[test]
    fn erase_all_except_keeps_listed_types() {
        let mut world = world();
        let e = world.create();
        world.emplace(e, Health(3));
        world.emplace(e, Armor(1));
        world.process_queued_actions();

        world.erase_all_components_except(e, &[component_type_id::<Armor>()]);
        world.process_queued_actions();
        assert!(!world.has::<Health>(e));
        assert_eq!(world.get::<Armor>(e), Some(&Armor(1)));
    }

    #[test]
    fn get_mut_edits_committed_value() {
        let mut world = world();
        let e = world.create();
        world.emplace(e, Health(3));
        world.process_queued_actions();
        if let Some(health) = world.get_mut::<Health>(e) {
            health.0 = 9;
        }
        assert_eq!(world.get::<Health>(e), Some(&Health(9)));
    }

    #[test]
    fn for_each_container_visits_registered_types() {
        let world = world();
        let mut names = Vec::new();
        world.for_each_container(|c| names.push(c.name()));
        names.sort_unstable();
        assert_eq!(names, vec!["Armor", "Health"]);
    }

    #[test]
    fn world_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<World>();
    }
}
