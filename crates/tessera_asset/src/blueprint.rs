//! Blueprint prototypes
//!
//! A blueprint is a JSON object mapping component names to component data.
//! A top-level `$import` names a parent blueprint whose components are
//! applied first; the child's fields override the parent's field by field.
//! Blueprints remember every entity they were applied to so a hot reload can
//! push the new definition into those entities.

use crate::{Asset, AssetError, AssetId, AssetManager, LoadRequest};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Weak};
use tessera_core::ecs::{
    component_type_id, load_entity, Component, ComponentTypeId, Entity, LoadContext, SaveContext,
    SerializeError, SparseIndex, World, IMPORT_KEY,
};
use tracing::{debug, error, warn};

pub struct Blueprint {
    id: AssetId,
    content: RwLock<Map<String, Value>>,
    parent: RwLock<Option<Arc<Blueprint>>>,
    children: Mutex<Vec<Weak<Blueprint>>>,
    /// May hold an entity more than once while a replaced marker component
    /// is still waiting to be dropped.
    users: Mutex<Vec<Entity>>,
    self_ref: Weak<Blueprint>,
}

/// Parsed blueprint text: its component map and the `$import` target.
fn parse(id: &AssetId, text: &str) -> Result<(Map<String, Value>, Option<String>), AssetError> {
    let value: Value = serde_json::from_str(text).map_err(|e| AssetError::parse(id, &e))?;
    let Value::Object(content) = value else {
        return Err(AssetError::invalid(id, "blueprint must be a JSON object"));
    };
    let import = match content.get(IMPORT_KEY) {
        None => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(_) => {
            return Err(AssetError::invalid(
                id,
                format!("`{IMPORT_KEY}` must be a string"),
            ))
        }
    };
    Ok((content, import))
}

/// Overlay `value` onto the component `key` of `doc`, field by field when
/// both sides are objects.
fn merge_component(doc: &mut Map<String, Value>, key: &str, value: &Value) {
    match (doc.get_mut(key), value) {
        (Some(Value::Object(base)), Value::Object(fields)) => {
            for (field, v) in fields {
                base.insert(field.clone(), v.clone());
            }
        }
        _ => {
            doc.insert(key.to_owned(), value.clone());
        }
    }
}

impl Blueprint {
    pub fn id(&self) -> &AssetId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn parent(&self) -> Option<Arc<Blueprint>> {
        self.parent.read().clone()
    }

    /// Live children, in link order.
    pub fn children(&self) -> Vec<Arc<Blueprint>> {
        self.children.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// Entities this blueprint is applied to, without duplicates.
    pub fn users(&self) -> Vec<Entity> {
        let mut users = self.users.lock().clone();
        users.sort_unstable();
        users.dedup();
        users
    }

    pub(crate) fn add_user(&self, entity: Entity) {
        self.users.lock().push(entity);
    }

    /// Forget one registration of `entity`.
    pub(crate) fn detach(&self, entity: Entity) {
        let mut users = self.users.lock();
        if let Some(at) = users.iter().position(|&u| u == entity) {
            users.swap_remove(at);
        }
    }

    /// Own content with the parent chain merged underneath, `$import` removed.
    pub fn effective_content(&self) -> Map<String, Value> {
        let mut doc = match self.parent() {
            Some(parent) => parent.effective_content(),
            None => Map::new(),
        };
        for (key, value) in self.content.read().iter() {
            if key != IMPORT_KEY {
                merge_component(&mut doc, key, value);
            }
        }
        doc
    }

    /// Queue this blueprint's components onto `entity`.
    pub fn apply(&self, world: &World, assets: &AssetManager, entity: Entity) {
        if !world.validate(entity) {
            warn!(blueprint = %self.id, %entity, "not applying blueprint to an invalid entity");
            return;
        }
        let doc = Value::Object(self.effective_content());
        // Blueprints describe components, never the marker itself.
        let marker = blueprint_component_type();
        let not_marker = move |ty: ComponentTypeId| ty != marker;
        let ctx = LoadContext::new(world, &self.id.name)
            .with_filter(&not_marker)
            .with_extension(assets);
        if let Err(e) = load_entity(&ctx, entity, &doc) {
            error!(blueprint = %self.id, %entity, "failed to apply blueprint: {e}");
        }
    }

    fn is_ancestor_or_self(&self, candidate: &Arc<Blueprint>) -> bool {
        let mut current = Some(Arc::clone(candidate));
        while let Some(bp) = current {
            if std::ptr::eq(Arc::as_ptr(&bp), self) {
                return true;
            }
            current = bp.parent();
        }
        false
    }

    fn link_parent(&self, parent: Option<Arc<Blueprint>>) {
        let mut slot = self.parent.write();
        if let Some(old) = slot.take() {
            old.children
                .lock()
                .retain(|c| !Weak::ptr_eq(c, &self.self_ref));
        }
        if let Some(new) = &parent {
            new.children.lock().push(self.self_ref.clone());
        }
        *slot = parent;
    }

    /// Push the current definition down: children first, then every user.
    ///
    /// # Panics
    /// If a user entity is no longer valid.
    fn on_reload(&self, world: &World, assets: &AssetManager) {
        for child in self.children() {
            child.on_reload(world, assets);
        }
        for user in self.users() {
            assert!(
                world.validate(user),
                "dead entity {user} in users of blueprint {}",
                self.id
            );
            self.apply(world, assets, user);
        }
    }
}

impl Asset for Blueprint {
    const KIND: &'static str = "blueprint";
    const EXTENSION: &'static str = "json";

    fn load(request: &LoadRequest<'_>) -> Result<Arc<Self>, AssetError> {
        let (content, import) = parse(request.id, request.content)?;
        let parent = match import {
            Some(name) => Some(request.manager.load::<Blueprint>(&name)?),
            None => None,
        };

        let blueprint = Arc::new_cyclic(|self_ref| Blueprint {
            id: request.id.clone(),
            content: RwLock::new(content),
            parent: RwLock::new(None),
            children: Mutex::new(Vec::new()),
            users: Mutex::new(Vec::new()),
            self_ref: self_ref.clone(),
        });
        blueprint.link_parent(parent);
        Ok(blueprint)
    }

    fn reload(&self, request: &LoadRequest<'_>, world: &World) -> Result<(), AssetError> {
        let (content, import) = parse(request.id, request.content)?;

        let current = self.parent();
        let parent = match (import, &current) {
            (None, _) => None,
            (Some(name), Some(p)) if p.name() == name => current.clone(),
            (Some(name), _) => Some(request.manager.load::<Blueprint>(&name)?),
        };
        if let Some(p) = &parent {
            if self.is_ancestor_or_self(p) {
                return Err(AssetError::ImportCycle(self.id.clone()));
            }
        }

        *self.content.write() = content;
        let relink = match (&parent, &current) {
            (Some(new), Some(old)) => !Arc::ptr_eq(new, old),
            (None, None) => false,
            _ => true,
        };
        if relink {
            debug!(blueprint = %self.id, parent = ?parent.as_ref().map(|p| p.name()), "relinked blueprint parent");
            self.link_parent(parent);
        }

        self.on_reload(world, request.manager);
        Ok(())
    }
}

impl Drop for Blueprint {
    fn drop(&mut self) {
        if let Some(parent) = self.parent.get_mut().take() {
            parent
                .children
                .lock()
                .retain(|c| !Weak::ptr_eq(c, &self.self_ref));
        }
        if !std::thread::panicking() {
            assert!(
                self.children.get_mut().is_empty(),
                "blueprint {} dropped while children are still linked",
                self.id
            );
        }
    }
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("id", &self.id)
            .field("parent", &self.parent().map(|p| p.id.clone()))
            .field("users", &self.users.lock().len())
            .finish()
    }
}

/// Marker linking an entity to the blueprint it was built from.
///
/// Serialized as `{"name": "<blueprint>"}`. Loading it applies the
/// blueprint; dropping it unregisters the entity from the blueprint.
pub struct BlueprintComponent {
    blueprint: Arc<Blueprint>,
    owner: Entity,
}

impl BlueprintComponent {
    /// Register `owner` as a user of `blueprint`.
    pub fn attach(blueprint: Arc<Blueprint>, owner: Entity) -> Self {
        blueprint.add_user(owner);
        Self { blueprint, owner }
    }

    pub fn blueprint(&self) -> &Arc<Blueprint> {
        &self.blueprint
    }

    pub fn owner(&self) -> Entity {
        self.owner
    }
}

impl Drop for BlueprintComponent {
    fn drop(&mut self) {
        self.blueprint.detach(self.owner);
    }
}

impl Component for BlueprintComponent {
    const NAME: &'static str = "$Blueprint";
    type Index = SparseIndex;

    fn save(&self, _ctx: &SaveContext<'_>) -> Result<Option<Value>, SerializeError> {
        Ok(Some(json!({ "name": self.blueprint.name() })))
    }

    fn load(
        value: &Value,
        ctx: &LoadContext<'_>,
        owner: Entity,
    ) -> Result<Option<Self>, SerializeError> {
        let invalid = |message: String| SerializeError::Invalid {
            component: Self::NAME,
            message,
        };
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing string field `name`".into()))?;
        let assets = ctx
            .extension::<AssetManager>()
            .ok_or_else(|| invalid("no asset manager in load context".into()))?;
        let blueprint = assets
            .load::<Blueprint>(name)
            .map_err(|e| invalid(e.to_string()))?;

        let component = Self::attach(Arc::clone(&blueprint), owner);
        blueprint.apply(ctx.world, assets, owner);
        Ok(Some(component))
    }
}

/// Register the blueprint marker component with `world`.
pub fn init_blueprints(world: &mut World) -> ComponentTypeId {
    world.register_component_type::<BlueprintComponent>()
}

pub fn blueprint_component_type() -> ComponentTypeId {
    component_type_id::<BlueprintComponent>()
}

/// Apply blueprint `name` to `entity` and tag the entity with it.
///
/// Returns `false` (after logging) if the blueprint cannot be loaded or the
/// entity is invalid.
pub fn apply_blueprint(world: &World, assets: &AssetManager, entity: Entity, name: &str) -> bool {
    let Some(blueprint) = assets.load_maybe::<Blueprint>(name) else {
        error!(blueprint = name, "failed to load blueprint");
        return false;
    };
    if !world.validate(entity) {
        warn!(blueprint = name, %entity, "cannot apply blueprint to an invalid entity");
        return false;
    }
    world.emplace(entity, BlueprintComponent::attach(Arc::clone(&blueprint), entity));
    blueprint.apply(world, assets, entity);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;

    #[test]
    fn parse_rejects_non_objects_and_bad_imports() {
        let id = AssetId::new("blueprint", "x");
        assert!(matches!(parse(&id, "[1]"), Err(AssetError::Invalid { .. })));
        assert!(matches!(
            parse(&id, r#"{ "$import": 3 }"#),
            Err(AssetError::Invalid { .. })
        ));
        assert!(matches!(parse(&id, "{ nope"), Err(AssetError::Parse { .. })));

        let (content, import) = parse(&id, r#"{ "$import": "base", "A": {} }"#).expect("valid");
        assert_eq!(import.as_deref(), Some("base"));
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn merge_overrides_fields_and_replaces_scalars() {
        let mut doc = Map::new();
        merge_component(&mut doc, "A", &json!({ "x": 1, "y": 2 }));
        merge_component(&mut doc, "A", &json!({ "y": 3 }));
        merge_component(&mut doc, "B", &json!(5));
        merge_component(&mut doc, "B", &json!(6));
        assert_eq!(Value::Object(doc), json!({ "A": { "x": 1, "y": 3 }, "B": 6 }));
    }

    #[test]
    fn parent_and_children_are_linked_both_ways() {
        let source = Arc::new(MemorySource::new());
        source.insert("blueprint/base.json", "{}");
        source.insert("blueprint/child.json", r#"{ "$import": "base" }"#);
        let assets = AssetManager::new(source);

        let child = assets.load::<Blueprint>("child").expect("loads");
        let base = child.parent().expect("has parent");
        assert_eq!(base.name(), "base");
        assert_eq!(base.children().len(), 1);
        assert!(Arc::ptr_eq(&base.children()[0], &child));

        drop(child);
        assets.shrink_to_fit();
        assert!(base.children().is_empty(), "dropped child unlinks itself");
    }

    #[test]
    fn effective_content_layers_parent_first() {
        let source = Arc::new(MemorySource::new());
        source.insert("blueprint/a.json", r#"{ "P": { "x": 1, "y": 1 }, "Q": {} }"#);
        source.insert("blueprint/b.json", r#"{ "$import": "a", "P": { "y": 2 } }"#);
        let assets = AssetManager::new(source);

        let b = assets.load::<Blueprint>("b").expect("loads");
        assert_eq!(
            Value::Object(b.effective_content()),
            json!({ "P": { "x": 1, "y": 2 }, "Q": {} })
        );
    }

    #[test]
    fn users_are_a_multiset() {
        let source = Arc::new(MemorySource::new());
        source.insert("blueprint/a.json", "{}");
        let assets = AssetManager::new(source);
        let world = World::new();
        let e = world.create();

        let a = assets.load::<Blueprint>("a").expect("loads");
        let first = BlueprintComponent::attach(Arc::clone(&a), e);
        let second = BlueprintComponent::attach(Arc::clone(&a), e);
        assert_eq!(a.users(), vec![e]);
        drop(first);
        assert_eq!(a.users(), vec![e]);
        drop(second);
        assert!(a.users().is_empty());
    }
}
