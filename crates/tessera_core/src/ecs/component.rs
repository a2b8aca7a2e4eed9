// component.rs - Component trait and runtime type ids
//
// Components are identified at runtime by small dense u32 ids handed out the
// first time a Rust type asks for one. The ids are process-local and never
// persisted; `Component::NAME` is the stable identity used in JSON payloads.

use crate::ecs::index::IndexPolicy;
use crate::ecs::serialize::{LoadContext, SaveContext, SerializeError};
use crate::ecs::Entity;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;

pub type ComponentTypeId = u32;

static TYPE_IDS: Lazy<RwLock<HashMap<TypeId, ComponentTypeId>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Dense runtime id for `T`, assigned on first use.
pub fn component_type_id<T: 'static>() -> ComponentTypeId {
    let key = TypeId::of::<T>();
    if let Some(&id) = TYPE_IDS.read().get(&key) {
        return id;
    }
    let mut map = TYPE_IDS.write();
    let next = map.len() as ComponentTypeId;
    *map.entry(key).or_insert(next)
}

/// Data attached to an entity.
///
/// `save`/`load` are the serialization hooks used by
/// [`save_entity`](crate::ecs::save_entity) and
/// [`load_entity`](crate::ecs::load_entity). The defaults write nothing and
/// restore nothing, which keeps runtime-only components out of save files.
pub trait Component: Sized + Send + Sync + 'static {
    /// Name used as the key in serialized entities.
    const NAME: &'static str;

    /// Lookup structure mapping entity ids to storage slots.
    type Index: IndexPolicy;

    fn save(&self, _ctx: &SaveContext<'_>) -> Result<Option<Value>, SerializeError> {
        Ok(None)
    }

    fn load(
        _value: &Value,
        _ctx: &LoadContext<'_>,
        _owner: Entity,
    ) -> Result<Option<Self>, SerializeError> {
        Ok(None)
    }
}

/// Helper macro to implement [`Component`].
///
/// Modes:
/// - `none` (default): not serialized
/// - `serde`: saved and restored through the type's serde impls
/// - `default`: saved as `{}` and restored with `Default::default()`
///
/// The index policy defaults to [`SparseIndex`](crate::ecs::SparseIndex).
///
/// # Example
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Position { x: f32, y: f32 }
///
/// define_component!(Position, "Position", serde, CompactIndex);
/// define_component!(Selected, "Selected", default);
/// define_component!(Scratch, "Scratch");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $name:expr) => {
        $crate::define_component!($ty, $name, none, $crate::ecs::SparseIndex);
    };
    ($ty:ty, $name:expr, $mode:ident) => {
        $crate::define_component!($ty, $name, $mode, $crate::ecs::SparseIndex);
    };
    ($ty:ty, $name:expr, none, $index:ty) => {
        impl $crate::ecs::Component for $ty {
            const NAME: &'static str = $name;
            type Index = $index;
        }
    };
    ($ty:ty, $name:expr, serde, $index:ty) => {
        impl $crate::ecs::Component for $ty {
            const NAME: &'static str = $name;
            type Index = $index;

            fn save(
                &self,
                _ctx: &$crate::ecs::SaveContext<'_>,
            ) -> ::std::result::Result<
                ::std::option::Option<$crate::__private::serde_json::Value>,
                $crate::ecs::SerializeError,
            > {
                $crate::__private::serde_json::to_value(self)
                    .map(::std::option::Option::Some)
                    .map_err(|source| $crate::ecs::SerializeError::Json {
                        component: $name,
                        source,
                    })
            }

            fn load(
                value: &$crate::__private::serde_json::Value,
                _ctx: &$crate::ecs::LoadContext<'_>,
                _owner: $crate::ecs::Entity,
            ) -> ::std::result::Result<::std::option::Option<Self>, $crate::ecs::SerializeError>
            {
                <$ty as $crate::__private::serde::Deserialize>::deserialize(value)
                    .map(::std::option::Option::Some)
                    .map_err(|source| $crate::ecs::SerializeError::Json {
                        component: $name,
                        source,
                    })
            }
        }
    };
    ($ty:ty, $name:expr, default, $index:ty) => {
        impl $crate::ecs::Component for $ty {
            const NAME: &'static str = $name;
            type Index = $index;

            fn save(
                &self,
                _ctx: &$crate::ecs::SaveContext<'_>,
            ) -> ::std::result::Result<
                ::std::option::Option<$crate::__private::serde_json::Value>,
                $crate::ecs::SerializeError,
            > {
                ::std::result::Result::Ok(::std::option::Option::Some(
                    $crate::__private::serde_json::Value::Object(::std::default::Default::default()),
                ))
            }

            fn load(
                _value: &$crate::__private::serde_json::Value,
                _ctx: &$crate::ecs::LoadContext<'_>,
                _owner: $crate::ecs::Entity,
            ) -> ::std::result::Result<::std::option::Option<Self>, $crate::ecs::SerializeError>
            {
                ::std::result::Result::Ok(::std::option::Option::Some(
                    <$ty as ::std::default::Default>::default(),
                ))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn type_ids_are_stable_and_distinct() {
        let a = component_type_id::<A>();
        let b = component_type_id::<B>();
        assert_ne!(a, b);
        assert_eq!(component_type_id::<A>(), a);
        assert_eq!(component_type_id::<B>(), b);
    }

    #[test]
    fn type_ids_are_consistent_across_threads() {
        struct C;
        let here = component_type_id::<C>();
        let there = std::thread::spawn(component_type_id::<C>)
            .join()
            .expect("thread panicked");
        assert_eq!(here, there);
    }
}
