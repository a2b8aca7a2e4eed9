//! Entity id -> storage slot lookup strategies
//!
//! Every component container owns exactly one index policy. The policy is
//! chosen per component type through [`Component::Index`](crate::ecs::Component).

use crate::ecs::EntityId;
use crate::pool::ComponentIndex;
use std::collections::HashMap;

/// Maps an entity id to the slot holding its component.
///
/// At most one entry exists per entity id; absence means the entity does not
/// have the component.
pub trait IndexPolicy: Default + Send + Sync + 'static {
    /// Point `entity` at `index`, returning the slot it pointed at before.
    fn attach(&mut self, entity: EntityId, index: ComponentIndex) -> Option<ComponentIndex>;

    /// Remove the entry for `entity`, returning its slot.
    fn detach(&mut self, entity: EntityId) -> Option<ComponentIndex>;

    fn find(&self, entity: EntityId) -> Option<ComponentIndex>;

    fn clear(&mut self);

    fn shrink_to_fit(&mut self);

    /// Number of attached entities.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash map backed index. Good default for components only a fraction of
/// entities carry.
#[derive(Debug, Default)]
pub struct SparseIndex {
    table: HashMap<EntityId, ComponentIndex>,
}

impl IndexPolicy for SparseIndex {
    #[inline]
    fn attach(&mut self, entity: EntityId, index: ComponentIndex) -> Option<ComponentIndex> {
        self.table.insert(entity, index)
    }

    #[inline]
    fn detach(&mut self, entity: EntityId) -> Option<ComponentIndex> {
        self.table.remove(&entity)
    }

    #[inline]
    fn find(&self, entity: EntityId) -> Option<ComponentIndex> {
        self.table.get(&entity).copied()
    }

    fn clear(&mut self) {
        self.table.clear();
    }

    fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

/// Dense array indexed directly by entity id. Meant for components nearly
/// every entity has (transforms and the like), where the hashing cost of
/// [`SparseIndex`] dominates.
#[derive(Debug, Default)]
pub struct CompactIndex {
    table: Vec<ComponentIndex>,
    len: usize,
}

impl CompactIndex {
    const EMPTY: ComponentIndex = ComponentIndex::MAX;
}

impl IndexPolicy for CompactIndex {
    fn attach(&mut self, entity: EntityId, index: ComponentIndex) -> Option<ComponentIndex> {
        debug_assert_ne!(index, Self::EMPTY, "slot index collides with empty marker");
        let at = entity as usize;
        if at >= self.table.len() {
            self.table.resize(at + 1, Self::EMPTY);
        }
        let prev = std::mem::replace(&mut self.table[at], index);
        if prev == Self::EMPTY {
            self.len += 1;
            None
        } else {
            Some(prev)
        }
    }

    fn detach(&mut self, entity: EntityId) -> Option<ComponentIndex> {
        let slot = self.table.get_mut(entity as usize)?;
        let prev = std::mem::replace(slot, Self::EMPTY);
        if prev == Self::EMPTY {
            None
        } else {
            self.len -= 1;
            Some(prev)
        }
    }

    #[inline]
    fn find(&self, entity: EntityId) -> Option<ComponentIndex> {
        self.table
            .get(entity as usize)
            .copied()
            .filter(|&index| index != Self::EMPTY)
    }

    fn clear(&mut self) {
        self.table.clear();
        self.len = 0;
    }

    fn shrink_to_fit(&mut self) {
        while self.table.last() == Some(&Self::EMPTY) {
            self.table.pop();
        }
        self.table.shrink_to_fit();
    }

    fn len(&self) -> usize {
        self.len
    }
}
