//! Entity handle with generational index
//!
//! Entities are lightweight handles (8 bytes) that carry no data of their
//! own; every piece of state lives in components. The generation counter
//! prevents a stale handle from reaching a slot that was recycled for a new
//! entity.

use std::fmt;

/// Raw slot number of an entity inside the generation table.
pub type EntityId = u32;

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit id | 32-bit generation]
/// - Id: Position in the registry's generation table
/// - Generation: Incremented on entity destruction (prevents use-after-free)
///
/// Example:
/// ```ignore
/// let entity = world.create();
/// world.destroy(entity);
/// assert!(!world.validate(entity)); // generation mismatch
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    id: EntityId,
    generation: u32,
}

impl Entity {
    /// A handle that never validates.
    pub const INVALID: Entity = Entity {
        id: EntityId::MAX,
        generation: u32::MAX,
    };

    pub(crate) const fn new(id: EntityId, generation: u32) -> Self {
        Self { id, generation }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Serialize to 64-bit integer (for networking/save files)
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.id as u64)
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self {
            id: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.generation)
    }
}

/// Generation table owned by the registry.
///
/// A handle is valid iff the table's current generation for its id equals
/// the handle's generation. Destroying bumps the generation right away and
/// parks the id on a free list for reuse.
#[derive(Debug, Default)]
pub struct EntityTable {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<EntityId>,
    alive_count: usize,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> Entity {
        self.alive_count += 1;
        if let Some(id) = self.free.pop() {
            self.alive[id as usize] = true;
            return Entity::new(id, self.generations[id as usize]);
        }

        let id = EntityId::try_from(self.generations.len())
            .ok()
            .filter(|&id| id != EntityId::MAX)
            .unwrap_or_else(|| panic!("entity id space exhausted"));
        self.generations.push(0);
        self.alive.push(true);
        Entity::new(id, 0)
    }

    /// Invalidate `entity`. Returns `false` if the handle was already stale.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.validate(entity) {
            return false;
        }
        let at = entity.id as usize;
        self.generations[at] = self.generations[at].wrapping_add(1);
        self.alive[at] = false;
        self.free.push(entity.id);
        self.alive_count -= 1;
        true
    }

    #[inline]
    pub fn validate(&self, entity: Entity) -> bool {
        let at = entity.id as usize;
        self.alive.get(at).copied().unwrap_or(false) && self.generations[at] == entity.generation
    }

    /// Current live handle for a raw id, if that id is in use.
    pub fn current(&self, id: EntityId) -> Option<Entity> {
        let at = id as usize;
        if self.alive.get(at).copied().unwrap_or(false) {
            Some(Entity::new(id, self.generations[at]))
        } else {
            None
        }
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Live handles in id order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .zip(&self.generations)
            .enumerate()
            .filter(|(_, (alive, _))| **alive)
            .map(|(id, (_, &generation))| Entity::new(id as EntityId, generation))
    }

    /// Destroy every live entity.
    pub fn clear(&mut self) {
        let live: Vec<Entity> = self.iter().collect();
        for entity in live {
            self.destroy(entity);
        }
    }
}
