//! Per component type storage with deferred mutation queues
//!
//! Producers (`emplace`, `erase`, `clear`) only take `&self` and push into
//! lock-free queues, so they can run while other code iterates committed
//! storage. Nothing becomes visible until the single consumer,
//! [`ComponentContainer::process_queued_actions`], drains the queues.

use crate::ecs::index::IndexPolicy;
use crate::ecs::serialize::{LoadContext, SaveContext, SerializeError};
use crate::ecs::{component_type_id, Component, ComponentTypeId, EcsSettings, Entity, EntityTable};
use crate::pool::{ComponentIndex, Pool};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use std::any::Any;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

/// What a drain did. Summed across containers by the world.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Components attached to an entity that did not have one.
    pub inserted: usize,
    /// Components overwritten in place for an entity that already had one.
    pub replaced: usize,
    /// Components removed.
    pub erased: usize,
    /// Queued operations dropped because they referenced stale entities.
    pub discarded: usize,
    pub compacted: bool,
    pub cleared: bool,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for DrainReport {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.replaced += rhs.replaced;
        self.erased += rhs.erased;
        self.discarded += rhs.discarded;
        self.compacted |= rhs.compacted;
        self.cleared |= rhs.cleared;
    }
}

struct Stored<T> {
    owner: Entity,
    value: T,
}

struct Insertion<T> {
    owner: Entity,
    value: T,
}

pub struct ComponentContainer<T: Component> {
    storage: Pool<Stored<T>>,
    index: T::Index,
    insert_tx: Sender<Insertion<T>>,
    insert_rx: Receiver<Insertion<T>>,
    delete_tx: Sender<Entity>,
    delete_rx: Receiver<Entity>,
    clear_requested: AtomicBool,
    unoptimized_deletes: usize,
    settings: EcsSettings,
}

impl<T: Component> ComponentContainer<T> {
    pub fn new(settings: &EcsSettings) -> Self {
        let (insert_tx, insert_rx) = unbounded();
        let (delete_tx, delete_rx) = unbounded();
        Self {
            storage: Pool::with_chunk_size(settings.pool_chunk_size),
            index: T::Index::default(),
            insert_tx,
            insert_rx,
            delete_tx,
            delete_rx,
            clear_requested: AtomicBool::new(false),
            unoptimized_deletes: 0,
            settings: settings.clone(),
        }
    }

    /// Queue `value` for `owner`. Takes effect on the next drain.
    pub fn emplace(&self, owner: Entity, value: T) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.insert_tx.send(Insertion { owner, value });
    }

    /// Queue removal of `owner`'s component. Takes effect on the next drain.
    pub fn erase(&self, owner: Entity) {
        let _ = self.delete_tx.send(owner);
    }

    /// Request that the next drain drop every component and pending operation.
    pub fn clear(&self) {
        self.clear_requested.store(true, Ordering::Release);
    }

    #[inline]
    pub fn find_index(&self, owner: Entity) -> Option<ComponentIndex> {
        let index = self.index.find(owner.id())?;
        match self.storage.try_get(index) {
            Ok(stored) if stored.owner == owner => Some(index),
            _ => None,
        }
    }

    pub fn find(&self, owner: Entity) -> Option<&T> {
        let index = self.find_index(owner)?;
        Some(&self.storage.get(index).value)
    }

    pub fn find_mut(&mut self, owner: Entity) -> Option<&mut T> {
        let index = self.find_index(owner)?;
        Some(&mut self.storage.get_mut(index).value)
    }

    pub fn has(&self, owner: Entity) -> bool {
        self.find_index(owner).is_some()
    }

    /// Committed components with their owners, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.storage.iter().map(|(_, s)| (s.owner, &s.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> + '_ {
        self.storage.iter_mut().map(|(_, s)| (s.owner, &mut s.value))
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Allocated slots, live or free.
    pub fn slot_count(&self) -> usize {
        self.storage.slot_count()
    }

    pub fn pending_insertions(&self) -> usize {
        self.insert_rx.len()
    }

    pub fn pending_deletions(&self) -> usize {
        self.delete_rx.len()
    }

    /// Apply every operation queued before this call.
    ///
    /// Deletions are resolved first and each freed slot is handed to a
    /// pending insertion when one exists, so a same-tick erase and insert
    /// costs one in-place replace. Operations queued while the drain runs
    /// wait for the next one.
    pub fn process_queued_actions(&mut self, entities: &EntityTable) -> DrainReport {
        let mut report = DrainReport::default();

        if self.clear_requested.swap(false, Ordering::AcqRel) {
            report.discarded += self.delete_rx.try_iter().count();
            report.discarded += self.insert_rx.try_iter().count();
            self.index.clear();
            self.storage.clear();
            report.cleared = true;
        } else {
            let mut deletions = self.delete_rx.len();
            let mut insertions = self.insert_rx.len();

            let mut batch = Vec::with_capacity(self.settings.deletion_batch.max(1));
            while deletions > 0 {
                batch.extend(
                    self.delete_rx
                        .try_iter()
                        .take(deletions.min(self.settings.deletion_batch.max(1))),
                );
                if batch.is_empty() {
                    break;
                }
                deletions -= batch.len();
                for owner in batch.drain(..) {
                    self.resolve_deletion(owner, &mut insertions, entities, &mut report);
                }
            }

            let mut batch = Vec::with_capacity(self.settings.insertion_batch.max(1));
            while insertions > 0 {
                batch.extend(
                    self.insert_rx
                        .try_iter()
                        .take(insertions.min(self.settings.insertion_batch.max(1))),
                );
                if batch.is_empty() {
                    break;
                }
                insertions -= batch.len();
                for insertion in batch.drain(..) {
                    self.commit_insertion(insertion, entities, &mut report);
                }
            }
        }

        if report.cleared || self.unoptimized_deletes > self.settings.compaction_threshold {
            self.unoptimized_deletes = 0;
            self.index.shrink_to_fit();
            self.storage.shrink_to_fit();
            report.compacted = true;
        }

        if !report.is_empty() {
            trace!(component = T::NAME, ?report, live = self.storage.len(), "drained queue");
        }
        report
    }

    fn resolve_deletion(
        &mut self,
        owner: Entity,
        insertions: &mut usize,
        entities: &EntityTable,
        report: &mut DrainReport,
    ) {
        let Some(index) = self.index.find(owner.id()) else {
            return;
        };
        let current = self.storage.get(index).owner;
        if current != owner {
            warn!(
                component = T::NAME,
                %owner,
                %current,
                "discarding deletion for a slot owned by another generation"
            );
            report.discarded += 1;
            return;
        }
        self.index.detach(owner.id());
        report.erased += 1;

        let paired = if *insertions > 0 {
            self.insert_rx.try_recv().ok()
        } else {
            None
        };
        let Some(insertion) = paired else {
            self.storage.erase(index);
            self.unoptimized_deletes += 1;
            return;
        };
        *insertions -= 1;

        if !entities.validate(insertion.owner) {
            warn!(
                component = T::NAME,
                owner = %insertion.owner,
                "discarding insertion for a destroyed entity"
            );
            report.discarded += 1;
            self.storage.erase(index);
            self.unoptimized_deletes += 1;
            return;
        }

        let stored = Stored {
            owner: insertion.owner,
            value: insertion.value,
        };
        match self.index.find(insertion.owner.id()) {
            Some(existing) => {
                self.storage.replace(existing, stored);
                self.storage.erase(index);
                self.unoptimized_deletes += 1;
                report.replaced += 1;
            }
            None => {
                self.storage.replace(index, stored);
                self.index.attach(insertion.owner.id(), index);
                report.inserted += 1;
            }
        }
    }

    fn commit_insertion(
        &mut self,
        insertion: Insertion<T>,
        entities: &EntityTable,
        report: &mut DrainReport,
    ) {
        if !entities.validate(insertion.owner) {
            warn!(
                component = T::NAME,
                owner = %insertion.owner,
                "discarding insertion for a destroyed entity"
            );
            report.discarded += 1;
            return;
        }

        let stored = Stored {
            owner: insertion.owner,
            value: insertion.value,
        };
        match self.index.find(insertion.owner.id()) {
            Some(existing) => {
                self.storage.replace(existing, stored);
                report.replaced += 1;
            }
            None => {
                let (_, index) = self.storage.emplace(stored);
                self.index.attach(insertion.owner.id(), index);
                report.inserted += 1;
            }
        }
    }
}

/// Type-erased view of a [`ComponentContainer`] held by the world.
pub trait ErasedContainer: Send + Sync {
    fn component_type(&self) -> ComponentTypeId;

    fn name(&self) -> &'static str;

    fn has(&self, owner: Entity) -> bool;

    fn erase(&self, owner: Entity);

    fn clear(&self);

    /// Build a component from `value` and queue it for `owner`.
    ///
    /// Returns `Ok(false)` when the component type does not restore from
    /// serialized data.
    fn restore(
        &self,
        value: &Value,
        ctx: &LoadContext<'_>,
        owner: Entity,
    ) -> Result<bool, SerializeError>;

    fn save(&self, owner: Entity, ctx: &SaveContext<'_>) -> Result<Option<Value>, SerializeError>;

    fn process_queued_actions(&mut self, entities: &EntityTable) -> DrainReport;

    fn len(&self) -> usize;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedContainer for ComponentContainer<T> {
    fn component_type(&self) -> ComponentTypeId {
        component_type_id::<T>()
    }

    fn name(&self) -> &'static str {
        T::NAME
    }

    fn has(&self, owner: Entity) -> bool {
        ComponentContainer::has(self, owner)
    }

    fn erase(&self, owner: Entity) {
        ComponentContainer::erase(self, owner);
    }

    fn clear(&self) {
        ComponentContainer::clear(self);
    }

    fn restore(
        &self,
        value: &Value,
        ctx: &LoadContext<'_>,
        owner: Entity,
    ) -> Result<bool, SerializeError> {
        match T::load(value, ctx, owner)? {
            Some(component) => {
                self.emplace(owner, component);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn save(&self, owner: Entity, ctx: &SaveContext<'_>) -> Result<Option<Value>, SerializeError> {
        match self.find(owner) {
            Some(component) => component.save(ctx),
            None => Ok(None),
        }
    }

    fn process_queued_actions(&mut self, entities: &EntityTable) -> DrainReport {
        ComponentContainer::process_queued_actions(self, entities)
    }

    fn len(&self) -> usize {
        ComponentContainer::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
