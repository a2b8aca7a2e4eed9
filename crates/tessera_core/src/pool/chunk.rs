use super::ComponentIndex;

/// One storage cell. Free cells carry the next link of the free list.
pub(crate) enum Slot<T> {
    Occupied(T),
    Free { next: Option<ComponentIndex> },
}

impl<T> Slot<T> {
    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self, Slot::Free { .. })
    }
}

/// Fixed-capacity run of slots. Slots are only ever appended at the end
/// until the chunk is full; freed slots stay in place.
pub(crate) struct Chunk<T> {
    slots: Vec<Slot<T>>,
    rows: usize,
}

impl<T> Chunk<T> {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            slots: Vec::with_capacity(rows),
            rows,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.rows
    }

    /// Append an occupied slot, returning its local index.
    #[inline]
    pub fn push(&mut self, value: T) -> usize {
        debug_assert!(!self.is_full());
        self.slots.push(Slot::Occupied(value));
        self.slots.len() - 1
    }

    #[inline]
    pub fn slot(&self, local: usize) -> Option<&Slot<T>> {
        self.slots.get(local)
    }

    pub fn slots(&self) -> &[Slot<T>] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Slot<T>] {
        &mut self.slots
    }

    /// Drop trailing free slots. Returns how many were removed.
    pub fn truncate_free_tail(&mut self) -> usize {
        let before = self.slots.len();
        while self.slots.last().map_or(false, Slot::is_free) {
            self.slots.pop();
        }
        before - self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
