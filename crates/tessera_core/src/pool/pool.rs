use super::chunk::{Chunk, Slot};
use super::{ComponentIndex, PoolError};

/// Chunked slot pool that hides individual chunks and acts like a sparse array.
///
/// Indices handed out by [`Pool::emplace`] stay valid until the value is
/// erased. `erase` never moves other values; it links the slot into the free
/// list so the next `emplace` reuses it. Only [`Pool::shrink_to_fit`] releases
/// memory, and it does so without relocating live values.
pub struct Pool<T> {
    chunk_size: usize,
    shift: u32,
    mask: usize,
    chunks: Vec<Chunk<T>>,
    free_head: Option<ComponentIndex>,
    len: usize,
}

impl<T> Pool<T> {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(
            chunk_size.is_power_of_two() && chunk_size > 0,
            "pool chunk size must be a non-zero power of two, got {chunk_size}"
        );
        Self {
            chunk_size,
            shift: chunk_size.trailing_zeros(),
            mask: chunk_size - 1,
            chunks: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    fn chunk_of(&self, index: ComponentIndex) -> usize {
        index as usize >> self.shift
    }

    #[inline]
    fn local_of(&self, index: ComponentIndex) -> usize {
        index as usize & self.mask
    }

    #[inline]
    fn global_of(&self, chunk: usize, local: usize) -> ComponentIndex {
        let gidx = (chunk << self.shift) | local;
        ComponentIndex::try_from(gidx)
            .unwrap_or_else(|_| panic!("pool exhausted: slot {gidx} exceeds the index range"))
    }

    /// Number of live values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots currently backed by memory, live or free.
    pub fn slot_count(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn slot(&self, index: ComponentIndex) -> Result<&Slot<T>, PoolError> {
        self.chunks
            .get(self.chunk_of(index))
            .and_then(|chunk| chunk.slot(self.local_of(index)))
            .ok_or_else(|| PoolError::IndexOutOfBounds {
                index,
                slots: self.slot_count(),
            })
    }

    fn slot_mut(&mut self, index: ComponentIndex) -> Result<&mut Slot<T>, PoolError> {
        let (chunk, local) = (self.chunk_of(index), self.local_of(index));
        let in_range = self
            .chunks
            .get(chunk)
            .map_or(false, |chunk| local < chunk.len());
        if !in_range {
            return Err(PoolError::IndexOutOfBounds {
                index,
                slots: self.slot_count(),
            });
        }
        Ok(&mut self.chunks[chunk].slots_mut()[local])
    }

    /// Store `value`, reusing the most recently freed slot if there is one.
    pub fn emplace(&mut self, value: T) -> (&mut T, ComponentIndex) {
        let index = match self.free_head {
            Some(index) => {
                let slot = self
                    .slot_mut(index)
                    .unwrap_or_else(|e| panic!("corrupted pool free list: {e}"));
                match std::mem::replace(slot, Slot::Occupied(value)) {
                    Slot::Free { next } => self.free_head = next,
                    Slot::Occupied(_) => {
                        panic!("corrupted pool free list: slot {index} is occupied")
                    }
                }
                index
            }
            None => self.append(value),
        };
        self.len += 1;
        (self.occupied_mut(index), index)
    }

    fn append(&mut self, value: T) -> ComponentIndex {
        let needs_chunk = self.chunks.last().map_or(true, Chunk::is_full);
        if needs_chunk {
            self.chunks.push(Chunk::with_capacity(self.chunk_size));
        }
        let chunk = self.chunks.len() - 1;
        let local = self.chunks[chunk].push(value);
        self.global_of(chunk, local)
    }

    fn occupied_mut(&mut self, index: ComponentIndex) -> &mut T {
        match self.slot_mut(index) {
            Ok(Slot::Occupied(value)) => value,
            Ok(Slot::Free { .. }) => panic!("{}", PoolError::FreedSlot { index }),
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_get(&self, index: ComponentIndex) -> Result<&T, PoolError> {
        match self.slot(index)? {
            Slot::Occupied(value) => Ok(value),
            Slot::Free { .. } => Err(PoolError::FreedSlot { index }),
        }
    }

    pub fn try_get_mut(&mut self, index: ComponentIndex) -> Result<&mut T, PoolError> {
        match self.slot_mut(index)? {
            Slot::Occupied(value) => Ok(value),
            Slot::Free { .. } => Err(PoolError::FreedSlot { index }),
        }
    }

    /// # Panics
    /// If `index` is out of range or refers to a freed slot.
    #[track_caller]
    pub fn get(&self, index: ComponentIndex) -> &T {
        self.try_get(index).unwrap_or_else(|e| panic!("{e}"))
    }

    /// # Panics
    /// If `index` is out of range or refers to a freed slot.
    #[track_caller]
    pub fn get_mut(&mut self, index: ComponentIndex) -> &mut T {
        self.try_get_mut(index).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Overwrite a live value in place, returning the previous one.
    ///
    /// # Panics
    /// If `index` is out of range or refers to a freed slot.
    #[track_caller]
    pub fn replace(&mut self, index: ComponentIndex, value: T) -> T {
        std::mem::replace(self.get_mut(index), value)
    }

    /// Free a slot and return its value. Other indices are unaffected.
    ///
    /// # Panics
    /// If `index` is out of range or refers to a freed slot.
    #[track_caller]
    pub fn erase(&mut self, index: ComponentIndex) -> T {
        let next = self.free_head;
        let slot = self.slot_mut(index).unwrap_or_else(|e| panic!("{e}"));
        if slot.is_free() {
            panic!("{}", PoolError::FreedSlot { index });
        }
        let Slot::Occupied(value) = std::mem::replace(slot, Slot::Free { next }) else {
            unreachable!("slot {index} checked occupied above");
        };
        self.free_head = Some(index);
        self.len -= 1;
        value
    }

    /// Drop every value. The first chunk's allocation is kept for reuse.
    pub fn clear(&mut self) {
        self.chunks.truncate(1);
        if let Some(chunk) = self.chunks.first_mut() {
            chunk.clear();
        }
        self.free_head = None;
        self.len = 0;
    }

    /// Release trailing free slots and empty chunks, then relink the free
    /// list in ascending order so new values fill the lowest holes first.
    ///
    /// Live values are never moved. Must not run while a drain or an
    /// external iteration is in progress, which `&mut self` enforces.
    pub fn shrink_to_fit(&mut self) {
        while let Some(chunk) = self.chunks.last_mut() {
            chunk.truncate_free_tail();
            if chunk.is_empty() {
                self.chunks.pop();
            } else {
                break;
            }
        }
        self.chunks.shrink_to_fit();

        let shift = self.shift;
        let mut head = None;
        for (c, chunk) in self.chunks.iter_mut().enumerate().rev() {
            for (l, slot) in chunk.slots_mut().iter_mut().enumerate().rev() {
                if let Slot::Free { next } = slot {
                    *next = head;
                    head = Some(((c << shift) | l) as ComponentIndex);
                }
            }
        }
        self.free_head = head;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            shift: self.shift,
            chunks: self.chunks.iter().enumerate(),
            current: None,
            remaining: self.len,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            shift: self.shift,
            chunks: self.chunks.iter_mut().enumerate(),
            current: None,
            remaining: self.len,
        }
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::with_chunk_size(super::DEFAULT_CHUNK_SIZE)
    }
}

/// Iterator over `(index, &value)` for every live slot, in index order.
pub struct Iter<'a, T> {
    shift: u32,
    chunks: std::iter::Enumerate<std::slice::Iter<'a, Chunk<T>>>,
    current: Option<(usize, std::iter::Enumerate<std::slice::Iter<'a, Slot<T>>>)>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (ComponentIndex, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((c, slots)) = &mut self.current {
                for (l, slot) in slots.by_ref() {
                    if let Slot::Occupied(value) = slot {
                        self.remaining -= 1;
                        return Some((((*c << self.shift) | l) as ComponentIndex, value));
                    }
                }
            }
            let (c, chunk) = self.chunks.next()?;
            self.current = Some((c, chunk.slots().iter().enumerate()));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// Iterator over `(index, &mut value)` for every live slot, in index order.
pub struct IterMut<'a, T> {
    shift: u32,
    chunks: std::iter::Enumerate<std::slice::IterMut<'a, Chunk<T>>>,
    current: Option<(usize, std::iter::Enumerate<std::slice::IterMut<'a, Slot<T>>>)>,
    remaining: usize,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = (ComponentIndex, &'a mut T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((c, slots)) = &mut self.current {
                for (l, slot) in slots.by_ref() {
                    if let Slot::Occupied(value) = slot {
                        self.remaining -= 1;
                        return Some((((*c << self.shift) | l) as ComponentIndex, value));
                    }
                }
            }
            let (c, chunk) = self.chunks.next()?;
            self.current = Some((c, chunk.slots_mut().iter_mut().enumerate()));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emplace_hands_out_sequential_indices_across_chunks() {
        let mut pool = Pool::with_chunk_size(4);
        let indices: Vec<_> = (0..6).map(|v| pool.emplace(v).1).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(pool.chunk_count(), 2);
        assert_eq!(pool.len(), 6);
        assert_eq!(*pool.get(5), 5);
    }

    #[test]
    fn erase_keeps_other_indices_stable_and_reuses_slot() {
        let mut pool = Pool::with_chunk_size(4);
        let (_, a) = pool.emplace("a");
        let (_, b) = pool.emplace("b");
        let (_, c) = pool.emplace("c");

        assert_eq!(pool.erase(b), "b");
        assert_eq!(*pool.get(a), "a");
        assert_eq!(*pool.get(c), "c");
        assert_eq!(pool.slot_count(), 3);

        let (_, d) = pool.emplace("d");
        assert_eq!(d, b, "freed slot is reused first");
        assert_eq!(pool.slot_count(), 3);
    }

    #[test]
    fn replace_swaps_value_in_place() {
        let mut pool = Pool::with_chunk_size(2);
        let (_, idx) = pool.emplace(String::from("old"));
        let old = pool.replace(idx, String::from("new"));
        assert_eq!(old, "old");
        assert_eq!(pool.get(idx), "new");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn try_get_reports_freed_and_out_of_range() {
        let mut pool = Pool::with_chunk_size(2);
        let (_, idx) = pool.emplace(1u8);
        pool.erase(idx);
        assert_eq!(pool.try_get(idx), Err(PoolError::FreedSlot { index: idx }));
        assert!(matches!(
            pool.try_get(99),
            Err(PoolError::IndexOutOfBounds { index: 99, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "freed slot")]
    fn get_on_freed_slot_panics() {
        let mut pool = Pool::with_chunk_size(2);
        let (_, idx) = pool.emplace(1u8);
        pool.erase(idx);
        pool.get(idx);
    }

    #[test]
    #[should_panic(expected = "freed slot")]
    fn double_erase_panics() {
        let mut pool = Pool::with_chunk_size(2);
        let (_, idx) = pool.emplace(1u8);
        pool.erase(idx);
        pool.erase(idx);
    }

    #[test]
    fn shrink_releases_tail_without_moving_live_values() {
        let mut pool = Pool::with_chunk_size(4);
        let indices: Vec<_> = (0..10).map(|v| pool.emplace(v).1).collect();
        for &idx in &indices[6..] {
            pool.erase(idx);
        }
        pool.erase(indices[1]);
        pool.erase(indices[3]);

        pool.shrink_to_fit();

        assert_eq!(pool.chunk_count(), 2);
        assert_eq!(pool.slot_count(), 6);
        assert_eq!(*pool.get(indices[5]), 5);
        assert_eq!(*pool.get(indices[0]), 0);

        // Free list now starts at the lowest hole.
        assert_eq!(pool.emplace(100).1, 1);
        assert_eq!(pool.emplace(101).1, 3);
        assert_eq!(pool.emplace(102).1, 6);
    }

    #[test]
    fn iter_visits_live_values_in_index_order() {
        let mut pool = Pool::with_chunk_size(2);
        for v in 0..5 {
            pool.emplace(v);
        }
        pool.erase(1);
        pool.erase(2);

        let seen: Vec<_> = pool.iter().map(|(i, v)| (i, *v)).collect();
        assert_eq!(seen, vec![(0, 0), (3, 3), (4, 4)]);
        assert_eq!(pool.iter().len(), 3);

        for (_, v) in pool.iter_mut() {
            *v *= 10;
        }
        assert_eq!(*pool.get(4), 40);
    }

    #[test]
    fn clear_drops_everything() {
        let mut pool = Pool::with_chunk_size(2);
        for v in 0..5 {
            pool.emplace(v);
        }
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.slot_count(), 0);
        assert_eq!(pool.emplace(7).1, 0);
    }
}
