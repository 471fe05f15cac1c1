use std::cell::RefCell;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{debug, trace};

use crate::{Chunk, ChunkPos, DirtyFlags};

/// Non-owning reference to a resident chunk.
///
/// Handles are generational: once the chunk is unloaded or evicted the slot's
/// generation moves on and every outstanding handle to it stops resolving,
/// even if the same position is loaded again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkHandle {
    slot: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    chunk: Option<Chunk>,
}

/// In-memory chunk table with an LRU eviction policy.
/// Uses BTreeMap for deterministic iteration order.
///
/// Reads count as use: resolving a handle, even immutably, refreshes the
/// chunk's recency so terrain that is only queried is not evicted first.
pub struct ChunkStorage {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Resident chunks by position, with deterministic key ordering.
    by_pos: BTreeMap<ChunkPos, u32>,
    lru: RefCell<LruCache<ChunkPos, ()>>,
    capacity: usize,
}

impl ChunkStorage {
    /// Create a storage with the desired maximum chunk count.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_pos: BTreeMap::new(),
            lru: RefCell::new(LruCache::new(cap)),
            capacity: cap.get(),
        }
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.by_pos.len()
    }

    /// Returns true when no chunks are currently stored.
    pub fn is_empty(&self) -> bool {
        self.by_pos.is_empty()
    }

    /// Insert a chunk, replacing any chunk already resident at its position.
    ///
    /// Returns the handle of the new chunk.
    pub fn insert(&mut self, mut chunk: Chunk) -> ChunkHandle {
        let pos = chunk.position();
        // Loaded contents are the baseline for change tracking.
        chunk.take_dirty_flags();
        self.unload(pos);
        self.evict_if_needed();

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize].chunk = Some(chunk);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    chunk: Some(chunk),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.by_pos.insert(pos, slot);
        self.touch(pos);
        debug!(%pos, slot, "chunk loaded");
        ChunkHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    /// Remove a chunk, invalidating every handle that refers to it.
    pub fn unload(&mut self, pos: ChunkPos) -> Option<Chunk> {
        let slot = self.by_pos.remove(&pos)?;
        self.lru.get_mut().pop(&pos);
        let entry = &mut self.slots[slot as usize];
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(slot);
        entry.chunk.take()
    }

    /// Handle for the chunk currently resident at `pos`.
    pub fn handle(&self, pos: ChunkPos) -> Option<ChunkHandle> {
        self.by_pos.get(&pos).map(|&slot| ChunkHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        })
    }

    /// Follow a handle back to its chunk, if it is still resident.
    pub fn resolve(&self, handle: ChunkHandle) -> Option<&Chunk> {
        let slot = self.slots.get(handle.slot as usize)?;
        if slot.generation != handle.generation {
            trace!(?handle, "stale chunk handle");
            return None;
        }
        let chunk = slot.chunk.as_ref()?;
        self.lru.borrow_mut().promote(&chunk.position());
        Some(chunk)
    }

    /// Mutable variant of [`ChunkStorage::resolve`].
    pub fn resolve_mut(&mut self, handle: ChunkHandle) -> Option<&mut Chunk> {
        let slot = self.slots.get_mut(handle.slot as usize)?;
        if slot.generation != handle.generation {
            trace!(?handle, "stale chunk handle");
            return None;
        }
        let chunk = slot.chunk.as_mut()?;
        self.lru.get_mut().promote(&chunk.position());
        Some(chunk)
    }

    /// Attempt to fetch a chunk immutably.
    pub fn get(&self, pos: ChunkPos) -> Option<&Chunk> {
        self.handle(pos).and_then(|handle| self.resolve(handle))
    }

    /// Iterate over currently resident chunk positions.
    pub fn iter_positions(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.by_pos.keys().copied()
    }

    /// Collect and clear the dirty flags of every modified chunk, in position order.
    pub fn take_dirty(&mut self) -> Vec<(ChunkPos, DirtyFlags)> {
        let mut dirty = Vec::new();
        for (&pos, &slot) in &self.by_pos {
            if let Some(chunk) = self.slots[slot as usize].chunk.as_mut() {
                let flags = chunk.take_dirty_flags();
                if !flags.is_empty() {
                    dirty.push((pos, flags));
                }
            }
        }
        dirty
    }

    fn touch(&mut self, pos: ChunkPos) {
        self.lru.get_mut().put(pos, ());
    }

    fn evict_if_needed(&mut self) {
        while self.by_pos.len() >= self.capacity {
            let oldest = self.lru.get_mut().pop_lru();
            match oldest {
                Some((oldest, _)) => {
                    debug!(pos = %oldest, "evicting chunk");
                    self.unload(oldest);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Voxel;

    #[test]
    fn storage_evicts_old_chunks() {
        let mut storage = ChunkStorage::new(2);
        let a = ChunkPos::new(0, 0);
        let b = ChunkPos::new(1, 0);
        let c = ChunkPos::new(2, 0);
        storage.insert(Chunk::new(a));
        storage.insert(Chunk::new(b));
        assert_eq!(storage.len(), 2);
        storage.insert(Chunk::new(c));
        assert_eq!(storage.len(), 2);
        // `a` should have been evicted (least recently used).
        assert!(storage.get(a).is_none());
        assert!(storage.get(b).is_some());
        assert!(storage.get(c).is_some());
    }

    #[test]
    fn iter_positions_is_deterministic() {
        let mut storage = ChunkStorage::new(10);

        storage.insert(Chunk::new(ChunkPos::new(5, 5)));
        storage.insert(Chunk::new(ChunkPos::new(1, 2)));
        storage.insert(Chunk::new(ChunkPos::new(3, 0)));
        storage.insert(Chunk::new(ChunkPos::new(0, 0)));
        storage.insert(Chunk::new(ChunkPos::new(2, 1)));

        let order: Vec<_> = storage.iter_positions().collect();
        let expected = vec![
            ChunkPos::new(0, 0),
            ChunkPos::new(1, 2),
            ChunkPos::new(2, 1),
            ChunkPos::new(3, 0),
            ChunkPos::new(5, 5),
        ];
        assert_eq!(order, expected);
    }

    #[test]
    fn handle_resolves_to_resident_chunk() {
        let mut storage = ChunkStorage::new(4);
        let handle = storage.insert(Chunk::new(ChunkPos::new(2, -1)));
        assert_eq!(storage.handle(ChunkPos::new(2, -1)), Some(handle));
        let chunk = storage.resolve(handle).expect("resident");
        assert_eq!(chunk.position(), ChunkPos::new(2, -1));
    }

    #[test]
    fn handle_goes_stale_after_reload() {
        let mut storage = ChunkStorage::new(4);
        let pos = ChunkPos::new(7, 7);
        let old = storage.insert(Chunk::new(pos));
        assert!(storage.unload(pos).is_some());
        assert!(storage.resolve(old).is_none());

        let new = storage.insert(Chunk::new(pos));
        assert_ne!(old, new);
        assert!(storage.resolve(old).is_none());
        assert!(storage.resolve(new).is_some());
    }

    #[test]
    fn evicted_chunk_handle_is_stale() {
        let mut storage = ChunkStorage::new(1);
        let first = storage.insert(Chunk::new(ChunkPos::new(0, 0)));
        storage.insert(Chunk::new(ChunkPos::new(1, 0)));
        assert!(storage.resolve(first).is_none());
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn get_returns_none_for_missing_chunk() {
        let storage = ChunkStorage::new(2);
        assert!(storage.get(ChunkPos::new(999, 999)).is_none());
    }

    #[test]
    fn reads_refresh_recency() {
        let mut storage = ChunkStorage::new(2);
        let a = ChunkPos::new(0, 0);
        let b = ChunkPos::new(1, 0);
        let c = ChunkPos::new(2, 0);
        let handle = storage.insert(Chunk::new(a));
        storage.insert(Chunk::new(b));

        assert!(storage.resolve(handle).is_some());
        storage.insert(Chunk::new(c));

        assert!(storage.get(a).is_some());
        assert!(storage.get(b).is_none());
        assert!(storage.get(c).is_some());
    }

    #[test]
    fn take_dirty_reports_modified_chunks_once() {
        let mut storage = ChunkStorage::new(4);
        let mut generated = Chunk::new(ChunkPos::new(1, 1));
        generated.fill_layer(0, Voxel::of(1));
        let quiet = storage.insert(generated);
        let busy = storage.insert(Chunk::new(ChunkPos::new(0, 3)));
        assert!(storage.take_dirty().is_empty());

        let chunk = storage.resolve_mut(busy).expect("resident");
        chunk.set_voxel(0, 0, 0, Voxel::of(2));
        assert!(storage.resolve(quiet).is_some());

        assert_eq!(
            storage.take_dirty(),
            vec![(ChunkPos::new(0, 3), DirtyFlags::BLOCKS)]
        );
        assert!(storage.take_dirty().is_empty());
    }
}
