//! Reference-counted tile cache with least-recently-unused eviction.
//!
//! Many producers share one cache and its storages; tiles are keyed by
//! [`TileId`], so each identity is resident at most once. A tile whose user
//! count drops to zero stays resident and joins the *unused* sequence, from
//! which the oldest entry is evicted when a new tile needs slots.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::task::CancelOutcome;
use crate::{
    CacheConfig, Job, ProducerId, Scheduler, SlotRef, Task, Tile, TileError, TileId,
    TileProducer, TileStorage,
};

/// Snapshot of cache occupancy and counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Tiles holding slots.
    pub resident: usize,
    /// Resident tiles with at least one user.
    pub used: usize,
    /// Resident tiles waiting in the eviction sequence.
    pub unused: usize,
    /// Slots per storage.
    pub capacity: usize,
    /// `get_tile` calls answered by a resident tile.
    pub hits: u64,
    /// `get_tile` calls that created a tile.
    pub misses: u64,
    /// Tiles evicted to make room.
    pub evictions: u64,
}

/// Shape of one storage layer, fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    /// Storage name.
    pub name: String,
    /// Slot width and height in pixels.
    pub tile_size: u32,
    /// Floats per pixel.
    pub channels: u32,
}

/// A tile taken out of the cache by eviction. Dropped only after the cache
/// lock is released, since its task's job may hold handles into this cache.
struct Evicted {
    _tile: Arc<Tile>,
    _job: Option<Job>,
}

struct CacheState {
    storages: Vec<Box<dyn TileStorage>>,
    tiles: FxHashMap<TileId, Arc<Tile>>,
    /// Eviction order: sequence number → tile, oldest first.
    unused: BTreeMap<u64, TileId>,
    unused_seq: FxHashMap<TileId, u64>,
    next_seq: u64,
    producers: BTreeMap<ProducerId, Weak<dyn TileProducer>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn push_unused(&mut self, id: TileId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.unused.insert(seq, id);
        self.unused_seq.insert(id, seq);
    }

    fn take_from_unused(&mut self, id: TileId) {
        if let Some(seq) = self.unused_seq.remove(&id) {
            self.unused.remove(&seq);
        }
    }

    /// Evict the oldest unused tile whose task is not running.
    fn evict_oldest(&mut self) -> Option<Evicted> {
        let mut victim = None;
        for (&seq, id) in &self.unused {
            let Some(tile) = self.tiles.get(id) else {
                continue;
            };
            let job = match tile.task().map(|task| task.try_cancel()) {
                // A running job is still writing into the slots.
                Some(CancelOutcome::Running) => continue,
                Some(CancelOutcome::Cancelled(job)) => job,
                Some(CancelOutcome::Finished) | None => None,
            };
            victim = Some((seq, *id, job));
            break;
        }

        let (seq, id, job) = victim?;
        self.unused.remove(&seq);
        self.unused_seq.remove(&id);
        let tile = self.tiles.remove(&id)?;
        for (storage, slot) in self.storages.iter_mut().zip(tile.slots()) {
            storage.release_slot(slot.clone());
        }
        self.evictions += 1;
        debug!(evicted = %id, resident = self.tiles.len(), "tile evicted");
        Some(Evicted {
            _tile: tile,
            _job: job,
        })
    }

    /// One slot from every storage, or `None` (with nothing held) if any is empty.
    fn allocate_slots(&mut self) -> Option<Vec<SlotRef>> {
        let mut slots = Vec::with_capacity(self.storages.len());
        for i in 0..self.storages.len() {
            match self.storages[i].allocate_slot() {
                Some(slot) => slots.push(slot),
                None => {
                    for (j, slot) in slots.into_iter().enumerate() {
                        self.storages[j].release_slot(slot);
                    }
                    return None;
                }
            }
        }
        Some(slots)
    }
}

/// The resident-tile registry shared by a set of producers.
pub struct TileCache {
    name: String,
    capacity: usize,
    layers: Vec<LayerInfo>,
    scheduler: Arc<Scheduler>,
    next_producer: AtomicU32,
    state: Mutex<CacheState>,
}

impl TileCache {
    /// Build a cache over `storages`, which must all have the same capacity.
    ///
    /// New tiles' tasks are submitted to `scheduler`.
    pub fn new(
        name: impl Into<String>,
        storages: Vec<Box<dyn TileStorage>>,
        scheduler: Arc<Scheduler>,
    ) -> Result<Self, TileError> {
        let Some(first) = storages.first() else {
            return Err(TileError::StorageMismatch("a cache needs at least one storage".into()));
        };
        let capacity = first.capacity();
        if let Some(odd) = storages.iter().find(|s| s.capacity() != capacity) {
            return Err(TileError::StorageMismatch(format!(
                "storage '{}' has capacity {}, expected {capacity}",
                odd.name(),
                odd.capacity()
            )));
        }
        let layers = storages
            .iter()
            .map(|s| LayerInfo {
                name: s.name().to_string(),
                tile_size: s.tile_size(),
                channels: s.channels(),
            })
            .collect();

        Ok(Self {
            name: name.into(),
            capacity,
            layers,
            scheduler,
            next_producer: AtomicU32::new(0),
            state: Mutex::new(CacheState {
                storages,
                tiles: FxHashMap::default(),
                unused: BTreeMap::new(),
                unused_seq: FxHashMap::default(),
                next_seq: 0,
                producers: BTreeMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        })
    }

    /// Build a cache with host-memory storages described by `config`.
    pub fn from_config(
        name: impl Into<String>,
        config: &CacheConfig,
        scheduler: Arc<Scheduler>,
    ) -> Result<Self, TileError> {
        Self::new(name, config.build_storages(), scheduler)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache name, for logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slots per storage and upper bound on resident tiles.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Storage layers in slot order.
    #[must_use]
    pub fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    /// Slot size of storage `layer`.
    #[must_use]
    pub fn tile_size(&self, layer: usize) -> Option<u32> {
        self.layers.get(layer).map(|l| l.tile_size)
    }

    /// Index of the storage called `name`.
    #[must_use]
    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    /// Scheduler receiving this cache's tasks.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Reserve the next producer id. Ids increase and are never reused.
    pub fn next_producer_id(&self) -> ProducerId {
        ProducerId(self.next_producer.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `producer` under `id`, obtained from [`next_producer_id`](Self::next_producer_id).
    pub fn insert_producer(
        &self,
        id: ProducerId,
        producer: Weak<dyn TileProducer>,
    ) -> Result<(), TileError> {
        if id.0 >= self.next_producer.load(Ordering::Relaxed) {
            return Err(TileError::UnknownProducer(id));
        }
        let mut state = self.lock();
        if state.producers.contains_key(&id) {
            return Err(TileError::DuplicateProducer(id));
        }
        state.producers.insert(id, producer);
        Ok(())
    }

    /// The live producer registered under `id`.
    #[must_use]
    pub fn producer(&self, id: ProducerId) -> Option<Arc<dyn TileProducer>> {
        self.lock().producers.get(&id).and_then(Weak::upgrade)
    }

    /// Acquire the tile `(producer, level, tx, ty)`, creating it on a miss.
    ///
    /// Every successful call must be paired with one [`put_tile`](Self::put_tile);
    /// [`TileHandle`](crate::TileHandle) does this automatically.
    pub fn get_tile(
        &self,
        producer: ProducerId,
        level: u8,
        tx: u32,
        ty: u32,
    ) -> Result<Arc<Tile>, TileError> {
        let id = TileId::new(producer, level, tx, ty);
        let mut evicted = None;
        let mut stale_task: Option<Arc<Task>> = None;

        let acquired = {
            let mut state = self.lock();
            match state.producers.get(&producer).and_then(Weak::upgrade) {
                None => Err(TileError::UnknownProducer(producer)),
                Some(owner) => {
                    if let Some(tile) = state.tiles.get(&id).cloned() {
                        state.hits += 1;
                        if tile.users() == 0 {
                            state.take_from_unused(id);
                        }
                        tile.add_user();
                        stale_task = tile.take_broken_task();
                        let produce = stale_task.is_some();
                        if produce {
                            debug!(tile = %id, "re-producing tile after cancelled or failed task");
                        }
                        Ok((tile, owner, produce))
                    } else {
                        state.misses += 1;
                        if state.tiles.len() >= self.capacity {
                            evicted = state.evict_oldest();
                        }
                        match state.allocate_slots() {
                            None => Err(TileError::ResourceExhausted {
                                producer,
                                level,
                                tx,
                                ty,
                                capacity: self.capacity,
                            }),
                            Some(slots) => {
                                let tile = Arc::new(Tile::new(id, slots));
                                tile.add_user();
                                state.tiles.insert(id, Arc::clone(&tile));
                                debug!(tile = %id, resident = state.tiles.len(), "tile created");
                                Ok((tile, owner, true))
                            }
                        }
                    }
                }
            }
        };
        drop(evicted);
        drop(stale_task);

        let (tile, owner, produce) = acquired.inspect_err(|e| {
            if matches!(e, TileError::ResourceExhausted { .. }) {
                warn!(cache = %self.name, tile = %id, "tile cache exhausted");
            }
        })?;

        if produce {
            // Outside the lock: the producer may acquire dependency tiles from this cache.
            let task = owner.create_tile(&tile);
            tile.set_task(Arc::clone(&task));
            self.scheduler.submit(task);
        }
        Ok(tile)
    }

    /// Release one acquisition of `tile`. At zero users it becomes the most
    /// recently unused tile.
    ///
    /// A double release is a reference-counting bug: it returns
    /// [`TileError::DoubleRelease`] and panics in debug builds.
    pub fn put_tile(&self, tile: &Tile) -> Result<(), TileError> {
        let id = tile.id();
        let result = {
            let mut state = self.lock();
            let resident = state
                .tiles
                .get(&id)
                .is_some_and(|r| std::ptr::eq(Arc::as_ptr(r), tile));
            if !resident {
                Err(TileError::ForeignTile { id })
            } else {
                match tile.remove_user() {
                    None => Err(TileError::DoubleRelease { id }),
                    Some(0) => {
                        state.push_unused(id);
                        Ok(())
                    }
                    Some(_) => Ok(()),
                }
            }
        };
        debug_assert!(
            !matches!(result, Err(TileError::DoubleRelease { .. })),
            "double release of tile {id}"
        );
        result
    }

    /// Look up a resident tile without acquiring it.
    ///
    /// With `include_unused == false`, tiles without users are skipped. The
    /// returned tile may be evicted at any time after the call.
    #[must_use]
    pub fn find_tile(
        &self,
        producer: ProducerId,
        level: u8,
        tx: u32,
        ty: u32,
        include_unused: bool,
    ) -> Option<Arc<Tile>> {
        let state = self.lock();
        let tile = state.tiles.get(&TileId::new(producer, level, tx, ty))?;
        if !include_unused && tile.users() == 0 {
            return None;
        }
        Some(Arc::clone(tile))
    }

    /// Unused tiles in eviction order, oldest first.
    #[must_use]
    pub fn unused_tiles(&self) -> Vec<TileId> {
        self.lock().unused.values().copied().collect()
    }

    /// Current occupancy and counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let resident = state.tiles.len();
        let unused = state.unused.len();
        CacheStats {
            resident,
            used: resident - unused,
            unused,
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskState;
    use crate::testing::{FillProducer, fill_producer, test_cache};

    #[test]
    fn test_same_identity_returns_same_tile() {
        let cache = test_cache(4);
        let producer = fill_producer(&cache, 1.0);

        let a = cache.get_tile(producer.id(), 2, 1, 3).unwrap();
        let b = cache.get_tile(producer.id(), 2, 1, 3).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.slots()[0].same_slot(&b.slots()[0]));
        assert_eq!(a.users(), 2);
        assert_eq!(cache.stats().resident, 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(producer.runs(), 0);

        cache.scheduler().run_until_idle(4);
        assert_eq!(producer.runs(), 1, "one production per identity");
    }

    #[test]
    fn test_reference_balance() {
        let cache = test_cache(4);
        let producer = fill_producer(&cache, 1.0);

        let tiles: Vec<_> = (0..3)
            .map(|i| cache.get_tile(producer.id(), 1, i % 2, i / 2).unwrap())
            .collect();
        let again = cache.get_tile(producer.id(), 1, 0, 0).unwrap();
        assert_eq!(cache.stats().used, 3);

        for tile in tiles.iter().chain(std::iter::once(&again)) {
            cache.put_tile(tile).unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.used, 0);
        assert_eq!(stats.unused, 3);
        assert!(tiles.iter().all(|t| t.users() == 0));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "double release"))]
    fn test_double_release_is_reported() {
        let cache = test_cache(2);
        let producer = fill_producer(&cache, 1.0);
        let tile = cache.get_tile(producer.id(), 0, 0, 0).unwrap();
        cache.put_tile(&tile).unwrap();
        let second = cache.put_tile(&tile);
        assert!(matches!(second, Err(TileError::DoubleRelease { .. })));
        assert_eq!(tile.users(), 0);
    }

    #[test]
    fn test_capacity_two_scenario() {
        let cache = test_cache(2);
        let producer = fill_producer(&cache, 1.0);
        let p = producer.id();

        let a = cache.get_tile(p, 1, 0, 0).unwrap();
        let b = cache.get_tile(p, 1, 1, 0).unwrap();

        // Both in use: no room for C.
        let err = cache.get_tile(p, 1, 0, 1).unwrap_err();
        assert!(matches!(err, TileError::ResourceExhausted { capacity: 2, .. }));
        assert_eq!(cache.stats().resident, 2);

        cache.put_tile(&a).unwrap();
        cache.put_tile(&b).unwrap();
        let c = cache.get_tile(p, 1, 0, 1).unwrap();

        // A was released first, so A is the one evicted.
        assert!(cache.find_tile(p, 1, 0, 0, true).is_none());
        assert!(cache.find_tile(p, 1, 1, 0, true).is_some());
        assert!(Arc::ptr_eq(&cache.find_tile(p, 1, 0, 1, false).unwrap(), &c));
        assert_eq!(cache.stats().resident, 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_order() {
        let cache = test_cache(3);
        let producer = fill_producer(&cache, 1.0);
        let p = producer.id();

        let t1 = cache.get_tile(p, 2, 0, 0).unwrap();
        let t2 = cache.get_tile(p, 2, 1, 0).unwrap();
        let t3 = cache.get_tile(p, 2, 2, 0).unwrap();
        for t in [&t1, &t2, &t3] {
            cache.put_tile(t).unwrap();
        }
        assert_eq!(cache.unused_tiles(), vec![t1.id(), t2.id(), t3.id()]);

        let mut evicted_in_order = Vec::new();
        for i in 0..3 {
            let resident_before: Vec<_> = [&t1, &t2, &t3]
                .iter()
                .filter(|t| cache.find_tile(p, 2, t.tx(), 0, true).is_some())
                .map(|t| t.id())
                .collect();
            let _fresh = cache.get_tile(p, 3, i, 7).unwrap();
            let gone = resident_before
                .into_iter()
                .find(|id| cache.find_tile(p, id.level, id.tx, id.ty, true).is_none());
            evicted_in_order.extend(gone);
        }
        assert_eq!(evicted_in_order, vec![t1.id(), t2.id(), t3.id()]);
    }

    #[test]
    fn test_reacquire_removes_from_unused_sequence() {
        let cache = test_cache(2);
        let producer = fill_producer(&cache, 1.0);
        let p = producer.id();

        let a = cache.get_tile(p, 0, 0, 0).unwrap();
        let b = cache.get_tile(p, 1, 0, 0).unwrap();
        cache.put_tile(&a).unwrap();
        cache.put_tile(&b).unwrap();

        // Re-acquiring A protects it; B becomes the only candidate.
        let a_again = cache.get_tile(p, 0, 0, 0).unwrap();
        assert!(Arc::ptr_eq(&a, &a_again));
        assert_eq!(cache.unused_tiles(), vec![b.id()]);

        cache.get_tile(p, 1, 1, 1).unwrap();
        assert!(cache.find_tile(p, 0, 0, 0, true).is_some());
        assert!(cache.find_tile(p, 1, 0, 0, true).is_none());
    }

    #[test]
    fn test_eviction_never_touches_used_tiles() {
        let cache = test_cache(3);
        let producer = fill_producer(&cache, 1.0);
        let p = producer.id();
        let held = cache.get_tile(p, 0, 0, 0).unwrap();

        // Churn many tiles through the remaining two slots.
        for i in 0..20 {
            let t = cache.get_tile(p, 5, i, i).unwrap();
            cache.put_tile(&t).unwrap();
            let stats = cache.stats();
            assert!(stats.resident <= stats.capacity);
            assert!(cache.find_tile(p, 0, 0, 0, false).is_some());
        }
        assert_eq!(held.users(), 1);
    }

    #[test]
    fn test_eviction_cancels_pending_task() {
        let cache = test_cache(1);
        let producer = fill_producer(&cache, 1.0);
        let p = producer.id();

        let a = cache.get_tile(p, 0, 0, 0).unwrap();
        let task = a.task().unwrap();
        cache.put_tile(&a).unwrap();
        let _b = cache.get_tile(p, 1, 0, 0).unwrap();

        assert_eq!(task.state(), TaskState::Cancelled);
        cache.scheduler().run_until_idle(4);
        assert_eq!(producer.runs(), 1, "only the new tile is produced");
        assert_eq!(cache.scheduler().stats().cancelled, 1);
    }

    #[test]
    fn test_done_tiles_survive_release_until_evicted() {
        let cache = test_cache(2);
        let producer = fill_producer(&cache, 3.5);
        let p = producer.id();

        let tile = cache.get_tile(p, 0, 0, 0).unwrap();
        cache.scheduler().run_until_idle(4);
        assert!(tile.is_ready());
        cache.put_tile(&tile).unwrap();

        let again = cache.get_tile(p, 0, 0, 0).unwrap();
        assert!(again.is_ready());
        assert_eq!(again.slots()[0].read().get(0, 0, 0), 3.5);
        assert_eq!(producer.runs(), 1);
    }

    #[test]
    fn test_find_tile_filters_unused() {
        let cache = test_cache(2);
        let producer = fill_producer(&cache, 1.0);
        let p = producer.id();
        let tile = cache.get_tile(p, 0, 0, 0).unwrap();
        assert!(cache.find_tile(p, 0, 0, 0, false).is_some());
        cache.put_tile(&tile).unwrap();
        assert!(cache.find_tile(p, 0, 0, 0, false).is_none());
        assert!(cache.find_tile(p, 0, 0, 0, true).is_some());
        assert_eq!(tile.users(), 0, "find_tile does not acquire");
    }

    #[test]
    fn test_producers_share_storage_but_not_identity() {
        let cache = test_cache(4);
        let first = fill_producer(&cache, 1.0);
        let second = fill_producer(&cache, 2.0);
        assert!(second.id() > first.id());

        let a = cache.get_tile(first.id(), 0, 0, 0).unwrap();
        let b = cache.get_tile(second.id(), 0, 0, 0).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!a.slots()[0].same_slot(&b.slots()[0]));

        cache.scheduler().run_until_idle(4);
        assert_eq!(a.slots()[0].read().get(1, 1, 0), 1.0);
        assert_eq!(b.slots()[0].read().get(1, 1, 0), 2.0);
    }

    #[test]
    fn test_unknown_and_duplicate_producers() {
        let cache = test_cache(2);
        assert!(matches!(
            cache.get_tile(ProducerId(9), 0, 0, 0),
            Err(TileError::UnknownProducer(ProducerId(9)))
        ));

        let producer = fill_producer(&cache, 1.0);
        let weak: Weak<dyn TileProducer> = Arc::downgrade(&producer) as Weak<dyn TileProducer>;
        assert!(matches!(
            cache.insert_producer(producer.id(), weak.clone()),
            Err(TileError::DuplicateProducer(_))
        ));
        assert!(matches!(
            cache.insert_producer(ProducerId(1000), weak),
            Err(TileError::UnknownProducer(_))
        ));
    }

    #[test]
    fn test_foreign_tile_rejected() {
        let cache = test_cache(2);
        let other = test_cache(2);
        let producer = fill_producer(&cache, 1.0);
        let _other_producer: Arc<FillProducer> = fill_producer(&other, 1.0);

        let tile = cache.get_tile(producer.id(), 0, 0, 0).unwrap();
        assert!(matches!(other.put_tile(&tile), Err(TileError::ForeignTile { .. })));
        assert_eq!(tile.users(), 1);
    }

    #[test]
    fn test_storage_mismatch() {
        let scheduler = Arc::new(Scheduler::inline(4));
        assert!(matches!(
            TileCache::new("empty", Vec::new(), Arc::clone(&scheduler)),
            Err(TileError::StorageMismatch(_))
        ));
        let storages: Vec<Box<dyn TileStorage>> = vec![
            Box::new(crate::CpuTileStorage::new("a", 4, 1, 2)),
            Box::new(crate::CpuTileStorage::new("b", 4, 1, 3)),
        ];
        assert!(matches!(
            TileCache::new("uneven", storages, scheduler),
            Err(TileError::StorageMismatch(_))
        ));
    }

    #[test]
    fn test_concurrent_requests_share_one_tile() {
        let cache = test_cache(8);
        let producer = fill_producer(&cache, 1.0);
        let p = producer.id();

        let tiles: Vec<Arc<Tile>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| cache.get_tile(p, 4, 2, 2).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(tiles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(tiles[0].users(), 8);
        cache.scheduler().run_until_idle(8);
        assert_eq!(producer.runs(), 1);
    }
}
