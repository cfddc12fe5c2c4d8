//! Fixed-capacity pools of identically shaped tile slots.
//!
//! A [`TileCache`](crate::TileCache) owns one [`TileStorage`] per logical
//! layer (elevation, normals, color, ...). Every resident tile holds exactly
//! one slot from each storage, so all storages of a cache share a capacity.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Texel buffer of one slot: `tile_size × tile_size` pixels of `channels` floats,
/// stored row-major.
#[derive(Clone, Debug)]
pub struct Slot {
    tile_size: u32,
    channels: u32,
    texels: Vec<f32>,
}

impl Slot {
    /// A zeroed slot.
    #[must_use]
    pub fn new(tile_size: u32, channels: u32) -> Self {
        let len = tile_size as usize * tile_size as usize * channels as usize;
        Self {
            tile_size,
            channels,
            texels: vec![0.0; len],
        }
    }

    /// Width and height in pixels, borders included.
    #[must_use]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Floats per pixel.
    #[must_use]
    pub fn channels(&self) -> u32 {
        self.channels
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.tile_size && y < self.tile_size);
        (y as usize * self.tile_size as usize + x as usize) * self.channels as usize
    }

    /// Channel values of pixel `(x, y)`.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let o = self.offset(x, y);
        &self.texels[o..o + self.channels as usize]
    }

    /// Mutable channel values of pixel `(x, y)`.
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [f32] {
        let o = self.offset(x, y);
        let c = self.channels as usize;
        &mut self.texels[o..o + c]
    }

    /// Value of channel `c` at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32, c: u32) -> f32 {
        self.texels[self.offset(x, y) + c as usize]
    }

    /// Set channel `c` at `(x, y)`.
    pub fn set(&mut self, x: u32, y: u32, c: u32, value: f32) {
        let o = self.offset(x, y) + c as usize;
        self.texels[o] = value;
    }

    /// Overwrite every texel with `value`.
    pub fn fill(&mut self, value: f32) {
        self.texels.fill(value);
    }

    /// All texels, row-major.
    #[must_use]
    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    /// All texels, row-major, mutable.
    pub fn texels_mut(&mut self) -> &mut [f32] {
        &mut self.texels
    }

    /// Raw bytes for upload to a render backend.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

/// Shared handle to one storage slot.
///
/// Cloning the handle does not copy texels. The cache guarantees a slot is
/// bound to at most one resident tile at a time.
#[derive(Clone, Debug)]
pub struct SlotRef {
    index: u32,
    data: Arc<RwLock<Slot>>,
}

impl SlotRef {
    fn new(index: u32, slot: Slot) -> Self {
        Self {
            index,
            data: Arc::new(RwLock::new(slot)),
        }
    }

    /// Index of the slot inside its storage.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Lock the slot for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the slot for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles point at the same slot.
    #[must_use]
    pub fn same_slot(&self, other: &SlotRef) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// A pool of slots handed to tiles by the cache.
///
/// GPU-backed pools implement this on top of a texture array; [`CpuTileStorage`]
/// keeps texels in host memory.
pub trait TileStorage: Send {
    /// Layer name, used as the uniform/binding name by render backends.
    fn name(&self) -> &str;
    /// Slot width and height in pixels.
    fn tile_size(&self) -> u32;
    /// Floats per pixel.
    fn channels(&self) -> u32;
    /// Total number of slots.
    fn capacity(&self) -> usize;
    /// Slots not bound to any tile.
    fn free_slots(&self) -> usize;
    /// Take a free slot, zeroed, or `None` when the pool is exhausted.
    fn allocate_slot(&mut self) -> Option<SlotRef>;
    /// Return a slot to the pool.
    fn release_slot(&mut self, slot: SlotRef);
}

/// Host-memory slot pool.
pub struct CpuTileStorage {
    name: String,
    tile_size: u32,
    channels: u32,
    slots: Vec<SlotRef>,
    free: Vec<u32>,
    in_use: Vec<bool>,
}

impl CpuTileStorage {
    /// Allocate `capacity` slots of `tile_size² × channels` floats.
    #[must_use]
    pub fn new(name: impl Into<String>, tile_size: u32, channels: u32, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|i| SlotRef::new(i as u32, Slot::new(tile_size, channels)))
            .collect();
        // Lowest indices are handed out first.
        let free = (0..capacity as u32).rev().collect();
        Self {
            name: name.into(),
            tile_size,
            channels,
            slots,
            free,
            in_use: vec![false; capacity],
        }
    }
}

impl TileStorage for CpuTileStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn channels(&self) -> u32 {
        self.channels
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn free_slots(&self) -> usize {
        self.free.len()
    }

    fn allocate_slot(&mut self) -> Option<SlotRef> {
        let index = self.free.pop()?;
        self.in_use[index as usize] = true;
        let slot = self.slots[index as usize].clone();
        slot.write().fill(0.0);
        Some(slot)
    }

    fn release_slot(&mut self, slot: SlotRef) {
        let index = slot.index() as usize;
        let owned = self
            .slots
            .get(index)
            .is_some_and(|own| own.same_slot(&slot));
        if !owned || !self.in_use[index] {
            warn!(storage = %self.name, index, "ignoring release of a slot that is not allocated here");
            return;
        }
        self.in_use[index] = false;
        self.free.push(slot.index());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_hands_out_every_slot_once() {
        let mut storage = CpuTileStorage::new("elevation", 4, 1, 3);
        let a = storage.allocate_slot().unwrap();
        let b = storage.allocate_slot().unwrap();
        let c = storage.allocate_slot().unwrap();
        assert!(storage.allocate_slot().is_none());
        assert_eq!([a.index(), b.index(), c.index()], [0, 1, 2]);
        assert_eq!(storage.free_slots(), 0);

        storage.release_slot(b);
        assert_eq!(storage.free_slots(), 1);
        assert_eq!(storage.allocate_slot().unwrap().index(), 1);
    }

    #[test]
    fn test_allocated_slot_is_zeroed() {
        let mut storage = CpuTileStorage::new("color", 2, 4, 1);
        let slot = storage.allocate_slot().unwrap();
        slot.write().fill(7.0);
        storage.release_slot(slot);

        let again = storage.allocate_slot().unwrap();
        assert!(again.read().texels().iter().all(|&t| t == 0.0));
    }

    #[test]
    fn test_double_release_is_ignored() {
        let mut storage = CpuTileStorage::new("normal", 2, 3, 2);
        let slot = storage.allocate_slot().unwrap();
        storage.release_slot(slot.clone());
        storage.release_slot(slot);
        assert_eq!(storage.free_slots(), 2);
    }

    #[test]
    fn test_foreign_slot_is_ignored() {
        let mut a = CpuTileStorage::new("a", 2, 1, 1);
        let mut b = CpuTileStorage::new("b", 2, 1, 1);
        let from_b = b.allocate_slot().unwrap();
        a.release_slot(from_b);
        assert_eq!(a.free_slots(), 1);
        assert_eq!(b.free_slots(), 0);
    }

    #[test]
    fn test_pixel_layout_is_row_major() {
        let mut slot = Slot::new(3, 2);
        slot.set(1, 2, 1, 5.0);
        assert_eq!(slot.texels()[(2 * 3 + 1) * 2 + 1], 5.0);
        assert_eq!(slot.pixel(1, 2), &[0.0, 5.0]);
        assert_eq!(slot.as_bytes().len(), 3 * 3 * 2 * 4);
    }
}
