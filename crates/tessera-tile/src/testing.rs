//! Fixtures shared by the unit tests of this crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    CpuTileStorage, ProducerCore, ProductionError, Scheduler, SlotRef, TileCache, TileLayer,
    TileProducer, TileRequest, TileStorage, register_producer,
};

/// A cache of `capacity` 8×8 single-channel slots on an inline scheduler.
pub fn test_cache(capacity: usize) -> Arc<TileCache> {
    let storages: Vec<Box<dyn TileStorage>> =
        vec![Box::new(CpuTileStorage::new("elevation", 8, 1, capacity))];
    let scheduler = Arc::new(Scheduler::inline(16));
    Arc::new(TileCache::new("test", storages, scheduler).unwrap())
}

/// Fills every tile with a constant and counts productions.
pub struct FillProducer {
    core: ProducerCore,
    value: f32,
    runs: AtomicUsize,
}

impl FillProducer {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl TileProducer for FillProducer {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn do_create_tile(&self, _request: &TileRequest, slots: &[SlotRef]) -> Result<(), ProductionError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        slots[0].write().fill(self.value);
        Ok(())
    }
}

pub fn fill_producer(cache: &Arc<TileCache>, value: f32) -> Arc<FillProducer> {
    register_producer(cache, "fill", Vec::new(), |core| FillProducer {
        core,
        value,
        runs: AtomicUsize::new(0),
    })
    .unwrap()
}

/// Writes a constant over the whole slot or its left half.
pub struct ConstantLayer {
    value: f32,
    left_half_only: bool,
}

impl ConstantLayer {
    pub fn full(value: f32) -> Self {
        Self {
            value,
            left_half_only: false,
        }
    }

    pub fn left_half(value: f32) -> Self {
        Self {
            value,
            left_half_only: true,
        }
    }
}

impl TileLayer for ConstantLayer {
    fn name(&self) -> &str {
        "constant"
    }

    fn do_create_tile(&self, _request: &TileRequest, slots: &[SlotRef]) -> Result<(), ProductionError> {
        let mut slot = slots[0].write();
        let size = slot.tile_size();
        let width = if self.left_half_only { size / 2 } else { size };
        for y in 0..size {
            for x in 0..width {
                slot.set(x, y, 0, self.value);
            }
        }
        Ok(())
    }
}

pub struct FailingLayer;

impl TileLayer for FailingLayer {
    fn name(&self) -> &str {
        "failing"
    }

    fn do_create_tile(&self, request: &TileRequest, _slots: &[SlotRef]) -> Result<(), ProductionError> {
        Err(ProductionError::Backend(format!("cannot build {}", request.id)))
    }
}
