//! Tile producers and the layers they composite.
//!
//! A producer decides which tiles exist and turns a cache miss into a
//! [`Task`]. The default production path runs the producer's layers, in
//! registration order, over the tile's slots.

use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::{ProducerId, ProductionError, SlotRef, Task, Tile, TileCache, TileError, TileHandle, TileId};

/// The tile a producer or layer is asked to fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRequest {
    /// Identity of the tile.
    pub id: TileId,
    /// Border width in pixels, replicated from neighbouring tiles.
    pub border: u32,
}

impl TileRequest {
    /// Quadtree level.
    #[must_use]
    pub fn level(&self) -> u8 {
        self.id.level
    }

    /// Column at [`level`](Self::level).
    #[must_use]
    pub fn tx(&self) -> u32 {
        self.id.tx
    }

    /// Row at [`level`](Self::level).
    #[must_use]
    pub fn ty(&self) -> u32 {
        self.id.ty
    }

    /// Tile-local coordinates of pixel `(x, y)` in a slot of `tile_size` pixels.
    ///
    /// The first and last interior pixels sit exactly on the tile edges
    /// (0 and 1), so neighbouring tiles share their edge samples. Border pixels
    /// fall outside `[0, 1]`.
    #[must_use]
    pub fn texel_uv(&self, x: u32, y: u32, tile_size: u32) -> (f64, f64) {
        let inner = tile_size.saturating_sub(2 * self.border);
        if inner < 2 {
            return (0.5, 0.5);
        }
        let step = 1.0 / f64::from(inner - 1);
        (
            (f64::from(x) - f64::from(self.border)) * step,
            (f64::from(y) - f64::from(self.border)) * step,
        )
    }
}

/// A composable production step applied to a tile's slots.
pub trait TileLayer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Contribute to or overwrite the contents of `slots`.
    ///
    /// A layer may look at other tiles with `find_tile`, but must release
    /// anything it acquires before returning.
    fn do_create_tile(&self, request: &TileRequest, slots: &[SlotRef]) -> Result<(), ProductionError>;
}

/// State every producer carries: identity, cache, and layers.
pub struct ProducerCore {
    id: ProducerId,
    name: String,
    cache: Arc<TileCache>,
    layers: Vec<Box<dyn TileLayer>>,
    this: Weak<dyn TileProducer>,
}

impl ProducerCore {
    /// Id of the producer in its cache.
    #[must_use]
    pub fn id(&self) -> ProducerId {
        self.id
    }

    /// Producer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cache holding the producer's tiles.
    #[must_use]
    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    /// Layers in registration order.
    #[must_use]
    pub fn layers(&self) -> &[Box<dyn TileLayer>] {
        &self.layers
    }

    /// Weak reference to the producer owning this core, for jobs that outlive a call.
    #[must_use]
    pub fn weak(&self) -> Weak<dyn TileProducer> {
        self.this.clone()
    }
}

/// Create a producer and register it with `cache` under a fresh id.
///
/// `build` receives the producer's core and wraps it in the concrete type.
pub fn register_producer<P, F>(
    cache: &Arc<TileCache>,
    name: impl Into<String>,
    layers: Vec<Box<dyn TileLayer>>,
    build: F,
) -> Result<Arc<P>, TileError>
where
    P: TileProducer + 'static,
    F: FnOnce(ProducerCore) -> P,
{
    let id = cache.next_producer_id();
    let name = name.into();
    let producer = Arc::new_cyclic(|weak: &Weak<P>| {
        let this: Weak<dyn TileProducer> = weak.clone();
        build(ProducerCore {
            id,
            name,
            cache: Arc::clone(cache),
            layers,
            this,
        })
    });
    let weak: Weak<dyn TileProducer> = Arc::downgrade(&producer) as Weak<dyn TileProducer>;
    cache.insert_producer(id, weak)?;
    debug!(
        producer = %id,
        name = producer.name(),
        layers = producer.core().layers().len(),
        "producer registered"
    );
    Ok(producer)
}

/// Run `layers` in order over `slots`.
///
/// The first failing layer resets every slot to zero and stops the chain, so
/// a tile is either fully composited or neutral.
pub fn apply_layers(
    producer_name: &str,
    layers: &[Box<dyn TileLayer>],
    request: &TileRequest,
    slots: &[SlotRef],
) {
    for layer in layers {
        if let Err(error) = layer.do_create_tile(request, slots) {
            warn!(
                producer = producer_name,
                layer = layer.name(),
                tile = %request.id,
                %error,
                "layer failed, tile reset to neutral data"
            );
            for slot in slots {
                slot.write().fill(0.0);
            }
            return;
        }
    }
}

/// A source of tiles for one cache.
///
/// Implementors provide [`core`](Self::core); everything else has a working
/// default that concrete producers override as needed.
pub trait TileProducer: Send + Sync {
    /// Shared producer state.
    fn core(&self) -> &ProducerCore;

    /// Id in the producer's cache.
    fn id(&self) -> ProducerId {
        self.core().id()
    }

    /// Name, used as the binding name of the producer's data.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// The cache holding this producer's tiles.
    fn cache(&self) -> &Arc<TileCache> {
        self.core().cache()
    }

    /// Border width in pixels. Must stay constant for the producer's lifetime.
    fn border(&self) -> u32 {
        0
    }

    /// Whether the producer's data lives on the GPU. Informational only.
    fn is_gpu_producer(&self) -> bool {
        false
    }

    /// Slot size of storage `layer`, borders included.
    fn tile_size(&self, layer: usize) -> u32 {
        self.cache().tile_size(layer).unwrap_or(0)
    }

    /// Slot size of storage `layer` without borders.
    fn tile_size_without_border(&self, layer: usize) -> u32 {
        self.tile_size(layer).saturating_sub(2 * self.border())
    }

    /// Whether this producer can build the tile at all.
    fn has_tile(&self, _level: u8, _tx: u32, _ty: u32) -> bool {
        true
    }

    /// Whether the tile's first child exists, i.e. subdividing is meaningful.
    fn has_children(&self, level: u8, tx: u32, ty: u32) -> bool {
        level < u8::MAX && self.has_tile(level + 1, 2 * tx, 2 * ty)
    }

    /// Acquire a tile through the cache. The handle releases it on drop.
    ///
    /// Requesting a tile for which [`has_tile`](Self::has_tile) is false is a
    /// caller bug and panics in debug builds.
    fn get_tile(&self, level: u8, tx: u32, ty: u32) -> Result<TileHandle, TileError> {
        debug_assert!(
            self.has_tile(level, tx, ty),
            "producer '{}' cannot produce level {level} ({tx}, {ty})",
            self.name()
        );
        TileHandle::acquire(self.cache(), self.id(), level, tx, ty)
    }

    /// Release a tile obtained from [`TileCache::get_tile`] directly.
    fn put_tile(&self, tile: &Tile) -> Result<(), TileError> {
        self.cache().put_tile(tile)
    }

    /// Look up one of this producer's tiles without acquiring it.
    ///
    /// With `done`, tiles whose task has not completed are skipped.
    fn find_tile(
        &self,
        level: u8,
        tx: u32,
        ty: u32,
        include_unused: bool,
        done: bool,
    ) -> Option<Arc<Tile>> {
        let tile = self
            .cache()
            .find_tile(self.id(), level, tx, ty, include_unused)?;
        if done && !tile.is_ready() {
            return None;
        }
        Some(tile)
    }

    /// Build the task that fills `tile`. Called by the cache on a miss, without
    /// holding the cache lock.
    ///
    /// The default task calls [`do_create_tile`](Self::do_create_tile) with no
    /// predecessors.
    fn create_tile(&self, tile: &Tile) -> Arc<Task> {
        let this = self.core().weak();
        let request = TileRequest {
            id: tile.id(),
            border: self.border(),
        };
        let slots = tile.slots().to_vec();
        Task::new(
            tile.id(),
            Vec::new(),
            Box::new(move || {
                let producer = this
                    .upgrade()
                    .ok_or(ProductionError::ProducerDropped(request.id.producer))?;
                producer.do_create_tile(&request, &slots)
            }),
        )
    }

    /// Fill `slots`. The default runs the producer's layers in order; with no
    /// layers the slots keep their zeroed contents.
    fn do_create_tile(&self, request: &TileRequest, slots: &[SlotRef]) -> Result<(), ProductionError> {
        apply_layers(self.name(), self.core().layers(), request, slots);
        Ok(())
    }
}
