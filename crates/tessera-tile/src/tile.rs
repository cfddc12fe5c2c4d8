//! A resident tile: identity, storage slots, and the task that fills them.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{ProducerId, SlotRef, Task, TaskState, TileId};

/// One tile bound to a slot in every storage layer of its cache.
///
/// `users` counts outstanding [`TileCache::get_tile`](crate::TileCache::get_tile)
/// calls and is only changed by the cache while it holds its lock.
pub struct Tile {
    id: TileId,
    slots: Vec<SlotRef>,
    task: Mutex<Option<Arc<Task>>>,
    users: AtomicU32,
}

impl Tile {
    pub(crate) fn new(id: TileId, slots: Vec<SlotRef>) -> Self {
        Self {
            id,
            slots,
            task: Mutex::new(None),
            users: AtomicU32::new(0),
        }
    }

    /// Identity of the tile.
    #[must_use]
    pub fn id(&self) -> TileId {
        self.id
    }

    /// Producer that fills the tile.
    #[must_use]
    pub fn producer(&self) -> ProducerId {
        self.id.producer
    }

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

    /// One slot per storage layer, in layer order.
    #[must_use]
    pub fn slots(&self) -> &[SlotRef] {
        &self.slots
    }

    /// Slot of storage layer `layer`.
    #[must_use]
    pub fn slot(&self, layer: usize) -> Option<&SlotRef> {
        self.slots.get(layer)
    }

    /// Outstanding acquisitions.
    #[must_use]
    pub fn users(&self) -> u32 {
        self.users.load(Ordering::Acquire)
    }

    /// The current production task, once created.
    #[must_use]
    pub fn task(&self) -> Option<Arc<Task>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// State of the current task.
    #[must_use]
    pub fn task_state(&self) -> Option<TaskState> {
        self.task().map(|t| t.state())
    }

    /// Slots hold valid data.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.task_state() == Some(TaskState::Done)
    }

    /// The last task was cancelled or failed; the next acquisition re-produces.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.task_state().is_some_and(TaskState::is_broken)
    }

    pub(crate) fn set_task(&self, task: Arc<Task>) {
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Detach a cancelled or failed task. When one is returned the caller
    /// owes the tile a new task.
    pub(crate) fn take_broken_task(&self) -> Option<Arc<Task>> {
        let mut guard = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|t| t.state().is_broken()) {
            guard.take()
        } else {
            None
        }
    }

    pub(crate) fn add_user(&self) -> u32 {
        self.users.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement `users`, or `None` if it is already zero.
    pub(crate) fn remove_user(&self) -> Option<u32> {
        let current = self.users.load(Ordering::Acquire);
        if current == 0 {
            return None;
        }
        self.users.store(current - 1, Ordering::Release);
        Some(current - 1)
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("id", &self.id)
            .field("users", &self.users())
            .field("slots", &self.slots.len())
            .field("task", &self.task_state())
            .finish()
    }
}
