//! Deferred, completion-tracked tile production work.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{trace, warn};

use crate::{ProductionError, TileId};

/// The production closure carried by a [`Task`].
pub type Job = Box<dyn FnOnce() -> Result<(), ProductionError> + Send + 'static>;

/// Lifecycle of a [`Task`].
///
/// Transitions only move forward: `Pending → Running → Done`, with
/// `Cancelled` and `Failed` as terminal side exits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Waiting to be started by the scheduler.
    Pending = 0,
    /// Dispatched to a compute backend.
    Running = 1,
    /// Slots hold valid data.
    Done = 2,
    /// Abandoned because the tile was evicted or the scheduler was cleared.
    Cancelled = 3,
    /// Could not be produced; a later request re-creates the task.
    Failed = 4,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Done,
            3 => TaskState::Cancelled,
            _ => TaskState::Failed,
        }
    }

    /// No further transition can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Cancelled | TaskState::Failed
        )
    }

    /// Terminal without valid data.
    #[must_use]
    pub fn is_broken(self) -> bool {
        matches!(self, TaskState::Cancelled | TaskState::Failed)
    }
}

/// Whether a pending task may start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Every predecessor is done.
    Ready,
    /// Some predecessor is still pending or running.
    Waiting,
    /// A predecessor was cancelled or failed.
    Broken(TileId),
}

pub(crate) enum CancelOutcome {
    /// The task was pending and is now cancelled. The job, if any, must be
    /// dropped by the caller once it holds no locks.
    Cancelled(Option<Job>),
    /// The task already reached a terminal state.
    Finished,
    /// The task is running and cannot be withdrawn.
    Running,
}

/// One unit of tile production.
pub struct Task {
    tile: TileId,
    state: AtomicU8,
    predecessors: Vec<Arc<Task>>,
    job: Mutex<Option<Job>>,
    cancelled: Arc<AtomicBool>,
}

impl Task {
    /// A pending task that runs `job` once every predecessor is done.
    #[must_use]
    pub fn new(tile: TileId, predecessors: Vec<Arc<Task>>, job: Job) -> Arc<Self> {
        Arc::new(Self {
            tile,
            state: AtomicU8::new(TaskState::Pending as u8),
            predecessors,
            job: Mutex::new(Some(job)),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A task that failed before it could be scheduled.
    #[must_use]
    pub fn failed(tile: TileId, error: &ProductionError) -> Arc<Self> {
        warn!(tile = %tile, %error, "tile production could not be set up");
        Arc::new(Self {
            tile,
            state: AtomicU8::new(TaskState::Failed as u8),
            predecessors: Vec::new(),
            job: Mutex::new(None),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Tile this task fills.
    #[must_use]
    pub fn tile(&self) -> TileId {
        self.tile
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The tile's slots hold valid data.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state() == TaskState::Done
    }

    /// Tasks that must be done before this one starts.
    #[must_use]
    pub fn predecessors(&self) -> &[Arc<Task>] {
        &self.predecessors
    }

    /// Evaluate the predecessors.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        let mut ready = Readiness::Ready;
        for pred in &self.predecessors {
            match pred.state() {
                TaskState::Done => {}
                TaskState::Cancelled | TaskState::Failed => return Readiness::Broken(pred.tile),
                TaskState::Pending | TaskState::Running => ready = Readiness::Waiting,
            }
        }
        ready
    }

    /// Flag observed by compute backends before a dispatched job starts.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            trace!(tile = %self.tile, ?from, ?to, "task transition");
        }
        moved
    }

    fn take_job(&self) -> Option<Job> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Move `Pending → Running` and hand out the job.
    pub(crate) fn start(&self) -> Option<Job> {
        if !self.transition(TaskState::Pending, TaskState::Running) {
            return None;
        }
        let job = self.take_job();
        if job.is_none() {
            self.transition(TaskState::Running, TaskState::Failed);
        }
        job
    }

    /// Record the backend's verdict for a running task.
    pub(crate) fn finish(&self, result: Result<(), ProductionError>) -> TaskState {
        match result {
            Ok(()) => {
                self.transition(TaskState::Running, TaskState::Done);
            }
            Err(error) => {
                warn!(tile = %self.tile, %error, "tile production failed");
                self.transition(TaskState::Running, TaskState::Failed);
            }
        }
        self.state()
    }

    /// A running job was skipped by its backend after cancellation.
    pub(crate) fn finish_cancelled(&self) {
        self.transition(TaskState::Running, TaskState::Cancelled);
    }

    /// Fail a pending task whose predecessor broke. Returns the job for
    /// dropping outside of any lock.
    pub(crate) fn fail_pending(&self) -> Option<Job> {
        if self.transition(TaskState::Pending, TaskState::Failed) {
            self.take_job()
        } else {
            None
        }
    }

    /// Withdraw a task that has not started.
    pub(crate) fn try_cancel(&self) -> CancelOutcome {
        if self.transition(TaskState::Pending, TaskState::Cancelled) {
            self.cancelled.store(true, Ordering::Release);
            return CancelOutcome::Cancelled(self.take_job());
        }
        match self.state() {
            TaskState::Running => CancelOutcome::Running,
            _ => CancelOutcome::Finished,
        }
    }

    /// Ask the backend to skip a dispatched job that has not started yet.
    pub(crate) fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("tile", &self.tile)
            .field("state", &self.state())
            .field("predecessors", &self.predecessors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProducerId;

    fn id(tx: u32) -> TileId {
        TileId::new(ProducerId(0), 1, tx, 0)
    }

    fn noop() -> Job {
        Box::new(|| Ok(()))
    }

    #[test]
    fn test_happy_path_moves_forward() {
        let task = Task::new(id(0), Vec::new(), noop());
        assert_eq!(task.state(), TaskState::Pending);
        let job = task.start().unwrap();
        assert_eq!(task.state(), TaskState::Running);
        assert_eq!(task.finish(job()), TaskState::Done);
        assert!(task.is_done());

        // Terminal: nothing moves it back.
        assert!(task.start().is_none());
        assert!(matches!(task.try_cancel(), CancelOutcome::Finished));
        assert_eq!(task.state(), TaskState::Done);
    }

    #[test]
    fn test_failure_is_terminal() {
        let task = Task::new(id(0), Vec::new(), noop());
        let _job = task.start().unwrap();
        let err = ProductionError::Backend("boom".into());
        assert_eq!(task.finish(Err(err)), TaskState::Failed);
        assert_eq!(task.finish(Ok(())), TaskState::Failed);
    }

    #[test]
    fn test_cancel_pending_returns_job() {
        let task = Task::new(id(0), Vec::new(), noop());
        match task.try_cancel() {
            CancelOutcome::Cancelled(job) => assert!(job.is_some()),
            _ => panic!("pending task should cancel"),
        }
        assert_eq!(task.state(), TaskState::Cancelled);
        assert!(task.start().is_none());
    }

    #[test]
    fn test_running_task_cannot_be_cancelled() {
        let task = Task::new(id(0), Vec::new(), noop());
        let _job = task.start().unwrap();
        assert!(matches!(task.try_cancel(), CancelOutcome::Running));
        assert_eq!(task.state(), TaskState::Running);
        assert!(!task.cancel_flag().load(Ordering::Acquire));
    }

    #[test]
    fn test_readiness_follows_predecessors() {
        let a = Task::new(id(0), Vec::new(), noop());
        let b = Task::new(id(1), Vec::new(), noop());
        let dependent = Task::new(id(2), vec![Arc::clone(&a), Arc::clone(&b)], noop());
        assert_eq!(dependent.readiness(), Readiness::Waiting);

        let job = a.start().unwrap();
        a.finish(job());
        assert_eq!(dependent.readiness(), Readiness::Waiting);

        let _ = b.try_cancel();
        assert_eq!(dependent.readiness(), Readiness::Broken(id(1)));
    }

    #[test]
    fn test_prefailed_task() {
        let task = Task::failed(id(3), &ProductionError::InvalidLevel { level: 9, max: 4 });
        assert_eq!(task.state(), TaskState::Failed);
        assert!(task.state().is_broken());
    }
}
