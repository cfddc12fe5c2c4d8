//! Per-frame cooperative task scheduler.
//!
//! [`Scheduler::tick`] is called once per frame. It starts a bounded number of
//! ready tasks on the [`ComputeBackend`] and polls every running one, so tiles
//! appear over several frames instead of stalling the update thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::task::CancelOutcome;
use crate::{
    Completion, ComputeBackend, InlineBackend, Job, JobStatus, Readiness, SchedulerConfig,
    Task, TaskState, ThreadPoolBackend, TileError,
};

/// Work done by one [`Scheduler::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks handed to the backend.
    pub started: usize,
    /// Tasks that finished with valid data.
    pub completed: usize,
    /// Tasks that failed, including those with a broken predecessor.
    pub failed: usize,
    /// Cancelled tasks dropped from the queue or reported by the backend.
    pub cancelled: usize,
    /// Pending tasks still waiting on predecessors.
    pub waiting: usize,
}

impl TickReport {
    fn did_work(&self) -> bool {
        self.started + self.completed + self.failed + self.cancelled > 0
    }
}

/// Snapshot of scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Queued tasks not started yet.
    pub pending: usize,
    /// Tasks on the backend.
    pub running: usize,
    /// Tasks completed since creation.
    pub completed: u64,
    /// Tasks failed since creation.
    pub failed: u64,
    /// Tasks cancelled since creation.
    pub cancelled: u64,
}

struct RunningTask {
    task: Arc<Task>,
    completion: Completion,
}

/// Owns the pending queue and drives tasks through the backend.
pub struct Scheduler {
    backend: Box<dyn ComputeBackend>,
    max_tasks_per_tick: usize,
    queue: Mutex<VecDeque<Arc<Task>>>,
    running: Mutex<Vec<RunningTask>>,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl Scheduler {
    /// A scheduler starting at most `max_tasks_per_tick` tasks per tick on `backend`.
    #[must_use]
    pub fn new(backend: Box<dyn ComputeBackend>, max_tasks_per_tick: usize) -> Self {
        Self {
            backend,
            max_tasks_per_tick: max_tasks_per_tick.max(1),
            queue: Mutex::new(VecDeque::new()),
            running: Mutex::new(Vec::new()),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    /// A scheduler running jobs on the ticking thread.
    #[must_use]
    pub fn inline(max_tasks_per_tick: usize) -> Self {
        Self::new(Box::new(InlineBackend), max_tasks_per_tick)
    }

    /// Build from settings: inline when no worker threads are asked for,
    /// otherwise a worker pool.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, TileError> {
        let workers = config.worker_count();
        let backend: Box<dyn ComputeBackend> = if workers == 0 {
            Box::new(InlineBackend)
        } else {
            Box::new(ThreadPoolBackend::new(workers, config.queue_capacity)?)
        };
        debug!(backend = backend.name(), max_tasks_per_tick = config.max_tasks_per_tick, "scheduler created");
        Ok(Self::new(backend, config.max_tasks_per_tick))
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Arc<Task>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_running(&self) -> MutexGuard<'_, Vec<RunningTask>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the compute backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Upper bound on tasks started per tick.
    #[must_use]
    pub fn max_tasks_per_tick(&self) -> usize {
        self.max_tasks_per_tick
    }

    /// Queue a task. Terminal tasks are accepted and dropped on the next tick.
    pub fn submit(&self, task: Arc<Task>) {
        trace!(tile = %task.tile(), "task submitted");
        self.lock_queue().push_back(task);
    }

    /// Advance pending work by one frame.
    ///
    /// Must not be called while holding a lock on a [`TileCache`](crate::TileCache):
    /// inline jobs run here and may touch the cache.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let mut discarded: Vec<Job> = Vec::new();
        let mut started: Vec<RunningTask> = Vec::new();

        let mut queue = std::mem::take(&mut *self.lock_queue());
        let mut kept = VecDeque::with_capacity(queue.len());
        while let Some(task) = queue.pop_front() {
            match task.state() {
                TaskState::Pending => {}
                TaskState::Cancelled => {
                    report.cancelled += 1;
                    continue;
                }
                TaskState::Failed => {
                    report.failed += 1;
                    continue;
                }
                TaskState::Running | TaskState::Done => continue,
            }

            if report.started >= self.max_tasks_per_tick || !self.backend.has_capacity() {
                kept.push_back(task);
                continue;
            }

            match task.readiness() {
                Readiness::Waiting => {
                    report.waiting += 1;
                    kept.push_back(task);
                }
                Readiness::Broken(dependency) => {
                    debug!(tile = %task.tile(), %dependency, "predecessor broken, failing task");
                    discarded.extend(task.fail_pending());
                    report.failed += 1;
                }
                Readiness::Ready => {
                    let Some(job) = task.start() else {
                        report.failed += 1;
                        continue;
                    };
                    match self.backend.dispatch(task.tile(), job, task.cancel_flag()) {
                        Ok(completion) => {
                            report.started += 1;
                            started.push(RunningTask { task, completion });
                        }
                        Err(error) => {
                            task.finish(Err(error));
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        {
            // Tasks submitted while the queue was detached go after the survivors.
            let mut shared = self.lock_queue();
            kept.append(&mut shared);
            *shared = kept;
        }
        drop(discarded);

        {
            let mut running = self.lock_running();
            running.append(&mut started);
            running.retain(|r| match self.backend.poll(&r.completion) {
                JobStatus::InProgress => true,
                JobStatus::Done => {
                    r.task.finish(Ok(()));
                    report.completed += 1;
                    false
                }
                JobStatus::Failed(error) => {
                    r.task.finish(Err(error));
                    report.failed += 1;
                    false
                }
                JobStatus::Cancelled => {
                    r.task.finish_cancelled();
                    report.cancelled += 1;
                    false
                }
            });
        }

        self.completed.fetch_add(report.completed as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.cancelled.fetch_add(report.cancelled as u64, Ordering::Relaxed);
        if report.did_work() {
            debug!(
                started = report.started,
                completed = report.completed,
                failed = report.failed,
                cancelled = report.cancelled,
                waiting = report.waiting,
                "scheduler tick"
            );
        }
        report
    }

    /// Tick until nothing is pending or running, or `max_ticks` is reached.
    /// Returns the number of ticks taken.
    pub fn run_until_idle(&self, max_ticks: usize) -> usize {
        for ticks in 0..max_ticks {
            if self.is_idle() {
                return ticks;
            }
            self.tick();
            if self.backend.in_flight() > 0 {
                std::thread::yield_now();
            }
        }
        max_ticks
    }

    /// Nothing queued and nothing running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock_queue().is_empty() && self.lock_running().is_empty()
    }

    /// Cancel every queued task and ask the backend to skip running ones that
    /// have not started executing.
    pub fn clear(&self) {
        let queued = std::mem::take(&mut *self.lock_queue());
        let mut discarded: Vec<Job> = Vec::new();
        let mut cancelled = 0u64;
        for task in &queued {
            if let CancelOutcome::Cancelled(job) = task.try_cancel() {
                discarded.extend(job);
                cancelled += 1;
            }
        }
        for running in self.lock_running().iter() {
            running.task.request_cancel();
        }
        self.cancelled.fetch_add(cancelled, Ordering::Relaxed);
        drop(discarded);
        debug!(cancelled, "scheduler cleared");
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            pending: self.lock_queue().len(),
            running: self.lock_running().len(),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
