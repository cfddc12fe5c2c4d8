//! Compute backends that execute production jobs.
//!
//! The scheduler never blocks on a backend: it dispatches a job, keeps the
//! returned [`Completion`], and polls it once per tick.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, bounded};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{Job, ProductionError, TileError, TileId};

/// Result of polling a [`Completion`].
#[derive(Clone, Debug, PartialEq)]
pub enum JobStatus {
    /// Still queued or executing.
    InProgress,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed(ProductionError),
    /// Skipped because its cancellation flag was set before it started.
    Cancelled,
}

const IN_PROGRESS: u8 = 0;
const DONE: u8 = 1;
const FAILED: u8 = 2;
const CANCELLED: u8 = 3;

struct CompletionInner {
    status: AtomicU8,
    error: Mutex<Option<ProductionError>>,
}

/// Thread-safe completion signal for one dispatched job.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl Completion {
    /// A signal that reports [`JobStatus::InProgress`] until completed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                status: AtomicU8::new(IN_PROGRESS),
                error: Mutex::new(None),
            }),
        }
    }

    /// Record the job's result.
    pub fn complete(&self, result: Result<(), ProductionError>) {
        match result {
            Ok(()) => self.inner.status.store(DONE, Ordering::Release),
            Err(error) => {
                *self.inner.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
                self.inner.status.store(FAILED, Ordering::Release);
            }
        }
    }

    /// Record that the job was skipped.
    pub fn mark_cancelled(&self) {
        self.inner.status.store(CANCELLED, Ordering::Release);
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        match self.inner.status.load(Ordering::Acquire) {
            IN_PROGRESS => JobStatus::InProgress,
            DONE => JobStatus::Done,
            CANCELLED => JobStatus::Cancelled,
            _ => {
                let error = self
                    .inner
                    .error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
                    .unwrap_or_else(|| ProductionError::Backend("unknown failure".into()));
                JobStatus::Failed(error)
            }
        }
    }
}

/// Runs a job, turning a panic into a [`ProductionError`].
fn run_job(tile: TileId, job: Job) -> Result<(), ProductionError> {
    catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
        warn!(tile = %tile, "tile job panicked");
        Err(ProductionError::Backend(format!("job for {tile} panicked")))
    })
}

/// Executes tile jobs on behalf of the [`Scheduler`](crate::Scheduler).
pub trait ComputeBackend: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Whether another job can be accepted this tick.
    fn has_capacity(&self) -> bool {
        true
    }

    /// Start `job`. The backend must skip it if `cancelled` is set before it starts.
    fn dispatch(
        &self,
        tile: TileId,
        job: Job,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Completion, ProductionError>;

    /// Poll a completion previously returned by [`dispatch`](Self::dispatch).
    fn poll(&self, completion: &Completion) -> JobStatus {
        completion.status()
    }

    /// Jobs dispatched and not yet finished.
    fn in_flight(&self) -> u64;
}

/// Runs each job on the calling thread at dispatch time.
///
/// The result is observed at the scheduler's next poll, which happens in the
/// same tick.
#[derive(Debug, Default)]
pub struct InlineBackend;

impl ComputeBackend for InlineBackend {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn dispatch(
        &self,
        tile: TileId,
        job: Job,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Completion, ProductionError> {
        let completion = Completion::new();
        if cancelled.load(Ordering::Acquire) {
            completion.mark_cancelled();
        } else {
            completion.complete(run_job(tile, job));
        }
        Ok(completion)
    }

    fn in_flight(&self) -> u64 {
        0
    }
}

struct WorkItem {
    tile: TileId,
    ticket: u64,
    job: Job,
    cancelled: Arc<AtomicBool>,
    completion: Completion,
}

/// Fixed pool of worker threads fed through a bounded channel.
pub struct ThreadPoolBackend {
    sender: Option<Sender<WorkItem>>,
    workers: Vec<JoinHandle<()>>,
    /// Cancellation flag of every job still queued or executing, by ticket.
    active: Arc<DashMap<u64, Arc<AtomicBool>>>,
    in_flight: Arc<AtomicU64>,
    next_ticket: AtomicU64,
    queue_capacity: usize,
}

impl ThreadPoolBackend {
    /// Spawn `thread_count` workers accepting at most `queue_capacity` jobs in flight.
    pub fn new(thread_count: usize, queue_capacity: usize) -> Result<Self, TileError> {
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = bounded::<WorkItem>(queue_capacity);
        let active: Arc<DashMap<u64, Arc<AtomicBool>>> = Arc::new(DashMap::new());
        let in_flight = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(thread_count);
        for i in 0..thread_count.max(1) {
            let receiver = receiver.clone();
            let active = Arc::clone(&active);
            let in_flight = Arc::clone(&in_flight);

            let handle = std::thread::Builder::new()
                .name(format!("tile-worker-{i}"))
                .spawn(move || {
                    while let Ok(item) = receiver.recv() {
                        if item.cancelled.load(Ordering::Acquire) {
                            item.completion.mark_cancelled();
                        } else {
                            let result = run_job(item.tile, item.job);
                            if item.cancelled.load(Ordering::Acquire) {
                                item.completion.mark_cancelled();
                            } else {
                                item.completion.complete(result);
                            }
                        }
                        active.remove(&item.ticket);
                        in_flight.fetch_sub(1, Ordering::AcqRel);
                    }
                })
                .map_err(TileError::WorkerSpawn)?;
            workers.push(handle);
        }

        debug!(threads = workers.len(), queue_capacity, "tile worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
            active,
            in_flight,
            next_ticket: AtomicU64::new(0),
            queue_capacity,
        })
    }

    /// Worker count sized to the machine, leaving two cores for the update and render threads.
    #[must_use]
    pub fn default_thread_count() -> usize {
        num_cpus::get().saturating_sub(2).max(1)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Set the cancellation flag of every queued or executing job.
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            entry.value().store(true, Ordering::Release);
        }
    }
}

impl ComputeBackend for ThreadPoolBackend {
    fn name(&self) -> &'static str {
        "thread-pool"
    }

    fn has_capacity(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) < self.queue_capacity as u64
    }

    fn dispatch(
        &self,
        tile: TileId,
        job: Job,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Completion, ProductionError> {
        let Some(sender) = &self.sender else {
            return Err(ProductionError::Backend("worker pool is shut down".into()));
        };
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let completion = Completion::new();
        self.active.insert(ticket, Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        let item = WorkItem {
            tile,
            ticket,
            job,
            cancelled,
            completion: completion.clone(),
        };
        sender.try_send(item).map_err(|e| {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            self.active.remove(&ticket);
            ProductionError::Backend(format!("could not queue {tile}: {e}"))
        })?;
        Ok(completion)
    }

    fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for ThreadPoolBackend {
    fn drop(&mut self) {
        self.cancel_all();
        // Closing the channel ends the worker loops.
        self.sender = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("tile worker exited with a panic");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProducerId;
    use std::time::{Duration, Instant};

    fn id() -> TileId {
        TileId::new(ProducerId(1), 0, 0, 0)
    }

    fn wait_for(backend: &dyn ComputeBackend, completion: &Completion) -> JobStatus {
        let start = Instant::now();
        loop {
            let status = backend.poll(completion);
            if status != JobStatus::InProgress || start.elapsed() > Duration::from_secs(5) {
                return status;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_inline_runs_at_dispatch() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let completion = InlineBackend
            .dispatch(
                id(),
                Box::new(move || {
                    flag.store(true, Ordering::Release);
                    Ok(())
                }),
                Arc::new(AtomicBool::new(false)),
            )
            .unwrap();
        assert!(ran.load(Ordering::Acquire));
        assert_eq!(InlineBackend.poll(&completion), JobStatus::Done);
    }

    #[test]
    fn test_inline_respects_cancellation() {
        let completion = InlineBackend
            .dispatch(
                id(),
                Box::new(|| panic!("cancelled job must not run")),
                Arc::new(AtomicBool::new(true)),
            )
            .unwrap();
        assert_eq!(completion.status(), JobStatus::Cancelled);
    }

    #[test]
    fn test_panicking_job_fails() {
        let completion = InlineBackend
            .dispatch(id(), Box::new(|| panic!("boom")), Arc::new(AtomicBool::new(false)))
            .unwrap();
        assert!(matches!(completion.status(), JobStatus::Failed(ProductionError::Backend(_))));
    }

    #[test]
    fn test_thread_pool_completes_jobs() {
        let pool = ThreadPoolBackend::new(2, 8).unwrap();
        assert_eq!(pool.thread_count(), 2);
        let completions: Vec<_> = (0..4)
            .map(|_| {
                pool.dispatch(id(), Box::new(|| Ok(())), Arc::new(AtomicBool::new(false)))
                    .unwrap()
            })
            .collect();
        for c in &completions {
            assert_eq!(wait_for(&pool, c), JobStatus::Done);
        }
    }

    #[test]
    fn test_thread_pool_reports_errors() {
        let pool = ThreadPoolBackend::new(1, 4).unwrap();
        let c = pool
            .dispatch(
                id(),
                Box::new(|| Err(ProductionError::InvalidLevel { level: 3, max: 2 })),
                Arc::new(AtomicBool::new(false)),
            )
            .unwrap();
        assert_eq!(
            wait_for(&pool, &c),
            JobStatus::Failed(ProductionError::InvalidLevel { level: 3, max: 2 })
        );
    }

    #[test]
    fn test_thread_pool_skips_cancelled_job() {
        let pool = ThreadPoolBackend::new(1, 4).unwrap();
        let c = pool
            .dispatch(
                id(),
                Box::new(|| panic!("cancelled job must not run")),
                Arc::new(AtomicBool::new(true)),
            )
            .unwrap();
        assert_eq!(wait_for(&pool, &c), JobStatus::Cancelled);
    }
}
