//! Worker pool for file and network requests.
//!
//! A fixed number of worker tasks drain one unbounded multi-producer,
//! multi-consumer channel. Each work item runs its work phase and then its
//! cleanup phase on the blocking thread pool. Any error or panic escaping a
//! phase is handed to the [`FatalErrorHandler`], which exits the process by
//! default.

use crate::error::AdmissionError;
use crate::virtualization::callbacks::{BlobSizes, BlobSizesConnection};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

pub type WorkFn = Box<dyn FnOnce(&dyn BlobSizesConnection) -> anyhow::Result<()> + Send>;
pub type CleanupFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A request that needs file or network access.
pub struct WorkItem {
    relative_path: Option<String>,
    work: WorkFn,
    cleanup: Option<CleanupFn>,
}

impl WorkItem {
    pub fn new<F>(relative_path: Option<String>, work: F) -> Self
    where
        F: FnOnce(&dyn BlobSizesConnection) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            relative_path,
            work: Box::new(work),
            cleanup: None,
        }
    }

    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("relative_path", &self.relative_path)
            .field("has_cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Phase in which a worker failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkPhase {
    /// Setting up or running the worker itself.
    Worker,
    Work,
    Cleanup,
}

impl fmt::Display for WorkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkPhase::Worker => write!(f, "worker"),
            WorkPhase::Work => write!(f, "work"),
            WorkPhase::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Context logged for an unrecoverable worker failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub area: &'static str,
    pub phase: WorkPhase,
    pub relative_path: Option<String>,
    pub error: String,
}

/// Invoked after a fatal worker failure has been logged.
pub trait FatalErrorHandler: Send + Sync {
    fn on_fatal_error(&self, failure: &WorkerFailure);
}

/// Terminates the process with exit code 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl FatalErrorHandler for ProcessExit {
    fn on_fatal_error(&self, _failure: &WorkerFailure) {
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Not shutting down. Work is admitted once the workers are started.
    Idle,
    /// Shutdown requested: no new admissions, queued work still runs.
    Draining,
    /// Every queued item ran and every worker exited.
    Stopped,
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Items admitted but not yet picked up by a worker
    pub queued: usize,
    /// Items currently in their work or cleanup phase
    pub processing: usize,
    /// Items whose both phases finished
    pub completed: usize,
    /// Items parked until the current git command completes
    pub deferred: usize,
}

struct WorkerContext {
    worker_id: usize,
    area: &'static str,
    receiver: async_channel::Receiver<WorkItem>,
    blob_sizes: Arc<dyn BlobSizes>,
    stats: Arc<RwLock<QueueStats>>,
    fatal_handler: Arc<dyn FatalErrorHandler>,
}

impl WorkerContext {
    fn fail(&self, phase: WorkPhase, relative_path: Option<String>, message: String) {
        let failure = WorkerFailure {
            area: self.area,
            phase,
            relative_path,
            error: message,
        };
        error!(
            area = failure.area,
            phase = %failure.phase,
            relative_path = failure.relative_path.as_deref().unwrap_or(""),
            error = %failure.error,
            worker_id = self.worker_id,
            "Unhandled error in worker, exiting process"
        );
        self.fatal_handler.on_fatal_error(&failure);
    }
}

pub struct WorkerPool {
    area: &'static str,
    worker_count: usize,
    sender: async_channel::Sender<WorkItem>,
    receiver: async_channel::Receiver<WorkItem>,
    runtime: Mutex<Option<Runtime>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    state: RwLock<PoolState>,
    stats: Arc<RwLock<QueueStats>>,
    fatal_handler: Arc<dyn FatalErrorHandler>,
}

impl WorkerPool {
    pub fn new(
        area: &'static str,
        worker_count: usize,
        fatal_handler: Arc<dyn FatalErrorHandler>,
    ) -> Result<Self, AdmissionError> {
        if worker_count == 0 {
            return Err(AdmissionError::InvalidWorkerCount);
        }
        let (sender, receiver) = async_channel::unbounded();
        Ok(Self {
            area,
            worker_count,
            sender,
            receiver,
            runtime: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            state: RwLock::new(PoolState::Idle),
            stats: Arc::new(RwLock::new(QueueStats::default())),
            fatal_handler,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn state(&self) -> PoolState {
        *self.state.read()
    }

    pub fn is_accepting(&self) -> bool {
        self.admission().is_ok()
    }

    fn admission(&self) -> Result<(), AdmissionError> {
        if self.state() != PoolState::Idle || self.sender.is_closed() {
            return Err(AdmissionError::ShuttingDown);
        }
        if !self.started.load(Ordering::Acquire) {
            return Err(AdmissionError::NotStarted);
        }
        Ok(())
    }

    /// Start the worker tasks. Each one opens its own size lookup connection.
    pub fn start(&self, blob_sizes: Arc<dyn BlobSizes>) -> Result<(), AdmissionError> {
        if self.state() != PoolState::Idle {
            return Err(AdmissionError::ShuttingDown);
        }
        let mut runtime_slot = self.runtime.lock();
        if runtime_slot.is_some() {
            return Err(AdmissionError::AlreadyStarted);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.worker_count)
            .thread_name("sparsevfs-worker")
            .enable_all()
            .build()
            .map_err(|e| AdmissionError::StartFailed(e.to_string()))?;

        let mut workers = self.workers.lock();
        for worker_id in 0..self.worker_count {
            let context = WorkerContext {
                worker_id,
                area: self.area,
                receiver: self.receiver.clone(),
                blob_sizes: Arc::clone(&blob_sizes),
                stats: Arc::clone(&self.stats),
                fatal_handler: Arc::clone(&self.fatal_handler),
            };
            workers.push(runtime.spawn(worker_loop(context)));
        }
        *runtime_slot = Some(runtime);
        self.started.store(true, Ordering::Release);

        info!(
            area = self.area,
            worker_count = self.worker_count,
            "Started worker pool"
        );
        Ok(())
    }

    /// Queue an item. Never blocks. Fails before `start` and once shutdown
    /// has begun, so every admitted item has a worker to run it.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), AdmissionError> {
        self.admission()?;
        self.stats.write().queued += 1;
        match self.sender.try_send(item) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.stats.write().queued -= 1;
                debug!(
                    relative_path = err.into_inner().relative_path().unwrap_or(""),
                    "Rejected work item after shutdown"
                );
                Err(AdmissionError::ShuttingDown)
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        *self.stats.read()
    }

    /// Close the queue, let the workers drain it, and wait for them to exit.
    ///
    /// Must not be called from inside an async runtime.
    pub fn prepare_to_stop(&self) {
        {
            let mut state = self.state.write();
            if *state != PoolState::Idle {
                return;
            }
            *state = PoolState::Draining;
        }
        self.sender.close();
        info!(area = self.area, queued = self.stats().queued, "Draining worker pool");

        let workers = std::mem::take(&mut *self.workers.lock());
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.block_on(async {
                for handle in workers {
                    if let Err(err) = handle.await {
                        warn!(error = %err, "Worker task ended abnormally");
                    }
                }
            });
            runtime.shutdown_background();
        }

        *self.state.write() = PoolState::Stopped;
        info!(area = self.area, "Stopped worker pool");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.close();
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

async fn worker_loop(context: WorkerContext) {
    let connection: Arc<dyn BlobSizesConnection> = match context.blob_sizes.create_connection() {
        Ok(connection) => Arc::from(connection),
        Err(err) => {
            context.fail(WorkPhase::Worker, None, format!("{err:#}"));
            return;
        }
    };
    debug!(worker_id = context.worker_id, "Worker started");

    while let Ok(item) = context.receiver.recv().await {
        {
            let mut stats = context.stats.write();
            stats.queued = stats.queued.saturating_sub(1);
            stats.processing += 1;
        }

        let WorkItem {
            relative_path,
            work,
            cleanup,
        } = item;

        let work_connection = Arc::clone(&connection);
        let outcome =
            tokio::task::spawn_blocking(move || work(&*work_connection)).await;
        if let Err(message) = phase_result(outcome) {
            drop(connection);
            context.fail(WorkPhase::Work, relative_path, message);
            return;
        }

        if let Some(cleanup) = cleanup {
            let outcome = tokio::task::spawn_blocking(cleanup).await;
            if let Err(message) = phase_result(outcome) {
                drop(connection);
                context.fail(WorkPhase::Cleanup, relative_path, message);
                return;
            }
        }

        let mut stats = context.stats.write();
        stats.processing -= 1;
        stats.completed += 1;
    }

    debug!(worker_id = context.worker_id, "Worker exiting");
}

fn phase_result(outcome: Result<anyhow::Result<()>, JoinError>) -> Result<(), String> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(err) if err.is_panic() => Err(panic_message(err.into_panic())),
        Err(err) => Err(err.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic with non-string payload".to_string()
    }
}
