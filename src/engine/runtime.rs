//! Threaded refresh runtime.
//!
//! Refresh triggers arrive from many places (call-log observers, contact
//! changes, app start). This module provides a small, bounded, thread-based
//! runtime that queues them and runs each one as a full refresh cycle. Only
//! one cycle runs at a time, whatever the worker count.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use futures::executor::block_on;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::engine::{AnnotationEngine, FillSummary};
use crate::error::{AnnotationError, AnnotationResult, ExecutionError};
use crate::mutation::MutationSet;
use crate::storage::MutationSink;

/// Identifies one refresh cycle in logs and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(Uuid);

impl CycleId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One refresh trigger.
#[derive(Debug, Clone, Default)]
pub struct RefreshRequest {
    /// Row changes the caller already has for this cycle, typically inserts
    /// for newly logged calls.
    pub mutations: MutationSet,
    /// Run the fill even if no provider reports dirty.
    pub force: bool,
}

impl RefreshRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mutations(mutations: MutationSet) -> Self {
        Self {
            mutations,
            force: false,
        }
    }

    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Result of one refresh cycle.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub cycle_id: CycleId,
    /// True if the cycle stopped after the dirty check.
    pub skipped: bool,
    /// Mutations that were committed.
    pub mutations: MutationSet,
    /// `None` when the cycle was skipped.
    pub summary: Option<FillSummary>,
}

/// Runs cycles against one engine and sink, one at a time.
struct CycleRunner {
    engine: AnnotationEngine,
    sink: Arc<dyn MutationSink>,
    serial: Mutex<()>,
}

impl CycleRunner {
    fn run(&self, cycle_id: CycleId, request: RefreshRequest) -> AnnotationResult<RefreshOutcome> {
        let _serial = self
            .serial
            .lock()
            .map_err(|_| AnnotationError::internal("refresh cycle lock poisoned"))?;
        let span = tracing::info_span!("refresh_cycle", cycle_id = %cycle_id);
        let _entered = span.enter();

        let RefreshRequest { mut mutations, force } = request;

        // Caller-supplied rows always need their annotations filled.
        if !force && mutations.is_empty() && !block_on(self.engine.is_dirty())? {
            tracing::debug!("no lookup is dirty, skipping");
            return Ok(RefreshOutcome {
                cycle_id,
                skipped: true,
                mutations,
                summary: None,
            });
        }

        let summary = block_on(self.engine.fill(&mut mutations))?;
        self.sink.commit(&mutations)?;
        block_on(self.engine.on_successful_fill())?;

        tracing::info!(
            numbers = summary.numbers_examined,
            changed = summary.numbers_changed,
            patched = summary.rows_patched,
            "refresh cycle committed"
        );
        Ok(RefreshOutcome {
            cycle_id,
            skipped: false,
            mutations,
            summary: Some(summary),
        })
    }

    fn clear(&self) -> AnnotationResult<()> {
        let _serial = self
            .serial
            .lock()
            .map_err(|_| AnnotationError::internal("refresh cycle lock poisoned"))?;
        block_on(self.engine.clear_data())
    }
}

enum Job {
    Refresh {
        cycle_id: CycleId,
        request: RefreshRequest,
        reply: Sender<AnnotationResult<RefreshOutcome>>,
    },

    Clear {
        reply: Sender<AnnotationResult<()>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(
        workers: usize,
        queue_capacity: usize,
        runner: Arc<CycleRunner>,
    ) -> AnnotationResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let runner = Arc::clone(&runner);
            let handle = thread::Builder::new()
                .name(format!("calllog-refresh-{idx}"))
                .spawn(move || loop {
                    match rx.recv() {
                        Ok(Job::Refresh {
                            cycle_id,
                            request,
                            reply,
                        }) => {
                            let result = runner.run(cycle_id, request);
                            if let Err(e) = &result {
                                tracing::warn!(
                                    cycle_id = %cycle_id,
                                    error = %e,
                                    "refresh cycle failed"
                                );
                            }
                            let _ = reply.send(result);
                        }
                        Ok(Job::Clear { reply }) => {
                            let _ = reply.send(runner.clear());
                        }
                        Err(_) => break,

                        #[cfg(test)]
                        Ok(Job::Sleep { duration, reply }) => {
                            thread::sleep(duration);
                            let _ = reply.send(());
                        }
                    }
                })
                .map_err(|e| {
                    AnnotationError::internal(format!("failed to spawn refresh worker: {e}"))
                })?;
            handles.push(handle);
        }

        Ok(Self {
            tx,
            workers: handles,
            queue_capacity,
        })
    }

    fn try_submit(&self, job: Job) -> Result<(), ExecutionError> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected),
        }
    }

    fn shutdown(self) {
        // Closing the channel lets workers drain queued jobs, then exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

fn wait<T>(rx: &Receiver<AnnotationResult<T>>, timeout: Option<Duration>) -> AnnotationResult<T> {
    match timeout {
        None => rx.recv().map_err(|_| ExecutionError::Disconnected)?,
        Some(timeout) => rx.recv_timeout(timeout).map_err(|err| match err {
            crossbeam_channel::RecvTimeoutError::Timeout => ExecutionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            crossbeam_channel::RecvTimeoutError::Disconnected => ExecutionError::Disconnected,
        })?,
    }
}

/// Handle returned by [`RefreshRuntime::submit`].
#[must_use = "a refresh handle does nothing unless joined"]
pub struct RefreshHandle {
    cycle_id: CycleId,
    rx: Receiver<AnnotationResult<RefreshOutcome>>,
}

impl RefreshHandle {
    #[must_use]
    pub const fn cycle_id(&self) -> CycleId {
        self.cycle_id
    }

    /// Waits for the cycle to finish.
    pub fn join(self) -> AnnotationResult<RefreshOutcome> {
        wait(&self.rx, None)
    }

    /// Waits for the cycle to finish, giving up after `timeout`.
    ///
    /// A timed-out cycle keeps running; only the wait is abandoned.
    pub fn join_timeout(self, timeout: Duration) -> AnnotationResult<RefreshOutcome> {
        wait(&self.rx, Some(timeout))
    }
}

/// Bounded queue of refresh cycles over a fixed set of worker threads.
pub struct RefreshRuntime {
    runner: Arc<CycleRunner>,
    pool: WorkerPool,
}

impl RefreshRuntime {
    /// Starts the workers. Committed mutations go to `sink`.
    pub fn new(
        engine: AnnotationEngine,
        sink: Arc<dyn MutationSink>,
        config: &RuntimeConfig,
    ) -> AnnotationResult<Self> {
        let runner = Arc::new(CycleRunner {
            engine,
            sink,
            serial: Mutex::new(()),
        });
        let pool = WorkerPool::start(config.workers, config.queue_capacity, Arc::clone(&runner))?;
        Ok(Self { runner, pool })
    }

    /// Queues a refresh cycle. Fails fast if the queue is full.
    pub fn submit(&self, request: RefreshRequest) -> AnnotationResult<RefreshHandle> {
        let cycle_id = CycleId::new();
        let (tx, rx) = bounded::<AnnotationResult<RefreshOutcome>>(1);
        self.pool.try_submit(Job::Refresh {
            cycle_id,
            request,
            reply: tx,
        })?;
        Ok(RefreshHandle { cycle_id, rx })
    }

    /// Runs a refresh cycle and waits for it.
    pub fn refresh(&self, request: RefreshRequest) -> AnnotationResult<RefreshOutcome> {
        self.submit(request)?.join()
    }

    /// Clears history and provider data once no cycle is running.
    pub fn clear_data(&self) -> AnnotationResult<()> {
        let (tx, rx) = bounded::<AnnotationResult<()>>(1);
        self.pool.try_submit(Job::Clear { reply: tx })?;
        wait(&rx, None)
    }

    #[must_use]
    pub fn engine(&self) -> &AnnotationEngine {
        &self.runner.engine
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> Result<Receiver<()>, ExecutionError> {
        let (tx, rx) = bounded::<()>(1);
        self.pool.try_submit(Job::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}

impl Drop for RefreshRuntime {
    fn drop(&mut self) {
        let pool = std::mem::replace(
            &mut self.pool,
            WorkerPool {
                tx: bounded::<Job>(1).0,
                workers: Vec::new(),
                queue_capacity: 1,
            },
        );
        pool.shutdown();
    }
}
