/*!
 * Worker Pool
 *
 * Lazily-grown pool of named OS threads draining a shared job queue.
 *
 * # Design
 *
 * The pool is a cloneable handle. Jobs go through an unbounded flume channel;
 * the only senders live in the handle, so once every handle is dropped the
 * workers drain whatever is still queued and exit on disconnect. Dropping a
 * handle therefore never waits for, nor cancels, queued jobs.
 *
 * Threads are spawned on submission while more jobs are outstanding (queued
 * or running) than there are threads, up to `max_threads`. A job is only
 * queued once at least one worker exists, so a spawn failure rejects the
 * submitting job alone and never strands jobs queued by other callers.
 */

use crate::core::errors::{AsyncError, AsyncResult};
use crate::core::limits::{ENV_POOL_THREADS, FALLBACK_WORKER_THREADS, WORKER_THREAD_PREFIX};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on worker threads
    pub max_threads: usize,
    /// Worker names are `{prefix}-{index}`
    pub thread_name_prefix: String,
    /// Stack size for worker threads (platform default if `None`)
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: hardware_concurrency(),
            thread_name_prefix: WORKER_THREAD_PREFIX.to_string(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// One worker; jobs run in submission order
    pub fn single_threaded() -> Self {
        Self {
            max_threads: 1,
            ..Self::default()
        }
    }

    /// Default configuration with `TRACERAYER_POOL_THREADS` applied if set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_POOL_THREADS) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_threads = n,
                _ => warn!(value = %raw, "ignoring invalid {}", ENV_POOL_THREADS),
            }
        }
        config
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }
}

/// Available hardware concurrency
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or_else(|_| {
            warn!(
                "Failed to detect CPU count, defaulting to {}",
                FALLBACK_WORKER_THREADS
            );
            FALLBACK_WORKER_THREADS
        })
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub threads: usize,
    pub idle: usize,
    pub queued: usize,
    pub executed: u64,
}

#[derive(Default)]
struct Counters {
    threads: AtomicUsize,
    idle: AtomicUsize,
    /// Submitted and not yet finished
    outstanding: AtomicUsize,
    executed: AtomicU64,
    spawned_total: AtomicUsize,
}

struct PoolInner {
    sender: flume::Sender<Job>,
    receiver: flume::Receiver<Job>,
    config: PoolConfig,
    counters: Arc<Counters>,
    spawn_lock: Mutex<()>,
}

/// Cloneable handle to a worker pool
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool. No thread is started until the first submission.
    pub fn new(config: PoolConfig) -> Self {
        let (sender, receiver) = flume::unbounded();
        let config = PoolConfig {
            max_threads: config.max_threads.max(1),
            ..config
        };
        debug!(max_threads = config.max_threads, "worker pool created");
        Self {
            inner: Arc::new(PoolInner {
                sender,
                receiver,
                config,
                counters: Arc::new(Counters::default()),
                spawn_lock: Mutex::new(()),
            }),
        }
    }

    /// Enqueue a job. Never blocks on the job itself.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the pool has no worker and none could be spawned. The
    /// job is dropped without running; other queued jobs are unaffected.
    pub fn submit<F>(&self, job: F) -> AsyncResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let counters = &self.inner.counters;
        counters.outstanding.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.grow() {
            counters.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }

        self.inner.sender.send(Box::new(job)).map_err(|_| {
            counters.outstanding.fetch_sub(1, Ordering::AcqRel);
            // The handle owns a receiver, so the channel cannot be disconnected here
            AsyncError::IllegalMethodCall
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.inner.counters;
        PoolStats {
            threads: counters.threads.load(Ordering::Acquire),
            idle: counters.idle.load(Ordering::Acquire),
            queued: self.inner.sender.len(),
            executed: counters.executed.load(Ordering::Acquire),
        }
    }

    /// Number of live handles to this pool
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    fn grow(&self) -> AsyncResult<()> {
        let inner = &self.inner;
        let counters = &inner.counters;

        let needs_thread = || {
            counters.outstanding.load(Ordering::Acquire) > counters.threads.load(Ordering::Acquire)
        };
        if !needs_thread() {
            return Ok(());
        }

        let _guard = inner.spawn_lock.lock();
        let threads = counters.threads.load(Ordering::Acquire);
        if threads >= inner.config.max_threads || !needs_thread() {
            return Ok(());
        }

        let index = counters.spawned_total.fetch_add(1, Ordering::AcqRel);
        let mut builder = std::thread::Builder::new()
            .name(format!("{}-{}", inner.config.thread_name_prefix, index));
        if let Some(size) = inner.config.stack_size {
            builder = builder.stack_size(size);
        }

        counters.threads.fetch_add(1, Ordering::AcqRel);
        let receiver = inner.receiver.clone();
        let worker_counters = Arc::clone(counters);
        match builder.spawn(move || worker_loop(receiver, worker_counters)) {
            Ok(_) => {
                trace!(index, "worker thread spawned");
                Ok(())
            }
            Err(e) => {
                counters.threads.fetch_sub(1, Ordering::AcqRel);
                if threads > 0 {
                    warn!(error = %e, "could not grow worker pool, continuing with {} threads", threads);
                    return Ok(());
                }
                error!(error = %e, "could not spawn any worker thread");
                Err(AsyncError::OutOfMemory)
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(receiver: flume::Receiver<Job>, counters: Arc<Counters>) {
    loop {
        counters.idle.fetch_add(1, Ordering::AcqRel);
        let job = receiver.recv();
        counters.idle.fetch_sub(1, Ordering::AcqRel);

        let Ok(job) = job else { break };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("job panicked on worker thread");
        }
        counters.executed.fetch_add(1, Ordering::AcqRel);
        counters.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
    counters.threads.fetch_sub(1, Ordering::AcqRel);
    trace!("worker thread exiting");
}
