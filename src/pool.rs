//! Bounded worker pool for metadata extraction
//!
//! Jobs are plain closures; results travel back over channels owned by the
//! submitter, which waits on them with a deadline. A worker stuck inside a
//! filesystem call cannot be interrupted, so the submitter writes it off and
//! asks the pool for a replacement. Replacements are capped; once the cap is
//! spent, jobs queue behind the stuck workers and time out at the submitter.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Replacement threads allowed per configured worker
pub const REPLACEMENTS_PER_WORKER: usize = 4;

pub struct WorkerPool {
    name: String,
    size: usize,
    job_tx: Sender<Job>,
    job_rx: Receiver<Job>,
    spawned: AtomicUsize,
    replacement_limit: usize,
}

impl WorkerPool {
    /// Start a pool with `size` named worker threads
    pub fn new(name: impl Into<String>, size: usize) -> io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let pool = Self {
            name: name.into(),
            size: size.max(1),
            job_tx,
            job_rx,
            spawned: AtomicUsize::new(0),
            replacement_limit: size.max(1) * REPLACEMENTS_PER_WORKER,
        };
        for _ in 0..pool.size {
            pool.spawn_worker()?;
        }
        Ok(pool)
    }

    /// Configured number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Threads started over the pool's lifetime, replacements included
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Queue a job for the next idle worker
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // The pool owns a receiver, so the channel cannot be disconnected here.
        let _ = self.job_tx.send(Box::new(job));
    }

    /// Replacement threads started so far
    pub fn replacements(&self) -> usize {
        self.spawned().saturating_sub(self.size)
    }

    /// Start a worker in place of one that is stuck or gone.
    ///
    /// Returns `false` once the replacement limit is reached or the thread
    /// cannot be started.
    pub fn replace_worker(&self) -> bool {
        if self.replacements() >= self.replacement_limit {
            log::error!(
                "{}: replacement limit of {} reached; not starting another worker",
                self.name,
                self.replacement_limit
            );
            return false;
        }
        match self.spawn_worker() {
            Ok(()) => {
                log::warn!("{}: replaced an unresponsive worker", self.name);
                true
            }
            Err(e) => {
                log::error!("{}: failed to start replacement worker: {}", self.name, e);
                false
            }
        }
    }

    fn spawn_worker(&self) -> io::Result<()> {
        let idx = self.spawned.fetch_add(1, Ordering::Relaxed);
        let rx = self.job_rx.clone();
        thread::Builder::new()
            .name(format!("{}-{}", self.name, idx))
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            })?;
        Ok(())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("spawned", &self.spawned())
            .finish()
    }
}
