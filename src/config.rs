use crate::{Error, Result};

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_PARALLEL_DEPTH: usize = 8;

/// Tunables of a distributed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunConfig {
    workers: Option<usize>,
    parallel_depth: Option<usize>,
    threads: Option<usize>,
    parallel_queries: bool,
}

impl RunConfig {
    /// Creates a configuration with default parameters.
    pub fn new() -> Self {
        Self {
            ..Default::default()
        }
    }

    /// Sets the number of workers. The pool additionally holds one coordinator.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Sets the depth below which tree construction forks parallel tasks.
    pub fn parallel_depth(mut self, depth: usize) -> Self {
        self.parallel_depth = Some(depth);
        self
    }

    /// Sets the size of each worker's local thread pool.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Answers a worker's queries concurrently. Answers are buffered and reported in query order.
    pub fn parallel_queries(mut self, enabled: bool) -> Self {
        self.parallel_queries = enabled;
        self
    }

    /// Returns the number of workers.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS)
    }

    /// Returns the pool size, workers plus the coordinator.
    pub fn pool_size(&self) -> usize {
        self.worker_count() + 1
    }

    /// Returns the fork/join depth cutoff.
    pub fn fork_depth(&self) -> usize {
        self.parallel_depth.unwrap_or(DEFAULT_PARALLEL_DEPTH)
    }

    /// Returns the size of each worker's thread pool, if set.
    pub fn thread_count(&self) -> Option<usize> {
        self.threads
    }

    /// Returns `true` if queries are answered concurrently within a worker.
    pub fn is_parallel_queries(&self) -> bool {
        self.parallel_queries
    }

    /// Checks the configuration.
    ///
    /// # Errors
    /// Returns [`Error::PartitionUnderflow`] without workers and [`Error::InvalidConfig`] for a
    /// zero-sized thread pool.
    pub fn validate(&self, points: usize) -> Result<()> {
        if self.worker_count() == 0 {
            return Err(Error::PartitionUnderflow {
                workers: 0,
                points,
            });
        }
        if self.threads == Some(0) {
            return Err(Error::InvalidConfig("threads must be positive".into()));
        }
        Ok(())
    }
}
