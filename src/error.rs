use thiserror::Error;

/// Errors that abort a run. None of them are recoverable.
#[derive(Debug, Error)]
pub enum Error {
    /// Two points of different dimension were compared.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the left-hand point (or of the run).
        expected: usize,
        /// Dimension of the offending point.
        actual: usize,
    },

    /// The worker pool cannot cover the index points.
    #[error("cannot partition {points} points over {workers} workers")]
    PartitionUnderflow {
        /// Number of workers available.
        workers: usize,
        /// Number of index points to cover.
        points: usize,
    },

    /// A message or collective arrived out of the per-query sequence.
    #[error("protocol desync: expected {expected}, got {actual}")]
    ProtocolDesync {
        /// What the receiver expected next.
        expected: String,
        /// What it actually received.
        actual: String,
    },

    /// A peer hung up or aborted the collective.
    #[error("peer {0} disconnected")]
    Disconnected(usize),

    /// Malformed run configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker's local thread pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Result emission failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
