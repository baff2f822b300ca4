//! A library for exact nearest neighbour search with k-d trees, built and queried across a pool of
//! workers whose local answers are reduced into one global answer per query.
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    rustdoc::broken_intra_doc_links
)]

/// Floating point type used for coordinates and distances.
pub type Scalar = f32;

mod error;
pub use error::{Error, Result};

mod metric;
pub use metric::{reference_squared_distance, squared_distance, LANES};

mod point;
pub use point::{Point, PointSet};

mod tree;
pub use tree::{linear_scan, KdTree, KdTreeBuilder, Neighbour, Node};

mod partition;
pub use partition::{partition, Partition};

mod collective;
pub use collective::MinReduce;

mod config;
pub use config::RunConfig;

mod problem;
pub use problem::{LineSink, Problem, QueryResult, ResultSink, DEFAULT_QUERIES};

mod cluster;
pub use cluster::{
    links, run, Coordinator, CoordinatorLink, Report, RunContext, WorkerLink, WorkerSession,
};

#[cfg(test)]
mod tests;
