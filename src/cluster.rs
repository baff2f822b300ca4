use std::ops::Range;
use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc,
};
use std::thread;

use log::{debug, info, trace};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    partition, Error, KdTree, KdTreeBuilder, MinReduce, Partition, Point, Problem, QueryResult,
    Result, ResultSink, RunConfig, Scalar,
};

/// Rank of the coordinator. Workers are ranked `1..pool_size`.
const COORDINATOR: usize = 0;

/// What a worker knows about its place in the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunContext {
    pool_size: usize,
    rank: usize,
    partition: Partition,
}

impl RunContext {
    /// Returns the number of participants, coordinator included.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the rank of this worker, starting at 1.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the range of index points owned by this worker.
    pub fn partition(&self) -> Partition {
        self.partition
    }
}

/// A worker's notice that it has an answer for a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Report {
    /// Rank of the sending worker.
    pub rank: usize,
    /// Id of the answered query.
    pub query_id: usize,
}

/// The worker end of the pool: one incoming assignment, outgoing reports and the collective.
///
/// Dropping a link before [`WorkerLink::finish`] aborts the collective, so a worker that fails or
/// panics mid-run releases every peer blocked in a reduction.
#[derive(Debug)]
pub struct WorkerLink {
    rank: usize,
    pool_size: usize,
    assignment: Receiver<Partition>,
    reports: Sender<Report>,
    collective: Arc<MinReduce>,
    finished: bool,
}

impl WorkerLink {
    /// Returns the rank of the worker.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns a handle to the collective shared by the pool.
    pub fn collective(&self) -> Arc<MinReduce> {
        Arc::clone(&self.collective)
    }

    /// Blocks until the coordinator sends this worker its index range.
    ///
    /// # Errors
    /// Returns [`Error::Disconnected`] if the coordinator hung up first.
    pub fn recv_assignment(&self) -> Result<RunContext> {
        let partition = self
            .assignment
            .recv()
            .map_err(|_| Error::Disconnected(COORDINATOR))?;
        Ok(RunContext {
            pool_size: self.pool_size,
            rank: self.rank,
            partition,
        })
    }

    /// Tells the coordinator this worker has answered `query_id`.
    ///
    /// # Errors
    /// Returns [`Error::Disconnected`] if the coordinator hung up.
    pub fn report(&self, query_id: usize) -> Result<()> {
        self.reports
            .send(Report {
                rank: self.rank,
                query_id,
            })
            .map_err(|_| Error::Disconnected(COORDINATOR))
    }

    /// Joins the minimum reduction of `round` with this worker's local best.
    ///
    /// # Errors
    /// See [`MinReduce::reduce`].
    pub fn reduce_min(&self, round: usize, value: Scalar) -> Result<Scalar> {
        self.collective.reduce(self.rank, round, value)
    }

    /// Marks the worker as done with every query and releases the link.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for WorkerLink {
    fn drop(&mut self) {
        if !self.finished {
            self.collective.abort(self.rank);
        }
    }
}

/// The coordinator end of the pool.
#[derive(Debug)]
pub struct CoordinatorLink {
    assignments: Vec<Sender<Partition>>,
    reports: Vec<Receiver<Report>>,
    collective: Arc<MinReduce>,
}

impl CoordinatorLink {
    /// Returns a handle to the collective shared by the pool.
    pub fn collective(&self) -> Arc<MinReduce> {
        Arc::clone(&self.collective)
    }
}

/// Wires a pool of one coordinator and `workers` workers.
///
/// # Errors
/// Returns [`Error::PartitionUnderflow`] when `workers` is zero.
pub fn links(workers: usize) -> Result<(CoordinatorLink, Vec<WorkerLink>)> {
    if workers == 0 {
        return Err(Error::PartitionUnderflow { workers, points: 0 });
    }

    let pool_size = workers + 1;
    let collective = Arc::new(MinReduce::new(pool_size)?);

    let mut assignments = Vec::with_capacity(workers);
    let mut reports = Vec::with_capacity(workers);
    let mut links = Vec::with_capacity(workers);

    for rank in 1..pool_size {
        let (assign_tx, assign_rx) = channel();
        let (report_tx, report_rx) = channel();
        assignments.push(assign_tx);
        reports.push(report_rx);
        links.push(WorkerLink {
            rank,
            pool_size,
            assignment: assign_rx,
            reports: report_tx,
            collective: Arc::clone(&collective),
            finished: false,
        });
    }

    Ok((
        CoordinatorLink {
            assignments,
            reports,
            collective,
        },
        links,
    ))
}

/// Assigns partitions and turns per-worker answers into one result per query.
#[derive(Debug)]
pub struct Coordinator {
    link: CoordinatorLink,
}

impl Coordinator {
    /// Creates a coordinator over `link`.
    pub fn new(link: CoordinatorLink) -> Self {
        Self { link }
    }

    /// Sends every worker its range, in rank order. `partitions[i]` goes to rank `i + 1`.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolDesync`] if there is not one partition per worker and
    /// [`Error::Disconnected`] if a worker hung up.
    pub fn assign(&self, partitions: &[Partition]) -> Result<()> {
        if partitions.len() != self.link.assignments.len() {
            return Err(Error::ProtocolDesync {
                expected: format!("{} partitions", self.link.assignments.len()),
                actual: format!("{} partitions", partitions.len()),
            });
        }

        for (rank, (tx, p)) in (1..).zip(self.link.assignments.iter().zip(partitions)) {
            info!("rank {} assigned [{}, {})", rank, p.start(), p.end());
            tx.send(*p).map_err(|_| Error::Disconnected(rank))?;
        }
        Ok(())
    }

    /// Collects, for each query in order, one report from every worker, joins the reduction and
    /// emits the global minimum to `sink`. Calls [`ResultSink::finish`] after the last query.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolDesync`] on a report for the wrong query or from the wrong rank,
    /// [`Error::Disconnected`] if a worker hung up, and any error of the sink.
    pub fn collect<S: ResultSink>(&self, queries: Range<usize>, sink: &mut S) -> Result<()> {
        for (round, query_id) in queries.enumerate() {
            for (rank, rx) in (1..).zip(&self.link.reports) {
                let report = rx.recv().map_err(|_| Error::Disconnected(rank))?;
                if report.rank != rank || report.query_id != query_id {
                    return Err(Error::ProtocolDesync {
                        expected: format!("query {} from rank {}", query_id, rank),
                        actual: format!("query {} from rank {}", report.query_id, report.rank),
                    });
                }
                trace!("query {} reported by rank {}", query_id, rank);
            }

            // The coordinator holds no points; it contributes the neutral element.
            let dist = self.link.collective.reduce(COORDINATOR, round, Scalar::INFINITY)?;
            debug!("query {} global minimum {}", query_id, dist);
            sink.emit(QueryResult::new(query_id, dist))?;
        }
        sink.finish()
    }

    /// Assigns `partitions`, then collects every query of `queries`.
    ///
    /// # Errors
    /// See [`Coordinator::assign`] and [`Coordinator::collect`].
    pub fn run<S: ResultSink>(
        &self,
        partitions: &[Partition],
        queries: Range<usize>,
        sink: &mut S,
    ) -> Result<()> {
        self.assign(partitions)?;
        self.collect(queries, sink)
    }
}

/// A worker owning one partition and the k-d tree built over it.
#[derive(Debug)]
pub struct WorkerSession<'a> {
    ctx: RunContext,
    tree: KdTree<'a>,
    pool: rayon::ThreadPool,
    parallel_queries: bool,
    link: WorkerLink,
}

impl<'a> WorkerSession<'a> {
    /// Receives this worker's assignment and builds its local tree on a dedicated thread pool.
    ///
    /// # Errors
    /// Returns [`Error::Disconnected`] if the coordinator hung up, [`Error::ThreadPool`] if the
    /// pool cannot be created and [`Error::DimensionMismatch`] on inconsistent points.
    pub fn start(link: WorkerLink, problem: &'a Problem, config: &RunConfig) -> Result<Self> {
        let ctx = link.recv_assignment()?;
        let partition = ctx.partition();
        if partition.end() > problem.num_index_points() {
            return Err(Error::ProtocolDesync {
                expected: format!("range within [0, {})", problem.num_index_points()),
                actual: format!("[{}, {})", partition.start(), partition.end()),
            });
        }

        let rank = ctx.rank();
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(move |i| format!("worker-{}-{}", rank, i));
        if let Some(threads) = config.thread_count() {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        let mut points = problem.points().slice(partition.range());
        let tree = pool.install(|| {
            KdTreeBuilder::new()
                .parallel_depth(config.fork_depth())
                .build(&mut points)
        })?;
        info!(
            "rank {} built tree over {} points, depth {}",
            rank,
            tree.len(),
            tree.depth()
        );

        Ok(Self {
            ctx,
            tree,
            pool,
            parallel_queries: config.is_parallel_queries(),
            link,
        })
    }

    /// Returns the run context of this worker.
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Returns the local tree.
    pub fn tree(&self) -> &KdTree<'a> {
        &self.tree
    }

    /// Local best squared distance for `query`; infinite when the partition is empty.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if `query` disagrees with the local points.
    pub fn local_best(&self, query: &Point<'_>) -> Result<Scalar> {
        local_best(&self.tree, query)
    }

    /// Answers every query in order: local search, report, then the reduction.
    ///
    /// With parallel queries enabled, all local answers are computed first on the worker's pool
    /// and then reported one by one in query order.
    ///
    /// # Errors
    /// Any error of the search or of the protocol; all are fatal.
    pub fn serve(&self, queries: &[Point<'_>]) -> Result<()> {
        if self.parallel_queries {
            // The link is not shareable across threads; only the tree goes to the pool.
            let tree = &self.tree;
            let answers: Vec<Scalar> = self.pool.install(|| {
                queries
                    .par_iter()
                    .map(|q| local_best(tree, q))
                    .collect::<Result<_>>()
            })?;
            for (round, (query, dist)) in queries.iter().zip(answers).enumerate() {
                self.publish(round, query, dist)?;
            }
        } else {
            for (round, query) in queries.iter().enumerate() {
                let dist = self.local_best(query)?;
                self.publish(round, query, dist)?;
            }
        }
        Ok(())
    }

    /// Ends the session after its last query.
    pub fn finish(self) {
        self.link.finish();
    }

    fn publish(&self, round: usize, query: &Point<'_>, dist: Scalar) -> Result<()> {
        self.link.report(query.id())?;
        let _ = self.link.reduce_min(round, dist)?;
        Ok(())
    }
}

fn local_best(tree: &KdTree<'_>, query: &Point<'_>) -> Result<Scalar> {
    Ok(tree.search(query)?.map_or(Scalar::INFINITY, |nb| nb.dist()))
}

/// Runs the whole search: one thread per worker plus the calling thread as coordinator.
///
/// Results reach `sink` once per query in increasing query id order. The first error of any
/// participant aborts the run and is returned.
///
/// # Errors
/// Any configuration, search or protocol error raised by a participant.
pub fn run<S: ResultSink>(problem: &Problem, config: &RunConfig, sink: &mut S) -> Result<()> {
    config.validate(problem.num_index_points())?;
    let partitions = partition(problem.num_index_points(), config.worker_count())?;
    let (link, workers) = links(config.worker_count())?;
    let collective = link.collective();
    let coordinator = Coordinator::new(link);

    info!(
        "run: {} index points, {} queries, dimension {}, pool size {}",
        problem.num_index_points(),
        problem.num_queries(),
        problem.dimension(),
        config.pool_size()
    );

    thread::scope(|scope| {
        let handles: Vec<_> = workers
            .into_iter()
            .map(|link| {
                let rank = link.rank();
                // A link dropped before `finish` aborts the collective, whatever the reason.
                let handle = thread::Builder::new()
                    .name(format!("worker-{}", rank))
                    .spawn_scoped(scope, move || -> Result<()> {
                        let queries = problem.queries();
                        let session = WorkerSession::start(link, problem, config)?;
                        session.serve(&queries)?;
                        session.finish();
                        Ok(())
                    });
                (rank, handle)
            })
            .collect();

        let mut outcome = coordinator.run(&partitions, problem.query_ids(), sink);
        if outcome.is_err() {
            collective.abort(COORDINATOR);
        }
        // Releases workers still waiting for their assignment.
        drop(coordinator);

        // A worker's own failure is the root cause; prefer it over the coordinator's view.
        for (rank, handle) in handles {
            let worker = match handle {
                Ok(handle) => handle.join().unwrap_or(Err(Error::Disconnected(rank))),
                Err(e) => Err(Error::from(e)),
            };
            if let Err(e) = worker {
                if !matches!(e, Error::Disconnected(_)) || outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        if outcome.is_ok() {
            info!("run finished");
        }
        outcome
    })
}
