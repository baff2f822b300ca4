use std::io::Write;

use ndarray::Array2;

use crate::{Error, Point, PointSet, Result, Scalar, LANES};

/// Number of queries appended to a generated point set.
pub const DEFAULT_QUERIES: usize = 10;

/// The input of a run: index points followed by query points, shared by every participant.
#[derive(Clone, Debug)]
pub struct Problem {
    seed: u64,
    num_index_points: usize,
    num_queries: usize,
    points: PointSet,
}

impl Problem {
    /// Deterministically generates `num_index_points + num_queries` points with coordinates
    /// uniform in `[0, 1)`. The last `num_queries` points are the queries.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `dimension` is zero or not a multiple of [`LANES`].
    pub fn generate(
        seed: u64,
        dimension: usize,
        num_index_points: usize,
        num_queries: usize,
    ) -> Result<Self> {
        check_dimension(dimension)?;

        let mut rng = oorandom::Rand32::new(seed);
        let data = Array2::from_shape_simple_fn((num_index_points + num_queries, dimension), || {
            rng.rand_float() as Scalar
        });

        Ok(Self {
            seed,
            num_index_points,
            num_queries,
            points: PointSet::new(data)?,
        })
    }

    /// Wraps an existing coordinate matrix whose last `num_queries` rows are the queries.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the dimension is zero or not a multiple of [`LANES`],
    /// or if there are fewer rows than queries.
    pub fn from_points(data: Array2<Scalar>, num_queries: usize) -> Result<Self> {
        check_dimension(data.ncols())?;
        let rows = data.nrows();
        let num_index_points = rows.checked_sub(num_queries).ok_or_else(|| {
            Error::InvalidConfig(format!("{} queries but only {} points", num_queries, rows))
        })?;

        Ok(Self {
            seed: 0,
            num_index_points,
            num_queries,
            points: PointSet::new(data)?,
        })
    }

    /// Returns the generator seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the dimension of every point.
    pub fn dimension(&self) -> usize {
        self.points.dimension()
    }

    /// Returns the number of index points.
    pub fn num_index_points(&self) -> usize {
        self.num_index_points
    }

    /// Returns the number of query points.
    pub fn num_queries(&self) -> usize {
        self.num_queries
    }

    /// Returns the full point set.
    pub fn points(&self) -> &PointSet {
        &self.points
    }

    /// Returns the query points in query order.
    pub fn queries(&self) -> Vec<Point<'_>> {
        self.points.slice(self.num_index_points..self.points.len())
    }

    /// Returns the query ids in query order.
    pub fn query_ids(&self) -> std::ops::Range<usize> {
        self.num_index_points..self.points.len()
    }
}

fn check_dimension(dimension: usize) -> Result<()> {
    if dimension == 0 || dimension % LANES != 0 {
        return Err(Error::InvalidConfig(format!(
            "dimension {} is not a positive multiple of {}",
            dimension, LANES
        )));
    }
    Ok(())
}

/// The global answer for one query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueryResult {
    query_id: usize,
    dist: Scalar,
}

impl QueryResult {
    /// Creates a result.
    pub fn new(query_id: usize, dist: Scalar) -> Self {
        Self { query_id, dist }
    }

    /// Returns the id of the query point.
    pub fn index(&self) -> usize {
        self.query_id
    }

    /// Returns the global minimum squared distance to any index point.
    pub fn dist(&self) -> Scalar {
        self.dist
    }
}

/// Receives global results, once per query, in increasing query id order.
pub trait ResultSink {
    /// Emits the result of one query.
    ///
    /// # Errors
    /// Returns an error if the result cannot be recorded.
    fn emit(&mut self, result: QueryResult) -> Result<()>;

    /// Called once after the last query.
    ///
    /// # Errors
    /// Returns an error if the sink cannot be flushed.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ResultSink for Vec<QueryResult> {
    fn emit(&mut self, result: QueryResult) -> Result<()> {
        self.push(result);
        Ok(())
    }
}

/// Writes one `<query id> <distance>` line per result and `DONE` at the end.
#[derive(Debug)]
pub struct LineSink<W: Write> {
    out: W,
}

impl<W: Write> LineSink<W> {
    /// Creates a sink writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultSink for LineSink<W> {
    fn emit(&mut self, result: QueryResult) -> Result<()> {
        writeln!(self.out, "{} {}", result.index(), result.dist()).map_err(Error::from)
    }

    fn finish(&mut self) -> Result<()> {
        writeln!(self.out, "DONE")?;
        self.out.flush().map_err(Error::from)
    }
}
