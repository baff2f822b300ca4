use std::ops::Range;

use ndarray::{Array2, ArrayView1};

use crate::{Error, Result, Scalar};

/// An immutable point borrowed from a [`PointSet`].
///
/// Index points and query points share this representation. The `id` is the point's row in the
/// global coordinate matrix, which makes it unique across the whole run.
#[derive(Clone, Copy, Debug)]
pub struct Point<'a> {
    id: usize,
    coordinates: ArrayView1<'a, Scalar>,
}

impl<'a> Point<'a> {
    /// Returns the global id of the point.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the number of coordinates.
    pub fn dimension(&self) -> usize {
        self.coordinates.len()
    }

    /// Returns the coordinates of the point.
    pub fn coordinates(&self) -> ArrayView1<'a, Scalar> {
        self.coordinates
    }

    #[inline(always)]
    pub(crate) fn coord(&self, axis: usize) -> Scalar {
        self.coordinates[axis]
    }
}

/// Owned, row-major coordinate matrix. Row `i` is the point with id `i`.
#[derive(Clone, Debug)]
pub struct PointSet {
    data: Array2<Scalar>,
}

impl PointSet {
    /// Wraps a `(points, dimension)` matrix.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] when the matrix has no columns.
    pub fn new(data: Array2<Scalar>) -> Result<Self> {
        if data.ncols() == 0 {
            return Err(Error::InvalidConfig("points must have at least one coordinate".into()));
        }

        // Rows must be contiguous for the lane kernel.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };

        Ok(Self { data })
    }

    /// Returns the number of points.
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    /// Returns `true` if the set holds no points.
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Returns the dimension shared by every point of the set.
    pub fn dimension(&self) -> usize {
        self.data.ncols()
    }

    /// Returns the point with id `id`.
    ///
    /// # Panics
    /// Panics if `id` is out of bounds.
    pub fn point(&self, id: usize) -> Point<'_> {
        Point {
            id,
            coordinates: self.data.row(id),
        }
    }

    /// Returns the points whose ids fall in `range`, in id order.
    ///
    /// # Panics
    /// Panics if `range` reaches past the end of the set.
    pub fn slice(&self, range: Range<usize>) -> Vec<Point<'_>> {
        range.map(|id| self.point(id)).collect()
    }

    /// Returns every point of the set.
    pub fn points(&self) -> Vec<Point<'_>> {
        self.slice(0..self.len())
    }
}
