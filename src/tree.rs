use std::cmp::Ordering;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{squared_distance, Error, Point, Result, Scalar};

/// Depth below which left and right subtrees are built as parallel tasks.
const DEFAULT_PARALLEL_DEPTH: usize = 8;

/// The nearest point found for a query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    id: usize,
    dist: Scalar,
}

impl Neighbour {
    pub(crate) fn new(id: usize, dist: Scalar) -> Self {
        Self { id, dist }
    }

    /// Returns the global id of the neighbour.
    pub fn index(&self) -> usize {
        self.id
    }

    /// Returns the squared distance from the neighbour to the query point.
    pub fn dist(&self) -> Scalar {
        self.dist
    }
}

/// A k-d tree over the points of one partition.
///
/// The tree borrows its points from a [`crate::PointSet`] and is immutable once built.
#[derive(Clone, Debug, Default)]
pub struct KdTree<'a> {
    root: Option<Box<Node<'a>>>,
}

impl<'a> KdTree<'a> {
    /// Returns the root node, or `None` for an empty tree.
    pub fn root(&self) -> Option<&Node<'a>> {
        self.root.as_deref()
    }

    /// Returns the number of points in a tree.
    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.count())
    }

    /// Returns `true` if the tree holds no points.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of levels of the tree.
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.depth())
    }

    /// Finds the point closest to `query`. Returns `None` only for an empty tree.
    ///
    /// A point replaces the current best only if it is strictly closer, so among points tied at
    /// the minimum distance the first one visited wins: the root, then near subtrees before far
    /// ones. That is not necessarily the lowest id; [`linear_scan`] can pick another of the tied
    /// points.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if `query` does not have the dimension of the tree.
    pub fn search(&self, query: &Point<'_>) -> Result<Option<Neighbour>> {
        match &self.root {
            Some(root) => {
                // Seed the bound with the root so the answer is never worse than it.
                let dist = squared_distance(&root.point, query)?;
                let mut best = Neighbour::new(root.point.id(), dist);
                root.nn(query, 0, &mut best)?;
                Ok(Some(best))
            }
            None => Ok(None),
        }
    }

    /// Searches every query in parallel. Results are returned in the order of `queries`.
    ///
    /// # Errors
    /// Returns the first [`Error::DimensionMismatch`] encountered.
    pub fn search_batch(&self, queries: &[Point<'_>]) -> Result<Vec<Option<Neighbour>>> {
        queries.par_iter().map(|query| self.search(query)).collect()
    }

    /// Checks the k-d ordering invariant over the whole tree: every point of a left subtree is
    /// not greater than its ancestor on the ancestor's axis, and every point of a right subtree
    /// is not smaller.
    pub fn verify(&self) -> bool {
        self.root.as_ref().map_or(true, |root| root.verify(0, &mut Vec::new()))
    }
}

/// A node of a [`KdTree`]. Each node owns one point and up to two subtrees.
#[derive(Clone, Debug)]
pub struct Node<'a> {
    point: Point<'a>,
    left: Option<Box<Node<'a>>>,
    right: Option<Box<Node<'a>>>,
}

impl<'a> Node<'a> {
    /// Returns the point stored in the node.
    pub fn point(&self) -> &Point<'a> {
        &self.point
    }

    /// Returns the subtree holding the points ranked below this node on its axis.
    pub fn left(&self) -> Option<&Node<'a>> {
        self.left.as_deref()
    }

    /// Returns the subtree holding the points ranked above this node on its axis.
    pub fn right(&self) -> Option<&Node<'a>> {
        self.right.as_deref()
    }

    /// Returns `true` if the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Returns the number of points in the subtree rooted at this node.
    pub fn count(&self) -> usize {
        let l = self.left.as_ref().map_or(0, |n| n.count());
        let r = self.right.as_ref().map_or(0, |n| n.count());
        1 + l + r
    }

    fn depth(&self) -> usize {
        let l = self.left.as_ref().map_or(0, |n| n.depth());
        let r = self.right.as_ref().map_or(0, |n| n.depth());
        1 + l.max(r)
    }

    /// Branch-and-bound descent. `best` is updated in place, id and distance together.
    fn nn(&self, query: &Point<'_>, depth: usize, best: &mut Neighbour) -> Result<()> {
        let d_full = squared_distance(&self.point, query)?;
        let axis = depth % query.dimension();
        let d_axis = query.coord(axis) - self.point.coord(axis);

        if d_full < best.dist {
            *best = Neighbour::new(self.point.id(), d_full);
        }

        let (near, far) = if d_axis < 0. {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(node) = near {
            node.nn(query, depth + 1, best)?;
        }

        // The near side may have tightened the bound.
        if d_axis * d_axis < best.dist {
            if let Some(node) = far {
                node.nn(query, depth + 1, best)?;
            }
        }

        Ok(())
    }

    /// `bounds` holds `(axis, value, is_upper)` for every ancestor split on the path.
    fn verify(&self, depth: usize, bounds: &mut Vec<(usize, Scalar, bool)>) -> bool {
        let inside = bounds.iter().all(|&(axis, value, is_upper)| {
            let c = self.point.coord(axis);
            if is_upper {
                c <= value
            } else {
                c >= value
            }
        });
        if !inside {
            return false;
        }

        let axis = depth % self.point.dimension();
        let split = self.point.coord(axis);

        for (child, is_upper) in [(&self.left, true), (&self.right, false)] {
            if let Some(node) = child {
                bounds.push((axis, split, is_upper));
                let ok = node.verify(depth + 1, bounds);
                let _ = bounds.pop();
                if !ok {
                    return false;
                }
            }
        }

        true
    }
}

/// A build struct for constructing a [`KdTree`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KdTreeBuilder {
    parallel_depth: Option<usize>,
}

impl KdTreeBuilder {
    /// Creates a builder with default parameters.
    pub fn new() -> Self {
        Self {
            ..Default::default()
        }
    }

    /// Sets the depth below which subtrees are built as parallel tasks. Deeper levels are built
    /// sequentially on the calling thread. Defaults to 8; `0` builds everything sequentially.
    pub fn parallel_depth(mut self, depth: usize) -> Self {
        self.parallel_depth = Some(depth);
        self
    }

    /// Constructs a k-d tree from `points`, reordering the slice in place.
    ///
    /// Parallel tasks run on the current rayon pool; call this inside
    /// [`rayon::ThreadPool::install`] to use a dedicated pool.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the points do not share one dimension.
    pub fn build<'a>(self, points: &mut [Point<'a>]) -> Result<KdTree<'a>> {
        if let Some(first) = points.first() {
            let expected = first.dimension();
            if let Some(p) = points.iter().find(|p| p.dimension() != expected) {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: p.dimension(),
                });
            }
        }

        let cutoff = self.parallel_depth.unwrap_or(DEFAULT_PARALLEL_DEPTH);
        Ok(KdTree {
            root: build_node(points, 0, cutoff),
        })
    }
}

fn build_node<'a>(points: &mut [Point<'a>], depth: usize, cutoff: usize) -> Option<Box<Node<'a>>> {
    match points.len() {
        0 => return None,
        1 => {
            return Some(Box::new(Node {
                point: points[0],
                left: None,
                right: None,
            }))
        }
        _ => {}
    }

    let axis = depth % points[0].dimension();
    points.sort_by(|a, b| by_axis(a, b, axis));

    // Lower median for even sizes: left gets n/2 points, right gets n - n/2 - 1.
    let mid = points.len() / 2;
    let (left, rest) = points.split_at_mut(mid);
    let (median, right) = rest.split_first_mut()?;

    let (left, right) = if depth < cutoff {
        rayon::join(
            || build_node(left, depth + 1, cutoff),
            || build_node(right, depth + 1, cutoff),
        )
    } else {
        (
            build_node(left, depth + 1, cutoff),
            build_node(right, depth + 1, cutoff),
        )
    };

    Some(Box::new(Node {
        point: *median,
        left,
        right,
    }))
}

#[inline(always)]
fn by_axis(a: &Point<'_>, b: &Point<'_>, axis: usize) -> Ordering {
    a.coord(axis)
        .total_cmp(&b.coord(axis))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Exhaustive nearest neighbour over `points`.
///
/// Among points tied at the minimum distance, the one earliest in `points` wins. Use it to check
/// [`KdTree::search`] by distance; ids agree only when the nearest point is unique.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if a point does not have the dimension of `query`.
pub fn linear_scan(points: &[Point<'_>], query: &Point<'_>) -> Result<Option<Neighbour>> {
    let mut best: Option<Neighbour> = None;
    for p in points {
        let dist = squared_distance(p, query)?;
        if best.map_or(true, |b| dist < b.dist) {
            best = Some(Neighbour::new(p.id(), dist));
        }
    }
    Ok(best)
}
