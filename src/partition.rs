use std::ops::Range;

use crate::{Error, Result};

/// A contiguous half-open range `[start, end)` of index point ids owned by one worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Partition {
    start: usize,
    end: usize,
}

impl Partition {
    /// Creates the range `[start, end)`.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "partition start past its end");
        Self { start, end }
    }

    /// Returns the first id of the range.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Returns one past the last id of the range.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Returns the number of points in the range.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the range as a [`Range`].
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Splits `points` index points into one contiguous range per worker, in worker rank order.
///
/// Every worker gets `ceil(points / workers)` points, except the tail which is clipped to
/// `points`; trailing workers may therefore receive empty ranges. The ranges are disjoint and
/// their union is `[0, points)`.
///
/// # Errors
/// Returns [`Error::PartitionUnderflow`] when there are no workers.
pub fn partition(points: usize, workers: usize) -> Result<Vec<Partition>> {
    if workers == 0 {
        return Err(Error::PartitionUnderflow { workers, points });
    }

    let chunk_size = points.div_ceil(workers);
    let mut start = 0;
    let ranges = (0..workers)
        .map(|_| {
            let end = (start + chunk_size).min(points);
            let p = Partition::new(start, end);
            start = end;
            p
        })
        .collect::<Vec<_>>();

    if start != points {
        return Err(Error::PartitionUnderflow { workers, points });
    }

    Ok(ranges)
}
