use ndarray_stats::DeviationExt;

use crate::{Error, Point, Result, Scalar};

/// Number of coordinates accumulated side by side by [`squared_distance`].
pub const LANES: usize = 8;

/// Squared Euclidean distance between two points.
///
/// Coordinates are consumed in blocks of [`LANES`] with one accumulator per lane, which the
/// compiler turns into packed vector arithmetic. Dimensions that are not a multiple of the lane
/// width are still correct; the tail is summed separately.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if the points differ in dimension.
#[inline]
pub fn squared_distance(a: &Point<'_>, b: &Point<'_>) -> Result<Scalar> {
    check_dimension(a, b)?;

    let (a, b) = (a.coordinates(), b.coordinates());
    match (a.as_slice(), b.as_slice()) {
        (Some(a), Some(b)) => Ok(lanes(a, b)),
        _ => Ok(a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum()),
    }
}

/// Scalar squared Euclidean distance, computed by `ndarray-stats`.
///
/// Slower than [`squared_distance`]; meant as an independent reference.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if the points differ in dimension.
pub fn reference_squared_distance(a: &Point<'_>, b: &Point<'_>) -> Result<Scalar> {
    check_dimension(a, b)?;
    a.coordinates()
        .sq_l2_dist(&b.coordinates())
        .map_err(|_| Error::DimensionMismatch {
            expected: a.dimension(),
            actual: b.dimension(),
        })
}

#[inline(always)]
fn check_dimension(a: &Point<'_>, b: &Point<'_>) -> Result<()> {
    if a.dimension() != b.dimension() {
        return Err(Error::DimensionMismatch {
            expected: a.dimension(),
            actual: b.dimension(),
        });
    }
    Ok(())
}

#[inline(always)]
fn lanes(a: &[Scalar], b: &[Scalar]) -> Scalar {
    let mut partial = [0.0 as Scalar; LANES];

    let mut ca = a.chunks_exact(LANES);
    let mut cb = b.chunks_exact(LANES);
    for (xa, xb) in (&mut ca).zip(&mut cb) {
        for lane in 0..LANES {
            let d = xa[lane] - xb[lane];
            partial[lane] += d * d;
        }
    }

    let tail: Scalar = ca
        .remainder()
        .iter()
        .zip(cb.remainder())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();

    partial.iter().sum::<Scalar>() + tail
}
