//! Geometric kernel seam used by cells.
//!
//! The triangulation data structure is purely combinatorial; anything that
//! needs coordinates is delegated to a kernel. Cells only ever ask for one
//! construction, the circumcenter of their four vertices, so the seam is a
//! single trait.

use la_stack::{DEFAULT_PIVOT_TOL, LaError, Matrix, Vector};
use thiserror::Error;

/// Errors raised while constructing a circumcenter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CircumcenterError {
    /// The four points are coplanar (or nearly so) and have no circumsphere.
    #[error("Degenerate tetrahedron: the four points are coplanar")]
    Degenerate,
    /// The linear system could not be solved.
    #[error("Circumcenter system could not be solved: {details}")]
    MatrixInversionFailed {
        /// Description of the solver failure.
        details: String,
    },
    /// The solution has a non-finite coordinate.
    #[error("Circumcenter has non-finite coordinates")]
    NonFinite,
}

/// Constructs the center of the sphere through four points.
///
/// # Examples
///
/// ```
/// use tds3::geometry::kernel::{ConstructCircumcenter3, FastKernel};
///
/// let kernel = FastKernel;
/// let p = [
///     [0.0, 0.0, 0.0],
///     [4.0, 0.0, 0.0],
///     [0.0, 4.0, 0.0],
///     [0.0, 0.0, 4.0],
/// ];
/// let c = kernel.construct_circumcenter([&p[0], &p[1], &p[2], &p[3]]).unwrap();
/// assert!(c.iter().all(|x| (x - 2.0).abs() < 1e-12));
/// ```
pub trait ConstructCircumcenter3 {
    /// The point type of the kernel.
    type Point;

    /// Returns the circumcenter of the tetrahedron `points`.
    ///
    /// # Errors
    ///
    /// Returns a [`CircumcenterError`] if the tetrahedron is degenerate.
    fn construct_circumcenter(
        &self,
        points: [&Self::Point; 4],
    ) -> Result<Self::Point, CircumcenterError>;
}

/// Fast floating-point kernel over `[f64; 3]`.
///
/// The circumcenter is found by LU factorization with partial pivoting; no
/// exact fallback is performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FastKernel;

impl FastKernel {
    /// Creates a fast kernel.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConstructCircumcenter3 for FastKernel {
    type Point = [f64; 3];

    /// Solves `(p_i - p_0) · x = |p_i - p_0|²` for `i = 1..=3`, relative to
    /// `p_0` to keep the magnitudes small, and returns `p_0 + x / 2`.
    fn construct_circumcenter(
        &self,
        points: [&[f64; 3]; 4],
    ) -> Result<[f64; 3], CircumcenterError> {
        let p0 = points[0];
        let mut rows = [[0.0_f64; 3]; 3];
        let mut rhs = [0.0_f64; 3];
        for (i, p) in points[1..].iter().enumerate() {
            for j in 0..3 {
                rows[i][j] = p[j] - p0[j];
            }
            rhs[i] = rows[i].iter().map(|d| d * d).sum();
        }

        let a = Matrix::<3>::from_rows(rows);
        let lu = match a.lu(DEFAULT_PIVOT_TOL) {
            Ok(lu) => lu,
            // Retry with exact singularity detection for badly scaled input.
            Err(LaError::Singular { .. }) => a.lu(0.0).map_err(|e| match e {
                LaError::Singular { .. } => CircumcenterError::Degenerate,
                other => CircumcenterError::MatrixInversionFailed {
                    details: format!("LU factorization failed: {other}"),
                },
            })?,
            Err(e) => {
                return Err(CircumcenterError::MatrixInversionFailed {
                    details: format!("LU factorization failed: {e}"),
                });
            }
        };
        let x = lu
            .solve_vec(Vector::<3>::new(rhs))
            .map_err(|e| CircumcenterError::MatrixInversionFailed {
                details: format!("LU solve failed: {e}"),
            })?
            .into_array();

        let center = [
            0.5_f64.mul_add(x[0], p0[0]),
            0.5_f64.mul_add(x[1], p0[1]),
            0.5_f64.mul_add(x[2], p0[2]),
        ];
        if center.iter().all(|c| c.is_finite()) {
            Ok(center)
        } else {
            Err(CircumcenterError::NonFinite)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn distance_squared(p: &[f64; 3], q: &[f64; 3]) -> f64 {
        p.iter().zip(q).map(|(a, b)| (a - b) * (a - b)).sum()
    }

    #[test]
    fn test_unit_corner_tetrahedron() {
        let p = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let c = FastKernel::new()
            .construct_circumcenter([&p[0], &p[1], &p[2], &p[3]])
            .unwrap();
        for x in c {
            assert_relative_eq!(x, 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_center_is_equidistant_and_order_independent() {
        let p = [
            [0.3, -1.2, 2.0],
            [4.1, 0.5, -0.7],
            [-2.2, 3.3, 1.1],
            [1.0, 1.0, 5.5],
        ];
        let c = FastKernel
            .construct_circumcenter([&p[0], &p[1], &p[2], &p[3]])
            .unwrap();
        let r2 = distance_squared(&c, &p[0]);
        for q in &p[1..] {
            assert_relative_eq!(distance_squared(&c, q), r2, max_relative = 1e-10);
        }

        let swapped = FastKernel
            .construct_circumcenter([&p[2], &p[0], &p[3], &p[1]])
            .unwrap();
        for (x, y) in c.iter().zip(swapped.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_translated_tetrahedron_keeps_offset() {
        let p = [
            [1000.0, 1000.0, 1000.0],
            [1001.0, 1000.0, 1000.0],
            [1000.0, 1001.0, 1000.0],
            [1000.0, 1000.0, 1001.0],
        ];
        let c = FastKernel
            .construct_circumcenter([&p[0], &p[1], &p[2], &p[3]])
            .unwrap();
        for x in c {
            assert_relative_eq!(x, 1000.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_flat_tetrahedron_is_degenerate() {
        let p = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        let result = FastKernel.construct_circumcenter([&p[0], &p[1], &p[2], &p[3]]);
        assert_eq!(result, Err(CircumcenterError::Degenerate));
    }

    #[test]
    fn test_repeated_point_is_degenerate() {
        let p = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let result = FastKernel.construct_circumcenter([&p[0], &p[1], &p[2], &p[3]]);
        assert_eq!(result, Err(CircumcenterError::Degenerate));
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let p = [
            [0.0, 0.0, 0.0],
            [f64::NAN, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let result = FastKernel.construct_circumcenter([&p[0], &p[1], &p[2], &p[3]]);
        assert!(result.is_err());
    }
}
