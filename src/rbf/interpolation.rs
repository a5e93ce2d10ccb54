//! Dense RBF interpolation operator over a reduced point selection.
//!
//! The reduced system is small by construction (bounded by the
//! selection's `max_points`), so the kernel matrix is replicated on every
//! rank and factorized redundantly; replication keeps rank control flow
//! identical and the dense solve is negligible next to mesh motion.
//! Evaluation stays distributed: each rank evaluates only the target rows
//! it owns.
//!
//! An operator is initialized by construction; the selector holds
//! `Option<RbfOperator<_>>` for the not-yet-built states.

use crate::algs::communicator::Communicator;
use crate::dist::field::DistField;
use crate::rbf::kernel::RbfKernel;
use crate::transfer_error::TransferError;
use faer::Mat;
use faer::linalg::solvers::{PartialPivLu, Solve};
use std::sync::Arc;

/// Interpolation operator: kernel + factorized reduced system + the
/// evaluation targets it was built against.
pub struct RbfOperator<C: Communicator> {
    kernel: Arc<dyn RbfKernel>,
    centers: Mat<f64>,
    lu: PartialPivLu<f64>,
    targets: DistField<C>,
}

impl<C: Communicator> std::fmt::Debug for RbfOperator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbfOperator")
            .field("centers", &self.centers)
            .finish_non_exhaustive()
    }
}

fn center_distance(centers: &Mat<f64>, i: usize, j: usize) -> f64 {
    let dim = centers.ncols();
    let mut sum = 0.0;
    for d in 0..dim {
        let diff = centers[(i, d)] - centers[(j, d)];
        sum += diff * diff;
    }
    sum.sqrt()
}

fn point_distance(point: &[f64], centers: &Mat<f64>, j: usize) -> f64 {
    let mut sum = 0.0;
    for (d, x) in point.iter().enumerate() {
        let diff = x - centers[(j, d)];
        sum += diff * diff;
    }
    sum.sqrt()
}

impl<C: Communicator> RbfOperator<C> {
    /// Assemble and factorize the reduced kernel system.
    ///
    /// `reduced_positions` are the selected control points (already
    /// projected out of the full position set); `targets` are the points
    /// the operator will evaluate at. Collective over all ranks.
    pub fn build(
        kernel: Arc<dyn RbfKernel>,
        reduced_positions: &DistField<C>,
        targets: &DistField<C>,
    ) -> Result<Self, TransferError> {
        if reduced_positions.width() != targets.width() {
            return Err(TransferError::ShapeMismatch {
                expected: (reduced_positions.height(), reduced_positions.width()),
                found: (targets.height(), targets.width()),
            });
        }
        let n = reduced_positions.height();
        if n == 0 {
            return Err(TransferError::EmptySelection);
        }
        let dim = reduced_positions.width();
        let replicated = reduced_positions.replicate()?;
        let centers = Mat::from_fn(n, dim, |i, j| replicated[i * dim + j]);
        let system = Mat::from_fn(n, n, |i, j| kernel.phi(center_distance(&centers, i, j)));
        let lu = system.partial_piv_lu();
        Ok(Self {
            kernel,
            centers,
            lu,
            targets: targets.clone(),
        })
    }

    /// Number of control points the operator was built from.
    #[inline]
    pub fn num_centers(&self) -> usize {
        self.centers.nrows()
    }

    /// Number of rows the evaluation produces.
    #[inline]
    pub fn num_targets(&self) -> usize {
        self.targets.height()
    }

    /// Solve for the kernel weights and evaluate the interpolant at the
    /// target set. `reduced_values` must have one row per control point.
    /// Collective over all ranks; the result is distributed like the
    /// target set.
    pub fn evaluate(&self, reduced_values: &DistField<C>) -> Result<DistField<C>, TransferError> {
        let n = self.num_centers();
        if reduced_values.height() != n {
            return Err(TransferError::SelectionLengthMismatch {
                expected: n,
                found: reduced_values.height(),
            });
        }
        let width = reduced_values.width();
        let replicated = reduced_values.replicate()?;
        let rhs = Mat::from_fn(n, width, |i, j| replicated[i * width + j]);
        let weights = self.lu.solve(&rhs);

        let mut out = DistField::zeros(Arc::clone(self.targets.comm()), self.targets.height(), width);
        let range = out.local_range();
        for row in range {
            let point = self
                .targets
                .local_row(row)
                .expect("output layout matches target layout");
            let mut acc = vec![0.0; width];
            for j in 0..n {
                let phi = self.kernel.phi(point_distance(point, &self.centers, j));
                for (col, a) in acc.iter_mut().enumerate() {
                    *a += weights[(j, col)] * phi;
                }
            }
            out.set_row(row, &acc)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::rbf::kernel::{Gaussian, ThinPlateSpline};

    fn field(width: usize, data: &[f64]) -> DistField<NoComm> {
        DistField::from_global(Arc::new(NoComm), width, data).unwrap()
    }

    #[test]
    fn rejects_empty_selection() {
        let centers = field(2, &[]);
        let targets = field(2, &[0.0, 0.0]);
        let err = RbfOperator::build(Arc::new(ThinPlateSpline), &centers, &targets).unwrap_err();
        assert_eq!(err, TransferError::EmptySelection);
    }

    #[test]
    fn rejects_mismatched_value_rows() {
        let centers = field(1, &[0.0, 1.0]);
        let targets = field(1, &[0.5]);
        let op = RbfOperator::build(Arc::new(Gaussian::default()), &centers, &targets).unwrap();
        let bad_values = field(1, &[1.0, 2.0, 3.0]);
        assert_eq!(
            op.evaluate(&bad_values).unwrap_err(),
            TransferError::SelectionLengthMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn interpolates_exactly_at_centers() {
        // Targets equal the centers, so evaluation must reproduce the
        // input values to machine precision.
        let pts = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.5, 1.5];
        let centers = field(2, &pts);
        let targets = field(2, &pts);
        let op = RbfOperator::build(Arc::new(Gaussian::new(0.8)), &centers, &targets).unwrap();
        let values = field(1, &[1.0, -2.0, 0.5, 3.0]);
        let result = op.evaluate(&values).unwrap();
        for (got, want) in result.local_slice().iter().zip(values.local_slice()) {
            assert!((got - want).abs() < 1e-10, "got {got}, want {want}");
        }
    }

    #[test]
    fn reproduces_fields_spanned_by_its_centers() {
        // A field generated by kernels centered on the control points is
        // interpolated exactly everywhere, not just at the centers.
        let kernel = Gaussian::new(0.6);
        let centers_pts = [0.0, 0.0, 2.0, 1.0];
        let coeffs = [1.5, -0.7];
        let target_pts = [0.1, 0.2, 0.9, 1.1, 1.7, 0.3, 2.0, 1.0, 3.0, 3.0];
        let eval = |x: f64, y: f64| {
            let mut v = 0.0;
            for (c, q) in centers_pts.chunks(2).zip(coeffs) {
                let r = ((x - c[0]).powi(2) + (y - c[1]).powi(2)).sqrt();
                v += q * kernel.phi(r);
            }
            v
        };
        let centers = field(2, &centers_pts);
        let targets = field(2, &target_pts);
        let op = RbfOperator::build(Arc::new(kernel), &centers, &targets).unwrap();
        let values = field(1, &[eval(0.0, 0.0), eval(2.0, 1.0)]);
        let result = op.evaluate(&values).unwrap();
        for (k, chunk) in target_pts.chunks(2).enumerate() {
            let want = eval(chunk[0], chunk[1]);
            let got = result.local_slice()[k];
            assert!((got - want).abs() < 1e-10, "target {k}: got {got}, want {want}");
        }
    }

    #[test]
    fn vector_valued_fields_interpolate_per_column() {
        let pts = [0.0, 1.0, 2.5];
        let centers = field(1, &pts);
        let targets = field(1, &pts);
        let op = RbfOperator::build(Arc::new(Gaussian::default()), &centers, &targets).unwrap();
        let values = field(2, &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
        let result = op.evaluate(&values).unwrap();
        for (got, want) in result.local_slice().iter().zip(values.local_slice()) {
            assert!((got - want).abs() < 1e-10);
        }
    }
}
