//! Coarsening configuration, validated at construction.

use crate::transfer_error::TransferError;

/// Tolerances and selection-size bounds for the adaptive coarsening.
///
/// # Invariants
/// - `0 < tol <= 1`
/// - `reselection_tol >= tol`
/// - `min_points <= max_points`
///
/// Violations are configuration defects and fail at construction; both
/// point bounds are additionally clamped to the position-set size at
/// selection time when the mesh is smaller.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CoarseningConfig {
    tol: f64,
    reselection_tol: f64,
    min_points: usize,
    max_points: usize,
}

impl CoarseningConfig {
    pub fn new(
        tol: f64,
        reselection_tol: f64,
        min_points: usize,
        max_points: usize,
    ) -> Result<Self, TransferError> {
        if !(tol > 0.0 && tol <= 1.0) {
            return Err(TransferError::InvalidTolerance(tol));
        }
        if reselection_tol < tol {
            return Err(TransferError::InvalidReselectionTolerance {
                tol,
                reselection_tol,
            });
        }
        if max_points < min_points {
            return Err(TransferError::InvalidPointBounds {
                min_points,
                max_points,
            });
        }
        Ok(Self {
            tol,
            reselection_tol,
            min_points,
            max_points,
        })
    }

    /// Absolute error tolerance driving the greedy growth loop.
    #[inline]
    pub fn tol(&self) -> f64 {
        self.tol
    }

    /// Looser tolerance deciding whether a converged selection is still
    /// adequate for new incoming data.
    #[inline]
    pub fn reselection_tol(&self) -> f64 {
        self.reselection_tol
    }

    #[inline]
    pub fn min_points(&self) -> usize {
        self.min_points
    }

    #[inline]
    pub fn max_points(&self) -> usize {
        self.max_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_configuration() {
        let cfg = CoarseningConfig::new(0.01, 0.1, 4, 100).unwrap();
        assert_eq!(cfg.tol(), 0.01);
        assert_eq!(cfg.reselection_tol(), 0.1);
        assert_eq!(cfg.min_points(), 4);
        assert_eq!(cfg.max_points(), 100);
    }

    #[test]
    fn rejects_out_of_range_tolerance() {
        assert_eq!(
            CoarseningConfig::new(0.0, 0.1, 1, 2).unwrap_err(),
            TransferError::InvalidTolerance(0.0)
        );
        assert_eq!(
            CoarseningConfig::new(-0.5, 0.1, 1, 2).unwrap_err(),
            TransferError::InvalidTolerance(-0.5)
        );
        assert_eq!(
            CoarseningConfig::new(1.5, 1.5, 1, 2).unwrap_err(),
            TransferError::InvalidTolerance(1.5)
        );
        assert!(matches!(
            CoarseningConfig::new(f64::NAN, 0.1, 1, 2).unwrap_err(),
            TransferError::InvalidTolerance(_)
        ));
    }

    #[test]
    fn rejects_tighter_reselection_tolerance() {
        assert_eq!(
            CoarseningConfig::new(0.1, 0.05, 1, 2).unwrap_err(),
            TransferError::InvalidReselectionTolerance {
                tol: 0.1,
                reselection_tol: 0.05
            }
        );
        // Equal tolerances are allowed.
        assert!(CoarseningConfig::new(0.1, 0.1, 1, 2).is_ok());
    }

    #[test]
    fn rejects_inverted_point_bounds() {
        assert_eq!(
            CoarseningConfig::new(0.1, 0.2, 5, 4).unwrap_err(),
            TransferError::InvalidPointBounds {
                min_points: 5,
                max_points: 4
            }
        );
    }

    #[test]
    fn serde_round_trip() {
        let cfg = CoarseningConfig::new(0.02, 0.2, 3, 50).unwrap();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: CoarseningConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, cfg);
        let bytes = bincode::serialize(&cfg).expect("bincode serialize");
        let back: CoarseningConfig = bincode::deserialize(&bytes).expect("bincode deserialize");
        assert_eq!(back, cfg);
    }
}
