//! TransferError: unified error type for rbf-transfer public APIs.
//!
//! Every fallible public API in this crate reports failures through this
//! type instead of panicking. Configuration violations are caught at
//! construction time; shape and layout mismatches indicate an internal
//! inconsistency between the selector and the projector and are surfaced
//! rather than repaired.

use thiserror::Error;

/// Unified error type for rbf-transfer operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    /// Greedy tolerance outside the valid range `0 < tol <= 1`.
    #[error("invalid greedy tolerance {0}: must satisfy 0 < tol <= 1")]
    InvalidTolerance(f64),
    /// Reselection tolerance must be at least as loose as the greedy tolerance.
    #[error("invalid reselection tolerance {reselection_tol}: must be >= greedy tolerance {tol}")]
    InvalidReselectionTolerance { tol: f64, reselection_tol: f64 },
    /// Point-count bounds are inverted.
    #[error("invalid point bounds: max_points {max_points} < min_points {min_points}")]
    InvalidPointBounds {
        min_points: usize,
        max_points: usize,
    },
    /// A field was built with zero columns.
    #[error("invalid field shape: {rows} rows x {width} columns")]
    InvalidShape { rows: usize, width: usize },
    /// Two fields that must agree in shape do not.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// Two fields that must share a row distribution do not.
    #[error(
        "row layout mismatch: {expected} rows on {expected_ranks} ranks vs {found} rows on {found_ranks} ranks"
    )]
    LayoutMismatch {
        expected: usize,
        expected_ranks: usize,
        found: usize,
        found_ranks: usize,
    },
    /// A global row index fell outside the field.
    #[error("row index {row} out of bounds for field with {rows} rows")]
    RowOutOfBounds { row: usize, rows: usize },
    /// A reduction was requested on a field with no rows.
    #[error("reduction over an empty field")]
    EmptyField,
    /// An interpolation operator was built over an empty selection.
    #[error("cannot build an interpolant from an empty point selection")]
    EmptySelection,
    /// `compute` was given an empty position set.
    #[error("position set is empty")]
    EmptyPositionSet,
    /// `interpolate` was called before `compute`.
    #[error("interpolate called before compute")]
    NotComputed,
    /// A reduced-data buffer does not match the current selection.
    #[error("selection length mismatch: selection has {expected} points, buffer has {found} rows")]
    SelectionLengthMismatch { expected: usize, found: usize },
    /// A point-to-point exchange with a neighbor rank failed.
    #[error("communication error with rank {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },
}
