//! The greedy selection is driven by a *relative* error, so uniformly
//! scaling the value field must never change which points get selected.

use proptest::prelude::*;
use rbf_transfer::prelude::*;
use std::sync::Arc;

fn grid_positions(nx: usize, ny: usize) -> Vec<f64> {
    let mut pts = Vec::with_capacity(nx * ny * 2);
    for j in 0..ny {
        for i in 0..nx {
            pts.push(i as f64);
            pts.push(j as f64);
        }
    }
    pts
}

/// Fixed mildly rough field over a 4x3 grid (two bumps of different width).
fn base_values(positions: &[f64]) -> Vec<f64> {
    positions
        .chunks(2)
        .map(|p| {
            let r1 = ((p[0] - 1.0).powi(2) + (p[1] - 1.0).powi(2)).sqrt();
            let r2 = ((p[0] - 3.0).powi(2) + (p[1] - 2.0).powi(2)).sqrt();
            (-(1.2 * r1).powi(2)).exp() - 0.6 * (-(0.7 * r2).powi(2)).exp()
        })
        .collect()
}

fn select_for(values: &[f64]) -> Vec<usize> {
    let positions = grid_positions(4, 3);
    let comm = Arc::new(NoComm);
    let config = CoarseningConfig::new(0.05, 0.1, 2, 8).unwrap();
    let mut sel = AdaptiveCoarsening::new(config);
    sel.compute(
        Arc::new(Gaussian::new(0.9)),
        DistField::from_global(Arc::clone(&comm), 2, &positions).unwrap(),
        DistField::from_global(Arc::clone(&comm), 2, &positions).unwrap(),
    )
    .unwrap();
    sel.interpolate(&DistField::from_global(comm, 1, values).unwrap())
        .unwrap();
    sel.selection().to_vec()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn selection_is_invariant_under_uniform_scaling(
        scale in prop_oneof![0.001f64..1000.0, -1000.0f64..-0.001],
    ) {
        let positions = grid_positions(4, 3);
        let base = base_values(&positions);
        let scaled: Vec<f64> = base.iter().map(|v| scale * v).collect();

        let baseline = select_for(&base);
        let selection = select_for(&scaled);
        prop_assert_eq!(selection, baseline);
    }
}

#[test]
fn scaling_preserves_interpolated_shape() {
    // Beyond the selection, the interpolated field itself scales
    // linearly with the input.
    let positions = grid_positions(4, 3);
    let base = base_values(&positions);
    let scaled: Vec<f64> = base.iter().map(|v| -2.0 * v).collect();

    let comm = Arc::new(NoComm);
    let make = || {
        let config = CoarseningConfig::new(0.05, 0.1, 2, 8).unwrap();
        let mut sel = AdaptiveCoarsening::new(config);
        sel.compute(
            Arc::new(Gaussian::new(0.9)),
            DistField::from_global(Arc::clone(&comm), 2, &positions).unwrap(),
            DistField::from_global(Arc::clone(&comm), 2, &positions).unwrap(),
        )
        .unwrap();
        sel
    };

    let mut sel_a = make();
    let out_a = sel_a
        .interpolate(&DistField::from_global(Arc::clone(&comm), 1, &base).unwrap())
        .unwrap();
    let mut sel_b = make();
    let out_b = sel_b
        .interpolate(&DistField::from_global(Arc::clone(&comm), 1, &scaled).unwrap())
        .unwrap();

    for (a, b) in out_a.local_slice().iter().zip(out_b.local_slice()) {
        assert!((b + 2.0 * a).abs() < 1e-9, "expected {} got {}", -2.0 * a, b);
    }
}
