//! Concrete RBF kernel functions.
//!
//! Kernels are consumed as black boxes by the coarsening algorithm: a
//! kernel maps a Euclidean distance `r` to a basis value `phi(r)`. The
//! family here matches what mesh-motion solvers commonly offer; all are
//! usable with the dense direct solve in
//! [`crate::rbf::interpolation`].

/// Radial kernel function, evaluated on the distance between two points.
pub trait RbfKernel: Send + Sync {
    fn phi(&self, r: f64) -> f64;
}

/// Linear kernel with `phi(r) = r`.
#[derive(Clone, Debug, Copy, Default)]
pub struct Linear;

impl RbfKernel for Linear {
    #[inline(always)]
    fn phi(&self, r: f64) -> f64 {
        r
    }
}

/// Thin plate spline kernel with `phi(r) = r^2 log r`.
#[derive(Clone, Debug, Copy, Default)]
pub struct ThinPlateSpline;

impl RbfKernel for ThinPlateSpline {
    #[inline(always)]
    fn phi(&self, r: f64) -> f64 {
        if r.abs() < f64::EPSILON {
            0.0
        } else {
            r.powi(2) * r.ln()
        }
    }
}

/// Gaussian kernel with `phi(r) = exp(-(shape * r)^2)`.
#[derive(Clone, Debug, Copy)]
pub struct Gaussian {
    pub shape: f64,
}

impl Gaussian {
    pub fn new(shape: f64) -> Self {
        Self { shape }
    }
}

impl Default for Gaussian {
    fn default() -> Self {
        Self { shape: 1.0 }
    }
}

impl RbfKernel for Gaussian {
    #[inline(always)]
    fn phi(&self, r: f64) -> f64 {
        (-(self.shape * r).powi(2)).exp()
    }
}

/// Multiquadric kernel with `phi(r) = sqrt(1 + (shape * r)^2)`.
#[derive(Clone, Debug, Copy)]
pub struct Multiquadric {
    pub shape: f64,
}

impl Default for Multiquadric {
    fn default() -> Self {
        Self { shape: 1.0 }
    }
}

impl RbfKernel for Multiquadric {
    #[inline(always)]
    fn phi(&self, r: f64) -> f64 {
        (1.0 + (self.shape * r).powi(2)).sqrt()
    }
}

/// Inverse multiquadric kernel with `phi(r) = 1 / sqrt(1 + (shape * r)^2)`.
#[derive(Clone, Debug, Copy)]
pub struct InverseMultiquadric {
    pub shape: f64,
}

impl Default for InverseMultiquadric {
    fn default() -> Self {
        Self { shape: 1.0 }
    }
}

impl RbfKernel for InverseMultiquadric {
    #[inline(always)]
    fn phi(&self, r: f64) -> f64 {
        1.0 / (1.0 + (self.shape * r).powi(2)).sqrt()
    }
}

/// Wendland C2 compactly supported kernel:
/// `phi(r) = (1 - r/radius)^4 * (4 r/radius + 1)` inside the support
/// radius, zero outside.
#[derive(Clone, Debug, Copy)]
pub struct WendlandC2 {
    pub radius: f64,
}

impl WendlandC2 {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }
}

impl RbfKernel for WendlandC2 {
    #[inline(always)]
    fn phi(&self, r: f64) -> f64 {
        let s = r / self.radius;
        if s >= 1.0 {
            0.0
        } else {
            (1.0 - s).powi(4) * (4.0 * s + 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thin_plate_spline_vanishes_at_origin() {
        let k = ThinPlateSpline;
        assert_eq!(k.phi(0.0), 0.0);
        assert!((k.phi(1.0)).abs() < 1e-15);
        assert!(k.phi(2.0) > 0.0);
    }

    #[test]
    fn gaussian_peaks_at_origin_and_decays() {
        let k = Gaussian::new(2.0);
        assert_eq!(k.phi(0.0), 1.0);
        assert!(k.phi(0.5) < 1.0);
        assert!(k.phi(3.0) < k.phi(0.5));
    }

    #[test]
    fn wendland_c2_has_compact_support() {
        let k = WendlandC2::new(2.0);
        assert_eq!(k.phi(0.0), 1.0);
        assert_eq!(k.phi(2.0), 0.0);
        assert_eq!(k.phi(5.0), 0.0);
        assert!(k.phi(1.0) > 0.0);
    }

    #[test]
    fn multiquadrics_are_reciprocal_at_zero() {
        let mq = Multiquadric::default();
        let imq = InverseMultiquadric::default();
        assert_eq!(mq.phi(0.0), 1.0);
        assert_eq!(imq.phi(0.0), 1.0);
        assert!(mq.phi(1.0) > 1.0);
        assert!(imq.phi(1.0) < 1.0);
    }
}
