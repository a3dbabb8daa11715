//! Shape descriptors derived from second-order central moments.
//!
//! Central moments are laid out as `mu[[p, q]]` with `p` the power of `x`
//! and `q` the power of `y`.

use nalgebra::{Matrix2, matrix};
use ndarray::ArrayView2;

/// Inertia tensor `[[mu20, -mu11], [-mu11, mu02]]` for rotation around the center of mass.
pub(crate) fn inertia_tensor(mu: ArrayView2<f64>) -> Matrix2<f64> {
    let b = -mu[[1, 1]];
    matrix![mu[[2, 0]], b; b, mu[[0, 2]]]
}

/// The 2D Gaussian with the same second-order moments as a source.
///
/// All quantities follow the SExtractor conventions: `a` and `b` are the
/// 1-sigma widths along the major and minor axes, the orientation is the
/// counter-clockwise angle from the `x` axis to the major axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MomentEllipse {
    covariance: Matrix2<f64>,
    eigenvalues: (f64, f64),
}

impl MomentEllipse {
    /// Build from central moments of order two or more.
    ///
    /// A source without flux has a NaN covariance and propagates NaN to all
    /// derived quantities.
    pub(crate) fn from_central_moments(mu: ArrayView2<f64>) -> Self {
        let mu00 = mu[[0, 0]];
        let covariance = matrix![
            mu[[2, 0]], mu[[1, 1]];
            mu[[1, 1]], mu[[0, 2]]
        ] / mu00;

        let eigenvalues = if covariance.iter().all(|v| v.is_finite()) {
            let eigenvalues = covariance.symmetric_eigenvalues();
            (eigenvalues.max(), eigenvalues.min())
        } else {
            (f64::NAN, f64::NAN)
        };

        Self {
            covariance,
            eigenvalues,
        }
    }

    /// Covariance matrix `[[x2, xy], [xy, y2]]`.
    pub(crate) fn covariance(&self) -> Matrix2<f64> {
        self.covariance
    }

    /// Eigenvalues of the covariance matrix, largest first.
    pub(crate) fn eigenvalues(&self) -> (f64, f64) {
        self.eigenvalues
    }

    pub(crate) fn semimajor_sigma(&self) -> f64 {
        self.eigenvalues.0.max(0.).sqrt()
    }

    pub(crate) fn semiminor_sigma(&self) -> f64 {
        self.eigenvalues.1.max(0.).sqrt()
    }

    /// `sqrt(1 - b²/a²)`, in `[0, 1]`; zero for a vanishing major axis.
    pub(crate) fn eccentricity(&self) -> f64 {
        let (l1, l2) = self.eigenvalues;
        if l1 == 0. {
            return 0.;
        }
        (1. - (l2 / l1).clamp(0., 1.)).sqrt()
    }

    /// Angle in radians between the `x` axis and the major axis.
    pub(crate) fn orientation(&self) -> f64 {
        let (a, b, c) = (
            self.covariance[(0, 0)],
            self.covariance[(0, 1)],
            self.covariance[(1, 1)],
        );
        0.5 * (2. * b).atan2(a - c)
    }

    /// `a / b`
    pub(crate) fn elongation(&self) -> f64 {
        self.semimajor_sigma() / self.semiminor_sigma()
    }

    /// `1 - b / a`
    pub(crate) fn ellipticity(&self) -> f64 {
        1. - self.semiminor_sigma() / self.semimajor_sigma()
    }

    /// Coefficients `(cxx, cyy, cxy)` of the ellipse equation
    /// `cxx x² + cyy y² + cxy x y = 1` at one sigma.
    pub(crate) fn coefficients(&self) -> (f64, f64, f64) {
        let (sin, cos) = self.orientation().sin_cos();
        let (a, b) = (self.semimajor_sigma(), self.semiminor_sigma());
        let cxx = (cos / a).powi(2) + (sin / b).powi(2);
        let cyy = (sin / a).powi(2) + (cos / b).powi(2);
        let cxy = 2. * cos * sin * (1. / a.powi(2) - 1. / b.powi(2));
        (cxx, cyy, cxy)
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_4;

    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    use super::*;

    fn central(mu00: f64, mu20: f64, mu11: f64, mu02: f64) -> Array2<f64> {
        let mut mu = Array2::zeros((3, 3));
        mu[[0, 0]] = mu00;
        mu[[2, 0]] = mu20;
        mu[[1, 1]] = mu11;
        mu[[0, 2]] = mu02;
        mu
    }

    #[test]
    fn axis_aligned() {
        let ellipse = MomentEllipse::from_central_moments(central(2., 8., 0., 2.).view());

        assert_eq!(ellipse.covariance(), matrix![4., 0.; 0., 1.]);
        assert_abs_diff_eq!(ellipse.eigenvalues().0, 4., epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.eigenvalues().1, 1., epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.semimajor_sigma(), 2., epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.semiminor_sigma(), 1., epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.eccentricity(), 0.75f64.sqrt(), epsilon = 1e-12);
        assert_eq!(ellipse.orientation(), 0.);
        assert_abs_diff_eq!(ellipse.elongation(), 2., epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.ellipticity(), 0.5, epsilon = 1e-12);

        let (cxx, cyy, cxy) = ellipse.coefficients();
        assert_abs_diff_eq!(cxx, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(cyy, 1., epsilon = 1e-12);
        assert_abs_diff_eq!(cxy, 0., epsilon = 1e-12);
    }

    #[test]
    fn diagonal() {
        let ellipse = MomentEllipse::from_central_moments(central(1., 1., 0.5, 1.).view());

        assert_abs_diff_eq!(ellipse.orientation(), FRAC_PI_4, epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.eigenvalues().0, 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.eigenvalues().1, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn degenerate() {
        let line = MomentEllipse::from_central_moments(central(1., 2., 0., 0.).view());
        assert_eq!(line.eccentricity(), 1.);
        assert_abs_diff_eq!(line.semiminor_sigma(), 0., epsilon = 1e-8);

        let point = MomentEllipse::from_central_moments(central(1., 0., 0., 0.).view());
        assert_eq!(point.eccentricity(), 0.);

        let empty = MomentEllipse::from_central_moments(central(0., 0., 0., 0.).view());
        assert!(empty.eigenvalues().0.is_nan());
        assert!(empty.orientation().is_nan());
    }

    #[test]
    fn inertia() {
        let mu = array![[1., 0., 3.], [0., -2., 0.], [5., 0., 0.]];
        assert_eq!(inertia_tensor(mu.view()), matrix![5., 2.; 2., 3.]);
    }
}
