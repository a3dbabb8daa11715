//! Tensor-product B-spline surfaces on rectangular grids.
//!
//! [`BivariateSpline`] is the default [`Interpolator2D`] used by
//! [`GridModel`](crate::GridModel). With a smoothing factor of zero the surface
//! passes exactly through the grid values. Knots follow the usual not-a-knot
//! placement: for odd degrees the interior knots sit on the data points, for
//! even degrees halfway between them.
//!
//! A positive smoothing factor switches to a penalized least-squares fit on the
//! same knots, with a second-order difference penalty on the coefficients
//! weighted by the smoothing factor along each axis.

use std::fmt::Debug;

use itertools::Itertools;
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};

/// Evaluates a surface sampled on a grid at arbitrary positions.
pub trait Interpolator2D: Debug + Send + Sync {
    /// Surface value at `(x, y)`.
    fn ev(&self, x: f64, y: f64) -> f64;
}

/// A univariate B-spline basis on a fixed knot vector.
#[derive(Clone, Debug, PartialEq)]
struct Basis {
    knots: Vec<f64>,
    degree: usize,
}

impl Basis {
    /// Knots for interpolating at the sites `x`.
    fn interpolating(x: &[f64], degree: usize) -> Self {
        let n = x.len();
        let first = x[0];
        let last = x[n - 1];
        let interior = if degree % 2 == 1 {
            let half = (degree + 1) / 2;
            x[half..n - half].to_vec()
        } else {
            let half = degree / 2;
            x.iter()
                .tuple_windows()
                .map(|(a, b)| 0.5 * (a + b))
                .skip(half)
                .take(n - degree - 1)
                .collect()
        };

        let knots = std::iter::repeat_n(first, degree + 1)
            .chain(interior)
            .chain(std::iter::repeat_n(last, degree + 1))
            .collect();
        Self { knots, degree }
    }

    /// Number of basis functions.
    fn len(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    /// Index `l` of the knot span containing `x`, clamped to the valid range
    /// so that positions outside the knot vector extrapolate the end pieces.
    fn span(&self, x: f64) -> usize {
        let k = self.degree;
        let n = self.len();
        if x >= self.knots[n] {
            return n - 1;
        }
        if x.is_nan() || x <= self.knots[k] {
            return k;
        }
        // last l in k..n with knots[l] <= x
        let upper = self.knots[k..=n].partition_point(|&t| t <= x);
        (k + upper - 1).min(n - 1)
    }

    /// Span index and the `degree + 1` non-zero basis functions at `x`
    /// (Cox-de Boor recursion).
    fn eval(&self, x: f64) -> (usize, Vec<f64>) {
        let k = self.degree;
        let l = self.span(x);
        let t = &self.knots;

        let mut values = vec![0.; k + 1];
        let mut left = vec![0.; k + 1];
        let mut right = vec![0.; k + 1];
        values[0] = 1.;
        for j in 1..=k {
            left[j] = x - t[l + 1 - j];
            right[j] = t[l + j] - x;
            let mut saved = 0.;
            for r in 0..j {
                let temp = values[r] / (right[r + 1] + left[j - r]);
                values[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            values[j] = saved;
        }
        (l, values)
    }

    /// Collocation matrix `B[i, j] = N_j(x_i)`.
    fn collocation(&self, x: &[f64]) -> DMatrix<f64> {
        let mut b = DMatrix::zeros(x.len(), self.len());
        for (i, &xi) in x.iter().enumerate() {
            let (l, values) = self.eval(xi);
            for (r, v) in values.into_iter().enumerate() {
                b[(i, l - self.degree + r)] = v;
            }
        }
        b
    }

    /// The operator mapping data along this axis to spline coefficients.
    fn solver(&self, x: &[f64], smoothing: f64) -> Result<DMatrix<f64>> {
        let b = self.collocation(x);
        let inverse = if smoothing == 0. {
            b.clone().try_inverse()
        } else {
            let n = self.len();
            let mut d = DMatrix::zeros(n.saturating_sub(2), n);
            for i in 0..n.saturating_sub(2) {
                d[(i, i)] = 1.;
                d[(i, i + 1)] = -2.;
                d[(i, i + 2)] = 1.;
            }
            let normal = b.transpose() * &b + d.transpose() * d * smoothing;
            normal.try_inverse().map(|inv| inv * b.transpose())
        };
        inverse.ok_or_else(|| Error::Interpolator("singular collocation matrix".to_string()))
    }
}

/// Bivariate spline over a rectangular grid, in the spirit of FITPACK's `regrid`.
///
/// Grid values are given as `z[[ix, iy]]` at the sites `x[ix]`, `y[iy]`.
#[derive(Clone, Debug, PartialEq)]
pub struct BivariateSpline {
    basis_x: Basis,
    basis_y: Basis,
    /// Coefficients, shape `(n_basis_x, n_basis_y)`.
    coefficients: Array2<f64>,
}

impl BivariateSpline {
    /// Fit a spline of degrees `(kx, ky)` through `z` sampled at `x` and `y`.
    ///
    /// # Errors
    /// Fails if the sites are not strictly increasing, if the shape of `z`
    /// does not match the sites, if an axis has no more points than its
    /// degree, or if the smoothing factor is negative or not finite.
    pub fn new(
        x: &[f64],
        y: &[f64],
        z: ArrayView2<f64>,
        degree: (usize, usize),
        smoothing: f64,
    ) -> Result<Self> {
        let (kx, ky) = degree;
        if z.dim() != (x.len(), y.len()) {
            return Err(Error::Interpolator(format!(
                "grid values of shape {:?} do not match {} x {} sites",
                z.shape(),
                x.len(),
                y.len()
            )));
        }
        if x.len() <= kx || y.len() <= ky {
            return Err(Error::Interpolator(format!(
                "degree ({kx}, {ky}) needs more than that many grid points, got ({}, {})",
                x.len(),
                y.len()
            )));
        }
        if !(smoothing >= 0. && smoothing.is_finite()) {
            return Err(Error::Interpolator(format!(
                "smoothing factor must be non-negative, got {smoothing}"
            )));
        }
        let increasing = |v: &[f64]| v.iter().tuple_windows().all(|(a, b)| a < b);
        if !increasing(x) || !increasing(y) {
            return Err(Error::Interpolator(
                "grid sites must be strictly increasing".to_string(),
            ));
        }

        let basis_x = Basis::interpolating(x, kx);
        let basis_y = Basis::interpolating(y, ky);
        let solve_x = basis_x.solver(x, smoothing)?;
        let solve_y = basis_y.solver(y, smoothing)?;

        let z = DMatrix::from_fn(x.len(), y.len(), |i, j| z[[i, j]]);
        let c = solve_x * z * solve_y.transpose();
        let coefficients = Array2::from_shape_fn((c.nrows(), c.ncols()), |(i, j)| c[(i, j)]);

        Ok(Self {
            basis_x,
            basis_y,
            coefficients,
        })
    }

    /// Spline degrees `(kx, ky)`.
    pub fn degree(&self) -> (usize, usize) {
        (self.basis_x.degree, self.basis_y.degree)
    }
}

impl Interpolator2D for BivariateSpline {
    fn ev(&self, x: f64, y: f64) -> f64 {
        if x.is_nan() || y.is_nan() {
            return f64::NAN;
        }
        let (lx, bx) = self.basis_x.eval(x);
        let (ly, by) = self.basis_y.eval(y);
        let ox = lx - self.basis_x.degree;
        let oy = ly - self.basis_y.degree;

        bx.iter()
            .enumerate()
            .map(|(i, wx)| {
                by.iter()
                    .enumerate()
                    .map(|(j, wy)| wy * self.coefficients[[ox + i, oy + j]])
                    .sum::<f64>()
                    * wx
            })
            .sum()
    }
}
