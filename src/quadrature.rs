//! Adaptive numerical integration in one and two dimensions.
//!
//! Integrals are computed with a recursively bisecting 7/15-point
//! Gauss-Kronrod rule. Infinite limits are handled by a change of variables
//! onto a finite interval, so `f64::NEG_INFINITY`/`f64::INFINITY` are valid
//! bounds.

/// Abscissae of the 15-point Kronrod rule on `[-1, 1]`, non-negative half.
const XGK: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.,
];

/// Weights of the 15-point Kronrod rule.
const WGK: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_2,
    0.140_653_259_715_525_9,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_8,
];

/// Weights of the embedded 7-point Gauss rule, at `XGK[1]`, `XGK[3]`, `XGK[5]`, `XGK[7]`.
const WG: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

/// Tolerances of the adaptive integration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadratureOptions {
    /// Absolute error tolerance.
    pub epsabs: f64,
    /// Relative error tolerance.
    pub epsrel: f64,
    /// Maximum bisection depth.
    pub max_depth: usize,
}

impl Default for QuadratureOptions {
    fn default() -> Self {
        Self {
            epsabs: 1.49e-8,
            epsrel: 1.49e-8,
            max_depth: 30,
        }
    }
}

impl QuadratureOptions {
    /// Set the absolute tolerance.
    pub fn with_epsabs(mut self, epsabs: f64) -> Self {
        self.epsabs = epsabs;
        self
    }

    /// Set the relative tolerance.
    pub fn with_epsrel(mut self, epsrel: f64) -> Self {
        self.epsrel = epsrel;
        self
    }

    /// Set the maximum bisection depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Gauss-Kronrod estimate and error of `f` over `[a, b]`.
fn kronrod(f: &mut impl FnMut(f64) -> f64, a: f64, b: f64) -> (f64, f64) {
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);

    let fc = f(center);
    let mut kronrod = WGK[7] * fc;
    let mut gauss = WG[3] * fc;
    for (i, (x, w)) in XGK.iter().zip(WGK.iter()).take(7).enumerate() {
        let dx = half * x;
        let pair = f(center - dx) + f(center + dx);
        kronrod += w * pair;
        if i % 2 == 1 {
            gauss += WG[i / 2] * pair;
        }
    }
    (kronrod * half, ((kronrod - gauss) * half).abs())
}

fn adapt(
    f: &mut impl FnMut(f64) -> f64,
    a: f64,
    b: f64,
    whole: (f64, f64),
    tolerance: f64,
    depth: usize,
) -> f64 {
    let (estimate, error) = whole;
    if error <= tolerance || depth == 0 || !estimate.is_finite() {
        return estimate;
    }
    let mid = 0.5 * (a + b);
    if mid <= a || mid >= b {
        return estimate;
    }
    let left = kronrod(f, a, mid);
    let right = kronrod(f, mid, b);
    adapt(f, a, mid, left, 0.5 * tolerance, depth - 1)
        + adapt(f, mid, b, right, 0.5 * tolerance, depth - 1)
}

/// Integrate `f` over the finite interval `[a, b]`.
fn quad_finite(f: &mut impl FnMut(f64) -> f64, a: f64, b: f64, options: &QuadratureOptions) -> f64 {
    if a == b {
        return 0.;
    }
    let whole = kronrod(f, a, b);
    let tolerance = options.epsabs.max(options.epsrel * whole.0.abs());
    adapt(f, a, b, whole, tolerance, options.max_depth)
}

/// Integrate `f` over `[a, b]`, where either bound may be infinite.
pub fn quad(mut f: impl FnMut(f64) -> f64, a: f64, b: f64, options: &QuadratureOptions) -> f64 {
    if a > b {
        return -quad(f, b, a, options);
    }
    match (a.is_finite(), b.is_finite()) {
        (true, true) => quad_finite(&mut f, a, b, options),
        // x = t / (1 - t^2), t in (-1, 1)
        (false, false) => quad_finite(
            &mut |t: f64| {
                let d = 1. - t * t;
                f(t / d) * (1. + t * t) / (d * d)
            },
            -1.,
            1.,
            options,
        ),
        // x = a + t / (1 - t), t in [0, 1)
        (true, false) => quad_finite(
            &mut |t: f64| {
                let d = 1. - t;
                f(a + t / d) / (d * d)
            },
            0.,
            1.,
            options,
        ),
        // x = b - t / (1 - t), t in [0, 1)
        (false, true) => quad_finite(
            &mut |t: f64| {
                let d = 1. - t;
                f(b - t / d) / (d * d)
            },
            0.,
            1.,
            options,
        ),
    }
}

/// Integrate `f(x, y)` over the rectangle `[x0, x1] × [y0, y1]`.
///
/// The inner integral runs over `x` for every `y` node of the outer integral.
/// Any bound may be infinite.
pub fn dblquad(
    f: impl Fn(f64, f64) -> f64,
    (x0, x1): (f64, f64),
    (y0, y1): (f64, f64),
    options: &QuadratureOptions,
) -> f64 {
    quad(
        |y| quad(|x| f(x, y), x0, x1, options),
        y0,
        y1,
        options,
    )
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn polynomial_exact() {
        let options = QuadratureOptions::default();
        let value = quad(|x| 3. * x * x - 2. * x + 1., -1., 2., &options);
        assert_abs_diff_eq!(value, 9., epsilon = 1e-12);
    }

    #[test]
    fn reversed_bounds() {
        let options = QuadratureOptions::default();
        assert_abs_diff_eq!(quad(|x| x, 1., 0., &options), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn oscillating() {
        let options = QuadratureOptions::default();
        let value = quad(f64::sin, 0., 10. * PI, &options);
        assert_abs_diff_eq!(value, 0., epsilon = 1e-7);
    }

    #[test]
    fn gaussian_infinite() {
        let options = QuadratureOptions::default();
        let value = quad(|x| (-0.5 * x * x).exp(), f64::NEG_INFINITY, f64::INFINITY, &options);
        assert_abs_diff_eq!(value, (2. * PI).sqrt(), epsilon = 1e-7);
    }

    #[test]
    fn half_infinite() {
        let options = QuadratureOptions::default();
        assert_abs_diff_eq!(quad(|x| (-x).exp(), 0., f64::INFINITY, &options), 1., epsilon = 1e-7);
        assert_abs_diff_eq!(
            quad(|x| x.exp(), f64::NEG_INFINITY, 0., &options),
            1.,
            epsilon = 1e-7
        );
    }

    #[test]
    fn double_integral() {
        let options = QuadratureOptions::default();
        let value = dblquad(|x, y| x * y * y, (0., 2.), (0., 1.), &options);
        assert_abs_diff_eq!(value, 2. / 3., epsilon = 1e-10);

        let gauss = dblquad(
            |x, y| (-0.5 * (x * x + y * y)).exp(),
            (f64::NEG_INFINITY, f64::INFINITY),
            (f64::NEG_INFINITY, f64::INFINITY),
            &options,
        );
        assert_abs_diff_eq!(gauss, 2. * PI, epsilon = 1e-6);
    }
}
