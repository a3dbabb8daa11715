//! Image moments of a cutout.

use ndarray::{Array2, ArrayView2};

/// Raw moments `m[[p, q]] = Σ x^p y^q I(y, x)` for `p, q <= order`.
///
/// `x` is the column and `y` the row index of the cutout.
pub(crate) fn moments(image: ArrayView2<f64>, order: usize) -> Array2<f64> {
    moments_central(image, (0., 0.), order)
}

/// Central moments `mu[[p, q]] = Σ (x - x_c)^p (y - y_c)^q I(y, x)` for
/// `p, q <= order`, around the center `(y_c, x_c)`.
pub(crate) fn moments_central(image: ArrayView2<f64>, center: (f64, f64), order: usize) -> Array2<f64> {
    let (yc, xc) = center;
    let mut mu = Array2::zeros((order + 1, order + 1));
    for ((y, x), &value) in image.indexed_iter() {
        if value == 0. {
            continue;
        }
        let dx = x as f64 - xc;
        let dy = y as f64 - yc;
        let mut xp = value;
        for p in 0..=order {
            let mut term = xp;
            for q in 0..=order {
                mu[[p, q]] += term;
                term *= dy;
            }
            xp *= dx;
        }
    }
    mu
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn raw_moments() {
        let image = array![[0., 1., 0.], [2., 0., 0.]];
        let m = moments(image.view(), 2);

        assert_eq!(m.dim(), (3, 3));
        assert_eq!(m[[0, 0]], 3.);
        // x moments: 1 * 1 + 2 * 0
        assert_eq!(m[[1, 0]], 1.);
        // y moments: 1 * 0 + 2 * 1
        assert_eq!(m[[0, 1]], 2.);
        assert_eq!(m[[1, 1]], 0.);
        assert_eq!(m[[2, 0]], 1.);
        assert_eq!(m[[0, 2]], 2.);
    }

    #[test]
    fn central_moments_vanish_at_first_order() {
        let image = array![[1., 2., 0.5], [4., 3., 0.], [0., 7., 1.]];
        let m = moments(image.view(), 1);
        let center = (m[[0, 1]] / m[[0, 0]], m[[1, 0]] / m[[0, 0]]);
        let mu = moments_central(image.view(), center, 3);

        assert_abs_diff_eq!(mu[[0, 0]], m[[0, 0]]);
        assert_abs_diff_eq!(mu[[1, 0]], 0., epsilon = 1e-12);
        assert_abs_diff_eq!(mu[[0, 1]], 0., epsilon = 1e-12);
    }

    #[test]
    fn symmetric_source() {
        let image = array![[0., 1., 0.], [1., 4., 1.], [0., 1., 0.]];
        let mu = moments_central(image.view(), (1., 1.), 2);

        assert_eq!(mu[[2, 0]], 2.);
        assert_eq!(mu[[0, 2]], 2.);
        assert_eq!(mu[[1, 1]], 0.);
    }
}
