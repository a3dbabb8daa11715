//! PSF model backed by an interpolated image.

use std::sync::Arc;

use log::debug;
use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};
use crate::ndarray_utils::IntoNdarray2;
use crate::psf::{Parameter, Parameters, PsfModel};
use crate::spline::{BivariateSpline, Interpolator2D};

/// Construction options of a [`GridModel`].
///
/// Use the `with_*` functions to deviate from the defaults:
/// origin at the image center, no weights, fill value `0`, bicubic
/// interpolation without smoothing and the flux taken from the image sum.
#[derive(Clone, Debug, PartialEq)]
pub struct GridOptions {
    /// Position `(x, y)` in image pixels where model coordinates are zero.
    pub origin: Option<(f64, f64)>,
    /// Per-pixel weights, carried along for fitters.
    pub weights: Option<Array2<f64>>,
    /// Value returned outside the image. `None` lets the interpolator extrapolate.
    pub fill_value: Option<f64>,
    /// Interpolation degree along `(x, y)`.
    pub degree: (usize, usize),
    /// Smoothing factor of the interpolator, `0` interpolates exactly.
    pub smoothing: f64,
    /// Initial flux. Defaults to the sum of the image.
    pub flux: Option<f64>,
    /// Initial shift along x.
    pub x_0: f64,
    /// Initial shift along y.
    pub y_0: f64,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            origin: None,
            weights: None,
            fill_value: Some(0.),
            degree: (3, 3),
            smoothing: 0.,
            flux: None,
            x_0: 0.,
            y_0: 0.,
        }
    }
}

impl GridOptions {
    /// Set the coordinate origin.
    pub fn with_origin(mut self, x: f64, y: f64) -> Self {
        self.origin = Some((x, y));
        self
    }

    /// Attach per-pixel weights.
    pub fn with_weights(mut self, weights: Array2<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Set the fill value for positions outside of the image.
    pub fn with_fill_value(mut self, fill_value: Option<f64>) -> Self {
        self.fill_value = fill_value;
        self
    }

    /// Use the same interpolation degree along both axes.
    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = (degree, degree);
        self
    }

    /// Set separate interpolation degrees along x and y.
    pub fn with_degrees(mut self, degree_x: usize, degree_y: usize) -> Self {
        self.degree = (degree_x, degree_y);
        self
    }

    /// Set the smoothing factor.
    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Set the initial flux.
    pub fn with_flux(mut self, flux: f64) -> Self {
        self.flux = Some(flux);
        self
    }

    /// Set the initial shifts.
    pub fn with_shift(mut self, x_0: f64, y_0: f64) -> Self {
        self.x_0 = x_0;
        self.y_0 = y_0;
        self
    }
}

/// A discrete image turned into a continuous, fittable model.
///
/// The image is stored normalized to unit sum and evaluated at fractional
/// positions through an [`Interpolator2D`] (a [`BivariateSpline`] unless
/// replaced). The model has three parameters: `flux`, the total flux, and the
/// shifts `x_0`, `y_0` relative to the origin.
///
/// Weights can be stored with the model so that they travel to a fitter; the
/// interpolation itself does not use them.
#[derive(Clone, Debug)]
pub struct GridModel {
    normalized: Array2<f64>,
    weights: Option<Array2<f64>>,
    origin: (f64, f64),
    fill_value: Option<f64>,
    degree: (usize, usize),
    smoothing: f64,
    interpolator: Arc<dyn Interpolator2D>,
    parameters: Parameters,
}

impl GridModel {
    /// Build a model from an image.
    ///
    /// If the image sum is zero or not finite, the image is used unscaled.
    pub fn new<A>(data: A, options: GridOptions) -> Result<Self>
    where
        A: IntoNdarray2<Out = Array2<f64>>,
    {
        let data = data.into_ndarray2();
        if let Some(weights) = &options.weights {
            if weights.dim() != data.dim() {
                return Err(Error::ShapeMismatch {
                    what: "weights",
                    expected: data.shape().to_vec(),
                    found: weights.shape().to_vec(),
                });
            }
        }

        let mut total = data.sum();
        if total == 0. || !total.is_finite() {
            debug!("Image sum is {total}, using unit normalization.");
            total = 1.;
        }
        let normalized = data / total;
        let (ny, nx) = normalized.dim();
        let origin = options
            .origin
            .unwrap_or(((nx as f64 - 1.) / 2., (ny as f64 - 1.) / 2.));

        let interpolator = Self::compute_interpolator(normalized.view(), options.degree, options.smoothing)?;
        let parameters = Parameters::new(vec![
            Parameter::new("flux", options.flux.unwrap_or(total)),
            Parameter::new("x_0", options.x_0),
            Parameter::new("y_0", options.y_0),
        ]);

        Ok(Self {
            normalized,
            weights: options.weights,
            origin,
            fill_value: options.fill_value,
            degree: options.degree,
            smoothing: options.smoothing,
            interpolator,
            parameters,
        })
    }

    fn compute_interpolator(
        normalized: ArrayView2<f64>,
        degree: (usize, usize),
        smoothing: f64,
    ) -> Result<Arc<dyn Interpolator2D>> {
        let (ny, nx) = normalized.dim();
        let x: Vec<f64> = (0..nx).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..ny).map(|i| i as f64).collect();
        let spline = BivariateSpline::new(&x, &y, normalized.t(), degree, smoothing)?;
        Ok(Arc::new(spline))
    }

    /// Change the degree and smoothing of the interpolating spline.
    ///
    /// This rebuilds the interpolator, which is comparatively expensive.
    pub fn set_interpolator_options(&mut self, degree: (usize, usize), smoothing: f64) -> Result<()> {
        self.interpolator = Self::compute_interpolator(self.normalized.view(), degree, smoothing)?;
        self.degree = degree;
        self.smoothing = smoothing;
        Ok(())
    }

    /// Replace the interpolator by a custom one working on the normalized image.
    pub fn set_interpolator(&mut self, interpolator: Arc<dyn Interpolator2D>) {
        self.interpolator = interpolator;
    }

    /// Interpolation degree along `(x, y)`.
    pub fn degree(&self) -> (usize, usize) {
        self.degree
    }

    /// Smoothing factor of the interpolator.
    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// The image normalized to unit sum.
    pub fn normalized_data(&self) -> ArrayView2<f64> {
        self.normalized.view()
    }

    /// The image scaled to the current flux.
    pub fn data(&self) -> Array2<f64> {
        &self.normalized * self.flux()
    }

    /// Current value of the `flux` parameter.
    pub fn flux(&self) -> f64 {
        self.parameters.get("flux").unwrap_or(1.)
    }

    /// Per-pixel weights, if any.
    pub fn weights(&self) -> Option<ArrayView2<f64>> {
        self.weights.as_ref().map(|w| w.view())
    }

    /// Replace the per-pixel weights.
    pub fn set_weights(&mut self, weights: Option<Array2<f64>>) -> Result<()> {
        if let Some(w) = &weights {
            if w.dim() != self.normalized.dim() {
                return Err(Error::ShapeMismatch {
                    what: "weights",
                    expected: self.normalized.shape().to_vec(),
                    found: w.shape().to_vec(),
                });
            }
        }
        self.weights = weights;
        Ok(())
    }

    /// Shape `(ny, nx)` of the image.
    pub fn shape(&self) -> (usize, usize) {
        self.normalized.dim()
    }

    /// Number of columns.
    pub fn nx(&self) -> usize {
        self.normalized.ncols()
    }

    /// Number of rows.
    pub fn ny(&self) -> usize {
        self.normalized.nrows()
    }

    /// Origin `(x, y)` of the model coordinates in image pixels.
    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    /// Move the origin; `None` resets it to the image center.
    ///
    /// This does not adjust `x_0` and `y_0`.
    pub fn set_origin(&mut self, origin: Option<(f64, f64)>) {
        let (ny, nx) = self.shape();
        self.origin = origin.unwrap_or(((nx as f64 - 1.) / 2., (ny as f64 - 1.) / 2.));
    }

    /// Value returned outside of the image.
    pub fn fill_value(&self) -> Option<f64> {
        self.fill_value
    }

    /// Set the value returned outside of the image.
    pub fn set_fill_value(&mut self, fill_value: Option<f64>) {
        self.fill_value = fill_value;
    }

    /// Fold the current shifts into the origin and reset them to zero.
    ///
    /// The evaluated model does not change.
    pub fn recenter(&mut self) {
        let values = self.parameters.values();
        let (x_0, y_0) = (values[1], values[2]);
        self.origin.0 -= x_0;
        self.origin.1 -= y_0;
        self.parameters.set_at(1, 0.);
        self.parameters.set_at(2, 0.);
    }
}

impl PsfModel for GridModel {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn value(&self, x: f64, y: f64, params: &[f64]) -> f64 {
        let [flux, x_0, y_0] = [params[0], params[1], params[2]];
        let xi = x + (self.origin.0 - x_0);
        let yi = y + (self.origin.1 - y_0);
        if !xi.is_finite() || !yi.is_finite() {
            return self.fill_value.unwrap_or(f64::NAN);
        }

        if let Some(fill_value) = self.fill_value {
            let (ny, nx) = self.shape();
            if xi < 0. || xi > (nx - 1) as f64 || yi < 0. || yi > (ny - 1) as f64 {
                return fill_value;
            }
        }
        flux * self.interpolator.ev(xi, yi)
    }

    fn clone_box(&self) -> Box<dyn PsfModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;
    use ndarray::{Array1, Array2, array};

    use super::*;
    use crate::psf::pixel_grid;

    fn gaussian_image(n: usize, sigma: f64) -> Array2<f64> {
        let c = (n as f64 - 1.) / 2.;
        Array2::from_shape_fn((n, n), |(y, x)| {
            let r2 = (x as f64 - c).powi(2) + (y as f64 - c).powi(2);
            100. * (-r2 / (2. * sigma * sigma)).exp()
        })
    }

    #[test]
    fn flux_normalization() {
        let image = gaussian_image(9, 1.5);
        let total = image.sum();
        let mut model = GridModel::new(image, GridOptions::default()).unwrap();

        assert_abs_diff_eq!(model.normalized_data().sum(), 1., epsilon = 1e-12);
        assert_abs_diff_eq!(model.flux(), total, epsilon = 1e-9);

        for flux in [0.5, 1., 42., 1e6] {
            model.parameters_mut().set("flux", flux).unwrap();
            assert_abs_diff_eq!(model.data().sum(), flux, epsilon = 1e-9 * flux);
        }
    }

    #[test]
    fn degenerate_sum() {
        let image = array![[1., -1.], [2., -2.]];
        let model = GridModel::new(image.clone(), GridOptions::default().with_degree(1)).unwrap();

        assert_eq!(model.normalized_data(), image.view());
        assert_eq!(model.flux(), 1.);
    }

    #[test]
    fn explicit_flux() {
        let model = GridModel::new(gaussian_image(7, 1.), GridOptions::default().with_flux(3.)).unwrap();
        assert_eq!(model.flux(), 3.);
        assert_abs_diff_eq!(model.data().sum(), 3., epsilon = 1e-12);
    }

    #[test]
    fn reproduces_pixels() {
        let image = gaussian_image(7, 1.2);
        let model = GridModel::new(image.clone(), GridOptions::default()).unwrap();
        let (ox, oy) = model.origin();
        assert_eq!((ox, oy), (3., 3.));

        let rendered = model.render((7, 7));
        // rendering at pixel centers is shifted by the origin
        let x = Array1::from_iter((0..7).map(|i| i as f64 - ox));
        let y = Array1::from_elem(7, 2. - oy);
        let row = model.evaluate(x.view().into_dyn(), y.view().into_dyn());
        for (v, expected) in row.iter().zip(image.row(2)) {
            assert_abs_diff_eq!(*v, *expected, epsilon = 1e-9);
        }
        // everything but the central pixel maps outside the grid
        assert_abs_diff_eq!(rendered[[0, 0]], image[[3, 3]], epsilon = 1e-9);
        assert_eq!(rendered[[6, 6]], 0.);
    }

    #[test]
    fn fill_value() {
        let model = GridModel::new(
            gaussian_image(5, 1.),
            GridOptions::default().with_fill_value(Some(-1.)),
        )
        .unwrap();
        let params = model.parameters().values();

        assert_eq!(model.value(2.5, 0., &params), -1.);
        assert_eq!(model.value(0., -2.01, &params), -1.);
        assert!(model.value(2., 2., &params) > 0.);
    }

    #[test]
    fn non_finite_positions() {
        let model = GridModel::new(gaussian_image(7, 1.), GridOptions::default()).unwrap();
        let params = model.parameters().values();

        assert_eq!(model.value(f64::NAN, 3., &params), 0.);
        assert_eq!(model.value(3., f64::INFINITY, &params), 0.);
        assert_eq!(model.value(3., 3., &[1., f64::NAN, 0.]), 0.);

        let model = GridModel::new(
            gaussian_image(7, 1.),
            GridOptions::default().with_fill_value(None),
        )
        .unwrap();
        assert!(model.value(f64::NAN, 3., &params).is_nan());
        assert!(model.value(3., f64::NEG_INFINITY, &params).is_nan());
        assert!(model.value(3., 3., &params).is_finite());
    }

    #[test]
    fn shifted_evaluation() {
        let image = gaussian_image(9, 1.5);
        let model = GridModel::new(image.clone(), GridOptions::default().with_shift(1., -1.)).unwrap();
        let params = model.parameters().values();

        // the peak moves with the shift
        assert_abs_diff_eq!(model.value(1., -1., &params), image[[4, 4]], epsilon = 1e-9);
    }

    #[test]
    fn recenter_keeps_output() {
        let image = gaussian_image(11, 2.);
        let mut model = GridModel::new(image, GridOptions::default().with_shift(0.3, -0.7)).unwrap();
        let (x, y) = pixel_grid((5, 5));
        let x = x - 2.;
        let y = y - 2.;

        let before = model.evaluate(x.view().into_dyn(), y.view().into_dyn());
        model.recenter();
        let after = model.evaluate(x.view().into_dyn(), y.view().into_dyn());

        assert_eq!(model.parameters().get("x_0"), Some(0.));
        assert_eq!(model.parameters().get("y_0"), Some(0.));
        assert_abs_diff_eq!(model.origin().0, 5. - 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(before, after, epsilon = 1e-12);
    }

    #[test]
    fn interpolator_options() {
        let image = array![[0., 0., 0.], [0., 4., 0.], [0., 0., 0.]];
        let mut model = GridModel::new(image, GridOptions::default().with_degree(1)).unwrap();
        let params = model.parameters().values();

        assert_abs_diff_eq!(model.value(0.5, 0., &params), 2., epsilon = 1e-12);

        model.set_interpolator_options((2, 2), 0.).unwrap();
        assert_eq!(model.degree(), (2, 2));
        assert_abs_diff_eq!(model.value(0., 0., &params), 4., epsilon = 1e-12);
    }

    #[test]
    fn invalid_degree() {
        let image = Array2::<f64>::ones((3, 3));
        let result = GridModel::new(image, GridOptions::default());
        assert!(matches!(result, Err(Error::Interpolator(_))));
    }

    #[test]
    fn weights_shape() {
        let result = GridModel::new(
            gaussian_image(5, 1.),
            GridOptions::default().with_weights(Array2::ones((4, 5))),
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { what: "weights", .. })));
    }

    #[test]
    fn from_nalgebra() {
        let matrix = DMatrix::from_fn(5, 6, |i, j| (i + j) as f64);
        let model = GridModel::new(matrix, GridOptions::default()).unwrap();
        assert_eq!(model.shape(), (5, 6));
        assert_eq!(model.origin(), (2.5, 2.));
    }
}
