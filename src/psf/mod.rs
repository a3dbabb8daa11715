//! Models for PSF/PRF fitting photometry.
//!
//! Every model implements [`PsfModel`]: it owns a [`Parameters`] record and
//! evaluates pointwise for an explicit parameter vector, so the same object can
//! be rendered with its current values or handed to an external fitter that
//! varies the free parameters.
//!
//! A *PSF* is the continuous response of the optics, a *PRF* is that response
//! integrated over the area of a pixel. [`IntegratedGaussianPrf`],
//! [`DiscretePrf`] and [`PrfAdapter`] are PRFs; [`Gaussian2D`] is a PSF.

use std::fmt::Debug;

use ndarray::{Array2, ArrayD, ArrayViewD, Zip};

use crate::error::Result;

pub(crate) mod adapter;
pub(crate) mod compound;
pub(crate) mod discrete;
pub(crate) mod gaussian;
pub(crate) mod grid;
pub(crate) mod parameters;

pub use adapter::PrfAdapter;
pub use compound::{GroupedPsf, PreparedPsf, Star, grouped_psf_model, prepare_psf_model};
pub use discrete::{CombineMode, DiscretePrf, PrfFromImageOptions};
pub use gaussian::{Gaussian2D, IntegratedGaussianPrf};
pub use grid::{GridModel, GridOptions};
pub use parameters::{Parameter, Parameters};

/// Pixel window `((y_min, y_max), (x_min, x_max))` outside of which a model is negligible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    /// Inclusive row limits.
    pub y: (i64, i64),
    /// Inclusive column limits.
    pub x: (i64, i64),
}

/// Common interface of all PSF and PRF models.
pub trait PsfModel: Debug + Send + Sync {
    /// The parameters owned by this model.
    fn parameters(&self) -> &Parameters;

    /// Mutable access to the parameters.
    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Evaluate at a single position for the parameter vector `params`,
    /// laid out in the order of [`Parameters::names`].
    fn value(&self, x: f64, y: f64, params: &[f64]) -> f64;

    /// Copy the model into a new box.
    fn clone_box(&self) -> Box<dyn PsfModel>;

    /// Evaluate at every position of the coordinate arrays `x` and `y`.
    ///
    /// # Panics
    /// Panics if `x` and `y` have different shapes.
    fn evaluate_with(&self, x: ArrayViewD<f64>, y: ArrayViewD<f64>, params: &[f64]) -> ArrayD<f64> {
        Zip::from(&x)
            .and(&y)
            .map_collect(|&x, &y| self.value(x, y, params))
    }

    /// Evaluate with the current parameter values.
    fn evaluate(&self, x: ArrayViewD<f64>, y: ArrayViewD<f64>) -> ArrayD<f64> {
        self.evaluate_with(x, y, &self.parameters().values())
    }

    /// Evaluate on the pixel centers of an image of shape `(ny, nx)`.
    fn render(&self, shape: (usize, usize)) -> Array2<f64> {
        let params = self.parameters().values();
        Array2::from_shape_fn(shape, |(y, x)| self.value(x as f64, y as f64, &params))
    }

    /// Region outside of which the model may be treated as zero, if known.
    fn bounding_box(&self) -> Option<BoundingBox> {
        None
    }

    /// Names of the parameters an external fitter may vary.
    fn free_parameter_names(&self) -> Vec<String> {
        self.parameters()
            .free_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Evaluate with the free parameters replaced by `free`.
    fn evaluate_free(
        &self,
        x: ArrayViewD<f64>,
        y: ArrayViewD<f64>,
        free: &[f64],
    ) -> Result<ArrayD<f64>> {
        let params = self.parameters().with_free_values(free)?;
        Ok(self.evaluate_with(x, y, &params))
    }
}

impl Clone for Box<dyn PsfModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Coordinate grids `(x, y)` of the pixel centers of an image of shape `(ny, nx)`.
pub fn pixel_grid(shape: (usize, usize)) -> (Array2<f64>, Array2<f64>) {
    let x = Array2::from_shape_fn(shape, |(_, x)| x as f64);
    let y = Array2::from_shape_fn(shape, |(y, _)| y as f64);
    (x, y)
}
