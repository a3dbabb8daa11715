//! Turning a PSF into a PRF by integrating over pixels.

use log::debug;

use crate::error::{Error, Result};
use crate::psf::{Parameter, Parameters, PsfModel};
use crate::quadrature::{QuadratureOptions, dblquad};

/// Integral of a model over the whole plane for the given parameters.
pub(crate) fn total_integral(psf: &dyn PsfModel, params: &[f64], options: &QuadratureOptions) -> Result<f64> {
    let integral = dblquad(
        |x, y| psf.value(x, y, params),
        (f64::NEG_INFINITY, f64::INFINITY),
        (f64::NEG_INFINITY, f64::INFINITY),
        options,
    );
    if integral == 0. || !integral.is_finite() {
        return Err(Error::Normalization(integral));
    }
    Ok(integral)
}

/// A PSF wrapped to act as a PRF.
///
/// The value at `(x, y)` is the integral of the PSF over the pixel box
/// `[x - 1/2, x + 1/2] × [y - 1/2, y + 1/2]`. The scale and location
/// parameters of the PSF must therefore be in pixel units.
///
/// The adapter has the parameters `flux`, `x_0` and `y_0`. If the names of
/// the matching PSF parameters are given, they are overwritten with the
/// adapter's values on every evaluation; otherwise the adapter shifts the
/// coordinates and scales the integral itself.
///
/// With renormalization, the PSF is integrated over the whole plane once at
/// construction and scaled to unit total. The factor is not updated when
/// the wrapped parameters change, so it is wrong for PSFs whose total flux
/// depends on them.
///
/// One double integral per sample makes this slow; it is meant for few,
/// small regions.
#[derive(Clone, Debug)]
pub struct PrfAdapter {
    psf: Box<dyn PsfModel>,
    scale_factor: f64,
    x_index: Option<usize>,
    y_index: Option<usize>,
    flux_index: Option<usize>,
    quadrature: QuadratureOptions,
    parameters: Parameters,
}

impl PrfAdapter {
    /// Wrap a copy of `psf`.
    ///
    /// # Errors
    /// Fails if one of the names is not a parameter of `psf`, or if the
    /// renormalization integral is zero or not finite.
    pub fn new(
        psf: &dyn PsfModel,
        renormalize: bool,
        xname: Option<&str>,
        yname: Option<&str>,
        fluxname: Option<&str>,
    ) -> Result<Self> {
        let psf = psf.clone_box();
        let lookup = |name: Option<&str>| {
            name.map(|n| {
                psf.parameters()
                    .index_of(n)
                    .ok_or_else(|| Error::UnknownParameter(n.to_string()))
            })
            .transpose()
        };
        let x_index = lookup(xname)?;
        let y_index = lookup(yname)?;
        let flux_index = lookup(fluxname)?;

        let quadrature = QuadratureOptions::default();
        let scale_factor = if renormalize {
            let integral = total_integral(psf.as_ref(), &psf.parameters().values(), &quadrature)?;
            debug!("PSF integrates to {integral}.");
            1. / integral
        } else {
            1.
        };

        Ok(Self {
            psf,
            scale_factor,
            x_index,
            y_index,
            flux_index,
            quadrature,
            parameters: Parameters::new(vec![
                Parameter::new("flux", 1.),
                Parameter::new("x_0", 0.),
                Parameter::new("y_0", 0.),
            ]),
        })
    }

    /// Set the integration tolerances.
    pub fn with_quadrature(mut self, quadrature: QuadratureOptions) -> Self {
        self.quadrature = quadrature;
        self
    }

    /// Set the initial flux.
    pub fn with_flux(mut self, flux: f64) -> Self {
        self.parameters.set_at(0, flux);
        self
    }

    /// Set the initial position.
    pub fn with_position(mut self, x_0: f64, y_0: f64) -> Self {
        self.parameters.set_at(1, x_0);
        self.parameters.set_at(2, y_0);
        self
    }

    /// The wrapped PSF.
    pub fn psf(&self) -> &dyn PsfModel {
        self.psf.as_ref()
    }

    /// Mutable access to the wrapped PSF, e.g. to change its shape parameters.
    ///
    /// This does not update the renormalization factor.
    pub fn psf_mut(&mut self) -> &mut dyn PsfModel {
        self.psf.as_mut()
    }

    /// Factor applied to the PSF, `1 / integral` with renormalization.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// The current integration tolerances.
    pub fn quadrature(&self) -> &QuadratureOptions {
        &self.quadrature
    }

    /// Pixel integral of the PSF for the adapter parameters `[flux, x_0, y_0]`.
    fn integrate(&self, x: f64, y: f64, psf_params: &mut [f64], params: &[f64]) -> f64 {
        let [flux, x_0, y_0] = [params[0], params[1], params[2]];

        let dx = match self.x_index {
            Some(idx) => {
                psf_params[idx] = x_0;
                x
            }
            None => x - x_0,
        };
        let dy = match self.y_index {
            Some(idx) => {
                psf_params[idx] = y_0;
                y
            }
            None => y - y_0,
        };
        let scale = match self.flux_index {
            Some(idx) => {
                psf_params[idx] = flux * self.scale_factor;
                1.
            }
            None => flux * self.scale_factor,
        };

        let psf_params = &*psf_params;
        scale
            * dblquad(
                |u, v| self.psf.value(u, v, psf_params),
                (dx - 0.5, dx + 0.5),
                (dy - 0.5, dy + 0.5),
                &self.quadrature,
            )
    }
}

impl PsfModel for PrfAdapter {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn value(&self, x: f64, y: f64, params: &[f64]) -> f64 {
        let mut psf_params = self.psf.parameters().values();
        self.integrate(x, y, &mut psf_params, params)
    }

    fn clone_box(&self) -> Box<dyn PsfModel> {
        Box::new(self.clone())
    }
}

#[cfg(feature = "parallel")]
mod parallel {
    use super::*;
    use ndarray::{ArrayD, ArrayViewD, Zip};

    impl PrfAdapter {
        /// Evaluate like [`PsfModel::evaluate`], integrating the samples in parallel.
        ///
        /// # Panics
        /// Panics if `x` and `y` have different shapes.
        pub fn evaluate_par(&self, x: ArrayViewD<f64>, y: ArrayViewD<f64>) -> ArrayD<f64> {
            let params = self.parameters.values();
            debug!("Integrating {} pixels in parallel.", x.len());
            Zip::from(&x)
                .and(&y)
                .par_map_collect(|&x, &y| self.value(x, y, &params))
        }
    }
}
