//! Gaussian PSF and PRF models.

use std::f64::consts::SQRT_2;

use scilib::math::basic::erf;

use crate::psf::{BoundingBox, Parameter, Parameters, PsfModel};

/// Circular Gaussian integrated over unit pixels.
///
/// Since the Gaussian is integrated over each pixel, this is a PRF: a PSF
/// that is Gaussian below the pixel scale.
///
/// ```text
/// f(x, y) = F/4 [erf((x - x_0 + 1/2) / (√2 σ)) - erf((x - x_0 - 1/2) / (√2 σ))]
///               [erf((y - y_0 + 1/2) / (√2 σ)) - erf((y - y_0 - 1/2) / (√2 σ))]
/// ```
///
/// Parameters are `flux`, `x_0`, `y_0` and `sigma`, the latter fixed by default.
#[derive(Clone, Debug)]
pub struct IntegratedGaussianPrf {
    parameters: Parameters,
}

impl IntegratedGaussianPrf {
    /// Unit flux PRF centered at the origin.
    pub fn new(sigma: f64) -> Self {
        Self {
            parameters: Parameters::new(vec![
                Parameter::new("flux", 1.),
                Parameter::new("x_0", 0.),
                Parameter::new("y_0", 0.),
                Parameter::fixed("sigma", sigma),
            ]),
        }
    }

    /// Set the center.
    pub fn with_position(mut self, x_0: f64, y_0: f64) -> Self {
        self.parameters.set_at(1, x_0);
        self.parameters.set_at(2, y_0);
        self
    }

    /// Set the total flux.
    pub fn with_flux(mut self, flux: f64) -> Self {
        self.parameters.set_at(0, flux);
        self
    }

    /// Total flux.
    pub fn flux(&self) -> f64 {
        self.parameters.values()[0]
    }

    /// Width of the Gaussian.
    pub fn sigma(&self) -> f64 {
        self.parameters.values()[3]
    }
}

impl Default for IntegratedGaussianPrf {
    fn default() -> Self {
        Self::new(1.)
    }
}

impl PsfModel for IntegratedGaussianPrf {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn value(&self, x: f64, y: f64, params: &[f64]) -> f64 {
        let [flux, x_0, y_0, sigma] = [params[0], params[1], params[2], params[3]];
        let scale = SQRT_2 * sigma;
        let dx = x - x_0;
        let dy = y - y_0;

        flux / 4.
            * (erf((dx + 0.5) / scale) - erf((dx - 0.5) / scale))
            * (erf((dy + 0.5) / scale) - erf((dy - 0.5) / scale))
    }

    fn clone_box(&self) -> Box<dyn PsfModel> {
        Box::new(self.clone())
    }

    /// Four sigma around the center, truncated towards zero.
    fn bounding_box(&self) -> Option<BoundingBox> {
        let values = self.parameters.values();
        let [x_0, y_0, sigma] = [values[1], values[2], values[3]];
        let half_width = 4. * sigma;
        Some(BoundingBox {
            y: ((y_0 - half_width) as i64, (y_0 + half_width) as i64),
            x: ((x_0 - half_width) as i64, (x_0 + half_width) as i64),
        })
    }
}

/// Elliptical Gaussian sampled at a point, not integrated.
///
/// Parameters are `amplitude`, `x_mean`, `y_mean`, `x_stddev`, `y_stddev` and
/// `theta`, the counter-clockwise rotation of the x axis in radians.
/// Wrap it in a [`PrfAdapter`](crate::PrfAdapter) to get a PRF.
#[derive(Clone, Debug)]
pub struct Gaussian2D {
    parameters: Parameters,
}

impl Gaussian2D {
    /// Axis-aligned Gaussian.
    pub fn new(amplitude: f64, x_mean: f64, y_mean: f64, x_stddev: f64, y_stddev: f64) -> Self {
        Self {
            parameters: Parameters::new(vec![
                Parameter::new("amplitude", amplitude),
                Parameter::new("x_mean", x_mean),
                Parameter::new("y_mean", y_mean),
                Parameter::new("x_stddev", x_stddev),
                Parameter::new("y_stddev", y_stddev),
                Parameter::new("theta", 0.),
            ]),
        }
    }

    /// Rotate the Gaussian.
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.parameters.set_at(5, theta);
        self
    }

    /// Integral over the whole plane, `2π A σ_x σ_y`.
    pub fn total_flux(&self) -> f64 {
        let values = self.parameters.values();
        2. * std::f64::consts::PI * values[0] * values[3] * values[4]
    }
}

impl PsfModel for Gaussian2D {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn value(&self, x: f64, y: f64, params: &[f64]) -> f64 {
        let amplitude = params[0];
        let (x_mean, y_mean) = (params[1], params[2]);
        let (sigma_x, sigma_y) = (params[3], params[4]);
        let theta = params[5];

        // Rotate coordinates
        let cos_t = theta.cos();
        let sin_t = theta.sin();
        let dx = x - x_mean;
        let dy = y - y_mean;
        let xp = dx * cos_t + dy * sin_t;
        let yp = -dx * sin_t + dy * cos_t;

        let arg = -(xp * xp / (2. * sigma_x * sigma_x) + yp * yp / (2. * sigma_y * sigma_y));
        amplitude * arg.exp()
    }

    fn clone_box(&self) -> Box<dyn PsfModel> {
        Box::new(self.clone())
    }
}
