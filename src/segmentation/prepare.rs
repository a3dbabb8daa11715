//! Background subtraction, variance and masked-pixel handling shared by all segments.

use std::str::FromStr;

use log::{debug, warn};
use ndarray::{Array2, ArrayView2, Zip, s};

use crate::error::{Error, Result};
use crate::ndarray_utils::masked_mean;

/// Treatment of masked pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaskMethod {
    /// Masked pixels are left out of every calculation.
    #[default]
    Exclude,
    /// Masked pixels are replaced by the mean of their unmasked neighbors
    /// and afterwards used like any other pixel.
    Interpolate,
}

impl FromStr for MaskMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exclude" => Ok(Self::Exclude),
            "interpolate" => Ok(Self::Interpolate),
            _ => Err(Error::InvalidMaskMethod(s.to_string())),
        }
    }
}

/// A value that is either constant over the image or given per pixel.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageOrScalar {
    /// The same value for every pixel.
    Scalar(f64),
    /// One value per pixel.
    Image(Array2<f64>),
}

impl From<f64> for ImageOrScalar {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Array2<f64>> for ImageOrScalar {
    fn from(value: Array2<f64>) -> Self {
        Self::Image(value)
    }
}

impl ImageOrScalar {
    /// Expand to a full image of the given shape.
    fn broadcast(&self, what: &'static str, shape: (usize, usize)) -> Result<Array2<f64>> {
        match self {
            Self::Scalar(value) => Ok(Array2::from_elem(shape, *value)),
            Self::Image(image) if image.dim() == shape => Ok(image.clone()),
            Self::Image(image) => Err(Error::ShapeMismatch {
                what,
                expected: vec![shape.0, shape.1],
                found: image.shape().to_vec(),
            }),
        }
    }
}

/// Optional inputs of the segment property calculation.
///
/// * `error`: 1-sigma errors of the data. With `gain`, they should contain
///   the background noise only; the Poisson noise of the sources is then
///   added as `data / gain`.
/// * `gain`: ratio of counts to data units, e.g. electrons/ADU or the
///   exposure time for data in electrons/s. Ignored without `error`.
/// * `mask`: `true` marks bad pixels, treated according to `mask_method`.
/// * `background`: background level that is subtracted from the data. Leave
///   it at `None` for background-subtracted data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentOptions {
    /// Per-pixel 1-sigma errors.
    pub error: Option<Array2<f64>>,
    /// Gain used for the Poisson noise of the sources.
    pub gain: Option<ImageOrScalar>,
    /// Bad pixel mask.
    pub mask: Option<Array2<bool>>,
    /// Treatment of masked pixels.
    pub mask_method: MaskMethod,
    /// Background level of the data.
    pub background: Option<ImageOrScalar>,
}

impl SegmentOptions {
    /// Set the per-pixel errors.
    pub fn with_error(mut self, error: Array2<f64>) -> Self {
        self.error = Some(error);
        self
    }

    /// Set the gain, scalar or per pixel.
    pub fn with_gain(mut self, gain: impl Into<ImageOrScalar>) -> Self {
        self.gain = Some(gain.into());
        self
    }

    /// Set the bad pixel mask.
    pub fn with_mask(mut self, mask: Array2<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Set the treatment of masked pixels.
    pub fn with_mask_method(mut self, mask_method: MaskMethod) -> Self {
        self.mask_method = mask_method;
        self
    }

    /// Set the background, scalar or per pixel.
    pub fn with_background(mut self, background: impl Into<ImageOrScalar>) -> Self {
        self.background = Some(background.into());
        self
    }
}

/// Images derived once from the input and shared by all segments.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PreparedData {
    /// Background-subtracted data with masked pixels treated.
    pub(crate) data: Array2<f64>,
    /// The input data with masked pixels interpolated, only with
    /// [`MaskMethod::Interpolate`].
    pub(crate) input: Option<Array2<f64>>,
    /// Variance, if errors were given.
    pub(crate) variance: Option<Array2<f64>>,
    /// Background, if given.
    pub(crate) background: Option<Array2<f64>>,
    /// Pixels that stay excluded, only with [`MaskMethod::Exclude`].
    pub(crate) mask: Option<Array2<bool>>,
}

/// Apply background, error, gain and mask options to the data.
///
/// The input is never modified.
pub(crate) fn prepare_data(data: ArrayView2<f64>, options: &SegmentOptions) -> Result<PreparedData> {
    let shape = data.dim();
    let mut prepared = data.to_owned();

    let mut background = match &options.background {
        Some(background) => {
            let background = background.broadcast("background", shape)?;
            prepared -= &background;
            Some(background)
        }
        None => None,
    };

    let mut variance = match &options.error {
        Some(error) if error.dim() != shape => {
            return Err(Error::ShapeMismatch {
                what: "error",
                expected: data.shape().to_vec(),
                found: error.shape().to_vec(),
            });
        }
        Some(error) => {
            let mut variance = error.mapv(|e| e * e);
            if let Some(gain) = &options.gain {
                let gain = gain.broadcast("gain", shape)?;
                if gain.iter().any(|g| *g <= 0.) {
                    return Err(Error::NonPositiveGain);
                }
                Zip::from(&mut variance)
                    .and(&prepared)
                    .and(&gain)
                    .for_each(|v, d, g| *v += d / g);
            }
            Some(variance)
        }
        None => None,
    };

    let Some(mask) = &options.mask else {
        return Ok(PreparedData {
            data: prepared,
            input: None,
            variance,
            background,
            mask: None,
        });
    };
    if mask.dim() != shape {
        return Err(Error::ShapeMismatch {
            what: "mask",
            expected: data.shape().to_vec(),
            found: mask.shape().to_vec(),
        });
    }

    let n_masked = mask.iter().filter(|m| **m).count();
    debug!("Treating {n_masked} masked pixels with {:?}.", options.mask_method);
    match options.mask_method {
        MaskMethod::Exclude => {
            for image in [Some(&mut prepared), variance.as_mut(), background.as_mut()]
                .into_iter()
                .flatten()
            {
                Zip::from(image).and(mask).for_each(|v, m| {
                    if *m {
                        *v = 0.;
                    }
                });
            }
            Ok(PreparedData {
                data: prepared,
                input: None,
                variance,
                background,
                mask: Some(mask.clone()),
            })
        }
        MaskMethod::Interpolate => {
            let mut input = data.to_owned();
            for image in [
                Some(&mut prepared),
                Some(&mut input),
                variance.as_mut(),
                background.as_mut(),
            ]
            .into_iter()
            .flatten()
            {
                interpolate_masked(image, mask.view());
            }
            Ok(PreparedData {
                data: prepared,
                input: Some(input),
                variance,
                background,
                mask: None,
            })
        }
    }
}

/// Replace every masked pixel by the mean of the unmasked pixels around it.
///
/// The 3×3 neighborhood grows until it contains an unmasked pixel or covers
/// the whole image. Pixels are visited in row-major order, and pixels that
/// were already replaced do not count as unmasked.
fn interpolate_masked(image: &mut Array2<f64>, mask: ArrayView2<bool>) {
    let (ny, nx) = image.dim();
    for ((y, x), _) in mask.indexed_iter().filter(|(_, m)| **m) {
        let mut radius = 1;
        let value = loop {
            let rows = y.saturating_sub(radius)..(y + radius + 1).min(ny);
            let cols = x.saturating_sub(radius)..(x + radius + 1).min(nx);
            let keep = mask.slice(s![rows.clone(), cols.clone()]).mapv(|m| !m);
            let values = image.slice(s![rows, cols]);
            if let Some(mean) = masked_mean(values.iter(), keep.iter().copied()) {
                break mean;
            }
            if radius >= ny.max(nx) {
                warn!("No unmasked pixel left to interpolate ({y}, {x}).");
                break f64::NAN;
            }
            radius += 1;
        };
        image[[y, x]] = value;
    }
}
