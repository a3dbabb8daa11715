//! Lookup-table PRF with subpixel resolution.

use std::str::FromStr;

use itertools::Itertools;
use log::{debug, warn};
use ndarray::{Array2, Array4, ArrayD, ArrayView2, ArrayView4, Ix4, s};

use crate::error::{Error, Result};
use crate::ndarray_utils::{IntoNdarray2, median};
use crate::psf::{Parameter, Parameters, PsfModel};

/// Statistic used to combine PRF stamps extracted from an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CombineMode {
    /// Pixelwise mean.
    #[default]
    Mean,
    /// Pixelwise median.
    Median,
}

impl FromStr for CombineMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            _ => Err(Error::InvalidCombineMode(s.to_string())),
        }
    }
}

impl CombineMode {
    fn combine(&self, samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return f64::NAN;
        }
        match self {
            Self::Mean => samples.iter().sum::<f64>() / samples.len() as f64,
            Self::Median => median(samples.iter().copied()).unwrap_or(f64::NAN),
        }
    }
}

/// Options of [`DiscretePrf::create_from_image`].
#[derive(Clone, Debug, PartialEq)]
pub struct PrfFromImageOptions {
    /// Source fluxes used to normalize the stamps, one per position.
    /// Without them each stamp is normalized by its own sum.
    pub fluxes: Option<Vec<f64>>,
    /// Pixels to ignore (`true` = bad). Defaults to the NaN pixels of the image.
    pub mask: Option<Array2<bool>>,
    /// How stamps are combined.
    pub mode: CombineMode,
    /// Number of subpixel bins per axis.
    pub subsampling: usize,
    /// Replace masked pixels by their mirror image through the stamp center.
    pub fix_nan: bool,
}

impl Default for PrfFromImageOptions {
    fn default() -> Self {
        Self {
            fluxes: None,
            mask: None,
            mode: CombineMode::Mean,
            subsampling: 1,
            fix_nan: false,
        }
    }
}

impl PrfFromImageOptions {
    /// Normalize stamps by these fluxes.
    pub fn with_fluxes(mut self, fluxes: Vec<f64>) -> Self {
        self.fluxes = Some(fluxes);
        self
    }

    /// Use an explicit bad-pixel mask.
    pub fn with_mask(mut self, mask: Array2<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Set the combination statistic.
    pub fn with_mode(mut self, mode: CombineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the subsampling factor.
    pub fn with_subsampling(mut self, subsampling: usize) -> Self {
        self.subsampling = subsampling;
        self
    }

    /// Enable mirroring of masked pixels.
    pub fn with_fix_nan(mut self, fix_nan: bool) -> Self {
        self.fix_nan = fix_nan;
        self
    }
}

/// Subpixel bin of a coordinate, pixel centers sitting at integer values.
fn subpixel_index(coordinate: f64, subsampling: usize) -> usize {
    let frac = (coordinate + 0.5).rem_euclid(1.);
    ((frac * subsampling as f64).floor() as usize).min(subsampling - 1)
}

/// A PRF stored as images at `subsampling × subsampling` subpixel offsets.
///
/// The cube is indexed `[y_sub, x_sub, y, x]`. Evaluation picks the slice of
/// the subpixel bin containing `(x_0, y_0)` and looks up the pixel the query
/// falls into, scaled by `flux`. Queries outside the stamp are zero.
///
/// `x_0` and `y_0` are fixed by default, so a fitter only adjusts `flux`.
#[derive(Clone, Debug)]
pub struct DiscretePrf {
    cube: Array4<f64>,
    subsampling: usize,
    parameters: Parameters,
}

impl DiscretePrf {
    /// Create a PRF from a cube of shape `(subsampling, subsampling, ny, nx)`.
    ///
    /// A 2-dimensional array is accepted for `subsampling == 1`. With
    /// `normalize`, every subpixel slice is scaled to unit sum.
    pub fn new(prf: ArrayD<f64>, normalize: bool, subsampling: usize) -> Result<Self> {
        if subsampling == 0 {
            return Err(Error::Subsampling {
                subsampling,
                shape: prf.shape().to_vec(),
            });
        }
        let prf = if subsampling == 1 && prf.ndim() == 2 {
            let (ny, nx) = (prf.shape()[0], prf.shape()[1]);
            prf.into_shape_with_order(vec![1, 1, ny, nx])
                .map_err(|_| Error::Dimensionality(2))?
        } else {
            prf
        };
        if prf.ndim() != 4 {
            return Err(Error::Dimensionality(prf.ndim()));
        }
        if prf.shape()[..2] != [subsampling, subsampling] {
            return Err(Error::Subsampling {
                subsampling,
                shape: prf.shape().to_vec(),
            });
        }
        if prf.iter().any(|v| v.is_nan()) {
            return Err(Error::NanValues);
        }
        let mut cube = prf
            .into_dimensionality::<Ix4>()
            .map_err(|_| Error::Dimensionality(4))?;

        if normalize {
            for (i, mut row) in cube.outer_iter_mut().enumerate() {
                for (j, mut slice) in row.outer_iter_mut().enumerate() {
                    let total = slice.sum();
                    if total == 0. || !total.is_finite() {
                        warn!("PRF slice ({i}, {j}) sums to {total}, leaving it unnormalized.");
                        continue;
                    }
                    slice /= total;
                }
            }
        }

        let parameters = Parameters::new(vec![
            Parameter::new("flux", 1.),
            Parameter::fixed("x_0", 0.),
            Parameter::fixed("y_0", 0.),
        ]);
        Ok(Self {
            cube,
            subsampling,
            parameters,
        })
    }

    /// Shape `(ny, nx)` of a single PRF image.
    pub fn prf_shape(&self) -> (usize, usize) {
        let shape = self.cube.shape();
        (shape[2], shape[3])
    }

    /// Number of subpixel bins per axis.
    pub fn subsampling(&self) -> usize {
        self.subsampling
    }

    /// The full lookup cube.
    pub fn prf_array(&self) -> ArrayView4<f64> {
        self.cube.view()
    }

    /// Estimate a PRF from point sources in an image.
    ///
    /// `positions` are `(x, y)` pixel coordinates. For every source, a
    /// `size × size` stamp centered on it is cut out and normalized, and all
    /// stamps that fall into the same subpixel bin are combined. Stamps that
    /// are cut by the image border or sum to zero are skipped, as are stamps
    /// with a masked center or more than three masked pixels when `fix_nan`
    /// is set. Without explicit fluxes the normalization uses the stamp sum,
    /// which does not account for flux outside the stamp.
    pub fn create_from_image<A>(
        image: A,
        positions: &[(f64, f64)],
        size: usize,
        options: PrfFromImageOptions,
    ) -> Result<Self>
    where
        A: IntoNdarray2<Out = Array2<f64>>,
    {
        let image = image.into_ndarray2();
        if size % 2 == 0 {
            return Err(Error::EvenSize(size));
        }
        if let Some(fluxes) = &options.fluxes {
            if fluxes.len() != positions.len() {
                return Err(Error::FluxCount {
                    positions: positions.len(),
                    fluxes: fluxes.len(),
                });
            }
        }
        let subsampling = options.subsampling;
        if subsampling == 0 {
            return Err(Error::Subsampling {
                subsampling,
                shape: vec![0, 0, size, size],
            });
        }
        let mask = match options.mask {
            Some(mask) if mask.dim() != image.dim() => {
                return Err(Error::ShapeMismatch {
                    what: "mask",
                    expected: image.shape().to_vec(),
                    found: mask.shape().to_vec(),
                });
            }
            Some(mask) => mask,
            None => image.mapv(f64::is_nan),
        };

        let mut cube = Array4::zeros((subsampling, subsampling, size, size));
        for (i, j) in (0..subsampling).cartesian_product(0..subsampling) {
            let stamps = positions
                .iter()
                .enumerate()
                .filter(|(_, (x, y))| {
                    subpixel_index(*y, subsampling) == i && subpixel_index(*x, subsampling) == j
                })
                .filter_map(|(k, &(x, y))| {
                    let flux = options.fluxes.as_ref().map(|f| f[k]);
                    extract_stamp(image.view(), mask.view(), (x, y), size, flux, options.fix_nan)
                })
                .collect_vec();
            if stamps.is_empty() {
                return Err(Error::EmptySubpixelBin(i, j));
            }
            debug!("Combining {} stamps for subpixel bin ({i}, {j}).", stamps.len());

            let mut samples = Vec::with_capacity(stamps.len());
            let mut slice = cube.slice_mut(s![i, j, .., ..]);
            for ((y, x), value) in slice.indexed_iter_mut() {
                samples.clear();
                samples.extend(
                    stamps
                        .iter()
                        .filter(|(_, m)| !m[[y, x]])
                        .map(|(data, _)| data[[y, x]]),
                );
                *value = options.mode.combine(&samples);
            }
        }

        Self::new(cube.into_dyn(), true, subsampling)
    }
}

/// Cut out and normalize the stamp centered at `(x, y)`.
///
/// Returns the normalized values together with the mask that still applies,
/// or `None` if the stamp is unusable.
fn extract_stamp(
    image: ArrayView2<f64>,
    mask: ArrayView2<bool>,
    (x, y): (f64, f64),
    size: usize,
    flux: Option<f64>,
    fix_nan: bool,
) -> Option<(Array2<f64>, Array2<bool>)> {
    let (ny, nx) = image.dim();
    let half = size as f64 / 2.;
    let y0 = (y - half).ceil();
    let x0 = (x - half).ceil();
    if y0 < 0. || x0 < 0. || y0 as usize + size > ny || x0 as usize + size > nx {
        debug!("Skipping stamp at ({x}, {y}): cut by the image border.");
        return None;
    }
    let (y0, x0) = (y0 as usize, x0 as usize);
    let window = s![y0..y0 + size, x0..x0 + size];
    let mut data = image.slice(window).to_owned();
    let mut stamp_mask = mask.slice(window).to_owned();

    let unmasked_sum = |data: &Array2<f64>, mask: &Array2<bool>| {
        data.iter()
            .zip(mask.iter())
            .filter(|(_, m)| !**m)
            .map(|(v, _)| v)
            .sum::<f64>()
    };
    if unmasked_sum(&data, &stamp_mask) == 0. {
        debug!("Skipping stamp at ({x}, {y}): zero flux.");
        return None;
    }

    if fix_nan {
        let n_masked = stamp_mask.iter().filter(|m| **m).count();
        let center = size / 2;
        if n_masked > 3 || stamp_mask[[center, center]] {
            debug!("Skipping stamp at ({x}, {y}): {n_masked} masked pixels.");
            return None;
        }
        if n_masked > 0 {
            data = mirror_masked(data.view(), stamp_mask.view());
            stamp_mask.fill(false);
        }
    }

    let norm = flux.unwrap_or_else(|| unmasked_sum(&data, &stamp_mask));
    data /= norm;
    Some((data, stamp_mask))
}

/// Replace masked pixels by the value mirrored through the center of the
/// array, or zero if the mirrored pixel is masked too.
fn mirror_masked(data: ArrayView2<f64>, mask: ArrayView2<bool>) -> Array2<f64> {
    let (ny, nx) = data.dim();
    let mut fixed = data.to_owned();
    for ((y, x), value) in fixed.indexed_iter_mut() {
        if !mask[[y, x]] {
            continue;
        }
        let (my, mx) = (ny - 1 - y, nx - 1 - x);
        *value = if mask[[my, mx]] { 0. } else { data[[my, mx]] };
    }
    fixed
}

impl PsfModel for DiscretePrf {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn value(&self, x: f64, y: f64, params: &[f64]) -> f64 {
        let [flux, x_0, y_0] = [params[0], params[1], params[2]];
        let (ny, nx) = self.prf_shape();
        let ix = (x - x_0 + 0.5 + (nx / 2) as f64).floor();
        let iy = (y - y_0 + 0.5 + (ny / 2) as f64).floor();
        if !ix.is_finite() || !iy.is_finite() {
            return 0.;
        }
        if ix < 0. || iy < 0. || ix >= nx as f64 || iy >= ny as f64 {
            return 0.;
        }

        let x_sub = subpixel_index(x_0, self.subsampling);
        let y_sub = subpixel_index(y_0, self.subsampling);
        flux * self.cube[[y_sub, x_sub, iy as usize, ix as usize]]
    }

    fn clone_box(&self) -> Box<dyn PsfModel> {
        Box::new(self.clone())
    }
}
