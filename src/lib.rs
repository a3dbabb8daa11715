#![warn(missing_docs)]

//! Photometry and morphology of point sources and extended sources in astronomical images. \
//! Two independent parts make up this library: models of the point spread function (PSF) for PSF photometry,
//! and the measurement of source properties from a segmentation image.
//!
//! ## PSF models
//! All models implement [`PsfModel`]. They own named [`Parameters`], of which some may be fixed,
//! and evaluate at arbitrary positions for a given parameter vector, which is what an external fitter needs.
//! - [`GridModel`]: an image of the PSF, interpolated with a bivariate spline.
//! - [`DiscretePrf`]: a lookup table of subpixel-shifted PRF images, possibly built from stars in an
//!   image with [`DiscretePrf::create_from_image()`].
//! - [`IntegratedGaussianPrf`]: a circular Gaussian integrated over the pixels.
//! - [`PrfAdapter`]: any PSF, e.g. a [`Gaussian2D`], numerically integrated over the pixels.
//! - [`prepare_psf_model()`] and [`grouped_psf_model()`] reduce a model to the fit parameters `x_0`, `y_0`
//!   and `flux`, or combine copies of it for fitting groups of overlapping stars.
//!
//! Options are set via `with_*()` functions:
//! ```rust
//! use photrs::{GridModel, GridOptions, PsfModel};
//! # let image = ndarray::Array2::<f64>::ones((7, 7));
//! let model = GridModel::new(image, GridOptions::default().with_degree(1).with_shift(0.3, -0.2))?;
//! let rendered = model.render((7, 7));
//! # Ok::<(), photrs::Error>(())
//! ```
//!
//! ## Segmentation
//! [`segment_properties()`] measures centroids, sums and second-moment shapes of every labeled
//! source, optionally with background, error, gain and a bad pixel mask given in [`SegmentOptions`].
//! [`PropertiesTable`] collects the results.
//!
//! ## Parallelism
//! With the default feature `parallel`, [`segment_properties_par()`] and [`PrfAdapter::evaluate_par()`]
//! distribute the work with `rayon`.
//!
//! ## Logging
//! Progress and skipped inputs are reported through the [`log`] facade. No logger is installed by this crate.

pub(crate) mod error;
pub(crate) mod geometry;
pub(crate) mod ndarray_utils;
pub mod psf;
pub mod quadrature;
pub mod segmentation;
pub mod spline;

pub use error::{Error, Result};
pub use ndarray_utils::{BoundingSlice, IntoNdarray2, find_objects};
pub use psf::{
    BoundingBox, CombineMode, DiscretePrf, Gaussian2D, GridModel, GridOptions, GroupedPsf,
    IntegratedGaussianPrf, Parameter, Parameters, PrfAdapter, PrfFromImageOptions, PreparedPsf,
    PsfModel, Star, grouped_psf_model, prepare_psf_model,
};
#[cfg(feature = "parallel")]
pub use segmentation::segment_properties_par;
pub use segmentation::{
    DEFAULT_COLUMNS, ImageOrScalar, MaskMethod, PropertiesTable, Property, PropertyValue,
    SegmentOptions, SegmentProperties, segment_properties,
};

/// A generic integer trait for the labels of a segmentation image.
///
/// This trait is automatically implemented for all types implementing the supertraits,
/// i.e. all signed and unsigned primitive integers.
pub trait Label: num_traits::PrimInt + std::fmt::Debug + Send + Sync + 'static {}

impl<L> Label for L where L: num_traits::PrimInt + std::fmt::Debug + Send + Sync + 'static {}
