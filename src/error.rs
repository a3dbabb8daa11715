//! Error type shared by all models and the segmentation engine.

use thiserror::Error;

/// Errors raised while constructing models or computing source properties.
///
/// All validation happens eagerly: a constructor either returns a fully usable
/// object or one of these variants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Two arrays that must share a shape do not.
    #[error("{what} must have the same shape as the data: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        /// Name of the offending input.
        what: &'static str,
        /// Shape of the reference array.
        expected: Vec<usize>,
        /// Shape of the offending array.
        found: Vec<usize>,
    },
    /// The label `0` is reserved for the background.
    #[error("label 0 is reserved for the background")]
    ReservedLabel,
    /// Labels must be positive integers.
    #[error("label must be a positive integer, got {0}")]
    NegativeLabel(i64),
    /// The requested label does not occur in the segmentation image.
    #[error("label {0} is not in the input segmentation image")]
    MissingLabel(i64),
    /// Unknown masked-pixel treatment.
    #[error("mask method \"{0}\" is not valid")]
    InvalidMaskMethod(String),
    /// Gain must be strictly positive everywhere.
    #[error("gain must be positive everywhere")]
    NonPositiveGain,
    /// A PRF cube had the wrong number of dimensions.
    #[error("PRF array must have 4 dimensions, got {0}")]
    Dimensionality(usize),
    /// The leading PRF cube dimensions do not match the subsampling factor.
    #[error("incompatible subsampling {subsampling} and PRF array shape {shape:?}")]
    Subsampling {
        /// Requested subsampling factor.
        subsampling: usize,
        /// Shape of the supplied array.
        shape: Vec<usize>,
    },
    /// PRF cube contains NaN values.
    #[error("array contains NaN values, can't create PRF")]
    NanValues,
    /// PRF stamps must have an odd side length.
    #[error("size must be odd, got {0}")]
    EvenSize(usize),
    /// Number of fluxes does not match the number of positions.
    #[error("position and flux arrays must be of equal length ({positions} != {fluxes})")]
    FluxCount {
        /// Number of positions.
        positions: usize,
        /// Number of fluxes.
        fluxes: usize,
    },
    /// No usable stamp fell into a subpixel bin.
    #[error("no usable PRF stamps for subpixel bin ({0}, {1})")]
    EmptySubpixelBin(usize, usize),
    /// Unknown combination mode for extracted PRFs.
    #[error("invalid mode \"{0}\" to combine PRFs")]
    InvalidCombineMode(String),
    /// The interpolator configuration is not usable for this grid.
    #[error("invalid interpolator configuration: {0}")]
    Interpolator(String),
    /// A parameter name is not known to the model.
    #[error("unknown parameter \"{0}\"")]
    UnknownParameter(String),
    /// Wrong number of parameter values.
    #[error("expected {expected} parameter values, got {found}")]
    ParameterCount {
        /// Number of values expected.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },
    /// A grouped model needs at least one source.
    #[error("a star group must contain at least one star")]
    EmptyStarGroup,
    /// Numerical integration returned a non-finite or zero normalization.
    #[error("PSF integral is {0}, can't renormalize")]
    Normalization(f64),
    /// Unknown property or column name.
    #[error("unknown property \"{0}\"")]
    UnknownProperty(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
