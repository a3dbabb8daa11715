//! Photometry and morphology of sources in a segmentation image.
//!
//! A segmentation image has the shape of the data and marks the pixels of
//! each source with a positive label; `0` is the background. For every label,
//! [`SegmentProperties`] computes centroids, sums, extrema and the shape of the
//! 2D Gaussian with the same second-order moments. [`PropertiesTable`]
//! collects them for many sources.
//!
//! Example:
//! ```rust
//! use ndarray::{Array2, array};
//! use photrs::{PropertiesTable, SegmentOptions, segment_properties};
//!
//! let data = Array2::from_shape_fn((4, 4), |(y, x)| (4 * y + x) as f64);
//! let segm = array![[1, 1, 0, 0], [1, 0, 0, 2], [0, 0, 2, 2], [0, 2, 2, 0]];
//! let props = segment_properties(data.view(), segm.view(), &SegmentOptions::default(), None)?;
//! let table = PropertiesTable::new(&props, Some(&["id", "xcentroid", "ycentroid"]), None)?;
//! println!("{table:.3}");
//! # Ok::<(), photrs::Error>(())
//! ```

pub(crate) mod moments;
pub(crate) mod morphology;
pub(crate) mod prepare;
pub(crate) mod properties;
pub(crate) mod table;

pub use prepare::{ImageOrScalar, MaskMethod, SegmentOptions};
pub use properties::{Property, PropertyValue, SegmentProperties, segment_properties};
#[cfg(feature = "parallel")]
pub use properties::segment_properties_par;
pub use table::{DEFAULT_COLUMNS, PropertiesTable};
