//! Photometry and morphology of labeled source segments.

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use itertools::Itertools;
use log::{debug, info};
use ndarray::{Array2, ArrayView2, Zip};

use crate::Label;
use crate::error::{Error, Result};
use crate::geometry::{MomentEllipse, inertia_tensor};
use crate::ndarray_utils::{BoundingSlice, IntoNdarray2, find_objects, masked_argmax, masked_argmin};
use crate::segmentation::moments::{moments, moments_central};
use crate::segmentation::morphology::perimeter;
use crate::segmentation::prepare::{PreparedData, SegmentOptions, prepare_data};

macro_rules! properties {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Every property of a [`SegmentProperties`], addressable by name.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Property {
            $(
                #[doc = concat!("`", $name, "`, see [`SegmentProperties::", $name, "`].")]
                $variant,
            )*
        }

        impl Property {
            /// All properties in declaration order.
            pub const ALL: &'static [Property] = &[$(Property::$variant),*];

            /// Name of the property, as used for table columns.
            pub fn name(self) -> &'static str {
                match self {
                    $(Property::$variant => $name,)*
                }
            }
        }

        impl FromStr for Property {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok(Property::$variant),)*
                    _ => Err(Error::UnknownProperty(s.to_string())),
                }
            }
        }
    };
}

properties! {
    Id => "id",
    DataCutout => "data_cutout",
    Values => "values",
    Coords => "coords",
    Moments => "moments",
    MomentsCentral => "moments_central",
    LocalCentroid => "local_centroid",
    Centroid => "centroid",
    XCentroid => "xcentroid",
    YCentroid => "ycentroid",
    Bbox => "bbox",
    XMin => "xmin",
    XMax => "xmax",
    YMin => "ymin",
    YMax => "ymax",
    MinValue => "min_value",
    MaxValue => "max_value",
    MinvalLocalPos => "minval_local_pos",
    MaxvalLocalPos => "maxval_local_pos",
    MinvalPos => "minval_pos",
    MaxvalPos => "maxval_pos",
    MinvalXPos => "minval_xpos",
    MinvalYPos => "minval_ypos",
    MaxvalXPos => "maxval_xpos",
    MaxvalYPos => "maxval_ypos",
    Area => "area",
    EquivalentRadius => "equivalent_radius",
    Perimeter => "perimeter",
    InertiaTensor => "inertia_tensor",
    Covariance => "covariance",
    CovarianceEigvals => "covariance_eigvals",
    SemimajorAxisSigma => "semimajor_axis_sigma",
    SemiminorAxisSigma => "semiminor_axis_sigma",
    Eccentricity => "eccentricity",
    Orientation => "orientation",
    SeElongation => "se_elongation",
    SeEllipticity => "se_ellipticity",
    SeX2 => "se_x2",
    SeY2 => "se_y2",
    SeXy => "se_xy",
    SeCxx => "se_cxx",
    SeCyy => "se_cyy",
    SeCxy => "se_cxy",
    SegmentSum => "segment_sum",
    SegmentSumErr => "segment_sum_err",
    BackgroundSum => "background_sum",
    BackgroundMean => "background_mean",
    BackgroundAtcentroid => "background_atcentroid",
}

impl Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a single property, for uniform access by name.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Labels and pixel indices.
    Int(i64),
    /// Scalar measurements.
    Float(f64),
    /// Fixed-length tuples such as positions `(y, x)`, and pixel values.
    Vector(Vec<f64>),
    /// Cutouts, moments and tensors.
    Matrix(Array2<f64>),
    /// Not available, e.g. an error without error image.
    Missing,
}

impl PropertyValue {
    /// The scalar value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<f64>> for PropertyValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::Float)
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = f.precision();
        let float = |v: &f64| match precision {
            Some(p) => format!("{v:.p$}"),
            None => format!("{v}"),
        };
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&float(v)),
            Self::Vector(v) => write!(f, "[{}]", v.iter().map(float).join(", ")),
            Self::Matrix(m) => write!(
                f,
                "[{}]",
                m.rows()
                    .into_iter()
                    .map(|row| format!("[{}]", row.iter().map(float).join(", ")))
                    .join(", ")
            ),
            Self::Missing => f.write_str("--"),
        }
    }
}

pub(crate) fn label_id<L: Label>(label: L) -> i64 {
    label.to_i64().unwrap_or(i64::MAX)
}

fn check_label<L: Label>(label: L) -> Result<()> {
    if label == L::zero() {
        Err(Error::ReservedLabel)
    } else if label < L::zero() {
        Err(Error::NegativeLabel(label_id(label)))
    } else {
        Ok(())
    }
}

fn check_segment_image<L: Label>(data: ArrayView2<f64>, segment_image: ArrayView2<L>) -> Result<()> {
    if data.dim() != segment_image.dim() {
        return Err(Error::ShapeMismatch {
            what: "segment_image",
            expected: data.shape().to_vec(),
            found: segment_image.shape().to_vec(),
        });
    }
    Ok(())
}

/// Photometry and morphology of a single labeled source segment.
///
/// The segment is the set of pixels of `segment_image` equal to the label.
/// Properties are computed on first access and cached. Positions are given
/// in pixel coordinates of the full image as `(y, x)` unless prefixed with
/// `local_`, which refers to the bounding box cutout.
///
/// Moments, centroids and extrema use the input data; sums use the
/// background-subtracted data. With [`MaskMethod::Exclude`], masked pixels
/// take part in neither, with [`MaskMethod::Interpolate`] they take part
/// with their interpolated values.
///
/// [`MaskMethod::Exclude`]: crate::MaskMethod::Exclude
/// [`MaskMethod::Interpolate`]: crate::MaskMethod::Interpolate
#[derive(Debug)]
pub struct SegmentProperties<'a, L: Label> {
    data: ArrayView2<'a, f64>,
    label: L,
    slice: BoundingSlice,
    prepared: Arc<PreparedData>,
    in_segment: Array2<bool>,
    local_mask: Array2<bool>,
    values: OnceLock<Vec<f64>>,
    coords: OnceLock<Vec<(usize, usize)>>,
    moments: OnceLock<Array2<f64>>,
    moments_central: OnceLock<Array2<f64>>,
    ellipse: OnceLock<MomentEllipse>,
    perimeter: OnceLock<f64>,
}

impl<'a, L: Label> SegmentProperties<'a, L> {
    /// Properties of the segment with `label`.
    ///
    /// `label_slice` is the bounding box of the segment. It is searched in
    /// `segment_image` if not given; use [`segment_properties`] to avoid the
    /// search and the data preparation for every single label.
    ///
    /// # Errors
    /// Fails if `label` is not positive or not in `segment_image`, if
    /// `label_slice` does not fit the image, or if any input image does not
    /// match the shape of `data`.
    pub fn new(
        data: ArrayView2<'a, f64>,
        segment_image: ArrayView2<'a, L>,
        label: L,
        label_slice: Option<BoundingSlice>,
        options: &SegmentOptions,
    ) -> Result<Self> {
        check_segment_image(data, segment_image)?;
        check_label(label)?;
        let slice = match label_slice {
            Some(slice) if slice.fits(data.dim()) => slice,
            Some(slice) => {
                return Err(Error::ShapeMismatch {
                    what: "label_slice",
                    expected: data.shape().to_vec(),
                    found: vec![slice.y.end, slice.x.end],
                });
            }
            None => find_objects(segment_image)
                .remove(&label)
                .ok_or_else(|| Error::MissingLabel(label_id(label)))?,
        };
        let prepared = Arc::new(prepare_data(data, options)?);
        Ok(Self::from_prepared(data, segment_image, label, slice, prepared))
    }

    pub(crate) fn from_prepared(
        data: ArrayView2<'a, f64>,
        segment_image: ArrayView2<'a, L>,
        label: L,
        slice: BoundingSlice,
        prepared: Arc<PreparedData>,
    ) -> Self {
        let in_segment = segment_image.slice(slice.info()).mapv(|l| l == label);
        let local_mask = match &prepared.mask {
            Some(mask) => Zip::from(&in_segment)
                .and(mask.slice(slice.info()))
                .map_collect(|i, m| !i || *m),
            None => in_segment.mapv(|i| !i),
        };
        Self {
            data,
            label,
            slice,
            prepared,
            in_segment,
            local_mask,
            values: OnceLock::new(),
            coords: OnceLock::new(),
            moments: OnceLock::new(),
            moments_central: OnceLock::new(),
            ellipse: OnceLock::new(),
            perimeter: OnceLock::new(),
        }
    }

    /// Compute every cached quantity now.
    pub(crate) fn precompute(&self) {
        self.values();
        self.coords();
        self.ellipse();
        self.perimeter();
    }

    /// Sum of an image over the unmasked pixels of the segment.
    fn masked_sum(&self, image: &Array2<f64>) -> f64 {
        Zip::from(image.slice(self.slice.info()))
            .and(&self.local_mask)
            .fold(0., |acc, v, m| if *m { acc } else { acc + v })
    }

    /// The cutout with pixels outside the segment and excluded pixels set to zero.
    fn masked_cutout(&self) -> Array2<f64> {
        Zip::from(self.data_cutout())
            .and(&self.local_mask)
            .map_collect(|v, m| if *m { 0. } else { *v })
    }

    fn ellipse(&self) -> &MomentEllipse {
        self.ellipse
            .get_or_init(|| MomentEllipse::from_central_moments(self.moments_central().view()))
    }

    fn offset(&self, (y, x): (usize, usize)) -> (usize, usize) {
        (y + self.slice.y.start, x + self.slice.x.start)
    }

    /// The label of the segment.
    pub fn id(&self) -> L {
        self.label
    }

    /// Bounding box cutout of the data. Interpolated pixels are filled in.
    pub fn data_cutout(&self) -> ArrayView2<'_, f64> {
        match &self.prepared.input {
            Some(input) => input.slice(self.slice.info()),
            None => self.data.slice(self.slice.info()),
        }
    }

    /// `true` for pixels of the cutout that belong to the segment.
    pub fn in_segment(&self) -> ArrayView2<'_, bool> {
        self.in_segment.view()
    }

    /// `true` for pixels of the cutout that are outside the segment or excluded.
    pub fn local_mask(&self) -> ArrayView2<'_, bool> {
        self.local_mask.view()
    }

    /// Data values of the unmasked segment pixels, in row-major order.
    pub fn values(&self) -> &[f64] {
        self.values.get_or_init(|| {
            Zip::from(self.data_cutout())
                .and(&self.local_mask)
                .fold(Vec::new(), |mut acc, v, m| {
                    if !m {
                        acc.push(*v);
                    }
                    acc
                })
        })
    }

    /// `(y, x)` coordinates of the unmasked segment pixels, in row-major order.
    pub fn coords(&self) -> &[(usize, usize)] {
        self.coords.get_or_init(|| {
            self.local_mask
                .indexed_iter()
                .filter(|(_, m)| !**m)
                .map(|(idx, _)| self.offset(idx))
                .collect()
        })
    }

    /// Raw moments up to third order, `m[[p, q]] = Σ x^p y^q I`, in cutout coordinates.
    pub fn moments(&self) -> &Array2<f64> {
        self.moments.get_or_init(|| moments(self.masked_cutout().view(), 3))
    }

    /// Central moments up to third order around [`Self::local_centroid`].
    pub fn moments_central(&self) -> &Array2<f64> {
        self.moments_central
            .get_or_init(|| moments_central(self.masked_cutout().view(), self.local_centroid(), 3))
    }

    /// `(y, x)` centroid relative to the cutout.
    pub fn local_centroid(&self) -> (f64, f64) {
        let m = self.moments();
        (m[[0, 1]] / m[[0, 0]], m[[1, 0]] / m[[0, 0]])
    }

    /// `(y, x)` centroid.
    pub fn centroid(&self) -> (f64, f64) {
        let (y, x) = self.local_centroid();
        (y + self.slice.y.start as f64, x + self.slice.x.start as f64)
    }

    /// `x` coordinate of the centroid.
    pub fn xcentroid(&self) -> f64 {
        self.centroid().1
    }

    /// `y` coordinate of the centroid.
    pub fn ycentroid(&self) -> f64 {
        self.centroid().0
    }

    /// Bounding box `(ymin, xmin, ymax, xmax)`, all inclusive.
    pub fn bbox(&self) -> (usize, usize, usize, usize) {
        (
            self.slice.y.start,
            self.slice.x.start,
            self.slice.y.end - 1,
            self.slice.x.end - 1,
        )
    }

    /// The bounding box as ranges.
    pub fn slice(&self) -> &BoundingSlice {
        &self.slice
    }

    /// Leftmost column of the bounding box.
    pub fn xmin(&self) -> usize {
        self.slice.x.start
    }

    /// Rightmost column of the bounding box.
    pub fn xmax(&self) -> usize {
        self.slice.x.end - 1
    }

    /// Lowest row of the bounding box.
    pub fn ymin(&self) -> usize {
        self.slice.y.start
    }

    /// Highest row of the bounding box.
    pub fn ymax(&self) -> usize {
        self.slice.y.end - 1
    }

    /// Minimum of [`Self::values`], NaN if all pixels are excluded.
    pub fn min_value(&self) -> f64 {
        self.values().iter().copied().reduce(f64::min).unwrap_or(f64::NAN)
    }

    /// Maximum of [`Self::values`], NaN if all pixels are excluded.
    pub fn max_value(&self) -> f64 {
        self.values().iter().copied().reduce(f64::max).unwrap_or(f64::NAN)
    }

    /// First position of the minimum in the cutout, in row-major order.
    pub fn minval_local_pos(&self) -> Option<(usize, usize)> {
        masked_argmin(self.data_cutout(), self.local_mask.view()).map(|(idx, _)| idx)
    }

    /// First position of the maximum in the cutout, in row-major order.
    pub fn maxval_local_pos(&self) -> Option<(usize, usize)> {
        masked_argmax(self.data_cutout(), self.local_mask.view()).map(|(idx, _)| idx)
    }

    /// `(y, x)` position of the minimum.
    pub fn minval_pos(&self) -> Option<(usize, usize)> {
        self.minval_local_pos().map(|idx| self.offset(idx))
    }

    /// `(y, x)` position of the maximum.
    pub fn maxval_pos(&self) -> Option<(usize, usize)> {
        self.maxval_local_pos().map(|idx| self.offset(idx))
    }

    /// Column of the minimum.
    pub fn minval_xpos(&self) -> Option<usize> {
        self.minval_pos().map(|(_, x)| x)
    }

    /// Row of the minimum.
    pub fn minval_ypos(&self) -> Option<usize> {
        self.minval_pos().map(|(y, _)| y)
    }

    /// Column of the maximum.
    pub fn maxval_xpos(&self) -> Option<usize> {
        self.maxval_pos().map(|(_, x)| x)
    }

    /// Row of the maximum.
    pub fn maxval_ypos(&self) -> Option<usize> {
        self.maxval_pos().map(|(y, _)| y)
    }

    /// Number of unmasked segment pixels.
    pub fn area(&self) -> f64 {
        self.values().len() as f64
    }

    /// Radius of a circle with the same area.
    pub fn equivalent_radius(&self) -> f64 {
        (self.area() / std::f64::consts::PI).sqrt()
    }

    /// Length of the line through the centers of the 4-connected border pixels.
    ///
    /// Masked pixels are part of the segment here.
    pub fn perimeter(&self) -> f64 {
        *self.perimeter.get_or_init(|| perimeter(self.in_segment.view()))
    }

    /// Inertia tensor `[[mu20, -mu11], [-mu11, mu02]]` for rotation around the centroid.
    pub fn inertia_tensor(&self) -> Array2<f64> {
        inertia_tensor(self.moments_central().view()).into_ndarray2()
    }

    /// Covariance of the 2D Gaussian with the same second moments, `[[x2, xy], [xy, y2]]`.
    pub fn covariance(&self) -> Array2<f64> {
        self.ellipse().covariance().into_ndarray2()
    }

    /// Eigenvalues of [`Self::covariance`], largest first.
    pub fn covariance_eigvals(&self) -> (f64, f64) {
        self.ellipse().eigenvalues()
    }

    /// 1-sigma width along the major axis, SExtractor's `A`.
    pub fn semimajor_axis_sigma(&self) -> f64 {
        self.ellipse().semimajor_sigma()
    }

    /// 1-sigma width along the minor axis, SExtractor's `B`.
    pub fn semiminor_axis_sigma(&self) -> f64 {
        self.ellipse().semiminor_sigma()
    }

    /// `sqrt(1 - b² / a²)` in `[0, 1]`, zero if the major axis vanishes and
    /// one for a line-like segment with a vanishing minor axis.
    pub fn eccentricity(&self) -> f64 {
        self.ellipse().eccentricity()
    }

    /// Counter-clockwise angle from the `x` axis to the major axis, in radians.
    pub fn orientation(&self) -> f64 {
        self.ellipse().orientation()
    }

    /// `a / b`
    pub fn se_elongation(&self) -> f64 {
        self.ellipse().elongation()
    }

    /// `1 - b / a`
    pub fn se_ellipticity(&self) -> f64 {
        self.ellipse().ellipticity()
    }

    /// SExtractor's `X2`, the variance along `x`.
    pub fn se_x2(&self) -> f64 {
        self.ellipse().covariance()[(0, 0)]
    }

    /// SExtractor's `Y2`, the variance along `y`.
    pub fn se_y2(&self) -> f64 {
        self.ellipse().covariance()[(1, 1)]
    }

    /// SExtractor's `XY`, the covariance of `x` and `y`.
    pub fn se_xy(&self) -> f64 {
        self.ellipse().covariance()[(0, 1)]
    }

    /// SExtractor's `CXX` ellipse parameter, in pixel⁻².
    pub fn se_cxx(&self) -> f64 {
        self.ellipse().coefficients().0
    }

    /// SExtractor's `CYY` ellipse parameter, in pixel⁻².
    pub fn se_cyy(&self) -> f64 {
        self.ellipse().coefficients().1
    }

    /// SExtractor's `CXY` ellipse parameter, in pixel⁻².
    pub fn se_cxy(&self) -> f64 {
        self.ellipse().coefficients().2
    }

    /// Sum of the background-subtracted data over the unmasked segment pixels.
    pub fn segment_sum(&self) -> f64 {
        self.masked_sum(&self.prepared.data)
    }

    /// Uncertainty of [`Self::segment_sum`], if an error image was given.
    pub fn segment_sum_err(&self) -> Option<f64> {
        let variance = self.prepared.variance.as_ref()?;
        Some(self.masked_sum(variance).sqrt())
    }

    /// Sum of the background over the unmasked segment pixels.
    pub fn background_sum(&self) -> Option<f64> {
        let background = self.prepared.background.as_ref()?;
        Some(self.masked_sum(background))
    }

    /// Mean of the background over the unmasked segment pixels.
    pub fn background_mean(&self) -> Option<f64> {
        self.background_sum().map(|sum| sum / self.area())
    }

    /// Background at the pixel containing the centroid, clamped to the image.
    pub fn background_atcentroid(&self) -> Option<f64> {
        let background = self.prepared.background.as_ref()?;
        let (yc, xc) = self.centroid();
        if !(yc.is_finite() && xc.is_finite()) {
            return Some(f64::NAN);
        }
        let (ny, nx) = background.dim();
        let y = (yc.floor().max(0.) as usize).min(ny - 1);
        let x = (xc.floor().max(0.) as usize).min(nx - 1);
        Some(background[[y, x]])
    }

    /// Look up a property.
    pub fn get(&self, property: Property) -> PropertyValue {
        use PropertyValue::{Float, Int, Matrix, Missing, Vector};

        let int = |v: usize| Int(v as i64);
        let pair = |(y, x): (usize, usize)| Vector(vec![y as f64, x as f64]);
        match property {
            Property::Id => Int(label_id(self.label)),
            Property::DataCutout => Matrix(self.data_cutout().to_owned()),
            Property::Values => Vector(self.values().to_vec()),
            Property::Coords => {
                let coords = self.coords();
                Matrix(Array2::from_shape_fn((coords.len(), 2), |(i, axis)| {
                    let (y, x) = coords[i];
                    if axis == 0 { y as f64 } else { x as f64 }
                }))
            }
            Property::Moments => Matrix(self.moments().clone()),
            Property::MomentsCentral => Matrix(self.moments_central().clone()),
            Property::LocalCentroid => {
                let (y, x) = self.local_centroid();
                Vector(vec![y, x])
            }
            Property::Centroid => {
                let (y, x) = self.centroid();
                Vector(vec![y, x])
            }
            Property::XCentroid => Float(self.xcentroid()),
            Property::YCentroid => Float(self.ycentroid()),
            Property::Bbox => {
                let (y0, x0, y1, x1) = self.bbox();
                Vector(vec![y0 as f64, x0 as f64, y1 as f64, x1 as f64])
            }
            Property::XMin => int(self.xmin()),
            Property::XMax => int(self.xmax()),
            Property::YMin => int(self.ymin()),
            Property::YMax => int(self.ymax()),
            Property::MinValue => Float(self.min_value()),
            Property::MaxValue => Float(self.max_value()),
            Property::MinvalLocalPos => self.minval_local_pos().map_or(Missing, pair),
            Property::MaxvalLocalPos => self.maxval_local_pos().map_or(Missing, pair),
            Property::MinvalPos => self.minval_pos().map_or(Missing, pair),
            Property::MaxvalPos => self.maxval_pos().map_or(Missing, pair),
            Property::MinvalXPos => self.minval_xpos().map_or(Missing, int),
            Property::MinvalYPos => self.minval_ypos().map_or(Missing, int),
            Property::MaxvalXPos => self.maxval_xpos().map_or(Missing, int),
            Property::MaxvalYPos => self.maxval_ypos().map_or(Missing, int),
            Property::Area => Float(self.area()),
            Property::EquivalentRadius => Float(self.equivalent_radius()),
            Property::Perimeter => Float(self.perimeter()),
            Property::InertiaTensor => Matrix(self.inertia_tensor()),
            Property::Covariance => Matrix(self.covariance()),
            Property::CovarianceEigvals => {
                let (l1, l2) = self.covariance_eigvals();
                Vector(vec![l1, l2])
            }
            Property::SemimajorAxisSigma => Float(self.semimajor_axis_sigma()),
            Property::SemiminorAxisSigma => Float(self.semiminor_axis_sigma()),
            Property::Eccentricity => Float(self.eccentricity()),
            Property::Orientation => Float(self.orientation()),
            Property::SeElongation => Float(self.se_elongation()),
            Property::SeEllipticity => Float(self.se_ellipticity()),
            Property::SeX2 => Float(self.se_x2()),
            Property::SeY2 => Float(self.se_y2()),
            Property::SeXy => Float(self.se_xy()),
            Property::SeCxx => Float(self.se_cxx()),
            Property::SeCyy => Float(self.se_cyy()),
            Property::SeCxy => Float(self.se_cxy()),
            Property::SegmentSum => Float(self.segment_sum()),
            Property::SegmentSumErr => self.segment_sum_err().into(),
            Property::BackgroundSum => self.background_sum().into(),
            Property::BackgroundMean => self.background_mean().into(),
            Property::BackgroundAtcentroid => self.background_atcentroid().into(),
        }
    }

    /// Look up a property by its name.
    ///
    /// # Errors
    /// Fails for unknown names.
    pub fn get_by_name(&self, name: &str) -> Result<PropertyValue> {
        Ok(self.get(name.parse()?))
    }
}

/// Validate the inputs and find the bounding slices of the requested labels.
fn label_slices<L: Label>(
    data: ArrayView2<f64>,
    segment_image: ArrayView2<L>,
    labels: Option<&[L]>,
) -> Result<Vec<(L, BoundingSlice)>> {
    check_segment_image(data, segment_image)?;
    let mut slices = find_objects(segment_image);
    let Some(labels) = labels else {
        return Ok(slices.into_iter().collect());
    };

    let mut selected = Vec::with_capacity(labels.len());
    for &label in labels.iter().sorted().dedup() {
        check_label(label)?;
        match slices.remove(&label) {
            Some(slice) => selected.push((label, slice)),
            None => debug!("Label {label:?} is not in the segmentation image, skipping."),
        }
    }
    Ok(selected)
}

/// Properties of all segments of a segmentation image.
///
/// The data is prepared once and shared by all segments. Segments are
/// returned in ascending label order. If `labels` is given, only those
/// labels are considered; labels that do not occur in `segment_image` are
/// skipped.
///
/// # Errors
/// Fails if an input image does not match the shape of `data`, or if
/// `labels` contains zero or negative labels.
pub fn segment_properties<'a, L: Label>(
    data: ArrayView2<'a, f64>,
    segment_image: ArrayView2<'a, L>,
    options: &SegmentOptions,
    labels: Option<&[L]>,
) -> Result<Vec<SegmentProperties<'a, L>>> {
    let slices = label_slices(data, segment_image, labels)?;
    let prepared = Arc::new(prepare_data(data, options)?);
    info!("Measuring {} segments.", slices.len());

    Ok(slices
        .into_iter()
        .map(|(label, slice)| {
            SegmentProperties::from_prepared(data, segment_image, label, slice, prepared.clone())
        })
        .collect())
}

#[cfg(feature = "parallel")]
mod parallel {
    use super::*;
    use rayon::prelude::*;

    /// Like [`segment_properties`], but computes the moments, shape and
    /// pixel lists of all segments in parallel up front.
    ///
    /// # Errors
    /// Same as [`segment_properties`].
    pub fn segment_properties_par<'a, L: Label>(
        data: ArrayView2<'a, f64>,
        segment_image: ArrayView2<'a, L>,
        options: &SegmentOptions,
        labels: Option<&[L]>,
    ) -> Result<Vec<SegmentProperties<'a, L>>> {
        let slices = label_slices(data, segment_image, labels)?;
        let prepared = Arc::new(prepare_data(data, options)?);
        info!("Measuring {} segments in parallel.", slices.len());

        Ok(slices
            .into_par_iter()
            .map(|(label, slice)| {
                let props =
                    SegmentProperties::from_prepared(data, segment_image, label, slice, prepared.clone());
                props.precompute();
                props
            })
            .collect())
    }
}

#[cfg(feature = "parallel")]
pub use parallel::*;

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    use super::*;
    use crate::segmentation::prepare::MaskMethod;

    fn data() -> Array2<f64> {
        Array2::from_shape_fn((4, 4), |(y, x)| (4 * y + x) as f64)
    }

    fn segments() -> Array2<i32> {
        array![[1, 1, 0, 0], [1, 0, 0, 2], [0, 0, 2, 2], [0, 2, 2, 0]]
    }

    fn init_logger() {
        let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Debug, simplelog::Config::default());
    }

    #[test]
    fn two_regions() {
        init_logger();
        let (data, segm) = (data(), segments());
        let props = segment_properties(data.view(), segm.view(), &SegmentOptions::default(), None).unwrap();
        assert_eq!(props.len(), 2);

        let first = &props[0];
        assert_eq!(first.id(), 1);
        assert_abs_diff_eq!(first.ycentroid(), 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(first.xcentroid(), 0.2, epsilon = 1e-12);
        assert_eq!(first.segment_sum(), 5.);
        assert_eq!(first.area(), 3.);
        // only two pixels carry flux, a line with a vanishing minor axis
        // reaches the closed upper bound
        assert!((0. ..=1.).contains(&first.eccentricity()));
        assert_abs_diff_eq!(first.eccentricity(), 1., epsilon = 1e-6);

        let second = &props[1];
        assert_eq!(second.segment_sum(), 55.);
        assert_abs_diff_eq!(second.ycentroid(), 26. / 11., epsilon = 1e-12);
        assert_abs_diff_eq!(second.xcentroid(), 23. / 11., epsilon = 1e-12);
        assert_abs_diff_eq!(second.perimeter(), 5.41421356, epsilon = 1e-8);
        assert_abs_diff_eq!(second.orientation(), -0.74175931, epsilon = 1e-8);
        assert_eq!(second.bbox(), (1, 1, 3, 3));
        assert_eq!(second.values(), &[7., 10., 11., 13., 14.]);
        assert_eq!(second.coords(), &[(1, 3), (2, 2), (2, 3), (3, 1), (3, 2)]);
    }

    #[test]
    fn shape_descriptors() {
        let (data, segm) = (data(), segments());
        let props = SegmentProperties::new(data.view(), segm.view(), 2, None, &SegmentOptions::default()).unwrap();

        let (l1, l2) = props.covariance_eigvals();
        assert!(l1 >= l2);
        assert_abs_diff_eq!(l1, 0.91887107, epsilon = 1e-8);
        assert_abs_diff_eq!(l2, 0.12245124, epsilon = 1e-8);
        assert_abs_diff_eq!(props.se_x2(), 0.55537190, epsilon = 1e-8);
        assert_abs_diff_eq!(props.se_xy(), -0.39669421, epsilon = 1e-8);
        assert_abs_diff_eq!(props.se_y2(), 0.48595041, epsilon = 1e-8);
        assert_abs_diff_eq!(props.eccentricity(), 0.93098727, epsilon = 1e-8);
        assert_abs_diff_eq!(props.semimajor_axis_sigma(), 0.95857763, epsilon = 1e-8);
        assert_abs_diff_eq!(props.semiminor_axis_sigma(), 0.34993034, epsilon = 1e-8);
        assert_abs_diff_eq!(props.se_elongation(), 2.73933843, epsilon = 1e-7);
        assert_abs_diff_eq!(props.se_ellipticity(), 0.63494836, epsilon = 1e-8);
        assert_abs_diff_eq!(props.se_cxx(), 4.31891026, epsilon = 1e-7);
        assert_abs_diff_eq!(props.se_cyy(), 4.93589744, epsilon = 1e-7);
        assert_abs_diff_eq!(props.se_cxy(), 7.05128205, epsilon = 1e-7);

        let inertia = props.inertia_tensor();
        assert_abs_diff_eq!(inertia, array![[30.54545455, 21.81818182], [21.81818182, 26.72727273]], epsilon = 1e-7);
        let mu = props.moments_central();
        assert_abs_diff_eq!(mu[[0, 0]], 55., epsilon = 1e-12);
        assert_abs_diff_eq!(mu[[1, 0]], 0., epsilon = 1e-10);
        assert_eq!(mu.dim(), (4, 4));
    }

    #[test]
    fn extrema() {
        let (data, segm) = (data(), segments());
        let props = SegmentProperties::new(data.view(), segm.view(), 2, None, &SegmentOptions::default()).unwrap();

        assert_eq!(props.min_value(), 7.);
        assert_eq!(props.max_value(), 14.);
        assert_eq!(props.minval_local_pos(), Some((0, 2)));
        assert_eq!(props.minval_pos(), Some((1, 3)));
        assert_eq!(props.maxval_pos(), Some((3, 2)));
        assert_eq!(props.maxval_xpos(), Some(2));
        assert_eq!(props.minval_ypos(), Some(1));
        assert_eq!((props.xmin(), props.xmax(), props.ymin(), props.ymax()), (1, 3, 1, 3));
        assert_abs_diff_eq!(props.equivalent_radius(), (5. / std::f64::consts::PI).sqrt());
    }

    #[test]
    fn background_and_errors() {
        let (data, segm) = (data(), segments());
        let options = SegmentOptions::default()
            .with_background(1.)
            .with_error(Array2::from_elem((4, 4), 2.));
        let props = SegmentProperties::new(data.view(), segm.view(), 1, None, &options).unwrap();

        assert_eq!(props.segment_sum(), 2.);
        assert_eq!(props.segment_sum_err(), Some(12f64.sqrt()));
        assert_eq!(props.background_sum(), Some(3.));
        assert_eq!(props.background_mean(), Some(1.));
        assert_eq!(props.background_atcentroid(), Some(1.));
        // moments still use the input data
        assert_abs_diff_eq!(props.ycentroid(), 0.8, epsilon = 1e-12);

        let plain = SegmentProperties::new(data.view(), segm.view(), 1, None, &SegmentOptions::default()).unwrap();
        assert_eq!(plain.segment_sum_err(), None);
        assert_eq!(plain.background_atcentroid(), None);
        assert_eq!(plain.get(Property::BackgroundSum), PropertyValue::Missing);
    }

    #[test]
    fn background_at_centroid_pixel() {
        let (data, segm) = (data(), segments());
        let background = Array2::from_shape_fn((4, 4), |(y, x)| (10 * y + x) as f64);
        let options = SegmentOptions::default().with_background(background);
        let props = SegmentProperties::new(data.view(), segm.view(), 2, None, &options).unwrap();

        // centroid (2.36, 2.09) lies in pixel (2, 2)
        assert_eq!(props.background_atcentroid(), Some(22.));
    }

    #[test]
    fn mask_methods_differ() {
        let (data, segm) = (data(), segments());
        let mut mask = Array2::from_elem((4, 4), false);
        mask[[2, 2]] = true;

        let exclude = SegmentOptions::default().with_mask(mask.clone());
        let excluded = SegmentProperties::new(data.view(), segm.view(), 2, None, &exclude).unwrap();
        assert_eq!(excluded.segment_sum(), 45.);
        assert_eq!(excluded.area(), 4.);
        assert!(!excluded.coords().contains(&(2, 2)));
        // the perimeter only depends on the segment
        assert_abs_diff_eq!(excluded.perimeter(), 5.41421356, epsilon = 1e-8);

        let interpolate = exclude.with_mask_method(MaskMethod::Interpolate);
        let interpolated = SegmentProperties::new(data.view(), segm.view(), 2, None, &interpolate).unwrap();
        // all eight neighbors of (2, 2) average to 10
        assert_eq!(interpolated.segment_sum(), 55.);
        assert_eq!(interpolated.area(), 5.);
        assert_eq!(interpolated.values(), &[7., 10., 11., 13., 14.]);
    }

    #[test]
    fn interpolated_values_replace_masked_pixels() {
        let (mut data, segm) = (data(), segments());
        data[[2, 2]] = 1000.;
        let mut mask = Array2::from_elem((4, 4), false);
        mask[[2, 2]] = true;
        let options = SegmentOptions::default()
            .with_mask(mask)
            .with_mask_method(MaskMethod::Interpolate);
        let props = SegmentProperties::new(data.view(), segm.view(), 2, None, &options).unwrap();

        assert_eq!(props.max_value(), 14.);
        assert_eq!(props.data_cutout()[[1, 1]], 10.);
        assert_abs_diff_eq!(props.ycentroid(), 26. / 11., epsilon = 1e-12);
    }

    #[test]
    fn label_errors() {
        let (data, segm) = (data(), segments());
        let options = SegmentOptions::default();
        assert_eq!(
            SegmentProperties::new(data.view(), segm.view(), 0, None, &options).unwrap_err(),
            Error::ReservedLabel
        );
        assert_eq!(
            SegmentProperties::new(data.view(), segm.view(), -2, None, &options).unwrap_err(),
            Error::NegativeLabel(-2)
        );
        assert_eq!(
            SegmentProperties::new(data.view(), segm.view(), 5, None, &options).unwrap_err(),
            Error::MissingLabel(5)
        );
        assert!(matches!(
            segment_properties(data.view(), segm.view(), &options, Some(&[1, 0][..])),
            Err(Error::ReservedLabel)
        ));
    }

    #[test]
    fn shape_errors() {
        let data = data();
        let segm = Array2::<u8>::ones((3, 4));
        assert!(matches!(
            SegmentProperties::new(data.view(), segm.view(), 1, None, &SegmentOptions::default()),
            Err(Error::ShapeMismatch { what: "segment_image", .. })
        ));

        let segm = segments();
        let slice = BoundingSlice::new(0..5, 0..2);
        assert!(matches!(
            SegmentProperties::new(data.view(), segm.view(), 1, Some(slice), &SegmentOptions::default()),
            Err(Error::ShapeMismatch { what: "label_slice", .. })
        ));

        let options = SegmentOptions::default().with_background(Array2::zeros((4, 3)));
        assert!(matches!(
            segment_properties(data.view(), segm.view(), &options, None),
            Err(Error::ShapeMismatch { what: "background", .. })
        ));
    }

    #[test]
    fn invalid_gain() {
        let (data, segm) = (data(), segments());
        let options = SegmentOptions::default()
            .with_error(Array2::ones((4, 4)))
            .with_gain(-1.);
        assert_eq!(
            SegmentProperties::new(data.view(), segm.view(), 1, None, &options).unwrap_err(),
            Error::NonPositiveGain
        );
    }

    #[test]
    fn label_subset() {
        init_logger();
        let (data, segm) = (data(), segments());
        let props =
            segment_properties(data.view(), segm.view(), &SegmentOptions::default(), Some(&[7, 2, 2][..])).unwrap();
        assert_eq!(props.iter().map(|p| p.id()).collect_vec(), vec![2]);
    }

    #[test]
    fn unsigned_labels() {
        let data = data();
        let segm = segments().mapv(|l| l as u16);
        let props = segment_properties(data.view(), segm.view(), &SegmentOptions::default(), None).unwrap();
        assert_eq!(props.iter().map(|p| p.id()).collect_vec(), vec![1u16, 2]);
    }

    #[test]
    fn fully_excluded_segment() {
        let (data, segm) = (data(), segments());
        let mut mask = Array2::from_elem((4, 4), false);
        mask.slice_mut(ndarray::s![0..2, 0..2]).fill(true);
        let options = SegmentOptions::default().with_mask(mask);
        let props = SegmentProperties::new(data.view(), segm.view(), 1, None, &options).unwrap();

        assert_eq!(props.area(), 0.);
        assert!(props.min_value().is_nan());
        assert_eq!(props.minval_pos(), None);
        assert_eq!(props.get(Property::MinvalXPos), PropertyValue::Missing);
        assert!(props.xcentroid().is_nan());
    }

    #[test]
    fn access_by_name() {
        let (data, segm) = (data(), segments());
        let props = SegmentProperties::new(data.view(), segm.view(), 1, None, &SegmentOptions::default()).unwrap();

        assert_eq!(props.get_by_name("id"), Ok(PropertyValue::Int(1)));
        assert_eq!(props.get_by_name("area"), Ok(PropertyValue::Float(3.)));
        assert_eq!(props.get_by_name("bbox"), Ok(PropertyValue::Vector(vec![0., 0., 1., 1.])));
        assert_eq!(
            props.get_by_name("coords"),
            Ok(PropertyValue::Matrix(array![[0., 0.], [0., 1.], [1., 0.]]))
        );
        assert_eq!(
            props.get_by_name("flux"),
            Err(Error::UnknownProperty("flux".to_string()))
        );

        assert_eq!(Property::ALL.len(), 48);
        for property in Property::ALL {
            assert_eq!(property.name().parse::<Property>(), Ok(*property));
        }
    }

    #[test]
    fn value_display() {
        assert_eq!(PropertyValue::Int(3).to_string(), "3");
        assert_eq!(format!("{:.2}", PropertyValue::Float(1.234)), "1.23");
        assert_eq!(PropertyValue::Vector(vec![1., 2.5]).to_string(), "[1, 2.5]");
        assert_eq!(PropertyValue::Matrix(array![[1., 2.], [3., 4.]]).to_string(), "[[1, 2], [3, 4]]");
        assert_eq!(PropertyValue::Missing.to_string(), "--");
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_serial() {
        let (data, segm) = (data(), segments());
        let options = SegmentOptions::default().with_background(0.5);
        let serial = segment_properties(data.view(), segm.view(), &options, None).unwrap();
        let parallel = segment_properties_par(data.view(), segm.view(), &options, None).unwrap();

        assert_eq!(serial.len(), parallel.len());
        for (s, p) in serial.iter().zip(&parallel) {
            for property in Property::ALL {
                // compared as text so that NaN equals NaN
                assert_eq!(s.get(*property).to_string(), p.get(*property).to_string());
            }
        }
    }
}
