//! A collection of various utilities needed in this library.
//! The two main groups are `nalgebra` to `ndarray` conversions,
//! inspired by [`nshare`](https://github.com/rust-cv/nshare);
//! and common operations on (masked) arrays.

use std::collections::BTreeMap;
use std::ops::Range;

use itertools::Itertools;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, Dim, Matrix, Scalar, Storage};
use ndarray::{Array2, ArrayView2, Ix2, SliceInfo, SliceInfoElem, s};

use crate::Label;

/// Conversion into an owned two-dimensional `ndarray`.
///
/// Implemented for [`Array2`] itself and for `nalgebra` matrices, so images and
/// PSF grids can be handed over in either representation.
pub trait IntoNdarray2 {
    /// Output array type.
    type Out;

    /// Perform the conversion.
    fn into_ndarray2(self) -> Self::Out;
}

impl<N: Scalar> IntoNdarray2 for Array2<N> {
    type Out = Array2<N>;

    fn into_ndarray2(self) -> Self::Out {
        self
    }
}

impl<N: Scalar> IntoNdarray2 for ArrayView2<'_, N> {
    type Out = Array2<N>;

    fn into_ndarray2(self) -> Self::Out {
        self.to_owned()
    }
}

impl<N: Scalar, C: Dim, R: Dim, S: Storage<N, R, C>> IntoNdarray2 for Matrix<N, R, C, S>
where
    DefaultAllocator: Allocator<R, C, Buffer<N> = S>,
{
    type Out = Array2<N>;

    fn into_ndarray2(self) -> Self::Out {
        Array2::from_shape_fn(self.shape(), |(row, col)| self[(row, col)].clone())
    }
}

/// The minimal rectangle enclosing all pixels of one label.
///
/// Stop indices are exclusive, as with Rust ranges.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundingSlice {
    /// Row range.
    pub y: Range<usize>,
    /// Column range.
    pub x: Range<usize>,
}

impl BoundingSlice {
    /// Create a new slice from row and column ranges.
    pub fn new(y: Range<usize>, x: Range<usize>) -> Self {
        Self { y, x }
    }

    /// Shape `(ny, nx)` of the cutout.
    pub fn shape(&self) -> (usize, usize) {
        (self.y.len(), self.x.len())
    }

    /// Whether the slice lies inside an array of the given shape.
    pub(crate) fn fits(&self, shape: (usize, usize)) -> bool {
        self.y.start < self.y.end
            && self.x.start < self.x.end
            && self.y.end <= shape.0
            && self.x.end <= shape.1
    }

    pub(crate) fn info(&self) -> SliceInfo<[SliceInfoElem; 2], Ix2, Ix2> {
        s![self.y.clone(), self.x.clone()]
    }

    fn extend(&mut self, y: usize, x: usize) {
        self.y.start = self.y.start.min(y);
        self.y.end = self.y.end.max(y + 1);
        self.x.start = self.x.start.min(x);
        self.x.end = self.x.end.max(x + 1);
    }
}

/// Find the bounding slice of every positive label in a segmentation image.
pub fn find_objects<L: Label>(segment_image: ArrayView2<L>) -> BTreeMap<L, BoundingSlice> {
    let mut slices: BTreeMap<L, BoundingSlice> = BTreeMap::new();
    for ((y, x), &label) in segment_image.indexed_iter() {
        if label <= L::zero() {
            continue;
        }
        slices
            .entry(label)
            .and_modify(|slice| slice.extend(y, x))
            .or_insert_with(|| BoundingSlice::new(y..y + 1, x..x + 1));
    }
    slices
}

/// Arithmetic mean of the values for which `keep` is `true`.
///
/// Returns `None` if nothing is kept.
pub(crate) fn masked_mean<'a>(
    values: impl IntoIterator<Item = &'a f64>,
    keep: impl IntoIterator<Item = bool>,
) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .zip(keep)
        .filter(|(_, k)| *k)
        .fold((0., 0usize), |(sum, count), (v, _)| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Median of a set of values, averaging the two central values for even counts.
pub(crate) fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let sorted = values
        .into_iter()
        .sorted_unstable_by(|a, b| a.total_cmp(b))
        .collect_vec();
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some(0.5 * (sorted[n / 2 - 1] + sorted[n / 2])),
    }
}

/// Position and value of the first minimum among unmasked elements, in row-major order.
pub(crate) fn masked_argmin(
    arr: ArrayView2<f64>,
    mask: ArrayView2<bool>,
) -> Option<((usize, usize), f64)> {
    arr.indexed_iter()
        .zip(mask.iter())
        .filter(|(_, m)| !**m)
        .map(|((idx, v), _)| (idx, *v))
        .reduce(|acc, f| if f.1 < acc.1 { f } else { acc })
}

/// Position and value of the first maximum among unmasked elements, in row-major order.
pub(crate) fn masked_argmax(
    arr: ArrayView2<f64>,
    mask: ArrayView2<bool>,
) -> Option<((usize, usize), f64)> {
    arr.indexed_iter()
        .zip(mask.iter())
        .filter(|(_, m)| !**m)
        .map(|((idx, v), _)| (idx, *v))
        .reduce(|acc, f| if f.1 > acc.1 { f } else { acc })
}

#[cfg(test)]
mod tests {
    use nalgebra::matrix;
    use ndarray::array;

    use super::*;

    #[test]
    fn matrix_to_array2() {
        let matrix = matrix![1., 2., 3.; 4., 5., 6.; 7., 8., 9.];
        let arr = matrix.into_ndarray2();

        assert_eq!(arr, array![[1., 2., 3.], [4., 5., 6.], [7., 8., 9.]]);
    }

    #[test]
    fn non_square_matrix_to_array2() {
        let matrix = matrix![1., 2., 3.; 4., 5., 6.];
        let arr = matrix.into_ndarray2();

        assert_eq!(arr, array![[1., 2., 3.], [4., 5., 6.]]);
    }

    #[test]
    fn objects() {
        let segm = array![[1, 1, 0, 0], [1, 0, 0, 2], [0, 0, 2, 2], [0, 2, 2, 0]];
        let slices = find_objects(segm.view());

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[&1], BoundingSlice::new(0..2, 0..2));
        assert_eq!(slices[&2], BoundingSlice::new(1..4, 1..4));
    }

    #[test]
    fn objects_ignore_non_positive() {
        let segm = array![[-1, 0], [0, 3]];
        let slices = find_objects(segm.view());

        assert_eq!(slices.keys().copied().collect_vec(), vec![3]);
        assert_eq!(slices[&3], BoundingSlice::new(1..2, 1..2));
    }

    #[test]
    fn medians() {
        assert_eq!(median([3., 1., 2.]), Some(2.));
        assert_eq!(median([4., 1., 2., 3.]), Some(2.5));
        assert_eq!(median(Vec::<f64>::new()), None);
    }

    #[test]
    fn means() {
        let values = [1., 2., 3., 4.];
        assert_eq!(masked_mean(&values, [true, false, true, false]), Some(2.));
        assert_eq!(masked_mean(&values, [false; 4]), None);
    }

    #[test]
    fn extrema() {
        let arr = array![[5., 1.], [1., 7.]];
        let mask = array![[false, false], [false, true]];

        assert_eq!(masked_argmin(arr.view(), mask.view()), Some(((0, 1), 1.)));
        assert_eq!(masked_argmax(arr.view(), mask.view()), Some(((0, 0), 5.)));
    }
}
