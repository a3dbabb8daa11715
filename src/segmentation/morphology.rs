//! Binary morphology on segment cutouts.

use std::f64::consts::SQRT_2;

use ndarray::{Array2, ArrayView2};

/// Weight of a border pixel, indexed by its neighborhood code.
///
/// The code of a border pixel is `1 + 2 * (4-neighbors on the border)
/// + 10 * (diagonal neighbors on the border)`.
fn border_weight(code: u8) -> f64 {
    match code {
        5 | 7 | 15 | 17 | 25 | 27 => 1.,
        21 | 33 => SQRT_2,
        13 | 23 => (1. + SQRT_2) / 2.,
        _ => 0.,
    }
}

/// Erosion with a 4-connected cross; pixels outside the array count as unset.
fn erode(image: ArrayView2<bool>) -> Array2<bool> {
    let (ny, nx) = image.dim();
    Array2::from_shape_fn((ny, nx), |(y, x)| {
        image[[y, x]]
            && y > 0
            && x > 0
            && y + 1 < ny
            && x + 1 < nx
            && image[[y - 1, x]]
            && image[[y + 1, x]]
            && image[[y, x - 1]]
            && image[[y, x + 1]]
    })
}

/// Length of the line through the centers of the border pixels of a region.
///
/// Border pixels are set pixels with at least one unset 4-neighbor. Each is
/// weighted by how its neighbors continue the border: straight runs count
/// 1, diagonal steps √2 and corners (1 + √2) / 2.
pub(crate) fn perimeter(image: ArrayView2<bool>) -> f64 {
    let eroded = erode(image);
    let border = Array2::from_shape_fn(image.dim(), |idx| image[idx] && !eroded[idx]);
    let (ny, nx) = border.dim();
    let on_border = |y: isize, x: isize| {
        y >= 0 && x >= 0 && (y as usize) < ny && (x as usize) < nx && border[[y as usize, x as usize]]
    };

    border
        .indexed_iter()
        .filter(|(_, b)| **b)
        .map(|((y, x), _)| {
            let (y, x) = (y as isize, x as isize);
            let straight = [(-1, 0), (1, 0), (0, -1), (0, 1)]
                .into_iter()
                .filter(|(dy, dx)| on_border(y + dy, x + dx))
                .count() as u8;
            let diagonal = [(-1, -1), (-1, 1), (1, -1), (1, 1)]
                .into_iter()
                .filter(|(dy, dx)| on_border(y + dy, x + dx))
                .count() as u8;
            border_weight(1 + 2 * straight + 10 * diagonal)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn single_pixel() {
        assert_eq!(perimeter(array![[true]].view()), 0.);
    }

    #[test]
    fn diagonal_region() {
        let image = array![[false, false, true], [false, true, true], [true, true, false]];
        assert_abs_diff_eq!(perimeter(image.view()), 3. + SQRT_2 + 1., epsilon = 1e-12);
    }

    #[test]
    fn square() {
        let image = Array2::from_elem((4, 4), true);
        let eroded = erode(image.view());
        assert_eq!(eroded.iter().filter(|e| **e).count(), 4);
        // twelve border pixels, each continuing a straight run
        assert_abs_diff_eq!(perimeter(image.view()), 12., epsilon = 1e-12);
    }

    #[test]
    fn line() {
        let image = Array2::from_elem((1, 5), true);
        // three interior pixels, ends have a single neighbor
        assert_abs_diff_eq!(perimeter(image.view()), 3., epsilon = 1e-12);
    }
}
