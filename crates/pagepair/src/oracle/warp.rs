//! Perspective warping of an RGBA page into another page's frame.

use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::Matrix3;

/// Row-major `f32` projection for `h`, scaled so the last entry is one.
///
/// `None` when `h` is singular or cannot be scaled.
fn projection_of(h: &Matrix3<f64>) -> Option<Projection> {
    let w = h[(2, 2)];
    if !w.is_finite() || w.abs() < 1e-12 {
        return None;
    }
    let mut m = [0.0f32; 9];
    for (k, v) in m.iter_mut().enumerate() {
        *v = (h[(k / 3, k % 3)] / w) as f32;
    }
    if m.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Projection::from_matrix(m)
}

/// Warp `src` through `h` (src → destination coordinates) into a
/// `width x height` canvas. Uncovered pixels are fully transparent.
///
/// Returns `None` when `h` is not invertible.
pub fn warp_perspective(src: &RgbaImage, h: &Matrix3<f64>, width: u32, height: u32) -> Option<RgbaImage> {
    let projection = projection_of(h)?;
    let mut out = RgbaImage::new(width, height);
    warp_into(src, &projection, Interpolation::Bilinear, Rgba([0, 0, 0, 0]), &mut out);
    Some(out)
}
