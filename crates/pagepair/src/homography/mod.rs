//! Homography estimation, projection, and page-level sanity checks.

mod checks;
mod core;

pub use checks::{check_homography, is_convex, page_corners, polygon_area, AreaBand, HomographyChecks};
pub use core::{
    fit_homography_ransac, project, Correspondence, HomographyError, HomographyFit, RansacConfig,
    MIN_CORRESPONDENCES,
};

/// Row-major copy of a 3×3 matrix for serialization.
pub fn matrix3_to_array(m: &nalgebra::Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}
