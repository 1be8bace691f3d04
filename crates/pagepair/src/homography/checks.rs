//! Geometric sanity gates applied to an estimated page homography.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use super::core::project;
use crate::error::AlignError;
use crate::page::PageClass;

/// Accepted `original_area / projected_area` band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaBand {
    pub min: f64,
    pub max: f64,
}

impl AreaBand {
    pub fn contains(&self, ratio: f64) -> bool {
        ratio.is_finite() && ratio >= self.min && ratio <= self.max
    }
}

/// Thresholds for [`check_homography`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomographyChecks {
    /// A fit needs strictly more inliers than this.
    pub min_inliers_exclusive: usize,
    /// Band when overlay and original share a page class.
    pub same_class_band: AreaBand,
    /// Band when one is a spread and the other a single page.
    pub mixed_class_band: AreaBand,
}

impl Default for HomographyChecks {
    fn default() -> Self {
        Self {
            min_inliers_exclusive: 10,
            same_class_band: AreaBand {
                min: 0.6665,
                max: 1.5,
            },
            mixed_class_band: AreaBand {
                min: 0.3334,
                max: 3.0,
            },
        }
    }
}

/// Corners of a `width x height` page, clockwise from the origin.
pub fn page_corners(width: u32, height: u32) -> [[f64; 2]; 4] {
    let (w, h) = (width as f64, height as f64);
    [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
}

/// Strict convexity of a closed polygon: every turn has the same non-zero sign.
pub fn is_convex(poly: &[[f64; 2]]) -> bool {
    let n = poly.len();
    if n < 3 || poly.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        let c = poly[(i + 2) % n];
        let cross = (b[0] - a[0]) * (c[1] - b[1]) - (b[1] - a[1]) * (c[0] - b[0]);
        if cross == 0.0 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Shoelace area (unsigned).
pub fn polygon_area(poly: &[[f64; 2]]) -> f64 {
    let n = poly.len();
    let mut twice = 0.0;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        twice += a[0] * b[1] - b[0] * a[1];
    }
    0.5 * twice.abs()
}

/// Validate a fitted overlay→original homography.
///
/// The original's corner quad is pushed through `h`; the result must be
/// convex and its area must stay within the band for the two page classes.
/// Returns the measured area ratio on success.
pub fn check_homography(
    h: &Matrix3<f64>,
    n_inliers: usize,
    overlay_class: PageClass,
    original_dims: (u32, u32),
    checks: &HomographyChecks,
) -> Result<f64, AlignError> {
    if n_inliers <= checks.min_inliers_exclusive {
        return Err(AlignError::InsufficientInliers {
            threshold: checks.min_inliers_exclusive,
            found: n_inliers,
        });
    }

    let (w, h_px) = original_dims;
    let transformed: Vec<[f64; 2]> = page_corners(w, h_px)
        .iter()
        .map(|c| project(h, c[0], c[1]))
        .collect();
    if !is_convex(&transformed) {
        return Err(AlignError::NonConvexProjection);
    }

    let original_area = w as f64 * h_px as f64;
    let ratio = original_area / polygon_area(&transformed);
    let original_class = PageClass::of_dimensions(w, h_px);
    let band = if original_class == overlay_class {
        checks.same_class_band
    } else {
        checks.mixed_class_band
    };
    if !band.contains(ratio) {
        return Err(AlignError::ImplausibleAreaRatio {
            ratio,
            min: band.min,
            max: band.max,
        });
    }
    Ok(ratio)
}
