//! Alignment oracle: decides whether an overlay page depicts a candidate
//! original page and, if so, warps it into the original's frame.
//!
//! The pairing engine only sees the [`AlignmentOracle`] trait. The default
//! implementation, [`FeatureAligner`], runs FAST corners + BRIEF descriptors,
//! ratio-test matching, RANSAC homography fitting, and geometric sanity gates.

mod aligner;
pub(crate) mod features;
pub(crate) mod warp;

use image::RgbaImage;
use nalgebra::Matrix3;

use crate::error::AlignError;
use crate::page::PageImages;

pub use aligner::{AlignerConfig, FeatureAligner};
pub use features::{detect_and_describe, hamming, match_ratio_test, BriefPattern, Descriptor, FeatureSet};
pub use warp::warp_perspective;

/// Successful overlay→original alignment.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Overlay color image warped into the original's frame (same size).
    pub warped: RgbaImage,
    /// Overlay→original transform.
    pub homography: Matrix3<f64>,
    pub n_inliers: usize,
    /// Original area over projected area.
    pub area_ratio: f64,
}

/// Capability consulted by the pairing engine for every candidate pair.
pub trait AlignmentOracle {
    /// Align `overlay` onto `original`, using at most `feature_budget`
    /// features per image.
    fn align(
        &self,
        overlay: &PageImages,
        original: &PageImages,
        feature_budget: usize,
    ) -> Result<Alignment, AlignError>;
}

impl<T: AlignmentOracle + ?Sized> AlignmentOracle for &T {
    fn align(
        &self,
        overlay: &PageImages,
        original: &PageImages,
        feature_budget: usize,
    ) -> Result<Alignment, AlignError> {
        (**self).align(overlay, original, feature_budget)
    }
}

impl<T: AlignmentOracle + ?Sized> AlignmentOracle for Box<T> {
    fn align(
        &self,
        overlay: &PageImages,
        original: &PageImages,
        feature_budget: usize,
    ) -> Result<Alignment, AlignError> {
        (**self).align(overlay, original, feature_budget)
    }
}
