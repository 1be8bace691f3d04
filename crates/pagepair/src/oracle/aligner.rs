//! Feature-based default oracle.

use serde::{Deserialize, Serialize};

use super::features::{detect_and_describe, match_ratio_test, BriefPattern};
use super::warp::warp_perspective;
use super::{Alignment, AlignmentOracle};
use crate::error::AlignError;
use crate::homography::{
    check_homography, fit_homography_ransac, Correspondence, HomographyChecks, HomographyError,
    RansacConfig,
};
use crate::page::PageImages;

/// Tuning for [`FeatureAligner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// FAST-9 intensity threshold.
    pub fast_threshold: u8,
    /// Half-size of the square BRIEF sampling patch (pixels).
    pub patch_radius: u32,
    /// Gaussian sigma applied before descriptor sampling.
    pub blur_sigma: f32,
    /// Seed of the BRIEF sampling pattern.
    pub descriptor_seed: u64,
    /// Lowe ratio-test threshold.
    pub ratio_threshold: f32,
    /// Matches needed after the ratio test.
    pub min_good_matches: usize,
    pub ransac: RansacConfig,
    pub checks: HomographyChecks,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            patch_radius: 15,
            blur_sigma: 2.0,
            descriptor_seed: 0x0b71_ef00,
            ratio_threshold: 0.75,
            min_good_matches: 5,
            ransac: RansacConfig::default(),
            checks: HomographyChecks::default(),
        }
    }
}

/// Candidate rejection carrying the cause of a failed fit.
fn rejection(e: HomographyError) -> AlignError {
    match e {
        HomographyError::TooFewPoints { needed, got } => AlignError::InsufficientMatches {
            needed,
            found: got,
        },
        HomographyError::Degenerate => AlignError::DegenerateHomography,
    }
}

/// FAST + BRIEF + RANSAC alignment.
#[derive(Debug, Clone)]
pub struct FeatureAligner {
    config: AlignerConfig,
    pattern: BriefPattern,
}

impl Default for FeatureAligner {
    fn default() -> Self {
        Self::new(AlignerConfig::default())
    }
}

impl FeatureAligner {
    pub fn new(config: AlignerConfig) -> Self {
        let pattern = BriefPattern::new(config.patch_radius, config.descriptor_seed);
        Self { config, pattern }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }
}

impl AlignmentOracle for FeatureAligner {
    fn align(
        &self,
        overlay: &PageImages,
        original: &PageImages,
        feature_budget: usize,
    ) -> Result<Alignment, AlignError> {
        let cfg = &self.config;
        let describe = |page: &PageImages| {
            detect_and_describe(
                page.gray(),
                feature_budget,
                cfg.fast_threshold,
                cfg.blur_sigma,
                &self.pattern,
            )
        };
        let original_features = describe(original);
        let overlay_features = describe(overlay);
        if original_features.is_empty() || overlay_features.is_empty() {
            return Err(AlignError::InsufficientKeypoints {
                overlay: overlay_features.len(),
                original: original_features.len(),
            });
        }

        let good = match_ratio_test(
            &overlay_features.descriptors,
            &original_features.descriptors,
            cfg.ratio_threshold,
        );
        if good.len() < cfg.min_good_matches {
            return Err(AlignError::InsufficientMatches {
                needed: cfg.min_good_matches,
                found: good.len(),
            });
        }

        let pairs: Vec<Correspondence> = good
            .iter()
            .map(|&(q, t)| (overlay_features.points[q], original_features.points[t]))
            .collect();
        let fit = fit_homography_ransac(&pairs, &cfg.ransac).map_err(rejection)?;

        let area_ratio = check_homography(
            &fit.h,
            fit.n_inliers,
            overlay.class(),
            original.dimensions(),
            &cfg.checks,
        )?;

        let (w, h) = original.dimensions();
        let warped = warp_perspective(overlay.color(), &fit.h, w, h)
            .ok_or(AlignError::DegenerateHomography)?;

        tracing::trace!(
            "aligned: {} good matches, {} inliers, area ratio {:.3}",
            good.len(),
            fit.n_inliers,
            area_ratio
        );

        Ok(Alignment {
            warped,
            homography: fit.h,
            n_inliers: fit.n_inliers,
            area_ratio,
        })
    }
}
