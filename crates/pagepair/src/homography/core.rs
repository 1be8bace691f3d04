//! Overlay → original homography from matched keypoints.
//!
//! Each correspondence pairs an overlay keypoint with the original keypoint
//! it was matched to. Minimal samples are solved with a conditioned DLT;
//! RANSAC keeps the model with the widest support and refits on it.

use nalgebra::{Matrix3, SMatrix, SVector, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Correspondences needed to determine a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// `(overlay point, original point)` of one descriptor match.
pub type Correspondence = ([f64; 2], [f64; 2]);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HomographyError {
    #[error("too few correspondences: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    /// No sample produced a usable model (collinear or repeated points).
    #[error("degenerate correspondences")]
    Degenerate,
}

/// Project a 2D point through a 3×3 homography: H * [x, y, 1]^T → [u, v].
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> [f64; 2] {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [p[0] / p[2], p[1] / p[2]]
}

/// Squared distance between the projection of `from` and `to`.
fn residual_sq(h: &Matrix3<f64>, (from, to): &Correspondence) -> f64 {
    let [u, v] = project(h, from[0], from[1]);
    (u - to[0]).powi(2) + (v - to[1]).powi(2)
}

/// Similarity moving a point set's centroid to the origin with mean
/// distance √2.
fn conditioner<'a>(points: impl Iterator<Item = &'a [f64; 2]> + Clone) -> Matrix3<f64> {
    let (mut n, mut cx, mut cy) = (0.0, 0.0, 0.0);
    for p in points.clone() {
        n += 1.0;
        cx += p[0];
        cy += p[1];
    }
    cx /= n;
    cy /= n;
    let spread = points.map(|p| (p[0] - cx).hypot(p[1] - cy)).sum::<f64>() / n;
    let s = if spread > 1e-15 {
        std::f64::consts::SQRT_2 / spread
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Least-squares DLT over `pairs`, solved on conditioned coordinates.
fn solve_dlt(pairs: &[Correspondence]) -> Option<Matrix3<f64>> {
    if pairs.len() < MIN_CORRESPONDENCES {
        return None;
    }
    let t_from = conditioner(pairs.iter().map(|(f, _)| f));
    let t_to = conditioner(pairs.iter().map(|(_, t)| t));

    // Accumulate AᵀA row pair by row pair instead of building A.
    let mut normal = SMatrix::<f64, 9, 9>::zeros();
    for (from, to) in pairs {
        let [x, y] = project(&t_from, from[0], from[1]);
        let [u, v] = project(&t_to, to[0], to[1]);
        let rows = [
            SVector::<f64, 9>::from_column_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]),
            SVector::<f64, 9>::from_column_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u]),
        ];
        for r in &rows {
            normal += r * r.transpose();
        }
    }

    let eig = SymmetricEigen::new(normal);
    let k = eig.eigenvalues.iamin();
    let null = eig.eigenvectors.column(k);
    let conditioned = Matrix3::from_fn(|r, c| null[3 * r + c]);
    let h = t_to.try_inverse()? * conditioned * t_from;

    let w = h[(2, 2)];
    if !w.is_finite() || w.abs() < 1e-15 {
        return None;
    }
    let h = h / w;
    h.iter().all(|v| v.is_finite()).then_some(h)
}

/// RANSAC settings for [`fit_homography_ransac`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Inlier distance in original-page pixels.
    pub inlier_threshold: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 3.0,
            seed: 0,
        }
    }
}

/// Accepted model and the number of correspondences supporting it.
#[derive(Debug, Clone, Copy)]
pub struct HomographyFit {
    pub h: Matrix3<f64>,
    pub n_inliers: usize,
}

/// Robustly fit overlay → original over `pairs`, refitting on the inliers of
/// the best sample.
pub fn fit_homography_ransac(
    pairs: &[Correspondence],
    config: &RansacConfig,
) -> Result<HomographyFit, HomographyError> {
    let n = pairs.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n,
        });
    }
    let threshold_sq = config.inlier_threshold * config.inlier_threshold;
    let support = |h: &Matrix3<f64>| pairs.iter().filter(|p| residual_sq(h, p) < threshold_sq).count();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<HomographyFit> = None;
    for _ in 0..config.max_iters {
        let sample: Vec<Correspondence> = rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES)
            .iter()
            .map(|i| pairs[i])
            .collect();
        let Some(h) = solve_dlt(&sample) else {
            continue;
        };
        let n_inliers = support(&h);
        if best.map_or(true, |b| n_inliers > b.n_inliers) {
            best = Some(HomographyFit { h, n_inliers });
            if n_inliers * 10 > n * 9 {
                break;
            }
        }
    }
    let best = best.ok_or(HomographyError::Degenerate)?;

    let inliers: Vec<Correspondence> = pairs
        .iter()
        .filter(|p| residual_sq(&best.h, p) < threshold_sq)
        .copied()
        .collect();
    let refit = solve_dlt(&inliers)
        .map(|h| HomographyFit {
            h,
            n_inliers: support(&h),
        })
        .filter(|r| r.n_inliers >= best.n_inliers);
    Ok(refit.unwrap_or(best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn scan_skew() -> Matrix3<f64> {
        // Mild scale, shear and perspective between two scans of a page
        #[rustfmt::skip]
        let h = Matrix3::new(
            1.05, 0.02, 12.0,
            -0.01, 0.98, -7.0,
            0.00002, -0.00001, 1.0,
        );
        h
    }

    #[test]
    fn four_page_corners_determine_the_transform() {
        let h_true = scan_skew();
        let pairs: Vec<Correspondence> = [[0.0, 0.0], [800.0, 0.0], [800.0, 1200.0], [0.0, 1200.0]]
            .iter()
            .map(|&p| (p, project(&h_true, p[0], p[1])))
            .collect();

        let h = solve_dlt(&pairs).unwrap();
        for p in &pairs {
            assert!(residual_sq(&h, p) < 1e-8);
        }
        assert_relative_eq!(h, h_true, epsilon = 1e-6);
    }

    #[test]
    fn stray_matches_are_outvoted() {
        let h_true = scan_skew();
        let mut rng = StdRng::seed_from_u64(42);

        let mut pairs = Vec::new();
        for i in 0..30 {
            let p = [(i % 6) as f64 * 120.0 + 40.0, (i / 6) as f64 * 200.0 + 60.0];
            let q = project(&h_true, p[0], p[1]);
            pairs.push((p, [q[0] + rng.gen_range(-0.5..0.5), q[1] + rng.gen_range(-0.5..0.5)]));
        }
        for _ in 0..10 {
            pairs.push((
                [rng.gen_range(0.0..800.0), rng.gen_range(0.0..1200.0)],
                [rng.gen_range(0.0..800.0), rng.gen_range(0.0..1200.0)],
            ));
        }

        let fit = fit_homography_ransac(&pairs, &RansacConfig::default()).unwrap();
        assert!(fit.n_inliers >= 28, "only {} inliers", fit.n_inliers);
        let q = project(&fit.h, 400.0, 600.0);
        let expected = project(&h_true, 400.0, 600.0);
        assert!((q[0] - expected[0]).abs() < 1.0 && (q[1] - expected[1]).abs() < 1.0);
    }

    #[test]
    fn project_roundtrip() {
        let h = scan_skew();
        let h_inv = h.try_inverse().unwrap();
        let q = project(&h, 50.0, 75.0);
        let p = project(&h_inv, q[0], q[1]);
        assert_relative_eq!(p[0], 50.0, epsilon = 1e-8);
        assert_relative_eq!(p[1], 75.0, epsilon = 1e-8);
    }

    #[test]
    fn too_few_matches() {
        let three = [([0.0, 0.0], [0.0, 0.0]), ([1.0, 0.0], [1.0, 0.0]), ([1.0, 1.0], [1.0, 1.0])];
        assert_eq!(
            fit_homography_ransac(&three, &RansacConfig::default()).unwrap_err(),
            HomographyError::TooFewPoints { needed: 4, got: 3 }
        );
    }
}
