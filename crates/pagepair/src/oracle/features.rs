//! Keypoints and binary descriptors for page matching.
//!
//! FAST-9 corners are ranked by score and capped at the feature budget.
//! Each surviving corner gets a 256-bit BRIEF descriptor sampled from a
//! Gaussian-smoothed copy of the page with a fixed, seeded test pattern, so
//! descriptors from different pages are comparable.

use image::{GrayImage, ImageBuffer, Luma};
use rand::{Rng, SeedableRng};

/// 256-bit binary descriptor.
pub type Descriptor = [u64; 4];

const DESCRIPTOR_BITS: usize = 256;

/// Fixed set of BRIEF intensity comparisons around a keypoint.
#[derive(Debug, Clone)]
pub struct BriefPattern {
    radius: i32,
    pairs: Vec<([i32; 2], [i32; 2])>,
}

impl BriefPattern {
    /// Draw `DESCRIPTOR_BITS` point pairs uniformly inside a square patch.
    pub fn new(radius: u32, seed: u64) -> Self {
        let radius = radius.max(1) as i32;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut pairs = Vec::with_capacity(DESCRIPTOR_BITS);
        while pairs.len() < DESCRIPTOR_BITS {
            let a = [rng.gen_range(-radius..=radius), rng.gen_range(-radius..=radius)];
            let b = [rng.gen_range(-radius..=radius), rng.gen_range(-radius..=radius)];
            if a != b {
                pairs.push((a, b));
            }
        }
        Self { radius, pairs }
    }

    pub fn radius(&self) -> u32 {
        self.radius as u32
    }
}

/// Keypoint positions with their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub points: Vec<[f64; 2]>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn smooth(gray: &GrayImage, sigma: f32) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let (w, h) = gray.dimensions();
    let mut f = ImageBuffer::<Luma<f32>, Vec<f32>>::new(w, h);
    for (x, y, px) in gray.enumerate_pixels() {
        f.put_pixel(x, y, Luma([px[0] as f32]));
    }
    if sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(&f, sigma)
    } else {
        f
    }
}

/// Detect up to `budget` corners and describe them.
pub fn detect_and_describe(
    gray: &GrayImage,
    budget: usize,
    fast_threshold: u8,
    blur_sigma: f32,
    pattern: &BriefPattern,
) -> FeatureSet {
    let (w, h) = gray.dimensions();
    let r = pattern.radius();
    if budget == 0 || w <= 2 * r || h <= 2 * r {
        return FeatureSet::default();
    }

    let mut corners: Vec<_> = imageproc::corners::corners_fast9(gray, fast_threshold)
        .into_iter()
        .filter(|c| c.x >= r && c.y >= r && c.x < w - r && c.y < h - r)
        .collect();
    corners.sort_by(|a, b| b.score.total_cmp(&a.score));
    corners.truncate(budget);
    if corners.is_empty() {
        return FeatureSet::default();
    }

    let smoothed = smooth(gray, blur_sigma);
    let mut out = FeatureSet {
        points: Vec::with_capacity(corners.len()),
        descriptors: Vec::with_capacity(corners.len()),
    };
    for c in &corners {
        let (cx, cy) = (c.x as i32, c.y as i32);
        let sample = |o: [i32; 2]| smoothed.get_pixel((cx + o[0]) as u32, (cy + o[1]) as u32)[0];
        let mut d: Descriptor = [0; 4];
        for (bit, &(a, b)) in pattern.pairs.iter().enumerate() {
            if sample(a) < sample(b) {
                d[bit / 64] |= 1u64 << (bit % 64);
            }
        }
        out.points.push([c.x as f64, c.y as f64]);
        out.descriptors.push(d);
    }
    out
}

pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Brute-force 2-NN matching with Lowe's ratio test.
///
/// Returns `(query_idx, train_idx)` pairs whose best distance is below
/// `ratio` times the second-best distance.
pub fn match_ratio_test(query: &[Descriptor], train: &[Descriptor], ratio: f32) -> Vec<(usize, usize)> {
    if train.len() < 2 {
        return Vec::new();
    }
    let mut matches = Vec::new();
    for (qi, q) in query.iter().enumerate() {
        let mut best = (u32::MAX, 0usize);
        let mut second = u32::MAX;
        for (ti, t) in train.iter().enumerate() {
            let d = hamming(q, t);
            if d < best.0 {
                second = best.0;
                best = (d, ti);
            } else if d < second {
                second = d;
            }
        }
        if (best.0 as f32) < ratio * second as f32 {
            matches.push((qi, best.1));
        }
    }
    matches
}
