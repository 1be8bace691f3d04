//! Error types.
//!
//! [`AlignError`] describes why a single overlay/original candidate pair was
//! rejected; the pairing engine consumes it and moves on to the next candidate.
//! [`PairError`] is what callers see: failures at the I/O boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Typed rejection of one overlay/original candidate pair.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignError {
    /// One of the two images yields no usable features.
    #[error("insufficient keypoints: overlay={overlay}, original={original}")]
    InsufficientKeypoints { overlay: usize, original: usize },

    /// Too few descriptor matches survive the ratio test.
    #[error("insufficient matches: need {needed}, found {found}")]
    InsufficientMatches { needed: usize, found: usize },

    /// Too few geometrically consistent matches after robust fitting.
    #[error("insufficient inliers: need more than {threshold}, found {found}")]
    InsufficientInliers { threshold: usize, found: usize },

    /// The original's corner quadrilateral maps to a non-convex polygon.
    #[error("projected page outline is not convex")]
    NonConvexProjection,

    /// Original area over projected area falls outside the accepted band.
    #[error("implausible area ratio {ratio:.3} (accepted {min:.4}..={max:.4})")]
    ImplausibleAreaRatio { ratio: f64, min: f64, max: f64 },

    /// Matches admit no finite, invertible homography.
    #[error("degenerate homography")]
    DegenerateHomography,
}

/// Caller-visible failure of an engine or job operation.
#[derive(Debug, Error)]
pub enum PairError {
    /// Raw input does not describe an RGBA8 image.
    #[error("malformed page: {0}")]
    MalformedPage(String),

    /// Output sink failed to persist a page.
    #[error("failed to persist page {sequence_index}: {source}")]
    Sink {
        sequence_index: u64,
        #[source]
        source: SinkError,
    },

    /// Configuration file could not be read or parsed.
    #[error("invalid configuration {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Input image could not be listed or decoded.
    #[error("input {path}: {message}")]
    Input { path: PathBuf, message: String },

    /// Page ordering pattern is not a valid regular expression.
    #[error("invalid ordering pattern: {0}")]
    Ordering(#[from] regex::Error),
}

/// Low-level cause of a sink failure.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, PairError>;
