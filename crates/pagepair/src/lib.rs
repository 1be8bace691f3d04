//! pagepair — online pairing of overlay pages onto original pages.
//!
//! Two ordered page streams arrive incrementally: originals and overlays
//! (translations, annotations). Each overlay page is warped onto the original
//! page it depicts, even when the streams do not correspond one to one. The
//! stages are:
//!
//! 1. **Preprocess** – crop uniform borders, split spreads at the gutter,
//!    downscale towards a target pixel count.
//! 2. **Oracle** – FAST + BRIEF features, ratio-test matching, RANSAC
//!    homography, convexity and area-ratio gates, perspective warp.
//! 3. **Engine** – bounded window search over buffered originals, saturating
//!    composition of several overlays on one original, backtrack fills for
//!    skipped originals, spread/half reconciliation, buffer pruning.
//! 4. **Sink** – persist every emitted page (directory or memory).
//!
//! # Public API
//! - [`PairingEngine`] with [`PairingConfig`] as the primary entry point
//! - [`PairingJob`] for directory-to-directory batch runs
//! - [`AlignmentOracle`], [`PageSink`] and [`PairingObserver`] seams with
//!   default implementations

mod buffer;
mod composite;
mod engine;
mod error;
mod job;
mod observer;
mod ordering;
mod page;
mod preprocess;
mod sink;

pub mod homography;
pub mod oracle;

pub use buffer::{Stream, StreamBuffer};
pub use composite::{saturating_add, CompositeState};
pub use engine::{
    EngineSnapshot, PairingConfig, PairingEngine, DEFAULT_FEATURE_BUDGET, DEFAULT_SEARCH_RANGE,
};
pub use error::{AlignError, PairError, Result, SinkError};
pub use job::{list_images, JobOrder, JobReport, PairingJob, StepReport, IMAGE_EXTENSIONS};
pub use observer::{EventLog, PairingEvent, PairingObserver, TracingObserver};
pub use oracle::{AlignerConfig, Alignment, AlignmentOracle, FeatureAligner};
pub use ordering::{NameOrder, OrderSpec, NUMBERED_PATTERN};
pub use page::{
    is_double_page, PageClass, PageImages, PageRecord, PageSummary, RawPage, SINGLE_PAGE_RATIO,
    SINGLE_PAGE_RATIO_TOLERANCE,
};
pub use preprocess::{IngestOptions, Preprocessor, ReadingDirection, GUTTER_SEARCH_OFFSET_PX};
pub use sink::{
    output_stem, DirectorySink, MemorySink, PageSink, ORIGINAL_DIR, OUTPUT_INDEX_BASE, OVERLAY_DIR,
};

#[cfg(test)]
pub(crate) mod test_utils;
