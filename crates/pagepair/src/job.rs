//! Directory-to-directory batch pairing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::buffer::Stream;
use crate::engine::{EngineSnapshot, PairingConfig, PairingEngine};
use crate::error::{PairError, Result};
use crate::oracle::AlignmentOracle;
use crate::ordering::OrderSpec;
use crate::page::RawPage;
use crate::sink::{DirectorySink, PageSink};

/// File extensions picked up from input directories.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// Ordering of each input directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOrder {
    pub originals: OrderSpec,
    pub overlays: OrderSpec,
}

/// Pair every image of `overlays_dir` onto the images of `originals_dir`.
#[derive(Debug, Clone)]
pub struct PairingJob {
    pub originals_dir: PathBuf,
    pub overlays_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config: PairingConfig,
    pub order: JobOrder,
}

/// One ingested input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub input: String,
    pub stream: Stream,
    /// Normalized pages the file produced.
    pub pages_added: usize,
    /// Sequence indices assigned to those pages.
    pub sequence_indices: Vec<u64>,
    /// Output pages written by pairing (overlays only).
    pub pages_written: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub output_dir: PathBuf,
    pub original_pages: usize,
    pub overlay_pages: usize,
    /// Sum of the engine's counts over ingestion and the final retry. A first
    /// spread half written before its window ran out is not included.
    pub pages_written: usize,
    /// Part of `pages_written` produced by the final retry.
    pub retry_written: usize,
    pub steps: Vec<StepReport>,
    pub final_state: EngineSnapshot,
}

impl JobReport {
    /// Overlays still buffered after the job; never paired.
    pub fn unresolved_overlays(&self) -> usize {
        self.final_state.overlays.len()
    }
}

impl PairingJob {
    /// Run with the feature-based oracle, writing into `output_dir`.
    pub fn run(&self) -> Result<JobReport> {
        let sink = DirectorySink::create(&self.output_dir).map_err(|e| PairError::Input {
            path: self.output_dir.clone(),
            message: e.to_string(),
        })?;
        let mut engine = PairingEngine::from_config(&self.config, sink);
        self.run_with(&mut engine)
    }

    /// Run against a caller-supplied engine.
    pub fn run_with<O: AlignmentOracle, S: PageSink>(
        &self,
        engine: &mut PairingEngine<O, S>,
    ) -> Result<JobReport> {
        let originals = list_images(&self.originals_dir, &self.order.originals)?;
        let overlays = list_images(&self.overlays_dir, &self.order.overlays)?;
        tracing::info!(
            "pairing {} overlay file(s) onto {} original file(s)",
            overlays.len(),
            originals.len()
        );

        engine.reset();
        let budget = self.config.feature_budget;
        let mut steps = Vec::with_capacity(originals.len() + overlays.len());
        let mut original_pages = 0;
        let mut overlay_pages = 0;
        let mut pages_written = 0;

        for (i, path) in originals.iter().enumerate() {
            let image = decode(path)?;
            let first = engine.originals().next_index();
            let added = engine.add_original(RawPage::from_image(&image), &self.config.original)?;
            original_pages += added;
            tracing::info!(
                "[original {}/{}] {}: {} page(s)",
                i + 1,
                originals.len(),
                path.display(),
                added
            );
            steps.push(StepReport {
                input: display_name(path),
                stream: Stream::Original,
                pages_added: added,
                sequence_indices: (first..engine.originals().next_index()).collect(),
                pages_written: 0,
            });
        }

        for (i, path) in overlays.iter().enumerate() {
            let image = decode(path)?;
            let first = engine.overlays().next_index();
            let written =
                engine.add_overlay(RawPage::from_image(&image), &self.config.overlay, budget)?;
            let last = engine.overlays().next_index();
            overlay_pages += (last - first) as usize;
            pages_written += written;
            tracing::info!(
                "[overlay {}/{}] {}: {} page(s) written",
                i + 1,
                overlays.len(),
                path.display(),
                written
            );
            steps.push(StepReport {
                input: display_name(path),
                stream: Stream::Overlay,
                pages_added: (last - first) as usize,
                sequence_indices: (first..last).collect(),
                pages_written: written,
            });
        }

        let retry_written = engine.retry_pending(budget)?;
        pages_written += retry_written;

        let report = JobReport {
            output_dir: self.output_dir.clone(),
            original_pages,
            overlay_pages,
            pages_written,
            retry_written,
            steps,
            final_state: engine.snapshot(),
        };
        tracing::info!(
            "done: {} page(s) written, {} overlay page(s) unresolved",
            report.pages_written,
            report.unresolved_overlays()
        );
        Ok(report)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Image files directly inside `dir`, ordered by `order`.
pub fn list_images(dir: &Path, order: &OrderSpec) -> Result<Vec<PathBuf>> {
    let input_err = |e: std::io::Error| PairError::Input {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(input_err)? {
        let path = entry.map_err(input_err)?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    order.compile()?.sort_paths(&mut paths);
    Ok(paths)
}

fn decode(path: &Path) -> Result<image::RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| PairError::Input {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
