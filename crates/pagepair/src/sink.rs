//! Output sinks for emitted pages.
//!
//! Every emission is keyed by stream and sequence index; a later emission for
//! the same key replaces the earlier one (composition rewrites a page).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::buffer::Stream;
use crate::error::SinkError;

/// File stem of the page with sequence index 0.
pub const OUTPUT_INDEX_BASE: u64 = 1_000_001;

/// Subdirectory receiving original pages.
pub const ORIGINAL_DIR: &str = "out_orig";
/// Subdirectory receiving paired overlay pages.
pub const OVERLAY_DIR: &str = "out_transl";

/// Destination for emitted pages.
pub trait PageSink {
    fn persist(&mut self, stream: Stream, sequence_index: u64, image: &RgbaImage) -> Result<(), SinkError>;
}

impl<S: PageSink + ?Sized> PageSink for &mut S {
    fn persist(&mut self, stream: Stream, sequence_index: u64, image: &RgbaImage) -> Result<(), SinkError> {
        (**self).persist(stream, sequence_index, image)
    }
}

impl<S: PageSink + ?Sized> PageSink for Box<S> {
    fn persist(&mut self, stream: Stream, sequence_index: u64, image: &RgbaImage) -> Result<(), SinkError> {
        (**self).persist(stream, sequence_index, image)
    }
}

/// File stem for a sequence index.
pub fn output_stem(sequence_index: u64) -> u64 {
    OUTPUT_INDEX_BASE + sequence_index
}

/// Writes `<root>/<stream dir>/<stem>.png` plus a `<stem>.txt` sidecar
/// holding `width:height`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Create the sink and both stream directories.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let root = root.into();
        fs::create_dir_all(root.join(ORIGINAL_DIR))?;
        fs::create_dir_all(root.join(OVERLAY_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stream_dir(&self, stream: Stream) -> PathBuf {
        match stream {
            Stream::Original => self.root.join(ORIGINAL_DIR),
            Stream::Overlay => self.root.join(OVERLAY_DIR),
        }
    }

    pub fn page_path(&self, stream: Stream, sequence_index: u64) -> PathBuf {
        self.stream_dir(stream)
            .join(format!("{}.png", output_stem(sequence_index)))
    }
}

impl PageSink for DirectorySink {
    fn persist(&mut self, stream: Stream, sequence_index: u64, image: &RgbaImage) -> Result<(), SinkError> {
        let png = self.page_path(stream, sequence_index);
        image.save_with_format(&png, image::ImageFormat::Png)?;
        let (w, h) = image.dimensions();
        fs::write(png.with_extension("txt"), format!("{}:{}\n", w, h))?;
        tracing::trace!("wrote {}", png.display());
        Ok(())
    }
}

/// Keeps emitted pages in memory, along with the write order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pages: BTreeMap<(Stream, u64), RgbaImage>,
    writes: Vec<(Stream, u64)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest image written for a key.
    pub fn page(&self, stream: Stream, sequence_index: u64) -> Option<&RgbaImage> {
        self.pages.get(&(stream, sequence_index))
    }

    /// Every write in order, including overwrites.
    pub fn writes(&self) -> &[(Stream, u64)] {
        &self.writes
    }

    /// Sequence indices currently holding a page for `stream`.
    pub fn indices(&self, stream: Stream) -> Vec<u64> {
        self.pages
            .keys()
            .filter(|(s, _)| *s == stream)
            .map(|&(_, i)| i)
            .collect()
    }
}

impl PageSink for MemorySink {
    fn persist(&mut self, stream: Stream, sequence_index: u64, image: &RgbaImage) -> Result<(), SinkError> {
        self.pages.insert((stream, sequence_index), image.clone());
        self.writes.push((stream, sequence_index));
        Ok(())
    }
}
