//! Shared test utilities: synthetic pages, a scripted oracle, and a failing
//! sink.

use std::cell::Cell;

use image::{GrayImage, Luma, Rgba, RgbaImage};
use nalgebra::Matrix3;
use rand::{Rng, SeedableRng};

use crate::buffer::Stream;
use crate::error::{AlignError, SinkError};
use crate::oracle::{Alignment, AlignmentOracle};
use crate::page::PageImages;
use crate::sink::{MemorySink, PageSink};

const TEXTURE_BLOCK_PX: u32 = 6;

/// Seeded random blocky texture; rich in corners.
pub(crate) fn textured_gray(w: u32, h: u32, seed: u64) -> GrayImage {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let bw = w.div_ceil(TEXTURE_BLOCK_PX);
    let bh = h.div_ceil(TEXTURE_BLOCK_PX);
    let blocks: Vec<u8> = (0..bw * bh).map(|_| rng.gen()).collect();
    GrayImage::from_fn(w, h, |x, y| {
        Luma([blocks[((y / TEXTURE_BLOCK_PX) * bw + x / TEXTURE_BLOCK_PX) as usize]])
    })
}

pub(crate) fn textured_page(w: u32, h: u32, seed: u64) -> PageImages {
    let gray = textured_gray(w, h, seed);
    let color = RgbaImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgba([v, v, v, 255])
    });
    PageImages::from_color(color)
}

/// Uniform page carrying `tag` in red and `shade` in green.
pub(crate) fn tagged_rgba(w: u32, h: u32, tag: u8, shade: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([tag, shade, 0, 255]))
}

/// Uniform page matching originals tagged `first` or `second`.
pub(crate) fn two_tag_rgba(w: u32, h: u32, first: u8, second: u8, shade: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([first, shade, second, 255]))
}

/// Two flat halves tagged `left` and `right`; the middle column is uniform.
pub(crate) fn spread_rgba(w: u32, h: u32, left: u8, right: u8, shade: u8) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, _| {
        let tag = if x < w / 2 { left } else { right };
        Rgba([tag, shade, 0, 255])
    })
}

/// Oracle matching on tags painted by the helpers above.
///
/// An overlay matches an original when its red or (non-zero) blue channel
/// equals the original's red channel. The warp is flat, original-sized, and
/// carries the overlay's green shade.
#[derive(Debug, Default)]
pub(crate) struct ScriptedOracle {
    calls: Cell<usize>,
}

impl ScriptedOracle {
    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl AlignmentOracle for ScriptedOracle {
    fn align(
        &self,
        overlay: &PageImages,
        original: &PageImages,
        _feature_budget: usize,
    ) -> Result<Alignment, AlignError> {
        self.calls.set(self.calls.get() + 1);
        let Rgba([first, shade, second, _]) = *overlay.color().get_pixel(0, 0);
        let target = original.color().get_pixel(0, 0)[0];
        if target != first && (second == 0 || target != second) {
            return Err(AlignError::InsufficientMatches { needed: 5, found: 0 });
        }
        let (w, h) = original.dimensions();
        Ok(Alignment {
            warped: RgbaImage::from_pixel(w, h, Rgba([0, shade, 0, 255])),
            homography: Matrix3::identity(),
            n_inliers: 100,
            area_ratio: 1.0,
        })
    }
}

/// Memory sink that rejects writes to one stream, or to one index of it.
#[derive(Debug, Default)]
pub(crate) struct FailingSink {
    inner: MemorySink,
    failing: Option<(Stream, Option<u64>)>,
}

impl FailingSink {
    pub(crate) fn overlays() -> Self {
        Self {
            inner: MemorySink::new(),
            failing: Some((Stream::Overlay, None)),
        }
    }

    /// Reject only `sequence_index` of `stream`.
    pub(crate) fn at(stream: Stream, sequence_index: u64) -> Self {
        Self {
            inner: MemorySink::new(),
            failing: Some((stream, Some(sequence_index))),
        }
    }

    pub(crate) fn inner(&self) -> &MemorySink {
        &self.inner
    }
}

impl PageSink for FailingSink {
    fn persist(&mut self, stream: Stream, sequence_index: u64, image: &RgbaImage) -> Result<(), SinkError> {
        let refused = match self.failing {
            Some((s, None)) => s == stream,
            Some((s, Some(i))) => s == stream && i == sequence_index,
            None => false,
        };
        if refused {
            return Err(SinkError::Rejected(format!(
                "{} page {} refused",
                stream.label(),
                sequence_index
            )));
        }
        self.inner.persist(stream, sequence_index, image)
    }
}
