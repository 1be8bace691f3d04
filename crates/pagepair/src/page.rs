//! Page records and single/double page classification.

use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{PairError, Result};

/// Width/height ratio of a single portrait page.
pub const SINGLE_PAGE_RATIO: f64 = 2.0 / 3.0;
/// Accepted deviation from [`SINGLE_PAGE_RATIO`] for a single page.
pub const SINGLE_PAGE_RATIO_TOLERANCE: f64 = 0.1;

/// Single page or two-page spread, decided by aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageClass {
    Single,
    Double,
}

impl PageClass {
    /// Classify a `width x height` page.
    ///
    /// Ratios within `2/3 ± 0.1` are single pages; everything else,
    /// including degenerate zero-height input, is treated as a spread. Tall
    /// pages narrower than `0.567` therefore count as spreads too.
    pub fn of_dimensions(width: u32, height: u32) -> Self {
        if height == 0 {
            return Self::Double;
        }
        let ratio = width as f64 / height as f64;
        let lo = SINGLE_PAGE_RATIO - SINGLE_PAGE_RATIO_TOLERANCE;
        let hi = SINGLE_PAGE_RATIO + SINGLE_PAGE_RATIO_TOLERANCE;
        if (lo..=hi).contains(&ratio) {
            Self::Single
        } else {
            Self::Double
        }
    }

    pub fn is_double(self) -> bool {
        matches!(self, Self::Double)
    }
}

/// Returns `true` when `image` is classified as a two-page spread.
pub fn is_double_page<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> bool {
    let (w, h) = image.dimensions();
    PageClass::of_dimensions(w, h).is_double()
}

/// Color and grayscale renditions of the same page region.
///
/// Both images always share dimensions; constructors uphold this.
#[derive(Debug, Clone)]
pub struct PageImages {
    color: RgbaImage,
    gray: GrayImage,
}

impl PageImages {
    /// Build from a color image, deriving the grayscale rendition.
    pub fn from_color(color: RgbaImage) -> Self {
        let gray = image::DynamicImage::ImageRgba8(color.clone()).to_luma8();
        Self { color, gray }
    }

    /// Pair an existing color/grayscale rendition.
    ///
    /// Returns `None` when the dimensions disagree.
    pub fn from_parts(color: RgbaImage, gray: GrayImage) -> Option<Self> {
        (color.dimensions() == gray.dimensions()).then_some(Self { color, gray })
    }

    pub fn color(&self) -> &RgbaImage {
        &self.color
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }

    pub fn class(&self) -> PageClass {
        let (w, h) = self.dimensions();
        PageClass::of_dimensions(w, h)
    }

    pub fn is_double(&self) -> bool {
        self.class().is_double()
    }

    pub fn into_color(self) -> RgbaImage {
        self.color
    }
}

/// One normalized page resident in a stream buffer.
#[derive(Debug, Clone)]
pub struct PageRecord {
    sequence_index: u64,
    images: PageImages,
    previously_aligned: bool,
}

impl PageRecord {
    pub(crate) fn new(sequence_index: u64, images: PageImages) -> Self {
        Self {
            sequence_index,
            images,
            previously_aligned: false,
        }
    }

    pub fn sequence_index(&self) -> u64 {
        self.sequence_index
    }

    pub fn images(&self) -> &PageImages {
        &self.images
    }

    /// `true` once a committed match involved this record.
    pub fn previously_aligned(&self) -> bool {
        self.previously_aligned
    }

    /// Latch the aligned flag. There is no way to clear it.
    pub(crate) fn mark_aligned(&mut self) {
        self.previously_aligned = true;
    }

    pub fn summary(&self) -> PageSummary {
        let (width, height) = self.images.dimensions();
        PageSummary {
            sequence_index: self.sequence_index,
            previously_aligned: self.previously_aligned,
            width,
            height,
            class: self.images.class(),
        }
    }
}

/// Serializable description of a resident page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub sequence_index: u64,
    pub previously_aligned: bool,
    pub width: u32,
    pub height: u32,
    pub class: PageClass,
}

/// Borrowed raw RGBA8 pixels as handed over by the host.
#[derive(Debug, Clone, Copy)]
pub struct RawPage<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> RawPage<'a> {
    pub fn new(pixels: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn from_image(image: &'a RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.as_raw(), width, height)
    }

    /// Validate and copy into an owned image.
    pub fn to_rgba(&self) -> Result<RgbaImage> {
        if self.width == 0 || self.height == 0 {
            return Err(PairError::MalformedPage(format!(
                "empty page {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(PairError::MalformedPage(format!(
                "{}x{} RGBA page needs {} bytes, got {}",
                self.width,
                self.height,
                expected,
                self.pixels.len()
            )));
        }
        RgbaImage::from_raw(self.width, self.height, self.pixels.to_vec()).ok_or_else(|| {
            PairError::MalformedPage("pixel buffer rejected by image container".into())
        })
    }
}
