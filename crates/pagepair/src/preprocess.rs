//! Page normalization: uniform-border cropping, spread splitting, downscaling.
//!
//! A raw page becomes one or two [`PageImages`]. Cropping peels uniform rows
//! and columns off the page edges; a double page is split in two when a
//! column near its middle is a single flat color (the gutter); finally each
//! page is downscaled towards a target pixel count.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::page::{PageImages, RawPage};

/// How far (pixels) from the exact middle the gutter search looks.
pub const GUTTER_SEARCH_OFFSET_PX: u32 = 10;

/// Order in which the halves of a split spread are appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingDirection {
    /// Right half first (manga order).
    #[default]
    RightToLeft,
    LeftToRight,
}

/// Per-stream normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Target pixel count for a single page; `0` disables downscaling.
    /// Doubled for pages classified as spreads.
    pub resize_target: u64,
    /// Split spreads at a uniform gutter column.
    pub split: bool,
    /// Crop uniform borders.
    pub crop: bool,
    pub reading_direction: ReadingDirection,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            resize_target: 2_000_000,
            split: true,
            crop: true,
            reading_direction: ReadingDirection::RightToLeft,
        }
    }
}

impl IngestOptions {
    /// Options that keep the page exactly as supplied.
    pub fn passthrough() -> Self {
        Self {
            resize_target: 0,
            split: false,
            crop: false,
            reading_direction: ReadingDirection::LeftToRight,
        }
    }
}

/// Turns raw host pixels into normalized pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor;

impl Preprocessor {
    /// Normalize one raw page into one page, or two for a split spread.
    ///
    /// Fails only on malformed input, before producing anything.
    pub fn normalize(&self, raw: RawPage<'_>, options: &IngestOptions) -> Result<Vec<PageImages>> {
        let color = raw.to_rgba()?;
        let mut page = PageImages::from_color(color);
        if options.crop {
            page = crop_uniform_borders(page);
        }

        if options.split && page.dimensions().0 >= 2 && page.is_double() && has_gutter(page.gray()) {
            let (left, right) = split_halves(&page);
            let (left, right) = if options.crop {
                (crop_uniform_borders(left), crop_uniform_borders(right))
            } else {
                (left, right)
            };
            let halves = match options.reading_direction {
                ReadingDirection::RightToLeft => [right, left],
                ReadingDirection::LeftToRight => [left, right],
            };
            tracing::debug!(
                "split spread {}x{} into two pages ({:?})",
                raw.width,
                raw.height,
                options.reading_direction
            );
            return Ok(halves
                .into_iter()
                .map(|p| downscale(p, options.resize_target))
                .collect());
        }

        Ok(vec![downscale(page, options.resize_target)])
    }
}

/// Axis-aligned region, half-open on the right and bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

fn row_is(gray: &GrayImage, y: u32, xs: std::ops::Range<u32>, value: u8) -> bool {
    xs.into_iter().all(|x| gray.get_pixel(x, y)[0] == value)
}

fn col_is(gray: &GrayImage, x: u32, ys: std::ops::Range<u32>, value: u8) -> bool {
    ys.into_iter().all(|y| gray.get_pixel(x, y)[0] == value)
}

/// Find the region left after peeling uniform border rows and columns.
///
/// Top row and left column are compared against the current top-left value,
/// bottom row and right column against the bottom-right value. One line is
/// peeled per step, top, bottom, left, right in that priority. Returns `None`
/// when nothing would remain.
pub(crate) fn uniform_border_region(gray: &GrayImage) -> Option<Region> {
    let (w, h) = gray.dimensions();
    let mut r = Region {
        x0: 0,
        y0: 0,
        x1: w,
        y1: h,
    };
    while !r.is_empty() {
        let top_left = gray.get_pixel(r.x0, r.y0)[0];
        let bottom_right = gray.get_pixel(r.x1 - 1, r.y1 - 1)[0];
        if row_is(gray, r.y0, r.x0..r.x1, top_left) {
            r.y0 += 1;
        } else if row_is(gray, r.y1 - 1, r.x0..r.x1, bottom_right) {
            r.y1 -= 1;
        } else if col_is(gray, r.x0, r.y0..r.y1, top_left) {
            r.x0 += 1;
        } else if col_is(gray, r.x1 - 1, r.y0..r.y1, bottom_right) {
            r.x1 -= 1;
        } else {
            return Some(r);
        }
    }
    None
}

fn crop_to(page: &PageImages, r: Region) -> PageImages {
    let (w, h) = (r.x1 - r.x0, r.y1 - r.y0);
    let color = imageops::crop_imm(page.color(), r.x0, r.y0, w, h).to_image();
    let gray = imageops::crop_imm(page.gray(), r.x0, r.y0, w, h).to_image();
    PageImages::from_parts(color, gray).unwrap_or_else(|| page.clone())
}

/// Crop uniform borders; a page that is uniform throughout is kept whole.
pub(crate) fn crop_uniform_borders(page: PageImages) -> PageImages {
    let (w, h) = page.dimensions();
    match uniform_border_region(page.gray()) {
        Some(r) if (r.x0, r.y0, r.x1, r.y1) != (0, 0, w, h) => crop_to(&page, r),
        _ => page,
    }
}

fn column_is_uniform(gray: &GrayImage, x: u32) -> bool {
    let (w, h) = gray.dimensions();
    if x >= w || h == 0 {
        return false;
    }
    let Luma([top]) = *gray.get_pixel(x, 0);
    col_is(gray, x, 0..h, top)
}

/// A flat column at the middle, or `GUTTER_SEARCH_OFFSET_PX` either side.
pub(crate) fn has_gutter(gray: &GrayImage) -> bool {
    let mid = gray.width() / 2;
    column_is_uniform(gray, mid)
        || column_is_uniform(gray, mid + GUTTER_SEARCH_OFFSET_PX)
        || mid
            .checked_sub(GUTTER_SEARCH_OFFSET_PX)
            .is_some_and(|x| column_is_uniform(gray, x))
}

/// Split into `[0, w/2)` and `[w/2, w)`.
pub(crate) fn split_halves(page: &PageImages) -> (PageImages, PageImages) {
    let (w, h) = page.dimensions();
    let mid = w / 2;
    let left = crop_to(
        page,
        Region {
            x0: 0,
            y0: 0,
            x1: mid,
            y1: h,
        },
    );
    let right = crop_to(
        page,
        Region {
            x0: mid,
            y0: 0,
            x1: w,
            y1: h,
        },
    );
    (left, right)
}

/// Dimensions for downscaling `width x height` towards `target` pixels.
///
/// Returns `None` when no resize is needed.
pub(crate) fn downscale_dimensions(width: u32, height: u32, target: u64, double: bool) -> Option<(u32, u32)> {
    let area = width as u64 * height as u64;
    if target == 0 || target >= area || height == 0 {
        return None;
    }
    let target = if double { target * 2 } else { target };
    let new_w = ((target as f64 * width as f64 / height as f64).sqrt() as u64).max(1);
    let new_h = (target / new_w).max(1);
    Some((new_w.min(u32::MAX as u64) as u32, new_h.min(u32::MAX as u64) as u32))
}

pub(crate) fn downscale(page: PageImages, target: u64) -> PageImages {
    let (w, h) = page.dimensions();
    let Some((nw, nh)) = downscale_dimensions(w, h, target, page.is_double()) else {
        return page;
    };
    let color = imageops::resize(page.color(), nw, nh, FilterType::Triangle);
    let gray = imageops::resize(page.gray(), nw, nh, FilterType::Triangle);
    PageImages::from_parts(color, gray).unwrap_or(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn framed_page(w: u32, h: u32, border: u32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        for y in border..h - border {
            for x in border..w - border {
                let v = ((x * 7 + y * 13) % 200) as u8;
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        img
    }

    fn spread_with_gutter(w: u32, h: u32) -> RgbaImage {
        let mut img = RgbaImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = if x < w / 2 { 40 } else { 180 };
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        img
    }

    #[test]
    fn crop_removes_uniform_frame() {
        let img = framed_page(60, 90, 5);
        let pages = Preprocessor
            .normalize(
                RawPage::from_image(&img),
                &IngestOptions {
                    crop: true,
                    ..IngestOptions::passthrough()
                },
            )
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].dimensions(), (50, 80));
    }

    #[test]
    fn uniform_page_is_not_cropped_away() {
        let img = RgbaImage::from_pixel(20, 30, Rgba([9, 9, 9, 255]));
        let page = crop_uniform_borders(PageImages::from_color(img));
        assert_eq!(page.dimensions(), (20, 30));
        assert!(uniform_border_region(page.gray()).is_none());
    }

    #[test]
    fn spread_with_gutter_is_split_in_reading_order() {
        let img = spread_with_gutter(240, 120);
        let rtl = Preprocessor
            .normalize(
                RawPage::from_image(&img),
                &IngestOptions {
                    split: true,
                    reading_direction: ReadingDirection::RightToLeft,
                    ..IngestOptions::passthrough()
                },
            )
            .unwrap();
        assert_eq!(rtl.len(), 2);
        assert_eq!(rtl[0].dimensions(), (120, 120));
        assert_eq!(rtl[0].gray().get_pixel(0, 0)[0], 180);
        assert_eq!(rtl[1].gray().get_pixel(0, 0)[0], 40);

        let ltr = Preprocessor
            .normalize(
                RawPage::from_image(&img),
                &IngestOptions {
                    split: true,
                    reading_direction: ReadingDirection::LeftToRight,
                    ..IngestOptions::passthrough()
                },
            )
            .unwrap();
        assert_eq!(ltr[0].gray().get_pixel(0, 0)[0], 40);
    }

    #[test]
    fn single_page_is_never_split() {
        let img = RgbaImage::from_pixel(80, 120, Rgba([1, 2, 3, 255]));
        let pages = Preprocessor
            .normalize(
                RawPage::from_image(&img),
                &IngestOptions {
                    split: true,
                    ..IngestOptions::passthrough()
                },
            )
            .unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn spread_without_gutter_stays_whole() {
        let mut img = RgbaImage::new(240, 120);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = ((x * 31 + y * 17) % 251) as u8;
            *px = Rgba([v, v, v, 255]);
        }
        assert!(!has_gutter(&image::DynamicImage::ImageRgba8(img.clone()).to_luma8()));
        let pages = Preprocessor
            .normalize(
                RawPage::from_image(&img),
                &IngestOptions {
                    split: true,
                    ..IngestOptions::passthrough()
                },
            )
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].dimensions(), (240, 120));
    }

    #[test]
    fn downscale_targets_pixel_count() {
        assert_eq!(downscale_dimensions(800, 1200, 0, false), None);
        assert_eq!(downscale_dimensions(800, 1200, 2_000_000, false), None);
        let (w, h) = downscale_dimensions(800, 1200, 240_000, false).unwrap();
        assert_eq!((w, h), (400, 600));
        let (w, h) = downscale_dimensions(2400, 1200, 240_000, true).unwrap();
        assert_eq!((w, h), (979, 490));
    }

    #[test]
    fn downscale_resizes_both_renditions() {
        let img = framed_page(80, 120, 0);
        let page = downscale(PageImages::from_color(img), 2400);
        assert_eq!(page.dimensions(), (40, 60));
        assert_eq!(page.gray().dimensions(), (40, 60));
    }

    #[test]
    fn malformed_input_produces_nothing() {
        let pixels = vec![0u8; 7];
        assert!(Preprocessor
            .normalize(RawPage::new(&pixels, 3, 3), &IngestOptions::default())
            .is_err());
    }
}
