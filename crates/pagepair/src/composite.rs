//! The most recent composed output and the transform that produced it.

use image::RgbaImage;
use nalgebra::Matrix3;

/// Per-channel saturating sum of two equally sized images.
///
/// Returns `None` on a dimension mismatch.
pub fn saturating_add(a: &RgbaImage, b: &RgbaImage) -> Option<RgbaImage> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let (w, h) = a.dimensions();
    let data = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| x.saturating_add(y))
        .collect();
    RgbaImage::from_raw(w, h, data)
}

/// Last composited page plus the transform behind it.
///
/// The homography is kept for diagnostics only.
#[derive(Debug, Clone, Default)]
pub struct CompositeState {
    image: Option<RgbaImage>,
    homography: Option<Matrix3<f64>>,
}

/// Outcome of combining a new warp with the current composite.
#[derive(Debug, Clone)]
pub(crate) struct Composed {
    pub image: RgbaImage,
    pub accumulated: bool,
}

impl CompositeState {
    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    pub fn homography(&self) -> Option<&Matrix3<f64>> {
        self.homography.as_ref()
    }

    /// Build the next composite without committing it.
    ///
    /// With `accumulate`, `warp` is added onto the current composite;
    /// otherwise (or when there is nothing compatible to add onto) the warp
    /// stands alone.
    pub(crate) fn compose(&self, warp: &RgbaImage, accumulate: bool) -> Composed {
        if accumulate {
            match self.image.as_ref().map(|prev| saturating_add(prev, warp)) {
                Some(Some(image)) => {
                    return Composed {
                        image,
                        accumulated: true,
                    }
                }
                Some(None) => {
                    tracing::warn!("composite dimensions differ from new warp; replacing composite")
                }
                None => tracing::warn!("no composite to accumulate onto; starting a new one"),
            }
        }
        Composed {
            image: warp.clone(),
            accumulated: false,
        }
    }

    pub(crate) fn commit(&mut self, image: RgbaImage, homography: Matrix3<f64>) {
        self.image = Some(image);
        self.homography = Some(homography);
    }

    pub(crate) fn clear(&mut self) {
        self.image = None;
        self.homography = None;
    }
}
