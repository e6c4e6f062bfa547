//! Downsample factor calculation.

/// Default ceiling on decoded pixels when full materialization is intended.
pub const DEFAULT_MAX_PIXELS: u64 = 8 * 1024 * 1024;

/// Default ceiling on either decoded side (typical maximum texture size).
pub const DEFAULT_MAX_SIDE: u32 = 4096;

/// Aspect ratio divergence above which thumbnail mode is worth a region decode.
const THUMBNAIL_ASPECT_THRESHOLD: f32 = 1.5;

const MAX_FACTOR: u32 = 1 << 30;

/// Computes power-of-two downsample factors.
///
/// A factor `n` means every decoded side is `ceil(side / n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSizeCalculator {
    max_pixels: u64,
    max_side: u32,
}

impl SampleSizeCalculator {
    pub fn new(max_pixels: u64, max_side: u32) -> Self {
        Self {
            max_pixels: max_pixels.max(1),
            max_side: max_side.max(1),
        }
    }

    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    pub fn max_side(&self) -> u32 {
        self.max_side
    }

    /// Largest power-of-two factor whose output still covers the target.
    ///
    /// A zero target side is unconstrained; with both sides zero there is no
    /// target and the factor starts at 1. When `allow_huge` is false the
    /// factor is then raised until the output fits the pixel and side
    /// ceilings, even if that undershoots the target. With `allow_huge` the
    /// ceilings are skipped because the caller decodes tiles instead.
    pub fn calculate(
        &self,
        src_width: u32,
        src_height: u32,
        target_width: u32,
        target_height: u32,
        allow_huge: bool,
    ) -> u32 {
        if src_width == 0 || src_height == 0 {
            return 1;
        }

        let mut factor = 1u32;
        if target_width > 0 || target_height > 0 {
            while factor < MAX_FACTOR {
                let next = factor * 2;
                let covers_width =
                    target_width == 0 || src_width.div_ceil(next) >= target_width;
                let covers_height =
                    target_height == 0 || src_height.div_ceil(next) >= target_height;
                let exhausted = src_width.div_ceil(next) <= 1 && src_height.div_ceil(next) <= 1;
                if !(covers_width && covers_height) || exhausted {
                    break;
                }
                factor = next;
            }
        }

        if !allow_huge {
            while factor < MAX_FACTOR && !self.fits(src_width, src_height, factor) {
                factor *= 2;
            }
        }

        factor
    }

    /// Whether downsampling by `factor` fits the ceilings.
    pub fn fits(&self, src_width: u32, src_height: u32, factor: u32) -> bool {
        let w = src_width.div_ceil(factor.max(1));
        let h = src_height.div_ceil(factor.max(1));
        w <= self.max_side && h <= self.max_side && (w as u64) * (h as u64) <= self.max_pixels
    }

    /// Whether an image is too large to decode in full at its native size.
    pub fn is_huge(&self, width: u32, height: u32) -> bool {
        !self.fits(width, height, 1)
    }

    /// Whether cropping to the target aspect ratio is worth a region decode.
    pub fn can_use_thumbnail_mode(
        &self,
        image_width: u32,
        image_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> bool {
        if image_width == 0 || image_height == 0 || target_width == 0 || target_height == 0 {
            return false;
        }
        if target_width > image_width && target_height > image_height {
            return false;
        }
        let target_ratio = target_width as f32 / target_height as f32;
        let image_ratio = image_width as f32 / image_height as f32;
        target_ratio.max(image_ratio) / target_ratio.min(image_ratio) > THUMBNAIL_ASPECT_THRESHOLD
    }
}

impl Default for SampleSizeCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PIXELS, DEFAULT_MAX_SIDE)
    }
}

/// Output size after downsampling by `factor`.
#[inline]
pub fn sampled_size(width: u32, height: u32, factor: u32) -> (u32, u32) {
    let factor = factor.max(1);
    (width.div_ceil(factor), height.div_ceil(factor))
}
