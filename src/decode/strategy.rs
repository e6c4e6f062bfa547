//! Decode strategy dispatch.
//!
//! Strategies form a closed set. The pipeline walks its registered list in
//! order and picks the first strategy whose [`DecodeStrategy::matches`]
//! returns true. [`DecodeStrategy::Normal`] matches unconditionally and is
//! always last.

use super::bounds::ImageBounds;
use super::pipeline::DecodeRequest;
use super::platform::PlatformDecoder;
use super::sample::SampleSizeCalculator;
use crate::huge::Rect;

/// A decode behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStrategy {
    /// Region-decode the centered crop that matches the target aspect ratio
    Thumbnail,
    /// Decode the whole image at a sample factor
    Normal,
}

/// What a strategy decided to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodePlan {
    pub strategy: DecodeStrategy,

    /// Stored-coordinate region, or `None` for the whole image
    pub region: Option<Rect>,

    pub sample_factor: u32,
}

impl DecodeStrategy {
    /// Default registration order.
    pub const DEFAULT_ORDER: [DecodeStrategy; 2] = [DecodeStrategy::Thumbnail, DecodeStrategy::Normal];

    /// Whether this strategy can handle the request.
    pub fn matches(
        self,
        bounds: &ImageBounds,
        request: &DecodeRequest,
        decoder: &dyn PlatformDecoder,
        calculator: &SampleSizeCalculator,
    ) -> bool {
        match self {
            DecodeStrategy::Normal => true,
            DecodeStrategy::Thumbnail => {
                if !request.thumbnail_mode || !request.has_target() {
                    return false;
                }
                if !decoder.supports_region(&bounds.mime_type) {
                    return false;
                }
                let (width, height) = bounds.oriented_size();
                calculator.can_use_thumbnail_mode(
                    width,
                    height,
                    request.target_width,
                    request.target_height,
                )
            }
        }
    }

    /// Decide the region and sample factor to decode.
    pub fn plan(
        self,
        bounds: &ImageBounds,
        request: &DecodeRequest,
        calculator: &SampleSizeCalculator,
    ) -> DecodePlan {
        let (width, height) = bounds.oriented_size();
        match self {
            DecodeStrategy::Normal => DecodePlan {
                strategy: self,
                region: None,
                sample_factor: calculator.calculate(
                    width,
                    height,
                    request.target_width,
                    request.target_height,
                    false,
                ),
            },
            DecodeStrategy::Thumbnail => {
                let crop = centered_crop(width, height, request.target_width, request.target_height);
                DecodePlan {
                    strategy: self,
                    region: Some(bounds.orientation.source_rect(crop, bounds.width, bounds.height)),
                    sample_factor: calculator.calculate(
                        crop.width(),
                        crop.height(),
                        request.target_width,
                        request.target_height,
                        false,
                    ),
                }
            }
        }
    }
}

/// Largest centered rectangle of `width` x `height` with the target's aspect ratio.
fn centered_crop(width: u32, height: u32, target_width: u32, target_height: u32) -> Rect {
    let (w, h, tw, th) = (
        width as u64,
        height as u64,
        target_width.max(1) as u64,
        target_height.max(1) as u64,
    );
    let (crop_w, crop_h) = if w * th > h * tw {
        // Source is wider than the target
        (((h * tw + th / 2) / th).clamp(1, w), h)
    } else {
        (w, ((w * th + tw / 2) / tw).clamp(1, h))
    };
    let left = ((w - crop_w) / 2) as u32;
    let top = ((h - crop_h) / 2) as u32;
    Rect::new(left, top, left + crop_w as u32, top + crop_h as u32)
}
