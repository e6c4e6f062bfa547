//! Image bounds and EXIF orientation.

use std::fmt;

use serde::Serialize;

use crate::huge::Rect;

/// EXIF orientation of the encoded pixels.
///
/// Describes the transform that must be applied to the stored pixels to
/// display the image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ExifOrientation {
    /// Stored upright
    #[default]
    Normal = 1,
    /// Mirror horizontally
    FlipHorizontal = 2,
    /// Rotate 180 degrees
    Rotate180 = 3,
    /// Mirror vertically
    FlipVertical = 4,
    /// Mirror across the main diagonal
    Transpose = 5,
    /// Rotate 90 degrees clockwise
    Rotate90 = 6,
    /// Mirror across the anti-diagonal
    Transverse = 7,
    /// Rotate 270 degrees clockwise
    Rotate270 = 8,
}

impl ExifOrientation {
    /// Map an EXIF tag value; unknown values mean no correction.
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => ExifOrientation::FlipHorizontal,
            3 => ExifOrientation::Rotate180,
            4 => ExifOrientation::FlipVertical,
            5 => ExifOrientation::Transpose,
            6 => ExifOrientation::Rotate90,
            7 => ExifOrientation::Transverse,
            8 => ExifOrientation::Rotate270,
            _ => ExifOrientation::Normal,
        }
    }

    pub fn needs_correction(self) -> bool {
        self != ExifOrientation::Normal
    }

    /// Whether correction swaps width and height.
    #[inline]
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            ExifOrientation::Transpose
                | ExifOrientation::Rotate90
                | ExifOrientation::Transverse
                | ExifOrientation::Rotate270
        )
    }

    /// Dimensions after correction of a `width` x `height` stored image.
    pub fn oriented_size(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Stored pixel coordinates for upright coordinates `(x, y)`.
    ///
    /// `width` and `height` are the stored dimensions.
    #[inline]
    pub fn source_coords(self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            ExifOrientation::Normal => (x, y),
            ExifOrientation::FlipHorizontal => (width - 1 - x, y),
            ExifOrientation::Rotate180 => (width - 1 - x, height - 1 - y),
            ExifOrientation::FlipVertical => (x, height - 1 - y),
            ExifOrientation::Transpose => (y, x),
            ExifOrientation::Rotate90 => (y, height - 1 - x),
            ExifOrientation::Transverse => (width - 1 - y, height - 1 - x),
            ExifOrientation::Rotate270 => (width - 1 - y, x),
        }
    }

    /// Map a rectangle in upright coordinates back to stored coordinates.
    pub fn source_rect(self, rect: Rect, width: u32, height: u32) -> Rect {
        if rect.is_empty() {
            return rect;
        }
        let (x0, y0) = self.source_coords(rect.left, rect.top, width, height);
        let (x1, y1) = self.source_coords(rect.right - 1, rect.bottom - 1, width, height);
        Rect::new(x0.min(x1), y0.min(y1), x0.max(x1) + 1, y0.max(y1) + 1)
    }
}

impl fmt::Display for ExifOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExifOrientation::Normal => "NORMAL",
            ExifOrientation::FlipHorizontal => "FLIP_HORIZONTAL",
            ExifOrientation::Rotate180 => "ROTATE_180",
            ExifOrientation::FlipVertical => "FLIP_VERTICAL",
            ExifOrientation::Transpose => "TRANSPOSE",
            ExifOrientation::Rotate90 => "ROTATE_90",
            ExifOrientation::Transverse => "TRANSVERSE",
            ExifOrientation::Rotate270 => "ROTATE_270",
        };
        f.write_str(name)
    }
}

/// Geometry read from an encoded image without materializing pixels.
///
/// `width` and `height` are the stored dimensions, before orientation
/// correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageBounds {
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub orientation: ExifOrientation,
}

impl ImageBounds {
    pub fn new(
        width: u32,
        height: u32,
        mime_type: impl Into<String>,
        orientation: ExifOrientation,
    ) -> Self {
        Self {
            width,
            height,
            mime_type: mime_type.into(),
            orientation,
        }
    }

    /// Dimensions as displayed.
    pub fn oriented_size(&self) -> (u32, u32) {
        self.orientation.oriented_size(self.width, self.height)
    }

    pub fn is_jpeg(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("image/jpeg")
    }
}

/// Attributes of a decoded image, reported alongside its pixels.
///
/// Dimensions are those of the full source image as displayed (after
/// orientation correction), not of the possibly downsampled buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageAttrs {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub orientation: ExifOrientation,
}

impl From<&ImageBounds> for ImageAttrs {
    fn from(bounds: &ImageBounds) -> Self {
        let (width, height) = bounds.oriented_size();
        Self {
            mime_type: bounds.mime_type.clone(),
            width,
            height,
            orientation: bounds.orientation,
        }
    }
}
