//! Reusable pixel buffers.
//!
//! A [`PixelBuffer`] owns a pixel allocation and describes how much of it is in
//! use (`width * height * bytes_per_pixel`). The allocation can be larger than
//! the byte count after the buffer has been reconfigured for smaller
//! dimensions, which is what makes in-place reuse possible.
//!
//! # Recycling
//!
//! Recycling frees the allocation and flips a shared flag. The flag is shared
//! with every [`RecycleHandle`] taken from the buffer, so a recycle performed by
//! another owner is observable by whoever currently holds the buffer. A
//! recycled buffer must never be reused or read.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{DynamicImage, GrayImage, RgbaImage};
use serde::Serialize;

// =============================================================================
// Pixel Config
// =============================================================================

/// Pixel layout of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PixelConfig {
    /// 8 bits per channel RGBA
    #[default]
    Rgba8888,
    /// 16-bit packed RGB, little-endian, no alpha
    Rgb565,
    /// 8-bit luminance
    Gray8,
}

impl PixelConfig {
    /// Bytes used by one pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelConfig::Rgba8888 => 4,
            PixelConfig::Rgb565 => 2,
            PixelConfig::Gray8 => 1,
        }
    }

    /// Bytes required for a `width` x `height` image in this config.
    #[inline]
    pub fn byte_count(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

impl fmt::Display for PixelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelConfig::Rgba8888 => "RGBA_8888",
            PixelConfig::Rgb565 => "RGB_565",
            PixelConfig::Gray8 => "GRAY_8",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Pool Key
// =============================================================================

/// Size class used to match idle buffers against requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub width: u32,
    pub height: u32,
    pub config: PixelConfig,
}

impl PoolKey {
    pub fn new(width: u32, height: u32, config: PixelConfig) -> Self {
        Self {
            width,
            height,
            config,
        }
    }

    /// Bytes a buffer must be able to hold to serve this key.
    pub fn required_bytes(&self) -> usize {
        self.config.byte_count(self.width, self.height)
    }
}

// =============================================================================
// Recycle Handle
// =============================================================================

/// Shared view of a buffer's recycled flag.
///
/// Handles let a second party observe (or force) recycling without owning
/// the pixels.
#[derive(Debug, Clone)]
pub struct RecycleHandle {
    recycled: Arc<AtomicBool>,
}

impl RecycleHandle {
    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::Acquire)
    }

    /// Mark the buffer recycled. The pixels are released by the owner the
    /// next time it touches the buffer.
    pub fn mark_recycled(&self) {
        self.recycled.store(true, Ordering::Release);
    }
}

// =============================================================================
// Pixel Buffer
// =============================================================================

/// A reusable pixel memory region.
pub struct PixelBuffer {
    width: u32,
    height: u32,
    config: PixelConfig,
    data: Vec<u8>,
    recycled: Arc<AtomicBool>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer, returning `None` if the allocation fails.
    pub fn try_new(width: u32, height: u32, config: PixelConfig) -> Option<Self> {
        let len = config.byte_count(width, height);
        let mut data = Vec::new();
        data.try_reserve_exact(len).ok()?;
        data.resize(len, 0);
        Some(Self {
            width,
            height,
            config,
            data,
            recycled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Wrap existing pixel bytes.
    ///
    /// Returns `None` if `data` is too short for the given dimensions.
    pub fn from_pixels(width: u32, height: u32, config: PixelConfig, data: Vec<u8>) -> Option<Self> {
        if data.len() < config.byte_count(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            config,
            data,
            recycled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn config(&self) -> PixelConfig {
        self.config
    }

    pub fn key(&self) -> PoolKey {
        PoolKey::new(self.width, self.height, self.config)
    }

    /// Bytes in use for the current dimensions.
    pub fn byte_count(&self) -> usize {
        self.config.byte_count(self.width, self.height)
    }

    /// Bytes held by the allocation (always >= `byte_count` unless recycled).
    pub fn allocation_byte_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::Acquire)
    }

    pub fn recycle_handle(&self) -> RecycleHandle {
        RecycleHandle {
            recycled: Arc::clone(&self.recycled),
        }
    }

    /// Free the pixels and mark the buffer recycled.
    pub fn recycle(&mut self) {
        self.recycled.store(true, Ordering::Release);
        self.data = Vec::new();
    }

    /// Whether this buffer's allocation can hold `key` in place.
    pub fn can_hold(&self, key: &PoolKey) -> bool {
        !self.is_recycled() && self.allocation_byte_count() >= key.required_bytes()
    }

    /// Change dimensions and config without reallocating.
    ///
    /// Returns `false` (leaving the buffer untouched) if the allocation is too
    /// small or the buffer is recycled.
    pub fn reconfigure(&mut self, width: u32, height: u32, config: PixelConfig) -> bool {
        if !self.can_hold(&PoolKey::new(width, height, config)) {
            return false;
        }
        self.width = width;
        self.height = height;
        self.config = config;
        true
    }

    /// Pixels for the current dimensions.
    pub fn pixels(&self) -> &[u8] {
        let len = self.byte_count().min(self.data.len());
        &self.data[..len]
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        let len = self.byte_count().min(self.data.len());
        &mut self.data[..len]
    }

    /// Copy the pixels into an `image` crate buffer.
    ///
    /// `Rgb565` is expanded to RGBA. Returns `None` for recycled buffers.
    pub fn to_image(&self) -> Option<DynamicImage> {
        if self.is_recycled() {
            return None;
        }
        let pixels = self.pixels().to_vec();
        match self.config {
            PixelConfig::Rgba8888 => {
                RgbaImage::from_raw(self.width, self.height, pixels).map(DynamicImage::ImageRgba8)
            }
            PixelConfig::Gray8 => {
                GrayImage::from_raw(self.width, self.height, pixels).map(DynamicImage::ImageLuma8)
            }
            PixelConfig::Rgb565 => {
                let mut rgba = Vec::with_capacity(pixels.len() * 2);
                for px in pixels.chunks_exact(2) {
                    let [r, g, b] = unpack_rgb565(u16::from_le_bytes([px[0], px[1]]));
                    rgba.extend_from_slice(&[r, g, b, 0xFF]);
                }
                RgbaImage::from_raw(self.width, self.height, rgba).map(DynamicImage::ImageRgba8)
            }
        }
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("config", &self.config)
            .field("byte_count", &self.byte_count())
            .field("allocation", &self.allocation_byte_count())
            .field("recycled", &self.is_recycled())
            .finish()
    }
}

/// Pack 8-bit RGB into RGB565.
#[inline]
pub fn pack_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Expand RGB565 to 8-bit RGB.
#[inline]
pub fn unpack_rgb565(value: u16) -> [u8; 3] {
    let r = ((value >> 11) & 0x1F) as u8;
    let g = ((value >> 5) & 0x3F) as u8;
    let b = (value & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Summary of a buffer for failure reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferInfo {
    pub width: u32,
    pub height: u32,
    pub config: PixelConfig,
    pub byte_count: usize,
    pub allocation_byte_count: usize,
    pub recycled: bool,
}

impl From<&PixelBuffer> for BufferInfo {
    fn from(buffer: &PixelBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
            config: buffer.config(),
            byte_count: buffer.byte_count(),
            allocation_byte_count: buffer.allocation_byte_count(),
            recycled: buffer.is_recycled(),
        }
    }
}
