//! Platform decoder capability.
//!
//! The decode core does not decode pixels itself. It drives a
//! [`PlatformDecoder`] that can read bounds without materializing pixels and
//! materialize pixels at a downsample factor, optionally writing into a
//! caller-supplied buffer.
//!
//! [`ImageCrateDecoder`] implements the capability on top of the `image`
//! crate, with EXIF orientation read through `kamadak-exif`. Tiled decodes of
//! one image share a [`RegionDecoder`] so the stream is parsed once.

use std::io::Cursor;
use std::sync::Arc;

use exif::{In, Reader as ExifReader, Tag};
use image::error::LimitErrorKind;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};

use super::bounds::{ExifOrientation, ImageBounds};
use super::sample::sampled_size;
use crate::error::PlatformError;
use crate::huge::Rect;
use crate::pool::{pack_rgb565, PixelBuffer, PixelConfig};

// =============================================================================
// Decode Options
// =============================================================================

/// Options for one decode attempt.
///
/// A retry never mutates the options of the failed attempt; it builds a new
/// instance through [`DecodeOptions::without_reuse`].
#[derive(Debug)]
pub struct DecodeOptions {
    /// Downsample factor (>= 1)
    pub sample_factor: u32,

    /// Pixel layout to produce
    pub config: PixelConfig,

    /// Buffer the decoder may write into
    pub reuse_buffer: Option<PixelBuffer>,

    /// Set on retries: the decoder must allocate
    pub disable_reuse: bool,
}

impl DecodeOptions {
    pub fn new(sample_factor: u32, config: PixelConfig) -> Self {
        Self {
            sample_factor: sample_factor.max(1),
            config,
            reuse_buffer: None,
            disable_reuse: false,
        }
    }

    pub fn with_reuse_buffer(mut self, buffer: Option<PixelBuffer>) -> Self {
        self.reuse_buffer = buffer;
        self
    }

    /// Options for the retry after a reuse failure.
    pub fn without_reuse(&self) -> Self {
        Self {
            sample_factor: self.sample_factor,
            config: self.config,
            reuse_buffer: None,
            disable_reuse: true,
        }
    }
}

// =============================================================================
// Platform Decoder Trait
// =============================================================================

/// Decoding capability consumed by the pipeline.
///
/// # Reuse Buffer Contract
///
/// A decoder takes `options.reuse_buffer` out of the options only when it
/// writes into it. If it fails, or decides not to use the buffer, the buffer
/// must be left in the options so the pipeline can route it to the pool.
pub trait PlatformDecoder: Send + Sync {
    /// Read geometry and type without materializing pixels.
    fn read_bounds(&self, data: &[u8]) -> Result<ImageBounds, PlatformError>;

    /// Materialize the whole image at `options.sample_factor`.
    fn decode(&self, data: &[u8], options: &mut DecodeOptions) -> Result<PixelBuffer, PlatformError>;

    /// Materialize the stored-coordinate region `region`.
    fn decode_region(
        &self,
        data: &[u8],
        region: Rect,
        options: &mut DecodeOptions,
    ) -> Result<PixelBuffer, PlatformError>;

    /// Whether decoding `mime_type` into a supplied buffer is safe.
    fn supports_reuse(&self, mime_type: &str) -> bool;

    /// Whether `decode_region` works for `mime_type`.
    fn supports_region(&self, mime_type: &str) -> bool;

    /// Prepare `data` for many region decodes of the same image.
    ///
    /// `None` means every region goes through [`PlatformDecoder::decode_region`]
    /// with the encoded bytes.
    fn region_decoder(&self, _data: &[u8]) -> Result<Option<Arc<dyn RegionDecoder>>, PlatformError> {
        Ok(None)
    }
}

/// Decoder bound to one image for repeated region decodes.
///
/// Follows the reuse buffer contract of [`PlatformDecoder`].
pub trait RegionDecoder: Send + Sync {
    /// Materialize the stored-coordinate region `region`.
    fn decode_region(
        &self,
        region: Rect,
        options: &mut DecodeOptions,
    ) -> Result<PixelBuffer, PlatformError>;
}

// =============================================================================
// image crate Decoder
// =============================================================================

/// Platform decoder backed by the `image` crate.
///
/// Downsampling decodes at full size and resizes with a triangle filter. An
/// optional allocation limit makes oversized decodes fail with
/// [`PlatformError::OutOfMemory`] instead of aborting.
#[derive(Debug, Clone, Default)]
pub struct ImageCrateDecoder {
    max_alloc: Option<u64>,
}

impl ImageCrateDecoder {
    pub fn new() -> Self {
        Self { max_alloc: None }
    }

    /// Limit the decoder's intermediate allocations to `bytes`.
    pub fn with_max_alloc(bytes: u64) -> Self {
        Self {
            max_alloc: Some(bytes),
        }
    }

    fn reader<'a>(&self, data: &'a [u8]) -> Result<ImageReader<Cursor<&'a [u8]>>, PlatformError> {
        let mut reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| PlatformError::Stream(e.to_string()))?;
        if reader.format().is_none() {
            return Err(PlatformError::FormatUnsupported(
                "unrecognized image signature".to_string(),
            ));
        }
        if let Some(max_alloc) = self.max_alloc {
            let mut limits = image::Limits::default();
            limits.max_alloc = Some(max_alloc);
            reader.limits(limits);
        }
        Ok(reader)
    }

    fn load(&self, data: &[u8]) -> Result<DynamicImage, PlatformError> {
        self.reader(data)?.decode().map_err(map_image_error)
    }
}

impl PlatformDecoder for ImageCrateDecoder {
    fn read_bounds(&self, data: &[u8]) -> Result<ImageBounds, PlatformError> {
        let reader = self.reader(data)?;
        let format = reader.format();
        let (width, height) = reader.into_dimensions().map_err(map_image_error)?;
        let mime_type = format.map(|f| f.to_mime_type()).unwrap_or("application/octet-stream");

        let orientation = if format == Some(ImageFormat::Jpeg) {
            read_exif_orientation(data)
        } else {
            ExifOrientation::Normal
        };

        Ok(ImageBounds::new(width, height, mime_type, orientation))
    }

    fn decode(&self, data: &[u8], options: &mut DecodeOptions) -> Result<PixelBuffer, PlatformError> {
        let image = self.load(data)?;
        materialize(image, options)
    }

    fn decode_region(
        &self,
        data: &[u8],
        region: Rect,
        options: &mut DecodeOptions,
    ) -> Result<PixelBuffer, PlatformError> {
        let image = self.load(data)?;
        materialize(crop(&image, region)?, options)
    }

    fn supports_reuse(&self, mime_type: &str) -> bool {
        // Animated containers decode frame by frame into their own buffers
        !mime_type.eq_ignore_ascii_case("image/gif")
    }

    fn supports_region(&self, mime_type: &str) -> bool {
        mime_type.eq_ignore_ascii_case("image/jpeg") || mime_type.eq_ignore_ascii_case("image/png")
    }

    fn region_decoder(&self, data: &[u8]) -> Result<Option<Arc<dyn RegionDecoder>>, PlatformError> {
        let image = self.load(data)?;
        Ok(Some(Arc::new(DecodedImage { image })))
    }
}

/// A fully decoded source that tiles are cut from.
struct DecodedImage {
    image: DynamicImage,
}

impl RegionDecoder for DecodedImage {
    fn decode_region(
        &self,
        region: Rect,
        options: &mut DecodeOptions,
    ) -> Result<PixelBuffer, PlatformError> {
        materialize(crop(&self.image, region)?, options)
    }
}

fn crop(image: &DynamicImage, region: Rect) -> Result<DynamicImage, PlatformError> {
    let bounds = Rect::new(0, 0, image.width(), image.height());
    let region = region.intersect(&bounds).ok_or_else(|| {
        PlatformError::Malformed(format!("region {} outside image {}", region, bounds))
    })?;
    Ok(image.crop_imm(region.left, region.top, region.width(), region.height()))
}

/// Downsample `image` and write it into the reuse buffer or a new allocation.
fn materialize(
    image: DynamicImage,
    options: &mut DecodeOptions,
) -> Result<PixelBuffer, PlatformError> {
    let (width, height) = sampled_size(image.width(), image.height(), options.sample_factor);
    let image = if (width, height) != (image.width(), image.height()) {
        image.resize_exact(width, height, FilterType::Triangle)
    } else {
        image
    };

    let mut buffer = match options.reuse_buffer.take() {
        Some(mut reuse) if !options.disable_reuse => {
            if !reuse.reconfigure(width, height, options.config) {
                let message = format!(
                    "{}x{} {} does not fit buffer {:?}",
                    width, height, options.config, reuse
                );
                options.reuse_buffer = Some(reuse);
                return Err(PlatformError::BufferMismatch(message));
            }
            reuse
        }
        unused => {
            options.reuse_buffer = unused;
            PixelBuffer::try_new(width, height, options.config).ok_or(
                PlatformError::OutOfMemory {
                    requested: options.config.byte_count(width, height),
                },
            )?
        }
    };

    write_pixels(&image, options.config, buffer.pixels_mut());
    Ok(buffer)
}

fn map_image_error(error: ImageError) -> PlatformError {
    match error {
        ImageError::Limits(limit) => match limit.kind() {
            LimitErrorKind::InsufficientMemory => PlatformError::OutOfMemory { requested: 0 },
            _ => PlatformError::Malformed(limit.to_string()),
        },
        ImageError::Unsupported(e) => PlatformError::FormatUnsupported(e.to_string()),
        ImageError::IoError(e) => PlatformError::Stream(e.to_string()),
        other => PlatformError::Malformed(other.to_string()),
    }
}

/// Convert decoded pixels into `out` in the layout of `config`.
fn write_pixels(image: &DynamicImage, config: PixelConfig, out: &mut [u8]) {
    match config {
        PixelConfig::Rgba8888 => out.copy_from_slice(image.to_rgba8().as_raw()),
        PixelConfig::Gray8 => out.copy_from_slice(image.to_luma8().as_raw()),
        PixelConfig::Rgb565 => {
            let rgb = image.to_rgb8();
            for (dst, px) in out.chunks_exact_mut(2).zip(rgb.pixels()) {
                let [r, g, b] = px.0;
                dst.copy_from_slice(&pack_rgb565(r, g, b).to_le_bytes());
            }
        }
    }
}

/// Read the EXIF orientation tag; absent or unreadable EXIF means upright.
pub fn read_exif_orientation(data: &[u8]) -> ExifOrientation {
    let mut cursor = Cursor::new(data);
    match ExifReader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(ExifOrientation::from_exif)
            .unwrap_or_default(),
        Err(_) => ExifOrientation::Normal,
    }
}
