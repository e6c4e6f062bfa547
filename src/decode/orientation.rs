//! EXIF orientation correction of decoded buffers.

use super::bounds::ExifOrientation;
use crate::error::PlatformError;
use crate::pool::{PixelBuffer, PixelBufferPool};

/// Outcome of an orientation correction.
#[derive(Debug)]
pub enum Correction {
    /// Nothing to do
    Unchanged,
    /// The buffer was transformed in place
    InPlace,
    /// The pixels were copied into a new buffer; the old one is no longer needed
    Replaced(PixelBuffer),
}

/// Applies EXIF orientation to decoded pixels.
pub trait OrientationCorrector: Send + Sync {
    /// Transform `buffer` so it displays upright.
    ///
    /// Transforms that change dimensions write into a new buffer, taken from
    /// `pool` when one fits.
    fn correct(
        &self,
        buffer: &mut PixelBuffer,
        orientation: ExifOrientation,
        pool: &PixelBufferPool,
    ) -> Result<Correction, PlatformError>;
}

/// Default corrector: flips in place, copy-rotates when dimensions swap.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifOrientationCorrector;

impl OrientationCorrector for ExifOrientationCorrector {
    fn correct(
        &self,
        buffer: &mut PixelBuffer,
        orientation: ExifOrientation,
        pool: &PixelBufferPool,
    ) -> Result<Correction, PlatformError> {
        let (width, height) = (buffer.width() as usize, buffer.height() as usize);
        let bpp = buffer.config().bytes_per_pixel();

        match orientation {
            ExifOrientation::Normal => Ok(Correction::Unchanged),
            ExifOrientation::FlipHorizontal => {
                for row in buffer.pixels_mut().chunks_exact_mut(width * bpp) {
                    reverse_pixels(row, bpp);
                }
                Ok(Correction::InPlace)
            }
            ExifOrientation::FlipVertical => {
                let stride = width * bpp;
                let pixels = buffer.pixels_mut();
                for y in 0..height / 2 {
                    let (top, bottom) = pixels.split_at_mut((height - 1 - y) * stride);
                    top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
                }
                Ok(Correction::InPlace)
            }
            ExifOrientation::Rotate180 => {
                reverse_pixels(buffer.pixels_mut(), bpp);
                Ok(Correction::InPlace)
            }
            _ => {
                let (out_w, out_h) =
                    orientation.oriented_size(buffer.width(), buffer.height());
                let config = buffer.config();
                let mut rotated = match pool.get(out_w, out_h, config) {
                    Some(reused) => reused,
                    None => PixelBuffer::try_new(out_w, out_h, config).ok_or(
                        PlatformError::OutOfMemory {
                            requested: config.byte_count(out_w, out_h),
                        },
                    )?,
                };

                let (src_w, src_h) = (buffer.width(), buffer.height());
                let src = buffer.pixels();
                let dst = rotated.pixels_mut();
                for y in 0..out_h {
                    for x in 0..out_w {
                        let (sx, sy) = orientation.source_coords(x, y, src_w, src_h);
                        let s = (sy as usize * width + sx as usize) * bpp;
                        let d = (y as usize * out_w as usize + x as usize) * bpp;
                        dst[d..d + bpp].copy_from_slice(&src[s..s + bpp]);
                    }
                }
                Ok(Correction::Replaced(rotated))
            }
        }
    }
}

/// Reverse the order of `bpp`-byte pixels in `pixels`.
fn reverse_pixels(pixels: &mut [u8], bpp: usize) {
    let count = pixels.len() / bpp;
    for i in 0..count / 2 {
        let j = count - 1 - i;
        let (head, tail) = pixels.split_at_mut(j * bpp);
        head[i * bpp..(i + 1) * bpp].swap_with_slice(&mut tail[..bpp]);
    }
}
