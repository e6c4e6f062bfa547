//! Decode core.
//!
//! This module turns encoded bytes into display-ready pixel buffers:
//!
//! - [`ImageBounds`] / [`ExifOrientation`]: geometry read without decoding pixels
//! - [`SampleSizeCalculator`]: power-of-two downsample factors under a ceiling
//! - [`PlatformDecoder`]: the decoding capability, implemented by [`ImageCrateDecoder`]
//! - [`DecodeStrategy`]: closed set of decode behaviors selected per request
//! - [`OrientationCorrector`]: EXIF orientation correction
//! - [`DecodePipeline`]: orchestration, buffer reuse and single retry

mod bounds;
mod orientation;
mod pipeline;
mod platform;
mod sample;
mod strategy;

pub use bounds::{ExifOrientation, ImageAttrs, ImageBounds};
pub use orientation::{Correction, ExifOrientationCorrector, OrientationCorrector};
pub use pipeline::{
    BitmapResult, CancelToken, DecodePipeline, DecodeRequest, DecodeResult, PipelineOptions,
    DEFAULT_CACHE_SAMPLE_THRESHOLD,
};
pub use platform::{
    read_exif_orientation, DecodeOptions, ImageCrateDecoder, PlatformDecoder, RegionDecoder,
};
pub use sample::{sampled_size, SampleSizeCalculator, DEFAULT_MAX_PIXELS, DEFAULT_MAX_SIDE};
pub use strategy::{DecodePlan, DecodeStrategy};
