//! # pixreuse
//!
//! Memory-budgeted image decoding with pixel buffer reuse.
//!
//! This library decodes encoded image bytes into in-memory pixel buffers for
//! display. Finished buffers are parked in a byte-budgeted pool and handed to
//! later decodes, which write into them in place instead of allocating.
//!
//! ## Features
//!
//! - **Buffer reuse**: size-classed pool with byte-budget eviction
//! - **Downsampling**: power-of-two sample factors under a pixel ceiling
//! - **Recovery**: one retry without reuse when a reuse buffer is rejected
//! - **EXIF orientation**: flips in place, rotations into a pooled buffer
//! - **Huge images**: viewport-driven tile decoding with prioritized scheduling
//!
//! ## Architecture
//!
//! - [`pool`] - Pixel buffers and the reuse pool
//! - [`decode`] - Bounds, sample sizes, strategies and the decode pipeline
//! - [`huge`] - Tile coordinator for oversized images
//! - [`tracker`] - Failure reporting sink
//! - [`io`] - Byte sources
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pixreuse::{DecodePipeline, DecodeRequest, FileSource, ImageCrateDecoder, PixelBufferPool};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = DecodePipeline::new(
//!         Arc::new(ImageCrateDecoder::new()),
//!         Arc::new(PixelBufferPool::new()),
//!     );
//!
//!     let request = DecodeRequest::new().with_target(1000, 750);
//!     match pipeline.decode(&FileSource::new("photo.jpg"), &request).await {
//!         Ok(result) => println!("{:?}", result),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod huge;
pub mod io;
pub mod pool;
pub mod tracker;

// Re-export commonly used types
pub use config::{Cli, Command, DecodeArgs, EngineConfig, TilesArgs};
pub use decode::{
    BitmapResult, CancelToken, DecodePipeline, DecodeRequest, DecodeResult, DecodeStrategy,
    ExifOrientation, ImageAttrs, ImageBounds, ImageCrateDecoder, PipelineOptions, PlatformDecoder,
    SampleSizeCalculator,
};
pub use error::{DecodeError, DecodeErrorKind, IoError, PlatformError, TileSortError};
pub use huge::{Rect, Tile, TileDecodeCoordinator, TileDecodeSummary, TileOptions, TileState};
pub use io::{ByteSource, FileSource, MemorySource};
pub use pool::{PixelBuffer, PixelBufferPool, PixelConfig, PoolKey};
pub use tracker::{ErrorTracker, FailureContext, LoggingErrorTracker, MemorySnapshot, NoopErrorTracker};
