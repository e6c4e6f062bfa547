//! Decode pipeline.
//!
//! Turns encoded bytes into a validated, upright pixel buffer.
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ read bounds  │──▶│ huge? select  │──▶│ plan sample │──▶│ pool.get()   │
//! │              │   │ strategy      │   │ factor      │   │ reuse buffer │
//! └──────────────┘   └───────────────┘   └─────────────┘   └──────────────┘
//!        │                   │ huge                                │
//!        ▼                   ▼                                     ▼
//! BoundsUnreadable   Regions(coordinator)                 ┌──────────────┐
//!                                                         │ decode       │──┐ reuse buffer
//!                                                         └──────────────┘  │ rejected:
//!                                                                │    ◀─────┘ retry once
//!                                                                ▼            without reuse
//!                                            ┌──────────────┐   ┌──────────────┐
//!                                            │ result ready │◀──│ validate,    │
//!                                            │              │   │ orient       │
//!                                            └──────────────┘   └──────────────┘
//! ```
//!
//! Steps run strictly in this order for one request. Every terminal failure
//! is returned to the caller as a [`DecodeError`] and reported to the
//! [`ErrorTracker`]; cancellation is returned but not reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, warn};

use super::bounds::{ImageAttrs, ImageBounds};
use super::orientation::{Correction, ExifOrientationCorrector, OrientationCorrector};
use super::platform::{DecodeOptions, PlatformDecoder, RegionDecoder};
use super::sample::{sampled_size, SampleSizeCalculator};
use super::strategy::{DecodePlan, DecodeStrategy};
use crate::error::{DecodeError, PlatformError};
use crate::huge::{Rect, TileDecodeCoordinator, TileOptions};
use crate::io::ByteSource;
use crate::pool::{BufferInfo, PixelBuffer, PixelBufferPool, PixelConfig};
use crate::tracker::{ErrorTracker, FailureContext, LoggingErrorTracker};

/// Default sample factor from which a processed result is worth caching
pub const DEFAULT_CACHE_SAMPLE_THRESHOLD: u32 = 8;

// =============================================================================
// Cancellation
// =============================================================================

/// Shared cancellation flag.
///
/// Clones observe the same flag. Cancelling before decoding starts skips the
/// remaining steps; cancelling during a platform decode lets the call finish
/// and discards its result.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// =============================================================================
// Decode Request
// =============================================================================

/// Parameters of one decode request.
#[derive(Debug, Clone, Default)]
pub struct DecodeRequest {
    /// Desired output width (0 = unconstrained)
    pub target_width: u32,

    /// Desired output height (0 = unconstrained)
    pub target_height: u32,

    /// Crop to the target aspect ratio when it differs a lot from the source
    pub thumbnail_mode: bool,

    /// Decode JPEG sources as RGB565
    pub low_quality: bool,

    /// Never write into a pooled buffer for this request
    pub disable_reuse: bool,

    /// Hand oversized images to a tile coordinator instead of downsampling
    pub huge_image: bool,

    pub cancel: CancelToken,
}

impl DecodeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, width: u32, height: u32) -> Self {
        self.target_width = width;
        self.target_height = height;
        self
    }

    pub fn with_thumbnail_mode(mut self, enabled: bool) -> Self {
        self.thumbnail_mode = enabled;
        self
    }

    pub fn with_low_quality(mut self, enabled: bool) -> Self {
        self.low_quality = enabled;
        self
    }

    pub fn with_reuse_disabled(mut self, disabled: bool) -> Self {
        self.disable_reuse = disabled;
        self
    }

    pub fn with_huge_image(mut self, enabled: bool) -> Self {
        self.huge_image = enabled;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn has_target(&self) -> bool {
        self.target_width > 0 && self.target_height > 0
    }
}

// =============================================================================
// Decode Result
// =============================================================================

/// A decoded, validated and upright bitmap.
#[derive(Debug)]
pub struct BitmapResult {
    /// Attributes of the full source image as displayed
    pub attrs: ImageAttrs,

    pub buffer: PixelBuffer,

    /// Whether the buffer reflects a transform that is expensive to redo
    pub processed: bool,

    pub sample_factor: u32,

    pub strategy: DecodeStrategy,
}

impl BitmapResult {
    /// Whether writing this result to a disk cache is worthwhile.
    pub fn should_cache(&self) -> bool {
        self.processed
    }
}

/// Outcome of a successful decode request.
#[derive(Debug)]
pub enum DecodeResult {
    Bitmap(BitmapResult),
    Regions(TileDecodeCoordinator),
}

impl DecodeResult {
    pub fn into_bitmap(self) -> Option<BitmapResult> {
        match self {
            DecodeResult::Bitmap(bitmap) => Some(bitmap),
            DecodeResult::Regions(_) => None,
        }
    }

    pub fn into_regions(self) -> Option<TileDecodeCoordinator> {
        match self {
            DecodeResult::Regions(coordinator) => Some(coordinator),
            DecodeResult::Bitmap(_) => None,
        }
    }
}

// =============================================================================
// Pipeline Options
// =============================================================================

/// Policy knobs of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Global kill-switch for buffer reuse
    pub reuse_disabled: bool,

    /// Sample factor from which a result is flagged as worth caching
    pub cache_sample_threshold: u32,

    /// Settings for huge-image coordinators created by this pipeline
    pub tiles: TileOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            reuse_disabled: false,
            cache_sample_threshold: DEFAULT_CACHE_SAMPLE_THRESHOLD,
            tiles: TileOptions::default(),
        }
    }
}

/// One decode attempt sequence: first try plus at most one retry.
struct Attempt<'a> {
    data: &'a [u8],
    region: Option<Rect>,
    /// Prepared decoder for `region`, if the caller has one
    prepared: Option<&'a dyn RegionDecoder>,
    sample_factor: u32,
    config: PixelConfig,
    allow_reuse: bool,
    /// Smallest accepted side of the decoded buffer
    min_side: u32,
    cancel: &'a CancelToken,
    context: &'a FailureContext,
}

// =============================================================================
// Decode Pipeline
// =============================================================================

/// Orchestrates bound reading, strategy selection, buffer reuse, decoding,
/// validation and orientation correction.
///
/// Cloning is cheap; clones share the decoder, pool and tracker.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use pixreuse::decode::{DecodePipeline, DecodeRequest, ImageCrateDecoder};
/// use pixreuse::io::FileSource;
/// use pixreuse::pool::PixelBufferPool;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = DecodePipeline::new(
///     Arc::new(ImageCrateDecoder::new()),
///     Arc::new(PixelBufferPool::new()),
/// );
/// let source = FileSource::new("photo.jpg");
/// let request = DecodeRequest::new().with_target(1000, 750);
/// let result = pipeline.decode(&source, &request).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DecodePipeline {
    decoder: Arc<dyn PlatformDecoder>,
    pool: Arc<PixelBufferPool>,
    tracker: Arc<dyn ErrorTracker>,
    corrector: Arc<dyn OrientationCorrector>,
    calculator: SampleSizeCalculator,

    /// Registered strategies in priority order; `Normal` is always last
    strategies: Vec<DecodeStrategy>,

    options: PipelineOptions,
}

impl DecodePipeline {
    /// Create a pipeline with default strategies, options and the logging tracker.
    pub fn new(decoder: Arc<dyn PlatformDecoder>, pool: Arc<PixelBufferPool>) -> Self {
        Self {
            decoder,
            pool,
            tracker: Arc::new(LoggingErrorTracker),
            corrector: Arc::new(ExifOrientationCorrector),
            calculator: SampleSizeCalculator::default(),
            strategies: DecodeStrategy::DEFAULT_ORDER.to_vec(),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ErrorTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_corrector(mut self, corrector: Arc<dyn OrientationCorrector>) -> Self {
        self.corrector = corrector;
        self
    }

    pub fn with_calculator(mut self, calculator: SampleSizeCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the registered strategies.
    ///
    /// `Normal` is moved to the end (or appended) so selection always
    /// succeeds.
    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = DecodeStrategy>) -> Self {
        let mut ordered: Vec<DecodeStrategy> = Vec::new();
        for strategy in strategies {
            if strategy != DecodeStrategy::Normal && !ordered.contains(&strategy) {
                ordered.push(strategy);
            }
        }
        ordered.push(DecodeStrategy::Normal);
        self.strategies = ordered;
        self
    }

    pub fn decoder(&self) -> &Arc<dyn PlatformDecoder> {
        &self.decoder
    }

    pub fn pool(&self) -> &Arc<PixelBufferPool> {
        &self.pool
    }

    pub fn tracker(&self) -> &Arc<dyn ErrorTracker> {
        &self.tracker
    }

    pub fn calculator(&self) -> &SampleSizeCalculator {
        &self.calculator
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn strategies(&self) -> &[DecodeStrategy] {
        &self.strategies
    }

    /// Whether a processed result at `sample_factor` is worth a disk cache write.
    pub fn should_cache_processed_result(&self, sample_factor: u32) -> bool {
        sample_factor >= self.options.cache_sample_threshold
    }

    /// Open `source` and decode it.
    ///
    /// Bytes are read once and shared between the bounds pass and the
    /// decode pass. Decoding runs on the blocking thread pool.
    pub async fn decode(
        &self,
        source: &dyn ByteSource,
        request: &DecodeRequest,
    ) -> Result<DecodeResult, DecodeError> {
        let source_id = source.identifier().to_string();
        if request.cancel.is_cancelled() {
            return Err(DecodeError::Cancelled { source_id });
        }

        let data = match source.open().await {
            Ok(data) => data,
            Err(e) => {
                let error = DecodeError::BoundsUnreadable {
                    source_id: source_id.clone(),
                    message: e.to_string(),
                };
                let context = self.failure_context(&source_id, None, 1);
                return Err(self.report_failure(&context, error));
            }
        };

        let pipeline = self.clone();
        let request = request.clone();
        let task_source_id = source_id.clone();
        tokio::task::spawn_blocking(move || pipeline.decode_bytes(&task_source_id, data, &request))
            .await
            .unwrap_or_else(|e| {
                let error = DecodeError::DecodeFailed {
                    source_id: source_id.clone(),
                    retried: false,
                    cause: PlatformError::Malformed(format!("decode task failed: {}", e)),
                };
                let context = self.failure_context(&source_id, None, 1);
                Err(self.report_failure(&context, error))
            })
    }

    /// Decode already-loaded bytes on the calling thread.
    pub fn decode_bytes(
        &self,
        source_id: &str,
        data: Bytes,
        request: &DecodeRequest,
    ) -> Result<DecodeResult, DecodeError> {
        let start = Instant::now();

        let bounds = match self.decoder.read_bounds(&data) {
            Ok(bounds) if bounds.width > 0 && bounds.height > 0 => bounds,
            Ok(bounds) => {
                let context = self.failure_context(source_id, Some(&bounds), 1);
                let error = DecodeError::BoundsUnreadable {
                    source_id: source_id.to_string(),
                    message: format!("empty bounds {}x{}", bounds.width, bounds.height),
                };
                return Err(self.report_failure(&context, error));
            }
            Err(e) => {
                let context = self.failure_context(source_id, None, 1);
                let error = DecodeError::BoundsUnreadable {
                    source_id: source_id.to_string(),
                    message: e.to_string(),
                };
                return Err(self.report_failure(&context, error));
            }
        };

        if request.huge_image
            && self.decoder.supports_region(&bounds.mime_type)
            && self.calculator.is_huge(bounds.width, bounds.height)
        {
            debug!(
                source = source_id,
                width = bounds.width,
                height = bounds.height,
                "Image exceeds decode ceiling, switching to tiled regions"
            );
            return Ok(DecodeResult::Regions(TileDecodeCoordinator::new(
                source_id,
                data,
                bounds,
                self.clone(),
            )));
        }

        let plan = self.plan(&bounds, request);
        let context = self.failure_context(source_id, Some(&bounds), plan.sample_factor);
        let attempt = Attempt {
            data: &data,
            region: plan.region,
            prepared: None,
            sample_factor: plan.sample_factor,
            config: self.pixel_config(&bounds, request),
            allow_reuse: self.reuse_allowed(&bounds, request),
            min_side: 2,
            cancel: &request.cancel,
            context: &context,
        };

        let buffer = self
            .decode_with_retry(&attempt)
            .map_err(|e| self.report_failure(&context, e))?;

        let mut processed = self.should_cache_processed_result(plan.sample_factor);
        let buffer = self
            .correct_orientation(&bounds, buffer, &context, &mut processed)
            .map_err(|e| self.report_failure(&context, e))?;

        debug!(
            source = source_id,
            strategy = ?plan.strategy,
            sample = plan.sample_factor,
            width = buffer.width(),
            height = buffer.height(),
            processed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Decoded image"
        );

        Ok(DecodeResult::Bitmap(BitmapResult {
            attrs: ImageAttrs::from(&bounds),
            buffer,
            processed,
            sample_factor: plan.sample_factor,
            strategy: plan.strategy,
        }))
    }

    /// Decode one stored-coordinate region for a tile.
    ///
    /// Shares the reuse, retry and validation steps with full decodes. Pixels
    /// come from `prepared` when given, otherwise from `data`. Tiles are not
    /// orientation-corrected and terminal failures are left for the caller
    /// to report.
    pub(crate) fn decode_tile(
        &self,
        data: &[u8],
        prepared: Option<&dyn RegionDecoder>,
        bounds: &ImageBounds,
        rect: Rect,
        sample_factor: u32,
        cancel: &CancelToken,
        context: &FailureContext,
    ) -> Result<PixelBuffer, DecodeError> {
        let attempt = Attempt {
            data,
            region: Some(rect),
            prepared,
            sample_factor,
            config: PixelConfig::Rgba8888,
            allow_reuse: !self.options.reuse_disabled && self.decoder.supports_reuse(&bounds.mime_type),
            min_side: 1,
            cancel,
            context,
        };
        self.decode_with_retry(&attempt)
    }

    /// Build the tracker context for a failure.
    pub(crate) fn failure_context(
        &self,
        source_id: &str,
        bounds: Option<&ImageBounds>,
        sample_factor: u32,
    ) -> FailureContext {
        FailureContext {
            source_id: source_id.to_string(),
            width: bounds.map_or(0, |b| b.width),
            height: bounds.map_or(0, |b| b.height),
            mime_type: bounds.map(|b| b.mime_type.clone()).unwrap_or_default(),
            sample_factor,
            memory: self.pool.memory_snapshot(),
        }
    }

    fn plan(&self, bounds: &ImageBounds, request: &DecodeRequest) -> DecodePlan {
        let strategy = self
            .strategies
            .iter()
            .copied()
            .find(|s| s.matches(bounds, request, self.decoder.as_ref(), &self.calculator))
            .unwrap_or(DecodeStrategy::Normal);
        strategy.plan(bounds, request, &self.calculator)
    }

    fn pixel_config(&self, bounds: &ImageBounds, request: &DecodeRequest) -> PixelConfig {
        if request.low_quality && bounds.is_jpeg() {
            PixelConfig::Rgb565
        } else {
            PixelConfig::Rgba8888
        }
    }

    fn reuse_allowed(&self, bounds: &ImageBounds, request: &DecodeRequest) -> bool {
        !self.options.reuse_disabled
            && !request.disable_reuse
            && self.decoder.supports_reuse(&bounds.mime_type)
    }

    fn report_failure(&self, context: &FailureContext, error: DecodeError) -> DecodeError {
        if !error.is_cancelled() {
            self.tracker.on_decode_failed(context, &error);
        }
        error
    }

    fn invoke(
        &self,
        attempt: &Attempt<'_>,
        options: &mut DecodeOptions,
    ) -> Result<PixelBuffer, PlatformError> {
        match (attempt.region, attempt.prepared) {
            (Some(rect), Some(prepared)) => prepared.decode_region(rect, options),
            (Some(rect), None) => self.decoder.decode_region(attempt.data, rect, options),
            (None, _) => self.decoder.decode(attempt.data, options),
        }
    }

    /// Decode, retrying once without reuse when the reuse buffer is implicated.
    fn decode_with_retry(&self, attempt: &Attempt<'_>) -> Result<PixelBuffer, DecodeError> {
        let source_id = &attempt.context.source_id;
        if attempt.cancel.is_cancelled() {
            return Err(DecodeError::Cancelled {
                source_id: source_id.clone(),
            });
        }

        let reuse = if attempt.allow_reuse {
            let (width, height) = match attempt.region {
                Some(rect) => sampled_size(rect.width(), rect.height(), attempt.sample_factor),
                None => sampled_size(
                    attempt.context.width,
                    attempt.context.height,
                    attempt.sample_factor,
                ),
            };
            self.pool.get(width, height, attempt.config)
        } else {
            None
        };
        let reuse_info = reuse.as_ref().map(BufferInfo::from);

        let mut options = DecodeOptions::new(attempt.sample_factor, attempt.config).with_reuse_buffer(reuse);
        let first = self.invoke(attempt, &mut options);
        let unused = options.reuse_buffer.take();

        let mut buffer = match (first, reuse_info) {
            (Ok(buffer), _) => {
                if let Some(unused) = unused {
                    self.pool.put(unused);
                }
                buffer
            }
            (Err(cause), Some(info)) if cause.implicates_reuse_buffer() => {
                warn!(
                    source = %source_id,
                    buffer = ?info,
                    "Reuse buffer rejected, retrying without reuse: {}",
                    cause
                );
                self.tracker.on_invalid_reuse_buffer(attempt.context, &info, &cause);
                if let Some(bad) = unused {
                    self.pool.discard(bad);
                }
                if attempt.cancel.is_cancelled() {
                    return Err(DecodeError::Cancelled {
                        source_id: source_id.clone(),
                    });
                }

                let mut retry = options.without_reuse();
                self.invoke(attempt, &mut retry)
                    .map_err(|cause| DecodeError::DecodeFailed {
                        source_id: source_id.clone(),
                        retried: true,
                        cause,
                    })?
            }
            (Err(cause), _) => {
                if let Some(unused) = unused {
                    self.pool.put(unused);
                }
                return Err(DecodeError::DecodeFailed {
                    source_id: source_id.clone(),
                    retried: false,
                    cause,
                });
            }
        };

        if attempt.cancel.is_cancelled() {
            debug!(source = %source_id, "Discarding result of cancelled decode");
            self.pool.put(buffer);
            return Err(DecodeError::Cancelled {
                source_id: source_id.clone(),
            });
        }

        if buffer.is_recycled() {
            self.tracker
                .on_buffer_recycled_unexpectedly(attempt.context, &BufferInfo::from(&buffer));
            return Err(DecodeError::InvalidResult {
                source_id: source_id.clone(),
                reason: "decoder returned a recycled buffer".to_string(),
            });
        }

        if buffer.width() < attempt.min_side || buffer.height() < attempt.min_side {
            let reason = format!("decoded size {}x{} is too small", buffer.width(), buffer.height());
            buffer.recycle();
            return Err(DecodeError::InvalidResult {
                source_id: source_id.clone(),
                reason,
            });
        }

        Ok(buffer)
    }

    /// Apply EXIF orientation, swapping in a new buffer when the corrector
    /// produced one.
    fn correct_orientation(
        &self,
        bounds: &ImageBounds,
        mut buffer: PixelBuffer,
        context: &FailureContext,
        processed: &mut bool,
    ) -> Result<PixelBuffer, DecodeError> {
        let orientation = bounds.orientation;
        if !orientation.needs_correction() {
            return Ok(buffer);
        }

        let recycled = |buffer: &PixelBuffer| {
            self.tracker
                .on_buffer_recycled_unexpectedly(context, &BufferInfo::from(buffer));
            DecodeError::CorrectOrientationFailed {
                source_id: context.source_id.clone(),
                orientation,
            }
        };

        if buffer.is_recycled() {
            return Err(recycled(&buffer));
        }

        let correction = self
            .corrector
            .correct(&mut buffer, orientation, &self.pool)
            .map_err(|cause| DecodeError::DecodeFailed {
                source_id: context.source_id.clone(),
                retried: false,
                cause,
            });

        // The source pixels must have stayed live for the whole transform
        if buffer.is_recycled() {
            if let Ok(Correction::Replaced(rotated)) = correction {
                self.pool.put(rotated);
            }
            return Err(recycled(&buffer));
        }

        match correction {
            Ok(Correction::Unchanged) => {}
            Ok(Correction::InPlace) => *processed = true,
            Ok(Correction::Replaced(rotated)) => {
                let old = std::mem::replace(&mut buffer, rotated);
                self.pool.put(old);
                *processed = true;
            }
            Err(e) => {
                self.pool.put(buffer);
                return Err(e);
            }
        }

        if buffer.is_recycled() {
            return Err(recycled(&buffer));
        }
        Ok(buffer)
    }
}

impl std::fmt::Debug for DecodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePipeline")
            .field("calculator", &self.calculator)
            .field("strategies", &self.strategies)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
