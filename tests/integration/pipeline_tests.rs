//! Decode pipeline behavior: sizing, reuse, retry, validation, orientation
//! and cancellation.

use std::sync::Arc;

use bytes::Bytes;

use pixreuse::decode::{
    CancelToken, DecodePipeline, DecodeRequest, DecodeStrategy, ExifOrientation,
    ImageCrateDecoder, PipelineOptions,
};
use pixreuse::error::{DecodeError, DecodeErrorKind, PlatformError};
use pixreuse::io::MemorySource;
use pixreuse::pool::{PixelBuffer, PixelBufferPool, PixelConfig};

use super::test_utils::{
    create_test_jpeg, create_test_png, gradient, scripted_pipeline, CountingSource, Event,
    Outcome, RecordingTracker, RecyclingCorrector, ScriptedDecoder,
};

fn source() -> MemorySource {
    MemorySource::new(vec![0u8; 16], "mem://scripted")
}

fn rgba(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::try_new(width, height, PixelConfig::Rgba8888).unwrap()
}

// =============================================================================
// Sizing
// =============================================================================

#[tokio::test]
async fn test_scenario_a_downsample_to_target() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(4000, 3000));
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 0);

    let request = DecodeRequest::new().with_target(1000, 750);
    let bitmap = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();

    assert_eq!(bitmap.sample_factor, 4);
    assert_eq!((bitmap.buffer.width(), bitmap.buffer.height()), (1000, 750));
    assert_eq!((bitmap.attrs.width, bitmap.attrs.height), (4000, 3000));
    assert_eq!(bitmap.attrs.mime_type, "image/jpeg");
    assert!(!bitmap.processed);
    assert!(tracker.events().is_empty());
    assert_eq!(decoder.calls()[0].sample_factor, 4);
}

#[tokio::test]
async fn test_ceiling_overrides_target() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(8000, 6000));
    let (pipeline, _tracker) = scripted_pipeline(decoder, 0);

    // Full size would be 48M pixels
    let bitmap = pipeline
        .decode(&source(), &DecodeRequest::new())
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();
    assert_eq!(bitmap.sample_factor, 4);
    assert_eq!((bitmap.buffer.width(), bitmap.buffer.height()), (2000, 1500));
}

#[tokio::test]
async fn test_large_sample_factor_flags_result_for_caching() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(3200, 3200));
    let (pipeline, _tracker) = scripted_pipeline(decoder, 0);

    let request = DecodeRequest::new().with_target(400, 400);
    let bitmap = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();
    assert_eq!(bitmap.sample_factor, 8);
    assert!(bitmap.processed);
    assert!(bitmap.should_cache());
}

#[tokio::test]
async fn test_low_quality_jpeg_uses_rgb565() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(64, 64));
    let (pipeline, _tracker) = scripted_pipeline(decoder.clone(), 0);

    let request = DecodeRequest::new().with_low_quality(true);
    let bitmap = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();
    assert_eq!(bitmap.buffer.config(), PixelConfig::Rgb565);

    // PNG sources may carry alpha and keep the full layout
    let png = Arc::new(ScriptedDecoder::new(64, 64, "image/png"));
    let (pipeline, _tracker) = scripted_pipeline(png, 0);
    let bitmap = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();
    assert_eq!(bitmap.buffer.config(), PixelConfig::Rgba8888);
}

#[tokio::test]
async fn test_thumbnail_strategy_selected_for_panorama() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(4000, 1000));
    let (pipeline, _tracker) = scripted_pipeline(decoder.clone(), 0);

    let request = DecodeRequest::new()
        .with_target(200, 200)
        .with_thumbnail_mode(true);
    let bitmap = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();

    assert_eq!(bitmap.strategy, DecodeStrategy::Thumbnail);
    assert_eq!((bitmap.buffer.width(), bitmap.buffer.height()), (250, 250));
    // Attributes still describe the whole image
    assert_eq!((bitmap.attrs.width, bitmap.attrs.height), (4000, 1000));
    let call = decoder.calls()[0];
    assert_eq!(call.region, Some(pixreuse::huge::Rect::new(1500, 0, 2500, 1000)));
}

#[tokio::test]
async fn test_thumbnail_falls_back_without_region_support() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(4000, 1000).without_region_support());
    let (pipeline, _tracker) = scripted_pipeline(decoder.clone(), 0);

    let request = DecodeRequest::new()
        .with_target(200, 200)
        .with_thumbnail_mode(true);
    let bitmap = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();
    assert_eq!(bitmap.strategy, DecodeStrategy::Normal);
    assert_eq!(decoder.calls()[0].region, None);
}

#[tokio::test]
async fn test_each_request_opens_source_once() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(640, 480));
    let (pipeline, _tracker) = scripted_pipeline(decoder.clone(), 0);
    let source = CountingSource::new(vec![0u8; 16], "mem://counted");

    let request = DecodeRequest::new().with_target(320, 240);
    pipeline.decode(&source, &request).await.unwrap();
    assert_eq!(source.opens(), 1);
    assert_eq!(decoder.bounds_reads(), 1);
    assert_eq!(decoder.call_count(), 1);

    // The same source serves a later request
    pipeline.decode(&source, &request).await.unwrap();
    assert_eq!(source.opens(), 2);
}

// =============================================================================
// Reuse and Retry
// =============================================================================

#[tokio::test]
async fn test_reuse_buffer_from_pool() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(400, 300));
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    pipeline.pool().put(rgba(100, 100));

    let request = DecodeRequest::new().with_target(100, 75);
    let bitmap = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();

    assert!(decoder.calls()[0].reuse_offered);
    assert_eq!((bitmap.buffer.width(), bitmap.buffer.height()), (100, 75));
    assert_eq!(bitmap.buffer.allocation_byte_count(), 100 * 100 * 4);
    assert!(pipeline.pool().is_empty());
    assert!(tracker.events().is_empty());
}

#[tokio::test]
async fn test_scenario_b_retry_after_buffer_mismatch() {
    let decoder = Arc::new(
        ScriptedDecoder::jpeg(400, 300)
            .with_script([Outcome::Fail(PlatformError::BufferMismatch("stride".into()))]),
    );
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    let pooled = rgba(100, 75);
    let pooled_handle = pooled.recycle_handle();
    pipeline.pool().put(pooled);

    let request = DecodeRequest::new().with_target(100, 75);
    let result = pipeline.decode(&source(), &request).await;
    let bitmap = result.unwrap().into_bitmap().unwrap();
    assert_eq!((bitmap.buffer.width(), bitmap.buffer.height()), (100, 75));

    let calls = decoder.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].reuse_offered && !calls[0].disable_reuse);
    assert!(!calls[1].reuse_offered && calls[1].disable_reuse);

    assert_eq!(
        tracker.count(|e| matches!(e, Event::InvalidReuseBuffer(PlatformError::BufferMismatch(_)))),
        1
    );
    assert_eq!(tracker.count(|e| matches!(e, Event::DecodeFailed(_))), 0);

    // The rejected buffer never returns to the idle set
    assert!(pooled_handle.is_recycled());
    assert!(pipeline.pool().is_empty());
    assert_eq!(pipeline.pool().stats().discarded, 1);
}

#[tokio::test]
async fn test_retry_result_matches_reuse_disabled_decode() {
    let retried = Arc::new(
        ScriptedDecoder::jpeg(400, 300)
            .with_script([Outcome::Fail(PlatformError::BufferMismatch("stride".into()))]),
    );
    let (pipeline, _tracker) = scripted_pipeline(retried, 1024 * 1024);
    pipeline.pool().put(rgba(100, 75));
    let request = DecodeRequest::new().with_target(100, 75);
    let first = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();

    let plain = Arc::new(ScriptedDecoder::jpeg(400, 300));
    let (pipeline, _tracker) = scripted_pipeline(plain, 1024 * 1024);
    let request = request.with_reuse_disabled(true);
    let second = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();

    assert_eq!(first.attrs, second.attrs);
    assert_eq!(first.sample_factor, second.sample_factor);
    assert_eq!(first.buffer.pixels(), second.buffer.pixels());
}

#[tokio::test]
async fn test_out_of_memory_with_reuse_buffer_is_retried() {
    let decoder = Arc::new(
        ScriptedDecoder::jpeg(400, 300)
            .with_script([Outcome::Fail(PlatformError::OutOfMemory { requested: 30_000 })]),
    );
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    pipeline.pool().put(rgba(100, 75));

    let request = DecodeRequest::new().with_target(100, 75);
    assert!(pipeline.decode(&source(), &request).await.is_ok());
    assert_eq!(decoder.call_count(), 2);
    assert_eq!(tracker.count(|e| matches!(e, Event::InvalidReuseBuffer(_))), 1);
}

#[tokio::test]
async fn test_retry_is_attempted_only_once() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(400, 300).with_script([
        Outcome::Fail(PlatformError::BufferMismatch("stride".into())),
        Outcome::Fail(PlatformError::Malformed("bad huffman table".into())),
    ]));
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    pipeline.pool().put(rgba(100, 75));

    let request = DecodeRequest::new().with_target(100, 75);
    let err = pipeline.decode(&source(), &request).await.unwrap_err();
    assert!(matches!(
        err,
        DecodeError::DecodeFailed {
            retried: true,
            cause: PlatformError::Malformed(_),
            ..
        }
    ));
    assert_eq!(decoder.call_count(), 2);
    assert_eq!(tracker.count(|e| matches!(e, Event::InvalidReuseBuffer(_))), 1);
    assert_eq!(
        tracker.count(|e| *e == Event::DecodeFailed(DecodeErrorKind::DecodeFailed)),
        1
    );

    // Failure context carries geometry and memory snapshot
    let context = tracker.contexts().pop().unwrap();
    assert_eq!((context.width, context.height), (400, 300));
    assert_eq!(context.mime_type, "image/jpeg");
    assert_eq!(context.sample_factor, 4);
    assert_eq!(context.memory.max, 1024 * 1024);
}

#[tokio::test]
async fn test_stream_error_is_terminal_and_returns_reuse_buffer() {
    let decoder = Arc::new(
        ScriptedDecoder::jpeg(400, 300)
            .with_script([Outcome::Fail(PlatformError::Stream("unexpected eof".into()))]),
    );
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    pipeline.pool().put(rgba(100, 75));

    let request = DecodeRequest::new().with_target(100, 75);
    let err = pipeline.decode(&source(), &request).await.unwrap_err();
    assert!(matches!(err, DecodeError::DecodeFailed { retried: false, .. }));
    assert_eq!(decoder.call_count(), 1);
    assert_eq!(tracker.count(|e| matches!(e, Event::InvalidReuseBuffer(_))), 0);
    // The untouched reuse buffer went back to the pool
    assert_eq!(pipeline.pool().len(), 1);
}

#[tokio::test]
async fn test_mismatch_without_reuse_buffer_is_not_retried() {
    let decoder = Arc::new(
        ScriptedDecoder::jpeg(400, 300)
            .with_script([Outcome::Fail(PlatformError::OutOfMemory { requested: 1 })]),
    );
    let (pipeline, _tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);

    let err = pipeline
        .decode(&source(), &DecodeRequest::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DecodeError::DecodeFailed { retried: false, .. }));
    assert_eq!(decoder.call_count(), 1);
}

#[tokio::test]
async fn test_kill_switch_disables_reuse() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(400, 300));
    let (pipeline, _tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    let pipeline = pipeline.with_options(PipelineOptions {
        reuse_disabled: true,
        ..PipelineOptions::default()
    });
    pipeline.pool().put(rgba(400, 300));

    pipeline.decode(&source(), &DecodeRequest::new()).await.unwrap();
    assert!(!decoder.calls()[0].reuse_offered);
    assert_eq!(pipeline.pool().len(), 1);
    assert_eq!(pipeline.pool().stats().hits, 0);
}

#[tokio::test]
async fn test_unsafe_mime_type_skips_reuse() {
    let decoder = Arc::new(ScriptedDecoder::new(64, 64, "image/gif").without_reuse_support());
    let (pipeline, _tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    pipeline.pool().put(rgba(64, 64));

    pipeline.decode(&source(), &DecodeRequest::new()).await.unwrap();
    assert!(!decoder.calls()[0].reuse_offered);
    assert_eq!(pipeline.pool().len(), 1);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_scenario_c_one_pixel_result_is_invalid() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(400, 300).with_script([Outcome::Fixed(1, 1)]));
    let (pipeline, tracker) = scripted_pipeline(decoder, 1024 * 1024);
    let idle_before = pipeline.pool().len();

    let err = pipeline
        .decode(&source(), &DecodeRequest::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::InvalidResult);
    assert_eq!(pipeline.pool().len(), idle_before);
    assert_eq!(
        tracker.events(),
        vec![Event::DecodeFailed(DecodeErrorKind::InvalidResult)]
    );
}

#[tokio::test]
async fn test_recycled_result_is_invalid() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(400, 300).with_script([Outcome::Recycled]));
    let (pipeline, tracker) = scripted_pipeline(decoder, 1024 * 1024);

    let err = pipeline
        .decode(&source(), &DecodeRequest::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::InvalidResult);
    assert_eq!(tracker.count(|e| matches!(e, Event::BufferRecycled(_))), 1);
    assert!(pipeline.pool().is_empty());
}

#[tokio::test]
async fn test_unreadable_bounds() {
    let decoder = Arc::new(
        ScriptedDecoder::jpeg(1, 1).with_bounds_error(PlatformError::FormatUnsupported("tga".into())),
    );
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 0);

    let err = pipeline
        .decode(&source(), &DecodeRequest::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::BoundsUnreadable);
    assert_eq!(decoder.call_count(), 0);
    assert_eq!(
        tracker.events(),
        vec![Event::DecodeFailed(DecodeErrorKind::BoundsUnreadable)]
    );
}

// =============================================================================
// Orientation
// =============================================================================

#[tokio::test]
async fn test_rotation_swaps_buffer_and_marks_processed() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(40, 30).with_orientation(ExifOrientation::Rotate90));
    let (pipeline, tracker) = scripted_pipeline(decoder, 1024 * 1024);

    let bitmap = pipeline
        .decode(&source(), &DecodeRequest::new())
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();

    assert_eq!((bitmap.attrs.width, bitmap.attrs.height), (30, 40));
    assert_eq!((bitmap.buffer.width(), bitmap.buffer.height()), (30, 40));
    assert!(bitmap.processed);
    // Upright top-left pixel is the stored bottom-left pixel
    assert_eq!(bitmap.buffer.pixels()[0], gradient(0, 29));
    // The unrotated buffer was handed back to the pool
    assert_eq!(pipeline.pool().len(), 1);
    assert!(tracker.events().is_empty());
}

#[tokio::test]
async fn test_flip_is_in_place() {
    let decoder = Arc::new(
        ScriptedDecoder::jpeg(40, 30).with_orientation(ExifOrientation::FlipHorizontal),
    );
    let (pipeline, _tracker) = scripted_pipeline(decoder, 1024 * 1024);

    let bitmap = pipeline
        .decode(&source(), &DecodeRequest::new())
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();
    assert_eq!((bitmap.buffer.width(), bitmap.buffer.height()), (40, 30));
    assert_eq!(bitmap.buffer.pixels()[0], gradient(39, 0));
    assert!(pipeline.pool().is_empty());
}

#[tokio::test]
async fn test_orientation_sizing_uses_upright_dimensions() {
    // Stored 3000x4000, upright 4000x3000
    let decoder = Arc::new(
        ScriptedDecoder::jpeg(3000, 4000).with_orientation(ExifOrientation::Rotate270),
    );
    let (pipeline, _tracker) = scripted_pipeline(decoder, 0);

    let request = DecodeRequest::new().with_target(1000, 750);
    let bitmap = pipeline
        .decode(&source(), &request)
        .await
        .unwrap()
        .into_bitmap()
        .unwrap();
    assert_eq!(bitmap.sample_factor, 4);
    assert_eq!((bitmap.buffer.width(), bitmap.buffer.height()), (1000, 750));
}

#[tokio::test]
async fn test_recycled_during_orientation_is_hard_failure() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(40, 30).with_orientation(ExifOrientation::Rotate180));
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    let pipeline = pipeline.with_corrector(Arc::new(RecyclingCorrector));

    let err = pipeline
        .decode(&source(), &DecodeRequest::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DecodeError::CorrectOrientationFailed {
            orientation: ExifOrientation::Rotate180,
            ..
        }
    ));
    // No second decode attempt
    assert_eq!(decoder.call_count(), 1);
    assert_eq!(tracker.count(|e| matches!(e, Event::BufferRecycled(_))), 1);
    assert_eq!(
        tracker.count(|e| *e == Event::DecodeFailed(DecodeErrorKind::CorrectOrientationFailed)),
        1
    );
    assert!(pipeline.pool().is_empty());
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_before_decode_skips_decoder() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(400, 300));
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    pipeline.pool().put(rgba(400, 300));

    let cancel = CancelToken::new();
    cancel.cancel();
    let request = DecodeRequest::new().with_cancel_token(cancel);
    let err = pipeline.decode(&source(), &request).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(decoder.call_count(), 0);
    assert_eq!(pipeline.pool().len(), 1);
    assert!(tracker.events().is_empty());
}

#[tokio::test]
async fn test_cancel_during_decode_discards_result() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let decoder = Arc::new(ScriptedDecoder::jpeg(400, 300).on_decode(move || trigger.cancel()));
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    pipeline.pool().put(rgba(400, 300));

    let request = DecodeRequest::new().with_cancel_token(cancel);
    let err = pipeline.decode(&source(), &request).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(decoder.call_count(), 1);
    // The buffer the decoder wrote into is released, not surfaced
    assert_eq!(pipeline.pool().len(), 1);
    assert!(tracker.events().is_empty());
}

#[tokio::test]
async fn test_cancel_during_failed_attempt_skips_retry() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let decoder = Arc::new(
        ScriptedDecoder::jpeg(400, 300)
            .with_script([Outcome::Fail(PlatformError::BufferMismatch("stride".into()))])
            .on_decode(move || trigger.cancel()),
    );
    let (pipeline, tracker) = scripted_pipeline(decoder.clone(), 1024 * 1024);
    pipeline.pool().put(rgba(400, 300));

    let request = DecodeRequest::new().with_cancel_token(cancel);
    let err = pipeline.decode(&source(), &request).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(decoder.call_count(), 1);
    // The rejected buffer is still reported and discarded
    assert_eq!(tracker.count(|e| matches!(e, Event::InvalidReuseBuffer(_))), 1);
    assert_eq!(tracker.count(|e| matches!(e, Event::DecodeFailed(_))), 0);
    assert_eq!(pipeline.pool().stats().discarded, 1);
    assert!(pipeline.pool().is_empty());
}

// =============================================================================
// Real Decoder
// =============================================================================

#[tokio::test]
async fn test_decoding_twice_without_reuse_is_idempotent() {
    let pool = Arc::new(PixelBufferPool::with_budget(1024 * 1024));
    let pipeline = DecodePipeline::new(Arc::new(ImageCrateDecoder::new()), pool)
        .with_tracker(RecordingTracker::new());
    let source = MemorySource::new(create_test_png(120, 80), "mem://same.png");
    let request = DecodeRequest::new()
        .with_target(30, 20)
        .with_reuse_disabled(true);

    let first = pipeline.decode(&source, &request).await.unwrap().into_bitmap().unwrap();
    let second = pipeline.decode(&source, &request).await.unwrap().into_bitmap().unwrap();

    assert_eq!(first.attrs, second.attrs);
    assert_eq!(first.buffer.pixels(), second.buffer.pixels());
}

#[tokio::test]
async fn test_real_jpeg_reuses_returned_buffer() {
    let pool = Arc::new(PixelBufferPool::with_budget(1024 * 1024));
    let pipeline = DecodePipeline::new(Arc::new(ImageCrateDecoder::new()), Arc::clone(&pool))
        .with_tracker(RecordingTracker::new());
    let source = MemorySource::new(create_test_jpeg(64, 64), "mem://photo.jpg");
    let request = DecodeRequest::new().with_target(32, 32);

    let first = pipeline.decode(&source, &request).await.unwrap().into_bitmap().unwrap();
    assert_eq!(first.buffer.width(), 32);
    assert!(pool.put(first.buffer));

    let second = pipeline.decode(&source, &request).await.unwrap().into_bitmap().unwrap();
    assert_eq!(second.buffer.width(), 32);
    assert_eq!(pool.stats().hits, 1);
    assert!(pool.is_empty());
}

#[test]
fn test_decode_bytes_is_synchronous_entry_point() {
    let decoder = Arc::new(ScriptedDecoder::jpeg(400, 300));
    let (pipeline, _tracker) = scripted_pipeline(decoder.clone(), 0);

    let result = pipeline
        .decode_bytes("mem://sync", Bytes::from_static(b"scripted"), &DecodeRequest::new())
        .unwrap();
    assert!(result.into_bitmap().is_some());
    assert_eq!(decoder.bounds_reads(), 1);
}
