//! Failure reporting.
//!
//! The pipeline and the tile coordinator report every failure they observe to
//! an [`ErrorTracker`]. Trackers are sinks: their methods return nothing and
//! must not panic back into the caller. Each report carries a
//! [`FailureContext`] with the source identity, the declared image geometry
//! and a snapshot of pool memory at the time of the failure.

use serde::Serialize;
use tracing::warn;

use crate::error::{DecodeError, PlatformError, TileSortError};
use crate::huge::{Rect, Tile};
use crate::pool::BufferInfo;

/// Pool memory at the time of a failure.
///
/// `max` is the pool budget, `total` the bytes currently parked idle, and
/// `free` the headroom left before the pool starts evicting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    pub free: usize,
    pub total: usize,
    pub max: usize,
}

/// What was being decoded when a failure happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureContext {
    pub source_id: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub sample_factor: u32,
    pub memory: MemorySnapshot,
}

/// Sink for structured failure events.
///
/// Every method has an empty default so implementations only override the
/// events they care about.
pub trait ErrorTracker: Send + Sync {
    /// A decode request failed terminally.
    fn on_decode_failed(&self, _context: &FailureContext, _error: &DecodeError) {}

    /// A buffer was found recycled while the pipeline still owned it.
    fn on_buffer_recycled_unexpectedly(&self, _context: &FailureContext, _buffer: &BufferInfo) {}

    /// Tile ordering failed and the coordinator fell back.
    fn on_tile_sort_failed(&self, _tiles: &[Tile], _used_fallback: bool, _error: &TileSortError) {
    }

    /// The decoder refused a reuse buffer; a retry without reuse follows.
    fn on_invalid_reuse_buffer(
        &self,
        _context: &FailureContext,
        _buffer: &BufferInfo,
        _error: &PlatformError,
    ) {
    }

    /// A single tile failed to decode.
    fn on_decode_region_failed(&self, _context: &FailureContext, _rect: Rect, _error: &DecodeError) {
    }
}

/// Tracker that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopErrorTracker;

impl ErrorTracker for NoopErrorTracker {}

/// Tracker that writes every event to the `tracing` log at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorTracker;

impl ErrorTracker for LoggingErrorTracker {
    fn on_decode_failed(&self, context: &FailureContext, error: &DecodeError) {
        warn!(
            source = %context.source_id,
            width = context.width,
            height = context.height,
            mime = %context.mime_type,
            sample = context.sample_factor,
            free = context.memory.free,
            total = context.memory.total,
            max = context.memory.max,
            "Decode failed: {}",
            error
        );
    }

    fn on_buffer_recycled_unexpectedly(&self, context: &FailureContext, buffer: &BufferInfo) {
        warn!(
            source = %context.source_id,
            buffer_width = buffer.width,
            buffer_height = buffer.height,
            config = %buffer.config,
            "Buffer recycled while owned by the decode pipeline"
        );
    }

    fn on_tile_sort_failed(&self, tiles: &[Tile], used_fallback: bool, error: &TileSortError) {
        let listing = tiles
            .iter()
            .map(|tile| tile.source_rect.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            tiles = tiles.len(),
            used_fallback,
            "Tile sort failed: {} [{}]",
            error,
            listing
        );
    }

    fn on_invalid_reuse_buffer(
        &self,
        context: &FailureContext,
        buffer: &BufferInfo,
        error: &PlatformError,
    ) {
        warn!(
            source = %context.source_id,
            width = context.width,
            height = context.height,
            mime = %context.mime_type,
            sample = context.sample_factor,
            buffer_width = buffer.width,
            buffer_height = buffer.height,
            buffer_bytes = buffer.allocation_byte_count,
            config = %buffer.config,
            free = context.memory.free,
            max = context.memory.max,
            "Reuse buffer rejected: {}",
            error
        );
    }

    fn on_decode_region_failed(&self, context: &FailureContext, rect: Rect, error: &DecodeError) {
        warn!(
            source = %context.source_id,
            width = context.width,
            height = context.height,
            mime = %context.mime_type,
            rect = %rect,
            sample = context.sample_factor,
            "Region decode failed: {}",
            error
        );
    }
}
