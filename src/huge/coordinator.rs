//! Tile decode coordinator for huge images.
//!
//! A huge image is never handed out as one full-size buffer. The coordinator
//! keeps a working set of tiles around the current viewport, decodes each one
//! independently through the [`DecodePipeline`] and hands their buffers back
//! to the pool when they leave the working set.
//!
//! The encoded stream is parsed at most once per coordinator: the first
//! `decode_pending` asks the platform decoder for a [`RegionDecoder`] and all
//! tiles are cut from it. Decoders without one fall back to per-tile region
//! decodes of the encoded bytes.
//!
//! # Tile Grid
//!
//! Tiles cover `tile_size * sample_factor` source pixels per side, so every
//! decoded tile is about `tile_size` pixels wide regardless of zoom:
//!
//! ```text
//!   source image
//!   ┌──────┬──────┬──────┬──────┬───┐
//!   │      │ ···· │ ···· │      │   │    ···· retained (viewport + margin)
//!   ├──────┼──────┼──────┼──────┼───┤
//!   │ ···· │ ████ │ ████ │ ···· │   │    ████ intersects the viewport
//!   ├──────┼──────┼──────┼──────┼───┤
//!   │      │ ···· │ ···· │      │   │
//!   └──────┴──────┴──────┴──────┴───┘
//! ```
//!
//! Tiles work in stored pixel coordinates; EXIF orientation is not applied
//! to them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::ordering::{sort_tiles, TileComparator, ViewportProximity};
use super::tile::{Rect, Tile, TileState};
use crate::decode::{CancelToken, DecodePipeline, ImageBounds, RegionDecoder};
use crate::error::DecodeError;
use crate::pool::PixelBuffer;

/// Default tile side in decoded pixels
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default retained margin around the viewport, as a fraction of its size
pub const DEFAULT_TILE_MARGIN: f32 = 0.5;

/// Default number of tiles decoded concurrently
pub const DEFAULT_TILE_WORKERS: usize = 4;

const MAX_TILE_SAMPLE_FACTOR: u32 = 1 << 16;

// =============================================================================
// Options
// =============================================================================

/// Settings of a tile coordinator.
#[derive(Debug, Clone)]
pub struct TileOptions {
    /// Tile side in decoded pixels
    pub tile_size: u32,

    /// Retained margin around the viewport, as a fraction of its size
    pub margin: f32,

    /// Maximum concurrent tile decodes
    pub workers: usize,

    /// Retry a failed sort once with a stable sort before using insertion order
    pub stable_sort_fallback: bool,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            margin: DEFAULT_TILE_MARGIN,
            workers: DEFAULT_TILE_WORKERS,
            stable_sort_fallback: true,
        }
    }
}

/// Counts of one `decode_pending` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TileDecodeSummary {
    pub decoded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

// =============================================================================
// State
// =============================================================================

struct TileSlot {
    tile: Tile,
    buffer: Option<PixelBuffer>,
    cancel: CancelToken,
}

struct CoordinatorState {
    /// Retained tiles in insertion order
    slots: Vec<TileSlot>,
    sample_factor: u32,
    next_id: u64,
}

impl CoordinatorState {
    /// Remove slots failing `keep`, cancelling them and collecting their buffers.
    fn evict(&mut self, released: &mut Vec<PixelBuffer>, keep: impl Fn(&Tile) -> bool) {
        self.slots.retain_mut(|slot| {
            if keep(&slot.tile) {
                return true;
            }
            slot.cancel.cancel();
            released.extend(slot.buffer.take());
            false
        });
    }
}

// =============================================================================
// Tile Decode Coordinator
// =============================================================================

/// Decodes the visible part of a huge image tile by tile.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use pixreuse::decode::{DecodePipeline, DecodeRequest, ImageCrateDecoder};
/// use pixreuse::huge::Rect;
/// use pixreuse::io::FileSource;
/// use pixreuse::pool::PixelBufferPool;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = DecodePipeline::new(
///     Arc::new(ImageCrateDecoder::new()),
///     Arc::new(PixelBufferPool::new()),
/// );
/// let request = DecodeRequest::new().with_huge_image(true);
/// let result = pipeline.decode(&FileSource::new("panorama.png"), &request).await?;
/// if let Some(coordinator) = result.into_regions() {
///     let tiles = coordinator.update_tiles(Rect::new(0, 0, 2048, 1536), 0.25);
///     let summary = coordinator.decode_pending().await;
///     println!("{} tiles, {} decoded", tiles.len(), summary.decoded);
/// }
/// # Ok(())
/// # }
/// ```
pub struct TileDecodeCoordinator {
    source_id: String,
    data: Bytes,
    bounds: ImageBounds,
    pipeline: DecodePipeline,
    comparator: Arc<dyn TileComparator>,
    options: TileOptions,
    state: Mutex<CoordinatorState>,
    /// Shared region decoder, prepared on the first decode pass
    prepared: OnceCell<Option<Arc<dyn RegionDecoder>>>,
}

impl TileDecodeCoordinator {
    /// Create a coordinator over already-loaded image bytes.
    ///
    /// Tile settings come from the pipeline options.
    pub fn new(
        source_id: impl Into<String>,
        data: Bytes,
        bounds: ImageBounds,
        pipeline: DecodePipeline,
    ) -> Self {
        let options = pipeline.options().tiles.clone();
        Self {
            source_id: source_id.into(),
            data,
            bounds,
            pipeline,
            comparator: Arc::new(ViewportProximity),
            options,
            state: Mutex::new(CoordinatorState {
                slots: Vec::new(),
                sample_factor: 1,
                next_id: 0,
            }),
            prepared: OnceCell::new(),
        }
    }

    /// Replace the tile ordering.
    pub fn with_comparator(mut self, comparator: Arc<dyn TileComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn bounds(&self) -> &ImageBounds {
        &self.bounds
    }

    pub fn pipeline(&self) -> &DecodePipeline {
        &self.pipeline
    }

    /// Sample factor of the current tile grid.
    pub fn sample_factor(&self) -> u32 {
        self.lock().sample_factor
    }

    /// Recompute the working set for `viewport` (stored coordinates) at `zoom`.
    ///
    /// Tiles outside the viewport plus margin are evicted and their buffers
    /// returned to the pool. Missing tiles intersecting the viewport are
    /// created as pending. Returns every retained tile, highest priority
    /// first. A failed sort is reported and degrades the order but never
    /// drops tiles.
    pub fn update_tiles(&self, viewport: Rect, zoom: f32) -> Vec<Tile> {
        let sample = sample_for_zoom(zoom);
        let image = Rect::from_size(self.bounds.width, self.bounds.height);
        let visible = viewport.intersect(&image);

        let mut released = Vec::new();
        let (ordered, snapshot, failure) = {
            let mut state = self.lock();

            if state.sample_factor != sample {
                debug!(
                    source = %self.source_id,
                    from = state.sample_factor,
                    to = sample,
                    "Tile sample factor changed, dropping tiles"
                );
                state.evict(&mut released, |_| false);
                state.sample_factor = sample;
            }

            let Some(visible) = visible else {
                state.evict(&mut released, |_| false);
                drop(state);
                self.release(released);
                return Vec::new();
            };

            let dx = (visible.width() as f32 * self.options.margin) as u32;
            let dy = (visible.height() as f32 * self.options.margin) as u32;
            let retained = visible.expand(dx, dy);
            state.evict(&mut released, |tile| tile.source_rect.intersects(&retained));

            let side = self.options.tile_size.max(1).saturating_mul(sample);
            for row in visible.top / side..=(visible.bottom - 1) / side {
                for col in visible.left / side..=(visible.right - 1) / side {
                    let rect = Rect::new(
                        col * side,
                        row * side,
                        col.saturating_add(1).saturating_mul(side).min(image.right),
                        row.saturating_add(1).saturating_mul(side).min(image.bottom),
                    );
                    if state.slots.iter().any(|slot| slot.tile.source_rect == rect) {
                        continue;
                    }
                    let id = state.next_id;
                    state.next_id += 1;
                    state.slots.push(TileSlot {
                        tile: Tile {
                            id,
                            source_rect: rect,
                            sample_factor: sample,
                            priority: 0,
                            state: TileState::Pending,
                        },
                        buffer: None,
                        cancel: CancelToken::new(),
                    });
                }
            }

            let snapshot: Vec<Tile> = state.slots.iter().map(|slot| slot.tile.clone()).collect();
            let outcome = sort_tiles(
                &snapshot,
                &visible,
                self.comparator.as_ref(),
                self.options.stable_sort_fallback,
            );
            for (rank, &index) in outcome.order.iter().enumerate() {
                state.slots[index].tile.priority = rank as u32;
            }
            let ordered = outcome
                .order
                .iter()
                .map(|&index| state.slots[index].tile.clone())
                .collect::<Vec<_>>();
            (ordered, snapshot, outcome.failure)
        };

        self.release(released);

        if let Some(failure) = failure {
            warn!(
                source = %self.source_id,
                tiles = snapshot.len(),
                used_fallback = failure.used_fallback,
                "Tile sort failed: {}",
                failure.error
            );
            self.pipeline
                .tracker()
                .on_tile_sort_failed(&snapshot, failure.used_fallback, &failure.error);
        }

        ordered
    }

    /// Decode every pending tile, highest priority first.
    ///
    /// Tiles decode on the blocking thread pool with at most `workers` in
    /// flight. A failing tile is marked failed and reported without
    /// affecting its siblings. Results of tiles evicted meanwhile go back to
    /// the pool.
    pub async fn decode_pending(&self) -> TileDecodeSummary {
        let (jobs, sample) = {
            let mut state = self.lock();
            let sample = state.sample_factor;
            let mut pending: Vec<&mut TileSlot> = state
                .slots
                .iter_mut()
                .filter(|slot| slot.tile.state == TileState::Pending)
                .collect();
            pending.sort_by_key(|slot| slot.tile.priority);
            let jobs = pending
                .into_iter()
                .map(|slot| {
                    slot.tile.state = TileState::Decoding;
                    (slot.tile.id, slot.tile.source_rect, slot.cancel.clone())
                })
                .collect::<Vec<_>>();
            (jobs, sample)
        };

        let mut summary = TileDecodeSummary::default();
        if jobs.is_empty() {
            return summary;
        }

        let prepared = self.region_decoder().await;
        let context = self
            .pipeline
            .failure_context(&self.source_id, Some(&self.bounds), sample);
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut set = JoinSet::new();
        let job_ids: Vec<u64> = jobs.iter().map(|(id, _, _)| *id).collect();

        for (id, rect, cancel) in jobs {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let pipeline = self.pipeline.clone();
            let data = self.data.clone();
            let bounds = self.bounds.clone();
            let context = context.clone();
            let prepared = prepared.clone();
            set.spawn_blocking(move || {
                let _permit = permit;
                let result = pipeline.decode_tile(
                    &data,
                    prepared.as_deref(),
                    &bounds,
                    rect,
                    sample,
                    &cancel,
                    &context,
                );
                (id, rect, result)
            });
        }

        let mut finished = Vec::with_capacity(job_ids.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, rect, result)) => {
                    finished.push(id);
                    self.apply_result(id, rect, result, &mut summary);
                }
                Err(e) => warn!(source = %self.source_id, "Tile decode task failed: {}", e),
            }
        }

        // Tiles whose task never reported back
        let mut state = self.lock();
        for slot in state.slots.iter_mut() {
            if job_ids.contains(&slot.tile.id)
                && !finished.contains(&slot.tile.id)
                && slot.tile.state == TileState::Decoding
            {
                slot.tile.state = TileState::Failed;
                summary.failed += 1;
            }
        }
        drop(state);

        debug!(
            source = %self.source_id,
            decoded = summary.decoded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Tile decode pass finished"
        );
        summary
    }

    /// The platform's shared region decoder for this image, prepared once.
    ///
    /// A failed preparation is logged and leaves tiles on the per-tile path,
    /// where each failure is reported against its own rectangle.
    async fn region_decoder(&self) -> Option<Arc<dyn RegionDecoder>> {
        self.prepared
            .get_or_init(|| async {
                let decoder = Arc::clone(self.pipeline.decoder());
                let data = self.data.clone();
                match tokio::task::spawn_blocking(move || decoder.region_decoder(&data)).await {
                    Ok(Ok(prepared)) => prepared,
                    Ok(Err(e)) => {
                        warn!(source = %self.source_id, "Cannot prepare region decoder: {}", e);
                        None
                    }
                    Err(e) => {
                        warn!(source = %self.source_id, "Region decoder task failed: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    fn apply_result(
        &self,
        id: u64,
        rect: Rect,
        result: Result<PixelBuffer, DecodeError>,
        summary: &mut TileDecodeSummary,
    ) {
        let mut released = None;
        let mut failure = None;
        {
            let mut state = self.lock();
            match state.slots.iter_mut().find(|slot| slot.tile.id == id) {
                None => {
                    // Evicted while decoding
                    released = result.ok();
                    summary.cancelled += 1;
                }
                Some(slot) => match result {
                    Ok(buffer) if slot.cancel.is_cancelled() => {
                        released = Some(buffer);
                        slot.tile.state = TileState::Pending;
                        summary.cancelled += 1;
                    }
                    Ok(buffer) => {
                        slot.buffer = Some(buffer);
                        slot.tile.state = TileState::Decoded;
                        summary.decoded += 1;
                    }
                    Err(e) if e.is_cancelled() => {
                        slot.tile.state = TileState::Pending;
                        summary.cancelled += 1;
                    }
                    Err(e) => {
                        slot.tile.state = TileState::Failed;
                        summary.failed += 1;
                        failure = Some(e);
                    }
                },
            }
        }

        if let Some(buffer) = released {
            self.pipeline.pool().put(buffer);
        }
        if let Some(error) = failure {
            let context = self.pipeline.failure_context(
                &self.source_id,
                Some(&self.bounds),
                self.sample_factor(),
            );
            self.pipeline
                .tracker()
                .on_decode_region_failed(&context, rect, &error);
        }
    }

    /// Snapshot of retained tiles, highest priority first.
    pub fn tiles(&self) -> Vec<Tile> {
        let mut tiles: Vec<Tile> = self.lock().slots.iter().map(|slot| slot.tile.clone()).collect();
        tiles.sort_by_key(|tile| tile.priority);
        tiles
    }

    /// Run `f` on a decoded tile's pixels.
    ///
    /// Returns `None` if the tile is not retained or not decoded.
    pub fn with_tile_buffer<R>(&self, id: u64, f: impl FnOnce(&Tile, &PixelBuffer) -> R) -> Option<R> {
        let state = self.lock();
        let slot = state.slots.iter().find(|slot| slot.tile.id == id)?;
        let buffer = slot.buffer.as_ref()?;
        Some(f(&slot.tile, buffer))
    }

    /// Drop every tile, returning decoded buffers to the pool.
    pub fn release_all(&self) {
        let mut released = Vec::new();
        self.lock().evict(&mut released, |_| false);
        self.release(released);
    }

    fn release(&self, buffers: Vec<PixelBuffer>) {
        for buffer in buffers {
            self.pipeline.pool().put(buffer);
        }
    }
}

impl Drop for TileDecodeCoordinator {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for TileDecodeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileDecodeCoordinator")
            .field("source_id", &self.source_id)
            .field("bounds", &self.bounds)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Largest power-of-two sample factor not exceeding `1 / zoom`.
pub fn sample_for_zoom(zoom: f32) -> u32 {
    if !zoom.is_finite() || zoom <= 0.0 {
        warn!(zoom, "Invalid zoom factor, using full resolution");
        return 1;
    }
    let inverse = 1.0 / zoom;
    let mut sample = 1u32;
    while sample < MAX_TILE_SAMPLE_FACTOR && (sample * 2) as f32 <= inverse {
        sample *= 2;
    }
    sample
}
