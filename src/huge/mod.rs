//! Huge-image support.
//!
//! Images whose bounds exceed the decode ceiling are decoded piecewise. The
//! [`TileDecodeCoordinator`] keeps a prioritized working set of [`Tile`]s
//! around the viewport and decodes each through the regular pipeline.
//!
//! # Components
//!
//! - [`Rect`]: half-open pixel rectangle
//! - [`Tile`] / [`TileState`]: tile snapshots handed to callers
//! - [`TileComparator`]: scheduling order, [`ViewportProximity`] by default
//! - [`TileDecodeCoordinator`]: working set, scheduling and eviction

mod coordinator;
mod ordering;
mod tile;

pub use coordinator::{
    sample_for_zoom, TileDecodeCoordinator, TileDecodeSummary, TileOptions, DEFAULT_TILE_MARGIN,
    DEFAULT_TILE_SIZE, DEFAULT_TILE_WORKERS,
};
pub use ordering::{sort_tiles, SortFailure, SortOutcome, TileComparator, ViewportProximity};
pub use tile::{Rect, Tile, TileState};
