//! Pixel buffer reuse.
//!
//! Decoding allocates large pixel buffers. On memory-constrained devices the
//! churn of allocating and freeing them causes both latency spikes and
//! out-of-memory failures, so finished buffers are parked in a pool and handed
//! to later decodes that can write into them in place.
//!
//! # Ownership
//!
//! A buffer is owned by exactly one of:
//!
//! ```text
//!   ┌──────────────┐   get()    ┌──────────────┐  result   ┌──────────┐
//!   │  pool idle   │ ─────────▶ │ in-flight    │ ────────▶ │  caller  │
//!   │     set      │ ◀───────── │ decode run   │           │          │
//!   └──────────────┘   put()    └──────────────┘           └──────────┘
//!          ▲                                                     │
//!          └─────────────────────── put() ───────────────────────┘
//! ```
//!
//! Transitions move the `PixelBuffer` value, so two owners can never hold the
//! same buffer. The recycled flag covers the remaining hazard: a buffer freed
//! through a [`RecycleHandle`] while someone else still holds it.
//!
//! # Components
//!
//! - [`PixelBuffer`]: pixel allocation with dimensions, config and recycled flag
//! - [`PixelBufferPool`]: byte-budgeted, size-classed idle set
//! - [`PoolKey`]: size class used for matching

mod buffer;
mod cache;

pub use buffer::{
    pack_rgb565, unpack_rgb565, BufferInfo, PixelBuffer, PixelConfig, PoolKey, RecycleHandle,
};
pub use cache::{PixelBufferPool, PoolStats, DEFAULT_POOL_BUDGET};
