//! Tile scheduling order.
//!
//! Tiles closest to the viewport center decode first; among equally close
//! tiles the smaller (cheaper) one wins. Sorting never loses tiles: if the
//! comparator fails, the order degrades to a stable sort or to insertion
//! order.

use std::cmp::Ordering;
use std::panic::{self, AssertUnwindSafe};

use super::tile::{Rect, Tile};
use crate::error::TileSortError;

/// Strict total order over tiles for a given viewport.
pub trait TileComparator: Send + Sync {
    fn compare(&self, a: &Tile, b: &Tile, viewport: &Rect) -> Result<Ordering, TileSortError>;
}

/// Default comparator: distance to viewport center, then area, then position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewportProximity;

impl ViewportProximity {
    fn distance2(rect: &Rect, viewport: &Rect) -> u128 {
        let (cx, cy) = rect.center2();
        let (vx, vy) = viewport.center2();
        let dx = cx.abs_diff(vx) as u128;
        let dy = cy.abs_diff(vy) as u128;
        dx * dx + dy * dy
    }
}

impl TileComparator for ViewportProximity {
    fn compare(&self, a: &Tile, b: &Tile, viewport: &Rect) -> Result<Ordering, TileSortError> {
        for tile in [a, b] {
            if tile.source_rect.is_empty() {
                return Err(TileSortError::DegenerateTile(format!(
                    "tile {} has empty rect {}",
                    tile.id, tile.source_rect
                )));
            }
        }
        Ok(Self::distance2(&a.source_rect, viewport)
            .cmp(&Self::distance2(&b.source_rect, viewport))
            .then_with(|| a.source_rect.area().cmp(&b.source_rect.area()))
            .then_with(|| {
                (a.source_rect.top, a.source_rect.left).cmp(&(b.source_rect.top, b.source_rect.left))
            })
            .then_with(|| a.id.cmp(&b.id)))
    }
}

/// A recovered sort failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortFailure {
    /// Error of the primary sort
    pub error: TileSortError,

    /// Whether the stable fallback sort produced the final order
    pub used_fallback: bool,
}

/// Final order of one scheduling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOutcome {
    /// Indices into the input slice, highest priority first
    pub order: Vec<usize>,

    pub failure: Option<SortFailure>,
}

/// Order `tiles` for `viewport`.
///
/// The result always holds every index exactly once.
pub fn sort_tiles(
    tiles: &[Tile],
    viewport: &Rect,
    comparator: &dyn TileComparator,
    stable_fallback: bool,
) -> SortOutcome {
    let error = match try_sort(tiles, viewport, comparator, false) {
        Ok(order) => {
            return SortOutcome {
                order,
                failure: None,
            }
        }
        Err(error) => error,
    };

    if stable_fallback {
        if let Ok(order) = try_sort(tiles, viewport, comparator, true) {
            return SortOutcome {
                order,
                failure: Some(SortFailure {
                    error,
                    used_fallback: true,
                }),
            };
        }
    }

    SortOutcome {
        order: (0..tiles.len()).collect(),
        failure: Some(SortFailure {
            error,
            used_fallback: false,
        }),
    }
}

fn try_sort(
    tiles: &[Tile],
    viewport: &Rect,
    comparator: &dyn TileComparator,
    stable: bool,
) -> Result<Vec<usize>, TileSortError> {
    let mut order: Vec<usize> = (0..tiles.len()).collect();
    let mut failure: Option<TileSortError> = None;

    let sorted = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut cmp = |a: &usize, b: &usize| {
            match comparator.compare(&tiles[*a], &tiles[*b], viewport) {
                Ok(ordering) => ordering,
                Err(e) => {
                    failure.get_or_insert(e);
                    Ordering::Equal
                }
            }
        };
        if stable {
            order.sort_by(&mut cmp);
        } else {
            order.sort_unstable_by(&mut cmp);
        }
    }));

    if let Err(payload) = sorted {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        return Err(TileSortError::Panicked(message));
    }
    match failure {
        Some(error) => Err(error),
        None => Ok(order),
    }
}
