//! Tile geometry and snapshots.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

// =============================================================================
// Rect
// =============================================================================

/// Half-open pixel rectangle `[left, right) x [top, bottom)`.
///
/// A rectangle whose right or bottom edge lies before its left or top edge
/// is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    /// Create a rectangle; inverted edges collapse to an empty rectangle.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right: right.max(left),
            bottom: bottom.max(top),
        }
    }

    /// Rectangle at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Center scaled by two, so it stays integral.
    pub fn center2(&self) -> (u64, u64) {
        (
            self.left as u64 + self.right as u64,
            self.top as u64 + self.bottom as u64,
        )
    }

    /// Overlapping part of two rectangles, if any.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!rect.is_empty()).then_some(rect)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }

    /// Grow by `dx` horizontally and `dy` vertically on each side, saturating.
    pub fn expand(&self, dx: u32, dy: u32) -> Rect {
        Rect::new(
            self.left.saturating_sub(dx),
            self.top.saturating_sub(dy),
            self.right.saturating_add(dx),
            self.bottom.saturating_add(dy),
        )
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{},{},{}]", self.left, self.top, self.right, self.bottom)
    }
}

impl FromStr for Rect {
    type Err = String;

    /// Parse `left,top,right,bottom`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid rectangle '{}': {}", s, e))?;
        match parts[..] {
            [left, top, right, bottom] if right > left && bottom > top => {
                Ok(Rect::new(left, top, right, bottom))
            }
            [_, _, _, _] => Err(format!("rectangle '{}' is empty", s)),
            _ => Err(format!(
                "invalid rectangle '{}': expected left,top,right,bottom",
                s
            )),
        }
    }
}

// =============================================================================
// Tile
// =============================================================================

/// Lifecycle state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TileState {
    Pending,
    Decoding,
    Decoded,
    Failed,
}

/// Snapshot of one tile of a huge image.
///
/// Tiles are handed out by value; the coordinator keeps the live state and
/// the decoded buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub id: u64,

    /// Region of the stored image this tile covers
    pub source_rect: Rect,

    pub sample_factor: u32,

    /// Rank in the current schedule (0 = decode first)
    pub priority: u32,

    pub state: TileState,
}
