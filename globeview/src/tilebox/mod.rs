//! Tile index box algebra.
//!
//! A [`TileIndexBox`] is a half-open rectangle of tile indices at one zoom
//! level. Boxes produced from viewport bounds may sit outside the nominal
//! `[0, 2^z)` period (antimeridian wraparound, pole mirroring), so every
//! comparison first reconciles the two boxes:
//!
//! 1. **Zoom**: the coarser box is rescaled by `2^(z_high - z_low)`. The
//!    integer indices are multiplied directly, never re-derived from
//!    longitudes, so repeated rescales do not accumulate float error.
//! 2. **Wraparound**: per axis, if one range sits a full period away from
//!    the other, it is shifted by `±2^z` into the same frame.
//!
//! Zoom 0 is special-cased: the single root tile contains and overlaps
//! everything.

use std::collections::HashSet;
use std::fmt;

use crate::coord::{tiles_per_axis, TileAddress};

/// Half-open integer tile rectangle `[start, end)` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndexBox {
    pub start_x: i64,
    pub start_y: i64,
    pub end_x: i64,
    pub end_y: i64,
    pub zoom: u8,
}

impl TileIndexBox {
    pub const fn new(start_x: i64, start_y: i64, end_x: i64, end_y: i64, zoom: u8) -> Self {
        Self {
            start_x,
            start_y,
            end_x,
            end_y,
            zoom,
        }
    }

    /// The full grid at `zoom`.
    pub fn full(zoom: u8) -> Self {
        let n = tiles_per_axis(zoom);
        Self::new(0, 0, n, n, zoom)
    }

    /// A single tile.
    pub fn of_tile(tile: &TileAddress) -> Self {
        Self::new(tile.x, tile.y, tile.x + 1, tile.y + 1, tile.zoom)
    }

    #[inline]
    pub fn period(&self) -> i64 {
        tiles_per_axis(self.zoom)
    }

    #[inline]
    pub fn width(&self) -> i64 {
        (self.end_x - self.start_x).max(0)
    }

    #[inline]
    pub fn height(&self) -> i64 {
        (self.end_y - self.start_y).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Number of index cells, counting unnormalized cells separately.
    pub fn tile_count(&self) -> u64 {
        (self.width() as u64) * (self.height() as u64)
    }

    /// Grows the box by `margin` tiles on every side.
    ///
    /// Columns may leave the period (they wrap on iteration); rows are
    /// clamped to the grid.
    pub fn expand(&self, margin: u32) -> Self {
        let m = margin as i64;
        let n = self.period();
        let width = (self.width() + 2 * m).min(n);
        let start_x = if width == n {
            self.start_x.rem_euclid(n)
        } else {
            self.start_x - m
        };
        Self::new(
            start_x,
            (self.start_y - m).max(0.min(self.start_y)),
            start_x + width,
            (self.end_y + m).min(n.max(self.end_y)),
            self.zoom,
        )
    }

    /// True when the tile lies in the box, allowing for column wraparound.
    pub fn contains_tile(&self, tile: &TileAddress) -> bool {
        contain(self, &Self::of_tile(tile))
    }

    /// Iterates the distinct normalized tiles covered by the box.
    ///
    /// Columns wrap modulo `2^z`. Rows outside the grid (produced by pole
    /// mirroring) are skipped: the longitude span of a pole-covering box
    /// already includes the tiles on the far side of the pole.
    pub fn tiles(&self) -> impl Iterator<Item = TileAddress> + '_ {
        let n = self.period();
        let width = self.width().min(n);
        let rows = self.start_y.max(0)..self.end_y.min(n);
        let zoom = self.zoom;
        let start_x = self.start_x;
        rows.flat_map(move |y| {
            (0..width).map(move |dx| TileAddress::unchecked((start_x + dx).rem_euclid(n), y, zoom))
        })
    }

    /// Tiles in `self` that `previous` did not cover.
    ///
    /// `previous` may be at a different zoom; it is reconciled first.
    pub fn difference(&self, previous: &TileIndexBox) -> Vec<TileAddress> {
        let prev = update_zoom(previous, self.zoom);
        let known: HashSet<TileAddress> = prev.tiles().collect();
        self.tiles().filter(|t| !known.contains(t)).collect()
    }
}

impl fmt::Display for TileIndexBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z{} x[{}, {}) y[{}, {})",
            self.zoom, self.start_x, self.end_x, self.start_y, self.end_y
        )
    }
}

/// Rescales a box to `zoom`.
///
/// Going finer multiplies indices by `2^(zoom - box.zoom)`. Going coarser
/// divides, rounding the start down and the end up so the result still
/// covers the original.
pub fn update_zoom(b: &TileIndexBox, zoom: u8) -> TileIndexBox {
    if zoom >= b.zoom {
        let f = 1_i64 << (zoom - b.zoom);
        TileIndexBox::new(b.start_x * f, b.start_y * f, b.end_x * f, b.end_y * f, zoom)
    } else {
        let f = 1_i64 << (b.zoom - zoom);
        let ceil_div = |v: i64| -((-v).div_euclid(f));
        TileIndexBox::new(
            b.start_x.div_euclid(f),
            b.start_y.div_euclid(f),
            ceil_div(b.end_x),
            ceil_div(b.end_y),
            zoom,
        )
    }
}

/// Shifts a box so that its start lies in `[0, 2^z)` on both axes.
pub fn normalize(b: &TileIndexBox) -> TileIndexBox {
    let n = b.period();
    let dx = b.start_x.rem_euclid(n) - b.start_x;
    let dy = b.start_y.rem_euclid(n) - b.start_y;
    TileIndexBox::new(
        b.start_x + dx,
        b.start_y + dy,
        b.end_x + dx,
        b.end_y + dy,
        b.zoom,
    )
}

/// Brings two same-zoom 1-D ranges into one frame.
///
/// When one range starts before 0 (or ends past `period`) and the other lies
/// entirely on the opposite side of it, the other range is a full period
/// away and gets shifted back. Returns the adjusted `(a, b)` ranges.
pub fn synchronize_tile_line(
    a: (i64, i64),
    b: (i64, i64),
    period: i64,
) -> ((i64, i64), (i64, i64)) {
    let ((a0, a1), (b0, b1)) = (a, b);
    if a0 < 0 && b0 >= a1 {
        ((a0, a1), (b0 - period, b1 - period))
    } else if a1 > period && b1 <= a0 {
        ((a0, a1), (b0 + period, b1 + period))
    } else if b0 < 0 && a0 >= b1 {
        ((a0 - period, a1 - period), (b0, b1))
    } else if b1 > period && a1 <= b0 {
        ((a0 + period, a1 + period), (b0, b1))
    } else {
        (a, b)
    }
}

/// Zoom and wraparound reconciliation of two boxes.
fn reconcile(a: &TileIndexBox, b: &TileIndexBox) -> (TileIndexBox, TileIndexBox) {
    let zoom = a.zoom.max(b.zoom);
    let a = update_zoom(a, zoom);
    let b = update_zoom(b, zoom);
    let period = tiles_per_axis(zoom);

    let ((ax0, ax1), (bx0, bx1)) =
        synchronize_tile_line((a.start_x, a.end_x), (b.start_x, b.end_x), period);
    let ((ay0, ay1), (by0, by1)) =
        synchronize_tile_line((a.start_y, a.end_y), (b.start_y, b.end_y), period);

    (
        TileIndexBox::new(ax0, ay0, ax1, ay1, zoom),
        TileIndexBox::new(bx0, by0, bx1, by1, zoom),
    )
}

/// True when `parent` covers `child` on both axes.
pub fn contain(parent: &TileIndexBox, child: &TileIndexBox) -> bool {
    if parent.zoom == 0 {
        return true;
    }
    let (p, c) = reconcile(parent, child);
    p.start_x <= c.start_x && p.end_x >= c.end_x && p.start_y <= c.start_y && p.end_y >= c.end_y
}

/// True when the boxes share interior on both axes. Touching edges do not
/// count.
pub fn overlap(a: &TileIndexBox, b: &TileIndexBox) -> bool {
    if a.zoom == 0 || b.zoom == 0 {
        return true;
    }
    let (a, b) = reconcile(a, b);
    a.start_x.max(b.start_x) < a.end_x.min(b.end_x)
        && a.start_y.max(b.start_y) < a.end_y.min(b.end_y)
}

/// The normalized overlap of two boxes, or `None` when disjoint.
pub fn intersect(a: &TileIndexBox, b: &TileIndexBox) -> Option<TileIndexBox> {
    if a.zoom == 0 {
        return Some(normalize(b));
    }
    if b.zoom == 0 {
        return Some(normalize(a));
    }
    let (a, b) = reconcile(a, b);
    let out = TileIndexBox::new(
        a.start_x.max(b.start_x),
        a.start_y.max(b.start_y),
        a.end_x.min(b.end_x),
        a.end_y.min(b.end_y),
        a.zoom,
    );
    if out.is_empty() {
        None
    } else {
        Some(normalize(&out))
    }
}
