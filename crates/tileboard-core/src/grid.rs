//! Fixed-size tile grid: occupancy and placement queries.
//!
//! The grid never owns widgets. Every query takes the current widget list and
//! recomputes occupancy from it, so there is no free-list to keep in sync.

use crate::widget::Widget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of tile columns on a board.
pub const GRID_COLUMNS: usize = 4;

/// Number of tile rows on a board.
pub const GRID_ROWS: usize = 8;

/// A tile position on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub row: usize,
    pub col: usize,
}

impl TileCoord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Width and height of a widget, in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    pub width: usize,
    pub height: usize,
}

impl Footprint {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

impl Default for Footprint {
    fn default() -> Self {
        Self::new(2, 3)
    }
}

/// Geometry of a fixed W×H tile grid.
///
/// Tiles are addressed either by [`TileCoord`] or by a row-major index
/// (`index = row * columns + col`). All queries are total: out-of-range sizes
/// are clamped and out-of-bounds tiles are ignored rather than reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridModel {
    columns: usize,
    rows: usize,
}

impl Default for GridModel {
    fn default() -> Self {
        Self::new(GRID_COLUMNS, GRID_ROWS)
    }
}

impl GridModel {
    /// Create a grid with the given dimensions (each at least 1).
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.columns * self.rows
    }

    /// Convert a row-major index to a coordinate.
    pub fn index_to_coord(&self, index: usize) -> TileCoord {
        TileCoord::new(index / self.columns, index % self.columns)
    }

    /// Convert a coordinate to a row-major index.
    ///
    /// Saturates for coordinates far off the grid instead of overflowing.
    pub fn coord_to_index(&self, coord: TileCoord) -> usize {
        coord
            .row
            .saturating_mul(self.columns)
            .saturating_add(coord.col)
    }

    /// Check whether a coordinate lies on the grid.
    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.row < self.rows && coord.col < self.columns
    }

    /// Clamp a footprint to `1..=columns` × `1..=rows`.
    pub fn clamp(&self, size: Footprint) -> Footprint {
        Footprint::new(
            size.width.clamp(1, self.columns),
            size.height.clamp(1, self.rows),
        )
    }

    /// Indices of every on-grid tile covered by a footprint at `origin`.
    ///
    /// The rectangle is clipped to the grid first, so any size is accepted.
    pub fn footprint_tiles(&self, origin: TileCoord, size: Footprint) -> Vec<usize> {
        let rows = origin.row..origin.row.saturating_add(size.height).min(self.rows);
        let cols = origin.col..origin.col.saturating_add(size.width).min(self.columns);
        let mut tiles = Vec::with_capacity(rows.len() * cols.len());
        for row in rows {
            for col in cols.clone() {
                tiles.push(self.coord_to_index(TileCoord::new(row, col)));
            }
        }
        tiles
    }

    /// Set of tiles covered by any widget. Off-grid parts are dropped.
    pub fn occupied_tiles(&self, widgets: &[Widget]) -> BTreeSet<usize> {
        self.occupied_excluding(widgets, None)
    }

    fn occupied_excluding(&self, widgets: &[Widget], excluding: Option<&str>) -> BTreeSet<usize> {
        widgets
            .iter()
            .filter(|w| excluding != Some(w.id.as_str()))
            .flat_map(|w| self.footprint_tiles(w.origin(), w.footprint()))
            .collect()
    }

    /// Tiles claimed by more than one widget.
    pub fn overlapping_tiles(&self, widgets: &[Widget]) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut overlaps = BTreeSet::new();
        for widget in widgets {
            for tile in self.footprint_tiles(widget.origin(), widget.footprint()) {
                if !seen.insert(tile) {
                    overlaps.insert(tile);
                }
            }
        }
        overlaps
    }

    /// Whether a footprint at `index` stays on the grid and avoids `occupied`.
    fn fits(&self, occupied: &BTreeSet<usize>, index: usize, size: Footprint) -> bool {
        if index >= self.tile_count() {
            return false;
        }
        let origin = self.index_to_coord(index);
        if origin.row + size.height > self.rows || origin.col + size.width > self.columns {
            return false;
        }
        self.footprint_tiles(origin, size)
            .iter()
            .all(|tile| !occupied.contains(tile))
    }

    /// First top-left index, in row-major scan order, where `size` fits.
    ///
    /// Returns `None` when the grid has no room.
    pub fn find_first_fit(&self, widgets: &[Widget], size: Footprint) -> Option<usize> {
        let size = self.clamp(size);
        let occupied = self.occupied_tiles(widgets);
        (0..self.tile_count()).find(|&index| self.fits(&occupied, index, size))
    }

    /// Whether a widget of `size` can sit at `target`, ignoring the widget
    /// with id `excluding` (the one being moved or resized).
    pub fn can_place(
        &self,
        widgets: &[Widget],
        excluding: Option<&str>,
        target: usize,
        size: Footprint,
    ) -> bool {
        let size = self.clamp(size);
        let occupied = self.occupied_excluding(widgets, excluding);
        self.fits(&occupied, target, size)
    }
}
