//! Board state: the authoritative in-memory widget collection for one board.

use crate::grid::{Footprint, GridModel};
use crate::snapshot::{AuxRecord, BoardSnapshot, Collections};
use crate::widget::{Widget, WidgetKind};
use thiserror::Error;

/// Board mutation errors. None of them leave the board modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("Placement conflict: no room for a {width}x{height} widget{}", at_index(.index))]
    PlacementConflict {
        index: Option<usize>,
        width: usize,
        height: usize,
    },
    #[error("Board is read-only")]
    ReadOnly,
    #[error("Widget not found: {0}")]
    WidgetNotFound(String),
}

fn at_index(index: &Option<usize>) -> String {
    index.map(|i| format!(" at tile {i}")).unwrap_or_default()
}

/// Result type for board operations.
pub type BoardResult<T> = Result<T, BoardError>;

/// What to do when a new widget finds no free spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullGridPolicy {
    /// Refuse the add with [`BoardError::PlacementConflict`].
    #[default]
    Reject,
    /// Place at tile 0 and accept the visual overlap.
    OverlapAtOrigin,
}

/// Board configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardConfig {
    pub grid: GridModel,
    pub full_grid_policy: FullGridPolicy,
}

/// Widgets and auxiliary records of one board.
///
/// A board is either editable (the owner's own) or read-only (opened from a
/// share). Both expose the same query surface; read-only boards reject every
/// mutation with [`BoardError::ReadOnly`].
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    config: BoardConfig,
    widgets: Vec<Widget>,
    collections: Collections,
    read_only: bool,
    /// Bumped after every successful change.
    revision: u64,
}

impl BoardState {
    /// Create an empty editable board.
    pub fn new(config: BoardConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Create an editable board from a snapshot.
    pub fn from_snapshot(snapshot: BoardSnapshot, config: BoardConfig) -> Self {
        Self {
            config,
            widgets: snapshot.widgets,
            collections: snapshot.collections,
            read_only: false,
            revision: 0,
        }
    }

    /// Create a frozen board from a snapshot.
    pub fn read_only(snapshot: BoardSnapshot, config: BoardConfig) -> Self {
        Self {
            read_only: true,
            ..Self::from_snapshot(snapshot, config)
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn grid(&self) -> &GridModel {
        &self.config.grid
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Widgets in placement order.
    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn widget(&self, id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == id)
    }

    pub fn widget_by_kind(&self, kind: &WidgetKind) -> Option<&Widget> {
        self.widgets.iter().find(|w| &w.kind == kind)
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    /// Records of one collection; empty when the collection does not exist.
    pub fn records(&self, collection: &str) -> &[AuxRecord] {
        self.collections.get(collection).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Deep copy of the current state.
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            widgets: self.widgets.clone(),
            collections: self.collections.clone(),
        }
    }

    fn ensure_writable(&self) -> BoardResult<()> {
        if self.read_only {
            log::debug!("Rejected mutation on read-only board");
            return Err(BoardError::ReadOnly);
        }
        Ok(())
    }

    fn position(&self, id: &str) -> BoardResult<usize> {
        self.widgets
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| BoardError::WidgetNotFound(id.to_string()))
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Add a widget of `kind` at the first free spot.
    ///
    /// Only one widget per kind is allowed: if one exists it is returned
    /// unchanged.
    pub fn add_widget(&mut self, kind: WidgetKind, size: Footprint) -> BoardResult<Widget> {
        self.ensure_writable()?;

        if let Some(existing) = self.widget_by_kind(&kind) {
            return Ok(existing.clone());
        }

        let grid = self.config.grid;
        let size = grid.clamp(size);
        let index = match grid.find_first_fit(&self.widgets, size) {
            Some(index) => index,
            None => match self.config.full_grid_policy {
                FullGridPolicy::Reject => {
                    return Err(BoardError::PlacementConflict {
                        index: None,
                        width: size.width,
                        height: size.height,
                    });
                }
                FullGridPolicy::OverlapAtOrigin => {
                    log::warn!("Grid full, placing {} at tile 0", kind);
                    0
                }
            },
        };

        let widget = Widget::new(kind, grid.index_to_coord(index), size);
        log::debug!("Added {} widget {} at tile {}", widget.kind, widget.id, index);
        self.widgets.push(widget.clone());
        self.touch();
        Ok(widget)
    }

    /// Remove a widget. Its tiles become free immediately.
    pub fn remove_widget(&mut self, id: &str) -> BoardResult<Widget> {
        self.ensure_writable()?;
        let position = self.position(id)?;
        let removed = self.widgets.remove(position);
        self.touch();
        Ok(removed)
    }

    /// Move a widget so its top-left tile is `target`.
    pub fn move_widget(&mut self, id: &str, target: usize) -> BoardResult<()> {
        self.ensure_writable()?;
        let position = self.position(id)?;
        let grid = self.config.grid;
        let size = self.widgets[position].footprint();

        if !grid.can_place(&self.widgets, Some(id), target, size) {
            return Err(BoardError::PlacementConflict {
                index: Some(target),
                width: size.width,
                height: size.height,
            });
        }

        self.widgets[position].set_origin(grid.index_to_coord(target));
        self.touch();
        Ok(())
    }

    /// Resize a widget in place. The origin never moves; if the new size
    /// does not fit there the resize is rejected.
    pub fn resize_widget(&mut self, id: &str, size: Footprint) -> BoardResult<()> {
        self.ensure_writable()?;
        let position = self.position(id)?;
        let grid = self.config.grid;
        let size = grid.clamp(size);
        let origin = self.widgets[position].origin_index(&grid);

        if !grid.can_place(&self.widgets, Some(id), origin, size) {
            return Err(BoardError::PlacementConflict {
                index: Some(origin),
                width: size.width,
                height: size.height,
            });
        }

        self.widgets[position].set_footprint(size);
        self.touch();
        Ok(())
    }

    /// Replace a widget's payload.
    pub fn set_payload(&mut self, id: &str, payload: serde_json::Value) -> BoardResult<()> {
        self.ensure_writable()?;
        let position = self.position(id)?;
        self.widgets[position].payload = payload;
        self.touch();
        Ok(())
    }

    /// Insert or replace a record in a collection.
    pub fn upsert_record(&mut self, collection: &str, record: AuxRecord) -> BoardResult<()> {
        self.ensure_writable()?;
        let records = self.collections.entry(collection.to_string()).or_default();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.touch();
        Ok(())
    }

    /// Remove a record. The collection itself stays, possibly empty.
    pub fn remove_record(&mut self, collection: &str, id: &str) -> BoardResult<Option<AuxRecord>> {
        self.ensure_writable()?;
        let Some(records) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(position) = records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let removed = records.remove(position);
        self.touch();
        Ok(Some(removed))
    }

    /// Swap in a whole snapshot, used when remote state takes over.
    pub(crate) fn replace_snapshot(&mut self, snapshot: BoardSnapshot) {
        self.widgets = snapshot.widgets;
        self.collections = snapshot.collections;
        self.touch();
    }

    /// Drop all content, used on identity change.
    pub(crate) fn reset(&mut self) {
        self.widgets.clear();
        self.collections.clear();
        self.touch();
    }

    /// Re-place a widget that was created elsewhere at the first free spot,
    /// keeping its id, size and payload. Skipped when its kind is already on
    /// the board or there is no room.
    pub(crate) fn adopt_widget(&mut self, mut widget: Widget) -> bool {
        if self.widget_by_kind(&widget.kind).is_some() {
            return false;
        }
        let grid = self.config.grid;
        let size = grid.clamp(widget.footprint());
        let Some(index) = grid.find_first_fit(&self.widgets, size) else {
            log::warn!("No room to keep buffered {} widget {}", widget.kind, widget.id);
            return false;
        };
        widget.set_footprint(size);
        widget.set_origin(grid.index_to_coord(index));
        self.widgets.push(widget);
        self.touch();
        true
    }
}
