//! Widgets placed on the grid and the registry of known widget kinds.
//!
//! Widgets are pure data: an id, a kind key, a rectangle on the grid and an
//! opaque per-kind payload. What a kind looks like and how big it starts is
//! resolved through [`KindRegistry`], never through the widget itself.

use crate::grid::{Footprint, GridModel, TileCoord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable string key identifying a tool kind.
///
/// Unknown keys are preserved verbatim so that boards written by newer
/// clients round-trip and can render as "unavailable".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WidgetKind {
    MarketList,
    MedicineReminder,
    NotesSection,
    GoogleCalendar,
    IfoodHelper,
    Unknown(String),
}

impl WidgetKind {
    pub fn as_str(&self) -> &str {
        match self {
            WidgetKind::MarketList => "market-list",
            WidgetKind::MedicineReminder => "medicine-reminder",
            WidgetKind::NotesSection => "notes-section",
            WidgetKind::GoogleCalendar => "google-calendar",
            WidgetKind::IfoodHelper => "ifood-helper",
            WidgetKind::Unknown(key) => key,
        }
    }

    /// Check if this kind is one of the built-in tools.
    pub fn is_known(&self) -> bool {
        !matches!(self, WidgetKind::Unknown(_))
    }
}

impl From<&str> for WidgetKind {
    fn from(key: &str) -> Self {
        match key {
            "market-list" => WidgetKind::MarketList,
            "medicine-reminder" => WidgetKind::MedicineReminder,
            "notes-section" => WidgetKind::NotesSection,
            "google-calendar" => WidgetKind::GoogleCalendar,
            "ifood-helper" => WidgetKind::IfoodHelper,
            other => WidgetKind::Unknown(other.to_string()),
        }
    }
}

impl From<String> for WidgetKind {
    fn from(key: String) -> Self {
        WidgetKind::from(key.as_str())
    }
}

impl From<WidgetKind> for String {
    fn from(kind: WidgetKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A widget placed on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    /// Unique, stable identifier.
    pub id: String,
    pub kind: WidgetKind,
    pub origin_row: usize,
    pub origin_col: usize,
    pub width: usize,
    pub height: usize,
    /// Per-kind data, transported opaquely.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Widget {
    /// Create a widget with a fresh id and an empty payload.
    pub fn new(kind: WidgetKind, origin: TileCoord, size: Footprint) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            origin_row: origin.row,
            origin_col: origin.col,
            width: size.width,
            height: size.height,
            payload: serde_json::Value::Null,
        }
    }

    pub fn origin(&self) -> TileCoord {
        TileCoord::new(self.origin_row, self.origin_col)
    }

    pub fn footprint(&self) -> Footprint {
        Footprint::new(self.width, self.height)
    }

    /// Row-major index of the top-left tile.
    pub fn origin_index(&self, grid: &GridModel) -> usize {
        grid.coord_to_index(self.origin())
    }

    pub(crate) fn set_origin(&mut self, origin: TileCoord) {
        self.origin_row = origin.row;
        self.origin_col = origin.col;
    }

    pub(crate) fn set_footprint(&mut self, size: Footprint) {
        self.width = size.width;
        self.height = size.height;
    }
}

/// Display metadata and defaults for one widget kind.
#[derive(Debug, Clone, PartialEq)]
pub struct KindSpec {
    pub kind: WidgetKind,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: String,
    pub default_footprint: Footprint,
}

impl KindSpec {
    fn builtin(
        kind: WidgetKind,
        name: &str,
        description: &str,
        icon: &str,
        category: &str,
        default_footprint: Footprint,
    ) -> Self {
        Self {
            kind,
            name: name.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            category: category.to_string(),
            default_footprint,
        }
    }
}

/// Outcome of looking a kind up in the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KindResolution<'a> {
    Available(&'a KindSpec),
    /// Render an explicit placeholder instead of failing the layout.
    Unavailable,
}

/// Maps kind keys to their metadata and default footprints.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    specs: Vec<KindSpec>,
}

impl KindRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in tools.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(KindSpec::builtin(
            WidgetKind::MarketList,
            "Market List Maker",
            "Create and manage shopping lists with easy organization",
            "🛒",
            "Organization",
            Footprint::default(),
        ));
        registry.register(KindSpec::builtin(
            WidgetKind::MedicineReminder,
            "Medicine Reminder",
            "Track medications, schedules, and dosages",
            "💊",
            "Health",
            Footprint::default(),
        ));
        registry.register(KindSpec::builtin(
            WidgetKind::NotesSection,
            "Notes Section",
            "Quick notes and reminders for daily tasks",
            "📝",
            "Organization",
            Footprint::default(),
        ));
        registry.register(KindSpec::builtin(
            WidgetKind::GoogleCalendar,
            "Google Calendar",
            "Embed your calendar in week, month or agenda view",
            "📅",
            "Productivity",
            Footprint::new(4, 3),
        ));
        registry.register(KindSpec::builtin(
            WidgetKind::IfoodHelper,
            "iFood Helper",
            "Keep favorite restaurants and dishes one click away",
            "🍔",
            "Food",
            Footprint::new(2, 2),
        ));
        registry
    }

    /// Register or replace a kind.
    pub fn register(&mut self, spec: KindSpec) {
        if let Some(existing) = self.specs.iter_mut().find(|s| s.kind == spec.kind) {
            *existing = spec;
        } else {
            self.specs.push(spec);
        }
    }

    pub fn resolve(&self, kind: &WidgetKind) -> KindResolution<'_> {
        match self.specs.iter().find(|s| &s.kind == kind) {
            Some(spec) => KindResolution::Available(spec),
            None => KindResolution::Unavailable,
        }
    }

    /// Default footprint for a kind, or the board default when unregistered.
    pub fn default_footprint(&self, kind: &WidgetKind) -> Footprint {
        match self.resolve(kind) {
            KindResolution::Available(spec) => spec.default_footprint,
            KindResolution::Unavailable => Footprint::default(),
        }
    }

    /// All registered kinds, in registration order.
    pub fn catalog(&self) -> &[KindSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
