//! Device-scoped display preferences kept in the local cache.

use super::{KeyValueStore, load_json, save_json};
use serde::{Deserialize, Serialize};

/// Key for [`DisplayPreferences`].
pub const PREFERENCES_KEY: &str = "display-preferences";

/// Size of the pop-out tool window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

/// Grid window and display preferences. Not tied to any identity, so they
/// survive sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayPreferences {
    pub window: WindowSettings,
    pub compact: bool,
}

impl DisplayPreferences {
    /// Load preferences, falling back to defaults when absent or unreadable.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match load_json(store, PREFERENCES_KEY) {
            Ok(Some(prefs)) => prefs,
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable display preferences: {}", e);
                Self::default()
            }
        }
    }

    /// Persist preferences. Failures are logged, never fatal.
    pub fn save(&self, store: &dyn KeyValueStore) -> bool {
        match save_json(store, PREFERENCES_KEY, self) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to save display preferences: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_defaults_when_absent() {
        let store = MemoryStore::new();
        let prefs = DisplayPreferences::load(&store);
        assert_eq!(prefs.window, WindowSettings { width: 1200, height: 800 });
        assert!(!prefs.compact);
    }

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let prefs = DisplayPreferences {
            window: WindowSettings { width: 640, height: 480 },
            compact: true,
        };
        assert!(prefs.save(&store));
        assert_eq!(DisplayPreferences::load(&store), prefs);
    }

    #[test]
    fn test_corrupt_value_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(PREFERENCES_KEY, "][").unwrap();
        assert_eq!(DisplayPreferences::load(&store), DisplayPreferences::default());
    }

    #[test]
    fn test_partial_value_keeps_defaults() {
        let store = MemoryStore::new();
        store.set(PREFERENCES_KEY, "{\"compact\":true}").unwrap();
        let prefs = DisplayPreferences::load(&store);
        assert!(prefs.compact);
        assert_eq!(prefs.window, WindowSettings::default());
    }
}
