//! Tileboard Core Library
//!
//! Fixed-grid widget placement, offline-first synchronization of an owner's
//! board and read-only sharing of board snapshots.

pub mod board;
pub mod grid;
pub mod remote;
pub mod share;
pub mod snapshot;
pub mod storage;
pub mod sync;
pub mod widget;

pub use board::{BoardConfig, BoardError, BoardState, FullGridPolicy};
pub use grid::{Footprint, GridModel, TileCoord, GRID_COLUMNS, GRID_ROWS};
pub use remote::{DocumentKey, MemoryRemoteStore, RemoteError, RemoteStore, Subscription, WriteMode};
pub use share::{LaunchMode, ShareError, ShareGrant, ShareManager, ShareRef, share_url};
pub use snapshot::{AuxRecord, BoardSnapshot, MergePolicy};
pub use storage::{DisplayPreferences, FileStore, KeyValueStore, MemoryStore, StorageError};
pub use sync::{SessionPhase, SyncConfig, SyncEngine, SyncError, SyncRecord, SyncStatus};
pub use widget::{KindRegistry, KindResolution, KindSpec, Widget, WidgetKind};
