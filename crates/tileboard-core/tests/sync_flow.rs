mod common;

use common::block_on;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tileboard_core::remote::{DocumentKey, from_document};
use tileboard_core::storage::{BOARD_BACKUP_KEY, DisplayPreferences, FileStore, KeyValueStore};
use tileboard_core::sync::UserDocument;
use tileboard_core::{
    AuxRecord, BoardConfig, BoardState, Footprint, MemoryRemoteStore, SyncConfig, SyncEngine,
    SyncStatus, WidgetKind,
};

const DEBOUNCE: Duration = Duration::from_millis(500);

fn stored_board(remote: &MemoryRemoteStore, owner: &str) -> Option<tileboard_core::BoardSnapshot> {
    let document = remote.document(&DocumentKey::user(owner))?;
    from_document::<UserDocument>(document).ok()?.board
}

#[test]
fn three_rapid_mutations_produce_one_write_with_final_state() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::new(remote.clone(), SyncConfig::default());
    let mut board = BoardState::new(BoardConfig::default());

    engine.sign_in("alice", &mut board);
    block_on(engine.load(&mut board)).unwrap();

    let start = Instant::now();
    let notes = board.add_widget(WidgetKind::NotesSection, Footprint::default()).unwrap();
    block_on(engine.poll_at(start, &board)).unwrap();
    board
        .upsert_record("notes", AuxRecord::new("n1", json!({ "text": "milk" })))
        .unwrap();
    block_on(engine.poll_at(start + Duration::from_millis(100), &board)).unwrap();
    board.move_widget(&notes.id, 2).unwrap();
    let last = start + Duration::from_millis(200);
    block_on(engine.poll_at(last, &board)).unwrap();

    assert!(remote.writes().is_empty());
    assert!(block_on(engine.poll_at(last + DEBOUNCE, &board)).unwrap());

    assert_eq!(remote.writes_to(&DocumentKey::user("alice")).len(), 1);
    let stored = stored_board(&remote, "alice").unwrap();
    assert_eq!(stored, board.snapshot());
    assert_eq!(stored.widgets[0].origin_col, 2);
    assert_eq!(stored.collections["notes"].len(), 1);
    assert_eq!(engine.status(), SyncStatus::Synced);
}

#[test]
fn switching_identity_never_leaks_edits_into_the_next_record() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::new(remote.clone(), SyncConfig::default());
    let mut board = BoardState::new(BoardConfig::default());

    engine.sign_in("alice", &mut board);
    block_on(engine.load(&mut board)).unwrap();
    let start = Instant::now();
    board.add_widget(WidgetKind::MedicineReminder, Footprint::default()).unwrap();
    block_on(engine.poll_at(start, &board)).unwrap();

    // Bob takes over before Alice's debounce fires.
    engine.sign_in("bob", &mut board);
    assert!(board.widgets().is_empty());
    block_on(engine.load(&mut board)).unwrap();
    board.add_widget(WidgetKind::MarketList, Footprint::default()).unwrap();
    assert!(block_on(engine.flush(&board)).unwrap());

    assert!(remote.writes_to(&DocumentKey::user("alice")).is_empty());
    let bob = stored_board(&remote, "bob").unwrap();
    assert_eq!(bob.widgets.len(), 1);
    assert_eq!(bob.widgets[0].kind, WidgetKind::MarketList);
    assert_eq!(engine.identity().as_deref(), Some("bob"));
}

#[test]
fn second_device_loads_what_the_first_pushed() {
    let remote = Arc::new(MemoryRemoteStore::new());

    let laptop = SyncEngine::new(remote.clone(), SyncConfig::default());
    let mut laptop_board = BoardState::new(BoardConfig::default());
    laptop.sign_in("alice", &mut laptop_board);
    block_on(laptop.load(&mut laptop_board)).unwrap();
    laptop_board.add_widget(WidgetKind::GoogleCalendar, Footprint::new(4, 3)).unwrap();
    laptop_board.add_widget(WidgetKind::NotesSection, Footprint::default()).unwrap();
    block_on(laptop.flush(&laptop_board)).unwrap();

    let phone = SyncEngine::new(remote.clone(), SyncConfig::default());
    let mut phone_board = BoardState::new(BoardConfig::default());
    phone.sign_in("alice", &mut phone_board);
    block_on(phone.load(&mut phone_board)).unwrap();

    assert_eq!(phone_board.snapshot(), laptop_board.snapshot());
    assert_eq!(phone.last_synced_at(), laptop.last_synced_at());
}

#[test]
fn offline_push_keeps_a_local_backup() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::new(remote.clone(), SyncConfig::default()).with_cache(cache.clone());
    let mut board = BoardState::new(BoardConfig::default());

    engine.sign_in("alice", &mut board);
    block_on(engine.load(&mut board)).unwrap();
    remote.set_failing(true);
    board.add_widget(WidgetKind::NotesSection, Footprint::default()).unwrap();
    assert!(block_on(engine.flush(&board)).is_err());
    assert_eq!(engine.status(), SyncStatus::Error);
    assert!(engine.has_pending_changes(&board));

    // A restarted process on the same device can show the last state.
    let reopened: Arc<FileStore> = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());
    let restarted = SyncEngine::new(remote, SyncConfig::default()).with_cache(reopened);
    assert_eq!(restarted.restore_backup(), Some(board.snapshot()));
}

#[test]
fn sign_out_clears_backup_but_keeps_display_preferences() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::new(remote, SyncConfig::default()).with_cache(cache.clone());
    let mut board = BoardState::new(BoardConfig::default());

    let preferences = DisplayPreferences {
        compact: true,
        ..Default::default()
    };
    assert!(preferences.save(cache.as_ref()));

    engine.sign_in("alice", &mut board);
    block_on(engine.load(&mut board)).unwrap();
    assert!(cache.get(BOARD_BACKUP_KEY).unwrap().is_some());

    engine.sign_out(&mut board);
    assert!(cache.get(BOARD_BACKUP_KEY).unwrap().is_none());
    assert!(DisplayPreferences::load(cache.as_ref()).compact);
}
