mod common;

use common::block_on;
use std::sync::Arc;
use tileboard_core::remote::{DocumentKey, Namespace};
use tileboard_core::{
    BoardConfig, BoardError, BoardState, Footprint, LaunchMode, MemoryRemoteStore, ShareError,
    ShareManager, SyncConfig, SyncEngine, WidgetKind, share_url,
};
use url::Url;

#[test]
fn grant_is_frozen_and_survives_owner_edits() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::new(remote.clone(), SyncConfig::default());
    let shares = ShareManager::new(remote.clone());
    let mut board = BoardState::new(BoardConfig::default());

    engine.sign_in("alice", &mut board);
    block_on(engine.load(&mut board)).unwrap();
    board.add_widget(WidgetKind::NotesSection, Footprint::default()).unwrap();
    let published = board.snapshot();
    let grant = block_on(shares.create_grant("alice", &published)).unwrap();

    // Owner keeps editing and syncing.
    board.add_widget(WidgetKind::MarketList, Footprint::default()).unwrap();
    block_on(engine.flush(&board)).unwrap();

    assert_eq!(block_on(shares.resolve_grant(&grant.share_id)).unwrap(), published);
    let listed = block_on(shares.list_grants("alice")).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].share_id, grant.share_id);

    let owner_doc = remote.document(&DocumentKey::user("alice")).unwrap();
    assert!(owner_doc.contains_key("board"));
    assert!(owner_doc.contains_key("shares"));
}

#[test]
fn viewer_opens_link_read_only_without_a_session() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let shares = ShareManager::new(remote.clone());
    let mut owner_board = BoardState::new(BoardConfig::default());
    owner_board.add_widget(WidgetKind::IfoodHelper, Footprint::new(2, 2)).unwrap();
    let grant = block_on(shares.create_grant("alice", &owner_board.snapshot())).unwrap();

    let base = Url::parse("https://tiles.example/app").unwrap();
    let link = share_url(&base, &grant.share_id);
    let LaunchMode::Shared(share_id) = LaunchMode::from_url(&link) else {
        panic!("link should open in shared mode");
    };

    let mut viewer = block_on(shares.open_shared_board(&share_id, BoardConfig::default())).unwrap();
    assert!(viewer.is_read_only());
    assert_eq!(viewer.snapshot(), owner_board.snapshot());
    let widget_id = viewer.widgets()[0].id.clone();
    assert_eq!(viewer.move_widget(&widget_id, 2), Err(BoardError::ReadOnly));
    assert_eq!(viewer.remove_widget(&widget_id), Err(BoardError::ReadOnly));

    // Opening a share never writes to the viewer's or owner's private record.
    let private_writes = remote
        .writes()
        .into_iter()
        .filter(|(key, _)| key.namespace == Namespace::Users && key.id != "alice")
        .count();
    assert_eq!(private_writes, 0);
}

#[test]
fn revoked_and_unknown_links_are_distinguished() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let shares = ShareManager::new(remote);
    let board = BoardState::new(BoardConfig::default());
    let kept = block_on(shares.create_grant("alice", &board.snapshot())).unwrap();
    let revoked = block_on(shares.create_grant("alice", &board.snapshot())).unwrap();

    block_on(shares.revoke("alice", &revoked.share_id)).unwrap();

    assert!(block_on(shares.resolve_grant(&kept.share_id)).is_ok());
    assert!(matches!(
        block_on(shares.open_shared_board(&revoked.share_id, BoardConfig::default())),
        Err(ShareError::Disabled(_))
    ));
    assert!(matches!(
        block_on(shares.resolve_grant("alice_0_deadbeef")),
        Err(ShareError::NotFound(_))
    ));

    let listed = block_on(shares.list_grants("alice")).unwrap();
    let active: Vec<bool> = listed.iter().map(|s| s.active).collect();
    assert_eq!(active, vec![true, false]);
}
