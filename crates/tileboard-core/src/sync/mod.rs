//! Offline-first synchronization of one owner's board with the remote store.
//!
//! The engine is polled, like the autosave loop: callers mutate their
//! [`BoardState`] freely and call [`SyncEngine::poll`] from their event loop.
//! A push goes out once the board's revision has been quiet for the debounce
//! delay, and at most one push is in flight at a time.
//!
//! Every identity session gets a new generation number. Pull and push results
//! carry the generation they started in and are dropped if the session has
//! changed since, so one owner's data never lands in another owner's record.

mod record;

pub use record::{SessionPhase, SyncRecord, SyncStatus, UserDocument};

use crate::board::BoardState;
use crate::remote::{
    Document, DocumentKey, RemoteError, RemoteStore, Subscription, WriteMode, from_document,
};
use crate::snapshot::{BoardSnapshot, MergePolicy, merge_collections, now_ms};
use crate::storage::{BOARD_BACKUP_KEY, KeyValueStore, load_json, save_json};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default quiet period before a push.
pub const DEFAULT_PUSH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Sync errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("An identity is required")]
    IdentityRequired,
    #[error("Sync unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unavailable(msg) => SyncError::Unavailable(msg),
            RemoteError::Serialization(msg) => SyncError::Serialization(msg),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last mutation before pushing.
    pub push_debounce: Duration,
    /// Subscribe to the owner's document for multi-device refresh.
    pub live_refresh: bool,
    /// Mirror every pulled or pushed snapshot into the local cache.
    pub cache_backup: bool,
    /// How auxiliary records are reconciled on load.
    pub merge_policy: MergePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_debounce: DEFAULT_PUSH_DEBOUNCE,
            live_refresh: false,
            cache_backup: true,
            merge_policy: MergePolicy::default(),
        }
    }
}

/// Result of [`SyncEngine::pull`], applied with [`SyncEngine::apply_pull`].
#[derive(Debug, Clone)]
pub struct PulledSnapshot {
    generation: u64,
    document: Option<UserDocument>,
}

impl PulledSnapshot {
    /// The remote board, if the owner has one.
    pub fn snapshot(&self) -> Option<&BoardSnapshot> {
        self.document.as_ref()?.board.as_ref()
    }
}

struct PushTicket {
    generation: u64,
    key: DocumentKey,
    document: Document,
    snapshot: BoardSnapshot,
    revision: u64,
    pushed_at: i64,
}

/// Frees the in-flight slot when a push future is dropped before the
/// remote store answers.
struct InFlightGuard<'a> {
    state: &'a Mutex<EngineState>,
    generation: u64,
    settled: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation == self.generation && state.push_in_flight {
            log::debug!("Push abandoned before the remote store answered");
            state.push_in_flight = false;
            state.status = SyncStatus::LocalOnly;
            // The next poll sees a change and re-arms the debounce.
            state.seen_revision = state.pushed_revision;
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    identity: Option<String>,
    generation: u64,
    phase: SessionPhase,
    status: SyncStatus,
    /// Initial pull applied; pushes are allowed.
    loaded: bool,
    needs_pull: bool,
    /// Last revision a poll observed; a change restarts the debounce.
    seen_revision: u64,
    pushed_revision: u64,
    /// Revision whose push failed; not retried until the board changes.
    failed_revision: Option<u64>,
    deadline: Option<Instant>,
    push_in_flight: bool,
    last_synced_at: Option<i64>,
    last_error: Option<String>,
    subscription: Option<Subscription>,
}

/// Keeps one owner's board consistent with the remote store.
pub struct SyncEngine<R: RemoteStore> {
    remote: Arc<R>,
    cache: Option<Arc<dyn KeyValueStore>>,
    config: SyncConfig,
    state: Mutex<EngineState>,
    /// Remote updates delivered by the subscription, tagged with generation.
    incoming: Arc<Mutex<Vec<(u64, Document)>>>,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Create an engine with no identity.
    pub fn new(remote: Arc<R>, config: SyncConfig) -> Self {
        Self {
            remote,
            cache: None,
            config,
            state: Mutex::new(EngineState::default()),
            incoming: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Attach a local cache for snapshot backups.
    pub fn with_cache(mut self, cache: Arc<dyn KeyValueStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity(&self) -> Option<String> {
        self.lock().identity.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    pub fn status(&self) -> SyncStatus {
        self.lock().status
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn last_synced_at(&self) -> Option<i64> {
        self.lock().last_synced_at
    }

    /// Whether the session still needs its initial (or a re-triggered) pull.
    pub fn needs_pull(&self) -> bool {
        self.lock().needs_pull
    }

    /// Whether the board has changes the remote has not accepted yet.
    pub fn has_pending_changes(&self, board: &BoardState) -> bool {
        let state = self.lock();
        state.identity.is_some() && board.revision() != state.pushed_revision
    }

    /// Snapshot of the owner's record, `None` without an identity.
    pub fn record(&self, board: &BoardState) -> Option<SyncRecord> {
        let state = self.lock();
        let owner_id = state.identity.clone()?;
        Some(SyncRecord {
            owner_id,
            snapshot: board.snapshot(),
            last_synced_at: state.last_synced_at,
            sync_status: state.status,
        })
    }

    /// Start a session for `owner_id`.
    ///
    /// Signing in again as the same owner is a no-op. Switching owners ends
    /// the previous session first. The board is emptied: edits made before
    /// sign-in are not carried into the owner's record.
    pub fn sign_in(&self, owner_id: &str, board: &mut BoardState) {
        let mut state = self.lock();
        if state.identity.as_deref() == Some(owner_id) {
            return;
        }
        if state.identity.is_some() {
            self.end_session(&mut state, board);
        }

        board.reset();
        let revision = board.revision();
        let generation = state.generation + 1;
        *state = EngineState {
            identity: Some(owner_id.to_string()),
            generation,
            phase: SessionPhase::Loading,
            status: SyncStatus::Syncing,
            needs_pull: true,
            seen_revision: revision,
            pushed_revision: revision,
            ..Default::default()
        };
        if self.config.live_refresh {
            state.subscription = Some(self.subscribe(owner_id, generation));
        }
        log::info!("Signed in as {}, loading remote board", owner_id);
    }

    /// End the session: cancel pending work, drop the subscription, clear
    /// the board and the local backup.
    pub fn sign_out(&self, board: &mut BoardState) {
        let mut state = self.lock();
        if let Some(owner) = &state.identity {
            log::info!("Signing out {}", owner);
        }
        self.end_session(&mut state, board);
    }

    fn end_session(&self, state: &mut EngineState, board: &mut BoardState) {
        let generation = state.generation + 1;
        let subscription = state.subscription.take();
        *state = EngineState {
            generation,
            ..Default::default()
        };
        drop(subscription);
        self.incoming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        board.reset();
        self.clear_backup();
    }

    fn subscribe(&self, owner_id: &str, generation: u64) -> Subscription {
        let incoming = self.incoming.clone();
        self.remote.subscribe(
            &DocumentKey::user(owner_id),
            Box::new(move |document: &Document| {
                incoming
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((generation, document.clone()));
            }),
        )
    }

    /// Ask for another pull in the current session.
    pub fn request_pull(&self) {
        let mut state = self.lock();
        if state.identity.is_some() {
            state.needs_pull = true;
        }
    }

    /// Fetch the owner's remote document. Does not touch any board, so
    /// editing can continue while this is pending.
    pub async fn pull(&self) -> SyncResult<PulledSnapshot> {
        let (generation, key) = {
            let state = self.lock();
            let owner = state.identity.as_deref().ok_or(SyncError::IdentityRequired)?;
            (state.generation, DocumentKey::user(owner))
        };

        log::debug!("Pulling {}", key);
        let result = match self.remote.get(&key).await {
            Ok(Some(document)) => from_document::<UserDocument>(document)
                .map(Some)
                .map_err(SyncError::from),
            Ok(None) => Ok(None),
            Err(e) => Err(SyncError::from(e)),
        };

        match result {
            Ok(document) => Ok(PulledSnapshot { generation, document }),
            Err(e) => {
                log::warn!("Pull of {} failed: {}", key, e);
                let mut state = self.lock();
                if state.generation == generation {
                    state.phase = SessionPhase::Error;
                    state.status = SyncStatus::Error;
                    state.last_error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Apply a pulled document to the board.
    ///
    /// The remote board replaces the local one. Unpushed local edits are
    /// kept: their records are merged per id and their widgets re-placed if
    /// their kind is not already on the remote board. Returns `false` if the
    /// pull belongs to an ended session.
    pub fn apply_pull(&self, board: &mut BoardState, pulled: PulledSnapshot) -> bool {
        let mut state = self.lock();
        if state.identity.is_none() || state.generation != pulled.generation {
            log::debug!("Discarding pull from a previous session");
            return false;
        }

        let buffered = board.revision() != state.pushed_revision;
        let remote_board = pulled.document.as_ref().and_then(|d| d.board.clone());
        if let Some(remote) = remote_board {
            if buffered {
                let local = board.snapshot();
                let collections = merge_collections(
                    &local.collections,
                    &remote.collections,
                    self.config.merge_policy,
                );
                board.replace_snapshot(BoardSnapshot {
                    widgets: remote.widgets,
                    collections,
                });
                for widget in local.widgets {
                    board.adopt_widget(widget);
                }
            } else {
                board.replace_snapshot(remote);
            }
        }

        state.loaded = true;
        state.needs_pull = false;
        state.phase = SessionPhase::Synced;
        state.last_error = None;
        state.last_synced_at = pulled.document.as_ref().and_then(|d| d.last_synced_at);
        if buffered {
            // Leave the edits unpushed; the next poll arms the debounce.
            state.status = SyncStatus::LocalOnly;
        } else {
            state.pushed_revision = board.revision();
            state.seen_revision = board.revision();
            state.status = SyncStatus::Synced;
        }
        drop(state);

        self.backup(&board.snapshot());
        log::info!("Remote board loaded ({} widgets)", board.widgets().len());
        true
    }

    /// Pull and apply in one step, once per session unless
    /// [`request_pull`](Self::request_pull) asked for another round.
    pub async fn load(&self, board: &mut BoardState) -> SyncResult<bool> {
        {
            let state = self.lock();
            if state.identity.is_none() {
                return Err(SyncError::IdentityRequired);
            }
            if !state.needs_pull {
                return Ok(false);
            }
        }
        let pulled = self.pull().await?;
        Ok(self.apply_pull(board, pulled))
    }

    /// Push the board if it has been quiet for the debounce delay.
    pub async fn poll(&self, board: &BoardState) -> SyncResult<bool> {
        self.poll_at(Instant::now(), board).await
    }

    /// [`poll`](Self::poll) with an explicit clock reading.
    ///
    /// Returns `Ok(true)` when a push was accepted by the remote store.
    pub async fn poll_at(&self, now: Instant, board: &BoardState) -> SyncResult<bool> {
        let ticket = {
            let mut state = self.lock();
            if state.identity.is_none() || !state.loaded {
                return Ok(false);
            }
            let revision = board.revision();
            if revision != state.seen_revision {
                state.seen_revision = revision;
                state.deadline = Some(now + self.config.push_debounce);
            }
            if !state.deadline.is_some_and(|deadline| now >= deadline) {
                return Ok(false);
            }
            self.prepare_push(&mut state, board, false)?
        };

        match ticket {
            Some(ticket) => self.send(ticket).await,
            None => Ok(false),
        }
    }

    /// Push immediately, skipping the debounce. Retries a failed revision.
    pub async fn flush(&self, board: &BoardState) -> SyncResult<bool> {
        let ticket = {
            let mut state = self.lock();
            if state.identity.is_none() {
                return Err(SyncError::IdentityRequired);
            }
            if !state.loaded {
                return Ok(false);
            }
            state.seen_revision = board.revision();
            self.prepare_push(&mut state, board, true)?
        };

        match ticket {
            Some(ticket) => self.send(ticket).await,
            None => Ok(false),
        }
    }

    fn prepare_push(
        &self,
        state: &mut EngineState,
        board: &BoardState,
        retry_failed: bool,
    ) -> SyncResult<Option<PushTicket>> {
        let revision = board.revision();
        if state.push_in_flight
            || revision == state.pushed_revision
            || (!retry_failed && state.failed_revision == Some(revision))
        {
            return Ok(None);
        }
        let owner = state.identity.clone().ok_or(SyncError::IdentityRequired)?;

        let snapshot = board.snapshot();
        let pushed_at = now_ms();
        let mut document = Document::new();
        document.insert("board".to_string(), serde_json::to_value(&snapshot)?);
        document.insert("lastSyncedAt".to_string(), pushed_at.into());

        state.push_in_flight = true;
        state.deadline = None;
        state.status = SyncStatus::Syncing;
        Ok(Some(PushTicket {
            generation: state.generation,
            key: DocumentKey::user(&owner),
            document,
            snapshot,
            revision,
            pushed_at,
        }))
    }

    async fn send(&self, ticket: PushTicket) -> SyncResult<bool> {
        self.backup(&ticket.snapshot);
        log::debug!("Pushing revision {} to {}", ticket.revision, ticket.key);
        let mut guard = InFlightGuard {
            state: &self.state,
            generation: ticket.generation,
            settled: false,
        };
        let result = self
            .remote
            .set(&ticket.key, ticket.document, WriteMode::Merge)
            .await;

        let mut state = self.lock();
        guard.settled = true;
        if state.generation != ticket.generation {
            log::debug!("Dropping push result for {} from a previous session", ticket.key);
            return Ok(false);
        }
        state.push_in_flight = false;

        match result {
            Ok(()) => {
                state.pushed_revision = ticket.revision;
                state.failed_revision = None;
                state.phase = SessionPhase::Synced;
                state.status = SyncStatus::Synced;
                state.last_synced_at = Some(ticket.pushed_at);
                state.last_error = None;
                Ok(true)
            }
            Err(e) => {
                log::warn!("Push to {} failed: {}", ticket.key, e);
                state.failed_revision = Some(ticket.revision);
                state.phase = SessionPhase::Error;
                state.status = SyncStatus::Error;
                state.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Apply the newest update delivered by the live subscription.
    ///
    /// Skipped while local changes are pending: the next push overwrites the
    /// remote copy anyway.
    pub fn apply_remote_updates(&self, board: &mut BoardState) -> bool {
        let updates = {
            let mut incoming = self.incoming.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *incoming)
        };
        let mut state = self.lock();
        if state.identity.is_none() || !state.loaded {
            return false;
        }
        let generation = state.generation;
        let Some((_, document)) = updates.into_iter().rev().find(|(g, _)| *g == generation) else {
            return false;
        };
        if state.push_in_flight || board.revision() != state.pushed_revision {
            log::debug!("Local changes pending, skipping remote update");
            return false;
        }

        let remote: UserDocument = match from_document(document) {
            Ok(remote) => remote,
            Err(e) => {
                log::warn!("Ignoring unreadable remote update: {}", e);
                return false;
            }
        };
        let Some(snapshot) = remote.board else {
            return false;
        };
        if snapshot == board.snapshot() {
            return false;
        }

        board.replace_snapshot(snapshot);
        state.pushed_revision = board.revision();
        state.seen_revision = board.revision();
        if remote.last_synced_at.is_some() {
            state.last_synced_at = remote.last_synced_at;
        }
        log::info!("Applied remote board update");
        true
    }

    /// Last snapshot mirrored into the local cache.
    pub fn restore_backup(&self) -> Option<BoardSnapshot> {
        let cache = self.cache.as_ref()?;
        match load_json(cache.as_ref(), BOARD_BACKUP_KEY) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Ignoring unreadable board backup: {}", e);
                None
            }
        }
    }

    fn backup(&self, snapshot: &BoardSnapshot) {
        if !self.config.cache_backup {
            return;
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = save_json(cache.as_ref(), BOARD_BACKUP_KEY, snapshot) {
                log::warn!("Failed to back up board locally: {}", e);
            }
        }
    }

    fn clear_backup(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(BOARD_BACKUP_KEY) {
                log::warn!("Failed to clear local board backup: {}", e);
            }
        }
    }
}
