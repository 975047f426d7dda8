//! Read-only board sharing.
//!
//! A grant is a frozen copy of a board published under `shares/{shareId}`,
//! separate from the owner's private document. Grants are never deleted:
//! revoking one flips its `active` flag so old links keep resolving to
//! [`ShareError::Disabled`] instead of [`ShareError::NotFound`].

use crate::board::{BoardConfig, BoardState};
use crate::remote::{
    Document, DocumentKey, RemoteError, RemoteStore, WriteMode, from_document, to_document,
};
use crate::snapshot::{BoardSnapshot, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Query parameter carrying the share id in a share link.
pub const SHARE_QUERY_PARAM: &str = "share";

/// A published, revocable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareGrant {
    pub share_id: String,
    pub owner_id: String,
    pub snapshot: BoardSnapshot,
    pub created_at: i64,
    pub active: bool,
}

/// Entry in the owner's grant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRef {
    pub share_id: String,
    pub created_at: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl From<&ShareGrant> for ShareRef {
    fn from(grant: &ShareGrant) -> Self {
        Self {
            share_id: grant.share_id.clone(),
            created_at: grant.created_at,
            active: grant.active,
        }
    }
}

/// Share errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("Share not found: {0}")]
    NotFound(String),
    #[error("Share disabled by its owner: {0}")]
    Disabled(String),
    #[error("Share belongs to another owner")]
    NotOwner,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Result type for share operations.
pub type ShareResult<T> = Result<T, ShareError>;

/// Publishes and resolves share grants. Never touches a sync session.
pub struct ShareManager<R: RemoteStore> {
    remote: Arc<R>,
}

impl<R: RemoteStore> ShareManager<R> {
    pub fn new(remote: Arc<R>) -> Self {
        Self { remote }
    }

    /// Publish a frozen copy of `snapshot` and record it in the owner's list.
    pub async fn create_grant(
        &self,
        owner_id: &str,
        snapshot: &BoardSnapshot,
    ) -> ShareResult<ShareGrant> {
        let created_at = now_ms();
        let grant = ShareGrant {
            share_id: new_share_id(owner_id, created_at),
            owner_id: owner_id.to_string(),
            snapshot: snapshot.clone(),
            created_at,
            active: true,
        };

        self.remote
            .set(&DocumentKey::share(&grant.share_id), to_document(&grant)?, WriteMode::Replace)
            .await?;

        let mut shares = self.list_grants(owner_id).await?;
        shares.push(ShareRef::from(&grant));
        self.write_share_list(owner_id, &shares).await?;

        log::info!("Created share {} for {}", grant.share_id, owner_id);
        Ok(grant)
    }

    /// Fetch a grant regardless of its state.
    pub async fn grant(&self, share_id: &str) -> ShareResult<ShareGrant> {
        let document = self
            .remote
            .get(&DocumentKey::share(share_id))
            .await?
            .ok_or_else(|| ShareError::NotFound(share_id.to_string()))?;
        Ok(from_document(document)?)
    }

    /// Resolve a share id to its snapshot.
    pub async fn resolve_grant(&self, share_id: &str) -> ShareResult<BoardSnapshot> {
        let grant = self.grant(share_id).await?;
        if !grant.active {
            log::debug!("Share {} is disabled", share_id);
            return Err(ShareError::Disabled(share_id.to_string()));
        }
        Ok(grant.snapshot)
    }

    /// Build a read-only board for a viewer.
    pub async fn open_shared_board(
        &self,
        share_id: &str,
        config: BoardConfig,
    ) -> ShareResult<BoardState> {
        let snapshot = self.resolve_grant(share_id).await?;
        Ok(BoardState::read_only(snapshot, config))
    }

    /// Disable a grant. Revoking twice is not an error.
    pub async fn revoke(&self, owner_id: &str, share_id: &str) -> ShareResult<()> {
        let grant = self.grant(share_id).await?;
        if grant.owner_id != owner_id {
            log::warn!("{} tried to revoke share {} owned by someone else", owner_id, share_id);
            return Err(ShareError::NotOwner);
        }

        let mut patch = Document::new();
        patch.insert("active".to_string(), Value::Bool(false));
        self.remote
            .set(&DocumentKey::share(share_id), patch, WriteMode::Merge)
            .await?;

        let mut shares = self.list_grants(owner_id).await?;
        let mut changed = false;
        for share in shares.iter_mut().filter(|s| s.share_id == share_id && s.active) {
            share.active = false;
            changed = true;
        }
        if changed {
            self.write_share_list(owner_id, &shares).await?;
        }

        log::info!("Revoked share {}", share_id);
        Ok(())
    }

    /// The owner's grant references, oldest first.
    pub async fn list_grants(&self, owner_id: &str) -> ShareResult<Vec<ShareRef>> {
        let Some(mut document) = self.remote.get(&DocumentKey::user(owner_id)).await? else {
            return Ok(Vec::new());
        };
        match document.remove("shares") {
            Some(shares) => Ok(serde_json::from_value(shares).map_err(RemoteError::from)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_share_list(&self, owner_id: &str, shares: &[ShareRef]) -> ShareResult<()> {
        let mut patch = Document::new();
        patch.insert(
            "shares".to_string(),
            serde_json::to_value(shares).map_err(RemoteError::from)?,
        );
        self.remote
            .set(&DocumentKey::user(owner_id), patch, WriteMode::Merge)
            .await?;
        Ok(())
    }
}

/// `{owner}_{createdAt}_{random}`, with the owner id reduced to URL-safe
/// characters.
fn new_share_id(owner_id: &str, created_at: i64) -> String {
    let owner: String = owner_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", owner, created_at, &random[..8])
}

/// Link to a share: `base` with the share parameter set.
pub fn share_url(base: &Url, share_id: &str) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != SHARE_QUERY_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(SHARE_QUERY_PARAM, share_id);
    url
}

/// How a page was opened.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// The viewer's own board.
    #[default]
    Private,
    /// A shared board; the private board must not be loaded.
    Shared(String),
}

impl LaunchMode {
    /// Parse a query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == SHARE_QUERY_PARAM)
            .map(|(_, value)| value.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(LaunchMode::Shared)
            .unwrap_or_default()
    }

    pub fn from_url(url: &Url) -> Self {
        url.query().map(Self::from_query).unwrap_or_default()
    }

    pub fn share_id(&self) -> Option<&str> {
        match self {
            LaunchMode::Shared(id) => Some(id),
            LaunchMode::Private => None,
        }
    }
}
