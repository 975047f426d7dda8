//! Remote keyed-document store contract.
//!
//! Documents are JSON objects addressed by a namespace and an id
//! (`users/{ownerId}`, `shares/{shareId}`). Writes are either full replaces or
//! merge-sets that deep-merge a partial document into the stored one.

mod memory;

pub use memory::MemoryRemoteStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A stored document: always a JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Remote store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Serialization(e.to_string())
    }
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Top-level document namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Private per-owner documents.
    Users,
    /// Published share grants.
    Shares,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Users => "users",
            Namespace::Shares => "shares",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "users" => Some(Namespace::Users),
            "shares" => Some(Namespace::Shares),
            _ => None,
        }
    }
}

/// Address of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub namespace: Namespace,
    pub id: String,
}

impl DocumentKey {
    pub fn new(namespace: Namespace, id: impl Into<String>) -> Self {
        Self {
            namespace,
            id: id.into(),
        }
    }

    /// The private document of an owner.
    pub fn user(owner_id: &str) -> Self {
        Self::new(Namespace::Users, owner_id)
    }

    /// The published document of a share grant.
    pub fn share(share_id: &str) -> Self {
        Self::new(Namespace::Shares, share_id)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace.as_str(), self.id)
    }
}

/// How a write combines with the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Deep-merge the written fields into the stored document.
    #[default]
    Merge,
    /// Replace the stored document entirely.
    Replace,
}

/// Callback invoked with the full document after each remote change.
pub type UpdateCallback = Box<dyn Fn(&Document) + Send + Sync>;

/// Handle for a live subscription. Unsubscribes when dropped.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a cancel action that runs exactly once.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Trait for remote document stores.
///
/// On native platforms implementations must be Send + Sync.
pub trait RemoteStore: Send + Sync {
    /// Fetch a document, `None` when it does not exist.
    fn get(&self, key: &DocumentKey) -> BoxFuture<'_, RemoteResult<Option<Document>>>;

    /// Write a document.
    fn set(
        &self,
        key: &DocumentKey,
        document: Document,
        mode: WriteMode,
    ) -> BoxFuture<'_, RemoteResult<()>>;

    /// Watch a document for changes made by any writer.
    fn subscribe(&self, key: &DocumentKey, callback: UpdateCallback) -> Subscription;
}

/// Deep-merge `patch` into `target`: nested objects merge key by key, every
/// other value (arrays included) replaces what was there.
pub fn merge_document(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        let Value::Object(incoming) = value else {
            target.insert(key, value);
            continue;
        };
        if let Some(Value::Object(existing)) = target.get_mut(&key) {
            merge_document(existing, incoming);
            continue;
        }
        target.insert(key, Value::Object(incoming));
    }
}

/// Serialize a value that must encode as a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> RemoteResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(RemoteError::Serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Deserialize a stored document.
pub fn from_document<T: DeserializeOwned>(document: Document) -> RemoteResult<T> {
    Ok(serde_json::from_value(Value::Object(document))?)
}
