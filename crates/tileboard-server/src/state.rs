//! In-memory document store shared by all connections.

use dashmap::DashMap;
use tileboard_core::remote::{Document, DocumentKey, WriteMode, merge_document};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Shared application state
pub struct AppState {
    documents: DashMap<DocumentKey, Document>,
    /// Per-document change feeds; each message is the full document as JSON.
    channels: DashMap<DocumentKey, broadcast::Sender<String>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    pub fn get(&self, key: &DocumentKey) -> Option<Document> {
        self.documents.get(key).map(|doc| doc.value().clone())
    }

    /// Apply a write and notify subscribers. Returns the stored document.
    ///
    /// Subscribers are notified while the entry is still held, so feeds see
    /// versions in the order they were stored.
    pub fn put(&self, key: &DocumentKey, document: Document, mode: WriteMode) -> Document {
        let mut entry = self.documents.entry(key.clone()).or_default();
        match mode {
            WriteMode::Merge => merge_document(entry.value_mut(), document),
            WriteMode::Replace => *entry.value_mut() = document,
        }
        self.publish(key, entry.value());
        entry.value().clone()
    }

    /// Current document plus a feed of every later version.
    pub fn subscribe(&self, key: &DocumentKey) -> (Option<Document>, broadcast::Receiver<String>) {
        let rx = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        (self.get(key), rx)
    }

    /// Drop the feed of a document once nobody listens.
    pub fn release(&self, key: &DocumentKey) {
        self.channels.remove_if(key, |_, tx| tx.receiver_count() == 0);
    }

    pub fn subscriber_count(&self, key: &DocumentKey) -> usize {
        self.channels.get(key).map_or(0, |tx| tx.receiver_count())
    }

    fn publish(&self, key: &DocumentKey, document: &Document) {
        let Some(tx) = self.channels.get(key) else {
            return;
        };
        match serde_json::to_string(document) {
            Ok(json) => {
                let _ = tx.send(json);
            }
            Err(e) => tracing::warn!("Failed to encode {} for subscribers: {}", key, e),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
