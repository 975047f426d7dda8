//! In-memory remote store.

use super::{
    BoxFuture, Document, DocumentKey, RemoteError, RemoteResult, RemoteStore, Subscription,
    UpdateCallback, WriteMode, merge_document,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

type Subscribers = Arc<Mutex<Vec<(u64, DocumentKey, Arc<UpdateCallback>)>>>;

/// In-memory remote store for tests and offline use.
///
/// Keeps a log of every write and can simulate an outage.
#[derive(Default)]
pub struct MemoryRemoteStore {
    documents: RwLock<HashMap<DocumentKey, Document>>,
    subscribers: Subscribers,
    next_subscriber: AtomicU64,
    failing: AtomicBool,
    writes: Mutex<Vec<(DocumentKey, Document)>>,
}

impl MemoryRemoteStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without notifying subscribers.
    pub fn insert(&self, key: DocumentKey, document: Document) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, document);
    }

    /// Current stored document.
    pub fn document(&self, key: &DocumentKey) -> Option<Document> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Make every following call fail with [`RemoteError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every successful write, in order, as sent by the writer.
    pub fn writes(&self) -> Vec<(DocumentKey, Document)> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Writes sent to one key.
    pub fn writes_to(&self, key: &DocumentKey) -> Vec<Document> {
        self.writes()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, doc)| doc)
            .collect()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn check_available(&self) -> RemoteResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn notify(&self, key: &DocumentKey, document: &Document) {
        let callbacks: Vec<Arc<UpdateCallback>> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, k, _)| k == key)
            .map(|(_, _, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(document);
        }
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn get(&self, key: &DocumentKey) -> BoxFuture<'_, RemoteResult<Option<Document>>> {
        let key = key.clone();
        Box::pin(async move {
            self.check_available()?;
            let docs = self
                .documents
                .read()
                .map_err(|e| RemoteError::Unavailable(format!("Lock error: {}", e)))?;
            Ok(docs.get(&key).cloned())
        })
    }

    fn set(
        &self,
        key: &DocumentKey,
        document: Document,
        mode: WriteMode,
    ) -> BoxFuture<'_, RemoteResult<()>> {
        let key = key.clone();
        Box::pin(async move {
            self.check_available()?;
            let stored = {
                let mut docs = self
                    .documents
                    .write()
                    .map_err(|e| RemoteError::Unavailable(format!("Lock error: {}", e)))?;
                let entry = docs.entry(key.clone()).or_default();
                match mode {
                    WriteMode::Merge => merge_document(entry, document.clone()),
                    WriteMode::Replace => *entry = document.clone(),
                }
                entry.clone()
            };
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((key.clone(), document));
            self.notify(&key, &stored);
            Ok(())
        })
    }

    fn subscribe(&self, key: &DocumentKey, callback: UpdateCallback) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, key.clone(), Arc::new(callback)));

        let subscribers = self.subscribers.clone();
        Subscription::new(move || {
            subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(sub_id, _, _)| *sub_id != id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::block_on;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = MemoryRemoteStore::new();
        assert_eq!(block_on(store.get(&DocumentKey::user("u1"))).unwrap(), None);
    }

    #[test]
    fn test_merge_and_replace() {
        let store = MemoryRemoteStore::new();
        let key = DocumentKey::user("u1");

        let first = doc(json!({ "a": 1, "b": { "x": 1 } }));
        block_on(store.set(&key, first, WriteMode::Merge)).unwrap();
        block_on(store.set(&key, doc(json!({ "b": { "y": 2 } })), WriteMode::Merge)).unwrap();
        assert_eq!(
            store.document(&key).map(Value::Object),
            Some(json!({ "a": 1, "b": { "x": 1, "y": 2 } }))
        );

        block_on(store.set(&key, doc(json!({ "c": 3 })), WriteMode::Replace)).unwrap();
        assert_eq!(store.document(&key).map(Value::Object), Some(json!({ "c": 3 })));
        assert_eq!(store.writes_to(&key).len(), 3);
    }

    #[test]
    fn test_failing_store() {
        let store = MemoryRemoteStore::new();
        let key = DocumentKey::share("s1");
        store.set_failing(true);

        assert!(matches!(block_on(store.get(&key)), Err(RemoteError::Unavailable(_))));
        assert!(block_on(store.set(&key, Document::new(), WriteMode::Merge)).is_err());
        assert!(store.writes().is_empty());

        store.set_failing(false);
        assert!(block_on(store.set(&key, Document::new(), WriteMode::Merge)).is_ok());
    }

    #[test]
    fn test_subscribers_see_full_document_until_dropped() {
        let store = MemoryRemoteStore::new();
        let key = DocumentKey::user("u1");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let subscription = store.subscribe(&key, Box::new(move |doc: &Document| {
            sink.lock().unwrap().push(doc.clone());
        }));
        assert_eq!(store.subscriber_count(), 1);

        block_on(store.set(&key, doc(json!({ "a": 1 })), WriteMode::Merge)).unwrap();
        block_on(store.set(&key, doc(json!({ "b": 2 })), WriteMode::Merge)).unwrap();
        let other = DocumentKey::user("other");
        block_on(store.set(&other, doc(json!({ "c": 3 })), WriteMode::Merge)).unwrap();

        drop(subscription);
        assert_eq!(store.subscriber_count(), 0);
        block_on(store.set(&key, doc(json!({ "d": 4 })), WriteMode::Merge)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(Value::Object(seen[1].clone()), json!({ "a": 1, "b": 2 }));
    }
}
