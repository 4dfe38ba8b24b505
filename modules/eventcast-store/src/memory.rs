//! In-memory document store. Thread-safe, no database required.
//!
//! Writes go through `insert`/`update`/`remove`, which also publish to the
//! collection's change feed. Reads can be made to fail per collection to
//! exercise error paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use eventcast_common::Collection;
use tokio::sync::broadcast;
use tracing::warn;

use crate::traits::{ChangeStream, DocumentStore};
use crate::types::{ChangeEvent, ChangeType, Document};

const FEED_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    docs: HashMap<Collection, BTreeMap<String, serde_json::Value>>,
    feeds: HashMap<Collection, broadcast::Sender<ChangeEvent>>,
    failing_reads: HashSet<Collection>,
    reads: HashMap<Collection, usize>,
}

impl Inner {
    fn feed(&mut self, collection: Collection) -> &broadcast::Sender<ChangeEvent> {
        self.feeds
            .entry(collection)
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
    }

    fn publish(&mut self, collection: Collection, change: ChangeType, document: Document) {
        // No subscribers is not an error: the change simply goes unobserved.
        let _ = self.feed(collection).send(ChangeEvent { change, document });
    }

    fn record_read(&mut self, collection: Collection) -> Result<()> {
        *self.reads.entry(collection).or_default() += 1;
        if self.failing_reads.contains(&collection) {
            bail!("MemoryStore: reads on {collection} are failing");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a document without publishing a change. For seeding fixtures.
    pub fn seed(&self, collection: Collection, id: &str, data: serde_json::Value) {
        self.lock()
            .docs
            .entry(collection)
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Insert a document and publish an `Added` change.
    pub fn insert(&self, collection: Collection, id: &str, data: serde_json::Value) {
        let mut inner = self.lock();
        inner
            .docs
            .entry(collection)
            .or_default()
            .insert(id.to_string(), data.clone());
        inner.publish(collection, ChangeType::Added, Document::new(id, data));
    }

    /// Replace a document's body and publish a `Modified` change.
    pub fn update(&self, collection: Collection, id: &str, data: serde_json::Value) {
        let mut inner = self.lock();
        inner
            .docs
            .entry(collection)
            .or_default()
            .insert(id.to_string(), data.clone());
        inner.publish(collection, ChangeType::Modified, Document::new(id, data));
    }

    /// Delete a document and publish a `Removed` change with its last body.
    pub fn remove(&self, collection: Collection, id: &str) {
        let mut inner = self.lock();
        let last = inner
            .docs
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id))
            .unwrap_or(serde_json::Value::Null);
        inner.publish(collection, ChangeType::Removed, Document::new(id, last));
    }

    /// Make every subsequent read on `collection` fail.
    pub fn fail_reads(&self, collection: Collection) {
        self.lock().failing_reads.insert(collection);
    }

    /// Number of `get_by_id`/`get_all` calls made against `collection`.
    pub fn reads(&self, collection: Collection) -> usize {
        self.lock().reads.get(&collection).copied().unwrap_or(0)
    }

    /// End every open change feed. Subscribers see their stream finish.
    pub fn close_feeds(&self) {
        self.lock().feeds.clear();
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, collection: Collection) -> Result<ChangeStream> {
        let mut rx = self.lock().feed(collection).subscribe();

        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%collection, skipped, "Change feed lagged, changes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn get_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let mut inner = self.lock();
        inner.record_read(collection)?;
        Ok(inner
            .docs
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Document>> {
        let mut inner = self.lock();
        inner.record_read(collection)?;
        Ok(inner
            .docs
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_sees_changes_made_after_subscribing() {
        let store = MemoryStore::new();
        store.insert(Collection::Tickets, "before", json!({}));

        let mut feed = store.subscribe(Collection::Tickets).await.unwrap();
        store.insert(Collection::Tickets, "t1", json!({"user_id": "u1"}));
        store.update(Collection::Tickets, "t1", json!({"user_id": "u2"}));
        store.remove(Collection::Tickets, "t1");
        store.close_feeds();

        let changes: Vec<ChangeEvent> = feed.by_ref().collect().await;
        let kinds: Vec<ChangeType> = changes.iter().map(|c| c.change).collect();
        assert_eq!(
            kinds,
            vec![ChangeType::Added, ChangeType::Modified, ChangeType::Removed]
        );
        assert_eq!(changes[0].document.id, "t1");
        assert_eq!(changes[2].document.data, json!({"user_id": "u2"}));
    }

    #[tokio::test]
    async fn feeds_are_per_collection() {
        let store = MemoryStore::new();
        let mut tickets = store.subscribe(Collection::Tickets).await.unwrap();

        store.insert(Collection::Payments, "p1", json!({}));
        store.insert(Collection::Tickets, "t1", json!({}));
        store.close_feeds();

        let ids: Vec<String> = tickets.by_ref().map(|c| c.document.id).collect().await;
        assert_eq!(ids, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn failing_reads_return_errors_and_are_counted() {
        let store = MemoryStore::new();
        store.seed(Collection::Users, "u1", json!({"id": "u1"}));
        store.fail_reads(Collection::Users);

        assert!(store.get_by_id(Collection::Users, "u1").await.is_err());
        assert!(store.get_all(Collection::Users).await.is_err());
        assert_eq!(store.reads(Collection::Users), 2);
        assert!(store.get_all(Collection::Events).await.unwrap().is_empty());
    }
}
