use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use eventcast_common::Collection;
use futures::Stream;

use crate::types::{ChangeEvent, Document};

/// A lazy, unbounded feed of changes on one collection.
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

/// Read-only access to the document store.
///
/// Implemented by `PgDocumentStore` (postgres) and `MemoryStore` (tests).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Subscribe to changes on a collection. Only changes made after the
    /// subscription is established are delivered.
    async fn subscribe(&self, collection: Collection) -> Result<ChangeStream>;

    /// Fetch one document by id.
    async fn get_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>>;

    /// Fetch every document in a collection.
    async fn get_all(&self, collection: Collection) -> Result<Vec<Document>>;
}
