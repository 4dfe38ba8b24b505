// Test doubles for the dispatcher.
//
// RecordingGateway (PushGateway) records every payload it is handed and can be
// told to fail, stall or panic for specific addresses. ReversedListing
// (DocumentStore) wraps a MemoryStore but lists documents back to front.
// Fixture helpers seed users, organizers and events into a MemoryStore in the
// stored document shape.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use eventcast_common::{Collection, NotificationPayload};
use eventcast_store::{ChangeStream, Document, DocumentStore, MemoryStore};
use serde_json::json;

use crate::notify::backend::{DeliveryOutcome, PushGateway};

// ---------------------------------------------------------------------------
// RecordingGateway
// ---------------------------------------------------------------------------

/// Records sends. Builder pattern: `.failing_for()`, `.delayed_for()`,
/// `.panicking_for()`.
#[derive(Default)]
pub struct RecordingGateway {
    attempts: Mutex<Vec<NotificationPayload>>,
    delivered: Mutex<Vec<NotificationPayload>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delays: HashMap<String, Duration>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `Failed` for sends to `address`.
    pub fn failing_for(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    /// Wait `delay` before completing sends to `address`.
    pub fn delayed_for(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    /// Panic on sends to `address`, breaking the gateway contract on purpose.
    pub fn panicking_for(mut self, address: &str) -> Self {
        self.panicking.insert(address.to_string());
        self
    }

    fn lock(list: &Mutex<Vec<NotificationPayload>>) -> MutexGuard<'_, Vec<NotificationPayload>> {
        list.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every payload `send` was called with, in call order.
    pub fn attempts(&self) -> Vec<NotificationPayload> {
        Self::lock(&self.attempts).clone()
    }

    /// Payloads that were reported delivered.
    pub fn delivered(&self) -> Vec<NotificationPayload> {
        Self::lock(&self.delivered).clone()
    }

    /// Addresses of every attempted send, sorted.
    pub fn attempted_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.attempts().into_iter().map(|p| p.address).collect();
        addresses.sort();
        addresses
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send(&self, payload: &NotificationPayload) -> DeliveryOutcome {
        Self::lock(&self.attempts).push(payload.clone());

        if let Some(delay) = self.delays.get(&payload.address) {
            tokio::time::sleep(*delay).await;
        }
        if self.panicking.contains(&payload.address) {
            panic!("RecordingGateway: told to panic for {}", payload.address);
        }
        if self.failing.contains(&payload.address) {
            return DeliveryOutcome::Failed {
                reason: format!("RecordingGateway: told to fail for {}", payload.address),
            };
        }

        Self::lock(&self.delivered).push(payload.clone());
        DeliveryOutcome::Delivered {
            message_id: format!("msg-{}", payload.address),
        }
    }
}

// ---------------------------------------------------------------------------
// ReversedListing
// ---------------------------------------------------------------------------

/// `get_all` returns documents in reverse key order. Everything else goes
/// straight to the wrapped store.
pub struct ReversedListing {
    inner: Arc<MemoryStore>,
}

impl ReversedListing {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DocumentStore for ReversedListing {
    async fn subscribe(&self, collection: Collection) -> anyhow::Result<ChangeStream> {
        self.inner.subscribe(collection).await
    }

    async fn get_by_id(&self, collection: Collection, id: &str) -> anyhow::Result<Option<Document>> {
        self.inner.get_by_id(collection, id).await
    }

    async fn get_all(&self, collection: Collection) -> anyhow::Result<Vec<Document>> {
        let mut docs = self.inner.get_all(collection).await?;
        docs.reverse();
        Ok(docs)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn seed_user(store: &MemoryStore, id: &str, token: Option<&str>) {
    store.seed(
        Collection::Users,
        id,
        json!({"id": id, "userToken": token, "name": format!("User {id}")}),
    );
}

pub fn seed_organizer(store: &MemoryStore, id: &str, name: &str, token: Option<&str>) {
    store.seed(
        Collection::Organizers,
        id,
        json!({"id": id, "userToken": token, "name": name}),
    );
}

pub fn seed_event(store: &MemoryStore, id: &str, event_name: &str) {
    store.seed(
        Collection::Events,
        id,
        json!({"id": id, "event_name": event_name}),
    );
}
