//! Entity lookups through the document store.
//!
//! Every lookup is an independent read. Failures never surface as errors:
//! a missing id, a missing document, an undecodable body and a failed read
//! all resolve to `None`, logged at the point they happen.

use std::sync::Arc;

use eventcast_common::{Collection, Entity, EntityKind, EventListing};
use eventcast_store::{DocumentStore, Document};
use serde::Deserialize;
use tracing::{debug, warn};

/// Shape shared by user and organizer documents.
#[derive(Debug, Deserialize)]
struct ProfileDoc {
    id: Option<String>,
    #[serde(rename = "userToken")]
    user_token: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventDoc {
    id: Option<String>,
    event_name: Option<String>,
}

#[derive(Clone)]
pub struct EntityResolver {
    store: Arc<dyn DocumentStore>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Look up one user or organizer.
    pub async fn resolve(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        let doc = self.fetch(kind.collection(), id).await?;
        decode_profile(kind, doc)
    }

    /// Look up a posted event.
    pub async fn resolve_event(&self, id: &str) -> Option<EventListing> {
        let doc = self.fetch(Collection::Events, id).await?;
        match serde_json::from_value::<EventDoc>(doc.data) {
            Ok(event) => Some(EventListing {
                id: event.id.filter(|s| !s.is_empty()).unwrap_or(doc.id),
                event_name: event.event_name,
            }),
            Err(e) => {
                warn!(error = %e, id = doc.id.as_str(), "Undecodable event document");
                None
            }
        }
    }

    /// Every user. A failed read yields an empty set; undecodable users are
    /// skipped.
    pub async fn users(&self) -> Vec<Entity> {
        match self.store.get_all(Collection::Users).await {
            Ok(docs) => docs
                .into_iter()
                .filter_map(|doc| decode_profile(EntityKind::User, doc))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read users");
                Vec::new()
            }
        }
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Option<Document> {
        if id.is_empty() {
            warn!(%collection, "Lookup with empty id");
            return None;
        }

        match self.store.get_by_id(collection, id).await {
            Ok(Some(doc)) => Some(doc),
            Ok(None) => {
                debug!(%collection, id, "Document not found");
                None
            }
            Err(e) => {
                warn!(error = %e, %collection, id, "Failed to read document");
                None
            }
        }
    }
}

fn decode_profile(kind: EntityKind, doc: Document) -> Option<Entity> {
    match serde_json::from_value::<ProfileDoc>(doc.data) {
        Ok(profile) => Some(Entity {
            kind,
            id: profile.id.filter(|s| !s.is_empty()).unwrap_or(doc.id),
            push_token: profile.user_token,
            name: profile.name,
        }),
        Err(e) => {
            warn!(error = %e, %kind, id = doc.id.as_str(), "Undecodable profile document");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventcast_store::MemoryStore;
    use serde_json::json;

    fn resolver_with(store: MemoryStore) -> (Arc<MemoryStore>, EntityResolver) {
        let store = Arc::new(store);
        (store.clone(), EntityResolver::new(store))
    }

    #[tokio::test]
    async fn resolves_users_and_organizers_from_their_own_collections() {
        let store = MemoryStore::new();
        store.seed(Collection::Users, "x", json!({"id": "x", "userToken": "user-tok"}));
        store.seed(
            Collection::Organizers,
            "x",
            json!({"id": "x", "userToken": "org-tok", "name": "Parks Dept"}),
        );
        let (_, resolver) = resolver_with(store);

        let user = resolver.resolve(EntityKind::User, "x").await.unwrap();
        assert_eq!(user.kind, EntityKind::User);
        assert_eq!(user.push_address(), Some("user-tok"));

        let organizer = resolver.resolve(EntityKind::Organizer, "x").await.unwrap();
        assert_eq!(organizer.push_address(), Some("org-tok"));
        assert_eq!(organizer.display_name(), "Parks Dept");
    }

    #[tokio::test]
    async fn empty_id_never_reads() {
        let (store, resolver) = resolver_with(MemoryStore::new());
        assert!(resolver.resolve(EntityKind::User, "").await.is_none());
        assert_eq!(store.reads(Collection::Users), 0);
    }

    #[tokio::test]
    async fn missing_undecodable_and_failed_reads_are_absent() {
        let store = MemoryStore::new();
        store.seed(Collection::Users, "bad", json!({"userToken": 17}));
        store.seed(Collection::Organizers, "o1", json!({"name": "Org"}));
        store.fail_reads(Collection::Organizers);
        let (_, resolver) = resolver_with(store);

        assert!(resolver.resolve(EntityKind::User, "ghost").await.is_none());
        assert!(resolver.resolve(EntityKind::User, "bad").await.is_none());
        assert!(resolver.resolve(EntityKind::Organizer, "o1").await.is_none());
    }

    #[tokio::test]
    async fn id_falls_back_to_document_key() {
        let store = MemoryStore::new();
        store.seed(Collection::Users, "u7", json!({"userToken": "t"}));
        store.seed(Collection::Events, "e1", json!({"event_name": "Spring Fair"}));
        let (_, resolver) = resolver_with(store);

        assert_eq!(resolver.resolve(EntityKind::User, "u7").await.unwrap().id, "u7");
        let event = resolver.resolve_event("e1").await.unwrap();
        assert_eq!(event.id, "e1");
        assert_eq!(event.display_name(), "Spring Fair");
    }

    #[tokio::test]
    async fn users_skips_undecodable_and_survives_read_failure() {
        let store = MemoryStore::new();
        store.seed(Collection::Users, "u1", json!({"userToken": "a"}));
        store.seed(Collection::Users, "u2", json!("not an object"));
        let (store, resolver) = resolver_with(store);

        let users = resolver.users().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "u1");

        store.fail_reads(Collection::Users);
        assert!(resolver.users().await.is_empty());
    }
}
