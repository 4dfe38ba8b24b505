//! Narrow read/subscribe interface over the document store.
//!
//! The dispatcher only ever reads: it subscribes to per-collection change
//! feeds and looks documents up by id. Two backends implement the trait:
//! `MemoryStore` (tests, local runs) and `PgDocumentStore` (Postgres JSONB
//! documents with LISTEN/NOTIFY change feeds).

pub mod memory;
pub mod postgres;
pub mod traits;
pub mod types;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use traits::{ChangeStream, DocumentStore};
pub use types::{ChangeEvent, ChangeType, Document};
