//! Typed change records, decoded and validated from raw documents.

use eventcast_common::{EntityKind, EntityRef, StreamKind};
use eventcast_store::Document;
use serde_json::Value;
use thiserror::Error;

/// Why a raw document could not become a `ChangeRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("`{field}` must be \"user\" or \"organizer\", got {value:?}")]
    UnknownEntityKind { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventPosted {
    pub event_id: String,
    pub organizer_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdated {
    pub payment_id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageSent {
    pub message_id: String,
    pub sender: EntityRef,
    pub receiver: EntityRef,
    pub text: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketPurchased {
    pub ticket_id: String,
    pub user_id: String,
    pub event_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecorded {
    pub attendance_id: String,
    pub user_id: String,
    pub event_id: String,
    pub title: Option<String>,
}

/// One inserted record, with every reference its stream requires.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRecord {
    EventPosted(EventPosted),
    PaymentUpdated(PaymentUpdated),
    MessageSent(MessageSent),
    TicketPurchased(TicketPurchased),
    AttendanceRecorded(AttendanceRecorded),
}

impl ChangeRecord {
    /// Decode a document from `kind`'s stream. Fails on the first missing or
    /// malformed required field; nothing is looked up.
    pub fn parse(kind: StreamKind, document: &Document) -> Result<Self, ValidationError> {
        let data = &document.data;
        let record_id = text(data, "id").unwrap_or_else(|| document.id.clone());
        let title = text(data, "title");

        let record = match kind {
            StreamKind::EventPosted => ChangeRecord::EventPosted(EventPosted {
                event_id: record_id,
                organizer_id: required(data, "organizer_id")?,
                title,
            }),
            StreamKind::PaymentUpdated => ChangeRecord::PaymentUpdated(PaymentUpdated {
                payment_id: record_id,
                user_id: required(data, "user_id")?,
                name: text(data, "name"),
                status: text(data, "status"),
                title,
            }),
            StreamKind::MessageSent => {
                let sender_id = required(data, "sender_id")?;
                let receiver_id = required(data, "receiver_id")?;
                let sender_kind = entity_kind(data, "sender_type")?;
                let receiver_kind = entity_kind(data, "receiver_type")?;
                ChangeRecord::MessageSent(MessageSent {
                    message_id: record_id,
                    sender: EntityRef {
                        kind: sender_kind,
                        id: sender_id,
                    },
                    receiver: EntityRef {
                        kind: receiver_kind,
                        id: receiver_id,
                    },
                    text: text(data, "message"),
                    title,
                })
            }
            StreamKind::TicketPurchased => ChangeRecord::TicketPurchased(TicketPurchased {
                ticket_id: record_id,
                user_id: required(data, "user_id")?,
                event_id: required(data, "event_id")?,
                title,
            }),
            StreamKind::AttendanceRecorded => {
                ChangeRecord::AttendanceRecorded(AttendanceRecorded {
                    attendance_id: record_id,
                    user_id: required(data, "user_id")?,
                    event_id: required(data, "event_id")?,
                    title,
                })
            }
        };
        Ok(record)
    }
}

/// A non-empty string field. Other JSON types count as missing.
fn required(data: &Value, field: &'static str) -> Result<String, ValidationError> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ValidationError::MissingField(field))
}

fn entity_kind(data: &Value, field: &'static str) -> Result<EntityKind, ValidationError> {
    let value = required(data, field)?;
    value
        .parse()
        .map_err(|_| ValidationError::UnknownEntityKind { field, value })
}

/// A free-form display field. Scalars are rendered as text; empty is unset.
fn text(data: &Value, field: &str) -> Option<String> {
    match data.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
