use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventcastError;

// --- Collections ---

/// A named collection in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Organizers,
    Events,
    Payments,
    Messages,
    Tickets,
    Attendance,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Organizers => "organizers",
            Collection::Events => "events",
            Collection::Payments => "payments",
            Collection::Messages => "messages",
            Collection::Tickets => "tickets",
            Collection::Attendance => "attendance",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = EventcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(Collection::Users),
            "organizers" => Ok(Collection::Organizers),
            "events" => Ok(Collection::Events),
            "payments" => Ok(Collection::Payments),
            "messages" => Ok(Collection::Messages),
            "tickets" => Ok(Collection::Tickets),
            "attendance" => Ok(Collection::Attendance),
            other => Err(EventcastError::UnknownCollection(other.to_string())),
        }
    }
}

// --- Streams ---

/// A watched source stream. Each stream is backed by exactly one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    EventPosted,
    PaymentUpdated,
    MessageSent,
    TicketPurchased,
    AttendanceRecorded,
}

impl StreamKind {
    pub const ALL: [StreamKind; 5] = [
        StreamKind::EventPosted,
        StreamKind::PaymentUpdated,
        StreamKind::MessageSent,
        StreamKind::TicketPurchased,
        StreamKind::AttendanceRecorded,
    ];

    pub fn collection(&self) -> Collection {
        match self {
            StreamKind::EventPosted => Collection::Events,
            StreamKind::PaymentUpdated => Collection::Payments,
            StreamKind::MessageSent => Collection::Messages,
            StreamKind::TicketPurchased => Collection::Tickets,
            StreamKind::AttendanceRecorded => Collection::Attendance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::EventPosted => "event_posted",
            StreamKind::PaymentUpdated => "payment_updated",
            StreamKind::MessageSent => "message_sent",
            StreamKind::TicketPurchased => "ticket_purchased",
            StreamKind::AttendanceRecorded => "attendance_recorded",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = EventcastError;

    /// Accepts either the stream name (`ticket_purchased`) or its collection
    /// name (`tickets`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        StreamKind::ALL
            .into_iter()
            .find(|k| k.as_str() == needle || k.collection().as_str() == needle)
            .ok_or_else(|| EventcastError::UnknownStream(s.to_string()))
    }
}

// --- Entities ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Organizer,
}

impl EntityKind {
    pub fn collection(&self) -> Collection {
        match self {
            EntityKind::User => Collection::Users,
            EntityKind::Organizer => Collection::Organizers,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Organizer => "organizer",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = EventcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "organizer" => Ok(EntityKind::Organizer),
            other => Err(EventcastError::UnknownEntityKind(other.to_string())),
        }
    }
}

/// Reference to a user or organizer by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::User,
            id: id.into(),
        }
    }

    pub fn organizer(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Organizer,
            id: id.into(),
        }
    }
}

/// A read-only snapshot of a user or organizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: String,
    pub push_token: Option<String>,
    pub name: Option<String>,
}

impl Entity {
    /// The push address, if the entity has a non-empty one.
    pub fn push_address(&self) -> Option<&str> {
        self.push_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// A posted event, as referenced by tickets and attendance records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventListing {
    pub id: String,
    pub event_name: Option<String>,
}

impl EventListing {
    pub fn display_name(&self) -> &str {
        self.event_name.as_deref().unwrap_or_default()
    }
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    EventPost,
    PaymentStatus,
    NewMessage,
    TicketPurchase,
    EventAttendanceReminder,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::EventPost => "event_post",
            NotificationType::PaymentStatus => "payment_status",
            NotificationType::NewMessage => "new_message",
            NotificationType::TicketPurchase => "ticket_purchase",
            NotificationType::EventAttendanceReminder => "event_attendance_reminder",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ids that tie a notification back to the records that caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub user_id: Option<String>,
    pub sender_id: Option<String>,
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub status: Option<String>,
}

impl Correlation {
    /// Flatten the ids into a string map. `senderId` is always present (empty
    /// when there is no sender); the other ids only when set.
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let mut data: BTreeMap<String, String> = [
            ("user_id", &self.user_id),
            ("event_id", &self.event_id),
            ("event_name", &self.event_name),
            ("status", &self.status),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
        .collect();
        data.insert(
            "senderId".to_string(),
            self.sender_id.clone().unwrap_or_default(),
        );
        data
    }
}

/// One notification for one push address. Built once, delivered once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub address: String,
    pub title: String,
    pub body: String,
    pub notification_type: NotificationType,
    pub timestamp: DateTime<Utc>,
    pub correlation: Correlation,
}

impl NotificationPayload {
    /// Data fields sent alongside the visible notification.
    pub fn data(&self) -> BTreeMap<String, String> {
        let mut data = self.correlation.to_data();
        data.insert("type".to_string(), self.notification_type.as_str().to_string());
        data.insert(
            "timestamp".to_string(),
            self.timestamp.timestamp_millis().to_string(),
        );
        data
    }
}
