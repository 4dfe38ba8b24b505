//! Pure payload builders, one per stream kind.
//!
//! Builders take already-resolved entities and a `Target`, so an address is
//! only ever the one resolution produced. No I/O, no clock: the caller passes
//! the reaction time.

use chrono::{DateTime, Utc};
use eventcast_common::{Correlation, Entity, EventListing, NotificationPayload, NotificationType};

use crate::record::{AttendanceRecorded, EventPosted, MessageSent, PaymentUpdated, TicketPurchased};

pub const DEFAULT_TITLE: &str = "Notification";

/// A resolved recipient that has somewhere to deliver to.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub entity: &'a Entity,
    pub address: &'a str,
}

impl<'a> Target<'a> {
    /// `None` when the entity has no non-empty push address.
    pub fn of(entity: &'a Entity) -> Option<Self> {
        entity
            .push_address()
            .map(|address| Self { entity, address })
    }
}

fn payload(
    to: Target<'_>,
    title: &Option<String>,
    body: String,
    notification_type: NotificationType,
    now: DateTime<Utc>,
    correlation: Correlation,
) -> NotificationPayload {
    NotificationPayload {
        address: to.address.to_string(),
        title: title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        body,
        notification_type,
        timestamp: now,
        correlation,
    }
}

pub fn event_post(
    record: &EventPosted,
    organizer: &Entity,
    to: Target<'_>,
    now: DateTime<Utc>,
) -> NotificationPayload {
    payload(
        to,
        &record.title,
        format!(
            "{} has posted a new event. Check it out!",
            organizer.display_name()
        ),
        NotificationType::EventPost,
        now,
        Correlation {
            user_id: Some(to.entity.id.clone()),
            event_id: Some(record.event_id.clone()),
            ..Default::default()
        },
    )
}

pub fn payment_status(
    record: &PaymentUpdated,
    to: Target<'_>,
    now: DateTime<Utc>,
) -> NotificationPayload {
    let name = record.name.as_deref().unwrap_or_default();
    let status = record.status.as_deref().unwrap_or_default();
    payload(
        to,
        &record.title,
        format!("{name} has {status} your payment. Check it out!"),
        NotificationType::PaymentStatus,
        now,
        Correlation {
            user_id: Some(to.entity.id.clone()),
            status: record.status.clone(),
            ..Default::default()
        },
    )
}

pub fn new_message(
    record: &MessageSent,
    sender: &Entity,
    to: Target<'_>,
    now: DateTime<Utc>,
) -> NotificationPayload {
    payload(
        to,
        &record.title,
        record.text.clone().unwrap_or_default(),
        NotificationType::NewMessage,
        now,
        Correlation {
            user_id: Some(to.entity.id.clone()),
            sender_id: Some(sender.id.clone()),
            ..Default::default()
        },
    )
}

pub fn ticket_purchase(
    record: &TicketPurchased,
    event: &EventListing,
    to: Target<'_>,
    now: DateTime<Utc>,
) -> NotificationPayload {
    payload(
        to,
        &record.title,
        format!("Thank you for purchasing for {}!", event.display_name()),
        NotificationType::TicketPurchase,
        now,
        Correlation {
            user_id: Some(to.entity.id.clone()),
            event_id: Some(record.event_id.clone()),
            ..Default::default()
        },
    )
}

pub fn attendance_reminder(
    record: &AttendanceRecorded,
    event: &EventListing,
    to: Target<'_>,
    now: DateTime<Utc>,
) -> NotificationPayload {
    payload(
        to,
        &record.title,
        format!("Make sure to attend {}!", event.display_name()),
        NotificationType::EventAttendanceReminder,
        now,
        Correlation {
            user_id: Some(to.entity.id.clone()),
            event_id: Some(record.event_id.clone()),
            event_name: event.event_name.clone(),
            ..Default::default()
        },
    )
}
