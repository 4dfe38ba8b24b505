use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Visible part of a push message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// A message addressed to one device registration token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub token: String,
    pub notification: Notification,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendRequest<'a> {
    pub message: &'a Message,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendResponse {
    /// `projects/{project}/messages/{message_id}`
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
}
