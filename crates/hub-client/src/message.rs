//! Inbox messages, their groups, and inbound frame decoding.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ClientError, FrameError};

/// Classification tag carried by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    System,
    Important,
    Task,
}

impl GroupKey {
    pub const ALL: [GroupKey; 3] = [Self::System, Self::Important, Self::Task];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Important => "important",
            Self::Task => "task",
        }
    }

    /// Presentation metadata for this group.
    #[must_use]
    pub fn group(self) -> MessageGroup {
        MessageGroup::for_key(self)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKey {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "important" => Ok(Self::Important),
            "task" => Ok(Self::Task),
            other => Err(ClientError::InvalidRequest(format!(
                "unknown message group: {other}"
            ))),
        }
    }
}

/// Static display metadata for a group. `key` is `None` for messages whose
/// topic is missing or not one of the known groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageGroup {
    pub key: Option<GroupKey>,
    pub icon: &'static str,
    pub color_class: &'static str,
    pub label: &'static str,
}

impl MessageGroup {
    pub const UNCLASSIFIED: Self = Self {
        key: None,
        icon: "circle",
        color_class: "secondary",
        label: "Message",
    };

    #[must_use]
    pub const fn for_key(key: GroupKey) -> Self {
        match key {
            GroupKey::System => Self {
                key: Some(key),
                icon: "fa-user",
                color_class: "success",
                label: "System",
            },
            GroupKey::Important => Self {
                key: Some(key),
                icon: "envelope",
                color_class: "danger",
                label: "Important",
            },
            GroupKey::Task => Self {
                key: Some(key),
                icon: "bell",
                color_class: "warning",
                label: "Task",
            },
        }
    }
}

/// A received notification.
///
/// Messages carry no id. Inbox entries are `Arc<Message>` handles and removal
/// compares handles, so two messages with equal content stay distinct.
///
/// The hub server emits `{"topic", "data"}`; both are accepted as aliases.
/// A missing, empty or unknown topic leaves `group_key` as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(
        alias = "topic",
        default,
        deserialize_with = "lenient_group",
        skip_serializing_if = "Option::is_none"
    )]
    pub group_key: Option<GroupKey>,
    #[serde(alias = "data", default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl Message {
    pub fn new(group_key: GroupKey, payload: impl Into<Value>) -> Self {
        Self {
            group_key: Some(group_key),
            payload: payload.into(),
            recipient: None,
        }
    }

    /// A message outside the known groups.
    pub fn unclassified(payload: impl Into<Value>) -> Self {
        Self {
            group_key: None,
            payload: payload.into(),
            recipient: None,
        }
    }

    #[must_use]
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    #[must_use]
    pub fn group(&self) -> MessageGroup {
        self.group_key
            .map_or(MessageGroup::UNCLASSIFIED, GroupKey::group)
    }

    /// Payload as display text: strings verbatim, everything else as JSON.
    #[must_use]
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Opening handshake frame: the full active identity record.
#[derive(Debug, Serialize)]
pub struct Announcement<'a> {
    pub name: &'a str,
    pub username: &'a str,
    pub token: &'a str,
    pub messages: &'a [Arc<Message>],
}

fn lenient_group<'de, D>(deserializer: D) -> Result<Option<GroupKey>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|topic| topic.parse().ok()))
}

/// Decode inbound frame text into a message.
///
/// Only text that is not JSON is rejected. JSON that does not have the
/// message shape becomes an unclassified message carrying the whole value.
pub fn decode_frame(text: &str) -> Result<Message, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;
    if value.is_object()
        && let Ok(message) = Message::deserialize(&value)
    {
        return Ok(message);
    }
    Ok(Message::unclassified(value))
}

/// Decode a binary frame; its bytes must be UTF-8 JSON.
pub fn decode_binary_frame(bytes: Vec<u8>) -> Result<Message, FrameError> {
    let text = String::from_utf8(bytes).map_err(FrameError::InvalidUtf8)?;
    decode_frame(&text)
}
