//! Payload types for the Kite protocol.
//!
//! Payloads are what crosses the wire between the relay and a connector.
//! The same types serialize to JSON (tagged by `type`) for logging and event
//! listeners; the positional MessagePack form lives in [`crate::codec`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload type identifiers, the first element of every encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum PayloadType {
    Join = 0,
    Ack = 1,
    Error = 2,
    Plaintext = 3,
    Binary = 4,
    Notification = 5,
}

impl PayloadType {
    /// Number of array elements, tag included, an encoded payload of this type carries.
    #[must_use]
    pub const fn field_count(self) -> usize {
        match self {
            PayloadType::Join => 4,
            PayloadType::Ack => 4,
            PayloadType::Error => 3,
            PayloadType::Plaintext => 5,
            PayloadType::Binary => 8,
            PayloadType::Notification => 3,
        }
    }
}

impl From<PayloadType> for u8 {
    fn from(pt: PayloadType) -> u8 {
        pt as u8
    }
}

impl TryFrom<u8> for PayloadType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(PayloadType::Join),
            1 => Ok(PayloadType::Ack),
            2 => Ok(PayloadType::Error),
            3 => Ok(PayloadType::Plaintext),
            4 => Ok(PayloadType::Binary),
            5 => Ok(PayloadType::Notification),
            _ => Err("Invalid payload type"),
        }
    }
}

/// How a notification should be presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Severity {
    #[default]
    None = 0,
    Ok = 1,
    Warn = 2,
    Error = 3,
}

impl From<Severity> for u8 {
    fn from(s: Severity) -> u8 {
        s as u8
    }
}

impl TryFrom<u8> for Severity {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(Severity::None),
            1 => Ok(Severity::Ok),
            2 => Ok(Severity::Warn),
            3 => Ok(Severity::Error),
            _ => Err("Invalid severity"),
        }
    }
}

/// A member announcing itself to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChannel {
    pub member_id: String,
    /// Display name; connectors fall back to the member id when absent.
    pub member_name: Option<String>,
    pub channel_name: String,
}

/// Delivery confirmation for a routed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAck {
    /// Id of the message as its sender knows it.
    pub message_id: String,
    /// Id the relay minted for the delivered copy.
    pub destination_message_id: String,
    pub delivered_at: DateTime<Utc>,
}

/// A user-facing failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub reason: String,
    pub code: u16,
}

/// A text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextMessage {
    pub message_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Id of the message this one answers, as the receiving side knows it.
    pub in_reply_to: Option<String>,
}

/// A file uploaded elsewhere and referenced by uri.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMessage {
    pub message_id: String,
    pub uri: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub timestamp: DateTime<Utc>,
    pub in_reply_to: Option<String>,
}

/// A relay-originated message shown to the user, such as a command reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub text: String,
    pub severity: Severity,
}

/// A protocol payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Join(JoinChannel),
    Ack(MessageAck),
    Error(ErrorResponse),
    Plaintext(PlaintextMessage),
    Binary(BinaryMessage),
    Notification(Notification),
}

impl Payload {
    /// Create a plaintext payload stamped with the current time.
    #[must_use]
    pub fn plaintext(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Payload::Plaintext(PlaintextMessage {
            message_id: message_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
            in_reply_to: None,
        })
    }

    /// Create an error payload.
    #[must_use]
    pub fn error(reason: impl Into<String>, code: u16) -> Self {
        Payload::Error(ErrorResponse {
            reason: reason.into(),
            code,
        })
    }

    /// Create a notification payload.
    #[must_use]
    pub fn notification(text: impl Into<String>, severity: Severity) -> Self {
        Payload::Notification(Notification {
            text: text.into(),
            severity,
        })
    }

    /// Create an acknowledgement payload.
    #[must_use]
    pub fn ack(
        message_id: impl Into<String>,
        destination_message_id: impl Into<String>,
        delivered_at: DateTime<Utc>,
    ) -> Self {
        Payload::Ack(MessageAck {
            message_id: message_id.into(),
            destination_message_id: destination_message_id.into(),
            delivered_at,
        })
    }

    /// Get the payload type.
    #[must_use]
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Payload::Join(_) => PayloadType::Join,
            Payload::Ack(_) => PayloadType::Ack,
            Payload::Error(_) => PayloadType::Error,
            Payload::Plaintext(_) => PayloadType::Plaintext,
            Payload::Binary(_) => PayloadType::Binary,
            Payload::Notification(_) => PayloadType::Notification,
        }
    }

    /// Check if this payload reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Payload::Error(_))
    }
}

/// The payloads one member can send to another through a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Plaintext(PlaintextMessage),
    Binary(BinaryMessage),
}

impl MessagePayload {
    #[must_use]
    pub fn message_id(&self) -> &str {
        match self {
            MessagePayload::Plaintext(m) => &m.message_id,
            MessagePayload::Binary(m) => &m.message_id,
        }
    }

    #[must_use]
    pub fn in_reply_to(&self) -> Option<&str> {
        match self {
            MessagePayload::Plaintext(m) => m.in_reply_to.as_deref(),
            MessagePayload::Binary(m) => m.in_reply_to.as_deref(),
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MessagePayload::Plaintext(m) => m.timestamp,
            MessagePayload::Binary(m) => m.timestamp,
        }
    }

    /// Rebuild the payload with a different message id, keeping the content.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        let id = message_id.into();
        match &mut self {
            MessagePayload::Plaintext(m) => m.message_id = id,
            MessagePayload::Binary(m) => m.message_id = id,
        }
        self
    }

    /// Rebuild the payload with a different reply reference.
    #[must_use]
    pub fn with_in_reply_to(mut self, in_reply_to: Option<String>) -> Self {
        match &mut self {
            MessagePayload::Plaintext(m) => m.in_reply_to = in_reply_to,
            MessagePayload::Binary(m) => m.in_reply_to = in_reply_to,
        }
        self
    }
}

impl From<MessagePayload> for Payload {
    fn from(m: MessagePayload) -> Self {
        match m {
            MessagePayload::Plaintext(p) => Payload::Plaintext(p),
            MessagePayload::Binary(b) => Payload::Binary(b),
        }
    }
}

impl TryFrom<Payload> for MessagePayload {
    type Error = Payload;

    /// Returns the payload unchanged when it is not a member message.
    fn try_from(p: Payload) -> Result<Self, Self::Error> {
        match p {
            Payload::Plaintext(m) => Ok(MessagePayload::Plaintext(m)),
            Payload::Binary(b) => Ok(MessagePayload::Binary(b)),
            other => Err(other),
        }
    }
}
