//! Channel aggregate.
//!
//! A channel is a named conversation with exactly one host and any number of
//! guests. Members are stored separately and referenced by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::correlation::Correlations;
use crate::error::KiteError;
use crate::member::MemberId;

/// Minimum channel name length.
pub const MIN_CHANNEL_NAME_LENGTH: usize = 8;

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 32;

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Channel name may contain only letters, digits, '_' and '-'");
    }
    if name.len() < MIN_CHANNEL_NAME_LENGTH {
        return Err("Channel name must be at least 8 characters long");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name must be at most 32 characters long");
    }
    Ok(())
}

/// A validated, case-sensitive channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    /// Create a channel name.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the name does not match the pattern.
    pub fn new(name: impl Into<String>) -> Result<Self, KiteError> {
        let name = name.into();
        validate_channel_name(&name).map_err(KiteError::validation)?;
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = KiteError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ChannelName> for String {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

/// A delivered message waiting for the recipient's acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAck {
    pub sender: MemberId,
    /// The message id as the sender knows it.
    pub sender_message_id: String,
    pub recipient: MemberId,
}

/// A channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: ChannelName,
    pub host_id: MemberId,
    /// Ids of every member, host included.
    pub members: BTreeSet<MemberId>,
    /// Outbound message id to the delivery it belongs to.
    pub pending_acks: Correlations<PendingAck>,
    /// Optimistic concurrency token, 0 until first stored.
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// Create a new, unsaved channel hosted by `host_id`.
    #[must_use]
    pub fn new(name: ChannelName, host_id: MemberId, pending_ack_capacity: usize) -> Self {
        let mut members = BTreeSet::new();
        members.insert(host_id.clone());
        Self {
            name,
            host_id,
            members,
            pending_acks: Correlations::new(pending_ack_capacity),
            version: 0,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_hosted_by(&self, member_id: &MemberId) -> bool {
        &self.host_id == member_id
    }

    /// Ids of every member except the host.
    pub fn guests(&self) -> impl Iterator<Item = &MemberId> {
        self.members.iter().filter(move |id| **id != self.host_id)
    }

    /// Add a member. Returns `true` if it was not present.
    pub fn add_member(&mut self, member_id: MemberId) -> bool {
        let added = self.members.insert(member_id);
        if added {
            debug!(channel = %self.name, members = self.members.len(), "Member added");
        }
        added
    }

    /// Remember that `outbound_id` awaits an acknowledgement.
    pub fn track_delivery(&mut self, outbound_id: impl Into<String>, pending: PendingAck) {
        if let Some((id, _)) = self.pending_acks.insert(outbound_id, pending) {
            debug!(channel = %self.name, message = %id, "Dropped oldest pending acknowledgement");
        }
    }

    /// Resolve and forget a pending acknowledgement.
    pub fn take_pending(&mut self, outbound_id: &str) -> Option<PendingAck> {
        self.pending_acks.remove(outbound_id)
    }
}
