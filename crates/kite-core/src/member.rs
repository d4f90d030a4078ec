//! Channel members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::channel::ChannelName;
use crate::correlation::Correlations;
use crate::error::KiteError;
use crate::route::Route;

/// Connector-specific raw identity of a member, such as a Telegram user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberId(String);

impl MemberId {
    /// Create a member id.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the id is empty or blank.
    pub fn new(id: impl Into<String>) -> Result<Self, KiteError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(KiteError::validation("Member id cannot be empty"));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MemberId {
    type Error = KiteError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<MemberId> for String {
    fn from(id: MemberId) -> Self {
        id.0
    }
}

/// A guest message forwarded to the host and not yet superseded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unanswered {
    /// The guest who sent it.
    pub guest: MemberId,
    /// The message id as the guest knows it.
    pub message_id: String,
}

/// A channel member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub channel_name: ChannelName,
    pub user_name: String,
    pub is_host: bool,
    /// Current route; `None` while disconnected.
    pub connection: Option<Route>,
    /// Host only: the guest the host talked to last, used when a host
    /// message names no recipient and replies to nothing.
    pub peer: Option<MemberId>,
    /// Host only: outbound message id delivered to the host, mapped to the
    /// guest message it carried.
    pub unanswered: Correlations<Unanswered>,
    pub last_message_id: Option<String>,
    pub last_active: DateTime<Utc>,
}

impl Member {
    /// Create the host of a channel.
    #[must_use]
    pub fn host(
        id: MemberId,
        channel_name: ChannelName,
        user_name: Option<String>,
        route: Route,
        unanswered_capacity: usize,
    ) -> Self {
        Self::new(id, channel_name, user_name, route, true, unanswered_capacity)
    }

    /// Create a guest of a channel.
    #[must_use]
    pub fn guest(
        id: MemberId,
        channel_name: ChannelName,
        user_name: Option<String>,
        route: Route,
    ) -> Self {
        Self::new(id, channel_name, user_name, route, false, 1)
    }

    fn new(
        id: MemberId,
        channel_name: ChannelName,
        user_name: Option<String>,
        route: Route,
        is_host: bool,
        unanswered_capacity: usize,
    ) -> Self {
        let user_name = user_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.to_string());
        Self {
            id,
            channel_name,
            user_name,
            is_host,
            connection: Some(route),
            peer: None,
            unanswered: Correlations::new(unanswered_capacity),
            last_message_id: None,
            last_active: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Bind the member to `route`.
    ///
    /// Returns `true` if the route changed.
    pub fn connect(&mut self, route: Route) -> bool {
        let changed = self.connection.as_ref() != Some(&route);
        self.connection = Some(route);
        self.last_active = Utc::now();
        changed
    }

    /// Unbind the member from its route, returning the old one.
    pub fn disconnect(&mut self) -> Option<Route> {
        self.connection.take()
    }

    /// Remember that `outbound_id` delivered `guest_message_id` from `guest`
    /// to this host.
    pub fn record_unanswered(
        &mut self,
        outbound_id: impl Into<String>,
        guest: MemberId,
        guest_message_id: impl Into<String>,
    ) {
        let evicted = self.unanswered.insert(
            outbound_id,
            Unanswered {
                guest,
                message_id: guest_message_id.into(),
            },
        );
        if let Some((id, _)) = evicted {
            trace!(member = %self.id, message = %id, "Evicted unanswered message");
        }
    }

    /// Look up the guest message behind an outbound id the host replies to.
    #[must_use]
    pub fn resolve_reply(&self, outbound_id: &str) -> Option<&Unanswered> {
        self.unanswered.get(outbound_id)
    }

    /// Record activity.
    pub fn touch(&mut self, message_id: impl Into<String>, at: DateTime<Utc>) {
        self.last_message_id = Some(message_id.into());
        self.last_active = at;
    }
}
