//! Message history.
//!
//! Every routed message is remembered per conversation, that is per guest of
//! a channel, so a guest that reconnects can be shown what was said before.
//! The history lives in memory and keeps only the newest messages of each
//! conversation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kite_core::{ChannelName, Delivery, Direction, Event, MemberId};
use kite_protocol::MessagePayload;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Default number of messages kept per conversation.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default number of messages a query returns.
pub const DEFAULT_QUERY_LIMIT: usize = 20;

/// One remembered message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryMessage {
    pub direction: Direction,
    /// The message as its sender wrote it.
    pub payload: MessagePayload,
}

/// Which side of the reference time a query looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Before,
    After,
}

/// A window into one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub channel: ChannelName,
    pub member: MemberId,
    pub from: DateTime<Utc>,
    pub lookup: Lookup,
    pub limit: usize,
}

impl Query {
    /// The latest messages sent strictly before `at`.
    #[must_use]
    pub fn before(channel: ChannelName, member: MemberId, at: DateTime<Utc>) -> Self {
        Self {
            channel,
            member,
            from: at,
            lookup: Lookup::Before,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }

    /// The earliest messages sent strictly after `at`.
    #[must_use]
    pub fn after(channel: ChannelName, member: MemberId, at: DateTime<Utc>) -> Self {
        Self {
            channel,
            member,
            from: at,
            lookup: Lookup::After,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// What [`History::record`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Appended,
    /// A message with the same id was already there and got replaced.
    Edited,
}

type ConversationKey = (ChannelName, MemberId);

/// Bounded in-memory message history.
#[derive(Debug)]
pub struct History {
    conversations: DashMap<ConversationKey, VecDeque<HistoryMessage>>,
    capacity: usize,
}

impl History {
    /// Create a history that keeps up to `capacity` messages per
    /// conversation. A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remember a message of the conversation with `member`.
    ///
    /// A message whose id is already known in that conversation is an edit
    /// and replaces the stored payload in place.
    pub fn record(
        &self,
        channel: &ChannelName,
        member: &MemberId,
        direction: Direction,
        payload: MessagePayload,
    ) -> Recorded {
        let mut messages = self
            .conversations
            .entry((channel.clone(), member.clone()))
            .or_default();

        if let Some(existing) = messages
            .iter_mut()
            .find(|m| m.payload.message_id() == payload.message_id())
        {
            existing.payload = payload;
            return Recorded::Edited;
        }

        if messages.len() >= self.capacity {
            if let Some(oldest) = messages.pop_front() {
                trace!(
                    %channel,
                    %member,
                    message = oldest.payload.message_id(),
                    "History full, oldest message dropped"
                );
            }
        }
        messages.push_back(HistoryMessage { direction, payload });
        Recorded::Appended
    }

    #[must_use]
    pub fn find(
        &self,
        channel: &ChannelName,
        member: &MemberId,
        message_id: &str,
    ) -> Option<HistoryMessage> {
        let messages = self.conversations.get(&(channel.clone(), member.clone()))?;
        messages
            .iter()
            .find(|m| m.payload.message_id() == message_id)
            .cloned()
    }

    /// Forget one message. Returns `true` if it was there.
    pub fn delete(&self, channel: &ChannelName, member: &MemberId, message_id: &str) -> bool {
        let Some(mut messages) = self.conversations.get_mut(&(channel.clone(), member.clone()))
        else {
            return false;
        };
        let before = messages.len();
        messages.retain(|m| m.payload.message_id() != message_id);
        messages.len() != before
    }

    /// Forget a whole conversation. Returns the number of messages dropped.
    pub fn delete_member(&self, channel: &ChannelName, member: &MemberId) -> usize {
        self.conversations
            .remove(&(channel.clone(), member.clone()))
            .map_or(0, |(_, messages)| messages.len())
    }

    /// Forget every conversation of a channel. Returns the number of
    /// messages dropped.
    pub fn delete_channel(&self, channel: &ChannelName) -> usize {
        let mut dropped = 0;
        self.conversations.retain(|(name, _), messages| {
            if name == channel {
                dropped += messages.len();
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Messages of one conversation around `query.from`, oldest first.
    #[must_use]
    pub fn query(&self, query: &Query) -> Vec<HistoryMessage> {
        let Some(messages) = self
            .conversations
            .get(&(query.channel.clone(), query.member.clone()))
        else {
            return Vec::new();
        };

        let mut found: Vec<HistoryMessage> = messages
            .iter()
            .filter(|m| match query.lookup {
                Lookup::Before => m.payload.timestamp() < query.from,
                Lookup::After => m.payload.timestamp() > query.from,
            })
            .cloned()
            .collect();
        found.sort_by_key(|m| m.payload.timestamp());

        match query.lookup {
            Lookup::Before => {
                let skip = found.len().saturating_sub(query.limit);
                found.drain(..skip);
            }
            Lookup::After => found.truncate(query.limit),
        }
        found
    }

    /// Keep the history in step with what happened in the channels.
    pub fn apply(&self, event: &Event) {
        match event {
            Event::MessageRouted {
                channel,
                member,
                direction,
                request,
                ..
            } => {
                let recorded = self.record(channel, member, *direction, request.clone());
                trace!(
                    %channel,
                    %member,
                    message = request.message_id(),
                    ?recorded,
                    "Message recorded"
                );
            }
            Event::MemberDeleted {
                channel_name,
                member_id,
            } => {
                self.delete_member(channel_name, member_id);
            }
            Event::ChannelDropped { channel_name } => {
                let dropped = self.delete_channel(channel_name);
                debug!(channel = %channel_name, dropped, "Channel history deleted");
            }
            _ => {}
        }
    }

    /// Deliveries that show a reconnecting member its latest `limit`
    /// messages. Empty for every other event.
    #[must_use]
    pub fn replay(&self, event: &Event, limit: usize) -> Vec<Delivery> {
        let Event::MemberConnected {
            channel_name,
            member_id,
            route,
        } = event
        else {
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }

        let query =
            Query::before(channel_name.clone(), member_id.clone(), Utc::now()).with_limit(limit);
        self.query(&query)
            .into_iter()
            .map(|m| Delivery::new(route.clone(), m.payload.into()))
            .collect()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
