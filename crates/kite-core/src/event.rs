//! Domain events and their fan-out.
//!
//! The router returns events as data; the caller publishes them on an
//! [`EventBus`]. Publishing never waits for listeners.

use kite_protocol::MessagePayload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::channel::{Channel, ChannelName};
use crate::connector::Delivery;
use crate::member::{Member, MemberId};
use crate::route::Route;

/// Default event bus capacity.
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Which way a message travelled through its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    GuestToHost,
    HostToGuest,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::GuestToHost => "guest_to_host",
            Direction::HostToGuest => "host_to_guest",
        }
    }
}

/// Something that happened to a channel or a member.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ChannelCreated {
        channel: Channel,
    },
    ChannelUpdated {
        channel: Channel,
    },
    ChannelDropped {
        channel_name: ChannelName,
    },
    MemberCreated {
        member: Member,
    },
    MemberConnected {
        channel_name: ChannelName,
        member_id: MemberId,
        route: Route,
    },
    MemberDisconnected {
        channel_name: ChannelName,
        member_id: MemberId,
        route: Route,
    },
    MemberDeleted {
        channel_name: ChannelName,
        member_id: MemberId,
    },
    MessageRouted {
        channel: ChannelName,
        /// The guest side of the conversation, whichever way it went.
        member: MemberId,
        direction: Direction,
        request: MessagePayload,
        responses: Vec<Delivery>,
    },
}

impl Event {
    /// Event name as used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::ChannelCreated { .. } => "channel_created",
            Event::ChannelUpdated { .. } => "channel_updated",
            Event::ChannelDropped { .. } => "channel_dropped",
            Event::MemberCreated { .. } => "member_created",
            Event::MemberConnected { .. } => "member_connected",
            Event::MemberDisconnected { .. } => "member_disconnected",
            Event::MemberDeleted { .. } => "member_deleted",
            Event::MessageRouted { .. } => "message_routed",
        }
    }

    /// Name of the channel the event belongs to.
    #[must_use]
    pub fn channel_name(&self) -> &ChannelName {
        match self {
            Event::ChannelCreated { channel } | Event::ChannelUpdated { channel } => &channel.name,
            Event::MemberCreated { member } => &member.channel_name,
            Event::ChannelDropped { channel_name }
            | Event::MemberConnected { channel_name, .. }
            | Event::MemberDisconnected { channel_name, .. }
            | Event::MemberDeleted { channel_name, .. } => channel_name,
            Event::MessageRouted { channel, .. } => channel,
        }
    }
}

/// Broadcast fan-out of events to any number of listeners.
///
/// Slow listeners lag and are told how many events they missed; they never
/// hold up the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<Event>>,
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a bus that buffers up to `capacity` events per listener.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.sender.subscribe()
    }

    /// Publish an event.
    ///
    /// Returns the number of listeners that received it.
    pub fn publish(&self, event: Event) -> usize {
        trace!(event = event.name(), channel = %event.channel_name(), "Publishing event");
        self.sender.send(Arc::new(event)).unwrap_or_default()
    }

    /// Publish events in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.publish(event);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
