//! Channel persistence contract.
//!
//! The router only depends on [`Channels`]; stores live behind it. Every
//! command persists through exactly one [`Channels::save`] or
//! [`Channels::delete`] call, so a store that applies each call atomically
//! never observes a half-applied command.

mod memory;

pub use memory::InMemoryChannels;

use async_trait::async_trait;
use std::sync::Arc;

use crate::channel::{Channel, ChannelName};
use crate::error::Result;
use crate::member::{Member, MemberId};
use crate::route::Route;

/// A channel together with the members a command changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUpdate {
    /// Carries the version it was read at.
    pub channel: Channel,
    /// Created or modified members. Members no longer listed in
    /// `channel.members` are removed.
    pub members: Vec<Member>,
}

impl ChannelUpdate {
    #[must_use]
    pub fn new(channel: Channel, members: Vec<Member>) -> Self {
        Self { channel, members }
    }
}

/// Channel and member storage.
#[async_trait]
pub trait Channels: Send + Sync {
    async fn find_by_name(&self, name: &ChannelName) -> Result<Option<Channel>>;

    /// The channel `host_id` hosts, if any.
    async fn find_hosted_by(&self, host_id: &MemberId) -> Result<Option<Channel>>;

    async fn find_member(
        &self,
        channel_name: &ChannelName,
        member_id: &MemberId,
    ) -> Result<Option<Member>>;

    /// The member currently bound to `route`, in any channel.
    async fn find_member_by_connection(&self, route: &Route) -> Result<Option<Member>>;

    /// Store a channel and its changed members in one atomic step.
    ///
    /// Returns the stored channel with its version advanced.
    ///
    /// # Errors
    ///
    /// Fails with a conflict when the stored version differs from
    /// `update.channel.version` (absent channels count as version 0), when
    /// the host already hosts another channel, or when a member's route is
    /// bound to a different member.
    async fn save(&self, update: ChannelUpdate) -> Result<Channel>;

    /// Delete a channel and all of its members, returning the members.
    ///
    /// # Errors
    ///
    /// Fails with not found when the channel does not exist.
    async fn delete(&self, name: &ChannelName) -> Result<Vec<Member>>;
}

#[async_trait]
impl<T: Channels + ?Sized> Channels for Arc<T> {
    async fn find_by_name(&self, name: &ChannelName) -> Result<Option<Channel>> {
        (**self).find_by_name(name).await
    }

    async fn find_hosted_by(&self, host_id: &MemberId) -> Result<Option<Channel>> {
        (**self).find_hosted_by(host_id).await
    }

    async fn find_member(
        &self,
        channel_name: &ChannelName,
        member_id: &MemberId,
    ) -> Result<Option<Member>> {
        (**self).find_member(channel_name, member_id).await
    }

    async fn find_member_by_connection(&self, route: &Route) -> Result<Option<Member>> {
        (**self).find_member_by_connection(route).await
    }

    async fn save(&self, update: ChannelUpdate) -> Result<Channel> {
        (**self).save(update).await
    }

    async fn delete(&self, name: &ChannelName) -> Result<Vec<Member>> {
        (**self).delete(name).await
    }
}
