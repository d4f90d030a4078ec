use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::{ChannelUpdate, Channels};
use crate::channel::{Channel, ChannelName};
use crate::error::{KiteError, Result};
use crate::member::{Member, MemberId};
use crate::route::Route;

/// In-memory channel store for tests and single-process embedding.
///
/// Every call takes the store-wide lock once, so `save` and `delete` are
/// atomic with respect to each other. Cloning shares the same store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChannels {
    inner: Arc<RwLock<Store>>,
}

#[derive(Debug, Default)]
struct Store {
    channels: HashMap<ChannelName, Channel>,
    members: HashMap<ChannelName, HashMap<MemberId, Member>>,
    /// Host id to the channel it hosts.
    hosts: HashMap<MemberId, ChannelName>,
    /// Bound route to the member behind it.
    connections: HashMap<Route, (ChannelName, MemberId)>,
}

impl InMemoryChannels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored channels.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the store lock is poisoned.
    pub fn channel_count(&self) -> Result<usize> {
        Ok(self.read()?.channels.len())
    }

    /// Number of stored members across all channels.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the store lock is poisoned.
    pub fn member_count(&self) -> Result<usize> {
        Ok(self.read()?.members.values().map(HashMap::len).sum())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Store>> {
        self.inner
            .read()
            .map_err(|_| KiteError::internal("channel store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Store>> {
        self.inner
            .write()
            .map_err(|_| KiteError::internal("channel store lock poisoned"))
    }
}

impl Store {
    fn check(&self, channel: &Channel, members: &[Member]) -> Result<()> {
        let name = &channel.name;

        if let Some(existing) = self.channels.get(name) {
            if existing.host_id != channel.host_id {
                return Err(KiteError::conflict("Channel name is already taken"));
            }
        }

        let stored_version = self.channels.get(name).map_or(0, |c| c.version);
        if stored_version != channel.version {
            return Err(KiteError::conflict(format!(
                "Channel {name} was modified concurrently, please retry"
            )));
        }

        if let Some(hosted) = self.hosts.get(&channel.host_id) {
            if hosted != name {
                return Err(KiteError::conflict("You cannot host more than one channel"));
            }
        }

        let mut routes = HashSet::new();
        for member in members {
            if member.channel_name != *name || !channel.members.contains(&member.id) {
                return Err(KiteError::internal(format!(
                    "member {} is not listed in channel {name}",
                    member.id
                )));
            }
            if member.is_host != channel.is_hosted_by(&member.id) {
                return Err(KiteError::internal(format!(
                    "host flag of member {} disagrees with channel {name}",
                    member.id
                )));
            }

            let Some(route) = &member.connection else {
                continue;
            };
            if !routes.insert(route) {
                return Err(KiteError::conflict(format!(
                    "Route {route} is already used by another member"
                )));
            }
            if let Some((bound_channel, bound_member)) = self.connections.get(route) {
                if bound_channel != name || *bound_member != member.id {
                    return Err(KiteError::conflict(format!(
                        "Route {route} is already used by another member"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Channels for InMemoryChannels {
    async fn find_by_name(&self, name: &ChannelName) -> Result<Option<Channel>> {
        Ok(self.read()?.channels.get(name).cloned())
    }

    async fn find_hosted_by(&self, host_id: &MemberId) -> Result<Option<Channel>> {
        let store = self.read()?;
        Ok(store
            .hosts
            .get(host_id)
            .and_then(|name| store.channels.get(name))
            .cloned())
    }

    async fn find_member(
        &self,
        channel_name: &ChannelName,
        member_id: &MemberId,
    ) -> Result<Option<Member>> {
        Ok(self
            .read()?
            .members
            .get(channel_name)
            .and_then(|members| members.get(member_id))
            .cloned())
    }

    async fn find_member_by_connection(&self, route: &Route) -> Result<Option<Member>> {
        let store = self.read()?;
        Ok(store
            .connections
            .get(route)
            .and_then(|(channel, id)| store.members.get(channel)?.get(id))
            .cloned())
    }

    async fn save(&self, update: ChannelUpdate) -> Result<Channel> {
        let ChannelUpdate {
            mut channel,
            members,
        } = update;

        let mut guard = self.write()?;
        let store = &mut *guard;
        store.check(&channel, &members)?;

        channel.version += 1;
        let name = channel.name.clone();
        let stored = store.members.entry(name.clone()).or_default();

        let removed: Vec<MemberId> = stored
            .keys()
            .filter(|id| !channel.members.contains(*id))
            .cloned()
            .collect();
        for id in removed {
            if let Some(route) = stored.remove(&id).and_then(|m| m.connection) {
                store.connections.remove(&route);
            }
        }

        for member in members {
            if let Some(old) = stored.get(&member.id).and_then(|m| m.connection.as_ref()) {
                store.connections.remove(old);
            }
            if let Some(route) = &member.connection {
                store
                    .connections
                    .insert(route.clone(), (name.clone(), member.id.clone()));
            }
            stored.insert(member.id.clone(), member);
        }

        store.hosts.insert(channel.host_id.clone(), name.clone());
        store.channels.insert(name, channel.clone());

        debug!(channel = %channel.name, version = channel.version, "Channel saved");
        Ok(channel)
    }

    async fn delete(&self, name: &ChannelName) -> Result<Vec<Member>> {
        let mut guard = self.write()?;
        let store = &mut *guard;

        let channel = store
            .channels
            .remove(name)
            .ok_or_else(|| KiteError::not_found(format!("Channel {name} not found")))?;
        store.hosts.remove(&channel.host_id);

        let mut members: Vec<Member> = store
            .members
            .remove(name)
            .map(|m| m.into_values().collect())
            .unwrap_or_default();
        for route in members.iter().filter_map(|m| m.connection.as_ref()) {
            store.connections.remove(route);
        }
        members.sort_by(|a, b| a.id.cmp(&b.id));

        debug!(channel = %name, members = members.len(), "Channel deleted");
        Ok(members)
    }
}
