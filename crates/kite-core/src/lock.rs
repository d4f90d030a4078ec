//! Per-channel mutual exclusion.
//!
//! Commands touching the same channel run one at a time; commands on
//! different channels never wait for each other.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use crate::channel::ChannelName;

type LockMap = DashMap<ChannelName, Arc<Mutex<()>>>;

/// Keyed async locks, one per channel name in use.
#[derive(Debug, Default)]
pub struct ChannelLocks {
    locks: Arc<LockMap>,
}

impl ChannelLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `name`.
    pub async fn lock(&self, name: &ChannelName) -> ChannelGuard {
        let lock = self.locks.entry(name.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        trace!(channel = %name, "Channel locked");
        ChannelGuard {
            name: name.clone(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of channels with a live lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one channel.
///
/// Dropping the guard releases the lock and forgets the entry once nobody
/// else holds or waits for it.
#[derive(Debug)]
pub struct ChannelGuard {
    name: ChannelName,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ChannelGuard {
    #[must_use]
    pub fn channel_name(&self) -> &ChannelName {
        &self.name
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        // Release first so our own reference no longer counts.
        self.guard.take();
        self.locks
            .remove_if(&self.name, |_, lock| Arc::strong_count(lock) == 1);
        trace!(channel = %self.name, "Channel unlocked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn name(s: &str) -> ChannelName {
        ChannelName::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_entry_released_after_use() {
        let locks = ChannelLocks::new();
        {
            let guard = locks.lock(&name("support_desk")).await;
            assert_eq!(guard.channel_name().as_str(), "support_desk");
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_channel_is_exclusive() {
        let locks = Arc::new(ChannelLocks::new());
        let guard = locks.lock(&name("support_desk")).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(&name("support_desk")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_channels_do_not_block() {
        let locks = ChannelLocks::new();
        let _a = locks.lock(&name("channel_a")).await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&name("channel_b")))
            .await
            .expect("independent channel should lock immediately");
        assert_eq!(locks.len(), 2);
    }
}
