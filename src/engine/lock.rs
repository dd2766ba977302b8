//! Per-target serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::network::PlatformKind;

/// Identifies what an invocation mutates.
pub type TargetKey = (PlatformKind, String);

/// One async lock per `(platform, interface)`.
///
/// Invocations on the same target queue behind each other; different
/// targets proceed concurrently. Locks are created on first use and dropped
/// once nothing holds or awaits them.
#[derive(Debug, Default)]
pub struct TargetLocks {
    locks: Mutex<HashMap<TargetKey, Arc<AsyncMutex<()>>>>,
}

impl TargetLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &TargetKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Guards and waiters each hold a clone; a count of one means idle.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: &TargetKey) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    /// Waits for exclusive access to every key, locking in sorted order so
    /// two multi-target invocations cannot deadlock.
    pub async fn acquire_all(&self, keys: &[TargetKey]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&TargetKey> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.acquire(key).await);
        }
        guards
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn key(platform: PlatformKind, iface: &str) -> TargetKey {
        (platform, iface.to_string())
    }

    fn slots(locks: &TargetLocks) -> usize {
        locks.locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn same_target_is_exclusive() {
        let locks = TargetLocks::new();
        let target = key(PlatformKind::Linux, "eth0");
        let _held = locks.acquire(&target).await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&target)).await;

        assert!(second.is_err());
    }

    #[tokio::test]
    async fn different_targets_do_not_block() {
        let locks = TargetLocks::new();
        let _eth0 = locks.acquire(&key(PlatformKind::Linux, "eth0")).await;

        let other = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(&key(PlatformKind::Linux, "eth1")),
        )
        .await;
        let other_platform = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(&key(PlatformKind::Kubernetes, "eth0")),
        )
        .await;

        assert!(other.is_ok());
        assert!(other_platform.is_ok());
    }

    #[tokio::test]
    async fn released_lock_can_be_retaken() {
        let locks = TargetLocks::new();
        let target = key(PlatformKind::Windows, "Ethernet");
        drop(locks.acquire(&target).await);

        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&target)).await;

        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn idle_slots_are_evicted() {
        let locks = TargetLocks::new();
        let held = locks.acquire(&key(PlatformKind::Linux, "eth0")).await;
        for n in 0..50 {
            drop(locks.acquire(&key(PlatformKind::Linux, &format!("veth{n}"))).await);
        }

        assert_eq!(slots(&locks), 2);

        drop(held);
        drop(locks.acquire(&key(PlatformKind::Linux, "eth1")).await);

        assert_eq!(slots(&locks), 1);
    }

    #[tokio::test]
    async fn pruning_keeps_busy_slots() {
        let locks = Arc::new(TargetLocks::new());
        let target = key(PlatformKind::Linux, "eth0");
        let held = locks.acquire(&target).await;
        let waiter = tokio::spawn({
            let locks = Arc::clone(&locks);
            let target = target.clone();
            async move { drop(locks.acquire(&target).await) }
        });
        tokio::task::yield_now().await;

        drop(locks.acquire(&key(PlatformKind::Linux, "eth1")).await);
        let blocked =
            tokio::time::timeout(Duration::from_millis(20), locks.acquire(&target)).await;
        assert!(blocked.is_err());

        drop(held);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn acquire_all_dedups_keys() {
        let locks = TargetLocks::new();
        let eth0 = key(PlatformKind::Linux, "eth0");

        let guards = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire_all(&[eth0.clone(), eth0.clone(), key(PlatformKind::Linux, "eth1")]),
        )
        .await
        .unwrap();

        assert_eq!(guards.len(), 2);
    }
}
