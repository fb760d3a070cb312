// ── Per-key async mutexes ──
//
// Reports for one agent (and rollups for one VLAN) are read-modify-write
// sequences against the store. Holding the key's guard for the whole
// sequence keeps them from interleaving.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        // The shard guard must be released before awaiting.
        let mutex = Arc::clone(self.locks.entry(key.to_owned()).or_default().value());
        mutex.lock_owned().await
    }

    /// Guard for all read-modify-write work on one agent's documents.
    pub async fn agent(&self, agent_id: &str) -> OwnedMutexGuard<()> {
        self.lock(&format!("agent:{agent_id}")).await
    }

    /// Guard for the VLAN-scoped traffic rollup.
    pub async fn vlan(&self, vlan: &str) -> OwnedMutexGuard<()> {
        self.lock(&format!("vlan:{vlan}")).await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("a1").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock("a1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("a2")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
