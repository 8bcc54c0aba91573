use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per key (a bot instance or an account). Different keys never contend.
///
/// Entries nobody holds or waits on are dropped on the next acquire, so the map
/// tracks contention rather than every key ever seen.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Held guards and queued waiters each keep a clone.
            locks.retain(|id, lock| *id == key || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _first = locks.acquire(Uuid::new_v4()).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(Uuid::new_v4())).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = KeyedLocks::new();
        for _ in 0..100 {
            drop(locks.acquire(Uuid::new_v4()).await);
        }
        let held = locks.acquire(Uuid::new_v4()).await;

        let _other = locks.acquire(Uuid::new_v4()).await;

        assert_eq!(locks.tracked().await, 2);
        drop(held);
    }

    #[tokio::test]
    async fn queued_waiter_keeps_its_entry() {
        let locks = Arc::new(KeyedLocks::new());
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(locks.acquire(Uuid::new_v4()).await);
        drop(guard);

        tokio::time::timeout(Duration::from_millis(50), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
