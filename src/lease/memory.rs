use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{expiry_after, validate_ttl, Acquisition, Lease, LeaseError, LeaseManager};

/// Process-local lease table.
///
/// Entries past their deadline count as absent, so expiry needs no sweeper.
#[derive(Default, Clone)]
pub struct InMemoryLeaseManager {
    leases: Arc<Mutex<HashMap<String, (Uuid, Instant)>>>,
}

impl InMemoryLeaseManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseManager for InMemoryLeaseManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Acquisition, LeaseError> {
        validate_ttl(ttl)?;

        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        if let Some((_, deadline)) = leases.get(key) {
            if *deadline > now {
                return Ok(Acquisition::Busy);
            }
        }

        let token = Uuid::new_v4();
        leases.insert(key.to_string(), (token, now + ttl));

        Ok(Acquisition::Acquired(Lease {
            key: key.to_string(),
            token,
            expires_at: expiry_after(ttl),
        }))
    }

    async fn release(&self, lease: &Lease) -> Result<(), LeaseError> {
        let mut leases = self.leases.lock().await;
        if matches!(leases.get(&lease.key), Some((token, _)) if *token == lease.token) {
            leases.remove(&lease.key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_acquire_has_single_winner() {
        let manager = InMemoryLeaseManager::new();
        let ttl = Duration::from_secs(30);

        let attempts = (0..16).map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire("payment:lock:u:a", ttl).await })
        });

        let mut granted = 0;
        let mut busy = 0;
        for attempt in attempts {
            match attempt.await.unwrap().unwrap() {
                Acquisition::Acquired(_) => granted += 1,
                Acquisition::Busy => busy += 1,
            }
        }
        assert_eq!(granted, 1);
        assert_eq!(busy, 15);
    }

    #[tokio::test]
    async fn test_lease_expires_without_release() {
        let manager = InMemoryLeaseManager::new();
        let ttl = Duration::from_millis(40);

        assert!(matches!(
            manager.acquire("k", ttl).await.unwrap(),
            Acquisition::Acquired(_)
        ));
        assert_eq!(manager.acquire("k", ttl).await.unwrap(), Acquisition::Busy);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(matches!(
            manager.acquire("k", ttl).await.unwrap(),
            Acquisition::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let manager = InMemoryLeaseManager::new();
        let Acquisition::Acquired(lease) = manager
            .acquire("k", Duration::from_secs(5))
            .await
            .unwrap()
        else {
            panic!("expected lease");
        };

        manager.release(&lease).await.unwrap();
        manager.release(&lease).await.unwrap();
        assert!(matches!(
            manager.acquire("k", Duration::from_secs(5)).await.unwrap(),
            Acquisition::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_stale_holder_cannot_release_new_lease() {
        let manager = InMemoryLeaseManager::new();
        let Acquisition::Acquired(stale) = manager
            .acquire("k", Duration::from_millis(20))
            .await
            .unwrap()
        else {
            panic!("expected lease");
        };

        tokio::time::sleep(Duration::from_millis(40)).await;
        let Acquisition::Acquired(_current) = manager
            .acquire("k", Duration::from_secs(5))
            .await
            .unwrap()
        else {
            panic!("expected lease after expiry");
        };

        manager.release(&stale).await.unwrap();
        assert_eq!(
            manager.acquire("k", Duration::from_secs(5)).await.unwrap(),
            Acquisition::Busy
        );
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_collide() {
        let manager = InMemoryLeaseManager::new();
        let ttl = Duration::from_secs(5);
        assert!(matches!(
            manager.acquire("payment:lock:u:a", ttl).await.unwrap(),
            Acquisition::Acquired(_)
        ));
        assert!(matches!(
            manager.acquire("payment:lock:u:b", ttl).await.unwrap(),
            Acquisition::Acquired(_)
        ));
    }
}
