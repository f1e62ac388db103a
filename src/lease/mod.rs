//! Lease Manager
//!
//! Short-lived, named mutual-exclusion leases over a shared key-value store
//! with expiry. Acquisition is set-if-absent and never waits; a lease that is
//! never released clears itself when its TTL runs out.

mod memory;
mod postgres;

pub use memory::InMemoryLeaseManager;
pub use postgres::PgLeaseManager;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A held lease. The token distinguishes this holder from any later holder of
/// the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Result of an acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Acquired(Lease),
    Busy,
}

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid lease ttl: {0:?}")]
    InvalidTtl(Duration),
}

#[async_trait]
pub trait LeaseManager: Send + Sync {
    /// Take `key` for `ttl` if no unexpired lease holds it.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Acquisition, LeaseError>;

    /// Drop the lease. Releasing an expired or foreign lease is a no-op.
    async fn release(&self, lease: &Lease) -> Result<(), LeaseError>;
}

/// Lease held for the duration of a scope.
///
/// Call [`LeaseGuard::release`] on the normal path. If the guard is dropped
/// while still holding the lease (early return, panic, cancelled task) the
/// release is scheduled on the current tokio runtime.
pub struct LeaseGuard {
    manager: Arc<dyn LeaseManager>,
    lease: Option<Lease>,
}

impl LeaseGuard {
    /// Acquire `key` and wrap it in a guard. `Ok(None)` means busy.
    pub async fn acquire(
        manager: Arc<dyn LeaseManager>,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Self>, LeaseError> {
        match manager.acquire(key, ttl).await? {
            Acquisition::Acquired(lease) => Ok(Some(Self {
                manager,
                lease: Some(lease),
            })),
            Acquisition::Busy => Ok(None),
        }
    }

    pub async fn release(mut self) -> Result<(), LeaseError> {
        match self.lease.take() {
            Some(lease) => self.manager.release(&lease).await,
            None => Ok(()),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };

        let manager = Arc::clone(&self.manager);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = manager.release(&lease).await {
                        tracing::warn!(key = %lease.key, error = %e, "Deferred lease release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(key = %lease.key, "No runtime to release lease; it will expire");
            }
        }
    }
}

pub(crate) fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

pub(crate) fn validate_ttl(ttl: Duration) -> Result<(), LeaseError> {
    if ttl.is_zero() {
        return Err(LeaseError::InvalidTtl(ttl));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_release_frees_key() {
        let manager: Arc<dyn LeaseManager> = Arc::new(InMemoryLeaseManager::new());
        let ttl = Duration::from_secs(30);

        let guard = LeaseGuard::acquire(Arc::clone(&manager), "payment:lock:a", ttl)
            .await
            .unwrap()
            .expect("first acquire succeeds");
        assert!(LeaseGuard::acquire(Arc::clone(&manager), "payment:lock:a", ttl)
            .await
            .unwrap()
            .is_none());

        guard.release().await.unwrap();
        assert!(LeaseGuard::acquire(manager, "payment:lock:a", ttl)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_in_background() {
        let manager: Arc<dyn LeaseManager> = Arc::new(InMemoryLeaseManager::new());
        let ttl = Duration::from_secs(30);

        {
            let _guard = LeaseGuard::acquire(Arc::clone(&manager), "k", ttl)
                .await
                .unwrap()
                .expect("acquired");
        }

        let mut reacquired = false;
        for _ in 0..50 {
            if let Acquisition::Acquired(_) = manager.acquire("k", ttl).await.unwrap() {
                reacquired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reacquired, "drop should schedule a release");
    }

    #[test]
    fn test_zero_ttl_rejected() {
        assert!(matches!(
            validate_ttl(Duration::ZERO),
            Err(LeaseError::InvalidTtl(_))
        ));
        assert!(validate_ttl(Duration::from_millis(1)).is_ok());
    }
}
