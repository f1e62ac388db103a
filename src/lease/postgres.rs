use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::{validate_ttl, Acquisition, Lease, LeaseError, LeaseManager};

/// Leases stored in the `leases` table.
///
/// A row whose `expires_at` has passed is overwritten by the next acquirer,
/// which is what makes an unreleased lease self-clear.
#[derive(Debug, Clone)]
pub struct PgLeaseManager {
    pool: PgPool,
}

impl PgLeaseManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseManager for PgLeaseManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Acquisition, LeaseError> {
        validate_ttl(ttl)?;

        let token = Uuid::new_v4();
        let granted: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            INSERT INTO leases (key, token, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
                SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
                WHERE leases.expires_at <= NOW()
            RETURNING expires_at
            "#,
        )
        .bind(key)
        .bind(token)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match granted {
            Some(expires_at) => Acquisition::Acquired(Lease {
                key: key.to_string(),
                token,
                expires_at,
            }),
            None => Acquisition::Busy,
        })
    }

    async fn release(&self, lease: &Lease) -> Result<(), LeaseError> {
        sqlx::query("DELETE FROM leases WHERE key = $1 AND token = $2")
            .bind(&lease.key)
            .bind(lease.token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
