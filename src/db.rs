//! Database module
//!
//! Connection and schema checks. The schema itself lives in raw SQL files
//! under `migrations/`.

use sqlx::PgPool;

/// Tables the PostgreSQL back-ends read and write
pub const REQUIRED_TABLES: [&str; 9] = [
    "payments",
    "leases",
    "event_log",
    "consumer_offsets",
    "dead_letters",
    "investment_accounts",
    "round_up_configs",
    "investments",
    "consumption_analyses",
];

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    tracing::info!(tables = REQUIRED_TABLES.len(), "Database schema verified");
    Ok(true)
}
