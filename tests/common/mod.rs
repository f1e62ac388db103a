//! Common test utilities

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

use roundup_settlement::api::AppState;
use roundup_settlement::app::{self, Backends};
use roundup_settlement::domain::{Amount, InvestmentAccount, RoundUpConfig};
use roundup_settlement::event_log::InMemoryEventLog;
use roundup_settlement::lease::InMemoryLeaseManager;
use roundup_settlement::runtime::ConsumerRuntime;
use roundup_settlement::store::{InMemoryStore, InvestmentStore};
use roundup_settlement::Config;

/// In-memory deployment with typed handles on every back-end
pub struct Fixture {
    pub config: Config,
    pub log: InMemoryEventLog,
    pub store: InMemoryStore,
    pub leases: InMemoryLeaseManager,
    pub backends: Backends,
}

impl Fixture {
    pub fn new() -> Self {
        let config = Config {
            log_partitions: 4,
            consumer_poll_interval_ms: 10,
            consumer_backoff_base_ms: 5,
            consumer_backoff_max_ms: 50,
            ..Config::default()
        };

        let log = InMemoryEventLog::new(config.log_partitions);
        let store = InMemoryStore::new();
        let leases = InMemoryLeaseManager::new();

        let backends = Backends {
            leases: Arc::new(leases.clone()),
            log: Arc::new(log.clone()),
            payments: Arc::new(store.clone()),
            investments: Arc::new(store.clone()),
            analyses: Arc::new(store.clone()),
            ..Backends::in_memory(config.log_partitions)
        };

        Self {
            config,
            log,
            store,
            leases,
            backends,
        }
    }

    pub fn state(&self) -> AppState {
        app::build_state(&self.config, &self.backends)
    }

    pub fn router(&self) -> Router {
        app::build_router(self.state())
    }

    pub fn consumers(&self) -> ConsumerRuntime {
        app::build_consumers(&self.config, &self.backends)
    }

    /// Enabled round-up from `source_account_id` into a fresh, empty account
    pub async fn seed_round_up(
        &self,
        user_id: Uuid,
        source_account_id: Uuid,
        unit: Decimal,
    ) -> (RoundUpConfig, InvestmentAccount) {
        let account =
            InvestmentAccount::new(user_id, "Round-up Wallet".to_string(), "KRW".to_string());
        self.store.save_investment_account(&account).await.unwrap();

        let config = RoundUpConfig::new(
            user_id,
            source_account_id,
            account.id,
            Amount::new(unit).unwrap(),
        );
        self.store.save_round_up_config(&config).await.unwrap();

        (config, account)
    }
}

/// Poll `check` until it returns true or `timeout` elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Connect to `DATABASE_URL` and apply the schema.
///
/// Returns `None` when no database is configured so the suite still runs
/// on machines without PostgreSQL.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    // Tests run concurrently; serialize the DDL on one connection
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    (&mut *conn).execute("SELECT pg_advisory_lock(70311)")
        .await
        .expect("Failed to take schema lock");
    (&mut *conn).execute(include_str!("../../migrations/0001_init.sql"))
        .await
        .expect("Failed to apply schema");
    (&mut *conn).execute("SELECT pg_advisory_unlock(70311)")
        .await
        .expect("Failed to release schema lock");

    Some(pool)
}
