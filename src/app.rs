//! Application wiring
//!
//! Chooses the storage back-ends and assembles the HTTP router and the
//! consumer runtime on top of them.

use axum::{middleware, routing::get, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::consumers::{
    RoundUpHandler, RuleBasedClassifier, SpendingClassifierHandler, ROUND_UP_GROUP,
    SPENDING_GROUP,
};
use crate::domain::{PAYMENT_COMPLETED_TOPIC, TRANSACTION_EVENTS_TOPIC};
use crate::event_log::{EventLog, EventPublisher, InMemoryEventLog, PgEventLog};
use crate::handlers::{InstantSettlement, SettlementRail, TransferHandler};
use crate::lease::{InMemoryLeaseManager, LeaseManager, PgLeaseManager};
use crate::query::QueryService;
use crate::runtime::ConsumerRuntime;
use crate::store::{AnalysisStore, InMemoryStore, InvestmentStore, PaymentStore, PgStore};

/// Every port the service runs on
#[derive(Clone)]
pub struct Backends {
    pub leases: Arc<dyn LeaseManager>,
    pub log: Arc<dyn EventLog>,
    pub payments: Arc<dyn PaymentStore>,
    pub investments: Arc<dyn InvestmentStore>,
    pub analyses: Arc<dyn AnalysisStore>,
    pub rail: Arc<dyn SettlementRail>,
}

impl Backends {
    /// Process-local back-ends; nothing survives a restart
    pub fn in_memory(partitions: u32) -> Self {
        let store = InMemoryStore::new();
        Self {
            leases: Arc::new(InMemoryLeaseManager::new()),
            log: Arc::new(InMemoryEventLog::new(partitions)),
            payments: Arc::new(store.clone()),
            investments: Arc::new(store.clone()),
            analyses: Arc::new(store),
            rail: Arc::new(InstantSettlement),
        }
    }

    pub fn postgres(pool: PgPool, partitions: u32) -> Self {
        let store = PgStore::new(pool.clone());
        Self {
            leases: Arc::new(PgLeaseManager::new(pool.clone())),
            log: Arc::new(PgEventLog::new(pool, partitions)),
            payments: Arc::new(store.clone()),
            investments: Arc::new(store.clone()),
            analyses: Arc::new(store),
            rail: Arc::new(InstantSettlement),
        }
    }
}

pub fn build_state(config: &Config, backends: &Backends) -> AppState {
    let transfers = TransferHandler::new(
        backends.leases.clone(),
        backends.payments.clone(),
        EventPublisher::new(backends.log.clone()),
        backends.rail.clone(),
    )
    .with_lease_ttl(config.settlement_lease_ttl())
    .with_currency(config.default_currency.clone());

    AppState {
        transfers: Arc::new(transfers),
        queries: QueryService::new(
            backends.payments.clone(),
            backends.investments.clone(),
            backends.analyses.clone(),
        ),
    }
}

/// Both downstream consumer groups, not yet started
pub fn build_consumers(config: &Config, backends: &Backends) -> ConsumerRuntime {
    let classifier = RuleBasedClassifier::with_threshold(config.anomaly_threshold);

    ConsumerRuntime::new(backends.log.clone(), config.consumer_config())
        .subscribe(
            ROUND_UP_GROUP,
            PAYMENT_COMPLETED_TOPIC,
            Arc::new(RoundUpHandler::new(backends.investments.clone())),
        )
        .subscribe(
            SPENDING_GROUP,
            TRANSACTION_EVENTS_TOPIC,
            Arc::new(SpendingClassifierHandler::new(
                backends.analyses.clone(),
                Arc::new(classifier),
            )),
        )
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Layers run last-added first: correlation -> logging -> handler
    let api_routes = api::create_router()
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(middleware::from_fn(api::middleware::correlation_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
