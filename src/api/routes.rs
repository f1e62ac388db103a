//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::{AppError, AppResult};
use crate::handlers::{TransferCommand, TransferHandler, TransferResult};
use crate::query::{InvestmentSummary, QueryService, SpendingSummary, DEFAULT_DAYS_BACK};

/// Shared state of every API route
#[derive(Clone)]
pub struct AppState {
    pub transfers: Arc<TransferHandler>,
    pub queries: QueryService,
}

#[derive(Debug, Deserialize)]
pub struct SpendingQuery {
    #[serde(default = "default_days_back")]
    pub days_back: u32,
}

fn default_days_back() -> u32 {
    DEFAULT_DAYS_BACK
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router, to be nested under `/api/v1`
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/payments/transfer", post(transfer))
        .route("/payments/:payment_id", get(get_payment))
        .route("/investments/summary", get(investment_summary))
        .route("/pfm/spending", get(spending_summary))
}

fn require_user(context: &OperationContext) -> AppResult<Uuid> {
    context
        .request_user_id
        .ok_or_else(|| AppError::MissingHeader("X-User-Id".to_string()))
}

// =========================================================================
// POST /payments/transfer
// =========================================================================

async fn transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<TransferCommand>,
) -> AppResult<Json<TransferResult>> {
    let result = state.transfers.execute(command, &context).await?;
    Ok(Json(result))
}

// =========================================================================
// GET /payments/:payment_id
// =========================================================================

async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<TransferResult>> {
    Ok(Json(state.queries.payment(payment_id).await?))
}

// =========================================================================
// GET /investments/summary
// =========================================================================

async fn investment_summary(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> AppResult<Json<InvestmentSummary>> {
    let user_id = require_user(&context)?;
    Ok(Json(state.queries.investment_summary(user_id).await?))
}

// =========================================================================
// GET /pfm/spending
// =========================================================================

async fn spending_summary(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<SpendingQuery>,
) -> AppResult<Json<SpendingSummary>> {
    let user_id = require_user(&context)?;
    Ok(Json(
        state.queries.spending_summary(user_id, query.days_back).await?,
    ))
}
