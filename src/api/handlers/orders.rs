use axum::extract::{Path, State};
use axum::Json;

use crate::engine::{AdvanceOutcome, CreateOrderRequest};
use crate::errors::AppError;
use crate::models::OrderView;
use crate::AppState;

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<OrderView>, AppError> {
    let order = state.engine.create(request).await?;
    Ok(Json(OrderView::from(&order)))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<OrderView>>, AppError> {
    let orders = state.engine.list().await?;
    Ok(Json(orders.iter().map(OrderView::from).collect()))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let order = state.engine.get(&hash).await?;
    Ok(Json(OrderView::from(&order)))
}

/// Manual status poll: re-checks the ledger and advances the order when the
/// incoming payment warrants it.
pub async fn check(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<AdvanceOutcome>, AppError> {
    let outcome = state.engine.advance(&hash).await?;
    Ok(Json(outcome))
}

/// Operator attestation that the off-chain fiat payment arrived (buy orders).
pub async fn mark_paid(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let order = state.engine.mark_paid(&hash).await?;
    Ok(Json(OrderView::from(&order)))
}

/// Operator-declared unrecoverable failure.
pub async fn mark_failed(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let order = state.engine.mark_failed(&hash).await?;
    Ok(Json(OrderView::from(&order)))
}
