use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use skybook_core::{Booking, Customer, CustomerPatch};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/customers/{id}", get(get_customer).patch(update_customer))
        .route("/v1/customers/{id}/bookings", get(booking_history))
}

async fn get_customer(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Customer>, AppError> {
    Ok(Json(state.orchestrator.directory().get(id).await?))
}

async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<CustomerPatch>,
) -> Result<Json<Customer>, AppError> {
    Ok(Json(state.orchestrator.update_customer(id, patch).await?))
}

async fn booking_history(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.orchestrator.booking_history(id).await?))
}
