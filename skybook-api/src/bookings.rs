use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use skybook_booking::{CustomerBookingRequest, GuestBookingRequest};
use skybook_core::{Booking, BookingFilter};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(customer_booking).get(search_bookings))
        .route("/v1/bookings/guest", post(guest_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

async fn customer_booking(
    State(state): State<AppState>,
    Json(req): Json<CustomerBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.orchestrator.customer_booking(req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn guest_booking(
    State(state): State<AppState>,
    Json(req): Json<GuestBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.orchestrator.guest_booking(req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.orchestrator.ledger().find_by_id(id).await?))
}

async fn cancel_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.orchestrator.cancel_booking(id).await?))
}

async fn search_bookings(
    State(state): State<AppState>,
    Query(filter): Query<BookingFilter>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.orchestrator.search_booking(&filter).await?))
}
