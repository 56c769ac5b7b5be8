use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use skybook_core::{Availability, Flight, FlightFilter, FlightStatus, NewFlight};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: FlightStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights", post(register_flight).get(search_flights))
        .route("/v1/flights/{id}", get(get_flight))
        .route("/v1/flights/{id}/availability", get(availability))
        .route("/v1/flights/{id}/status", put(set_status))
}

async fn register_flight(
    State(state): State<AppState>,
    Json(new_flight): Json<NewFlight>,
) -> Result<(StatusCode, Json<Flight>), AppError> {
    let flight = state.orchestrator.inventory().register_flight(new_flight).await?;
    Ok((StatusCode::CREATED, Json(flight)))
}

async fn search_flights(
    State(state): State<AppState>,
    Query(filter): Query<FlightFilter>,
) -> Result<Json<Vec<Flight>>, AppError> {
    Ok(Json(state.orchestrator.inventory().search_flights(&filter).await?))
}

async fn get_flight(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Flight>, AppError> {
    Ok(Json(state.orchestrator.inventory().get_flight(id).await?))
}

async fn availability(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Availability>, AppError> {
    Ok(Json(state.orchestrator.inventory().get_availability(id).await?))
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Flight>, AppError> {
    Ok(Json(state.orchestrator.inventory().set_status(id, update.status).await?))
}
