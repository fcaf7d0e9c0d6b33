//! Request/response endpoints. Every reply is an [`Envelope`] and the HTTP
//! status mirrors `envelope.status`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ride_core::commands::{
    CancelRequest, Command, Envelope, GetRideRequest, OtpRequest, Reply, RespondRequest,
    SelectDriverRequest,
};
use ride_core::entities::RideId;
use ride_core::error::RideError;
use ride_core::matching::RideRequest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::AppState;

fn respond_with<T: Serialize>(envelope: Envelope<T>) -> Response {
    let status = StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

/// Decode the body ourselves so malformed JSON gets the same envelope as any
/// other validation failure.
fn parse<T: DeserializeOwned>(body: &Bytes) -> Result<T, RideError> {
    serde_json::from_slice(body).map_err(|err| RideError::validation(format!("malformed request: {err}")))
}

async fn run<T: DeserializeOwned>(
    state: &AppState,
    body: &Bytes,
    command: impl FnOnce(T) -> Command,
) -> Response {
    match parse::<T>(body) {
        Ok(request) => respond_with(state.service.handle(command(request)).await),
        Err(err) => respond_with(Envelope::<Reply>::from_error(&err)),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn stats(State(state): State<AppState>) -> Response {
    let stats = state.service.stats().await;
    respond_with(Envelope::ok(stats, "service stats"))
}

pub async fn find_candidates(State(state): State<AppState>, body: Bytes) -> Response {
    run::<RideRequest>(&state, &body, Command::FindCandidates).await
}

pub async fn select_driver(State(state): State<AppState>, body: Bytes) -> Response {
    run::<SelectDriverRequest>(&state, &body, Command::SelectDriver).await
}

pub async fn respond(State(state): State<AppState>, body: Bytes) -> Response {
    run::<RespondRequest>(&state, &body, Command::RespondToOffer).await
}

pub async fn verify_pickup(State(state): State<AppState>, body: Bytes) -> Response {
    run::<OtpRequest>(&state, &body, Command::VerifyPickup).await
}

pub async fn verify_drop(State(state): State<AppState>, body: Bytes) -> Response {
    run::<OtpRequest>(&state, &body, Command::VerifyDrop).await
}

pub async fn cancel(State(state): State<AppState>, body: Bytes) -> Response {
    run::<CancelRequest>(&state, &body, Command::CancelRide).await
}

pub async fn get_ride(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match id.parse() {
        Ok(uuid) => {
            let command = Command::GetRide(GetRideRequest {
                ride_id: RideId(uuid),
            });
            respond_with(state.service.handle(command).await)
        }
        Err(_) => respond_with(Envelope::<Reply>::from_error(&RideError::validation(format!(
            "invalid ride id: {id}"
        )))),
    }
}
