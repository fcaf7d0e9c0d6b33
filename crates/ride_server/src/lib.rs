//! HTTP and WebSocket transport over [`ride_core`].

pub mod config;
pub mod logging;
pub mod push;
pub mod routes;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use ride_core::service::RideService;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RideService>,
}

impl AppState {
    pub fn new(service: Arc<RideService>) -> Self {
        Self { service }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/stats", get(routes::stats))
        .route("/rides/candidates", post(routes::find_candidates))
        .route("/rides/select", post(routes::select_driver))
        .route("/rides/respond", post(routes::respond))
        .route("/rides/verify-pickup", post(routes::verify_pickup))
        .route("/rides/verify-drop", post(routes::verify_drop))
        .route("/rides/cancel", post(routes::cancel))
        .route("/rides/{id}", get(routes::get_ride))
        .route("/ws", get(ws::handle_ws))
        .with_state(state)
}

/// Periodically drop offers nobody answered in time.
pub fn spawn_offer_expiry(service: Arc<RideService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // skip immediate
        loop {
            interval.tick().await;
            service.expire_offers();
        }
    })
}
