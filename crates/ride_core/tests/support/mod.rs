#![allow(dead_code)]

pub mod parties;

use ride_core::commands::{Command, Envelope, OtpRequest, Reply, RespondRequest, SelectDriverRequest};
use ride_core::entities::{DriverId, OfferId, RideId, RiderId};
use ride_core::gateway::{OfferView, RideView};
use ride_core::geo::GeoPoint;
use ride_core::service::RideService;

/// Central Berlin; every party in the integration tests is placed relative to it.
pub fn origin() -> GeoPoint {
    GeoPoint::new(52.52, 13.405)
}

pub fn drop_point() -> GeoPoint {
    ride_core::test_helpers::point_north_of(origin(), 3_000.0)
}

pub fn offer_view(envelope: &Envelope<Reply>) -> &OfferView {
    match &envelope.data {
        Some(Reply::Offer(view)) => view,
        other => panic!("expected an offer, got {other:?} ({})", envelope.message),
    }
}

pub fn ride_view(envelope: &Envelope<Reply>) -> &RideView {
    match &envelope.data {
        Some(Reply::Ride(view)) => view,
        other => panic!("expected a ride, got {other:?} ({})", envelope.message),
    }
}

pub async fn select(service: &RideService, rider: &str, driver: &str) -> Envelope<Reply> {
    service
        .handle(Command::SelectDriver(SelectDriverRequest {
            rider_id: RiderId::new(rider),
            driver_id: DriverId::new(driver),
            pickup: origin(),
            drop: drop_point(),
        }))
        .await
}

pub async fn respond(
    service: &RideService,
    driver: &str,
    offer_id: OfferId,
    accept: bool,
) -> Envelope<Reply> {
    service
        .handle(Command::RespondToOffer(RespondRequest {
            driver_id: DriverId::new(driver),
            offer_id,
            accept,
        }))
        .await
}

pub async fn verify_pickup(service: &RideService, ride_id: RideId, otp: &str) -> Envelope<Reply> {
    service
        .handle(Command::VerifyPickup(OtpRequest {
            ride_id,
            otp: otp.to_string(),
        }))
        .await
}

pub async fn verify_drop(service: &RideService, ride_id: RideId, otp: &str) -> Envelope<Reply> {
    service
        .handle(Command::VerifyDrop(OtpRequest {
            ride_id,
            otp: otp.to_string(),
        }))
        .await
}

/// Select `driver` for `rider` and accept; both must already be registered.
pub async fn accepted_ride(service: &RideService, rider: &str, driver: &str) -> RideId {
    let selected = select(service, rider, driver).await;
    assert!(selected.success, "select failed: {}", selected.message);
    let offer_id = offer_view(&selected).offer_id;
    let accepted = respond(service, driver, offer_id, true).await;
    assert!(accepted.success, "accept failed: {}", accepted.message);
    ride_view(&accepted).ride_id
}
