//! Wire events exchanged over a live connection.
//!
//! Inbound frames are tagged by `event` and validated before they reach any
//! component. Outbound frames are `{ "event": <name>, "data": <payload> }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{AdminId, DriverId, OfferId, Ride, RideId, RideState, RiderId};
use crate::error::RideError;
use crate::geo::GeoPoint;
use crate::matching::{Candidate, Offer};
use crate::pricing::FareSummary;

const MAX_ALERT_MESSAGE_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    RegisterDriver {
        driver_id: DriverId,
        lat: f64,
        lng: f64,
    },
    RegisterRider {
        rider_id: RiderId,
        lat: f64,
        lng: f64,
    },
    RegisterAdmin {
        admin_id: AdminId,
    },
    /// Location heartbeat for whoever is registered on the connection.
    UpdateLocation {
        lat: f64,
        lng: f64,
    },
    EmergencyAlert {
        lat: f64,
        lng: f64,
        #[serde(default)]
        message: Option<String>,
    },
}

fn require_id(value: &str, field: &str) -> Result<(), RideError> {
    if value.trim().is_empty() {
        return Err(RideError::validation(format!("{field} is required")));
    }
    Ok(())
}

impl ClientEvent {
    pub fn validate(&self) -> Result<(), RideError> {
        match self {
            ClientEvent::RegisterDriver { driver_id, lat, lng } => {
                require_id(driver_id.as_str(), "driverId")?;
                GeoPoint::new(*lat, *lng).validate("location")
            }
            ClientEvent::RegisterRider { rider_id, lat, lng } => {
                require_id(rider_id.as_str(), "riderId")?;
                GeoPoint::new(*lat, *lng).validate("location")
            }
            ClientEvent::RegisterAdmin { admin_id } => require_id(admin_id.as_str(), "adminId"),
            ClientEvent::UpdateLocation { lat, lng } => {
                GeoPoint::new(*lat, *lng).validate("location")
            }
            ClientEvent::EmergencyAlert { lat, lng, message } => {
                if message
                    .as_ref()
                    .is_some_and(|m| m.len() > MAX_ALERT_MESSAGE_LEN)
                {
                    return Err(RideError::validation("alert message too long"));
                }
                GeoPoint::new(*lat, *lng).validate("location")
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::RegisterDriver { .. } => "registerDriver",
            ClientEvent::RegisterRider { .. } => "registerRider",
            ClientEvent::RegisterAdmin { .. } => "registerAdmin",
            ClientEvent::UpdateLocation { .. } => "updateLocation",
            ClientEvent::EmergencyAlert { .. } => "emergencyAlert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Driver,
    Rider,
    Admin,
}

/// Ride as shown to one party. OTPs are only disclosed to the rider, who hands
/// them to the driver in person.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideView {
    pub ride_id: RideId,
    pub driver_id: DriverId,
    pub rider_id: RiderId,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub state: RideState,
    pub fare: FareSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_otp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_otp: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RideView {
    fn base(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id,
            driver_id: ride.driver_id.clone(),
            rider_id: ride.rider_id.clone(),
            pickup: ride.pickup,
            drop: ride.drop,
            state: ride.state,
            fare: ride.fare.summary(),
            pickup_otp: None,
            drop_otp: None,
            created_at: ride.created_at,
            started_at: ride.started_at,
            ended_at: ride.ended_at,
        }
    }

    pub fn for_rider(ride: &Ride) -> Self {
        Self {
            pickup_otp: Some(ride.pickup_otp.clone()),
            drop_otp: Some(ride.drop_otp.clone()),
            ..Self::base(ride)
        }
    }

    pub fn for_driver(ride: &Ride) -> Self {
        Self::base(ride)
    }

    pub fn for_admin(ride: &Ride) -> Self {
        Self::base(ride)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferView {
    pub offer_id: OfferId,
    pub rider_id: RiderId,
    pub driver_id: DriverId,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub state: RideState,
    pub fare: FareSummary,
    pub expires_at: DateTime<Utc>,
}

impl From<&Offer> for OfferView {
    fn from(offer: &Offer) -> Self {
        Self {
            offer_id: offer.id,
            rider_id: offer.rider_id.clone(),
            driver_id: offer.driver_id.clone(),
            pickup: offer.pickup,
            drop: offer.drop,
            state: offer.state,
            fare: offer.quote.summary(),
            expires_at: offer.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateView {
    pub driver_id: DriverId,
    pub location: GeoPoint,
    pub distance_to_pickup_m: f64,
    pub fare: FareSummary,
}

impl From<&Candidate> for CandidateView {
    fn from(candidate: &Candidate) -> Self {
        Self {
            driver_id: candidate.driver_id.clone(),
            location: candidate.driver_location,
            distance_to_pickup_m: crate::pricing::round2(candidate.distance_to_pickup_m),
            fare: candidate.quote.summary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Registered {
        role: Role,
        id: String,
    },
    /// Offer pushed to the selected driver.
    RideRequest(OfferView),
    /// Echo to the rider that the offer reached the driver.
    DriverSelected(OfferView),
    RideRejected(OfferView),
    OfferExpired(OfferView),
    RideAccepted(RideView),
    RideDetails(RideView),
    PickupRider(RideView),
    PickupOtpVerifiedToDriver(RideView),
    RideVerifyRider(RideView),
    RideCompletedToDriver(RideView),
    CancelRide {
        #[serde(skip_serializing_if = "Option::is_none")]
        ride_id: Option<RideId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        offer_id: Option<OfferId>,
        rider_id: RiderId,
    },
    DriverLocation {
        driver_id: DriverId,
        ride_id: RideId,
        lat: f64,
        lng: f64,
    },
    /// Every ride transition, for the monitoring admin.
    RideStatus(RideView),
    EmergencyAlert {
        role: Role,
        party_id: String,
        lat: f64,
        lng: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        raised_at: DateTime<Utc>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &RideError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Registered { .. } => "registered",
            ServerEvent::RideRequest(_) => "rideRequest",
            ServerEvent::DriverSelected(_) => "driverSelected",
            ServerEvent::RideRejected(_) => "rideRejected",
            ServerEvent::OfferExpired(_) => "offerExpired",
            ServerEvent::RideAccepted(_) => "rideAccepted",
            ServerEvent::RideDetails(_) => "rideDetails",
            ServerEvent::PickupRider(_) => "pickupRider",
            ServerEvent::PickupOtpVerifiedToDriver(_) => "pickupOtpVerifiedToDriver",
            ServerEvent::RideVerifyRider(_) => "rideVerifyRider",
            ServerEvent::RideCompletedToDriver(_) => "rideCompletedToDriver",
            ServerEvent::CancelRide { .. } => "cancelRide",
            ServerEvent::DriverLocation { .. } => "driverLocation",
            ServerEvent::RideStatus(_) => "rideStatus",
            ServerEvent::EmergencyAlert { .. } => "emergencyAlert",
            ServerEvent::Error { .. } => "error",
        }
    }
}
