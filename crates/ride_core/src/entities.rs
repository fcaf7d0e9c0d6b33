//! Documents owned by the ride service: drivers, riders and rides.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::pricing::FareQuote;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Driver identity as issued by the identity service.
    DriverId
);
string_id!(RiderId);
string_id!(AdminId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(pub Uuid);

impl RideId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub Uuid);

impl OfferId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub location: Option<GeoPoint>,
    /// Cleared on disconnect; the driver must register again to receive offers.
    pub is_active: bool,
    pub is_on_ride: bool,
    pub current_ride_id: Option<RideId>,
    /// Completed rides, oldest first.
    pub ride_history: Vec<RideId>,
}

impl Driver {
    pub fn new(id: DriverId, location: GeoPoint) -> Self {
        Self {
            id,
            location: Some(location),
            is_active: true,
            is_on_ride: false,
            current_ride_id: None,
            ride_history: Vec::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.is_active && !self.is_on_ride
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rider {
    pub id: RiderId,
    pub location: Option<GeoPoint>,
    pub is_on_ride: bool,
    pub current_ride_id: Option<RideId>,
    pub ride_history: Vec<RideId>,
}

impl Rider {
    pub fn new(id: RiderId, location: GeoPoint) -> Self {
        Self {
            id,
            location: Some(location),
            is_on_ride: false,
            current_ride_id: None,
            ride_history: Vec::new(),
        }
    }
}

/// Ride lifecycle. `Requested`, `Offered` and `Rejected` only ever describe
/// offers; the ledger persists rides from `Accepted` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideState {
    Requested,
    Offered,
    Accepted,
    PickupVerified,
    DropVerified,
    Rejected,
    Cancelled,
}

impl RideState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RideState::DropVerified | RideState::Rejected | RideState::Cancelled
        )
    }
}

impl fmt::Display for RideState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RideState::Requested => "REQUESTED",
            RideState::Offered => "OFFERED",
            RideState::Accepted => "ACCEPTED",
            RideState::PickupVerified => "PICKUP_VERIFIED",
            RideState::DropVerified => "DROP_VERIFIED",
            RideState::Rejected => "REJECTED",
            RideState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    /// Fixed at creation.
    pub driver_id: DriverId,
    /// Fixed at creation.
    pub rider_id: RiderId,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub pickup_otp: String,
    pub drop_otp: String,
    pub fare: FareQuote,
    pub state: RideState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Ride {
    pub fn is_ride_ended(&self) -> bool {
        self.state == RideState::DropVerified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_drop_rejected_and_cancelled_are_terminal() {
        let terminal: Vec<_> = [
            RideState::Requested,
            RideState::Offered,
            RideState::Accepted,
            RideState::PickupVerified,
            RideState::DropVerified,
            RideState::Rejected,
            RideState::Cancelled,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(
            terminal,
            vec![RideState::DropVerified, RideState::Rejected, RideState::Cancelled]
        );
    }

    #[test]
    fn state_serializes_in_wire_casing() {
        let json = serde_json::to_string(&RideState::PickupVerified).expect("serialize");
        assert_eq!(json, "\"PICKUP_VERIFIED\"");
        assert_eq!(RideState::PickupVerified.to_string(), "PICKUP_VERIFIED");
    }

    #[test]
    fn new_driver_is_available() {
        let driver = Driver::new(DriverId::new("d1"), GeoPoint::new(0.0, 0.0));
        assert!(driver.is_available());
    }
}
