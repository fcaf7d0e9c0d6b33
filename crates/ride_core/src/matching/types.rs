use serde::Deserialize;

use crate::entities::{DriverId, RiderId};
use crate::error::RideError;
use crate::geo::GeoPoint;
use crate::pricing::FareQuote;

/// A rider's request for candidates or for a specific driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub rider_id: RiderId,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
}

impl RideRequest {
    pub fn validate(&self) -> Result<(), RideError> {
        if self.rider_id.as_str().trim().is_empty() {
            return Err(RideError::validation("riderId is required"));
        }
        self.pickup.validate("pickup")?;
        self.drop.validate("drop")?;
        Ok(())
    }
}

/// A priced driver offered to the rider for selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub driver_id: DriverId,
    pub driver_location: GeoPoint,
    pub distance_to_pickup_m: f64,
    pub quote: FareQuote,
}

/// Order candidates by pickup distance, then price, then driver id so the list
/// is stable for identical inputs.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.distance_to_pickup_m
            .total_cmp(&b.distance_to_pickup_m)
            .then_with(|| a.quote.total_price.total_cmp(&b.quote.total_price))
            .then_with(|| a.driver_id.cmp(&b.driver_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::price;

    fn candidate(id: &str, distance_m: f64) -> Candidate {
        let here = GeoPoint::new(0.0, 0.0);
        Candidate {
            driver_id: DriverId::new(id),
            driver_location: here,
            distance_to_pickup_m: distance_m,
            quote: price(here, here, GeoPoint::new(0.0, 0.01), 20.0, 15.0, 40.0),
        }
    }

    #[test]
    fn ranks_by_distance_with_id_tie_break() {
        let mut candidates = vec![
            candidate("z", 100.0),
            candidate("b", 50.0),
            candidate("a", 100.0),
        ];
        rank_candidates(&mut candidates);
        let ids: Vec<_> = candidates.iter().map(|c| c.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "z"]);
    }

    #[test]
    fn request_validation_rejects_blank_rider_and_bad_points() {
        let valid = RideRequest {
            rider_id: RiderId::new("r1"),
            pickup: GeoPoint::new(0.0, 0.0),
            drop: GeoPoint::new(0.0, 0.01),
        };
        assert!(valid.validate().is_ok());

        let blank = RideRequest {
            rider_id: RiderId::new("  "),
            ..valid.clone()
        };
        assert!(matches!(blank.validate(), Err(RideError::Validation(_))));

        let bad_drop = RideRequest {
            drop: GeoPoint::new(0.0, 200.0),
            ..valid
        };
        assert!(matches!(bad_drop.validate(), Err(RideError::Validation(_))));
    }
}
