//! Discovery → offer → accept/reject.
//!
//! The rider's client chooses from the ranked candidates; nothing is assigned
//! server-side. A ride exists only after the driver accepts, and the ledger's
//! compare-and-set claim is what finally decides who gets the driver.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::entities::{DriverId, OfferId, Ride, RideState, RiderId};
use crate::error::RideError;
use crate::ledger::RideLedger;
use crate::pricing::PricingConfig;
use crate::spatial::GeoIndex;
use crate::store::RideStore;

use super::offers::{Offer, OfferBook};
use super::types::{rank_candidates, Candidate, RideRequest};

/// Upper bound on how long a driver may sit on an offer.
const MAX_OFFER_TTL_SECS: u64 = 24 * 60 * 60;

pub struct MatchingCoordinator {
    geo: Arc<GeoIndex>,
    store: Arc<dyn RideStore>,
    ledger: Arc<RideLedger>,
    clock: Arc<dyn Clock>,
    offers: OfferBook,
    pricing: PricingConfig,
    search_radius_m: f64,
    offer_ttl: Duration,
}

impl MatchingCoordinator {
    pub fn new(
        geo: Arc<GeoIndex>,
        store: Arc<dyn RideStore>,
        ledger: Arc<RideLedger>,
        clock: Arc<dyn Clock>,
        pricing: PricingConfig,
        search_radius_m: f64,
        offer_ttl_secs: u64,
    ) -> Self {
        Self {
            geo,
            store,
            ledger,
            clock,
            offers: OfferBook::new(),
            pricing,
            search_radius_m,
            offer_ttl: Duration::seconds(offer_ttl_secs.min(MAX_OFFER_TTL_SECS) as i64),
        }
    }

    pub fn offers(&self) -> &OfferBook {
        &self.offers
    }

    async fn ensure_rider_free(&self, rider_id: &RiderId) -> Result<(), RideError> {
        let rider = self.store.rider(rider_id).await?;
        if rider.is_on_ride {
            return Err(RideError::conflict(format!(
                "rider {rider_id} is already on a ride"
            )));
        }
        Ok(())
    }

    /// Priced, ranked drivers within the search radius of the pickup point.
    pub async fn find_candidates(&self, request: &RideRequest) -> Result<Vec<Candidate>, RideError> {
        request.validate()?;
        self.ensure_rider_free(&request.rider_id).await?;

        let nearby = self
            .geo
            .find_candidates(request.pickup, self.search_radius_m)
            .await?;
        let mut candidates: Vec<Candidate> = nearby
            .into_iter()
            .map(|near| Candidate {
                quote: self.pricing.quote(near.position, request.pickup, request.drop),
                driver_id: near.driver.id,
                driver_location: near.position,
                distance_to_pickup_m: near.distance_m,
            })
            .collect();
        rank_candidates(&mut candidates);

        debug!(
            rider_id = %request.rider_id,
            candidates = candidates.len(),
            "candidates priced"
        );
        Ok(candidates)
    }

    /// Check the chosen driver is still free and open an offer for them.
    pub async fn select_driver(
        &self,
        request: &RideRequest,
        driver_id: &DriverId,
    ) -> Result<Offer, RideError> {
        request.validate()?;
        if driver_id.as_str().trim().is_empty() {
            return Err(RideError::validation("driverId is required"));
        }
        self.ensure_rider_free(&request.rider_id).await?;

        let driver = self.store.driver(driver_id).await?;
        if !driver.is_available() {
            return Err(RideError::conflict(format!(
                "driver {driver_id} is not available"
            )));
        }
        let position = self
            .geo
            .position_of(driver_id)
            .or(driver.location)
            .ok_or_else(|| RideError::conflict(format!("driver {driver_id} has no known location")))?;

        let now = self.clock.now();
        let offer = Offer {
            id: OfferId::generate(),
            rider_id: request.rider_id.clone(),
            driver_id: driver_id.clone(),
            pickup: request.pickup,
            drop: request.drop,
            quote: self.pricing.quote(position, request.pickup, request.drop),
            state: RideState::Offered,
            created_at: now,
            expires_at: now + self.offer_ttl,
        };
        self.offers.reserve(offer.clone(), now)?;

        info!(
            offer_id = %offer.id,
            %driver_id,
            rider_id = %request.rider_id,
            "offer opened"
        );
        Ok(offer)
    }

    /// Driver accepted: close the offer and create the ride.
    pub async fn accept(&self, offer_id: OfferId, driver_id: &DriverId) -> Result<Ride, RideError> {
        let offer = self
            .offers
            .take_for_driver(offer_id, driver_id, self.clock.now())?;
        self.ledger
            .create_ride(
                &offer.driver_id,
                &offer.rider_id,
                offer.pickup,
                offer.drop,
                offer.quote,
            )
            .await
    }

    /// Driver declined; no ride is created.
    pub fn reject(&self, offer_id: OfferId, driver_id: &DriverId) -> Result<Offer, RideError> {
        let mut offer = self
            .offers
            .take_for_driver(offer_id, driver_id, self.clock.now())?;
        offer.state = RideState::Rejected;
        info!(%offer_id, %driver_id, "offer rejected");
        Ok(offer)
    }

    /// Rider withdrew a pending offer.
    pub fn withdraw(&self, offer_id: OfferId, rider_id: &RiderId) -> Result<Offer, RideError> {
        let mut offer = self.offers.withdraw(offer_id, rider_id)?;
        offer.state = RideState::Cancelled;
        info!(%offer_id, %rider_id, "offer withdrawn");
        Ok(offer)
    }

    pub fn expire_offers(&self) -> Vec<Offer> {
        self.offers.expire(self.clock.now())
    }
}
