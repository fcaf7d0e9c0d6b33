//! Outstanding offers, held in memory between selection and the driver's answer.
//!
//! A driver and a rider each have at most one pending offer. Offers are not
//! persisted; an offer lost to a restart is simply requested again.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::entities::{DriverId, OfferId, RideState, RiderId};
use crate::error::RideError;
use crate::geo::GeoPoint;
use crate::pricing::FareQuote;

#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub id: OfferId,
    pub rider_id: RiderId,
    pub driver_id: DriverId,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub quote: FareQuote,
    /// `OFFERED` while pending, `REJECTED` or `CANCELLED` once closed.
    pub state: RideState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct OfferBookInner {
    offers: HashMap<OfferId, Offer>,
    by_driver: HashMap<DriverId, OfferId>,
    by_rider: HashMap<RiderId, OfferId>,
}

impl OfferBookInner {
    fn remove(&mut self, offer_id: OfferId) -> Option<Offer> {
        let offer = self.offers.remove(&offer_id)?;
        if self.by_driver.get(&offer.driver_id) == Some(&offer_id) {
            self.by_driver.remove(&offer.driver_id);
        }
        if self.by_rider.get(&offer.rider_id) == Some(&offer_id) {
            self.by_rider.remove(&offer.rider_id);
        }
        Some(offer)
    }

    /// Pending, unexpired offer id for a key, evicting an expired one.
    fn live_offer(&mut self, offer_id: Option<OfferId>, now: DateTime<Utc>) -> Option<OfferId> {
        let offer_id = offer_id?;
        match self.offers.get(&offer_id) {
            Some(offer) if !offer.is_expired(now) => Some(offer_id),
            _ => {
                self.remove(offer_id);
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct OfferBook {
    inner: Mutex<OfferBookInner>,
}

impl OfferBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending offer. Fails with `Conflict` if the driver or the
    /// rider already has a live one.
    pub fn reserve(&self, offer: Offer, now: DateTime<Utc>) -> Result<(), RideError> {
        let mut inner = self.inner.lock();
        let driver_offer = inner.by_driver.get(&offer.driver_id).copied();
        if inner.live_offer(driver_offer, now).is_some() {
            return Err(RideError::conflict(format!(
                "driver {} already has a pending offer",
                offer.driver_id
            )));
        }
        let rider_offer = inner.by_rider.get(&offer.rider_id).copied();
        if inner.live_offer(rider_offer, now).is_some() {
            return Err(RideError::conflict(format!(
                "rider {} already has a pending offer",
                offer.rider_id
            )));
        }
        inner.by_driver.insert(offer.driver_id.clone(), offer.id);
        inner.by_rider.insert(offer.rider_id.clone(), offer.id);
        inner.offers.insert(offer.id, offer);
        Ok(())
    }

    /// Remove and return the offer addressed to `driver_id`.
    pub fn take_for_driver(
        &self,
        offer_id: OfferId,
        driver_id: &DriverId,
        now: DateTime<Utc>,
    ) -> Result<Offer, RideError> {
        let mut inner = self.inner.lock();
        let offer = inner
            .offers
            .get(&offer_id)
            .ok_or_else(|| RideError::not_found("offer", offer_id))?;
        if &offer.driver_id != driver_id {
            return Err(RideError::Unauthorized(format!(
                "offer {offer_id} is not addressed to driver {driver_id}"
            )));
        }
        let expired = offer.is_expired(now);
        let offer = inner
            .remove(offer_id)
            .ok_or_else(|| RideError::not_found("offer", offer_id))?;
        if expired {
            return Err(RideError::OfferExpired(format!("offer {offer_id} expired")));
        }
        Ok(offer)
    }

    /// Remove and return the offer requested by `rider_id`.
    pub fn withdraw(&self, offer_id: OfferId, rider_id: &RiderId) -> Result<Offer, RideError> {
        let mut inner = self.inner.lock();
        let offer = inner
            .offers
            .get(&offer_id)
            .ok_or_else(|| RideError::not_found("offer", offer_id))?;
        if &offer.rider_id != rider_id {
            return Err(RideError::Unauthorized(format!(
                "rider {rider_id} does not own offer {offer_id}"
            )));
        }
        inner
            .remove(offer_id)
            .ok_or_else(|| RideError::not_found("offer", offer_id))
    }

    /// Remove every offer past its deadline.
    pub fn expire(&self, now: DateTime<Utc>) -> Vec<Offer> {
        let mut inner = self.inner.lock();
        let stale: Vec<OfferId> = inner
            .offers
            .values()
            .filter(|offer| offer.is_expired(now))
            .map(|offer| offer.id)
            .collect();
        stale
            .into_iter()
            .filter_map(|offer_id| inner.remove(offer_id))
            .collect()
    }

    pub fn get(&self, offer_id: OfferId) -> Option<Offer> {
        self.inner.lock().offers.get(&offer_id).cloned()
    }

    pub fn pending_for_driver(&self, driver_id: &DriverId) -> Option<OfferId> {
        self.inner.lock().by_driver.get(driver_id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp")
    }

    fn offer(driver: &str, rider: &str) -> Offer {
        let here = GeoPoint::new(0.0, 0.0);
        Offer {
            id: OfferId::generate(),
            rider_id: RiderId::new(rider),
            driver_id: DriverId::new(driver),
            pickup: here,
            drop: GeoPoint::new(0.0, 0.01),
            quote: crate::pricing::price(here, here, GeoPoint::new(0.0, 0.01), 20.0, 15.0, 40.0),
            state: RideState::Offered,
            created_at: now(),
            expires_at: now() + Duration::seconds(30),
        }
    }

    #[test]
    fn one_pending_offer_per_driver_and_rider() {
        let book = OfferBook::new();
        book.reserve(offer("d1", "r1"), now()).expect("first");
        assert!(matches!(
            book.reserve(offer("d1", "r2"), now()),
            Err(RideError::Conflict(_))
        ));
        assert!(matches!(
            book.reserve(offer("d2", "r1"), now()),
            Err(RideError::Conflict(_))
        ));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn expired_offer_frees_the_driver() {
        let book = OfferBook::new();
        book.reserve(offer("d1", "r1"), now()).expect("first");
        let later = now() + Duration::seconds(31);
        book.reserve(offer("d1", "r2"), later).expect("stale offer evicted");
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn take_checks_addressee_and_expiry() {
        let book = OfferBook::new();
        let pending = offer("d1", "r1");
        let id = pending.id;
        book.reserve(pending, now()).expect("reserve");

        assert!(matches!(
            book.take_for_driver(id, &DriverId::new("d2"), now()),
            Err(RideError::Unauthorized(_))
        ));
        let late = now() + Duration::seconds(30);
        assert!(matches!(
            book.take_for_driver(id, &DriverId::new("d1"), late),
            Err(RideError::OfferExpired(_))
        ));
        assert!(book.is_empty());
    }

    #[test]
    fn expire_sweeps_only_stale_offers() {
        let book = OfferBook::new();
        let mut old = offer("d1", "r1");
        old.expires_at = now();
        book.reserve(old, now() - Duration::seconds(1)).expect("old");
        book.reserve(offer("d2", "r2"), now()).expect("fresh");

        let expired = book.expire(now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].driver_id, DriverId::new("d1"));
        assert_eq!(book.pending_for_driver(&DriverId::new("d1")), None);
        assert!(book.pending_for_driver(&DriverId::new("d2")).is_some());
    }

    #[test]
    fn withdraw_requires_owner() {
        let book = OfferBook::new();
        let pending = offer("d1", "r1");
        let id = pending.id;
        book.reserve(pending, now()).expect("reserve");
        assert!(matches!(
            book.withdraw(id, &RiderId::new("r2")),
            Err(RideError::Unauthorized(_))
        ));
        let withdrawn = book.withdraw(id, &RiderId::new("r1")).expect("withdraw");
        assert_eq!(withdrawn.id, id);
        assert!(book.is_empty());
    }
}
