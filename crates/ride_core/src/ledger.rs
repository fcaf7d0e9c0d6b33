//! Ride lifecycle: creation, OTP-gated pickup and drop, rider cancellation.
//!
//! ```text
//! ACCEPTED --pickup otp--> PICKUP_VERIFIED --drop otp--> DROP_VERIFIED
//!     \
//!      +--rider cancel--> (deleted)
//! ```
//!
//! The ledger is the only component that touches occupancy flags. Each step is a
//! compare-and-set on the document it changes, so a losing concurrent caller gets
//! `Conflict` instead of a half-applied transition.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::entities::{DriverId, Ride, RideId, RideState, RiderId};
use crate::error::RideError;
use crate::geo::GeoPoint;
use crate::otp::{otp_matches, OtpGenerator};
use crate::pricing::FareQuote;
use crate::store::RideStore;

pub struct RideLedger {
    store: Arc<dyn RideStore>,
    otp: Arc<dyn OtpGenerator>,
    clock: Arc<dyn Clock>,
}

impl RideLedger {
    pub fn new(
        store: Arc<dyn RideStore>,
        otp: Arc<dyn OtpGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, otp, clock }
    }

    pub async fn ride(&self, ride_id: RideId) -> Result<Ride, RideError> {
        self.store.ride(ride_id).await
    }

    /// Bind a free driver and a free rider to a new ride in `ACCEPTED`.
    pub async fn create_ride(
        &self,
        driver_id: &DriverId,
        rider_id: &RiderId,
        pickup: GeoPoint,
        drop: GeoPoint,
        fare: FareQuote,
    ) -> Result<Ride, RideError> {
        // Surface unknown ids as NotFound before claiming anything.
        self.store.driver(driver_id).await?;
        self.store.rider(rider_id).await?;

        let ride_id = RideId::generate();
        self.store.claim_driver(driver_id, ride_id).await?;
        if let Err(err) = self.store.claim_rider(rider_id, ride_id).await {
            self.store.release_driver(driver_id, ride_id, false).await?;
            return Err(err);
        }

        let ride = Ride {
            id: ride_id,
            driver_id: driver_id.clone(),
            rider_id: rider_id.clone(),
            pickup,
            drop,
            pickup_otp: self.otp.generate(),
            drop_otp: self.otp.generate(),
            fare,
            state: RideState::Accepted,
            created_at: self.clock.now(),
            started_at: None,
            ended_at: None,
        };
        if let Err(err) = self.store.insert_ride(ride.clone()).await {
            self.rollback_claims(&ride).await;
            return Err(err);
        }

        info!(%ride_id, %driver_id, %rider_id, "ride created");
        Ok(ride)
    }

    pub async fn verify_pickup(&self, ride_id: RideId, supplied_otp: &str) -> Result<Ride, RideError> {
        let ride = self.store.ride(ride_id).await?;
        match ride.state {
            RideState::Accepted => {}
            RideState::PickupVerified => {
                return Err(RideError::conflict(format!(
                    "pickup for ride {ride_id} already verified"
                )))
            }
            other => {
                return Err(RideError::conflict(format!(
                    "ride {ride_id} is {other}, pickup cannot be verified"
                )))
            }
        }
        if !otp_matches(&ride.pickup_otp, supplied_otp) {
            warn!(%ride_id, "pickup otp mismatch");
            return Err(RideError::InvalidOtp);
        }

        let mut started = ride;
        started.state = RideState::PickupVerified;
        started.started_at = Some(self.clock.now());
        self.store
            .replace_ride_if(started.clone(), RideState::Accepted)
            .await?;

        info!(%ride_id, "pickup verified");
        Ok(started)
    }

    pub async fn verify_drop(&self, ride_id: RideId, supplied_otp: &str) -> Result<Ride, RideError> {
        let ride = self.store.ride(ride_id).await?;
        match ride.state {
            RideState::PickupVerified => {}
            RideState::Accepted => {
                return Err(RideError::conflict(format!(
                    "ride {ride_id} has not been picked up"
                )))
            }
            other => {
                return Err(RideError::conflict(format!(
                    "ride {ride_id} is {other}, drop cannot be verified"
                )))
            }
        }
        if !otp_matches(&ride.drop_otp, supplied_otp) {
            warn!(%ride_id, "drop otp mismatch");
            return Err(RideError::InvalidOtp);
        }

        let mut ended = ride;
        ended.state = RideState::DropVerified;
        ended.ended_at = Some(self.clock.now());
        self.store
            .replace_ride_if(ended.clone(), RideState::PickupVerified)
            .await?;

        self.store
            .release_driver(&ended.driver_id, ride_id, true)
            .await?;
        self.store
            .release_rider(&ended.rider_id, ride_id, true)
            .await?;

        info!(%ride_id, total_price = ended.fare.total_price, "ride completed");
        Ok(ended)
    }

    /// Rider cancellation, allowed only before pickup. The ride record is
    /// deleted and both parties are freed; the returned ride carries
    /// `CANCELLED`.
    pub async fn cancel(&self, ride_id: RideId, requesting_rider: &RiderId) -> Result<Ride, RideError> {
        let ride = self.store.ride(ride_id).await?;
        if &ride.rider_id != requesting_rider {
            return Err(RideError::Unauthorized(format!(
                "rider {requesting_rider} does not own ride {ride_id}"
            )));
        }
        match ride.state {
            RideState::Accepted => {}
            RideState::PickupVerified => {
                return Err(RideError::conflict(format!(
                    "ride {ride_id} already started and cannot be cancelled"
                )))
            }
            other => {
                return Err(RideError::conflict(format!(
                    "ride {ride_id} is {other} and cannot be cancelled"
                )))
            }
        }

        let mut cancelled = self
            .store
            .delete_ride_if(ride_id, RideState::Accepted)
            .await?;
        self.rollback_claims(&cancelled).await;
        cancelled.state = RideState::Cancelled;

        info!(%ride_id, rider_id = %requesting_rider, "ride cancelled");
        Ok(cancelled)
    }

    async fn rollback_claims(&self, ride: &Ride) {
        if let Err(err) = self.store.release_driver(&ride.driver_id, ride.id, false).await {
            warn!(ride_id = %ride.id, error = %err, "failed to release driver");
        }
        if let Err(err) = self.store.release_rider(&ride.rider_id, ride.id, false).await {
            warn!(ride_id = %ride.id, error = %err, "failed to release rider");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::InMemoryStore;
    use crate::test_helpers::FixedOtp;

    struct Fixture {
        store: Arc<InMemoryStore>,
        ledger: RideLedger,
        driver: DriverId,
        rider: RiderId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let driver = DriverId::new("d1");
        let rider = RiderId::new("r1");
        let here = GeoPoint::new(0.0, 0.0);
        store.register_driver(&driver, here).await.expect("driver");
        store.register_rider(&rider, here).await.expect("rider");
        let ledger = RideLedger::new(
            store.clone(),
            Arc::new(FixedOtp::new(["1111", "2222"])),
            Arc::new(SystemClock),
        );
        Fixture {
            store,
            ledger,
            driver,
            rider,
        }
    }

    fn fare() -> FareQuote {
        crate::pricing::price(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.0, 0.02),
            20.0,
            15.0,
            40.0,
        )
    }

    async fn create(f: &Fixture) -> Ride {
        f.ledger
            .create_ride(
                &f.driver,
                &f.rider,
                GeoPoint::new(0.0, 0.01),
                GeoPoint::new(0.0, 0.02),
                fare(),
            )
            .await
            .expect("create")
    }

    #[tokio::test]
    async fn create_marks_both_parties_and_generates_otps() {
        let f = fixture().await;
        let ride = create(&f).await;
        assert_eq!(ride.state, RideState::Accepted);
        assert_eq!(ride.pickup_otp, "1111");
        assert_eq!(ride.drop_otp, "2222");

        let driver = f.store.driver(&f.driver).await.expect("driver");
        let rider = f.store.rider(&f.rider).await.expect("rider");
        assert!(driver.is_on_ride && rider.is_on_ride);
        assert_eq!(driver.current_ride_id, Some(ride.id));
        assert_eq!(rider.current_ride_id, Some(ride.id));
    }

    #[tokio::test]
    async fn create_fails_when_party_is_busy_and_rolls_back_driver() {
        let f = fixture().await;
        f.store
            .claim_rider(&f.rider, RideId::generate())
            .await
            .expect("occupy rider");

        let err = f
            .ledger
            .create_ride(&f.driver, &f.rider, GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.1), fare())
            .await
            .expect_err("rider busy");
        assert!(matches!(err, RideError::Conflict(_)));
        let driver = f.store.driver(&f.driver).await.expect("driver");
        assert!(!driver.is_on_ride);
        assert!(f.store.rides().is_empty());
    }

    #[tokio::test]
    async fn create_with_unknown_party_is_not_found() {
        let f = fixture().await;
        let err = f
            .ledger
            .create_ride(
                &DriverId::new("ghost"),
                &f.rider,
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(0.0, 0.1),
                fare(),
            )
            .await
            .expect_err("unknown driver");
        assert!(matches!(err, RideError::NotFound { entity: "driver", .. }));
    }

    #[tokio::test]
    async fn wrong_pickup_otp_leaves_state_unchanged() {
        let f = fixture().await;
        let ride = create(&f).await;
        let err = f.ledger.verify_pickup(ride.id, "9999").await.expect_err("mismatch");
        assert_eq!(err, RideError::InvalidOtp);
        assert_eq!(f.ledger.ride(ride.id).await.expect("ride").state, RideState::Accepted);
    }

    #[tokio::test]
    async fn pickup_then_drop_completes_and_frees_parties() {
        let f = fixture().await;
        let ride = create(&f).await;

        let started = f.ledger.verify_pickup(ride.id, "1111").await.expect("pickup");
        assert_eq!(started.state, RideState::PickupVerified);
        assert!(started.started_at.is_some());

        let resubmitted = f.ledger.verify_pickup(ride.id, "1111").await;
        assert!(matches!(resubmitted, Err(RideError::Conflict(_))));

        let ended = f.ledger.verify_drop(ride.id, "2222").await.expect("drop");
        assert!(ended.is_ride_ended());
        assert!(ended.ended_at.is_some());

        let driver = f.store.driver(&f.driver).await.expect("driver");
        let rider = f.store.rider(&f.rider).await.expect("rider");
        assert!(!driver.is_on_ride && !rider.is_on_ride);
        assert_eq!(driver.current_ride_id, None);
        assert_eq!(driver.ride_history, vec![ride.id]);
        assert_eq!(rider.ride_history, vec![ride.id]);
    }

    #[tokio::test]
    async fn drop_cannot_precede_pickup() {
        let f = fixture().await;
        let ride = create(&f).await;
        let err = f.ledger.verify_drop(ride.id, "2222").await.expect_err("no pickup yet");
        assert!(matches!(err, RideError::Conflict(_)));
        assert_eq!(f.ledger.ride(ride.id).await.expect("ride").state, RideState::Accepted);
    }

    #[tokio::test]
    async fn cancel_before_pickup_deletes_ride_and_frees_parties() {
        let f = fixture().await;
        let ride = create(&f).await;
        let cancelled = f.ledger.cancel(ride.id, &f.rider).await.expect("cancel");
        assert_eq!(cancelled.state, RideState::Cancelled);
        assert!(matches!(
            f.ledger.ride(ride.id).await,
            Err(RideError::NotFound { entity: "ride", .. })
        ));
        let driver = f.store.driver(&f.driver).await.expect("driver");
        assert!(!driver.is_on_ride);
        assert!(driver.ride_history.is_empty());
    }

    #[tokio::test]
    async fn cancel_by_other_rider_is_unauthorized() {
        let f = fixture().await;
        let ride = create(&f).await;
        let err = f
            .ledger
            .cancel(ride.id, &RiderId::new("intruder"))
            .await
            .expect_err("not owner");
        assert!(matches!(err, RideError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn cancel_after_pickup_or_drop_is_conflict() {
        let f = fixture().await;
        let ride = create(&f).await;
        f.ledger.verify_pickup(ride.id, "1111").await.expect("pickup");
        assert!(matches!(
            f.ledger.cancel(ride.id, &f.rider).await,
            Err(RideError::Conflict(_))
        ));
        f.ledger.verify_drop(ride.id, "2222").await.expect("drop");
        assert!(matches!(
            f.ledger.cancel(ride.id, &f.rider).await,
            Err(RideError::Conflict(_))
        ));
        assert!(f.ledger.ride(ride.id).await.expect("kept").is_ride_ended());
    }
}
