//! `RideService` wires the geo index, fare calculator, ledger, matching
//! coordinator and gateway together, and fans each state change out to the
//! parties that care about it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::commands::{
    CancelRequest, Command, Envelope, OtpRequest, Reply, RespondRequest, SelectDriverRequest,
};
use crate::config::ServiceConfig;
use crate::entities::{DriverId, Ride, RideId, RideState, RiderId};
use crate::error::RideError;
use crate::gateway::{
    CandidateView, ClientEvent, OfferView, Party, RealtimeGateway, RideView, Role, ServerEvent,
    Session,
};
use crate::geo::GeoPoint;
use crate::ledger::RideLedger;
use crate::matching::{Candidate, MatchingCoordinator, Offer, RideRequest};
use crate::notify::{LogNotifier, PushNotifier};
use crate::otp::{OtpGenerator, RandomOtp};
use crate::spatial::GeoIndex;
use crate::store::{InMemoryStore, RideStore};
use crate::telemetry::{Counter, LiveCounts, ServiceStats, ServiceTelemetry};

pub struct RideServiceBuilder {
    config: ServiceConfig,
    store: Option<Arc<dyn RideStore>>,
    clock: Option<Arc<dyn Clock>>,
    otp: Option<Arc<dyn OtpGenerator>>,
    notifier: Option<Arc<dyn PushNotifier>>,
}

impl RideServiceBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            store: None,
            clock: None,
            otp: None,
            notifier: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RideStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_otp(mut self, otp: Arc<dyn OtpGenerator>) -> Self {
        self.otp = Some(otp);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PushNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> RideService {
        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let otp = self
            .otp
            .unwrap_or_else(|| Arc::new(RandomOtp::from_seed(config.otp_seed)));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        let geo = Arc::new(GeoIndex::new(config.h3_resolution, store.clone()));
        let ledger = Arc::new(RideLedger::new(store.clone(), otp, clock.clone()));
        let matching = MatchingCoordinator::new(
            geo.clone(),
            store.clone(),
            ledger.clone(),
            clock.clone(),
            config.pricing,
            config.search_radius_m,
            config.offer_ttl_secs,
        );
        let gateway = RealtimeGateway::new(store.clone(), notifier);

        RideService {
            config,
            store,
            geo,
            ledger,
            matching,
            gateway,
            telemetry: ServiceTelemetry::default(),
            clock,
        }
    }
}

pub struct RideService {
    config: ServiceConfig,
    store: Arc<dyn RideStore>,
    geo: Arc<GeoIndex>,
    ledger: Arc<RideLedger>,
    matching: MatchingCoordinator,
    gateway: RealtimeGateway,
    telemetry: ServiceTelemetry,
    clock: Arc<dyn Clock>,
}

impl RideService {
    pub fn new(config: ServiceConfig) -> Self {
        RideServiceBuilder::new(config).build()
    }

    pub fn builder(config: ServiceConfig) -> RideServiceBuilder {
        RideServiceBuilder::new(config)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RideStore> {
        &self.store
    }

    pub fn geo(&self) -> &GeoIndex {
        &self.geo
    }

    pub fn ledger(&self) -> &RideLedger {
        &self.ledger
    }

    pub fn matching(&self) -> &MatchingCoordinator {
        &self.matching
    }

    pub fn gateway(&self) -> &RealtimeGateway {
        &self.gateway
    }

    pub fn telemetry(&self) -> &ServiceTelemetry {
        &self.telemetry
    }

    // ---------------------------------------------------------------------
    // Request/response operations
    // ---------------------------------------------------------------------

    /// Validate and run one command, wrapping the outcome in an envelope.
    /// Nothing escapes as a panic or a bare error.
    pub async fn handle(&self, command: Command) -> Envelope<Reply> {
        let name = command.name();
        let result = self.execute(command).await;
        if let Err(err) = &result {
            debug!(command = name, code = err.code(), error = %err, "command failed");
        }
        Envelope::from_result(result)
    }

    pub async fn execute(&self, command: Command) -> Result<Reply, RideError> {
        command.validate()?;
        match command {
            Command::FindCandidates(request) => {
                let candidates = self.find_candidates(&request).await?;
                Ok(Reply::Candidates(
                    candidates.iter().map(CandidateView::from).collect(),
                ))
            }
            Command::SelectDriver(request) => {
                let offer = self.select_driver(&request).await?;
                Ok(Reply::Offer(OfferView::from(&offer)))
            }
            Command::RespondToOffer(request) => self.respond(&request).await,
            Command::VerifyPickup(request) => {
                let ride = self.verify_pickup(&request).await?;
                Ok(Reply::Ride(RideView::for_driver(&ride)))
            }
            Command::VerifyDrop(request) => {
                let ride = self.verify_drop(&request).await?;
                Ok(Reply::Ride(RideView::for_driver(&ride)))
            }
            Command::CancelRide(request) => self.cancel(&request).await,
            Command::GetRide(request) => {
                let ride = self.ledger.ride(request.ride_id).await?;
                Ok(Reply::Ride(RideView::for_admin(&ride)))
            }
        }
    }

    pub async fn find_candidates(&self, request: &RideRequest) -> Result<Vec<Candidate>, RideError> {
        self.matching.find_candidates(request).await
    }

    /// Open an offer to the chosen driver and tell both sides.
    pub async fn select_driver(&self, request: &SelectDriverRequest) -> Result<Offer, RideError> {
        let offer = self
            .matching
            .select_driver(&request.ride_request(), &request.driver_id)
            .await?;
        self.telemetry.incr(Counter::OffersCreated);

        let view = OfferView::from(&offer);
        self.gateway.deliver(
            &Party::Driver(offer.driver_id.clone()),
            ServerEvent::RideRequest(view.clone()),
        );
        self.gateway.send(
            &Party::Rider(offer.rider_id.clone()),
            ServerEvent::DriverSelected(view),
        );
        Ok(offer)
    }

    /// Driver's answer to an offer.
    pub async fn respond(&self, request: &RespondRequest) -> Result<Reply, RideError> {
        if request.accept {
            let ride = self.accept_offer(request).await?;
            Ok(Reply::Ride(RideView::for_driver(&ride)))
        } else {
            let offer = self
                .matching
                .reject(request.offer_id, &request.driver_id)?;
            self.telemetry.incr(Counter::OffersRejected);
            let view = OfferView::from(&offer);
            self.gateway.send(
                &Party::Rider(offer.rider_id.clone()),
                ServerEvent::RideRejected(view.clone()),
            );
            Ok(Reply::Offer(view))
        }
    }

    async fn accept_offer(&self, request: &RespondRequest) -> Result<Ride, RideError> {
        let pending = self.matching.offers().get(request.offer_id);
        match self
            .matching
            .accept(request.offer_id, &request.driver_id)
            .await
        {
            Ok(ride) => {
                self.telemetry.incr(Counter::RidesCreated);
                self.gateway.send(
                    &Party::Rider(ride.rider_id.clone()),
                    ServerEvent::RideAccepted(RideView::for_rider(&ride)),
                );
                self.gateway.send(
                    &Party::Driver(ride.driver_id.clone()),
                    ServerEvent::RideDetails(RideView::for_driver(&ride)),
                );
                self.publish_status(&ride);
                Ok(ride)
            }
            Err(err) => {
                // The offer is consumed once the addressee answers; let the rider
                // pick again.
                if let Some(mut offer) = pending.filter(|offer| offer.driver_id == request.driver_id) {
                    let event = if matches!(err, RideError::OfferExpired(_)) {
                        self.telemetry.incr(Counter::OffersExpired);
                        ServerEvent::OfferExpired(OfferView::from(&offer))
                    } else {
                        offer.state = RideState::Rejected;
                        ServerEvent::RideRejected(OfferView::from(&offer))
                    };
                    self.gateway.send(&Party::Rider(offer.rider_id.clone()), event);
                }
                Err(err)
            }
        }
    }

    pub async fn verify_pickup(&self, request: &OtpRequest) -> Result<Ride, RideError> {
        let ride = self
            .ledger
            .verify_pickup(request.ride_id, &request.otp)
            .await
            .map_err(|err| self.count_otp_failure(err))?;
        self.gateway.send(
            &Party::Rider(ride.rider_id.clone()),
            ServerEvent::PickupRider(RideView::for_rider(&ride)),
        );
        self.gateway.send(
            &Party::Driver(ride.driver_id.clone()),
            ServerEvent::PickupOtpVerifiedToDriver(RideView::for_driver(&ride)),
        );
        self.publish_status(&ride);
        Ok(ride)
    }

    pub async fn verify_drop(&self, request: &OtpRequest) -> Result<Ride, RideError> {
        let ride = self
            .ledger
            .verify_drop(request.ride_id, &request.otp)
            .await
            .map_err(|err| self.count_otp_failure(err))?;
        self.telemetry.incr(Counter::RidesCompleted);
        self.gateway.send(
            &Party::Rider(ride.rider_id.clone()),
            ServerEvent::RideVerifyRider(RideView::for_rider(&ride)),
        );
        self.gateway.send(
            &Party::Driver(ride.driver_id.clone()),
            ServerEvent::RideCompletedToDriver(RideView::for_driver(&ride)),
        );
        self.publish_status(&ride);
        Ok(ride)
    }

    fn count_otp_failure(&self, err: RideError) -> RideError {
        if err == RideError::InvalidOtp {
            self.telemetry.incr(Counter::OtpFailures);
        }
        err
    }

    /// Cancel an accepted ride or withdraw a pending offer; the driver is told
    /// either way.
    pub async fn cancel(&self, request: &CancelRequest) -> Result<Reply, RideError> {
        match (request.ride_id, request.offer_id) {
            (Some(ride_id), None) => {
                let ride = self.cancel_ride(ride_id, &request.rider_id).await?;
                Ok(Reply::Ride(RideView::for_rider(&ride)))
            }
            (None, Some(offer_id)) => {
                let offer = self.matching.withdraw(offer_id, &request.rider_id)?;
                self.telemetry.incr(Counter::OffersWithdrawn);
                self.gateway.deliver(
                    &Party::Driver(offer.driver_id.clone()),
                    ServerEvent::CancelRide {
                        ride_id: None,
                        offer_id: Some(offer.id),
                        rider_id: offer.rider_id.clone(),
                    },
                );
                Ok(Reply::Offer(OfferView::from(&offer)))
            }
            _ => Err(RideError::validation(
                "exactly one of rideId and offerId is required",
            )),
        }
    }

    pub async fn cancel_ride(&self, ride_id: RideId, rider_id: &RiderId) -> Result<Ride, RideError> {
        let ride = self.ledger.cancel(ride_id, rider_id).await?;
        self.telemetry.incr(Counter::RidesCancelled);
        self.gateway.deliver(
            &Party::Driver(ride.driver_id.clone()),
            ServerEvent::CancelRide {
                ride_id: Some(ride.id),
                offer_id: None,
                rider_id: ride.rider_id.clone(),
            },
        );
        self.publish_status(&ride);
        Ok(ride)
    }

    fn publish_status(&self, ride: &Ride) {
        self.gateway
            .send_admin(ServerEvent::RideStatus(RideView::for_admin(ride)));
    }

    /// Drop offers past their deadline and tell both sides. Returns how many
    /// expired.
    pub fn expire_offers(&self) -> usize {
        let expired = self.matching.expire_offers();
        for offer in &expired {
            let view = OfferView::from(offer);
            self.gateway.send(
                &Party::Rider(offer.rider_id.clone()),
                ServerEvent::OfferExpired(view.clone()),
            );
            self.gateway
                .send(&Party::Driver(offer.driver_id.clone()), ServerEvent::OfferExpired(view));
        }
        if !expired.is_empty() {
            self.telemetry
                .add(Counter::OffersExpired, expired.len() as u64);
            info!(count = expired.len(), "offers expired");
        }
        expired.len()
    }

    pub async fn stats(&self) -> ServiceStats {
        let live = LiveCounts {
            connected_drivers: self.gateway.connected(Role::Driver),
            connected_riders: self.gateway.connected(Role::Rider),
            admin_connected: self.gateway.admin().is_some(),
            tracked_drivers: self.geo.tracked_drivers(),
            active_rides: self.store.active_ride_count().await,
            pending_offers: self.matching.offers().len(),
        };
        self.telemetry.snapshot(live)
    }

    // ---------------------------------------------------------------------
    // Real-time events
    // ---------------------------------------------------------------------

    /// Process one inbound frame. Failures are reported on the same connection
    /// as an `error` event and never tear the connection down.
    pub async fn handle_event(&self, session: &mut Session, event: ClientEvent) {
        let name = event.name();
        if let Err(err) = self.dispatch_event(session, event).await {
            debug!(event = name, code = err.code(), error = %err, "inbound event failed");
            session.handle.send(ServerEvent::error(&err));
        }
    }

    async fn dispatch_event(&self, session: &mut Session, event: ClientEvent) -> Result<(), RideError> {
        event.validate()?;
        match event {
            ClientEvent::RegisterDriver { driver_id, lat, lng } => {
                let party = Party::Driver(driver_id.clone());
                ensure_unbound(session, &party)?;
                let location = GeoPoint::new(lat, lng);
                self.store.register_driver(&driver_id, location).await?;
                self.geo.update_location(&driver_id, location).await?;
                self.bind(session, party);
                Ok(())
            }
            ClientEvent::RegisterRider { rider_id, lat, lng } => {
                let party = Party::Rider(rider_id.clone());
                ensure_unbound(session, &party)?;
                self.store
                    .register_rider(&rider_id, GeoPoint::new(lat, lng))
                    .await?;
                self.bind(session, party);
                Ok(())
            }
            ClientEvent::RegisterAdmin { admin_id } => {
                let party = Party::Admin(admin_id);
                ensure_unbound(session, &party)?;
                self.bind(session, party);
                Ok(())
            }
            ClientEvent::UpdateLocation { lat, lng } => {
                let location = GeoPoint::new(lat, lng);
                match registered(session)? {
                    Party::Driver(driver_id) => {
                        let driver_id = driver_id.clone();
                        self.driver_heartbeat(&driver_id, location).await
                    }
                    Party::Rider(rider_id) => self.store.set_rider_location(rider_id, location).await,
                    Party::Admin(_) => Err(RideError::validation(
                        "admin connections do not report a location",
                    )),
                }
            }
            ClientEvent::EmergencyAlert { lat, lng, message } => {
                let party = registered(session)?;
                if party.role() == Role::Admin {
                    return Err(RideError::validation("admins cannot raise emergency alerts"));
                }
                self.telemetry.incr(Counter::AlertsRaised);
                warn!(%party, lat, lng, "emergency alert raised");
                let delivered = self.gateway.send_admin(ServerEvent::EmergencyAlert {
                    role: party.role(),
                    party_id: party.id().to_string(),
                    lat,
                    lng,
                    message,
                    raised_at: self.clock.now(),
                });
                if !delivered {
                    warn!(%party, "no admin connected for emergency alert");
                }
                Ok(())
            }
        }
    }

    fn bind(&self, session: &mut Session, party: Party) {
        self.gateway.bind(party.clone(), &session.handle);
        session.handle.send(ServerEvent::Registered {
            role: party.role(),
            id: party.id().to_string(),
        });
        info!(%party, connection = %session.handle.id(), "registered");
        session.party = Some(party);
    }

    /// Index the new position and, while the driver is on a ride, forward it to
    /// the rider.
    async fn driver_heartbeat(&self, driver_id: &DriverId, location: GeoPoint) -> Result<(), RideError> {
        if !self.geo.update_location(driver_id, location).await? {
            return Ok(());
        }
        let driver = self.store.driver(driver_id).await?;
        let Some(ride_id) = driver.current_ride_id else {
            return Ok(());
        };
        let ride = match self.store.ride(ride_id).await {
            Ok(ride) => ride,
            Err(RideError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };
        if !ride.state.is_terminal() {
            self.gateway.send(
                &Party::Rider(ride.rider_id.clone()),
                ServerEvent::DriverLocation {
                    driver_id: driver_id.clone(),
                    ride_id,
                    lat: location.lat,
                    lng: location.lng,
                },
            );
        }
        Ok(())
    }

    /// Tear down a connection. Only the connection currently bound to the party
    /// unbinds it; a driver going offline also leaves the geo index.
    pub async fn close_session(&self, session: &Session) {
        let Some(party) = &session.party else {
            return;
        };
        let removed = self.gateway.disconnect(party, session.handle.id()).await;
        if removed {
            if let Party::Driver(driver_id) = party {
                self.geo.forget(driver_id);
            }
        }
    }
}

fn ensure_unbound(session: &Session, party: &Party) -> Result<(), RideError> {
    match &session.party {
        Some(current) if current != party => Err(RideError::conflict(format!(
            "connection already registered as {current}"
        ))),
        _ => Ok(()),
    }
}

fn registered(session: &Session) -> Result<&Party, RideError> {
    session
        .party
        .as_ref()
        .ok_or_else(|| RideError::validation("connection is not registered"))
}
