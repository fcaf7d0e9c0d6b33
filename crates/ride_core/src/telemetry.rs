//! Service counters: what happened since startup, plus live gauges.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters, bumped by the service as flows complete.
#[derive(Debug, Default)]
pub struct ServiceTelemetry {
    rides_created: AtomicU64,
    rides_completed: AtomicU64,
    rides_cancelled: AtomicU64,
    offers_created: AtomicU64,
    offers_rejected: AtomicU64,
    offers_withdrawn: AtomicU64,
    offers_expired: AtomicU64,
    otp_failures: AtomicU64,
    alerts_raised: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    RidesCreated,
    RidesCompleted,
    RidesCancelled,
    OffersCreated,
    OffersRejected,
    OffersWithdrawn,
    OffersExpired,
    OtpFailures,
    AlertsRaised,
}

impl ServiceTelemetry {
    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::RidesCreated => &self.rides_created,
            Counter::RidesCompleted => &self.rides_completed,
            Counter::RidesCancelled => &self.rides_cancelled,
            Counter::OffersCreated => &self.offers_created,
            Counter::OffersRejected => &self.offers_rejected,
            Counter::OffersWithdrawn => &self.offers_withdrawn,
            Counter::OffersExpired => &self.offers_expired,
            Counter::OtpFailures => &self.otp_failures,
            Counter::AlertsRaised => &self.alerts_raised,
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.counter(counter).fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    /// Counters plus the gauges the caller samples at the same moment.
    pub fn snapshot(&self, live: LiveCounts) -> ServiceStats {
        ServiceStats {
            rides_created: self.get(Counter::RidesCreated),
            rides_completed: self.get(Counter::RidesCompleted),
            rides_cancelled: self.get(Counter::RidesCancelled),
            offers_created: self.get(Counter::OffersCreated),
            offers_rejected: self.get(Counter::OffersRejected),
            offers_withdrawn: self.get(Counter::OffersWithdrawn),
            offers_expired: self.get(Counter::OffersExpired),
            otp_failures: self.get(Counter::OtpFailures),
            alerts_raised: self.get(Counter::AlertsRaised),
            live,
        }
    }
}

/// Point-in-time gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveCounts {
    pub connected_drivers: usize,
    pub connected_riders: usize,
    pub admin_connected: bool,
    pub tracked_drivers: usize,
    pub active_rides: usize,
    pub pending_offers: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub rides_created: u64,
    pub rides_completed: u64,
    pub rides_cancelled: u64,
    pub offers_created: u64,
    pub offers_rejected: u64,
    pub offers_withdrawn: u64,
    pub offers_expired: u64,
    pub otp_failures: u64,
    pub alerts_raised: u64,
    #[serde(flatten)]
    pub live: LiveCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let telemetry = ServiceTelemetry::default();
        telemetry.incr(Counter::RidesCreated);
        telemetry.incr(Counter::RidesCreated);
        telemetry.add(Counter::OffersExpired, 3);

        let stats = telemetry.snapshot(LiveCounts {
            active_rides: 2,
            ..LiveCounts::default()
        });
        assert_eq!(stats.rides_created, 2);
        assert_eq!(stats.offers_expired, 3);
        assert_eq!(stats.rides_completed, 0);
        assert_eq!(stats.live.active_rides, 2);
    }

    #[test]
    fn snapshot_flattens_live_counts() {
        let stats = ServiceTelemetry::default().snapshot(LiveCounts {
            connected_drivers: 4,
            ..LiveCounts::default()
        });
        let value = serde_json::to_value(stats).expect("serialize");
        assert_eq!(value["connectedDrivers"], 4);
        assert_eq!(value["ridesCreated"], 0);
    }
}
