//! Fixtures shared by unit tests, integration tests and benches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::clock::ManualClock;
use crate::config::ServiceConfig;
use crate::error::RideError;
use crate::gateway::ServerEvent;
use crate::geo::{GeoPoint, EARTH_RADIUS_KM};
use crate::notify::{PushMessage, PushNotifier};
use crate::otp::OtpGenerator;
use crate::service::RideService;

/// Fixed start time for deterministic timestamps (2023-11-14T22:13:20Z).
pub const TEST_EPOCH_SECS: i64 = 1_700_000_000;

pub fn test_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(TEST_EPOCH_SECS, 0).unwrap_or_default()
}

/// A point `meters` due north of `origin` by great-circle distance.
pub fn point_north_of(origin: GeoPoint, meters: f64) -> GeoPoint {
    let delta_rad = meters / (EARTH_RADIUS_KM * 1000.0);
    GeoPoint::new(origin.lat + delta_rad.to_degrees(), origin.lng)
}

/// Hands out the given codes in order, wrapping around.
#[derive(Debug)]
pub struct FixedOtp {
    codes: Vec<String>,
    next: AtomicUsize,
}

impl FixedOtp {
    pub fn new<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        let codes: Vec<String> = codes.into_iter().map(str::to_string).collect();
        assert!(!codes.is_empty(), "FixedOtp needs at least one code");
        Self {
            codes,
            next: AtomicUsize::new(0),
        }
    }
}

impl OtpGenerator for FixedOtp {
    fn generate(&self) -> String {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        self.codes[i % self.codes.len()].clone()
    }
}

/// Notifier that keeps every push for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<PushMessage>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<PushMessage> {
        self.messages.lock().clone()
    }

    /// Yield until at least `count` pushes have landed (pushes run on their
    /// own tasks), then return everything recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<PushMessage> {
        for _ in 0..1_000 {
            if self.messages.lock().len() >= count {
                break;
            }
            tokio::task::yield_now().await;
        }
        self.messages()
    }
}

#[async_trait]
impl PushNotifier for RecordingNotifier {
    async fn notify(&self, message: PushMessage) -> Result<(), RideError> {
        self.messages.lock().push(message);
        Ok(())
    }
}

/// Notifier whose deliveries always fail.
#[derive(Debug, Default)]
pub struct FailingNotifier;

#[async_trait]
impl PushNotifier for FailingNotifier {
    async fn notify(&self, _message: PushMessage) -> Result<(), RideError> {
        Err(RideError::Upstream("push service unavailable".into()))
    }
}

/// A service on a manual clock with pickup OTP `1111` and drop OTP `2222`.
pub struct TestService {
    pub service: Arc<RideService>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn test_service() -> TestService {
    test_service_with(ServiceConfig::default())
}

pub fn test_service_with(config: ServiceConfig) -> TestService {
    let clock = Arc::new(ManualClock::new(test_epoch()));
    let notifier = Arc::new(RecordingNotifier::default());
    let service = RideService::builder(config)
        .with_clock(clock.clone())
        .with_otp(Arc::new(FixedOtp::new(["1111", "2222"])))
        .with_notifier(notifier.clone())
        .build();
    TestService {
        service: Arc::new(service),
        clock,
        notifier,
    }
}

/// Everything currently queued on a connection.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Event names currently queued on a connection, in order.
pub fn drain_names(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<&'static str> {
    drain(rx).iter().map(ServerEvent::name).collect()
}
