//! Out-of-band delivery for parties without a live connection.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::entities::DriverId;
use crate::error::RideError;

/// A notification addressed to an offline driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub driver_id: DriverId,
    /// Name of the real-time event that could not be delivered.
    pub event: String,
    pub title: String,
    pub body: serde_json::Value,
}

/// Fire-and-forget push channel. Errors are reported to the caller, which logs
/// and drops them; a failed push never blocks a ride transition.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify(&self, message: PushMessage) -> Result<(), RideError>;
}

/// Notifier that only records the push in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl PushNotifier for LogNotifier {
    async fn notify(&self, message: PushMessage) -> Result<(), RideError> {
        info!(
            driver_id = %message.driver_id,
            event = %message.event,
            title = %message.title,
            "push notification"
        );
        Ok(())
    }
}
