//! Live connection registry for drivers, riders and the admin observer.
//!
//! Each connection owns an unbounded channel drained by its transport task, so
//! events to the same party keep their send order. Delivery is at-most-once: an
//! absent or closed connection drops the event (drivers fall back to push).

pub mod events;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::entities::{AdminId, DriverId, RiderId};
use crate::notify::{PushMessage, PushNotifier};
use crate::store::RideStore;

pub use events::{CandidateView, ClientEvent, OfferView, RideView, Role, ServerEvent};

/// Who sits on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Party {
    Driver(DriverId),
    Rider(RiderId),
    Admin(AdminId),
}

impl Party {
    pub fn role(&self) -> Role {
        match self {
            Party::Driver(_) => Role::Driver,
            Party::Rider(_) => Role::Rider,
            Party::Admin(_) => Role::Admin,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Party::Driver(id) => id.as_str(),
            Party::Rider(id) => id.as_str(),
            Party::Admin(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Driver(id) => write!(f, "driver:{id}"),
            Party::Rider(id) => write!(f, "rider:{id}"),
            Party::Admin(id) => write!(f, "admin:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sending half of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Write straight to this connection, bypassing the registry.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Per-connection state kept by the transport loop.
#[derive(Debug)]
pub struct Session {
    pub handle: ConnectionHandle,
    /// Set by the first successful register event.
    pub party: Option<Party>,
}

impl Session {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            party: None,
        }
    }
}

pub struct RealtimeGateway {
    connections: DashMap<Party, ConnectionHandle>,
    /// Last connection bound per party. Survives pruning of a dead handle so
    /// the owning session can still run its disconnect.
    bound: DashMap<Party, ConnectionId>,
    admin: RwLock<Option<AdminId>>,
    next_id: AtomicU64,
    store: Arc<dyn RideStore>,
    notifier: Arc<dyn PushNotifier>,
}

impl RealtimeGateway {
    pub fn new(store: Arc<dyn RideStore>, notifier: Arc<dyn PushNotifier>) -> Self {
        Self {
            connections: DashMap::new(),
            bound: DashMap::new(),
            admin: RwLock::new(None),
            next_id: AtomicU64::new(1),
            store,
            notifier,
        }
    }

    /// Allocate a connection; the transport drains the receiver.
    pub fn open(&self) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        (ConnectionHandle { id, tx }, rx)
    }

    /// Map `party` to `handle`, replacing any earlier connection. The latest
    /// registered admin becomes the alert target.
    pub fn bind(&self, party: Party, handle: &ConnectionHandle) {
        if let Party::Admin(admin_id) = &party {
            *self.admin.write() = Some(admin_id.clone());
        }
        self.bound.insert(party.clone(), handle.id);
        if let Some(previous) = self.connections.insert(party.clone(), handle.clone()) {
            if previous.id != handle.id {
                debug!(%party, old = %previous.id, new = %handle.id, "connection replaced");
            }
        }
    }

    /// Best-effort write to the party's current connection.
    pub fn send(&self, party: &Party, event: ServerEvent) -> bool {
        let handle = match self.connections.get(party) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(%party, event = event.name(), "no live connection, event dropped");
                return false;
            }
        };
        if handle.send(event) {
            return true;
        }
        warn!(%party, connection = %handle.id, "stale connection removed");
        self.connections
            .remove_if(party, |_, current| current.id == handle.id);
        false
    }

    /// Like [`send`](Self::send), but offline drivers get a push notification.
    /// The push runs on its own task; failures are logged and swallowed.
    pub fn deliver(&self, party: &Party, event: ServerEvent) -> bool {
        let Party::Driver(driver_id) = party else {
            return self.send(party, event);
        };
        let name = event.name();
        let body = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        if self.send(party, event) {
            return true;
        }
        let message = PushMessage {
            driver_id: driver_id.clone(),
            event: name.to_string(),
            title: push_title(name).to_string(),
            body,
        };
        let notifier = Arc::clone(&self.notifier);
        let driver_id = driver_id.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(message).await {
                warn!(%driver_id, event = name, error = %err, "push notification failed");
            }
        });
        false
    }

    /// Send to the sole registered admin, if one is connected.
    pub fn send_admin(&self, event: ServerEvent) -> bool {
        let admin = self.admin.read().clone();
        match admin {
            Some(admin_id) => self.send(&Party::Admin(admin_id), event),
            None => {
                debug!(event = event.name(), "no admin registered, event dropped");
                false
            }
        }
    }

    /// Unbind `party` if `connection` is the last one bound to it, even when a
    /// failed send already pruned the handle. A driver going offline is marked
    /// inactive and must register again to get offers.
    pub async fn disconnect(&self, party: &Party, connection: ConnectionId) -> bool {
        self.connections
            .remove_if(party, |_, current| current.id == connection);
        let current = self
            .bound
            .remove_if(party, |_, bound| *bound == connection)
            .is_some();
        if !current {
            debug!(%party, %connection, "disconnect of superseded connection");
            return false;
        }
        match party {
            Party::Driver(driver_id) => {
                if let Err(err) = self.store.set_driver_active(driver_id, false).await {
                    warn!(%driver_id, error = %err, "failed to deactivate driver");
                }
            }
            Party::Admin(admin_id) => {
                let fallback = self.remaining_admin();
                let mut admin = self.admin.write();
                if admin.as_ref() == Some(admin_id) {
                    *admin = fallback;
                }
            }
            Party::Rider(_) => {}
        }
        debug!(%party, %connection, "disconnected");
        true
    }

    fn remaining_admin(&self) -> Option<AdminId> {
        self.connections.iter().find_map(|entry| match entry.key() {
            Party::Admin(admin_id) => Some(admin_id.clone()),
            _ => None,
        })
    }

    pub fn is_connected(&self, party: &Party) -> bool {
        self.connections.contains_key(party)
    }

    pub fn admin(&self) -> Option<AdminId> {
        self.admin.read().clone()
    }

    pub fn connected(&self, role: Role) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.key().role() == role)
            .count()
    }
}

fn push_title(event: &str) -> &'static str {
    match event {
        "rideRequest" => "New ride request",
        "cancelRide" => "Ride cancelled",
        "offerExpired" => "Ride request expired",
        "rideDetails" => "Ride confirmed",
        _ => "Ride update",
    }
}
