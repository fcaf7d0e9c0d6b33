use ride_core::entities::{AdminId, DriverId, RiderId};
use ride_core::gateway::{ClientEvent, ServerEvent, Session};
use ride_core::geo::GeoPoint;
use ride_core::service::RideService;
use ride_core::test_helpers::{drain, drain_names};
use tokio::sync::mpsc::UnboundedReceiver;

/// A registered live connection and the events queued for it.
pub struct Connected {
    pub session: Session,
    pub rx: UnboundedReceiver<ServerEvent>,
}

impl Connected {
    pub fn events(&mut self) -> Vec<ServerEvent> {
        drain(&mut self.rx)
    }

    pub fn names(&mut self) -> Vec<&'static str> {
        drain_names(&mut self.rx)
    }

    pub async fn send(&mut self, service: &RideService, event: ClientEvent) {
        service.handle_event(&mut self.session, event).await;
    }
}

async fn connect(service: &RideService, event: ClientEvent) -> Connected {
    let (handle, rx) = service.gateway().open();
    let mut connected = Connected {
        session: Session::new(handle),
        rx,
    };
    connected.send(service, event).await;
    assert_eq!(connected.names(), vec!["registered"]);
    connected
}

pub async fn connect_driver(service: &RideService, id: &str, at: GeoPoint) -> Connected {
    connect(
        service,
        ClientEvent::RegisterDriver {
            driver_id: DriverId::new(id),
            lat: at.lat,
            lng: at.lng,
        },
    )
    .await
}

pub async fn connect_rider(service: &RideService, id: &str, at: GeoPoint) -> Connected {
    connect(
        service,
        ClientEvent::RegisterRider {
            rider_id: RiderId::new(id),
            lat: at.lat,
            lng: at.lng,
        },
    )
    .await
}

pub async fn connect_admin(service: &RideService, id: &str) -> Connected {
    connect(
        service,
        ClientEvent::RegisterAdmin {
            admin_id: AdminId::new(id),
        },
    )
    .await
}
