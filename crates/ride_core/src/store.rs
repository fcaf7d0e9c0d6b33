//! Persistence port for drivers, riders and rides.
//!
//! Every operation is atomic with respect to a single document. Occupancy is
//! claimed with a compare-and-set on `is_on_ride`, and ride transitions with a
//! compare-and-set on the ride state, so two flows racing for the same driver
//! cannot both win.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::warn;

use crate::entities::{Driver, DriverId, Ride, RideId, RideState, Rider, RiderId};
use crate::error::RideError;
use crate::geo::GeoPoint;

#[async_trait]
pub trait RideStore: Send + Sync {
    /// Create the driver if unknown, otherwise update its location. Either way
    /// the driver ends up active; occupancy is left untouched.
    async fn register_driver(&self, id: &DriverId, location: GeoPoint) -> Result<Driver, RideError>;

    async fn register_rider(&self, id: &RiderId, location: GeoPoint) -> Result<Rider, RideError>;

    async fn driver(&self, id: &DriverId) -> Result<Driver, RideError>;

    async fn rider(&self, id: &RiderId) -> Result<Rider, RideError>;

    async fn set_driver_location(&self, id: &DriverId, location: GeoPoint) -> Result<(), RideError>;

    async fn set_rider_location(&self, id: &RiderId, location: GeoPoint) -> Result<(), RideError>;

    async fn set_driver_active(&self, id: &DriverId, active: bool) -> Result<(), RideError>;

    /// `is_on_ride: false -> true`, binding the driver to `ride_id`.
    async fn claim_driver(&self, id: &DriverId, ride_id: RideId) -> Result<(), RideError>;

    async fn claim_rider(&self, id: &RiderId, ride_id: RideId) -> Result<(), RideError>;

    /// Clears occupancy if the driver is still bound to `ride_id`. When
    /// `completed` is set the ride is appended to the driver's history.
    async fn release_driver(
        &self,
        id: &DriverId,
        ride_id: RideId,
        completed: bool,
    ) -> Result<(), RideError>;

    async fn release_rider(
        &self,
        id: &RiderId,
        ride_id: RideId,
        completed: bool,
    ) -> Result<(), RideError>;

    async fn insert_ride(&self, ride: Ride) -> Result<(), RideError>;

    async fn ride(&self, id: RideId) -> Result<Ride, RideError>;

    /// Replace the stored ride only if its current state is `expected`.
    async fn replace_ride_if(&self, ride: Ride, expected: RideState) -> Result<(), RideError>;

    /// Hard-delete the ride only if its current state is `expected`.
    async fn delete_ride_if(&self, id: RideId, expected: RideState) -> Result<Ride, RideError>;

    /// Rides that have not reached a terminal state.
    async fn active_ride_count(&self) -> usize;
}

/// Process-local store backed by sharded maps; each map entry is locked
/// independently while it is mutated.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    drivers: DashMap<DriverId, Driver>,
    riders: DashMap<RiderId, Rider>,
    rides: DashMap<RideId, Ride>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.drivers.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn riders(&self) -> Vec<Rider> {
        self.riders.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn rides(&self) -> Vec<Ride> {
        self.rides.iter().map(|entry| entry.value().clone()).collect()
    }
}

fn state_mismatch(id: RideId, expected: RideState, actual: RideState) -> RideError {
    RideError::conflict(format!(
        "ride {id} is {actual}, expected {expected}"
    ))
}

#[async_trait]
impl RideStore for InMemoryStore {
    async fn register_driver(&self, id: &DriverId, location: GeoPoint) -> Result<Driver, RideError> {
        let mut entry = self
            .drivers
            .entry(id.clone())
            .or_insert_with(|| Driver::new(id.clone(), location));
        entry.location = Some(location);
        entry.is_active = true;
        Ok(entry.clone())
    }

    async fn register_rider(&self, id: &RiderId, location: GeoPoint) -> Result<Rider, RideError> {
        let mut entry = self
            .riders
            .entry(id.clone())
            .or_insert_with(|| Rider::new(id.clone(), location));
        entry.location = Some(location);
        Ok(entry.clone())
    }

    async fn driver(&self, id: &DriverId) -> Result<Driver, RideError> {
        self.drivers
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RideError::not_found("driver", id))
    }

    async fn rider(&self, id: &RiderId) -> Result<Rider, RideError> {
        self.riders
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RideError::not_found("rider", id))
    }

    async fn set_driver_location(&self, id: &DriverId, location: GeoPoint) -> Result<(), RideError> {
        let mut driver = self
            .drivers
            .get_mut(id)
            .ok_or_else(|| RideError::not_found("driver", id))?;
        driver.location = Some(location);
        Ok(())
    }

    async fn set_rider_location(&self, id: &RiderId, location: GeoPoint) -> Result<(), RideError> {
        let mut rider = self
            .riders
            .get_mut(id)
            .ok_or_else(|| RideError::not_found("rider", id))?;
        rider.location = Some(location);
        Ok(())
    }

    async fn set_driver_active(&self, id: &DriverId, active: bool) -> Result<(), RideError> {
        let mut driver = self
            .drivers
            .get_mut(id)
            .ok_or_else(|| RideError::not_found("driver", id))?;
        driver.is_active = active;
        Ok(())
    }

    async fn claim_driver(&self, id: &DriverId, ride_id: RideId) -> Result<(), RideError> {
        let mut driver = self
            .drivers
            .get_mut(id)
            .ok_or_else(|| RideError::not_found("driver", id))?;
        if driver.is_on_ride {
            return Err(RideError::conflict(format!("driver {id} is already on a ride")));
        }
        driver.is_on_ride = true;
        driver.current_ride_id = Some(ride_id);
        Ok(())
    }

    async fn claim_rider(&self, id: &RiderId, ride_id: RideId) -> Result<(), RideError> {
        let mut rider = self
            .riders
            .get_mut(id)
            .ok_or_else(|| RideError::not_found("rider", id))?;
        if rider.is_on_ride {
            return Err(RideError::conflict(format!("rider {id} is already on a ride")));
        }
        rider.is_on_ride = true;
        rider.current_ride_id = Some(ride_id);
        Ok(())
    }

    async fn release_driver(
        &self,
        id: &DriverId,
        ride_id: RideId,
        completed: bool,
    ) -> Result<(), RideError> {
        let mut driver = self
            .drivers
            .get_mut(id)
            .ok_or_else(|| RideError::not_found("driver", id))?;
        if driver.current_ride_id != Some(ride_id) {
            warn!(driver_id = %id, %ride_id, "driver no longer bound to ride; release skipped");
            return Ok(());
        }
        driver.is_on_ride = false;
        driver.current_ride_id = None;
        if completed {
            driver.ride_history.push(ride_id);
        }
        Ok(())
    }

    async fn release_rider(
        &self,
        id: &RiderId,
        ride_id: RideId,
        completed: bool,
    ) -> Result<(), RideError> {
        let mut rider = self
            .riders
            .get_mut(id)
            .ok_or_else(|| RideError::not_found("rider", id))?;
        if rider.current_ride_id != Some(ride_id) {
            warn!(rider_id = %id, %ride_id, "rider no longer bound to ride; release skipped");
            return Ok(());
        }
        rider.is_on_ride = false;
        rider.current_ride_id = None;
        if completed {
            rider.ride_history.push(ride_id);
        }
        Ok(())
    }

    async fn insert_ride(&self, ride: Ride) -> Result<(), RideError> {
        match self.rides.entry(ride.id) {
            Entry::Occupied(_) => Err(RideError::conflict(format!(
                "ride {} already exists",
                ride.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(ride);
                Ok(())
            }
        }
    }

    async fn ride(&self, id: RideId) -> Result<Ride, RideError> {
        self.rides
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RideError::not_found("ride", id))
    }

    async fn replace_ride_if(&self, ride: Ride, expected: RideState) -> Result<(), RideError> {
        let mut current = self
            .rides
            .get_mut(&ride.id)
            .ok_or_else(|| RideError::not_found("ride", ride.id))?;
        if current.state != expected {
            return Err(state_mismatch(ride.id, expected, current.state));
        }
        *current = ride;
        Ok(())
    }

    async fn delete_ride_if(&self, id: RideId, expected: RideState) -> Result<Ride, RideError> {
        match self.rides.entry(id) {
            Entry::Vacant(_) => Err(RideError::not_found("ride", id)),
            Entry::Occupied(slot) => {
                if slot.get().state != expected {
                    return Err(state_mismatch(id, expected, slot.get().state));
                }
                Ok(slot.remove())
            }
        }
    }

    async fn active_ride_count(&self) -> usize {
        self.rides
            .iter()
            .filter(|entry| !entry.value().state.is_terminal())
            .count()
    }
}
