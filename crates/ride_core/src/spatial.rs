//! Spatial operations: H3-bucketed driver positions and radius queries.
//!
//! This module provides:
//!
//! - **SpatialIndex**: H3 cell → driver mappings, updated on every heartbeat
//! - **Grid disk queries**: cells covering a metric radius, LRU-cached per origin
//! - **GeoIndex**: the candidate search. Cells narrow the scan, haversine decides
//!   membership and ordering, and availability is read from the store.
//!
//! Default resolution is 8 (~460m average edge), which keeps a 5 km search below
//! a few hundred cells.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::MAX_SEARCH_RADIUS_M;
use crate::entities::{Driver, DriverId};
use crate::error::RideError;
use crate::geo::GeoPoint;
use crate::store::RideStore;

const GRID_DISK_CACHE_SIZE: usize = 1_000;

/// Driver positions bucketed by H3 cell.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    drivers_by_cell: HashMap<CellIndex, Vec<DriverId>>,
    /// Reverse mapping: driver → current cell and exact point.
    driver_positions: HashMap<DriverId, (CellIndex, GeoPoint)>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or move a driver. Later calls overwrite earlier ones.
    pub fn upsert_driver(&mut self, driver_id: &DriverId, cell: CellIndex, point: GeoPoint) {
        if let Some((old_cell, _)) = self.driver_positions.get(driver_id).copied() {
            if old_cell != cell {
                self.remove_from_cell(driver_id, old_cell);
                self.drivers_by_cell
                    .entry(cell)
                    .or_default()
                    .push(driver_id.clone());
            }
        } else {
            self.drivers_by_cell
                .entry(cell)
                .or_default()
                .push(driver_id.clone());
        }
        self.driver_positions.insert(driver_id.clone(), (cell, point));
    }

    pub fn remove_driver(&mut self, driver_id: &DriverId) {
        if let Some((cell, _)) = self.driver_positions.remove(driver_id) {
            self.remove_from_cell(driver_id, cell);
        }
    }

    fn remove_from_cell(&mut self, driver_id: &DriverId, cell: CellIndex) {
        if let Some(drivers) = self.drivers_by_cell.get_mut(&cell) {
            drivers.retain(|d| d != driver_id);
            if drivers.is_empty() {
                self.drivers_by_cell.remove(&cell);
            }
        }
    }

    /// Drivers in the given cells together with their exact points.
    pub fn drivers_in_cells(&self, cells: &[CellIndex]) -> Vec<(DriverId, GeoPoint)> {
        let mut result = Vec::new();
        for cell in cells {
            if let Some(drivers) = self.drivers_by_cell.get(cell) {
                for driver_id in drivers {
                    if let Some((_, point)) = self.driver_positions.get(driver_id) {
                        result.push((driver_id.clone(), *point));
                    }
                }
            }
        }
        result
    }

    pub fn position(&self, driver_id: &DriverId) -> Option<GeoPoint> {
        self.driver_positions.get(driver_id).map(|(_, point)| *point)
    }

    pub fn cell(&self, driver_id: &DriverId) -> Option<CellIndex> {
        self.driver_positions.get(driver_id).map(|(cell, _)| *cell)
    }

    pub fn len(&self) -> usize {
        self.driver_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.driver_positions.is_empty()
    }
}

/// A driver inside the search radius, closest first.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyDriver {
    pub driver: Driver,
    pub position: GeoPoint,
    pub distance_m: f64,
}

pub struct GeoIndex {
    resolution: Resolution,
    store: Arc<dyn RideStore>,
    index: RwLock<SpatialIndex>,
    disk_cache: Mutex<LruCache<(CellIndex, u32), Vec<CellIndex>>>,
}

impl GeoIndex {
    pub fn new(resolution: Resolution, store: Arc<dyn RideStore>) -> Self {
        let capacity = NonZeroUsize::new(GRID_DISK_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            resolution,
            store,
            index: RwLock::new(SpatialIndex::new()),
            disk_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn cell_for(&self, point: GeoPoint) -> Result<CellIndex, RideError> {
        let latlng = LatLng::new(point.lat, point.lng)
            .map_err(|err| RideError::validation(format!("invalid coordinates: {err}")))?;
        Ok(latlng.to_cell(self.resolution))
    }

    /// Grid distance `k` whose disk covers every point within `radius_m`.
    ///
    /// Uses the average edge length as the center spacing, which under-estimates
    /// the true spacing (about √3 edges), so the disk over-covers.
    pub fn disk_radius_for(&self, radius_m: f64) -> u32 {
        let edge_m = self.resolution.edge_length_m();
        if radius_m <= 0.0 || edge_m <= 0.0 {
            return 0;
        }
        (radius_m / edge_m).ceil() as u32 + 1
    }

    fn grid_disk(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        let mut cache = self.disk_cache.lock();
        cache
            .get_or_insert((origin, k), || origin.grid_disk::<Vec<_>>(k))
            .clone()
    }

    /// Record a location heartbeat. Unknown drivers are ignored (returns `false`).
    pub async fn update_location(
        &self,
        driver_id: &DriverId,
        point: GeoPoint,
    ) -> Result<bool, RideError> {
        point.validate("location")?;
        let cell = self.cell_for(point)?;
        match self.store.set_driver_location(driver_id, point).await {
            Ok(()) => {}
            Err(RideError::NotFound { .. }) => {
                warn!(%driver_id, "location update for unknown driver ignored");
                return Ok(false);
            }
            Err(err) => return Err(err),
        }
        self.index.write().upsert_driver(driver_id, cell, point);
        Ok(true)
    }

    pub fn position_of(&self, driver_id: &DriverId) -> Option<GeoPoint> {
        self.index.read().position(driver_id)
    }

    pub fn forget(&self, driver_id: &DriverId) {
        self.index.write().remove_driver(driver_id);
    }

    pub fn tracked_drivers(&self) -> usize {
        self.index.read().len()
    }

    /// Active, unoccupied drivers within `radius_m` of `origin`, nearest first
    /// (ties broken by driver id).
    pub async fn find_candidates(
        &self,
        origin: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<NearbyDriver>, RideError> {
        origin.validate("origin")?;
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(RideError::validation("radius must be a non-negative number"));
        }
        if radius_m > MAX_SEARCH_RADIUS_M {
            return Err(RideError::validation(format!(
                "radius {radius_m} m exceeds the {MAX_SEARCH_RADIUS_M} m limit"
            )));
        }
        let origin_cell = self.cell_for(origin)?;
        let cells = self.grid_disk(origin_cell, self.disk_radius_for(radius_m));

        let mut within: Vec<(DriverId, GeoPoint, f64)> = self
            .index
            .read()
            .drivers_in_cells(&cells)
            .into_iter()
            .filter_map(|(driver_id, point)| {
                let distance_m = origin.distance_m(&point);
                (distance_m <= radius_m).then_some((driver_id, point, distance_m))
            })
            .collect();
        within.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(&b.0)));

        let mut nearby = Vec::with_capacity(within.len());
        for (driver_id, position, distance_m) in within {
            let driver = match self.store.driver(&driver_id).await {
                Ok(driver) => driver,
                Err(RideError::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            };
            if driver.is_available() {
                nearby.push(NearbyDriver {
                    driver,
                    position,
                    distance_m,
                });
            }
        }
        debug!(
            cells = cells.len(),
            candidates = nearby.len(),
            radius_m,
            "candidate search finished"
        );
        Ok(nearby)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::test_helpers::point_north_of;

    fn origin() -> GeoPoint {
        GeoPoint::new(52.52, 13.405)
    }

    async fn index_with(drivers: &[(&str, GeoPoint)]) -> (Arc<InMemoryStore>, GeoIndex) {
        let store = Arc::new(InMemoryStore::new());
        let geo = GeoIndex::new(Resolution::Eight, store.clone());
        for (id, point) in drivers {
            let id = DriverId::new(*id);
            store.register_driver(&id, *point).await.expect("register");
            assert!(geo.update_location(&id, *point).await.expect("update"));
        }
        (store, geo)
    }

    #[test]
    fn spatial_index_moves_driver_between_cells() {
        let geo_store: Arc<dyn RideStore> = Arc::new(InMemoryStore::new());
        let geo = GeoIndex::new(Resolution::Eight, geo_store);
        let a = origin();
        let b = point_north_of(a, 3_000.0);
        let cell_a = geo.cell_for(a).expect("cell");
        let cell_b = geo.cell_for(b).expect("cell");
        assert_ne!(cell_a, cell_b);

        let mut index = SpatialIndex::new();
        let id = DriverId::new("d1");
        index.upsert_driver(&id, cell_a, a);
        index.upsert_driver(&id, cell_b, b);

        assert!(index.drivers_in_cells(&[cell_a]).is_empty());
        assert_eq!(index.drivers_in_cells(&[cell_b]), vec![(id.clone(), b)]);
        assert_eq!(index.len(), 1);

        index.remove_driver(&id);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn radius_includes_4km_and_excludes_6km() {
        let near = point_north_of(origin(), 4_000.0);
        let far = point_north_of(origin(), 6_000.0);
        let (_store, geo) = index_with(&[("near", near), ("far", far)]).await;

        let found = geo.find_candidates(origin(), 5_000.0).await.expect("search");
        let ids: Vec<_> = found.iter().map(|n| n.driver.id.as_str()).collect();
        assert_eq!(ids, vec!["near"]);
        assert!((found[0].distance_m - 4_000.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn oversized_radius_is_rejected() {
        let (_store, geo) = index_with(&[("near", point_north_of(origin(), 4_000.0))]).await;
        let err = geo
            .find_candidates(origin(), MAX_SEARCH_RADIUS_M + 1.0)
            .await
            .expect_err("radius above the limit");
        assert!(matches!(err, RideError::Validation(_)));
        assert_eq!(
            geo.find_candidates(origin(), MAX_SEARCH_RADIUS_M)
                .await
                .expect("search at the limit")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn candidates_are_sorted_nearest_first_and_filter_availability() {
        let (store, geo) = index_with(&[
            ("c", point_north_of(origin(), 2_000.0)),
            ("a", point_north_of(origin(), 500.0)),
            ("busy", point_north_of(origin(), 100.0)),
            ("offline", point_north_of(origin(), 200.0)),
        ])
        .await;
        store
            .claim_driver(&DriverId::new("busy"), crate::entities::RideId::generate())
            .await
            .expect("claim");
        store
            .set_driver_active(&DriverId::new("offline"), false)
            .await
            .expect("deactivate");

        let found = geo.find_candidates(origin(), 5_000.0).await.expect("search");
        let ids: Vec<_> = found.iter().map(|n| n.driver.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn unknown_driver_update_is_a_no_op() {
        let (_store, geo) = index_with(&[]).await;
        let updated = geo
            .update_location(&DriverId::new("ghost"), origin())
            .await
            .expect("not fatal");
        assert!(!updated);
        assert_eq!(geo.tracked_drivers(), 0);
    }

    #[tokio::test]
    async fn last_update_wins() {
        let start = point_north_of(origin(), 10_000.0);
        let (_store, geo) = index_with(&[("d1", start)]).await;
        let id = DriverId::new("d1");
        assert!(geo.find_candidates(origin(), 5_000.0).await.expect("search").is_empty());

        let moved = point_north_of(origin(), 1_000.0);
        geo.update_location(&id, moved).await.expect("update");
        assert_eq!(geo.position_of(&id), Some(moved));
        assert_eq!(geo.find_candidates(origin(), 5_000.0).await.expect("search").len(), 1);
    }

    #[test]
    fn disk_radius_over_covers_search_radius() {
        let store: Arc<dyn RideStore> = Arc::new(InMemoryStore::new());
        let geo = GeoIndex::new(Resolution::Eight, store);
        let k = geo.disk_radius_for(5_000.0);
        let spacing_m = Resolution::Eight.edge_length_m() * 3f64.sqrt();
        assert!(f64::from(k) * spacing_m > 5_000.0);
        assert_eq!(geo.disk_radius_for(0.0), 0);
    }
}
