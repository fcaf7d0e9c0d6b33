use h3o::Resolution;

use crate::pricing::PricingConfig;

/// Discovery radius around the pickup point (meters).
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 5_000.0;
/// Largest radius a candidate search accepts; the grid disk grows with its square.
pub const MAX_SEARCH_RADIUS_M: f64 = 50_000.0;
pub const DEFAULT_OFFER_TTL_SECS: u64 = 30;

/// Tunables for a [`RideService`](crate::service::RideService).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub pricing: PricingConfig,
    pub search_radius_m: f64,
    /// Bucket size of the geo index. Resolution 8 cells are roughly 0.5 km
    /// across.
    pub h3_resolution: Resolution,
    pub offer_ttl_secs: u64,
    /// Fixed seed for reproducible OTPs; entropy when `None`.
    pub otp_seed: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
            h3_resolution: Resolution::Eight,
            offer_ttl_secs: DEFAULT_OFFER_TTL_SECS,
            otp_seed: None,
        }
    }
}

impl ServiceConfig {
    pub fn with_pricing(mut self, pricing: PricingConfig) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_search_radius_m(mut self, radius_m: f64) -> Self {
        self.search_radius_m = radius_m;
        self
    }

    pub fn with_offer_ttl_secs(mut self, secs: u64) -> Self {
        self.offer_ttl_secs = secs;
        self
    }

    pub fn with_otp_seed(mut self, seed: u64) -> Self {
        self.otp_seed = Some(seed);
        self
    }
}
