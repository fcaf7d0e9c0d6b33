//! Fare calculation for a candidate driver.
//!
//! Formula: `total = base_fare + (to_pickup_km + pickup_to_drop_km) * per_km_rate`,
//! split into an admin share of `admin_pct` percent and the driver remainder.
//! Values keep full precision; [`FareQuote::summary`] rounds to two decimals for
//! presentation.

use serde::{Deserialize, Serialize};

use crate::geo::{haversine_km, GeoPoint};

/// Average speed for pickup ETA estimation (km/h).
pub const AVG_SPEED_KMH: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub base_fare: f64,
    pub per_km_rate: f64,
    /// Admin commission in percent of the total price.
    pub admin_pct: f64,
    pub average_speed_kmh: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fare: 20.0,
            per_km_rate: 15.0,
            admin_pct: 40.0,
            average_speed_kmh: AVG_SPEED_KMH,
        }
    }
}

impl PricingConfig {
    pub fn quote(&self, driver_pos: GeoPoint, pickup: GeoPoint, drop: GeoPoint) -> FareQuote {
        price_with_speed(
            driver_pos,
            pickup,
            drop,
            self.base_fare,
            self.per_km_rate,
            self.admin_pct,
            self.average_speed_kmh,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareQuote {
    pub distance_to_pickup_km: f64,
    pub distance_pickup_to_drop_km: f64,
    pub total_price: f64,
    pub admin_profit: f64,
    pub driver_profit: f64,
    pub eta_minutes: f64,
}

impl FareQuote {
    pub fn total_distance_km(&self) -> f64 {
        self.distance_to_pickup_km + self.distance_pickup_to_drop_km
    }

    pub fn summary(&self) -> FareSummary {
        FareSummary {
            distance_to_pickup_km: round2(self.distance_to_pickup_km),
            distance_pickup_to_drop_km: round2(self.distance_pickup_to_drop_km),
            total_distance_km: round2(self.total_distance_km()),
            total_price: round2(self.total_price),
            admin_profit: round2(self.admin_profit),
            driver_profit: round2(self.driver_profit),
            eta_minutes: round2(self.eta_minutes),
        }
    }
}

/// Presentation form of a [`FareQuote`], rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FareSummary {
    pub distance_to_pickup_km: f64,
    pub distance_pickup_to_drop_km: f64,
    pub total_distance_km: f64,
    pub total_price: f64,
    pub admin_profit: f64,
    pub driver_profit: f64,
    pub eta_minutes: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Price a trip for a driver at `driver_pos`, using [`AVG_SPEED_KMH`] for the ETA.
pub fn price(
    driver_pos: GeoPoint,
    pickup: GeoPoint,
    drop: GeoPoint,
    base_fare: f64,
    per_km_rate: f64,
    admin_pct: f64,
) -> FareQuote {
    price_with_speed(
        driver_pos,
        pickup,
        drop,
        base_fare,
        per_km_rate,
        admin_pct,
        AVG_SPEED_KMH,
    )
}

pub fn price_with_speed(
    driver_pos: GeoPoint,
    pickup: GeoPoint,
    drop: GeoPoint,
    base_fare: f64,
    per_km_rate: f64,
    admin_pct: f64,
    average_speed_kmh: f64,
) -> FareQuote {
    let distance_to_pickup_km = haversine_km(driver_pos, pickup);
    let distance_pickup_to_drop_km = haversine_km(pickup, drop);
    let total_price = base_fare + (distance_to_pickup_km + distance_pickup_to_drop_km) * per_km_rate;
    let admin_profit = total_price * admin_pct / 100.0;
    let driver_profit = total_price - admin_profit;
    let eta_minutes = if average_speed_kmh > 0.0 {
        distance_to_pickup_km / average_speed_kmh * 60.0
    } else {
        0.0
    };
    FareQuote {
        distance_to_pickup_km,
        distance_pickup_to_drop_km,
        total_price,
        admin_profit,
        driver_profit,
        eta_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equator_scenario_matches_formula() {
        let quote = price(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.0, 0.02),
            20.0,
            15.0,
            40.0,
        );
        assert!((quote.distance_to_pickup_km - 1.11).abs() < 0.01);
        assert!((quote.distance_pickup_to_drop_km - 1.11).abs() < 0.01);
        assert!((quote.total_price - 53.3).abs() < 0.1, "{}", quote.total_price);
        assert!((quote.admin_profit - 21.32).abs() < 0.05);
        assert!((quote.driver_profit - 31.98).abs() < 0.05);
        assert!((quote.admin_profit + quote.driver_profit - quote.total_price).abs() < 1e-9);
    }

    #[test]
    fn identical_inputs_give_bit_identical_quotes() {
        let args = (
            GeoPoint::new(52.52, 13.405),
            GeoPoint::new(52.51, 13.39),
            GeoPoint::new(52.48, 13.44),
        );
        let a = price(args.0, args.1, args.2, 20.0, 15.0, 40.0);
        let b = price(args.0, args.1, args.2, 20.0, 15.0, 40.0);
        assert_eq!(a.total_price.to_bits(), b.total_price.to_bits());
        assert_eq!(a.admin_profit.to_bits(), b.admin_profit.to_bits());
        assert_eq!(a.eta_minutes.to_bits(), b.eta_minutes.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn eta_uses_pickup_leg_only() {
        let quote = PricingConfig::default().quote(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
        );
        assert_eq!(quote.eta_minutes, 0.0);
        assert_eq!(quote.distance_to_pickup_km, 0.0);
    }

    #[test]
    fn summary_rounds_only_at_presentation() {
        let quote = price(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.0, 0.02),
            20.0,
            15.0,
            40.0,
        );
        let summary = quote.summary();
        assert_eq!(summary.total_price, round2(quote.total_price));
        assert_ne!(summary.total_price, quote.total_price);
    }
}
