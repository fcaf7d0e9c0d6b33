use std::net::SocketAddr;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use ride_core::config::{ServiceConfig, MAX_SEARCH_RADIUS_M};
use ride_core::pricing::PricingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "ride_server",
    about = "Ride matching and lifecycle service",
    long_about = "Matches riders to nearby drivers, runs OTP-gated rides and pushes\n\
                  live updates to riders, drivers and the admin console."
)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "RIDE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Flat fare added to every ride
    #[arg(long, env = "RIDE_BASE_FARE", default_value_t = 20.0)]
    pub base_fare: f64,

    /// Price per kilometer, driver-to-pickup plus pickup-to-drop
    #[arg(long, env = "RIDE_PER_KM_RATE", default_value_t = 15.0)]
    pub per_km_rate: f64,

    /// Admin commission in percent of the total price
    #[arg(long, env = "RIDE_ADMIN_PCT", default_value_t = 40.0)]
    pub admin_pct: f64,

    /// Average speed used for pickup ETAs (km/h)
    #[arg(long, env = "RIDE_AVERAGE_SPEED_KMH", default_value_t = 40.0)]
    pub average_speed_kmh: f64,

    /// Driver discovery radius around the pickup point (meters)
    #[arg(long, env = "RIDE_SEARCH_RADIUS_M", default_value_t = 5_000.0)]
    pub search_radius_m: f64,

    /// How long a driver has to answer an offer
    #[arg(long, env = "RIDE_OFFER_TTL_SECS", default_value_t = 30)]
    pub offer_ttl_secs: u64,

    /// How often stale offers are swept
    #[arg(long, env = "RIDE_EXPIRY_SWEEP_SECS", default_value_t = 5)]
    pub expiry_sweep_secs: u64,

    /// Webhook receiving push notifications for offline drivers
    #[arg(long, env = "RIDE_PUSH_WEBHOOK_URL")]
    pub push_webhook_url: Option<String>,

    /// Timeout for a single push request (milliseconds)
    #[arg(long, env = "RIDE_PUSH_TIMEOUT_MS", default_value_t = 3_000)]
    pub push_timeout_ms: u64,

    /// Seed for reproducible OTPs; leave unset in production
    #[arg(long, env = "RIDE_OTP_SEED", hide = true)]
    pub otp_seed: Option<u64>,

    #[arg(long, env = "RIDE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Log filter directives, e.g. `info,ride_core=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.admin_pct) {
            bail!("admin pct must be within 0..=100, got {}", self.admin_pct);
        }
        if self.base_fare < 0.0 || self.per_km_rate < 0.0 {
            bail!("fares must not be negative");
        }
        if self.average_speed_kmh <= 0.0 {
            bail!("average speed must be positive");
        }
        if !self.search_radius_m.is_finite() || self.search_radius_m <= 0.0 {
            bail!("search radius must be positive");
        }
        if self.search_radius_m > MAX_SEARCH_RADIUS_M {
            bail!(
                "search radius must be at most {MAX_SEARCH_RADIUS_M} m, got {}",
                self.search_radius_m
            );
        }
        if self.offer_ttl_secs == 0 || self.expiry_sweep_secs == 0 {
            bail!("offer ttl and sweep period must be at least one second");
        }
        Ok(())
    }

    pub fn service_config(&self) -> ServiceConfig {
        let config = ServiceConfig::default()
            .with_pricing(PricingConfig {
                base_fare: self.base_fare,
                per_km_rate: self.per_km_rate,
                admin_pct: self.admin_pct,
                average_speed_kmh: self.average_speed_kmh,
            })
            .with_search_radius_m(self.search_radius_m)
            .with_offer_ttl_secs(self.offer_ttl_secs);
        match self.otp_seed {
            Some(seed) => config.with_otp_seed(seed),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerConfig {
        let mut argv = vec!["ride_server"];
        argv.extend_from_slice(args);
        ServerConfig::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn defaults_match_service_defaults() {
        let config = parse(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.service_config(), ServiceConfig::default());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn flags_flow_into_service_config() {
        let config = parse(&[
            "--base-fare",
            "10",
            "--admin-pct",
            "25",
            "--search-radius-m",
            "2500",
            "--offer-ttl-secs",
            "60",
            "--log-format",
            "json",
        ]);
        let service = config.service_config();
        assert_eq!(service.pricing.base_fare, 10.0);
        assert_eq!(service.pricing.admin_pct, 25.0);
        assert_eq!(service.search_radius_m, 2_500.0);
        assert_eq!(service.offer_ttl_secs, 60);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn out_of_range_commission_is_rejected() {
        let config = parse(&["--admin-pct", "140"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn search_radius_is_capped() {
        assert!(parse(&["--search-radius-m", "50000"]).validate().is_ok());
        assert!(parse(&["--search-radius-m", "60000"]).validate().is_err());
    }
}
