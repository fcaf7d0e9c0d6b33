pub mod clock;
pub mod commands;
pub mod config;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod geo;
pub mod ledger;
pub mod matching;
pub mod notify;
pub mod otp;
pub mod pricing;
pub mod service;
pub mod spatial;
pub mod store;
pub mod telemetry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
