//! Error kinds surfaced by every ride operation.
//!
//! Each variant carries a stable machine-readable [`RideError::code`] and an
//! HTTP-style [`RideError::status`] so transports can build a response envelope
//! without inspecting messages.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RideError {
    /// Missing or malformed input, rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A party is already engaged, or the record is not in the state the
    /// operation requires.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid otp")]
    InvalidOtp,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("offer expired: {0}")]
    OfferExpired(String),

    /// A collaborator (geo, payment, notification) is unavailable.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl RideError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RideError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RideError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        RideError::Conflict(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            RideError::Validation(_) => "validation_error",
            RideError::NotFound { .. } => "not_found",
            RideError::Conflict(_) => "conflict",
            RideError::InvalidOtp => "invalid_otp",
            RideError::Unauthorized(_) => "unauthorized",
            RideError::OfferExpired(_) => "offer_expired",
            RideError::Upstream(_) => "upstream_failure",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            RideError::Validation(_) => 400,
            RideError::Unauthorized(_) => 403,
            RideError::NotFound { .. } => 404,
            RideError::Conflict(_) => 409,
            RideError::OfferExpired(_) => 410,
            RideError::InvalidOtp => 422,
            RideError::Upstream(_) => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_are_distinct_per_kind() {
        let errors = [
            RideError::validation("x"),
            RideError::not_found("ride", "r1"),
            RideError::conflict("x"),
            RideError::InvalidOtp,
            RideError::Unauthorized("x".into()),
            RideError::OfferExpired("x".into()),
            RideError::Upstream("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(RideError::code).collect();
        let mut statuses: Vec<_> = errors.iter().map(RideError::status).collect();
        codes.sort_unstable();
        codes.dedup();
        statuses.sort_unstable();
        statuses.dedup();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(statuses.len(), errors.len());
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = RideError::not_found("driver", "d-7");
        assert_eq!(err.to_string(), "driver not found: d-7");
    }
}
