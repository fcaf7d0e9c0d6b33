//! Request/response surface: a tagged command schema validated at the boundary,
//! and the envelope every reply is wrapped in.

use serde::{Deserialize, Serialize};

use crate::entities::{DriverId, OfferId, RideId, RiderId};
use crate::error::RideError;
use crate::gateway::{CandidateView, OfferView, RideView};
use crate::geo::GeoPoint;
use crate::matching::RideRequest;
use crate::otp::is_well_formed;

fn require_id(value: &str, field: &str) -> Result<(), RideError> {
    if value.trim().is_empty() {
        return Err(RideError::validation(format!("{field} is required")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectDriverRequest {
    pub rider_id: RiderId,
    pub driver_id: DriverId,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
}

impl SelectDriverRequest {
    pub fn ride_request(&self) -> RideRequest {
        RideRequest {
            rider_id: self.rider_id.clone(),
            pickup: self.pickup,
            drop: self.drop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub driver_id: DriverId,
    pub offer_id: OfferId,
    pub accept: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    pub ride_id: RideId,
    pub otp: String,
}

/// Cancel a ride before pickup, or withdraw a pending offer. Exactly one of
/// `ride_id` and `offer_id` must be set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub rider_id: RiderId,
    #[serde(default)]
    pub ride_id: Option<RideId>,
    #[serde(default)]
    pub offer_id: Option<OfferId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRideRequest {
    pub ride_id: RideId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    FindCandidates(RideRequest),
    SelectDriver(SelectDriverRequest),
    RespondToOffer(RespondRequest),
    VerifyPickup(OtpRequest),
    VerifyDrop(OtpRequest),
    CancelRide(CancelRequest),
    GetRide(GetRideRequest),
}

impl Command {
    /// Reject missing or malformed fields before any state is touched.
    pub fn validate(&self) -> Result<(), RideError> {
        match self {
            Command::FindCandidates(request) => request.validate(),
            Command::SelectDriver(request) => {
                require_id(request.driver_id.as_str(), "driverId")?;
                request.ride_request().validate()
            }
            Command::RespondToOffer(request) => require_id(request.driver_id.as_str(), "driverId"),
            Command::VerifyPickup(request) | Command::VerifyDrop(request) => {
                if !is_well_formed(&request.otp) {
                    return Err(RideError::validation("otp must be a 4-digit code"));
                }
                Ok(())
            }
            Command::CancelRide(request) => {
                require_id(request.rider_id.as_str(), "riderId")?;
                match (request.ride_id, request.offer_id) {
                    (Some(_), None) | (None, Some(_)) => Ok(()),
                    (None, None) => Err(RideError::validation("rideId or offerId is required")),
                    (Some(_), Some(_)) => Err(RideError::validation(
                        "rideId and offerId are mutually exclusive",
                    )),
                }
            }
            Command::GetRide(_) => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::FindCandidates(_) => "findCandidates",
            Command::SelectDriver(_) => "selectDriver",
            Command::RespondToOffer(_) => "respondToOffer",
            Command::VerifyPickup(_) => "verifyPickup",
            Command::VerifyDrop(_) => "verifyDrop",
            Command::CancelRide(_) => "cancelRide",
            Command::GetRide(_) => "getRide",
        }
    }
}

/// Successful outcome of a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Candidates(Vec<CandidateView>),
    Offer(OfferView),
    Ride(RideView),
}

impl Reply {
    pub fn message(&self) -> &'static str {
        match self {
            Reply::Candidates(candidates) if candidates.is_empty() => "no drivers nearby",
            Reply::Candidates(_) => "candidates found",
            Reply::Offer(_) => "offer updated",
            Reply::Ride(_) => "ride updated",
        }
    }
}

/// Uniform response: success flag, HTTP-like status, machine-checkable code and
/// a human message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub status: u16,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            status: 200,
            code: "ok".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn from_error(err: &RideError) -> Self {
        Self {
            success: false,
            status: err.status(),
            code: err.code().to_string(),
            message: err.to_string(),
            data: None,
        }
    }
}

impl Envelope<Reply> {
    pub fn from_result(result: Result<Reply, RideError>) -> Self {
        match result {
            Ok(reply) => {
                let message = reply.message();
                Self::ok(reply, message)
            }
            Err(err) => Self::from_error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_are_tagged_by_action() {
        let command: Command = serde_json::from_value(json!({
            "action": "respondToOffer",
            "driverId": "d1",
            "offerId": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "accept": true
        }))
        .expect("parse");
        assert_eq!(command.name(), "respondToOffer");
        assert!(command.validate().is_ok());
    }

    #[test]
    fn malformed_otp_is_a_validation_error() {
        let command = Command::VerifyPickup(OtpRequest {
            ride_id: RideId::generate(),
            otp: "12a4".into(),
        });
        assert!(matches!(command.validate(), Err(RideError::Validation(_))));
    }

    #[test]
    fn cancel_needs_exactly_one_target() {
        let mut request = CancelRequest {
            rider_id: RiderId::new("r1"),
            ride_id: None,
            offer_id: None,
        };
        assert!(Command::CancelRide(request.clone()).validate().is_err());
        request.ride_id = Some(RideId::generate());
        assert!(Command::CancelRide(request.clone()).validate().is_ok());
        request.offer_id = Some(OfferId::generate());
        assert!(Command::CancelRide(request).validate().is_err());
    }

    #[test]
    fn error_envelope_carries_status_and_code() {
        let envelope = Envelope::<Reply>::from_result(Err(RideError::InvalidOtp));
        assert!(!envelope.success);
        assert_eq!(envelope.status, 422);
        assert_eq!(envelope.code, "invalid_otp");
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn empty_candidate_list_is_still_success() {
        let envelope = Envelope::from_result(Ok(Reply::Candidates(Vec::new())));
        assert!(envelope.success);
        assert_eq!(envelope.message, "no drivers nearby");
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value["data"], json!([]));
    }
}
