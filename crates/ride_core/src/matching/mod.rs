pub mod coordinator;
pub mod offers;
pub mod types;

pub use coordinator::MatchingCoordinator;
pub use offers::{Offer, OfferBook};
pub use types::{rank_candidates, Candidate, RideRequest};
