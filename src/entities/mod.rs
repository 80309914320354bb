mod emergency;
mod location;
mod offer;
mod rating;
mod route;
mod tag;
mod user;

pub use emergency::{EmergencyAlert, SharedTrip};
pub use location::{Coordinates, Place};
pub use offer::{sort_by_price, Offer, OfferStatus};
pub use rating::Rating;
pub use route::{EstimateSource, RouteEstimate};
pub use tag::{EndReason, EndRequest, Settlement, Tag, TagStatus};
pub use user::{Role, User, DEFAULT_RATING};
