use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Caller;
use crate::entities::{
    Coordinates, EndRequest, Offer, Place, Role, RouteEstimate, SharedTrip, Tag, User,
};
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterUserParams {
    pub name: String,
    pub roles: BTreeSet<Role>,
    pub city: Option<String>,
    pub position: Option<Coordinates>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTagParams {
    pub pickup: Place,
    pub dropoff: Place,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitOfferParams {
    pub price: f64,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateParams {
    pub rated_user_id: Uuid,
    pub score: u8,
    pub comment: Option<String>,
}

/// One open ride request as a driver sees it in the feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedEntry {
    pub tag: Tag,
    pub distance_km: f64,
    pub pickup_estimate: RouteEstimate,
    pub trip_estimate: RouteEstimate,
    pub has_offered: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripEnd {
    pub tag: Tag,
    pub penalty_applied: bool,
    pub penalized: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RatingResult {
    pub rated_user_id: Uuid,
    pub rating: f64,
    pub rating_count: u32,
}

/// Trip totals for the caller. Earnings and spending appear only for the roles the caller holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_trips: u32,
    pub completed_as_passenger: i64,
    pub completed_as_driver: i64,
    pub rating: f64,
    pub rating_count: u32,
    pub total_spent: Option<f64>,
    pub total_earned: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub cancelled: usize,
    pub completed: usize,
    pub failed: usize,
}

#[async_trait]
pub trait UserAPI {
    async fn register_user(&self, caller: Caller, params: RegisterUserParams) -> Result<User, Error>;
    async fn find_user(&self, caller: Caller, id: Uuid) -> Result<User, Error>;
    async fn update_location(&self, caller: Caller, position: Coordinates) -> Result<User, Error>;
    async fn block_user(&self, caller: Caller, other_id: Uuid) -> Result<User, Error>;
    async fn unblock_user(&self, caller: Caller, other_id: Uuid) -> Result<User, Error>;
    async fn user_stats(&self, caller: Caller) -> Result<UserStats, Error>;
}

#[async_trait]
pub trait TagAPI {
    async fn create_tag(&self, caller: Caller, params: CreateTagParams) -> Result<Tag, Error>;

    async fn find_tag(&self, caller: Caller, id: Uuid) -> Result<Tag, Error>;

    async fn find_active_tag(&self, caller: Caller, role: Role) -> Result<Option<Tag>, Error>;

    async fn list_history(&self, caller: Caller, role: Role) -> Result<Vec<Tag>, Error>;

    async fn update_destination(&self, caller: Caller, id: Uuid, dropoff: Place)
        -> Result<Tag, Error>;

    async fn cancel_tag(&self, caller: Caller, id: Uuid) -> Result<Tag, Error>;

    async fn start_trip(&self, caller: Caller, id: Uuid) -> Result<Tag, Error>;
}

#[async_trait]
pub trait OfferAPI {
    async fn submit_offer(
        &self,
        caller: Caller,
        tag_id: Uuid,
        params: SubmitOfferParams,
    ) -> Result<Offer, Error>;

    async fn list_offers(&self, caller: Caller, tag_id: Uuid) -> Result<Vec<Offer>, Error>;

    async fn accept_offer(&self, caller: Caller, offer_id: Uuid) -> Result<Tag, Error>;
}

#[async_trait]
pub trait FeedAPI {
    async fn list_open_tags(
        &self,
        caller: Caller,
        position: Option<Coordinates>,
    ) -> Result<Vec<FeedEntry>, Error>;
}

#[async_trait]
pub trait TripAPI {
    async fn request_end(&self, caller: Caller, tag_id: Uuid, role: Role) -> Result<Tag, Error>;

    async fn pending_end_request(
        &self,
        caller: Caller,
        tag_id: Uuid,
    ) -> Result<Option<EndRequest>, Error>;

    async fn respond_end(&self, caller: Caller, tag_id: Uuid, approved: bool)
        -> Result<TripEnd, Error>;

    async fn force_end(&self, caller: Caller, tag_id: Uuid) -> Result<TripEnd, Error>;
}

#[async_trait]
pub trait RatingAPI {
    async fn rate(&self, caller: Caller, tag_id: Uuid, params: RateParams)
        -> Result<RatingResult, Error>;

    async fn has_rated(&self, caller: Caller, tag_id: Uuid) -> Result<bool, Error>;
}

#[async_trait]
pub trait EmergencyAPI {
    async fn trigger_emergency(&self, caller: Caller, tag_id: Uuid) -> Result<Tag, Error>;

    /// Reads a trip through its share link; the token is the only credential.
    async fn find_shared_trip(&self, share_token: &str) -> Result<SharedTrip, Error>;
}

#[async_trait]
pub trait SweepAPI {
    async fn sweep_stale_tags(&self) -> Result<SweepReport, Error>;
}

pub trait API:
    UserAPI + TagAPI + OfferAPI + FeedAPI + TripAPI + RatingAPI + EmergencyAPI + SweepAPI
{
}

pub type DynAPI = Arc<dyn API + Send + Sync>;
