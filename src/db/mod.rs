mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{EmergencyAlert, Offer, Rating, Settlement, Tag, TagStatus, User};
use crate::error::Error;

/// Edits a locked record in place. `Ok(false)` means nothing changed and nothing is written.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> Result<bool, Error> + Send>;

/// Inspects a driver's earlier offers on the same ride request before a new one is stored.
pub type OfferGuard = Box<dyn FnOnce(&[Offer]) -> Result<(), Error> + Send>;

pub type MatchMutation = Box<dyn FnOnce(&mut Tag, &Offer) -> Result<bool, Error> + Send>;

pub type SettleMutation = Box<dyn FnOnce(&mut Tag) -> Result<Option<Settlement>, Error> + Send>;

/// Filter for listing ride requests. Results are newest-activity first.
#[derive(Clone, Debug, Default)]
pub struct TagQuery {
    pub statuses: Vec<TagStatus>,
    pub passenger_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub updated_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl TagQuery {
    pub fn with_statuses(statuses: &[TagStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn matches(&self, tag: &Tag) -> bool {
        self.statuses.contains(&tag.status)
            && self.passenger_id.map_or(true, |id| tag.passenger_id == id)
            && self.driver_id.map_or(true, |id| tag.driver_id == Some(id))
            && self.updated_before.map_or(true, |before| tag.updated_at < before)
    }
}

/// Aggregate over the ride requests a [`TagQuery`] matches. `limit` is ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TagSummary {
    pub count: i64,
    pub total_price: f64,
}

/// The backing store. Every method that changes a ride request runs as one atomic unit
/// scoped to that request.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn insert_user(&self, user: &User) -> Result<(), Error>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, Error>;

    async fn update_user(&self, id: Uuid, mutation: Mutation<User>) -> Result<User, Error>;

    /// Fails with `Conflict` when the passenger already has a non-terminal request.
    async fn insert_tag(&self, tag: &Tag) -> Result<(), Error>;

    async fn find_tag(&self, id: Uuid) -> Result<Option<Tag>, Error>;

    async fn list_tags(&self, query: TagQuery) -> Result<Vec<Tag>, Error>;

    async fn summarize_tags(&self, query: TagQuery) -> Result<TagSummary, Error>;

    async fn find_tag_by_share_token(&self, token: &str) -> Result<Option<Tag>, Error>;

    /// Pending offers are rejected in the same unit when the request ends up terminal.
    async fn update_tag(&self, id: Uuid, mutation: Mutation<Tag>) -> Result<Tag, Error>;

    async fn submit_offer(
        &self,
        offer: &Offer,
        guard: OfferGuard,
        mutation: Mutation<Tag>,
    ) -> Result<Tag, Error>;

    async fn find_offer(&self, id: Uuid) -> Result<Option<Offer>, Error>;

    async fn list_offers(&self, tag_id: Uuid) -> Result<Vec<Offer>, Error>;

    /// Accepts one pending offer and rejects its siblings. Fails with `NotFound` when the
    /// offer is no longer pending or another acceptance already matched the request.
    async fn accept_offer(
        &self,
        offer_id: Uuid,
        now: DateTime<Utc>,
        mutation: MatchMutation,
    ) -> Result<(Tag, Offer), Error>;

    /// Ends an active trip and applies the resulting settlement to both participants.
    async fn settle_tag(
        &self,
        id: Uuid,
        mutation: SettleMutation,
    ) -> Result<(Tag, Option<Settlement>), Error>;

    /// Fails with `Conflict` when the rater already rated this request.
    async fn record_rating(&self, rating: &Rating, mutation: Mutation<User>)
        -> Result<User, Error>;

    async fn has_rated(&self, tag_id: Uuid, rater_id: Uuid) -> Result<bool, Error>;

    /// Stores the alert and applies `mutation` to its ride request as one unit.
    async fn record_emergency(
        &self,
        alert: &EmergencyAlert,
        mutation: Mutation<Tag>,
    ) -> Result<Tag, Error>;

    async fn list_emergency_alerts(&self, tag_id: Uuid) -> Result<Vec<EmergencyAlert>, Error>;
}
