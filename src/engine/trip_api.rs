use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{TripAPI, TripEnd},
    auth::Caller,
    db::Store,
    entities::{EndRequest, Role, Settlement, Tag},
    error::Error,
};

fn trip_end(tag: Tag, settlement: Option<Settlement>) -> TripEnd {
    let penalized = settlement.and_then(|s| s.penalized);

    TripEnd {
        tag,
        penalty_applied: penalized.is_some(),
        penalized,
    }
}

#[async_trait]
impl<S: Store> TripAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn request_end(&self, caller: Caller, tag_id: Uuid, role: Role) -> Result<Tag, Error> {
        let tag = self.fetch_tag(tag_id).await?;
        self.authorize(caller, "end", tag)?;

        let now = self.now();

        let tag = self
            .store
            .update_tag(
                tag_id,
                Box::new(move |tag: &mut Tag| tag.request_end(caller.id, role, now)),
            )
            .await?;

        tracing::info!(tag_id = %tag.id, role = %role.name(), "end of trip requested");

        Ok(tag)
    }

    #[tracing::instrument(skip(self))]
    async fn pending_end_request(
        &self,
        caller: Caller,
        tag_id: Uuid,
    ) -> Result<Option<EndRequest>, Error> {
        let tag = self.fetch_tag(tag_id).await?;
        self.authorize(caller, "read", tag.clone())?;

        Ok(tag.end_request_for(caller.id).cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn respond_end(
        &self,
        caller: Caller,
        tag_id: Uuid,
        approved: bool,
    ) -> Result<TripEnd, Error> {
        let tag = self.fetch_tag(tag_id).await?;
        self.authorize(caller, "end", tag)?;

        let now = self.now();
        let (penalty, floor) = (self.config.end_penalty, self.config.min_rating);

        let (tag, settlement) = self
            .store
            .settle_tag(
                tag_id,
                Box::new(move |tag: &mut Tag| {
                    tag.resolve_end_request(caller.id, approved, penalty, floor, now)
                        .map(Some)
                }),
            )
            .await?;

        tracing::info!(tag_id = %tag.id, approved, "end request answered, trip completed");

        Ok(trip_end(tag, settlement))
    }

    #[tracing::instrument(skip(self))]
    async fn force_end(&self, caller: Caller, tag_id: Uuid) -> Result<TripEnd, Error> {
        let tag = self.fetch_tag(tag_id).await?;
        self.authorize(caller, "end", tag)?;

        let now = self.now();
        let (penalty, floor) = (self.config.end_penalty, self.config.min_rating);

        let (tag, settlement) = self
            .store
            .settle_tag(
                tag_id,
                Box::new(move |tag: &mut Tag| tag.force_end(caller.id, penalty, floor, now)),
            )
            .await?;

        match &settlement {
            Some(_) => tracing::info!(tag_id = %tag.id, "trip force-ended"),
            None => tracing::info!(tag_id = %tag.id, "trip already completed, nothing to do"),
        }

        Ok(trip_end(tag, settlement))
    }
}
