use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{CreateTagParams, TagAPI},
    auth::Caller,
    db::{Store, TagQuery},
    entities::{Place, Role, Tag, TagStatus},
    error::Error,
    geo,
};

const HISTORY_LIMIT: i64 = 50;

#[async_trait]
impl<S: Store> TagAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn create_tag(&self, caller: Caller, params: CreateTagParams) -> Result<Tag, Error> {
        let passenger = self.fetch_user(caller.id).await?;
        passenger.require_role(Role::Passenger)?;

        params.pickup.validate()?;
        params.dropoff.validate()?;

        let city = geo::nearest_city(params.pickup.coordinates, self.config.city_radius_km);
        let notes = params.notes.filter(|notes| !notes.trim().is_empty());

        let tag = Tag::new(
            &passenger,
            params.pickup,
            params.dropoff,
            notes,
            city,
            self.now(),
        );

        self.store.insert_tag(&tag).await?;

        tracing::info!(tag_id = %tag.id, city = %tag.city, "ride request created");

        Ok(tag)
    }

    #[tracing::instrument(skip(self))]
    async fn find_tag(&self, caller: Caller, id: Uuid) -> Result<Tag, Error> {
        let tag = self.fetch_tag(id).await?;

        self.authorize(caller, "read", tag.clone())?;

        Ok(tag)
    }

    #[tracing::instrument(skip(self))]
    async fn find_active_tag(&self, caller: Caller, role: Role) -> Result<Option<Tag>, Error> {
        let mut query = TagQuery::with_statuses(&TagStatus::NON_TERMINAL);
        query.limit = Some(1);

        match role {
            Role::Passenger => query.passenger_id = Some(caller.id),
            Role::Driver => query.driver_id = Some(caller.id),
        }

        Ok(self.store.list_tags(query).await?.into_iter().next())
    }

    #[tracing::instrument(skip(self))]
    async fn list_history(&self, caller: Caller, role: Role) -> Result<Vec<Tag>, Error> {
        let mut query = TagQuery::with_statuses(&[TagStatus::Completed]);
        query.limit = Some(HISTORY_LIMIT);

        match role {
            Role::Passenger => query.passenger_id = Some(caller.id),
            Role::Driver => query.driver_id = Some(caller.id),
        }

        self.store.list_tags(query).await
    }

    #[tracing::instrument(skip(self))]
    async fn update_destination(
        &self,
        caller: Caller,
        id: Uuid,
        dropoff: Place,
    ) -> Result<Tag, Error> {
        dropoff.validate()?;

        // ownership never changes, so the check does not need the row lock
        let tag = self.fetch_tag(id).await?;
        self.authorize(caller, "update_destination", tag)?;

        let now = self.now();

        self.store
            .update_tag(
                id,
                Box::new(move |tag: &mut Tag| tag.update_destination(dropoff, now)),
            )
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_tag(&self, caller: Caller, id: Uuid) -> Result<Tag, Error> {
        let tag = self.fetch_tag(id).await?;
        self.authorize(caller, "cancel", tag)?;

        let now = self.now();

        let tag = self
            .store
            .update_tag(id, Box::new(move |tag: &mut Tag| tag.cancel(now)))
            .await?;

        tracing::info!(tag_id = %tag.id, "ride request cancelled");

        Ok(tag)
    }

    #[tracing::instrument(skip(self))]
    async fn start_trip(&self, caller: Caller, id: Uuid) -> Result<Tag, Error> {
        let tag = self.fetch_tag(id).await?;
        self.authorize(caller, "start", tag)?;

        let now = self.now();

        self.store
            .update_tag(id, Box::new(move |tag: &mut Tag| tag.start(caller.id, now)))
            .await
    }
}
