use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{RegisterUserParams, UserAPI, UserStats},
    auth::Caller,
    db::{Store, TagQuery},
    entities::{Coordinates, Role, TagStatus, User},
    error::Error,
    geo,
};

#[async_trait]
impl<S: Store> UserAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn register_user(&self, caller: Caller, params: RegisterUserParams) -> Result<User, Error> {
        if params.name.trim().is_empty() {
            return Err(Error::invalid_argument("name is required"));
        }

        if params.roles.is_empty() {
            return Err(Error::invalid_argument("at least one role is required"));
        }

        if let Some(position) = params.position {
            position.validate()?;
        }

        let city = match (params.city, params.position) {
            (Some(city), _) if !city.trim().is_empty() => city.trim().to_string(),
            (_, Some(position)) => geo::nearest_city(position, self.config.city_radius_km),
            _ => return Err(Error::invalid_argument("city or position is required")),
        };

        let now = self.now();
        let mut user = User::new(params.name.trim(), params.roles, city, now);
        user.id = caller.id;
        user.position = params.position;

        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, city = %user.city, "registered user");

        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    async fn find_user(&self, caller: Caller, id: Uuid) -> Result<User, Error> {
        if caller.id != id {
            return Err(Error::forbidden("you can only read your own record"));
        }

        self.fetch_user(id).await
    }

    #[tracing::instrument(skip(self))]
    async fn update_location(&self, caller: Caller, position: Coordinates) -> Result<User, Error> {
        position.validate()?;

        let now = self.now();

        self.store
            .update_user(
                caller.id,
                Box::new(move |user: &mut User| {
                    user.move_to(position, now);
                    Ok(true)
                }),
            )
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn block_user(&self, caller: Caller, other_id: Uuid) -> Result<User, Error> {
        if caller.id == other_id {
            return Err(Error::invalid_argument("users cannot block themselves"));
        }

        self.fetch_user(other_id).await?;

        let now = self.now();

        self.store
            .update_user(
                caller.id,
                Box::new(move |user: &mut User| user.block(other_id, now)),
            )
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn unblock_user(&self, caller: Caller, other_id: Uuid) -> Result<User, Error> {
        let now = self.now();

        self.store
            .update_user(
                caller.id,
                Box::new(move |user: &mut User| Ok(user.unblock(other_id, now))),
            )
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn user_stats(&self, caller: Caller) -> Result<UserStats, Error> {
        let user = self.fetch_user(caller.id).await?;

        let mut as_passenger = TagQuery::with_statuses(&[TagStatus::Completed]);
        as_passenger.passenger_id = Some(user.id);
        let as_passenger = self.store.summarize_tags(as_passenger).await?;

        let mut as_driver = TagQuery::with_statuses(&[TagStatus::Completed]);
        as_driver.driver_id = Some(user.id);
        let as_driver = self.store.summarize_tags(as_driver).await?;

        Ok(UserStats {
            total_trips: user.total_trips,
            completed_as_passenger: as_passenger.count,
            completed_as_driver: as_driver.count,
            rating: user.rating,
            rating_count: user.rating_count,
            total_spent: user
                .has_role(Role::Passenger)
                .then(|| as_passenger.total_price),
            total_earned: user.has_role(Role::Driver).then(|| as_driver.total_price),
        })
    }
}
