mod emergency_api;
mod feed_api;
mod offer_api;
mod rating_api;
mod sweep_api;
mod tag_api;
mod trip_api;
mod user_api;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use oso::Oso;
use uuid::Uuid;

use crate::{
    api::API,
    auth::authorizor,
    clock::{Clock, SystemClock},
    config::MatchingConfig,
    db::Store,
    entities::{Tag, User},
    error::Error,
    route::RoutePlanner,
};

pub struct Engine<S: Store> {
    store: S,
    routes: RoutePlanner,
    authorizor: Oso,
    clock: Arc<dyn Clock>,
    config: MatchingConfig,
}

impl<S: Store> Engine<S> {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(store: S, routes: RoutePlanner, config: MatchingConfig) -> Result<Self, Error> {
        Ok(Self {
            store,
            routes,
            authorizor: authorizor::new()?,
            clock: Arc::new(SystemClock),
            config,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(Error::forbidden("you are not allowed to do this on this ride request"))
    }

    async fn fetch_user(&self, id: Uuid) -> Result<User, Error> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| Error::not_found("user not found"))
    }

    async fn fetch_tag(&self, id: Uuid) -> Result<Tag, Error> {
        self.store
            .find_tag(id)
            .await?
            .ok_or_else(|| Error::not_found("ride request not found"))
    }
}

impl<S: Store> API for Engine<S> {}
