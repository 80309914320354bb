#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use leylek::api::{CreateTagParams, OfferAPI, RegisterUserParams, SubmitOfferParams, TagAPI, UserAPI};
use leylek::auth::Caller;
use leylek::clock::ManualClock;
use leylek::config::MatchingConfig;
use leylek::db::MemoryStore;
use leylek::engine::Engine;
use leylek::entities::{Coordinates, Offer, Place, Role, RouteEstimate, Tag};
use leylek::error::Error;
use leylek::route::{NoopRouteCache, RouteEstimator, RoutePlanner};

pub type TestEngine = Engine<MemoryStore>;

pub const PICKUP: (f64, f64) = (37.00, 35.00);
pub const DROPOFF: (f64, f64) = (41.00, 29.00);

/// Always fails, so every estimate goes through the straight-line fallback.
pub struct UnreachableEstimator;

#[async_trait]
impl RouteEstimator for UnreachableEstimator {
    async fn estimate(&self, _: Coordinates, _: Coordinates) -> Result<RouteEstimate, Error> {
        Err(Error::not_found("routing service unavailable"))
    }
}

pub struct Harness {
    pub api: Arc<TestEngine>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_estimator(Arc::new(UnreachableEstimator))
    }

    pub fn with_estimator(estimator: Arc<dyn RouteEstimator>) -> Self {
        let config = MatchingConfig::default();
        let clock = Arc::new(ManualClock::default());
        let routes = RoutePlanner::new(estimator, Arc::new(NoopRouteCache), &config);

        let engine = Engine::new(MemoryStore::new(), routes, config)
            .unwrap()
            .with_clock(clock.clone());

        Self {
            api: Arc::new(engine),
            clock,
        }
    }

    pub fn advance(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }

    pub async fn register(
        &self,
        name: &str,
        role: Role,
        city: &str,
        position: Option<(f64, f64)>,
    ) -> Caller {
        let caller = Caller::new(Uuid::new_v4());

        self.api
            .register_user(
                caller,
                RegisterUserParams {
                    name: name.into(),
                    roles: BTreeSet::from([role]),
                    city: Some(city.into()),
                    position: position.map(|(lat, lng)| Coordinates::new(lat, lng)),
                },
            )
            .await
            .unwrap();

        caller
    }

    pub async fn passenger(&self) -> Caller {
        self.register("Ayşe", Role::Passenger, "Adana", None).await
    }

    pub async fn driver(&self, name: &str) -> Caller {
        self.register(name, Role::Driver, "Adana", Some((37.01, 35.01)))
            .await
    }

    pub async fn create_tag(&self, passenger: Caller) -> Result<Tag, Error> {
        self.create_tag_at(passenger, PICKUP).await
    }

    pub async fn create_tag_at(&self, passenger: Caller, pickup: (f64, f64)) -> Result<Tag, Error> {
        self.api
            .create_tag(
                passenger,
                CreateTagParams {
                    pickup: Place::new("Seyhan", pickup.0, pickup.1),
                    dropoff: Place::new("Kadıköy", DROPOFF.0, DROPOFF.1),
                    notes: None,
                },
            )
            .await
    }

    pub async fn offer(&self, driver: Caller, tag: &Tag, price: f64) -> Result<Offer, Error> {
        self.api
            .submit_offer(
                driver,
                tag.id,
                SubmitOfferParams {
                    price,
                    notes: None,
                },
            )
            .await
    }

    /// Passenger, driver and a ride request matched at 850.
    pub async fn matched(&self) -> (Caller, Caller, Tag) {
        let passenger = self.passenger().await;
        let driver = self.driver("Mehmet").await;

        let tag = self.create_tag(passenger).await.unwrap();
        let offer = self.offer(driver, &tag, 850.0).await.unwrap();
        let tag = self.api.accept_offer(passenger, offer.id).await.unwrap();

        (passenger, driver, tag)
    }
}
