use super::Engine;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use uuid::Uuid;

use crate::{
    api::{FeedAPI, FeedEntry},
    auth::Caller,
    db::{Store, TagQuery},
    entities::{Coordinates, Role, Tag, TagStatus, User},
    error::Error,
    geo,
};

#[async_trait]
impl<S: Store> FeedAPI for Engine<S> {
    /// Open ride requests the driver may see and bid on, nearest pickup first.
    #[tracing::instrument(skip(self))]
    async fn list_open_tags(
        &self,
        caller: Caller,
        position: Option<Coordinates>,
    ) -> Result<Vec<FeedEntry>, Error> {
        let driver = self.fetch_user(caller.id).await?;
        driver.require_role(Role::Driver)?;

        let position = match position.or(driver.position) {
            Some(position) => position,
            None => {
                tracing::info!("driver has no known position, returning an empty feed...");
                return Ok(vec![]);
            }
        };

        position.validate()?;

        let radius_km = self.config.visibility_radius_km;
        let open = self
            .store
            .list_tags(TagQuery::with_statuses(&TagStatus::OPEN))
            .await?;

        let mut passengers: HashMap<Uuid, Option<User>> = HashMap::new();
        let mut candidates: Vec<Tag> = Vec::new();

        for tag in open {
            if tag.passenger_id == driver.id {
                continue;
            }

            // a road is never shorter than the great circle
            if geo::distance_km(position, tag.pickup.coordinates) > radius_km {
                continue;
            }

            if !passengers.contains_key(&tag.passenger_id) {
                let passenger = self.store.find_user(tag.passenger_id).await?;
                passengers.insert(tag.passenger_id, passenger);
            }

            let visible = match passengers.get(&tag.passenger_id) {
                Some(Some(passenger)) => {
                    driver.in_city(&passenger.city) && !driver.is_blocked_with(passenger)
                }
                _ => false,
            };

            if visible {
                candidates.push(tag);
            }
        }

        let estimates = join_all(candidates.iter().map(|tag| async move {
            let pickup = self.routes.estimate(position, tag.pickup.coordinates).await;
            let trip = self
                .routes
                .estimate(tag.pickup.coordinates, tag.dropoff.coordinates)
                .await;
            (pickup, trip)
        }))
        .await;

        let now = self.now();
        let mut entries = Vec::new();

        for (tag, (pickup_estimate, trip_estimate)) in candidates.into_iter().zip(estimates) {
            if pickup_estimate.distance_km > radius_km {
                continue;
            }

            let has_offered = self
                .store
                .list_offers(tag.id)
                .await?
                .iter()
                .any(|offer| offer.driver_id == driver.id && offer.is_live(now));

            entries.push(FeedEntry {
                distance_km: pickup_estimate.distance_km,
                tag,
                pickup_estimate,
                trip_estimate,
                has_offered,
            });
        }

        entries.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

        tracing::info!(count = entries.len(), "feed computed");

        Ok(entries)
    }
}
