use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{OfferAPI, SubmitOfferParams},
    auth::Caller,
    db::{Store, TagQuery},
    entities::{sort_by_price, Offer, Role, Tag, TagStatus},
    error::Error,
};

#[async_trait]
impl<S: Store> OfferAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn submit_offer(
        &self,
        caller: Caller,
        tag_id: Uuid,
        params: SubmitOfferParams,
    ) -> Result<Offer, Error> {
        let driver = self.fetch_user(caller.id).await?;
        driver.require_role(Role::Driver)?;

        Offer::validate_price(params.price)?;

        let tag = self.fetch_tag(tag_id).await?;

        if !tag.status.is_open() {
            return Err(Error::invalid_state("this ride request no longer accepts offers"));
        }

        if tag.passenger_id == driver.id {
            return Err(Error::forbidden("you cannot bid on your own ride request"));
        }

        let passenger = self.fetch_user(tag.passenger_id).await?;

        if driver.is_blocked_with(&passenger) {
            return Err(Error::forbidden("you cannot bid on this ride request"));
        }

        let mut current_trip = TagQuery::with_statuses(&TagStatus::ACTIVE);
        current_trip.driver_id = Some(driver.id);
        current_trip.limit = Some(1);

        if !self.store.list_tags(current_trip).await?.is_empty() {
            return Err(Error::conflict("finish your current trip before bidding again"));
        }

        let pickup_estimate = match driver.position {
            Some(position) => Some(self.routes.estimate(position, tag.pickup.coordinates).await),
            None => None,
        };
        let trip_estimate = self
            .routes
            .estimate(tag.pickup.coordinates, tag.dropoff.coordinates)
            .await;

        let now = self.now();
        let cooldown = self.config.offer_cooldown;

        let offer = Offer::new(
            tag.id,
            driver.id,
            driver.name.clone(),
            driver.rating,
            params.price,
            params.notes.filter(|notes| !notes.trim().is_empty()),
            now,
            self.config.offer_ttl,
        )
        .with_estimates(pickup_estimate, Some(trip_estimate));

        self.store
            .submit_offer(
                &offer,
                Box::new(move |previous: &[Offer]| {
                    if previous.iter().any(|o| now - o.created_at < cooldown) {
                        return Err(Error::rate_limited(
                            "please wait before bidding on this ride request again",
                        ));
                    }

                    if previous.iter().any(|o| o.is_live(now)) {
                        return Err(Error::conflict(
                            "you already have a pending offer for this ride",
                        ));
                    }

                    Ok(())
                }),
                Box::new(move |tag: &mut Tag| tag.receive_offer(now)),
            )
            .await?;

        tracing::info!(tag_id = %offer.tag_id, offer_id = %offer.id, price = offer.price, "offer submitted");

        Ok(offer)
    }

    #[tracing::instrument(skip(self))]
    async fn list_offers(&self, caller: Caller, tag_id: Uuid) -> Result<Vec<Offer>, Error> {
        let tag = self.fetch_tag(tag_id).await?;
        self.authorize(caller, "list_offers", tag)?;

        let now = self.now();

        let mut offers: Vec<Offer> = self
            .store
            .list_offers(tag_id)
            .await?
            .into_iter()
            .filter(|offer| offer.is_live(now))
            .collect();

        sort_by_price(&mut offers);

        Ok(offers)
    }

    #[tracing::instrument(skip(self))]
    async fn accept_offer(&self, caller: Caller, offer_id: Uuid) -> Result<Tag, Error> {
        let offer = self
            .store
            .find_offer(offer_id)
            .await?
            .ok_or_else(|| Error::not_found("offer not found"))?;

        let tag = self.fetch_tag(offer.tag_id).await?;
        self.authorize(caller, "accept_offer", tag)?;

        let driver_location = self
            .store
            .find_user(offer.driver_id)
            .await?
            .and_then(|driver| driver.position);

        let now = self.now();

        let (tag, offer) = self
            .store
            .accept_offer(
                offer_id,
                now,
                Box::new(move |tag: &mut Tag, offer: &Offer| {
                    tag.match_offer(offer, driver_location, now)
                }),
            )
            .await?;

        tracing::info!(tag_id = %tag.id, offer_id = %offer.id, "offer accepted, ride request matched");

        Ok(tag)
    }
}
