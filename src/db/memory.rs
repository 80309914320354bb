use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{MatchMutation, Mutation, OfferGuard, SettleMutation, Store, TagQuery, TagSummary};
use crate::entities::{EmergencyAlert, Offer, Rating, Settlement, Tag, User};
use crate::error::Error;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    tags: HashMap<Uuid, Tag>,
    offers: HashMap<Uuid, Offer>,
    ratings: Vec<Rating>,
    alerts: Vec<EmergencyAlert>,
}

impl State {
    fn reject_pending_offers(&mut self, tag_id: Uuid, except: Option<Uuid>) {
        self.offers
            .values_mut()
            .filter(|offer| offer.tag_id == tag_id && Some(offer.id) != except)
            .for_each(|offer| {
                offer.reject();
            });
    }
}

/// In-process store. A single lock serializes every operation, which makes each of them
/// trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if state.users.contains_key(&user.id) {
            return Err(Error::conflict("this user is already registered"));
        }

        state.users.insert(user.id, user.clone());

        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn update_user(&self, id: Uuid, mutation: Mutation<User>) -> Result<User, Error> {
        let mut state = self.state.lock().await;

        let mut user = state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("user not found"))?;

        if mutation(&mut user)? {
            state.users.insert(id, user.clone());
        }

        Ok(user)
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let has_active = state
            .tags
            .values()
            .any(|t| t.passenger_id == tag.passenger_id && !t.status.is_terminal());

        if has_active {
            return Err(Error::conflict("you already have an active ride request"));
        }

        state.tags.insert(tag.id, tag.clone());

        Ok(())
    }

    async fn find_tag(&self, id: Uuid) -> Result<Option<Tag>, Error> {
        Ok(self.state.lock().await.tags.get(&id).cloned())
    }

    async fn list_tags(&self, query: TagQuery) -> Result<Vec<Tag>, Error> {
        let state = self.state.lock().await;

        let mut tags: Vec<Tag> = state
            .tags
            .values()
            .filter(|tag| query.matches(tag))
            .cloned()
            .collect();

        tags.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        if let Some(limit) = query.limit {
            tags.truncate(limit.max(0) as usize);
        }

        Ok(tags)
    }

    async fn summarize_tags(&self, query: TagQuery) -> Result<TagSummary, Error> {
        let state = self.state.lock().await;

        Ok(state
            .tags
            .values()
            .filter(|tag| query.matches(tag))
            .fold(TagSummary::default(), |summary, tag| TagSummary {
                count: summary.count + 1,
                total_price: summary.total_price + tag.final_price.unwrap_or(0.0),
            }))
    }

    async fn find_tag_by_share_token(&self, token: &str) -> Result<Option<Tag>, Error> {
        let state = self.state.lock().await;

        Ok(state
            .tags
            .values()
            .find(|tag| tag.share_token == token)
            .cloned())
    }

    async fn update_tag(&self, id: Uuid, mutation: Mutation<Tag>) -> Result<Tag, Error> {
        let mut state = self.state.lock().await;

        let mut tag = state
            .tags
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("ride request not found"))?;

        if mutation(&mut tag)? {
            if tag.status.is_terminal() {
                state.reject_pending_offers(id, None);
            }

            state.tags.insert(id, tag.clone());
        }

        Ok(tag)
    }

    async fn submit_offer(
        &self,
        offer: &Offer,
        guard: OfferGuard,
        mutation: Mutation<Tag>,
    ) -> Result<Tag, Error> {
        let mut state = self.state.lock().await;

        let mut tag = state
            .tags
            .get(&offer.tag_id)
            .cloned()
            .ok_or_else(|| Error::not_found("ride request not found"))?;

        let changed = mutation(&mut tag)?;

        let previous: Vec<Offer> = state
            .offers
            .values()
            .filter(|o| o.tag_id == offer.tag_id && o.driver_id == offer.driver_id)
            .cloned()
            .collect();

        guard(&previous)?;

        let now = offer.created_at;
        state
            .offers
            .values_mut()
            .filter(|o| o.tag_id == offer.tag_id && o.driver_id == offer.driver_id)
            .filter(|o| o.is_expired(now))
            .for_each(|o| {
                o.reject();
            });

        state.offers.insert(offer.id, offer.clone());

        if changed {
            state.tags.insert(tag.id, tag.clone());
        }

        Ok(tag)
    }

    async fn find_offer(&self, id: Uuid) -> Result<Option<Offer>, Error> {
        Ok(self.state.lock().await.offers.get(&id).cloned())
    }

    async fn list_offers(&self, tag_id: Uuid) -> Result<Vec<Offer>, Error> {
        let state = self.state.lock().await;

        Ok(state
            .offers
            .values()
            .filter(|offer| offer.tag_id == tag_id)
            .cloned()
            .collect())
    }

    async fn accept_offer(
        &self,
        offer_id: Uuid,
        now: DateTime<Utc>,
        mutation: MatchMutation,
    ) -> Result<(Tag, Offer), Error> {
        let mut state = self.state.lock().await;

        let mut offer = state
            .offers
            .get(&offer_id)
            .cloned()
            .ok_or_else(|| Error::not_found("offer not found"))?;

        if !offer.is_acceptable(now) {
            return Err(Error::not_found("offer is no longer available"));
        }

        let mut tag = state
            .tags
            .get(&offer.tag_id)
            .cloned()
            .ok_or_else(|| Error::not_found("ride request not found"))?;

        if !tag.status.is_open() {
            return Err(Error::not_found("this ride request has already been matched"));
        }

        let driver_busy = state
            .tags
            .values()
            .any(|t| t.driver_id == Some(offer.driver_id) && t.status.is_active());

        if driver_busy {
            return Err(Error::conflict("this driver is already on another trip"));
        }

        mutation(&mut tag, &offer)?;
        offer.accept()?;

        state.reject_pending_offers(tag.id, Some(offer.id));
        state.offers.insert(offer.id, offer.clone());
        state.tags.insert(tag.id, tag.clone());

        Ok((tag, offer))
    }

    async fn settle_tag(
        &self,
        id: Uuid,
        mutation: SettleMutation,
    ) -> Result<(Tag, Option<Settlement>), Error> {
        let mut state = self.state.lock().await;

        let mut tag = state
            .tags
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("ride request not found"))?;

        let settlement = mutation(&mut tag)?;

        if let Some(settlement) = &settlement {
            let now = tag.updated_at;
            let mut users = Vec::with_capacity(2);

            for user_id in settlement.participants() {
                let mut user = state
                    .users
                    .get(&user_id)
                    .cloned()
                    .ok_or_else(|| Error::not_found("trip participant not found"))?;

                settlement.apply_to(&mut user, now);
                users.push(user);
            }

            for user in users {
                state.users.insert(user.id, user);
            }

            state.reject_pending_offers(id, None);
            state.tags.insert(id, tag.clone());
        }

        Ok((tag, settlement))
    }

    async fn record_rating(
        &self,
        rating: &Rating,
        mutation: Mutation<User>,
    ) -> Result<User, Error> {
        let mut state = self.state.lock().await;

        let duplicate = state
            .ratings
            .iter()
            .any(|r| r.tag_id == rating.tag_id && r.rater_id == rating.rater_id);

        if duplicate {
            return Err(Error::conflict("you already rated this trip"));
        }

        let mut user = state
            .users
            .get(&rating.rated_user_id)
            .cloned()
            .ok_or_else(|| Error::not_found("rated user not found"))?;

        mutation(&mut user)?;

        state.users.insert(user.id, user.clone());
        state.ratings.push(rating.clone());

        Ok(user)
    }

    async fn record_emergency(
        &self,
        alert: &EmergencyAlert,
        mutation: Mutation<Tag>,
    ) -> Result<Tag, Error> {
        let mut state = self.state.lock().await;

        let mut tag = state
            .tags
            .get(&alert.tag_id)
            .cloned()
            .ok_or_else(|| Error::not_found("ride request not found"))?;

        if mutation(&mut tag)? {
            state.tags.insert(tag.id, tag.clone());
        }

        state.alerts.push(alert.clone());

        Ok(tag)
    }

    async fn list_emergency_alerts(&self, tag_id: Uuid) -> Result<Vec<EmergencyAlert>, Error> {
        let state = self.state.lock().await;

        Ok(state
            .alerts
            .iter()
            .filter(|alert| alert.tag_id == tag_id)
            .cloned()
            .collect())
    }

    async fn has_rated(&self, tag_id: Uuid, rater_id: Uuid) -> Result<bool, Error> {
        let state = self.state.lock().await;

        Ok(state
            .ratings
            .iter()
            .any(|r| r.tag_id == tag_id && r.rater_id == rater_id))
    }
}

#[cfg(test)]
fn sample_tag(passenger: &User) -> Tag {
    use crate::entities::Place;

    Tag::new(
        passenger,
        Place::new("Seyhan", 37.0, 35.0),
        Place::new("Kadıköy", 41.0, 29.0),
        None,
        "Adana".into(),
        Utc::now(),
    )
}

#[cfg(test)]
fn sample_user() -> User {
    use crate::entities::Role;
    use std::collections::BTreeSet;

    User::new("Ayşe", BTreeSet::from([Role::Passenger]), "Adana", Utc::now())
}

#[test]
fn one_active_tag_per_passenger() {
    let store = MemoryStore::new();
    let passenger = sample_user();

    tokio_test::block_on(async {
        store.insert_tag(&sample_tag(&passenger)).await.unwrap();

        let err = store.insert_tag(&sample_tag(&passenger)).await.unwrap_err();
        assert!(err.is_conflict());
    });
}

#[test]
fn unchanged_mutations_are_not_written() {
    let store = MemoryStore::new();
    let passenger = sample_user();
    let tag = sample_tag(&passenger);

    tokio_test::block_on(async {
        store.insert_tag(&tag).await.unwrap();

        let result = store
            .update_tag(
                tag.id,
                Box::new(|tag: &mut Tag| {
                    tag.notes = Some("discarded".into());
                    Ok(false)
                }),
            )
            .await
            .unwrap();
        assert_eq!(result.notes.as_deref(), Some("discarded"));

        let stored = store.find_tag(tag.id).await.unwrap().unwrap();
        assert!(stored.notes.is_none());
    });
}

#[test]
fn terminal_tags_reject_pending_offers() {
    use crate::entities::OfferStatus;
    use chrono::Duration;

    let store = MemoryStore::new();
    let passenger = sample_user();
    let tag = sample_tag(&passenger);
    let offer = Offer::new(
        tag.id,
        Uuid::new_v4(),
        "Mehmet".into(),
        4.9,
        850.0,
        None,
        Utc::now(),
        Duration::minutes(10),
    );

    tokio_test::block_on(async {
        store.insert_tag(&tag).await.unwrap();
        store
            .submit_offer(
                &offer,
                Box::new(|_: &[Offer]| Ok(())),
                Box::new(|tag: &mut Tag| tag.receive_offer(Utc::now())),
            )
            .await
            .unwrap();

        store
            .update_tag(tag.id, Box::new(|tag: &mut Tag| tag.cancel(Utc::now())))
            .await
            .unwrap();

        let stored = store.find_offer(offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Rejected);
    });
}
