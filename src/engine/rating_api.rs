use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{RateParams, RatingAPI, RatingResult},
    auth::Caller,
    db::Store,
    entities::{Rating, TagStatus, User},
    error::Error,
};

#[async_trait]
impl<S: Store> RatingAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn rate(
        &self,
        caller: Caller,
        tag_id: Uuid,
        params: RateParams,
    ) -> Result<RatingResult, Error> {
        let now = self.now();
        let rating = Rating::new(
            tag_id,
            caller.id,
            params.rated_user_id,
            params.score,
            params.comment,
            now,
        )?;

        let tag = self.fetch_tag(tag_id).await?;
        self.authorize(caller, "rate", tag.clone())?;

        if tag.status != TagStatus::Completed {
            return Err(Error::invalid_state("only completed trips can be rated"));
        }

        if tag.counterpart_of(caller.id) != Some(params.rated_user_id) {
            return Err(Error::forbidden("you can only rate the other participant of this trip"));
        }

        let score = rating.score;
        let user = self
            .store
            .record_rating(
                &rating,
                Box::new(move |user: &mut User| {
                    user.apply_rating(score, now);
                    Ok(true)
                }),
            )
            .await?;

        tracing::info!(tag_id = %tag_id, rating = user.rating, "rating recorded");

        Ok(RatingResult {
            rated_user_id: user.id,
            rating: user.rating,
            rating_count: user.rating_count,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn has_rated(&self, caller: Caller, tag_id: Uuid) -> Result<bool, Error> {
        let tag = self.fetch_tag(tag_id).await?;
        self.authorize(caller, "read", tag)?;

        self.store.has_rated(tag_id, caller.id).await
    }
}
