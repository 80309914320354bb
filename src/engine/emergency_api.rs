use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::EmergencyAPI,
    auth::Caller,
    db::Store,
    entities::{EmergencyAlert, SharedTrip, Tag},
    error::Error,
};

#[async_trait]
impl<S: Store> EmergencyAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn trigger_emergency(&self, caller: Caller, tag_id: Uuid) -> Result<Tag, Error> {
        let tag = self.fetch_tag(tag_id).await?;
        self.authorize(caller, "emergency", tag.clone())?;

        let position = self.fetch_user(caller.id).await?.position;
        let now = self.now();
        let alert = EmergencyAlert::new(&tag, caller.id, position, now);

        let tag = self
            .store
            .record_emergency(
                &alert,
                Box::new(move |tag: &mut Tag| tag.raise_emergency(now)),
            )
            .await?;

        tracing::warn!(
            tag_id = %tag.id,
            alert_id = %alert.id,
            lat = alert.location.lat,
            lng = alert.location.lng,
            "emergency raised"
        );

        Ok(tag)
    }

    #[tracing::instrument(skip(self, share_token))]
    async fn find_shared_trip(&self, share_token: &str) -> Result<SharedTrip, Error> {
        let tag = self
            .store
            .find_tag_by_share_token(share_token)
            .await?
            .ok_or_else(|| Error::not_found("shared trip not found"))?;

        Ok(SharedTrip::from(&tag))
    }
}
