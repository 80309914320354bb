use super::Engine;

use async_trait::async_trait;

use crate::{
    api::{SweepAPI, SweepReport},
    db::{Store, TagQuery},
    entities::{EndReason, Tag, TagStatus},
    error::Error,
};

#[async_trait]
impl<S: Store> SweepAPI for Engine<S> {
    /// Closes requests idle past their window. Safe to run concurrently with itself since
    /// staleness is checked again under the row lock.
    #[tracing::instrument(skip(self))]
    async fn sweep_stale_tags(&self) -> Result<SweepReport, Error> {
        let now = self.now();
        let open_after = self.config.stale_open_after;
        let active_after = self.config.stale_active_after;

        let mut query = TagQuery::with_statuses(&TagStatus::NON_TERMINAL);
        query.updated_before = Some(now - open_after.min(active_after));

        let candidates = self.store.list_tags(query).await?;
        let mut report = SweepReport::default();

        for candidate in candidates {
            let result = self
                .store
                .update_tag(
                    candidate.id,
                    Box::new(move |tag: &mut Tag| tag.expire(now, open_after, active_after)),
                )
                .await;

            match result {
                Ok(tag) if tag.end_reason == Some(EndReason::Timeout) && tag.updated_at == now => {
                    match tag.status {
                        TagStatus::Cancelled => report.cancelled += 1,
                        _ => report.completed += 1,
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(tag_id = %candidate.id, "failed to expire ride request: {}", err);
                    report.failed += 1;
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                cancelled = report.cancelled,
                completed = report.completed,
                failed = report.failed,
                "stale sweep finished"
            );
        }

        Ok(report)
    }
}
