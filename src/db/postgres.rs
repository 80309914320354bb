use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::{MatchMutation, Mutation, OfferGuard, SettleMutation, Store, TagQuery, TagSummary};
use crate::entities::{EmergencyAlert, Offer, Rating, Settlement, Tag, TagStatus, User};
use crate::error::Error;

type Database = Postgres;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (id UUID PRIMARY KEY, data JSONB NOT NULL)",
    "CREATE TABLE IF NOT EXISTS tags (id UUID PRIMARY KEY, passenger_id UUID NOT NULL, driver_id UUID, status VARCHAR NOT NULL, updated_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
    "CREATE UNIQUE INDEX IF NOT EXISTS tags_one_active_per_passenger ON tags (passenger_id) WHERE status NOT IN ('completed', 'cancelled')",
    "CREATE UNIQUE INDEX IF NOT EXISTS tags_one_active_per_driver ON tags (driver_id) WHERE status IN ('matched', 'in_progress')",
    "CREATE INDEX IF NOT EXISTS tags_status_updated_at ON tags (status, updated_at)",
    "CREATE UNIQUE INDEX IF NOT EXISTS tags_share_token ON tags ((data->>'share_token'))",
    "CREATE TABLE IF NOT EXISTS offers (id UUID PRIMARY KEY, tag_id UUID NOT NULL REFERENCES tags(id), driver_id UUID NOT NULL, status VARCHAR NOT NULL, price DOUBLE PRECISION NOT NULL, created_at TIMESTAMPTZ NOT NULL, expires_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
    "CREATE UNIQUE INDEX IF NOT EXISTS offers_one_accepted_per_tag ON offers (tag_id) WHERE status = 'accepted'",
    "CREATE UNIQUE INDEX IF NOT EXISTS offers_one_live_per_driver ON offers (tag_id, driver_id) WHERE status IN ('pending', 'accepted')",
    "CREATE TABLE IF NOT EXISTS ratings (id UUID PRIMARY KEY, tag_id UUID NOT NULL REFERENCES tags(id), rater_id UUID NOT NULL, rated_user_id UUID NOT NULL, score INT2 NOT NULL, data JSONB NOT NULL, UNIQUE (tag_id, rater_id))",
    "CREATE TABLE IF NOT EXISTS emergency_alerts (id UUID PRIMARY KEY, tag_id UUID NOT NULL REFERENCES tags(id), user_id UUID NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
];

const TAG_FILTER: &str = "
    status = ANY($1)
    AND ($2::UUID IS NULL OR passenger_id = $2)
    AND ($3::UUID IS NULL OR driver_id = $3)
    AND ($4::TIMESTAMPTZ IS NULL OR updated_at < $4)
";

const REJECT_PENDING_OFFERS: &str = "
    UPDATE offers
    SET status = 'rejected', data = jsonb_set(data, '{status}', '\"rejected\"')
    WHERE tag_id = $1 AND id <> $2 AND status = 'pending'
";

/// Postgres-backed store. Documents live in `data` JSONB columns; the indexed columns
/// beside them carry what conditional updates and unique indexes need.
pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip_all)]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        for statement in SCHEMA {
            pool.execute(*statement).await?;
        }

        Ok(Self { pool })
    }
}

fn unique_violation(err: sqlx::Error, conflict: Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => conflict,
        _ => err.into(),
    }
}

fn decode_data<T: DeserializeOwned>(row: &PgRow) -> Result<T, Error> {
    let Json(data): Json<T> = row.try_get("data")?;

    Ok(data)
}

fn status_names(statuses: &[TagStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.name().to_string()).collect()
}

#[tracing::instrument(skip(tx))]
async fn fetch_user_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<User, Error> {
    let Json(user): Json<User> = sqlx::query("SELECT data FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found("user not found"))?
        .try_get("data")?;

    Ok(user)
}

#[tracing::instrument(skip(tx))]
async fn fetch_tag_for_update(tx: &mut Transaction<'_, Database>, id: &Uuid) -> Result<Tag, Error> {
    let Json(tag): Json<Tag> = sqlx::query("SELECT data FROM tags WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found("ride request not found"))?
        .try_get("data")?;

    Ok(tag)
}

#[tracing::instrument(skip(tx))]
async fn fetch_offer_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Offer, Error> {
    let Json(offer): Json<Offer> = sqlx::query("SELECT data FROM offers WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found("offer not found"))?
        .try_get("data")?;

    Ok(offer)
}

#[tracing::instrument(skip(tx, user), fields(user_id = %user.id))]
async fn update_user_row(tx: &mut Transaction<'_, Database>, user: &User) -> Result<(), Error> {
    sqlx::query("UPDATE users SET data = $2 WHERE id = $1")
        .bind(&user.id)
        .bind(Json(user))
        .execute(&mut *tx)
        .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, tag), fields(tag_id = %tag.id))]
async fn update_tag_row(tx: &mut Transaction<'_, Database>, tag: &Tag) -> Result<(), Error> {
    sqlx::query("UPDATE tags SET status = $2, driver_id = $3, updated_at = $4, data = $5 WHERE id = $1")
        .bind(&tag.id)
        .bind(tag.status.name())
        .bind(&tag.driver_id)
        .bind(&tag.updated_at)
        .bind(Json(tag))
        .execute(&mut *tx)
        .await?;

    if tag.status.is_terminal() {
        sqlx::query(REJECT_PENDING_OFFERS)
            .bind(&tag.id)
            .bind(Uuid::nil())
            .execute(&mut *tx)
            .await?;
    }

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert_user(&self, user: &User) -> Result<(), Error> {
        sqlx::query("INSERT INTO users (id, data) VALUES ($1, $2)")
            .bind(&user.id)
            .bind(Json(user))
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation(e, Error::conflict("this user is already registered")))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        let maybe_result = sqlx::query("SELECT data FROM users WHERE id = $1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;

        maybe_result.as_ref().map(decode_data).transpose()
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn update_user(&self, id: Uuid, mutation: Mutation<User>) -> Result<User, Error> {
        let mut tx = self.pool.begin().await?;

        let mut user = fetch_user_for_update(&mut tx, &id).await?;

        if mutation(&mut user)? {
            update_user_row(&mut tx, &user).await?;
        }

        tx.commit().await?;

        Ok(user)
    }

    #[tracing::instrument(skip(self, tag), fields(tag_id = %tag.id))]
    async fn insert_tag(&self, tag: &Tag) -> Result<(), Error> {
        sqlx::query("INSERT INTO tags (id, passenger_id, driver_id, status, updated_at, data) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(&tag.id)
            .bind(&tag.passenger_id)
            .bind(&tag.driver_id)
            .bind(tag.status.name())
            .bind(&tag.updated_at)
            .bind(Json(tag))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                unique_violation(e, Error::conflict("you already have an active ride request"))
            })?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_tag(&self, id: Uuid) -> Result<Option<Tag>, Error> {
        let maybe_result = sqlx::query("SELECT data FROM tags WHERE id = $1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;

        maybe_result.as_ref().map(decode_data).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_tags(&self, query: TagQuery) -> Result<Vec<Tag>, Error> {
        let sql = format!(
            "SELECT data FROM tags WHERE {} ORDER BY updated_at DESC LIMIT $5",
            TAG_FILTER
        );

        let rows = sqlx::query(&sql)
            .bind(status_names(&query.statuses))
            .bind(&query.passenger_id)
            .bind(&query.driver_id)
            .bind(&query.updated_before)
            .bind(&query.limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_data).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn summarize_tags(&self, query: TagQuery) -> Result<TagSummary, Error> {
        let sql = format!(
            "SELECT COUNT(*) AS count, COALESCE(SUM((data->>'final_price')::DOUBLE PRECISION), 0) AS total_price FROM tags WHERE {}",
            TAG_FILTER
        );

        let row = sqlx::query(&sql)
            .bind(status_names(&query.statuses))
            .bind(&query.passenger_id)
            .bind(&query.driver_id)
            .bind(&query.updated_before)
            .fetch_one(&self.pool)
            .await?;

        Ok(TagSummary {
            count: row.try_get("count")?,
            total_price: row.try_get("total_price")?,
        })
    }

    #[tracing::instrument(skip(self, token))]
    async fn find_tag_by_share_token(&self, token: &str) -> Result<Option<Tag>, Error> {
        let maybe_result = sqlx::query("SELECT data FROM tags WHERE data->>'share_token' = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        maybe_result.as_ref().map(decode_data).transpose()
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn update_tag(&self, id: Uuid, mutation: Mutation<Tag>) -> Result<Tag, Error> {
        let mut tx = self.pool.begin().await?;

        let mut tag = fetch_tag_for_update(&mut tx, &id).await?;

        if mutation(&mut tag)? {
            update_tag_row(&mut tx, &tag).await?;
        }

        tx.commit().await?;

        Ok(tag)
    }

    #[tracing::instrument(skip(self, offer, guard, mutation), fields(tag_id = %offer.tag_id))]
    async fn submit_offer(
        &self,
        offer: &Offer,
        guard: OfferGuard,
        mutation: Mutation<Tag>,
    ) -> Result<Tag, Error> {
        let mut tx = self.pool.begin().await?;

        let mut tag = fetch_tag_for_update(&mut tx, &offer.tag_id).await?;
        let changed = mutation(&mut tag)?;

        let rows = sqlx::query("SELECT data FROM offers WHERE tag_id = $1 AND driver_id = $2")
            .bind(&offer.tag_id)
            .bind(&offer.driver_id)
            .fetch_all(&mut tx)
            .await?;

        let previous = rows
            .iter()
            .map(decode_data)
            .collect::<Result<Vec<Offer>, Error>>()?;

        guard(&previous)?;

        // expired bids no longer count against the one-live-offer index
        sqlx::query(
            "UPDATE offers
            SET status = 'rejected', data = jsonb_set(data, '{status}', '\"rejected\"')
            WHERE tag_id = $1 AND driver_id = $2 AND status = 'pending' AND expires_at <= $3",
        )
        .bind(&offer.tag_id)
        .bind(&offer.driver_id)
        .bind(&offer.created_at)
        .execute(&mut tx)
        .await?;

        sqlx::query("INSERT INTO offers (id, tag_id, driver_id, status, price, created_at, expires_at, data) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(&offer.id)
            .bind(&offer.tag_id)
            .bind(&offer.driver_id)
            .bind(offer.status.name())
            .bind(offer.price)
            .bind(&offer.created_at)
            .bind(&offer.expires_at)
            .bind(Json(offer))
            .execute(&mut tx)
            .await
            .map_err(|e| {
                unique_violation(e, Error::conflict("you already have a pending offer for this ride"))
            })?;

        if changed {
            update_tag_row(&mut tx, &tag).await?;
        }

        tx.commit().await?;

        Ok(tag)
    }

    #[tracing::instrument(skip(self))]
    async fn find_offer(&self, id: Uuid) -> Result<Option<Offer>, Error> {
        let maybe_result = sqlx::query("SELECT data FROM offers WHERE id = $1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;

        maybe_result.as_ref().map(decode_data).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_offers(&self, tag_id: Uuid) -> Result<Vec<Offer>, Error> {
        let rows = sqlx::query("SELECT data FROM offers WHERE tag_id = $1 ORDER BY price ASC")
            .bind(&tag_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_data).collect()
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn accept_offer(
        &self,
        offer_id: Uuid,
        now: DateTime<Utc>,
        mutation: MatchMutation,
    ) -> Result<(Tag, Offer), Error> {
        // tag_id never changes, so it is safe to read it before taking any lock
        let tag_id: Uuid = sqlx::query("SELECT tag_id FROM offers WHERE id = $1")
            .bind(&offer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("offer not found"))?
            .try_get("tag_id")?;

        let mut tx = self.pool.begin().await?;

        // tag before offer, the same order every other writer uses
        let mut tag = fetch_tag_for_update(&mut tx, &tag_id).await?;
        let mut offer = fetch_offer_for_update(&mut tx, &offer_id).await?;

        if !offer.is_acceptable(now) {
            return Err(Error::not_found("offer is no longer available"));
        }

        let driver_busy = sqlx::query("SELECT id FROM tags WHERE driver_id = $1 AND status = ANY($2) LIMIT 1")
            .bind(&offer.driver_id)
            .bind(status_names(&TagStatus::ACTIVE))
            .fetch_optional(&mut tx)
            .await?;

        if driver_busy.is_some() {
            return Err(Error::conflict("this driver is already on another trip"));
        }

        mutation(&mut tag, &offer)?;
        offer.accept()?;

        let matched = sqlx::query(
            "UPDATE tags SET status = $2, driver_id = $3, updated_at = $4, data = $5
            WHERE id = $1 AND status = ANY($6)",
        )
        .bind(&tag.id)
        .bind(tag.status.name())
        .bind(&tag.driver_id)
        .bind(&tag.updated_at)
        .bind(Json(&tag))
        .bind(status_names(&TagStatus::OPEN))
        .execute(&mut tx)
        .await
        .map_err(|e| unique_violation(e, Error::conflict("this driver is already on another trip")))?
        .rows_affected();

        if matched == 0 {
            tracing::info!("ride request was matched concurrently, returning...");
            return Err(Error::not_found("this ride request has already been matched"));
        }

        let accepted = sqlx::query(
            "UPDATE offers SET status = $2, data = $3 WHERE id = $1 AND status = 'pending'",
        )
        .bind(&offer.id)
        .bind(offer.status.name())
        .bind(Json(&offer))
        .execute(&mut tx)
        .await
        .map_err(|e| unique_violation(e, Error::not_found("offer is no longer available")))?
        .rows_affected();

        if accepted == 0 {
            return Err(Error::not_found("offer is no longer available"));
        }

        sqlx::query(REJECT_PENDING_OFFERS)
            .bind(&tag.id)
            .bind(&offer.id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;

        Ok((tag, offer))
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn settle_tag(
        &self,
        id: Uuid,
        mutation: SettleMutation,
    ) -> Result<(Tag, Option<Settlement>), Error> {
        let mut tx = self.pool.begin().await?;

        let mut tag = fetch_tag_for_update(&mut tx, &id).await?;

        let settlement = mutation(&mut tag)?;

        if let Some(settlement) = &settlement {
            update_tag_row(&mut tx, &tag).await?;

            let mut participants = settlement.participants();
            participants.sort();

            for user_id in participants.iter() {
                let mut user = fetch_user_for_update(&mut tx, user_id).await?;
                settlement.apply_to(&mut user, tag.updated_at);
                update_user_row(&mut tx, &user).await?;
            }
        }

        tx.commit().await?;

        Ok((tag, settlement))
    }

    #[tracing::instrument(skip(self, rating, mutation), fields(tag_id = %rating.tag_id))]
    async fn record_rating(
        &self,
        rating: &Rating,
        mutation: Mutation<User>,
    ) -> Result<User, Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO ratings (id, tag_id, rater_id, rated_user_id, score, data) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(&rating.id)
            .bind(&rating.tag_id)
            .bind(&rating.rater_id)
            .bind(&rating.rated_user_id)
            .bind(rating.score as i16)
            .bind(Json(rating))
            .execute(&mut tx)
            .await
            .map_err(|e| unique_violation(e, Error::conflict("you already rated this trip")))?;

        let mut user = fetch_user_for_update(&mut tx, &rating.rated_user_id).await?;

        if mutation(&mut user)? {
            update_user_row(&mut tx, &user).await?;
        }

        tx.commit().await?;

        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    async fn has_rated(&self, tag_id: Uuid, rater_id: Uuid) -> Result<bool, Error> {
        let maybe_result = sqlx::query("SELECT 1 AS rated FROM ratings WHERE tag_id = $1 AND rater_id = $2")
            .bind(&tag_id)
            .bind(&rater_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(maybe_result.is_some())
    }

    #[tracing::instrument(skip(self, alert, mutation), fields(tag_id = %alert.tag_id))]
    async fn record_emergency(
        &self,
        alert: &EmergencyAlert,
        mutation: Mutation<Tag>,
    ) -> Result<Tag, Error> {
        let mut tx = self.pool.begin().await?;

        let mut tag = fetch_tag_for_update(&mut tx, &alert.tag_id).await?;

        if mutation(&mut tag)? {
            update_tag_row(&mut tx, &tag).await?;
        }

        sqlx::query("INSERT INTO emergency_alerts (id, tag_id, user_id, created_at, data) VALUES ($1, $2, $3, $4, $5)")
            .bind(&alert.id)
            .bind(&alert.tag_id)
            .bind(&alert.user_id)
            .bind(&alert.created_at)
            .bind(Json(alert))
            .execute(&mut tx)
            .await?;

        tx.commit().await?;

        Ok(tag)
    }

    #[tracing::instrument(skip(self))]
    async fn list_emergency_alerts(&self, tag_id: Uuid) -> Result<Vec<EmergencyAlert>, Error> {
        let rows = sqlx::query("SELECT data FROM emergency_alerts WHERE tag_id = $1 ORDER BY created_at ASC")
            .bind(&tag_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_data).collect()
    }
}
