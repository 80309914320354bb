use axum::extract::{Extension, Json, Query};
use serde::Deserialize;

use crate::api::{DynAPI, FeedAPI, FeedEntry};
use crate::auth::Caller;
use crate::entities::Coordinates;
use crate::error::Error;

#[derive(Deserialize)]
pub struct FeedQuery {
    lat: Option<f64>,
    lng: Option<f64>,
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<FeedEntry>>, Error> {
    let position = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
        (None, None) => None,
        _ => return Err(Error::invalid_argument("lat and lng must be given together")),
    };

    let entries = api.list_open_tags(caller, position).await?;

    Ok(entries.into())
}
