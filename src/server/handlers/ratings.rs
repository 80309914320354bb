use axum::extract::{Extension, Json, Path};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{DynAPI, RateParams, RatingAPI, RatingResult};
use crate::auth::Caller;
use crate::error::Error;

pub async fn create(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(tag_id): Path<Uuid>,
    Json(params): Json<RateParams>,
) -> Result<Json<RatingResult>, Error> {
    let result = api.rate(caller, tag_id, params).await?;

    Ok(result.into())
}

pub async fn mine(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(tag_id): Path<Uuid>,
) -> Result<Json<Value>, Error> {
    let rated = api.has_rated(caller, tag_id).await?;

    Ok(Json(json!({ "rated": rated })))
}
