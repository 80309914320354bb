use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{DynAPI, TripAPI, TripEnd};
use crate::auth::Caller;
use crate::entities::{EndRequest, Role, Tag};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct RequestEndParams {
    role: Role,
}

#[derive(Serialize, Deserialize)]
pub struct RespondEndParams {
    approved: bool,
}

pub async fn request_end(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(params): Json<RequestEndParams>,
) -> Result<Json<Tag>, Error> {
    let tag = api.request_end(caller, id, params.role).await?;

    Ok(tag.into())
}

pub async fn pending_end_request(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<EndRequest>>, Error> {
    let request = api.pending_end_request(caller, id).await?;

    Ok(request.into())
}

pub async fn respond_end(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(params): Json<RespondEndParams>,
) -> Result<Json<TripEnd>, Error> {
    let end = api.respond_end(caller, id, params.approved).await?;

    Ok(end.into())
}

pub async fn force_end(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TripEnd>, Error> {
    let end = api.force_end(caller, id).await?;

    Ok(end.into())
}
