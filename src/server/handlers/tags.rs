use axum::extract::{Extension, Json, Path, Query};
use uuid::Uuid;

use super::RoleQuery;
use crate::api::{CreateTagParams, DynAPI, TagAPI};
use crate::auth::Caller;
use crate::entities::{Place, Tag};
use crate::error::Error;

pub async fn create(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Json(params): Json<CreateTagParams>,
) -> Result<Json<Tag>, Error> {
    let tag = api.create_tag(caller, params).await?;

    Ok(tag.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Tag>, Error> {
    let tag = api.find_tag(caller, id).await?;

    Ok(tag.into())
}

pub async fn find_active(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Query(query): Query<RoleQuery>,
) -> Result<Json<Option<Tag>>, Error> {
    let tag = api.find_active_tag(caller, query.role()).await?;

    Ok(tag.into())
}

pub async fn history(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Query(query): Query<RoleQuery>,
) -> Result<Json<Vec<Tag>>, Error> {
    let tags = api.list_history(caller, query.role()).await?;

    Ok(tags.into())
}

pub async fn update_destination(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(dropoff): Json<Place>,
) -> Result<Json<Tag>, Error> {
    let tag = api.update_destination(caller, id, dropoff).await?;

    Ok(tag.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Tag>, Error> {
    let tag = api.cancel_tag(caller, id).await?;

    Ok(tag.into())
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Tag>, Error> {
    let tag = api.start_trip(caller, id).await?;

    Ok(tag.into())
}
