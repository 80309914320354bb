use axum::extract::{Extension, Json, Path};
use uuid::Uuid;

use crate::api::{DynAPI, RegisterUserParams, UserAPI, UserStats};
use crate::auth::Caller;
use crate::entities::{Coordinates, User};
use crate::error::Error;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct BlockParams {
    user_id: Uuid,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Json(params): Json<RegisterUserParams>,
) -> Result<Json<User>, Error> {
    let user = api.register_user(caller, params).await?;

    Ok(user.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, Error> {
    let user = api.find_user(caller, id).await?;

    Ok(user.into())
}

pub async fn update_location(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Json(position): Json<Coordinates>,
) -> Result<Json<User>, Error> {
    let user = api.update_location(caller, position).await?;

    Ok(user.into())
}

pub async fn block(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Json(params): Json<BlockParams>,
) -> Result<Json<User>, Error> {
    let user = api.block_user(caller, params.user_id).await?;

    Ok(user.into())
}

pub async fn unblock(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, Error> {
    let user = api.unblock_user(caller, id).await?;

    Ok(user.into())
}

pub async fn stats(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
) -> Result<Json<UserStats>, Error> {
    let stats = api.user_stats(caller).await?;

    Ok(stats.into())
}
