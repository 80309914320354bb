use axum::extract::{Extension, Json, Path};
use uuid::Uuid;

use crate::api::{DynAPI, EmergencyAPI};
use crate::auth::Caller;
use crate::entities::{SharedTrip, Tag};
use crate::error::Error;

pub async fn trigger(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Tag>, Error> {
    let tag = api.trigger_emergency(caller, id).await?;

    Ok(tag.into())
}

pub async fn shared(
    Extension(api): Extension<DynAPI>,
    Path(token): Path<String>,
) -> Result<Json<SharedTrip>, Error> {
    let trip = api.find_shared_trip(&token).await?;

    Ok(trip.into())
}
