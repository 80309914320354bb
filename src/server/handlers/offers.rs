use axum::extract::{Extension, Json, Path};
use uuid::Uuid;

use crate::api::{DynAPI, OfferAPI, SubmitOfferParams};
use crate::auth::Caller;
use crate::entities::{Offer, Tag};
use crate::error::Error;

pub async fn create(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(tag_id): Path<Uuid>,
    Json(params): Json<SubmitOfferParams>,
) -> Result<Json<Offer>, Error> {
    let offer = api.submit_offer(caller, tag_id, params).await?;

    Ok(offer.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(tag_id): Path<Uuid>,
) -> Result<Json<Vec<Offer>>, Error> {
    let offers = api.list_offers(caller, tag_id).await?;

    Ok(offers.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Tag>, Error> {
    let tag = api.accept_offer(caller, id).await?;

    Ok(tag.into())
}
