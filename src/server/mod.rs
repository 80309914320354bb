mod caller;
mod handlers;

pub use caller::CALLER_HEADER;

use std::net::SocketAddr;

use axum::{
    extract::Extension,
    routing::{delete, get, patch, post},
    Router,
};

use crate::api::DynAPI;
use crate::error::{upstream_error, Error};
use crate::server::handlers::{emergency, feed, offers, ratings, tags, trips, users};

pub fn router(api: DynAPI) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(users::create))
        .route("/users/:id", get(users::find))
        .route("/me/stats", get(users::stats))
        .route("/me/location", patch(users::update_location))
        .route("/me/blocks", post(users::block))
        .route("/me/blocks/:id", delete(users::unblock))
        .route("/me/tags/active", get(tags::find_active))
        .route("/me/tags/history", get(tags::history))
        .route("/tags", post(tags::create))
        .route("/tags/:id", get(tags::find))
        .route("/tags/:id/destination", patch(tags::update_destination))
        .route("/tags/:id/cancel", patch(tags::cancel))
        .route("/tags/:id/start", patch(tags::start))
        .route("/tags/:id/offers", get(offers::list).post(offers::create))
        .route("/offers/:id/accept", patch(offers::accept))
        .route("/feed", get(feed::list))
        .route("/tags/:id/emergency", post(emergency::trigger))
        .route("/shared/:token", get(emergency::shared))
        .route(
            "/tags/:id/end/request",
            get(trips::pending_end_request).patch(trips::request_end),
        )
        .route("/tags/:id/end/respond", patch(trips::respond_end))
        .route("/tags/:id/end/force", patch(trips::force_end))
        .route("/tags/:id/ratings", post(ratings::create))
        .route("/tags/:id/ratings/mine", get(ratings::mine))
        .layer(Extension(api))
}

pub async fn serve(api: DynAPI, addr: SocketAddr) -> Result<(), Error> {
    let app = router(api);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(upstream_error)
}

async fn health() -> &'static str {
    "ok"
}
