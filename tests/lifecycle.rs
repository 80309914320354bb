mod support;

use std::sync::Arc;

use async_trait::async_trait;

use leylek::api::{
    EmergencyAPI, FeedAPI, RateParams, RatingAPI, RegisterUserParams, SweepAPI, SweepReport,
    TagAPI, TripAPI, UserAPI,
};
use leylek::auth::Caller;
use leylek::db::Store;
use leylek::entities::{
    Coordinates, EndReason, EstimateSource, OfferStatus, Role, RouteEstimate, TagStatus,
};
use leylek::error::Error;
use leylek::route::RouteEstimator;

use support::Harness;

struct FixedEstimator;

#[async_trait]
impl RouteEstimator for FixedEstimator {
    async fn estimate(&self, _: Coordinates, _: Coordinates) -> Result<RouteEstimate, Error> {
        Ok(RouteEstimate::road(12.5, 20.0))
    }
}

#[tokio::test]
async fn feed_shows_nearby_requests_nearest_first() {
    let h = Harness::new();
    let driver = h.driver("Mehmet").await;

    let near = h.passenger().await;
    let far = h.passenger().await;

    let near_tag = h.create_tag_at(near, (37.02, 35.02)).await.unwrap();
    let far_tag = h.create_tag_at(far, (37.15, 35.20)).await.unwrap();

    let feed = h.api.list_open_tags(driver, None).await.unwrap();
    let ids: Vec<_> = feed.iter().map(|entry| entry.tag.id).collect();

    assert_eq!(ids, vec![near_tag.id, far_tag.id]);
    assert!(feed[0].distance_km < feed[1].distance_km);
    assert_eq!(feed[0].pickup_estimate.source, EstimateSource::StraightLine);
    assert!(feed[0].trip_estimate.distance_km > 500.0);
    assert!(!feed[0].has_offered);

    h.offer(driver, &near_tag, 850.0).await.unwrap();

    let feed = h.api.list_open_tags(driver, None).await.unwrap();
    assert!(feed[0].has_offered);
    assert!(!feed[1].has_offered);
}

#[tokio::test]
async fn feed_excludes_other_cities_blocks_and_far_pickups() {
    let h = Harness::new();
    let driver = h.driver("Mehmet").await;

    let visible = h.passenger().await;
    let mersin = h.register("Elif", Role::Passenger, "Mersin", None).await;
    let blocker = h.passenger().await;
    let distant = h.passenger().await;

    let visible_tag = h.create_tag(visible).await.unwrap();
    h.create_tag(mersin).await.unwrap();
    h.create_tag(blocker).await.unwrap();
    // registered in Adana but picking up roughly 100 km north
    h.create_tag_at(distant, (37.90, 35.00)).await.unwrap();

    h.api.block_user(blocker, driver.id).await.unwrap();

    let feed = h.api.list_open_tags(driver, None).await.unwrap();
    let ids: Vec<_> = feed.iter().map(|entry| entry.tag.id).collect();

    assert_eq!(ids, vec![visible_tag.id]);
}

#[tokio::test]
async fn feed_without_a_position_is_empty() {
    let h = Harness::new();
    let driver = h.register("Mehmet", Role::Driver, "Adana", None).await;
    let passenger = h.passenger().await;
    let tag = h.create_tag(passenger).await.unwrap();

    assert!(h.api.list_open_tags(driver, None).await.unwrap().is_empty());

    let feed = h
        .api
        .list_open_tags(driver, Some(Coordinates::new(37.0, 35.0)))
        .await
        .unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].tag.id, tag.id);
}

#[tokio::test]
async fn feed_is_for_drivers_only() {
    let h = Harness::new();
    let passenger = h.passenger().await;

    let err = h.api.list_open_tags(passenger, None).await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn offers_carry_road_estimates_when_available() {
    let h = Harness::with_estimator(Arc::new(FixedEstimator));
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;
    let tag = h.create_tag(passenger).await.unwrap();

    let offer = h.offer(driver, &tag, 850.0).await.unwrap();

    assert_eq!(offer.pickup_estimate, Some(RouteEstimate::road(12.5, 20.0)));
    assert_eq!(offer.trip_estimate, Some(RouteEstimate::road(12.5, 20.0)));
    assert_eq!(offer.driver_name, "Mehmet");
    assert_eq!(offer.driver_rating, 5.0);
}

#[tokio::test]
async fn blocked_drivers_cannot_bid() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;
    let tag = h.create_tag(passenger).await.unwrap();

    h.api.block_user(driver, passenger.id).await.unwrap();
    assert!(h.offer(driver, &tag, 850.0).await.unwrap_err().is_forbidden());

    h.api.unblock_user(driver, passenger.id).await.unwrap();
    h.offer(driver, &tag, 850.0).await.unwrap();
}

#[tokio::test]
async fn rating_updates_the_running_mean_once() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;

    let params = |score| RateParams {
        rated_user_id: driver.id,
        score,
        comment: None,
    };

    let err = h.api.rate(passenger, tag.id, params(4)).await.unwrap_err();
    assert!(err.is_invalid_state(), "{:?}", err);

    h.api.request_end(driver, tag.id, Role::Driver).await.unwrap();
    h.api.respond_end(passenger, tag.id, true).await.unwrap();

    assert!(!h.api.has_rated(passenger, tag.id).await.unwrap());

    let result = h.api.rate(passenger, tag.id, params(3)).await.unwrap();
    assert_eq!(result.rating, 3.0);
    assert_eq!(result.rating_count, 1);
    assert!(h.api.has_rated(passenger, tag.id).await.unwrap());

    let err = h.api.rate(passenger, tag.id, params(5)).await.unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);

    let err = h.api.rate(passenger, tag.id, params(6)).await.unwrap_err();
    assert!(err.is_invalid_argument(), "{:?}", err);

    let err = h
        .api
        .rate(
            driver,
            tag.id,
            RateParams {
                rated_user_id: driver.id,
                score: 5,
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_forbidden(), "{:?}", err);

    let result = h
        .api
        .rate(
            driver,
            tag.id,
            RateParams {
                rated_user_id: passenger.id,
                score: 4,
                comment: Some("on time".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.rated_user_id, passenger.id);
    assert_eq!(result.rating, 4.0);
}

#[tokio::test]
async fn sweep_expires_idle_requests() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;
    let tag = h.create_tag(passenger).await.unwrap();
    let offer = h.offer(driver, &tag, 850.0).await.unwrap();

    h.advance(10);
    assert_eq!(h.api.sweep_stale_tags().await.unwrap().cancelled, 0);

    h.advance(25);
    let report = h.api.sweep_stale_tags().await.unwrap();
    assert_eq!(report.cancelled, 1);
    assert_eq!(report.failed, 0);

    let tag = h.api.find_tag(passenger, tag.id).await.unwrap();
    assert_eq!(tag.status, TagStatus::Cancelled);
    assert_eq!(tag.end_reason, Some(EndReason::Timeout));

    let stored = h.api.store().find_offer(offer.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OfferStatus::Rejected);

    // sweeping again finds nothing
    assert_eq!(h.api.sweep_stale_tags().await.unwrap(), SweepReport::default());
}

#[tokio::test]
async fn sweep_completes_abandoned_trips_without_settling() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;

    h.advance(60);
    assert_eq!(h.api.sweep_stale_tags().await.unwrap().completed, 0);

    h.advance(61);
    assert_eq!(h.api.sweep_stale_tags().await.unwrap().completed, 1);

    let tag = h.api.find_tag(driver, tag.id).await.unwrap();
    assert_eq!(tag.status, TagStatus::Completed);

    let driver_record = h.api.find_user(driver, driver.id).await.unwrap();
    let passenger_record = h.api.find_user(passenger, passenger.id).await.unwrap();
    assert_eq!(driver_record.total_trips, 0);
    assert_eq!(passenger_record.rating, 5.0);
}

#[tokio::test]
async fn active_request_and_history_by_role() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;

    let active = h.api.find_active_tag(passenger, Role::Passenger).await.unwrap();
    assert_eq!(active.map(|t| t.id), Some(tag.id));

    let active = h.api.find_active_tag(driver, Role::Driver).await.unwrap();
    assert_eq!(active.map(|t| t.id), Some(tag.id));

    assert!(h.api.list_history(driver, Role::Driver).await.unwrap().is_empty());

    h.api.force_end(driver, tag.id).await.unwrap();

    assert!(h.api.find_active_tag(passenger, Role::Passenger).await.unwrap().is_none());

    let history = h.api.list_history(driver, Role::Driver).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, tag.id);

    let history = h.api.list_history(passenger, Role::Passenger).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn users_read_and_manage_their_own_record() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;

    assert!(h.api.find_user(passenger, driver.id).await.unwrap_err().is_forbidden());

    let user = h
        .api
        .update_location(passenger, Coordinates::new(37.05, 35.05))
        .await
        .unwrap();
    assert_eq!(user.position, Some(Coordinates::new(37.05, 35.05)));

    let err = h
        .api
        .update_location(passenger, Coordinates::new(120.0, 35.0))
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    assert!(h.api.block_user(passenger, passenger.id).await.unwrap_err().is_invalid_argument());
    assert!(h
        .api
        .block_user(passenger, uuid::Uuid::new_v4())
        .await
        .unwrap_err()
        .is_not_found());

    let user = h.api.block_user(passenger, driver.id).await.unwrap();
    assert!(user.blocked.contains(&driver.id));

    let err = h
        .api
        .register_user(
            passenger,
            RegisterUserParams {
                name: "Ayşe".into(),
                roles: [Role::Passenger].into_iter().collect(),
                city: Some("Adana".into()),
                position: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn city_is_derived_from_position_when_omitted() {
    let h = Harness::new();
    let caller = Caller::new(uuid::Uuid::new_v4());

    let user = h
        .api
        .register_user(
            caller,
            RegisterUserParams {
                name: "Mehmet".into(),
                roles: [Role::Driver].into_iter().collect(),
                city: None,
                position: Some(Coordinates::new(36.99, 35.30)),
            },
        )
        .await
        .unwrap();

    assert_eq!(user.id, caller.id);
    assert_eq!(user.city, "Adana");
}

#[tokio::test]
async fn city_partition_folds_turkish_capitals() {
    let h = Harness::new();

    // İstanbul comes from the gazetteer, the driver typed it in plain ASCII
    let passenger = Caller::new(uuid::Uuid::new_v4());
    let registered = h
        .api
        .register_user(
            passenger,
            RegisterUserParams {
                name: "Ayşe".into(),
                roles: [Role::Passenger].into_iter().collect(),
                city: None,
                position: Some(Coordinates::new(41.01, 28.98)),
            },
        )
        .await
        .unwrap();
    assert_eq!(registered.city, "İstanbul");

    let tag = h.create_tag_at(passenger, (41.01, 28.98)).await.unwrap();

    for city in ["istanbul", "ISTANBUL", "İstanbul"] {
        let driver = h
            .register("Mehmet", Role::Driver, city, Some((41.02, 28.99)))
            .await;

        let feed = h.api.list_open_tags(driver, None).await.unwrap();
        let ids: Vec<_> = feed.iter().map(|entry| entry.tag.id).collect();
        assert_eq!(ids, vec![tag.id], "{}", city);
    }
}

#[tokio::test]
async fn emergency_flags_the_trip_and_logs_every_alert() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;
    let stranger = h.driver("Hakan").await;

    assert!(!tag.emergency_shared);

    let err = h.api.trigger_emergency(stranger, tag.id).await.unwrap_err();
    assert!(err.is_forbidden(), "{:?}", err);

    let raised = h.api.trigger_emergency(passenger, tag.id).await.unwrap();
    assert!(raised.emergency_shared);
    assert_eq!(raised.status, TagStatus::Matched);

    h.api.trigger_emergency(driver, tag.id).await.unwrap();

    let alerts = h.api.store().list_emergency_alerts(tag.id).await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].user_id, passenger.id);
    assert_eq!(alerts[0].location, Coordinates::new(37.00, 35.00));
    assert_eq!(alerts[1].user_id, driver.id);
    assert_eq!(alerts[1].location, Coordinates::new(37.01, 35.01));

    h.api.force_end(passenger, tag.id).await.unwrap();

    let err = h.api.trigger_emergency(passenger, tag.id).await.unwrap_err();
    assert!(err.is_invalid_state(), "{:?}", err);
}

#[tokio::test]
async fn share_link_reads_the_trip_without_a_caller() {
    let h = Harness::new();
    let (_, _, tag) = h.matched().await;

    let shared = h.api.find_shared_trip(&tag.share_token).await.unwrap();
    assert_eq!(shared.status, TagStatus::Matched);
    assert_eq!(shared.passenger_name, tag.passenger_name);
    assert_eq!(shared.driver_name, tag.driver_name);
    assert!(!shared.emergency_shared);

    let err = h.api.find_shared_trip("no-such-token").await.unwrap_err();
    assert!(err.is_not_found(), "{:?}", err);
}

#[tokio::test]
async fn stats_count_completed_trips_per_role() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;

    let stats = h.api.user_stats(driver).await.unwrap();
    assert_eq!(stats.completed_as_driver, 0);
    assert_eq!(stats.total_earned, Some(0.0));

    h.api.request_end(driver, tag.id, Role::Driver).await.unwrap();
    h.api.respond_end(passenger, tag.id, true).await.unwrap();

    let stats = h.api.user_stats(driver).await.unwrap();
    assert_eq!(stats.total_trips, 1);
    assert_eq!(stats.completed_as_driver, 1);
    assert_eq!(stats.completed_as_passenger, 0);
    assert_eq!(stats.total_earned, Some(850.0));
    assert_eq!(stats.total_spent, None);

    let stats = h.api.user_stats(passenger).await.unwrap();
    assert_eq!(stats.completed_as_passenger, 1);
    assert_eq!(stats.total_spent, Some(850.0));
    assert_eq!(stats.total_earned, None);
}
