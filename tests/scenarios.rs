mod support;

use std::sync::Arc;

use leylek::api::{OfferAPI, TagAPI, TripAPI, UserAPI};
use leylek::db::{Store, TagQuery};
use leylek::entities::{EndReason, OfferStatus, Place, Role, TagStatus};

use support::Harness;

#[tokio::test]
async fn passenger_accepts_a_bid_and_siblings_are_rejected() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let mehmet = h.driver("Mehmet").await;
    let ali = h.driver("Ali").await;

    let tag = h.create_tag(passenger).await.unwrap();
    assert_eq!(tag.city, "Adana");
    assert_eq!(tag.status, TagStatus::Pending);

    let winning = h.offer(mehmet, &tag, 850.0).await.unwrap();
    let losing = h.offer(ali, &tag, 900.0).await.unwrap();

    let tag = h.api.accept_offer(passenger, winning.id).await.unwrap();

    assert_eq!(tag.status, TagStatus::Matched);
    assert_eq!(tag.driver_id, Some(mehmet.id));
    assert_eq!(tag.driver_name.as_deref(), Some("Mehmet"));
    assert_eq!(tag.final_price, Some(850.0));
    assert_eq!(tag.accepted_offer_id, Some(winning.id));
    assert!(tag.matched_at.is_some());

    let stored = h.api.store().find_offer(losing.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OfferStatus::Rejected);

    let stored = h.api.store().find_offer(winning.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OfferStatus::Accepted);
}

#[tokio::test]
async fn second_bid_within_cooldown_is_rate_limited() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;
    let tag = h.create_tag(passenger).await.unwrap();

    h.offer(driver, &tag, 850.0).await.unwrap();
    h.advance(1);

    let err = h.offer(driver, &tag, 800.0).await.unwrap_err();
    assert!(err.is_rate_limited(), "{:?}", err);
}

#[tokio::test]
async fn live_bid_after_cooldown_is_a_conflict() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;
    let tag = h.create_tag(passenger).await.unwrap();

    h.offer(driver, &tag, 850.0).await.unwrap();
    h.advance(4);

    let err = h.offer(driver, &tag, 800.0).await.unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);

    // once the first bid expires the driver may bid again
    h.advance(7);
    h.offer(driver, &tag, 800.0).await.unwrap();

    let offers = h.api.list_offers(passenger, tag.id).await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].price, 800.0);
}

#[tokio::test]
async fn second_active_request_is_a_conflict() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;

    let tag = h.create_tag(passenger).await.unwrap();
    h.offer(driver, &tag, 850.0).await.unwrap();

    let tag = h.api.find_tag(passenger, tag.id).await.unwrap();
    assert_eq!(tag.status, TagStatus::OffersReceived);

    let err = h.create_tag(passenger).await.unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);
}

#[tokio::test]
async fn driver_force_end_penalizes_the_driver() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;

    let tag = h.api.start_trip(driver, tag.id).await.unwrap();
    assert_eq!(tag.status, TagStatus::InProgress);

    let end = h.api.force_end(driver, tag.id).await.unwrap();
    assert_eq!(end.tag.status, TagStatus::Completed);
    assert_eq!(end.tag.end_reason, Some(EndReason::ForceEnded { by: driver.id }));
    assert!(end.penalty_applied);
    assert_eq!(end.penalized, Some(driver.id));

    let driver_record = h.api.find_user(driver, driver.id).await.unwrap();
    let passenger_record = h.api.find_user(passenger, passenger.id).await.unwrap();

    assert_eq!(driver_record.rating, 4.0);
    assert_eq!(passenger_record.rating, 5.0);
    assert_eq!(driver_record.total_trips, 1);
    assert_eq!(passenger_record.total_trips, 1);
}

#[tokio::test]
async fn rejected_end_request_penalizes_the_requester() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;

    h.api.start_trip(driver, tag.id).await.unwrap();
    h.api.request_end(passenger, tag.id, Role::Passenger).await.unwrap();

    let pending = h.api.pending_end_request(driver, tag.id).await.unwrap();
    assert_eq!(pending.map(|r| r.requester_id), Some(passenger.id));
    assert!(h.api.pending_end_request(passenger, tag.id).await.unwrap().is_none());

    let end = h.api.respond_end(driver, tag.id, false).await.unwrap();
    assert_eq!(end.tag.status, TagStatus::Completed);
    assert_eq!(end.penalized, Some(passenger.id));

    let driver_record = h.api.find_user(driver, driver.id).await.unwrap();
    let passenger_record = h.api.find_user(passenger, passenger.id).await.unwrap();

    assert_eq!(passenger_record.rating, 4.0);
    assert_eq!(driver_record.rating, 5.0);
    assert_eq!(driver_record.total_trips, 1);
    assert_eq!(passenger_record.total_trips, 1);
}

#[tokio::test]
async fn approved_end_request_has_no_penalty() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;

    h.api.request_end(driver, tag.id, Role::Driver).await.unwrap();
    let end = h.api.respond_end(passenger, tag.id, true).await.unwrap();

    assert_eq!(end.tag.status, TagStatus::Completed);
    assert_eq!(end.tag.end_reason, Some(EndReason::MutualEnd));
    assert!(!end.penalty_applied);

    let driver_record = h.api.find_user(driver, driver.id).await.unwrap();
    assert_eq!(driver_record.rating, 5.0);
    assert_eq!(driver_record.total_trips, 1);
}

#[tokio::test]
async fn responding_without_a_request_is_not_found() {
    let h = Harness::new();
    let (passenger, _, tag) = h.matched().await;

    let err = h.api.respond_end(passenger, tag.id, true).await.unwrap_err();
    assert!(err.is_not_found(), "{:?}", err);
}

#[tokio::test]
async fn expired_offers_are_hidden_but_kept() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;
    let tag = h.create_tag(passenger).await.unwrap();

    let offer = h.offer(driver, &tag, 850.0).await.unwrap();
    h.advance(11);

    let offers = h.api.list_offers(passenger, tag.id).await.unwrap();
    assert!(offers.is_empty());

    let stored = h.api.store().list_offers(tag.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, offer.id);

    let err = h.api.accept_offer(passenger, offer.id).await.unwrap_err();
    assert!(err.is_not_found(), "{:?}", err);
}

#[tokio::test]
async fn offers_are_listed_cheapest_first() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let tag = h.create_tag(passenger).await.unwrap();

    for (name, price) in [("Mehmet", 900.0), ("Ali", 650.0), ("Veli", 720.0)] {
        let driver = h.driver(name).await;
        h.offer(driver, &tag, price).await.unwrap();
    }

    let prices: Vec<f64> = h
        .api
        .list_offers(passenger, tag.id)
        .await
        .unwrap()
        .iter()
        .map(|offer| offer.price)
        .collect();

    assert_eq!(prices, vec![650.0, 720.0, 900.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptances_match_exactly_once() {
    for _ in 0..20 {
        let h = Harness::new();
        let passenger = h.passenger().await;
        let tag = h.create_tag(passenger).await.unwrap();

        let first = h.offer(h.driver("Mehmet").await, &tag, 850.0).await.unwrap();
        let second = h.offer(h.driver("Ali").await, &tag, 800.0).await.unwrap();

        let handles: Vec<_> = [first.id, second.id]
            .into_iter()
            .map(|offer_id| {
                let api = Arc::clone(&h.api);
                tokio::spawn(async move { api.accept_offer(passenger, offer_id).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(err) => assert!(err.is_not_found(), "{:?}", err),
            }
        }
        assert_eq!(wins, 1);

        let tag = h.api.find_tag(passenger, tag.id).await.unwrap();
        assert_eq!(tag.status, TagStatus::Matched);

        let accepted: Vec<_> = h
            .api
            .store()
            .list_offers(tag.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|offer| offer.status == OfferStatus::Accepted)
            .collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(Some(accepted[0].driver_id), tag.driver_id);
    }
}

#[tokio::test]
async fn cancel_twice_is_a_no_op() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;
    let tag = h.create_tag(passenger).await.unwrap();
    let offer = h.offer(driver, &tag, 850.0).await.unwrap();

    let cancelled = h.api.cancel_tag(passenger, tag.id).await.unwrap();
    assert_eq!(cancelled.status, TagStatus::Cancelled);

    let again = h.api.cancel_tag(passenger, tag.id).await.unwrap();
    assert_eq!(again.status, TagStatus::Cancelled);
    assert_eq!(again.cancelled_at, cancelled.cancelled_at);

    let stored = h.api.store().find_offer(offer.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OfferStatus::Rejected);

    // the passenger is free to ask again
    h.create_tag(passenger).await.unwrap();
}

#[tokio::test]
async fn force_end_twice_settles_once() {
    let h = Harness::new();
    let (passenger, driver, tag) = h.matched().await;

    h.api.force_end(passenger, tag.id).await.unwrap();
    let again = h.api.force_end(passenger, tag.id).await.unwrap();

    assert_eq!(again.tag.status, TagStatus::Completed);
    assert!(!again.penalty_applied);

    let passenger_record = h.api.find_user(passenger, passenger.id).await.unwrap();
    let driver_record = h.api.find_user(driver, driver.id).await.unwrap();
    assert_eq!(passenger_record.rating, 4.0);
    assert_eq!(passenger_record.total_trips, 1);
    assert_eq!(driver_record.total_trips, 1);
}

#[tokio::test]
async fn destination_round_trips_while_open() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let tag = h.create_tag(passenger).await.unwrap();

    let dropoff = Place::new("Mezitli", 36.75, 34.53);
    h.api
        .update_destination(passenger, tag.id, dropoff.clone())
        .await
        .unwrap();

    let tag = h.api.find_tag(passenger, tag.id).await.unwrap();
    assert_eq!(tag.dropoff, dropoff);
}

#[tokio::test]
async fn destination_is_frozen_once_matched() {
    let h = Harness::new();
    let (passenger, _, tag) = h.matched().await;

    let err = h
        .api
        .update_destination(passenger, tag.id, Place::new("Mezitli", 36.75, 34.53))
        .await
        .unwrap_err();
    assert!(err.is_invalid_state(), "{:?}", err);
}

#[tokio::test]
async fn ownership_is_enforced() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let stranger = h.register("Zeynep", Role::Passenger, "Adana", None).await;
    let driver = h.driver("Mehmet").await;

    let tag = h.create_tag(passenger).await.unwrap();
    let offer = h.offer(driver, &tag, 850.0).await.unwrap();

    assert!(h.api.list_offers(stranger, tag.id).await.unwrap_err().is_forbidden());
    assert!(h.api.accept_offer(stranger, offer.id).await.unwrap_err().is_forbidden());
    assert!(h.api.cancel_tag(stranger, tag.id).await.unwrap_err().is_forbidden());
    assert!(h.api.find_tag(driver, tag.id).await.unwrap_err().is_forbidden());

    let tag = h.api.accept_offer(passenger, offer.id).await.unwrap();
    let other_driver = h.driver("Ali").await;

    assert!(h.api.start_trip(other_driver, tag.id).await.unwrap_err().is_forbidden());
    assert!(h.api.start_trip(passenger, tag.id).await.unwrap_err().is_forbidden());
    assert!(h.api.force_end(stranger, tag.id).await.unwrap_err().is_forbidden());
}

#[tokio::test]
async fn role_capabilities_are_enforced() {
    let h = Harness::new();
    let passenger = h.passenger().await;
    let driver = h.driver("Mehmet").await;

    assert!(h.create_tag(driver).await.unwrap_err().is_forbidden());

    let tag = h.create_tag(passenger).await.unwrap();
    let other_passenger = h.register("Zeynep", Role::Passenger, "Adana", None).await;
    assert!(h.offer(other_passenger, &tag, 850.0).await.unwrap_err().is_forbidden());
}

#[tokio::test]
async fn one_open_request_per_passenger_across_many_attempts() {
    let h = Harness::new();
    let passenger = h.passenger().await;

    let results = futures::future::join_all((0..5).map(|_| h.create_tag(passenger))).await;
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let mut query = TagQuery::with_statuses(&TagStatus::NON_TERMINAL);
    query.passenger_id = Some(passenger.id);
    assert_eq!(h.api.store().list_tags(query).await.unwrap().len(), 1);
}

#[tokio::test]
async fn bids_on_closed_requests_are_invalid_state() {
    let h = Harness::new();
    let (_, _, tag) = h.matched().await;
    let late = h.driver("Ali").await;

    let err = h.offer(late, &tag, 700.0).await.unwrap_err();
    assert!(err.is_invalid_state(), "{:?}", err);
}

#[tokio::test]
async fn a_driver_holds_one_trip_at_a_time() {
    let h = Harness::new();
    let driver = h.driver("Mehmet").await;

    let first_passenger = h.passenger().await;
    let second_passenger = h.passenger().await;
    let first = h.create_tag(first_passenger).await.unwrap();
    let second = h.create_tag(second_passenger).await.unwrap();

    let accepted = h.offer(driver, &first, 850.0).await.unwrap();
    let pending = h.offer(driver, &second, 900.0).await.unwrap();

    h.api.accept_offer(first_passenger, accepted.id).await.unwrap();

    let err = h.api.accept_offer(second_passenger, pending.id).await.unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);

    let second = h.api.find_tag(second_passenger, second.id).await.unwrap();
    assert_eq!(second.status, TagStatus::OffersReceived);
    assert_eq!(second.driver_id, None);

    let mut query = TagQuery::with_statuses(&TagStatus::ACTIVE);
    query.driver_id = Some(driver.id);
    let active = h.api.store().list_tags(query).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.id);

    // busy drivers cannot place new bids either
    let third_passenger = h.passenger().await;
    let third = h.create_tag(third_passenger).await.unwrap();
    let err = h.offer(driver, &third, 700.0).await.unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);

    h.api.force_end(driver, first.id).await.unwrap();
    h.offer(driver, &third, 700.0).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_never_double_book_a_driver() {
    for _ in 0..20 {
        let h = Harness::new();
        let driver = h.driver("Mehmet").await;

        let mut accepts = Vec::new();

        for _ in 0..2 {
            let passenger = h.passenger().await;
            let tag = h.create_tag(passenger).await.unwrap();
            let offer = h.offer(driver, &tag, 850.0).await.unwrap();

            let api = h.api.clone();
            accepts.push(tokio::spawn(async move {
                api.accept_offer(passenger, offer.id).await
            }));
        }

        let mut matched = 0;
        for accept in accepts {
            match accept.await.unwrap() {
                Ok(_) => matched += 1,
                Err(err) => assert!(err.is_conflict(), "{:?}", err),
            }
        }
        assert_eq!(matched, 1);

        let mut query = TagQuery::with_statuses(&TagStatus::ACTIVE);
        query.driver_id = Some(driver.id);
        assert_eq!(h.api.store().list_tags(query).await.unwrap().len(), 1);
    }
}
