#![allow(missing_docs)]


use chrono::{Duration, Local, TimeZone, Utc};
use http::Method;
use pretty_assertions::assert_eq;
use serde_json::json;
use trip_lifecycle::booking::{BookingOptions, BookingOutcome};
use trip_lifecycle::customer::ViewMode;
use trip_lifecycle::follower::{Phase, Step};
use trip_lifecycle::search::SearchRequest;
use trip_lifecycle::{CustomerView, Error};

use self::provider::{MockProvider, config, offer, path, script_search, sign_in};

fn request() -> SearchRequest {
    SearchRequest {
        pickup: "MG Road".to_string(),
        drop: "Airport".to_string(),
        ..SearchRequest::default()
    }
}

fn confirmed(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "status": "CONFIRMED",
        "startLocation": "MG Road",
        "endLocation": "Airport",
        "tripId": 11,
    })
}

/// A view that has searched, selected route-1 and offer 11, and confirmed.
async fn tracking(provider: &MockProvider, points: usize) -> CustomerView<MockProvider> {
    let (_auth, reader) = sign_in(provider, "CUSTOMER").await;
    script_search(provider, points, json!([offer(11, true)]));
    provider.respond(Method::POST, "/api/bookings", 200, confirmed(42));

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    view.search(&request()).await.expect("should search");
    view.select_route("route-1").expect("route selected");
    view.select_offer(11).expect("offer selected");

    let options = BookingOptions { passengers: 2, ..BookingOptions::default() };
    let outcome = view.confirm(&options).await.expect("should confirm");
    assert!(matches!(outcome, BookingOutcome::Started(_)));
    view
}

#[tokio::test]
async fn confirm_persists_session() {
    let provider = MockProvider::new();
    let view = tracking(&provider, 5).await;

    let posted = provider.requests_to(&Method::POST, "/api/bookings");
    assert_eq!(posted.len(), 1);
    let body = &posted[0].body;
    assert_eq!(body["price"], json!(300.0));
    assert_eq!(body["passengerCount"], json!(2));
    assert_eq!(body["tripId"], json!(11));
    assert_eq!(body["userId"], json!(7));

    assert_eq!(provider.stored("activeBooking").expect("booking")["id"], json!(42));
    assert_eq!(provider.stored("currentIndex"), Some(json!(0)));
    let route = provider.stored("persistentRoute").expect("route");
    assert_eq!(route["path"].as_array().map(Vec::len), Some(5));
    // geocoded ends, not the last path point
    assert_eq!(route["pickup"], json!([12.97, 77.59]));
    assert_eq!(route["drop"], json!([12.97, 77.59]));
    assert_ne!(route["path"][4], route["drop"]);

    let snapshot = view.snapshot();
    assert_eq!(snapshot.mode, ViewMode::Tracking);
    assert_eq!(snapshot.phase, Phase::Following);
    assert_eq!(snapshot.index, 0);
    assert_eq!(snapshot.path_len, 5);
    assert!(snapshot.quote.is_none());
}

#[tokio::test]
async fn follow_to_arrival() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 5).await;

    for expected in 1..4 {
        let step = view.on_follow_tick().await.expect("tick");
        assert_eq!(step, Step::Advanced { index: expected });
        assert_eq!(provider.stored("currentIndex"), Some(json!(expected)));
        assert!(!view.snapshot().review_prompt);
    }

    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Arrived { index: 4 });
    assert_eq!(provider.stored("currentIndex"), Some(json!(4)));
    let snapshot = view.snapshot();
    assert_eq!(snapshot.phase, Phase::Completed);
    assert!(snapshot.review_prompt);
    assert!(snapshot.position.is_some());

    // arrival is reported once
    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Finished);
    assert_eq!(provider.stored("currentIndex"), Some(json!(4)));
}

#[tokio::test]
async fn scheduled_start_gates_movement() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    script_search(&provider, 3, json!([offer(11, true)]));

    let mut booking = confirmed(43);
    booking["scheduledStartTime"] = json!("2025-03-01T10:00:00.000Z");
    provider.respond(Method::POST, "/api/bookings", 200, booking);

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    view.search(&request()).await.expect("should search");
    view.select_route("route-1").expect("route selected");
    view.select_offer(11).expect("offer selected");
    view.confirm(&BookingOptions::default()).await.expect("should confirm");

    let starts_at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::hours(1);
    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Waiting { starts_at });
    assert_eq!(view.snapshot().index, 0);
    assert_eq!(provider.stored("currentIndex"), Some(json!(0)));

    provider.set_now(starts_at);
    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Advanced { index: 1 });
}

#[tokio::test]
async fn zone_less_start_is_local_time() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    script_search(&provider, 3, json!([offer(11, true)]));

    let starts_at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
    let local = starts_at.with_timezone(&Local).naive_local();
    let mut booking = confirmed(44);
    booking["scheduledStartTime"] = json!(local.format("%Y-%m-%dT%H:%M:%S").to_string());
    provider.respond(Method::POST, "/api/bookings", 200, booking);

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    view.search(&request()).await.expect("should search");
    view.select_route("route-1").expect("route selected");
    view.select_offer(11).expect("offer selected");
    view.confirm(&BookingOptions::default()).await.expect("should confirm");

    provider.set_now(starts_at - Duration::minutes(1));
    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Waiting { starts_at });
    provider.set_now(starts_at);
    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Advanced { index: 1 });
}

#[tokio::test]
async fn arrival_prompts_review_when_index_write_fails() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 2).await;
    provider.fail_writes("currentIndex");

    let Err(Error::StorageError(message)) = view.on_follow_tick().await else {
        panic!("expected StorageError");
    };
    assert!(message.contains("currentIndex"), "{message}");

    let snapshot = view.snapshot();
    assert_eq!(snapshot.phase, Phase::Completed);
    assert!(snapshot.review_prompt);
    assert!(!view.elapsed_running());
    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Finished);

    provider.respond(
        Method::POST,
        "/api/bookings/42/review",
        200,
        json!({"id": 42, "status": "COMPLETED"}),
    );
    view.submit_review(4, "").await.expect("should review");
    assert_eq!(provider.stored("activeBooking"), None);
}

#[tokio::test]
async fn search_while_tracking_keeps_trip_view() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 5).await;

    view.search(&request()).await.expect("should search");

    let snapshot = view.snapshot();
    assert_eq!(snapshot.mode, ViewMode::Tracking);
    assert!(snapshot.quote.is_some());
    assert_eq!(snapshot.booking.map(|b| b.id), Some(42));
}

#[tokio::test]
async fn restore_is_idempotent() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 5).await;
    view.on_follow_tick().await.expect("tick");
    view.on_follow_tick().await.expect("tick");
    drop(view);

    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    for _ in 0..2 {
        let mut view =
            CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
        assert!(view.restore().await.expect("restore"));

        let snapshot = view.snapshot();
        assert_eq!(snapshot.mode, ViewMode::Tracking);
        assert_eq!(snapshot.index, 2);
        assert_eq!(snapshot.booking.map(|b| b.id), Some(42));
        assert!(!snapshot.review_prompt);
    }
    assert_eq!(provider.stored("currentIndex"), Some(json!(2)));
}

#[tokio::test]
async fn restore_at_end_prompts_review() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    provider.put("activeBooking", &confirmed(42));
    provider.put("persistentRoute", &json!({"path": path(3)}));
    provider.put("currentIndex", &json!(2));

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    assert!(view.restore().await.expect("restore"));

    let snapshot = view.snapshot();
    assert_eq!(snapshot.phase, Phase::Completed);
    assert!(snapshot.review_prompt);
}

#[tokio::test]
async fn review_clears_session() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 2).await;
    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Arrived { index: 1 });

    provider.respond(
        Method::POST,
        "/api/bookings/42/review",
        200,
        json!({"id": 42, "status": "COMPLETED"}),
    );
    view.submit_review(5, "smooth ride").await.expect("should submit review");

    let reviews = provider.requests_to(&Method::POST, "/api/bookings/42/review");
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].body["rating"], json!(5));
    assert_eq!(reviews[0].body["comment"], json!("smooth ride"));

    assert_eq!(provider.stored("activeBooking"), None);
    assert_eq!(provider.stored("persistentRoute"), None);
    assert_eq!(provider.stored("currentIndex"), None);

    let snapshot = view.snapshot();
    assert_eq!(snapshot.mode, ViewMode::Search);
    assert_eq!(snapshot.phase, Phase::Idle);
    assert!(!snapshot.review_prompt);
    assert!(!view.is_tracking());
}

#[tokio::test]
async fn failed_review_keeps_session() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 2).await;
    view.on_follow_tick().await.expect("tick");

    provider.respond(Method::POST, "/api/bookings/42/review", 500, json!({"error": "down"}));
    let Err(Error::BadGateway(_)) = view.submit_review(4, "").await else {
        panic!("expected BadGateway");
    };

    assert!(provider.stored("activeBooking").is_some());
    assert_eq!(provider.stored("currentIndex"), Some(json!(1)));
    assert!(view.snapshot().review_prompt);
}

#[tokio::test]
async fn review_before_arrival_conflicts() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 5).await;

    let Err(Error::Conflict(_)) = view.submit_review(5, "").await else {
        panic!("expected Conflict");
    };
    assert!(provider.requests_to(&Method::POST, "/api/bookings/42/review").is_empty());
}

#[tokio::test]
async fn confirm_without_selection() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    script_search(&provider, 5, json!([offer(11, true)]));

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    view.search(&request()).await.expect("should search");
    view.select_route("route-1").expect("route selected");

    let Err(Error::InvalidInput(_)) = view.confirm(&BookingOptions::default()).await else {
        panic!("expected InvalidInput");
    };
    assert!(provider.requests_to(&Method::POST, "/api/bookings").is_empty());
    assert_eq!(provider.stored("activeBooking"), None);
}

#[tokio::test]
async fn pending_booking_goes_to_history() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    script_search(&provider, 5, json!([offer(11, true)]));
    provider.respond(Method::POST, "/api/bookings", 200, json!({"id": 50, "status": "PENDING"}));
    provider.respond(
        Method::GET,
        "/api/bookings/user/7",
        200,
        json!([{"id": 12, "status": "COMPLETED"}, {"id": 50, "status": "PENDING"}]),
    );

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    view.search(&request()).await.expect("should search");
    view.select_route("route-1").expect("route selected");
    view.select_offer(11).expect("offer selected");

    let outcome = view.confirm(&BookingOptions::default()).await.expect("should confirm");
    assert!(matches!(outcome, BookingOutcome::AwaitingDriver(_)));

    assert_eq!(provider.requests_to(&Method::GET, "/api/bookings/user/7").len(), 1);
    let snapshot = view.snapshot();
    assert_eq!(snapshot.mode, ViewMode::History);
    assert_eq!(snapshot.history.iter().map(|b| b.id).collect::<Vec<_>>(), vec![50, 12]);
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(provider.stored("activeBooking"), None);
}

#[tokio::test]
async fn out_of_range_index_is_clamped() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    provider.put("activeBooking", &confirmed(42));
    provider.put("persistentRoute", &json!({"path": path(4)}));
    provider.put("currentIndex", &json!(9));

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    assert!(view.restore().await.expect("restore"));
    assert_eq!(view.snapshot().index, 3);
    assert_eq!(provider.stored("currentIndex"), Some(json!(3)));
}

#[tokio::test]
async fn unreadable_index_restarts() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    provider.put("activeBooking", &confirmed(42));
    provider.put("persistentRoute", &json!({"path": path(4)}));
    provider.put_raw("currentIndex", b"not-a-number");

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    assert!(view.restore().await.expect("restore"));
    assert_eq!(view.snapshot().index, 0);
    assert_eq!(provider.stored("currentIndex"), Some(json!(0)));
}

#[tokio::test]
async fn booking_without_route_is_discarded() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    provider.put("activeBooking", &confirmed(42));
    provider.put("currentIndex", &json!(1));

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    assert!(!view.restore().await.expect("restore"));
    assert_eq!(provider.stored("activeBooking"), None);
    assert_eq!(provider.stored("currentIndex"), None);
    assert_eq!(view.snapshot().mode, ViewMode::Search);
}

#[tokio::test]
async fn scheduled_booking_not_resumed() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;
    provider.put("activeBooking", &json!({"id": 42, "status": "SCHEDULED"}));
    provider.put("persistentRoute", &json!({"path": path(4)}));

    let mut view = CustomerView::new(provider.clone(), config(), &reader).expect("customer view");
    assert!(!view.restore().await.expect("restore"));
    assert!(!view.is_tracking());
    assert!(provider.stored("activeBooking").is_some());
}

#[tokio::test]
async fn customer_view_requires_customer() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "DRIVER").await;

    let Err(Error::Unauthorized(_)) = CustomerView::new(provider.clone(), config(), &reader) else {
        panic!("expected Unauthorized");
    };
}

#[tokio::test]
async fn elapsed_stops_at_review() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 2).await;

    view.on_elapsed_tick();
    view.on_elapsed_tick();
    assert_eq!(view.snapshot().elapsed_secs, 2);

    view.on_follow_tick().await.expect("tick");
    assert!(!view.elapsed_running());
    view.on_elapsed_tick();
    assert_eq!(view.snapshot().elapsed_secs, 2);
}

#[tokio::test]
async fn second_booking_conflicts() {
    let provider = MockProvider::new();
    let mut view = tracking(&provider, 5).await;
    provider.clear_requests();

    view.search(&request()).await.expect("should search");
    view.select_route("route-1").expect("route selected");
    view.select_offer(11).expect("offer selected");
    let Err(Error::Conflict(_)) = view.confirm(&BookingOptions::default()).await else {
        panic!("expected Conflict");
    };
    assert!(provider.requests_to(&Method::POST, "/api/bookings").is_empty());
}
