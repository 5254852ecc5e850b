#![allow(missing_docs)]


use http::Method;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use trip_lifecycle::driver::Availability;
use trip_lifecycle::follower::{Phase, Step};
use trip_lifecycle::{Booking, Coordinate, DriverView, Error};

use self::provider::{MockProvider, config, path, sign_in};

const ORIGIN: Coordinate = Coordinate { lat: 12.97, lon: 77.59 };
const DESTINATION: Coordinate = Coordinate { lat: 13.2, lon: 77.7 };

async fn driver(provider: &MockProvider, bookings: Value) -> DriverView<MockProvider> {
    let (_auth, reader) = sign_in(provider, "DRIVER").await;
    provider.respond(
        Method::GET,
        "/api/vehicles/driver/Asha",
        200,
        json!({"id": 300, "model": "Innova", "status": "Active"}),
    );
    provider.respond(Method::GET, "/api/driver/Asha/bookings", 200, bookings);

    let mut view = DriverView::new(provider.clone(), config(), &reader).expect("driver view");
    assert!(!view.restore().await.expect("restore"));
    view.check_bookings().await.expect("bookings");
    view
}

/// A driver with booking 1 confirmed and a trip route scripted.
async fn ready_to_drive(provider: &MockProvider, points: usize) -> DriverView<MockProvider> {
    let view = driver(provider, json!([{"id": 1, "status": "CONFIRMED"}])).await;
    provider.respond(Method::PUT, "/api/driver/Asha/status", 200, json!({}));
    provider.respond(
        Method::PUT,
        "/api/bookings/1/status",
        200,
        json!({"id": 1, "status": "ENROUTE", "startLocation": "MG Road", "endLocation": "Airport"}),
    );
    provider.respond(
        Method::POST,
        "/api/fleet/optimize-route",
        200,
        json!([{"id": "route-1", "path": path(points)}]),
    );
    provider.respond(Method::PUT, "/api/vehicles/300", 200, json!({}));
    view
}

#[tokio::test]
async fn splits_active_and_requests() {
    let provider = MockProvider::new();
    let view = driver(
        &provider,
        json!([
            {"id": 1, "status": "COMPLETED"},
            {"id": 2, "status": "CONFIRMED"},
            {"id": 3, "status": "PENDING"},
            {"id": 4, "status": "PENDING"},
        ]),
    )
    .await;

    let snapshot = view.snapshot();
    assert_eq!(snapshot.active.map(|b| b.id), Some(2));
    assert_eq!(snapshot.requests.iter().map(|b| b.id).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(snapshot.vehicle.map(|v| v.id), Some(300));
}

#[tokio::test]
async fn accept_conflicts_with_active_job() {
    let provider = MockProvider::new();
    let mut view = driver(
        &provider,
        json!([{"id": 1, "status": "CONFIRMED"}, {"id": 2, "status": "PENDING"}]),
    )
    .await;

    let Err(Error::Conflict(_)) = view.accept(2).await else {
        panic!("expected Conflict");
    };
    assert!(provider.requests_to(&Method::PUT, "/api/bookings/2/accept").is_empty());
}

#[tokio::test]
async fn accept_without_active_job() {
    let provider = MockProvider::new();
    let mut view = driver(&provider, json!([{"id": 2, "status": "PENDING"}])).await;
    provider.respond(
        Method::PUT,
        "/api/bookings/2/accept",
        200,
        json!({"id": 2, "status": "CONFIRMED"}),
    );

    let booking = view.accept(2).await.expect("should accept");
    assert_eq!(booking.id, 2);

    let snapshot = view.snapshot();
    assert_eq!(snapshot.active.map(|b| b.id), Some(2));
    assert!(snapshot.requests.is_empty());
}

#[tokio::test]
async fn reject_cancels_request() {
    let provider = MockProvider::new();
    let mut view = driver(&provider, json!([{"id": 2, "status": "PENDING"}])).await;
    provider.respond(
        Method::PUT,
        "/api/bookings/2/status",
        200,
        json!({"id": 2, "status": "CANCELLED"}),
    );

    view.reject(2).await.expect("should reject");
    let updates = provider.requests_to(&Method::PUT, "/api/bookings/2/status");
    assert_eq!(updates[0].body, json!({"status": "CANCELLED"}));
    assert!(view.snapshot().requests.is_empty());
}

#[tokio::test]
async fn drive_and_complete() {
    let provider = MockProvider::new();
    provider.put("activeBooking", &json!({"id": 99, "status": "CONFIRMED"}));
    let mut view = ready_to_drive(&provider, 4).await;

    view.start_trip(ORIGIN, DESTINATION).await.expect("should start");
    assert!(view.is_tripping());
    assert_eq!(provider.stored("driver:activeBooking").expect("booking")["id"], json!(1));
    assert_eq!(provider.stored("driver:currentIndex"), Some(json!(0)));

    let driver_status = provider.requests_to(&Method::PUT, "/api/driver/Asha/status");
    assert_eq!(driver_status[0].body, json!({"status": "ENROUTE"}));

    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Advanced { index: 1 });
    assert_eq!(provider.stored("driver:currentIndex"), Some(json!(1)));

    provider.respond(
        Method::PUT,
        "/api/bookings/1/status",
        200,
        json!({"id": 1, "status": "COMPLETED"}),
    );
    let booking = view.complete_trip().await.expect("should complete");
    assert_eq!(booking.id, 1);

    let statuses: Vec<Value> = provider
        .requests_to(&Method::PUT, "/api/bookings/1/status")
        .into_iter()
        .map(|r| r.body)
        .collect();
    assert_eq!(statuses, vec![json!({"status": "ENROUTE"}), json!({"status": "COMPLETED"})]);

    let vehicle = provider.requests_to(&Method::PUT, "/api/vehicles/300");
    assert_eq!(vehicle.last().map(|r| r.body.clone()), Some(json!({"status": "Active"})));

    assert_eq!(provider.stored("driver:activeBooking"), None);
    assert_eq!(provider.stored("driver:persistentRoute"), None);
    assert_eq!(provider.stored("driver:currentIndex"), None);
    assert_eq!(provider.stored("activeBooking").expect("customer booking")["id"], json!(99));

    let snapshot = view.snapshot();
    assert!(!snapshot.tripping);
    assert!(snapshot.active.is_none());
    assert_eq!(snapshot.phase, Phase::Idle);
}

#[tokio::test]
async fn arrival_keeps_trip_open() {
    let provider = MockProvider::new();
    let mut view = ready_to_drive(&provider, 2).await;
    view.start_trip(ORIGIN, DESTINATION).await.expect("should start");

    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Arrived { index: 1 });
    assert_eq!(view.on_follow_tick().await.expect("tick"), Step::Finished);

    let snapshot = view.snapshot();
    assert!(snapshot.tripping);
    assert_eq!(snapshot.active.map(|b| b.id), Some(1));
    assert!(!view.follower_running());
    assert!(provider.stored("driver:activeBooking").is_some());
}

#[tokio::test]
async fn start_requires_active_job() {
    let provider = MockProvider::new();
    let mut view = driver(&provider, json!([{"id": 2, "status": "PENDING"}])).await;

    let Err(Error::Conflict(_)) = view.start_trip(ORIGIN, DESTINATION).await else {
        panic!("expected Conflict");
    };
    assert!(provider.requests_to(&Method::PUT, "/api/driver/Asha/status").is_empty());
}

#[tokio::test]
async fn empty_route_fails_start() {
    let provider = MockProvider::new();
    let mut view = ready_to_drive(&provider, 0).await;

    let Err(Error::BadGateway(_)) = view.start_trip(ORIGIN, DESTINATION).await else {
        panic!("expected BadGateway");
    };
    assert!(!view.is_tripping());
    assert_eq!(provider.stored("driver:activeBooking"), None);
    assert!(provider.requests_to(&Method::PUT, "/api/driver/Asha/status").is_empty());
    assert!(provider.requests_to(&Method::PUT, "/api/bookings/1/status").is_empty());
}

fn bookings(value: Value) -> Vec<Booking> {
    serde_json::from_value(value).expect("bookings")
}

#[tokio::test]
async fn stale_listing_does_not_revive_completed_job() {
    let provider = MockProvider::new();
    let mut view = ready_to_drive(&provider, 3).await;
    view.start_trip(ORIGIN, DESTINATION).await.expect("should start");
    provider.respond(
        Method::PUT,
        "/api/bookings/1/status",
        200,
        json!({"id": 1, "status": "COMPLETED"}),
    );
    view.complete_trip().await.expect("should complete");

    view.apply_bookings(bookings(json!([{"id": 1, "status": "ENROUTE"}])));
    assert!(view.snapshot().active.is_none());

    view.apply_bookings(bookings(json!([
        {"id": 1, "status": "COMPLETED"},
        {"id": 5, "status": "CONFIRMED"},
    ])));
    assert_eq!(view.snapshot().active.map(|b| b.id), Some(5));
}

#[tokio::test]
async fn going_offline_updates_vehicle_and_presence() {
    let provider = MockProvider::new();
    let mut view = driver(&provider, json!([])).await;
    provider.respond(Method::PUT, "/api/vehicles/300", 200, json!({}));
    provider.respond(Method::PUT, "/api/driver/7/online-status", 200, json!({"isOnline": false}));

    view.set_availability(Availability::Offline).await.expect("should go offline");
    view.set_availability(Availability::Maintenance).await.expect("should go to maintenance");

    let vehicle: Vec<Value> = provider
        .requests_to(&Method::PUT, "/api/vehicles/300")
        .into_iter()
        .map(|r| r.body)
        .collect();
    assert_eq!(vehicle, vec![json!({"status": "Inactive"}), json!({"status": "Maintenance"})]);
    let presence: Vec<Value> = provider
        .requests_to(&Method::PUT, "/api/driver/7/online-status")
        .into_iter()
        .map(|r| r.body)
        .collect();
    assert_eq!(presence, vec![json!({"isOnline": false}), json!({"isOnline": true})]);
    assert_eq!(view.snapshot().vehicle.and_then(|v| v.status).as_deref(), Some("Maintenance"));
}

#[tokio::test]
async fn availability_requires_vehicle() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "DRIVER").await;
    let mut view = DriverView::new(provider.clone(), config(), &reader).expect("driver view");
    assert!(!view.restore().await.expect("restore"));

    let Err(Error::Conflict(_)) = view.set_availability(Availability::Online).await else {
        panic!("expected Conflict");
    };
    assert!(provider.requests_to(&Method::PUT, "/api/driver/7/online-status").is_empty());
    assert!("parked".parse::<Availability>().is_err());
    assert_eq!("Online".parse::<Availability>().ok(), Some(Availability::Online));
}

#[tokio::test]
async fn stats_load_earnings_and_reviews() {
    let provider = MockProvider::new();
    let mut view = driver(&provider, json!([])).await;
    provider.respond(
        Method::GET,
        "/api/driver/Asha/earnings",
        200,
        json!({"totalEarnings": 1250.5, "completedTrips": 4, "rating": 4.8}),
    );
    provider.respond(
        Method::GET,
        "/api/driver/Asha/reviews",
        200,
        json!([
            {"id": 9, "rating": 5, "comment": "smooth", "createdAt": "2025-03-01T08:00:00Z"},
            {"id": 8, "rating": 4},
        ]),
    );

    view.refresh_stats().await.expect("should load stats");

    let snapshot = view.snapshot();
    let earnings = snapshot.earnings.expect("earnings");
    assert_eq!(earnings.completed_trips, 4);
    assert!((earnings.total_earnings - 1250.5).abs() < f64::EPSILON);
    assert_eq!(snapshot.reviews.iter().map(|r| r.id).collect::<Vec<_>>(), vec![9, 8]);
    assert_eq!(snapshot.reviews[0].comment.as_deref(), Some("smooth"));
}

#[tokio::test]
async fn sync_reports_marker_position() {
    let provider = MockProvider::new();
    let mut view = ready_to_drive(&provider, 3).await;

    view.sync_location().await.expect("idle sync");
    assert!(provider.requests_to(&Method::PUT, "/api/vehicles/300").is_empty());

    view.start_trip(ORIGIN, DESTINATION).await.expect("should start");
    view.sync_location().await.expect("sync");

    let updates = provider.requests_to(&Method::PUT, "/api/vehicles/300");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].body, json!({"latitude": 12.97, "longitude": 77.59}));
}

#[tokio::test]
async fn resumes_after_restart() {
    let provider = MockProvider::new();
    let mut view = ready_to_drive(&provider, 4).await;
    view.start_trip(ORIGIN, DESTINATION).await.expect("should start");
    view.on_follow_tick().await.expect("tick");
    view.on_follow_tick().await.expect("tick");
    drop(view);

    let (_auth, reader) = sign_in(&provider, "DRIVER").await;
    let mut view = DriverView::new(provider.clone(), config(), &reader).expect("driver view");
    assert!(view.restore().await.expect("restore"));

    let snapshot = view.snapshot();
    assert!(snapshot.tripping);
    assert_eq!(snapshot.index, 2);
    assert_eq!(snapshot.active.map(|b| b.id), Some(1));
}

#[tokio::test]
async fn driver_view_requires_driver() {
    let provider = MockProvider::new();
    let (_auth, reader) = sign_in(&provider, "CUSTOMER").await;

    let Err(Error::Unauthorized(_)) = DriverView::new(provider.clone(), config(), &reader) else {
        panic!("expected Unauthorized");
    };
}
