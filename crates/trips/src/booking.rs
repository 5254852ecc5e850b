//! # Booking Confirmation
//!
//! Turns a chosen route and offer (or vehicle) into a booking request. Every
//! check runs before anything is sent.
//!
//! Fares are computed only for posted-trip offers, as price per seat times
//! passengers. A booking made directly against a vehicle carries no price;
//! the backend prices it.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::api::BookingRequest;
use crate::auth::Session;
use crate::error::Result;
use crate::models::{Booking, RouteOption, TripOffer, Vehicle};
use crate::search::Quote;

/// What is being booked.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingTarget {
    /// A seat on a trip posted by a driver.
    Offer(TripOffer),
    /// A vehicle booked directly from the live map or recommendations.
    Vehicle(Vehicle),
}

impl BookingTarget {
    #[must_use]
    pub fn vehicle_id(&self) -> Option<i64> {
        match self {
            Self::Offer(offer) => {
                offer.trip.vehicle_id.or_else(|| offer.vehicle.as_ref().map(|v| v.id))
            }
            Self::Vehicle(vehicle) => Some(vehicle.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingOptions {
    pub passengers: u32,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub duration_hours: Option<u32>,
}

impl Default for BookingOptions {
    fn default() -> Self {
        Self { passengers: 1, scheduled_start: None, duration_hours: None }
    }
}

/// How the backend took the booking.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    /// Pending or scheduled: a driver must accept before anything starts.
    AwaitingDriver(Booking),
    /// Confirmed immediately; tracking can start.
    Started(Booking),
}

impl From<Booking> for BookingOutcome {
    fn from(booking: Booking) -> Self {
        if booking.status.awaits_driver() {
            Self::AwaitingDriver(booking)
        } else {
            Self::Started(booking)
        }
    }
}

/// Fare for `passengers` seats on a posted trip.
#[must_use]
pub fn fare(offer: &TripOffer, passengers: u32) -> f64 {
    offer.trip.price_per_seat * f64::from(passengers)
}

/// Build the booking request for the current selection.
///
/// # Errors
///
/// Returns `InvalidInput` when no route or no target is selected, when the
/// passenger count is zero, or when it exceeds the seats on offer.
pub fn build_request(
    session: &Session, quote: &Quote, route: Option<&RouteOption>, target: Option<&BookingTarget>,
    options: &BookingOptions,
) -> Result<BookingRequest> {
    let (Some(route), Some(target)) = (route, target) else {
        return Err(crate::invalid!("select a route and a vehicle before booking"));
    };
    if options.passengers == 0 {
        return Err(crate::invalid!("passenger count must be at least 1"));
    }

    let mut request = BookingRequest {
        user_id: session.user_id,
        vehicle_id: target.vehicle_id(),
        start_location: quote.pickup.label.clone(),
        end_location: quote.drop.label.clone(),
        estimated_time: Some(route.duration.clone()).filter(|d| !d.is_empty()),
        route_id: Some(route.id.clone()),
        scheduled_start_time: options
            .scheduled_start
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        duration_hours: options.duration_hours,
        passenger_count: options.passengers,
        ..BookingRequest::default()
    };

    if let BookingTarget::Offer(offer) = target {
        if options.passengers > offer.trip.seats_available {
            return Err(crate::invalid!(
                "only {} seats available, requested {}",
                offer.trip.seats_available,
                options.passengers
            ));
        }
        request.trip_id = Some(offer.trip.id);
        request.driver_id = offer.trip.driver_id.or_else(|| offer.driver.as_ref().map(|d| d.id));
        request.price = Some(fare(offer, options.passengers));
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{BookingStatus, Coordinate, Place, PostedTrip, Role};

    fn session() -> Session {
        Session {
            user_id: 7,
            role: Role::Customer,
            token: "jwt".into(),
            name: "Asha".into(),
            email: "asha@example.com".into(),
        }
    }

    fn quote() -> Quote {
        Quote {
            pickup: Place { label: "MG Road".into(), coordinate: Coordinate::new(12.97, 77.6) },
            drop: Place { label: "Airport".into(), coordinate: Coordinate::new(13.2, 77.7) },
            routes: vec![route()],
            offers: vec![],
            recommendations: vec![],
        }
    }

    fn route() -> RouteOption {
        RouteOption {
            id: "r1".into(),
            duration: "24 mins".into(),
            path: vec![Coordinate::new(12.97, 77.6), Coordinate::new(13.2, 77.7)],
            ..RouteOption::default()
        }
    }

    fn offer(seats: u32) -> TripOffer {
        TripOffer {
            trip: PostedTrip {
                id: 11,
                driver_id: Some(3),
                vehicle_id: Some(5),
                seats_available: seats,
                price_per_seat: 150.0,
                ..PostedTrip::default()
            },
            driver: None,
            vehicle: None,
        }
    }

    #[test]
    fn requires_route_and_target() {
        let quote = quote();
        let options = BookingOptions::default();
        let target = BookingTarget::Offer(offer(3));

        let err = build_request(&session(), &quote, None, Some(&target), &options).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        let err = build_request(&session(), &quote, Some(&route()), None, &options).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn offer_fare_and_seats() {
        let quote = quote();
        let target = BookingTarget::Offer(offer(3));
        let scheduled = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let options =
            BookingOptions { passengers: 2, scheduled_start: Some(scheduled), duration_hours: None };

        let request =
            build_request(&session(), &quote, Some(&route()), Some(&target), &options).unwrap();
        assert_eq!(
            request,
            BookingRequest {
                user_id: 7,
                vehicle_id: Some(5),
                trip_id: Some(11),
                driver_id: Some(3),
                start_location: "MG Road".into(),
                end_location: "Airport".into(),
                price: Some(300.0),
                estimated_time: Some("24 mins".into()),
                route_id: Some("r1".into()),
                scheduled_start_time: Some("2025-01-10T09:00:00.000Z".into()),
                duration_hours: None,
                passenger_count: 2,
            }
        );

        let options = BookingOptions { passengers: 4, ..BookingOptions::default() };
        let err =
            build_request(&session(), &quote, Some(&route()), Some(&target), &options).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn vehicle_booking_is_priced_by_backend() {
        let target = BookingTarget::Vehicle(Vehicle { id: 9, ..Vehicle::default() });
        let request = build_request(
            &session(),
            &quote(),
            Some(&route()),
            Some(&target),
            &BookingOptions::default(),
        )
        .unwrap();

        assert_eq!(request.price, None);
        assert_eq!(request.vehicle_id, Some(9));
        assert_eq!(request.trip_id, None);
    }

    #[test]
    fn outcome_by_status() {
        let pending = Booking { id: 1, status: BookingStatus::Scheduled, ..Booking::default() };
        assert!(matches!(BookingOutcome::from(pending), BookingOutcome::AwaitingDriver(_)));

        let confirmed = Booking { id: 2, status: BookingStatus::Confirmed, ..Booking::default() };
        assert!(matches!(BookingOutcome::from(confirmed), BookingOutcome::Started(_)));
    }
}
