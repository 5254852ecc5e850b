//! # Models
//!
//! Wire shapes exchanged with the fleet backend and the geocoder, plus the
//! small value types the controllers pass around.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serde_helpers::{deserialize_option_timestamp, serialize_option_timestamp};

/// A point on a route, serialized as `[lat, lon]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.lat, c.lon]
    }
}

/// A free-text location resolved to a coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub label: String,
    pub coordinate: Coordinate,
}

/// Booking lifecycle status as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    #[default]
    Pending,
    Scheduled,
    Confirmed,
    Enroute,
    PickedUp,
    InProgress,
    Completed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl BookingStatus {
    /// Waiting on a driver to accept before anything can start.
    #[must_use]
    pub const fn awaits_driver(self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }

    /// A job a driver is currently working.
    #[must_use]
    pub const fn is_active_job(self) -> bool {
        matches!(self, Self::Confirmed | Self::Enroute | Self::PickedUp | Self::InProgress)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Scheduled => "SCHEDULED",
            Self::Confirmed => "CONFIRMED",
            Self::Enroute => "ENROUTE",
            Self::PickedUp => "PICKED_UP",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Label shown in trip history.
    #[must_use]
    pub const fn history_label(self) -> &'static str {
        match self {
            Self::Pending | Self::Scheduled => "Awaiting driver",
            Self::Confirmed => "Driver assigned",
            Self::Enroute | Self::PickedUp | Self::InProgress => "On the way",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Unknown => "Unknown",
        }
    }
}

impl Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User reference embedded in a booking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Vehicle as held in the fleet directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_plate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_recommended: Option<bool>,
}

/// A ride request or confirmed trip, owned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<Vehicle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<i64>,
    #[serde(default)]
    pub start_location: String,
    #[serde(default)]
    pub end_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_coords: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_coords: Option<Coordinate>,
    #[serde(
        default,
        deserialize_with = "deserialize_option_timestamp",
        serialize_with = "serialize_option_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub scheduled_start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "deserialize_option_timestamp",
        serialize_with = "serialize_option_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "deserialize_option_timestamp",
        serialize_with = "serialize_option_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

/// One alternative returned by route optimization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOption {
    pub id: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub distance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_status: Option<String>,
    #[serde(default)]
    pub path: Vec<Coordinate>,
}

/// Optimization goal sent with a route request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    #[default]
    Fastest,
    Eco,
    Traffic,
}

impl FromStr for RouteMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fastest" => Ok(Self::Fastest),
            "eco" => Ok(Self::Eco),
            "traffic" => Ok(Self::Traffic),
            other => Err(crate::invalid!("unknown route mode: {}", other)),
        }
    }
}

/// Body of `POST /api/fleet/optimize-route`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub start_location: String,
    pub end_location: String,
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_lat: f64,
    pub end_lng: f64,
    pub optimization_mode: RouteMode,
}

impl RouteRequest {
    #[must_use]
    pub fn between(pickup: &Place, drop: &Place, mode: RouteMode) -> Self {
        Self {
            start_location: pickup.label.clone(),
            end_location: drop.label.clone(),
            start_lat: pickup.coordinate.lat,
            start_lng: pickup.coordinate.lon,
            end_lat: drop.coordinate.lat,
            end_lng: drop.coordinate.lon,
            optimization_mode: mode,
        }
    }
}

/// A trip posted by a driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedTrip {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<i64>,
    #[serde(default)]
    pub from_location: String,
    #[serde(default)]
    pub to_location: String,
    #[serde(
        default,
        deserialize_with = "deserialize_option_timestamp",
        serialize_with = "serialize_option_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seats_available: u32,
    #[serde(default)]
    pub price_per_seat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Driver details attached to an offer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_online: bool,
}

/// A bookable `{trip, driver, vehicle}` match from trip search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripOffer {
    pub trip: PostedTrip,
    #[serde(default)]
    pub driver: Option<Driver>,
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
}

impl TripOffer {
    #[must_use]
    pub fn driver_online(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| d.is_online)
    }
}

/// Position of a vehicle on the live map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveVehicle {
    pub id: i64,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub number_plate: Option<String>,
    #[serde(default)]
    pub driver_contact: Option<String>,
    #[serde(default)]
    pub driver_rating: Option<f64>,
    #[serde(default)]
    pub seats: u32,
}

/// `{lat, lng}` as used by trip suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Canned pickup/drop pair offered as a search shortcut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSuggestion {
    pub label: String,
    pub start_location: String,
    pub end_location: String,
    #[serde(default)]
    pub start_coords: Option<LatLng>,
    #[serde(default)]
    pub end_coords: Option<LatLng>,
}

/// Fleet-wide figures for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    #[serde(default)]
    pub total_vehicles: u64,
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub active_trips: u64,
    #[serde(default)]
    pub revenue_today: f64,
    #[serde(default)]
    pub utilization: f64,
    #[serde(default)]
    pub drivers: u64,
}

/// Account as listed by the admin directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_blocked: Option<bool>,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub current_lat: Option<f64>,
    #[serde(default)]
    pub current_lng: Option<f64>,
    #[serde(default)]
    pub vehicle_id: Option<i64>,
}

/// Totals shown on the driver's earnings panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Earnings {
    #[serde(default)]
    pub total_earnings: f64,
    #[serde(default)]
    pub completed_trips: u64,
    #[serde(default)]
    pub rating: Option<f64>,
}

/// A rider review received by a driver's vehicle, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverReview {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub booking_id: Option<i64>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_option_timestamp",
        serialize_with = "serialize_option_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// An online driver with the vehicle and trip they are offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineDriver {
    pub driver: UserAccount,
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
    #[serde(default)]
    pub trip: Option<PostedTrip>,
}

/// Account role. Parsed case-insensitively; written upper-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Role {
    Admin,
    Manager,
    Customer,
    Driver,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Manager => "MANAGER",
            Self::Customer => "CUSTOMER",
            Self::Driver => "DRIVER",
        }
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "MANAGER" => Ok(Self::Manager),
            "CUSTOMER" => Ok(Self::Customer),
            "DRIVER" => Ok(Self::Driver),
            other => Err(crate::invalid!("unknown role: {}", other)),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rider feedback for a finished trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub rating: u8,
    pub comment: String,
}

impl Review {
    /// Build a review, checking the rating is between 1 and 5.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a rating outside `1..=5`.
    pub fn new(rating: u8, comment: impl Into<String>) -> crate::Result<Self> {
        if !(1..=5).contains(&rating) {
            return Err(crate::invalid!("rating must be between 1 and 5, got {}", rating));
        }
        Ok(Self { rating, comment: comment.into() })
    }
}
