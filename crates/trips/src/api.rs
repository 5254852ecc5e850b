//! # Backend Client
//!
//! Typed calls to the fleet backend. Requests carry the bearer token of the
//! current session when there is one. A non-2xx response becomes
//! `BadGateway` carrying the status and the response body.

use anyhow::Context;
use chrono::NaiveDate;
use fleet_provider::HttpRequest;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::auth::{AuthResponse, Credentials, Registration, SessionReader};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    Booking, BookingStatus, DriverReview, Earnings, Kpi, LiveVehicle, OnlineDriver, Review,
    RouteOption, RouteRequest, TripOffer, TripSuggestion, UserAccount, Vehicle,
};

/// Body of `POST /api/bookings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<i64>,
    pub start_location: String,
    pub end_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<u32>,
    pub passenger_count: u32,
}

/// Fields sent when reporting a vehicle's position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct BackendClient<H> {
    http: H,
    base_url: String,
    session: SessionReader,
}

impl<H: HttpRequest> BackendClient<H> {
    pub fn new(http: H, config: &Config, session: SessionReader) -> Self {
        Self { http, base_url: config.api_url.clone(), session }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        self.send_json(Method::POST, "/api/auth/login", credentials).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthResponse> {
        self.send_json(Method::POST, "/api/auth/register", registration).await
    }

    pub async fn logout(&self, email: &str) -> Result<()> {
        self.send(Method::POST, "/api/auth/logout", Some(&json!({ "email": email }))).await?;
        Ok(())
    }

    pub async fn optimize_route(&self, request: &RouteRequest) -> Result<Vec<RouteOption>> {
        self.send_json(Method::POST, "/api/fleet/optimize-route", request).await
    }

    pub async fn search_trips(&self, from: &str, to: &str, date: NaiveDate) -> Result<Vec<TripOffer>> {
        let path = format!(
            "/api/trips/search?from={}&to={}&date={}",
            urlencoding::encode(from),
            urlencoding::encode(to),
            date.format("%Y-%m-%d")
        );
        self.get_json(&path).await
    }

    pub async fn trip_suggestions(&self, query: Option<&str>) -> Result<Vec<TripSuggestion>> {
        let path = query.filter(|q| !q.is_empty()).map_or_else(
            || "/api/trips/recommendations".to_string(),
            |q| format!("/api/trips/recommendations?query={}", urlencoding::encode(q)),
        );
        self.get_json(&path).await
    }

    /// Vehicles recommended for a rider.
    pub async fn recommendations(&self, user_id: i64) -> Result<Vec<Vehicle>> {
        self.get_json(&format!("/api/recommendations/{user_id}")).await
    }

    pub async fn create_booking(&self, request: &BookingRequest) -> Result<Booking> {
        self.send_json(Method::POST, "/api/bookings", request).await
    }

    pub async fn bookings(&self) -> Result<Vec<Booking>> {
        self.get_json("/api/bookings").await
    }

    pub async fn user_bookings(&self, user_id: i64) -> Result<Vec<Booking>> {
        self.get_json(&format!("/api/bookings/user/{user_id}")).await
    }

    pub async fn update_booking_status(
        &self, booking_id: i64, status: BookingStatus,
    ) -> Result<Booking> {
        let body = json!({ "status": status });
        self.send_json(Method::PUT, &format!("/api/bookings/{booking_id}/status"), &body).await
    }

    pub async fn accept_booking(&self, booking_id: i64) -> Result<Booking> {
        let path = format!("/api/bookings/{booking_id}/accept");
        let bytes = self.send::<()>(Method::PUT, &path, None).await?;
        decode(&bytes, &path)
    }

    pub async fn submit_review(&self, booking_id: i64, review: &Review) -> Result<Booking> {
        self.send_json(Method::POST, &format!("/api/bookings/{booking_id}/review"), review).await
    }

    pub async fn driver_bookings(&self, driver_name: &str) -> Result<Vec<Booking>> {
        self.get_json(&format!("/api/driver/{}/bookings", urlencoding::encode(driver_name))).await
    }

    pub async fn set_driver_status(&self, driver_name: &str, status: &str) -> Result<()> {
        let path = format!("/api/driver/{}/status", urlencoding::encode(driver_name));
        self.send(Method::PUT, &path, Some(&json!({ "status": status }))).await?;
        Ok(())
    }

    /// Show or hide the driver to riders. Keyed by user id, unlike the
    /// name-keyed driver routes.
    pub async fn set_online_status(&self, driver_id: i64, online: bool) -> Result<()> {
        let path = format!("/api/driver/{driver_id}/online-status");
        self.send(Method::PUT, &path, Some(&json!({ "isOnline": online }))).await?;
        Ok(())
    }

    pub async fn driver_earnings(&self, driver_name: &str) -> Result<Earnings> {
        self.get_json(&format!("/api/driver/{}/earnings", urlencoding::encode(driver_name))).await
    }

    pub async fn driver_reviews(&self, driver_name: &str) -> Result<Vec<DriverReview>> {
        self.get_json(&format!("/api/driver/{}/reviews", urlencoding::encode(driver_name))).await
    }

    pub async fn driver_vehicle(&self, driver_name: &str) -> Result<Vehicle> {
        self.get_json(&format!("/api/vehicles/driver/{}", urlencoding::encode(driver_name))).await
    }

    pub async fn update_vehicle(&self, vehicle_id: i64, update: &VehicleUpdate) -> Result<()> {
        self.send(Method::PUT, &format!("/api/vehicles/{vehicle_id}"), Some(update)).await?;
        Ok(())
    }

    pub async fn vehicles(&self) -> Result<Vec<Vehicle>> {
        self.get_json("/api/vehicles").await
    }

    pub async fn live_vehicles(&self) -> Result<Vec<LiveVehicle>> {
        self.get_json("/api/vehicles/live").await
    }

    pub async fn kpi(&self) -> Result<Kpi> {
        self.get_json("/api/admin/kpi").await
    }

    pub async fn users(&self) -> Result<Vec<UserAccount>> {
        self.get_json("/api/admin/users").await
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<()> {
        self.send::<()>(Method::DELETE, &format!("/api/admin/users/{user_id}"), None).await?;
        Ok(())
    }

    pub async fn online_drivers(&self) -> Result<Vec<OnlineDriver>> {
        self.get_json("/api/manager/drivers/online").await
    }

    /// Block or unblock a driver account.
    pub async fn set_driver_blocked(&self, driver_id: i64, blocked: bool) -> Result<()> {
        let action = if blocked { "block" } else { "unblock" };
        let path = format!("/api/manager/drivers/{driver_id}/{action}");
        self.send::<()>(Method::PUT, &path, None).await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let bytes = self.send::<()>(Method::GET, path, None).await?;
        decode(&bytes, path)
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let bytes = self.send(method, path, Some(body)).await?;
        decode(&bytes, path)
    }

    async fn send<B: Serialize + Sync>(
        &self, method: Method, path: &str, body: Option<&B>,
    ) -> Result<Vec<u8>> {
        let url = format!("{}{path}", self.base_url);
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.session.token() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let payload = body.map(serde_json::to_vec).transpose()?.unwrap_or_default();
        let request = builder.body(payload).with_context(|| format!("building {path} request"))?;

        debug!(method = %method, path, "Backend request");
        let response = self
            .http
            .fetch(request)
            .await
            .with_context(|| format!("{method} {path}"))
            .map_err(|e| Error::BadGateway(format!("{e:#}")))?;

        let status = response.status();
        let body = response.into_body();
        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(Error::BadGateway(format!("{method} {path} returned {status}: {text}")));
        }
        Ok(body)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8], path: &str) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidFormat(format!("decoding {path} response: {e}")))
}
