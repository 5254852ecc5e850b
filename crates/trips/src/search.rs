//! # Search & Quote
//!
//! Resolves pickup and drop text to coordinates, then asks the backend for
//! route alternatives, matching trip offers and recommended vehicles.
//!
//! A geocoding miss aborts the search. Offers and recommendations are
//! optional extras: when they fail the quote is still returned with those
//! lists empty.

use chrono::NaiveDate;
use fleet_provider::HttpRequest;
use tracing::{debug, warn};

use crate::api::BackendClient;
use crate::error::{Error, Result};
use crate::geocode::Geocoder;
use crate::models::{Place, RouteMode, RouteOption, RouteRequest, TripOffer, Vehicle};

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub pickup: String,
    pub drop: String,
    /// Travel date for offer lookup. Defaults to today.
    pub date: Option<NaiveDate>,
    pub mode: RouteMode,
}

/// Everything a rider chooses from before booking.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub pickup: Place,
    pub drop: Place,
    pub routes: Vec<RouteOption>,
    pub offers: Vec<TripOffer>,
    pub recommendations: Vec<Vehicle>,
}

impl Quote {
    #[must_use]
    pub fn route(&self, route_id: &str) -> Option<&RouteOption> {
        self.routes.iter().find(|r| r.id == route_id)
    }

    #[must_use]
    pub fn offer(&self, trip_id: i64) -> Option<&TripOffer> {
        self.offers.iter().find(|o| o.trip.id == trip_id)
    }

    #[must_use]
    pub fn recommended(&self, vehicle_id: i64) -> Option<&Vehicle> {
        self.recommendations.iter().find(|v| v.id == vehicle_id)
    }
}

#[derive(Clone)]
pub struct Search<H> {
    geocoder: Geocoder<H>,
    client: BackendClient<H>,
}

impl<H: HttpRequest> Search<H> {
    pub const fn new(geocoder: Geocoder<H>, client: BackendClient<H>) -> Self {
        Self { geocoder, client }
    }

    /// Build a quote for `request` on behalf of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for blank locations, `LocationNotFound` when
    /// either location cannot be geocoded, and `BadGateway` when no route
    /// could be fetched.
    pub async fn quote(&self, request: &SearchRequest, user_id: i64, today: NaiveDate) -> Result<Quote> {
        if request.pickup.trim().is_empty() || request.drop.trim().is_empty() {
            return Err(crate::invalid!("pickup and drop locations are required"));
        }

        let pickup = self.resolve(&request.pickup).await?;
        let drop = self.resolve(&request.drop).await?;
        let date = request.date.unwrap_or(today);

        let route_request = RouteRequest::between(&pickup, &drop, request.mode);
        let (routes, offers, recommendations) = tokio::join!(
            self.client.optimize_route(&route_request),
            self.client.search_trips(&pickup.label, &drop.label, date),
            self.client.recommendations(user_id),
        );

        let routes: Vec<RouteOption> =
            routes?.into_iter().filter(|r| !r.path.is_empty()).collect();
        let offers = offers.unwrap_or_else(|err| {
            warn!(error = %err, "Trip offer lookup failed");
            Vec::new()
        });
        let recommendations = recommendations.unwrap_or_else(|err| {
            warn!(user_id, error = %err, "Recommendations lookup failed");
            Vec::new()
        });

        debug!(
            routes = routes.len(),
            offers = offers.len(),
            recommendations = recommendations.len(),
            "Quote ready"
        );
        Ok(Quote { pickup, drop, routes, offers: order_offers(offers), recommendations })
    }

    async fn resolve(&self, query: &str) -> Result<Place> {
        self.geocoder
            .lookup(query)
            .await?
            .ok_or_else(|| Error::LocationNotFound(format!("no match for \"{}\"", query.trim())))
    }
}

/// Online drivers first; otherwise server order is kept.
#[must_use]
pub fn order_offers(mut offers: Vec<TripOffer>) -> Vec<TripOffer> {
    offers.sort_by_key(|offer| !offer.driver_online());
    offers
}
