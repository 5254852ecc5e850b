//! # Geocoder
//!
//! Free-text location lookup against a Nominatim-compatible search endpoint.
//! The first hit wins.

use anyhow::Context;
use fleet_provider::HttpRequest;
use http::header::{ACCEPT, USER_AGENT};
use http::{Method, Request};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Coordinate, Place};

#[derive(Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

#[derive(Clone)]
pub struct Geocoder<H> {
    http: H,
    base_url: String,
    country: String,
    user_agent: String,
}

impl<H: HttpRequest> Geocoder<H> {
    pub fn new(http: H, config: &Config) -> Self {
        Self {
            http,
            base_url: config.geocoder_url.clone(),
            country: config.geocoder_country.clone(),
            user_agent: config.geocoder_user_agent.clone(),
        }
    }

    /// Resolve `query` to a place. `Ok(None)` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `BadGateway` when the lookup itself fails.
    pub async fn lookup(&self, query: &str) -> Result<Option<Place>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let mut url = format!(
            "{}/search?format=json&q={}&limit=1",
            self.base_url,
            urlencoding::encode(query)
        );
        if !self.country.is_empty() {
            url.push_str(&format!("&countrycodes={}", urlencoding::encode(&self.country)));
        }

        let request = Request::builder()
            .method(Method::GET)
            .uri(&url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .body(Vec::new())
            .context("building geocode request")?;

        let response = self
            .http
            .fetch(request)
            .await
            .context("geocoding")
            .map_err(|e| Error::BadGateway(format!("{e:#}")))?;
        if !response.status().is_success() {
            return Err(Error::BadGateway(format!("geocoder returned {}", response.status())));
        }

        let hits: Vec<SearchHit> = serde_json::from_slice(response.body())
            .map_err(|e| Error::InvalidFormat(format!("decoding geocoder response: {e}")))?;
        let Some(hit) = hits.into_iter().next() else {
            debug!(query, "No geocoding match");
            return Ok(None);
        };

        let lat = hit.lat.parse::<f64>();
        let lon = hit.lon.parse::<f64>();
        let (Ok(lat), Ok(lon)) = (lat, lon) else {
            return Err(Error::InvalidFormat(format!(
                "geocoder returned non-numeric coordinates for {query}"
            )));
        };

        debug!(query, lat, lon, "Geocoded");
        Ok(Some(Place { label: query.to_string(), coordinate: Coordinate::new(lat, lon) }))
    }
}
