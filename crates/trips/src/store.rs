//! # Trip Session Store
//!
//! Persists an in-progress trip under three keys: the booking snapshot, the
//! route being followed, and the current index along that route. Values are
//! JSON-encoded.
//!
//! The booking key is written last and deleted first, so its presence marks a
//! complete session. A booking found without a usable route is discarded on
//! load rather than resumed.

use anyhow::Context;
use fleet_provider::StateStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::TripKeys;
use crate::error::{Error, Result};
use crate::models::{Booking, BookingStatus, Coordinate};

/// The route a trip session follows, with the geocoded ends of the trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripRoute {
    pub path: Vec<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop: Option<Coordinate>,
}

impl TripRoute {
    #[must_use]
    pub const fn new(path: Vec<Coordinate>, pickup: Coordinate, drop: Coordinate) -> Self {
        Self { path, pickup: Some(pickup), drop: Some(drop) }
    }
}

/// A restored (or freshly started) trip session.
#[derive(Debug, Clone, PartialEq)]
pub struct TripSession {
    pub booking: Booking,
    pub route: TripRoute,
    pub index: usize,
}

/// Reads and writes trip sessions through a [`StateStore`].
#[derive(Debug, Clone)]
pub struct TripStore<S> {
    state: S,
    keys: TripKeys,
}

impl<S: StateStore> TripStore<S> {
    pub const fn new(state: S, keys: TripKeys) -> Self {
        Self { state, keys }
    }

    /// Load the persisted session, repairing or discarding partial state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the underlying store fails.
    pub async fn load(&self) -> Result<Option<TripSession>> {
        let Some(raw) = self.read(&self.keys.booking).await? else {
            return Ok(None);
        };
        let booking: Booking = match serde_json::from_slice(&raw) {
            Ok(booking) => booking,
            Err(err) => {
                warn!(error = %err, "Discarding unreadable booking snapshot");
                self.clear().await?;
                return Ok(None);
            }
        };

        // a scheduled booking is only tracked once the driver confirms it
        if booking.status == BookingStatus::Scheduled {
            debug!(booking_id = booking.id, "Persisted booking is scheduled, not resuming");
            return Ok(None);
        }

        let route = match self.read(&self.keys.route).await? {
            Some(raw) => serde_json::from_slice::<TripRoute>(&raw).ok(),
            None => None,
        };
        let Some(route) = route.filter(|r| !r.path.is_empty()) else {
            warn!(booking_id = booking.id, "Persisted booking has no usable route, discarding");
            self.clear().await?;
            return Ok(None);
        };

        let last = route.path.len() - 1;
        let stored = match self.read(&self.keys.index).await? {
            Some(raw) => serde_json::from_slice::<usize>(&raw).ok(),
            None => None,
        };
        let index = match stored {
            Some(index) if index <= last => index,
            Some(index) => {
                warn!(booking_id = booking.id, index, last, "Clamping persisted index");
                self.save_index(last).await?;
                last
            }
            None => {
                warn!(booking_id = booking.id, "Persisted index missing or unreadable, using 0");
                self.save_index(0).await?;
                0
            }
        };

        Ok(Some(TripSession { booking, route, index }))
    }

    /// Persist a new session at index 0.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty route and `StorageError` when the
    /// store fails.
    pub async fn start(&self, booking: Booking, route: TripRoute) -> Result<TripSession> {
        if route.path.is_empty() {
            return Err(crate::invalid!("cannot track booking {} on an empty route", booking.id));
        }

        self.write(&self.keys.route, &serde_json::to_vec(&route)?).await?;
        self.save_index(0).await?;
        self.write(&self.keys.booking, &serde_json::to_vec(&booking)?).await?;

        debug!(booking_id = booking.id, points = route.path.len(), "Trip session started");
        Ok(TripSession { booking, route, index: 0 })
    }

    /// Persist the current index.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the store fails.
    pub async fn save_index(&self, index: usize) -> Result<()> {
        self.write(&self.keys.index, &serde_json::to_vec(&index)?).await
    }

    /// Remove every key of the session, booking first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the store fails.
    pub async fn clear(&self) -> Result<()> {
        for key in self.keys.all() {
            self.state
                .delete(key)
                .await
                .with_context(|| format!("deleting {key}"))
                .map_err(storage)?;
        }
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.state.get(key).await.with_context(|| format!("reading {key}")).map_err(storage)
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.state
            .set(key, value)
            .await
            .with_context(|| format!("writing {key}"))
            .map_err(storage)?;
        Ok(())
    }
}

fn storage(err: anyhow::Error) -> Error {
    Error::StorageError(format!("{err:#}"))
}
