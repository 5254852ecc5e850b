//! # Driver View
//!
//! Driver-side job handling: watch assigned bookings, accept or reject
//! requests, drive the active job along its route, and mark it complete.
//!
//! Only one job can be active at a time. Completing a trip does not depend on
//! how far the marker has moved.

use std::collections::HashSet;
use std::fmt::{self, Display};
use std::str::FromStr;

use fleet_provider::{Clock, Provider};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::{BackendClient, VehicleUpdate};
use crate::auth::{Session, SessionReader};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::follower::{PathFollower, Phase, Step};
use crate::models::{
    Booking, BookingStatus, Coordinate, DriverReview, Earnings, Role, RouteMode, RouteRequest,
    Vehicle,
};
use crate::polling::{Poller, next_update, ticker};
use crate::store::{TripRoute, TripStore};

const STATUS_ENROUTE: &str = "ENROUTE";
const VEHICLE_ACTIVE: &str = "Active";

/// Availability the driver advertises to riders and managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Online,
    Maintenance,
    Offline,
}

impl Availability {
    /// Vehicle status written to the fleet directory.
    #[must_use]
    pub const fn vehicle_status(self) -> &'static str {
        match self {
            Self::Online => VEHICLE_ACTIVE,
            Self::Maintenance => "Maintenance",
            Self::Offline => "Inactive",
        }
    }

    /// Whether riders see the driver as online. A vehicle in maintenance
    /// keeps its driver online.
    #[must_use]
    pub const fn is_online(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl FromStr for Availability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "maintenance" => Ok(Self::Maintenance),
            "offline" => Ok(Self::Offline),
            other => Err(crate::invalid!("unknown availability: {}", other)),
        }
    }
}

impl Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Maintenance => "maintenance",
            Self::Offline => "offline",
        })
    }
}

/// Render state of the driver view.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSnapshot {
    pub vehicle: Option<Vehicle>,
    pub active: Option<Booking>,
    pub requests: Vec<Booking>,
    pub tripping: bool,
    pub phase: Phase,
    pub position: Option<Coordinate>,
    pub index: usize,
    pub path_len: usize,
    pub earnings: Option<Earnings>,
    pub reviews: Vec<DriverReview>,
    pub notice: Option<String>,
}

/// Driver actions accepted by [`run`].
#[derive(Debug, Clone)]
pub enum DriverCommand {
    Refresh,
    Accept(i64),
    Reject(i64),
    StartTrip { origin: Coordinate, destination: Coordinate },
    Complete,
    SetAvailability(Availability),
    Stats,
}

pub struct DriverView<P: Provider> {
    provider: P,
    config: Config,
    session: Session,
    client: BackendClient<P>,
    store: TripStore<P>,
    vehicle: Option<Vehicle>,
    active: Option<Booking>,
    requests: Vec<Booking>,
    follower: PathFollower,
    tripping: bool,
    // completed locally; ignored until the backend stops reporting them active
    completed: HashSet<i64>,
    earnings: Option<Earnings>,
    reviews: Vec<DriverReview>,
    notice: Option<String>,
}

impl<P: Provider> DriverView<P> {
    /// Open the view for the signed-in driver.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` unless a driver is signed in.
    pub fn new(provider: P, config: Config, reader: &SessionReader) -> Result<Self> {
        let session = reader.require(Role::Driver)?;
        let client = BackendClient::new(provider.clone(), &config, reader.clone());
        let store = TripStore::new(provider.clone(), config.driver_keys());

        Ok(Self {
            provider,
            config,
            session,
            client,
            store,
            vehicle: None,
            active: None,
            requests: Vec::new(),
            follower: PathFollower::idle(),
            tripping: false,
            completed: HashSet::new(),
            earnings: None,
            reviews: Vec::new(),
            notice: None,
        })
    }

    /// Load the driver's vehicle and resume a trip in progress.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the session store fails.
    pub async fn restore(&mut self) -> Result<bool> {
        match self.client.driver_vehicle(&self.session.name).await {
            Ok(vehicle) => self.vehicle = Some(vehicle),
            Err(err) => warn!(driver = %self.session.name, error = %err, "No vehicle for driver"),
        }

        let Some(session) = self.store.load().await? else {
            return Ok(false);
        };
        info!(booking_id = session.booking.id, index = session.index, "Resuming drive");
        self.follower = PathFollower::resume(
            session.route.path,
            session.index,
            session.booking.scheduled_start_time,
        );
        self.active = Some(session.booking);
        self.tripping = true;
        Ok(true)
    }

    /// Split the driver's bookings into the active job and pending requests.
    ///
    /// A job completed by this view is not picked up again from a listing
    /// that still shows it active.
    pub fn apply_bookings(&mut self, bookings: Vec<Booking>) {
        let working =
            |b: &Booking| matches!(b.status, BookingStatus::Confirmed | BookingStatus::Enroute);
        self.completed.retain(|id| bookings.iter().any(|b| b.id == *id && working(b)));
        let current = bookings
            .iter()
            .find(|b| working(b) && !self.completed.contains(&b.id))
            .cloned();
        if !self.tripping {
            self.active = current;
        }
        self.requests = bookings.into_iter().filter(|b| b.status == BookingStatus::Pending).collect();
    }

    /// # Errors
    ///
    /// Returns `BadGateway` when the backend call fails.
    pub async fn check_bookings(&mut self) -> Result<()> {
        let bookings = self.client.driver_bookings(&self.session.name).await?;
        self.apply_bookings(bookings);
        Ok(())
    }

    /// Accept a pending request.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` while another job is active.
    pub async fn accept(&mut self, booking_id: i64) -> Result<Booking> {
        if let Some(active) = &self.active {
            return Err(crate::conflict!(
                "complete booking {} before accepting another",
                active.id
            ));
        }
        let booking = self.client.accept_booking(booking_id).await?;
        info!(booking_id, "Booking accepted");

        self.requests.retain(|b| b.id != booking_id);
        self.active = Some(booking.clone());
        Ok(booking)
    }

    /// # Errors
    ///
    /// Returns `BadGateway` when the backend call fails.
    pub async fn reject(&mut self, booking_id: i64) -> Result<()> {
        self.client.update_booking_status(booking_id, BookingStatus::Cancelled).await?;
        info!(booking_id, "Booking rejected");
        self.requests.retain(|b| b.id != booking_id);
        Ok(())
    }

    /// Fetch a route for the active job, mark it en route and start
    /// following it. Nothing is marked en route when no route comes back.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` without an active job or while already driving, and
    /// `BadGateway` when no route comes back.
    pub async fn start_trip(&mut self, origin: Coordinate, destination: Coordinate) -> Result<()> {
        if self.tripping {
            return Err(crate::conflict!("trip already started"));
        }
        let Some(active) = self.active.clone() else {
            return Err(crate::conflict!("no active job to start"));
        };

        let request = RouteRequest {
            start_location: active.start_location.clone(),
            end_location: active.end_location.clone(),
            start_lat: origin.lat,
            start_lng: origin.lon,
            end_lat: destination.lat,
            end_lng: destination.lon,
            optimization_mode: RouteMode::Fastest,
        };
        let route = self
            .client
            .optimize_route(&request)
            .await?
            .into_iter()
            .find(|r| !r.path.is_empty())
            .ok_or_else(|| Error::BadGateway("no route returned for trip".to_string()))?;

        self.client.set_driver_status(&self.session.name, STATUS_ENROUTE).await?;
        let mut booking =
            self.client.update_booking_status(active.id, BookingStatus::Enroute).await?;

        booking.start_coords.get_or_insert(origin);
        booking.end_coords.get_or_insert(destination);
        let starts_at = booking.scheduled_start_time;
        let trip_route = TripRoute::new(route.path, origin, destination);
        let session = self.store.start(booking, trip_route).await?;

        info!(booking_id = session.booking.id, points = session.route.path.len(), "Trip started");
        self.follower = PathFollower::resume(session.route.path, 0, starts_at);
        self.active = Some(session.booking);
        self.tripping = true;
        Ok(())
    }

    /// Advance the marker one point and persist the new index. Arriving does
    /// not finish the job; the driver completes it explicitly.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the index cannot be persisted.
    pub async fn on_follow_tick(&mut self) -> Result<Step> {
        let step = self.follower.step(self.provider.now_utc());
        if let Some(index) = step.moved() {
            self.store.save_index(index).await?;
        }
        if let Step::Arrived { index } = step {
            info!(booking_id = self.active.as_ref().map(|b| b.id), index, "Reached destination");
        }
        Ok(step)
    }

    /// Report the current marker position as the vehicle's location.
    ///
    /// # Errors
    ///
    /// Returns `BadGateway` when the backend call fails.
    pub async fn sync_location(&self) -> Result<()> {
        let (Some(vehicle), Some(position)) = (&self.vehicle, self.follower.position()) else {
            return Ok(());
        };
        if !self.tripping {
            return Ok(());
        }
        let update = VehicleUpdate {
            latitude: Some(position.lat),
            longitude: Some(position.lon),
            ..VehicleUpdate::default()
        };
        self.client.update_vehicle(vehicle.id, &update).await
    }

    /// Finish the active job wherever the marker is.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` without an active job.
    pub async fn complete_trip(&mut self) -> Result<Booking> {
        let Some(active) = &self.active else {
            return Err(crate::conflict!("no active job to complete"));
        };
        let booking = self.client.update_booking_status(active.id, BookingStatus::Completed).await?;
        self.store.clear().await?;

        info!(booking_id = booking.id, index = self.follower.index(), "Trip completed");
        self.completed.insert(booking.id);
        self.active = None;
        self.follower.reset();
        self.tripping = false;

        if let Some(vehicle) = &mut self.vehicle {
            let update =
                VehicleUpdate { status: Some(VEHICLE_ACTIVE.to_string()), ..VehicleUpdate::default() };
            match self.client.update_vehicle(vehicle.id, &update).await {
                Ok(()) => vehicle.status = Some(VEHICLE_ACTIVE.to_string()),
                Err(err) => warn!(vehicle_id = vehicle.id, error = %err, "Vehicle status reset failed"),
            }
        }
        Ok(booking)
    }

    /// Advertise the driver as online, offline or in maintenance.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the driver has no vehicle and `BadGateway`
    /// when the backend call fails.
    pub async fn set_availability(&mut self, availability: Availability) -> Result<()> {
        let Some(vehicle) = &mut self.vehicle else {
            return Err(crate::conflict!("register a vehicle before going {}", availability));
        };
        let status = availability.vehicle_status().to_string();
        let update = VehicleUpdate { status: Some(status.clone()), ..VehicleUpdate::default() };
        self.client.update_vehicle(vehicle.id, &update).await?;
        vehicle.status = Some(status);

        self.client.set_online_status(self.session.user_id, availability.is_online()).await?;
        info!(vehicle_id = vehicle.id, %availability, "Availability updated");
        Ok(())
    }

    /// Refresh the earnings totals and received reviews.
    ///
    /// # Errors
    ///
    /// Returns `BadGateway` when either backend call fails.
    pub async fn refresh_stats(&mut self) -> Result<()> {
        let (earnings, reviews) = tokio::join!(
            self.client.driver_earnings(&self.session.name),
            self.client.driver_reviews(&self.session.name)
        );
        self.earnings = Some(earnings?);
        self.reviews = reviews?;
        Ok(())
    }

    pub fn set_notice(&mut self, err: &Error) {
        self.notice = Some(err.description());
    }

    #[must_use]
    pub const fn is_tripping(&self) -> bool {
        self.tripping
    }

    #[must_use]
    pub fn follower_running(&self) -> bool {
        self.tripping && self.follower.phase() == Phase::Following
    }

    #[must_use]
    pub fn snapshot(&self) -> DriverSnapshot {
        DriverSnapshot {
            vehicle: self.vehicle.clone(),
            active: self.active.clone(),
            requests: self.requests.clone(),
            tripping: self.tripping,
            phase: self.follower.phase(),
            position: self.follower.position(),
            index: self.follower.index(),
            path_len: self.follower.path_len(),
            earnings: self.earnings.clone(),
            reviews: self.reviews.clone(),
            notice: self.notice.clone(),
        }
    }

    /// Apply one driver command, recording any failure as the notice.
    pub async fn handle(&mut self, command: DriverCommand) {
        self.notice = None;
        let result = match command {
            DriverCommand::Refresh => self.check_bookings().await,
            DriverCommand::Accept(id) => self.accept(id).await.map(|_| ()),
            DriverCommand::Reject(id) => self.reject(id).await,
            DriverCommand::StartTrip { origin, destination } => {
                self.start_trip(origin, destination).await
            }
            DriverCommand::Complete => self.complete_trip().await.map(|_| ()),
            DriverCommand::SetAvailability(availability) => {
                self.set_availability(availability).await
            }
            DriverCommand::Stats => self.refresh_stats().await,
        };
        if let Err(err) = result {
            warn!(error = %err, "Driver command failed");
            self.set_notice(&err);
        }
    }

    fn bookings_poller(&self) -> Poller<Vec<Booking>> {
        let client = self.client.clone();
        let name = self.session.name.clone();
        Poller::spawn("driver-bookings", self.config.bookings_poll, move || {
            let client = client.clone();
            let name = name.clone();
            async move { client.driver_bookings(&name).await }
        })
    }
}

/// Drive the driver view until the command channel closes.
///
/// Polls assigned bookings throughout. While a trip is running it also owns
/// the follower tick and the periodic location sync.
pub async fn run<P: Provider>(
    mut view: DriverView<P>, mut commands: mpsc::Receiver<DriverCommand>,
    snapshots: watch::Sender<DriverSnapshot>,
) -> DriverView<P> {
    let mut follow = ticker(view.config.driver_tick);
    let mut sync = ticker(view.config.location_sync);
    let mut bookings = Some(view.bookings_poller());

    snapshots.send_replace(view.snapshot());
    loop {
        let was_tripping = view.is_tripping();

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                view.handle(command).await;
            }
            _ = follow.tick(), if view.follower_running() => {
                if let Err(err) = view.on_follow_tick().await {
                    warn!(error = %err, "Follower tick failed");
                    view.set_notice(&err);
                }
            }
            _ = sync.tick(), if view.is_tripping() => {
                if let Err(err) = view.sync_location().await {
                    warn!(error = %err, "Location sync failed");
                }
            }
            Some(list) = next_update(&mut bookings) => view.apply_bookings(list),
        }

        if !was_tripping && view.is_tripping() {
            follow.reset();
            sync.reset();
        }
        snapshots.send_replace(view.snapshot());
    }

    debug!("Driver view closed");
    view
}
