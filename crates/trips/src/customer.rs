//! # Customer View
//!
//! Rider-side trip lifecycle: search, pick a route and a ride, confirm, follow
//! the trip on the map, then review it.
//!
//! The view is driven either directly (each operation is a method) or through
//! [`run`], which owns the timers and the live-vehicle poller and applies
//! [`CustomerCommand`]s as they arrive.

use fleet_provider::{Clock, Provider};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::BackendClient;
use crate::auth::{Session, SessionReader};
use crate::booking::{self, BookingOptions, BookingOutcome, BookingTarget};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::follower::{PathFollower, Phase, Step};
use crate::geocode::Geocoder;
use crate::models::{Booking, Coordinate, LiveVehicle, Review, Role, Vehicle};
use crate::polling::{Poller, next_update, ticker};
use crate::search::{Quote, Search, SearchRequest};
use crate::store::{TripRoute, TripStore};

/// Which panel the rider is looking at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Search,
    Tracking,
    History,
}

/// Render state of the customer view.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerSnapshot {
    pub mode: ViewMode,
    pub phase: Phase,
    pub booking: Option<Booking>,
    pub position: Option<Coordinate>,
    pub index: usize,
    pub path_len: usize,
    pub elapsed_secs: u64,
    pub review_prompt: bool,
    pub quote: Option<Quote>,
    pub selected_route: Option<String>,
    pub history: Vec<Booking>,
    pub live_vehicles: Vec<LiveVehicle>,
    pub notice: Option<String>,
}

/// Rider actions accepted by [`run`].
#[derive(Debug, Clone)]
pub enum CustomerCommand {
    Search(SearchRequest),
    SelectRoute(String),
    SelectOffer(i64),
    SelectVehicle(i64),
    Confirm(BookingOptions),
    Review { rating: u8, comment: String },
    History,
}

pub struct CustomerView<P: Provider> {
    provider: P,
    config: Config,
    session: Session,
    client: BackendClient<P>,
    search: Search<P>,
    store: TripStore<P>,
    quote: Option<Quote>,
    selected_route: Option<String>,
    target: Option<BookingTarget>,
    active: Option<Booking>,
    follower: PathFollower,
    elapsed_secs: u64,
    review_pending: bool,
    mode: ViewMode,
    history: Vec<Booking>,
    live_vehicles: Vec<LiveVehicle>,
    notice: Option<String>,
}

impl<P: Provider> CustomerView<P> {
    /// Open the view for the signed-in customer.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` unless a customer is signed in.
    pub fn new(provider: P, config: Config, reader: &SessionReader) -> Result<Self> {
        let session = reader.require(Role::Customer)?;
        let client = BackendClient::new(provider.clone(), &config, reader.clone());
        let search = Search::new(Geocoder::new(provider.clone(), &config), client.clone());
        let store = TripStore::new(provider.clone(), config.customer_keys());

        Ok(Self {
            provider,
            config,
            session,
            client,
            search,
            store,
            quote: None,
            selected_route: None,
            target: None,
            active: None,
            follower: PathFollower::idle(),
            elapsed_secs: 0,
            review_pending: false,
            mode: ViewMode::Search,
            history: Vec::new(),
            live_vehicles: Vec::new(),
            notice: None,
        })
    }

    /// Resume a trip persisted by an earlier run of the view.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the session store fails.
    pub async fn restore(&mut self) -> Result<bool> {
        let Some(session) = self.store.load().await? else {
            return Ok(false);
        };

        info!(booking_id = session.booking.id, index = session.index, "Resuming trip");
        self.follower = PathFollower::resume(
            session.route.path,
            session.index,
            session.booking.scheduled_start_time,
        );
        self.review_pending = self.follower.phase() == Phase::Completed;
        self.active = Some(session.booking);
        self.elapsed_secs = 0;
        self.mode = ViewMode::Tracking;
        Ok(true)
    }

    /// Look up routes and rides between two free-text locations.
    ///
    /// Nothing changes when the search fails. A trip being tracked stays on
    /// screen.
    ///
    /// # Errors
    ///
    /// Returns `LocationNotFound` when either location cannot be geocoded.
    pub async fn search(&mut self, request: &SearchRequest) -> Result<&Quote> {
        let today = self.provider.now_utc().date_naive();
        let quote = self.search.quote(request, self.session.user_id, today).await?;

        self.selected_route = None;
        self.target = None;
        if self.active.is_none() {
            self.mode = ViewMode::Search;
        }
        Ok(&*self.quote.insert(quote))
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` when the route is not part of the current quote.
    pub fn select_route(&mut self, route_id: &str) -> Result<()> {
        let found = self.quote.as_ref().and_then(|q| q.route(route_id)).is_some();
        if !found {
            return Err(crate::invalid!("unknown route {}", route_id));
        }
        self.selected_route = Some(route_id.to_string());
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` when the trip is not among the current offers.
    pub fn select_offer(&mut self, trip_id: i64) -> Result<()> {
        let offer = self.quote.as_ref().and_then(|q| q.offer(trip_id)).cloned();
        let Some(offer) = offer else {
            return Err(crate::invalid!("unknown trip offer {}", trip_id));
        };
        self.target = Some(BookingTarget::Offer(offer));
        Ok(())
    }

    /// Select a recommended or live vehicle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the vehicle is not known to the view.
    pub fn select_vehicle(&mut self, vehicle_id: i64) -> Result<()> {
        let recommended = self.quote.as_ref().and_then(|q| q.recommended(vehicle_id)).cloned();
        let vehicle = recommended.or_else(|| {
            self.live_vehicles.iter().find(|v| v.id == vehicle_id).map(vehicle_from_live)
        });
        let Some(vehicle) = vehicle else {
            return Err(crate::invalid!("unknown vehicle {}", vehicle_id));
        };
        self.target = Some(BookingTarget::Vehicle(vehicle));
        Ok(())
    }

    /// Book the selected route and ride.
    ///
    /// A booking that needs driver acceptance moves the view to trip history.
    /// One confirmed straight away starts tracking.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` without contacting the backend when the
    /// selection is incomplete, and `Conflict` while a trip is in progress.
    pub async fn confirm(&mut self, options: &BookingOptions) -> Result<BookingOutcome> {
        if let Some(active) = &self.active {
            return Err(crate::conflict!("booking {} is still in progress", active.id));
        }
        let Some(quote) = &self.quote else {
            return Err(crate::invalid!("select a route and a vehicle before booking"));
        };
        let route = self.selected_route.as_deref().and_then(|id| quote.route(id));
        let request =
            booking::build_request(&self.session, quote, route, self.target.as_ref(), options)?;
        let trip_route = TripRoute::new(
            route.map(|r| r.path.clone()).unwrap_or_default(),
            quote.pickup.coordinate,
            quote.drop.coordinate,
        );

        let booking = self.client.create_booking(&request).await?;
        info!(booking_id = booking.id, status = %booking.status, "Booking created");

        let outcome = BookingOutcome::from(booking);
        self.clear_search();
        match &outcome {
            BookingOutcome::AwaitingDriver(_) => {
                self.mode = ViewMode::History;
                if let Err(err) = self.load_history().await {
                    warn!(error = %err, "Loading trip history failed");
                }
            }
            BookingOutcome::Started(booking) => {
                let mut booking = booking.clone();
                booking.start_coords = booking.start_coords.or(trip_route.pickup);
                booking.end_coords = booking.end_coords.or(trip_route.drop);
                self.start_tracking(booking, trip_route).await?;
            }
        }
        Ok(outcome)
    }

    async fn start_tracking(&mut self, booking: Booking, route: TripRoute) -> Result<()> {
        let starts_at = booking.scheduled_start_time;
        let session = self.store.start(booking, route).await?;

        self.follower = PathFollower::resume(session.route.path, 0, starts_at);
        self.review_pending = self.follower.phase() == Phase::Completed;
        self.active = Some(session.booking);
        self.elapsed_secs = 0;
        self.mode = ViewMode::Tracking;
        Ok(())
    }

    /// Advance the marker one point and persist the new index.
    ///
    /// Arrival raises the review prompt even when the index write fails; the
    /// marker has already moved and the follower will not report it again.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the index cannot be persisted.
    pub async fn on_follow_tick(&mut self) -> Result<Step> {
        let step = self.follower.step(self.provider.now_utc());
        match step {
            Step::Arrived { index } => {
                info!(booking_id = self.active.as_ref().map(|b| b.id), index, "Trip arrived");
                self.review_pending = true;
            }
            Step::Waiting { starts_at } => {
                debug!(starts_at = %starts_at, "Trip not started yet");
            }
            _ => {}
        }
        if let Some(index) = step.moved() {
            self.store.save_index(index).await?;
        }
        Ok(step)
    }

    /// Count one second of trip time. Display only; never persisted.
    pub const fn on_elapsed_tick(&mut self) {
        if self.elapsed_running() {
            self.elapsed_secs += 1;
        }
    }

    /// Rate the finished trip and close the trip session.
    ///
    /// The session is kept when submission fails so the rider can retry.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when no review is pending and `InvalidInput` for a
    /// rating outside 1 to 5.
    pub async fn submit_review(&mut self, rating: u8, comment: &str) -> Result<()> {
        let booking_id = match (&self.active, self.review_pending) {
            (Some(active), true) => active.id,
            _ => return Err(crate::conflict!("no finished trip awaiting review")),
        };
        let review = Review::new(rating, comment)?;

        self.client.submit_review(booking_id, &review).await?;
        self.store.clear().await?;

        info!(booking_id, rating, "Review submitted");
        self.active = None;
        self.follower.reset();
        self.review_pending = false;
        self.elapsed_secs = 0;
        self.mode = ViewMode::Search;
        Ok(())
    }

    /// Fetch the rider's bookings, newest first.
    ///
    /// # Errors
    ///
    /// Returns `BadGateway` when the backend call fails.
    pub async fn load_history(&mut self) -> Result<&[Booking]> {
        let mut bookings = self.client.user_bookings(self.session.user_id).await?;
        bookings.sort_by(|a, b| b.id.cmp(&a.id));
        self.history = bookings;
        Ok(&self.history)
    }

    pub fn apply_live_vehicles(&mut self, vehicles: Vec<LiveVehicle>) {
        self.live_vehicles = vehicles;
    }

    pub fn set_notice(&mut self, err: &Error) {
        self.notice = Some(err.description());
    }

    #[must_use]
    pub const fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn follower_running(&self) -> bool {
        self.follower.phase() == Phase::Following
    }

    #[must_use]
    pub const fn elapsed_running(&self) -> bool {
        self.active.is_some() && !self.review_pending
    }

    #[must_use]
    pub fn snapshot(&self) -> CustomerSnapshot {
        CustomerSnapshot {
            mode: self.mode,
            phase: self.follower.phase(),
            booking: self.active.clone(),
            position: self.follower.position(),
            index: self.follower.index(),
            path_len: self.follower.path_len(),
            elapsed_secs: self.elapsed_secs,
            review_prompt: self.review_pending,
            quote: self.quote.clone(),
            selected_route: self.selected_route.clone(),
            history: self.history.clone(),
            live_vehicles: self.live_vehicles.clone(),
            notice: self.notice.clone(),
        }
    }

    /// Apply one rider command, recording any failure as the notice.
    pub async fn handle(&mut self, command: CustomerCommand) {
        self.notice = None;
        let result = match command {
            CustomerCommand::Search(request) => self.search(&request).await.map(|_| ()),
            CustomerCommand::SelectRoute(id) => self.select_route(&id),
            CustomerCommand::SelectOffer(id) => self.select_offer(id),
            CustomerCommand::SelectVehicle(id) => self.select_vehicle(id),
            CustomerCommand::Confirm(options) => self.confirm(&options).await.map(|_| ()),
            CustomerCommand::Review { rating, comment } => {
                self.submit_review(rating, &comment).await
            }
            CustomerCommand::History => self.load_history().await.map(|_| ()),
        };
        if let Err(err) = result {
            warn!(error = %err, "Customer command failed");
            self.set_notice(&err);
        }
    }

    fn live_poller(&self) -> Poller<Vec<LiveVehicle>> {
        let client = self.client.clone();
        Poller::spawn("live-vehicles", self.config.live_poll, move || {
            let client = client.clone();
            async move { client.live_vehicles().await }
        })
    }

    fn clear_search(&mut self) {
        self.quote = None;
        self.selected_route = None;
        self.target = None;
    }
}

/// Drive the customer view until the command channel closes.
///
/// Owns the follower tick, the elapsed-time tick and, while no trip is
/// active, the live-vehicle poller. A snapshot is published after every
/// event. Returns the view so callers can inspect its final state.
pub async fn run<P: Provider>(
    mut view: CustomerView<P>, mut commands: mpsc::Receiver<CustomerCommand>,
    snapshots: watch::Sender<CustomerSnapshot>,
) -> CustomerView<P> {
    let mut follow = ticker(view.config.customer_tick);
    let mut elapsed = ticker(view.config.elapsed_tick);
    let mut live = (!view.is_tracking()).then(|| view.live_poller());

    snapshots.send_replace(view.snapshot());
    loop {
        let was_tracking = view.is_tracking();

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
            _ = elapsed.tick(), if view.elapsed_running() => view.on_elapsed_tick(),
            Some(vehicles) = next_update(&mut live) => view.apply_live_vehicles(vehicles),
        }

        match (was_tracking, view.is_tracking()) {
            (false, true) => {
                follow.reset();
                elapsed.reset();
                live = None;
            }
            (true, false) => live = Some(view.live_poller()),
            _ => {}
        }
        snapshots.send_replace(view.snapshot());
    }

    debug!("Customer view closed");
    view
}

fn vehicle_from_live(live: &LiveVehicle) -> Vehicle {
    Vehicle {
        id: live.id,
        model: live.model.clone(),
        number_plate: live.number_plate.clone(),
        driver_name: live.driver_name.clone(),
        driver_contact: live.driver_contact.clone(),
        driver_rating: live.driver_rating,
        seats: Some(live.seats),
        status: live.status.clone(),
        latitude: Some(live.latitude),
        longitude: Some(live.longitude),
        ..Vehicle::default()
    }
}
