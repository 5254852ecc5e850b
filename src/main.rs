//! # NeuroFleetX
//!
//! Command-line host for the trip lifecycle client. Wires reqwest, a
//! file-backed session store and the system clock into the rider, driver,
//! admin and manager views.
//!
//! Trip progress is saved as it happens, so an interrupted `ride` or `drive`
//! picks up where it stopped on the next `track` or `drive`.

mod config;
mod provider;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};
use trip_lifecycle::api::BackendClient;
use trip_lifecycle::booking::{BookingOptions, BookingOutcome};
use trip_lifecycle::customer;
use trip_lifecycle::driver;
use trip_lifecycle::search::{Quote, SearchRequest};
use trip_lifecycle::{
    AdminDashboard, Auth, Booking, Coordinate, Credentials, CustomerSnapshot, CustomerView,
    DriverCommand, DriverSnapshot, DriverView, ManagerDashboard, Registration, Role, RouteMode,
    SessionReader,
};

use crate::config::HostConfig;
use crate::provider::HostProvider;

#[derive(Parser, Debug)]
#[command(name = "neurofleet", author, version, about = "NeuroFleetX trip lifecycle client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and keep the session for later commands
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and sign in
    Register(RegisterArgs),
    Logout,
    /// Search for a ride, book it and follow the trip
    Ride(RideArgs),
    /// Resume following the trip in progress
    Track,
    /// Rate the finished trip
    Review {
        #[arg(long)]
        rating: u8,
        #[arg(long, default_value = "")]
        comment: String,
    },
    History,
    /// Popular trips, optionally filtered by a search term
    Suggest {
        query: Option<String>,
    },
    /// Driver console; reads commands from stdin
    Drive,
    /// Fleet overview; with --delete-user, remove that account and exit
    Admin {
        #[arg(long)]
        delete_user: Option<i64>,
    },
    /// Driver overview; with --block or --unblock, update that driver and exit
    Manager {
        #[arg(long, conflicts_with = "unblock")]
        block: Option<i64>,
        #[arg(long)]
        unblock: Option<i64>,
    },
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    role: Option<Role>,
}

#[derive(Args, Debug)]
struct RideArgs {
    #[arg(long)]
    from: String,
    #[arg(long)]
    to: String,
    /// Travel date for trip offers (defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, default_value = "fastest")]
    mode: RouteMode,
    /// Route to book; the first one returned when omitted
    #[arg(long)]
    route: Option<String>,
    /// Posted trip to join
    #[arg(long, conflicts_with = "vehicle")]
    trip: Option<i64>,
    /// Recommended vehicle to book
    #[arg(long)]
    vehicle: Option<i64>,
    #[arg(long, default_value_t = 1)]
    passengers: u32,
    /// Scheduled start, RFC 3339
    #[arg(long)]
    at: Option<DateTime<Utc>>,
    #[arg(long)]
    hours: Option<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = HostConfig::from_env();
    let provider = HostProvider::new(config.state_file()).await?;
    let auth = Auth::new(provider.clone(), &config.client);

    let command = match cli.command {
        Command::Login { email, password } => {
            let session = auth.login(&Credentials { email, password }).await?;
            println!("signed in as {} ({})", session.name, session.role);
            return Ok(());
        }
        Command::Register(args) => {
            let registration = Registration {
                name: args.name,
                email: args.email,
                password: args.password,
                phone: args.phone,
                role: args.role,
            };
            let session = auth.register(&registration).await?;
            println!("registered {} as {}", session.email, session.role);
            return Ok(());
        }
        other => other,
    };

    if auth.restore().await?.is_none() {
        bail!("not signed in, run `neurofleet login` first");
    }
    let reader = auth.reader();

    match command {
        Command::Logout => {
            auth.logout().await?;
            println!("signed out");
        }
        Command::Ride(args) => ride(provider, &config, &reader, args).await?,
        Command::Track => track(provider, &config, &reader).await?,
        Command::Review { rating, comment } => {
            let mut view = CustomerView::new(provider, config.client.clone(), &reader)?;
            if !view.restore().await? {
                bail!("no trip to review");
            }
            view.submit_review(rating, &comment).await?;
            println!("thanks for the feedback");
        }
        Command::History => {
            let mut view = CustomerView::new(provider, config.client.clone(), &reader)?;
            for booking in view.load_history().await? {
                print_booking(booking);
            }
        }
        Command::Suggest { query } => {
            let client = BackendClient::new(provider, &config.client, reader.clone());
            for suggestion in client.trip_suggestions(query.as_deref()).await? {
                println!(
                    "{}: {} -> {}",
                    suggestion.label, suggestion.start_location, suggestion.end_location
                );
            }
        }
        Command::Drive => drive(provider, &config, &reader).await?,
        Command::Admin { delete_user } => admin(provider, &config, &reader, delete_user).await?,
        Command::Manager { block, unblock } => {
            manager(provider, &config, &reader, block, unblock).await?;
        }
        Command::Login { .. } | Command::Register(_) => {}
    }
    Ok(())
}

async fn ride(
    provider: HostProvider, config: &HostConfig, reader: &SessionReader, args: RideArgs,
) -> Result<()> {
    let mut view = CustomerView::new(provider, config.client.clone(), reader)?;
    if view.restore().await? {
        bail!("a trip is already in progress, run `neurofleet track`");
    }

    let request =
        SearchRequest { pickup: args.from, drop: args.to, date: args.date, mode: args.mode };
    let quote = view.search(&request).await?.clone();
    print_quote(&quote);

    let route = args
        .route
        .or_else(|| quote.routes.first().map(|r| r.id.clone()))
        .ok_or_else(|| {
            anyhow!("no routes between {} and {}", quote.pickup.label, quote.drop.label)
        })?;
    view.select_route(&route)?;
    match (args.trip, args.vehicle) {
        (Some(trip_id), _) => view.select_offer(trip_id)?,
        (None, Some(vehicle_id)) => view.select_vehicle(vehicle_id)?,
        (None, None) => {
            println!("pass --trip or --vehicle to book");
            return Ok(());
        }
    }

    let options = BookingOptions {
        passengers: args.passengers,
        scheduled_start: args.at,
        duration_hours: args.hours,
    };
    match view.confirm(&options).await? {
        BookingOutcome::AwaitingDriver(booking) => {
            println!("booking {} is {}, waiting for a driver", booking.id, booking.status);
            Ok(())
        }
        BookingOutcome::Started(booking) => {
            println!("booking {} confirmed, following trip", booking.id);
            follow(view).await
        }
    }
}

async fn track(provider: HostProvider, config: &HostConfig, reader: &SessionReader) -> Result<()> {
    let mut view = CustomerView::new(provider, config.client.clone(), reader)?;
    if !view.restore().await? {
        println!("no trip in progress");
        return Ok(());
    }
    follow(view).await
}

/// Run the rider view until arrival or Ctrl-C.
async fn follow(view: CustomerView<HostProvider>) -> Result<()> {
    let (commands, rx) = mpsc::channel(1);
    let (snapshots, mut updates) = watch::channel(view.snapshot());

    let watcher = async move {
        let mut shown = None;
        loop {
            let snapshot = updates.borrow_and_update().clone();
            if shown != Some(snapshot.index) {
                print_progress(&snapshot);
                shown = Some(snapshot.index);
            }
            if snapshot.review_prompt {
                println!("arrived, rate the trip with `neurofleet review --rating <1-5>`");
                break;
            }
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("stopped, resume with `neurofleet track`");
                    break;
                }
            }
        }
        drop(commands);
    };

    tokio::join!(customer::run(view, rx, snapshots), watcher);
    Ok(())
}

async fn drive(provider: HostProvider, config: &HostConfig, reader: &SessionReader) -> Result<()> {
    let mut view = DriverView::new(provider, config.client.clone(), reader)?;
    if view.restore().await? {
        println!("resuming trip in progress");
    }
    println!(
        "commands: refresh | accept <id> | reject <id> | start <lat,lon> <lat,lon> | complete"
    );
    println!("          online | offline | maintenance | stats | quit");

    let (commands, rx) = mpsc::channel(8);
    let (snapshots, mut updates) = watch::channel(view.snapshot());

    let input = async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = tokio::signal::ctrl_c() => break,
            };
            let Ok(Some(line)) = line else { break };
            match parse_driver_command(&line) {
                Ok(Some(command)) => {
                    if commands.send(command).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => eprintln!("{err}"),
            }
        }
    };

    let printer = async move {
        let mut last: Option<DriverSnapshot> = None;
        loop {
            let snapshot = updates.borrow_and_update().clone();
            if last.as_ref() != Some(&snapshot) {
                print_driver(&snapshot, last.as_ref());
                last = Some(snapshot);
            }
            if updates.changed().await.is_err() {
                break;
            }
        }
    };

    tokio::join!(driver::run(view, rx, snapshots), input, printer);
    Ok(())
}

async fn admin(
    provider: HostProvider, config: &HostConfig, reader: &SessionReader, delete_user: Option<i64>,
) -> Result<()> {
    let mut dashboard = AdminDashboard::open(provider, &config.client, reader)?;
    if let Some(user_id) = delete_user {
        dashboard.delete_user(user_id).await?;
        println!("deleted user {user_id}");
        return Ok(());
    }
    loop {
        tokio::select! {
            () = dashboard.refreshed() => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
        let snapshot = dashboard.snapshot();
        if let Some(kpi) = &snapshot.kpi {
            println!(
                "vehicles {} | users {} | active trips {} | revenue today {:.2}",
                kpi.total_vehicles, kpi.total_users, kpi.active_trips, kpi.revenue_today
            );
        }
        println!("fleet {} | accounts {}", snapshot.vehicles.len(), snapshot.users.len());
    }
}

async fn manager(
    provider: HostProvider, config: &HostConfig, reader: &SessionReader, block: Option<i64>,
    unblock: Option<i64>,
) -> Result<()> {
    let mut dashboard = ManagerDashboard::open(provider, &config.client, reader)?;
    match (block, unblock) {
        (Some(driver_id), _) => {
            dashboard.block_driver(driver_id).await?;
            println!("blocked driver {driver_id}");
            return Ok(());
        }
        (None, Some(driver_id)) => {
            dashboard.unblock_driver(driver_id).await?;
            println!("unblocked driver {driver_id}");
            return Ok(());
        }
        (None, None) => {}
    }
    loop {
        tokio::select! {
            () = dashboard.refreshed() => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
        let snapshot = dashboard.snapshot();
        println!(
            "online drivers {} | vehicles {} | active trips {}",
            snapshot.online_drivers.len(),
            snapshot.vehicles.len(),
            snapshot.active_trips()
        );
    }
}

/// `Ok(None)` means quit.
fn parse_driver_command(line: &str) -> Result<Option<DriverCommand>> {
    let mut words = line.split_whitespace();
    let command = match (words.next(), words.next(), words.next()) {
        (None, ..) => DriverCommand::Refresh,
        (Some("quit" | "exit"), ..) => return Ok(None),
        (Some("refresh"), ..) => DriverCommand::Refresh,
        (Some("accept"), Some(id), _) => DriverCommand::Accept(id.parse().context("booking id")?),
        (Some("reject"), Some(id), _) => DriverCommand::Reject(id.parse().context("booking id")?),
        (Some("start"), Some(origin), Some(destination)) => DriverCommand::StartTrip {
            origin: parse_coordinate(origin)?,
            destination: parse_coordinate(destination)?,
        },
        (Some("complete"), ..) => DriverCommand::Complete,
        (Some("stats"), ..) => DriverCommand::Stats,
        (Some(word @ ("online" | "offline" | "maintenance")), ..) => {
            DriverCommand::SetAvailability(word.parse()?)
        }
        (Some(other), ..) => bail!("unrecognised command: {other}"),
    };
    Ok(Some(command))
}

fn parse_coordinate(text: &str) -> Result<Coordinate> {
    let (lat, lon) = text.split_once(',').ok_or_else(|| anyhow!("expected lat,lon: {text}"))?;
    let lat = lat.trim().parse().with_context(|| format!("latitude in {text}"))?;
    let lon = lon.trim().parse().with_context(|| format!("longitude in {text}"))?;
    Ok(Coordinate::new(lat, lon))
}

fn print_quote(quote: &Quote) {
    println!("{} -> {}", quote.pickup.label, quote.drop.label);
    for route in &quote.routes {
        println!(
            "  route {}: {} {} {} ({} points)",
            route.id,
            route.mode,
            route.duration,
            route.distance,
            route.path.len()
        );
    }
    for offer in &quote.offers {
        let online = if offer.driver_online() { "online" } else { "offline" };
        println!(
            "  trip {}: {} seats at {:.2} per seat, driver {}",
            offer.trip.id, offer.trip.seats_available, offer.trip.price_per_seat, online
        );
    }
    for vehicle in &quote.recommendations {
        let model = vehicle.model.as_deref().unwrap_or("unknown model");
        println!("  vehicle {}: {model}", vehicle.id);
    }
}

fn print_progress(snapshot: &CustomerSnapshot) {
    let Some(position) = snapshot.position else {
        return;
    };
    println!(
        "[{:>4}s] point {}/{} at {:.5},{:.5}",
        snapshot.elapsed_secs,
        snapshot.index + 1,
        snapshot.path_len,
        position.lat,
        position.lon
    );
}

fn print_driver(snapshot: &DriverSnapshot, last: Option<&DriverSnapshot>) {
    if let Some(notice) = &snapshot.notice {
        eprintln!("! {notice}");
    }
    let requests: Vec<i64> = snapshot.requests.iter().map(|b| b.id).collect();
    if last.is_none_or(|l| l.requests.iter().map(|b| b.id).ne(requests.iter().copied())) {
        println!("pending requests: {requests:?}");
    }
    let active = snapshot.active.as_ref().map(|b| b.id);
    if last.is_none_or(|l| l.active.as_ref().map(|b| b.id) != active) {
        match &snapshot.active {
            Some(booking) => println!(
                "active job {}: {} -> {}",
                booking.id, booking.start_location, booking.end_location
            ),
            None => println!("no active job"),
        }
    }
    if let Some(earnings) = &snapshot.earnings
        && last.is_none_or(|l| l.earnings.as_ref() != Some(earnings))
    {
        let rating = earnings.rating.map_or_else(|| "-".to_string(), |r| format!("{r:.1}"));
        println!(
            "earnings {:.2} from {} trips, rating {rating}, {} reviews",
            earnings.total_earnings,
            earnings.completed_trips,
            snapshot.reviews.len()
        );
        for review in snapshot.reviews.iter().take(3) {
            println!("  {:.0}/5 {}", review.rating, review.comment.as_deref().unwrap_or(""));
        }
    }
    if snapshot.tripping
        && let Some(position) = snapshot.position
        && last.is_none_or(|l| l.index != snapshot.index)
    {
        println!(
            "point {}/{} at {:.5},{:.5}",
            snapshot.index + 1,
            snapshot.path_len,
            position.lat,
            position.lon
        );
    }
}

fn print_booking(booking: &Booking) {
    let amount = booking.amount.map_or_else(String::new, |a| format!(" {a:.2}"));
    println!(
        "#{} {} {} -> {}{}",
        booking.id,
        booking.status.history_label(),
        booking.start_location,
        booking.end_location,
        amount
    );
}
