//! # Trip Lifecycle
//!
//! Client-side trip lifecycle for the NeuroFleetX fleet platform: search and
//! quote, booking confirmation, simulated tracking along the booked route with
//! a session that survives restarts, and the closing review.
//!
//! All I/O goes through the host-supplied [`fleet_provider::Provider`]: HTTP
//! to the backend and geocoder, durable session storage, and the wall clock.

pub mod api;
pub mod auth;
pub mod booking;
pub mod config;
pub mod customer;
pub mod dashboard;
pub mod driver;
mod error;
pub mod follower;
pub mod geocode;
pub mod models;
pub mod polling;
pub mod search;
mod serde_helpers;
pub mod store;

pub use fleet_provider::*;

pub use crate::auth::{Auth, Credentials, Registration, Session, SessionReader};
pub use crate::config::Config;
pub use crate::customer::{CustomerCommand, CustomerSnapshot, CustomerView};
pub use crate::dashboard::{AdminDashboard, ManagerDashboard};
pub use crate::driver::{DriverCommand, DriverSnapshot, DriverView};
pub use crate::error::*;
pub use crate::models::*;
