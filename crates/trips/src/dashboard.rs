//! # Admin & Manager Dashboards
//!
//! Fleet overviews kept fresh by background pollers, plus the account
//! actions each role may take. Each poller stops when the dashboard is
//! dropped.

use fleet_provider::Provider;
use tracing::info;

use crate::api::BackendClient;
use crate::auth::SessionReader;
use crate::config::Config;
use crate::error::Result;
use crate::models::{Booking, Kpi, OnlineDriver, Role, UserAccount, Vehicle};
use crate::polling::Poller;

macro_rules! poll {
    ($client:expr, $name:literal, $every:expr, $call:ident) => {{
        let client = $client.clone();
        Poller::spawn($name, $every, move || {
            let client = client.clone();
            async move { client.$call().await }
        })
    }};
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminSnapshot {
    pub kpi: Option<Kpi>,
    pub vehicles: Vec<Vehicle>,
    pub users: Vec<UserAccount>,
}

pub struct AdminDashboard<P: Provider> {
    client: BackendClient<P>,
    kpi: Poller<Kpi>,
    vehicles: Poller<Vec<Vehicle>>,
    users: Poller<Vec<UserAccount>>,
}

impl<P: Provider> AdminDashboard<P> {
    /// Start the admin pollers.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` unless an admin is signed in.
    pub fn open(provider: P, config: &Config, reader: &SessionReader) -> Result<Self> {
        reader.require(Role::Admin)?;
        let client = BackendClient::new(provider, config, reader.clone());
        let every = config.dashboard_poll;

        Ok(Self {
            kpi: poll!(client, "admin-kpi", every, kpi),
            vehicles: poll!(client, "admin-vehicles", every, vehicles),
            users: poll!(client, "admin-users", every, users),
            client,
        })
    }

    /// Remove an account. The user list catches up on its next poll.
    ///
    /// # Errors
    ///
    /// Returns `BadGateway` when the backend call fails.
    pub async fn delete_user(&self, user_id: i64) -> Result<()> {
        self.client.delete_user(user_id).await?;
        info!(user_id, "User deleted");
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> AdminSnapshot {
        AdminSnapshot {
            kpi: self.kpi.latest(),
            vehicles: self.vehicles.latest().unwrap_or_default(),
            users: self.users.latest().unwrap_or_default(),
        }
    }

    /// Wait until any panel refreshes.
    pub async fn refreshed(&mut self) {
        tokio::select! {
            _ = self.kpi.next() => {}
            _ = self.vehicles.next() => {}
            _ = self.users.next() => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagerSnapshot {
    pub online_drivers: Vec<OnlineDriver>,
    pub vehicles: Vec<Vehicle>,
    pub bookings: Vec<Booking>,
}

impl ManagerSnapshot {
    /// Bookings a driver is currently working.
    #[must_use]
    pub fn active_trips(&self) -> usize {
        self.bookings.iter().filter(|b| b.status.is_active_job()).count()
    }
}

pub struct ManagerDashboard<P: Provider> {
    client: BackendClient<P>,
    online_drivers: Poller<Vec<OnlineDriver>>,
    vehicles: Poller<Vec<Vehicle>>,
    bookings: Poller<Vec<Booking>>,
}

impl<P: Provider> ManagerDashboard<P> {
    /// Start the manager pollers.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` unless a manager is signed in.
    pub fn open(provider: P, config: &Config, reader: &SessionReader) -> Result<Self> {
        reader.require(Role::Manager)?;
        let client = BackendClient::new(provider, config, reader.clone());
        let every = config.dashboard_poll;

        Ok(Self {
            online_drivers: poll!(client, "manager-drivers", every, online_drivers),
            vehicles: poll!(client, "manager-vehicles", every, vehicles),
            bookings: poll!(client, "manager-bookings", every, bookings),
            client,
        })
    }

    /// # Errors
    ///
    /// Returns `BadGateway` when the backend call fails.
    pub async fn block_driver(&self, driver_id: i64) -> Result<()> {
        self.client.set_driver_blocked(driver_id, true).await?;
        info!(driver_id, "Driver blocked");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `BadGateway` when the backend call fails.
    pub async fn unblock_driver(&self, driver_id: i64) -> Result<()> {
        self.client.set_driver_blocked(driver_id, false).await?;
        info!(driver_id, "Driver unblocked");
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            online_drivers: self.online_drivers.latest().unwrap_or_default(),
            vehicles: self.vehicles.latest().unwrap_or_default(),
            bookings: self.bookings.latest().unwrap_or_default(),
        }
    }

    pub async fn refreshed(&mut self) {
        tokio::select! {
            _ = self.online_drivers.next() => {}
            _ = self.vehicles.next() => {}
            _ = self.bookings.next() => {}
        }
    }
}
