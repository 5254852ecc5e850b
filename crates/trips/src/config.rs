//! # Configuration
//!
//! Runtime settings read from the environment. Every value has a default so
//! a bare environment yields a working local setup.

use std::env;
use std::time::Duration;

/// Settings shared by the trip lifecycle views.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub geocoder_url: String,
    pub geocoder_country: String,
    pub geocoder_user_agent: String,
    pub customer_tick: Duration,
    pub driver_tick: Duration,
    pub elapsed_tick: Duration,
    pub live_poll: Duration,
    pub bookings_poll: Duration,
    pub dashboard_poll: Duration,
    pub location_sync: Duration,
    pub keys: Keys,
}

impl Config {
    /// Defaults overridden by whatever the environment sets.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_url = env::var("NEUROFLEET_API_URL").unwrap_or_else(|_| {
            tracing::trace!("NEUROFLEET_API_URL not set, using default");
            defaults.api_url
        });
        let geocoder_url = env::var("GEOCODER_URL").unwrap_or_else(|_| {
            tracing::trace!("GEOCODER_URL not set, using default");
            defaults.geocoder_url
        });

        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            geocoder_url: geocoder_url.trim_end_matches('/').to_string(),
            geocoder_country: env::var("GEOCODER_COUNTRY").unwrap_or(defaults.geocoder_country),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .unwrap_or(defaults.geocoder_user_agent),
            customer_tick: env_millis("CUSTOMER_TICK_MS", defaults.customer_tick),
            driver_tick: env_millis("DRIVER_TICK_MS", defaults.driver_tick),
            elapsed_tick: env_millis("ELAPSED_TICK_MS", defaults.elapsed_tick),
            live_poll: env_secs("LIVE_POLL_SECS", defaults.live_poll),
            bookings_poll: env_secs("BOOKINGS_POLL_SECS", defaults.bookings_poll),
            dashboard_poll: env_secs("DASHBOARD_POLL_SECS", defaults.dashboard_poll),
            location_sync: env_secs("LOCATION_SYNC_SECS", defaults.location_sync),
            keys: Keys::from_env(defaults.keys),
        }
    }

    /// Keys for the customer's persisted trip session.
    #[must_use]
    pub fn customer_keys(&self) -> TripKeys {
        self.keys.trip_keys(&self.keys.customer_prefix)
    }

    /// Keys for the driver's persisted trip session.
    #[must_use]
    pub fn driver_keys(&self) -> TripKeys {
        self.keys.trip_keys(&self.keys.driver_prefix)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            geocoder_country: "in".to_string(),
            geocoder_user_agent: format!("neurofleet/{}", env!("CARGO_PKG_VERSION")),
            customer_tick: Duration::from_millis(2_000),
            driver_tick: Duration::from_millis(1_500),
            elapsed_tick: Duration::from_millis(1_000),
            live_poll: Duration::from_secs(5),
            bookings_poll: Duration::from_secs(5),
            dashboard_poll: Duration::from_secs(10),
            location_sync: Duration::from_secs(3),
            keys: Keys::default(),
        }
    }
}

/// Storage key names.
#[derive(Debug, Clone)]
pub struct Keys {
    pub session: String,
    pub active_booking: String,
    pub persistent_route: String,
    pub current_index: String,
    pub customer_prefix: String,
    pub driver_prefix: String,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            session: "session".to_string(),
            active_booking: "activeBooking".to_string(),
            persistent_route: "persistentRoute".to_string(),
            current_index: "currentIndex".to_string(),
            customer_prefix: String::new(),
            driver_prefix: "driver".to_string(),
        }
    }
}

impl Keys {
    fn from_env(defaults: Self) -> Self {
        Self {
            session: env::var("KEY_SESSION").unwrap_or(defaults.session),
            active_booking: env::var("KEY_ACTIVE_BOOKING").unwrap_or(defaults.active_booking),
            persistent_route: env::var("KEY_PERSISTENT_ROUTE")
                .unwrap_or(defaults.persistent_route),
            current_index: env::var("KEY_CURRENT_INDEX").unwrap_or(defaults.current_index),
            customer_prefix: env::var("KEY_CUSTOMER_PREFIX").unwrap_or(defaults.customer_prefix),
            driver_prefix: env::var("KEY_DRIVER_PREFIX").unwrap_or(defaults.driver_prefix),
        }
    }

    fn trip_keys(&self, prefix: &str) -> TripKeys {
        let key = |name: &str| {
            if prefix.is_empty() { name.to_string() } else { format!("{prefix}:{name}") }
        };
        TripKeys {
            booking: key(&self.active_booking),
            route: key(&self.persistent_route),
            index: key(&self.current_index),
        }
    }
}

/// The three keys making up one persisted trip session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripKeys {
    pub booking: String,
    pub route: String,
    pub index: String,
}

impl TripKeys {
    /// Keys in the order they are removed.
    #[must_use]
    pub fn all(&self) -> [&str; 3] {
        [&self.booking, &self.route, &self.index]
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse::<u64>().ok())
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env_u64(key).map_or(default, Duration::from_millis)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_u64(key).map_or(default, Duration::from_secs)
}
