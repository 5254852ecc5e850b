//! # Provider
//!
//! Provider defines external data interfaces for the client crates.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::{Request, Response};

/// Provider entry point implemented by the host application.
pub trait Provider: HttpRequest + StateStore + Clock + Clone + Send + Sync + 'static {}

/// Host-provided HTTP client abstraction used by the backend and geocoding
/// clients.
#[async_trait]
pub trait HttpRequest: Send + Sync {
    /// Make an outbound HTTP request and return the raw response payload.
    async fn fetch(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

/// Durable, session-scoped key-value storage.
///
/// Values survive a restart of the client within the same session but are not
/// shared between sessions.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` at `key`, returning the value it replaced.
    async fn set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Wall-clock source. Timers are driven by the async runtime; this only
/// answers "what time is it" for schedule checks.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}
