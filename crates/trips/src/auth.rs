//! # Session Context
//!
//! Identity is owned by a single writer, [`Auth`]. Everything else reads it
//! through a [`SessionReader`], which sees login and logout as soon as they
//! happen.

use anyhow::Context;
use fleet_provider::{Provider, StateStore};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::BackendClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Role;

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: i64,
    pub role: Role,
    pub token: String,
    pub name: String,
    pub email: String,
}

/// Response to login and registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    pub role: Role,
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// New account details. The role must be chosen before submitting.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Option<Role>,
}

/// Write side of the session. Held only by [`Auth`].
#[derive(Debug)]
pub struct SessionContext {
    tx: watch::Sender<Option<Session>>,
}

impl SessionContext {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    #[must_use]
    pub fn reader(&self) -> SessionReader {
        SessionReader { rx: self.tx.subscribe() }
    }

    fn publish(&self, session: Option<Session>) {
        self.tx.send_replace(session);
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the session.
#[derive(Debug, Clone)]
pub struct SessionReader {
    rx: watch::Receiver<Option<Session>>,
}

impl SessionReader {
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.rx.borrow().as_ref().map(|s| s.token.clone())
    }

    /// The current session, provided it carries `role`.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` when signed out or signed in with another role.
    pub fn require(&self, role: Role) -> Result<Session> {
        match self.current() {
            None => Err(Error::Unauthorized("not signed in".to_string())),
            Some(session) if session.role != role => Err(Error::Unauthorized(format!(
                "{} view requires the {role} role, signed in as {}",
                role.as_str().to_ascii_lowercase(),
                session.role
            ))),
            Some(session) => Ok(session),
        }
    }
}

/// Login, registration and logout, and the only writer of the session.
pub struct Auth<P: Provider> {
    provider: P,
    client: BackendClient<P>,
    key: String,
    context: SessionContext,
}

impl<P: Provider> Auth<P> {
    pub fn new(provider: P, config: &Config) -> Self {
        let context = SessionContext::new();
        let client = BackendClient::new(provider.clone(), config, context.reader());
        Self { provider, client, key: config.keys.session.clone(), context }
    }

    #[must_use]
    pub fn reader(&self) -> SessionReader {
        self.context.reader()
    }

    /// Reload a session persisted by an earlier login.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the store cannot be read.
    pub async fn restore(&self) -> Result<Option<Session>> {
        let raw = StateStore::get(&self.provider, &self.key)
            .await
            .context("reading session")
            .map_err(|e| Error::StorageError(format!("{e:#}")))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_slice::<Session>(&raw) {
            Ok(session) => {
                debug!(user_id = session.user_id, role = %session.role, "Session restored");
                self.context.publish(Some(session.clone()));
                Ok(Some(session))
            }
            Err(err) => {
                warn!(error = %err, "Discarding unreadable session");
                self.forget().await?;
                Ok(None)
            }
        }
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for blank credentials, `BadGateway` when the
    /// backend rejects them, and `Unauthorized` when no token is issued.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(crate::invalid!("email and password are required"));
        }
        let response = self.client.login(credentials).await?;
        self.establish(response, &credentials.email, None).await
    }

    /// Create an account and sign in as it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when no role was chosen, without contacting the
    /// backend.
    pub async fn register(&self, registration: &Registration) -> Result<Session> {
        if registration.role.is_none() {
            return Err(crate::invalid!("select a role to continue"));
        }
        if registration.email.trim().is_empty() || registration.password.is_empty() {
            return Err(crate::invalid!("email and password are required"));
        }
        let response = self.client.register(registration).await?;
        self.establish(response, &registration.email, Some(&registration.name)).await
    }

    /// Sign out. The backend is notified on a best-effort basis; the local
    /// session is always cleared.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the persisted session cannot be removed.
    pub async fn logout(&self) -> Result<()> {
        if let Some(session) = self.context.reader().current() {
            if let Err(err) = self.client.logout(&session.email).await {
                warn!(user_id = session.user_id, error = %err, "Logout notification failed");
            }
            info!(user_id = session.user_id, "Signed out");
        }
        self.forget().await
    }

    async fn establish(
        &self, response: AuthResponse, email: &str, name: Option<&str>,
    ) -> Result<Session> {
        let Some(token) = response.token.filter(|t| !t.is_empty()) else {
            return Err(Error::Unauthorized("no token issued".to_string()));
        };
        let session = Session {
            user_id: response.id,
            role: response.role,
            token,
            name: response.name.or_else(|| name.map(ToString::to_string)).unwrap_or_default(),
            email: response.email.unwrap_or_else(|| email.to_string()),
        };

        StateStore::set(&self.provider, &self.key, &serde_json::to_vec(&session)?)
            .await
            .context("writing session")
            .map_err(|e| Error::StorageError(format!("{e:#}")))?;
        self.context.publish(Some(session.clone()));

        info!(user_id = session.user_id, role = %session.role, "Signed in");
        Ok(session)
    }

    async fn forget(&self) -> Result<()> {
        self.context.publish(None);
        StateStore::delete(&self.provider, &self.key)
            .await
            .context("deleting session")
            .map_err(|e| Error::StorageError(format!("{e:#}")))
    }
}
