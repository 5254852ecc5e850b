use std::env;
use std::path::PathBuf;

use trip_lifecycle::Config;

/// Host settings on top of the client [`Config`].
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub client: Config,
    pub session_dir: PathBuf,
}

impl HostConfig {
    pub fn from_env() -> Self {
        let session_dir = env::var("NEUROFLEET_SESSION_DIR").unwrap_or_else(|_| {
            let default = ".neurofleet".to_string();
            tracing::trace!("NEUROFLEET_SESSION_DIR not set, using default: {default}");
            default
        });
        Self { client: Config::from_env(), session_dir: PathBuf::from(session_dir) }
    }

    /// File holding the persisted session and trip state.
    pub fn state_file(&self) -> PathBuf {
        self.session_dir.join("session.json")
    }
}
