//! Host implementations of the client capabilities: reqwest for HTTP, a JSON
//! file for session state and the system clock.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::{Request, Response};
use tokio::sync::Mutex;
use fleet_provider::{Clock, HttpRequest, Provider, StateStore};

#[derive(Clone)]
pub struct HostProvider {
    client: reqwest::Client,
    state: Arc<FileState>,
}

impl HostProvider {
    /// Build a provider whose state lives in `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built or an existing
    /// state file cannot be read.
    pub async fn new(path: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("neurofleet/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building http client")?;
        let state = FileState::open(path).await?;
        Ok(Self { client, state: Arc::new(state) })
    }
}

impl Provider for HostProvider {}

#[async_trait]
impl HttpRequest for HostProvider {
    async fn fetch(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let (parts, body) = request.into_parts();
        tracing::debug!(method = %parts.method, uri = %parts.uri, "fetch");

        let response = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .with_context(|| format!("sending request to {}", parts.uri))?;

        let mut builder = Response::builder().status(response.status());
        for (name, value) in response.headers() {
            builder = builder.header(name, value);
        }
        let bytes = response.bytes().await.context("reading response body")?;
        builder.body(bytes.to_vec()).context("building response")
    }
}

#[async_trait]
impl StateStore for HostProvider {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.state.entries.lock().await;
        Ok(entries.get(key).map(|value| value.as_bytes().to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = String::from_utf8(value.to_vec()).context("state values must be utf-8")?;
        let mut entries = self.state.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        self.state.flush(&entries).await?;
        Ok(previous.map(String::into_bytes))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.state.entries.lock().await;
        if entries.remove(key).is_some() {
            self.state.flush(&entries).await?;
        }
        Ok(())
    }
}

impl Clock for HostProvider {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Key-value state persisted as one JSON object, rewritten on every change.
struct FileState {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileState {
    async fn open(path: PathBuf) -> Result<Self> {
        let entries = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let raw = serde_json::to_vec_pretty(entries).context("serializing state")?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, raw)
            .await
            .with_context(|| format!("writing {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))
    }
}
