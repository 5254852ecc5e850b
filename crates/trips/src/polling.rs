//! # Polling
//!
//! Fixed-interval background refresh. The first fetch runs immediately.
//! A failed fetch is logged and the last good value stays published, so an
//! outage shows up as stale data rather than an error.
//!
//! Dropping the [`Poller`] aborts its task, including any request still in
//! flight, so nothing lands after the owning view is gone.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug)]
pub struct Poller<T> {
    name: &'static str,
    rx: watch::Receiver<Option<T>>,
    task: JoinHandle<()>,
}

impl<T> Poller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start polling `fetch` every `every`.
    pub fn spawn<F, Fut>(name: &'static str, every: Duration, mut fetch: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match fetch().await {
                    Ok(value) => {
                        if tx.send(Some(value)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(poller = name, error = %err, "Poll failed, keeping last value");
                    }
                }
            }
        });

        debug!(poller = name, every_ms = every.as_millis(), "Poller started");
        Self { name, rx, task }
    }

    /// Most recent successful value.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next successful fetch.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        debug!(poller = self.name, "Poller stopped");
        self.task.abort();
    }
}

/// Interval whose first tick lands one period from now.
pub(crate) fn ticker(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Next value from an optional poller; never resolves when there is none.
pub(crate) async fn next_update<T>(poller: &mut Option<Poller<T>>) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
{
    match poller {
        Some(poller) => poller.next().await,
        None => std::future::pending().await,
    }
}
