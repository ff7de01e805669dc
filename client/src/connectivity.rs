//! Online/offline state and the probe that feeds it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::Result;
use crate::trigger::{Subscription, MIN_INTERVAL};

/// Shared view of whether the API is reachable.
///
/// Cloning yields another handle onto the same state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the state. Subscribers are only woken when it actually changes.
    ///
    /// Returns whether this call changed it.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });

        if changed {
            if online {
                tracing::info!("Connectivity restored");
            } else {
                tracing::info!("Connectivity lost");
            }
        }
        changed
    }

    /// Receive every online/offline transition from now on.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Polls `GET <base>/health` and reports reachability to a [`Connectivity`].
///
/// Any HTTP response counts as online; only transport failures count as
/// offline.
#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    client: reqwest::Client,
    url: String,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(base_url: &str, interval: Duration, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/health", base_url.trim_end_matches('/')),
            interval,
        })
    }

    /// Probe once.
    pub async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Health probe failed");
                false
            }
        }
    }

    /// Probe immediately, then every interval, until the subscription ends.
    ///
    /// The interval is raised to [`MIN_INTERVAL`] if shorter.
    pub fn spawn(self, connectivity: Connectivity) -> Subscription {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                connectivity.set_online(self.check().await);
            }
        });
        Subscription::new(handle)
    }
}
