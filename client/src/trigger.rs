//! Replays the queue when connectivity comes back.

use std::time::Duration;

use tally_engine::MutationApi;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::connectivity::Connectivity;
use crate::service::SyncService;

/// Handle to a background task. Dropping it stops the task.
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Stop the task.
    pub fn unsubscribe(mut self) {
        self.abort();
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Shortest period a background task will tick at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Drives replay passes from connectivity changes and a periodic timer.
pub struct ConnectivityTrigger;

impl ConnectivityTrigger {
    /// Start replaying `service`'s queue in the background.
    ///
    /// - Replays once immediately if already online
    /// - Replays on every observed change that leaves the device online
    /// - Runs a full sync (replay and mirror prune) every `interval` while online
    ///
    /// `interval` is raised to [`MIN_INTERVAL`] if shorter.
    pub fn subscribe<A>(
        service: SyncService<A>,
        connectivity: Connectivity,
        interval: Duration,
    ) -> Subscription
    where
        A: MutationApi + 'static,
    {
        let mut changes = connectivity.subscribe();
        let interval = interval.max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            if *changes.borrow_and_update() {
                tracing::debug!("Online at startup, replaying");
                service.sync_now().await;
            }

            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        // Changes coalesce: an offline/online flap since the
                        // last read shows up as a single online value
                        if *changes.borrow_and_update() {
                            tracing::debug!("Online, replaying");
                            service.sync_now().await;
                        }
                    }
                    _ = ticker.tick() => {
                        if connectivity.is_online() {
                            service.sync_all().await;
                        }
                    }
                }
            }
        });

        Subscription::new(handle)
    }
}
