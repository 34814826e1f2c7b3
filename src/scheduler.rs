// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Long-running background services for daemon mode.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::Podfetch;
use crate::predicate::Filter;

/// A background task that runs until `shutdown` is cancelled
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, shutdown: CancellationToken);
}

/// Starts a group of services and stops them together
pub struct ServiceSet {
    services: Vec<Arc<dyn Service>>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn add(&mut self, service: Arc<dyn Service>) {
        self.services.push(service);
    }

    /// Spawn every service that is not running yet
    pub fn start(&mut self) {
        for service in self.services.iter().skip(self.handles.len()) {
            info!(service = service.name(), "Starting service");
            let service = service.clone();
            let shutdown = self.shutdown.child_token();
            self.handles
                .push(tokio::spawn(async move { service.run(shutdown).await }));
        }
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for every service to return
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Service task panicked");
            }
        }
        info!("All services stopped");
    }
}

impl Default for ServiceSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Updates all subscriptions, then waits `interval` before the next round
pub struct PeriodicUpdate {
    app: Podfetch,
    interval: Duration,
}

impl PeriodicUpdate {
    pub fn new(app: Podfetch, interval: Duration) -> Self {
        Self { app, interval }
    }
}

#[async_trait]
impl Service for PeriodicUpdate {
    fn name(&self) -> &str {
        "periodic-update"
    }

    async fn run(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Periodic update started");

        loop {
            // Cycles already running finish before shutdown is honored
            match self.app.update_all_until(&Filter::All, false, &shutdown).await {
                Ok(report) => info!(
                    succeeded = report.succeeded(),
                    failed = report.failed(),
                    downloaded = report.downloaded(),
                    pending = report.pending.len(),
                    "Periodic update finished"
                ),
                Err(e) => warn!(error = %e, "Periodic update failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Periodic update stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, audio_entry};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn periodic_update_runs_until_stopped() {
        let h = Harness::new();
        h.add_subscription("show", -1);
        h.feeds.set_entries(vec![audio_entry("e1", "2024-01-01T10:00:00Z", &["audio/mpeg"])]);

        let mut services = ServiceSet::new();
        services.add(Arc::new(PeriodicUpdate::new(
            h.app.clone(),
            Duration::from_millis(20),
        )));
        services.start();
        assert!(services.is_running());

        for _ in 0..100 {
            if h.feeds.calls.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        services.stop().await;

        assert!(!services.is_running());
        assert!(h.feeds.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(h.app.index().load("show").unwrap().len(), 1);
        assert_eq!(h.http.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_mid_batch_waits_for_running_cycles() {
        let h = Harness::with_threads(2);
        for name in ["a", "b", "c"] {
            h.add_subscription(name, -1);
        }
        h.feeds.set_entries(vec![audio_entry("e1", "2024-01-01T10:00:00Z", &["audio/mpeg"])]);
        h.http.set_delay(Some(Duration::from_millis(300)));

        let mut services = ServiceSet::new();
        services.add(Arc::new(PeriodicUpdate::new(
            h.app.clone(),
            Duration::from_secs(3600),
        )));
        services.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        services.stop().await;

        assert_eq!(h.http.completed.load(Ordering::SeqCst), 2);
        assert!(h.app.index().exists("a"));
        assert!(h.app.index().exists("b"));

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(h.http.completed.load(Ordering::SeqCst), 2);
        assert_eq!(h.http.downloads.load(Ordering::SeqCst), 2);
        assert!(!h.app.index().exists("c"));
    }

    #[tokio::test]
    async fn stop_interrupts_long_sleep() {
        let h = Harness::new();
        let mut services = ServiceSet::new();
        services.add(Arc::new(PeriodicUpdate::new(
            h.app.clone(),
            Duration::from_secs(3600),
        )));
        services.start();

        tokio::time::timeout(Duration::from_secs(5), services.stop())
            .await
            .unwrap();
    }
}
