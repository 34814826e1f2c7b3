use std::sync::Arc;

/// Events emitted while updating subscriptions, for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A worker picked up a subscription
    SubscriptionStarted {
        /// Identifies the worker (0 to update_threads-1)
        worker: usize,
        name: String,
    },

    /// The feed did not change since the last successful update
    FeedNotModified { worker: usize, name: String },

    /// An attachment download is starting
    DownloadStarting {
        worker: usize,
        subscription: String,
        episode_title: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        worker: usize,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// An attachment download completed successfully
    DownloadCompleted {
        worker: usize,
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// An attachment download failed; the update goes on
    DownloadFailed {
        worker: usize,
        episode_title: String,
        error: String,
    },

    /// Stale `.partial` files were removed from a content directory
    PartialFilesCleanedUp { name: String, count: usize },

    /// A subscription's update cycle completed
    SubscriptionFinished {
        worker: usize,
        name: String,
        new_episodes: usize,
        downloaded: usize,
        failed: usize,
    },

    /// A subscription's update cycle aborted
    SubscriptionFailed {
        worker: usize,
        name: String,
        error: String,
    },

    /// All dispatched subscriptions were processed
    BatchCompleted {
        succeeded: usize,
        failed: usize,
        downloaded: usize,
    },
}

/// Trait for reporting progress events during updates.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingReporter {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for CollectingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter::shared();

        reporter.report(ProgressEvent::SubscriptionStarted {
            worker: 0,
            name: "news".to_string(),
        });
        reporter.report(ProgressEvent::DownloadFailed {
            worker: 1,
            episode_title: "Episode 2".to_string(),
            error: "Connection timeout".to_string(),
        });
        reporter.report(ProgressEvent::BatchCompleted {
            succeeded: 1,
            failed: 1,
            downloaded: 0,
        });
    }

    #[test]
    fn reporters_can_be_shared_across_threads() {
        let reporter = Arc::new(CollectingReporter::default());
        let shared: SharedProgressReporter = reporter.clone();

        std::thread::scope(|scope| {
            for worker in 0..3 {
                let shared = shared.clone();
                scope.spawn(move || {
                    shared.report(ProgressEvent::FeedNotModified {
                        worker,
                        name: format!("sub-{}", worker),
                    });
                });
            }
        });

        assert_eq!(reporter.events.lock().unwrap().len(), 3);
    }
}
