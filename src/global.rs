//! Global action coordination.
//!
//! A global action is the full Update -> Match -> Check pass over
//! every known channel, with every check forced past the immunity
//! window. Exactly one can be in flight at a time: a second trigger is
//! rejected with a conflict, never queued and never silently dropped.
//! Manual and scheduled triggers share this path; only the label
//! differs.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::model::GlobalTrigger;
use crate::queue::CheckQueue;
use crate::traits::{ChangelogSink, ChannelRepository, Matcher, PlaylistUpdater};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Orchestrates global actions and owns the schedule state they
/// mutate.
pub struct GlobalCoordinator {
    updater: Arc<dyn PlaylistUpdater>,
    matcher: Arc<dyn Matcher>,
    repo: Arc<dyn ChannelRepository>,
    changelog: Arc<dyn ChangelogSink>,
    queue: Arc<CheckQueue>,
    /// Worker's in-progress channel; drain means empty queue AND an
    /// idle worker.
    current: Arc<Mutex<Option<i64>>>,
    stop_tx: broadcast::Sender<()>,
    in_flight: AtomicBool,
    last_global_check_at: Mutex<Option<DateTime<Utc>>>,
}

impl GlobalCoordinator {
    pub fn new(
        updater: Arc<dyn PlaylistUpdater>,
        matcher: Arc<dyn Matcher>,
        repo: Arc<dyn ChannelRepository>,
        changelog: Arc<dyn ChangelogSink>,
        queue: Arc<CheckQueue>,
        current: Arc<Mutex<Option<i64>>>,
        stop_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            updater,
            matcher,
            repo,
            changelog,
            queue,
            current,
            stop_tx,
            in_flight: AtomicBool::new(false),
            last_global_check_at: Mutex::new(None),
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn last_global_check_at(&self) -> Option<DateTime<Utc>> {
        *self.last_global_check_at.lock().unwrap()
    }

    /// Seed the persisted schedule state on startup.
    pub fn restore_last_global_check(&self, at: Option<DateTime<Utc>>) {
        *self.last_global_check_at.lock().unwrap() = at;
    }

    /// Start a global action, or reject with a conflict if one is
    /// already running. The action itself runs to completion in a
    /// background task; there is no cancellation primitive.
    pub fn try_start(self: &Arc<Self>, trigger: GlobalTrigger) -> Result<()> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                "Rejecting {} global action: another is already in progress",
                trigger.as_str()
            );
            return Err(Error::Conflict);
        }

        tracing::info!("Starting {} global action", trigger.as_str());
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run(trigger).await;
            coordinator.in_flight.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    async fn run(&self, trigger: GlobalTrigger) {
        let started_at = Utc::now();

        // Step 1: refresh every enabled account. Failures are logged
        // and the action continues; a stale playlist is still worth
        // re-checking.
        let mut updated_channels = 0usize;
        match self.updater.refresh_all_enabled().await {
            Ok(ids) => {
                updated_channels = ids.len();
                tracing::info!("Playlist refresh touched {} channels", updated_channels);
            }
            Err(e) => tracing::error!("Playlist refresh failed: {}", e),
        }

        // Step 2: assign unmatched streams via the configured patterns.
        let mut matched_channels = 0usize;
        match self.matcher.assign_matching_streams().await {
            Ok(ids) => {
                matched_channels = ids.len();
                tracing::info!("Matching pass assigned streams to {} channels", matched_channels);
            }
            Err(e) => tracing::error!("Stream matching failed: {}", e),
        }

        // Step 3: force-enqueue every known channel. This is the only
        // path that sets force = true.
        let mut enqueued = 0usize;
        match self.repo.list_channels().await {
            Ok(channels) => {
                let ids: Vec<i64> = channels.iter().map(|c| c.id).collect();
                enqueued = self.queue.enqueue_many(&ids, true);
                tracing::info!(
                    "Queued {}/{} channels for forced checking",
                    enqueued,
                    ids.len()
                );
            }
            Err(e) => tracing::error!("Could not enumerate channels: {}", e),
        }

        if !self.wait_for_drain().await {
            tracing::warn!("Global action interrupted by shutdown before drain");
            return;
        }

        let completed_at = Utc::now();
        *self.last_global_check_at.lock().unwrap() = Some(completed_at);
        tracing::info!("{} global action completed", trigger.as_str());

        let details = json!({
            "trigger": trigger.as_str(),
            "updated_channels": updated_channels,
            "matched_channels": matched_channels,
            "checked_channels": enqueued,
            "started_at": started_at,
        });
        if let Err(e) = self
            .changelog
            .record("global_action", details, completed_at)
            .await
        {
            tracing::warn!("Failed to record global action changelog entry: {}", e);
        }
    }

    /// Wait until every queued entry has been processed and the worker
    /// is idle. Returns false if shutdown arrives first.
    async fn wait_for_drain(&self) -> bool {
        let mut stop_rx = self.stop_tx.subscribe();
        let mut interval = tokio::time::interval(DRAIN_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = stop_rx.recv() => return false,
                _ = interval.tick() => {
                    if self.queue.is_empty() && self.current.lock().unwrap().is_none() {
                        return true;
                    }
                }
            }
        }
    }
}
