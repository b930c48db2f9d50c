//! Pipeline service.
//!
//! The top-level orchestrator: owns the scheduling loop, the check
//! worker, the queue, the global action coordinator and the live
//! config snapshot, and exposes the operations a thin API layer wraps.
//!
//! One background loop owns all timing. It selects over the periodic
//! timer, a wake signal and the stop signal; config changes and manual
//! triggers raise the wake signal so they are observed within one loop
//! iteration instead of after a full timer period.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch, Notify};

use crate::config::{PipelineConfig, PipelineMode};
use crate::error::{Error, Result};
use crate::global::GlobalCoordinator;
use crate::model::{CheckStatistics, GlobalTrigger, PipelineStatus};
use crate::queue::CheckQueue;
use crate::schedule;
use crate::traits::{
    ChangelogSink, ChannelRepository, ConfigStore, Matcher, PlaylistUpdater, Prober,
};
use crate::worker::{run_worker_loop, ChannelWorker};

/// External collaborators the pipeline core runs against.
pub struct Dependencies {
    pub repository: Arc<dyn ChannelRepository>,
    pub updater: Arc<dyn PlaylistUpdater>,
    pub matcher: Arc<dyn Matcher>,
    pub prober: Arc<dyn Prober>,
    pub changelog: Arc<dyn ChangelogSink>,
    pub config_store: Arc<dyn ConfigStore>,
}

/// The pipeline orchestrator and stream-quality scheduler.
pub struct PipelineService {
    updater: Arc<dyn PlaylistUpdater>,
    matcher: Arc<dyn Matcher>,
    config_store: Arc<dyn ConfigStore>,
    queue: Arc<CheckQueue>,
    coordinator: Arc<GlobalCoordinator>,
    worker: Arc<ChannelWorker>,
    config_tx: watch::Sender<Arc<PipelineConfig>>,
    stats: Arc<Mutex<CheckStatistics>>,
    current: Arc<Mutex<Option<i64>>>,
    wake: Notify,
    stop_tx: broadcast::Sender<()>,
    running: AtomicBool,
}

impl PipelineService {
    pub fn new(deps: Dependencies) -> Arc<Self> {
        let (config_tx, config_rx) = watch::channel(Arc::new(PipelineConfig::default()));
        let (stop_tx, _) = broadcast::channel(1);

        let queue = Arc::new(CheckQueue::new());
        let stats = Arc::new(Mutex::new(CheckStatistics::default()));
        let current = Arc::new(Mutex::new(None));

        let worker = Arc::new(ChannelWorker::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.prober),
            Arc::clone(&deps.changelog),
            config_rx,
            Arc::clone(&stats),
            Arc::clone(&current),
        ));

        let coordinator = Arc::new(GlobalCoordinator::new(
            Arc::clone(&deps.updater),
            Arc::clone(&deps.matcher),
            Arc::clone(&deps.repository),
            Arc::clone(&deps.changelog),
            Arc::clone(&queue),
            Arc::clone(&current),
            stop_tx.clone(),
        ));

        Arc::new(Self {
            updater: deps.updater,
            matcher: deps.matcher,
            config_store: deps.config_store,
            queue,
            coordinator,
            worker,
            config_tx,
            stats,
            current,
            wake: Notify::new(),
            stop_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Load the stored config and start the scheduler and worker
    /// loops. Idempotent; a second call is a warning no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Pipeline service is already running");
            return Ok(());
        }

        // A failed start must leave the service stopped: nothing has
        // been spawned yet, and a later retry must not short-circuit
        // on the running flag.
        let loaded = match self.config_store.load().await {
            Ok(config) => config.validate().map(|_| config),
            Err(e) => Err(e),
        };
        let config = match loaded {
            Ok(config) => config,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let mode = config.mode;
        self.config_tx.send_replace(Arc::new(config));

        let worker = Arc::clone(&self.worker);
        let queue = Arc::clone(&self.queue);
        tokio::spawn(run_worker_loop(worker, queue, self.stop_tx.subscribe()));

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run_scheduler_loop().await;
        });

        tracing::info!("Pipeline service started (mode: {})", mode.as_str());
        Ok(())
    }

    /// Signal both loops to stop. A channel currently being probed
    /// finishes; pending queue entries stay until the process exits.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            tracing::warn!("Pipeline service is not running");
            return;
        }
        let _ = self.stop_tx.send(());
        tracing::info!("Pipeline service stopping");
    }

    /// Current immutable config snapshot.
    pub fn config(&self) -> Arc<PipelineConfig> {
        self.config_tx.borrow().clone()
    }

    /// Observe config snapshot replacements.
    pub fn subscribe_config(&self) -> watch::Receiver<Arc<PipelineConfig>> {
        self.config_tx.subscribe()
    }

    /// Replace the config snapshot. The new config is validated first;
    /// on rejection the prior config stays active. On success the wake
    /// signal is raised so the change is observed on the very next
    /// loop iteration - a hard requirement, not an optimization.
    pub async fn update_config(&self, new_config: PipelineConfig) -> Result<()> {
        new_config.validate()?;

        let old_mode = self.config().mode;
        if old_mode != new_config.mode {
            tracing::info!(
                "Pipeline mode: {} -> {}",
                old_mode.as_str(),
                new_config.mode.as_str()
            );
        }

        if let Err(e) = self.config_store.save(&new_config).await {
            // The snapshot still applies; persistence catches up on
            // the next successful save.
            tracing::warn!("Could not persist config update: {}", e);
        }

        self.config_tx.send_replace(Arc::new(new_config));
        self.wake.notify_one();
        tracing::info!("Configuration updated and applied");
        Ok(())
    }

    /// Manually enqueue channels for checking. Returns how many new
    /// queue entries were created (duplicates merge their force flag).
    pub fn enqueue_channels(&self, channel_ids: &[i64], force: bool) -> usize {
        self.queue.enqueue_many(channel_ids, force)
    }

    /// Push-triggered path for playlist-update notifications,
    /// independent of the timer. Enqueues the channels iff the active
    /// mode checks on update.
    pub fn on_playlist_updated(&self, channel_ids: &[i64]) {
        let config = self.config();
        if !(config.mode.checks_on_update() && config.check_on_update) {
            tracing::debug!(
                "Ignoring playlist update for {} channels ({} does not check on update)",
                channel_ids.len(),
                config.mode.as_str()
            );
            return;
        }
        if self.coordinator.in_flight() {
            tracing::info!("Skipping playlist-update enqueue: global action in progress");
            return;
        }
        self.queue.enqueue_many(channel_ids, false);
    }

    /// Start a manual global action. Returns `Conflict` when one is
    /// already in flight.
    pub fn trigger_global_action(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(Error::NotRunning);
        }
        self.coordinator.try_start(GlobalTrigger::Manual)
    }

    /// Drop all pending queue entries.
    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    /// Seed the schedule state from persisted storage, typically
    /// before `start`. Without it a freshly started process treats the
    /// next due instant as never having fired.
    pub fn restore_last_global_check(&self, at: Option<chrono::DateTime<Utc>>) {
        self.coordinator.restore_last_global_check(at);
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.running.load(Ordering::SeqCst),
            queue_size: self.queue.len(),
            current_channel_id: *self.current.lock().unwrap(),
            statistics: *self.stats.lock().unwrap(),
            global_action_in_progress: self.coordinator.in_flight(),
            last_global_check_at: self.coordinator.last_global_check_at(),
            active_config: (*self.config()).clone(),
        }
    }

    async fn run_scheduler_loop(self: Arc<Self>) {
        tracing::info!("Scheduler loop started");
        let mut stop_rx = self.stop_tx.subscribe();
        let mut period = self.config().tick_interval();
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a fresh interval fires immediately.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = self.wake.notified() => {
                    // Config change or manual trigger: re-read the
                    // snapshot now rather than waiting out the period.
                    let config = self.config();
                    if config.tick_interval() != period {
                        period = config.tick_interval();
                        timer = tokio::time::interval(period);
                        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                        timer.tick().await;
                    }
                    self.evaluate_schedule();
                }
                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::info!("Scheduler loop stopped");
    }

    /// One scheduling cycle. Idempotent; a no-op when the mode is
    /// disabled.
    async fn tick(&self) {
        let config = self.config();
        if config.mode == PipelineMode::Disabled {
            return;
        }

        if self.coordinator.in_flight() {
            // Regular automation pauses while a global action owns the
            // queue; the schedule check below is also a no-op then.
            tracing::debug!("Skipping cycle: global action in progress");
            return;
        }

        if config.mode.updates_on_tick() {
            let mut updated: Vec<i64> = Vec::new();

            match self.updater.refresh_all_enabled().await {
                Ok(ids) => updated.extend(ids),
                Err(e) => tracing::error!("Playlist refresh failed: {}", e),
            }
            match self.matcher.assign_matching_streams().await {
                Ok(ids) => updated.extend(ids),
                Err(e) => tracing::error!("Stream matching failed: {}", e),
            }

            updated.sort_unstable();
            updated.dedup();

            if !updated.is_empty() {
                if config.mode.checks_on_update() && config.check_on_update {
                    self.queue.enqueue_many(&updated, false);
                } else {
                    tracing::debug!(
                        "{} channels updated; {} does not check on update",
                        updated.len(),
                        config.mode.as_str()
                    );
                }
            }
        }

        self.evaluate_schedule();
    }

    /// Start a scheduled global action when one is due. Schedule
    /// errors skip the period with a warning; they never crash the
    /// loop.
    fn evaluate_schedule(&self) {
        let config = self.config();
        if config.mode == PipelineMode::Disabled || !config.mode.has_scheduled_global() {
            return;
        }
        if self.coordinator.in_flight() {
            return;
        }

        match schedule::is_due(
            &config.global_schedule,
            self.coordinator.last_global_check_at(),
            Utc::now(),
        ) {
            Ok(true) => {
                // A conflict here means a manual trigger won the race;
                // the schedule state advances when that run completes.
                if self.coordinator.try_start(GlobalTrigger::Scheduled).is_ok() {
                    tracing::info!(
                        "Scheduled {} global action started",
                        match config.global_schedule.frequency {
                            crate::config::ScheduleFrequency::Daily => "daily",
                            crate::config::ScheduleFrequency::Monthly => "monthly",
                        }
                    );
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Skipping scheduled global action: {}", e),
        }
    }
}
