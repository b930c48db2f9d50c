//! Channel check worker.
//!
//! A single worker drains the check queue strictly one channel at a
//! time - a deliberate backpressure policy protecting the upstream
//! provider, never relaxed to parallel probing. For each dequeued
//! channel it gates every stream through the immunity window, probes
//! the eligible ones within a bounded timeout, persists fresh scores,
//! and applies the canonical reorder when it differs from the
//! persisted order.

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::immunity;
use crate::model::{CheckStatistics, QueueEntry, StreamCandidate};
use crate::queue::CheckQueue;
use crate::reorder::{plan_order, ScoredStream};
use crate::score::score_stream;
use crate::traits::{ChangelogSink, ChannelRepository, Prober};

/// Outcome of processing one channel, for statistics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub total_streams: usize,
    pub streams_probed: usize,
    pub order_changed: bool,
}

/// Processes dequeued channels against the collaborators.
pub struct ChannelWorker {
    repo: Arc<dyn ChannelRepository>,
    prober: Arc<dyn Prober>,
    changelog: Arc<dyn ChangelogSink>,
    config: watch::Receiver<Arc<PipelineConfig>>,
    stats: Arc<Mutex<CheckStatistics>>,
    current: Arc<Mutex<Option<i64>>>,
}

impl ChannelWorker {
    pub fn new(
        repo: Arc<dyn ChannelRepository>,
        prober: Arc<dyn Prober>,
        changelog: Arc<dyn ChangelogSink>,
        config: watch::Receiver<Arc<PipelineConfig>>,
        stats: Arc<Mutex<CheckStatistics>>,
        current: Arc<Mutex<Option<i64>>>,
    ) -> Self {
        Self {
            repo,
            prober,
            changelog,
            config,
            stats,
            current,
        }
    }

    /// Process one queue entry. Errors are absorbed here: the channel
    /// is marked failed and remains eligible for re-enqueue on the
    /// next qualifying trigger; the worker loop never stops.
    pub async fn process(&self, entry: QueueEntry) {
        let channel_id = entry.channel_id;
        *self.current.lock().unwrap() = Some(channel_id);

        match self.check_channel(&entry).await {
            Ok(outcome) => {
                let mut stats = self.stats.lock().unwrap();
                stats.checked += 1;
                if outcome.order_changed {
                    stats.improved += 1;
                }
                drop(stats);
                tracing::info!(
                    "Channel {} checked: {} streams, {} probed, order {}",
                    channel_id,
                    outcome.total_streams,
                    outcome.streams_probed,
                    if outcome.order_changed { "updated" } else { "unchanged" }
                );
            }
            Err(e) => {
                self.stats.lock().unwrap().failed += 1;
                tracing::error!("Channel {} check failed: {}", channel_id, e);
                self.record_changelog(
                    "stream_check",
                    json!({
                        "channel_id": channel_id,
                        "success": false,
                        "error": e.to_string(),
                    }),
                )
                .await;
            }
        }

        *self.current.lock().unwrap() = None;
    }

    async fn check_channel(&self, entry: &QueueEntry) -> Result<ChannelOutcome> {
        let channel_id = entry.channel_id;
        let config = self.config.borrow().clone();

        let streams = self.repo.get_channel_streams(channel_id).await?;
        let total_streams = streams.len();

        if streams.is_empty() {
            tracing::info!("No streams found for channel {}", channel_id);
            self.record_changelog(
                "stream_check",
                json!({
                    "channel_id": channel_id,
                    "success": true,
                    "total_streams": 0,
                    "streams_probed": 0,
                    "order_changed": false,
                }),
            )
            .await;
            return Ok(ChannelOutcome {
                total_streams: 0,
                streams_probed: 0,
                order_changed: false,
            });
        }

        // The entry's force flag applies to every stream probed during
        // this dequeue and is discarded afterwards.
        let window = config.immunity_window();
        let mut scored = Vec::with_capacity(streams.len());
        let mut streams_probed = 0usize;

        for stream in &streams {
            let eligible =
                immunity::is_eligible(stream.last_checked_at, Utc::now(), window, entry.force);

            let score = if eligible {
                streams_probed += 1;
                self.probe_and_persist(stream, &config).await?
            } else {
                tracing::debug!(
                    "Stream {} inside immunity window, reusing cached score {:.3}",
                    stream.id,
                    stream.score
                );
                stream.score
            };

            scored.push(ScoredStream {
                stream_id: stream.id,
                score,
            });
        }

        let before: Vec<i64> = scored.iter().map(|s| s.stream_id).collect();
        let planned = plan_order(&scored);
        let order_changed = planned.is_some();

        if let Some(new_order) = &planned {
            self.repo.set_stream_order(channel_id, new_order).await?;
            tracing::info!("Channel {} stream order rewritten", channel_id);
        }

        let after = planned.unwrap_or_else(|| before.clone());
        let mut stream_scores: Vec<serde_json::Value> = scored
            .iter()
            .map(|s| json!({"stream_id": s.stream_id, "score": s.score}))
            .collect();
        stream_scores.truncate(10);

        self.record_changelog(
            "stream_check",
            json!({
                "channel_id": channel_id,
                "success": true,
                "total_streams": total_streams,
                "streams_probed": streams_probed,
                "order_changed": order_changed,
                "order_before": before,
                "order_after": after,
                "stream_scores": stream_scores,
            }),
        )
        .await;

        Ok(ChannelOutcome {
            total_streams,
            streams_probed,
            order_changed,
        })
    }

    /// Probe one stream and persist the result. A probe failure or
    /// timeout yields score 0 and still consumes the check slot, so a
    /// broken stream is not hammered on every dequeue.
    async fn probe_and_persist(
        &self,
        stream: &StreamCandidate,
        config: &PipelineConfig,
    ) -> Result<f64> {
        // Small random start delay to avoid thundering against the
        // provider when many streams become eligible at once.
        let jitter = rand::thread_rng().gen_range(0..100);
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let timeout = config.probe_timeout();
        let result = match tokio::time::timeout(timeout, self.prober.probe(stream, timeout)).await
        {
            Ok(inner) => inner,
            Err(_) => Err(Error::ProbeTimeout(timeout)),
        };

        let completed_at = Utc::now();
        match result {
            Ok(metrics) => {
                let score = score_stream(&metrics, &config.scoring_weights);
                self.repo
                    .record_stream_check(stream.id, score, Some(&metrics), completed_at)
                    .await?;
                tracing::debug!("Stream {} probed, score {:.3}", stream.id, score);
                Ok(score)
            }
            Err(e) => {
                // Metrics are unavailable; the score is 0 without
                // evaluating the weighted formula.
                tracing::warn!("Probe failed for stream {}: {}", stream.id, e);
                self.repo
                    .record_stream_check(stream.id, 0.0, None, completed_at)
                    .await?;
                Ok(0.0)
            }
        }
    }

    async fn record_changelog(&self, action: &str, details: serde_json::Value) {
        if let Err(e) = self.changelog.record(action, details, Utc::now()).await {
            tracing::warn!("Failed to record changelog entry '{}': {}", action, e);
        }
    }
}

/// Run the worker loop: drain the queue one channel at a time, park on
/// the queue's wakeup when empty, exit on the stop signal.
pub(crate) async fn run_worker_loop(
    worker: Arc<ChannelWorker>,
    queue: Arc<CheckQueue>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    tracing::info!("Check worker started");
    loop {
        // dequeue_into marks the channel as in progress atomically
        // with the pop, keeping drain detection sound.
        while let Some(entry) = queue.dequeue_into(&worker.current) {
            worker.process(entry).await;
            if !matches!(
                stop_rx.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            ) {
                tracing::info!("Check worker stopped");
                return;
            }
        }

        tokio::select! {
            _ = stop_rx.recv() => {
                tracing::info!("Check worker stopped");
                return;
            }
            _ = queue.wait() => {}
        }
    }
}
