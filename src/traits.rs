//! Collaborator traits.
//!
//! The pipeline core does not talk to the channel manager, ffmpeg, or
//! disk directly; everything it needs from the outside world comes
//! through these seams. Implementations are expected to be cheap to clone
//! behind `Arc<dyn ...>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::model::{Channel, StreamCandidate, StreamMetrics};

/// Source of truth for channels and their stream lists.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Every known channel.
    async fn list_channels(&self) -> Result<Vec<Channel>>;

    /// Streams for one channel, in the currently persisted
    /// presentation order.
    async fn get_channel_streams(&self, channel_id: i64) -> Result<Vec<StreamCandidate>>;

    /// Rewrite the presentation order of a channel's streams.
    async fn set_stream_order(&self, channel_id: i64, ordered_stream_ids: &[i64]) -> Result<()>;

    /// Persist the outcome of one probe: fresh score, metrics when the
    /// probe succeeded, and the completion timestamp. Called for
    /// failed probes too; a failed probe still counts as a check.
    async fn record_stream_check(
        &self,
        stream_id: i64,
        score: f64,
        metrics: Option<&StreamMetrics>,
        checked_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Refreshes provider playlists.
#[async_trait]
pub trait PlaylistUpdater: Send + Sync {
    /// Refresh a single account. The scheduling loops only ever
    /// refresh in bulk; this is carried on the seam for the API layer,
    /// which wraps the same updater for targeted refreshes.
    async fn refresh_account(&self, account_id: i64) -> Result<()>;

    /// Refresh every enabled account. Returns the ids of channels
    /// whose stream lists changed as a result.
    async fn refresh_all_enabled(&self) -> Result<Vec<i64>>;
}

/// Assigns unmatched streams to channels via the configured patterns.
///
/// The pattern set itself is owned and edited elsewhere; the core only
/// asks for a matching pass.
#[async_trait]
pub trait Matcher: Send + Sync {
    /// Run a matching pass. Returns the ids of channels that received
    /// new streams.
    async fn assign_matching_streams(&self) -> Result<Vec<i64>>;
}

/// Performs one bounded technical inspection of a stream.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe a stream within `timeout`. Implementations should return
    /// `Error::ProbeTimeout` when the bound is exceeded; the worker
    /// additionally enforces the bound from the outside.
    async fn probe(&self, stream: &StreamCandidate, timeout: Duration) -> Result<StreamMetrics>;
}

/// Fire-and-forget audit trail. Failures are logged by the caller and
/// never block pipeline progress.
#[async_trait]
pub trait ChangelogSink: Send + Sync {
    async fn record(
        &self,
        action: &str,
        details: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;
}

/// Loads and persists the pipeline configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<PipelineConfig>;

    async fn save(&self, config: &PipelineConfig) -> Result<()>;
}
