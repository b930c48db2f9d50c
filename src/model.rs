//! Core data model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Technical metrics collected by a single probe of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetrics {
    pub bitrate_kbps: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub interlaced: bool,
    pub error_count: u32,
    pub discontinuity_count: u32,
    pub timeout_count: u32,
    pub dropped_frames: u32,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self {
            bitrate_kbps: 0,
            width: 0,
            height: 0,
            fps: 0.0,
            video_codec: String::new(),
            audio_codec: String::new(),
            interlaced: false,
            error_count: 0,
            discontinuity_count: 0,
            timeout_count: 0,
            dropped_frames: 0,
        }
    }
}

/// One candidate stream attached to a channel.
///
/// Owned by the channel repository; the core only writes `score`,
/// `metrics` and `last_checked_at` back through repository calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamCandidate {
    pub id: i64,
    pub channel_id: i64,
    pub name: String,
    pub metrics: Option<StreamMetrics>,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Cached quality score in [0, 1].
    pub score: f64,
}

impl StreamCandidate {
    pub fn new(id: i64, channel_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            channel_id,
            name: name.into(),
            metrics: None,
            last_checked_at: None,
            score: 0.0,
        }
    }
}

/// A logical channel with an ordered stream list.
///
/// The stream id order defines presentation order; rewriting it is the
/// end product of a channel check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub stream_ids: Vec<i64>,
}

/// An entry in the check queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub channel_id: i64,
    pub enqueued_at: DateTime<Utc>,
    /// Probe every stream regardless of immunity. Consumed once at
    /// dequeue; never persisted as standing channel state.
    pub force: bool,
}

/// What started a global action. Shared path, label differs for
/// logging and changelog purposes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalTrigger {
    Manual,
    Scheduled,
}

impl GlobalTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

/// Cumulative worker statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStatistics {
    /// Channels processed to completion.
    pub checked: u64,
    /// Channels aborted on repository errors.
    pub failed: u64,
    /// Channels whose persisted order actually changed.
    pub improved: u64,
}

/// Snapshot returned by the status operation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub queue_size: usize,
    pub current_channel_id: Option<i64>,
    pub statistics: CheckStatistics,
    pub global_action_in_progress: bool,
    pub last_global_check_at: Option<DateTime<Utc>>,
    pub active_config: crate::config::PipelineConfig,
}
