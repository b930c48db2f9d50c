//! streamrank - pipeline orchestrator and stream-quality scheduler.
//!
//! Automates quality assessment and ordering of the stream candidates
//! attached to logical channels. A single scheduling loop decides when
//! to update, match and check; a single worker drains the check queue
//! one channel at a time, probing streams past their re-check immunity
//! window, scoring them from technical metrics and rewriting the
//! channel's stream order when the ranking changes. A global action
//! runs the full Update -> Match -> Check pass over every channel,
//! bypassing immunity.
//!
//! Transport, persistence of channels and streams, playlist refresh,
//! pattern matching and the actual probing of streams live behind the
//! collaborator traits in [`traits`].

pub mod config;
pub mod error;
pub mod global;
pub mod immunity;
pub mod logging;
pub mod model;
pub mod queue;
pub mod reorder;
pub mod schedule;
pub mod score;
pub mod service;
pub mod traits;
pub mod worker;

pub use config::{
    FileConfigStore, GlobalSchedule, PipelineConfig, PipelineMode, ScheduleFrequency,
    ScoringWeights,
};
pub use error::{Error, Result};
pub use model::{
    Channel, CheckStatistics, GlobalTrigger, PipelineStatus, QueueEntry, StreamCandidate,
    StreamMetrics,
};
pub use service::{Dependencies, PipelineService};
