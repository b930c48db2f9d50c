//! Pipeline configuration.
//!
//! Configuration is read by the loops as an atomically swapped
//! immutable snapshot (`Arc<PipelineConfig>` behind a watch channel);
//! no reader ever observes a half-updated config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Which automatic phases are active.
///
/// The half-step modes add the scheduled global action on top of the
/// whole-number mode below them; `pipeline_3` runs scheduled global
/// actions only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineMode {
    #[serde(rename = "pipeline_1")]
    Pipeline1,
    #[serde(rename = "pipeline_1_5")]
    Pipeline15,
    #[serde(rename = "pipeline_2")]
    Pipeline2,
    #[serde(rename = "pipeline_2_5")]
    Pipeline25,
    #[serde(rename = "pipeline_3")]
    Pipeline3,
    #[serde(rename = "disabled")]
    Disabled,
}

impl PipelineMode {
    /// Automatic playlist update + stream matching on each tick.
    pub fn updates_on_tick(&self) -> bool {
        !matches!(self, Self::Pipeline3 | Self::Disabled)
    }

    /// Enqueue channels for checking when their playlists update.
    pub fn checks_on_update(&self) -> bool {
        matches!(self, Self::Pipeline1 | Self::Pipeline15)
    }

    /// Scheduled global actions are active in this mode.
    pub fn has_scheduled_global(&self) -> bool {
        matches!(self, Self::Pipeline15 | Self::Pipeline25 | Self::Pipeline3)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline1 => "pipeline_1",
            Self::Pipeline15 => "pipeline_1_5",
            Self::Pipeline2 => "pipeline_2",
            Self::Pipeline25 => "pipeline_2_5",
            Self::Pipeline3 => "pipeline_3",
            Self::Disabled => "disabled",
        }
    }
}

/// Weights for the quality score terms.
///
/// Used as an unnormalized weighted sum: a weight set that does not
/// sum to 1.0 is applied as-is, never renormalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub bitrate: f64,
    pub resolution: f64,
    pub fps: f64,
    pub codec: f64,
    pub errors: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            bitrate: 0.30,
            resolution: 0.25,
            fps: 0.15,
            codec: 0.10,
            errors: 0.20,
        }
    }
}

impl ScoringWeights {
    fn validate(&self) -> Result<()> {
        let terms = [
            ("bitrate", self.bitrate),
            ("resolution", self.resolution),
            ("fps", self.fps),
            ("codec", self.codec),
            ("errors", self.errors),
        ];
        for (name, w) in terms {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::config(format!(
                    "scoring weight '{}' must be finite and non-negative, got {}",
                    name, w
                )));
            }
        }
        Ok(())
    }
}

/// How often a scheduled global action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    Daily,
    Monthly,
}

/// When the scheduled global action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSchedule {
    pub enabled: bool,
    pub frequency: ScheduleFrequency,
    pub hour: u32,
    pub minute: u32,
    /// Day of month for monthly schedules; clamped to the last valid
    /// day of shorter months.
    pub day_of_month: u32,
}

impl Default for GlobalSchedule {
    fn default() -> Self {
        // 3 AM for off-peak checking.
        Self {
            enabled: true,
            frequency: ScheduleFrequency::Daily,
            hour: 3,
            minute: 0,
            day_of_month: 1,
        }
    }
}

impl GlobalSchedule {
    fn validate(&self) -> Result<()> {
        if self.hour > 23 {
            return Err(Error::config(format!(
                "schedule hour must be 0-23, got {}",
                self.hour
            )));
        }
        if self.minute > 59 {
            return Err(Error::config(format!(
                "schedule minute must be 0-59, got {}",
                self.minute
            )));
        }
        if !(1..=31).contains(&self.day_of_month) {
            return Err(Error::config(format!(
                "schedule day_of_month must be 1-31, got {}",
                self.day_of_month
            )));
        }
        Ok(())
    }
}

fn default_check_on_update() -> bool {
    true
}

fn default_immunity_window_secs() -> u64 {
    7200 // 2 hours
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_tick_interval_secs() -> u64 {
    60
}

/// Full pipeline configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    #[serde(default = "default_check_on_update")]
    pub check_on_update: bool,
    #[serde(default)]
    pub scoring_weights: ScoringWeights,
    /// Minimum seconds between two non-forced probes of one stream.
    #[serde(default = "default_immunity_window_secs")]
    pub immunity_window_secs: u64,
    /// Bound on a single probe call.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Period of the scheduler loop timer.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default)]
    pub global_schedule: GlobalSchedule,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Pipeline15,
            check_on_update: true,
            scoring_weights: ScoringWeights::default(),
            immunity_window_secs: default_immunity_window_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            tick_interval_secs: default_tick_interval_secs(),
            global_schedule: GlobalSchedule::default(),
        }
    }
}

impl PipelineConfig {
    pub fn immunity_window(&self) -> Duration {
        Duration::from_secs(self.immunity_window_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Reject malformed configs before they replace the active
    /// snapshot; the caller retains the prior config on error.
    pub fn validate(&self) -> Result<()> {
        self.scoring_weights.validate()?;
        self.global_schedule.validate()?;
        if self.probe_timeout_secs == 0 {
            return Err(Error::config("probe_timeout_secs must be at least 1"));
        }
        if self.tick_interval_secs == 0 {
            return Err(Error::config("tick_interval_secs must be at least 1"));
        }
        Ok(())
    }
}

/// JSON file-backed [`ConfigStore`](crate::traits::ConfigStore).
///
/// A missing or unreadable file yields the defaults (and writes them
/// out), so a fresh deployment starts with a sensible config on disk.
/// A malformed file is logged and replaced by defaults rather than
/// failing startup; malformed *updates* are rejected upstream by
/// [`PipelineConfig::validate`].
pub struct FileConfigStore {
    path: std::path::PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write(&self, config: &PipelineConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::config(format!("cannot create config dir: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| Error::config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| Error::config(format!("cannot write {}: {}", self.path.display(), e)))
    }
}

#[async_trait::async_trait]
impl crate::traits::ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<PipelineConfig> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<PipelineConfig>(&raw) {
                Ok(config) => {
                    if let Err(e) = config.validate() {
                        tracing::warn!(
                            "Config {} is invalid ({}), using defaults",
                            self.path.display(),
                            e
                        );
                        return Ok(PipelineConfig::default());
                    }
                    Ok(config)
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not parse config {}: {}, using defaults",
                        self.path.display(),
                        e
                    );
                    Ok(PipelineConfig::default())
                }
            },
            Err(_) => {
                let config = PipelineConfig::default();
                self.write(&config)?;
                tracing::info!("Created default config at {}", self.path.display());
                Ok(config)
            }
        }
    }

    async fn save(&self, config: &PipelineConfig) -> Result<()> {
        config.validate()?;
        self.write(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ConfigStore;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.mode, PipelineMode::Pipeline15);
        assert_eq!(cfg.immunity_window(), Duration::from_secs(7200));
        assert_eq!(cfg.scoring_weights.bitrate, 0.30);
    }

    #[test]
    fn test_mode_phase_table() {
        use PipelineMode::*;
        for mode in [Pipeline1, Pipeline15, Pipeline2, Pipeline25] {
            assert!(mode.updates_on_tick(), "{} should update", mode.as_str());
        }
        assert!(!Pipeline3.updates_on_tick());
        assert!(!Disabled.updates_on_tick());

        assert!(Pipeline1.checks_on_update());
        assert!(Pipeline15.checks_on_update());
        for mode in [Pipeline2, Pipeline25, Pipeline3, Disabled] {
            assert!(!mode.checks_on_update(), "{} should not check", mode.as_str());
        }

        for mode in [Pipeline15, Pipeline25, Pipeline3] {
            assert!(mode.has_scheduled_global());
        }
        for mode in [Pipeline1, Pipeline2, Disabled] {
            assert!(!mode.has_scheduled_global());
        }
    }

    #[test]
    fn test_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&PipelineMode::Pipeline15).unwrap(),
            "\"pipeline_1_5\""
        );
        for mode in [
            PipelineMode::Pipeline1,
            PipelineMode::Pipeline15,
            PipelineMode::Pipeline2,
            PipelineMode::Pipeline25,
            PipelineMode::Pipeline3,
            PipelineMode::Disabled,
        ] {
            let s = serde_json::to_string(&mode).unwrap();
            let back: PipelineMode = serde_json::from_str(&s).unwrap();
            assert_eq!(back, mode);
            assert_eq!(s, format!("\"{}\"", mode.as_str()));
        }
    }

    #[test]
    fn test_invalid_weight_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.scoring_weights.errors = -0.1;
        assert!(cfg.validate().is_err());

        cfg.scoring_weights.errors = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.global_schedule.hour = 24;
        assert!(cfg.validate().is_err());

        cfg.global_schedule.hour = 3;
        cfg.global_schedule.day_of_month = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_json_gets_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"mode":"pipeline_2"}"#).unwrap();
        assert_eq!(cfg.mode, PipelineMode::Pipeline2);
        assert!(cfg.check_on_update);
        assert_eq!(cfg.immunity_window_secs, 7200);
        assert_eq!(cfg.global_schedule.hour, 3);
    }

    #[tokio::test]
    async fn test_file_store_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let store = FileConfigStore::new(&path);

        let cfg = store.load().await.unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("pipeline.json"));

        let mut cfg = PipelineConfig::default();
        cfg.mode = PipelineMode::Pipeline3;
        cfg.immunity_window_secs = 3600;
        store.save(&cfg).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, cfg);
    }

    #[tokio::test]
    async fn test_file_store_rejects_invalid_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("pipeline.json"));

        let mut cfg = PipelineConfig::default();
        cfg.global_schedule.minute = 60;
        assert!(store.save(&cfg).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_malformed_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileConfigStore::new(&path);
        let cfg = store.load().await.unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }
}
