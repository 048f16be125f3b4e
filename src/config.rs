//! Configuration for the companion sensing pipeline.

use crate::core::calibration::CanonicalSize;
use crate::core::game::GameConfig;
use crate::core::signal::SignalConfig;
use crate::core::zones::{DwellConfig, ZoneId};
use crate::source::types::DEFAULT_MAX_FEET_SPREAD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest window the band-pass filter can work with.
pub const MIN_WINDOW_SIZE: usize = 32;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Heart-rate window and band
    #[serde(default)]
    pub signal: SignalConfig,

    /// Dwell timing and overlap policy
    #[serde(default)]
    pub zones: DwellConfig,

    /// Round rules and difficulty thresholds
    #[serde(default)]
    pub game: GameConfig,

    /// Canonical plane the floor is mapped onto
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Threading and cadence
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Path for the snapshot, counters and session history
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("companion-sense");

        Self {
            signal: SignalConfig::default(),
            zones: DwellConfig::default(),
            game: GameConfig::default(),
            calibration: CalibrationConfig::default(),
            pipeline: PipelineConfig::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("companion-sense")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_path.join("snapshot.json")
    }

    pub fn counters_path(&self) -> PathBuf {
        self.data_path.join("counters.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_path.join("history.json")
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.signal.window_size < MIN_WINDOW_SIZE {
            return invalid(format!(
                "signal.window_size must be at least {MIN_WINDOW_SIZE}, got {}",
                self.signal.window_size
            ));
        }
        if !(self.pipeline.tick_rate_hz.is_finite() && self.pipeline.tick_rate_hz > 0.0) {
            return invalid("pipeline.tick_rate_hz must be positive".to_string());
        }
        let nyquist = self.pipeline.tick_rate_hz / 2.0;
        let (low, high) = (self.signal.band_low_hz, self.signal.band_high_hz);
        if !(low > 0.0 && low < high && high < nyquist) {
            return invalid(format!(
                "signal band {low}-{high} Hz must satisfy 0 < low < high < {nyquist} Hz"
            ));
        }
        let (min_bpm, max_bpm) = self.signal.bpm_range();
        if min_bpm > max_bpm {
            return invalid(format!(
                "signal band {low}-{high} Hz contains no whole BPM value"
            ));
        }

        if !positive(self.zones.dwell_secs) {
            return invalid("zones.dwell_secs must be positive".to_string());
        }
        if !non_negative(self.zones.cooldown_secs) {
            return invalid("zones.cooldown_secs must not be negative".to_string());
        }

        let game = &self.game;
        if !positive(game.round_secs) || !positive(game.base_stay_secs) {
            return invalid("game.round_secs and game.base_stay_secs must be positive".to_string());
        }
        if !non_negative(game.base_spawn_delay_secs) {
            return invalid("game.base_spawn_delay_secs must not be negative".to_string());
        }
        if game.target_zone_ids.is_empty() {
            return invalid("game.target_zone_ids must not be empty".to_string());
        }
        if game.target_zone_ids.contains(&game.start_zone_id) {
            return invalid(format!(
                "game.start_zone_id {} is also a target zone",
                game.start_zone_id
            ));
        }
        if game.thresholds.low_bpm >= game.thresholds.high_bpm {
            return invalid("game.thresholds.low_bpm must be below high_bpm".to_string());
        }

        let size = self.calibration.canonical_size;
        if !positive(size.width) || !positive(size.height) {
            return invalid(format!(
                "calibration.canonical_size {}x{} must be positive",
                size.width, size.height
            ));
        }

        if self.pipeline.channel_capacity == 0 {
            return invalid("pipeline.channel_capacity must be positive".to_string());
        }
        if self.pipeline.frame_budget.is_zero() || self.pipeline.stop_timeout.is_zero() {
            return invalid("pipeline.frame_budget and stop_timeout must be positive".to_string());
        }

        Ok(())
    }

    /// Every zone id the game refers to.
    pub fn game_zone_ids(&self) -> Vec<ZoneId> {
        let mut ids = vec![self.game.start_zone_id];
        ids.extend(&self.game.target_zone_ids);
        ids
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Canonical plane settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub canonical_size: CanonicalSize,
}

/// Threading, cadence and input handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Acquisition and processing cadence
    pub tick_rate_hz: f64,

    /// Time allowed for one estimate before it counts as an overrun
    #[serde(with = "duration_serde")]
    pub frame_budget: Duration,

    /// How long stop waits for each worker
    #[serde(with = "duration_serde")]
    pub stop_timeout: Duration,

    /// Bounded queue between acquisition and processing
    pub channel_capacity: usize,

    /// Flip camera x before calibration mapping
    pub mirror_input: bool,

    /// Widest ankle spread still treated as one tracked point
    pub max_feet_spread: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30.0,
            frame_budget: Duration::from_millis(33),
            stop_timeout: Duration::from_secs(1),
            channel_capacity: 256,
            mirror_input: false,
            max_feet_spread: DEFAULT_MAX_FEET_SPREAD,
        }
    }
}

impl PipelineConfig {
    /// Period between ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(f64::EPSILON))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    /// Cross-field constraint violated
    Invalid(String),
    /// Zone geometry rejected
    InvalidZone { id: ZoneId, reason: String },
    DuplicateZoneId(ZoneId),
    /// Stored calibration cannot produce a homography
    InvalidCalibration(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
            ConfigError::InvalidZone { id, reason } => write!(f, "Invalid zone {id}: {reason}"),
            ConfigError::DuplicateZoneId(id) => write!(f, "Duplicate zone id {id}"),
            ConfigError::InvalidCalibration(e) => write!(f, "Invalid calibration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("companion-sense-config-{}", uuid::Uuid::new_v4()))
            .join("config.json")
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.signal.window_size, 150);
        assert_eq!(config.game.target_zone_ids, vec![1, 2, 3]);
        assert_eq!(config.pipeline.frame_budget, Duration::from_millis(33));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_trip_through_file() {
        let path = temp_config_path();
        let mut config = Config::default();
        config.zones.dwell_secs = 1.5;
        config.pipeline.stop_timeout = Duration::from_millis(250);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.zones.dwell_secs, 1.5);
        assert_eq!(loaded.pipeline.stop_timeout, Duration::from_millis(250));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(&temp_config_path()).unwrap();
        assert_eq!(config.signal.window_size, 150);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.signal.window_size = 8;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.signal.band_high_hz = 20.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.zones.dwell_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.game.target_zone_ids.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.tick_rate_hz = 0.0;
        assert!(config.validate().is_err());

        // 60.5 to 60.9 BPM holds no whole beat count
        let mut config = Config::default();
        config.signal.band_low_hz = 60.5 / 60.0;
        config.signal.band_high_hz = 60.9 / 60.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_game_zone_ids_lists_start_then_targets() {
        let mut config = Config::default();
        assert_eq!(config.game_zone_ids(), vec![0, 1, 2, 3]);

        config.game.start_zone_id = 9;
        config.game.target_zone_ids = vec![4, 5];
        assert_eq!(config.game_zone_ids(), vec![9, 4, 5]);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "data_path": "/tmp/cs", "zones": { "dwell_secs": 2.0, "cooldown_secs": 1.0 } }"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.zones.dwell_secs, 2.0);
        assert_eq!(config.signal.band_low_hz, 0.75);
        assert_eq!(config.data_path, PathBuf::from("/tmp/cs"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
