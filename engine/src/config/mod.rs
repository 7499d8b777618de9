//! Configuration management
//!
//! This module handles loading, validation, and management of the Waypoint
//! configuration. Configuration is stored in TOML format at
//! ~/.waypoint/config.toml and created with defaults when missing.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **orchestrator**: Stage timeout, retry and re-optimization bounds
//! - **optimizer**: Pace idle buffers and category diversity
//! - **travel**: Fallback buffer and walking-time estimates
//! - **pool**: Duplicate detection radius
//! - **memory**: Memory backend and recall limit
//!
//! # Examples
//!
//! ```no_run
//! use waypoint_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Stage timeout: {}s", config.orchestrator.stage_timeout_secs);
//! # Ok(())
//! # }
//! ```

use crate::optimizer::OptimizerSettings;
use crate::orchestrator::OrchestratorSettings;
use crate::travel::TravelSettings;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `orchestrator.max_stage_retries`
const MAX_STAGE_RETRIES: u32 = 10;

/// Upper bound for `travel.default_buffer_minutes` (one day)
const MAX_DEFAULT_BUFFER_MINUTES: i64 = 24 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub travel: TravelConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Timeout per stage call
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "default_max_stage_retries")]
    pub max_stage_retries: u32,

    #[serde(default = "default_max_reoptimizations")]
    pub max_reoptimizations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_relaxed_buffer")]
    pub relaxed_buffer: f64,

    #[serde(default = "default_balanced_buffer")]
    pub balanced_buffer: f64,

    #[serde(default)]
    pub packed_buffer: f64,

    /// Visits of one category per day before the diversity penalty applies
    #[serde(default = "default_category_repeat_limit")]
    pub category_repeat_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelConfig {
    /// Used when a travel-time lookup fails or times out
    #[serde(default = "default_buffer_minutes")]
    pub default_buffer_minutes: i64,

    #[serde(default = "default_walking_speed_kmh")]
    pub walking_speed_kmh: f64,

    #[serde(default = "default_detour_factor")]
    pub detour_factor: f64,

    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Candidates with the same name closer than this are merged
    #[serde(default = "default_duplicate_radius_meters")]
    pub duplicate_radius_meters: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryBackend {
    InMemory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_backend")]
    pub backend: MemoryBackend,

    #[serde(default = "default_retrieve_limit")]
    pub retrieve_limit: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.waypoint")
}

fn default_stage_timeout_secs() -> u64 {
    30
}

fn default_max_stage_retries() -> u32 {
    2
}

fn default_max_reoptimizations() -> u32 {
    1
}

fn default_relaxed_buffer() -> f64 {
    0.2
}

fn default_balanced_buffer() -> f64 {
    0.1
}

fn default_category_repeat_limit() -> usize {
    2
}

fn default_buffer_minutes() -> i64 {
    20
}

fn default_walking_speed_kmh() -> f64 {
    4.8
}

fn default_detour_factor() -> f64 {
    1.3
}

fn default_call_timeout_secs() -> u64 {
    5
}

fn default_max_concurrent_lookups() -> usize {
    8
}

fn default_duplicate_radius_meters() -> f64 {
    50.0
}

fn default_memory_backend() -> MemoryBackend {
    MemoryBackend::Sqlite
}

fn default_retrieve_limit() -> usize {
    5
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
            max_stage_retries: default_max_stage_retries(),
            max_reoptimizations: default_max_reoptimizations(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            relaxed_buffer: default_relaxed_buffer(),
            balanced_buffer: default_balanced_buffer(),
            packed_buffer: 0.0,
            category_repeat_limit: default_category_repeat_limit(),
        }
    }
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            default_buffer_minutes: default_buffer_minutes(),
            walking_speed_kmh: default_walking_speed_kmh(),
            detour_factor: default_detour_factor(),
            call_timeout_secs: default_call_timeout_secs(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            duplicate_radius_meters: default_duplicate_radius_meters(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            retrieve_limit: default_retrieve_limit(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.waypoint/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Like [`Config::load_or_create`], for an explicit path
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        // The file keeps the unexpanded `~` form
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.waypoint/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".waypoint").join("config.toml"))
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("waypoint.db")
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            stage_timeout: Duration::from_secs(self.orchestrator.stage_timeout_secs),
            max_stage_retries: self.orchestrator.max_stage_retries,
            max_reoptimizations: self.orchestrator.max_reoptimizations,
        }
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            relaxed_buffer: self.optimizer.relaxed_buffer,
            balanced_buffer: self.optimizer.balanced_buffer,
            packed_buffer: self.optimizer.packed_buffer,
            category_repeat_limit: self.optimizer.category_repeat_limit,
        }
    }

    pub fn travel_settings(&self) -> TravelSettings {
        TravelSettings {
            default_buffer: chrono::Duration::minutes(self.travel.default_buffer_minutes),
            call_timeout: Duration::from_secs(self.travel.call_timeout_secs),
            max_concurrent_lookups: self.travel.max_concurrent_lookups,
        }
    }

    /// Validate values and expand paths
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The log level is unknown
    /// - A buffer fraction is outside [0, 1)
    /// - A timeout is zero
    /// - Stage retries or the default travel buffer are out of range
    /// - Walking speed is not positive or the detour factor is below 1
    /// - The data directory cannot be created
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        for (name, value) in [
            ("relaxed_buffer", self.optimizer.relaxed_buffer),
            ("balanced_buffer", self.optimizer.balanced_buffer),
            ("packed_buffer", self.optimizer.packed_buffer),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be at least 0.0 and below 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.orchestrator.stage_timeout_secs == 0 {
            return Err(EngineError::Config(
                "stage_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.travel.call_timeout_secs == 0 {
            return Err(EngineError::Config(
                "call_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.orchestrator.max_stage_retries > MAX_STAGE_RETRIES {
            return Err(EngineError::Config(format!(
                "max_stage_retries must be at most {}, got {}",
                MAX_STAGE_RETRIES, self.orchestrator.max_stage_retries
            )));
        }
        if !(0..=MAX_DEFAULT_BUFFER_MINUTES).contains(&self.travel.default_buffer_minutes) {
            return Err(EngineError::Config(format!(
                "default_buffer_minutes must be between 0 and {}, got {}",
                MAX_DEFAULT_BUFFER_MINUTES, self.travel.default_buffer_minutes
            )));
        }
        if !(self.travel.walking_speed_kmh > 0.0 && self.travel.walking_speed_kmh.is_finite()) {
            return Err(EngineError::Config(
                "walking_speed_kmh must be positive".to_string(),
            ));
        }
        if !(self.travel.detour_factor >= 1.0 && self.travel.detour_factor.is_finite()) {
            return Err(EngineError::Config(
                "detour_factor must be at least 1.0".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        let data_dir = dir.path().join("data");
        fs::write(
            &path,
            format!(
                "[core]\ndata_dir = {:?}\n{}",
                data_dir.to_str().unwrap(),
                body
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.orchestrator.stage_timeout_secs, 30);
        assert_eq!(config.orchestrator.max_stage_retries, 2);
        assert_eq!(config.orchestrator.max_reoptimizations, 1);
        assert_eq!(config.optimizer.relaxed_buffer, 0.2);
        assert_eq!(config.travel.default_buffer_minutes, 20);
        assert_eq!(config.memory.backend, MemoryBackend::Sqlite);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = expand_path(&PathBuf::from("~/test")).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[orchestrator]\nmax_stage_retries = 4\n");

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.orchestrator.max_stage_retries, 4);
        assert_eq!(config.orchestrator.stage_timeout_secs, 30);
        assert!(config.core.data_dir.exists());
        assert_eq!(config.travel_settings().default_buffer.num_minutes(), 20);
    }

    #[test]
    fn test_create_default_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::load_or_create_at(&path).unwrap();
        assert!(path.exists());
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("stage_timeout_secs = 30"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for body in [
            "log_level = \"loud\"\n",
            "[optimizer]\nrelaxed_buffer = 1.0\n",
            "[orchestrator]\nstage_timeout_secs = 0\n",
            "[travel]\nwalking_speed_kmh = 0.0\n",
            "[travel]\ndetour_factor = 0.5\n",
            "[memory]\nbackend = \"redis\"\n",
            "[orchestrator]\nmax_stage_retries = 4294967295\n",
            "[travel]\ndefault_buffer_minutes = -5\n",
            "[travel]\ndefault_buffer_minutes = 9223372036854775807\n",
        ] {
            let dir = TempDir::new().unwrap();
            let path = write_config(&dir, body);
            let err = Config::load_from_path(&path).unwrap_err();
            assert!(matches!(err, EngineError::Config(_)), "accepted: {}", body);
        }
    }
}
