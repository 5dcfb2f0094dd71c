//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Library discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    /// Recurse into subdirectories (default false: top level only)
    #[serde(default)]
    pub recursive: bool,
    /// Optional regex a file path must match to be considered
    #[serde(default)]
    pub include_pattern: Option<String>,
    /// Minimum source size in GB (fractional allowed)
    #[serde(default = "default_min_size_gb")]
    pub min_size_gb: f64,
}

fn default_min_size_gb() -> f64 {
    0.7
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            include_pattern: None,
            min_size_gb: default_min_size_gb(),
        }
    }
}

/// Sampling and estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingConfig {
    /// Duration of each probe encode in seconds
    #[serde(default = "default_sample_duration_secs")]
    pub sample_duration_secs: u64,
    /// Estimated/original size ratio above which the full encode is skipped
    #[serde(default = "default_min_size_ratio")]
    pub min_size_ratio: f64,
    /// Sources below this average bitrate are resolved without sampling
    #[serde(default = "default_min_bitrate_kbps")]
    pub min_bitrate_kbps: u32,
    /// Wall-clock bound for a single sample encode
    #[serde(default = "default_sample_timeout_secs")]
    pub sample_timeout_secs: u64,
}

fn default_sample_duration_secs() -> u64 {
    5
}

fn default_min_size_ratio() -> f64 {
    0.8
}

fn default_min_bitrate_kbps() -> u32 {
    2000
}

fn default_sample_timeout_secs() -> u64 {
    150
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_duration_secs: default_sample_duration_secs(),
            min_size_ratio: default_min_size_ratio(),
            min_bitrate_kbps: default_min_bitrate_kbps(),
            sample_timeout_secs: default_sample_timeout_secs(),
        }
    }
}

/// Encoder quality configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Width at or above which the HD quality tier applies
    #[serde(default = "default_resolution_threshold_width")]
    pub resolution_threshold_width: u32,
    /// Constant-quality value for HD sources
    #[serde(default = "default_quality_hd")]
    pub quality_hd: u32,
    /// Constant-quality value for SD sources
    #[serde(default = "default_quality_sd")]
    pub quality_sd: u32,
    /// Constant-quality value when the source width is unknown
    #[serde(default = "default_quality_fallback")]
    pub quality_fallback: u32,
    /// Wall-clock bound for a full encode
    #[serde(default = "default_encode_timeout_secs")]
    pub encode_timeout_secs: u64,
}

fn default_resolution_threshold_width() -> u32 {
    1920
}

fn default_quality_hd() -> u32 {
    28
}

fn default_quality_sd() -> u32 {
    26
}

fn default_quality_fallback() -> u32 {
    27
}

fn default_encode_timeout_secs() -> u64 {
    10800
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            resolution_threshold_width: default_resolution_threshold_width(),
            quality_hd: default_quality_hd(),
            quality_sd: default_quality_sd(),
            quality_fallback: default_quality_fallback(),
            encode_timeout_secs: default_encode_timeout_secs(),
        }
    }
}

/// Replacement and batch behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorConfig {
    /// Keep the original and place the encoded file beside it
    #[serde(default)]
    pub keep_original: bool,
    /// Copy originals into this directory before replacing them
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    /// Exclude sources already encoded as HEVC
    #[serde(default = "default_true")]
    pub skip_hevc: bool,
    /// Exclude sources already encoded as AV1
    #[serde(default = "default_true")]
    pub skip_av1: bool,
    /// Stop starting new candidates after this many hours (0 = unlimited)
    #[serde(default)]
    pub time_budget_hours: f64,
}

fn default_true() -> bool {
    true
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            keep_original: false,
            backup_dir: None,
            skip_hevc: default_true(),
            skip_av1: default_true(),
            time_budget_hours: 0.0,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - HEVC_RECODE_RECURSIVE -> library.recursive
    /// - HEVC_RECODE_MIN_SIZE_GB -> library.min_size_gb
    /// - HEVC_RECODE_SAMPLE_DURATION_SECS -> sampling.sample_duration_secs
    /// - HEVC_RECODE_MIN_SIZE_RATIO -> sampling.min_size_ratio
    /// - HEVC_RECODE_MIN_BITRATE_KBPS -> sampling.min_bitrate_kbps
    /// - HEVC_RECODE_KEEP_ORIGINAL -> behavior.keep_original
    /// - HEVC_RECODE_TIME_BUDGET_HOURS -> behavior.time_budget_hours
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("HEVC_RECODE_RECURSIVE") {
            if let Some(flag) = parse_bool(&val) {
                self.library.recursive = flag;
            }
        }

        if let Ok(val) = env::var("HEVC_RECODE_MIN_SIZE_GB") {
            if let Ok(gb) = val.parse::<f64>() {
                self.library.min_size_gb = gb;
            }
        }

        if let Ok(val) = env::var("HEVC_RECODE_SAMPLE_DURATION_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.sampling.sample_duration_secs = secs;
            }
        }

        if let Ok(val) = env::var("HEVC_RECODE_MIN_SIZE_RATIO") {
            if let Ok(ratio) = val.parse::<f64>() {
                self.sampling.min_size_ratio = ratio;
            }
        }

        if let Ok(val) = env::var("HEVC_RECODE_MIN_BITRATE_KBPS") {
            if let Ok(kbps) = val.parse::<u32>() {
                self.sampling.min_bitrate_kbps = kbps;
            }
        }

        if let Ok(val) = env::var("HEVC_RECODE_KEEP_ORIGINAL") {
            if let Some(flag) = parse_bool(&val) {
                self.behavior.keep_original = flag;
            }
        }

        if let Ok(val) = env::var("HEVC_RECODE_TIME_BUDGET_HOURS") {
            if let Ok(hours) = val.parse::<f64>() {
                self.behavior.time_budget_hours = hours;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Minimum source size in bytes derived from the GB setting
    pub fn min_size_bytes(&self) -> u64 {
        (self.library.min_size_gb * 1_000_000_000.0) as u64
    }

    /// Minimum average byte rate derived from the bitrate setting
    pub fn min_byte_rate(&self) -> u64 {
        self.sampling.min_bitrate_kbps as u64 * 1000 / 8
    }
}

/// Accept "true", "1", "yes" as true; "false", "0", "no" as false
fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
