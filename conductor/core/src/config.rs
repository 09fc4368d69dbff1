//! TOML Configuration File Support
//!
//! Configuration for the avatar controller, loaded from
//! `$XDG_CONFIG_HOME/avatar-overlay/avatar.toml` (typically
//! `~/.config/avatar-overlay/avatar.toml`).
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`AVATAR_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [sizing]
//! default_width = 200
//! default_height = 200
//! bubble_width = 360
//! bubble_padding = 32
//! avatar_height = 200
//! max_height = 640
//! scale = 1.25
//!
//! [model]
//! stream = true
//!
//! [timing]
//! settle_delay_ms = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sizing::{SizingConfig, WindowDimensions};

/// Settle delay used when the host has no layout-settled signal
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Sizing section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingToml {
    /// Avatar-only window width
    pub default_width: Option<f64>,

    /// Avatar-only window height
    pub default_height: Option<f64>,

    /// Chat bubble width
    pub bubble_width: Option<f64>,

    /// Padding around the bubble content
    pub bubble_padding: Option<f64>,

    /// Space reserved for the avatar
    pub avatar_height: Option<f64>,

    /// Maximum window height
    pub max_height: Option<f64>,

    /// UI scale factor
    pub scale: Option<f64>,
}

/// Model section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelToml {
    /// Request streamed responses
    pub stream: Option<bool>,
}

/// Timing section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingToml {
    /// Fallback settle delay before resizing, in milliseconds
    pub settle_delay_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarToml {
    /// Sizing configuration section
    pub sizing: SizingToml,

    /// Model configuration section
    pub model: ModelToml,

    /// Timing configuration section
    pub timing: TimingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration for the avatar controller
#[derive(Clone, Debug)]
pub struct AvatarConfig {
    /// Window sizing constants
    pub sizing: SizingConfig,

    /// Request streamed responses from `call_model`
    pub stream: bool,

    /// Delay before the fallback resize
    pub settle_delay: Duration,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            sizing: SizingConfig::default(),
            stream: true,
            settle_delay: DEFAULT_SETTLE_DELAY,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl AvatarConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check the sizing constants are usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizing = &self.sizing;
        let positive = [
            ("sizing.default_width", sizing.default_size.width),
            ("sizing.default_height", sizing.default_size.height),
            ("sizing.bubble_width", sizing.bubble_width),
            ("sizing.max_height", sizing.max_height),
            ("sizing.scale", sizing.scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        let non_negative = [
            ("sizing.bubble_padding", sizing.bubble_padding),
            ("sizing.avatar_height", sizing.avatar_height),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/avatar-overlay/avatar.toml` or
/// `~/.config/avatar-overlay/avatar.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("avatar-overlay").join("avatar.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// resulting values are invalid. A missing config file is not an error.
pub fn load_config() -> Result<AvatarConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// If `path` is `None`, only defaults and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<AvatarConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment overrides through `env`
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<AvatarConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AvatarConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_config = read_toml(config_path)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

fn read_toml(path: &Path) -> Result<AvatarToml, ConfigError> {
    let toml_content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(toml::from_str(&toml_content)?)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut AvatarConfig, toml: &AvatarToml) {
    let sizing = &mut config.sizing;
    let default_size = sizing.default_size;
    sizing.default_size = WindowDimensions::new(
        toml.sizing.default_width.unwrap_or(default_size.width),
        toml.sizing.default_height.unwrap_or(default_size.height),
    );
    if let Some(width) = toml.sizing.bubble_width {
        sizing.bubble_width = width;
    }
    if let Some(padding) = toml.sizing.bubble_padding {
        sizing.bubble_padding = padding;
    }
    if let Some(height) = toml.sizing.avatar_height {
        sizing.avatar_height = height;
    }
    if let Some(height) = toml.sizing.max_height {
        sizing.max_height = height;
    }
    if let Some(scale) = toml.sizing.scale {
        sizing.scale = scale;
    }

    if let Some(stream) = toml.model.stream {
        config.stream = stream;
    }

    if let Some(ms) = toml.timing.settle_delay_ms {
        config.settle_delay = Duration::from_millis(ms);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut AvatarConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(stream) = env("AVATAR_STREAM") {
        config.stream = stream != "0" && stream.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(delay) = env("AVATAR_SETTLE_DELAY_MS") {
        if let Ok(ms) = delay.parse::<u64>() {
            config.settle_delay = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(scale) = env("AVATAR_SCALE") {
        if let Ok(s) = scale.parse::<f64>() {
            config.sizing.scale = s;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(height) = env("AVATAR_MAX_HEIGHT") {
        if let Ok(h) = height.parse::<f64>() {
            config.sizing.max_height = h;
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Scale factor override
    pub scale: Option<f64>,

    /// Streaming override
    pub stream: Option<bool>,

    /// Settle delay override (milliseconds)
    pub settle_delay_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scale override
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Set streaming override
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Set settle delay override
    #[must_use]
    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut AvatarConfig) {
        if self.scale.is_some() || self.stream.is_some() || self.settle_delay_ms.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(scale) = self.scale {
            config.sizing.scale = scale;
        }
        if let Some(stream) = self.stream {
            config.stream = stream;
        }
        if let Some(ms) = self.settle_delay_ms {
            config.settle_delay = Duration::from_millis(ms);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
