//! Launcher configuration: pin map, timing, web server and device name.
//!
//! Loaded from TOML; every section and field is optional and falls back to
//! the reference rig defaults.
//!
//! # Example
//!
//! ```rust
//! use prl_launcher::config::{Config, TimingConfig, WebConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.timing.launch_duration_ms, 1500);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_timing(TimingConfig::default().with_launch_duration_ms(3000))
//!     .with_web(WebConfig::default().with_port(9000));
//! assert!(config.validate().is_ok());
//!
//! // Or parse
//! let config = Config::from_toml_str("[timing]\nlimit_reversal_duration_ms = 400\n").unwrap();
//! assert_eq!(config.timing.limit_reversal_duration_ms, 400);
//! assert_eq!(config.timing.limit_poll_interval_ms, 100);
//! ```
//!
//! # TOML Layout
//!
//! ```toml
//! [device]
//! name = "PRL2016"
//!
//! [timing]
//! launch_duration_ms = 1500
//! relay_test_delay_ms = 300
//! limit_poll_interval_ms = 100
//! limit_reversal_duration_ms = 200
//! encoder_debounce_ms = 30
//! max_move_duration_ms = 20000   # optional
//!
//! [web]
//! port = 8000
//!
//! [[pins]]
//! name = "launch_1"
//! physical_id = 8
//! direction = "output"
//! # ... a [[pins]] table replaces the whole default map
//! ```

use std::path::Path;

use heapless::String as HString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::LauncherError;
use crate::pins::{reference_rig, LogicalPin, PinRegistry};

/// Maximum length for short config strings (device name)
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= MAX_SHORT_STRING)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Errors
// ============================================================================

/// Failure to load a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for [`Config`].
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// The file parsed but failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] LauncherError),
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device identification
    pub device: DeviceConfig,
    /// Relay and switch timing
    pub timing: TimingConfig,
    /// Web server configuration
    pub web: WebConfig,
    /// Pin map
    pub pins: Vec<LogicalPin>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            timing: TimingConfig::default(),
            web: WebConfig::default(),
            pins: reference_rig(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks timing constraints and the pin map.
    pub fn validate(&self) -> Result<(), LauncherError> {
        self.timing.validate()?;
        self.registry().map(|_| ())
    }

    /// Builds the validated pin registry.
    pub fn registry(&self) -> Result<PinRegistry, LauncherError> {
        PinRegistry::new(self.pins.clone())
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Set timing configuration
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Set web configuration
    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }

    /// Replace the pin map
    pub fn with_pins(mut self, pins: Vec<LogicalPin>) -> Self {
        self.pins = pins;
        self
    }
}

// ============================================================================
// Timing Config
// ============================================================================

/// Relay and switch timing, all in milliseconds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long launch relays stay energized
    pub launch_duration_ms: u64,
    /// Per-relay on-time during the bench test
    pub relay_test_delay_ms: u64,
    /// Limit switch poll interval
    pub limit_poll_interval_ms: u64,
    /// How long the turret backs off after a limit contact
    pub limit_reversal_duration_ms: u64,
    /// Encoder edges closer than this to the previous counted edge are ignored
    pub encoder_debounce_ms: u64,
    /// Stop any direction that has been moving this long (disabled when unset)
    pub max_move_duration_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            launch_duration_ms: 1500,
            relay_test_delay_ms: 300,
            limit_poll_interval_ms: 100,
            limit_reversal_duration_ms: 200,
            encoder_debounce_ms: 30,
            max_move_duration_ms: None,
        }
    }
}

impl TimingConfig {
    /// Set the launch pulse duration
    pub fn with_launch_duration_ms(mut self, ms: u64) -> Self {
        self.launch_duration_ms = ms;
        self
    }

    /// Set the relay test delay
    pub fn with_relay_test_delay_ms(mut self, ms: u64) -> Self {
        self.relay_test_delay_ms = ms;
        self
    }

    /// Set the limit poll interval
    pub fn with_limit_poll_interval_ms(mut self, ms: u64) -> Self {
        self.limit_poll_interval_ms = ms;
        self
    }

    /// Set the limit reversal duration
    pub fn with_limit_reversal_duration_ms(mut self, ms: u64) -> Self {
        self.limit_reversal_duration_ms = ms;
        self
    }

    /// Set the encoder debounce window
    pub fn with_encoder_debounce_ms(mut self, ms: u64) -> Self {
        self.encoder_debounce_ms = ms;
        self
    }

    /// Set the maximum on-time of a motion relay
    pub fn with_max_move_duration_ms(mut self, ms: Option<u64>) -> Self {
        self.max_move_duration_ms = ms;
        self
    }

    /// Checks the relations between durations.
    pub fn validate(&self) -> Result<(), LauncherError> {
        if self.relay_test_delay_ms >= self.launch_duration_ms {
            return Err(LauncherError::config(format!(
                "relay_test_delay_ms ({}) must be shorter than launch_duration_ms ({})",
                self.relay_test_delay_ms, self.launch_duration_ms
            )));
        }
        if self.limit_poll_interval_ms == 0 {
            return Err(LauncherError::config("limit_poll_interval_ms must be non-zero"));
        }
        if self.encoder_debounce_ms == 0 {
            return Err(LauncherError::config("encoder_debounce_ms must be non-zero"));
        }
        if self.max_move_duration_ms == Some(0) {
            return Err(LauncherError::config("max_move_duration_ms must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Web Config
// ============================================================================

/// Web server configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Port to listen on
    pub port: u16,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
    /// Whether web server is enabled
    pub enabled: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_permissive: true,
            enabled: true,
        }
    }
}

impl WebConfig {
    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set CORS mode
    pub fn with_cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    /// Enable or disable web server
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Device identification configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Name returned by the API index route
    pub name: ShortString,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: short_string("PRL2016"),
        }
    }
}

impl DeviceConfig {
    /// Set the device name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = short_string(name);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
