//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{GatewayError, Result};
use crate::packet::crc::ChecksumScheme;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub radio: RadioConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LoRa link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u64,

    #[serde(default = "default_bandwidth_hz")]
    pub bandwidth_hz: u32,

    #[serde(default = "default_spreading_factor")]
    pub spreading_factor: u8,

    #[serde(default = "default_coding_rate_denominator")]
    pub coding_rate_denominator: u8,

    #[serde(default = "default_preamble_length")]
    pub preamble_length: u16,
}

/// Serial link to the LoRa modem
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path, or `"auto"` to try the usual paths
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Modem response timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Main loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    #[serde(default)]
    pub checksum: ChecksumScheme,

    /// Rows of 3 slots rendered per packet
    #[serde(default = "default_render_rows")]
    pub render_rows: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files (empty = console only)
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_frequency_hz() -> u64 { 433_000_000 }
fn default_bandwidth_hz() -> u32 { 125_000 }
fn default_spreading_factor() -> u8 { 7 }
fn default_coding_rate_denominator() -> u8 { 8 }
fn default_preamble_length() -> u16 { 8 }

fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_timeout_ms() -> u64 { 1000 }

fn default_poll_interval_ms() -> u64 { 100 }
fn default_stats_interval_ms() -> u64 { 60000 }
fn default_render_rows() -> usize { 1 }

fn default_log_level() -> String { "info".to_string() }

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency_hz(),
            bandwidth_hz: default_bandwidth_hz(),
            spreading_factor: default_spreading_factor(),
            coding_rate_denominator: default_coding_rate_denominator(),
            preamble_length: default_preamble_length(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stats_interval_ms: default_stats_interval_ms(),
            checksum: ChecksumScheme::default(),
            render_rows: default_render_rows(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> GatewayError {
    GatewayError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use atmos_gateway::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate radio configuration
        if !(100_000_000..=1_000_000_000).contains(&self.radio.frequency_hz) {
            return Err(invalid("frequency_hz must be between 100000000 and 1000000000"));
        }

        if ![125_000, 250_000, 500_000].contains(&self.radio.bandwidth_hz) {
            return Err(invalid("bandwidth_hz must be one of: 125000, 250000, 500000"));
        }

        if !(5..=11).contains(&self.radio.spreading_factor) {
            return Err(invalid("spreading_factor must be between 5 and 11"));
        }

        if !(5..=8).contains(&self.radio.coding_rate_denominator) {
            return Err(invalid("coding_rate_denominator must be between 5 and 8"));
        }

        if !(4..=24).contains(&self.radio.preamble_length) {
            return Err(invalid("preamble_length must be between 4 and 24"));
        }

        // Validate serial configuration
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty (use \"auto\" to auto-detect)"));
        }

        if ![9600, 19200, 38400, 57600, 115200].contains(&self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        // Validate gateway loop
        if self.gateway.poll_interval_ms == 0 || self.gateway.poll_interval_ms > 60000 {
            return Err(invalid("poll_interval_ms must be between 1 and 60000"));
        }

        if !(1000..=3_600_000).contains(&self.gateway.stats_interval_ms) {
            return Err(invalid("stats_interval_ms must be between 1000 and 3600000"));
        }

        // 22 rows of 3 covers all 64 slots
        if !(1..=22).contains(&self.gateway.render_rows) {
            return Err(invalid("render_rows must be between 1 and 22"));
        }

        // Validate log level
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        Ok(())
    }
}
