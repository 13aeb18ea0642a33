//! Configuration loading and validation.

use crate::defaults;
use crate::error::{Result, VoxpipeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub squelch: SquelchConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` selects the default device.
    pub device: Option<String>,
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
}

/// Squelch gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SquelchConfig {
    /// Samples per evaluation chunk.
    pub sample_size: usize,
    /// Window size in chunks, also the pre-roll length.
    pub prefix_chunks: usize,
    /// Squelch level; when unset it is detected by calibration.
    pub level: Option<f32>,
    /// Calibration duration in seconds.
    pub detect_secs: u64,
    /// Percentile of observed RMS values picked as the level.
    pub percentile: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Default for SquelchConfig {
    fn default() -> Self {
        Self {
            sample_size: defaults::SQUELCH_SAMPLE_SIZE,
            prefix_chunks: defaults::SQUELCH_PREFIX_CHUNKS,
            level: None,
            detect_secs: defaults::CALIBRATION_SECS,
            percentile: defaults::CALIBRATION_PERCENTILE,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if it is missing.
    ///
    /// Only a missing file falls back to defaults; invalid TOML stays an
    /// error so a broken config cannot be silently ignored.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)?;
                config.validate()?;
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Default config path: `~/.config/voxpipe/config.toml`.
    #[cfg(feature = "cli")]
    pub fn default_path() -> std::path::PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("voxpipe")
            .join("config.toml")
    }

    /// Apply environment variable overrides.
    ///
    /// Supported:
    /// - `VOXPIPE_AUDIO_DEVICE` → audio.device
    /// - `VOXPIPE_SQUELCH_LEVEL` → squelch.level
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("VOXPIPE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(level) = std::env::var("VOXPIPE_SQUELCH_LEVEL")
            && let Ok(parsed) = level.parse::<f32>()
        {
            self.squelch.level = Some(parsed);
        }

        self
    }

    /// Checks value ranges, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(VoxpipeError::InvalidConfiguration {
                message: "audio.sample_rate must be positive".to_string(),
            });
        }
        if self.squelch.sample_size == 0 {
            return Err(VoxpipeError::InvalidConfiguration {
                message: "squelch.sample_size must be positive".to_string(),
            });
        }
        if self.squelch.prefix_chunks == 0 {
            return Err(VoxpipeError::InvalidConfiguration {
                message: "squelch.prefix_chunks must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.squelch.percentile) || self.squelch.percentile == 0.0 {
            return Err(VoxpipeError::InvalidConfiguration {
                message: format!(
                    "squelch.percentile {} outside (0, 1]",
                    self.squelch.percentile
                ),
            });
        }
        Ok(())
    }
}
