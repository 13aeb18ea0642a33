//! Error types for voxpipe.
//!
//! Stream exhaustion is deliberately NOT represented here: blocks and sources
//! signal "no more elements" with `Ok(None)`, so callers can never mistake a
//! genuine failure for normal end-of-stream.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxpipeError {
    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("No default input device")]
    NoDefaultInputDevice,

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // Audio file errors
    #[error("Unsupported channel count: {channels} (mono or stereo only)")]
    UnsupportedChannelCount { channels: u16 },

    #[error("Unsupported audio format: {message}")]
    AudioFormat { message: String },

    #[error("Failed to read WAV data: {message}")]
    WavRead { message: String },

    // Squelch calibration errors
    #[error("Squelch calibration failed: {message}")]
    Calibration { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxpipeError>;
