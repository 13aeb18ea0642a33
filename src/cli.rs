//! Command-line interface for voxpipe
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Streaming audio pipeline with voice-activity gating
#[derive(Parser, Debug)]
#[command(name = "voxpipe", version, about)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Gate an audio source and report detected utterances
    Listen {
        /// Read audio from a WAV file instead of the microphone
        #[arg(long, value_name = "FILE")]
        wav: Option<PathBuf>,

        /// Audio input device (see `voxpipe devices`)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Squelch level; skips calibration when given
        #[arg(long, value_name = "RMS")]
        level: Option<f32>,

        /// Calibration duration. Examples: 4s, 10s, 1m
        #[arg(long, value_name = "DURATION", default_value = "10s", value_parser = parse_duration)]
        calibrate: Duration,

        /// Play the gated audio on the default output device
        #[arg(long)]
        play: bool,
    },

    /// Detect a squelch level from ambient audio and print it
    Calibrate {
        /// Audio input device (see `voxpipe devices`)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Listening duration. Examples: 4s, 10s, 1m
        #[arg(long, value_name = "DURATION", default_value = "10s", value_parser = parse_duration)]
        duration: Duration,
    },

    /// List available audio input devices
    Devices,

    /// Play a WAV file through the pipeline to the output device
    Play {
        /// WAV file to play
        #[arg(value_name = "FILE")]
        wav: PathBuf,
    },
}

/// Parse a duration string.
///
/// Supports bare numbers (seconds) and any format accepted by `humantime`:
/// single-unit (`30s`, `5m`) and compound (`1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_seconds() {
        assert_eq!(parse_duration("10"), Ok(Duration::from_secs(10)));
    }

    #[test]
    fn parse_humantime_formats() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn cli_parses_listen_with_flags() {
        let cli = Cli::parse_from([
            "voxpipe", "listen", "--level", "0.05", "--calibrate", "4s", "--play",
        ]);
        match cli.command {
            Commands::Listen {
                level,
                calibrate,
                play,
                wav,
                device,
            } => {
                assert_eq!(level, Some(0.05));
                assert_eq!(calibrate, Duration::from_secs(4));
                assert!(play);
                assert!(wav.is_none());
                assert!(device.is_none());
            }
            other => panic!("expected Listen, got {:?}", other),
        }
    }

    #[test]
    fn cli_parses_devices() {
        let cli = Cli::parse_from(["voxpipe", "devices"]);
        assert!(matches!(cli.command, Commands::Devices));
    }
}
