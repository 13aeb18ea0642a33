//! voxpipe - composable async audio pipeline with voice-activity gating.
//!
//! Streams live or file-based audio through transformation stages
//! (resampling, squelch) before handing detected utterances to a downstream
//! consumer such as a speech-to-text client.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;

// Core data model and iteration protocol
pub use audio::block::{AudioBlock, ChunkQueue, ChunkQueueReceiver, ChunkStream, EndSignal};
pub use audio::chunk::{AudioChunk, merge_chunks, split_chunk};
pub use audio::resegment::{EvenChunks, SlidingWindow, Windowed};

// Sources and processors (source → process → consume)
#[cfg(feature = "cpal-audio")]
pub use audio::capture::Microphone;
#[cfg(feature = "cpal-audio")]
pub use audio::player::AudioPlayer;
pub use audio::rate::{RateConvert, StreamResampler};
pub use audio::source::{AudioSource, listen};
pub use audio::squelch::{GateState, SquelchParams, SquelchedSource};
pub use audio::wav::WavSource;

// Error handling
pub use error::{Result, VoxpipeError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.1+abc1234"` when a git hash is available, `"0.3.1"`
/// otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }
}
