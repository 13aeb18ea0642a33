//! Default configuration constants for voxpipe.
//!
//! Shared across config types and processors to keep the defaults in one
//! place.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard rate for speech pipelines and what downstream
/// transcription services expect.
pub const SAMPLE_RATE: u32 = 16000;

/// Bytes per sample everywhere past ingestion (16-bit signed PCM).
pub const SAMPLE_WIDTH: u16 = 2;

/// Default number of samples per squelch evaluation chunk.
///
/// 1600 samples is 100ms at 16kHz, short enough for responsive gating while
/// giving the RMS statistic a stable window.
pub const SQUELCH_SAMPLE_SIZE: usize = 1600;

/// Default number of evaluation chunks retained for the squelch window.
///
/// The same window doubles as the pre-roll replayed at the start of each
/// emitted block, so speech onsets are not clipped.
pub const SQUELCH_PREFIX_CHUNKS: usize = 4;

/// De-trigger threshold as a fraction of the squelch level.
///
/// Once triggered, the gate only closes when the median RMS drops below
/// 80% of the trigger level. The 20% band keeps the gate from chattering
/// when the signal hovers near the threshold.
pub const SQUELCH_DETRIGGER_RATIO: f32 = 0.8;

/// Default calibration duration in seconds.
pub const CALIBRATION_SECS: u64 = 10;

/// Default percentile of observed RMS values chosen as the squelch level.
///
/// The 80th percentile sits above ambient noise in a mostly-quiet
/// calibration window without requiring complete silence.
pub const CALIBRATION_PERCENTILE: f64 = 0.8;

/// Default number of frames per chunk when reading WAV files.
pub const WAV_CHUNK_FRAMES: u32 = 1600;
