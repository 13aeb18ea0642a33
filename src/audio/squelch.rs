//! Voice-activity gating (squelch).
//!
//! Filters a source down to the spans where something is actually being said.
//! A sliding window of fixed-size chunks is reduced to a median RMS; the gate
//! opens when the median exceeds the squelch level and closes only when it
//! falls below 80% of it, so a signal hovering at the threshold cannot make
//! the gate chatter. Emitted blocks start with the buffered pre-roll window,
//! so the consumer hears the lead-in before the detected onset.

use crate::audio::block::{AudioBlock, ChunkStream};
use crate::audio::chunk::{AudioChunk, merge_chunks};
use crate::audio::resegment::{EvenChunks, Windowed};
use crate::audio::source::{AudioSource, LastBlock, listen};
use crate::defaults;
use crate::error::{Result, VoxpipeError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};

/// Gate state of a squelch processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Below threshold; audio is being discarded.
    Silent,
    /// Above threshold; audio is being emitted.
    Triggered,
}

impl GateState {
    /// Applies the hysteresis rule to one window statistic.
    ///
    /// Opens when the median exceeds `level`; closes when it drops below
    /// `level * SQUELCH_DETRIGGER_RATIO`; holds in between.
    pub fn advance(self, median_rms: f32, level: f32) -> GateState {
        match self {
            GateState::Silent if median_rms > level => GateState::Triggered,
            GateState::Triggered if median_rms < level * defaults::SQUELCH_DETRIGGER_RATIO => {
                GateState::Silent
            }
            state => state,
        }
    }

    pub fn is_triggered(self) -> bool {
        matches!(self, GateState::Triggered)
    }
}

/// Root-mean-square of 16-bit samples, normalized to 0.0..=1.0.
pub fn rms_i16(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Normalized RMS of a chunk's samples.
pub fn chunk_rms(chunk: &AudioChunk) -> f32 {
    rms_i16(&chunk.samples_i16())
}

/// Median of the per-chunk RMS values of a window, 0.0 for an empty window.
///
/// The median is used instead of the mean so a single transient spike inside
/// the window cannot flip the gate.
pub fn median_rms(window: &[AudioChunk]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let mut values: Vec<f32> = window.iter().map(chunk_rms).collect();
    values.sort_unstable_by(f32::total_cmp);
    values[values.len() / 2]
}

/// Evaluates the gate over a chunk window, given the current trigger state.
pub fn check_squelch(level: f32, triggered: bool, window: &[AudioChunk]) -> bool {
    let state = if triggered {
        GateState::Triggered
    } else {
        GateState::Silent
    };
    state.advance(median_rms(window), level).is_triggered()
}

/// Gate stream shared between the processor and the block it emitted.
type GateStream = Windowed<EvenChunks<AudioBlock>>;
type SharedGateStream = Arc<Mutex<GateStream>>;

/// Tuning parameters for a [`SquelchedSource`].
#[derive(Debug, Clone)]
pub struct SquelchParams {
    /// Samples per evaluation chunk.
    pub sample_size: usize,
    /// Window size, in chunks, for the statistic and the pre-roll replay.
    pub prefix_chunks: usize,
    /// RMS threshold. May be left unset and detected via calibration, but
    /// must be present before the source starts.
    pub level: Option<f32>,
}

impl Default for SquelchParams {
    fn default() -> Self {
        Self {
            sample_size: defaults::SQUELCH_SAMPLE_SIZE,
            prefix_chunks: defaults::SQUELCH_PREFIX_CHUNKS,
            level: None,
        }
    }
}

impl SquelchParams {
    pub fn with_level(mut self, level: f32) -> Self {
        self.level = Some(level);
        self
    }
}

/// Processor that emits one block per detected span of voice activity.
///
/// Wraps another source; each emitted block begins with the merged pre-roll
/// window and ends itself the moment the de-trigger condition is met. The
/// processor then scans for the next trigger, moving to the next upstream
/// block on exhaustion, until the upstream source itself ends.
pub struct SquelchedSource<S> {
    source: S,
    sample_size: usize,
    prefix_chunks: usize,
    level: Option<f32>,
    running: bool,
    stream: Option<SharedGateStream>,
    last_block: LastBlock,
}

impl<S: AudioSource> SquelchedSource<S> {
    /// Wraps `source` with default parameters and no squelch level.
    pub fn new(source: S) -> Self {
        Self::with_params(source, SquelchParams::default())
    }

    pub fn with_params(source: S, params: SquelchParams) -> Self {
        Self {
            source,
            sample_size: params.sample_size,
            prefix_chunks: params.prefix_chunks,
            level: params.level,
            running: false,
            stream: None,
            last_block: LastBlock::default(),
        }
    }

    /// Currently configured squelch level, if any.
    pub fn level(&self) -> Option<f32> {
        self.level
    }

    /// Overrides the squelch level.
    pub fn set_level(&mut self, level: f32) {
        self.level = Some(level);
    }

    /// Listens to the wrapped source for `detect_time` and derives a squelch
    /// level from the observed RMS distribution at the default percentile.
    ///
    /// The detected level is stored on the processor and returned.
    pub async fn detect_squelch_level(&mut self, detect_time: Duration) -> Result<f32> {
        self.detect_squelch_level_at(detect_time, defaults::CALIBRATION_PERCENTILE)
            .await
    }

    /// Calibration with an explicit percentile in `(0.0, 1.0]`.
    ///
    /// Collects `sample_size`-sized chunks until the wall-clock deadline (or
    /// upstream exhaustion, for file sources), discards boundary chunks that
    /// are not exactly full, sorts the per-chunk RMS values ascending and
    /// picks the value at `floor(percentile * count)`. The wrapped source is
    /// started for the duration and stopped afterwards.
    pub async fn detect_squelch_level_at(
        &mut self,
        detect_time: Duration,
        percentile: f64,
    ) -> Result<f32> {
        if !(0.0..=1.0).contains(&percentile) || percentile == 0.0 {
            return Err(VoxpipeError::InvalidConfiguration {
                message: format!("calibration percentile {} outside (0, 1]", percentile),
            });
        }

        let sample_size = self.sample_size;
        let deadline = Instant::now() + detect_time;

        let collected = listen(&mut self.source, async |source| {
            let mut collected: Vec<AudioChunk> = Vec::new();
            'listening: loop {
                let block = match timeout_at(deadline, source.next_block()).await {
                    Err(_) => break,
                    Ok(Ok(Some(block))) => block,
                    Ok(Ok(None)) => break,
                    Ok(Err(err)) => return Err(err),
                };
                let mut even = EvenChunks::new(block, sample_size);
                loop {
                    match timeout_at(deadline, even.next_chunk()).await {
                        Err(_) => break 'listening,
                        Ok(Ok(Some(chunk))) => collected.push(chunk),
                        Ok(Ok(None)) => break,
                        Ok(Err(err)) => return Err(err),
                    }
                }
            }
            Ok(collected)
        })
        .await?;

        let full_size = sample_size * defaults::SAMPLE_WIDTH as usize;
        let mut values: Vec<f32> = collected
            .iter()
            .filter(|chunk| chunk.audio.len() == full_size)
            .map(chunk_rms)
            .collect();
        if values.is_empty() {
            return Err(VoxpipeError::Calibration {
                message: "no full-size chunks collected".to_string(),
            });
        }
        values.sort_unstable_by(f32::total_cmp);
        let index = ((percentile * values.len() as f64) as usize).min(values.len() - 1);
        let level = values[index];
        self.level = Some(level);
        Ok(level)
    }
}

#[async_trait]
impl<S: AudioSource> AudioSource for SquelchedSource<S> {
    async fn start(&mut self) -> Result<()> {
        if self.level.is_none() {
            return Err(VoxpipeError::InvalidConfiguration {
                message: "squelch level must be set before start (configure one or run \
                          detect_squelch_level)"
                    .to_string(),
            });
        }
        // Own state first, so chunks arriving right after the upstream starts
        // have somewhere to go.
        self.running = true;
        self.source.start().await
    }

    async fn stop(&mut self) -> Result<()> {
        // Upstream first: its delivery must cease before the gate state and
        // window are torn down.
        let stopped = self.source.stop().await;
        self.last_block.end();
        self.stream = None;
        self.running = false;
        stopped
    }

    async fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        let Some(level) = self.level else {
            return Err(VoxpipeError::InvalidConfiguration {
                message: "squelch level not set".to_string(),
            });
        };
        if !self.running {
            return Ok(None);
        }

        loop {
            let shared = match &self.stream {
                Some(stream) => Arc::clone(stream),
                None => match self.source.next_block().await? {
                    Some(block) => {
                        let stream = Windowed::new(
                            EvenChunks::new(block, self.sample_size),
                            self.prefix_chunks,
                        );
                        let shared = Arc::new(Mutex::new(stream));
                        self.stream = Some(Arc::clone(&shared));
                        shared
                    }
                    None => return Ok(None),
                },
            };

            // Scan the current upstream block until the gate opens.
            loop {
                let mut guard = shared.lock().await;
                match guard.next_chunk().await? {
                    Some(_) => {
                        let window = guard.window().snapshot();
                        if check_squelch(level, false, &window) {
                            drop(guard);
                            let block = AudioBlock::new(SquelchedFeed {
                                stream: Arc::clone(&shared),
                                level,
                                sent_preroll: false,
                            });
                            self.last_block.track(&block);
                            return Ok(Some(block));
                        }
                    }
                    None => {
                        // This upstream block is done; move to the next one.
                        drop(guard);
                        self.stream = None;
                        break;
                    }
                }
            }
        }
    }
}

/// Feed of an emitted activity block.
///
/// The first yielded chunk is the merged pre-roll window; afterwards chunks
/// stream live from the shared gate stream, re-evaluating the de-trigger
/// condition on every step. The window keeps advancing while this feed pulls,
/// so the processor resumes scanning from the right position afterwards.
struct SquelchedFeed {
    stream: SharedGateStream,
    level: f32,
    sent_preroll: bool,
}

#[async_trait]
impl ChunkStream for SquelchedFeed {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        let mut guard = self.stream.lock().await;

        if !self.sent_preroll {
            self.sent_preroll = true;
            let window = guard.window().snapshot();
            // The gate cannot open on an empty window, so there is always
            // pre-roll to replay.
            return Ok(Some(merge_chunks(&window)));
        }

        match guard.next_chunk().await? {
            Some(chunk) => {
                let window = guard.window().snapshot();
                if check_squelch(self.level, true, &window) {
                    Ok(Some(chunk))
                } else {
                    // De-trigger: the span is over.
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }
}
