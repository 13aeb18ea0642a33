//! Sample-rate conversion processor.
//!
//! Wraps each upstream block with a streaming linear-interpolation resampler.
//! The interpolation state (fractional read position plus the trailing sample
//! of the previous chunk) persists across chunks of the same block, so chunk
//! boundaries introduce no discontinuities; each new block starts with fresh
//! state.

use crate::audio::block::{AudioBlock, ChunkStream};
use crate::audio::chunk::AudioChunk;
use crate::audio::source::{AudioSource, LastBlock};
use crate::error::Result;
use async_trait::async_trait;

/// Streaming linear-interpolation resampler for 16-bit mono audio.
///
/// Feed it successive chunks of one continuous stream; output across calls is
/// identical to resampling the concatenated input in one shot.
#[derive(Debug)]
pub struct StreamResampler {
    src_rate: u32,
    dst_rate: u32,
    /// Read position of the next output sample, in source samples, relative
    /// to the start of the not-yet-consumed input. May be as low as -1.0
    /// when the interpolation interval straddles a chunk boundary.
    pos: f64,
    /// Final sample of the previous chunk, for boundary interpolation.
    last: Option<i16>,
}

impl StreamResampler {
    pub fn new(src_rate: u32, dst_rate: u32) -> Self {
        Self {
            src_rate,
            dst_rate,
            pos: 0.0,
            last: None,
        }
    }

    pub fn dst_rate(&self) -> u32 {
        self.dst_rate
    }

    /// Converts one chunk of samples, carrying state to the next call.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if self.src_rate == self.dst_rate {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        let ratio = self.src_rate as f64 / self.dst_rate as f64;
        let mut output = Vec::with_capacity((input.len() as f64 / ratio).ceil() as usize + 1);
        let mut pos = self.pos;

        loop {
            let idx = pos.floor() as isize;
            // Interpolation needs samples idx and idx+1; idx+1 must be in
            // this chunk, idx may be the carried-over trailing sample.
            if idx + 1 >= input.len() as isize {
                break;
            }
            let fraction = pos - idx as f64;
            let left = if idx < 0 {
                self.last.unwrap_or(input[0]) as f64
            } else {
                input[idx as usize] as f64
            };
            let right = input[(idx + 1) as usize] as f64;
            output.push((left + (right - left) * fraction) as i16);
            pos += ratio;
        }

        self.pos = pos - input.len() as f64;
        self.last = input.last().copied();
        output
    }
}

/// Processor that resamples every block of the wrapped source.
///
/// Output chunks keep the upstream `start_time`, carry 16-bit samples and the
/// target rate. Stereo downmixing is not done here; sources are expected to
/// deliver mono.
pub struct RateConvert<S> {
    source: S,
    out_rate: u32,
    last_block: LastBlock,
}

impl<S: AudioSource> RateConvert<S> {
    pub fn new(source: S, out_rate: u32) -> Self {
        Self {
            source,
            out_rate,
            last_block: LastBlock::default(),
        }
    }
}

#[async_trait]
impl<S: AudioSource> AudioSource for RateConvert<S> {
    async fn start(&mut self) -> Result<()> {
        // No own state beyond per-block resamplers; bring the upstream up.
        self.source.start().await
    }

    async fn stop(&mut self) -> Result<()> {
        // Upstream first, so no new chunks arrive while we tear down.
        let stopped = self.source.stop().await;
        self.last_block.end();
        stopped
    }

    async fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        match self.source.next_block().await? {
            Some(upstream) => {
                let block = AudioBlock::new(RateConvertFeed {
                    inner: upstream,
                    out_rate: self.out_rate,
                    resampler: None,
                });
                self.last_block.track(&block);
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }
}

/// Per-block feed; the resampler is created on the first chunk (which fixes
/// the source rate for the block) and threaded through every later chunk.
struct RateConvertFeed {
    inner: AudioBlock,
    out_rate: u32,
    resampler: Option<StreamResampler>,
}

#[async_trait]
impl ChunkStream for RateConvertFeed {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        match self.inner.next_chunk().await? {
            Some(chunk) => {
                let resampler = self
                    .resampler
                    .get_or_insert_with(|| StreamResampler::new(chunk.freq, self.out_rate));
                let converted = resampler.process(&chunk.samples_i16());
                Ok(Some(AudioChunk::from_samples_i16(
                    chunk.start_time,
                    &converted,
                    self.out_rate,
                )))
            }
            None => Ok(None),
        }
    }
}
