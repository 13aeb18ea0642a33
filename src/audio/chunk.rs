//! The chunk data model: an immutable run of raw PCM samples with timing and
//! format metadata.
//!
//! Chunks are the unit of data flowing through the pipeline. They are cheap
//! to clone and to split: the sample bytes live in a [`Bytes`] buffer, so
//! sub-chunks produced by [`split_chunk`] alias the parent allocation instead
//! of copying it.

use bytes::Bytes;

/// A sequence of audio samples.
///
/// Typically obtained by iterating an [`AudioBlock`](crate::audio::block::AudioBlock).
/// Immutable once constructed; cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Timestamp of the first sample, in seconds.
    pub start_time: f64,
    /// Raw little-endian PCM sample bytes.
    pub audio: Bytes,
    /// Bytes per sample.
    pub width: u16,
    /// Sample rate in Hz.
    pub freq: u32,
}

impl AudioChunk {
    /// Creates a chunk from raw sample bytes.
    ///
    /// # Panics
    /// Panics if `width` or `freq` is zero, or if the byte length is not a
    /// multiple of `width`.
    pub fn new(start_time: f64, audio: impl Into<Bytes>, width: u16, freq: u32) -> Self {
        let audio = audio.into();
        assert!(width > 0, "sample width must be positive");
        assert!(freq > 0, "sample rate must be positive");
        assert!(
            audio.len() % width as usize == 0,
            "audio length {} is not a multiple of sample width {}",
            audio.len(),
            width
        );
        Self {
            start_time,
            audio,
            width,
            freq,
        }
    }

    /// Creates a 16-bit chunk from decoded samples.
    pub fn from_samples_i16(start_time: f64, samples: &[i16], freq: u32) -> Self {
        let mut audio = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            audio.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(start_time, audio, 2, freq)
    }

    /// Number of samples in this chunk.
    pub fn sample_count(&self) -> usize {
        self.audio.len() / self.width as usize
    }

    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / self.freq as f64
    }

    /// Decodes the chunk as 16-bit signed little-endian samples.
    ///
    /// # Panics
    /// Panics if the chunk's sample width is not 2 bytes.
    pub fn samples_i16(&self) -> Vec<i16> {
        assert_eq!(self.width, 2, "samples_i16 requires 16-bit samples");
        self.audio
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }
}

/// Concatenates an ordered run of chunks into one.
///
/// All chunks must share the same width and sample rate. The merged chunk
/// keeps only the FIRST constituent's `start_time`; later timestamps are
/// discarded. This is a deliberate, lossy simplification — per-sample timing
/// inside a merged chunk can be reconstructed from the start time and the
/// sample rate, which is accurate as long as the constituents were contiguous.
///
/// # Panics
/// Panics if `chunks` is empty or the chunks disagree on width or rate.
pub fn merge_chunks(chunks: &[AudioChunk]) -> AudioChunk {
    assert!(!chunks.is_empty(), "cannot merge zero chunks");
    let first = &chunks[0];
    debug_assert!(
        chunks
            .iter()
            .all(|c| c.width == first.width && c.freq == first.freq),
        "merged chunks must share width and sample rate"
    );

    let total: usize = chunks.iter().map(|c| c.audio.len()).sum();
    let mut audio = Vec::with_capacity(total);
    for chunk in chunks {
        audio.extend_from_slice(&chunk.audio);
    }
    AudioChunk::new(first.start_time, audio, first.width, first.freq)
}

/// Splits a chunk into two at a sample offset.
///
/// Both halves retain the original `start_time`, width and rate, and alias
/// the original storage — no bytes are copied. Callers must not mutate the
/// shared buffer (chunks are immutable by construction).
///
/// # Panics
/// Panics if `sample_offset` exceeds the chunk's sample count.
pub fn split_chunk(chunk: &AudioChunk, sample_offset: usize) -> (AudioChunk, AudioChunk) {
    assert!(
        sample_offset <= chunk.sample_count(),
        "split offset {} past end of chunk ({} samples)",
        sample_offset,
        chunk.sample_count()
    );
    let offset = sample_offset * chunk.width as usize;
    let first = AudioChunk {
        start_time: chunk.start_time,
        audio: chunk.audio.slice(..offset),
        width: chunk.width,
        freq: chunk.freq,
    };
    let second = AudioChunk {
        start_time: chunk.start_time,
        audio: chunk.audio.slice(offset..),
        width: chunk.width,
        freq: chunk.freq,
    };
    (first, second)
}
