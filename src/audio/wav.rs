//! WAV file audio source.
//!
//! Pull-model ingestion: each chunk is `chunk_frames` frames read from the
//! file, downmixed to mono when the file is stereo. The whole file is exposed
//! as a single block, since it is one continuous span of audio.

use crate::audio::block::{AudioBlock, ChunkStream};
use crate::audio::chunk::AudioChunk;
use crate::audio::source::{AudioSource, LastBlock};
use crate::defaults;
use crate::error::{Result, VoxpipeError};
use async_trait::async_trait;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Audio source reading 16-bit PCM from a WAV file.
///
/// Mono files pass through untouched; stereo files are downmixed by
/// averaging the channel pair. More than two channels is a precondition
/// violation reported at `start`.
pub struct WavSource {
    path: PathBuf,
    chunk_frames: u32,
    opened: Option<WavFeed>,
    started: bool,
    block_returned: bool,
    last_block: LastBlock,
}

impl WavSource {
    /// Source over `path`, reading the default number of frames per chunk.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_chunk_frames(path, defaults::WAV_CHUNK_FRAMES)
    }

    /// Source over `path` reading `chunk_frames` frames per chunk.
    pub fn with_chunk_frames(path: impl AsRef<Path>, chunk_frames: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            chunk_frames,
            opened: None,
            started: false,
            block_returned: false,
            last_block: LastBlock::default(),
        }
    }
}

#[async_trait]
impl AudioSource for WavSource {
    async fn start(&mut self) -> Result<()> {
        let file = File::open(&self.path)?;
        let reader =
            hound::WavReader::new(BufReader::new(file)).map_err(|e| VoxpipeError::WavRead {
                message: format!("{}: {}", self.path.display(), e),
            })?;

        let spec = reader.spec();
        if spec.channels > 2 {
            return Err(VoxpipeError::UnsupportedChannelCount {
                channels: spec.channels,
            });
        }
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(VoxpipeError::AudioFormat {
                message: format!(
                    "{}: only 16-bit integer PCM is supported, got {}-bit {:?}",
                    self.path.display(),
                    spec.bits_per_sample,
                    spec.sample_format
                ),
            });
        }

        self.opened = Some(WavFeed {
            reader,
            frames_per_chunk: self.chunk_frames,
            channels: spec.channels,
            freq: spec.sample_rate,
        });
        self.started = true;
        self.block_returned = false;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.last_block.end();
        // Dropping the feed closes the file.
        self.opened = None;
        self.started = false;
        Ok(())
    }

    async fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        if !self.started {
            return Err(VoxpipeError::InvalidConfiguration {
                message: "WAV source not started".to_string(),
            });
        }
        if self.block_returned {
            return Ok(None);
        }
        match self.opened.take() {
            Some(feed) => {
                self.block_returned = true;
                let block = AudioBlock::new(feed);
                self.last_block.track(&block);
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }
}

/// Feed reading frames from an open WAV file.
struct WavFeed {
    reader: hound::WavReader<BufReader<File>>,
    frames_per_chunk: u32,
    channels: u16,
    freq: u32,
}

#[async_trait]
impl ChunkStream for WavFeed {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        let wanted = self.frames_per_chunk as usize * self.channels as usize;
        let mut samples = Vec::with_capacity(wanted);
        {
            let mut iter = self.reader.samples::<i16>();
            while samples.len() < wanted {
                match iter.next() {
                    Some(Ok(sample)) => samples.push(sample),
                    Some(Err(e)) => {
                        return Err(VoxpipeError::WavRead {
                            message: e.to_string(),
                        });
                    }
                    None => break,
                }
            }
        }

        if samples.is_empty() {
            return Ok(None);
        }

        let mono: Vec<i16> = if self.channels == 2 {
            samples
                .chunks_exact(2)
                .map(|pair| {
                    let left = pair[0] as i32;
                    let right = pair[1] as i32;
                    ((left + right) / 2) as i16
                })
                .collect()
        } else {
            samples
        };

        Ok(Some(AudioChunk::from_samples_i16(0.0, &mono, self.freq)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_wav(sample_rate: u32, channels: u16, samples: &[i16]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut data = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut data, spec).unwrap();
            for &sample in samples {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        file.write_all(&data.into_inner()).unwrap();
        file.flush().unwrap();
        file
    }

    async fn read_all(source: &mut WavSource) -> Vec<AudioChunk> {
        source.start().await.unwrap();
        let mut block = source.next_block().await.unwrap().unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = block.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        source.stop().await.unwrap();
        chunks
    }

    #[tokio::test]
    async fn mono_file_reads_through_unchanged() {
        let samples: Vec<i16> = (0..100).collect();
        let file = write_wav(16000, 1, &samples);

        let mut source = WavSource::with_chunk_frames(file.path(), 40);
        let chunks = read_all(&mut source).await;

        let sizes: Vec<usize> = chunks.iter().map(|c| c.sample_count()).collect();
        assert_eq!(sizes, vec![40, 40, 20]);
        let all: Vec<i16> = chunks.iter().flat_map(|c| c.samples_i16()).collect();
        assert_eq!(all, samples);
        assert!(chunks.iter().all(|c| c.freq == 16000 && c.width == 2));
    }

    #[tokio::test]
    async fn stereo_file_is_downmixed_by_averaging() {
        // Pairs (100, 200), (300, 400), (500, 600) -> 150, 350, 550
        let file = write_wav(16000, 2, &[100, 200, 300, 400, 500, 600]);

        let mut source = WavSource::new(file.path());
        let chunks = read_all(&mut source).await;

        let all: Vec<i16> = chunks.iter().flat_map(|c| c.samples_i16()).collect();
        assert_eq!(all, vec![150, 350, 550]);
    }

    #[tokio::test]
    async fn more_than_two_channels_is_rejected_at_start() {
        let file = write_wav(16000, 4, &[0i16; 16]);

        let mut source = WavSource::new(file.path());
        match source.start().await {
            Err(VoxpipeError::UnsupportedChannelCount { channels }) => assert_eq!(channels, 4),
            other => panic!("expected UnsupportedChannelCount, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn only_one_block_is_produced() {
        let file = write_wav(16000, 1, &[1i16, 2, 3]);

        let mut source = WavSource::new(file.path());
        source.start().await.unwrap();
        assert!(source.next_block().await.unwrap().is_some());
        assert!(source.next_block().await.unwrap().is_none());
        source.stop().await.unwrap();
    }

    #[tokio::test]
    async fn next_block_before_start_is_an_error() {
        let file = write_wav(16000, 1, &[0i16; 4]);
        let mut source = WavSource::new(file.path());
        assert!(matches!(
            source.next_block().await,
            Err(VoxpipeError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn missing_file_errors_on_start() {
        let mut source = WavSource::new("/nonexistent/audio.wav");
        assert!(matches!(
            source.start().await,
            Err(VoxpipeError::Io(_))
        ));
    }

    #[tokio::test]
    async fn stopping_mid_block_ends_iteration() {
        let samples = vec![0i16; 1000];
        let file = write_wav(16000, 1, &samples);

        let mut source = WavSource::with_chunk_frames(file.path(), 10);
        source.start().await.unwrap();
        let mut block = source.next_block().await.unwrap().unwrap();
        block.next_chunk().await.unwrap();

        source.stop().await.unwrap();
        assert!(block.next_chunk().await.unwrap().is_none());
        assert!(block.ended());
    }
}
