//! Playback of an audio source on an output device.
//!
//! Not part of the transcription path; useful when developing sources and
//! processors, e.g. to hear exactly what the squelch gate lets through.

use crate::audio::capture::SendableStream;
use crate::audio::source::{AudioSource, listen};
use crate::error::{Result, VoxpipeError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Plays chunks from an audio source to the default output device.
pub struct AudioPlayer {
    freq: u32,
}

impl AudioPlayer {
    /// Player expecting 16-bit mono input at `freq` Hz.
    pub fn new(freq: u32) -> Self {
        Self { freq }
    }

    /// Plays `source` until it runs out of audio, then drains the device.
    pub async fn play<S: AudioSource>(&self, source: &mut S) -> Result<()> {
        let buffer: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let stream = SendableStream(self.build_stream(Arc::clone(&buffer))?);
        stream.0.play().map_err(|e| VoxpipeError::AudioPlayback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        let sink = Arc::clone(&buffer);
        listen(source, async |src| {
            while let Some(mut block) = src.next_block().await? {
                while let Some(chunk) = block.next_chunk().await? {
                    if let Ok(mut queued) = sink.lock() {
                        queued.extend(chunk.samples_i16());
                    }
                }
            }
            Ok(())
        })
        .await?;

        // Let the output callback drain what is still queued.
        loop {
            let remaining = buffer.lock().map(|q| q.len()).unwrap_or(0);
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        if let Err(err) = stream.0.pause() {
            warn!(error = %err, "failed to pause output stream");
        }
        Ok(())
    }

    fn build_stream(&self, buffer: Arc<Mutex<VecDeque<i16>>>) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| VoxpipeError::AudioPlayback {
                message: "no default output device".to_string(),
            })?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.freq),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            warn!(error = %err, "audio output stream error");
        };

        // Preferred: i16 output, filling silence when the queue runs dry.
        let queued = Arc::clone(&buffer);
        if let Ok(stream) = device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut queued = match queued.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                for slot in data.iter_mut() {
                    *slot = queued.pop_front().unwrap_or(0);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: f32 output.
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queued = match buffer.lock() {
                        Ok(guard) => guard,
                        Err(_) => return,
                    };
                    for slot in data.iter_mut() {
                        *slot = queued.pop_front().unwrap_or(0) as f32 / i16::MAX as f32;
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| VoxpipeError::AudioPlayback {
                message: format!("Failed to build output stream: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_construction_is_cheap() {
        let player = AudioPlayer::new(16000);
        assert_eq!(player.freq, 16000);
    }
}
