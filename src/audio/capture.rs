//! Microphone capture source using CPAL.
//!
//! The capture callback runs on a thread owned by the audio backend, outside
//! the cooperative scheduler. Each delivered buffer is wrapped into an
//! [`AudioChunk`] stamped with its arrival time and handed across the
//! [`ChunkQueue`] boundary; stopping pushes the end-of-stream sentinel so the
//! consumer side terminates cleanly.

use crate::audio::block::{AudioBlock, ChunkQueue, ChunkQueueReceiver};
use crate::audio::chunk::AudioChunk;
use crate::audio::source::{AudioSource, LastBlock};
use crate::defaults;
use crate::error::{Result, VoxpipeError};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers when
/// probing audio backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Device names preferred over the raw ALSA default on desktop Linux.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse"];

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES.iter().any(|pref| lower.contains(pref))
}

/// Lists the names of all available audio input devices.
pub fn list_devices() -> Result<Vec<String>> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoxpipeError::AudioCapture {
                message: format!("Failed to enumerate input devices: {}", e),
            })?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    })
}

/// Resolves the capture device: by name if given, otherwise a preferred
/// server device (PipeWire/PulseAudio) falling back to the system default.
fn resolve_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host
                .input_devices()
                .map_err(|e| VoxpipeError::AudioCapture {
                    message: format!("Failed to enumerate input devices: {}", e),
                })?;
            for device in devices {
                if device.name().is_ok_and(|n| n == name) {
                    return Ok(device);
                }
            }
            return Err(VoxpipeError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if device.name().is_ok_and(|n| is_preferred_device(&n)) {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or(VoxpipeError::NoDefaultInputDevice)
    })
}

/// Seconds since the Unix epoch, for chunk arrival timestamps.
fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by one source or player and only touched from
/// one task at a time, so it never sees concurrent access across threads.
pub(crate) struct SendableStream(pub(crate) cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone audio source.
///
/// Captures 16-bit mono PCM at the configured rate. Produces one queue-backed
/// block per `next_block` call over the same underlying queue; stopping the
/// source pushes the sentinel and ends the active block.
pub struct Microphone {
    device_name: Option<String>,
    rate: u32,
    stream: Option<SendableStream>,
    queue: Option<ChunkQueue>,
    receiver: Option<ChunkQueueReceiver>,
    running: bool,
    last_block: LastBlock,
}

impl Microphone {
    /// Microphone on the default input device at the default rate.
    pub fn new() -> Self {
        Self::with_device(None, defaults::SAMPLE_RATE)
    }

    /// Microphone on a specific device (by cpal name) and sample rate.
    pub fn with_device(device_name: Option<&str>, rate: u32) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            rate,
            stream: None,
            queue: None,
            receiver: None,
            running: false,
            last_block: LastBlock::default(),
        }
    }

    /// Capture sample rate in Hz.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    fn build_stream(&self, device: &cpal::Device, queue: ChunkQueue) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let rate = self.rate;

        let err_callback = |err| {
            warn!(error = %err, "audio stream error");
        };

        // Preferred: i16 frames, handed over as-is.
        let push_queue = queue.clone();
        if let Ok(stream) = device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_queue.push(AudioChunk::from_samples_i16(unix_time(), data, rate));
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: f32 frames, converted to i16 in the callback.
        device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    queue.push(AudioChunk::from_samples_i16(unix_time(), &samples, rate));
                },
                err_callback,
                None,
            )
            .map_err(|e| VoxpipeError::AudioCapture {
                message: format!("Failed to build input stream: {}", e),
            })
    }
}

impl Default for Microphone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSource for Microphone {
    async fn start(&mut self) -> Result<()> {
        let device = resolve_device(self.device_name.as_deref())?;

        let (queue, receiver) = ChunkQueue::channel();
        let stream = self.build_stream(&device, queue.clone())?;
        stream.play().map_err(|e| VoxpipeError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        self.stream = Some(SendableStream(stream));
        self.queue = Some(queue);
        self.receiver = Some(receiver);
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        // Sentinel first, so the consumer side drains and terminates.
        if let Some(queue) = self.queue.take() {
            queue.close();
        }
        self.last_block.end();
        self.running = false;

        if let Some(stream) = self.stream.take() {
            // A pause failure must not abort the rest of the teardown.
            if let Err(err) = stream.0.pause() {
                warn!(error = %err, "failed to pause capture stream");
            }
        }
        Ok(())
    }

    async fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        let Some(receiver) = &self.receiver else {
            return Err(VoxpipeError::InvalidConfiguration {
                message: "microphone not started".to_string(),
            });
        };
        if !self.running {
            return Ok(None);
        }
        let block = receiver.block();
        self.last_block.track(&block);
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_device_matching() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("PulseAudio"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn unix_time_is_positive_and_monotonicish() {
        let first = unix_time();
        let second = unix_time();
        assert!(first > 0.0);
        assert!(second >= first);
    }

    #[tokio::test]
    async fn next_block_before_start_is_an_error() {
        let mut mic = Microphone::new();
        assert!(matches!(
            mic.next_block().await,
            Err(VoxpipeError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    #[ignore] // Requires audio hardware
    async fn capture_produces_chunks() {
        let mut mic = Microphone::new();
        mic.start().await.expect("start capture");

        let mut block = mic.next_block().await.unwrap().unwrap();
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(2), block.next_chunk())
            .await
            .expect("chunk within two seconds")
            .unwrap();
        assert!(chunk.is_some());

        mic.stop().await.expect("stop capture");
        assert!(block.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires audio hardware
    async fn unknown_device_name_is_reported() {
        let mut mic = Microphone::with_device(Some("NoSuchDevice12345"), 16000);
        match mic.start().await {
            Err(VoxpipeError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NoSuchDevice12345");
            }
            other => panic!("expected AudioDeviceNotFound, got {:?}", other),
        }
    }
}
