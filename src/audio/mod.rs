//! Audio pipeline: sources, blocks and processors.
//!
//! ```text
//! ┌────────────┐    ┌─────────────┐    ┌─────────────────┐
//! │ Microphone │───▶│ RateConvert │───▶│ SquelchedSource │───▶ consumer
//! │ WavSource  │    │  (16kHz)    │    │  (VAD gating)   │
//! └────────────┘    └─────────────┘    └─────────────────┘
//! ```
//!
//! A consumer enters a scoped [`listen`](source::listen) acquisition on a
//! [`AudioSource`](source::AudioSource), iterates its
//! [`AudioBlock`](block::AudioBlock)s, and for each block iterates
//! [`AudioChunk`](chunk::AudioChunk)s. Processors are sources wrapping
//! another source.

pub mod block;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod chunk;
#[cfg(feature = "cpal-audio")]
pub mod player;
pub mod rate;
pub mod resegment;
pub mod source;
pub mod squelch;
pub mod wav;

pub use block::{AudioBlock, ChunkQueue, ChunkQueueReceiver, ChunkStream, EndSignal};
#[cfg(feature = "cpal-audio")]
pub use capture::{Microphone, list_devices};
pub use chunk::{AudioChunk, merge_chunks, split_chunk};
#[cfg(feature = "cpal-audio")]
pub use player::AudioPlayer;
pub use rate::{RateConvert, StreamResampler};
pub use resegment::{EvenChunks, SlidingWindow, Windowed};
pub use source::{AudioSource, LastBlock, listen};
pub use squelch::{GateState, SquelchParams, SquelchedSource, check_squelch, chunk_rms};
pub use wav::WavSource;
