//! Blocks: cancellation-aware lazy sequences of chunks.
//!
//! A block delineates one continuous span of audio. Iterating it races the
//! producer against the block's end signal, so a block that is ended from
//! another task (source teardown, squelch de-trigger) unblocks any in-flight
//! fetch instead of leaving it suspended.

use crate::audio::chunk::AudioChunk;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};

/// A pull-based producer of chunks.
///
/// `Ok(None)` is the stream-exhaustion signal, not an error; implementations
/// must keep returning `Ok(None)` once exhausted.
#[async_trait]
pub trait ChunkStream: Send {
    /// Produces the next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>>;
}

/// Monotonic end-of-block signal.
///
/// Cloned handles all observe the same flag; once set it never reverts.
/// Waiters are woken promptly when another task calls [`EndSignal::end`].
#[derive(Debug, Clone)]
pub struct EndSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl EndSignal {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Marks the block as ended. Idempotent.
    pub fn end(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once [`end`](Self::end) has been called.
    pub fn is_ended(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspends until the signal is set. Returns immediately if already set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            // The sender lives in self, so changed() cannot fail here.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// An iterator over [`AudioChunk`]s covering one continuous span of audio.
///
/// Blocks are single-consumer: at most one `next_chunk` call may be in
/// flight. Ending the block (from this or any other task) terminates
/// iteration within a bounded time even if the underlying producer never
/// responds.
pub struct AudioBlock {
    feed: Box<dyn ChunkStream>,
    end: EndSignal,
}

impl AudioBlock {
    /// Wraps a chunk feed in a block with a fresh end signal.
    pub fn new(feed: impl ChunkStream + 'static) -> Self {
        Self {
            feed: Box::new(feed),
            end: EndSignal::new(),
        }
    }

    /// A handle that can end this block from another task.
    pub fn end_signal(&self) -> EndSignal {
        self.end.clone()
    }

    /// Returns true once the block has ended.
    pub fn ended(&self) -> bool {
        self.end.is_ended()
    }

    /// Ends the block. Any in-flight or future `next_chunk` yields `None`.
    pub fn end(&self) {
        self.end.end();
    }

    /// Fetches the next chunk, racing the producer against the end signal.
    ///
    /// Whichever completes first wins; the losing future is dropped, which
    /// cancels it. Producer exhaustion ends the block.
    pub async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        if self.end.is_ended() {
            return Ok(None);
        }

        let end = self.end.clone();
        tokio::select! {
            biased;
            _ = end.wait() => Ok(None),
            produced = self.feed.next_chunk() => match produced? {
                Some(chunk) => Ok(Some(chunk)),
                None => {
                    self.end.end();
                    Ok(None)
                }
            },
        }
    }
}

#[async_trait]
impl ChunkStream for AudioBlock {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        AudioBlock::next_chunk(self).await
    }
}

/// Producer half of a queue-backed block.
///
/// Push is non-blocking and safe from any thread, including audio capture
/// callbacks running outside the tokio runtime. This is the one sanctioned
/// boundary for handing data into the cooperative domain.
#[derive(Debug, Clone)]
pub struct ChunkQueue {
    tx: mpsc::UnboundedSender<Option<AudioChunk>>,
}

impl ChunkQueue {
    /// Creates a linked producer/consumer pair.
    pub fn channel() -> (ChunkQueue, ChunkQueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChunkQueue { tx },
            ChunkQueueReceiver {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Enqueues a chunk. Returns false if the consumer side is gone.
    pub fn push(&self, chunk: AudioChunk) -> bool {
        self.tx.send(Some(chunk)).is_ok()
    }

    /// Enqueues the end-of-stream sentinel.
    pub fn close(&self) {
        let _ = self.tx.send(None);
    }
}

/// Consumer half of a queue-backed block.
///
/// Cloneable so a source can hand out successive block views over the same
/// queue; the underlying receiver is shared, so only one block should be
/// iterated at a time.
#[derive(Clone)]
pub struct ChunkQueueReceiver {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Option<AudioChunk>>>>,
}

impl ChunkQueueReceiver {
    /// Builds a block that drains this queue until the sentinel arrives.
    pub fn block(&self) -> AudioBlock {
        AudioBlock::new(QueueFeed {
            rx: Arc::clone(&self.rx),
        })
    }
}

/// Feed that suspends on the shared queue; a `None` item is the sentinel.
struct QueueFeed {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Option<AudioChunk>>>>,
}

#[async_trait]
impl ChunkStream for QueueFeed {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(Some(chunk)) => Ok(Some(chunk)),
            // Sentinel or producer dropped: no more chunks.
            Some(None) | None => Ok(None),
        }
    }
}
