//! Chunk resegmentation and recent-history buffering.
//!
//! Upstream producers deliver chunks sized by hardware buffers or file reads.
//! [`EvenChunks`] repackages such a stream into fixed-size chunks, and
//! [`Windowed`] keeps the last N yielded chunks so the squelch gate can
//! evaluate a statistic window and replay pre-roll audio.

use crate::audio::block::ChunkStream;
use crate::audio::chunk::{AudioChunk, merge_chunks, split_chunk};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;

/// Repackages an upstream chunk stream into even `chunk_size`-sample chunks.
///
/// Every yielded chunk has exactly `chunk_size` samples except the last one
/// at end of stream, which may be shorter. No samples are lost or duplicated:
/// when an upstream chunk straddles a boundary, the remainder is held back
/// and consumed first on the next call.
pub struct EvenChunks<S> {
    inner: S,
    chunk_size: usize,
    leftover: Option<AudioChunk>,
}

impl<S: ChunkStream> EvenChunks<S> {
    /// Wraps `inner`, yielding chunks of `chunk_size` samples.
    ///
    /// # Panics
    /// Panics if `chunk_size` is zero.
    pub fn new(inner: S, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            inner,
            chunk_size,
            leftover: None,
        }
    }
}

#[async_trait]
impl<S: ChunkStream> ChunkStream for EvenChunks<S> {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        let mut pending: Vec<AudioChunk> = Vec::new();
        let mut collected = 0usize;

        while collected < self.chunk_size {
            let chunk = match self.leftover.take() {
                Some(chunk) => chunk,
                None => match self.inner.next_chunk().await? {
                    Some(chunk) => chunk,
                    // Upstream exhausted; whatever is pending is the final,
                    // possibly shorter, chunk.
                    None => break,
                },
            };
            collected += chunk.sample_count();
            pending.push(chunk);
        }

        if pending.is_empty() {
            return Ok(None);
        }

        let merged = merge_chunks(&pending);
        if collected > self.chunk_size {
            let (head, rest) = split_chunk(&merged, self.chunk_size);
            self.leftover = Some(rest);
            Ok(Some(head))
        } else {
            Ok(Some(merged))
        }
    }
}

/// Fixed-capacity buffer retaining the most recent pushes.
///
/// Pushing beyond capacity evicts the oldest item. Reads return contents in
/// insertion order and never mutate the buffer.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> SlidingWindow<T> {
    /// Creates an empty window holding at most `capacity` items.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an item, evicting the oldest if the window is full.
    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    /// Current contents, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> SlidingWindow<T> {
    /// Clones the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }
}

/// Chunk stream that records the last `capacity` chunks it yielded.
pub struct Windowed<S> {
    inner: S,
    window: SlidingWindow<AudioChunk>,
}

impl<S: ChunkStream> Windowed<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            window: SlidingWindow::new(capacity),
        }
    }

    /// The retained history, oldest first.
    pub fn window(&self) -> &SlidingWindow<AudioChunk> {
        &self.window
    }
}

#[async_trait]
impl<S: ChunkStream> ChunkStream for Windowed<S> {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        match self.inner.next_chunk().await? {
            Some(chunk) => {
                // Chunk clones share the sample buffer, so this is cheap.
                self.window.push(chunk.clone());
                Ok(Some(chunk))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed yielding a fixed list of chunks, then exhaustion.
    struct ListFeed {
        chunks: VecDeque<AudioChunk>,
    }

    impl ListFeed {
        fn new(sizes: &[usize]) -> Self {
            let mut next_value = 0i16;
            let chunks = sizes
                .iter()
                .map(|&n| {
                    let samples: Vec<i16> = (0..n)
                        .map(|_| {
                            let v = next_value;
                            next_value = next_value.wrapping_add(1);
                            v
                        })
                        .collect();
                    AudioChunk::from_samples_i16(0.0, &samples, 16000)
                })
                .collect();
            Self { chunks }
        }
    }

    #[async_trait]
    impl ChunkStream for ListFeed {
        async fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
            Ok(self.chunks.pop_front())
        }
    }

    async fn collect(stream: &mut impl ChunkStream) -> Vec<AudioChunk> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn resegments_100_100_100_into_160_160_20() {
        let mut even = EvenChunks::new(ListFeed::new(&[100, 100, 100]), 160);
        let chunks = collect(&mut even).await;

        let sizes: Vec<usize> = chunks.iter().map(|c| c.sample_count()).collect();
        assert_eq!(sizes, vec![160, 160, 20]);

        // No loss, no duplication: concatenation reproduces the input ramp.
        let all: Vec<i16> = chunks.iter().flat_map(|c| c.samples_i16()).collect();
        let expected: Vec<i16> = (0..300).map(|v| v as i16).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn exact_multiple_needs_no_split() {
        let mut even = EvenChunks::new(ListFeed::new(&[80, 80]), 160);
        let chunks = collect(&mut even).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sample_count(), 160);
    }

    #[tokio::test]
    async fn oversized_upstream_chunk_is_carved_up() {
        let mut even = EvenChunks::new(ListFeed::new(&[500]), 160);
        let chunks = collect(&mut even).await;
        let sizes: Vec<usize> = chunks.iter().map(|c| c.sample_count()).collect();
        assert_eq!(sizes, vec![160, 160, 160, 20]);
    }

    #[tokio::test]
    async fn empty_upstream_yields_nothing() {
        let mut even = EvenChunks::new(ListFeed::new(&[]), 160);
        assert!(even.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exhaustion_is_sticky() {
        let mut even = EvenChunks::new(ListFeed::new(&[10]), 160);
        assert_eq!(even.next_chunk().await.unwrap().unwrap().sample_count(), 10);
        assert!(even.next_chunk().await.unwrap().is_none());
        assert!(even.next_chunk().await.unwrap().is_none());
    }

    #[test]
    fn window_keeps_all_items_under_capacity() {
        let mut window = SlidingWindow::new(4);
        window.push(1);
        window.push(2);
        assert_eq!(window.snapshot(), vec![1, 2]);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn window_evicts_oldest_first() {
        let mut window = SlidingWindow::new(3);
        for item in 1..=5 {
            window.push(item);
        }
        assert_eq!(window.snapshot(), vec![3, 4, 5]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn window_read_does_not_mutate() {
        let mut window = SlidingWindow::new(2);
        window.push(1);
        window.push(2);
        let _ = window.snapshot();
        let _ = window.iter().count();
        assert_eq!(window.snapshot(), vec![1, 2]);
    }

    #[tokio::test]
    async fn windowed_records_yielded_chunks() {
        let mut windowed = Windowed::new(ListFeed::new(&[10, 10, 10]), 2);

        windowed.next_chunk().await.unwrap();
        assert_eq!(windowed.window().len(), 1);

        windowed.next_chunk().await.unwrap();
        windowed.next_chunk().await.unwrap();
        // Capacity 2: only the two most recent survive.
        assert_eq!(windowed.window().len(), 2);
        let first_sample: Vec<i16> = windowed
            .window()
            .iter()
            .map(|c| c.samples_i16()[0])
            .collect();
        assert_eq!(first_sample, vec![10, 20]);
    }
}
