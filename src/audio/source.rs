//! Source lifecycle: start/stop symmetry and scoped acquisition.
//!
//! A source provides audio as a sequence of [`AudioBlock`]s between `start`
//! and `stop`. Processors are themselves sources wrapping another source,
//! composing lifecycle calls: own state comes up before the upstream starts
//! delivering, and the upstream is stopped before own state is torn down.

use crate::audio::block::{AudioBlock, EndSignal};
use crate::error::Result;
use async_trait::async_trait;
use tracing::warn;

/// Lifecycle-scoped provider of a sequence of blocks.
///
/// `next_block` returning `Ok(None)` is the exhaustion signal. A source that
/// is stopped while its most recent block is still being iterated must end
/// that block, so consumers observe clean termination rather than a hang.
#[async_trait]
pub trait AudioSource: Send {
    /// Starts the source. Device handles and queues are opened here.
    async fn start(&mut self) -> Result<()>;

    /// Stops the source and ends the last-produced block.
    ///
    /// Teardown failures should be reported without aborting the remaining
    /// teardown steps where possible.
    async fn stop(&mut self) -> Result<()>;

    /// Produces the next block, or `None` when the source is exhausted.
    async fn next_block(&mut self) -> Result<Option<AudioBlock>>;
}

#[async_trait]
impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    async fn start(&mut self) -> Result<()> {
        (**self).start().await
    }

    async fn stop(&mut self) -> Result<()> {
        (**self).stop().await
    }

    async fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        (**self).next_block().await
    }
}

/// Runs `body` with the source started, stopping it on every exit path.
///
/// If the body fails, its error wins and a stop failure is only logged; if
/// the body succeeds, a stop failure is surfaced to the caller.
pub async fn listen<S, T, F>(source: &mut S, body: F) -> Result<T>
where
    S: AudioSource + ?Sized,
    F: AsyncFnOnce(&mut S) -> Result<T>,
{
    source.start().await?;
    let result = body(source).await;
    let stopped = source.stop().await;
    match result {
        Ok(value) => {
            stopped?;
            Ok(value)
        }
        Err(err) => {
            if let Err(stop_err) = stopped {
                warn!(error = %stop_err, "source stop failed during error teardown");
            }
            Err(err)
        }
    }
}

/// Tracks the most recently produced block so `stop` can end it.
#[derive(Debug, Default)]
pub struct LastBlock(Option<EndSignal>);

impl LastBlock {
    /// Remembers `block` as the most recent one.
    pub fn track(&mut self, block: &AudioBlock) {
        self.0 = Some(block.end_signal());
    }

    /// Ends the tracked block, if any.
    pub fn end(&mut self) {
        if let Some(signal) = self.0.take() {
            signal.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::block::{ChunkQueue, ChunkQueueReceiver};
    use crate::error::VoxpipeError;

    /// Source over a preloaded queue, recording lifecycle calls.
    pub(crate) struct QueueSource {
        receiver: ChunkQueueReceiver,
        pub queue: ChunkQueue,
        pub started: bool,
        pub stopped: bool,
        last_block: LastBlock,
        fail_stop: bool,
    }

    impl QueueSource {
        pub fn new() -> Self {
            let (queue, receiver) = ChunkQueue::channel();
            Self {
                receiver,
                queue,
                started: false,
                stopped: false,
                last_block: LastBlock::default(),
                fail_stop: false,
            }
        }

        fn with_stop_failure(mut self) -> Self {
            self.fail_stop = true;
            self
        }
    }

    #[async_trait]
    impl AudioSource for QueueSource {
        async fn start(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.stopped = true;
            self.last_block.end();
            if self.fail_stop {
                return Err(VoxpipeError::AudioCapture {
                    message: "close failed".to_string(),
                });
            }
            Ok(())
        }

        async fn next_block(&mut self) -> Result<Option<AudioBlock>> {
            let block = self.receiver.block();
            self.last_block.track(&block);
            Ok(Some(block))
        }
    }

    #[tokio::test]
    async fn listen_starts_and_stops_on_success() {
        let mut source = QueueSource::new();
        let value = listen(&mut source, async |src: &mut QueueSource| {
            assert!(src.started);
            Ok(42)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert!(source.stopped);
    }

    #[tokio::test]
    async fn listen_stops_on_body_failure() {
        let mut source = QueueSource::new();
        let result: Result<()> = listen(&mut source, async |_src: &mut QueueSource| {
            Err(VoxpipeError::AudioCapture {
                message: "boom".to_string(),
            })
        })
        .await;
        assert!(result.is_err());
        assert!(source.stopped, "stop must run on the failure path");
    }

    #[tokio::test]
    async fn listen_body_error_wins_over_stop_error() {
        let mut source = QueueSource::new().with_stop_failure();
        let result: Result<()> = listen(&mut source, async |_src: &mut QueueSource| {
            Err(VoxpipeError::Calibration {
                message: "body failed".to_string(),
            })
        })
        .await;
        match result {
            Err(VoxpipeError::Calibration { message }) => assert_eq!(message, "body failed"),
            other => panic!("expected the body error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn listen_surfaces_stop_error_after_success() {
        let mut source = QueueSource::new().with_stop_failure();
        let result = listen(&mut source, async |_src: &mut QueueSource| Ok(())).await;
        assert!(matches!(
            result,
            Err(VoxpipeError::AudioCapture { .. })
        ));
    }

    #[tokio::test]
    async fn stop_ends_active_block() {
        let mut source = QueueSource::new();
        source.start().await.unwrap();
        let mut block = source.next_block().await.unwrap().unwrap();

        // A queued chunk must not resurrect an ended block.
        source
            .queue
            .push(crate::audio::chunk::AudioChunk::from_samples_i16(
                0.0,
                &[1, 2],
                16000,
            ));

        source.stop().await.unwrap();
        assert!(block.ended());
        assert!(block.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn boxed_source_forwards_lifecycle() {
        let mut source: Box<dyn AudioSource> = Box::new(QueueSource::new());
        source.start().await.unwrap();
        assert!(source.next_block().await.unwrap().is_some());
        source.stop().await.unwrap();
    }
}
