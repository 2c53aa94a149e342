//! Stream controller: lifecycle of one chunked completion stream.
//!
//! The controller owns at most one active chunk source. A consumer task
//! reads the source and forwards updates over an mpsc channel to the UI
//! event loop; the controller itself is a small observable state machine
//! ({idle, streaming, completed, errored, cancelled}) that the event loop
//! drives with the terminal updates it receives.
//!
//! Cancellation is cooperative: an abandon flag stops the consumer at its
//! next iteration without draining the remainder of the source, and the
//! receiver-side [`StreamController::accepts`] check discards anything a
//! superseded stream already put in the channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::message::StreamChunk;

/// Error type for stream consumption.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The request failed to establish, returned a non-success status, or
    /// the transport dropped mid-read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded as UTF-8 text.
    #[error("decode error: {0}")]
    Decode(String),
}

/// A lazy, asynchronous, finite sequence of text chunks for one request.
///
/// Terminates with a chunk whose `done` flag is set (the client synthesizes
/// one at transport end-of-stream) or with an error.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, StreamError>> + Send>>;

/// Lifecycle phase of the controller, observable by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// No stream has been opened, or the previous one was fully resolved.
    #[default]
    Idle,
    /// A chunk source is being consumed.
    Streaming,
    /// The stream terminated normally.
    Completed,
    /// The stream failed; see [`StreamController::last_error`].
    Errored,
    /// The stream was abandoned by cancellation. Not an error.
    Cancelled,
}

/// Payload of a stream update.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamPayload {
    /// A text fragment to append to the in-flight accumulator.
    Chunk(String),
    /// The stream terminated normally.
    Done,
    /// The stream failed; the in-flight accumulator must be discarded.
    Failed(StreamError),
}

/// One update forwarded from the consumer task to the UI event loop.
#[derive(Debug)]
pub struct StreamUpdate {
    /// Which `start()` call produced this update.
    pub stream_id: u64,
    /// The payload.
    pub payload: StreamPayload,
}

/// Owns one active chunk source at a time.
#[derive(Debug, Default)]
pub struct StreamController {
    phase: StreamPhase,
    stream_id: u64,
    abandon: Option<Arc<AtomicBool>>,
    task: Option<JoinHandle<()>>,
    last_error: Option<StreamError>,
}

impl StreamController {
    /// Create an idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Whether a stream is currently active.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.phase == StreamPhase::Streaming
    }

    /// Id of the most recently started stream.
    #[must_use]
    pub const fn current_stream(&self) -> u64 {
        self.stream_id
    }

    /// The error that ended the last stream, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&StreamError> {
        self.last_error.as_ref()
    }

    /// Begin consuming a chunk source.
    ///
    /// Any previously active stream is cancelled first, preserving the
    /// at-most-one-accumulator invariant. The factory resolves to the chunk
    /// source; establishment failure surfaces as a `Failed` update. Returns
    /// the id that tags every update of this stream.
    pub fn start<F>(&mut self, factory: F, updates: mpsc::Sender<StreamUpdate>) -> u64
    where
        F: Future<Output = Result<ChunkStream, StreamError>> + Send + 'static,
    {
        self.cancel();
        self.stream_id += 1;
        self.phase = StreamPhase::Streaming;
        self.last_error = None;

        let stream_id = self.stream_id;
        let abandon = Arc::new(AtomicBool::new(false));
        self.abandon = Some(Arc::clone(&abandon));
        self.task = Some(tokio::spawn(consume(stream_id, factory, abandon, updates)));

        debug!(stream_id, "stream started");
        stream_id
    }

    /// Request cooperative cancellation.
    ///
    /// Idempotent and a no-op when idle; safe to call during teardown. Any
    /// updates the abandoned stream already sent are rejected by
    /// [`Self::accepts`].
    pub fn cancel(&mut self) {
        if let Some(flag) = &self.abandon {
            flag.store(true, Ordering::Relaxed);
        }
        if self.phase == StreamPhase::Streaming {
            self.phase = StreamPhase::Cancelled;
            debug!(stream_id = self.stream_id, "stream cancelled");
        }
        // The abandon flag stops the consumer; dropping the handle only
        // detaches it.
        self.task = None;
        self.abandon = None;
    }

    /// Whether an update with this id should still be applied.
    ///
    /// True only for the current stream while it is streaming, so a stale
    /// stream's chunks can never reach the accumulator after a cancel or a
    /// conversation switch.
    #[must_use]
    pub fn accepts(&self, stream_id: u64) -> bool {
        stream_id == self.stream_id && self.phase == StreamPhase::Streaming
    }

    /// Record that the current stream's `Done` update was applied.
    pub fn mark_completed(&mut self) {
        if self.phase == StreamPhase::Streaming {
            self.phase = StreamPhase::Completed;
        }
        self.task = None;
        self.abandon = None;
    }

    /// Record that the current stream's `Failed` update was applied.
    pub fn mark_errored(&mut self, error: StreamError) {
        if self.phase == StreamPhase::Streaming {
            self.phase = StreamPhase::Errored;
            self.last_error = Some(error);
        }
        self.task = None;
        self.abandon = None;
    }
}

/// Consumer task: reads the source and forwards updates.
///
/// Exactly one of `Done`, `Failed`, or silence (abandoned) terminates the
/// task; a `done` chunk stops consumption even if the source would yield
/// more.
async fn consume<F>(
    stream_id: u64,
    factory: F,
    abandon: Arc<AtomicBool>,
    updates: mpsc::Sender<StreamUpdate>,
) where
    F: Future<Output = Result<ChunkStream, StreamError>> + Send + 'static,
{
    let mut source = match factory.await {
        Ok(source) => source,
        Err(error) => {
            let _ = updates
                .send(StreamUpdate {
                    stream_id,
                    payload: StreamPayload::Failed(error),
                })
                .await;
            return;
        }
    };

    while let Some(item) = source.next().await {
        if abandon.load(Ordering::Relaxed) {
            // Abandoned: the remainder of the source is dropped, not drained.
            debug!(stream_id, "stream abandoned");
            return;
        }
        match item {
            Ok(chunk) if chunk.done => {
                if !chunk.content.is_empty() {
                    warn!(stream_id, "content on a done chunk ignored");
                }
                let _ = updates
                    .send(StreamUpdate {
                        stream_id,
                        payload: StreamPayload::Done,
                    })
                    .await;
                return;
            }
            Ok(chunk) => {
                if chunk.content.is_empty() {
                    continue;
                }
                let update = StreamUpdate {
                    stream_id,
                    payload: StreamPayload::Chunk(chunk.content),
                };
                if updates.send(update).await.is_err() {
                    // Receiver gone; nothing left to deliver to.
                    return;
                }
            }
            Err(error) => {
                let _ = updates
                    .send(StreamUpdate {
                        stream_id,
                        payload: StreamPayload::Failed(error),
                    })
                    .await;
                return;
            }
        }
    }

    // The source ended without a done marker; treat as normal completion.
    let _ = updates
        .send(StreamUpdate {
            stream_id,
            payload: StreamPayload::Done,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn source_of(chunks: Vec<Result<StreamChunk, StreamError>>) -> ChunkStream {
        stream::iter(chunks).boxed()
    }

    async fn drain_until_terminal(
        rx: &mut mpsc::Receiver<StreamUpdate>,
    ) -> (String, Option<StreamPayload>) {
        let mut text = String::new();
        while let Some(update) = rx.recv().await {
            match update.payload {
                StreamPayload::Chunk(fragment) => text.push_str(&fragment),
                terminal => return (text, Some(terminal)),
            }
        }
        (text, None)
    }

    #[tokio::test]
    async fn chunks_concatenate_regardless_of_boundaries() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        controller.start(
            async {
                Ok(source_of(vec![
                    Ok(StreamChunk::text("he")),
                    Ok(StreamChunk::text("llo")),
                    Ok(StreamChunk::terminator()),
                ]))
            },
            tx,
        );

        let (text, terminal) = drain_until_terminal(&mut rx).await;
        assert_eq!(text, "hello");
        assert_eq!(terminal, Some(StreamPayload::Done));
    }

    #[tokio::test]
    async fn single_chunk_finalizes_identically() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        controller.start(
            async {
                Ok(source_of(vec![
                    Ok(StreamChunk::text("hello")),
                    Ok(StreamChunk::terminator()),
                ]))
            },
            tx,
        );

        let (text, terminal) = drain_until_terminal(&mut rx).await;
        assert_eq!(text, "hello");
        assert_eq!(terminal, Some(StreamPayload::Done));
    }

    #[tokio::test]
    async fn chunks_after_done_are_ignored() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        controller.start(
            async {
                Ok(source_of(vec![
                    Ok(StreamChunk::text("answer")),
                    Ok(StreamChunk::terminator()),
                    Ok(StreamChunk::text("stray trailing chunk")),
                ]))
            },
            tx,
        );

        let (text, terminal) = drain_until_terminal(&mut rx).await;
        assert_eq!(text, "answer");
        assert_eq!(terminal, Some(StreamPayload::Done));
        // The consumer stopped at the terminator; nothing follows.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn content_on_done_chunk_is_dropped() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        controller.start(
            async {
                Ok(source_of(vec![
                    Ok(StreamChunk::text("kept")),
                    Ok(StreamChunk {
                        content: "dropped".to_string(),
                        done: true,
                    }),
                ]))
            },
            tx,
        );

        let (text, terminal) = drain_until_terminal(&mut rx).await;
        assert_eq!(text, "kept");
        assert_eq!(terminal, Some(StreamPayload::Done));
    }

    #[tokio::test]
    async fn establishment_failure_surfaces_as_failed() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        controller.start(
            async { Err(StreamError::Transport("HTTP 503".to_string())) },
            tx,
        );

        let (text, terminal) = drain_until_terminal(&mut rx).await;
        assert!(text.is_empty());
        assert_eq!(
            terminal,
            Some(StreamPayload::Failed(StreamError::Transport(
                "HTTP 503".to_string()
            )))
        );
    }

    #[tokio::test]
    async fn cancel_before_first_chunk_is_silent() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        // A source that never yields.
        controller.start(
            async { Ok(stream::pending::<Result<StreamChunk, StreamError>>().boxed()) },
            tx,
        );
        controller.cancel();

        assert_eq!(controller.phase(), StreamPhase::Cancelled);
        assert!(controller.last_error().is_none());
        // No update is ever accepted for the cancelled stream.
        assert!(!controller.accepts(controller.current_stream()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_safe_when_idle() {
        let mut controller = StreamController::new();
        controller.cancel();
        controller.cancel();
        assert_eq!(controller.phase(), StreamPhase::Idle);
    }

    #[tokio::test]
    async fn stale_updates_are_rejected_after_restart() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        let first = controller.start(
            async {
                Ok(source_of(vec![
                    Ok(StreamChunk::text("from the old conversation")),
                    Ok(StreamChunk::terminator()),
                ]))
            },
            tx.clone(),
        );

        // Switching conversations: cancel, then start a new stream.
        controller.cancel();
        let second = controller.start(
            async {
                Ok(source_of(vec![
                    Ok(StreamChunk::text("fresh")),
                    Ok(StreamChunk::terminator()),
                ]))
            },
            tx,
        );
        assert_ne!(first, second);

        // Only updates tagged with the second id pass the gate.
        let mut accepted = String::new();
        while let Some(update) = rx.recv().await {
            if !controller.accepts(update.stream_id) {
                continue;
            }
            match update.payload {
                StreamPayload::Chunk(fragment) => accepted.push_str(&fragment),
                StreamPayload::Done => {
                    controller.mark_completed();
                    break;
                }
                StreamPayload::Failed(_) => unreachable!(),
            }
        }
        assert_eq!(accepted, "fresh");
        assert_eq!(controller.phase(), StreamPhase::Completed);
    }

    #[tokio::test]
    async fn exactly_one_terminal_update_per_start() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        controller.start(
            async {
                Ok(source_of(vec![
                    Ok(StreamChunk::text("a")),
                    Ok(StreamChunk::terminator()),
                ]))
            },
            tx,
        );

        let mut terminals = 0;
        while let Some(update) = rx.recv().await {
            if !matches!(update.payload, StreamPayload::Chunk(_)) {
                terminals += 1;
            }
        }
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn bare_end_of_stream_completes() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();

        controller.start(
            async { Ok(source_of(vec![Ok(StreamChunk::text("partial"))])) },
            tx,
        );

        let (text, terminal) = drain_until_terminal(&mut rx).await;
        assert_eq!(text, "partial");
        assert_eq!(terminal, Some(StreamPayload::Done));
    }

    #[tokio::test]
    async fn phase_transitions_follow_terminal_updates() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller = StreamController::new();
        assert_eq!(controller.phase(), StreamPhase::Idle);

        controller.start(
            async {
                Ok(source_of(vec![Err(StreamError::Transport(
                    "connection reset".to_string(),
                ))]))
            },
            tx,
        );
        assert!(controller.is_streaming());

        let (_, terminal) = drain_until_terminal(&mut rx).await;
        match terminal {
            Some(StreamPayload::Failed(error)) => controller.mark_errored(error),
            other => unreachable!("expected failure, got {other:?}"),
        }
        assert_eq!(controller.phase(), StreamPhase::Errored);
        assert!(controller.last_error().is_some());
    }
}
