//! Stream Controller
//!
//! Owns the cancellable read loop over one streamed HTTP response. The loop
//! runs as a background task and pushes [`StreamSignal`]s into a channel:
//!
//! ```text
//! Open -> Event* -> (Complete | Error)
//! ```
//!
//! Cancellation is cooperative: [`StreamController::cancel`] trips a
//! [`CancellationToken`] that the loop checks before every signal it emits,
//! and the body stream is dropped as soon as the loop observes it. A cancelled
//! stream emits neither `Complete` nor `Error`; the channel simply closes.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::events::{http_error_from_payload, STREAMING_EVENT_HTTP_ERROR};
use super::sse::{FrameDecoder, SseFrame};
use crate::error::ChatError;

/// Lifecycle signal of one stream.
#[derive(Debug)]
pub enum StreamSignal {
    Open,
    Event(SseFrame),
    Error(ChatError),
    Complete,
}

/// Cancellation handle of an in-flight stream. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct StreamController {
    token: CancellationToken,
}

impl StreamController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the stream. Idempotent, safe after natural completion.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Cancelling message stream");
        }
        self.token.cancel();
    }

    /// `false` once cancelled or finished.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Receiving side of a stream session.
pub struct StreamHandle {
    signals: mpsc::UnboundedReceiver<StreamSignal>,
    controller: StreamController,
}

impl StreamHandle {
    /// Spawn the read loop over `body`. `Open` is queued before any frame.
    pub fn spawn<S, B, E>(body: S, controller: StreamController) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Into<ChatError> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(StreamSignal::Open);

        tokio::spawn(read_loop(body, tx, controller.clone()));

        Self {
            signals: rx,
            controller,
        }
    }

    /// Next signal; `None` once the stream is over (including cancellation).
    pub async fn next(&mut self) -> Option<StreamSignal> {
        self.signals.recv().await
    }

    pub fn controller(&self) -> StreamController {
        self.controller.clone()
    }

    pub fn cancel(&self) {
        self.controller.cancel();
    }
}

async fn read_loop<S, B, E>(
    mut body: S,
    tx: mpsc::UnboundedSender<StreamSignal>,
    controller: StreamController,
) where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let mut decoder = FrameDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = controller.token.cancelled() => return,
            chunk = body.next() => chunk,
        };

        match next {
            Some(Ok(chunk)) => {
                let frames = decoder.push_bytes(chunk.as_ref());
                if !dispatch_frames(frames, &tx, &controller) {
                    return;
                }
            }
            Some(Err(err)) => {
                if controller.is_active() {
                    let err: ChatError = err.into();
                    warn!("Message stream read failed: {}", err);
                    let _ = tx.send(StreamSignal::Error(err));
                }
                controller.cancel();
                return;
            }
            None => {
                let frames = decoder.finish();
                if !dispatch_frames(frames, &tx, &controller) {
                    return;
                }
                if controller.is_active() {
                    let _ = tx.send(StreamSignal::Complete);
                }
                controller.cancel();
                return;
            }
        }
    }
}

/// Route frames to the channel. Returns `false` when the loop must stop.
fn dispatch_frames(
    frames: Vec<SseFrame>,
    tx: &mpsc::UnboundedSender<StreamSignal>,
    controller: &StreamController,
) -> bool {
    for frame in frames {
        if !controller.is_active() {
            return false;
        }

        let fatal = frame.is(STREAMING_EVENT_HTTP_ERROR).then(|| http_error_from_payload(&frame.data));

        if tx.send(StreamSignal::Event(frame)).is_err() {
            // receiver gone, nobody is listening any more
            controller.cancel();
            return false;
        }

        if let Some(err) = fatal {
            warn!("Message stream reported an error: {}", err);
            let _ = tx.send(StreamSignal::Error(err));
            controller.cancel();
            return false;
        }
    }
    true
}
