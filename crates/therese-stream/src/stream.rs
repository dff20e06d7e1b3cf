use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::decoder::{LineDecoder, parse_frame};
use crate::frame::{Frame, Reducer};
use crate::transport::ByteStream;

/// Handle used to stop consuming a stream from anywhere.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// After this returns, `FrameStream::next_frame` yields no further frames
    /// and the pump task drops the transport, including a read in flight.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Forward-only sequence of frames from one streaming call.
///
/// Always finite: it ends after a terminal frame, after cancellation, or
/// after the transport closes (which is reported as a synthetic `error`
/// frame). Not restartable; issue a new call to retry. Dropping the stream
/// aborts it.
pub struct FrameStream<F> {
    stream_id: uuid::Uuid,
    rx: mpsc::Receiver<F>,
    abort_handle: AbortHandle,
    abort_rx: watch::Receiver<bool>,
    finished: bool,
}

impl<F: Frame> FrameStream<F> {
    /// Spawns the pump task that decodes `bytes` into frames.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(bytes: ByteStream, capacity: usize) -> Self {
        let stream_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (abort_tx, abort_rx) = watch::channel(false);
        tokio::spawn(pump(
            stream_id,
            decode_frames::<F>(bytes),
            tx,
            abort_rx.clone(),
        ));
        Self {
            stream_id,
            rx,
            abort_handle: AbortHandle { tx: abort_tx },
            abort_rx,
            finished: false,
        }
    }

    pub fn stream_id(&self) -> uuid::Uuid {
        self.stream_id
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next frame.
    ///
    /// Returns `None` once the stream has ended or was aborted.
    pub async fn next_frame(&mut self) -> Option<F> {
        if self.finished || *self.abort_rx.borrow() {
            return None;
        }
        let next = tokio::select! {
            biased;
            _ = wait_for_abort(&mut self.abort_rx) => None,
            frame = self.rx.recv() => frame,
        };
        match &next {
            Some(frame) if !frame.is_terminal() => {}
            _ => self.finished = true,
        }
        next
    }

    /// Drains the stream into `state` and returns the final snapshot.
    pub async fn fold<R>(mut self, mut state: R) -> R
    where
        R: Reducer<Frame = F>,
    {
        while let Some(frame) = self.next_frame().await {
            state = state.reduce(&frame);
        }
        state
    }
}

impl<F> Drop for FrameStream<F> {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn pump<F: Frame>(
    stream_id: uuid::Uuid,
    frames: impl futures::Stream<Item = F>,
    tx: mpsc::Sender<F>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let mut frames = std::pin::pin!(frames);
    let mut forwarded = 0_u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = wait_for_abort(&mut abort_rx) => {
                debug!(%stream_id, forwarded, "stream aborted by caller");
                break;
            }
            next = frames.next() => next,
        };
        let Some(frame) = next else {
            break;
        };
        let terminal = frame.is_terminal();
        debug!(%stream_id, kind = frame.kind(), seq = forwarded, "stream frame");
        let sent = tokio::select! {
            biased;
            _ = wait_for_abort(&mut abort_rx) => false,
            sent = tx.send(frame) => sent.is_ok(),
        };
        if !sent {
            debug!(%stream_id, forwarded, "stream consumer gone");
            break;
        }
        forwarded += 1;
        if terminal {
            break;
        }
    }
    info!(%stream_id, forwarded, "stream released");
}

struct DecodeState<F> {
    bytes: Option<ByteStream>,
    decoder: LineDecoder,
    pending: VecDeque<F>,
    saw_terminal: bool,
}

impl<F: Frame> DecodeState<F> {
    fn enqueue(&mut self, payloads: impl IntoIterator<Item = String>) {
        for payload in payloads {
            if self.saw_terminal {
                return;
            }
            let Some(frame) = parse_frame::<F>(&payload) else {
                continue;
            };
            if frame.is_terminal() {
                self.terminate();
            }
            self.pending.push_back(frame);
        }
    }

    fn fail(&mut self, message: String) {
        if !self.saw_terminal {
            self.terminate();
            self.pending.push_back(F::transport_failure(message));
        }
    }

    /// Stops reading and drops the transport right away.
    fn terminate(&mut self) {
        self.saw_terminal = true;
        self.bytes = None;
        self.decoder = LineDecoder::default();
    }
}

/// Turns raw transport bytes into frames.
///
/// Reading stops at the first terminal frame. A read error, or a close
/// without any terminal frame, yields one synthetic transport `error` frame.
pub fn decode_frames<F: Frame>(bytes: ByteStream) -> impl futures::Stream<Item = F> + Send {
    stream::unfold(
        DecodeState {
            bytes: Some(bytes),
            decoder: LineDecoder::default(),
            pending: VecDeque::new(),
            saw_terminal: false,
        },
        |mut state| async move {
            loop {
                if let Some(frame) = state.pending.pop_front() {
                    return Some((frame, state));
                }
                let next = match state.bytes.as_mut() {
                    Some(bytes) => bytes.next().await,
                    None => return None,
                };
                match next {
                    Some(Ok(chunk)) => {
                        let payloads = state.decoder.push_chunk(&chunk);
                        state.enqueue(payloads);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "stream read failed");
                        state.fail(format!("stream read failed: {e}"));
                    }
                    None => {
                        let tail = state.decoder.finish();
                        state.enqueue(tail);
                        state.bytes = None;
                        if !state.saw_terminal {
                            warn!("stream closed before a terminal frame");
                        }
                        state.fail("stream closed before completion".to_string());
                    }
                }
            }
        },
    )
}
