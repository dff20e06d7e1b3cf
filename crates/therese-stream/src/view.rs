use tracing::debug;

use crate::frame::Reducer;
use crate::stream::{AbortHandle, FrameStream};

/// View-side owner of the current snapshot of one conversation or
/// deliberation.
///
/// Holds at most one open stream: starting a new one aborts the previous
/// stream and resets the snapshot, so late frames from an old stream can
/// never reach the new state.
pub struct StreamView<R: Reducer> {
    state: R,
    stream: Option<FrameStream<R::Frame>>,
}

impl<R: Reducer> Default for StreamView<R> {
    fn default() -> Self {
        Self {
            state: R::default(),
            stream: None,
        }
    }
}

impl<R: Reducer> StreamView<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current stream, aborting any stream still in flight.
    pub fn start(&mut self, stream: FrameStream<R::Frame>) {
        if let Some(previous) = self.stream.take() {
            debug!(stream_id = %previous.stream_id(), "aborting previous stream before restart");
            previous.abort_handle().abort();
        }
        self.state = R::default();
        self.stream = Some(stream);
    }

    /// Waits for one frame and applies it.
    ///
    /// Returns the updated snapshot, or `None` once no stream is open or the
    /// open stream has ended.
    pub async fn advance(&mut self) -> Option<&R> {
        let stream = self.stream.as_mut()?;
        match stream.next_frame().await {
            Some(frame) => {
                let state = std::mem::take(&mut self.state);
                self.state = state.reduce(&frame);
                Some(&self.state)
            }
            None => {
                self.stream = None;
                None
            }
        }
    }

    pub fn snapshot(&self) -> &R {
        &self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn abort_handle(&self) -> Option<AbortHandle> {
        self.stream.as_ref().map(FrameStream::abort_handle)
    }

    /// Stops the open stream; the snapshot keeps whatever was accumulated.
    pub fn cancel(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.abort_handle().abort();
        }
    }

    /// Drops the stream and the snapshot.
    pub fn reset(&mut self) {
        self.cancel();
        self.state = R::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{AdvisorRole, DeliberationState};
    use crate::buffer::BufferStatus;
    use crate::chat::ChatState;
    use crate::transport::ByteStream;
    use bytes::Bytes;
    use futures::StreamExt as _;
    use futures::stream;

    fn bytes_then_pending(text: &'static str) -> ByteStream {
        stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(text.as_bytes()))])
            .chain(stream::pending())
            .boxed()
    }

    #[tokio::test]
    async fn advance_yields_snapshot_after_every_frame() {
        let mut view = StreamView::<ChatState>::new();
        view.start(FrameStream::spawn(
            bytes_then_pending(
                "data: {\"type\":\"text\",\"content\":\"Bon\"}\ndata: {\"type\":\"text\",\"content\":\"jour\"}\ndata: {\"type\":\"done\"}\n",
            ),
            8,
        ));
        let mut texts = Vec::new();
        while let Some(state) = view.advance().await {
            texts.push(state.text().to_string());
        }
        assert_eq!(texts, vec!["Bon", "Bonjour", "Bonjour"]);
        assert_eq!(view.snapshot().message.status, BufferStatus::Complete);
        assert!(!view.is_streaming());
    }

    #[tokio::test]
    async fn restart_aborts_previous_stream_and_resets_state() {
        let mut view = StreamView::<DeliberationState>::new();
        let first = FrameStream::spawn(
            bytes_then_pending(
                "data: {\"type\":\"advisor_chunk\",\"role\":\"analyst\",\"content\":\"ancien\"}\n",
            ),
            8,
        );
        let first_abort = first.abort_handle();
        view.start(first);
        assert!(view.advance().await.is_some());
        assert!(view.snapshot().opinion(AdvisorRole::Analyst).is_some());

        view.start(FrameStream::spawn(
            bytes_then_pending(
                "data: {\"type\":\"advisor_chunk\",\"role\":\"devil\",\"content\":\"nouveau\"}\n",
            ),
            8,
        ));
        assert!(first_abort.is_aborted());
        assert!(view.snapshot().advisors.is_empty());

        let state = view.advance().await.expect("frame from new stream");
        assert!(state.opinion(AdvisorRole::Analyst).is_none());
        assert_eq!(
            state.opinion(AdvisorRole::Devil).map(|b| b.text.as_str()),
            Some("nouveau")
        );
    }

    #[tokio::test]
    async fn cancel_keeps_accumulated_text() {
        let mut view = StreamView::<ChatState>::new();
        view.start(FrameStream::spawn(
            bytes_then_pending("data: {\"type\":\"text\",\"content\":\"partiel\"}\n"),
            8,
        ));
        assert!(view.advance().await.is_some());
        let abort = view.abort_handle().expect("open stream");
        view.cancel();
        assert!(abort.is_aborted());
        assert!(view.advance().await.is_none());
        assert_eq!(view.snapshot().text(), "partiel");
        view.reset();
        assert_eq!(view.snapshot().text(), "");
    }
}
