use std::sync::Arc;

use tracing::info;

use crate::board::{AdvisorInfo, BoardRequest, DeliberationFrame};
use crate::chat::{ChatFrame, ChatRequest};
use crate::config::BackendConfig;
use crate::errors::ClientError;
use crate::frame::Frame;
use crate::stream::FrameStream;
use crate::transport::{HttpTransport, Transport};

const CHAT_SEND_PATH: &str = "/api/chat/send";
const CHAT_CANCEL_PATH: &str = "/api/chat/cancel";
const BOARD_DELIBERATE_PATH: &str = "/api/board/deliberate";
const BOARD_ADVISORS_PATH: &str = "/api/board/advisors";

/// Result of `POST /api/chat/cancel/{conversation_id}`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CancelOutcome {
    /// `false` when no generation was running for the conversation.
    pub cancelled: bool,
    pub conversation_id: String,
}

/// Entry point for opening chat and deliberation streams.
#[derive(Clone)]
pub struct ThereseClient {
    transport: Arc<dyn Transport>,
    stream_buffer_capacity: usize,
}

impl ThereseClient {
    /// Creates a client talking HTTP to the configured backend.
    pub fn new(config: BackendConfig) -> Result<Self, ClientError> {
        let capacity = config.stream_buffer_capacity;
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport), capacity))
    }

    /// Creates a client from `THERESE_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(BackendConfig::from_env()?)
    }

    /// Creates a client over any transport.
    pub fn with_transport(transport: Arc<dyn Transport>, stream_buffer_capacity: usize) -> Self {
        Self {
            transport,
            stream_buffer_capacity: stream_buffer_capacity.max(1),
        }
    }

    /// Sends a chat message and streams the assistant's answer.
    ///
    /// Fails only when the request is invalid or the backend cannot be
    /// reached; every later failure arrives as an `error` frame.
    pub async fn open_chat(&self, request: ChatRequest) -> Result<FrameStream<ChatFrame>, ClientError> {
        request.validate()?;
        info!(
            conversation_id = request.conversation_id.as_deref().unwrap_or("-"),
            include_memory = request.include_memory,
            "opening chat stream"
        );
        self.open(CHAT_SEND_PATH, &request).await
    }

    /// Convenes the board and streams the deliberation.
    pub async fn open_deliberation(
        &self,
        request: BoardRequest,
    ) -> Result<FrameStream<DeliberationFrame>, ClientError> {
        request.validate()?;
        info!(
            advisors = request.advisors.as_ref().map_or(0, Vec::len),
            "opening deliberation stream"
        );
        self.open(BOARD_DELIBERATE_PATH, &request).await
    }

    /// Asks the backend to stop generating for a conversation.
    ///
    /// Complements `AbortHandle::abort`, which only stops the local stream.
    pub async fn cancel_generation(&self, conversation_id: &str) -> Result<CancelOutcome, ClientError> {
        let conversation_id = conversation_id.trim();
        if conversation_id.is_empty() {
            return Err(ClientError::validation("conversation id must not be empty"));
        }
        let value = self
            .transport
            .post_json(
                &format!("{CHAT_CANCEL_PATH}/{conversation_id}"),
                serde_json::Value::Null,
            )
            .await?;
        decode(value)
    }

    /// Lists the advisors the board can convene.
    pub async fn list_advisors(&self) -> Result<Vec<AdvisorInfo>, ClientError> {
        let value = self.transport.get_json(BOARD_ADVISORS_PATH).await?;
        decode(value)
    }

    async fn open<F: Frame>(
        &self,
        path: &str,
        request: &impl serde::Serialize,
    ) -> Result<FrameStream<F>, ClientError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ClientError::validation(format!("failed to serialize request: {e}")))?;
        let bytes = self.transport.open_stream(path, body).await?;
        let stream = FrameStream::spawn(bytes, self.stream_buffer_capacity);
        info!(stream_id = %stream.stream_id(), path, "stream opened");
        Ok(stream)
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}
