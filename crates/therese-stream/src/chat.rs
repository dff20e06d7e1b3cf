//! Chat protocol: frames sent by `POST /api/chat/send` and the reducer that
//! folds them into the in-progress assistant message.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::AccumulationBuffer;
use crate::errors::{ClientError, ErrorOrigin, StreamError};
use crate::frame::{Frame, Reducer};

/// Entity key of the single assistant message a chat stream produces.
pub const ASSISTANT_MESSAGE: &str = "assistant";

/// Body of `POST /api/chat/send`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub include_memory: bool,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            include_memory: true,
            stream: true,
        }
    }

    /// Continues an existing conversation.
    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn include_memory(mut self, include: bool) -> Self {
        self.include_memory = include;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.message.trim().is_empty() {
            return Err(ClientError::validation("chat message must not be empty"));
        }
        if !self.stream {
            return Err(ClientError::validation(
                "chat requests opened as a stream must set stream=true",
            ));
        }
        Ok(())
    }
}

/// Token accounting attached to the final `done` frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_eur: f64,
    pub model: Option<String>,
}

/// Uncertainty report computed by the backend for the full answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Uncertainty {
    pub is_uncertain: bool,
    pub uncertainty_phrases: Vec<String>,
    /// Percentage, 0 to 100.
    pub confidence_score: f64,
    pub confidence_level: String,
    pub should_verify: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedContact {
    pub name: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub confidence: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedProject {
    pub name: String,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub status: Option<String>,
    pub confidence: f64,
}

/// Contacts and projects spotted in the conversation, awaiting user confirmation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectedEntities {
    pub contacts: Vec<ExtractedContact>,
    pub projects: Vec<ExtractedProject>,
}

impl DetectedEntities {
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.projects.is_empty()
    }
}

/// One frame of the chat stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatFrame {
    /// Content fragment to append to the assistant message.
    Text {
        #[serde(default)]
        content: String,
        #[serde(default)]
        conversation_id: Option<String>,
    },
    /// The message is complete.
    Done {
        #[serde(default)]
        content: String,
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        usage: Option<ChatUsage>,
        #[serde(default)]
        uncertainty: Option<Uncertainty>,
    },
    /// Generation failed; `content` is shown to the user as-is.
    Error {
        #[serde(default)]
        content: String,
        #[serde(skip)]
        origin: ErrorOrigin,
    },
    /// The backend stopped generating after `POST /api/chat/cancel/{id}`;
    /// the connection closes right after.
    Cancelled {
        #[serde(default)]
        content: String,
    },
    /// Advisory progress line ("Traitement de 2 fichier(s)...").
    Status {
        #[serde(default)]
        content: String,
        #[serde(default)]
        conversation_id: Option<String>,
    },
    /// A tool ran while the answer was being generated.
    ToolResult {
        #[serde(default)]
        content: String,
        #[serde(default)]
        tool_name: Option<String>,
    },
    /// Side-channel annotation; never part of the message text.
    EntitiesDetected {
        #[serde(default)]
        content: String,
        #[serde(default)]
        entities: Option<DetectedEntities>,
    },
    #[serde(other)]
    Unknown,
}

impl ChatFrame {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            conversation_id: None,
        }
    }

    pub fn done() -> Self {
        Self::Done {
            content: String::new(),
            conversation_id: None,
            message_id: None,
            usage: None,
            uncertainty: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
            origin: ErrorOrigin::Peer,
        }
    }
}

impl Frame for ChatFrame {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Error { .. } | Self::Cancelled { .. }
        )
    }

    fn transport_failure(message: impl Into<String>) -> Self {
        Self::Error {
            content: message.into(),
            origin: ErrorOrigin::Transport,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
            Self::Status { .. } => "status",
            Self::ToolResult { .. } => "tool_result",
            Self::EntitiesDetected { .. } => "entities_detected",
            Self::Unknown => "unknown",
        }
    }
}

/// Final metadata of a completed assistant message.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChatCompletion {
    pub message_id: Option<String>,
    pub usage: Option<ChatUsage>,
    pub uncertainty: Option<Uncertainty>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool_name: Option<String>,
    pub content: String,
}

impl ToolResult {
    /// Tool name, falling back to the `[name]` prefix the backend writes into
    /// the content line.
    pub fn name(&self) -> Option<&str> {
        if let Some(name) = self.tool_name.as_deref() {
            return Some(name);
        }
        let rest = self.content.strip_prefix('[')?;
        let end = rest.find(']')?;
        Some(&rest[..end])
    }
}

/// Snapshot of one chat stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatState {
    pub message: AccumulationBuffer<String, ChatCompletion>,
    pub conversation_id: Option<String>,
    pub status_line: Option<String>,
    /// Set when the backend confirmed a cancellation. The message is then
    /// complete with whatever text arrived before it.
    pub cancelled: bool,
    pub tool_results: Vec<ToolResult>,
    pub entities: Option<DetectedEntities>,
    pub error: Option<StreamError>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            message: AccumulationBuffer::new(ASSISTANT_MESSAGE.to_string()),
            conversation_id: None,
            status_line: None,
            cancelled: false,
            tool_results: Vec::new(),
            entities: None,
            error: None,
        }
    }
}

impl ChatState {
    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.message.text
    }

    pub fn completion(&self) -> Option<&ChatCompletion> {
        self.message.metadata.as_ref()
    }

    fn remember_conversation(&mut self, conversation_id: &Option<String>) {
        if self.conversation_id.is_none() {
            self.conversation_id.clone_from(conversation_id);
        }
    }
}

impl Reducer for ChatState {
    type Frame = ChatFrame;

    fn reduce(mut self, frame: &ChatFrame) -> Self {
        if self.message.is_terminal() {
            debug!(kind = frame.kind(), status = ?self.message.status, "ignoring frame after terminal message");
            return self;
        }
        match frame {
            ChatFrame::Text {
                content,
                conversation_id,
            } => {
                self.remember_conversation(conversation_id);
                self.message.append(content);
            }
            ChatFrame::Done {
                conversation_id,
                message_id,
                usage,
                uncertainty,
                ..
            } => {
                self.remember_conversation(conversation_id);
                self.message.attach_metadata(ChatCompletion {
                    message_id: message_id.clone(),
                    usage: usage.clone(),
                    uncertainty: uncertainty.clone(),
                });
                self.message.complete();
                self.status_line = None;
            }
            ChatFrame::Error { content, origin } => {
                self.message.fail();
                self.error = Some(StreamError::new(*origin, content.clone()));
            }
            ChatFrame::Cancelled { .. } => {
                debug!(chars = self.message.text.chars().count(), "generation cancelled by backend");
                self.message.complete();
                self.cancelled = true;
                self.status_line = None;
            }
            ChatFrame::Status {
                content,
                conversation_id,
            } => {
                self.remember_conversation(conversation_id);
                self.status_line = Some(content.clone());
            }
            ChatFrame::ToolResult { content, tool_name } => {
                self.tool_results.push(ToolResult {
                    tool_name: tool_name.clone(),
                    content: content.clone(),
                });
            }
            ChatFrame::EntitiesDetected { content, entities } => {
                let detected = match entities {
                    Some(entities) => Some(entities.clone()),
                    None => crate::decoder::parse_frame::<DetectedEntities>(content),
                };
                if let Some(detected) = detected {
                    self.entities = Some(detected);
                }
            }
            ChatFrame::Unknown => {
                debug!("ignoring unknown chat frame kind");
            }
        }
        self
    }

    fn is_finished(&self) -> bool {
        self.message.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferStatus;
    use crate::decoder::{LineDecoder, parse_frame};

    fn fold(lines: &str) -> ChatState {
        let mut decoder = LineDecoder::default();
        decoder
            .push_chunk(lines.as_bytes())
            .into_iter()
            .chain(decoder.finish())
            .filter_map(|payload| parse_frame::<ChatFrame>(&payload))
            .fold(ChatState::default(), |state, frame| state.reduce(&frame))
    }

    #[test]
    fn simple_chat_accumulates_and_completes() {
        let state = fold(concat!(
            "data: {\"type\":\"text\",\"content\":\"Bon\"}\n",
            "data: {\"type\":\"text\",\"content\":\"jour\"}\n",
            "data: {\"type\":\"done\",\"content\":\"\"}\n",
        ));
        assert_eq!(state.text(), "Bonjour");
        assert_eq!(state.message.status, BufferStatus::Complete);
        assert!(state.is_finished());
    }

    #[test]
    fn done_carries_usage_and_message_id() {
        let state = fold(concat!(
            "data: {\"type\":\"text\",\"content\":\"ok\",\"conversation_id\":\"c1\"}\n",
            "data: {\"type\":\"done\",\"content\":\"\",\"conversation_id\":\"c1\",\"message_id\":\"m9\",",
            "\"usage\":{\"input_tokens\":12,\"output_tokens\":3,\"cost_eur\":0.001,\"model\":\"claude\"},",
            "\"uncertainty\":{\"is_uncertain\":false,\"confidence_level\":\"high\"}}\n",
        ));
        let completion = state.completion().expect("completion metadata");
        assert_eq!(completion.message_id.as_deref(), Some("m9"));
        let usage = completion.usage.as_ref().expect("usage");
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(usage.model.as_deref(), Some("claude"));
        assert_eq!(
            completion.uncertainty.as_ref().map(|u| u.confidence_level.as_str()),
            Some("high")
        );
        assert_eq!(state.conversation_id.as_deref(), Some("c1"));
    }

    #[test]
    fn error_keeps_partial_text_and_sets_error() {
        let state = fold(concat!(
            "data: {\"type\":\"text\",\"content\":\"Il sem\"}\n",
            "data: {\"type\":\"error\",\"content\":\"Erreur de generation: timeout\"}\n",
        ));
        assert_eq!(state.text(), "Il sem");
        assert_eq!(state.message.status, BufferStatus::Errored);
        let error = state.error.expect("error recorded");
        assert_eq!(error.origin, ErrorOrigin::Peer);
        assert_eq!(error.message, "Erreur de generation: timeout");
    }

    #[test]
    fn frames_after_terminal_are_ignored() {
        let done = ChatState::default()
            .reduce(&ChatFrame::text("fin"))
            .reduce(&ChatFrame::done());
        let after = done
            .clone()
            .reduce(&ChatFrame::text(" encore"))
            .reduce(&ChatFrame::error("late"))
            .reduce(&ChatFrame::done());
        assert_eq!(after, done);
    }

    #[test]
    fn malformed_line_does_not_change_outcome() {
        let clean = fold(concat!(
            "data: {\"type\":\"text\",\"content\":\"a\"}\n",
            "data: {\"type\":\"text\",\"content\":\"b\"}\n",
            "data: {\"type\":\"done\"}\n",
        ));
        let noisy = fold(concat!(
            "data: {\"type\":\"text\",\"content\":\"a\"}\n",
            "data: {\"type\":\"text\",\"content\":\n",
            "data: {\"type\":\"text\",\"content\":\"b\"}\n",
            "data: {\"type\":\"done\"}\n",
        ));
        assert_eq!(noisy, clean);
    }

    #[test]
    fn sentinel_and_blank_lines_give_one_terminal_transition() {
        let mut transitions = 0;
        let mut state = ChatState::default();
        let mut decoder = LineDecoder::default();
        for payload in decoder.push_chunk(b"data: [DONE]\n\ndata: {\"type\":\"done\",\"content\":\"\"}\n") {
            let frame: ChatFrame = parse_frame(&payload).expect("frame");
            let was_finished = state.is_finished();
            state = state.reduce(&frame);
            if !was_finished && state.is_finished() {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);
        assert_eq!(state.message.status, BufferStatus::Complete);
    }

    #[test]
    fn entities_do_not_touch_text() {
        let state = fold(concat!(
            "data: {\"type\":\"text\",\"content\":\"Salut\"}\n",
            "data: {\"type\":\"entities_detected\",\"content\":\"{\\\"contacts\\\":[{\\\"name\\\":\\\"Marie\\\",\\\"confidence\\\":0.9}],\\\"projects\\\":[]}\"}\n",
            "data: {\"type\":\"entities_detected\",\"entities\":{\"contacts\":[],\"projects\":[{\"name\":\"Site web\",\"budget\":1500.0}]}}\n",
        ));
        assert_eq!(state.text(), "Salut");
        let entities = state.entities.expect("entities");
        assert_eq!(entities.projects[0].name, "Site web");
        assert!(entities.contacts.is_empty());
    }

    #[test]
    fn status_tool_result_and_unknown_are_side_channel() {
        let state = fold(concat!(
            "data: {\"type\":\"status\",\"content\":\"Traitement de 1 fichier(s)...\"}\n",
            "data: {\"type\":\"tool_result\",\"content\":\"[web_search] OK (120ms): 3 results\"}\n",
            "data: {\"type\":\"thinking\",\"content\":\"hmm\"}\n",
            "data: {\"type\":\"text\",\"content\":\"R\"}\n",
        ));
        assert_eq!(state.text(), "R");
        assert_eq!(state.status_line.as_deref(), Some("Traitement de 1 fichier(s)..."));
        assert_eq!(state.tool_results.len(), 1);
        assert_eq!(state.tool_results[0].name(), Some("web_search"));
        assert_eq!(state.message.status, BufferStatus::Active);
    }

    #[test]
    fn backend_cancellation_keeps_text_without_error() {
        let state = fold(concat!(
            "data: {\"type\":\"text\",\"content\":\"Bon\"}\n",
            "data: {\"type\":\"cancelled\",\"content\":\"\"}\n",
            "data: {\"type\":\"text\",\"content\":\"jour\"}\n",
        ));
        assert_eq!(state.text(), "Bon");
        assert!(state.cancelled);
        assert!(state.is_finished());
        assert_eq!(state.message.status, BufferStatus::Complete);
        assert!(state.error.is_none());
        assert!(state.completion().is_none());
    }

    #[test]
    fn transport_failure_is_terminal_with_transport_origin() {
        let frame = ChatFrame::transport_failure("connection reset");
        assert!(frame.is_terminal());
        let state = ChatState::default().reduce(&frame);
        assert_eq!(
            state.error.map(|e| e.origin),
            Some(ErrorOrigin::Transport)
        );
    }

    #[test]
    fn request_validation() {
        assert!(ChatRequest::new("  ").validate().is_err());
        let req = ChatRequest::new("Bonjour").conversation("c1").include_memory(false);
        assert!(req.validate().is_ok());
        let body = serde_json::to_value(&req).expect("serialize");
        assert_eq!(body["conversation_id"], "c1");
        assert_eq!(body["include_memory"], false);
        assert_eq!(body["stream"], true);
    }
}
