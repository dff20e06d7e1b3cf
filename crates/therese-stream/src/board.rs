//! Board-of-advisors deliberation: frames sent by `POST /api/board/deliberate`
//! and the reducer that multiplexes them into one buffer per advisor.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::AccumulationBuffer;
use crate::errors::{ClientError, ErrorOrigin, StreamError};
use crate::frame::{Frame, Reducer};

/// Minimum question length accepted by the backend.
pub const MIN_QUESTION_CHARS: usize = 10;

/// Board member. Declaration order is the display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorRole {
    Analyst,
    Strategist,
    Devil,
    Pragmatic,
    Visionary,
}

impl AdvisorRole {
    pub const ALL: [AdvisorRole; 5] = [
        Self::Analyst,
        Self::Strategist,
        Self::Devil,
        Self::Pragmatic,
        Self::Visionary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyst => "analyst",
            Self::Strategist => "strategist",
            Self::Devil => "devil",
            Self::Pragmatic => "pragmatic",
            Self::Visionary => "visionary",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Analyst => "L'Analyste",
            Self::Strategist => "Le Stratège",
            Self::Devil => "L'Avocat du Diable",
            Self::Pragmatic => "Le Pragmatique",
            Self::Visionary => "Le Visionnaire",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Analyst => "📊",
            Self::Strategist => "🎯",
            Self::Devil => "😈",
            Self::Pragmatic => "🔧",
            Self::Visionary => "🚀",
        }
    }
}

impl fmt::Display for AdvisorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdvisorRole {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ClientError::validation(format!("unknown advisor role: {s}")))
    }
}

/// Advisor description returned by `GET /api/board/advisors`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorInfo {
    pub role: AdvisorRole,
    pub name: String,
    pub emoji: String,
    pub color: String,
    pub personality: String,
}

/// Body of `POST /api/board/deliberate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Advisors to convene; the backend convenes all of them when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisors: Option<Vec<AdvisorRole>>,
}

impl BoardRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: None,
            advisors: None,
        }
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn advisors(mut self, advisors: impl IntoIterator<Item = AdvisorRole>) -> Self {
        self.advisors = Some(advisors.into_iter().collect());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.question.trim().chars().count() < MIN_QUESTION_CHARS {
            return Err(ClientError::validation(format!(
                "question must be at least {MIN_QUESTION_CHARS} characters"
            )));
        }
        if let Some(advisors) = &self.advisors
            && advisors.is_empty()
        {
            return Err(ClientError::validation(
                "advisors list must not be empty when provided",
            ));
        }
        Ok(())
    }
}

/// Final synthesis record, delivered in one piece by `synthesis_chunk`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSynthesis {
    #[serde(default)]
    pub consensus_points: Vec<String>,
    #[serde(default)]
    pub divergence_points: Vec<String>,
    pub recommendation: String,
    /// `high`, `medium` or `low`.
    pub confidence: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// One frame of the deliberation stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliberationFrame {
    WebSearchStart {
        #[serde(default)]
        content: String,
    },
    WebSearchDone {
        #[serde(default)]
        content: String,
    },
    AdvisorStart {
        role: AdvisorRole,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        emoji: Option<String>,
        /// Upstream LLM provider serving this advisor.
        #[serde(default)]
        provider: Option<String>,
    },
    AdvisorChunk {
        role: AdvisorRole,
        #[serde(default)]
        content: String,
    },
    AdvisorDone {
        role: AdvisorRole,
        #[serde(default)]
        content: String,
    },
    SynthesisStart {
        #[serde(default)]
        content: String,
    },
    /// `content` is the JSON-encoded [`BoardSynthesis`].
    SynthesisChunk {
        #[serde(default)]
        content: String,
    },
    /// `content` is the id of the saved decision.
    Done {
        #[serde(default)]
        content: String,
    },
    Error {
        #[serde(default)]
        content: String,
        #[serde(skip)]
        origin: ErrorOrigin,
    },
    #[serde(other)]
    Unknown,
}

impl DeliberationFrame {
    pub fn advisor_start(role: AdvisorRole, provider: impl Into<String>) -> Self {
        Self::AdvisorStart {
            role,
            name: Some(role.display_name().to_string()),
            emoji: Some(role.emoji().to_string()),
            provider: Some(provider.into()),
        }
    }

    pub fn advisor_chunk(role: AdvisorRole, content: impl Into<String>) -> Self {
        Self::AdvisorChunk {
            role,
            content: content.into(),
        }
    }

    pub fn advisor_done(role: AdvisorRole) -> Self {
        Self::AdvisorDone {
            role,
            content: String::new(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
            origin: ErrorOrigin::Peer,
        }
    }

    /// Advisor the frame is routed to, if any.
    pub fn role(&self) -> Option<AdvisorRole> {
        match self {
            Self::AdvisorStart { role, .. }
            | Self::AdvisorChunk { role, .. }
            | Self::AdvisorDone { role, .. } => Some(*role),
            _ => None,
        }
    }
}

impl Frame for DeliberationFrame {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    fn transport_failure(message: impl Into<String>) -> Self {
        Self::Error {
            content: message.into(),
            origin: ErrorOrigin::Transport,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::WebSearchStart { .. } => "web_search_start",
            Self::WebSearchDone { .. } => "web_search_done",
            Self::AdvisorStart { .. } => "advisor_start",
            Self::AdvisorChunk { .. } => "advisor_chunk",
            Self::AdvisorDone { .. } => "advisor_done",
            Self::SynthesisStart { .. } => "synthesis_start",
            Self::SynthesisChunk { .. } => "synthesis_chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Set once by `advisor_start`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AdvisorMeta {
    pub name: Option<String>,
    pub emoji: Option<String>,
    pub provider: Option<String>,
}

pub type AdvisorBuffer = AccumulationBuffer<AdvisorRole, AdvisorMeta>;

/// Snapshot of one deliberation stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeliberationState {
    pub advisors: BTreeMap<AdvisorRole, AdvisorBuffer>,
    pub web_search_active: bool,
    pub web_search_summary: Option<String>,
    pub synthesis_pending: bool,
    pub synthesis: Option<BoardSynthesis>,
    pub decision_id: Option<String>,
    pub finished: bool,
    pub error: Option<StreamError>,
}

impl DeliberationState {
    pub fn opinion(&self, role: AdvisorRole) -> Option<&AdvisorBuffer> {
        self.advisors.get(&role)
    }

    fn buffer(&mut self, role: AdvisorRole) -> &mut AdvisorBuffer {
        self.advisors
            .entry(role)
            .or_insert_with(|| AccumulationBuffer::new(role))
    }

    fn advisor_buffer(&mut self, role: AdvisorRole, kind: &'static str) -> Option<&mut AdvisorBuffer> {
        let buffer = self.buffer(role);
        if buffer.is_terminal() {
            debug!(%role, kind, "ignoring frame for finished advisor");
            return None;
        }
        Some(buffer)
    }
}

/// `advisor_done` repeats the full opinion; a mismatch means chunks were
/// lost or the advisor failed mid-answer. The streamed text stays as is.
fn opinion_diverges(streamed: &str, full: &str) -> bool {
    !full.is_empty() && streamed != full
}

impl Reducer for DeliberationState {
    type Frame = DeliberationFrame;

    fn reduce(mut self, frame: &DeliberationFrame) -> Self {
        if self.finished {
            debug!(kind = frame.kind(), "ignoring frame after deliberation ended");
            return self;
        }
        match frame {
            DeliberationFrame::WebSearchStart { .. } => {
                self.web_search_active = true;
            }
            DeliberationFrame::WebSearchDone { content } => {
                self.web_search_active = false;
                self.web_search_summary = Some(content.clone()).filter(|s| !s.is_empty());
            }
            DeliberationFrame::AdvisorStart {
                role,
                name,
                emoji,
                provider,
            } => {
                if let Some(buffer) = self.advisor_buffer(*role, frame.kind()) {
                    buffer.activate();
                    buffer.attach_metadata(AdvisorMeta {
                        name: name.clone(),
                        emoji: emoji.clone(),
                        provider: provider.clone(),
                    });
                }
            }
            DeliberationFrame::AdvisorChunk { role, content } => {
                if let Some(buffer) = self.advisor_buffer(*role, frame.kind()) {
                    buffer.append(content);
                }
            }
            DeliberationFrame::AdvisorDone { role, content } => {
                if let Some(buffer) = self.advisor_buffer(*role, frame.kind()) {
                    if opinion_diverges(&buffer.text, content) {
                        debug!(
                            %role,
                            streamed = buffer.text.len(),
                            full = content.len(),
                            "advisor opinion differs from streamed chunks"
                        );
                    }
                    buffer.complete();
                }
            }
            DeliberationFrame::SynthesisStart { .. } => {
                self.synthesis_pending = true;
            }
            DeliberationFrame::SynthesisChunk { content } => {
                match serde_json::from_str::<BoardSynthesis>(content) {
                    Ok(synthesis) => {
                        self.synthesis = Some(synthesis);
                        self.synthesis_pending = false;
                    }
                    Err(e) => warn!(error = %e, "dropping malformed synthesis payload"),
                }
            }
            DeliberationFrame::Done { content } => {
                for buffer in self.advisors.values_mut() {
                    buffer.complete();
                }
                self.decision_id = Some(content.clone()).filter(|s| !s.is_empty());
                self.synthesis_pending = false;
                self.web_search_active = false;
                self.finished = true;
            }
            DeliberationFrame::Error { content, origin } => {
                self.error = Some(StreamError::new(*origin, content.clone()));
                self.synthesis_pending = false;
                self.web_search_active = false;
                self.finished = true;
            }
            DeliberationFrame::Unknown => {
                debug!("ignoring unknown deliberation frame kind");
            }
        }
        self
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
