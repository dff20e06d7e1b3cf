//! Terminal rendering of stream snapshots.
//!
//! Each printer remembers how much of every buffer it already wrote and
//! returns only the new suffix, so the caller can print after every frame.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use therese_stream::{AdvisorRole, BufferStatus, ChatState, DeliberationState, Reducer, StreamView};

pub fn write_out(out: &mut impl std::io::Write, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}

/// Applies frames until the stream ends, writing what `render` returns for
/// each snapshot. A failed write cancels the stream and is returned.
pub async fn drive<R: Reducer>(
    view: &mut StreamView<R>,
    out: &mut impl std::io::Write,
    mut render: impl FnMut(&R) -> String,
) -> std::io::Result<()> {
    while let Some(state) = view.advance().await {
        let text = render(state);
        if let Err(e) = write_out(out, &text) {
            view.cancel();
            return Err(e);
        }
    }
    Ok(())
}

#[derive(Default)]
pub struct ChatPrinter {
    printed: usize,
    status: Option<String>,
}

impl ChatPrinter {
    /// Text appended to the assistant message since the last call.
    pub fn delta<'a>(&mut self, state: &'a ChatState) -> &'a str {
        let text = state.text();
        let fresh = text.get(self.printed..).unwrap_or("");
        self.printed = text.len();
        fresh
    }

    /// Returns the status line when it changed since the last call.
    pub fn status_change(&mut self, state: &ChatState) -> Option<String> {
        if state.status_line == self.status {
            return None;
        }
        self.status.clone_from(&state.status_line);
        state.status_line.clone()
    }
}

pub fn chat_summary(state: &ChatState) -> String {
    let mut out = String::new();
    if let Some(id) = &state.conversation_id {
        let _ = writeln!(out, "conversation: {id}");
    }
    for tool in &state.tool_results {
        let _ = writeln!(out, "tool {}: {}", tool.name().unwrap_or("?"), tool.content);
    }
    if let Some(entities) = state.entities.as_ref().filter(|e| !e.is_empty()) {
        let names: Vec<&str> = entities
            .contacts
            .iter()
            .map(|c| c.name.as_str())
            .chain(entities.projects.iter().map(|p| p.name.as_str()))
            .collect();
        let _ = writeln!(out, "detected: {}", names.join(", "));
    }
    if let Some(completion) = state.completion() {
        if let Some(usage) = &completion.usage {
            let _ = writeln!(
                out,
                "tokens: {} in / {} out ({:.4} EUR{})",
                usage.input_tokens,
                usage.output_tokens,
                usage.cost_eur,
                usage
                    .model
                    .as_deref()
                    .map(|m| format!(", {m}"))
                    .unwrap_or_default()
            );
        }
        if let Some(uncertainty) = completion.uncertainty.as_ref().filter(|u| u.should_verify) {
            let _ = writeln!(
                out,
                "confidence: {} ({:.0}%), please verify",
                uncertainty.confidence_level,
                uncertainty.confidence_score
            );
        }
    }
    out
}

#[derive(Default)]
pub struct BoardPrinter {
    printed: BTreeMap<AdvisorRole, usize>,
    current: Option<AdvisorRole>,
    web_search_shown: bool,
    synthesis_shown: bool,
}

impl BoardPrinter {
    /// Everything new since the last call: headers for advisors that just
    /// started and the text they appended.
    pub fn delta(&mut self, state: &DeliberationState) -> String {
        let mut out = String::new();
        if !self.web_search_shown
            && let Some(summary) = &state.web_search_summary
        {
            let _ = writeln!(out, "🔎 {summary}");
            self.web_search_shown = true;
        }
        for (role, opinion) in &state.advisors {
            let seen = self.printed.get(role).copied();
            let fresh = opinion.text.get(seen.unwrap_or(0)..).unwrap_or("");
            if seen.is_some() && fresh.is_empty() {
                continue;
            }
            if self.current != Some(*role) {
                let meta = opinion.metadata.as_ref();
                let emoji = meta.and_then(|m| m.emoji.as_deref()).unwrap_or(role.emoji());
                let name = meta
                    .and_then(|m| m.name.as_deref())
                    .unwrap_or(role.display_name());
                if self.current.is_some() {
                    out.push_str("\n\n");
                }
                let _ = writeln!(out, "{emoji} {name}");
                self.current = Some(*role);
            }
            out.push_str(fresh);
            self.printed.insert(*role, opinion.text.len());
        }
        if state.synthesis_pending && !self.synthesis_shown {
            out.push_str("\n\n⚖️ Synthèse en cours...\n");
            self.synthesis_shown = true;
            self.current = None;
        }
        out
    }
}

pub fn board_summary(state: &DeliberationState) -> String {
    let mut out = String::new();
    if let Some(synthesis) = &state.synthesis {
        let _ = writeln!(out, "\nRecommendation ({}): {}", synthesis.confidence, synthesis.recommendation);
        for (title, items) in [
            ("Consensus", &synthesis.consensus_points),
            ("Divergences", &synthesis.divergence_points),
            ("Next steps", &synthesis.next_steps),
        ] {
            if items.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{title}:");
            for item in items {
                let _ = writeln!(out, "  - {item}");
            }
        }
    }
    let unfinished: Vec<&str> = state
        .advisors
        .iter()
        .filter(|(_, opinion)| opinion.status != BufferStatus::Complete)
        .map(|(role, _)| role.as_str())
        .collect();
    if !unfinished.is_empty() {
        let _ = writeln!(out, "incomplete: {}", unfinished.join(", "));
    }
    if let Some(id) = &state.decision_id {
        let _ = writeln!(out, "decision: {id}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt as _;
    use futures::stream;
    use therese_stream::{ChatFrame, DeliberationFrame, FrameStream};

    struct ClosedPipe;

    impl std::io::Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn open_chat(body: &'static str) -> StreamView<ChatState> {
        let bytes = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(body.as_bytes()))])
            .chain(stream::pending())
            .boxed();
        let mut view = StreamView::new();
        view.start(FrameStream::spawn(bytes, 4));
        view
    }

    #[tokio::test]
    async fn drive_writes_every_delta() {
        let mut view = open_chat(
            "data: {\"type\":\"text\",\"content\":\"Bon\"}\ndata: {\"type\":\"text\",\"content\":\"jour\"}\ndata: {\"type\":\"done\"}\n",
        );
        let mut printer = ChatPrinter::default();
        let mut out = Vec::new();
        drive(&mut view, &mut out, |state| printer.delta(state).to_string())
            .await
            .expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "Bonjour");
    }

    #[tokio::test]
    async fn failed_write_cancels_stream() {
        let mut view = open_chat("data: {\"type\":\"text\",\"content\":\"Bon\"}\n");
        let abort = view.abort_handle().expect("open stream");
        let mut printer = ChatPrinter::default();
        let err = drive(&mut view, &mut ClosedPipe, |state| printer.delta(state).to_string())
            .await
            .expect_err("closed pipe");
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
        assert!(abort.is_aborted());
        assert!(!view.is_streaming());
        assert_eq!(view.snapshot().text(), "Bon");
    }

    #[test]
    fn chat_summary_prints_backend_confidence_as_is() {
        let frame: ChatFrame = serde_json::from_str(
            r#"{"type":"done","content":"","message_id":"m1","uncertainty":{"is_uncertain":true,"uncertainty_phrases":["je pense"],"confidence_score":70,"confidence_level":"medium","should_verify":true}}"#,
        )
        .expect("done frame");
        let state = ChatState::default()
            .reduce(&ChatFrame::text("Peut-être"))
            .reduce(&frame);
        let summary = chat_summary(&state);
        assert!(summary.contains("confidence: medium (70%), please verify"), "{summary}");
    }

    #[test]
    fn chat_printer_emits_only_new_text() {
        let mut printer = ChatPrinter::default();
        let state = ChatState::default().reduce(&ChatFrame::text("Bon"));
        assert_eq!(printer.delta(&state), "Bon");
        let state = state.reduce(&ChatFrame::text("jour 👋"));
        assert_eq!(printer.delta(&state), "jour 👋");
        assert_eq!(printer.delta(&state), "");
    }

    #[test]
    fn chat_status_is_reported_once() {
        let mut printer = ChatPrinter::default();
        let state: ChatState = serde_json::from_str::<ChatFrame>(
            r#"{"type":"status","content":"Recherche dans la mémoire..."}"#,
        )
        .map(|frame| ChatState::default().reduce(&frame))
        .expect("status frame");
        assert_eq!(
            printer.status_change(&state).as_deref(),
            Some("Recherche dans la mémoire...")
        );
        assert_eq!(printer.status_change(&state), None);
    }

    #[test]
    fn board_printer_writes_header_when_advisor_changes() {
        let mut printer = BoardPrinter::default();
        let state = DeliberationState::default()
            .reduce(&DeliberationFrame::advisor_start(AdvisorRole::Analyst, "anthropic"))
            .reduce(&DeliberationFrame::advisor_chunk(AdvisorRole::Analyst, "Les chiffres"));
        let first = printer.delta(&state);
        assert!(first.contains(AdvisorRole::Analyst.display_name()));
        assert!(first.ends_with("Les chiffres"));

        let state = state
            .reduce(&DeliberationFrame::advisor_chunk(AdvisorRole::Analyst, " montrent"))
            .reduce(&DeliberationFrame::advisor_start(AdvisorRole::Devil, "openai"));
        let second = printer.delta(&state);
        assert!(second.starts_with(" montrent\n\n"));
        assert!(second.contains(AdvisorRole::Devil.display_name()));
        assert_eq!(printer.delta(&state), "");
    }

    #[test]
    fn board_summary_lists_unfinished_advisors() {
        let state = DeliberationState::default()
            .reduce(&DeliberationFrame::advisor_chunk(AdvisorRole::Strategist, "Sur trois ans"))
            .reduce(&DeliberationFrame::error("provider timeout"));
        let summary = board_summary(&state);
        assert!(summary.contains("incomplete: strategist"));
        assert!(!summary.contains("decision:"));
    }
}
