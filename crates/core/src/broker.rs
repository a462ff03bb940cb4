//! Detection of interactive yes/no prompts in engine output.
//!
//! The engine's user-input instruction logs the text it waits on
//! (`... userio_plugin ... Executed with args: <prompt>`), then logs
//! `Wait for user input`, then asks `Please Enter 'Y' to continue` on its
//! standard output and blocks reading standard input. The broker turns that
//! text into [`ConfirmationRequest`]s and the user's decision into the bytes
//! the engine expects. It never talks to the user or the process itself.

use std::collections::VecDeque;

use log::debug;

use crate::process::OutputStream;

/// Both must appear in a line for it to carry prompt context.
pub const PROMPT_SOURCE_MARKER: &str = "userio_plugin";
pub const ARGUMENTS_MARKER: &str = "Executed with args:";
/// Logged once the engine is about to block on input.
pub const WAIT_MARKER: &str = "Wait for user input";
pub const CONFIRMATION_MARKER: &str = "Please Enter 'Y' to continue";

/// Longer candidates are multi-line dumps, not prompts.
pub const MAX_PROMPT_LENGTH: usize = 10;

pub const YES_ANSWER: &[u8] = b"y\n";
pub const NO_ANSWER: &[u8] = b"n\n";

/// Upper bound for an unterminated line carried between fragments.
const MAX_PARTIAL_LINE: usize = 4096;

/// The engine is waiting for a yes/no answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    /// Last short prompt seen before the request, if any.
    pub context: Option<String>,
}

impl ConfirmationRequest {
    /// Text suitable for a confirm dialog.
    #[must_use]
    pub fn message(&self) -> String {
        let question = "Continue the tests? Answer no to cancel them.";
        match &self.context {
            Some(context) => format!("{context}\n{question}"),
            None => question.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InteractionBroker {
    prompt: Option<String>,
    candidate: Option<String>,
    partial_lines: [String; 2],
    requests: VecDeque<ConfirmationRequest>,
}

impl InteractionBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored prompt context.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Scans one output fragment.
    ///
    /// Lines are reassembled per stream, so a marker split across two reads
    /// is still found. A confirmation marker in a line the engine has not
    /// terminated yet fires right away.
    pub fn feed(&mut self, stream: OutputStream, fragment: &str) {
        let index = match stream {
            OutputStream::Stdout => 0,
            OutputStream::Stderr => 1,
        };

        let mut pending = std::mem::take(&mut self.partial_lines[index]);
        pending.push_str(fragment);

        while let Some(end) = pending.find('\n') {
            let line: String = pending.drain(..=end).collect();
            self.scan_line(&line);
        }

        if let Some(start) = pending.find(CONFIRMATION_MARKER) {
            pending.replace_range(..start + CONFIRMATION_MARKER.len(), "");
            self.push_request();
        }

        self.partial_lines[index] = truncate_front(pending, MAX_PARTIAL_LINE);
    }

    /// Takes the oldest unanswered confirmation request.
    pub fn next_confirmation(&mut self) -> Option<ConfirmationRequest> {
        self.requests.pop_front()
    }

    /// Returns the bytes to write for the user's answer and forgets the prompt.
    pub fn answer(&mut self, confirmed: bool) -> &'static [u8] {
        self.prompt = None;
        self.candidate = None;

        if confirmed {
            YES_ANSWER
        } else {
            NO_ANSWER
        }
    }

    /// Drops every queued request, e.g. once the process is gone.
    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }

    fn scan_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\n', '\r']);

        if line.contains(PROMPT_SOURCE_MARKER) {
            if let Some(start) = line.find(ARGUMENTS_MARKER) {
                let candidate = line[start + ARGUMENTS_MARKER.len()..].trim();
                self.candidate = Some(candidate.to_string());
            }
        }

        if line.contains(WAIT_MARKER) {
            if let Some(candidate) = self.candidate.take() {
                self.accept_candidate(candidate);
            }
        }

        if line.contains(CONFIRMATION_MARKER) {
            self.push_request();
        }
    }

    fn accept_candidate(&mut self, candidate: String) {
        if candidate.is_empty() || candidate.chars().count() > MAX_PROMPT_LENGTH {
            debug!("Ignoring prompt context of {} characters", candidate.chars().count());
            return;
        }

        debug!("Prompt context: {candidate}");
        self.prompt = Some(candidate);
    }

    fn push_request(&mut self) {
        self.requests.push_back(ConfirmationRequest {
            context: self.prompt.clone(),
        });
    }
}

fn truncate_front(mut text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }

    let mut cut = text.len() - limit;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text.replace_range(..cut, "");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use OutputStream::{Stderr, Stdout};

    fn context_lines(prompt: &str) -> String {
        format!(
            "2026-10-17 10:00:01 INFO userio_plugin.py:50 Test Command Executed with args: {prompt}\n\
             2026-10-17 10:00:01 INFO userio_plugin.py:51 Wait for user input: \n"
        )
    }

    #[test]
    fn test_short_prompt_is_stored() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stderr, &context_lines("Check LED"));
        assert_eq!(broker.prompt(), Some("Check LED"));
        assert!(broker.next_confirmation().is_none());
    }

    #[test]
    fn test_long_prompt_is_discarded() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stderr, &context_lines("Verify the telemetry dump below"));
        assert_eq!(broker.prompt(), None);
    }

    #[test]
    fn test_long_prompt_keeps_previous_short_one() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stderr, &context_lines("Power on"));
        broker.feed(Stderr, &context_lines("This one is far too long to keep"));
        assert_eq!(broker.prompt(), Some("Power on"));
    }

    #[test]
    fn test_args_from_other_plugins_ignored() {
        let mut broker = InteractionBroker::new();
        broker.feed(
            Stderr,
            "INFO example_plugin.py:123 Test Command Executed with args: 1, 2\nINFO Wait for user input\n",
        );
        assert_eq!(broker.prompt(), None);
    }

    #[test]
    fn test_confirmation_without_newline_fires() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stderr, &context_lines("Check LED"));
        broker.feed(Stdout, "\nPlease Enter 'Y' to continue... ");

        let request = broker.next_confirmation().unwrap();
        assert_eq!(request.context.as_deref(), Some("Check LED"));
        assert!(broker.next_confirmation().is_none());
    }

    #[test]
    fn test_marker_split_across_fragments() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stdout, "\nPlease Enter ");
        assert!(broker.next_confirmation().is_none());
        broker.feed(Stdout, "'Y' to continue... \n");
        assert!(broker.next_confirmation().is_some());
        assert!(broker.next_confirmation().is_none());
    }

    #[test]
    fn test_streams_are_not_spliced() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stdout, "Please Enter ");
        broker.feed(Stderr, "'Y' to continue\n");
        assert!(broker.next_confirmation().is_none());
    }

    #[test]
    fn test_answer_bytes_and_prompt_cleared() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stderr, &context_lines("Check LED"));
        broker.feed(Stdout, "Please Enter 'Y' to continue... \n");
        assert!(broker.next_confirmation().is_some());

        assert_eq!(broker.answer(true), b"y\n");
        assert_eq!(broker.prompt(), None);
        assert_eq!(broker.answer(false), b"n\n");
    }

    #[test]
    fn test_request_without_context() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stdout, "Please Enter 'Y' to continue\n");
        let request = broker.next_confirmation().unwrap();
        assert_eq!(request.context, None);
        assert_eq!(request.message(), "Continue the tests? Answer no to cancel them.");
    }

    #[test]
    fn test_partial_line_is_bounded() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stdout, &"x".repeat(MAX_PARTIAL_LINE * 3));
        assert_eq!(broker.partial_lines[0].len(), MAX_PARTIAL_LINE);
    }

    #[test]
    fn test_clear_requests() {
        let mut broker = InteractionBroker::new();
        broker.feed(Stdout, "Please Enter 'Y' to continue\nPlease Enter 'Y' to continue\n");
        broker.clear_requests();
        assert!(broker.next_confirmation().is_none());
    }

    #[test]
    fn test_truncate_front_respects_char_boundaries() {
        let text = "ééé".to_string();
        let truncated = truncate_front(text, 3);
        assert_eq!(truncated, "é");
    }
}
