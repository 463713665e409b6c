//! UI-agnostic conversation state
//!
//! This module contains the data structures a front end renders: the message
//! log, the pending flag, and the last error. They don't depend on any
//! specific UI framework.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// A chat message in the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// The role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Everything a front end needs to render the conversation: the append-only
/// message log, whether a turn is awaiting its reply, and the most recent
/// failure if the last turn did not complete normally.
///
/// The log only grows. Messages are never edited or removed once appended,
/// so indices held by a renderer stay valid for the life of the session.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    log: Vec<Message>,
    pending: bool,
    last_error: Option<ChatError>,
}

impl ConversationState {
    /// The full message log, oldest first.
    pub fn log(&self) -> &[Message] {
        &self.log
    }

    /// True while a submitted turn is awaiting its reply.
    pub fn pending(&self) -> bool {
        self.pending
    }

    /// The error from the most recent failed turn, cleared by the next
    /// successful one.
    pub fn last_error(&self) -> Option<&ChatError> {
        self.last_error.as_ref()
    }

    pub(crate) fn push_user(&mut self, text: impl Into<String>) {
        self.log.push(Message::user(text));
    }

    pub(crate) fn push_assistant(&mut self, text: impl Into<String>) {
        self.log.push(Message::assistant(text));
    }

    pub(crate) fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub(crate) fn set_error(&mut self, err: ChatError) {
        self.last_error = Some(err);
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_append_only() {
        let mut state = ConversationState::default();
        state.push_assistant("hello");
        state.push_user("hi");
        state.push_assistant("how can I help?");

        let log = state.log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0], Message::assistant("hello"));
        assert_eq!(log[1], Message::user("hi"));
        assert_eq!(log[2], Message::assistant("how can I help?"));
    }

    #[test]
    fn test_default_state_is_idle() {
        let state = ConversationState::default();
        assert!(state.log().is_empty());
        assert!(!state.pending());
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_error_is_replaced_not_accumulated() {
        let mut state = ConversationState::default();
        state.set_error(ChatError::SubmissionFailed("first".to_string()));
        state.set_error(ChatError::SubmissionFailed("second".to_string()));
        assert_eq!(
            state.last_error(),
            Some(&ChatError::SubmissionFailed("second".to_string()))
        );
        state.clear_error();
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_message_serializes_with_lowercase_roles() {
        let json = serde_json::to_string(&Message::user("hello")).unwrap();
        assert_eq!(json, r#"{"role":"user","text":"hello"}"#);
    }
}
