//! Error types for the chat core
//!
//! Every fallible operation in the library surfaces one of these variants.
//! The binary wraps them in `anyhow` at the top level.

use thiserror::Error;

/// Errors surfaced by the chat core.
///
/// The first three variants are the failure kinds a front end can observe in
/// the conversation state after a turn resolves. The last two are submission
/// rejections: they are returned directly to the caller and never recorded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    /// The review dataset could not be read, parsed, or validated.
    #[error("failed to load professor data: {0}")]
    DataUnavailable(String),

    /// The backend session could not be established, or a turn arrived
    /// before a session was ready.
    #[error("failed to initialize chat: {0}")]
    InitializationFailed(String),

    /// A submitted turn did not produce a usable reply.
    #[error("failed to send message: {0}")]
    SubmissionFailed(String),

    /// A turn is already awaiting its reply.
    #[error("a turn is already in flight")]
    TurnInFlight,

    /// Empty input is never submitted.
    #[error("message is empty")]
    EmptyMessage,
}
