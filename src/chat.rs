//! Conversation controller
//!
//! Owns the message log and drives at most one turn at a time: retrieval,
//! prompt construction, and the backend round-trip all hang off a single
//! spawned task per turn. Front ends poll for completion or await it.

use async_trait::async_trait;
use futures_util::FutureExt;
use log::{debug, error, warn};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{timeout, Duration};

use crate::error::ChatError;
use crate::professor::{ProfessorDb, DEFAULT_RETRIEVAL_LIMIT};
use crate::prompt::build_grounded_prompt;
use crate::state::{ConversationState, Message};

/// Assistant message seeded into the log before any user input
pub const GREETING: &str =
    "Hi! I'm the Rate My Professor support assistant. How can I help you today?";

/// Upper bound on one backend round-trip. A turn that exceeds it resolves
/// as a failure instead of leaving the conversation stuck.
const TURN_TIMEOUT: Duration = Duration::from_secs(60);

/// A stateful connection to a turn-based generative backend.
///
/// Implementations own their conversation history; the controller hands
/// them one grounded prompt per turn and expects the reply text back.
#[async_trait]
pub trait ChatSession: Send + 'static {
    async fn submit(&mut self, prompt: &str) -> Result<String, ChatError>;
}

struct TurnTask<S> {
    handle: JoinHandle<(S, Result<String, ChatError>)>,
    cancel: Option<oneshot::Sender<()>>,
}

/// Drives the conversation: appends messages, runs retrieval, and keeps at
/// most one turn in flight against the backend session.
///
/// The dataset and the session are installed independently, in either
/// order. Turns submitted before the dataset arrives retrieve nothing;
/// turns submitted before the session arrives fail with a visible error,
/// and the user's message stays in the log either way.
pub struct ChatController<S: ChatSession> {
    state: ConversationState,
    dataset: ProfessorDb,
    session: Option<S>,
    turn: Option<TurnTask<S>>,
}

impl<S: ChatSession> ChatController<S> {
    pub fn new() -> Self {
        let mut state = ConversationState::default();
        state.push_assistant(GREETING);
        Self {
            state,
            dataset: ProfessorDb::default(),
            session: None,
            turn: None,
        }
    }

    pub fn install_dataset(&mut self, dataset: ProfessorDb) {
        debug!("dataset installed with {} records", dataset.len());
        self.dataset = dataset;
    }

    pub fn install_session(&mut self, session: S) {
        self.session = Some(session);
    }

    /// Record a failed dataset load: sets `last_error` and appends a
    /// visible notice. Retrieval continues against the empty dataset.
    pub fn report_data_failure(&mut self, err: ChatError) {
        warn!("continuing without professor data: {}", err);
        self.state.push_assistant(format!(
            "Error: {}. Replies will not include professor data.",
            err
        ));
        self.state.set_error(err);
    }

    /// True once a backend session is available, including while it is out
    /// on loan to an in-flight turn.
    pub fn has_session(&self) -> bool {
        self.session.is_some() || self.turn.is_some()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn log(&self) -> &[Message] {
        self.state.log()
    }

    pub fn pending(&self) -> bool {
        self.state.pending()
    }

    pub fn last_error(&self) -> Option<&ChatError> {
        self.state.last_error()
    }

    /// Start a new turn: append the user's message, retrieve matching
    /// records, and send the grounded prompt to the backend.
    ///
    /// Returns an error only for rejected submissions (empty input, or a
    /// turn already in flight); those leave the conversation untouched.
    /// Anything that goes wrong after acceptance resolves through
    /// [`poll_turn`](Self::poll_turn) or [`finish_turn`](Self::finish_turn)
    /// as a failed turn.
    pub fn submit_turn(&mut self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.turn.is_some() {
            return Err(ChatError::TurnInFlight);
        }

        self.state.push_user(text);
        self.state.set_pending(true);

        let Some(mut session) = self.session.take() else {
            warn!("turn submitted before the backend session was ready");
            self.resolve_failure(ChatError::InitializationFailed(
                "chat session is not ready yet".to_string(),
            ));
            return Ok(());
        };

        let results = self.dataset.search(text, DEFAULT_RETRIEVAL_LIMIT);
        debug!("retrieved {} records for this turn", results.len());
        let prompt = build_grounded_prompt(text, &results);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                outcome = timeout(TURN_TIMEOUT, session.submit(&prompt)) => match outcome {
                    Ok(inner) => inner,
                    Err(_) => Err(ChatError::SubmissionFailed(
                        "backend did not reply within the turn timeout".to_string(),
                    )),
                },
                _ = cancel_rx => Err(ChatError::SubmissionFailed("turn cancelled".to_string())),
            };
            (session, result)
        });

        self.turn = Some(TurnTask {
            handle,
            cancel: Some(cancel_tx),
        });
        Ok(())
    }

    /// Integrate the in-flight turn if it has finished, without blocking.
    /// Returns true when no turn is in flight afterwards.
    pub fn poll_turn(&mut self) -> bool {
        let finished = match &mut self.turn {
            None => return true,
            Some(task) => (&mut task.handle).now_or_never(),
        };
        match finished {
            None => false,
            Some(join_result) => {
                self.turn = None;
                self.integrate(join_result);
                true
            }
        }
    }

    /// Wait for the in-flight turn (if any) and integrate it.
    pub async fn finish_turn(&mut self) {
        if let Some(task) = self.turn.take() {
            let join_result = task.handle.await;
            self.integrate(join_result);
        }
    }

    /// Ask the in-flight turn to stop. The turn still resolves, as a
    /// failure, through [`poll_turn`](Self::poll_turn) or
    /// [`finish_turn`](Self::finish_turn); the session itself survives.
    pub fn cancel_turn(&mut self) {
        if let Some(task) = &mut self.turn {
            if let Some(cancel) = task.cancel.take() {
                let _ = cancel.send(());
            }
        }
    }

    fn integrate(&mut self, join_result: Result<(S, Result<String, ChatError>), JoinError>) {
        match join_result {
            Ok((session, Ok(reply))) => {
                self.session = Some(session);
                self.state.push_assistant(reply);
                self.state.clear_error();
                self.state.set_pending(false);
            }
            Ok((session, Err(err))) => {
                self.session = Some(session);
                self.resolve_failure(err);
            }
            Err(join_err) => {
                // the turn task died and took the session with it
                error!("turn task failed: {}", join_err);
                self.resolve_failure(ChatError::SubmissionFailed(format!(
                    "turn task failed: {}",
                    join_err
                )));
            }
        }
    }

    // A failed turn stays visible: the user's message is already in the
    // log, and the failure is appended as an assistant-side notice.
    fn resolve_failure(&mut self, err: ChatError) {
        error!("turn failed: {}", err);
        self.state
            .push_assistant(format!("Error: {}. Please try again.", err));
        self.state.set_error(err);
        self.state.set_pending(false);
    }
}
