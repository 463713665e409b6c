pub mod chat;
pub mod config;
pub mod error;
pub mod gemini;
pub mod professor;
pub mod prompt;
pub mod state;

// Re-export main types for convenience
pub use chat::{ChatController, ChatSession, GREETING};
pub use config::Config;
pub use error::ChatError;
pub use gemini::{GeminiClient, GeminiSession, DEFAULT_MODEL};
pub use professor::{ProfessorDb, ProfessorRecord, DEFAULT_RETRIEVAL_LIMIT};
pub use prompt::{build_grounded_prompt, NO_MATCH_SENTINEL, SYSTEM_INSTRUCTION};
pub use state::{ConversationState, Message, Role};
