mod accumulator;
mod message;
mod service;
mod session;

use thiserror::Error;

use crate::llm::GenerationError;
use crate::story::ScenarioError;

pub use accumulator::{
    accumulate, StreamOutcome, StreamSession, StreamState, CHAT_FALLBACK_TEXT,
    STORY_FALLBACK_TEXT,
};
pub use message::{new_message_id, now_millis, Message, Role};
pub use service::ChatService;
pub use session::{ChatSession, SessionRegistry};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Conversation {0} is still waiting for a reply")]
    Busy(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}
