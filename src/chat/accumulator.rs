//! Folds a stream of text fragments into a growing model message.
//!
//! The first fragment appends a new message, every later one replaces that
//! message with the extended text, and the caller sees a full history
//! snapshot after each step. A failing stream leaves whatever was already
//! received in place and appends one fallback message.

use futures::{Stream, StreamExt};

use super::message::{new_message_id, Message};
use crate::llm::GenerationError;

/// Shown when a chat reply cannot be produced.
pub const CHAT_FALLBACK_TEXT: &str = "【系统错误：连接失败，请稍后重试】";

/// Shown when a story beat cannot be produced.
pub const STORY_FALLBACK_TEXT: &str = "【系统错误：剧本生成失败，请稍后重试】";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Complete,
    Failed,
}

/// Per-request accumulation state. Never shared between requests.
#[derive(Debug)]
pub struct StreamSession {
    message_id: String,
    buffer: String,
    state: StreamState,
    fallback_text: String,
}

impl StreamSession {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self {
            message_id: new_message_id(),
            buffer: String::new(),
            state: StreamState::Idle,
            fallback_text: fallback_text.into(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Id of the streamed message, once one exists.
    pub fn message_id(&self) -> Option<&str> {
        (self.state != StreamState::Idle && !self.buffer.is_empty())
            .then_some(self.message_id.as_str())
    }

    /// Apply one fragment. Returns false when it was empty and nothing changed.
    pub fn push(&mut self, history: &mut Vec<Message>, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        self.buffer.push_str(fragment);
        let message = Message::model(self.message_id.clone(), self.buffer.clone());

        match self.state {
            StreamState::Idle => {
                history.push(message);
                self.state = StreamState::Streaming;
            }
            _ => match history.iter_mut().rev().find(|m| m.id == self.message_id) {
                Some(slot) => *slot = message,
                None => history.push(message),
            },
        }
        true
    }

    /// Sequence exhausted. Zero fragments leaves history untouched.
    pub fn complete(&mut self) {
        self.state = StreamState::Complete;
    }

    /// Terminal failure: keep partial text and append the fallback message.
    pub fn fail(&mut self, history: &mut Vec<Message>) {
        history.push(Message::model(new_message_id(), self.fallback_text.clone()));
        self.state = StreamState::Failed;
    }
}

#[derive(Debug)]
pub struct StreamOutcome {
    pub history: Vec<Message>,
    pub state: StreamState,
    /// Id of the message the reply was streamed into, if any arrived
    pub message_id: Option<String>,
    /// Full accumulated reply text
    pub text: String,
    pub error: Option<GenerationError>,
}

impl StreamOutcome {
    pub fn is_failed(&self) -> bool {
        self.state == StreamState::Failed
    }

    pub(crate) fn from_session(
        session: StreamSession,
        history: Vec<Message>,
        error: Option<GenerationError>,
    ) -> Self {
        Self {
            message_id: session.message_id().map(String::from),
            state: session.state,
            text: session.buffer,
            history,
            error,
        }
    }
}

/// Consume `fragments`, publishing a history snapshot after each change.
pub async fn accumulate<S, F>(
    mut history: Vec<Message>,
    fragments: S,
    fallback_text: &str,
    mut on_update: F,
) -> StreamOutcome
where
    S: Stream<Item = Result<String, GenerationError>>,
    F: FnMut(&[Message]),
{
    let mut session = StreamSession::new(fallback_text);
    let mut fragments = std::pin::pin!(fragments);

    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => {
                if session.push(&mut history, &fragment) {
                    on_update(&history);
                }
            }
            Err(e) => {
                tracing::error!(
                    "Stream failed after {} bytes of reply: {}",
                    session.text().len(),
                    e
                );
                session.fail(&mut history);
                on_update(&history);
                return StreamOutcome::from_session(session, history, Some(e));
            }
        }
    }

    session.complete();
    tracing::debug!("Stream complete, {} bytes", session.text().len());
    StreamOutcome::from_session(session, history, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use futures::stream;

    fn ok_fragments(parts: &[&str]) -> Vec<Result<String, GenerationError>> {
        parts.iter().map(|p| Ok(p.to_string())).collect()
    }

    #[tokio::test]
    async fn test_hello_world_progression() {
        let history = vec![Message::user("hi")];
        let mut snapshots: Vec<(usize, String)> = Vec::new();

        let outcome = accumulate(
            history,
            stream::iter(ok_fragments(&["Hel", "lo, ", "world!"])),
            CHAT_FALLBACK_TEXT,
            |h| snapshots.push((h.len(), h.last().unwrap().text.clone())),
        )
        .await;

        assert_eq!(
            snapshots,
            vec![
                (2, "Hel".to_string()),
                (2, "Hello, ".to_string()),
                (2, "Hello, world!".to_string()),
            ]
        );
        assert_eq!(outcome.state, StreamState::Complete);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[1].role, Role::Model);
        assert_eq!(outcome.text, "Hello, world!");
        assert_eq!(outcome.message_id.as_deref(), Some(outcome.history[1].id.as_str()));
    }

    #[tokio::test]
    async fn test_empty_stream_appends_nothing() {
        let history = vec![Message::user("hi")];
        let mut updates = 0;

        let outcome = accumulate(history, stream::iter(ok_fragments(&[])), CHAT_FALLBACK_TEXT, |_| {
            updates += 1
        })
        .await;

        assert_eq!(updates, 0);
        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.state, StreamState::Complete);
        assert_eq!(outcome.message_id, None);
    }

    #[tokio::test]
    async fn test_empty_fragments_are_skipped() {
        let outcome = accumulate(
            Vec::new(),
            stream::iter(ok_fragments(&["", "a", "", "b"])),
            CHAT_FALLBACK_TEXT,
            |_| {},
        )
        .await;
        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.history[0].text, "ab");
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_text() {
        let mut items = ok_fragments(&["partial ", "reply"]);
        items.push(Err(GenerationError::Server {
            provider: "test".into(),
            status_code: 503,
            details: "gone".into(),
        }));
        items.push(Ok("never seen".into()));

        let outcome = accumulate(
            vec![Message::user("hi")],
            stream::iter(items),
            STORY_FALLBACK_TEXT,
            |_| {},
        )
        .await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.history.len(), 3);
        assert_eq!(outcome.history[1].text, "partial reply");
        assert_eq!(outcome.history[2].text, STORY_FALLBACK_TEXT);
        assert_ne!(outcome.history[1].id, outcome.history[2].id);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_failure_before_first_fragment() {
        let items: Vec<Result<String, GenerationError>> =
            vec![Err(GenerationError::Configuration("boom".into()))];
        let outcome = accumulate(Vec::new(), stream::iter(items), CHAT_FALLBACK_TEXT, |_| {}).await;

        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.history[0].text, CHAT_FALLBACK_TEXT);
        assert_eq!(outcome.message_id, None);
    }

    #[test]
    fn test_session_state_machine() {
        let mut history = Vec::new();
        let mut session = StreamSession::new(CHAT_FALLBACK_TEXT);
        assert_eq!(session.state(), StreamState::Idle);
        assert!(!session.push(&mut history, ""));
        assert_eq!(session.state(), StreamState::Idle);
        assert!(session.push(&mut history, "x"));
        assert_eq!(session.state(), StreamState::Streaming);
        session.complete();
        assert_eq!(session.state(), StreamState::Complete);
    }
}
