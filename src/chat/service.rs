use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::accumulator::{
    accumulate, StreamOutcome, StreamSession, CHAT_FALLBACK_TEXT, STORY_FALLBACK_TEXT,
};
use super::message::Message;
use super::session::{init_history, ChatSession, SessionRegistry};
use super::ChatError;
use crate::llm::{
    with_retry, AspectRatio, AudioPayload, ChatContext, FragmentStream, GenerationConfig,
    GenerationError, Generator, ImagePayload, RetryPolicy, TextRequest,
};
use crate::story::{
    character_instruction, scene_description_prompt, story_beat_instruction, story_trigger,
    Character, CustomScenario, ScenarioState, StoryNode, UserProfile,
};

/// Drives conversations against a [`Generator`].
///
/// Requests for different conversation keys may run concurrently. A second
/// request for a key that is still in flight is refused with
/// [`ChatError::Busy`].
pub struct ChatService<G: Generator + ?Sized> {
    generator: Arc<G>,
    retry: RetryPolicy,
    config: GenerationConfig,
    sessions: Mutex<SessionRegistry>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Clears the busy mark for a key when the request settles.
struct BusyGuard {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<G: Generator + ?Sized> ChatService<G> {
    pub fn new(generator: Arc<G>, retry: RetryPolicy) -> Self {
        Self {
            generator,
            retry,
            config: GenerationConfig::default(),
            sessions: Mutex::new(SessionRegistry::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn is_busy(&self, key: &str) -> bool {
        lock(&self.in_flight).contains(key)
    }

    /// Forget the backend session for `key`.
    pub fn reset_session(&self, key: &str) {
        lock(&self.sessions).reset(key);
    }

    /// History the backend session for `key` currently holds.
    pub fn session_history(&self, key: &str) -> Option<Vec<Message>> {
        lock(&self.sessions).get(key).map(|s| s.history().to_vec())
    }

    fn acquire(&self, key: &str) -> Result<BusyGuard, ChatError> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(key.to_string()) {
            tracing::debug!("Refusing request for busy conversation {}", key);
            return Err(ChatError::Busy(key.to_string()));
        }
        Ok(BusyGuard {
            key: key.to_string(),
            in_flight: self.in_flight.clone(),
        })
    }

    /// Send a user message and stream the reply into `history`.
    ///
    /// `on_update` sees the full history after the user message is added and
    /// after every fragment. A terminal failure is reported inside the
    /// outcome, with the fallback message appended.
    pub async fn send_message<F>(
        &self,
        key: &str,
        character: &Character,
        profile: Option<&UserProfile>,
        mut history: Vec<Message>,
        user_text: &str,
        mut on_update: F,
    ) -> Result<StreamOutcome, ChatError>
    where
        F: FnMut(&[Message]),
    {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let _guard = self.acquire(key)?;

        history.push(Message::user(user_text));
        on_update(&history);

        let instruction = character_instruction(character, profile);
        let opened = with_retry(&self.retry, || {
            let context = lock(&self.sessions)
                .get_or_create(key, || {
                    ChatSession::new(
                        Some(instruction.clone()),
                        self.config.clone(),
                        &history,
                        user_text,
                    )
                })
                .context()
                .clone();
            let generator = &self.generator;
            let sessions = &self.sessions;
            async move {
                let result = generator.send_message_stream(&context, user_text).await;
                if result.is_err() {
                    // The next attempt rebuilds the session from history.
                    lock(sessions).invalidate(key);
                }
                result
            }
        })
        .await;

        let outcome = self
            .stream_into(history, opened, CHAT_FALLBACK_TEXT, &mut on_update)
            .await;

        if !outcome.is_failed() {
            if let Some(session) = lock(&self.sessions).get_mut(key) {
                session.record_exchange(user_text, &outcome.text);
            }
        }
        Ok(outcome)
    }

    /// Narrate a scenario node through a one-off chat built from its prompt.
    ///
    /// `choice` is the option text that led here; it is appended to
    /// `history` as the user's turn.
    pub async fn story_beat<F>(
        &self,
        key: &str,
        node: &StoryNode,
        profile: Option<&UserProfile>,
        mut history: Vec<Message>,
        choice: Option<&str>,
        mut on_update: F,
    ) -> Result<StreamOutcome, ChatError>
    where
        F: FnMut(&[Message]),
    {
        let _guard = self.acquire(key)?;

        if let Some(choice) = choice {
            history.push(Message::user(choice));
            on_update(&history);
        }

        let context = ChatContext {
            system_instruction: Some(story_beat_instruction(node, choice, profile)),
            config: GenerationConfig {
                temperature: self.config.temperature,
                top_k: None,
            },
            history: init_history(&history, choice.unwrap_or_default()),
        };
        let trigger = story_trigger(choice);

        let opened = with_retry(&self.retry, || {
            self.generator.send_message_stream(&context, &trigger)
        })
        .await;

        Ok(self
            .stream_into(history, opened, STORY_FALLBACK_TEXT, &mut on_update)
            .await)
    }

    /// Follow `option_id` and narrate the node it leads to.
    pub async fn advance_story<F>(
        &self,
        key: &str,
        scenario: &CustomScenario,
        state: &mut ScenarioState,
        profile: Option<&UserProfile>,
        history: Vec<Message>,
        option_id: &str,
        on_update: F,
    ) -> Result<StreamOutcome, ChatError>
    where
        F: FnMut(&[Message]),
    {
        let (option, next) = scenario.choose(state, option_id)?;
        let outcome = self
            .story_beat(key, next, profile, history, Some(&option.text), on_update)
            .await?;
        if !outcome.is_failed() {
            state.current_node_id = next.id.clone();
        }
        Ok(outcome)
    }

    async fn stream_into<F>(
        &self,
        mut history: Vec<Message>,
        opened: Result<FragmentStream, GenerationError>,
        fallback_text: &str,
        on_update: &mut F,
    ) -> StreamOutcome
    where
        F: FnMut(&[Message]),
    {
        match opened {
            Ok(fragments) => accumulate(history, fragments, fallback_text, on_update).await,
            Err(e) => {
                tracing::error!("{} request failed: {}", self.generator.name(), e);
                let mut session = StreamSession::new(fallback_text);
                session.fail(&mut history);
                on_update(&history);
                StreamOutcome::from_session(session, history, Some(e))
            }
        }
    }

    /// Synthesize speech. `None` means no audio this turn.
    pub async fn speak(&self, text: &str, voice: &str) -> Result<Option<AudioPayload>, ChatError> {
        let audio = with_retry(&self.retry, || self.generator.generate_speech(text, voice)).await?;
        if audio.is_none() {
            tracing::info!("No speech produced for voice {}", voice);
        }
        Ok(audio)
    }

    /// Generate an image. `None` means the model declined.
    pub async fn illustrate(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<ImagePayload>, ChatError> {
        Ok(with_retry(&self.retry, || {
            self.generator.generate_image(prompt, aspect_ratio)
        })
        .await?)
    }

    /// Illustration of the latest turns: describe the scene, then draw it.
    pub async fn illustrate_scene(
        &self,
        history: &[Message],
    ) -> Result<Option<ImagePayload>, ChatError> {
        let request = TextRequest::new(scene_description_prompt(history));
        let description = with_retry(&self.retry, || self.generator.generate_text(&request)).await?;
        match description {
            Some(description) => self.illustrate(&description, AspectRatio::Wide).await,
            None => Ok(None),
        }
    }
}
