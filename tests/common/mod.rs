// ============================================
// HEARTSPHERE - Shared Test Fixtures
// ============================================

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use heartsphere::llm::{
    AspectRatio, AudioPayload, ChatContext, FragmentStream, GenerationError, Generator,
    ImagePayload, TextRequest,
};

/// One scripted answer to `send_message_stream`.
pub enum Turn {
    /// Open a stream yielding these items; `Err(status)` fails mid-stream.
    Stream(Vec<Result<&'static str, u16>>),
    /// Refuse to open with this HTTP status.
    Refuse(u16),
}

/// A generator that replays scripted answers and records what it was asked.
#[derive(Default)]
pub struct ScriptedGenerator {
    turns: Mutex<VecDeque<Turn>>,
    texts: Mutex<VecDeque<Result<Option<String>, u16>>>,
    images: Mutex<VecDeque<Result<Option<ImagePayload>, u16>>>,
    fragment_delay: Option<Duration>,
    pub calls: Mutex<Vec<Instant>>,
    pub contexts: Mutex<Vec<(ChatContext, String)>>,
    pub prompts: Mutex<Vec<String>>,
    pub text_requests: Mutex<Vec<TextRequest>>,
}

impl ScriptedGenerator {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            ..Default::default()
        }
    }

    /// Each fragment arrives after `delay` of (virtual) time.
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    pub fn with_texts(self, texts: Vec<Result<Option<&str>, u16>>) -> Self {
        *self.texts.lock().unwrap() = texts
            .into_iter()
            .map(|t| t.map(|o| o.map(str::to_string)))
            .collect();
        self
    }

    pub fn with_images(self, images: Vec<Result<Option<ImagePayload>, u16>>) -> Self {
        *self.images.lock().unwrap() = images.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Gaps between consecutive calls.
    pub fn call_gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn record(&self) {
        self.calls.lock().unwrap().push(Instant::now());
    }
}

fn status_error(status: u16) -> GenerationError {
    GenerationError::from_status("scripted", status, format!("status {}", status))
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn send_message_stream(
        &self,
        context: &ChatContext,
        new_user_text: &str,
    ) -> Result<FragmentStream, GenerationError> {
        self.record();
        self.contexts
            .lock()
            .unwrap()
            .push((context.clone(), new_user_text.to_string()));

        let turn = self.turns.lock().unwrap().pop_front();
        match turn {
            Some(Turn::Stream(items)) => {
                let delay = self.fragment_delay;
                let items = items
                    .into_iter()
                    .map(|item| item.map(str::to_string).map_err(status_error));
                Ok(futures::stream::iter(items)
                    .then(move |item| async move {
                        if let Some(delay) = delay {
                            tokio::time::sleep(delay).await;
                        }
                        item
                    })
                    .boxed())
            }
            Some(Turn::Refuse(status)) => Err(status_error(status)),
            None => Err(GenerationError::Configuration("script exhausted".into())),
        }
    }

    async fn generate_image(
        &self,
        prompt: &str,
        _aspect_ratio: AspectRatio,
    ) -> Result<Option<ImagePayload>, GenerationError> {
        self.record();
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.images.lock().unwrap().pop_front() {
            Some(Ok(image)) => Ok(image),
            Some(Err(status)) => Err(status_error(status)),
            None => Ok(None),
        }
    }

    async fn generate_speech(
        &self,
        _text: &str,
        _voice: &str,
    ) -> Result<Option<AudioPayload>, GenerationError> {
        self.record();
        Ok(Some(AudioPayload::from_pcm(vec![0, 0, 1, 0])))
    }

    async fn generate_text(
        &self,
        request: &TextRequest,
    ) -> Result<Option<String>, GenerationError> {
        self.record();
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.text_requests.lock().unwrap().push(request.clone());
        match self.texts.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(status)) => Err(status_error(status)),
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
