use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{future, Stream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use super::error::GenerationError;
use super::provider::{
    AspectRatio, AudioPayload, ChatContext, FragmentStream, GenerationConfig, Generator,
    ImagePayload, TextRequest,
};
use crate::chat::Message;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";

const PROVIDER: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiModels {
    pub chat: String,
    pub image: String,
    pub tts: String,
}

impl Default for GeminiModels {
    fn default() -> Self {
        Self {
            chat: "gemini-2.5-flash".to_string(),
            image: "gemini-2.5-flash-image".to_string(),
            tts: "gemini-2.5-flash-preview-tts".to_string(),
        }
    }
}

pub struct GeminiProvider {
    api_key: String,
    base_url: Url,
    models: GeminiModels,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        models: GeminiModels,
    ) -> Result<Self, GenerationError> {
        let mut base = base_url.unwrap_or(GEMINI_API_BASE).to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| GenerationError::Configuration(format!("invalid base url: {}", e)))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url,
            models,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url, GenerationError> {
        self.base_url
            .join(&format!("models/{}:{}", model, method))
            .map_err(|e| GenerationError::Configuration(format!("invalid endpoint: {}", e)))
    }

    async fn post(&self, url: Url, body: &Value) -> Result<reqwest::Response, GenerationError> {
        tracing::debug!("POST {}", url.path());

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gemini API error response. Status: {}, Body: {}", status, body);
            return Err(GenerationError::from_status(PROVIDER, status.as_u16(), body));
        }
        Ok(response)
    }

    async fn generate_content(
        &self,
        model: &str,
        body: &Value,
    ) -> Result<GenerateContentResponse, GenerationError> {
        let url = self.endpoint(model, "generateContent")?;
        let response = self.post(url, body).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            GenerationError::parsing(PROVIDER, format!("Error: {}, Body: {}", e, text))
        })
    }
}

#[async_trait]
impl Generator for GeminiProvider {
    async fn send_message_stream(
        &self,
        context: &ChatContext,
        new_user_text: &str,
    ) -> Result<FragmentStream, GenerationError> {
        let mut contents = history_contents(&context.history);
        contents.push(Content::text("user", new_user_text));

        let body = request_body(
            contents,
            context.system_instruction.as_deref(),
            Some(generation_config(&context.config)),
        );

        let mut url = self.endpoint(&self.models.chat, "streamGenerateContent")?;
        url.set_query(Some("alt=sse"));

        let response = self.post(url, &body).await?;
        Ok(fragment_stream(response.bytes_stream()))
    }

    async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<ImagePayload>, GenerationError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "imageConfig": { "aspectRatio": aspect_ratio.as_str() }
            }
        });

        let response = self.generate_content(&self.models.image, &body).await?;
        match response.first_inline_data() {
            Some(inline) => Ok(Some(ImagePayload {
                mime_type: inline.mime_type.clone(),
                data: decode_base64(&inline.data)?,
            })),
            None => {
                tracing::info!("Image model returned no inline image");
                Ok(None)
            }
        }
    }

    async fn generate_speech(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<Option<AudioPayload>, GenerationError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice }
                    }
                }
            }
        });

        let response = self.generate_content(&self.models.tts, &body).await?;
        match response.first_inline_data() {
            Some(inline) if !inline.data.is_empty() => {
                Ok(Some(AudioPayload::from_pcm(decode_base64(&inline.data)?)))
            }
            _ => Ok(None),
        }
    }

    async fn generate_text(
        &self,
        request: &TextRequest,
    ) -> Result<Option<String>, GenerationError> {
        let mut contents = history_contents(&request.history);
        contents.push(match &request.image {
            Some(image) => Content::text_with_image("user", &request.prompt, image),
            None => Content::text("user", &request.prompt),
        });

        let body = request_body(
            contents,
            request.system_instruction.as_deref(),
            text_config(request),
        );

        let response = self.generate_content(&self.models.chat, &body).await?;
        let text = response.text();
        Ok((!text.trim().is_empty()).then_some(text))
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }
}

impl Content {
    /// Inline picture first, then the prompt.
    fn text_with_image(role: &str, text: &str, image: &ImagePayload) -> Self {
        let mut content = Self::text(role, text);
        content.parts.insert(
            0,
            Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                }),
            },
        );
        content
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .iter()
            .take(1)
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> String {
        self.parts().filter_map(|p| p.text.as_deref()).collect()
    }

    fn first_inline_data(&self) -> Option<&InlineData> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }
}

fn history_contents(history: &[Message]) -> Vec<Content> {
    history
        .iter()
        .filter(|m| !m.text.is_empty())
        .map(|m| Content::text(m.role.as_str(), &m.text))
        .collect()
}

fn generation_config(config: &GenerationConfig) -> Value {
    let mut value = json!({ "temperature": config.temperature });
    if let Some(top_k) = config.top_k {
        value["topK"] = json!(top_k);
    }
    value
}

fn text_config(request: &TextRequest) -> Option<Value> {
    if !request.json {
        return None;
    }
    let mut config = json!({ "responseMimeType": "application/json" });
    if let Some(schema) = &request.schema {
        config["responseSchema"] = schema.clone();
    }
    Some(config)
}

fn request_body(contents: Vec<Content>, system: Option<&str>, config: Option<Value>) -> Value {
    let mut body = json!({ "contents": contents });
    if let Some(system) = system {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    if let Some(config) = config {
        body["generationConfig"] = config;
    }
    body
}

fn decode_base64(data: &str) -> Result<Vec<u8>, GenerationError> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| GenerationError::parsing(PROVIDER, format!("invalid base64 payload: {}", e)))
}

// ============================================================================
// SERVER-SENT EVENTS
// ============================================================================

/// Text carried by one streamed chunk, `None` when it has none.
pub(crate) fn chunk_text(payload: &str) -> Result<Option<String>, GenerationError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| GenerationError::parsing(PROVIDER, format!("bad stream chunk: {}", e)))?;

    if let Some(error) = value.get("error") {
        let status = error["code"]
            .as_u64()
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        return Err(GenerationError::from_status(PROVIDER, status, error.to_string()));
    }

    let response: GenerateContentResponse = serde_json::from_value(value)
        .map_err(|e| GenerationError::parsing(PROVIDER, e.to_string()))?;
    let text = response.text();
    Ok((!text.is_empty()).then_some(text))
}

/// Fragment for one SSE event, `None` for events without text.
fn event_fragment(
    event: Result<Event, EventStreamError<reqwest::Error>>,
) -> Option<Result<String, GenerationError>> {
    let data = match event {
        Ok(event) => event.data,
        Err(EventStreamError::Transport(e)) => return Some(Err(GenerationError::Network(e))),
        Err(e) => return Some(Err(GenerationError::parsing(PROVIDER, e.to_string()))),
    };

    let payload = data.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    chunk_text(payload).transpose()
}

/// Decode an SSE body into text fragments. The first error ends the stream.
fn fragment_stream<S>(body: S) -> FragmentStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    body.eventsource()
        .filter_map(|event| future::ready(event_fragment(event)))
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}
