use async_trait::async_trait;
use base64::Engine;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::error::GenerationError;
use crate::chat::Message;

/// Lazy, finite, non-restartable sequence of text fragments.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

/// Sample rate of speech payloads.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_k: Some(40),
        }
    }
}

/// Everything the backend needs to continue a multi-turn exchange.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub system_instruction: Option<String>,
    pub config: GenerationConfig,
    pub history: Vec<Message>,
}

/// One-shot text generation request.
#[derive(Debug, Clone, Default)]
pub struct TextRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub history: Vec<Message>,
    /// Ask for `application/json` output
    pub json: bool,
    /// Shape the JSON output must follow
    pub schema: Option<Value>,
    /// Picture sent ahead of the prompt
    pub image: Option<ImagePayload>,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// JSON output constrained to `schema`.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.json = true;
        self.schema = Some(schema);
        self
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait,
    Landscape,
    Tall,
    Wide,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1:1" => Ok(AspectRatio::Square),
            "3:4" => Ok(AspectRatio::Portrait),
            "4:3" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Tall),
            "16:9" => Ok(AspectRatio::Wide),
            other => Err(format!("unsupported aspect ratio: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePayload {
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }

    /// Read an image file, guessing the mime type from its extension.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            _ => "image/jpeg",
        };
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: std::fs::read(path)?,
        })
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

/// Raw 16-bit little-endian PCM, mono.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioPayload {
    pub fn from_pcm(pcm: Vec<u8>) -> Self {
        Self {
            pcm,
            sample_rate: SPEECH_SAMPLE_RATE,
            channels: 1,
        }
    }

    pub fn samples(&self) -> Vec<i16> {
        self.pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Write the samples as a 16-bit PCM WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for sample in self.samples() {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    }

    pub fn duration(&self) -> Duration {
        let frames = self.pcm.len() as u64 / (2 * u64::from(self.channels.max(1)));
        Duration::from_millis(frames * 1000 / u64::from(self.sample_rate.max(1)))
    }
}

/// The generation backend.
///
/// `Ok(None)` means the backend answered but produced nothing usable
/// (e.g. declined to draw). It is not an error and is never retried.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn send_message_stream(
        &self,
        context: &ChatContext,
        new_user_text: &str,
    ) -> Result<FragmentStream, GenerationError>;

    async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<ImagePayload>, GenerationError>;

    async fn generate_speech(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<Option<AudioPayload>, GenerationError>;

    async fn generate_text(&self, request: &TextRequest)
        -> Result<Option<String>, GenerationError>;

    fn name(&self) -> &str;
}
