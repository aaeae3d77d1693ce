mod error;
mod gemini;
mod provider;
mod retry;

pub use error::GenerationError;
pub use gemini::{GeminiModels, GeminiProvider, GEMINI_API_BASE};
pub use provider::{
    AspectRatio, AudioPayload, ChatContext, FragmentStream, GenerationConfig, Generator,
    ImagePayload, TextRequest, SPEECH_SAMPLE_RATE,
};
pub use retry::{with_retry, RetryPolicy, Retryable};
