mod settings;

pub use settings::{GeminiConfig, RetrySettings, Settings};
