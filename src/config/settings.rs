use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::{GeminiModels, GenerationConfig, RetryPolicy};
use crate::story::{default_characters, Character, UserProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_character")]
    pub default_character: String,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub profile: UserProfile,

    #[serde(default)]
    pub characters: BTreeMap<String, Character>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_k")]
    pub top_k: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_character() -> String {
    "sakura_university".to_string()
}
fn default_chat_model() -> String {
    GeminiModels::default().chat
}
fn default_image_model() -> String {
    GeminiModels::default().image
}
fn default_tts_model() -> String {
    GeminiModels::default().tts
}
fn default_temperature() -> f32 {
    0.8
}
fn default_top_k() -> Option<u32> {
    Some(40)
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    2000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            base_url: None,
            chat_model: default_chat_model(),
            image_model: default_image_model(),
            tts_model: default_tts_model(),
            temperature: default_temperature(),
            top_k: default_top_k(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let characters: BTreeMap<String, Character> = default_characters()
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Self {
            default_character: default_character(),
            gemini: GeminiConfig::default(),
            retry: RetrySettings::default(),
            profile: UserProfile::default(),
            characters,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl GeminiConfig {
    pub fn models(&self) -> GeminiModels {
        GeminiModels {
            chat: self.chat_model.clone(),
            image: self.image_model.clone(),
            tts: self.tts_model.clone(),
        }
    }

    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            top_k: self.top_k,
        }
    }

    pub fn api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        if let Some(env_var) = &self.api_key_env {
            return std::env::var(env_var).ok().filter(|k| !k.is_empty());
        }
        None
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let settings = Settings::default();
            settings.save_to(&config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            Ok(settings)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut settings: Settings =
            toml::from_str(&content).context("Failed to parse config file")?;
        if settings.characters.is_empty() {
            settings.characters = Settings::default().characters;
        }
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("app", "heartsphere", "heartsphere")
            .context("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn get_character(&self, id: &str) -> Option<&Character> {
        self.characters.get(id)
    }

    /// `id`, or the configured default when `None`.
    pub fn resolve_character(&self, id: Option<&str>) -> Result<&Character> {
        let id = id.unwrap_or(&self.default_character);
        self.get_character(id)
            .with_context(|| format!("Unknown character: {}", id))
    }
}
