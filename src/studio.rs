//! One-shot creative requests: journal reflections, letters, portraits,
//! generated scenarios and characters, and era sketches from photos.
//!
//! Every call goes through the retry policy. A backend `None`, or an empty
//! answer, comes back as `Ok(None)`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::chat::{now_millis, Message};
use crate::llm::{
    with_retry, AspectRatio, GenerationError, Generator, ImagePayload, RetryPolicy, TextRequest,
};
use crate::story::{
    character_avatar_prompt, character_profile_prompt, character_profile_schema,
    chronos_letter_prompt, chronos_letter_schema, era_background_prompt, era_schema,
    mirror_insight_prompt, mood_analysis_prompt, mood_image_prompt, portrait_prompt,
    scenario_builder_prompt, scenario_schema, Character, CustomScenario, StoryNode, UserProfile,
    ERA_IMAGE_PROMPT, WISDOM_ECHO_PROMPT,
};

/// How many earlier entries the mirror looks at.
const MIRROR_LOOKBACK: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChronosLetter {
    pub subject: String,
    pub content: String,
}

/// Name and mood of a world, read off a picture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EraSketch {
    pub name: String,
    pub description: String,
}

/// A new character together with its avatar (3:4) and backdrop (9:16).
#[derive(Debug, Clone)]
pub struct GeneratedCharacter {
    pub character: Character,
    pub avatar: ImagePayload,
    pub background: ImagePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterDraft {
    name: String,
    age: f64,
    role: String,
    bio: String,
    system_instruction: String,
    first_message: String,
    #[serde(default)]
    theme_color: String,
    #[serde(default)]
    color_accent: String,
}

impl CharacterDraft {
    fn into_character(self, id: String) -> Character {
        Character {
            id,
            name: self.name,
            age: self.age.round().clamp(1.0, 150.0) as u32,
            role: self.role,
            bio: self.bio,
            system_instruction: self.system_instruction,
            first_message: self.first_message,
            voice_name: "Kore".to_string(),
            theme_color: hex_color(self.theme_color),
            color_accent: hex_color(self.color_accent),
        }
    }
}

/// `#rgb` or `#rrggbb`; anything else is dropped.
fn hex_color(raw: String) -> Option<String> {
    let digits = raw.strip_prefix('#')?;
    let valid = matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        tracing::warn!("Ignoring invalid color {:?}", raw);
        return None;
    }
    Some(raw)
}

#[derive(Debug, Deserialize)]
struct ScenarioDraft {
    title: String,
    description: String,
    start_node_id: String,
    #[serde(default)]
    nodes: Vec<StoryNode>,
}

pub struct Studio<G: Generator + ?Sized> {
    generator: Arc<G>,
    retry: RetryPolicy,
}

impl<G: Generator + ?Sized> Studio<G> {
    pub fn new(generator: Arc<G>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    async fn text(&self, request: TextRequest) -> Result<Option<String>, GenerationError> {
        let text = with_retry(&self.retry, || self.generator.generate_text(&request)).await?;
        Ok(text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    async fn json<T: DeserializeOwned>(
        &self,
        request: TextRequest,
    ) -> Result<Option<T>, GenerationError> {
        match self.text(request.json()).await? {
            Some(raw) => serde_json::from_str(strip_code_fence(&raw))
                .map(Some)
                .map_err(|e| {
                    GenerationError::parsing(self.generator.name(), format!("{}: {}", e, raw))
                }),
            None => Ok(None),
        }
    }

    async fn image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<ImagePayload>, GenerationError> {
        with_retry(&self.retry, || {
            self.generator.generate_image(prompt, aspect_ratio)
        })
        .await
    }

    /// One healing sentence distilled from a conversation.
    pub async fn wisdom_echo(&self, history: &[Message]) -> Result<Option<String>, GenerationError> {
        let history: Vec<Message> = history.iter().filter(|m| !m.text.is_empty()).cloned().collect();
        self.text(TextRequest::new(WISDOM_ECHO_PROMPT).with_history(history))
            .await
    }

    /// A pattern the latest entry shares with the previous ones.
    pub async fn mirror_insight(
        &self,
        current: &str,
        previous: &[JournalEntry],
    ) -> Result<Option<String>, GenerationError> {
        let start = previous.len().saturating_sub(MIRROR_LOOKBACK);
        let previous: Vec<String> = previous[start..].iter().map(|e| e.content.clone()).collect();
        self.text(TextRequest::new(mirror_insight_prompt(current, &previous)))
            .await
    }

    /// A letter from `character`, coloured by the newest journal entry.
    pub async fn chronos_letter(
        &self,
        character: &Character,
        profile: &UserProfile,
        entries: &[JournalEntry],
    ) -> Result<Option<ChronosLetter>, GenerationError> {
        let latest = entries.iter().max_by_key(|e| e.timestamp);
        let prompt = chronos_letter_prompt(character, profile, latest.map(|e| e.content.as_str()));
        self.json(TextRequest::new(prompt).with_schema(chronos_letter_schema()))
            .await
    }

    /// Abstract illustration of a journal entry's mood.
    pub async fn mood_image(&self, text: &str) -> Result<Option<ImagePayload>, GenerationError> {
        let Some(analysis) = self.text(TextRequest::new(mood_analysis_prompt(text))).await? else {
            return Ok(None);
        };
        self.image(&mood_image_prompt(&analysis), AspectRatio::Wide)
            .await
    }

    pub async fn character_portrait(
        &self,
        character: &Character,
    ) -> Result<Option<ImagePayload>, GenerationError> {
        self.image(&portrait_prompt(character), AspectRatio::Portrait)
            .await
    }

    /// Draft a branching scenario from a one-line idea.
    pub async fn build_scenario(&self, idea: &str) -> Result<Option<CustomScenario>, GenerationError> {
        let Some(draft) = self
            .json::<ScenarioDraft>(
                TextRequest::new(scenario_builder_prompt(idea)).with_schema(scenario_schema()),
            )
            .await?
        else {
            return Ok(None);
        };

        let nodes: HashMap<String, StoryNode> = draft
            .nodes
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        if !nodes.contains_key(&draft.start_node_id) {
            return Err(GenerationError::parsing(
                self.generator.name(),
                format!("start node {} missing from draft", draft.start_node_id),
            ));
        }

        let scenario = CustomScenario {
            id: format!("gen_{}", now_millis()),
            title: draft.title,
            description: draft.description,
            start_node_id: draft.start_node_id,
            nodes,
            author: "AI Magic".to_string(),
        };
        let dangling = scenario.dangling_options();
        if !dangling.is_empty() {
            tracing::warn!("Generated scenario has dangling options: {:?}", dangling);
        }
        Ok(Some(scenario))
    }

    /// Invent a character for `era_name` from a short idea, then draw its
    /// avatar and backdrop. A missing picture yields `Ok(None)`.
    pub async fn generate_character(
        &self,
        idea: &str,
        era_name: &str,
    ) -> Result<Option<GeneratedCharacter>, GenerationError> {
        let request = TextRequest::new(character_profile_prompt(idea, era_name))
            .with_schema(character_profile_schema());
        let Some(draft) = self.json::<CharacterDraft>(request).await? else {
            return Ok(None);
        };
        let character = draft.into_character(format!("custom_{}", now_millis()));

        let Some(avatar) = self
            .image(&character_avatar_prompt(&character), AspectRatio::Portrait)
            .await?
        else {
            tracing::warn!("No avatar drawn for {}", character.name);
            return Ok(None);
        };
        let Some(background) = self
            .image(&era_background_prompt(era_name, &character.bio), AspectRatio::Tall)
            .await?
        else {
            tracing::warn!("No background drawn for {}", character.name);
            return Ok(None);
        };

        tracing::info!("Generated character {} ({})", character.name, character.id);
        Ok(Some(GeneratedCharacter {
            character,
            avatar,
            background,
        }))
    }

    /// Suggest an era name and description for a photo or artwork.
    pub async fn analyze_era_image(
        &self,
        image: &ImagePayload,
    ) -> Result<Option<EraSketch>, GenerationError> {
        let request = TextRequest::new(ERA_IMAGE_PROMPT)
            .with_image(image.clone())
            .with_schema(era_schema());
        self.json(request).await
    }
}

/// Models sometimes wrap JSON in a markdown fence.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[]\n```"), "[]");
    }

    #[test]
    fn test_scenario_draft_shape() {
        let draft: ScenarioDraft = serde_json::from_str(
            r#"{"title":"t","description":"d","start_node_id":"a",
                "nodes":[{"id":"a","title":"A","prompt":"p","options":[]}]}"#,
        )
        .unwrap();
        assert_eq!(draft.nodes.len(), 1);
        assert_eq!(draft.start_node_id, "a");
    }

    #[test]
    fn test_character_draft_conversion() {
        let draft: CharacterDraft = serde_json::from_str(
            r##"{"name":"阿青","age":17.6,"role":"学生","bio":"b","systemInstruction":"s",
                "firstMessage":"f","themeColor":"#1E90FF","colorAccent":"blue"}"##,
        )
        .unwrap();
        let character = draft.into_character("custom_1".to_string());
        assert_eq!(character.age, 18);
        assert_eq!(character.voice_name, "Kore");
        assert_eq!(character.theme_color.as_deref(), Some("#1E90FF"));
        assert!(character.color_accent.is_none());
    }

    #[test]
    fn test_hex_color() {
        assert_eq!(hex_color("#abc".to_string()).as_deref(), Some("#abc"));
        assert!(hex_color("#abcd".to_string()).is_none());
        assert!(hex_color("#gggggg".to_string()).is_none());
        assert!(hex_color("ff5733".to_string()).is_none());
    }
}
