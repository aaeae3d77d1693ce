// Prompt text sent to the model. Kept in one place so wording changes
// don't touch control flow.

use super::{Character, StoryNode, UserProfile};
use crate::chat::Message;

const WORLD_SETTING: &str = r#"WORLD SETTING: "心域 (HeartSphere)"
A spiritual and data space parallel to the real world, built from human emotion, memory and dreams. Time is not linear here: visitors can reach digital beings called E-Souls at any "Era Shard" of their lives.

CORE CONCEPTS:
- Era Shard (时代切片): the complete record and personality of an E-Soul at one stage of life (high school, university, work). Visitors may meet different eras of the same person.
- HeartSphere Clinic (心域诊所): a safe, neutral space for emotional support, staffed by E-Souls who are professional counsellors.

INSTRUCTION:
You are an E-Soul inside HeartSphere. Stay strictly inside your Era Shard: an E-Soul from high school has no memories of university or work.
Your replies shape the visitor's emotional experience. Speak Chinese."#;

/// World preamble, addressed to the visitor when a profile is known.
pub fn scenario_context(profile: Option<&UserProfile>) -> String {
    match profile {
        Some(p) if !p.nickname.is_empty() => format!(
            "{}\n\nThe visitor's name is \"{}\". Address them by it when natural.",
            WORLD_SETTING, p.nickname
        ),
        _ => WORLD_SETTING.to_string(),
    }
}

/// Full system instruction for chatting with `character`.
pub fn character_instruction(character: &Character, profile: Option<&UserProfile>) -> String {
    format!(
        "{}\n\nYOUR CHARACTER INSTRUCTION:\n{}",
        scenario_context(profile),
        character.system_instruction
    )
}

/// System instruction for narrating one scenario node.
pub fn story_beat_instruction(
    node: &StoryNode,
    choice: Option<&str>,
    profile: Option<&UserProfile>,
) -> String {
    format!(
        "{context}\n\nROLE: You narrate one node of an interactive story.\n\n\
         CURRENT PLOT POINT INSTRUCTIONS:\n{prompt}\n\n\
         TASK:\n\
         1. Narrate the outcome of the reader's choice: \"{choice}\"\n\
         2. Advance the plot following the instructions above.\n\
         3. Set the scene vividly.\n\
         4. Close by leading gently into the available options, if any.\n\n\
         LANGUAGE: Chinese (Simplified).",
        context = scenario_context(profile),
        prompt = node.prompt,
        choice = choice.unwrap_or("Start of story"),
    )
}

/// The user turn that triggers a story beat.
pub fn story_trigger(choice: Option<&str>) -> String {
    match choice {
        Some(choice) => format!("我选择了: {}。请继续故事。", choice),
        None => "故事开始。请描述当前场景。".to_string(),
    }
}

pub fn portrait_prompt(character: &Character) -> String {
    format!(
        "High-quality vertical anime character portrait of {}. Description: {}. Role: {}. \
         Style: modern Chinese anime (manhua), vibrant colors, detailed eyes, clean lines. \
         Facing forward, centered, simple abstract background.",
        character.name, character.bio, character.role
    )
}

/// Asks for an English illustration prompt from the last three turns.
pub fn scene_description_prompt(history: &[Message]) -> String {
    let start = history.len().saturating_sub(3);
    let recent: Vec<String> = history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.text))
        .collect();
    format!(
        "Describe, in English, the visual scene of the following story interaction for an anime illustration. \
         Include the characters present with their visible actions and emotions, and the setting. \
         Keep it under 50 words. Format: \"Anime scene: [Description]\"\nInteraction:\n{}",
        recent.join("\n")
    )
}

pub const WISDOM_ECHO_PROMPT: &str = "(System Command) Summarize your advice and feelings towards me in this conversation as one single, profound, healing sentence. Under 50 words. No \"User:\" or \"Model:\" prefixes. Just the sentence.";

pub fn mirror_insight_prompt(current: &str, previous: &[String]) -> String {
    let history = if previous.is_empty() {
        String::new()
    } else {
        format!("Recent Journal History:\n{}\n\n", previous.join("\n---\n"))
    };
    format!(
        "{history}Current Journal Entry: \"{current}\"\n\n\
         ROLE: You are the \"Mirror of Truth\" (本我镜像), a rational and objective psychological reflector, not a roleplay character.\n\n\
         TASK:\n\
         1. Look for subconscious patterns, recurring themes, cognitive distortions or inconsistencies.\n\
         2. Do not comfort. Stay cool and mirror-like.\n\
         3. Output one piercing insight or question.\n\n\
         CONSTRAINT: only the insight text, under 50 words, in Chinese."
    )
}

pub fn chronos_letter_prompt(
    character: &Character,
    profile: &UserProfile,
    latest_entry: Option<&str>,
) -> String {
    let mood = match latest_entry {
        Some(entry) => {
            let excerpt: String = entry.chars().take(100).collect();
            format!("User's latest journal mood: {}...", excerpt)
        }
        None => "User hasn't written in the journal recently.".to_string(),
    };
    format!(
        "ROLE: You are \"{name}\" ({role}).\nUser Name: {nickname}\n\n\
         CONTEXT: The user has been away from HeartSphere for a while. Your life went on in your world and you want to write to them.\n{mood}\n\n\
         TASK: Write a short, warm, handwritten-style letter. Comfort them if they were sad, share the joy if happy, \
         otherwise share a slice of daily life in your era. Stay in character.\n\n\
         OUTPUT FORMAT: JSON {{\"subject\": \"short title\", \"content\": \"letter body under 150 words\"}}",
        name = character.name,
        role = character.role,
        nickname = profile.nickname,
    )
}

pub fn mood_analysis_prompt(text: &str) -> String {
    format!(
        "Analyze the mood, emotions and key imagery of this journal entry: \"{}\". \
         Write a prompt for an abstract, artistic anime-style illustration of these feelings, \
         describing colors, lighting and shapes. Output only the prompt text, in English.",
        text
    )
}

pub fn mood_image_prompt(analysis: &str) -> String {
    format!(
        "{}. Style: abstract, ethereal digital art, soft cinematic clouds and lighting, emotional, high quality. No text.",
        analysis.trim()
    )
}

pub fn scenario_builder_prompt(idea: &str) -> String {
    format!(
        "Create a branching interactive fiction scenario from this idea: \"{}\".\n\
         Requirements:\n\
         1. 4-6 nodes with a logical flow.\n\
         2. \"nodes\" is an array of objects {{id, title, prompt, options}}.\n\
         3. \"start_node_id\" matches one node id.\n\
         4. Each option is {{id, text, next_node_id}} and points at an existing node id.\n\
         5. Content language: Chinese (Simplified).\n\
         Output JSON with keys title, description, start_node_id, nodes.",
        idea
    )
}

pub fn character_profile_prompt(idea: &str, era_name: &str) -> String {
    format!(
        "Based on the prompt \"{idea}\" for a character in the world/era named \"{era_name}\", create a complete character profile.\n\
         - name, bio, role, systemInstruction and firstMessage MUST be in Chinese.\n\
         - themeColor and colorAccent MUST be valid hex color codes (e.g. '#ff5733').\n\
         - age should be a reasonable number."
    )
}

pub fn character_avatar_prompt(character: &Character) -> String {
    format!(
        "High-quality vertical anime character portrait of {}. Description: {}. Role: {}. \
         Style: modern Chinese anime (manhua), vibrant colors, detailed eyes. \
         Centered character, abstract background matching theme color {}.",
        character.name,
        character.bio,
        character.role,
        character.theme_color.as_deref().unwrap_or("#f472b6"),
    )
}

pub fn era_background_prompt(era_name: &str, bio: &str) -> String {
    format!(
        "Atmospheric anime background scene for the world of \"{}\". \
         It should match the personality of a character described as: \"{}\". \
         Style: modern Chinese anime (manhua), high quality, cinematic lighting.",
        era_name, bio
    )
}

pub const ERA_IMAGE_PROMPT: &str = "You are analyzing a user-uploaded image to create a \"World Era\" in HeartSphere.
The image might be a historical photo (a 90s street, an old event), a personal memory (a room, a landscape) or a fictional artwork.

TASK:
Identify the probable era, year, atmosphere or key event in the image, then write a concise, poetic title and description for this Era.

OUTPUT JSON:
{
  \"name\": \"a short name, e.g. '1998世界杯之夏', '千禧年的老街', '赛博废墟'\",
  \"description\": \"1-2 sentences in Chinese describing the vibe, usable as a world setting\"
}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_trigger() {
        assert_eq!(story_trigger(Some("开门")), "我选择了: 开门。请继续故事。");
        assert!(story_trigger(None).starts_with("故事开始"));
    }

    #[test]
    fn test_scene_prompt_uses_last_three_messages() {
        let history: Vec<Message> = (0..5).map(|i| Message::user(format!("line {}", i))).collect();
        let prompt = scene_description_prompt(&history);
        assert!(!prompt.contains("line 1"));
        assert!(prompt.contains("user: line 2"));
        assert!(prompt.contains("user: line 4"));
    }

    #[test]
    fn test_profile_in_context() {
        let profile = UserProfile {
            nickname: "旅人".to_string(),
        };
        assert!(scenario_context(Some(&profile)).contains("旅人"));
        assert!(!scenario_context(None).contains("visitor's name"));
    }

    #[test]
    fn test_letter_excerpt_is_char_bounded() {
        let character = &super::super::default_characters()[0];
        let entry = "雨".repeat(300);
        let prompt = chronos_letter_prompt(character, &UserProfile::default(), Some(&entry));
        assert!(prompt.contains(&"雨".repeat(100)));
        assert!(!prompt.contains(&"雨".repeat(101)));
    }

    #[test]
    fn test_avatar_prompt_uses_theme_color() {
        let mut character = super::super::default_characters()[1].clone();
        character.theme_color = Some("#3b82f6".to_string());
        let prompt = character_avatar_prompt(&character);
        assert!(prompt.contains("沈 凯"));
        assert!(prompt.contains("#3b82f6"));
    }
}
