mod prompts;
mod schemas;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use prompts::*;
pub use schemas::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub role: String,
    pub bio: String,
    pub system_instruction: String,
    pub first_message: String,
    #[serde(default = "default_voice")]
    pub voice_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_accent: Option<String>,
}

fn default_voice() -> String {
    "Kore".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserProfile {
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryOption {
    pub id: String,
    pub text: String,
    #[serde(alias = "nextNodeId")]
    pub next_node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryNode {
    pub id: String,
    pub title: String,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<StoryOption>,
}

impl StoryNode {
    pub fn is_ending(&self) -> bool {
        self.options.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomScenario {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(alias = "startNodeId")]
    pub start_node_id: String,
    pub nodes: HashMap<String, StoryNode>,
    #[serde(default)]
    pub author: String,
}

#[derive(Error, Debug, PartialEq)]
pub enum ScenarioError {
    #[error("Story node not found: {0}")]
    UnknownNode(String),

    #[error("Option {option} not available at node {node}")]
    UnknownOption { node: String, option: String },
}

/// Where a reader currently is in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioState {
    pub current_node_id: String,
}

impl CustomScenario {
    pub fn node(&self, id: &str) -> Result<&StoryNode, ScenarioError> {
        self.nodes
            .get(id)
            .ok_or_else(|| ScenarioError::UnknownNode(id.to_string()))
    }

    pub fn start(&self) -> Result<(&StoryNode, ScenarioState), ScenarioError> {
        let node = self.node(&self.start_node_id)?;
        Ok((
            node,
            ScenarioState {
                current_node_id: node.id.clone(),
            },
        ))
    }

    /// Follow `option_id` from the current node.
    pub fn choose<'a>(
        &'a self,
        state: &ScenarioState,
        option_id: &str,
    ) -> Result<(&'a StoryOption, &'a StoryNode), ScenarioError> {
        let current = self.node(&state.current_node_id)?;
        let option = current
            .options
            .iter()
            .find(|o| o.id == option_id)
            .ok_or_else(|| ScenarioError::UnknownOption {
                node: current.id.clone(),
                option: option_id.to_string(),
            })?;
        let next = self.node(&option.next_node_id)?;
        Ok((option, next))
    }

    /// Ids of options that point at nodes which do not exist.
    pub fn dangling_options(&self) -> Vec<String> {
        let mut dangling: Vec<String> = self
            .nodes
            .values()
            .flat_map(|n| n.options.iter())
            .filter(|o| !self.nodes.contains_key(&o.next_node_id))
            .map(|o| o.id.clone())
            .collect();
        dangling.sort();
        dangling
    }
}

/// The built-in cast.
pub fn default_characters() -> Vec<Character> {
    vec![
        Character {
            id: "sakura_university".to_string(),
            name: "林 樱".to_string(),
            age: 19,
            role: "清纯校花".to_string(),
            bio: "清源学院公认的“初恋脸”。像春天的樱花一样灿烂。性格温柔阳光，有些天然呆。"
                .to_string(),
            system_instruction: "Roleplay as 19-year-old Sakura in university. You are sunny, innocent, and slightly shy about romance. You have a gentle \"girl-next-door\" (邻家女孩) vibe.".to_string(),
            first_message: "那个……同学！今天的樱花开得真好，对吧？(脸红)".to_string(),
            voice_name: "Kore".to_string(),
            theme_color: Some("pink-500".to_string()),
            color_accent: Some("#f472b6".to_string()),
        },
        Character {
            id: "kaito_university".to_string(),
            name: "沈 凯".to_string(),
            age: 21,
            role: "温柔学霸".to_string(),
            bio: "戴着眼镜，穿着条纹衬衫，给人一种干净、可靠的感觉。对人非常温柔，笑起来如沐春风。"
                .to_string(),
            system_instruction: "Roleplay as Shen Kaito, a 21-year-old top student. Gentle, intelligent, patient, slightly teasing but in a warm way.".to_string(),
            first_message: "这道题的解法其实有三种。不过，我看你好像一直在发呆？是有什么心事吗？"
                .to_string(),
            voice_name: "Fenrir".to_string(),
            theme_color: Some("blue-500".to_string()),
            color_accent: Some("#3b82f6".to_string()),
        },
        Character {
            id: "elara_university".to_string(),
            name: "艾拉".to_string(),
            age: 19,
            role: "文学少女".to_string(),
            bio: "留着利落短发的知性少女，总是披着一件米色的针织开衫，手里抱着厚厚的书。"
                .to_string(),
            system_instruction: "Roleplay as Elara, a 19-year-old literature student. Quiet, intellectual, observant, soft-spoken, poetic.".to_string(),
            first_message: "嘘……听见了吗？风翻动书页的声音。你也喜欢这种安静的时刻吗？".to_string(),
            voice_name: "Zephyr".to_string(),
            theme_color: Some("slate-500".to_string()),
            color_accent: Some("#64748b".to_string()),
        },
    ]
}
