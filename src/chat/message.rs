use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message. Serialized with the Gemini role names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::User,
            text: text.into(),
            image: None,
            timestamp: now_millis(),
        }
    }

    pub fn model(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Model,
            text: text.into(),
            image: None,
            timestamp: now_millis(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_serialize_lowercase() {
        let msg = Message::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("image").is_none());

        let reply: Message = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "role": "model",
            "text": "hello",
            "timestamp": 1
        }))
        .unwrap();
        assert_eq!(reply.role, Role::Model);
        assert_eq!(reply.image, None);
    }

    #[test]
    fn test_fresh_ids() {
        assert_ne!(Message::user("a").id, Message::user("a").id);
    }
}
