// Response schemas for JSON requests, in the backend's OpenAPI subset.

use serde_json::{json, Value};

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}

pub fn chronos_letter_schema() -> Value {
    object(
        json!({
            "subject": { "type": "STRING" },
            "content": { "type": "STRING" },
        }),
        &["subject", "content"],
    )
}

pub fn scenario_schema() -> Value {
    let option = object(
        json!({
            "id": { "type": "STRING" },
            "text": { "type": "STRING" },
            "next_node_id": { "type": "STRING" },
        }),
        &["id", "text", "next_node_id"],
    );
    let node = object(
        json!({
            "id": { "type": "STRING" },
            "title": { "type": "STRING" },
            "prompt": { "type": "STRING" },
            "options": { "type": "ARRAY", "items": option },
        }),
        &["id", "title", "prompt", "options"],
    );
    object(
        json!({
            "title": { "type": "STRING" },
            "description": { "type": "STRING" },
            "start_node_id": { "type": "STRING" },
            "nodes": { "type": "ARRAY", "items": node },
        }),
        &["title", "description", "start_node_id", "nodes"],
    )
}

pub fn character_profile_schema() -> Value {
    object(
        json!({
            "name": { "type": "STRING" },
            "age": { "type": "NUMBER" },
            "role": { "type": "STRING" },
            "bio": { "type": "STRING" },
            "systemInstruction": { "type": "STRING" },
            "firstMessage": { "type": "STRING" },
            "themeColor": { "type": "STRING" },
            "colorAccent": { "type": "STRING" },
        }),
        &[
            "name",
            "age",
            "role",
            "bio",
            "systemInstruction",
            "firstMessage",
            "themeColor",
            "colorAccent",
        ],
    )
}

pub fn era_schema() -> Value {
    object(
        json!({
            "name": { "type": "STRING" },
            "description": { "type": "STRING" },
        }),
        &["name", "description"],
    )
}
