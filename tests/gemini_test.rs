// ============================================
// HEARTSPHERE - Gemini Wire Tests
// ============================================

use base64::Engine;
use futures::StreamExt;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use heartsphere::chat::Message;
use heartsphere::llm::{
    AspectRatio, ChatContext, GeminiModels, GeminiProvider, GenerationConfig, GenerationError,
    Generator, ImagePayload, TextRequest,
};

const STREAM_PATH: &str = "/models/gemini-2.5-flash:streamGenerateContent";
const CHAT_PATH: &str = "/models/gemini-2.5-flash:generateContent";
const IMAGE_PATH: &str = "/models/gemini-2.5-flash-image:generateContent";
const TTS_PATH: &str = "/models/gemini-2.5-flash-preview-tts:generateContent";

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn provider(server: &MockServer) -> GeminiProvider {
    GeminiProvider::new("test-key", Some(&server.uri()), GeminiModels::default()).unwrap()
}

fn text_chunk(text: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
    )
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn inline_response(mime_type: &str, data: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": {
                "parts": [{
                    "inlineData": {
                        "mimeType": mime_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(data)
                    }
                }]
            }
        }]
    }))
}

fn context(history: Vec<Message>) -> ChatContext {
    ChatContext {
        system_instruction: Some("你是樱".to_string()),
        config: GenerationConfig::default(),
        history,
    }
}

#[tokio::test]
async fn test_stream_yields_fragments_in_order() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(sse_response(
            text_chunk("Hel") + &text_chunk("lo") + &text_chunk(" world"),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![Message::model("intro", "你好呀"), Message::user("")];
    let stream = provider(&server)
        .send_message_stream(&context(history), "hi")
        .await
        .unwrap();
    let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
    assert_eq!(fragments, vec!["Hel", "lo", " world"]);

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "hi");
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "你是樱");
}

#[tokio::test]
async fn test_error_chunk_ends_stream() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let body = text_chunk("partial")
        + "data: {\"error\":{\"code\":503,\"message\":\"overloaded\"}}\n\n"
        + &text_chunk("never");
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let stream = provider(&server)
        .send_message_stream(&context(Vec::new()), "hi")
        .await
        .unwrap();
    let items: Vec<Result<String, GenerationError>> = stream.collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "partial");
    assert!(matches!(items[1], Err(GenerationError::Server { status_code: 503, .. })));
}

#[tokio::test]
async fn test_status_errors_are_classified() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_string(r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(IMAGE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("no"))
        .mount(&server)
        .await;

    let provider = provider(&server);

    let err = provider
        .send_message_stream(&context(Vec::new()), "hi")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, GenerationError::RateLimited { .. }));
    assert!(err.is_retryable());

    let err = provider
        .generate_text(&TextRequest::new("echo"))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::QuotaExhausted { .. }));

    let err = provider
        .generate_image("cat", AspectRatio::Square)
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Authentication { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_image_inline_data_is_decoded() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGE_PATH))
        .respond_with(inline_response("image/png", &[0x89, b'P', b'N', b'G']))
        .mount(&server)
        .await;

    let image = provider(&server)
        .generate_image("a paper lantern", AspectRatio::Tall)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(image.mime_type, "image/png");
    assert_eq!(image.data, vec![0x89, b'P', b'N', b'G']);
    assert!(image.to_data_url().starts_with("data:image/png;base64,"));

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "9:16");
}

#[tokio::test]
async fn test_image_without_inline_data_is_none() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't draw that." }] } }]
        })))
        .mount(&server)
        .await;

    let image = provider(&server)
        .generate_image("something", AspectRatio::Square)
        .await
        .unwrap();
    assert!(image.is_none());
}

#[tokio::test]
async fn test_speech_returns_pcm() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let pcm: Vec<u8> = [100i16, -100, 0]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    Mock::given(method("POST"))
        .and(path(TTS_PATH))
        .respond_with(inline_response("audio/L16;rate=24000", &pcm))
        .mount(&server)
        .await;

    let audio = provider(&server)
        .generate_speech("早上好", "Puck")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(audio.sample_rate, 24_000);
    assert_eq!(audio.samples(), vec![100, -100, 0]);

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
    assert_eq!(
        body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
            ["voiceName"],
        "Puck"
    );
}

#[tokio::test]
async fn test_speech_without_audio_is_none() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let audio = provider(&server).generate_speech("…", "Kore").await.unwrap();
    assert!(audio.is_none());
}

#[tokio::test]
async fn test_json_text_request() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"subject\":\"hi\"}" }] } }]
        })))
        .mount(&server)
        .await;

    let text = provider(&server)
        .generate_text(&TextRequest::new("write a letter").json())
        .await
        .unwrap();
    assert_eq!(text.as_deref(), Some("{\"subject\":\"hi\"}"));

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
}

#[tokio::test]
async fn test_vision_request_carries_image_and_schema() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{
                "text": "{\"name\":\"千禧年的老街\",\"description\":\"霓虹与卡带。\"}"
            }] } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let image = ImagePayload {
        mime_type: "image/jpeg".to_string(),
        data: vec![0xff, 0xd8, 0xff],
    };
    let schema = json!({
        "type": "OBJECT",
        "properties": { "name": { "type": "STRING" }, "description": { "type": "STRING" } },
        "required": ["name", "description"]
    });
    let request = TextRequest::new("which era?")
        .with_image(image)
        .with_schema(schema.clone());
    let text = provider(&server).generate_text(&request).await.unwrap();
    assert!(text.unwrap().contains("千禧年的老街"));

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
    assert_eq!(parts[0]["inlineData"]["data"], "/9j/");
    assert_eq!(parts[1]["text"], "which era?");
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(body["generationConfig"]["responseSchema"], schema);
}
