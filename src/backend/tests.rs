//! Tests for the OpenRouter backend client.

use super::openrouter::{parse_sse_line, SseLine};
use super::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;

fn client_for(server: &mockito::Server) -> OpenRouterClient {
    OpenRouterClient::new(Some("sk-test".to_string())).with_base_url(&server.url())
}

#[test]
fn parses_content_delta() {
    let line = r#"data: {"choices":[{"delta":{"content":"He"},"finish_reason":null}]}"#;
    assert_eq!(parse_sse_line(line), SseLine::Delta(StreamDelta::text("He")));
}

#[test]
fn parses_finish_reason() {
    let line = r#"data: {"choices":[{"delta":{},"finish_reason":"length"}]}"#;
    assert_eq!(
        parse_sse_line(line),
        SseLine::Delta(StreamDelta {
            content: String::new(),
            finish_reason: Some("length".to_string()),
        })
    );
}

#[test]
fn done_sentinel_and_comments() {
    assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
    assert_eq!(parse_sse_line(": OPENROUTER PROCESSING"), SseLine::Ignore);
    assert_eq!(parse_sse_line(""), SseLine::Ignore);
    assert_eq!(parse_sse_line(r#"data: {"choices":[],"usage":{}}"#), SseLine::Ignore);
}

#[test]
fn in_band_error_fails_the_stream() {
    let line = r#"data: {"error":{"message":"provider overloaded","code":502}}"#;
    assert_eq!(
        parse_sse_line(line),
        SseLine::Failed(GatewayError::UpstreamError("provider overloaded".to_string()))
    );
}

#[test]
fn free_detection_and_context_length() {
    let model: UpstreamModel = serde_json::from_value(serde_json::json!({
        "id": "meta-llama/llama-3-8b-instruct:free",
        "context_length": 8192,
        "top_provider": {"context_length": 16384},
        "pricing": {"prompt": "0", "completion": "0"},
        "supported_parameters": ["tools", "temperature"]
    }))
    .unwrap();

    assert!(model.is_free());
    assert!(model.supports_tools());
    assert_eq!(model.effective_context_length(), 16384);
}

#[test]
fn context_length_falls_back_when_top_provider_is_zero() {
    let model: UpstreamModel = serde_json::from_value(serde_json::json!({
        "id": "a/b",
        "context_length": 4096,
        "top_provider": {"context_length": 0},
        "pricing": {"prompt": "0.000001", "completion": "0"}
    }))
    .unwrap();

    assert!(!model.is_free());
    assert_eq!(model.effective_context_length(), 4096);
}

#[tokio::test]
async fn chat_returns_completion() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "id": "gen-1",
                "model": "a/model",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let completion = client_for(&server)
        .chat(&[ChatMessage::new("user", "Hello")], "a/model")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(completion.choices[0].message.content, "Hi");
    assert_eq!(completion.usage.total_tokens, 4);
}

#[tokio::test]
async fn chat_forwards_tool_fields_upstream() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "model": "a/model",
            "messages": [{"role": "tool", "tool_call_id": "call_1", "content": "42"}]
        })))
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"ok"}}]}"#)
        .create_async()
        .await;

    let message = ChatMessage {
        tool_call_id: Some("call_1".to_string()),
        ..ChatMessage::new("tool", "42")
    };
    client_for(&server).chat(&[message], "a/model").await.unwrap();

    mock.assert_async().await;
}

#[test]
fn content_parts_keep_shape_and_join_text() {
    let message: ChatMessage = serde_json::from_value(serde_json::json!({
        "role": "user",
        "content": [
            {"type": "text", "text": "Describe "},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
            {"type": "text", "text": "this"}
        ]
    }))
    .unwrap();

    assert_eq!(message.content.text(), "Describe this");
    let round_trip = serde_json::to_value(&message).unwrap();
    assert_eq!(round_trip["content"][1]["type"], "image_url");
    assert!(round_trip.get("tool_call_id").is_none());
}

#[tokio::test]
async fn chat_surfaces_http_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_body("rate limited")
        .create_async()
        .await;

    let err = client_for(&server)
        .chat(&[ChatMessage::new("user", "Hello")], "a/model")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::UpstreamError(ref msg) if msg.contains("429")));
}

#[tokio::test]
async fn chat_treats_error_body_as_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"error":{"message":"No endpoints found"}}"#)
        .create_async()
        .await;

    let err = client_for(&server)
        .chat(&[ChatMessage::new("user", "Hello")], "a/model")
        .await
        .unwrap_err();

    assert_eq!(err, GatewayError::UpstreamError("No endpoints found".to_string()));
}

#[tokio::test]
async fn chat_stream_yields_deltas_until_done() {
    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        ": OPENROUTER PROCESSING\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let stream = client_for(&server)
        .chat_stream(&[ChatMessage::new("user", "Hello")], "a/model")
        .await
        .unwrap();
    let deltas: Vec<_> = stream.collect().await;

    assert_eq!(
        deltas,
        vec![
            Ok(StreamDelta::text("He")),
            Ok(StreamDelta {
                content: "llo".to_string(),
                finish_reason: Some("stop".to_string()),
            }),
        ]
    );
}

#[tokio::test]
async fn chat_stream_keeps_last_line_without_newline() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body("data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
        .create_async()
        .await;

    let stream = client_for(&server)
        .chat_stream(&[ChatMessage::new("user", "Hello")], "a/model")
        .await
        .unwrap();
    let deltas: Vec<_> = stream.collect().await;

    assert_eq!(deltas, vec![Ok(StreamDelta::text("tail"))]);
}

#[test]
fn null_message_content_reads_as_empty() {
    let message: ChatMessage =
        serde_json::from_str(r#"{"role":"assistant","content":null}"#).unwrap();
    assert_eq!(message, ChatMessage::new("assistant", ""));
}

#[tokio::test]
async fn chat_stream_fails_before_opening_on_http_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .create_async()
        .await;

    let result = client_for(&server)
        .chat_stream(&[ChatMessage::new("user", "Hello")], "a/model")
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn list_models_reads_data_array() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "data": [
                    {"id": "a/free:free", "context_length": 8000, "pricing": {"prompt": "0", "completion": "0"}},
                    {"id": "b/paid", "context_length": 4000, "pricing": {"prompt": "0.01", "completion": "0.02"}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let models = client_for(&server).list_models().await.unwrap();

    mock.assert_async().await;
    assert_eq!(models.len(), 2);
    assert!(models[0].is_free());
    assert!(!models[1].is_free());
}
