// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use llm_contracts::{LLMError, Message, ProviderRequest};
use serde_json::json;
use sibyl::{AnthropicClient, ApiClient, OllamaClient, OpenAIClient};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(model: &str) -> ProviderRequest {
    ProviderRequest {
        model: model.to_string(),
        messages: vec![
            Message {
                role: "system".to_string(),
                content: "You are a data analyst assistant.".to_string(),
            },
            Message {
                role: "user".to_string(),
                content: "bar chart of sales by region".to_string(),
            },
        ],
        max_tokens: Some(256),
        temperature: Some(0.2),
        top_p: None,
        stop_sequences: None,
        provider_specific: Default::default(),
    }
}

#[tokio::test]
async fn anthropic_client_parses_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "```json\n{\"kind\": \"insight\", \"message\": \"hi\"}\n```"}],
            "usage": {"input_tokens": 12, "output_tokens": 7},
            "stop_reason": "end_turn"
        })))
        .mount(&server)
        .await;

    let client = AnthropicClient::new("test-key".to_string(), Some(server.uri()));
    let response = client.send_request(request("claude-3-5-haiku")).await.unwrap();
    assert!(response.content.contains("insight"));
    assert_eq!(response.usage.prompt_tokens, 12);
    assert_eq!(response.usage.total_tokens, 19);
    assert_eq!(response.finish_reason.as_deref(), Some("end_turn"));
}

#[tokio::test]
async fn anthropic_client_retries_after_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "ok"}],
            "usage": {"input_tokens": 1, "output_tokens": 1}
        })))
        .mount(&server)
        .await;

    let client = AnthropicClient::new("test-key".to_string(), Some(server.uri()));
    let response = client.send_request(request("claude-3-5-haiku")).await.unwrap();
    assert_eq!(response.content, "ok");
}

#[tokio::test]
async fn slow_endpoint_surfaces_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;

    let client = AnthropicClient::new("test-key".to_string(), Some(server.uri()))
        .with_timeout(Duration::from_millis(100))
        .with_max_retries(0);
    let error = client.send_request(request("claude-3-5-haiku")).await.unwrap_err();
    assert!(matches!(error, LLMError::Timeout));
}

#[tokio::test]
async fn malformed_body_surfaces_serialisation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = AnthropicClient::new("test-key".to_string(), Some(server.uri()))
        .with_max_retries(0);
    let error = client.send_request(request("claude-3-5-haiku")).await.unwrap_err();
    assert!(matches!(error, LLMError::Serialisation(_)));
}

#[tokio::test]
async fn bad_api_key_fails_without_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicClient::new("wrong-key".to_string(), Some(server.uri()));
    let error = client.send_request(request("claude-3-5-haiku")).await.unwrap_err();
    assert!(matches!(error, LLMError::Authentication(_)));
}

#[tokio::test]
async fn openai_client_sends_bearer_auth_and_parses_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6}
        })))
        .mount(&server)
        .await;

    let client = OpenAIClient::new("test-key".to_string(), Some(server.uri()));
    let response = client.send_request(request("gpt-4o-mini")).await.unwrap();
    assert_eq!(response.content, "hello");
    assert_eq!(response.usage.total_tokens, 6);
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn ollama_client_hits_chat_endpoint_with_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "local reply"},
            "prompt_eval_count": 10,
            "eval_count": 5,
            "done_reason": "stop"
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(Some(server.uri()));
    let response = client.send_request(request("phi3:mini")).await.unwrap();
    assert_eq!(response.content, "local reply");
    assert_eq!(response.usage.total_tokens, 15);
}

#[tokio::test]
async fn ollama_unknown_model_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(Some(server.uri()));
    let error = client.send_request(request("missing:model")).await.unwrap_err();
    assert!(matches!(error, LLMError::ModelNotFound(_)));
}

#[tokio::test]
async fn ollama_health_check_lists_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "phi3:mini"}]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(Some(server.uri()));
    assert!(client.health_check().await.is_ok());
}
