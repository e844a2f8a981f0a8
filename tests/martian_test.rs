//! Martian client against a wiremock gateway.

use serde_json::json;
use slipstream::providers::martian::{ROUTER_MODEL, routing_constraint};
use slipstream::providers::openai_compat::DEFAULT_TIMEOUT;
use slipstream::{GenerationParams, LlmClient, MartianClient, Message};
use wiremock::matchers::{bearer_token, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion_body(content: &str, model: &str) -> serde_json::Value {
    json!({
        "model": model,
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
    })
}

fn client(server: &MockServer) -> MartianClient {
    MartianClient::with_base_url(
        "martian-key",
        &format!("{}/api/openai/v2", server.uri()),
        DEFAULT_TIMEOUT,
    )
    .unwrap()
}

#[tokio::test]
async fn direct_model_uses_v2_gateway() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/openai/v2/chat/completions"))
        .and(bearer_token("martian-key"))
        .and(body_partial_json(json!({"model": "openai/gpt-4o-mini"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("direct", "openai/gpt-4o-mini")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let completion = client(&server)
        .complete(
            &[Message::user("hi")],
            "openai/gpt-4o-mini",
            &GenerationParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(completion.text, "direct");
    assert!(!completion.was_rerouted());
}

#[tokio::test]
async fn router_model_uses_v1_and_reports_actual_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/openai/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "router"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("routed", "anthropic/claude-3-haiku")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.endpoint_for(ROUTER_MODEL).ends_with("/api/openai/v1"));

    let completion = client
        .complete(&[Message::user("hi")], ROUTER_MODEL, &GenerationParams::default())
        .await
        .unwrap();
    assert_eq!(completion.model, "router");
    assert_eq!(completion.actual_model, "anthropic/claude-3-haiku");
    assert!(completion.was_rerouted());
}

#[tokio::test]
async fn routing_constraint_is_sent_in_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/openai/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "router",
            "router_constraint": {
                "cost_constraint": {"value": {"numeric_value": 0.02}}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok", "x")))
        .expect(1)
        .mount(&server)
        .await;

    let constraint = routing_constraint(Some(0.02), None).unwrap();
    let client = client(&server).with_routing_constraint(constraint).unwrap();
    client
        .complete(&[Message::user("hi")], ROUTER_MODEL, &GenerationParams::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn list_models_returns_ids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/openai/v2/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "openai/gpt-4o"}, {"id": "router"}]
        })))
        .mount(&server)
        .await;

    let models = client(&server).list_models().await.unwrap();
    assert_eq!(models, vec!["openai/gpt-4o".to_string(), "router".to_string()]);
}

#[tokio::test]
async fn client_name_is_martian() {
    let server = MockServer::start().await;
    assert_eq!(client(&server).name(), "martian");
}
