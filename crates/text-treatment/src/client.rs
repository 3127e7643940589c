//! Completion client for OpenAI-compatible chat APIs

use crate::errors::{AnalysisError, Result};
use async_trait::async_trait;
use invoiceflow_common::config::AnalysisConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Schema-constrained text completion
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Return the raw completion text for `system` + `user` prompts, asking the
    /// model to match the JSON `schema` registered under `schema_name`
    async fn complete(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<String>;

    fn model_name(&self) -> &str;
}

pub struct OpenAiCompatibleAnalyzer {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchema<'a>,
}

#[derive(Serialize)]
struct JsonSchema<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatibleAnalyzer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.api_key.clone(),
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl TextAnalyzer for OpenAiCompatibleAnalyzer {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchema {
                    name: schema_name,
                    strict: true,
                    schema,
                },
            },
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api { status, body });
        }

        let result: ChatResponse = response.json().await?;
        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AnalysisError::EmptyResponse)?;

        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Option<(HeaderMap, serde_json::Value)>>>;

    async fn serve(reply: serde_json::Value) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    |State((captured, reply)): State<(Captured, serde_json::Value)>,
                     headers: HeaderMap,
                     Json(body): Json<serde_json::Value>| async move {
                        *captured.lock().unwrap() = Some((headers, body));
                        Json(reply)
                    },
                ),
            )
            .with_state((captured.clone(), reply));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/v1", addr), captured)
    }

    #[tokio::test]
    async fn test_complete_sends_schema_and_returns_content() {
        let (base_url, captured) = serve(serde_json::json!({
            "choices": [{ "message": { "content": "{\"content\":\"ok\",\"amount\":1}" } }]
        }))
        .await;

        let analyzer = OpenAiCompatibleAnalyzer::new(
            base_url,
            Some("sk-test".to_string()),
            "test-model",
            Duration::from_secs(5),
        )
        .unwrap();
        let schema = serde_json::json!({ "type": "object" });

        let content = analyzer
            .complete("system", "user", "invoice_analyze", &schema)
            .await
            .unwrap();
        assert_eq!(content, "{\"content\":\"ok\",\"amount\":1}");

        let (headers, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(headers["authorization"], "Bearer sk-test");
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "invoice_analyze");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[tokio::test]
    async fn test_missing_content_is_an_error() {
        let (base_url, _) = serve(serde_json::json!({ "choices": [] })).await;
        let analyzer =
            OpenAiCompatibleAnalyzer::new(base_url, None, "m", Duration::from_secs(5)).unwrap();

        let result = analyzer
            .complete("s", "u", "invoice_analyze", &serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(AnalysisError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_request_error() {
        let analyzer = OpenAiCompatibleAnalyzer::new(
            "http://127.0.0.1:9",
            None,
            "m",
            Duration::from_secs(2),
        )
        .unwrap();

        let result = analyzer
            .complete("s", "u", "invoice_analyze", &serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(AnalysisError::Request(_))));
    }
}
