use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text-generation backend: rendered prompt in, generated text out.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

// ── HTTP client builder ───────────────────────────────────────────────────────

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10));

    if let Ok(proxy_url) = std::env::var("HTTP_PROXY") {
        builder = builder.proxy(reqwest::Proxy::all(&proxy_url)?);
    }

    builder.build().map_err(Into::into)
}

// ── OpenAI-compatible provider ───────────────────────────────────────────────

#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiProvider {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = ApiRequest {
            model: &self.model,
            messages: vec![ApiMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature: self.temperature,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("HTTP request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("API error {status}: {text}"));
        }

        let parsed: ApiResponse = resp.json().await.context("failed to parse API response")?;
        extract_text(parsed)
    }
}

fn extract_text(parsed: ApiResponse) -> Result<String> {
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(anyhow!("API returned empty content"));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_trims_first_choice() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"  Расклад: Путь  \n"}},{"message":{"content":"x"}}]}"#,
        )
        .expect("valid json");
        assert_eq!(extract_text(parsed).expect("text"), "Расклад: Путь");
    }

    #[test]
    fn empty_content_is_an_error() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#)
                .expect("valid json");
        let err = extract_text(parsed).expect_err("should fail");
        assert!(err.to_string().contains("empty content"));
    }

    #[test]
    fn request_body_shape() {
        let body = ApiRequest {
            model: "gpt-4o",
            messages: vec![ApiMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 3500,
            temperature: 0.5,
        };
        let v = serde_json::to_value(&body).expect("serializes");
        assert_eq!(v["model"], "gpt-4o");
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["max_tokens"], 3500);
    }
}
