use anyhow::{anyhow, Context, Result};
use pagescribe_core::{split_data_url, ExtractionOutcome, TextExtractor};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::debug;

const TRANSCRIBE_PROMPT: &str = "Transcribe all handwritten or printed text on this journal page exactly as written, preserving line breaks. Wrap any word or phrase you cannot read with confidence in square brackets, e.g. [unclear]. Reply with the transcription only.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionProvider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl VisionProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisionProvider::OpenAi => "openai",
            VisionProvider::Anthropic => "anthropic",
            VisionProvider::Gemini => "gemini",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(VisionProvider::OpenAi),
            "anthropic" => Some(VisionProvider::Anthropic),
            "gemini" => Some(VisionProvider::Gemini),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            VisionProvider::OpenAi => "gpt-4o-mini",
            VisionProvider::Anthropic => "claude-3-5-sonnet-latest",
            VisionProvider::Gemini => "gemini-1.5-flash",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            VisionProvider::OpenAi => "OPENAI_API_KEY",
            VisionProvider::Anthropic => "ANTHROPIC_API_KEY",
            VisionProvider::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// Hosted vision-to-text adapter. Every transport, status or decoding
/// problem is turned into `ExtractionOutcome::Failure`.
#[derive(Clone)]
pub struct VisionClient {
    http: Client,
    provider: VisionProvider,
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl VisionClient {
    pub fn new(provider: VisionProvider, model: impl Into<String>) -> Result<Self> {
        let api_key = read_api_key(provider.key_var())?;
        Self::with_api_key(provider, model, api_key)
    }

    pub fn with_api_key(
        provider: VisionProvider,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        let base_url = match provider {
            VisionProvider::OpenAi => env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            VisionProvider::Anthropic => "https://api.anthropic.com/v1".to_string(),
            VisionProvider::Gemini => {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }
        };
        let max_tokens = env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4096);
        Ok(Self {
            http,
            provider,
            model: model.into(),
            api_key: api_key.into(),
            base_url,
            max_tokens,
        })
    }

    pub fn provider(&self) -> VisionProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn transcribe(&self, image_data_url: &str) -> Result<String> {
        let (mime, payload) =
            split_data_url(image_data_url).ok_or_else(|| anyhow!("image is not a base64 data url"))?;
        match self.provider {
            VisionProvider::OpenAi => self.transcribe_openai(image_data_url).await,
            VisionProvider::Anthropic => self.transcribe_anthropic(mime, payload).await,
            VisionProvider::Gemini => self.transcribe_gemini(mime, payload).await,
        }
    }

    async fn transcribe_openai(&self, image_data_url: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = openai_payload(&self.model, image_data_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| "openai request failed")?;
        let value = decode_body("openai", response).await?;
        extract_openai_text(&value).ok_or_else(|| anyhow!("missing text in OpenAI response"))
    }

    async fn transcribe_anthropic(&self, mime: &str, data: &str) -> Result<String> {
        let url = format!("{}/messages", self.base_url);
        let payload = anthropic_payload(&self.model, self.max_tokens, mime, data);
        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| "anthropic request failed")?;
        let value = decode_body("anthropic", response).await?;
        let parsed: AnthropicResponse =
            serde_json::from_value(value).context("failed to decode anthropic response")?;
        parsed
            .content
            .into_iter()
            .find_map(|part| part.text)
            .ok_or_else(|| anyhow!("missing text in Anthropic response"))
    }

    async fn transcribe_gemini(&self, mime: &str, data: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = gemini_payload(mime, data);
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| "gemini request failed")?;
        let value = decode_body("gemini", response).await?;
        let parsed: GeminiResponse =
            serde_json::from_value(value).context("failed to decode gemini response")?;
        parsed
            .candidates
            .and_then(|mut c| c.pop())
            .and_then(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .find_map(|part| part.text)
            })
            .ok_or_else(|| anyhow!("missing text in Gemini response"))
    }
}

impl TextExtractor for VisionClient {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    async fn submit(&self, image_data_url: &str) -> ExtractionOutcome {
        match self.transcribe(image_data_url).await {
            Ok(text) => {
                debug!(provider = self.provider.as_str(), chars = text.len(), "page transcribed");
                ExtractionOutcome::success(text.trim())
            }
            Err(err) => ExtractionOutcome::failure(format!("{err:#}")),
        }
    }
}

fn openai_payload(model: &str, image_data_url: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": TRANSCRIBE_PROMPT },
                    { "type": "image_url", "image_url": { "url": image_data_url } },
                ],
            }
        ],
    })
}

fn anthropic_payload(model: &str, max_tokens: u32, mime: &str, data: &str) -> Value {
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": [
            {
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": { "type": "base64", "media_type": mime, "data": data },
                    },
                    { "type": "text", "text": TRANSCRIBE_PROMPT },
                ],
            }
        ],
    })
}

fn gemini_payload(mime: &str, data: &str) -> Value {
    json!({
        "contents": [
            {
                "parts": [
                    { "inline_data": { "mime_type": mime, "data": data } },
                    { "text": TRANSCRIBE_PROMPT },
                ]
            }
        ]
    })
}

async fn decode_body(provider: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    check_status(provider, status, &body)?;
    serde_json::from_str(&body).with_context(|| format!("failed to decode {provider} response"))
}

fn check_status(provider: &str, status: StatusCode, body: &str) -> Result<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(anyhow!("{provider} rate limited the request (status 429)"));
    }
    if !status.is_success() {
        let snippet: String = body.chars().take(200).collect();
        return Err(anyhow!(
            "{provider} returned error (status {}): {}",
            status,
            snippet
        ));
    }
    Ok(())
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!(format!("{var} is not set")))?;
    validate_api_key(var, &value)?;
    Ok(value)
}

fn validate_api_key(var: &str, value: &str) -> Result<()> {
    if var.contains("OPENAI") && !value.starts_with("sk-") {
        return Err(anyhow!(format!(
            "{} must start with 'sk-' (see https://platform.openai.com/)",
            var
        )));
    }
    if var.contains("ANTHROPIC") && !value.starts_with("sk-ant-") {
        return Err(anyhow!(format!("{} must start with 'sk-ant-'", var)));
    }
    if var.contains("GEMINI") && !value.starts_with("AI") {
        return Err(anyhow!(format!(
            "{} must be a valid Gemini API key (starts with 'AI...')",
            var
        )));
    }
    Ok(())
}

fn extract_openai_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
        return Some(text.to_string());
    }
    let content = choice.get("message")?.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    content
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(|t| t.as_str()))
        .map(|text| text.to_string())
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_roundtrip() {
        for provider in [
            VisionProvider::OpenAi,
            VisionProvider::Anthropic,
            VisionProvider::Gemini,
        ] {
            assert_eq!(VisionProvider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(VisionProvider::from_str(" OpenAI "), Some(VisionProvider::OpenAi));
        assert_eq!(VisionProvider::from_str("local"), None);
    }

    #[test]
    fn api_keys_are_checked_per_provider() {
        assert!(validate_api_key("OPENAI_API_KEY", "sk-abc").is_ok());
        assert!(validate_api_key("OPENAI_API_KEY", "abc").is_err());
        assert!(validate_api_key("ANTHROPIC_API_KEY", "sk-abc").is_err());
        assert!(validate_api_key("ANTHROPIC_API_KEY", "sk-ant-abc").is_ok());
        assert!(validate_api_key("GEMINI_API_KEY", "AIza").is_ok());
    }

    #[test]
    fn openai_text_is_found_in_string_or_parts() {
        let plain = json!({"choices": [{"message": {"content": "Dear diary"}}]});
        assert_eq!(extract_openai_text(&plain).as_deref(), Some("Dear diary"));
        let parts = json!({"choices": [{"message": {"content": [{"type": "text", "text": "hi [there]"}]}}]});
        assert_eq!(extract_openai_text(&parts).as_deref(), Some("hi [there]"));
        assert_eq!(extract_openai_text(&json!({"choices": []})), None);
    }

    #[test]
    fn payloads_carry_the_image() {
        let openai = openai_payload("gpt-4o-mini", "data:image/jpeg;base64,AAAA");
        assert_eq!(
            openai["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
        let anthropic = anthropic_payload("claude", 1024, "image/png", "BBBB");
        assert_eq!(
            anthropic["messages"][0]["content"][0]["source"]["media_type"],
            "image/png"
        );
        assert_eq!(anthropic["max_tokens"], 1024);
        let gemini = gemini_payload("image/jpeg", "CCCC");
        assert_eq!(gemini["contents"][0]["parts"][0]["inline_data"]["data"], "CCCC");
    }

    #[test]
    fn rate_limits_and_errors_are_reported() {
        let err = check_status("openai", StatusCode::TOO_MANY_REQUESTS, "").unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        let err = check_status("gemini", StatusCode::BAD_REQUEST, "bad image").unwrap_err();
        assert!(err.to_string().contains("status 400"));
        assert!(check_status("gemini", StatusCode::OK, "{}").is_ok());
    }

    #[test]
    fn anthropic_and_gemini_replies_decode() {
        let anthropic: AnthropicResponse =
            serde_json::from_value(json!({"content": [{"type": "text", "text": "page one"}]}))
                .unwrap();
        assert_eq!(anthropic.content[0].text.as_deref(), Some("page one"));
        let gemini: GeminiResponse = serde_json::from_value(
            json!({"candidates": [{"content": {"parts": [{"text": "page two"}]}}]}),
        )
        .unwrap();
        let candidates = gemini.candidates.unwrap();
        assert_eq!(candidates[0].content.parts[0].text.as_deref(), Some("page two"));
    }

    #[tokio::test]
    async fn transport_failures_do_not_leak_the_api_key() {
        for (provider, key) in [
            (VisionProvider::Gemini, "AIzaSECRETKEY"),
            (VisionProvider::Anthropic, "sk-ant-SECRETKEY"),
            (VisionProvider::OpenAi, "sk-SECRETKEY"),
        ] {
            let mut client = VisionClient::with_api_key(provider, "m", key).unwrap();
            client.base_url = format!("http://127.0.0.1:9/v1?token={key}");
            let outcome = client.submit("data:image/png;base64,AAAA").await;
            match outcome {
                ExtractionOutcome::Failure { error } => {
                    assert!(error.contains("request failed"), "{error}");
                    assert!(!error.contains("SECRETKEY"), "{provider:?} leaked: {error}");
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn malformed_images_become_failures_without_network() {
        let client =
            VisionClient::with_api_key(VisionProvider::OpenAi, "gpt-4o-mini", "sk-test").unwrap();
        let outcome = client.submit("not a data url").await;
        assert!(matches!(
            outcome,
            ExtractionOutcome::Failure { ref error } if error.contains("data url")
        ));
    }
}
