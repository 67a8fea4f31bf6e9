use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use gallery_contracts::providers::{
    GenerateContentResponse, GenerateRequest, InlineData, ResponsePart,
};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::{truncate_text, ImageProvider};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Passes the Google Search grounding tool through to the model.
    pub google_search: bool,
    /// No timeout unless the caller sets one.
    pub timeout: Option<Duration>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            google_search: true,
            timeout: None,
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
            model: non_empty_env("GEMINI_IMAGE_MODEL").unwrap_or(defaults.model),
            ..defaults
        }
    }
}

pub struct GeminiProvider {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn build_payload(&self, request: &GenerateRequest) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "contents".to_string(),
            json!([{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }]),
        );
        if self.config.google_search {
            payload.insert("tools".to_string(), json!([{ "googleSearch": {} }]));
        }
        payload.insert(
            "generationConfig".to_string(),
            json!({
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.aspect_ratio,
                    "imageSize": request.image_size,
                },
            }),
        );
        Value::Object(payload)
    }

    /// Parts of the first candidate. Unrecognised parts are kept as
    /// [`ResponsePart::Other`].
    fn parse_response(response_payload: &Value) -> Result<GenerateContentResponse> {
        let Some(candidate) = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
        else {
            if let Some(reason) = response_payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
            {
                log::warn!("Gemini blocked the prompt: {reason}");
            }
            return Ok(GenerateContentResponse::default());
        };
        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            log::debug!("Gemini finish reason: {reason}");
        }

        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            let inline = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object);
            if let Some(inline) = inline {
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let bytes = BASE64
                    .decode(data.as_bytes())
                    .context("Gemini image base64 decode failed")?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                out.push(ResponsePart::InlineData(InlineData {
                    mime_type,
                    data: bytes,
                }));
                continue;
            }
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push(ResponsePart::Text(text.to_string()));
                continue;
            }
            out.push(ResponsePart::Other(part));
        }
        Ok(GenerateContentResponse::new(out))
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateContentResponse> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&self.config.model);
        let payload = self.build_payload(request);
        log::debug!("POST {endpoint} ({} prompt chars)", request.prompt.chars().count());

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        Self::parse_response(&response_payload)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;

    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(GeminiConfig {
            api_base: "https://example.test/v1beta".to_string(),
            ..GeminiConfig::default()
        })
        .expect("client")
    }

    #[test]
    fn endpoint_prefixes_models_path_once() {
        let provider = provider();
        assert_eq!(
            provider.endpoint_for_model("gemini-3-pro-image-preview"),
            "https://example.test/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
        assert_eq!(
            provider.endpoint_for_model(" models/custom "),
            "https://example.test/v1beta/models/custom:generateContent"
        );
    }

    #[test]
    fn payload_carries_prompt_ratio_size_and_search_tool() {
        let payload = provider().build_payload(&GenerateRequest::widescreen("harbor at dawn"));
        assert_eq!(
            payload["contents"][0]["parts"][0]["text"],
            json!("harbor at dawn")
        );
        assert_eq!(payload["contents"][0]["role"], json!("user"));
        assert_eq!(payload["tools"], json!([{ "googleSearch": {} }]));
        assert_eq!(
            payload["generationConfig"]["imageConfig"],
            json!({ "aspectRatio": "16:9", "imageSize": "4K" })
        );
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[test]
    fn payload_omits_tools_without_search() {
        let provider = GeminiProvider::new(GeminiConfig {
            google_search: false,
            ..GeminiConfig::default()
        })
        .expect("client");
        let payload = provider.build_payload(&GenerateRequest::widescreen("x"));
        assert!(payload.get("tools").is_none());
    }

    #[test]
    fn parse_response_accepts_both_key_spellings() -> Result<()> {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Searching for reference photos." },
                        { "inline_data": { "mime_type": "image/jpeg", "data": BASE64.encode(b"jpeg-bytes") } },
                        { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(b"png-bytes") } },
                        { "functionCall": { "name": "noop" } }
                    ]
                },
                "finishReason": "STOP"
            }]
        });
        let response = GeminiProvider::parse_response(&payload)?;
        assert_eq!(response.parts.len(), 4);
        assert_eq!(
            response.parts[0],
            ResponsePart::Text("Searching for reference photos.".to_string())
        );
        assert!(matches!(response.parts[3], ResponsePart::Other(_)));

        let first = response.first_inline_data().expect("inline part");
        assert_eq!(first.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(first.data, b"jpeg-bytes".to_vec());
        Ok(())
    }

    #[test]
    fn parse_response_without_candidates_is_empty() -> Result<()> {
        let payload = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let response = GeminiProvider::parse_response(&payload)?;
        assert!(response.parts.is_empty());
        assert!(response.first_inline_data().is_none());
        Ok(())
    }

    #[test]
    fn parse_response_rejects_bad_base64() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "@@not-base64@@" } }
            ]}}]
        });
        let err = GeminiProvider::parse_response(&payload).unwrap_err();
        assert!(err.to_string().contains("base64 decode failed"));
    }

    #[test]
    fn generate_without_api_key_fails_before_network() {
        let err = provider()
            .generate(&GenerateRequest::widescreen("x"))
            .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
