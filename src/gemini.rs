use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::IgnoredAny, Deserialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::config::Config;
use crate::error::GenerationError;
use crate::models::MediaKind;

/// Low-level failure talking to Gemini. Never shown to the user.
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("status={status} body={body}")]
    Status { status: StatusCode, body: String },
    #[error("parse error: {0}")]
    Parse(String),
}

/// One network round trip per call, no retries.
#[async_trait]
pub trait CaptionService: Send + Sync {
    async fn caption_from_image(&self, base64_image: &str, mime_type: &str, style_prompt: &str) -> Result<String, GenerationError>;
    async fn caption_from_video(&self, base64_video: &str, mime_type: &str, style_prompt: &str) -> Result<String, GenerationError>;
    async fn caption_from_text(&self, text: &str) -> Result<String, GenerationError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_key.clone(), config.api_base.clone(), config.model.clone())
    }

    pub fn image_prompt(style_prompt: &str) -> String {
        format!(
            "You are an expert social media caption writer. Based on the user's request and the image, generate a creative, fun, or descriptive caption.\n\
             User request: \"{style_prompt}\".\n\
             Generate a single, ready-to-use caption. Include relevant hashtags at the end. Make it engaging."
        )
    }

    pub fn video_prompt(style_prompt: &str) -> String {
        format!(
            "You are an expert social media caption writer. Analyze this video and the user's request to generate a compelling caption. The caption should be creative, engaging, and relevant to the video content.\n\
             User request: \"{style_prompt}\".\n\
             Generate a single, ready-to-use caption. Include relevant hashtags at the end."
        )
    }

    pub fn text_prompt(input_text: &str) -> String {
        format!(
            "You are an expert social media caption writer. Analyze the following text and generate a smart, creative, or funny caption. Suggest relevant hashtags.\n\n\
             Input Text: \"{input_text}\"\n\n\
             Generate a single, ready-to-use caption."
        )
    }

    fn media_body(encoded_data: &str, mime_type: &str, instruction: String) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": mime_type, "data": encoded_data } },
                    { "text": instruction }
                ]
            }]
        })
    }

    fn text_body(prompt: String) -> Value {
        json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        })
    }

    /// reqwest errors quote the request URL, key included.
    fn redact(&self, message: String) -> String {
        message.replace(&self.api_key, "***")
    }

    async fn generate_content(&self, request_body: &Value) -> Result<String, GeminiError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, self.model, self.api_key);

        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let mut logged_body = request_body.clone();
        truncate_base64_in_json(&mut logged_body);
        info!("📤 Request body: {}", logged_body);

        let response = self.client
            .post(&url)
            .json(request_body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(self.redact(e.to_string())))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await.map_err(|e| GeminiError::Http(self.redact(e.to_string())))?;

        if !status.is_success() {
            return Err(GeminiError::Status { status, body: response_text });
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Parse(e.to_string()))?;

        Ok(parsed.text())
    }

    async fn caption(&self, kind: MediaKind, request_body: Value) -> Result<String, GenerationError> {
        match self.generate_content(&request_body).await {
            Ok(text) => {
                info!("✅ Generated {} caption ({} chars)", kind, text.len());
                Ok(text)
            }
            Err(e) => {
                error!("❌ Error generating caption for {}: {}", kind, e);
                Err(GenerationError { kind })
            }
        }
    }
}

#[async_trait]
impl CaptionService for GeminiClient {
    async fn caption_from_image(&self, base64_image: &str, mime_type: &str, style_prompt: &str) -> Result<String, GenerationError> {
        let body = Self::media_body(base64_image, mime_type, Self::image_prompt(style_prompt));
        self.caption(MediaKind::Image, body).await
    }

    async fn caption_from_video(&self, base64_video: &str, mime_type: &str, style_prompt: &str) -> Result<String, GenerationError> {
        let body = Self::media_body(base64_video, mime_type, Self::video_prompt(style_prompt));
        self.caption(MediaKind::Video, body).await
    }

    async fn caption_from_text(&self, text: &str) -> Result<String, GenerationError> {
        self.caption(MediaKind::Text, Self::text_body(Self::text_prompt(text))).await
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Other(IgnoredAny),
}

impl GeminiResponse {
    /// Text parts of the first candidate, joined verbatim. Empty if there are none.
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content.parts.iter().filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    Part::Other(IgnoredAny) => None,
                }).collect::<String>()
            })
            .unwrap_or_default()
    }
}
