use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::encoding;

/// A generated caption. Immutable once created; the store only ever drops them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Caption {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Caption {
    /// UUIDv7 ids sort by creation time and stay unique within one clock tick.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Text,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Image, MediaKind::Video, MediaKind::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Text => "text",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File contents as they reached us: raw upload bytes, or a data URL that
/// is only decoded once the request is submitted.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Bytes(Bytes),
    DataUrl(String),
}

/// An uploaded file as handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: Option<String>,
    pub mime_type: String,
    pub source: MediaSource,
}

impl MediaFile {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { file_name: None, mime_type: mime_type.into(), source: MediaSource::Bytes(bytes.into()) }
    }

    pub fn from_data_url(mime_type: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self { file_name: None, mime_type: mime_type.into(), source: MediaSource::DataUrl(data_url.into()) }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn size(&self) -> u64 {
        match &self.source {
            MediaSource::Bytes(bytes) => bytes.len() as u64,
            MediaSource::DataUrl(url) => encoding::decoded_len(url),
        }
    }
}

/// Encoded media for one in-flight request. Dropped when the request resolves.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub encoded_data: String,
    pub mime_type: String,
    pub style_prompt: String,
}

/// What the user asked for on one tab.
#[derive(Debug, Clone)]
pub enum Submission {
    Image { file: Option<MediaFile>, style_prompt: Option<String> },
    Video { file: Option<MediaFile>, style_prompt: Option<String> },
    Text { text: String },
}

impl Submission {
    pub fn kind(&self) -> MediaKind {
        match self {
            Submission::Image { .. } => MediaKind::Image,
            Submission::Video { .. } => MediaKind::Video,
            Submission::Text { .. } => MediaKind::Text,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestState {
    pub is_loading: bool,
    pub error: Option<String>,
}

// --- HTTP payloads ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TextCaptionRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DataUrlCaptionRequest {
    pub data_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptionsView {
    pub captions: Vec<Caption>,
    pub notice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneratedCaption {
    pub caption: Caption,
    pub notice: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TabView {
    pub kind: MediaKind,
    #[serde(flatten)]
    pub state: RequestState,
}
