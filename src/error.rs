use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::models::MediaKind;

/// Input rejected before any network call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select {} first.", article(.0))]
    MissingFile(MediaKind),
    #[error("File is too large. Please select {} under {}.", article(.kind), limit_label(.kind))]
    TooLarge { kind: MediaKind, size: u64 },
    #[error("Unsupported file type \"{mime_type}\". {}", accepted_label(.kind))]
    UnsupportedType { kind: MediaKind, mime_type: String },
    #[error("Please enter some text to generate a caption.")]
    EmptyText,
    #[error("A caption is already being generated.")]
    Busy(MediaKind),
}

fn article(kind: &MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "an image",
        MediaKind::Video => "a video",
        MediaKind::Text => "some text",
    }
}

fn limit_label(kind: &MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "4MB",
        MediaKind::Video => "50MB",
        MediaKind::Text => "the size limit",
    }
}

fn accepted_label(kind: &MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "Please select a PNG or JPEG image.",
        MediaKind::Video => "Please select an MP4 or WebM video.",
        MediaKind::Text => "",
    }
}

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Failed to read file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to read file as base64 data.")]
    Malformed,
    #[error("Failed to read uploaded file: {0}")]
    Upload(String),
}

/// Remote call failed. Display is the user-facing, kind-specific wording; the
/// cause is only ever logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", generation_message(.kind))]
pub struct GenerationError {
    pub kind: MediaKind,
}

fn generation_message(kind: &MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "Failed to generate caption from the image. Please try again.",
        MediaKind::Video => "Failed to generate caption. The video may be too long or in an unsupported format. Please try a shorter clip.",
        MediaKind::Text => "Failed to generate caption from the text. Please try again.",
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored captions are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl CaptionError {
    pub fn status(&self) -> StatusCode {
        match self {
            CaptionError::Validation(ValidationError::Busy(_)) => StatusCode::CONFLICT,
            CaptionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CaptionError::Encoding(_) => StatusCode::BAD_REQUEST,
            CaptionError::Generation(_) => StatusCode::BAD_GATEWAY,
            CaptionError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CaptionError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn validation_messages_name_the_media() {
        assert_eq!(ValidationError::MissingFile(MediaKind::Image).to_string(), "Please select an image first.");
        assert_eq!(
            ValidationError::TooLarge { kind: MediaKind::Video, size: 1 }.to_string(),
            "File is too large. Please select a video under 50MB."
        );
    }

    #[test]
    fn generation_messages_differ_per_kind() {
        let msgs: Vec<String> = MediaKind::ALL.iter().map(|k| GenerationError { kind: *k }.to_string()).collect();
        assert_eq!(msgs[0], "Failed to generate caption from the image. Please try again.");
        assert!(msgs[1].contains("shorter clip"));
        assert_eq!(msgs[2], "Failed to generate caption from the text. Please try again.");
    }

    #[test]
    fn busy_maps_to_conflict() {
        let err = CaptionError::from(ValidationError::Busy(MediaKind::Text));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(CaptionError::from(GenerationError { kind: MediaKind::Text }).status(), StatusCode::BAD_GATEWAY);
    }
}
