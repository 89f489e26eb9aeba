use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::encoding;
use crate::error::{CaptionError, ValidationError};
use crate::gemini::CaptionService;
use crate::models::{Caption, GeneratedCaption, MediaFile, MediaKind, MediaPayload, MediaSource, RequestState, Submission};
use crate::store::CaptionStore;

pub const IMAGE_SIZE_LIMIT: u64 = 4 * 1024 * 1024;
pub const VIDEO_SIZE_LIMIT: u64 = 50 * 1024 * 1024;

pub const IMAGE_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg"];
pub const VIDEO_MIME_TYPES: &[&str] = &["video/mp4", "video/webm"];

pub const DEFAULT_IMAGE_STYLE: &str = "Write a witty caption";
pub const DEFAULT_VIDEO_STYLE: &str = "Write an engaging caption";

pub type SharedStore = Arc<Mutex<CaptionStore>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabPhase {
    Idle,
    Submitting,
    Succeeded { caption_id: String },
    Failed { message: String },
}

impl TabPhase {
    pub fn request_state(&self) -> RequestState {
        match self {
            TabPhase::Submitting => RequestState { is_loading: true, error: None },
            TabPhase::Failed { message } => RequestState { is_loading: false, error: Some(message.clone()) },
            TabPhase::Idle | TabPhase::Succeeded { .. } => RequestState { is_loading: false, error: None },
        }
    }
}

/// Validated input, ready to be sent.
enum Prepared {
    Media { kind: MediaKind, file: MediaFile, style_prompt: String },
    Text(String),
}

fn limits_for(kind: MediaKind) -> (u64, &'static [&'static str], &'static str) {
    match kind {
        MediaKind::Image => (IMAGE_SIZE_LIMIT, IMAGE_MIME_TYPES, DEFAULT_IMAGE_STYLE),
        MediaKind::Video => (VIDEO_SIZE_LIMIT, VIDEO_MIME_TYPES, DEFAULT_VIDEO_STYLE),
        MediaKind::Text => unreachable!("text submissions carry no file"),
    }
}

/// `image/JPEG; foo=bar` -> `image/jpeg`
fn essence(mime_type: &str) -> String {
    mime_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

fn validate(submission: Submission) -> Result<Prepared, ValidationError> {
    let kind = submission.kind();
    let (file, style_prompt) = match submission {
        Submission::Text { text } => {
            if text.trim().is_empty() {
                return Err(ValidationError::EmptyText);
            }
            return Ok(Prepared::Text(text));
        }
        Submission::Image { file, style_prompt } | Submission::Video { file, style_prompt } => (file, style_prompt),
    };

    let (size_limit, accepted, default_style) = limits_for(kind);
    let mut file = file.ok_or(ValidationError::MissingFile(kind))?;
    if file.size() > size_limit {
        return Err(ValidationError::TooLarge { kind, size: file.size() });
    }
    let mime_type = essence(&file.mime_type);
    if !accepted.contains(&mime_type.as_str()) {
        return Err(ValidationError::UnsupportedType { kind, mime_type: file.mime_type });
    }
    file.mime_type = mime_type;

    let style_prompt = style_prompt
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default_style.to_string());
    Ok(Prepared::Media { kind, file, style_prompt })
}

/// Controller for one tab. Only one request may be in flight per tab; tabs
/// do not block each other.
pub struct Orchestrator {
    kind: MediaKind,
    service: Arc<dyn CaptionService>,
    store: SharedStore,
    phase: Mutex<TabPhase>,
}

impl Orchestrator {
    pub fn new(kind: MediaKind, service: Arc<dyn CaptionService>, store: SharedStore) -> Self {
        Self { kind, service, store, phase: Mutex::new(TabPhase::Idle) }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn phase(&self) -> TabPhase {
        self.phase.lock().clone()
    }

    pub fn request_state(&self) -> RequestState {
        self.phase.lock().request_state()
    }

    /// Validates, then runs one request to its conclusion.
    ///
    /// Validation failures never reach the network and leave the phase as it
    /// was, so the error of an earlier `Failed` request is still reported
    /// until the next accepted submit. Encoding failures happen after the tab
    /// entered `Submitting` and end in `Failed` like service errors.
    pub async fn submit(&self, submission: Submission) -> Result<GeneratedCaption, CaptionError> {
        debug_assert_eq!(submission.kind(), self.kind);

        let prepared = {
            let mut phase = self.phase.lock();
            if *phase == TabPhase::Submitting {
                return Err(ValidationError::Busy(self.kind).into());
            }
            let prepared = validate(submission)?;
            *phase = TabPhase::Submitting;
            prepared
        };
        info!("🚀 Generating {} caption", self.kind);

        match self.run(prepared).await {
            Ok(text) => {
                let caption = Caption::new(text);
                let notice = {
                    let mut store = self.store.lock();
                    if let Err(e) = store.insert_front(caption.clone()) {
                        warn!("Caption {} kept in memory only: {}", caption.id, e);
                    }
                    store.notice().map(str::to_string)
                };
                *self.phase.lock() = TabPhase::Succeeded { caption_id: caption.id.clone() };
                info!("✅ {} caption {} stored", self.kind, caption.id);
                Ok(GeneratedCaption { caption, notice })
            }
            Err(e) => {
                warn!("❌ {} caption request failed: {}", self.kind, e);
                *self.phase.lock() = TabPhase::Failed { message: e.to_string() };
                Err(e)
            }
        }
    }

    /// Like [`Orchestrator::submit`], but on its own task so the request
    /// finishes even if the caller goes away.
    pub async fn submit_detached(self: Arc<Self>, submission: Submission) -> Result<GeneratedCaption, CaptionError> {
        let handle = tokio::spawn(async move { self.submit(submission).await });
        match handle.await {
            Ok(result) => result,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    async fn run(&self, prepared: Prepared) -> Result<String, CaptionError> {
        match prepared {
            Prepared::Text(text) => Ok(self.service.caption_from_text(&text).await?),
            Prepared::Media { kind, file, style_prompt } => {
                let encoded_data = match &file.source {
                    MediaSource::Bytes(bytes) => encoding::encode(bytes.as_ref()).await?,
                    MediaSource::DataUrl(url) => encoding::encode_data_url(url)?,
                };
                let payload = MediaPayload {
                    encoded_data,
                    mime_type: file.mime_type,
                    style_prompt,
                };
                let text = match kind {
                    MediaKind::Image => {
                        self.service.caption_from_image(&payload.encoded_data, &payload.mime_type, &payload.style_prompt).await?
                    }
                    MediaKind::Video => {
                        self.service.caption_from_video(&payload.encoded_data, &payload.mime_type, &payload.style_prompt).await?
                    }
                    MediaKind::Text => unreachable!("text is prepared as Prepared::Text"),
                };
                Ok(text)
            }
        }
    }
}
