use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use parking_lot::Mutex;

use crate::{
    assets,
    encoding,
    error::{CaptionError, EncodingError},
    gemini::CaptionService,
    models::{CaptionsView, DataUrlCaptionRequest, GeneratedCaption, MediaFile, MediaKind, Submission, TabView, TextCaptionRequest},
    orchestrator::{Orchestrator, SharedStore},
    store::CaptionStore,
};

/// Fits a 50 MiB video even after base64 inflation in a data URL.
pub const MAX_BODY_BYTES: usize = 96 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub image: Arc<Orchestrator>,
    pub video: Arc<Orchestrator>,
    pub text: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(service: Arc<dyn CaptionService>, store: CaptionStore) -> Self {
        let store: SharedStore = Arc::new(Mutex::new(store));
        let tab = |kind| Arc::new(Orchestrator::new(kind, service.clone(), store.clone()));
        Self {
            image: tab(MediaKind::Image),
            video: tab(MediaKind::Video),
            text: tab(MediaKind::Text),
            store,
        }
    }

    pub fn orchestrator(&self, kind: MediaKind) -> &Arc<Orchestrator> {
        match kind {
            MediaKind::Image => &self.image,
            MediaKind::Video => &self.video,
            MediaKind::Text => &self.text,
        }
    }

    fn captions_view(&self) -> CaptionsView {
        let store = self.store.lock();
        CaptionsView {
            captions: store.captions().to_vec(),
            notice: store.notice().map(str::to_string),
        }
    }

    async fn generate(&self, submission: Submission) -> Result<(StatusCode, Json<GeneratedCaption>), CaptionError> {
        let orchestrator = self.orchestrator(submission.kind()).clone();
        let generated = orchestrator.submit_detached(submission).await?;
        Ok((StatusCode::CREATED, Json(generated)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(assets::index))
        .route("/assets/*path", get(assets::asset))
        .route("/api/captions", get(list_captions).delete(clear_captions))
        .route("/api/captions/:id", get(get_caption).delete(delete_caption))
        .route("/api/captions/:id/text", get(get_caption_text))
        .route("/api/generate/image", post(generate_image))
        .route("/api/generate/image/json", post(generate_image_json))
        .route("/api/generate/video", post(generate_video))
        .route("/api/generate/video/json", post(generate_video_json))
        .route("/api/generate/text", post(generate_text))
        .route("/api/tabs/:kind", get(tab_state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn list_captions(State(state): State<AppState>) -> Json<CaptionsView> {
    Json(state.captions_view())
}

pub async fn get_caption(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    match state.store.lock().get(&id).cloned() {
        Some(caption) => Json(caption).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Plain text body for the copy-to-clipboard action.
pub async fn get_caption_text(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    match state.store.lock().get(&id).map(|c| c.text.clone()) {
        Some(text) => ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Unknown ids are fine. A failed save shows up as the view's notice.
pub async fn delete_caption(Path(id): Path<String>, State(state): State<AppState>) -> Json<CaptionsView> {
    match state.store.lock().remove(&id) {
        Ok(true) => tracing::info!("🗑️ Deleted caption {}", id),
        Ok(false) => tracing::debug!("Caption {} already gone", id),
        Err(e) => tracing::warn!("Deleted caption {} in memory only: {}", id, e),
    }
    Json(state.captions_view())
}

pub async fn clear_captions(State(state): State<AppState>) -> Json<CaptionsView> {
    if let Err(e) = state.store.lock().clear() {
        tracing::warn!("Cleared captions in memory only: {}", e);
    }
    Json(state.captions_view())
}

pub async fn tab_state(Path(kind): Path<MediaKind>, State(state): State<AppState>) -> Json<TabView> {
    Json(TabView { kind, state: state.orchestrator(kind).request_state() })
}

pub async fn generate_text(
    State(state): State<AppState>,
    Json(body): Json<TextCaptionRequest>,
) -> Result<(StatusCode, Json<GeneratedCaption>), CaptionError> {
    state.generate(Submission::Text { text: body.text }).await
}

pub async fn generate_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<GeneratedCaption>), CaptionError> {
    let (file, style_prompt) = read_upload(multipart).await?;
    state.generate(Submission::Image { file, style_prompt }).await
}

pub async fn generate_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<GeneratedCaption>), CaptionError> {
    let (file, style_prompt) = read_upload(multipart).await?;
    state.generate(Submission::Video { file, style_prompt }).await
}

pub async fn generate_image_json(
    State(state): State<AppState>,
    Json(body): Json<DataUrlCaptionRequest>,
) -> Result<(StatusCode, Json<GeneratedCaption>), CaptionError> {
    let (file, style_prompt) = read_data_url(body)?;
    state.generate(Submission::Image { file, style_prompt }).await
}

pub async fn generate_video_json(
    State(state): State<AppState>,
    Json(body): Json<DataUrlCaptionRequest>,
) -> Result<(StatusCode, Json<GeneratedCaption>), CaptionError> {
    let (file, style_prompt) = read_data_url(body)?;
    state.generate(Submission::Video { file, style_prompt }).await
}

fn upload_error(e: axum::extract::multipart::MultipartError) -> CaptionError {
    EncodingError::Upload(e.body_text()).into()
}

/// Pulls the `file` and `prompt` fields out of a form upload. An empty file
/// input counts as no file.
async fn read_upload(mut multipart: Multipart) -> Result<(Option<MediaFile>, Option<String>), CaptionError> {
    let mut file = None;
    let mut prompt = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let mime_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field.bytes().await.map_err(upload_error)?;
                if bytes.is_empty() && file_name.as_deref().map_or(true, str::is_empty) {
                    continue;
                }
                let mut media = MediaFile::new(mime_type, bytes);
                media.file_name = file_name;
                file = Some(media);
            }
            "prompt" => prompt = Some(field.text().await.map_err(upload_error)?),
            _ => {}
        }
    }

    Ok((file, prompt))
}

fn read_data_url(body: DataUrlCaptionRequest) -> Result<(Option<MediaFile>, Option<String>), CaptionError> {
    if body.data_url.trim().is_empty() {
        return Ok((None, body.prompt));
    }
    let mime_type = body.mime_type.or_else(|| encoding::data_url_mime(&body.data_url)).unwrap_or_default();
    let mut media = MediaFile::from_data_url(mime_type, body.data_url);
    media.file_name = body.file_name;
    Ok((Some(media), body.prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::models::Caption;
    use crate::store::MemoryPersistence;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct CannedService(Option<&'static str>);

    #[async_trait]
    impl CaptionService for CannedService {
        async fn caption_from_image(&self, _: &str, _: &str, _: &str) -> Result<String, GenerationError> {
            self.0.map(str::to_string).ok_or(GenerationError { kind: MediaKind::Image })
        }
        async fn caption_from_video(&self, _: &str, _: &str, _: &str) -> Result<String, GenerationError> {
            self.0.map(str::to_string).ok_or(GenerationError { kind: MediaKind::Video })
        }
        async fn caption_from_text(&self, _: &str) -> Result<String, GenerationError> {
            self.0.map(str::to_string).ok_or(GenerationError { kind: MediaKind::Text })
        }
    }

    fn app(reply: Option<&'static str>) -> (Router, AppState) {
        let (store, _) = CaptionStore::load(Box::new(MemoryPersistence::default()));
        let state = AppState::new(Arc::new(CannedService(reply)), store);
        (router(state.clone()), state)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_post(uri: &str, mime_type: &str, file: &[u8], prompt: &str) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\nContent-Disposition: form-data; name=\"prompt\"\r\n\r\n{prompt}\r\n").as_bytes());
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"pic\"\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::post(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn text_generation_is_listed_first() {
        let (app, state) = app(Some("Feeling strong! 💪 #FitnessJourney #workout"));
        state.store.lock().insert_front(Caption::new("older")).unwrap();

        let (status, body) = send(&app, json_post("/api/generate/text", json!({ "text": "Just finished a great workout!" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["caption"]["text"], "Feeling strong! 💪 #FitnessJourney #workout");

        let (_, list) = send(&app, Request::get("/api/captions").body(Body::empty()).unwrap()).await;
        assert_eq!(list["captions"][0]["text"], "Feeling strong! 💪 #FitnessJourney #workout");
        assert_eq!(list["captions"].as_array().unwrap().len(), 2);

        let (_, tab) = send(&app, Request::get("/api/tabs/text").body(Body::empty()).unwrap()).await;
        assert_eq!(tab, json!({ "kind": "text", "isLoading": false, "error": null }));
    }

    #[tokio::test]
    async fn blank_text_is_unprocessable() {
        let (app, _) = app(Some("unused"));
        let (status, body) = send(&app, json_post("/api/generate/text", json!({ "text": "   " }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Please enter some text to generate a caption.");
    }

    #[tokio::test]
    async fn failed_generation_reports_bad_gateway_and_tab_error() {
        let (app, state) = app(None);
        let (status, body) = send(&app, multipart_post("/api/generate/image", "image/png", b"\x89PNG", "funny")).await;

        let message = "Failed to generate caption from the image. Please try again.";
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], message);
        assert!(state.store.lock().is_empty());

        let (_, tab) = send(&app, Request::get("/api/tabs/image").body(Body::empty()).unwrap()).await;
        assert_eq!(tab["error"], message);
        assert_eq!(tab["isLoading"], false);
    }

    #[tokio::test]
    async fn multipart_image_upload_succeeds() {
        let (app, state) = app(Some("Look at this!"));
        let (status, _) = send(&app, multipart_post("/api/generate/image", "image/jpeg", b"jpegbytes", "")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(state.store.lock().captions()[0].text, "Look at this!");
    }

    #[tokio::test]
    async fn data_url_video_with_wrong_type_is_rejected() {
        let (app, _) = app(Some("unused"));
        let req = json_post("/api/generate/video/json", json!({ "dataUrl": "data:video/quicktime;base64,AAAA" }));
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("MP4 or WebM"));
    }

    #[tokio::test]
    async fn malformed_data_url_is_reported_on_the_tab() {
        let (app, _) = app(Some("unused"));
        let req = json_post("/api/generate/image/json", json!({ "dataUrl": "data:image/png;base64,@@@" }));
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Failed to read file as base64 data.");

        let (_, tab) = send(&app, Request::get("/api/tabs/image").body(Body::empty()).unwrap()).await;
        assert_eq!(tab["error"], "Failed to read file as base64 data.");
        assert_eq!(tab["isLoading"], false);
    }

    #[tokio::test]
    async fn missing_file_is_unprocessable() {
        let (app, _) = app(Some("unused"));
        let (status, body) = send(&app, json_post("/api/generate/image/json", json!({ "dataUrl": "" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Please select an image first.");
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let (app, state) = app(Some("x"));
        let keep = Caption::new("keep");
        let drop = Caption::new("drop");
        state.store.lock().insert_front(keep.clone()).unwrap();
        state.store.lock().insert_front(drop.clone()).unwrap();

        let (status, view) = send(&app, Request::delete("/api/captions/not-there").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["captions"].as_array().unwrap().len(), 2);

        let (_, view) = send(&app, Request::delete(format!("/api/captions/{}", drop.id)).body(Body::empty()).unwrap()).await;
        assert_eq!(view["captions"][0]["id"], keep.id.as_str());
        assert_eq!(view["captions"].as_array().unwrap().len(), 1);

        let (_, view) = send(&app, Request::delete("/api/captions").body(Body::empty()).unwrap()).await;
        assert_eq!(view, json!({ "captions": [], "notice": null }));
    }

    #[tokio::test]
    async fn caption_text_is_served_plain() {
        let (app, state) = app(Some("x"));
        let c = Caption::new("copy me #now");
        state.store.lock().insert_front(c.clone()).unwrap();

        let res = app.clone().oneshot(Request::get(format!("/api/captions/{}/text", c.id)).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"copy me #now");

        let (status, _) = send(&app, Request::get("/api/captions/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn index_page_is_served() {
        let (app, _) = app(Some("x"));
        let res = app.oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    }
}
