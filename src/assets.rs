use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use include_dir::{include_dir, Dir};

static STATIC_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

fn content_type(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn serve(path: &str) -> Response {
    match STATIC_DIR.get_file(path) {
        Some(file) => ([(header::CONTENT_TYPE, content_type(path))], file.contents()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn index() -> Response {
    serve("index.html")
}

pub async fn asset(Path(path): Path<String>) -> Response {
    serve(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_front_end_is_present() {
        assert!(STATIC_DIR.get_file("index.html").is_some());
        assert!(STATIC_DIR.get_file("app.js").is_some());
        assert_eq!(content_type("app.js"), "text/javascript; charset=utf-8");
        assert_eq!(serve("missing.txt").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn generate_buttons_start_disabled_until_input() {
        let index = STATIC_DIR.get_file("index.html").and_then(|f| f.contents_utf8()).unwrap();
        assert_eq!(index.matches(r#"<button type="submit" disabled>"#).count(), 3);
        assert!(!index.contains(r#"<button type="submit">"#));

        let script = STATIC_DIR.get_file("app.js").and_then(|f| f.contents_utf8()).unwrap();
        assert!(script.contains("submit.disabled = loading || !hasInput();"));
        assert!(script.contains(".value.trim() !== ''"));
        assert!(script.contains("files.length > 0"));
    }
}
