//! HTTP surface
//!
//! Endpoints:
//! - `POST /cutout`, `POST /api/cutout`: multipart `file` (required), `mode`
//!   (`precise` by default) and `edge_smoothing` (false by default). Replies
//!   with PNG bytes or `{"error": "..."}`.
//! - `GET /health`, `GET /api/health`: `{"status": "ok"}`.

use crate::config::ServerConfig;
use crate::context::AppContext;
use crate::error::CutoutError;
use crate::tracing_config::spans;
use crate::types::CutoutOutput;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Error response carrying `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CutoutError> for ApiError {
    fn from(error: CutoutError) -> Self {
        let status = if error.is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, error.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self::new(error.status(), format!("Malformed multipart body: {}", error.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Fields of one cutout form
#[derive(Debug, Default)]
struct CutoutForm {
    file: Option<Vec<u8>>,
    mode: Option<String>,
    edge_smoothing: Option<String>,
}

impl CutoutForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => form.file = Some(field.bytes().await?.to_vec()),
                "mode" => form.mode = Some(field.text().await?),
                "edge_smoothing" => form.edge_smoothing = Some(field.text().await?),
                _ => {},
            }
        }
        Ok(form)
    }
}

/// Parse a form boolean the way HTML forms and HTTP clients send them
///
/// Accepts the same spellings as pydantic, including the one-letter forms.
#[must_use]
pub fn parse_form_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Build the application router
pub fn router(context: AppContext, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/cutout", post(cutout))
        .route("/api/cutout", post(cutout))
        .with_state(context)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn cutout(
    State(context): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let form = CutoutForm::read(multipart).await?;

    let Some(bytes) = form.file else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Missing required form field 'file'",
        ));
    };

    let mode = context.resolve_mode(form.mode.as_deref())?;
    let edge_smoothing = match form.edge_smoothing.as_deref() {
        None => false,
        Some(raw) => parse_form_bool(raw).ok_or_else(|| {
            ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Invalid edge_smoothing value '{raw}' (expected a boolean)"),
            )
        })?,
    };

    let span = spans::request(&request_id, mode.as_str(), edge_smoothing);
    async move {
        info!(bytes = bytes.len(), "Processing upload");
        match context.cutout(bytes, mode, edge_smoothing).await {
            Ok(output) => {
                info!(
                    width = output.dimensions.0,
                    height = output.dimensions.1,
                    bytes = output.png.len(),
                    "Cutout complete"
                );
                Ok(png_response(output, &request_id))
            },
            Err(e) => {
                if e.is_client_error() {
                    warn!(error = %e, "Cutout rejected");
                } else {
                    error!(error = %e, "Cutout failed");
                }
                Err(ApiError::from(e))
            },
        }
    }
    .instrument(span)
    .await
}

fn png_response(output: CutoutOutput, request_id: &str) -> Response {
    let mut response = (
        [(header::CONTENT_TYPE, CutoutOutput::CONTENT_TYPE)],
        output.png,
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Bind and serve until Ctrl-C or SIGTERM
///
/// # Errors
/// - Invalid bind address
/// - Listener or server I/O failures
pub async fn serve(config: &ServerConfig, context: AppContext) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let app = router(context.clone(), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    info!(available = ?context.available(), mode_fallback = context.mode_fallback(), "Endpoints:");
    info!("  GET  /health  - Health check");
    info!("  POST /cutout  - Remove background (multipart/form-data)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackend;
    use crate::fast::{FastRemover, U2NetRemover};
    use crate::processor::PreciseProcessor;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "cutout-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a [u8]),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                },
                Part::File(name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                },
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn request(path: &str, parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([255, 0, 0])))
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn app(with_fast: bool, mode_fallback: bool) -> Router {
        let precise = Arc::new(PreciseProcessor::new(Arc::new(MockBackend::four_axis(32, 32))));
        let fast = with_fast.then(|| {
            let backend = MockBackend::four_axis(32, 32).with_input_size(320, 320);
            Arc::new(U2NetRemover::new(Arc::new(backend))) as Arc<dyn FastRemover>
        });
        let context = AppContext::new(Some(precise), fast, mode_fallback).unwrap();
        router(context, 1024 * 1024)
    }

    async fn error_message(response: Response) -> String {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        value["error"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_parse_form_bool() {
        for raw in ["true", "TRUE", "t", "1", "yes", "Y", " on "] {
            assert_eq!(parse_form_bool(raw), Some(true), "{raw}");
        }
        for raw in ["false", "F", "0", "No", "n", "off"] {
            assert_eq!(parse_form_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_form_bool("maybe"), None);
        assert_eq!(parse_form_bool("tr"), None);
        assert_eq!(parse_form_bool(""), None);
    }

    #[tokio::test]
    async fn test_health() {
        for path in ["/health", "/api/health"] {
            let response = app(true, false)
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], br#"{"status":"ok"}"#);
        }
    }

    #[tokio::test]
    async fn test_cutout_returns_png() {
        let input = png(100, 200);
        let response = app(true, false)
            .oneshot(request("/cutout", &[Part::File("file", &input)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let decoded = image::load_from_memory(&body).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (100, 200));
    }

    #[tokio::test]
    async fn test_fast_mode_with_matting() {
        let input = png(40, 30);
        let response = app(true, false)
            .oneshot(request(
                "/api/cutout",
                &[
                    Part::Text("mode", "fast"),
                    Part::Text("edge_smoothing", "true"),
                    Part::File("file", &input),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let response = app(true, false)
            .oneshot(request("/cutout", &[Part::Text("mode", "precise")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(error_message(response).await.contains("file"));
    }

    #[tokio::test]
    async fn test_unknown_mode() {
        let input = png(8, 8);
        let parts = [Part::Text("mode", "turbo"), Part::File("file", &input)];

        let response = app(true, false).oneshot(request("/cutout", &parts)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error_message(response).await.contains("turbo"));

        let response = app(true, true).oneshot(request("/cutout", &parts)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_smoothing_flag() {
        let input = png(8, 8);
        let response = app(true, false)
            .oneshot(request(
                "/cutout",
                &[Part::Text("edge_smoothing", "sometimes"), Part::File("file", &input)],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_pipeline_failures_are_server_errors() {
        let response = app(true, false)
            .oneshot(request("/cutout", &[Part::File("file", b"not an image")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error_message(response).await.starts_with("Decode error"));

        let input = png(8, 8);
        let response = app(false, false)
            .oneshot(request(
                "/cutout",
                &[Part::Text("mode", "fast"), Part::File("file", &input)],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error_message(response).await.contains("not available"));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let precise = Arc::new(PreciseProcessor::new(Arc::new(MockBackend::four_axis(8, 8))));
        let context = AppContext::new(Some(precise), None, false).unwrap();
        let big = vec![0u8; 4096];
        let response = router(context, 1024)
            .oneshot(request("/cutout", &[Part::File("file", &big)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
