//! HTTP service: upload a scanned score, get it back with chord symbols.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::job::{build_score_from_pdf, JobSettings};

/// Name the browser saves the annotated score under.
pub const DOWNLOAD_NAME: &str = "partitura_com_cifras.pdf";

/// Scanned scores are a few MB; leave headroom for long ones.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<JobSettings>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: JobSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/annotate", post(annotate))
        .route("/download/{token}", get(download))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct AnnotateResponse {
    #[serde(rename = "downloadUrl")]
    download_url: String,
    key: Option<String>,
    measures: usize,
    uncertain_measures: usize,
}

async fn serve_index() -> Html<&'static str> {
    Html(UPLOAD_HTML)
}

async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "renderer": state.settings.renderer.is_some(),
    }))
}

/// `POST /api/annotate` with a multipart `score` field holding a PDF.
async fn annotate(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let upload = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("score") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => break Some((file_name, bytes)),
                    Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break None,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
        }
    };

    let Some((file_name, bytes)) = upload else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Upload a PDF file using the 'score' field.",
        );
    };
    if file_name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No file selected.");
    }
    if !file_name.to_ascii_lowercase().ends_with(".pdf") {
        return error_response(StatusCode::BAD_REQUEST, "Only PDF files are accepted.");
    }

    info!(file = %file_name, bytes = bytes.len(), "processing upload");
    match build_score_from_pdf(&bytes, &state.settings, None).await {
        Ok(output) => Json(AnnotateResponse {
            download_url: format!("/download/{}", output.token),
            key: output.summary.key,
            measures: output.summary.measures,
            uncertain_measures: output.summary.uncertain_measures,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, file = %file_name, "processing failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Tokens are uuid v4 in simple form.
fn is_valid_token(token: &str) -> bool {
    token.len() == 32 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

async fn download(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    if !is_valid_token(&token) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = state.settings.output_pdf(&token);
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!(error = %e, path = %path.display(), "failed to open output");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{DOWNLOAD_NAME}\""),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| {
            error!("Failed to build response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
        .unwrap_or_else(|status| status.into_response())
}

/// Bind and serve until SIGINT or SIGTERM.
pub async fn run(settings: JobSettings, addr: &str) -> Result<()> {
    info!(output_dir = %settings.output_dir.display(), "cifrador starting");

    let app = router(AppState::new(settings));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("listening on http://{}", addr);
    info!("   Upload: POST http://{}/api/annotate", addr);
    info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

const UPLOAD_HTML: &str = r##"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Cifrador</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 40rem; margin: 3rem auto; padding: 0 1rem; color: #222; }
  h1 { font-weight: 600; }
  form { display: flex; gap: .75rem; align-items: center; margin: 1.5rem 0; }
  button { padding: .5rem 1rem; }
  #status { white-space: pre-wrap; }
  .error { color: #b00020; }
</style>
</head>
<body>
<h1>Cifrador</h1>
<p>Send a PDF score. It comes back with a chord symbol over every measure.</p>
<form id="upload">
  <input type="file" name="score" accept="application/pdf,.pdf" required>
  <button type="submit">Annotate</button>
</form>
<div id="status"></div>
<script>
const form = document.getElementById("upload");
const status = document.getElementById("status");
form.addEventListener("submit", async (event) => {
  event.preventDefault();
  status.className = "";
  status.textContent = "Recognizing and harmonizing, this can take a few minutes...";
  try {
    const response = await fetch("/api/annotate", { method: "POST", body: new FormData(form) });
    const body = await response.json();
    if (!response.ok) {
      status.className = "error";
      status.textContent = body.error || "Processing failed.";
      return;
    }
    status.innerHTML = "";
    const summary = document.createElement("p");
    summary.textContent = `Key: ${body.key ?? "unknown"}. Measures: ${body.measures}, uncertain: ${body.uncertain_measures}.`;
    const link = document.createElement("a");
    link.href = body.downloadUrl;
    link.textContent = "Download annotated PDF";
    status.append(summary, link);
  } catch (err) {
    status.className = "error";
    status.textContent = String(err);
  }
});
</script>
</body>
</html>
"##;
