//! Upload form served over HTTP.
//!
//! `GET /` shows the form, `POST /analyze` runs one analysis for the uploaded
//! file and renders the result next to the image. The uploaded bytes live only
//! for the duration of that request; the result page embeds them again so the
//! user can re-trigger analysis without uploading twice.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use pulldown_cmark::{Event, Options, Parser, Tag, html};
use tokio::net::TcpListener;

use crate::codec;
use crate::config::Config;
use crate::error::AnalysisError;
use crate::pipeline::{AnalysisClient, AnalysisResult};

/// Multipart boundaries, headers and the other form fields.
const FORM_OVERHEAD: usize = 64 * 1024;

/// Shared by all requests; read-only.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<AnalysisClient>,
    /// Largest accepted image file, in decoded bytes.
    pub max_upload_bytes: usize,
}

/// Build the web form router.
///
/// `max_upload_bytes` bounds the image file itself. The request body may be
/// larger, since "Analyze again" posts the same file back as base64.
pub fn router(client: Arc<AnalysisClient>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze))
        .route("/health", get(|| async { "OK" }))
        .layer(DefaultBodyLimit::max(body_limit(max_upload_bytes)))
        .with_state(AppState {
            client,
            max_upload_bytes,
        })
}

fn body_limit(max_upload_bytes: usize) -> usize {
    (max_upload_bytes / 3 + 1)
        .saturating_mul(4)
        .saturating_add(FORM_OVERHEAD)
}

/// Bind `config.server.bind` and serve until the process exits.
pub async fn serve(config: &Config, client: Arc<AnalysisClient>) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address `{}`", config.server.bind))?;

    let app = router(client, config.server.max_upload_bytes);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    log::info!("Leaf Disease Identifier listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn index() -> Html<String> {
    Html(page(&upload_form()))
}

async fn analyze(State(state): State<AppState>, multipart: Multipart) -> (StatusCode, Html<String>) {
    let upload = match read_upload(multipart, state.max_upload_bytes).await {
        Ok(bytes) => bytes,
        Err((status, message)) => return rejected(status, &message),
    };

    let decoded = {
        let bytes = upload.clone();
        tokio::task::spawn_blocking(move || codec::decode_upload(&bytes)).await
    };
    let image = match decoded {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => return rejected(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => return rejected(StatusCode::BAD_REQUEST, &format!("Failed to decode upload: {e}")),
    };

    let result = state.client.analyze(&image).await;
    drop(image);

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    (status, Html(page(&result_view(&upload, &result))))
}

fn rejected(status: StatusCode, message: &str) -> (StatusCode, Html<String>) {
    let body = format!(r#"<div class="error">{}</div>{}"#, escape(message), upload_form());
    (status, Html(page(&body)))
}

fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::Transport(_)
        | AnalysisError::RemoteReported(_)
        | AnalysisError::ResponseShape { .. } => StatusCode::BAD_GATEWAY,
        AnalysisError::UnsupportedUpload(_) => StatusCode::BAD_REQUEST,
        AnalysisError::Configuration(_) | AnalysisError::Encode(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

type Rejection = (StatusCode, String);

/// Take the file from the `image` field, or the base64 `image_data` field
/// posted back by the "Analyze again" button.
async fn read_upload(mut multipart: Multipart, limit: usize) -> Result<Vec<u8>, Rejection> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| form_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let bytes = field.bytes().await.map_err(|e| form_error(e, limit))?;
                if !bytes.is_empty() {
                    return within_limit(bytes.to_vec(), limit);
                }
            }
            "image_data" => {
                let text = field.text().await.map_err(|e| form_error(e, limit))?;
                if !text.trim().is_empty() {
                    let bytes = STANDARD.decode(text.trim()).map_err(|_| {
                        (
                            StatusCode::BAD_REQUEST,
                            "Previous upload could not be restored, please upload again".to_string(),
                        )
                    })?;
                    return within_limit(bytes, limit);
                }
            }
            _ => {}
        }
    }
    Err((
        StatusCode::BAD_REQUEST,
        "Please choose a leaf image to upload".to_string(),
    ))
}

fn within_limit(bytes: Vec<u8>, limit: usize) -> Result<Vec<u8>, Rejection> {
    if bytes.len() > limit {
        log::warn!("Rejected {} byte upload (limit {limit})", bytes.len());
        return Err(too_large(limit));
    }
    Ok(bytes)
}

fn form_error(err: MultipartError, limit: usize) -> Rejection {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(limit)
    } else {
        (StatusCode::BAD_REQUEST, format!("Invalid form data: {err}"))
    }
}

fn too_large(limit: usize) -> Rejection {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("File too large, images up to {} are accepted", human_size(limit)),
    )
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else {
        format!("{} KiB", bytes.div_ceil(1024))
    }
}

// ── HTML ─────────────────────────────────────────────────────────────

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 760px; margin: 0 auto; padding: 24px; color: #1f2a1f; }
.main-title { font-size: 36px; color: #2C5F2D; text-align: center; margin-bottom: 20px; }
.subtitle { font-size: 18px; color: #4A6741; text-align: center; margin-bottom: 30px; }
button { background-color: #2C5F2D; color: white; width: 100%; border: none; padding: 10px; border-radius: 5px; font-size: 16px; cursor: pointer; }
button:hover { background-color: #4A6741; }
button:disabled { background-color: #8aa08a; cursor: wait; }
figure { margin: 0 0 20px; text-align: center; }
figure img { max-width: 100%; border-radius: 5px; }
figcaption { color: #4A6741; font-size: 14px; }
.busy { display: none; text-align: center; margin: 12px 0; color: #4A6741; }
.success { background: #e3f2e1; border-radius: 5px; padding: 10px; margin: 16px 0; }
.error { background: #fbe4e4; color: #8a1f1f; border-radius: 5px; padding: 10px; margin: 16px 0; }
.analysis { line-height: 1.5; }
form { margin: 16px 0; }
input[type=file] { display: block; margin: 12px 0; }
"#;

const SUBMIT_SCRIPT: &str = r#"
document.querySelectorAll('form.analyze').forEach(function (form) {
  form.addEventListener('submit', function () {
    form.querySelector('button').disabled = true;
    form.querySelector('.busy').style.display = 'block';
  });
});
"#;

fn page(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Leaf Disease Identifier</title>
<style>{STYLE}</style>
</head>
<body>
<h1 class="main-title">🍃 Leaf Disease Identifier</h1>
<p class="subtitle">Upload a leaf image and get instant disease analysis</p>
{body}
<script>{SUBMIT_SCRIPT}</script>
</body>
</html>
"#
    )
}

fn upload_form() -> String {
    r#"<form class="analyze" method="post" action="/analyze" enctype="multipart/form-data">
<label for="image">Upload a leaf image</label>
<input id="image" type="file" name="image" accept="image/png,image/jpeg" required
       title="Upload a clear image of a leaf for disease analysis">
<button type="submit">Analyze Leaf Disease</button>
<div class="busy">Analyzing image... This might take a moment</div>
</form>"#
        .to_string()
}

/// Form that re-submits the same upload, already base64-encoded.
fn retry_form(encoded: &str) -> String {
    format!(
        r#"<form class="analyze" method="post" action="/analyze" enctype="multipart/form-data">
<input type="hidden" name="image_data" value="{}">
<button type="submit">Analyze Again</button>
<div class="busy">Analyzing image... This might take a moment</div>
</form>"#,
        encoded
    )
}

fn preview(upload: &[u8], encoded: &str) -> String {
    let mime = match image::guess_format(upload) {
        Ok(ImageFormat::Png) => "image/png",
        _ => "image/jpeg",
    };
    format!(
        r#"<figure><img src="data:{mime};base64,{}" alt="Uploaded leaf image"><figcaption>Uploaded Leaf Image</figcaption></figure>"#,
        encoded
    )
}

fn result_view(upload: &[u8], result: &AnalysisResult) -> String {
    // The page carries the file twice, in the preview and in the retry form,
    // so "Analyze again" works without script support.
    let encoded = STANDARD.encode(upload);
    let mut body = preview(upload, &encoded);
    match result {
        Ok(diagnosis) => {
            body.push_str(r#"<div class="success">Analysis Complete!</div>"#);
            body.push_str("<h3>🔬 Leaf Disease Analysis</h3>");
            body.push_str(&format!(
                r#"<div class="analysis">{}</div>"#,
                render_markdown(&diagnosis.text)
            ));
        }
        Err(e) => {
            body.push_str(&format!(
                r#"<div class="error">{}<br>Failed to analyze the image. Please try again.</div>"#,
                escape(&e.to_string())
            ));
        }
    }
    body.push_str(&retry_form(&encoded));
    body.push_str(r#"<p><a href="/">Upload a different image</a></p>"#);
    body
}

/// Render diagnosis markdown. Raw HTML is shown as text and links are
/// flattened to their label.
fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let events = Parser::new_ext(text, options).filter_map(|event| match event {
        Event::Html(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Link(..) | Tag::Image(..)) | Event::End(Tag::Link(..) | Tag::Image(..)) => {
            None
        }
        other => Some(other),
    });

    let mut out = String::with_capacity(text.len() * 2);
    html::push_html(&mut out, events);
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    html::push_html(&mut out, std::iter::once(Event::Text(text.into())));
    out
}
