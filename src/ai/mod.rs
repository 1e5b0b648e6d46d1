mod direct;
mod proxy;

pub use direct::DirectBackend;
pub use proxy::ProxyBackend;

use reqwest::Response;
use serde_json::Value;

use crate::codec::EncodedImage;
use crate::error::AnalysisError;

/// Trait for remote leaf analysis services.
///
/// The crate ships two implementations: [`ProxyBackend`], which posts the
/// image to a proxy in front of the model, and [`DirectBackend`], which calls
/// the vendor messages API with an API key. Which one runs is chosen by
/// `backend.mode` in the config.
///
/// # Example
///
/// ```rust,no_run
/// use leafcheck::ai::{AnalysisBackend, ProxyBackend};
///
/// # async fn example(image: &image::DynamicImage) -> anyhow::Result<()> {
/// let backend = ProxyBackend::new("http://localhost:5000");
/// let encoded = leafcheck::codec::encode(image)?;
/// let text = backend.analyze(&encoded).await?;
/// println!("{text}");
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// The display name of this backend (e.g. "Proxy", "Anthropic").
    fn name(&self) -> &str;
    /// Send one base64 PNG for analysis and return the diagnosis text.
    ///
    /// Exactly one request is issued per call; failures are not retried.
    async fn analyze(&self, image: &EncodedImage) -> Result<String, AnalysisError>;
}

/// The fixed instruction sent alongside the image in direct mode.
pub fn build_prompt() -> String {
    r#"You are an expert plant pathologist. Analyze this leaf image and provide:

1. Plant species identification
2. Disease or condition identification (say so if the leaf looks healthy)
3. Description of the visible symptoms
4. Probable causes of the condition
5. Recommended treatment and management steps

Answer with a short heading for each of the five points. If the image is too unclear to judge a point, say what is missing instead of guessing."#
        .to_string()
}

/// Read a response body as JSON, mapping HTTP failures to transport errors.
///
/// A non-2xx status becomes [`AnalysisError::Transport`] carrying the status
/// and the service's own error message when the body has one. A 2xx body
/// that is not JSON is a [`AnalysisError::ResponseShape`].
pub(crate) async fn read_json(resp: Response, service: &str) -> Result<Value, AnalysisError> {
    let status = resp.status();
    let text = resp.text().await?;

    log::debug!("{service} responded {status}: {text}");

    if !status.is_success() {
        let detail = error_message(&text).unwrap_or_else(|| snippet(&text));
        return Err(AnalysisError::Transport(format!(
            "{service} returned HTTP {status}: {detail}"
        )));
    }

    serde_json::from_str(&text)
        .map_err(|e| AnalysisError::shape(service, format!("body is not JSON ({e})")))
}

/// Pull an error message out of `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("message")?.as_str().map(String::from),
        _ => None,
    }
}

fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    let text = text.trim();
    if text.is_empty() {
        return "(empty body)".to_string();
    }
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
