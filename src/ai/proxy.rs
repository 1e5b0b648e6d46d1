use reqwest::Client;
use serde_json::{Value, json};

use super::{AnalysisBackend, read_json};
use crate::codec::EncodedImage;
use crate::error::AnalysisError;

const NAME: &str = "Proxy";

/// Posts the image to a proxy's `/analyze_leaf` endpoint.
///
/// No credential is sent. The proxy's reply is treated as untrusted text.
pub struct ProxyBackend {
    url: String,
    client: Client,
}

impl ProxyBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: &str, client: Client) -> Self {
        let base = base_url.trim_end_matches('/');
        let url = if base.ends_with("/analyze_leaf") {
            base.to_string()
        } else {
            format!("{base}/analyze_leaf")
        };
        Self { url, client }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl AnalysisBackend for ProxyBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn analyze(&self, image: &EncodedImage) -> Result<String, AnalysisError> {
        let body = json!({ "image": image.as_str() });

        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json = read_json(resp, NAME).await?;
        parse_proxy_response(&json)
    }
}

/// Map `{"analysis": ..}` / `{"error": ..}` to a result.
fn parse_proxy_response(json: &Value) -> Result<String, AnalysisError> {
    if let Some(analysis) = json.get("analysis") {
        return analysis
            .as_str()
            .map(String::from)
            .ok_or_else(|| AnalysisError::shape(NAME, "`analysis` is not text"));
    }

    match json.get("error") {
        Some(Value::String(message)) => Err(AnalysisError::RemoteReported(message.clone())),
        Some(Value::Null) | None => Err(AnalysisError::shape(
            NAME,
            "no `analysis` or `error` field",
        )),
        Some(other) => Err(AnalysisError::RemoteReported(other.to_string())),
    }
}
