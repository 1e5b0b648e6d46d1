use reqwest::Client;
use serde_json::{Value, json};

use super::{AnalysisBackend, build_prompt, read_json};
use crate::codec::{EncodedImage, PNG_MIME};
use crate::config::{Credential, DirectConfig};
use crate::error::AnalysisError;

const NAME: &str = "Anthropic";

/// Calls the vendor messages API directly.
///
/// The key is checked before anything is sent: without one, every call fails
/// with [`AnalysisError::Configuration`] and no request leaves the process.
pub struct DirectBackend {
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_version: String,
    api_key_env: String,
    credential: Option<Credential>,
    client: Client,
}

impl DirectBackend {
    pub fn new(config: &DirectConfig, credential: Option<Credential>) -> Self {
        Self::with_client(config, credential, Client::new())
    }

    pub fn with_client(config: &DirectConfig, credential: Option<Credential>, client: Client) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_version: config.api_version.clone(),
            api_key_env: config.api_key_env.clone(),
            credential,
            client,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    fn request_body(&self, image: &EncodedImage) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": PNG_MIME,
                                "data": image.as_str()
                            }
                        },
                        {
                            "type": "text",
                            "text": build_prompt()
                        }
                    ]
                }
            ]
        })
    }
}

#[async_trait::async_trait]
impl AnalysisBackend for DirectBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn analyze(&self, image: &EncodedImage) -> Result<String, AnalysisError> {
        let Some(credential) = &self.credential else {
            let source = if self.api_key_env.is_empty() {
                "`backend.direct.api_key`".to_string()
            } else {
                format!("the {} environment variable or `backend.direct.api_key`", self.api_key_env)
            };
            return Err(AnalysisError::Configuration(format!(
                "direct mode needs an API key; set {source}"
            )));
        };

        let body = self.request_body(image);

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("anthropic-version", &self.api_version)
            .header("x-api-key", credential.expose())
            .json(&body)
            .send()
            .await?;

        let json = read_json(resp, NAME).await?;
        parse_direct_response(&json)
    }
}

/// Extract the text of the first content block.
fn parse_direct_response(json: &Value) -> Result<String, AnalysisError> {
    if json["type"] == "error" {
        let message = json["error"]["message"]
            .as_str()
            .unwrap_or("unspecified error")
            .to_string();
        return Err(AnalysisError::RemoteReported(message));
    }

    json["content"][0]["text"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| AnalysisError::shape(NAME, "no text in the first content block"))
}
