use anyhow::{Context, Result};
use image::DynamicImage;
use reqwest::Client;
use serde::Serialize;

use crate::ai::{AnalysisBackend, DirectBackend, ProxyBackend};
use crate::codec;
use crate::config::{BackendMode, Config, Credential};
use crate::error::AnalysisError;

/// A successful leaf analysis.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    /// Free-text diagnosis exactly as the remote service returned it.
    pub text: String,
    /// Name of the backend that produced it.
    pub backend: String,
}

/// Outcome of one [`AnalysisClient::analyze`] call.
pub type AnalysisResult = Result<Diagnosis, AnalysisError>;

/// Encodes images and hands them to the configured backend.
///
/// Holds no per-request state: every call to [`analyze`](Self::analyze)
/// encodes its own image and issues exactly one request, so concurrent and
/// sequential calls never see each other's data.
///
/// # Example
///
/// ```rust,no_run
/// use leafcheck::config::Config;
/// use leafcheck::pipeline::AnalysisClient;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load(Some("config.json".as_ref()))?;
/// let client = AnalysisClient::from_config(&config)?;
///
/// let image = image::open("leaf.jpg")?;
/// match client.analyze(&image).await {
///     Ok(diagnosis) => println!("{}", diagnosis.text),
///     Err(e) => eprintln!("{e}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct AnalysisClient {
    backend: Box<dyn AnalysisBackend>,
}

impl AnalysisClient {
    pub fn new(backend: Box<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }

    /// Build the client for `config.backend.mode`, reading the API key once.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(build_backend(config, config.credential())?))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Analyze one leaf image.
    pub async fn analyze(&self, image: &DynamicImage) -> AnalysisResult {
        log::info!(
            "Analyzing {}x{} image via {}",
            image.width(),
            image.height(),
            self.backend.name()
        );

        let encoded = codec::encode(image)?;
        log::debug!("Encoded payload: {} base64 chars", encoded.len());

        match self.backend.analyze(&encoded).await {
            Ok(text) => {
                log::info!("{} succeeded ({} chars)", self.backend.name(), text.len());
                Ok(Diagnosis {
                    text,
                    backend: self.backend.name().to_string(),
                })
            }
            Err(e) => {
                log::warn!("{} failed [{}]: {e}", self.backend.name(), e.kind());
                Err(e)
            }
        }
    }
}

/// Build the backend selected by `config.backend.mode`.
///
/// A missing key in direct mode is not an error here: it is logged, and every
/// analysis then fails with [`AnalysisError::Configuration`] before reaching
/// the network.
pub fn build_backend(
    config: &Config,
    credential: Option<Credential>,
) -> Result<Box<dyn AnalysisBackend>> {
    let client = http_client(config)?;

    let backend: Box<dyn AnalysisBackend> = match config.backend.mode {
        BackendMode::Proxy => {
            // Nothing authenticates us to the proxy; its answers are displayed as untrusted text.
            let proxy = ProxyBackend::with_client(&config.backend.proxy.url, client);
            log::debug!("Proxy endpoint: {}", proxy.url());
            Box::new(proxy)
        }
        BackendMode::Direct => {
            let direct = DirectBackend::with_client(&config.backend.direct, credential, client);
            if !direct.has_credential() {
                log::error!(
                    "Direct mode selected but no API key configured (set {} or backend.direct.api_key)",
                    config.backend.direct.api_key_env
                );
            }
            Box::new(direct)
        }
    };

    log::info!("Analysis backend: {} ({})", backend.name(), config.backend.mode);
    Ok(backend)
}

fn http_client(config: &Config) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.timeout() {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to build HTTP client")
}
