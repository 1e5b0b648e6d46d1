use std::error::Error as _;

use thiserror::Error;

/// Why a single leaf analysis did not produce a diagnosis.
///
/// Every variant ends the in-flight operation; there is never a partial
/// result and nothing is retried. The UI shells show the [`Display`] text
/// to the user and leave the uploaded image in place.
///
/// [`Display`]: std::fmt::Display
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required setting (the API key for direct mode) is missing.
    /// Raised before any network traffic.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection failure, timeout, or a non-2xx HTTP status.
    #[error("Network error: {0}")]
    Transport(String),

    /// The remote service answered with an explicit error message.
    #[error("Analysis error: {0}")]
    RemoteReported(String),

    /// A 2xx response whose body lacks the expected success fields.
    #[error("Unexpected response from {service}: {detail}")]
    ResponseShape { service: String, detail: String },

    /// The image could not be serialized as PNG.
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    /// The uploaded file is not a JPEG or PNG image.
    #[error("Unsupported upload: {0}")]
    UnsupportedUpload(String),
}

impl AnalysisError {
    /// Stable label for logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Transport(_) => "transport",
            Self::RemoteReported(_) => "remote_reported",
            Self::ResponseShape { .. } => "response_shape",
            Self::Encode(_) => "encode",
            Self::UnsupportedUpload(_) => "unsupported_upload",
        }
    }

    pub(crate) fn shape(service: &str, detail: impl Into<String>) -> Self {
        Self::ResponseShape {
            service: service.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest's Display hides the root cause (e.g. "connection refused")
        let mut message = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Transport(message)
    }
}
