use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level configuration for leafcheck.
///
/// Selects the analysis backend and holds the HTTP and web server settings.
/// Loaded once at startup and treated as read-only afterwards.
///
/// # Loading
///
/// ```rust,no_run
/// use leafcheck::config::{BackendMode, Config};
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.backend.mode = BackendMode::Direct;
/// config.backend.direct.model = "claude-3-5-sonnet-20241022".into();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which remote service analyzes the images.
    pub backend: BackendConfig,
    /// Outbound HTTP settings.
    pub http: HttpConfig,
    /// Upload form server settings.
    pub server: ServerConfig,
}

/// Which analysis backend to use, and the settings of each.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
    pub proxy: ProxyConfig,
    pub direct: DirectConfig,
}

/// The two ways of reaching the analysis model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// POST the image to a proxy that talks to the model.
    #[default]
    Proxy,
    /// Call the vendor messages API directly with an API key.
    Direct,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proxy" => Ok(Self::Proxy),
            "direct" => Ok(Self::Direct),
            other => Err(format!("unknown backend mode `{other}` (expected `proxy` or `direct`)")),
        }
    }
}

/// Proxy backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URL of the proxy; `/analyze_leaf` is appended.
    pub url: String,
}

/// Direct vendor API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectConfig {
    /// Messages endpoint URL.
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    /// API key stored in the config file. Prefer the environment variable.
    pub api_key: String,
    /// Environment variable read for the API key; wins over `api_key`.
    pub api_key_env: String,
}

/// Outbound HTTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds. `0` disables the timeout.
    pub timeout_secs: u64,
}

/// Upload form server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the web form listens on.
    pub bind: String,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
        }
    }
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 1000,
            api_version: "2023-06-01".to_string(),
            api_key: String::new(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// An API key for the direct backend.
///
/// `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a key, rejecting blank values.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() { None } else { Some(Self(key)) }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl Config {
    /// `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe = std::env::current_exe().context("Failed to locate the leafcheck executable")?;
        let dir = exe
            .parent()
            .context("Executable path has no parent directory")?;
        Ok(dir.join("config.json"))
    }

    fn resolve(path: Option<&Path>) -> Result<PathBuf> {
        path.map_or_else(Self::config_path, |p| Ok(p.to_path_buf()))
    }

    /// Load config from `path`, or from [`Config::config_path`].
    ///
    /// A missing file yields the defaults: proxy mode and no stored key.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve(path)?;
        let config = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<Config>(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        if config.backend.mode == BackendMode::Direct {
            let key = if config.credential().is_some() { "found" } else { "missing" };
            log::debug!("Direct mode API key ({}): {key}", config.backend.direct.api_key_env);
        }
        Ok(config)
    }

    /// Write the config as pretty JSON to `path`, or to [`Config::config_path`].
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = Self::resolve(path)?;
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }

    /// Resolve the direct-mode API key from the environment, then the file.
    pub fn credential(&self) -> Option<Credential> {
        self.credential_with(|name| std::env::var(name).ok())
    }

    /// Like [`Config::credential`], but reads variables through `lookup`.
    pub fn credential_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<Credential> {
        let direct = &self.backend.direct;
        if direct.api_key_env.is_empty() {
            return Credential::new(direct.api_key.clone());
        }
        lookup(direct.api_key_env.as_str())
            .and_then(Credential::new)
            .or_else(|| Credential::new(direct.api_key.clone()))
    }

    /// The request timeout, or `None` when disabled.
    pub fn timeout(&self) -> Option<std::time::Duration> {
        match self.http.timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }
}
