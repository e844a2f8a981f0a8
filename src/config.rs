//! Configuration loading for the `slipstream` CLI.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `./slipstream.toml`
//! 3. `~/.slipstream/config.toml`
//! 4. built-in defaults
//!
//! Secrets are loaded separately:
//! 1. `~/.slipstream/secrets.toml` (must be 0600 or 0400)
//! 2. `MARTIAN_API_KEY` / `OPENROUTER_API_KEY` environment variables

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheConfig, DEFAULT_CACHE_DIR};
use crate::dispatch::DEFAULT_WORKERS;
use crate::providers::martian::{MARTIAN_API_KEY_ENV, MARTIAN_BASE_URL};
use crate::providers::openrouter::{
    DEFAULT_APP_NAME, DEFAULT_REFERER, OPENROUTER_API_KEY_ENV, OPENROUTER_BASE_URL,
};
use crate::providers::{Backoff, MartianClient, OpenRouterClient, OpenRouterOptions, RetryConfig};
use crate::traits::LlmClient;
use crate::{Result, SlipstreamError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// In-memory front capacity; 0 disables it.
    #[serde(default = "default_memory_entries")]
    pub memory_entries: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            memory_entries: default_memory_entries(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_memory_entries() -> u64 {
    CacheConfig::default().memory_entries
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Client for descriptors without a `provider` field.
    #[serde(default = "default_provider")]
    pub default_provider: String,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            default_provider: default_provider(),
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_provider() -> String {
    "martian".to_string()
}

/// Retry policy, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff: Backoff::default(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub martian: Option<ProviderConfig>,
    #[serde(default)]
    pub openrouter: Option<ProviderConfig>,
}

/// Per-provider endpoint settings. Unset fields use the provider default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    /// OpenRouter `HTTP-Referer` header.
    #[serde(default)]
    pub referer: Option<String>,
    /// OpenRouter `X-Title` header.
    #[serde(default)]
    pub app_name: Option<String>,
}

/// Secrets (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub martian: Option<ApiKeySecret>,
    #[serde(default)]
    pub openrouter: Option<ApiKeySecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("martian", MARTIAN_API_KEY_ENV),
    ("openrouter", OPENROUTER_API_KEY_ENV),
];

impl Config {
    /// Load configuration from the standard locations, or defaults when
    /// none exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SlipstreamError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            SlipstreamError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(SlipstreamError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        let local = PathBuf::from("slipstream.toml");
        if local.exists() {
            return Ok(Some(local));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".slipstream").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        Ok(None)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(&self.cache.dir).memory_entries(self.cache.memory_entries)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.retry.max_attempts)
            .base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .backoff(self.retry.backoff)
            .multiplier(self.retry.multiplier)
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    /// OpenRouter settings: config file, then `OPENROUTER_REFERER` /
    /// `OPENROUTER_APP_NAME`, then defaults.
    pub fn openrouter_options(&self) -> OpenRouterOptions {
        let section = self.providers.openrouter.clone().unwrap_or_default();
        OpenRouterOptions {
            base_url: section
                .base_url
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
            referer: section
                .referer
                .or_else(|| std::env::var("OPENROUTER_REFERER").ok())
                .unwrap_or_else(|| DEFAULT_REFERER.to_string()),
            app_name: section
                .app_name
                .or_else(|| std::env::var("OPENROUTER_APP_NAME").ok())
                .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            timeout: self.request_timeout(),
        }
    }

    pub fn martian_base_url(&self) -> String {
        self.providers
            .martian
            .as_ref()
            .and_then(|m| m.base_url.clone())
            .unwrap_or_else(|| MARTIAN_BASE_URL.to_string())
    }

    /// Build a client for every provider that has an API key.
    pub fn build_clients(&self, secrets: &Secrets) -> Result<Vec<Arc<dyn LlmClient>>> {
        let mut clients: Vec<Arc<dyn LlmClient>> = Vec::new();
        if let Some(key) = secrets.api_key("martian") {
            let client =
                MartianClient::with_base_url(key, &self.martian_base_url(), self.request_timeout())?;
            clients.push(Arc::new(client));
        }
        if let Some(key) = secrets.api_key("openrouter") {
            let client = OpenRouterClient::with_options(key, &self.openrouter_options())?;
            clients.push(Arc::new(client));
        }
        Ok(clients)
    }
}

impl Secrets {
    /// Load `~/.slipstream/secrets.toml` if present.
    ///
    /// Returns empty secrets when there is no file (keys may come from the
    /// environment).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".slipstream").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }
        Ok(Secrets::default())
    }

    /// Load a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            SlipstreamError::Configuration(format!("failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            SlipstreamError::Configuration(format!("failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Reject files readable by group or others.
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            SlipstreamError::Configuration(format!("failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(SlipstreamError::Configuration(format!(
                "secrets file {path:?} has insecure permissions {:o}, must be 0600 or 0400",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a provider, falling back to its environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "martian" => self.martian.as_ref(),
            "openrouter" => self.openrouter.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
                .filter(|key| !key.is_empty())
        })
    }
}
