use crate::agent::DEFAULT_FALLBACK_REPLY;
use crate::providers::{
    CompletionOptions, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};
use crate::sessions::DEFAULT_HISTORY_CAPACITY;
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level Campinova configuration, loaded from `config.toml`.
///
/// Resolution order: `CAMPINOVA_CONFIG_DIR` env → `~/.campinova/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the completion service. Prefer `CAMPINOVA_API_KEY` / `NVIDIA_API_KEY`
    /// over storing it here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override for the provider API (e.g. "http://10.0.0.1:8000/v1").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Provider ID (`"nvidia"`, `"openai"`, or `"custom:<URL>"`). Default: `"nvidia"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier sent with every completion request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature (0.0–2.0). Default: `0.6`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Nucleus sampling mass (0.0–1.0]. Default: `0.7`.
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Upper bound on generated tokens. Default: `4096`.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Timeout for one outbound completion request. Default: `120`.
    #[serde(default = "default_provider_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Reply used when the completion service returns no choices.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Gateway server configuration: host, port, CORS, limits (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Session memory configuration (`[session]`).
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_provider() -> String {
    "nvidia".into()
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_top_p() -> f64 {
    DEFAULT_TOP_P
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_provider_timeout_secs() -> u64 {
    120
}

fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.into()
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayConfig {
    /// Gateway port (default: 5174)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 0.0.0.0, all interfaces)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Answer cross-origin requests from any origin (default: true)
    #[serde(default = "default_true")]
    pub cors: bool,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Overall time budget for one inbound request, including the upstream call.
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gateway_port() -> u16 {
    5174
}

fn default_gateway_host() -> String {
    "0.0.0.0".into()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_gateway_timeout_secs() -> u64 {
    180
}

fn default_true() -> bool {
    true
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            cors: true,
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

// ── Sessions ─────────────────────────────────────────────────────

/// Session memory configuration (`[session]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionConfig {
    /// Turns retained per session, oldest evicted first. Default: `10`.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Session id used when a request carries no `X-Session-ID` header.
    #[serde(default = "default_session_id")]
    pub default_session_id: String,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_session_id() -> String {
    "default".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            default_session_id: default_session_id(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".campinova").join(CONFIG_FILE_NAME),
            api_key: None,
            api_url: None,
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_provider_timeout_secs(),
            fallback_reply: default_fallback_reply(),
            gateway: GatewayConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CAMPINOVA_CONFIG_DIR") {
        let dir = dir.trim();
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".campinova"))
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = default_config_dir()?;
        Self::load_or_init_in(&config_dir).await
    }

    /// Load `config.toml` from `config_dir`, writing defaults there first if
    /// the file does not exist yet.
    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on newly created config file (may later hold an API key)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            config
        } else {
            // Warn if config file is world-readable (may contain API keys)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.gateway.max_body_bytes == 0 {
            anyhow::bail!("gateway.max_body_bytes must be greater than 0");
        }
        if self.gateway.request_timeout_secs == 0 {
            anyhow::bail!("gateway.request_timeout_secs must be greater than 0");
        }

        if self.session.history_capacity == 0 {
            anyhow::bail!("session.history_capacity must be at least 1");
        }
        if self.session.default_session_id.is_empty() {
            anyhow::bail!("session.default_session_id must not be empty");
        }

        if self.provider.trim().is_empty() {
            anyhow::bail!("provider must not be empty");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("temperature must be between 0.0 and 2.0");
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            anyhow::bail!("top_p must be in (0.0, 1.0]");
        }
        if self.max_tokens == 0 {
            anyhow::bail!("max_tokens must be greater than 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source. First non-empty
    /// candidate wins for each setting.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| first_non_empty(&lookup, keys);

        // API key: CAMPINOVA_API_KEY or API_KEY (generic). Vendor variables
        // such as NVIDIA_API_KEY are resolved per provider, not here.
        if let Some(key) = first(&["CAMPINOVA_API_KEY", "API_KEY"]) {
            self.api_key = Some(key);
        }

        if let Some(url) = first(&["CAMPINOVA_API_URL"]) {
            self.api_url = Some(url);
        }

        if let Some(provider) = first(&["CAMPINOVA_PROVIDER"]) {
            self.provider = provider;
        }

        if let Some(model) = first(&["CAMPINOVA_MODEL"]) {
            self.model = model;
        }

        // Gateway port: CAMPINOVA_GATEWAY_PORT or PORT
        if let Some(port_str) = first(&["CAMPINOVA_GATEWAY_PORT", "PORT"]) {
            match port_str.parse::<u16>() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port_str, "Ignoring invalid gateway port override"),
            }
        }

        // Gateway host: CAMPINOVA_GATEWAY_HOST or HOST
        if let Some(host) = first(&["CAMPINOVA_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }

        if let Some(temp_str) = first(&["CAMPINOVA_TEMPERATURE"]) {
            if let Ok(temp) = temp_str.parse::<f64>() {
                if (0.0..=2.0).contains(&temp) {
                    self.temperature = temp;
                }
            }
        }
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await
    }
}

fn first_non_empty<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
