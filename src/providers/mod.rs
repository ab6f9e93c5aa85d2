//! Provider subsystem for chat-completion backends.
//!
//! Every supported backend speaks the OpenAI-compatible chat completions API,
//! so the factory [`create_provider`] only decides base URL and credential
//! lookup before handing off to [`compatible::OpenAiCompatibleProvider`].

pub mod compatible;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use traits::{
    CompletionOptions, Provider, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    DEFAULT_TOP_P,
};

use std::time::Duration;

const MAX_API_ERROR_CHARS: usize = 200;

pub const NVIDIA_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts tokens with prefixes like `nvapi-`, `sk-`, and `Bearer `.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 3] = ["nvapi-", "sk-", "Bearer "];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Resolve API key for a provider from config and environment variables.
fn resolve_provider_credential(name: &str, credential_override: Option<&str>) -> Option<String> {
    resolve_credential_from(name, credential_override, |key| std::env::var(key).ok())
}

/// Explicit value first, then the provider's own variable, then the generic ones.
/// A vendor variable is never used for a different provider.
fn resolve_credential_from<F>(
    name: &str,
    credential_override: Option<&str>,
    lookup: F,
) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let provider_env_candidates: &[&str] = match name {
        "nvidia" => &["NVIDIA_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        _ => &[],
    };

    for env_var in provider_env_candidates
        .iter()
        .chain(["CAMPINOVA_API_KEY", "API_KEY"].iter())
    {
        if let Some(value) = lookup(*env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Factory: create the provider named in config.
///
/// `name` is `nvidia`, `openai`, or `custom:<URL>`. `api_url` overrides the
/// provider's default base URL.
pub fn create_provider(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<Box<dyn Provider>> {
    let api_url = api_url.map(str::trim).filter(|url| !url.is_empty());

    let (canonical, default_url) = match name {
        "nvidia" | "nim" => ("nvidia", NVIDIA_BASE_URL),
        "openai" => ("openai", OPENAI_BASE_URL),
        custom if custom.starts_with("custom:") => {
            let url = custom.trim_start_matches("custom:").trim();
            if url.is_empty() && api_url.is_none() {
                anyhow::bail!("Custom provider requires a URL: use custom:<URL>");
            }
            ("custom", url)
        }
        _ => anyhow::bail!(
            "Unknown provider: {name}. Supported: nvidia, openai, custom:<URL>."
        ),
    };

    let key = resolve_provider_credential(canonical, api_key);
    let base_url = api_url.unwrap_or(default_url);
    reqwest::Url::parse(base_url)
        .map_err(|e| anyhow::anyhow!("Invalid base URL for {canonical} provider: {e}"))?;

    Ok(Box::new(OpenAiCompatibleProvider::new(
        canonical,
        base_url,
        key.as_deref(),
        timeout,
    )))
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"nvidia"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Alternative names accepted in config
    pub aliases: &'static [&'static str],
    /// Default base URL
    pub base_url: &'static str,
}

/// Return the list of all known providers for display in `campinova providers`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "nvidia",
            display_name: "NVIDIA NIM",
            aliases: &["nim"],
            base_url: NVIDIA_BASE_URL,
        },
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI",
            aliases: &[],
            base_url: OPENAI_BASE_URL,
        },
    ]
}
