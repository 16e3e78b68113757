use std::path::PathBuf;
use std::time::Duration;

use docwatch_core::{DocumentId, DocumentIdError};
use docwatch_remote::FileCredentialSession;
use thiserror::Error;

use crate::cli_args::Cli;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("--doc-api-base (DOCWATCH_DOC_API_BASE) is required")]
    MissingDocApiBase,
    #[error("--agent-endpoint (DOCWATCH_AGENT_ENDPOINT) is required")]
    MissingAgentEndpoint,
    #[error("{flag} must be an http(s) URL, got '{value}'")]
    InvalidUrl { flag: &'static str, value: String },
    #[error(
        "no access token: pass --access-token (DOCWATCH_ACCESS_TOKEN) or provide a cache at {}",
        .cache.display()
    )]
    MissingAccessToken { cache: PathBuf },
    #[error("failed to read credential cache: {0}")]
    CredentialCache(String),
    #[error("invalid --monitor value '{value}': {source}")]
    InvalidMonitorId {
        value: String,
        #[source]
        source: DocumentIdError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenSource {
    Flag,
    Cache,
}

#[derive(Debug, Clone)]
/// Validated runtime configuration.
pub(crate) struct DocwatchConfig {
    pub(crate) bind: String,
    pub(crate) doc_api_base: String,
    pub(crate) access_token: String,
    pub(crate) token_source: TokenSource,
    pub(crate) credential_cache: PathBuf,
    pub(crate) request_timeout_ms: u64,
    pub(crate) retry_max_attempts: usize,
    pub(crate) retry_base_delay_ms: u64,
    pub(crate) agent_endpoint: String,
    pub(crate) agent_max_iterations: u32,
    pub(crate) default_interval: Duration,
    pub(crate) monitors: Vec<DocumentId>,
}

fn validated_url(flag: &'static str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    match reqwest::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        _ => Err(ConfigError::InvalidUrl {
            flag,
            value: raw.to_string(),
        }),
    }
}

impl DocwatchConfig {
    pub(crate) fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let doc_api_base = cli
            .doc_api_base
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingDocApiBase)
            .and_then(|value| validated_url("--doc-api-base", value))?;
        let agent_endpoint = cli
            .agent_endpoint
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingAgentEndpoint)
            .and_then(|value| validated_url("--agent-endpoint", value))?;

        let flag_token = cli
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        let (access_token, token_source) = match flag_token {
            Some(token) => (token, TokenSource::Flag),
            None => {
                let cached = FileCredentialSession::new(cli.credential_cache.clone())
                    .load_token()
                    .map_err(|error| ConfigError::CredentialCache(format!("{error:#}")))?;
                match cached {
                    Some(token) => (token, TokenSource::Cache),
                    None => {
                        return Err(ConfigError::MissingAccessToken {
                            cache: cli.credential_cache,
                        })
                    }
                }
            }
        };

        let mut monitors = Vec::with_capacity(cli.monitor.len());
        for raw in &cli.monitor {
            let document_id =
                DocumentId::parse(raw).map_err(|source| ConfigError::InvalidMonitorId {
                    value: raw.clone(),
                    source,
                })?;
            if !monitors.contains(&document_id) {
                monitors.push(document_id);
            }
        }

        Ok(Self {
            bind: cli.bind.trim().to_string(),
            doc_api_base,
            access_token,
            token_source,
            credential_cache: cli.credential_cache,
            request_timeout_ms: cli.request_timeout_ms,
            retry_max_attempts: cli.retry_max_attempts,
            retry_base_delay_ms: cli.retry_base_delay_ms,
            agent_endpoint,
            agent_max_iterations: cli.agent_max_iterations,
            default_interval: Duration::from_millis(cli.default_interval_ms),
            monitors,
        })
    }
}
