use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use docwatch_core::{current_unix_timestamp_ms, write_text_atomic, SessionLifecycle};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CachedCredential {
    access_token: String,
    saved_unix_ms: u64,
}

#[derive(Debug, Clone)]
/// Access-token cache file owned for the lifetime of the process.
pub struct FileCredentialSession {
    path: PathBuf,
}

impl FileCredentialSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached token, or `None` when no cache file exists.
    pub fn load_token(&self) -> Result<Option<String>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("failed to read credential cache {}", self.path.display())
                })
            }
        };
        let cached = serde_json::from_str::<CachedCredential>(&raw).with_context(|| {
            format!("failed to parse credential cache {}", self.path.display())
        })?;
        let token = cached.access_token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    pub fn persist_token(&self, access_token: &str) -> Result<()> {
        let cached = CachedCredential {
            access_token: access_token.trim().to_string(),
            saved_unix_ms: current_unix_timestamp_ms(),
        };
        let mut payload =
            serde_json::to_string_pretty(&cached).context("failed to encode credential cache")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
    }
}

#[async_trait]
impl SessionLifecycle for FileCredentialSession {
    async fn cleanup(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "credential cache removed");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error).with_context(|| {
                format!("failed to remove credential cache {}", self.path.display())
            }),
        }
    }
}
