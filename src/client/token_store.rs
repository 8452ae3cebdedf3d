use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Durable home for the session's tokens.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    async fn load(&self) -> Result<Option<SessionTokens>>;
    async fn save(&self, tokens: &SessionTokens) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Tokens kept as a small JSON document on disk.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<SessionTokens>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        let tokens = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a valid token file", self.path.display()))?;
        Ok(Some(tokens))
    }

    async fn save(&self, tokens: &SessionTokens) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let encoded = serde_json::to_vec_pretty(tokens).context("failed to encode tokens")?;
        tokio::fs::write(&self.path, encoded)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", self.path.display())),
        }
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<SessionTokens>>,
}

impl MemoryTokenStore {
    pub fn new(initial: Option<SessionTokens>) -> Self {
        Self {
            tokens: Mutex::new(initial),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<SessionTokens>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<SessionTokens>> {
        Ok(self.slot().clone())
    }

    async fn save(&self, tokens: &SessionTokens) -> Result<()> {
        *self.slot() = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
