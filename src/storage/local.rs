use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::ObjectStorage;
use crate::config::AppConfig;

/// Objects kept under a directory on local disk, for running without S3.
///
/// Read URLs point at the `/files` route and carry an expiry plus a
/// signature keyed by a server secret, so they behave like presigned S3 URLs.
pub struct LocalStorage {
    root: PathBuf,
    secret: String,
    base_url: String,
}

impl LocalStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let root = config.data_dir.join("objects");
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create {}", root.display()))?;
        tracing::debug!(root = %root.display(), "using local object storage");
        Ok(Self::new(
            root,
            config.jwt_secret.clone(),
            config.public_base_url.clone(),
        ))
    }

    pub fn signed_url(&self, key: &str, expires_in: Duration, now: DateTime<Utc>) -> String {
        let ttl = i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.timestamp().saturating_add(ttl);
        format!(
            "{}/files/{key}?expires={expires_at}&sig={}",
            self.base_url,
            self.signature(key, expires_at)
        )
    }

    /// True when `signature` was issued for `key` and has not expired.
    pub fn verify(&self, key: &str, expires_at: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if now.timestamp() > expires_at {
            return false;
        }
        let expected = self.signature(key, expires_at);
        expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |diff, (a, b)| diff | (a ^ b))
                == 0
    }

    pub async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        ensure!(
            !key.is_empty()
                && relative
                    .components()
                    .all(|component| matches!(component, Component::Normal(_))),
            "invalid object key {key:?}"
        );
        Ok(self.root.join(relative))
    }

    fn signature(&self, key: &str, expires_at: i64) -> String {
        let mut inner = Sha256::new();
        inner.update(self.secret.as_bytes());
        inner.update(key.as_bytes());
        inner.update(b"\n");
        inner.update(expires_at.to_string().as_bytes());

        let mut outer = Sha256::new();
        outer.update(self.secret.as_bytes());
        outer.update(inner.finalize());
        hex::encode(outer.finalize())
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<String> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(key.to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.object_path(key)?;
        Ok(self.signed_url(key, expires_in, Utc::now()))
    }
}
