use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;

/// Object-store seam for raw file bytes and attachments. The filesystem
/// implementation below is the default; a real object store plugs in behind
/// the same four operations.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Vec<u8>>;
    async fn delete(&self, path: &str) -> Result<()>;
    /// Mint a short-lived signed URL for direct file access.
    fn sign(&self, path: &str, expires_in_secs: i64) -> String;
}

pub struct FsBlobStore {
    root: PathBuf,
    bucket: String,
    secret: String,
}

impl FsBlobStore {
    pub fn new(root: PathBuf, bucket: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            root,
            bucket: bucket.into(),
            secret: secret.into(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.contains("..") || path.starts_with('/') {
            return Err(anyhow!("invalid blob path: {path}"));
        }
        Ok(self.root.join(&self.bucket).join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&target, bytes)
            .await
            .with_context(|| format!("failed to store blob {path}"))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        fs::read(&target)
            .await
            .with_context(|| format!("failed to read blob {path}"))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        fs::remove_file(&target)
            .await
            .with_context(|| format!("failed to delete blob {path}"))
    }

    fn sign(&self, path: &str, expires_in_secs: i64) -> String {
        let expires = Utc::now().timestamp() + expires_in_secs;
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(expires.to_string().as_bytes());
        let sig = hex::encode(hasher.finalize());
        format!("/files/{}/{}?expires={}&sig={}", self.bucket, path, expires, &sig[..32])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_get_delete_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FsBlobStore::new(dir.path().into(), "documents", "test-secret");

        store.put("docs/a.md", b"# hello").await?;
        assert_eq!(store.get("docs/a.md").await?, b"# hello");

        store.delete("docs/a.md").await?;
        assert!(store.get("docs/a.md").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().into(), "documents", "test-secret");
        assert!(store.get("../outside").await.is_err());
    }

    #[test]
    fn signed_urls_carry_expiry_and_signature() {
        let store = FsBlobStore::new("/tmp".into(), "documents", "test-secret");
        let url = store.sign("docs/a.md", 3600);
        assert!(url.starts_with("/files/documents/docs/a.md?expires="));
        assert!(url.contains("&sig="));
    }
}
