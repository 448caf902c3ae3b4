//! Key material loading.
//!
//! [`KeyMaterial`] holds the raw PEM bytes read from a key path. Every stream
//! stage loads its own copy exactly once and drops it with the stage.
//!
//! ## Security Features
//!
//! - Bytes are zeroized on drop (via `Zeroize` trait)
//! - Key generation is out of scope; keys are provisioned externally

use crate::error::{CryptCopyError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Opaque key bytes, immutable once loaded.
pub struct KeyMaterial {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("path", &self.path)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl KeyMaterial {
    /// Read key material from `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !fs::try_exists(path)
            .await
            .map_err(|e| CryptCopyError::io_at(path, e))?
        {
            warn!(path = %path.display(), "key file not found");
            return Err(CryptCopyError::FileNotFound(path.to_path_buf()));
        }

        let bytes = fs::read(path)
            .await
            .map_err(|e| CryptCopyError::io_at(path, e))?;
        if bytes.is_empty() {
            return Err(CryptCopyError::key(format!(
                "key file {} is empty",
                path.display()
            )));
        }

        debug!(path = %path.display(), size = bytes.len(), "loaded key material");
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// PEM text of the key.
    pub(crate) fn as_pem(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes).map_err(|_| {
            CryptCopyError::key(format!("key file {} is not PEM text", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_missing_key_is_file_not_found() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.pem");

        let err = KeyMaterial::load(&path).await.unwrap_err();
        assert!(matches!(err, CryptCopyError::FileNotFound(p) if p == path));
    }

    #[tokio::test]
    async fn load_reads_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key.pem");
        std::fs::write(&path, b"-----BEGIN PUBLIC KEY-----").unwrap();

        let key = KeyMaterial::load(&path).await.unwrap();
        assert_eq!(key.as_bytes(), b"-----BEGIN PUBLIC KEY-----");
        assert_eq!(key.path(), path.as_path());
        assert_eq!(key.as_pem().unwrap(), "-----BEGIN PUBLIC KEY-----");
    }

    #[tokio::test]
    async fn load_rejects_empty_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.pem");
        std::fs::write(&path, b"").unwrap();

        let err = KeyMaterial::load(&path).await.unwrap_err();
        assert!(matches!(err, CryptCopyError::Key(_)));
    }
}
