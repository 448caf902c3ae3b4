//! Copy strategies: how one file gets from `from` to `to`.
//!
//! A [`CopyStrategy`] pairs a source and destination with a [`CopyKind`].
//! The recursive engine derives per-child strategies with
//! [`CopyStrategy::clone_with`], which keeps the kind (and key) and rebinds
//! only the paths.

use crate::error::Result;
use crate::file_ops;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Transformation applied while copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyKind {
    /// Byte-identical copy
    Simple,
    /// Encrypt with the public key at `key`
    EncryptOnCopy { key: PathBuf },
    /// Decrypt with the private key at `key`
    DecryptOnCopy { key: PathBuf },
}

impl CopyKind {
    pub fn key(&self) -> Option<&Path> {
        match self {
            CopyKind::Simple => None,
            CopyKind::EncryptOnCopy { key } | CopyKind::DecryptOnCopy { key } => Some(key),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CopyKind::Simple => "simple",
            CopyKind::EncryptOnCopy { .. } => "encrypt",
            CopyKind::DecryptOnCopy { .. } => "decrypt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CopyStrategy {
    kind: CopyKind,
    from: PathBuf,
    to: PathBuf,
    read_size: Option<usize>,
}

impl CopyStrategy {
    pub fn new(kind: CopyKind, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            from: from.into(),
            to: to.into(),
            read_size: None,
        }
    }

    pub fn simple(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::new(CopyKind::Simple, from, to)
    }

    pub fn encrypt(
        key: impl Into<PathBuf>,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
    ) -> Self {
        Self::new(CopyKind::EncryptOnCopy { key: key.into() }, from, to)
    }

    pub fn decrypt(
        key: impl Into<PathBuf>,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
    ) -> Self {
        Self::new(CopyKind::DecryptOnCopy { key: key.into() }, from, to)
    }

    /// Bound the source read size; encryption still never exceeds the key limit.
    pub fn with_read_size(mut self, read_size: Option<usize>) -> Self {
        self.read_size = read_size;
        self
    }

    pub fn kind(&self) -> &CopyKind {
        &self.kind
    }

    pub fn source(&self) -> &Path {
        &self.from
    }

    pub fn destination(&self) -> &Path {
        &self.to
    }

    /// Same kind, key and read size; new paths.
    pub fn clone_with(&self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: self.kind.clone(),
            from: from.into(),
            to: to.into(),
            read_size: self.read_size,
        }
    }

    /// Copying a file onto an existing directory targets `dir/basename(from)`.
    pub async fn check_destination(&mut self) -> Result<()> {
        let from_kind = file_ops::lstat(&self.from).await?;
        if !from_kind.is_file() || !file_ops::exists(&self.to).await {
            return Ok(());
        }

        if file_ops::lstat(&self.to).await?.is_dir() {
            if let Some(name) = self.from.file_name() {
                let target = self.to.join(name);
                debug!(from = %self.from.display(), to = %target.display(), "copying into directory");
                self.to = target;
            }
        }
        Ok(())
    }

    /// Copy the single file at `from` to `to` as is. Fails with
    /// `IsDirectory` when `from` is not a regular file.
    pub async fn do_copy(&self) -> Result<u64> {
        let bytes = match &self.kind {
            CopyKind::Simple => file_ops::copy_file(&self.from, &self.to).await?,
            CopyKind::EncryptOnCopy { key } => {
                file_ops::copy_file_with_encryption(key, &self.from, &self.to, self.read_size)
                    .await?
            }
            CopyKind::DecryptOnCopy { key } => {
                file_ops::copy_file_with_decryption(key, &self.from, &self.to, self.read_size)
                    .await?
            }
        };
        info!(
            kind = self.kind.label(),
            from = %self.from.display(),
            to = %self.to.display(),
            bytes,
            "file copied"
        );
        Ok(bytes)
    }

    /// [`check_destination`](Self::check_destination) then [`do_copy`](Self::do_copy).
    pub async fn copy(&mut self) -> Result<u64> {
        self.check_destination().await?;
        self.do_copy().await
    }
}
