//! Filesystem operations used by the copy strategies and the copy engine.
//!
//! Every helper maps missing paths to [`CryptCopyError::FileNotFound`] so that
//! callers see the same typed errors whether a path vanished before or during
//! an operation.

use crate::error::{CryptCopyError, Result};
use crate::streaming::{self, DecryptStage, EncryptStage};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// What `lstat` found at a path. Symlinks are not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Other,
}

impl FileKind {
    pub fn is_file(self) -> bool {
        self == FileKind::File
    }

    pub fn is_dir(self) -> bool {
        self == FileKind::Directory
    }
}

/// Options for [`write_file`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Create missing parent directories first
    pub auto_mkdir: bool,
    /// Append instead of truncating
    pub append: bool,
}

pub async fn exists(path: impl AsRef<Path>) -> bool {
    fs::symlink_metadata(path.as_ref()).await.is_ok()
}

pub async fn lstat(path: impl AsRef<Path>) -> Result<FileKind> {
    let path = path.as_ref();
    let meta = fs::symlink_metadata(path)
        .await
        .map_err(|e| CryptCopyError::io_at(path, e))?;
    let ft = meta.file_type();
    Ok(if ft.is_file() {
        FileKind::File
    } else if ft.is_dir() {
        FileKind::Directory
    } else {
        FileKind::Other
    })
}

/// Names of the entries in a directory, sorted.
pub async fn read_dir(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut dir = fs::read_dir(path)
        .await
        .map_err(|e| CryptCopyError::io_at(path, e))?;

    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

pub async fn mkdir(path: impl AsRef<Path>, recursive: bool) -> Result<()> {
    let path = path.as_ref();
    let res = if recursive {
        fs::create_dir_all(path).await
    } else {
        fs::create_dir(path).await
    };
    res.map_err(|e| CryptCopyError::io_at(path, e))
}

pub async fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).await.map_err(|e| CryptCopyError::io_at(path, e))
}

pub async fn write_file(
    path: impl AsRef<Path>,
    content: impl AsRef<[u8]>,
    options: WriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    if options.auto_mkdir {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .append(options.append)
        .truncate(!options.append)
        .open(path)
        .await
        .map_err(|e| CryptCopyError::io_at(path, e))?;
    file.write_all(content.as_ref()).await?;
    file.flush().await?;
    Ok(())
}

/// Remove a file, or a directory with everything under it. Missing paths are a no-op.
pub async fn unlink(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let kind = match lstat(path).await {
        Ok(kind) => kind,
        Err(CryptCopyError::FileNotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };

    let res = if kind.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    match res {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Rename without clobbering: both paths are left untouched on failure.
pub async fn rename(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    if !exists(from).await {
        return Err(CryptCopyError::FileNotFound(from.to_path_buf()));
    }
    if exists(to).await {
        return Err(CryptCopyError::FileIsAlreadyExisted(to.to_path_buf()));
    }

    fs::rename(from, to)
        .await
        .map_err(|e| CryptCopyError::io_at(from, e))?;
    info!(from = %from.display(), to = %to.display(), "renamed");
    Ok(())
}

/// Open `path` for reading, refusing anything that is not a regular file.
async fn open_source(path: &Path) -> Result<fs::File> {
    if !lstat(path).await?.is_file() {
        return Err(CryptCopyError::IsDirectory(path.to_path_buf()));
    }
    fs::File::open(path)
        .await
        .map_err(|e| CryptCopyError::io_at(path, e))
}

async fn create_destination(path: &Path) -> Result<BufWriter<fs::File>> {
    let file = fs::File::create(path)
        .await
        .map_err(|e| CryptCopyError::io_at(path, e))?;
    Ok(BufWriter::new(file))
}

/// Byte-identical copy of a single file; an existing destination is replaced.
pub async fn copy_file(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<u64> {
    let (from, to) = (from.as_ref(), to.as_ref());
    let mut reader = open_source(from).await?;
    unlink(to).await?;

    let mut writer = create_destination(to).await?;
    let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.flush().await?;

    debug!(from = %from.display(), to = %to.display(), bytes, "copied file");
    Ok(bytes)
}

/// Copy a single file, encrypting it with the public key at `key_path`.
/// Returns plaintext bytes read.
pub async fn copy_file_with_encryption(
    key_path: impl AsRef<Path>,
    from: impl AsRef<Path>,
    to: impl AsRef<Path>,
    read_size: Option<usize>,
) -> Result<u64> {
    let (from, to) = (from.as_ref(), to.as_ref());
    let mut reader = open_source(from).await?;

    let mut stage = EncryptStage::new(key_path.as_ref());
    tokio::try_join!(stage.init(), unlink(to))?;

    let mut writer = create_destination(to).await?;
    let bytes = streaming::encrypt_stream(&mut stage, &mut reader, &mut writer, read_size).await?;

    debug!(from = %from.display(), to = %to.display(), bytes, "encrypted file");
    Ok(bytes)
}

/// Copy a single file, decrypting it with the private key at `key_path`.
/// Returns plaintext bytes written.
pub async fn copy_file_with_decryption(
    key_path: impl AsRef<Path>,
    from: impl AsRef<Path>,
    to: impl AsRef<Path>,
    read_size: Option<usize>,
) -> Result<u64> {
    let (from, to) = (from.as_ref(), to.as_ref());
    let mut reader = open_source(from).await?;

    let mut stage = DecryptStage::new(key_path.as_ref());
    tokio::try_join!(stage.init(), unlink(to))?;

    let mut writer = create_destination(to).await?;
    let bytes = streaming::decrypt_stream(&mut stage, &mut reader, &mut writer, read_size).await?;

    debug!(from = %from.display(), to = %to.display(), bytes, "decrypted file");
    Ok(bytes)
}
