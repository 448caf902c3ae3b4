use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for cryptcopy operations
#[derive(Debug, Error)]
pub enum CryptCopyError {
    /// A stream stage was fed data before its key finished loading
    #[error("stage is not initialized: call init() before transform()")]
    NotInitialized,

    /// A stream stage was used after close()
    #[error("stage is already closed")]
    AlreadyClosed,

    /// A stream stage was used after one of its transforms failed
    #[error("stage failed on an earlier chunk and cannot continue")]
    StageFailed,

    /// Bad key, malformed ciphertext or an oversized plaintext chunk
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Key material could not be parsed
    #[error("Key error: {0}")]
    Key(String),

    /// The encrypted stream ended in the middle of a record
    #[error("incomplete stream: {pending} bytes of an unterminated record left at close")]
    IncompleteStream { pending: usize },

    #[error("Is a directory: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File is already existed: {}", .0.display())]
    FileIsAlreadyExisted(PathBuf),

    /// Invalid exclusion pattern
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CryptCopyError>;

impl CryptCopyError {
    pub fn cipher(msg: impl Into<String>) -> Self {
        Self::Cipher(msg.into())
    }

    pub fn key(msg: impl Into<String>) -> Self {
        Self::Key(msg.into())
    }

    /// Attach a path to an I/O error, turning `NotFound` into [`Self::FileNotFound`].
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path.to_path_buf())
        } else {
            Self::Io(err)
        }
    }
}

impl From<rsa::Error> for CryptCopyError {
    fn from(err: rsa::Error) -> Self {
        Self::Cipher(err.to_string())
    }
}

impl From<base64::DecodeError> for CryptCopyError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Cipher(format!("invalid base64 record: {err}"))
    }
}
