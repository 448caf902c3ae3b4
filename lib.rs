//! # cryptcopy - Encrypt-on-copy for files and directory trees
//!
//! cryptcopy copies files or whole directory trees, optionally encrypting or
//! decrypting every file on the way with an RSA key pair. Files of any size
//! are handled by splitting them into key-sized chunks and framing each
//! encrypted chunk as a base64 line.
//!
//! ## Features
//!
//! - **Chunked RSA-OAEP**: Each plaintext chunk fits the key modulus
//! - **Boundary-insensitive decoding**: Records are reassembled however reads split them
//! - **Pluggable copy strategies**: Plain copy, encrypt-on-copy, decrypt-on-copy
//! - **Concurrent tree copy**: Siblings are copied concurrently, with exclusion rules
//!
//! ## Quick Start
//!
//! ```no_run
//! use cryptcopy::{copy_engine, exclude::Excludes, strategy::CopyStrategy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let excludes = Excludes::from_parts(["node_modules"], [r"\.tmp$"])?;
//!
//!     // Encrypt a tree
//!     let strategy = CopyStrategy::encrypt("./public.pem", "./docs", "./sealed");
//!     copy_engine::copy(strategy, &excludes).await?;
//!
//!     // Decrypt it again
//!     let strategy = CopyStrategy::decrypt("./private.pem", "./sealed", "./opened");
//!     copy_engine::copy(strategy, &excludes).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Encrypted File Format
//!
//! One `base64(ciphertext)\n` record per plaintext chunk, nothing else.

pub mod cipher;
pub mod config;
pub mod copy_engine;
pub mod error;
pub mod exclude;
pub mod file_ops;
pub mod key_manager;
pub mod strategy;
pub mod streaming;

// Re-export common types for convenience
pub use error::{CryptCopyError, Result};
