//! Chunk cipher: RSA-OAEP over single bounded buffers.
//!
//! The cipher is stateless; one [`EncryptKey`] or [`DecryptKey`] can serve any
//! number of concurrent calls. Plaintext chunks must not exceed
//! [`EncryptKey::max_chunk_len`], which is derived from the key modulus:
//!
//! ```text
//! max_chunk_len = modulus_bytes - 2 * sha256_len - 2
//!
//! 1024-bit key ->  62 bytes
//! 2048-bit key -> 190 bytes
//! 4096-bit key -> 446 bytes
//! ```

use crate::error::{CryptCopyError, Result};
use crate::key_manager::KeyMaterial;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// OAEP overhead for SHA-256: two digests plus two marker bytes
const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// Public half used by the encrypting side.
#[derive(Debug, Clone)]
pub struct EncryptKey(RsaPublicKey);

/// Private key used by the decrypting side.
#[derive(Debug, Clone)]
pub struct DecryptKey(RsaPrivateKey);

impl EncryptKey {
    /// Parse a PEM public key (SPKI or PKCS#1). A PEM private key is accepted
    /// too, in which case its public half is used.
    pub fn from_material(material: &KeyMaterial) -> Result<Self> {
        let pem = material.as_pem()?;
        if pem.contains("PRIVATE KEY") {
            let private = DecryptKey::from_material(material)?;
            return Ok(Self(private.0.to_public_key()));
        }

        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map(Self)
            .map_err(|e| {
                CryptCopyError::key(format!(
                    "{} is not a PEM RSA public key: {e}",
                    material.path().display()
                ))
            })
    }

    /// Largest plaintext accepted by [`encrypt`] with this key.
    pub fn max_chunk_len(&self) -> usize {
        self.0.size().saturating_sub(OAEP_OVERHEAD)
    }

    pub fn modulus_bits(&self) -> usize {
        self.0.size() * 8
    }
}

impl From<RsaPublicKey> for EncryptKey {
    fn from(key: RsaPublicKey) -> Self {
        Self(key)
    }
}

impl DecryptKey {
    /// Parse a PEM private key (PKCS#8 or PKCS#1).
    pub fn from_material(material: &KeyMaterial) -> Result<Self> {
        let pem = material.as_pem()?;
        RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map(Self)
            .map_err(|e| {
                CryptCopyError::key(format!(
                    "{} is not a PEM RSA private key: {e}",
                    material.path().display()
                ))
            })
    }

    /// Length of one base64 record for this modulus, terminator excluded.
    pub fn max_record_len(&self) -> usize {
        4 * self.0.size().div_ceil(3)
    }

    pub fn encrypt_key(&self) -> EncryptKey {
        EncryptKey(self.0.to_public_key())
    }
}

impl From<RsaPrivateKey> for DecryptKey {
    fn from(key: RsaPrivateKey) -> Self {
        Self(key)
    }
}

/// Ciphertext handed to [`decrypt`]: raw bytes or base64 text.
#[derive(Debug, Clone, Copy)]
pub enum Ciphertext<'a> {
    Raw(&'a [u8]),
    Base64(&'a [u8]),
}

impl<'a> From<&'a [u8]> for Ciphertext<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Raw(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Ciphertext<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::Raw(bytes)
    }
}

impl<'a> From<&'a str> for Ciphertext<'a> {
    fn from(text: &'a str) -> Self {
        Self::Base64(text.as_bytes())
    }
}

impl<'a> From<&'a String> for Ciphertext<'a> {
    fn from(text: &'a String) -> Self {
        Self::Base64(text.as_bytes())
    }
}

/// Encrypt one bounded chunk.
pub fn encrypt(key: &EncryptKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let limit = key.max_chunk_len();
    if plaintext.len() > limit {
        return Err(CryptCopyError::cipher(format!(
            "chunk of {} bytes exceeds the {limit}-byte limit of a {}-bit key",
            plaintext.len(),
            key.modulus_bits()
        )));
    }
    Ok(key.0.encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)?)
}

/// Decrypt one chunk given as raw bytes or base64 text.
pub fn decrypt<'a>(key: &DecryptKey, ciphertext: impl Into<Ciphertext<'a>>) -> Result<Vec<u8>> {
    let decoded;
    let raw = match ciphertext.into() {
        Ciphertext::Raw(bytes) => bytes,
        Ciphertext::Base64(text) => {
            decoded = STANDARD.decode(text)?;
            decoded.as_slice()
        }
    };
    Ok(key.0.decrypt(Oaep::new::<Sha256>(), raw)?)
}

/// base64 text of one ciphertext chunk.
pub fn encode(ciphertext: &[u8]) -> String {
    STANDARD.encode(ciphertext)
}

#[cfg(test)]
pub(crate) mod test_keys {
    use super::*;
    use std::sync::OnceLock;

    /// One 1024-bit key pair per test binary; generation is slow in debug builds.
    pub(crate) fn private_key() -> RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).expect("generate test key"))
            .clone()
    }

    pub(crate) fn pair() -> (EncryptKey, DecryptKey) {
        let private = private_key();
        (EncryptKey(private.to_public_key()), DecryptKey(private))
    }

    /// Write the pair as `public.pem` / `private.pem` into `dir`.
    pub(crate) fn write_pem(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
        use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

        let private = private_key();
        let public_path = dir.join("public.pem");
        let private_path = dir.join("private.pem");
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("encode public key");
        let private_pem = private.to_pkcs8_pem(LineEnding::LF).expect("encode private key");
        std::fs::write(&public_path, public_pem).expect("write public key");
        std::fs::write(&private_path, private_pem.as_bytes()).expect("write private key");
        (public_path, private_path)
    }
}
