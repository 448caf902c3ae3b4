//! Streaming encryption and decryption for arbitrarily large files.
//!
//! This module provides [`EncryptStage`] and [`DecryptStage`], which turn a
//! sequence of raw byte chunks into another sequence of byte chunks, plus the
//! [`encrypt_stream`] / [`decrypt_stream`] drivers that pump an `AsyncRead`
//! through a stage into an `AsyncWrite`.
//!
//! ## Wire Format
//!
//! ```text
//! base64(rsa_oaep(chunk1))\n
//! base64(rsa_oaep(chunk2))\n
//! ...
//! ```
//!
//! There is no header or length prefix. base64 never produces `\n`, so the
//! terminator alone marks record boundaries however the bytes are re-chunked
//! on read.
//!
//! ## Stage Lifecycle
//!
//! `Uninitialized -> init() -> Ready -> transform()* -> close() -> Closed`

use crate::cipher::{self, Ciphertext, DecryptKey, EncryptKey};
use crate::error::{CryptCopyError, Result};
use crate::key_manager::KeyMaterial;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

/// Record terminator
pub const TERMINATOR: u8 = b'\n';

/// Default read size when decrypting (64KB); records may straddle reads
pub const DEFAULT_READ_SIZE: usize = 64 * 1024;

#[derive(Debug)]
enum StageState<K> {
    Uninitialized,
    Ready(K),
    /// A transform error left the stream in an unknown position
    Failed,
    Closed,
}

impl<K> StageState<K> {
    fn key(&self) -> Result<&K> {
        match self {
            StageState::Ready(key) => Ok(key),
            StageState::Uninitialized => Err(CryptCopyError::NotInitialized),
            StageState::Failed => Err(CryptCopyError::StageFailed),
            StageState::Closed => Err(CryptCopyError::AlreadyClosed),
        }
    }
}

/// Encrypts every input chunk as exactly one newline-terminated record.
#[derive(Debug)]
pub struct EncryptStage {
    key_path: PathBuf,
    state: StageState<EncryptKey>,
    records: u64,
}

impl EncryptStage {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
            state: StageState::Uninitialized,
            records: 0,
        }
    }

    /// Load the public key. A second call on a ready stage is a no-op.
    pub async fn init(&mut self) -> Result<()> {
        match self.state {
            StageState::Ready(_) => return Ok(()),
            StageState::Failed => return Err(CryptCopyError::StageFailed),
            StageState::Closed => return Err(CryptCopyError::AlreadyClosed),
            StageState::Uninitialized => {}
        }
        let material = KeyMaterial::load(&self.key_path).await?;
        let key = EncryptKey::from_material(&material)?;
        debug!(
            key = %self.key_path.display(),
            modulus_bits = key.modulus_bits(),
            max_chunk = key.max_chunk_len(),
            "encrypt stage ready"
        );
        self.state = StageState::Ready(key);
        Ok(())
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Largest chunk [`transform`](Self::transform) accepts.
    pub fn max_chunk_len(&self) -> Result<usize> {
        Ok(self.state.key()?.max_chunk_len())
    }

    /// Encrypt one chunk into one record, terminator included.
    pub fn transform(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let key = self.state.key()?;
        let mut record = cipher::encode(&cipher::encrypt(key, chunk)?).into_bytes();
        record.push(TERMINATOR);
        self.records += 1;
        Ok(record)
    }

    pub fn close(&mut self) -> Result<()> {
        match self.state {
            StageState::Closed => return Err(CryptCopyError::AlreadyClosed),
            StageState::Failed => return Err(CryptCopyError::StageFailed),
            _ => {}
        }
        debug!(key = %self.key_path.display(), records = self.records, "encrypt stage closed");
        self.state = StageState::Closed;
        Ok(())
    }
}

/// Reassembles newline-delimited records across arbitrary chunk boundaries
/// and decrypts each one as soon as its terminator arrives.
#[derive(Debug)]
pub struct DecryptStage {
    key_path: PathBuf,
    state: StageState<DecryptKey>,
    /// Prefix of a record whose terminator has not been seen yet. Never
    /// holds a complete record between calls.
    partial: Vec<u8>,
    records: u64,
}

impl DecryptStage {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
            state: StageState::Uninitialized,
            partial: Vec::new(),
            records: 0,
        }
    }

    /// Load the private key. A second call on a ready stage is a no-op.
    pub async fn init(&mut self) -> Result<()> {
        match self.state {
            StageState::Ready(_) => return Ok(()),
            StageState::Failed => return Err(CryptCopyError::StageFailed),
            StageState::Closed => return Err(CryptCopyError::AlreadyClosed),
            StageState::Uninitialized => {}
        }
        let material = KeyMaterial::load(&self.key_path).await?;
        let key = DecryptKey::from_material(&material)?;
        debug!(key = %self.key_path.display(), "decrypt stage ready");
        self.state = StageState::Ready(key);
        Ok(())
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Bytes of the unterminated record carried into the next call.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Feed one raw chunk; returns the plaintext of every record it completed,
    /// in record order. An empty chunk is a no-op.
    ///
    /// Any error is terminal: the stage moves to a failed state and every later
    /// `transform` or `close` fails with [`CryptCopyError::StageFailed`].
    pub fn transform(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        let key = self.state.key()?;
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        match split_records(key, &mut self.partial, chunk) {
            Ok(plaintexts) => {
                self.records += plaintexts.len() as u64;
                Ok(plaintexts)
            }
            Err(e) => {
                error!(key = %self.key_path.display(), records = self.records, error = %e, "decrypt stage failed");
                self.partial = Vec::new();
                self.state = StageState::Failed;
                Err(e)
            }
        }
    }

    /// Finish the stream. Fails with [`CryptCopyError::IncompleteStream`] if a
    /// truncated final record is still buffered; the stage is closed either way.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            StageState::Closed => return Err(CryptCopyError::AlreadyClosed),
            StageState::Failed => return Err(CryptCopyError::StageFailed),
            _ => {}
        }
        self.state = StageState::Closed;

        let pending = std::mem::take(&mut self.partial).len();
        if pending > 0 {
            error!(key = %self.key_path.display(), pending, "encrypted stream ends inside a record");
            return Err(CryptCopyError::IncompleteStream { pending });
        }
        debug!(key = %self.key_path.display(), records = self.records, "decrypt stage closed");
        Ok(())
    }
}

/// Decrypt every record `chunk` terminates, appending the unterminated rest to
/// `partial`. Only the carried prefix is ever copied; `partial` never grows
/// past one record's length.
fn split_records(key: &DecryptKey, partial: &mut Vec<u8>, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
    let max_record = key.max_record_len();
    let mut plaintexts = Vec::new();
    let mut rest = chunk;

    while let Some(pos) = rest.iter().position(|b| *b == TERMINATOR) {
        let line = &rest[..pos];
        rest = &rest[pos + 1..];

        if partial.is_empty() {
            if !line.is_empty() {
                plaintexts.push(cipher::decrypt(key, Ciphertext::Base64(line))?);
            }
        } else {
            partial.extend_from_slice(line);
            let record = std::mem::take(partial);
            plaintexts.push(cipher::decrypt(key, Ciphertext::Base64(&record))?);
        }
    }

    if partial.len() + rest.len() > max_record {
        return Err(CryptCopyError::cipher(format!(
            "no record terminator within {max_record} bytes"
        )));
    }
    partial.extend_from_slice(rest);
    Ok(plaintexts)
}

/// Fill `buf` from `reader`, stopping early only at EOF.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Encrypts everything from reader into records on writer, then closes the stage.
/// Reads are bounded by the key's chunk limit, or by `read_size` if smaller.
/// Returns the number of plaintext bytes consumed.
pub async fn encrypt_stream<R, W>(
    stage: &mut EncryptStage,
    reader: &mut R,
    writer: &mut W,
    read_size: Option<usize>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let limit = stage.max_chunk_len()?;
    if limit == 0 {
        return Err(CryptCopyError::cipher("key modulus is too small for OAEP padding"));
    }
    let chunk_size = read_size.map_or(limit, |size| size.clamp(1, limit));

    let mut buffer = vec![0u8; chunk_size];
    let mut total_bytes = 0u64;

    loop {
        let n = read_full(reader, &mut buffer).await?;
        if n == 0 {
            break; // EOF
        }

        let record = stage.transform(&buffer[..n])?;
        writer.write_all(&record).await?;
        total_bytes += n as u64;
    }

    writer.flush().await?;
    stage.close()?;
    Ok(total_bytes)
}

/// Decrypts records from reader onto writer, then closes the stage.
/// `read_size` only affects I/O granularity, never the output.
/// Returns the number of plaintext bytes written.
pub async fn decrypt_stream<R, W>(
    stage: &mut DecryptStage,
    reader: &mut R,
    writer: &mut W,
    read_size: Option<usize>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; read_size.unwrap_or(DEFAULT_READ_SIZE).max(1)];
    let mut total_bytes = 0u64;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break; // EOF
        }

        for plaintext in stage.transform(&buffer[..n])? {
            writer.write_all(&plaintext).await?;
            total_bytes += plaintext.len() as u64;
        }
    }

    writer.flush().await?;
    stage.close()?;
    Ok(total_bytes)
}

/// Encrypt `data` as a single chunk with the public key at `key_path`.
/// Returns the base64 record without terminator.
pub async fn encrypt_string(key_path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> Result<String> {
    let material = KeyMaterial::load(key_path).await?;
    let key = EncryptKey::from_material(&material)?;
    Ok(cipher::encode(&cipher::encrypt(&key, data.as_ref())?))
}

/// Decrypt a single chunk, raw or base64, with the private key at `key_path`.
pub async fn decrypt_string<'a>(
    key_path: impl AsRef<Path>,
    data: impl Into<Ciphertext<'a>>,
) -> Result<String> {
    let material = KeyMaterial::load(key_path).await?;
    let key = DecryptKey::from_material(&material)?;
    let plaintext = cipher::decrypt(&key, data)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptCopyError::cipher(format!("decrypted data is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::test_keys;
    use proptest::prelude::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    async fn ready_stages(dir: &Path) -> (EncryptStage, DecryptStage) {
        let (public, private) = test_keys::write_pem(dir);
        let mut enc = EncryptStage::new(public);
        let mut dec = DecryptStage::new(private);
        enc.init().await.expect("init encrypt stage");
        dec.init().await.expect("init decrypt stage");
        (enc, dec)
    }

    fn ready_decrypt_stage() -> DecryptStage {
        let (_, key) = test_keys::pair();
        DecryptStage {
            key_path: PathBuf::from("memory"),
            state: StageState::Ready(key),
            partial: Vec::new(),
            records: 0,
        }
    }

    fn records_for(plaintext: &[u8]) -> Vec<u8> {
        let (key, _) = test_keys::pair();
        let mut out = Vec::new();
        for chunk in plaintext.chunks(key.max_chunk_len()) {
            out.extend(cipher::encode(&cipher::encrypt(&key, chunk).unwrap()).into_bytes());
            out.push(TERMINATOR);
        }
        out
    }

    fn decrypt_in_pieces(encrypted: &[u8], piece: usize) -> Result<Vec<u8>> {
        let mut stage = ready_decrypt_stage();
        let mut out = Vec::new();
        for chunk in encrypted.chunks(piece) {
            for plaintext in stage.transform(chunk)? {
                out.extend(plaintext);
            }
        }
        stage.close()?;
        Ok(out)
    }

    #[tokio::test]
    async fn transform_before_init_fails() {
        let mut enc = EncryptStage::new("unused.pem");
        let mut dec = DecryptStage::new("unused.pem");

        assert!(matches!(enc.transform(b"x"), Err(CryptCopyError::NotInitialized)));
        assert!(matches!(dec.transform(b"x"), Err(CryptCopyError::NotInitialized)));
        assert!(matches!(enc.max_chunk_len(), Err(CryptCopyError::NotInitialized)));
    }

    #[tokio::test]
    async fn init_with_missing_key_fails() {
        let tmp = TempDir::new().unwrap();
        let mut dec = DecryptStage::new(tmp.path().join("missing"));

        assert!(matches!(dec.init().await, Err(CryptCopyError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn one_record_per_chunk() {
        let tmp = TempDir::new().unwrap();
        let (mut enc, mut dec) = ready_stages(tmp.path()).await;

        let first = enc.transform(b"I am test").unwrap();
        let second = enc.transform(b"again").unwrap();
        assert_eq!(first.iter().filter(|b| **b == TERMINATOR).count(), 1);
        assert_eq!(first.last(), Some(&TERMINATOR));
        assert_eq!(second.last(), Some(&TERMINATOR));

        let mut joined = first;
        joined.extend(second);
        let out = dec.transform(&joined).unwrap();
        assert_eq!(out, vec![b"I am test".to_vec(), b"again".to_vec()]);
        dec.close().unwrap();
    }

    #[test]
    fn empty_chunk_is_noop() {
        let mut stage = ready_decrypt_stage();
        let encrypted = records_for(b"hello");

        assert!(stage.transform(&encrypted[..5]).unwrap().is_empty());
        assert_eq!(stage.pending(), 5);
        assert!(stage.transform(b"").unwrap().is_empty());
        assert_eq!(stage.pending(), 5);

        let out = stage.transform(&encrypted[5..]).unwrap();
        assert_eq!(out, vec![b"hello".to_vec()]);
        assert_eq!(stage.pending(), 0);
    }

    #[test]
    fn single_byte_pieces_round_trip() {
        let plaintext = b"I am test".repeat(20);
        let encrypted = records_for(&plaintext);

        assert_eq!(decrypt_in_pieces(&encrypted, 1).unwrap(), plaintext);
    }

    #[test]
    fn boundary_insensitive_from_1_to_100000() {
        let plaintext: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let encrypted = records_for(&plaintext);

        for piece in [2, 3, 7, 64, 173, 175, 1000, 4096, 100_000] {
            assert_eq!(
                decrypt_in_pieces(&encrypted, piece).unwrap(),
                plaintext,
                "piece size {piece}"
            );
        }
    }

    #[test]
    fn truncated_final_record_is_incomplete_stream() {
        let encrypted = records_for(b"two records worth of data, long enough to span the limit of one");
        let truncated = &encrypted[..encrypted.len() - 1];

        let err = decrypt_in_pieces(truncated, 16).unwrap_err();
        assert!(matches!(err, CryptCopyError::IncompleteStream { pending } if pending > 0));
    }

    #[test]
    fn stage_is_unusable_after_close() {
        let mut stage = ready_decrypt_stage();
        stage.close().unwrap();

        assert!(matches!(stage.transform(b"x"), Err(CryptCopyError::AlreadyClosed)));
        assert!(matches!(stage.close(), Err(CryptCopyError::AlreadyClosed)));
    }

    #[test]
    fn corrupt_record_is_cipher_error() {
        let mut stage = ready_decrypt_stage();
        assert!(matches!(
            stage.transform(b"bm90IGEgcmVjb3Jk\n"),
            Err(CryptCopyError::Cipher(_))
        ));
    }

    #[test]
    fn unterminated_input_fails_within_one_record_length() {
        let mut stage = ready_decrypt_stage();
        let max_record = test_keys::pair().1.max_record_len();
        assert_eq!(max_record, 172);

        assert!(stage.transform(&vec![b'A'; max_record]).unwrap().is_empty());
        assert_eq!(stage.pending(), max_record);
        assert!(matches!(stage.transform(b"A"), Err(CryptCopyError::Cipher(_))));

        let mut stage = ready_decrypt_stage();
        let err = stage.transform(&vec![b'A'; 64 * 1024]).unwrap_err();
        assert!(matches!(err, CryptCopyError::Cipher(_)));
        assert_eq!(stage.pending(), 0);
    }

    #[test]
    fn failed_stage_stays_failed() {
        let mut stage = ready_decrypt_stage();
        let encrypted = records_for(b"lost");

        assert!(stage.transform(&encrypted[..50]).unwrap().is_empty());
        let mut rest = encrypted[50..].to_vec();
        rest.extend_from_slice(b"Zm9v\n");
        assert!(matches!(stage.transform(&rest), Err(CryptCopyError::Cipher(_))));

        assert!(matches!(stage.transform(&encrypted), Err(CryptCopyError::StageFailed)));
        assert!(matches!(stage.close(), Err(CryptCopyError::StageFailed)));
    }

    #[tokio::test]
    async fn decrypt_stream_stops_at_a_line_with_no_terminator() {
        let mut stage = ready_decrypt_stage();
        let garbage = vec![b'A'; 1024 * 1024];
        let mut out = Vec::new();

        let result = decrypt_stream(&mut stage, &mut Cursor::new(garbage), &mut out, Some(4096)).await;
        assert!(matches!(result, Err(CryptCopyError::Cipher(_))));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn stream_round_trip_with_small_reads() {
        let tmp = TempDir::new().unwrap();
        let (mut enc, mut dec) = ready_stages(tmp.path()).await;

        let plaintext = b"streaming encryption test data that spans multiple chunks when large enough".repeat(4);
        let mut reader = Cursor::new(plaintext.clone());
        let mut encrypted = Vec::new();
        let consumed = encrypt_stream(&mut enc, &mut reader, &mut encrypted, None)
            .await
            .expect("encryption failed");
        assert_eq!(consumed, plaintext.len() as u64);

        let expected_records = plaintext.len().div_ceil(62);
        assert_eq!(
            encrypted.iter().filter(|b| **b == TERMINATOR).count(),
            expected_records
        );

        let mut decrypted = Vec::new();
        let written = decrypt_stream(&mut dec, &mut Cursor::new(encrypted), &mut decrypted, Some(5))
            .await
            .expect("decryption failed");
        assert_eq!(written, plaintext.len() as u64);
        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn configured_read_size_is_capped_by_key_limit() {
        let tmp = TempDir::new().unwrap();
        let (mut enc, _) = ready_stages(tmp.path()).await;

        let plaintext = vec![1u8; 100];
        let mut encrypted = Vec::new();
        encrypt_stream(&mut enc, &mut Cursor::new(plaintext), &mut encrypted, Some(10_000))
            .await
            .expect("oversized read size must be clamped");
        assert_eq!(encrypted.iter().filter(|b| **b == TERMINATOR).count(), 2);
    }

    #[tokio::test]
    async fn string_helpers_round_trip() {
        let tmp = TempDir::new().unwrap();
        let (public, private) = test_keys::write_pem(tmp.path());

        let encrypted = encrypt_string(&public, "I am bbb").await.unwrap();
        assert!(!encrypted.contains('\n'));
        assert_eq!(decrypt_string(&private, &encrypted).await.unwrap(), "I am bbb");

        let raw = cipher::encrypt(&test_keys::pair().0, b"I am bbb").unwrap();
        assert_eq!(decrypt_string(&private, &raw).await.unwrap(), "I am bbb");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn any_split_decrypts_to_original(
            plaintext in proptest::collection::vec(any::<u8>(), 0..=300),
            piece in 1usize..=600,
        ) {
            let encrypted = records_for(&plaintext);
            let decrypted = decrypt_in_pieces(&encrypted, piece).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }
    }
}
