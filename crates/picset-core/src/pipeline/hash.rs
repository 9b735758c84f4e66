//! Content identity and options tokens.
//!
//! Both tokens are BLAKE3 digests rendered in a filename- and URL-safe
//! base-60 alphabet and truncated to a short fixed length.

use blake3::Hasher as Blake3Hasher;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::{PipelineError, PipelineResult};
use crate::types::SourceIdentity;

/// Alphabet for token rendering. Omits `I`, `O`, `l` and `o`.
const ALPHABET: &[u8; 60] = b"_-0123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz";

/// Length of a content identity token.
pub const IDENTITY_LEN: usize = 8;

/// Length of an options token.
pub const OPTIONS_TOKEN_LEN: usize = 4;

/// Derives stable tokens from file content and encode parameters.
pub struct Hasher;

impl Hasher {
    /// Derive the content identity of a file.
    ///
    /// Streams the file so large sources are never fully buffered.
    pub async fn content_identity(path: &Path) -> PipelineResult<SourceIdentity> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let mut hasher = Blake3Hasher::new();

        let mut buffer = vec![0u8; 65536];
        loop {
            let bytes_read = file
                .read(&mut buffer)
                .await
                .map_err(|e| PipelineError::io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        let token = encode(hasher.finalize().as_bytes(), IDENTITY_LEN);
        Ok(SourceIdentity::new(token))
    }

    /// Derive the content identity of an in-memory buffer.
    pub fn identity_from_bytes(data: &[u8]) -> SourceIdentity {
        SourceIdentity::new(Self::token(data, IDENTITY_LEN))
    }

    /// Derive the short token that disambiguates encode settings.
    pub fn options_token(params: &str) -> String {
        Self::token(params.as_bytes(), OPTIONS_TOKEN_LEN)
    }

    /// Digest `data` and render the first `len` characters.
    pub fn token(data: &[u8], len: usize) -> String {
        encode(blake3::hash(data).as_bytes(), len)
    }
}

/// Render `digest` as a big-endian base-60 number, keeping `len` characters.
///
/// Each leading zero byte becomes one leading `_`, like base58 does for `1`.
fn encode(digest: &[u8], len: usize) -> String {
    let base = ALPHABET.len() as u32;
    let zeros = digest.iter().take_while(|&&b| b == 0).count();

    // Little-endian base-60 digits of the non-zero tail.
    let mut digits: Vec<u8> = Vec::with_capacity(digest.len() * 2);
    for &byte in &digest[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % base) as u8;
            carry /= base;
        }
        while carry > 0 {
            digits.push((carry % base) as u8);
            carry /= base;
        }
    }

    std::iter::repeat(ALPHABET[0])
        .take(zeros)
        .chain(digits.iter().rev().map(|&d| ALPHABET[d as usize]))
        .take(len)
        .map(char::from)
        .collect()
}
