//! Password gate for sealed snapshots.
//!
//! PBKDF2-HMAC-SHA1 (32-byte key, salt from the snapshot) then AES-256-CBC
//! with PKCS#7 padding. There is no integrity tag: a decryption counts as
//! successful exactly when the plaintext parses as JSON.

use aes::Aes256;
use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tracing::debug;

use crate::constants::constants;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;

/// The locked snapshot schema. All binary fields are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSnapshot {
  pub encrypted: bool,
  pub salt: String,
  pub iv: String,
  pub content: String,
}

/// Every failure mode collapses into one: callers cannot tell a wrong
/// password from corrupt data.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecryptError {
  #[error("wrong password or corrupt data")]
  Rejected,
}

pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
  let mut key = [0u8; KEY_LEN];
  pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut key);
  key
}

fn try_decrypt(sealed: &SealedSnapshot, password: &str, iterations: u32) -> Result<serde_json::Value> {
  let salt = BASE64.decode(sealed.salt.trim()).context("salt is not base64")?;
  let iv = BASE64.decode(sealed.iv.trim()).context("iv is not base64")?;
  let mut buf = BASE64.decode(sealed.content.trim()).context("content is not base64")?;

  let key = derive_key(password, &salt, iterations);
  let cipher = Aes256CbcDec::new_from_slices(&key, &iv).map_err(|e| anyhow!("bad key/iv length: {e}"))?;
  let plain = cipher.decrypt_padded_mut::<Pkcs7>(&mut buf).map_err(|e| anyhow!("padding check failed: {e}"))?;
  let text = std::str::from_utf8(plain).context("plaintext is not UTF-8")?;
  serde_json::from_str(text).context("plaintext is not JSON")
}

/// Decrypt a sealed snapshot into its JSON document.
///
/// Deterministic and synchronous; retrying with another password is just
/// another call.
pub fn decrypt_snapshot(sealed: &SealedSnapshot, password: &str) -> Result<serde_json::Value, DecryptError> {
  try_decrypt(sealed, password, constants().kdf_iterations).map_err(|e| {
    debug!(err = %format!("{e:#}"), "crypto: decryption rejected");
    DecryptError::Rejected
  })
}

/// Encrypt `plaintext` with an explicit salt and IV.
pub fn seal_with(plaintext: &[u8], password: &str, salt: [u8; SALT_LEN], iv: [u8; IV_LEN]) -> Result<SealedSnapshot> {
  let key = derive_key(password, &salt, constants().kdf_iterations);
  let cipher = Aes256CbcEnc::new_from_slices(&key, &iv).map_err(|e| anyhow!("bad key/iv length: {e}"))?;

  let msg_len = plaintext.len();
  let mut buf = vec![0u8; msg_len + IV_LEN];
  buf[..msg_len].copy_from_slice(plaintext);
  let ciphertext =
    cipher.encrypt_padded_mut::<Pkcs7>(&mut buf, msg_len).map_err(|e| anyhow!("padding failed: {e}"))?;

  Ok(SealedSnapshot {
    encrypted: true,
    salt: BASE64.encode(salt),
    iv: BASE64.encode(iv),
    content: BASE64.encode(ciphertext),
  })
}

/// Encrypt `plaintext` with a fresh random salt and IV.
pub fn seal(plaintext: &[u8], password: &str) -> Result<SealedSnapshot> {
  seal_with(plaintext, password, rand::random(), rand::random())
}
