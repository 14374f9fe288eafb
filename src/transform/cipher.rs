use std::fmt;

use aes_gcm::{
    Aes256Gcm,
    aead::{Aead, AeadCore, KeyInit, Nonce, OsRng, generic_array::typenum::Unsigned},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::ChaCha20Poly1305;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Failures raised by a cipher provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Key material has the wrong length
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKey(usize),

    /// Ciphertext is not valid base64 or is too short to hold a nonce
    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    /// Authentication failed: the ciphertext was tampered with or the key differs
    #[error("authentication failed")]
    Authentication,

    /// Decrypted bytes are not valid UTF-8
    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,

    /// The cipher refused to encrypt
    #[error("encryption failed")]
    Encrypt,
}

/// Pluggable symmetric cipher used by the encryption stage.
///
/// Ciphertext is an opaque printable string; the engine's marker prefix is
/// added and stripped outside the provider.
pub trait CipherProvider: Send + Sync {
    /// Short algorithm name for logs.
    fn name(&self) -> &str;

    /// Encrypts `plaintext`.
    ///
    /// # Errors
    /// Returns `CipherError::Encrypt` if the underlying cipher fails.
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    /// Decrypts ciphertext produced by [`CipherProvider::encrypt`].
    ///
    /// # Errors
    /// Returns an error on malformed, tampered or wrong-key input.
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// AEAD-backed provider producing `base64(nonce || ciphertext)`.
///
/// A fresh random nonce is drawn for every encryption, so encrypting the same
/// plaintext twice yields different output.
pub struct AeadCipher<A> {
    name: &'static str,
    aead: A,
}

/// AES-256-GCM provider.
pub type AesGcmCipher = AeadCipher<Aes256Gcm>;

/// ChaCha20-Poly1305 provider.
pub type ChaChaCipher = AeadCipher<ChaCha20Poly1305>;

impl AesGcmCipher {
    /// Creates a provider from 32 bytes of key material.
    ///
    /// # Errors
    /// Returns `CipherError::InvalidKey` if `key` is not 32 bytes long.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        AeadCipher::with_key("aes-256-gcm", key)
    }

    /// Creates a provider keyed by the SHA-256 digest of `passphrase`.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self {
            name: "aes-256-gcm",
            aead: Aes256Gcm::new(&passphrase_key(passphrase)),
        }
    }
}

impl ChaChaCipher {
    /// Creates a provider from 32 bytes of key material.
    ///
    /// # Errors
    /// Returns `CipherError::InvalidKey` if `key` is not 32 bytes long.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        AeadCipher::with_key("chacha20-poly1305", key)
    }

    /// Creates a provider keyed by the SHA-256 digest of `passphrase`.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self {
            name: "chacha20-poly1305",
            aead: ChaCha20Poly1305::new(&passphrase_key(passphrase)),
        }
    }
}

impl<A> AeadCipher<A>
where
    A: Aead + AeadCore + KeyInit,
{
    fn with_key(name: &'static str, key: &[u8]) -> Result<Self, CipherError> {
        let aead = A::new_from_slice(key).map_err(|_| CipherError::InvalidKey(key.len()))?;
        Ok(Self { name, aead })
    }
}

fn passphrase_key(passphrase: &str) -> aes_gcm::Key<Aes256Gcm> {
    Sha256::digest(passphrase.as_bytes())
}

impl<A> CipherProvider for AeadCipher<A>
where
    A: Aead + AeadCore + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = A::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut payload = Vec::with_capacity(nonce.len() + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(payload))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let payload = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CipherError::Malformed(e.to_string()))?;

        let nonce_len = A::NonceSize::USIZE;
        if payload.len() < nonce_len {
            return Err(CipherError::Malformed(format!(
                "payload of {} bytes is shorter than the {nonce_len}-byte nonce",
                payload.len()
            )));
        }

        let (nonce, sealed) = payload.split_at(nonce_len);
        let plaintext = self
            .aead
            .decrypt(Nonce::<A>::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Authentication)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}

impl<A> fmt::Debug for AeadCipher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadCipher").field("name", &self.name).finish()
    }
}
