//! Authenticated string cipher built on ChaCha20-Poly1305.
//! A token is `version || issued-at || nonce || ciphertext + tag`, where the
//! version byte and timestamp travel in the clear but are bound to the tag as
//! associated data. Tokens are URL-safe base64 wrapped once more in standard
//! base64 so they survive being pasted into YAML scalars.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key as AeadKey, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_SIZE: usize = 16;
const TOKEN_VERSION: u8 = 0x80;
const HEADER_LEN: usize = 1 + 8;
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

/// Symmetric key material. The canonical text form is URL-safe base64 with
/// padding, 44 characters for the 32 key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Draws a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Parses the canonical URL-safe base64 form.
    pub fn from_encoded(encoded: &str) -> Result<Self, CipherError> {
        let mut decoded = URL_SAFE
            .decode(encoded.trim().as_bytes())
            .map_err(|e| CipherError::InvalidKey(format!("base64 decoding failed: {e}")))?;
        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }
}

impl FromStr for Key {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_encoded(s)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Encrypts and decrypts strings under exactly one key.
///
/// The cipher holds no mutable state, so a shared reference can be used from
/// several threads at once.
pub struct SecretCipher {
    key: Key,
}

impl SecretCipher {
    pub fn generate_key() -> Key {
        Key::generate()
    }

    pub fn new(key: Key) -> Self {
        Self { key }
    }

    /// Builds a cipher from the text form of a key, failing with
    /// [`CipherError::InvalidKey`] on bad encoding or length.
    pub fn from_encoded_key(encoded: &str) -> Result<Self, CipherError> {
        Key::from_encoded(encoded).map(Self::new)
    }

    /// Encrypts `plaintext` into a transport-safe token. Each call draws a new
    /// nonce, so encrypting the same text twice yields different tokens.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let issued = unix_now().map_err(CipherError::EncryptionFailed)?;
        self.encrypt_at(plaintext, issued)
    }

    /// Decrypts a token produced by [`SecretCipher::encrypt`] under the same key.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        self.open(ciphertext).map(|(_, plaintext)| plaintext)
    }

    /// Like [`SecretCipher::decrypt`], but also rejects tokens issued more
    /// than `ttl` ago or stamped too far in the future.
    pub fn decrypt_with_ttl(&self, ciphertext: &str, ttl: Duration) -> Result<String, CipherError> {
        let (issued, plaintext) = self.open(ciphertext)?;
        let now = unix_now().map_err(CipherError::InvalidCiphertext)?;
        if issued > now.saturating_add(MAX_CLOCK_SKEW.as_secs()) {
            return Err(CipherError::InvalidCiphertext(
                "token timestamp is in the future".to_string(),
            ));
        }
        if issued.saturating_add(ttl.as_secs()) < now {
            return Err(CipherError::InvalidCiphertext("token has expired".to_string()));
        }
        Ok(plaintext)
    }

    fn aead(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(AeadKey::from_slice(&self.key.0))
    }

    fn encrypt_at(&self, plaintext: &str, issued: u64) -> Result<String, CipherError> {
        let header = token_header(issued);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .aead()
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &header,
                },
            )
            .map_err(|e| CipherError::EncryptionFailed(format!("{e}")))?;

        let mut token = Vec::with_capacity(HEADER_LEN + NONCE_LEN + sealed.len());
        token.extend_from_slice(&header);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&sealed);
        Ok(STANDARD.encode(URL_SAFE.encode(token)))
    }

    fn open(&self, ciphertext: &str) -> Result<(u64, String), CipherError> {
        let inner = STANDARD
            .decode(ciphertext.trim().as_bytes())
            .map_err(|e| CipherError::InvalidCiphertext(format!("outer base64 decoding failed: {e}")))?;
        let token = URL_SAFE
            .decode(&inner)
            .map_err(|e| CipherError::InvalidCiphertext(format!("token base64 decoding failed: {e}")))?;

        if token.len() < HEADER_LEN + NONCE_LEN + TAG_SIZE {
            return Err(CipherError::InvalidCiphertext("token too short".to_string()));
        }
        if token[0] != TOKEN_VERSION {
            return Err(CipherError::InvalidCiphertext(format!(
                "unsupported token version 0x{:02x}",
                token[0]
            )));
        }

        let (header, rest) = token.split_at(HEADER_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&header[1..]);
        let issued = u64::from_be_bytes(stamp);

        let plaintext = self
            .aead()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: header,
                },
            )
            .map_err(|_| CipherError::InvalidCiphertext("authentication failed".to_string()))?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|e| CipherError::InvalidCiphertext(format!("plaintext is not UTF-8: {e}")))?;
        Ok((issued, plaintext))
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").field("key", &self.key).finish()
    }
}

fn token_header(issued: u64) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = TOKEN_VERSION;
    header[1..].copy_from_slice(&issued.to_be_bytes());
    header
}

fn unix_now() -> Result<u64, String> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|e| format!("system clock before unix epoch: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new(SecretCipher::generate_key())
    }

    #[test]
    fn encrypts_and_decrypts_round_trip() {
        let cipher = cipher();
        for text in ["Hello, World!", "", "!@#$%^&*()_+-=[]{}|;:,.<>?", "päss wörd ✓\n\t"] {
            let token = cipher.encrypt(text).expect("encryption should succeed");
            assert_ne!(token, text);
            assert_eq!(cipher.decrypt(&token).expect("decryption should succeed"), text);
        }
    }

    #[test]
    fn encryption_is_randomized() {
        let cipher = cipher();
        let first = cipher.encrypt("same").expect("encrypt");
        let second = cipher.encrypt("same").expect("encrypt");
        assert_ne!(first, second);
    }

    #[test]
    fn generated_keys_are_distinct_and_canonical() {
        let first = SecretCipher::generate_key();
        let second = SecretCipher::generate_key();
        assert_ne!(first, second);

        let encoded = first.encode();
        assert_eq!(encoded.len(), 44);
        assert_eq!(Key::from_encoded(&encoded).expect("round trip"), first);
    }

    #[test]
    fn rejects_bad_keys() {
        let err = Key::from_bytes(&[1u8; 16]).unwrap_err();
        assert!(matches!(err, CipherError::InvalidKey(_)));

        let err = SecretCipher::from_encoded_key("not a key!").unwrap_err();
        assert!(matches!(err, CipherError::InvalidKey(_)));

        let short = URL_SAFE.encode([9u8; 31]);
        assert!(matches!(
            SecretCipher::from_encoded_key(&short),
            Err(CipherError::InvalidKey(_))
        ));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let token = cipher().encrypt("Test message").expect("encrypt");
        let err = cipher().decrypt(&token).unwrap_err();
        assert!(matches!(err, CipherError::InvalidCiphertext(_)));
    }

    #[test]
    fn handles_invalid_ciphertext() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt("invalid-data"),
            Err(CipherError::InvalidCiphertext(_))
        ));
        assert!(matches!(cipher.decrypt(""), Err(CipherError::InvalidCiphertext(_))));

        let short = STANDARD.encode(URL_SAFE.encode([TOKEN_VERSION; 10]));
        assert!(matches!(cipher.decrypt(&short), Err(CipherError::InvalidCiphertext(_))));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let cipher = cipher();
        let token = cipher.encrypt("payload").expect("encrypt");
        let mut raw = URL_SAFE
            .decode(STANDARD.decode(&token).expect("outer"))
            .expect("inner");

        // Flip the timestamp; it is authenticated as associated data.
        raw[3] ^= 0x01;
        let forged = STANDARD.encode(URL_SAFE.encode(&raw));
        assert!(matches!(cipher.decrypt(&forged), Err(CipherError::InvalidCiphertext(_))));

        raw[3] ^= 0x01;
        raw[0] = 0x81;
        let forged = STANDARD.encode(URL_SAFE.encode(&raw));
        let err = cipher.decrypt(&forged).unwrap_err();
        assert!(format!("{err}").contains("unsupported token version"));
    }

    #[test]
    fn ttl_rejects_expired_and_future_tokens() {
        let cipher = cipher();
        let now = unix_now().expect("clock");
        let ttl = Duration::from_secs(300);

        let fresh = cipher.encrypt_at("fresh", now).expect("encrypt");
        assert_eq!(cipher.decrypt_with_ttl(&fresh, ttl).expect("fresh token"), "fresh");

        let stale = cipher.encrypt_at("stale", now - 3_600).expect("encrypt");
        assert!(matches!(
            cipher.decrypt_with_ttl(&stale, ttl),
            Err(CipherError::InvalidCiphertext(_))
        ));
        assert_eq!(cipher.decrypt(&stale).expect("no ttl enforced"), "stale");

        let future = cipher.encrypt_at("future", now + 3_600).expect("encrypt");
        assert!(matches!(
            cipher.decrypt_with_ttl(&future, ttl),
            Err(CipherError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn debug_output_redacts_key() {
        let cipher = cipher();
        let rendered = format!("{cipher:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&cipher.key.encode()));
    }
}
