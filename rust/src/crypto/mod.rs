//! Cryptography for secret-bearing configuration. Only symmetric encryption of
//! scalar strings lives here; key storage is left to the caller.

pub mod secrets;

pub use secrets::{CipherError, Key, SecretCipher};
