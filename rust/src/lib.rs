//! Encrypted test-data resolver and per-platform locator store for UI test
//! suites. Secrets sit in the data files as `ENC[...]` scalars and are only
//! ever decrypted in memory; locators are read lazily, one screen at a time.

pub mod config;
pub mod crypto;
pub mod document;
pub mod events;
pub mod locators;
pub mod settings;

pub use config::{ConfigError, ConfigResolver};
pub use crypto::{CipherError, Key, SecretCipher};
pub use document::{ConfigDocument, DocumentSource, FileSource, MemorySource, Scalar};
pub use locators::{LocatorEntry, LocatorError, Platform, ScopedLocatorStore, StrategyKind};
pub use settings::FrameworkProperties;
