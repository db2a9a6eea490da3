//! Framework properties: where the test data and locator files live, which
//! platform to target, and the key that unlocks the test data. Values come
//! from an optional YAML/JSON file and are then overridden by environment
//! variables.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::config::{ConfigError, ConfigResolver};
use crate::crypto::secrets::{CipherError, SecretCipher};
use crate::document::{Format, FileSource};
use crate::locators::{LocatorError, Platform, ScopedLocatorStore};

pub const ENV_KEY: &str = "SEALED_CONF_KEY";
pub const ENV_DATA: &str = "SEALED_CONF_DATA";
pub const ENV_LOCATORS: &str = "SEALED_CONF_LOCATORS";
pub const ENV_PLATFORM: &str = "SEALED_CONF_PLATFORM";
pub const ENV_LOG: &str = "SEALED_CONF_LOG";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file {path} unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {path} could not be parsed: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("no encryption key configured (set SEALED_CONF_KEY or encryption_key)")]
    MissingKey,
    #[error(transparent)]
    Key(#[from] CipherError),
    #[error(transparent)]
    Platform(#[from] LocatorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct FrameworkProperties {
    pub encryption_key: Option<String>,
    pub test_data_file: PathBuf,
    pub locators_dir: PathBuf,
    pub platform: Platform,
    pub log_level: String,
}

impl Default for FrameworkProperties {
    fn default() -> Self {
        Self {
            encryption_key: None,
            test_data_file: PathBuf::from("test_data.yml"),
            locators_dir: PathBuf::from("."),
            platform: Platform::Windows,
            log_level: "INFO".to_string(),
        }
    }
}

impl FrameworkProperties {
    /// Reads properties from a YAML or JSON file; missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| SettingsError::Parse {
            path: path.to_path_buf(),
            message,
        };

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        match Format::detect(&path.to_string_lossy()) {
            Format::Json => serde_json::from_str(&raw).map_err(|e| parse_error(e.to_string())),
            Format::Yaml => serde_yaml::from_str(&raw).map_err(|e| parse_error(e.to_string())),
        }
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut properties = Self::default();
        properties.apply_env(|name| std::env::var(name).ok())?;
        Ok(properties)
    }

    /// Overrides fields from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_KEY) {
            self.encryption_key = Some(key);
        }
        if let Some(data) = lookup(ENV_DATA) {
            self.test_data_file = PathBuf::from(data);
        }
        if let Some(dir) = lookup(ENV_LOCATORS) {
            self.locators_dir = PathBuf::from(dir);
        }
        if let Some(platform) = lookup(ENV_PLATFORM) {
            self.platform = platform.parse()?;
        }
        if let Some(level) = lookup(ENV_LOG) {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn cipher(&self) -> Result<SecretCipher, SettingsError> {
        let key = self.encryption_key.as_deref().ok_or(SettingsError::MissingKey)?;
        Ok(SecretCipher::from_encoded_key(key)?)
    }

    /// Loads and decrypts the configured test data file.
    pub fn data_resolver(&self) -> Result<ConfigResolver, SettingsError> {
        let cipher = self.cipher()?;
        Ok(ConfigResolver::open(&cipher, &self.test_data_file)?)
    }

    /// Locator store for the configured platform; reads nothing yet.
    pub fn locator_store(&self) -> ScopedLocatorStore<FileSource> {
        ScopedLocatorStore::new(self.platform, FileSource::new(&self.locators_dir))
    }
}

impl fmt::Debug for FrameworkProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameworkProperties")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .field("test_data_file", &self.test_data_file)
            .field("locators_dir", &self.locators_dir)
            .field("platform", &self.platform)
            .field("log_level", &self.log_level)
            .finish()
    }
}
