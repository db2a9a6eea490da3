//! Test-data resolver. The whole document is loaded and every `ENC[...]`
//! scalar decrypted up front; lookups afterwards only read the resolved tree.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::crypto::secrets::{CipherError, SecretCipher};
use crate::document::{load_document, ConfigDocument, DocumentError, DocumentSource, FileSource, Scalar};
use crate::events::{ResolverEvents, TracingEvents};

pub const MARKER_PREFIX: &str = "ENC[";
pub const MARKER_SUFFIX: &str = "]";

static EMPTY_SECTION: ConfigDocument = ConfigDocument::empty();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config source {identifier} not found: {reason}")]
    SourceNotFound { identifier: String, reason: String },
    #[error("config document {identifier} is malformed: {message}")]
    MalformedDocument { identifier: String, message: String },
    #[error("secret at {path} could not be resolved: {source}")]
    SecretResolution {
        path: DocPath,
        #[source]
        source: CipherError,
    },
}

impl From<DocumentError> for ConfigError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound { identifier } => ConfigError::SourceNotFound {
                identifier,
                reason: "no such document".to_string(),
            },
            DocumentError::Unreadable { identifier, source } => ConfigError::SourceNotFound {
                identifier,
                reason: source.to_string(),
            },
            DocumentError::Malformed {
                identifier,
                message,
                ..
            } => ConfigError::MalformedDocument { identifier, message },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a node inside a document, rendered as `$.section.key[2]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocPath(Vec<PathSegment>);

impl DocPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    fn pop(&mut self) {
        self.0.pop();
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Returns the payload of an `ENC[...]` scalar, or `None` for plain text.
pub fn encrypted_payload(text: &str) -> Option<&str> {
    text.strip_prefix(MARKER_PREFIX)?.strip_suffix(MARKER_SUFFIX)
}

/// Encrypts `plaintext` and wraps it in the `ENC[...]` marker.
pub fn seal(cipher: &SecretCipher, plaintext: &str) -> Result<String, CipherError> {
    Ok(format!("{MARKER_PREFIX}{}{MARKER_SUFFIX}", cipher.encrypt(plaintext)?))
}

/// Returns a copy of `node` with every `ENC[...]` scalar replaced by its
/// plaintext. The first secret that fails to decrypt aborts the walk.
pub fn materialize(
    cipher: &SecretCipher,
    node: &ConfigDocument,
    events: &dyn ResolverEvents,
) -> Result<ConfigDocument, ConfigError> {
    let mut path = DocPath::root();
    walk(cipher, node, &mut path, events)
}

fn walk(
    cipher: &SecretCipher,
    node: &ConfigDocument,
    path: &mut DocPath,
    events: &dyn ResolverEvents,
) -> Result<ConfigDocument, ConfigError> {
    match node {
        ConfigDocument::Mapping(entries) => {
            let mut resolved = BTreeMap::new();
            for (key, value) in entries {
                path.push(PathSegment::Key(key.clone()));
                let value = walk(cipher, value, path, events)?;
                path.pop();
                resolved.insert(key.clone(), value);
            }
            Ok(ConfigDocument::Mapping(resolved))
        }
        ConfigDocument::Sequence(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push(PathSegment::Index(index));
                resolved.push(walk(cipher, item, path, events)?);
                path.pop();
            }
            Ok(ConfigDocument::Sequence(resolved))
        }
        ConfigDocument::Scalar(Scalar::String(text)) => match encrypted_payload(text) {
            Some(payload) => {
                let plaintext = cipher
                    .decrypt(payload)
                    .map_err(|source| ConfigError::SecretResolution {
                        path: path.clone(),
                        source,
                    })?;
                events.secret_decrypted(path);
                Ok(ConfigDocument::Scalar(Scalar::String(plaintext)))
            }
            None => Ok(node.clone()),
        },
        ConfigDocument::Scalar(_) => Ok(node.clone()),
    }
}

/// Fully decrypted test data, addressed by top-level section name.
///
/// The tree is resolved once at construction and never reloaded.
pub struct ConfigResolver {
    identifier: String,
    data: ConfigDocument,
    events: Arc<dyn ResolverEvents>,
}

impl ConfigResolver {
    /// Reads `path` from disk and resolves it with `cipher`.
    pub fn open(cipher: &SecretCipher, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let identifier = path.as_ref().to_string_lossy().into_owned();
        Self::load(cipher, &FileSource::default(), &identifier)
    }

    pub fn load<S: DocumentSource + ?Sized>(
        cipher: &SecretCipher,
        source: &S,
        identifier: &str,
    ) -> Result<Self, ConfigError> {
        Self::load_with_events(cipher, source, identifier, Arc::new(TracingEvents))
    }

    pub fn load_with_events<S: DocumentSource + ?Sized>(
        cipher: &SecretCipher,
        source: &S,
        identifier: &str,
        events: Arc<dyn ResolverEvents>,
    ) -> Result<Self, ConfigError> {
        let document = load_document(source, identifier)?;
        events.document_loaded(identifier);
        Self::from_document(cipher, identifier, &document, events)
    }

    /// Resolves an already parsed document.
    pub fn from_document(
        cipher: &SecretCipher,
        identifier: &str,
        document: &ConfigDocument,
        events: Arc<dyn ResolverEvents>,
    ) -> Result<Self, ConfigError> {
        let data = materialize(cipher, document, events.as_ref())?;
        Ok(Self {
            identifier: identifier.to_string(),
            data,
            events,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the section called `name`, or an empty mapping when absent.
    pub fn get_section(&self, name: &str) -> &ConfigDocument {
        let section = self.data.get(name);
        self.events.section_lookup(name, section.is_some());
        section.unwrap_or(&EMPTY_SECTION)
    }

    pub fn get_all(&self) -> &ConfigDocument {
        &self.data
    }
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections: Vec<&str> = self
            .data
            .as_mapping()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        f.debug_struct("ConfigResolver")
            .field("identifier", &self.identifier)
            .field("sections", &sections)
            .finish_non_exhaustive()
    }
}
