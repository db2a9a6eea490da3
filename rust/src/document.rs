//! Structured documents shared by the test-data resolver and the locator
//! store: a typed tree, the sources it is read from, and format detection.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found: {identifier}")]
    NotFound { identifier: String },
    #[error("document {identifier} unreadable: {source}")]
    Unreadable {
        identifier: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {format} document {identifier}: {message}")]
    Malformed {
        identifier: String,
        format: &'static str,
        message: String,
    },
}

impl DocumentError {
    pub fn identifier(&self) -> &str {
        match self {
            DocumentError::NotFound { identifier }
            | DocumentError::Unreadable { identifier, .. }
            | DocumentError::Malformed { identifier, .. } => identifier,
        }
    }
}

/// Leaf value of a [`ConfigDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Arbitrary-depth tree of mappings, sequences and scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigDocument {
    Mapping(BTreeMap<String, ConfigDocument>),
    Sequence(Vec<ConfigDocument>),
    Scalar(Scalar),
}

impl ConfigDocument {
    pub const fn empty() -> Self {
        ConfigDocument::Mapping(BTreeMap::new())
    }

    /// Looks up `key` when this node is a mapping.
    pub fn get(&self, key: &str) -> Option<&ConfigDocument> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, ConfigDocument>> {
        match self {
            ConfigDocument::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigDocument]> {
        match self {
            ConfigDocument::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigDocument::Scalar(Scalar::String(text)) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigDocument::Scalar(Scalar::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    /// Renders string, number and boolean scalars as text.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            ConfigDocument::Scalar(Scalar::String(text)) => Some(text.clone()),
            ConfigDocument::Scalar(Scalar::Integer(value)) => Some(value.to_string()),
            ConfigDocument::Scalar(Scalar::Float(value)) => Some(value.to_string()),
            ConfigDocument::Scalar(Scalar::Bool(value)) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn is_empty_mapping(&self) -> bool {
        matches!(self, ConfigDocument::Mapping(map) if map.is_empty())
    }
}

impl From<&str> for ConfigDocument {
    fn from(value: &str) -> Self {
        ConfigDocument::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for ConfigDocument {
    fn from(value: String) -> Self {
        ConfigDocument::Scalar(Scalar::String(value))
    }
}

impl From<i64> for ConfigDocument {
    fn from(value: i64) -> Self {
        ConfigDocument::Scalar(Scalar::Integer(value))
    }
}

impl From<bool> for ConfigDocument {
    fn from(value: bool) -> Self {
        ConfigDocument::Scalar(Scalar::Bool(value))
    }
}

impl<K: Into<String>> FromIterator<(K, ConfigDocument)> for ConfigDocument {
    fn from_iter<I: IntoIterator<Item = (K, ConfigDocument)>>(iter: I) -> Self {
        ConfigDocument::Mapping(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Supplies raw document text by identifier.
pub trait DocumentSource {
    fn read(&self, identifier: &str) -> Result<String, DocumentError>;
}

impl<T: DocumentSource + ?Sized> DocumentSource for &T {
    fn read(&self, identifier: &str) -> Result<String, DocumentError> {
        (**self).read(identifier)
    }
}

/// Reads documents from disk, resolving identifiers against a root directory.
/// Absolute identifiers bypass the root.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }
}

impl DocumentSource for FileSource {
    fn read(&self, identifier: &str) -> Result<String, DocumentError> {
        let path = self.path_for(identifier);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(DocumentError::NotFound {
                    identifier: path.display().to_string(),
                });
            }
            Err(source) => {
                return Err(DocumentError::Unreadable {
                    identifier: path.display().to_string(),
                    source,
                });
            }
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|source| DocumentError::Unreadable {
                identifier: path.display().to_string(),
                source,
            })?;
        drop(file);

        String::from_utf8(bytes).map_err(|err| DocumentError::Malformed {
            identifier: path.display().to_string(),
            format: Format::detect(identifier).label(),
            message: format!("document is not valid UTF-8: {}", err.utf8_error()),
        })
    }
}

/// In-memory documents keyed by identifier. Counts every read attempt so
/// callers can observe when a component goes back to its source.
#[derive(Debug, Default)]
pub struct MemorySource {
    documents: HashMap<String, String>,
    reads: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, identifier: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(identifier, text);
        self
    }

    pub fn insert(&mut self, identifier: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(identifier.into(), text.into());
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl DocumentSource for MemorySource {
    fn read(&self, identifier: &str) -> Result<String, DocumentError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.documents
            .get(identifier)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound {
                identifier: identifier.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// Picks the format from the identifier's extension; YAML unless it ends in `.json`.
    pub fn detect(identifier: &str) -> Self {
        let extension = Path::new(identifier)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");
        if extension.eq_ignore_ascii_case("json") {
            Format::Json
        } else {
            Format::Yaml
        }
    }

    fn label(self) -> &'static str {
        match self {
            Format::Yaml => "YAML",
            Format::Json => "JSON",
        }
    }
}

/// Reads and parses one document from `source`.
pub fn load_document<S: DocumentSource + ?Sized>(
    source: &S,
    identifier: &str,
) -> Result<ConfigDocument, DocumentError> {
    let text = source.read(identifier)?;
    parse_document(identifier, &text)
}

/// Parses `text` into a [`ConfigDocument`]. An empty document is the empty mapping.
pub fn parse_document(identifier: &str, text: &str) -> Result<ConfigDocument, DocumentError> {
    let format = Format::detect(identifier);
    let malformed = |message: String| DocumentError::Malformed {
        identifier: identifier.to_string(),
        format: format.label(),
        message,
    };

    if text.trim().is_empty() {
        return Ok(ConfigDocument::empty());
    }

    let document = match format {
        Format::Yaml => {
            let value: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(|e| malformed(e.to_string()))?;
            from_yaml(value).map_err(malformed)?
        }
        Format::Json => {
            let value: serde_json::Value =
                serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
            from_json(value)
        }
    };

    Ok(match document {
        ConfigDocument::Scalar(Scalar::Null) => ConfigDocument::empty(),
        other => other,
    })
}

fn from_yaml(value: serde_yaml::Value) -> Result<ConfigDocument, String> {
    use serde_yaml::Value;

    Ok(match value {
        Value::Null => ConfigDocument::Scalar(Scalar::Null),
        Value::Bool(flag) => ConfigDocument::Scalar(Scalar::Bool(flag)),
        Value::Number(number) => ConfigDocument::Scalar(yaml_number(&number)),
        Value::String(text) => ConfigDocument::Scalar(Scalar::String(text)),
        Value::Sequence(items) => ConfigDocument::Sequence(
            items.into_iter().map(from_yaml).collect::<Result<_, _>>()?,
        ),
        Value::Mapping(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                let key = match key {
                    Value::String(text) => text,
                    Value::Bool(flag) => flag.to_string(),
                    Value::Number(number) => number.to_string(),
                    other => return Err(format!("unsupported mapping key: {other:?}")),
                };
                if map.contains_key(&key) {
                    return Err(format!("duplicate mapping key '{key}'"));
                }
                map.insert(key, from_yaml(value)?);
            }
            ConfigDocument::Mapping(map)
        }
        Value::Tagged(tagged) => {
            return Err(format!("unsupported YAML tag {}", tagged.tag));
        }
    })
}

fn yaml_number(number: &serde_yaml::Number) -> Scalar {
    if let Some(value) = number.as_i64() {
        Scalar::Integer(value)
    } else {
        Scalar::Float(number.as_f64().unwrap_or(f64::NAN))
    }
}

fn from_json(value: serde_json::Value) -> ConfigDocument {
    use serde_json::Value;

    match value {
        Value::Null => ConfigDocument::Scalar(Scalar::Null),
        Value::Bool(flag) => ConfigDocument::Scalar(Scalar::Bool(flag)),
        Value::Number(number) => ConfigDocument::Scalar(match number.as_i64() {
            Some(value) => Scalar::Integer(value),
            None => Scalar::Float(number.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(text) => ConfigDocument::Scalar(Scalar::String(text)),
        Value::Array(items) => ConfigDocument::Sequence(items.into_iter().map(from_json).collect()),
        Value::Object(entries) => ConfigDocument::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect(),
        ),
    }
}
