//! Per-platform UI locator store.
//!
//! Locator files are named `locators_<platform>.yml` and map
//! screen -> element -> `{type, value}`. The store reads nothing until the
//! first lookup, then caches one screen at a time. A screen that is not yet
//! cached causes the whole platform file to be read again, even if another
//! screen from the same file was loaded earlier.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::document::{load_document, ConfigDocument, DocumentError, DocumentSource, FileSource, Scalar};
use crate::events::{ResolverEvents, TracingEvents};

/// Raw, unvalidated entries of one screen keyed by element name.
pub type ScreenLocators = BTreeMap<String, ConfigDocument>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Screen,
    Element,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Missing::Screen => "screen",
            Missing::Element => "element",
        })
    }
}

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("locators file for {platform} not found ({identifier}): {reason}")]
    ScopeFileMissing {
        platform: Platform,
        identifier: String,
        reason: String,
    },
    #[error("locators file for {platform} is malformed ({identifier}): {message}")]
    MalformedScopeFile {
        platform: Platform,
        identifier: String,
        message: String,
    },
    #[error("{missing} not found: element '{element}' in screen '{screen}' ({platform})")]
    LocatorNotFound {
        platform: Platform,
        screen: String,
        element: String,
        missing: Missing,
    },
    #[error("screen '{screen}' not found in locators for {platform}")]
    ScreenNotFound { platform: Platform, screen: String },
    #[error("unknown locator strategy '{strategy}' for element '{element}' in screen '{screen}' ({platform})")]
    UnknownStrategy {
        platform: Platform,
        screen: String,
        element: String,
        strategy: String,
    },
    #[error("locator '{element}' in screen '{screen}' ({platform}) is invalid: {reason}")]
    InvalidEntry {
        platform: Platform,
        screen: String,
        element: String,
        reason: String,
    },
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),
}

/// Platform whose locator file a store reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum Platform {
    Android,
    Ios,
    Linux,
    Mac,
    Windows,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Android,
        Platform::Ios,
        Platform::Linux,
        Platform::Mac,
        Platform::Windows,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Linux => "linux",
            Platform::Mac => "mac",
            Platform::Windows => "windows",
        }
    }

    /// Identifier of this platform's locator document.
    pub fn locator_file(&self) -> String {
        format!("locators_{}.yml", self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = LocatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|platform| platform.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| LocatorError::UnknownPlatform(value.to_string()))
    }
}

impl TryFrom<String> for Platform {
    type Error = LocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Element lookup strategies understood by WebDriver and Appium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Id,
    Name,
    ClassName,
    TagName,
    XPath,
    CssSelector,
    LinkText,
    PartialLinkText,
    AccessibilityId,
    Image,
    AndroidDataMatcher,
    AndroidUiAutomator,
    AndroidViewTag,
    IosClassChain,
    IosPredicate,
    Custom,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 16] = [
        StrategyKind::Id,
        StrategyKind::Name,
        StrategyKind::ClassName,
        StrategyKind::TagName,
        StrategyKind::XPath,
        StrategyKind::CssSelector,
        StrategyKind::LinkText,
        StrategyKind::PartialLinkText,
        StrategyKind::AccessibilityId,
        StrategyKind::Image,
        StrategyKind::AndroidDataMatcher,
        StrategyKind::AndroidUiAutomator,
        StrategyKind::AndroidViewTag,
        StrategyKind::IosClassChain,
        StrategyKind::IosPredicate,
        StrategyKind::Custom,
    ];

    /// Matches a document strategy name case-insensitively. Unknown names
    /// yield `None`; there is no fallback strategy.
    pub fn parse(name: &str) -> Option<Self> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// Name used in locator documents, e.g. `class_name`.
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Id => "id",
            StrategyKind::Name => "name",
            StrategyKind::ClassName => "class_name",
            StrategyKind::TagName => "tag_name",
            StrategyKind::XPath => "xpath",
            StrategyKind::CssSelector => "css_selector",
            StrategyKind::LinkText => "link_text",
            StrategyKind::PartialLinkText => "partial_link_text",
            StrategyKind::AccessibilityId => "accessibility_id",
            StrategyKind::Image => "image",
            StrategyKind::AndroidDataMatcher => "android_data_matcher",
            StrategyKind::AndroidUiAutomator => "android_uiautomator",
            StrategyKind::AndroidViewTag => "android_viewtag",
            StrategyKind::IosClassChain => "ios_class_chain",
            StrategyKind::IosPredicate => "ios_predicate",
            StrategyKind::Custom => "custom",
        }
    }

    /// Strategy string sent to the WebDriver find-element endpoint.
    pub fn wire_name(&self) -> &'static str {
        match self {
            StrategyKind::Id => "id",
            StrategyKind::Name => "name",
            StrategyKind::ClassName => "class name",
            StrategyKind::TagName => "tag name",
            StrategyKind::XPath => "xpath",
            StrategyKind::CssSelector => "css selector",
            StrategyKind::LinkText => "link text",
            StrategyKind::PartialLinkText => "partial link text",
            StrategyKind::AccessibilityId => "accessibility id",
            StrategyKind::Image => "-image",
            StrategyKind::AndroidDataMatcher => "-android datamatcher",
            StrategyKind::AndroidUiAutomator => "-android uiautomator",
            StrategyKind::AndroidViewTag => "-android viewtag",
            StrategyKind::IosClassChain => "-ios class chain",
            StrategyKind::IosPredicate => "-ios predicate string",
            StrategyKind::Custom => "-custom",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved (strategy, target) pair ready for a find-element call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorEntry {
    pub strategy: StrategyKind,
    pub target: String,
}

impl LocatorEntry {
    pub fn new(strategy: StrategyKind, target: impl Into<String>) -> Self {
        Self {
            strategy,
            target: target.into(),
        }
    }
}

impl From<LocatorEntry> for ConfigDocument {
    fn from(entry: LocatorEntry) -> Self {
        [
            ("type", ConfigDocument::from(entry.strategy.name())),
            ("value", ConfigDocument::from(entry.target)),
        ]
        .into_iter()
        .collect()
    }
}

/// Lazily loaded, screen-partitioned locator cache for one platform.
///
/// The cache only grows; entries are replaced solely through
/// [`ScopedLocatorStore::set_screen`]. The store is not internally
/// synchronized: share it across threads behind a `Mutex`.
pub struct ScopedLocatorStore<S = FileSource> {
    platform: Platform,
    source: S,
    cache: HashMap<String, ScreenLocators>,
    events: Arc<dyn ResolverEvents>,
}

impl<S: DocumentSource> ScopedLocatorStore<S> {
    pub fn new(platform: Platform, source: S) -> Self {
        Self::with_events(platform, source, Arc::new(TracingEvents))
    }

    pub fn with_events(platform: Platform, source: S, events: Arc<dyn ResolverEvents>) -> Self {
        Self {
            platform,
            source,
            cache: HashMap::new(),
            events,
        }
    }

    pub fn scope(&self) -> Platform {
        self.platform
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_cached(&self, screen: &str) -> bool {
        self.cache.contains_key(screen)
    }

    pub fn cached_screens(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    /// Resolves `element` on `screen`.
    pub fn get_entry(&mut self, screen: &str, element: &str) -> Result<LocatorEntry, LocatorError> {
        if !self.cache.contains_key(screen) {
            let entries = self.load_screen(screen)?.ok_or_else(|| LocatorError::LocatorNotFound {
                platform: self.platform,
                screen: screen.to_string(),
                element: element.to_string(),
                missing: Missing::Screen,
            })?;
            self.cache_screen(screen, entries);
        }

        let raw = self
            .cache
            .get(screen)
            .and_then(|entries| entries.get(element))
            .ok_or_else(|| LocatorError::LocatorNotFound {
                platform: self.platform,
                screen: screen.to_string(),
                element: element.to_string(),
                missing: Missing::Element,
            })?;
        let entry = decode_entry(self.platform, screen, element, raw)?;
        self.events
            .locator_resolved(self.platform, screen, element, entry.strategy);
        Ok(entry)
    }

    /// Resolves every element on `screen`. Unlike [`get_entry`](Self::get_entry)
    /// a missing screen is reported as [`LocatorError::ScreenNotFound`].
    pub fn get_screen(&mut self, screen: &str) -> Result<BTreeMap<String, LocatorEntry>, LocatorError> {
        if !self.cache.contains_key(screen) {
            let entries = self
                .load_screen(screen)?
                .ok_or_else(|| LocatorError::ScreenNotFound {
                    platform: self.platform,
                    screen: screen.to_string(),
                })?;
            self.cache_screen(screen, entries);
        }

        let entries = self
            .cache
            .get(screen)
            .ok_or_else(|| LocatorError::ScreenNotFound {
                platform: self.platform,
                screen: screen.to_string(),
            })?;
        entries
            .iter()
            .map(|(element, raw)| {
                decode_entry(self.platform, screen, element, raw).map(|entry| (element.clone(), entry))
            })
            .collect()
    }

    /// Seeds or replaces the cached entries for `screen` without touching the
    /// backing file. Entries are not validated until they are looked up.
    pub fn set_screen(&mut self, screen: impl Into<String>, entries: ScreenLocators) {
        self.cache.insert(screen.into(), entries);
    }

    fn load(&self) -> Result<ConfigDocument, LocatorError> {
        let identifier = self.platform.locator_file();
        let document = load_document(&self.source, &identifier).map_err(|err| match err {
            DocumentError::NotFound { identifier } => LocatorError::ScopeFileMissing {
                platform: self.platform,
                identifier,
                reason: "no such file".to_string(),
            },
            DocumentError::Unreadable { identifier, source } => LocatorError::ScopeFileMissing {
                platform: self.platform,
                identifier,
                reason: source.to_string(),
            },
            DocumentError::Malformed {
                identifier,
                message,
                ..
            } => LocatorError::MalformedScopeFile {
                platform: self.platform,
                identifier,
                message,
            },
        })?;
        self.events.scope_loaded(self.platform, &identifier);
        Ok(document)
    }

    /// Reads the platform file and extracts `screen`; `Ok(None)` when the
    /// file has no such screen.
    fn load_screen(&self, screen: &str) -> Result<Option<ScreenLocators>, LocatorError> {
        let document = self.load()?;
        match document.get(screen) {
            None => Ok(None),
            Some(ConfigDocument::Mapping(entries)) => Ok(Some(entries.clone())),
            Some(ConfigDocument::Scalar(Scalar::Null)) => Ok(Some(ScreenLocators::new())),
            Some(_) => Err(LocatorError::MalformedScopeFile {
                platform: self.platform,
                identifier: self.platform.locator_file(),
                message: format!("screen '{screen}' must be a mapping of elements"),
            }),
        }
    }

    fn cache_screen(&mut self, screen: &str, entries: ScreenLocators) {
        self.events.screen_cached(self.platform, screen, entries.len());
        self.cache.insert(screen.to_string(), entries);
    }
}

impl<S> fmt::Debug for ScopedLocatorStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut screens: Vec<&String> = self.cache.keys().collect();
        screens.sort();
        f.debug_struct("ScopedLocatorStore")
            .field("platform", &self.platform)
            .field("cached_screens", &screens)
            .finish_non_exhaustive()
    }
}

fn decode_entry(
    platform: Platform,
    screen: &str,
    element: &str,
    raw: &ConfigDocument,
) -> Result<LocatorEntry, LocatorError> {
    let invalid = |reason: &str| LocatorError::InvalidEntry {
        platform,
        screen: screen.to_string(),
        element: element.to_string(),
        reason: reason.to_string(),
    };

    let strategy_name = raw
        .get("type")
        .and_then(ConfigDocument::as_str)
        .ok_or_else(|| invalid("missing string field 'type'"))?;
    let target = raw
        .get("value")
        .and_then(ConfigDocument::scalar_text)
        .ok_or_else(|| invalid("missing scalar field 'value'"))?;
    let strategy = StrategyKind::parse(strategy_name).ok_or_else(|| LocatorError::UnknownStrategy {
        platform,
        screen: screen.to_string(),
        element: element.to_string(),
        strategy: strategy_name.to_string(),
    })?;

    Ok(LocatorEntry { strategy, target })
}
