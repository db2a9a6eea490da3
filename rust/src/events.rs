//! Observability hook handed to the resolver and the locator store.
//!
//! Components report what they did through [`ResolverEvents`] instead of a
//! process-wide logger. Secret values and key material are never passed to a
//! hook; decrypted secrets are reported by document path only.

use crate::config::DocPath;
use crate::locators::{Platform, StrategyKind};

/// Structured event sink. Every method defaults to doing nothing.
pub trait ResolverEvents: Send + Sync {
    fn document_loaded(&self, _identifier: &str) {}

    fn secret_decrypted(&self, _path: &DocPath) {}

    fn section_lookup(&self, _name: &str, _found: bool) {}

    fn scope_loaded(&self, _platform: Platform, _identifier: &str) {}

    fn screen_cached(&self, _platform: Platform, _screen: &str, _elements: usize) {}

    fn locator_resolved(
        &self,
        _platform: Platform,
        _screen: &str,
        _element: &str,
        _strategy: StrategyKind,
    ) {
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl ResolverEvents for NoopEvents {}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl ResolverEvents for TracingEvents {
    fn document_loaded(&self, identifier: &str) {
        tracing::info!(identifier, "loaded config document");
    }

    fn secret_decrypted(&self, path: &DocPath) {
        tracing::debug!(path = %path, "decrypted secret");
    }

    fn section_lookup(&self, name: &str, found: bool) {
        if found {
            tracing::debug!(section = name, "config section resolved");
        } else {
            tracing::debug!(section = name, "config section absent, returning empty mapping");
        }
    }

    fn scope_loaded(&self, platform: Platform, identifier: &str) {
        tracing::debug!(platform = %platform, identifier, "loaded locators file");
    }

    fn screen_cached(&self, platform: Platform, screen: &str, elements: usize) {
        tracing::debug!(platform = %platform, screen, elements, "cached screen locators");
    }

    fn locator_resolved(&self, platform: Platform, screen: &str, element: &str, strategy: StrategyKind) {
        tracing::trace!(
            platform = %platform,
            screen,
            element,
            strategy = strategy.wire_name(),
            "resolved locator"
        );
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::*;

    /// Captures events as short strings for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingEvents {
        events: Mutex<Vec<String>>,
    }

    impl RecordingEvents {
        pub(crate) fn events(&self) -> Vec<String> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }

        pub(crate) fn count(&self, prefix: &str) -> usize {
            self.events().iter().filter(|e| e.starts_with(prefix)).count()
        }

        fn push(&self, event: String) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }

    impl ResolverEvents for RecordingEvents {
        fn document_loaded(&self, identifier: &str) {
            self.push(format!("document_loaded {identifier}"));
        }

        fn secret_decrypted(&self, path: &DocPath) {
            self.push(format!("secret_decrypted {path}"));
        }

        fn section_lookup(&self, name: &str, found: bool) {
            self.push(format!("section_lookup {name} {found}"));
        }

        fn scope_loaded(&self, platform: Platform, identifier: &str) {
            self.push(format!("scope_loaded {platform} {identifier}"));
        }

        fn screen_cached(&self, platform: Platform, screen: &str, elements: usize) {
            self.push(format!("screen_cached {platform} {screen} {elements}"));
        }

        fn locator_resolved(&self, platform: Platform, screen: &str, element: &str, strategy: StrategyKind) {
            self.push(format!("locator_resolved {platform} {screen} {element} {strategy}"));
        }
    }
}
