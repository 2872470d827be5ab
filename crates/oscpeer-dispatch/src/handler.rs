//! Handler registration and the address match cache

use std::collections::HashMap;
use std::sync::Arc;

use oscpeer_core::{Pattern, Validate};
use rosc::OscMessage;

/// Callback invoked with each dispatched message.
pub type MessageCallback = Box<dyn Fn(&OscMessage) + Send + Sync>;

/// A registered handler: the callback plus its optional validator guard.
pub(crate) struct Handler {
    pub callback: MessageCallback,
    pub validator: Option<Arc<dyn Validate>>,
}

struct Registered {
    pattern: String,
    matcher: Pattern,
    handler: Arc<Handler>,
}

/// Registration-order handler table with an explicit fallback slot.
///
/// Lookups memoize the matching handler set per concrete address. Any
/// mutation of the registered entries clears the cache before the lock is
/// released, so table and cache are never observed inconsistent. The
/// fallback slot is outside the cache: it applies only when the pattern
/// match comes up empty, and changing it cannot stale any cached set.
pub(crate) struct HandlerTable {
    entries: Vec<Registered>,
    fallback: Option<Arc<Handler>>,
    cache: HashMap<String, Vec<Arc<Handler>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            fallback: None,
            cache: HashMap::new(),
        }
    }

    /// Register a handler. Multiple handlers may share one pattern; they
    /// are invoked in registration order.
    pub fn add(&mut self, matcher: Pattern, handler: Handler) {
        self.entries.push(Registered {
            pattern: matcher.as_str().to_string(),
            matcher,
            handler: Arc::new(handler),
        });
        self.cache.clear();
    }

    /// Remove every handler registered under exactly `pattern`.
    /// Removing an absent pattern is a no-op.
    pub fn remove(&mut self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.pattern != pattern);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.cache.clear();
        }
        removed
    }

    /// Set the fallback, replacing any prior one.
    pub fn set_fallback(&mut self, handler: Handler) {
        self.fallback = Some(Arc::new(handler));
    }

    pub fn fallback(&self) -> Option<Arc<Handler>> {
        self.fallback.clone()
    }

    /// Handlers matching `address`, in registration order. Cached per
    /// address; the cache is pure memoization over the current entries.
    pub fn lookup(&mut self, address: &str) -> Vec<Arc<Handler>> {
        if let Some(hit) = self.cache.get(address) {
            return hit.clone();
        }
        let matches: Vec<Arc<Handler>> = self
            .entries
            .iter()
            .filter(|entry| entry.matcher.matches(address))
            .map(|entry| entry.handler.clone())
            .collect();
        self.cache.insert(address.to_string(), matches.clone());
        matches
    }

    #[cfg(test)]
    pub fn cached_addresses(&self) -> usize {
        self.cache.len()
    }
}
