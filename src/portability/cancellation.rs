//! Cancellation registry.
//!
//! Each running job registers a [`CancellationToken`] under a key derived
//! from its direction and id (`export:<id>`, `import:<id>`). Any holder of
//! the registry can then cancel a single job or every running job. The
//! orchestrator only polls the token; cancellation is cooperative.

use crate::storage::sqlite::acquire_lock;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Directly addressable map from job key to cancellation token.
///
/// Implementations must be safe for concurrent use by many jobs.
pub trait CancellationRegistry: Send + Sync {
    /// Associates `token` with `key`, replacing any previous entry.
    fn register(&self, key: &str, token: CancellationToken);

    /// Removes the entry for `key`.
    fn unregister(&self, key: &str);

    /// Cancels the job registered under `key`.
    ///
    /// Returns `false` if no such job is registered.
    fn cancel(&self, key: &str) -> bool;

    /// Cancels every registered job and returns how many were signalled.
    fn cancel_all(&self) -> usize;

    /// Returns `true` if `key` is currently registered.
    fn is_registered(&self, key: &str) -> bool;
}

/// Process-local registry.
#[derive(Debug, Default)]
pub struct InMemoryCancellationRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl InMemoryCancellationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the keys of all registered jobs, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = acquire_lock(&self.tokens).keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl CancellationRegistry for InMemoryCancellationRegistry {
    fn register(&self, key: &str, token: CancellationToken) {
        debug!(key, "Registering cancellation token");
        acquire_lock(&self.tokens).insert(key.to_string(), token);
    }

    fn unregister(&self, key: &str) {
        debug!(key, "Unregistering cancellation token");
        acquire_lock(&self.tokens).remove(key);
    }

    fn cancel(&self, key: &str) -> bool {
        let token = acquire_lock(&self.tokens).get(key).cloned();
        token.is_some_and(|token| {
            info!(key, "Cancellation requested");
            token.cancel();
            true
        })
    }

    fn cancel_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = acquire_lock(&self.tokens).values().cloned().collect();
        for token in &tokens {
            token.cancel();
        }
        if !tokens.is_empty() {
            info!(count = tokens.len(), "Cancelled all running jobs");
        }
        tokens.len()
    }

    fn is_registered(&self, key: &str) -> bool {
        acquire_lock(&self.tokens).contains_key(key)
    }
}

/// Scoped registration that unregisters exactly once when dropped.
pub(crate) struct Registration<'a> {
    registry: &'a dyn CancellationRegistry,
    key: String,
}

impl<'a> Registration<'a> {
    pub(crate) fn new(
        registry: &'a dyn CancellationRegistry,
        key: String,
        token: CancellationToken,
    ) -> Self {
        registry.register(&key, token);
        Self { registry, key }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.unregister(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_by_key() {
        let registry = InMemoryCancellationRegistry::new();
        let token = CancellationToken::new();
        registry.register("export:1", token.clone());

        assert!(!registry.cancel("import:1"));
        assert!(!token.is_cancelled());
        assert!(registry.cancel("export:1"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_all() {
        let registry = InMemoryCancellationRegistry::new();
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        registry.register("export:a", first.clone());
        registry.register("import:b", second.clone());

        assert_eq!(registry.cancel_all(), 2);
        assert!(first.is_cancelled() && second.is_cancelled());
        assert_eq!(registry.keys(), vec!["export:a", "import:b"]);
    }

    #[test]
    fn test_registration_unregisters_on_drop() {
        let registry = InMemoryCancellationRegistry::new();
        {
            let _registration =
                Registration::new(&registry, "export:x".to_string(), CancellationToken::new());
            assert!(registry.is_registered("export:x"));
        }
        assert!(!registry.is_registered("export:x"));
        assert_eq!(registry.cancel_all(), 0);
    }
}
