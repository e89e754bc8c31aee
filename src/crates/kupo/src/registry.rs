//! Pattern registry for storing and managing the active pattern set
//!
//! Provides thread-safe storage and retrieval of the patterns driving both
//! filtering at ingest and queries at read time. Reads are wait-free
//! snapshots; writes are serialized by the HTTP handler performing the
//! mutation. The consumer samples the registry only at block boundaries.

use crate::chain::Pattern;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Thread-safe registry for the active pattern set
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    /// Internal storage for patterns
    patterns: Arc<RwLock<BTreeSet<Pattern>>>,
}

impl PatternRegistry {
    /// Create a new empty pattern registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with patterns
    pub fn with_patterns(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        Self {
            patterns: Arc::new(RwLock::new(patterns.into_iter().collect())),
        }
    }

    /// Register a pattern
    ///
    /// # Returns
    /// * `true` if the pattern was not registered before
    pub fn insert(&self, pattern: Pattern) -> bool {
        self.patterns.write().insert(pattern)
    }

    /// Remove a pattern from the registry
    ///
    /// # Returns
    /// * `true` if the pattern was registered
    pub fn remove(&self, pattern: &Pattern) -> bool {
        self.patterns.write().remove(pattern)
    }

    /// Check if a pattern is registered
    pub fn contains(&self, pattern: &Pattern) -> bool {
        self.patterns.read().contains(pattern)
    }

    /// Snapshot of the current pattern set
    pub fn snapshot(&self) -> Vec<Pattern> {
        self.patterns.read().iter().cloned().collect()
    }

    /// Whether any registered pattern overlaps the given one
    pub fn overlaps_any(&self, pattern: &Pattern) -> bool {
        self.patterns
            .read()
            .iter()
            .any(|registered| registered.overlaps(pattern))
    }

    /// Registered patterns included by (a subset of) the given one
    pub fn included_by(&self, pattern: &Pattern) -> Vec<Pattern> {
        self.patterns
            .read()
            .iter()
            .filter(|registered| pattern.includes(registered))
            .cloned()
            .collect()
    }

    /// Number of registered patterns
    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRED: &str = "11111111111111111111111111111111111111111111111111111111";

    #[test]
    fn test_insert_and_remove() {
        let registry = PatternRegistry::new();
        assert!(registry.insert(Pattern::Any));
        assert!(!registry.insert(Pattern::Any));
        assert!(registry.contains(&Pattern::Any));
        assert!(registry.remove(&Pattern::Any));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = PatternRegistry::with_patterns([Pattern::Any]);
        let snapshot = registry.snapshot();
        registry.remove(&Pattern::Any);
        assert_eq!(snapshot, vec![Pattern::Any]);
    }

    #[test]
    fn test_overlaps_any() {
        let registry = PatternRegistry::with_patterns([Pattern::PaymentCredential(CRED.into())]);
        assert!(registry.overlaps_any(&Pattern::Any));
        let other = Pattern::PaymentCredential(CRED.replace('1', "2"));
        assert!(!registry.overlaps_any(&other));
    }

    #[test]
    fn test_included_by() {
        let registry = PatternRegistry::with_patterns([
            Pattern::PaymentCredential(CRED.into()),
            Pattern::Any,
        ]);
        let included = registry.included_by(&Pattern::Any);
        assert_eq!(included.len(), 2);
        let included = registry.included_by(&Pattern::PaymentCredential(CRED.into()));
        assert_eq!(included, vec![Pattern::PaymentCredential(CRED.into())]);
    }
}
