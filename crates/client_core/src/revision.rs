use std::{collections::HashMap, hash::Hash};

/// Local revision of one mutable entity. Requests carry the revision they were
/// issued at; a response whose revision is behind the entity's current one is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(pub u64);

#[derive(Debug, Clone)]
pub struct RevisionLedger<K> {
    revisions: HashMap<K, Revision>,
}

impl<K: Eq + Hash> Default for RevisionLedger<K> {
    fn default() -> Self {
        Self {
            revisions: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> RevisionLedger<K> {
    pub fn advance(&mut self, key: &K) -> Revision {
        let slot = self.revisions.entry(key.clone()).or_default();
        slot.0 += 1;
        *slot
    }

    pub fn current(&self, key: &K) -> Revision {
        self.revisions.get(key).copied().unwrap_or_default()
    }

    pub fn is_current(&self, key: &K, revision: Revision) -> bool {
        self.current(key) == revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisions_advance_independently_per_key() {
        let mut ledger = RevisionLedger::default();
        let a1 = ledger.advance(&"a");
        let a2 = ledger.advance(&"a");
        let b1 = ledger.advance(&"b");

        assert!(a2 > a1);
        assert!(!ledger.is_current(&"a", a1));
        assert!(ledger.is_current(&"a", a2));
        assert!(ledger.is_current(&"b", b1));
        assert_eq!(ledger.current(&"missing"), Revision(0));
    }
}
