//! The write-effects table: one record per candidate, in capture order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::capture::{Candidate, EffectsRecord};
use crate::heap::CallableId;

/// Candidate to effects record, append-only.
///
/// Iteration follows insertion order so everything derived from the table
/// is deterministic.
#[derive(Debug, Clone, Default)]
pub struct WriteEffectsTable {
    records: Vec<Arc<EffectsRecord>>,
    index: HashMap<CallableId, usize>,
}

impl WriteEffectsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, callable: CallableId) -> bool {
        self.index.contains_key(&callable)
    }

    pub fn get(&self, callable: CallableId) -> Option<&Arc<EffectsRecord>> {
        self.index.get(&callable).map(|&i| &self.records[i])
    }

    /// Append a record. Returns `false`, leaving the table unchanged, if the
    /// owner already has one.
    #[must_use]
    pub fn insert(&mut self, record: Arc<EffectsRecord>) -> bool {
        let owner = record.owner();
        if self.index.contains_key(&owner) {
            return false;
        }
        self.index.insert(owner, self.records.len());
        self.records.push(record);
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<EffectsRecord>> {
        self.records.iter()
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.records.iter().map(|r| r.candidate())
    }

    /// The chain of records whose commits enclose `callable`'s capture,
    /// outermost first.
    pub fn ancestors(&self, callable: CallableId) -> Vec<Arc<EffectsRecord>> {
        let mut chain = Vec::new();
        let mut next = self.get(callable).and_then(|r| r.parent());
        while let Some(parent) = next {
            let Some(record) = self.get(parent) else { break };
            // A parent is captured before its children: the chain is acyclic.
            if chain.len() > self.records.len() {
                break;
            }
            chain.push(Arc::clone(record));
            next = record.parent();
        }
        chain.reverse();
        chain
    }

    /// Whether `ancestor` is on the parent chain of `callable`.
    pub fn is_ancestor(&self, ancestor: CallableId, callable: CallableId) -> bool {
        let mut next = self.get(callable).and_then(|r| r.parent());
        let mut steps = 0;
        while let Some(parent) = next {
            if parent == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.records.len() {
                return false;
            }
            next = self.get(parent).and_then(|r| r.parent());
        }
        false
    }
}

impl<'a> IntoIterator for &'a WriteEffectsTable {
    type Item = &'a Arc<EffectsRecord>;
    type IntoIter = std::slice::Iter<'a, Arc<EffectsRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
