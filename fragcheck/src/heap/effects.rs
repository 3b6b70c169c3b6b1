//! Raw effects reported by the substrate for one speculative evaluation.

use std::collections::{BTreeMap, BTreeSet};

use super::def::ObjectId;
use super::value::{Completion, PropertyBinding, Value};
use crate::span::SourceLocation;

/// Where and what a property write stored.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSite {
    /// Location of the last write to the binding, if the substrate knew it.
    pub location: Option<SourceLocation>,
    /// The value left in the binding; `None` means the property was deleted.
    pub value: Option<Value>,
}

/// Everything one evaluation did to the heap, without having applied it.
///
/// Ordered collections keep iteration deterministic, which keeps
/// diagnostics stable across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Effects {
    pub result: Completion,
    /// Objects allocated by the evaluation.
    pub created_objects: BTreeSet<ObjectId>,
    /// Final state of every property binding the evaluation wrote.
    pub modified_properties: BTreeMap<PropertyBinding, WriteSite>,
}

impl Effects {
    /// Effects of an evaluation that did nothing and returned `value`.
    pub fn empty(value: Value) -> Self {
        Self {
            result: Completion::Normal(value),
            created_objects: BTreeSet::new(),
            modified_properties: BTreeMap::new(),
        }
    }

    pub fn writes(&self, binding: &PropertyBinding) -> bool {
        self.modified_properties.contains_key(binding)
    }

    /// Objects that own at least one written binding.
    pub fn written_objects(&self) -> BTreeSet<ObjectId> {
        self.modified_properties.keys().map(|b| b.object).collect()
    }
}
