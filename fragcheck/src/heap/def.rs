//! Identifiers for heap entities.
//!
//! The analysis never looks inside the substrate's heap; it only compares
//! identities:
//! - [`ObjectId`] - identity of a heap object
//! - [`CallableId`] - identity of a callable value, which is also the
//!   identity of the candidate wrapping it
//! - [`AbstractId`] - identity of a placeholder value
//! - [`BaselineId`] - identity of a committed baseline

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a heap object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub index: u32,
}

impl ObjectId {
    pub const fn new(index: u32) -> Self {
        Self { index }
    }

    pub const fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.index)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}", self.index)
    }
}

/// Identity of a callable value.
///
/// A candidate is identified by the callable it wraps, so this is also the
/// key of the write-effects table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallableId {
    pub index: u32,
}

impl CallableId {
    pub const fn new(index: u32) -> Self {
        Self { index }
    }

    pub const fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Debug for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallableId({})", self.index)
    }
}

impl fmt::Display for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.index)
    }
}

/// Identity of a placeholder (abstract) value.
///
/// Allocated by the argument synthesizer; never reused within one run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbstractId {
    pub index: u32,
}

impl AbstractId {
    pub const fn new(index: u32) -> Self {
        Self { index }
    }
}

impl fmt::Debug for AbstractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbstractId({})", self.index)
    }
}

/// Identity of a committed baseline.
///
/// `BaselineId::GLOBAL` is the untouched global state. Every commit of an
/// effects record for nested discovery gets a fresh id, so a record captured
/// under that commit can be attributed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BaselineId(pub u32);

impl BaselineId {
    /// The untouched global baseline.
    pub const GLOBAL: BaselineId = BaselineId(0);

    pub fn is_global(self) -> bool {
        self == Self::GLOBAL
    }
}

impl fmt::Display for BaselineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "global")
        } else {
            write!(f, "commit#{}", self.0)
        }
    }
}
