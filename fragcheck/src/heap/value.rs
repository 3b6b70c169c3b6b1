//! Heap values and completions as the analysis sees them.
//!
//! The substrate owns the real heap; these types only carry enough to
//! dispatch on the kind of a value and to classify how an evaluation ended.

use std::fmt;
use std::sync::Arc;

use string_interner::DefaultSymbol;

use super::def::{AbstractId, CallableId, ObjectId};
use crate::span::SourceLocation;

/// An interned property name.
pub type PropertyKey = DefaultSymbol;

/// A value in the substrate's heap model.
///
/// Every dispatch on a value kind matches this enum exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An object with a known identity.
    ConcreteObject(ObjectId),
    /// A placeholder standing for an unknown value.
    AbstractObject(AbstractValue),
    /// A callable.
    Function(CallableId),
    /// A primitive.
    Primitive(Primitive),
}

impl Value {
    pub fn undefined() -> Self {
        Value::Primitive(Primitive::Undefined)
    }

    pub fn number(n: f64) -> Self {
        Value::Primitive(Primitive::Number(n))
    }

    pub fn string(s: &str) -> Self {
        Value::Primitive(Primitive::String(Arc::from(s)))
    }

    /// A short description of the value's kind for diagnostics.
    pub fn kind_descr(&self) -> &'static str {
        match self {
            Value::ConcreteObject(_) => "object",
            Value::AbstractObject(_) => "abstract value",
            Value::Function(_) => "function",
            Value::Primitive(_) => "primitive value",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::ConcreteObject(id) => write!(f, "{id}"),
            Value::AbstractObject(v) => write!(f, "<{}: {}>", v.name, v.ty),
            Value::Function(id) => write!(f, "{id}"),
            Value::Primitive(p) => write!(f, "{p}"),
        }
    }
}

/// A primitive value.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Undefined => write!(f, "undefined"),
            Primitive::Null => write!(f, "null"),
            Primitive::Bool(b) => write!(f, "{b}"),
            Primitive::Number(n) => write!(f, "{n}"),
            Primitive::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// The refined type of a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AbstractType {
    /// Nothing is known.
    #[default]
    Unknown,
    Object,
    Function,
    Number,
    String,
    Boolean,
}

impl fmt::Display for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbstractType::Unknown => "unknown",
            AbstractType::Object => "object",
            AbstractType::Function => "function",
            AbstractType::Number => "number",
            AbstractType::String => "string",
            AbstractType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A placeholder value created for an unknown input.
#[derive(Debug, Clone, PartialEq)]
pub struct AbstractValue {
    pub id: AbstractId,
    /// The parameter name this placeholder stands for (`this` for the receiver).
    pub name: String,
    /// Where the callable it belongs to is defined.
    pub location: SourceLocation,
    pub ty: AbstractType,
}

/// Why an evaluation stopped abruptly.
#[derive(Debug, Clone, PartialEq)]
pub struct AbruptCompletion {
    pub kind: AbruptKind,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbruptKind {
    Throw,
}

impl fmt::Display for AbruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbruptKind::Throw => write!(f, "throws"),
        }
    }
}

/// The outcome classification of an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Completed normally with a value.
    Normal(Value),
    /// Definitely completed abruptly on every path.
    Abrupt(AbruptCompletion),
    /// Completes normally on some paths and abruptly on others.
    PossiblyAbrupt {
        normal: Value,
        abrupt: AbruptCompletion,
    },
}

impl Completion {
    /// Whether this is a definite abrupt completion.
    ///
    /// A possibly-abrupt completion may still complete normally, so it is
    /// not definite.
    pub fn is_definitely_abrupt(&self) -> bool {
        match self {
            Completion::Abrupt(_) => true,
            Completion::Normal(_) | Completion::PossiblyAbrupt { .. } => false,
        }
    }
}

/// A (object, property) pair: the unit of the write-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyBinding {
    pub object: ObjectId,
    pub key: PropertyKey,
}

impl PropertyBinding {
    pub fn new(object: ObjectId, key: PropertyKey) -> Self {
        Self { object, key }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn abrupt() -> AbruptCompletion {
        AbruptCompletion {
            kind: AbruptKind::Throw,
            location: Some(SourceLocation::new("a.js", Span::new(0, 5, 1, 1))),
        }
    }

    #[test]
    fn test_only_definite_abrupt_counts() {
        assert!(Completion::Abrupt(abrupt()).is_definitely_abrupt());
        assert!(!Completion::Normal(Value::undefined()).is_definitely_abrupt());
        let possibly = Completion::PossiblyAbrupt {
            normal: Value::number(1.0),
            abrupt: abrupt(),
        };
        assert!(!possibly.is_definitely_abrupt());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::number(2.0).to_string(), "2");
        assert_eq!(Value::string("a").to_string(), "\"a\"");
        assert_eq!(Value::ConcreteObject(ObjectId::new(3)).to_string(), "obj3");
        assert_eq!(Value::Function(CallableId::new(1)).kind_descr(), "function");
    }
}
