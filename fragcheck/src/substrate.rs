//! The interface to the abstract interpreter.
//!
//! The analysis never executes code itself. It asks a [`Substrate`] to
//! evaluate synthesized calls speculatively, to commit effects for the
//! duration of a closure, and to describe callables. Everything the
//! substrate observes during an evaluation flows back through an
//! [`EvaluationListener`] passed into that one call, so hooks exist
//! exactly as long as the evaluation they observe.

use std::collections::BTreeMap;

use crate::error::SubstrateError;
use crate::heap::{AbstractType, AbstractValue, CallableId, Effects, ObjectId, PropertyBinding, PropertyKey, Value};
use crate::span::{SourceLocation, Span};

/// The shape of one formal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterPattern {
    /// A plain identifier.
    Simple(String),
    /// `{ a, b }`
    ObjectPattern,
    /// `[a, b]`
    ArrayPattern,
    /// `...rest`
    Rest(String),
    /// `a = 1`
    WithDefault(String),
}

impl ParameterPattern {
    pub fn descr(&self) -> &'static str {
        match self {
            ParameterPattern::Simple(_) => "identifier",
            ParameterPattern::ObjectPattern => "object destructuring pattern",
            ParameterPattern::ArrayPattern => "array destructuring pattern",
            ParameterPattern::Rest(_) => "rest parameter",
            ParameterPattern::WithDefault(_) => "parameter with default value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormalParameter {
    pub pattern: ParameterPattern,
    pub span: Span,
}

impl FormalParameter {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            pattern: ParameterPattern::Simple(name.into()),
            span: Span::dummy(),
        }
    }
}

/// What the substrate knows about a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    /// The function's own name, if it has one.
    pub name: Option<String>,
    pub params: Vec<FormalParameter>,
    /// Where the function expression is.
    pub location: SourceLocation,
}

/// Types hinted for a candidate's inputs.
///
/// Parameters missing from the map keep [`AbstractType::Unknown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentShape {
    pub params: BTreeMap<String, AbstractType>,
    pub receiver: Option<AbstractType>,
}

impl ArgumentShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, ty: AbstractType) -> Self {
        self.params.insert(name.into(), ty);
        self
    }

    pub fn receiver(mut self, ty: AbstractType) -> Self {
        self.receiver = Some(ty);
        self
    }
}

/// A value somebody asked to have optimized, before it is validated.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRequest {
    pub target: Value,
    pub shape: Option<ArgumentShape>,
    /// Opaque, tool-specific configuration carried through to the output.
    pub config: Option<BTreeMap<String, String>>,
    /// Where the registration happened.
    pub location: Option<SourceLocation>,
}

impl CandidateRequest {
    pub fn new(target: Value) -> Self {
        Self {
            target,
            shape: None,
            config: None,
            location: None,
        }
    }

    pub fn function(callable: CallableId) -> Self {
        Self::new(Value::Function(callable))
    }

    pub fn with_shape(mut self, shape: ArgumentShape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_config(mut self, config: BTreeMap<String, String>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// A call of a candidate with placeholder inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    pub callee: CallableId,
    pub receiver: AbstractValue,
    pub args: Vec<AbstractValue>,
    pub location: SourceLocation,
}

/// An externally observable mutation seen during pure evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SideEffect {
    pub kind: SideEffectKind,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffectKind {
    /// A variable binding outside the evaluated code was assigned.
    ModifiedBinding { name: String },
    /// A property of an object that existed before the evaluation was written.
    ModifiedProperty { binding: PropertyBinding },
}

impl std::fmt::Display for SideEffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SideEffectKind::ModifiedBinding { name } => {
                write!(f, "modifies binding `{name}` which exists outside the optimized function")
            }
            SideEffectKind::ModifiedProperty { binding } => write!(
                f,
                "modifies a property of {} which exists outside the optimized function",
                binding.object
            ),
        }
    }
}

/// Whether an evaluation should go on after a listener callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkDecision {
    Continue,
    Abort,
}

impl SinkDecision {
    pub fn is_abort(self) -> bool {
        self == SinkDecision::Abort
    }
}

/// Observer of one evaluation.
///
/// Every method has a no-op default so a capture and a replay each
/// implement only what they watch.
pub trait EvaluationListener {
    /// A side effect escaped the evaluation. Returning `Abort` makes the
    /// substrate stop with [`SubstrateError::Aborted`].
    fn on_side_effect(&mut self, _effect: &SideEffect) -> SinkDecision {
        SinkDecision::Continue
    }

    /// The evaluated code registered a value for optimization.
    fn on_register(&mut self, _request: CandidateRequest) {}

    /// A property was read. `location` is the substrate's current location.
    fn on_property_read(&mut self, _binding: PropertyBinding, _location: Option<&SourceLocation>) {}

    /// The own properties of an object were enumerated.
    fn on_own_properties_enumerated(&mut self, _object: ObjectId, _location: Option<&SourceLocation>) {}

    /// The body of `callee` starts running, the evaluated call itself
    /// included. Every enter is matched by an exit, also on abrupt or
    /// failed calls.
    fn on_call_enter(&mut self, _callee: CallableId) {}

    fn on_call_exit(&mut self, _callee: CallableId) {}
}

/// A listener that ignores everything.
pub struct NullListener;

impl EvaluationListener for NullListener {}

/// The abstract interpreter the analysis runs on.
pub trait Substrate {
    /// Describe a callable; `None` if it has no known definition.
    fn function_signature(&self, callable: CallableId) -> Option<FunctionSignature>;

    /// If `object` is a recognized composite root, the callable that renders it.
    fn composite_root(&self, object: ObjectId) -> Option<CallableId>;

    /// Evaluate `call` against the current baseline without applying its
    /// effects, reporting side effects and registrations to `listener`.
    fn evaluate_pure(
        &mut self,
        call: &CallExpression,
        listener: &mut dyn EvaluationListener,
    ) -> Result<Effects, SubstrateError>;

    /// Run `body` with `effects` committed onto the baseline, then undo them.
    fn with_effects_applied<R, F>(&mut self, effects: &Effects, body: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
        Self: Sized;

    /// The text of an interned property name.
    fn property_name(&self, key: PropertyKey) -> Option<&str>;
}
