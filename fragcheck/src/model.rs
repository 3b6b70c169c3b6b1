//! A small in-memory heap model implementing [`Substrate`].
//!
//! This is not an interpreter. A function body is a list of [`Op`]s that
//! touch the heap directly, which is enough to drive capture, nested
//! discovery and replay deterministically. Tools built on this crate can
//! use it to test their own candidate handling.
//!
//! All locations point into one source file whose name is given to
//! [`HeapModel::new`]; [`line`] builds a span for a given line.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use string_interner::DefaultStringInterner;

use crate::error::SubstrateError;
use crate::heap::{
    AbruptCompletion, AbruptKind, CallableId, Completion, Effects, ObjectId, PropertyBinding, PropertyKey, Value,
    WriteSite,
};
use crate::span::{SourceLocation, Span};
use crate::substrate::{
    ArgumentShape, CallExpression, CandidateRequest, EvaluationListener, FormalParameter, FunctionSignature,
    SideEffect, SideEffectKind, Substrate,
};

/// Deepest call chain an evaluation may build.
pub const MAX_CALL_DEPTH: usize = 32;

/// A span covering the start of line `n`.
pub fn line(n: u32) -> Span {
    let start = n as usize * 100;
    Span::new(start, start + 10, n, 1)
}

/// The object an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// An object that exists in the model.
    Object(ObjectId),
    /// The n-th object allocated by the running function.
    Allocated(usize),
}

/// One step of a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Write {
        target: Target,
        key: PropertyKey,
        value: Value,
        at: Span,
    },
    Read {
        target: Target,
        key: PropertyKey,
        at: Span,
    },
    /// Enumerate the own properties of an object.
    Enumerate { target: Target, at: Span },
    Allocate,
    Call { callee: CallableId, at: Span },
    /// Register a value for optimization.
    Register {
        target: Value,
        shape: Option<ArgumentShape>,
        at: Span,
    },
    /// Assign a variable outside the evaluated code.
    AssignGlobal { name: String, at: Span },
    Throw { at: Span },
    /// Throw on some paths only.
    MaybeThrow { at: Span },
    Repeat { times: usize, body: Vec<Op> },
    /// Read a property and run `then` if it currently holds `value`.
    ///
    /// The current value is the running function's own write if there is
    /// one, otherwise whatever the heap holds under the committed baseline.
    IfEquals {
        target: Target,
        key: PropertyKey,
        value: Value,
        then: Vec<Op>,
        at: Span,
    },
    Return(Value),
}

impl Op {
    pub fn register(target: Value, at: Span) -> Self {
        Op::Register {
            target,
            shape: None,
            at,
        }
    }
}

#[derive(Debug, Clone)]
struct FunctionDef {
    signature: FunctionSignature,
    body: Arc<[Op]>,
}

enum Flow {
    Next,
    Return(Value),
    Throw(AbruptCompletion),
}

struct Evaluation<'l> {
    listener: &'l mut dyn EvaluationListener,
    created: BTreeSet<ObjectId>,
    writes: BTreeMap<PropertyBinding, WriteSite>,
    maybe_abrupt: Option<AbruptCompletion>,
}

/// The heap model.
#[derive(Debug)]
pub struct HeapModel {
    file: String,
    interner: DefaultStringInterner,
    functions: Vec<FunctionDef>,
    roots: HashMap<ObjectId, CallableId>,
    heap: BTreeMap<ObjectId, BTreeMap<PropertyKey, Value>>,
    next_object: u32,
    evaluations: usize,
}

impl HeapModel {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            interner: DefaultStringInterner::new(),
            functions: Vec::new(),
            roots: HashMap::new(),
            heap: BTreeMap::new(),
            next_object: 0,
            evaluations: 0,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn location(&self, span: Span) -> SourceLocation {
        SourceLocation::new(self.file.clone(), span)
    }

    /// Intern a property name.
    pub fn key(&mut self, name: &str) -> PropertyKey {
        self.interner.get_or_intern(name)
    }

    /// Create an empty object.
    pub fn object(&mut self) -> ObjectId {
        let id = self.fresh_object();
        self.heap.insert(id, BTreeMap::new());
        id
    }

    pub fn set(&mut self, object: ObjectId, key: PropertyKey, value: Value) {
        self.heap.entry(object).or_default().insert(key, value);
    }

    pub fn get(&self, object: ObjectId, key: PropertyKey) -> Option<&Value> {
        self.heap.get(&object).and_then(|props| props.get(&key))
    }

    pub fn define(&mut self, name: &str, body: Vec<Op>) -> CallableId {
        self.define_with_params(name, Vec::new(), body)
    }

    pub fn define_anonymous(&mut self, body: Vec<Op>) -> CallableId {
        self.push_function(None, Vec::new(), body)
    }

    pub fn define_with_params(&mut self, name: &str, params: Vec<FormalParameter>, body: Vec<Op>) -> CallableId {
        self.push_function(Some(name.to_string()), params, body)
    }

    /// Replace the body of a defined function. Unknown ids are ignored.
    pub fn set_body(&mut self, callable: CallableId, body: Vec<Op>) {
        if let Some(def) = self.functions.get_mut(callable.index() as usize) {
            def.body = body.into();
        }
    }

    /// Make `object` a composite root rendered by `callable`.
    pub fn mark_composite_root(&mut self, object: ObjectId, callable: CallableId) {
        self.roots.insert(object, callable);
    }

    /// Number of pure evaluations run so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    fn push_function(&mut self, name: Option<String>, params: Vec<FormalParameter>, body: Vec<Op>) -> CallableId {
        let callable = CallableId::new(self.functions.len() as u32);
        let signature = FunctionSignature {
            name,
            params,
            location: self.location(Span::dummy()),
        };
        self.functions.push(FunctionDef {
            signature,
            body: body.into(),
        });
        callable
    }

    fn fresh_object(&mut self) -> ObjectId {
        let id = ObjectId::new(self.next_object);
        self.next_object += 1;
        id
    }

    fn resolve(&self, target: Target, allocated: &[ObjectId], at: &SourceLocation) -> Result<ObjectId, SubstrateError> {
        match target {
            Target::Object(object) => Ok(object),
            Target::Allocated(n) => allocated.get(n).copied().ok_or_else(|| SubstrateError::Unsupported {
                message: format!("no object allocated at index {n}"),
                location: Some(at.clone()),
            }),
        }
    }

    fn call(
        &mut self,
        eval: &mut Evaluation<'_>,
        callee: CallableId,
        depth: usize,
        at: &SourceLocation,
    ) -> Result<Flow, SubstrateError> {
        if depth > MAX_CALL_DEPTH {
            return Err(SubstrateError::Unsupported {
                message: format!("call depth exceeds {MAX_CALL_DEPTH}"),
                location: Some(at.clone()),
            });
        }
        let Some(def) = self.functions.get(callee.index() as usize) else {
            return Err(SubstrateError::Unsupported {
                message: format!("call of unknown function {callee}"),
                location: Some(at.clone()),
            });
        };
        let body = Arc::clone(&def.body);
        let mut allocated = Vec::new();
        eval.listener.on_call_enter(callee);
        let flow = self.exec(eval, &body, &mut allocated, depth);
        eval.listener.on_call_exit(callee);
        flow
    }

    fn current_value(&self, eval: &Evaluation<'_>, binding: PropertyBinding) -> Option<Value> {
        match eval.writes.get(&binding) {
            Some(site) => site.value.clone(),
            None => self.get(binding.object, binding.key).cloned(),
        }
    }

    fn exec(
        &mut self,
        eval: &mut Evaluation<'_>,
        ops: &[Op],
        allocated: &mut Vec<ObjectId>,
        depth: usize,
    ) -> Result<Flow, SubstrateError> {
        for op in ops {
            match op {
                Op::Write { target, key, value, at } => {
                    let location = self.location(*at);
                    let object = self.resolve(*target, allocated, &location)?;
                    let binding = PropertyBinding::new(object, *key);
                    if !eval.created.contains(&object) {
                        let effect = SideEffect {
                            kind: SideEffectKind::ModifiedProperty { binding },
                            location: Some(location.clone()),
                        };
                        if eval.listener.on_side_effect(&effect).is_abort() {
                            return Err(SubstrateError::Aborted);
                        }
                    }
                    eval.writes.insert(
                        binding,
                        WriteSite {
                            location: Some(location),
                            value: Some(value.clone()),
                        },
                    );
                }
                Op::Read { target, key, at } => {
                    let location = self.location(*at);
                    let object = self.resolve(*target, allocated, &location)?;
                    eval.listener
                        .on_property_read(PropertyBinding::new(object, *key), Some(&location));
                }
                Op::Enumerate { target, at } => {
                    let location = self.location(*at);
                    let object = self.resolve(*target, allocated, &location)?;
                    eval.listener.on_own_properties_enumerated(object, Some(&location));
                }
                Op::Allocate => {
                    let object = self.fresh_object();
                    eval.created.insert(object);
                    allocated.push(object);
                }
                Op::Call { callee, at } => {
                    let location = self.location(*at);
                    if let Flow::Throw(abrupt) = self.call(eval, *callee, depth + 1, &location)? {
                        return Ok(Flow::Throw(abrupt));
                    }
                }
                Op::Register { target, shape, at } => {
                    eval.listener.on_register(CandidateRequest {
                        target: target.clone(),
                        shape: shape.clone(),
                        config: None,
                        location: Some(self.location(*at)),
                    });
                }
                Op::AssignGlobal { name, at } => {
                    let effect = SideEffect {
                        kind: SideEffectKind::ModifiedBinding { name: name.clone() },
                        location: Some(self.location(*at)),
                    };
                    if eval.listener.on_side_effect(&effect).is_abort() {
                        return Err(SubstrateError::Aborted);
                    }
                }
                Op::Throw { at } => {
                    return Ok(Flow::Throw(AbruptCompletion {
                        kind: AbruptKind::Throw,
                        location: Some(self.location(*at)),
                    }));
                }
                Op::MaybeThrow { at } => {
                    if eval.maybe_abrupt.is_none() {
                        eval.maybe_abrupt = Some(AbruptCompletion {
                            kind: AbruptKind::Throw,
                            location: Some(self.location(*at)),
                        });
                    }
                }
                Op::Repeat { times, body } => {
                    for _ in 0..*times {
                        match self.exec(eval, body, allocated, depth)? {
                            Flow::Next => {}
                            flow => return Ok(flow),
                        }
                    }
                }
                Op::IfEquals { target, key, value, then, at } => {
                    let location = self.location(*at);
                    let object = self.resolve(*target, allocated, &location)?;
                    let binding = PropertyBinding::new(object, *key);
                    eval.listener.on_property_read(binding, Some(&location));
                    if self.current_value(eval, binding).as_ref() == Some(value) {
                        match self.exec(eval, then, allocated, depth)? {
                            Flow::Next => {}
                            flow => return Ok(flow),
                        }
                    }
                }
                Op::Return(value) => return Ok(Flow::Return(value.clone())),
            }
        }
        Ok(Flow::Next)
    }
}

impl Substrate for HeapModel {
    fn function_signature(&self, callable: CallableId) -> Option<FunctionSignature> {
        self.functions
            .get(callable.index() as usize)
            .map(|def| def.signature.clone())
    }

    fn composite_root(&self, object: ObjectId) -> Option<CallableId> {
        self.roots.get(&object).copied()
    }

    fn evaluate_pure(
        &mut self,
        call: &CallExpression,
        listener: &mut dyn EvaluationListener,
    ) -> Result<Effects, SubstrateError> {
        self.evaluations += 1;
        let mut eval = Evaluation {
            listener,
            created: BTreeSet::new(),
            writes: BTreeMap::new(),
            maybe_abrupt: None,
        };
        let flow = self.call(&mut eval, call.callee, 0, &call.location)?;
        let normal = match flow {
            Flow::Throw(abrupt) => Err(abrupt),
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::undefined()),
        };
        let result = match (normal, eval.maybe_abrupt.take()) {
            (Err(abrupt), _) => Completion::Abrupt(abrupt),
            (Ok(value), None) => Completion::Normal(value),
            (Ok(value), Some(abrupt)) => Completion::PossiblyAbrupt { normal: value, abrupt },
        };
        Ok(Effects {
            result,
            created_objects: eval.created,
            modified_properties: eval.writes,
        })
    }

    fn with_effects_applied<R, F>(&mut self, effects: &Effects, body: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let mut inserted = Vec::new();
        for object in &effects.created_objects {
            if !self.heap.contains_key(object) {
                self.heap.insert(*object, BTreeMap::new());
                inserted.push(*object);
            }
        }
        let mut undo = Vec::with_capacity(effects.modified_properties.len());
        for (binding, site) in &effects.modified_properties {
            let props = self.heap.entry(binding.object).or_default();
            let previous = match &site.value {
                Some(value) => props.insert(binding.key, value.clone()),
                None => props.remove(&binding.key),
            };
            undo.push((*binding, previous));
        }

        let result = body(self);

        for (binding, previous) in undo.into_iter().rev() {
            let props = self.heap.entry(binding.object).or_default();
            match previous {
                Some(value) => {
                    props.insert(binding.key, value);
                }
                None => {
                    props.remove(&binding.key);
                }
            }
        }
        for object in inserted {
            self.heap.remove(&object);
        }
        result
    }

    fn property_name(&self, key: PropertyKey) -> Option<&str> {
        self.interner.resolve(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgumentSynthesizer;
    use crate::substrate::SinkDecision;

    #[derive(Default)]
    struct Recorder {
        side_effects: Vec<SideEffect>,
        reads: Vec<PropertyBinding>,
        registered: Vec<CandidateRequest>,
        calls: Vec<(CallableId, bool)>,
        abort: bool,
    }

    impl EvaluationListener for Recorder {
        fn on_side_effect(&mut self, effect: &SideEffect) -> SinkDecision {
            self.side_effects.push(effect.clone());
            if self.abort {
                SinkDecision::Abort
            } else {
                SinkDecision::Continue
            }
        }

        fn on_register(&mut self, request: CandidateRequest) {
            self.registered.push(request);
        }

        fn on_property_read(&mut self, binding: PropertyBinding, _location: Option<&SourceLocation>) {
            self.reads.push(binding);
        }

        fn on_call_enter(&mut self, callee: CallableId) {
            self.calls.push((callee, true));
        }

        fn on_call_exit(&mut self, callee: CallableId) {
            self.calls.push((callee, false));
        }
    }

    fn evaluate(model: &mut HeapModel, callable: CallableId, listener: &mut Recorder) -> Result<Effects, SubstrateError> {
        let signature = model.function_signature(callable).unwrap();
        let call = ArgumentSynthesizer::new().synthesize(callable, &signature, None).unwrap();
        model.evaluate_pure(&call, listener)
    }

    #[test]
    fn test_pure_evaluation_leaves_heap_untouched() {
        let mut model = HeapModel::new("m.js");
        let obj = model.object();
        let x = model.key("x");
        model.set(obj, x, Value::number(0.0));
        let f = model.define(
            "f",
            vec![
                Op::Write { target: Target::Object(obj), key: x, value: Value::number(1.0), at: line(1) },
                Op::Read { target: Target::Object(obj), key: x, at: line(2) },
            ],
        );
        let mut listener = Recorder::default();
        let effects = evaluate(&mut model, f, &mut listener).unwrap();
        assert!(effects.writes(&PropertyBinding::new(obj, x)));
        assert_eq!(model.get(obj, x), Some(&Value::number(0.0)));
        assert_eq!(listener.side_effects.len(), 1);
        assert_eq!(listener.reads, [PropertyBinding::new(obj, x)]);
        assert_eq!(model.evaluations(), 1);
        assert_eq!(model.property_name(x), Some("x"));
    }

    #[test]
    fn test_writes_to_new_objects_are_not_side_effects() {
        let mut model = HeapModel::new("m.js");
        let k = model.key("k");
        let f = model.define(
            "f",
            vec![
                Op::Allocate,
                Op::Write { target: Target::Allocated(0), key: k, value: Value::undefined(), at: line(1) },
            ],
        );
        let mut listener = Recorder::default();
        let effects = evaluate(&mut model, f, &mut listener).unwrap();
        assert!(listener.side_effects.is_empty());
        assert_eq!(effects.created_objects.len(), 1);
        assert_eq!(effects.modified_properties.len(), 1);
    }

    #[test]
    fn test_abort_stops_evaluation() {
        let mut model = HeapModel::new("m.js");
        let f = model.define(
            "f",
            vec![
                Op::AssignGlobal { name: "g".into(), at: line(1) },
                Op::register(Value::Function(CallableId::new(0)), line(2)),
            ],
        );
        let mut listener = Recorder {
            abort: true,
            ..Recorder::default()
        };
        let err = evaluate(&mut model, f, &mut listener).unwrap_err();
        assert!(matches!(err, SubstrateError::Aborted));
        assert!(listener.registered.is_empty());
    }

    #[test]
    fn test_completions() {
        let mut model = HeapModel::new("m.js");
        let throws = model.define("t", vec![Op::Throw { at: line(1) }]);
        let maybe = model.define("m", vec![Op::MaybeThrow { at: line(2) }, Op::Return(Value::number(4.0))]);
        let caller = model.define("c", vec![Op::Call { callee: throws, at: line(3) }, Op::Return(Value::undefined())]);

        let mut listener = Recorder::default();
        let result = evaluate(&mut model, throws, &mut listener).unwrap().result;
        assert!(result.is_definitely_abrupt());
        let result = evaluate(&mut model, maybe, &mut listener).unwrap().result;
        assert!(matches!(result, Completion::PossiblyAbrupt { .. }));
        assert!(!result.is_definitely_abrupt());
        let result = evaluate(&mut model, caller, &mut listener).unwrap().result;
        assert!(result.is_definitely_abrupt());
    }

    #[test]
    fn test_call_depth_is_bounded() {
        let mut model = HeapModel::new("m.js");
        let f = model.define("f", vec![]);
        model.set_body(f, vec![Op::Call { callee: f, at: line(1) }]);
        let mut listener = Recorder::default();
        let err = evaluate(&mut model, f, &mut listener).unwrap_err();
        assert!(matches!(err, SubstrateError::Unsupported { .. }));
    }

    #[test]
    fn test_applied_effects_are_undone() {
        let mut model = HeapModel::new("m.js");
        let obj = model.object();
        let x = model.key("x");
        model.set(obj, x, Value::number(0.0));
        let f = model.define(
            "f",
            vec![
                Op::Write { target: Target::Object(obj), key: x, value: Value::number(1.0), at: line(1) },
                Op::Allocate,
                Op::Write { target: Target::Allocated(0), key: x, value: Value::number(2.0), at: line(2) },
            ],
        );
        let mut listener = Recorder::default();
        let effects = evaluate(&mut model, f, &mut listener).unwrap();
        let fresh = *effects.created_objects.iter().next().unwrap();

        let seen = model.with_effects_applied(&effects, |m| {
            (m.get(obj, x).cloned(), m.get(fresh, x).cloned())
        });
        assert_eq!(seen, (Some(Value::number(1.0)), Some(Value::number(2.0))));
        assert_eq!(model.get(obj, x), Some(&Value::number(0.0)));
        assert_eq!(model.get(fresh, x), None);
    }

    #[test]
    fn test_call_hooks_are_balanced_on_throw() {
        let mut model = HeapModel::new("m.js");
        let leaf = model.define("leaf", vec![Op::Throw { at: line(1) }]);
        let f = model.define("f", vec![Op::Call { callee: leaf, at: line(2) }]);
        let mut listener = Recorder::default();
        evaluate(&mut model, f, &mut listener).unwrap();
        assert_eq!(listener.calls, [(f, true), (leaf, true), (leaf, false), (f, false)]);
    }

    #[test]
    fn test_branch_sees_own_writes_and_committed_baseline() {
        let mut model = HeapModel::new("m.js");
        let flag = model.object();
        let ready = model.key("ready");
        let out = model.key("out");
        let check = Op::IfEquals {
            target: Target::Object(flag),
            key: ready,
            value: Value::number(1.0),
            then: vec![Op::Write { target: Target::Object(flag), key: out, value: Value::number(9.0), at: line(3) }],
            at: line(2),
        };
        let g = model.define("g", vec![check.clone()]);
        let f = model.define(
            "f",
            vec![
                Op::Write { target: Target::Object(flag), key: ready, value: Value::number(1.0), at: line(1) },
                check,
            ],
        );
        let taken = PropertyBinding::new(flag, out);

        let mut listener = Recorder::default();
        let alone = evaluate(&mut model, g, &mut listener).unwrap();
        assert!(!alone.writes(&taken));
        assert_eq!(listener.reads, [PropertyBinding::new(flag, ready)]);

        let own = evaluate(&mut model, f, &mut listener).unwrap();
        assert!(own.writes(&taken));

        let under = model
            .with_effects_applied(&own, |m| evaluate(m, g, &mut listener))
            .unwrap();
        assert!(under.writes(&taken));
        assert_eq!(model.get(flag, ready), None);
    }
}
