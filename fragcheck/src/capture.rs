//! Speculative capture of one candidate's effects.
//!
//! The recorder calls a candidate with placeholder inputs under pure
//! evaluation rules and turns whatever the substrate reports into an
//! immutable [`EffectsRecord`]. It does not judge the result completion;
//! abrupt results are left for verification so they can be reported
//! together.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::args::ArgumentSynthesizer;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::discovery::TraversalContext;
use crate::error::{AnalysisError, AnalysisResult, SubstrateError};
use crate::heap::{BaselineId, CallableId, Completion, Effects, ObjectId, PropertyBinding, Value};
use crate::names::NameResolver;
use crate::sink::DiagnosticsSink;
use crate::span::SourceLocation;
use crate::substrate::{
    ArgumentShape, CandidateRequest, EvaluationListener, FunctionSignature, SideEffect, SideEffectKind,
    SinkDecision, Substrate,
};
use crate::table::WriteEffectsTable;

/// A fragment accepted for independent re-emission.
///
/// Identified by the callable it wraps.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub callable: CallableId,
    /// The value that was registered: the callable itself or a composite root.
    pub target: Value,
    pub shape: Option<ArgumentShape>,
    pub config: Option<BTreeMap<String, String>>,
    pub location: Option<SourceLocation>,
}

impl Candidate {
    pub fn new(callable: CallableId, request: CandidateRequest) -> Self {
        Self {
            callable,
            target: request.target,
            shape: request.shape,
            config: request.config,
            location: request.location,
        }
    }
}

/// What evaluating one candidate did, captured once and never changed.
#[derive(Debug, Clone)]
pub struct EffectsRecord {
    candidate: Candidate,
    signature: FunctionSignature,
    effects: Effects,
    parent: Option<CallableId>,
    baseline: BaselineId,
    written_objects: BTreeSet<ObjectId>,
}

impl EffectsRecord {
    pub(crate) fn new(
        candidate: Candidate,
        signature: FunctionSignature,
        effects: Effects,
        parent: Option<CallableId>,
        baseline: BaselineId,
    ) -> Self {
        let written_objects = effects.written_objects();
        Self {
            candidate,
            signature,
            effects,
            parent,
            baseline,
            written_objects,
        }
    }

    /// The callable this record belongs to.
    pub fn owner(&self) -> CallableId {
        self.candidate.callable
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    pub fn result(&self) -> &Completion {
        &self.effects.result
    }

    /// The candidate whose committed effects revealed this one.
    pub fn parent(&self) -> Option<CallableId> {
        self.parent
    }

    /// The baseline the capture ran against.
    pub fn baseline(&self) -> BaselineId {
        self.baseline
    }

    pub fn created_objects(&self) -> &BTreeSet<ObjectId> {
        &self.effects.created_objects
    }

    pub fn writes(&self, binding: &PropertyBinding) -> bool {
        self.effects.writes(binding)
    }

    /// Whether any property of `object` is in the write-set.
    pub fn writes_object(&self, object: ObjectId) -> bool {
        self.written_objects.contains(&object)
    }
}

/// Observes a capture: side effects go to the sink, registrations to the
/// traversal's pending list.
struct CaptureListener<'a> {
    name: &'a str,
    sink: &'a mut DiagnosticsSink,
    traversal: &'a mut TraversalContext,
    escalated: bool,
}

impl EvaluationListener for CaptureListener<'_> {
    fn on_side_effect(&mut self, effect: &SideEffect) -> SinkDecision {
        let suggestion = match &effect.kind {
            SideEffectKind::ModifiedBinding { name } => format!("keep `{name}` local to the optimized function"),
            SideEffectKind::ModifiedProperty { .. } => {
                "create the object inside the optimized function instead of mutating it".to_string()
            }
        };
        let diagnostic = Diagnostic::warning(
            ErrorCode::SpeculativeSideEffect,
            format!("optimized function {} {}", self.name, effect.kind),
            effect.location.clone(),
        )
        .with_suggestion(suggestion);
        let decision = self.sink.report(diagnostic);
        if decision.is_abort() {
            self.escalated = true;
        }
        decision
    }

    fn on_register(&mut self, request: CandidateRequest) {
        trace!(target = %request.target, "candidate registered during capture");
        self.traversal.register(request);
    }
}

/// Captures effects records.
#[derive(Debug, Default)]
pub struct EffectsRecorder {
    synthesizer: ArgumentSynthesizer,
}

impl EffectsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synthesizer_mut(&mut self) -> &mut ArgumentSynthesizer {
        &mut self.synthesizer
    }

    /// Evaluate `candidate` speculatively and record what it did.
    ///
    /// The record is attributed to the innermost committed candidate of
    /// `traversal`. Registrations observed during the evaluation are pushed
    /// onto the traversal's pending list.
    pub fn capture<S: Substrate>(
        &mut self,
        substrate: &mut S,
        candidate: &Candidate,
        traversal: &mut TraversalContext,
        table: &WriteEffectsTable,
        sink: &mut DiagnosticsSink,
        names: &NameResolver,
    ) -> AnalysisResult<EffectsRecord> {
        let callable = candidate.callable;
        let name = names.resolve(substrate, callable);

        if table.contains(callable) {
            sink.report(Diagnostic::fatal(
                ErrorCode::DoubleOptimization,
                format!("Optimized function {name} already has recorded effects"),
                candidate.location.clone(),
            ));
            return Err(AnalysisError::DoubleOptimization { callable, name });
        }

        let Some(signature) = substrate.function_signature(callable) else {
            let descr = format!("{callable} without a known definition");
            sink.report(Diagnostic::fatal(
                ErrorCode::InvalidCandidateTarget,
                format!("{descr} cannot be optimized"),
                candidate.location.clone(),
            ));
            return Err(AnalysisError::InvalidCandidateTarget {
                descr,
                location: candidate.location.clone(),
            });
        };

        let call = match self.synthesizer.synthesize(callable, &signature, candidate.shape.as_ref()) {
            Ok(call) => call,
            Err(unsupported) => {
                sink.report(unsupported.to_diagnostic(&name));
                return Err(AnalysisError::UnsupportedParameterPattern {
                    callable,
                    name,
                    index: unsupported.index,
                });
            }
        };

        let parent = traversal.parent();
        let baseline = traversal.baseline();
        debug!(%callable, %name, ?parent, %baseline, "capturing effects");

        let mut listener = CaptureListener {
            name: &name,
            sink,
            traversal,
            escalated: false,
        };
        let outcome = substrate.evaluate_pure(&call, &mut listener);
        let escalated = listener.escalated;

        let effects = match outcome {
            Ok(effects) => effects,
            Err(SubstrateError::Aborted) if escalated => {
                return Err(AnalysisError::SideEffectEscalated { callable, name });
            }
            Err(err) => {
                sink.report(Diagnostic::fatal(
                    ErrorCode::SubstrateFailure,
                    format!("could not evaluate optimized function {name}: {err}"),
                    err.location().cloned().or_else(|| Some(signature.location.clone())),
                ));
                return Err(err.into());
            }
        };

        trace!(
            %callable,
            writes = effects.modified_properties.len(),
            created = effects.created_objects.len(),
            "captured"
        );
        Ok(EffectsRecord::new(candidate.clone(), signature, effects, parent, baseline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::model::{line, HeapModel, Op, Target};
    use crate::substrate::FormalParameter;

    struct Fixture {
        recorder: EffectsRecorder,
        traversal: TraversalContext,
        table: WriteEffectsTable,
        sink: DiagnosticsSink,
        names: NameResolver,
    }

    impl Fixture {
        fn new(config: AnalysisConfig) -> Self {
            Self {
                recorder: EffectsRecorder::new(),
                traversal: TraversalContext::new(),
                table: WriteEffectsTable::new(),
                sink: DiagnosticsSink::new(&config),
                names: NameResolver::new(),
            }
        }

        fn capture(&mut self, model: &mut HeapModel, callable: CallableId) -> AnalysisResult<EffectsRecord> {
            let candidate = Candidate::new(callable, CandidateRequest::function(callable));
            self.recorder.capture(
                model,
                &candidate,
                &mut self.traversal,
                &self.table,
                &mut self.sink,
                &self.names,
            )
        }
    }

    #[test]
    fn test_capture_records_writes_and_warns() {
        let mut model = HeapModel::new("app.js");
        let obj = model.object();
        let x = model.key("x");
        let f = model.define(
            "f",
            vec![Op::Write { target: Target::Object(obj), key: x, value: Value::number(1.0), at: line(2) }],
        );
        let mut fx = Fixture::new(AnalysisConfig::default());
        let record = fx.capture(&mut model, f).unwrap();
        assert_eq!(record.owner(), f);
        assert!(record.writes(&PropertyBinding::new(obj, x)));
        assert!(record.writes_object(obj));
        assert_eq!(record.parent(), None);
        assert!(record.baseline().is_global());
        assert!(record.created_objects().is_empty());
        let warning = fx.sink.warnings().next().unwrap();
        assert_eq!(fx.sink.warnings().count(), 1);
        assert_eq!(
            warning.suggestions,
            ["create the object inside the optimized function instead of mutating it"]
        );
    }

    #[test]
    fn test_fresh_objects_are_recorded_without_warning() {
        let mut model = HeapModel::new("app.js");
        let x = model.key("x");
        let f = model.define(
            "f",
            vec![
                Op::Allocate,
                Op::Write { target: Target::Allocated(0), key: x, value: Value::number(1.0), at: line(2) },
            ],
        );
        let mut fx = Fixture::new(AnalysisConfig::default());
        let record = fx.capture(&mut model, f).unwrap();
        assert_eq!(record.created_objects().len(), 1);
        let fresh = *record.created_objects().iter().next().unwrap();
        assert!(record.writes_object(fresh));
        assert!(fx.sink.diagnostics().is_empty());
    }

    #[test]
    fn test_destructuring_fails_before_evaluation() {
        let mut model = HeapModel::new("app.js");
        let f = model.define_with_params(
            "f",
            vec![FormalParameter {
                pattern: crate::substrate::ParameterPattern::ArrayPattern,
                span: line(1),
            }],
            vec![],
        );
        let mut fx = Fixture::new(AnalysisConfig::default());
        let err = fx.capture(&mut model, f).unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedParameterPattern { index: 0, .. }));
        assert_eq!(model.evaluations(), 0);
    }

    #[test]
    fn test_escalated_side_effect_stops_capture() {
        let mut model = HeapModel::new("app.js");
        let f = model.define("f", vec![Op::AssignGlobal { name: "counter".into(), at: line(3) }]);
        let config = AnalysisConfig::builder().warnings_as_errors(true).build().unwrap();
        let mut fx = Fixture::new(config);
        let err = fx.capture(&mut model, f).unwrap_err();
        assert!(matches!(err, AnalysisError::SideEffectEscalated { .. }));
        assert_eq!(err.code(), ErrorCode::SpeculativeSideEffect);
    }

    #[test]
    fn test_registrations_land_in_pending_list() {
        let mut model = HeapModel::new("app.js");
        let h = model.define("h", vec![]);
        let f = model.define("f", vec![Op::register(Value::Function(h), line(4))]);
        let mut fx = Fixture::new(AnalysisConfig::default());
        fx.capture(&mut model, f).unwrap();
        assert_eq!(fx.traversal.pending().len(), 1);
        assert_eq!(fx.traversal.pending()[0].target, Value::Function(h));
    }

    #[test]
    fn test_substrate_failure_is_reported() {
        let mut model = HeapModel::new("app.js");
        let f = model.define("f", vec![Op::Call { callee: CallableId::new(99), at: line(5) }]);
        let mut fx = Fixture::new(AnalysisConfig::default());
        let err = fx.capture(&mut model, f).unwrap_err();
        assert!(matches!(err, AnalysisError::Substrate(SubstrateError::Unsupported { .. })));
        assert!(fx.sink.diagnostics().iter().any(|d| d.code == ErrorCode::SubstrateFailure));
    }
}
