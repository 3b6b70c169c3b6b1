//! Traversal of the candidate set, including nested discovery.
//!
//! Candidates are processed depth-first. After a candidate is captured its
//! effects are committed onto the baseline, and every candidate its own
//! evaluation registered is processed under that commit before the next
//! sibling is looked at.
//!
//! # Pending registrations
//!
//! Registrations observed during a capture go to the [`TraversalContext`].
//! Entering a candidate saves and clears the pending list, so a capture only
//! sees what it registered itself. The [`TraversalScope`] returned by
//! [`TraversalContext::enter`] restores the saved list (merged with anything
//! left over) when it is dropped, whichever way the candidate's processing
//! ended.

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, info};

use crate::capture::{Candidate, EffectsRecorder};
use crate::config::AnalysisConfig;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::error::{AnalysisError, AnalysisResult};
use crate::heap::{BaselineId, CallableId, Value};
use crate::names::NameResolver;
use crate::sink::DiagnosticsSink;
use crate::span::SourceLocation;
use crate::substrate::{CandidateRequest, Substrate};
use crate::table::WriteEffectsTable;

#[derive(Debug)]
struct Frame {
    candidate: CallableId,
    /// Set once the candidate's effects are committed.
    baseline: Option<BaselineId>,
    saved: Vec<CandidateRequest>,
}

/// The traversal stack and the pending registrations.
#[derive(Debug, Default)]
pub struct TraversalContext {
    frames: Vec<Frame>,
    pending: Vec<CandidateRequest>,
    commits: u32,
}

impl TraversalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of candidates currently being processed.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_unwound(&self) -> bool {
        self.frames.is_empty()
    }

    /// The candidate being processed right now.
    pub fn current(&self) -> Option<CallableId> {
        self.frames.last().map(|f| f.candidate)
    }

    /// The innermost candidate whose effects are committed.
    pub fn parent(&self) -> Option<CallableId> {
        self.innermost_committed().map(|f| f.candidate)
    }

    /// The baseline a capture would run against now.
    pub fn baseline(&self) -> BaselineId {
        self.innermost_committed()
            .and_then(|f| f.baseline)
            .unwrap_or(BaselineId::GLOBAL)
    }

    fn innermost_committed(&self) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.baseline.is_some())
    }

    pub fn register(&mut self, request: CandidateRequest) {
        self.pending.push(request);
    }

    pub fn pending(&self) -> &[CandidateRequest] {
        &self.pending
    }

    /// Push a frame for `candidate`, saving and clearing the pending list.
    pub fn enter(&mut self, candidate: CallableId) -> TraversalScope<'_> {
        let saved = mem::take(&mut self.pending);
        self.frames.push(Frame {
            candidate,
            baseline: None,
            saved,
        });
        TraversalScope { cx: self }
    }
}

/// One open frame of the traversal. Pops it on drop.
pub struct TraversalScope<'a> {
    cx: &'a mut TraversalContext,
}

impl TraversalScope<'_> {
    /// Take what was registered since this frame was entered.
    pub fn take_pending(&mut self) -> Vec<CandidateRequest> {
        mem::take(&mut self.cx.pending)
    }

    /// Mark this frame's effects as committed under a fresh baseline.
    pub fn commit(&mut self) -> BaselineId {
        self.cx.commits += 1;
        let baseline = BaselineId(self.cx.commits);
        if let Some(frame) = self.cx.frames.last_mut() {
            frame.baseline = Some(baseline);
        }
        baseline
    }
}

impl Deref for TraversalScope<'_> {
    type Target = TraversalContext;

    fn deref(&self) -> &TraversalContext {
        self.cx
    }
}

impl DerefMut for TraversalScope<'_> {
    fn deref_mut(&mut self) -> &mut TraversalContext {
        self.cx
    }
}

impl Drop for TraversalScope<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.cx.frames.pop() {
            let leftover = mem::replace(&mut self.cx.pending, frame.saved);
            self.cx.pending.extend(leftover);
        }
    }
}

/// Everything captured so far, owned by one run.
#[derive(Debug)]
pub struct CaptureState<'a> {
    pub recorder: EffectsRecorder,
    pub table: WriteEffectsTable,
    pub sink: DiagnosticsSink,
    pub names: &'a NameResolver,
    pub max_nesting_depth: usize,
}

impl<'a> CaptureState<'a> {
    pub fn new(config: &AnalysisConfig, sink: DiagnosticsSink, names: &'a NameResolver) -> Self {
        Self {
            recorder: EffectsRecorder::new(),
            table: WriteEffectsTable::new(),
            sink,
            names,
            max_nesting_depth: config.max_nesting_depth,
        }
    }
}

/// The callable a registered value stands for, if it can be a candidate.
pub fn resolve_target<S: Substrate>(substrate: &S, target: &Value) -> Option<CallableId> {
    match target {
        Value::Function(callable) => Some(*callable),
        Value::ConcreteObject(object) => substrate.composite_root(*object),
        Value::AbstractObject(_) | Value::Primitive(_) => None,
    }
}

/// Where a callable was first accepted for capture.
#[derive(Debug, Clone)]
struct Registration {
    location: Option<SourceLocation>,
    /// The candidate whose pending list it came from; `None` for roots.
    owner: Option<CallableId>,
}

impl Registration {
    /// A parent that calls its nested candidate inline also observes the
    /// registrations that candidate makes. Such a registration reaches the
    /// queue once per candidate on the chain, always from the same site.
    fn is_repeated_by(
        &self,
        request: &CandidateRequest,
        owner: Option<CallableId>,
        table: &WriteEffectsTable,
    ) -> bool {
        if request.location.is_none() || self.location != request.location {
            return false;
        }
        match (self.owner, owner) {
            (Some(first), Some(again)) => {
                first == again || table.is_ancestor(first, again) || table.is_ancestor(again, first)
            }
            _ => false,
        }
    }
}

/// Drives capture over the top-level candidates and everything they reveal.
#[derive(Debug, Default)]
pub struct DiscoveryQueue {
    pending: VecDeque<CandidateRequest>,
    registered: HashMap<CallableId, Registration>,
}

impl DiscoveryQueue {
    pub fn new(roots: impl IntoIterator<Item = CandidateRequest>) -> Self {
        Self {
            pending: roots.into_iter().collect(),
            registered: HashMap::new(),
        }
    }

    pub fn push(&mut self, request: CandidateRequest) {
        self.pending.push_back(request);
    }

    /// Top-level candidates not processed yet.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Process every queued candidate to exhaustion.
    ///
    /// Fails if the traversal stack is not back at zero depth afterwards.
    pub fn run<S: Substrate>(
        &mut self,
        substrate: &mut S,
        traversal: &mut TraversalContext,
        state: &mut CaptureState<'_>,
    ) -> AnalysisResult<()> {
        while let Some(request) = self.pending.pop_front() {
            self.process(substrate, traversal, state, request)?;
        }

        if !traversal.is_unwound() {
            let depth = traversal.depth();
            state.sink.report(Diagnostic::fatal(
                ErrorCode::TraversalNotUnwound,
                format!("candidate traversal finished with {depth} frame(s) still open"),
                None,
            ));
            return Err(AnalysisError::TraversalNotUnwound { depth });
        }

        info!(candidates = state.table.len(), "discovery finished");
        Ok(())
    }

    fn process<S: Substrate>(
        &mut self,
        substrate: &mut S,
        traversal: &mut TraversalContext,
        state: &mut CaptureState<'_>,
        request: CandidateRequest,
    ) -> AnalysisResult<()> {
        let Some(callable) = resolve_target(substrate, &request.target) else {
            let descr = format!("{} {}", request.target.kind_descr(), request.target);
            state.sink.report(Diagnostic::fatal(
                ErrorCode::InvalidCandidateTarget,
                format!("{descr} cannot be optimized: it is neither a function nor a component root"),
                request.location.clone(),
            ));
            return Err(AnalysisError::InvalidCandidateTarget {
                descr,
                location: request.location,
            });
        };

        let owner = traversal.current();
        if let Some(first) = self.registered.get(&callable) {
            if first.is_repeated_by(&request, owner, &state.table) {
                debug!(%callable, ?owner, "registration already seen through an inline call");
                return Ok(());
            }
            let name = state.names.resolve(substrate, callable);
            let mut diagnostic = Diagnostic::recoverable(
                ErrorCode::DoubleOptimization,
                format!("Optimized function {name} is registered more than once"),
                request.location.clone(),
            );
            if let Some(location) = first.location.clone() {
                diagnostic = diagnostic.with_note(location, "first registered here");
            }
            if state.sink.report(diagnostic).is_abort() {
                return Err(AnalysisError::DoubleOptimization { callable, name });
            }
            debug!(%callable, "skipping duplicate registration");
            return Ok(());
        }
        self.registered.insert(
            callable,
            Registration {
                location: request.location.clone(),
                owner,
            },
        );

        let depth = traversal.depth() + 1;
        if depth > state.max_nesting_depth {
            let limit = state.max_nesting_depth;
            let name = state.names.resolve(substrate, callable);
            state.sink.report(Diagnostic::fatal(
                ErrorCode::DiscoveryDepthExceeded,
                format!("optimized function {name} is nested {depth} levels deep, the limit is {limit}"),
                request.location.clone(),
            ));
            return Err(AnalysisError::DiscoveryDepthExceeded { limit });
        }

        let candidate = Candidate::new(callable, request);
        let mut scope = traversal.enter(callable);
        let record = state.recorder.capture(
            substrate,
            &candidate,
            &mut scope,
            &state.table,
            &mut state.sink,
            state.names,
        )?;
        let record = Arc::new(record);
        if !state.table.insert(Arc::clone(&record)) {
            let name = state.names.resolve(substrate, callable);
            return Err(AnalysisError::DoubleOptimization { callable, name });
        }

        let nested = scope.take_pending();
        if nested.is_empty() {
            return Ok(());
        }
        let baseline = scope.commit();
        debug!(%callable, %baseline, count = nested.len(), "processing nested candidates");
        substrate.with_effects_applied(record.effects(), |substrate| {
            nested
                .into_iter()
                .try_for_each(|request| self.process(substrate, &mut scope, state, request))
        })
    }
}
