//! Interference checking between captured candidates.
//!
//! Runs only after every capture, nested ones included, has finished.
//! Each candidate is replayed once under its own baseline (the untouched
//! global state, or the committed effects of its ancestors) while every
//! property read and own-property enumeration is recorded. Each recorded
//! access is then matched against the write-set of every other candidate.
//!
//! A candidate's ancestors are never treated as writers against it: their
//! writes are part of the baseline it was captured and replayed under.
//! Accesses made while another candidate's body runs inline are attributed
//! to that candidate, so it is never matched against its own writes.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::args::ArgumentSynthesizer;
use crate::capture::EffectsRecord;
use crate::diagnostics::{Diagnostic, DiagnosticLabel, ErrorCode};
use crate::error::{AnalysisError, AnalysisResult};
use crate::heap::{CallableId, Completion, ObjectId, PropertyBinding};
use crate::names::NameResolver;
use crate::sink::DiagnosticsSink;
use crate::span::SourceLocation;
use crate::substrate::{CallExpression, EvaluationListener, SideEffect, SinkDecision, Substrate};
use crate::table::WriteEffectsTable;

/// A read or enumeration that observes another candidate's write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDiagnostic {
    /// Where the conflicting access happens.
    pub location: SourceLocation,
    /// Name of the candidate whose write is observed.
    pub offending_candidate_name: String,
    pub writer: CallableId,
    pub reader: CallableId,
}

impl ConflictDiagnostic {
    pub fn message(&self) -> String {
        format!(
            "Property access conflicts with write in optimized function {}",
            self.offending_candidate_name
        )
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::fatal(ErrorCode::WriteConflict, self.message(), Some(self.location.clone()))
            .with_label(DiagnosticLabel::primary(
                self.location.clone(),
                format!("observes state written by {}", self.offending_candidate_name),
            ))
    }
}

/// One observed access.
#[derive(Debug)]
struct Access<T> {
    target: T,
    location: SourceLocation,
    /// The innermost candidate whose body was running.
    within: CallableId,
}

/// Accesses observed while replaying one candidate.
#[derive(Debug)]
struct ReplayListener<'t> {
    table: &'t WriteEffectsTable,
    reader: CallableId,
    calls: Vec<CallableId>,
    reads: Vec<Access<PropertyBinding>>,
    enumerations: Vec<Access<ObjectId>>,
}

impl<'t> ReplayListener<'t> {
    fn new(table: &'t WriteEffectsTable, reader: CallableId) -> Self {
        Self {
            table,
            reader,
            calls: Vec::new(),
            reads: Vec::new(),
            enumerations: Vec::new(),
        }
    }

    fn within(&self) -> CallableId {
        self.calls
            .iter()
            .rev()
            .copied()
            .find(|callee| self.table.contains(*callee))
            .unwrap_or(self.reader)
    }
}

impl EvaluationListener for ReplayListener<'_> {
    fn on_side_effect(&mut self, effect: &SideEffect) -> SinkDecision {
        debug!(kind = %effect.kind, "side effect during replay ignored");
        SinkDecision::Continue
    }

    fn on_property_read(&mut self, binding: PropertyBinding, location: Option<&SourceLocation>) {
        if let Some(location) = location {
            let within = self.within();
            self.reads.push(Access {
                target: binding,
                location: location.clone(),
                within,
            });
        }
    }

    fn on_own_properties_enumerated(&mut self, object: ObjectId, location: Option<&SourceLocation>) {
        if let Some(location) = location {
            let within = self.within();
            self.enumerations.push(Access {
                target: object,
                location: location.clone(),
                within,
            });
        }
    }

    fn on_call_enter(&mut self, callee: CallableId) {
        self.calls.push(callee);
    }

    fn on_call_exit(&mut self, _callee: CallableId) {
        self.calls.pop();
    }
}

/// Checks every ordered pair of candidates for interference.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector<'a> {
    names: &'a NameResolver,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(names: &'a NameResolver) -> Self {
        Self { names }
    }

    /// Report every candidate whose result is a definite abrupt completion.
    pub fn check_completions<S: Substrate>(
        &self,
        substrate: &S,
        table: &WriteEffectsTable,
        sink: &mut DiagnosticsSink,
    ) -> AnalysisResult<()> {
        let mut count = 0;
        for record in table {
            let Completion::Abrupt(abrupt) = record.result() else {
                continue;
            };
            count += 1;
            let name = self.names.resolve(substrate, record.owner());
            let location = abrupt
                .location
                .clone()
                .unwrap_or_else(|| record.signature().location.clone());
            sink.report(Diagnostic::fatal(
                ErrorCode::AbruptCompletion,
                format!("Optimized function {name} {} on every path", abrupt.kind),
                Some(location),
            ));
        }
        if count > 0 {
            return Err(AnalysisError::AbruptCompletion { count });
        }
        Ok(())
    }

    /// Find all conflicts. An empty list means the candidates are
    /// independent.
    ///
    /// Fails without checking any pair if a candidate always completes
    /// abruptly.
    pub fn verify<S: Substrate>(
        &self,
        substrate: &mut S,
        table: &WriteEffectsTable,
        synthesizer: &mut ArgumentSynthesizer,
        sink: &mut DiagnosticsSink,
    ) -> AnalysisResult<Vec<ConflictDiagnostic>> {
        self.check_completions(substrate, table, sink)?;

        let observed = table
            .iter()
            .map(|record| self.replay(substrate, table, record, synthesizer))
            .collect::<AnalysisResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        let mut conflicts = Vec::new();
        for writer in table {
            for (reader, accesses) in table.iter().zip(&observed) {
                if reader.owner() == writer.owner() || table.is_ancestor(writer.owner(), reader.owner()) {
                    continue;
                }
                let foreign = |within: CallableId| within != writer.owner();
                let reads = accesses
                    .reads
                    .iter()
                    .filter(|access| foreign(access.within) && writer.writes(&access.target))
                    .map(|access| &access.location);
                let enumerations = accesses
                    .enumerations
                    .iter()
                    .filter(|access| foreign(access.within) && writer.writes_object(access.target))
                    .map(|access| &access.location);
                for location in reads.chain(enumerations) {
                    if seen.insert(location.clone()) {
                        conflicts.push(ConflictDiagnostic {
                            location: location.clone(),
                            offending_candidate_name: self.names.resolve(substrate, writer.owner()),
                            writer: writer.owner(),
                            reader: reader.owner(),
                        });
                    }
                }
            }
        }

        info!(candidates = table.len(), conflicts = conflicts.len(), "verification finished");
        Ok(conflicts)
    }

    fn replay<'t, S: Substrate>(
        &self,
        substrate: &mut S,
        table: &'t WriteEffectsTable,
        record: &EffectsRecord,
        synthesizer: &mut ArgumentSynthesizer,
    ) -> AnalysisResult<ReplayListener<'t>> {
        let callable = record.owner();
        let call = synthesizer
            .synthesize(callable, record.signature(), record.candidate().shape.as_ref())
            .map_err(|unsupported| AnalysisError::UnsupportedParameterPattern {
                callable,
                name: self.names.resolve(substrate, callable),
                index: unsupported.index,
            })?;
        let chain = table.ancestors(callable);
        debug!(%callable, ancestors = chain.len(), "replaying");

        let mut listener = ReplayListener::new(table, callable);
        replay_under(substrate, &chain, &call, &mut listener);
        Ok(listener)
    }
}

/// Evaluate `call` with `chain` committed, outermost first.
fn replay_under<S: Substrate>(
    substrate: &mut S,
    chain: &[Arc<EffectsRecord>],
    call: &CallExpression,
    listener: &mut ReplayListener<'_>,
) {
    match chain.split_first() {
        Some((outer, rest)) => substrate.with_effects_applied(outer.effects(), |substrate| {
            replay_under(substrate, rest, call, listener)
        }),
        None => {
            if let Err(err) = substrate.evaluate_pure(call, listener) {
                debug!(callee = %call.callee, %err, "replay stopped early");
            }
        }
    }
}
