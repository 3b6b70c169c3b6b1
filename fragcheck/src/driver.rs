//! The two-phase analysis: capture everything, then verify.
//!
//! ```text
//! roots ──► DiscoveryQueue ──► EffectsRecorder ──► WriteEffectsTable
//!              ▲     │ (nested, under commit)              │
//!              └─────┘                                      ▼
//!                                    ConflictDetector ──► DiagnosticsSink
//! ```
//!
//! Verification never starts before every capture, nested ones included,
//! has finished. Any fatal diagnostic drops the table; only a run with zero
//! conflicts yields [`VerifiedCandidates`].

use std::sync::Arc;

use tracing::{info, info_span};

use crate::capture::{Candidate, EffectsRecord};
use crate::config::AnalysisConfig;
use crate::conflict::ConflictDetector;
use crate::diagnostics::Diagnostic;
use crate::discovery::{CaptureState, DiscoveryQueue, TraversalContext};
use crate::error::{AnalysisError, AnalysisFailure, AnalysisResult};
use crate::names::NameResolver;
use crate::sink::{DiagnosticsSink, ErrorHandler};
use crate::substrate::{CandidateRequest, Substrate};
use crate::table::WriteEffectsTable;

/// The effects of candidates proven independent.
///
/// Only [`IndependenceChecker::run`] builds this, and only when
/// verification found no conflict.
#[derive(Debug, Clone)]
pub struct VerifiedCandidates {
    table: WriteEffectsTable,
    warnings: Vec<Diagnostic>,
}

impl VerifiedCandidates {
    pub fn table(&self) -> &WriteEffectsTable {
        &self.table
    }

    /// Records in capture order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<EffectsRecord>> {
        self.table.iter()
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.table.candidates()
    }

    /// Warnings reported while capturing.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn into_table(self) -> WriteEffectsTable {
        self.table
    }
}

/// Runs the independence analysis over a substrate.
pub struct IndependenceChecker<S> {
    substrate: S,
    config: AnalysisConfig,
    names: NameResolver,
    handler: Option<Box<dyn ErrorHandler>>,
}

impl<S: Substrate> IndependenceChecker<S> {
    pub fn new(substrate: S) -> Self {
        Self {
            substrate,
            config: AnalysisConfig::default(),
            names: NameResolver::new(),
            handler: None,
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_names(mut self, names: NameResolver) -> Self {
        self.names = names;
        self
    }

    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn names(&self) -> &NameResolver {
        &self.names
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn substrate_mut(&mut self) -> &mut S {
        &mut self.substrate
    }

    pub fn into_substrate(self) -> S {
        self.substrate
    }

    /// Capture `roots` and everything they reveal, then verify them.
    pub fn run(
        &mut self,
        roots: impl IntoIterator<Item = CandidateRequest>,
    ) -> Result<VerifiedCandidates, AnalysisFailure> {
        let _span = info_span!("independence_check").entered();

        let mut sink = DiagnosticsSink::new(&self.config);
        if let Some(handler) = self.handler.take() {
            sink = sink.with_boxed_handler(handler);
        }
        let mut state = CaptureState::new(&self.config, sink, &self.names);
        let outcome = analyze(&mut self.substrate, &mut state, roots);
        self.handler = state.sink.take_handler();

        match outcome {
            Ok(()) => {
                info!(candidates = state.table.len(), "candidates verified");
                let warnings = state.sink.warnings().cloned().collect();
                Ok(VerifiedCandidates {
                    table: state.table,
                    warnings,
                })
            }
            Err(error) => {
                info!(%error, "analysis aborted");
                Err(AnalysisFailure {
                    error,
                    diagnostics: state.sink.into_diagnostics(),
                })
            }
        }
    }
}

fn analyze<S: Substrate>(
    substrate: &mut S,
    state: &mut CaptureState<'_>,
    roots: impl IntoIterator<Item = CandidateRequest>,
) -> AnalysisResult<()> {
    let mut traversal = TraversalContext::new();
    DiscoveryQueue::new(roots).run(substrate, &mut traversal, state)?;

    let conflicts = ConflictDetector::new(state.names).verify(
        substrate,
        &state.table,
        state.recorder.synthesizer_mut(),
        &mut state.sink,
    )?;
    if state.sink.report_conflicts(&conflicts).is_abort() {
        return Err(AnalysisError::WriteConflicts {
            count: conflicts.len(),
        });
    }
    Ok(())
}

impl<S: std::fmt::Debug> std::fmt::Debug for IndependenceChecker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndependenceChecker")
            .field("substrate", &self.substrate)
            .field("config", &self.config)
            .field("names", &self.names)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
