//! Collects diagnostics and decides whether the analysis goes on.

use tracing::{error, warn};

use crate::config::AnalysisConfig;
use crate::conflict::ConflictDiagnostic;
use crate::diagnostics::{Diagnostic, Severity};
use crate::substrate::SinkDecision;

/// Caller hook consulted for warnings and recoverable errors.
///
/// Returning `None` leaves the decision to the configuration. Fatal errors
/// never reach the handler's decision: they always abort.
pub trait ErrorHandler {
    fn handle(&mut self, diagnostic: &Diagnostic) -> Option<SinkDecision>;
}

impl<F> ErrorHandler for F
where
    F: FnMut(&Diagnostic) -> Option<SinkDecision>,
{
    fn handle(&mut self, diagnostic: &Diagnostic) -> Option<SinkDecision> {
        self(diagnostic)
    }
}

/// The diagnostics channel of one analysis run.
pub struct DiagnosticsSink {
    diagnostics: Vec<Diagnostic>,
    warnings_as_errors: bool,
    recover_errors: bool,
    handler: Option<Box<dyn ErrorHandler>>,
}

impl DiagnosticsSink {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            diagnostics: Vec::new(),
            warnings_as_errors: config.warnings_as_errors,
            recover_errors: config.recover_errors,
            handler: None,
        }
    }

    pub fn with_handler(self, handler: impl ErrorHandler + 'static) -> Self {
        self.with_boxed_handler(Box::new(handler))
    }

    pub fn with_boxed_handler(mut self, handler: Box<dyn ErrorHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Remove the handler, e.g. to reuse it for another run.
    pub fn take_handler(&mut self) -> Option<Box<dyn ErrorHandler>> {
        self.handler.take()
    }

    /// Record a diagnostic and decide whether the analysis may continue.
    ///
    /// A diagnostic identical in code, location and message to one already
    /// recorded is not stored again.
    pub fn report(&mut self, diagnostic: Diagnostic) -> SinkDecision {
        let decision = self.decide(&diagnostic);
        match diagnostic.severity {
            Severity::Warning => warn!(code = %diagnostic.code, ?decision, "{}", diagnostic.message),
            Severity::RecoverableError | Severity::FatalError => {
                error!(code = %diagnostic.code, ?decision, "{}", diagnostic.message)
            }
        }
        if !self.diagnostics.iter().any(|d| d.same_report(&diagnostic)) {
            self.diagnostics.push(diagnostic);
        }
        decision
    }

    /// Record every conflict, then abort once if there were any.
    pub fn report_conflicts(&mut self, conflicts: &[ConflictDiagnostic]) -> SinkDecision {
        for conflict in conflicts {
            self.report(conflict.to_diagnostic());
        }
        if conflicts.is_empty() {
            SinkDecision::Continue
        } else {
            SinkDecision::Abort
        }
    }

    fn decide(&mut self, diagnostic: &Diagnostic) -> SinkDecision {
        if diagnostic.severity == Severity::FatalError {
            return SinkDecision::Abort;
        }
        if let Some(decision) = self.handler.as_mut().and_then(|h| h.handle(diagnostic)) {
            return decision;
        }
        let abort = match diagnostic.severity {
            Severity::Warning => self.warnings_as_errors,
            Severity::RecoverableError => !self.recover_errors,
            Severity::FatalError => true,
        };
        if abort {
            SinkDecision::Abort
        } else {
            SinkDecision::Continue
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity.is_error())
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl std::fmt::Debug for DiagnosticsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsSink")
            .field("diagnostics", &self.diagnostics)
            .field("warnings_as_errors", &self.warnings_as_errors)
            .field("recover_errors", &self.recover_errors)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorCode;
    use crate::heap::CallableId;
    use crate::span::{SourceLocation, Span};

    fn loc(line: u32) -> SourceLocation {
        SourceLocation::new("app.js", Span::new(line as usize * 10, line as usize * 10 + 5, line, 1))
    }

    fn side_effect(line: u32) -> Diagnostic {
        Diagnostic::warning(ErrorCode::SpeculativeSideEffect, "side effect", Some(loc(line)))
    }

    #[test]
    fn test_warnings_continue_by_default() {
        let mut sink = DiagnosticsSink::new(&AnalysisConfig::default());
        assert_eq!(sink.report(side_effect(1)), SinkDecision::Continue);
        assert_eq!(sink.warnings().count(), 1);
        assert!(!sink.has_errors());
    }

    #[test]
    fn test_warnings_as_errors_abort() {
        let config = AnalysisConfig::builder().warnings_as_errors(true).build().unwrap();
        let mut sink = DiagnosticsSink::new(&config);
        assert_eq!(sink.report(side_effect(1)), SinkDecision::Abort);
    }

    #[test]
    fn test_recoverable_errors_abort_unless_recovered() {
        let dup = || Diagnostic::recoverable(ErrorCode::DoubleOptimization, "twice", Some(loc(2)));
        let mut sink = DiagnosticsSink::new(&AnalysisConfig::default());
        assert_eq!(sink.report(dup()), SinkDecision::Abort);

        let config = AnalysisConfig::builder().recover_errors(true).build().unwrap();
        let mut sink = DiagnosticsSink::new(&config);
        assert_eq!(sink.report(dup()), SinkDecision::Continue);
    }

    #[test]
    fn test_handler_decides_but_cannot_rescue_fatal() {
        let mut sink = DiagnosticsSink::new(&AnalysisConfig::default())
            .with_handler(|_: &Diagnostic| Some(SinkDecision::Continue));
        let dup = Diagnostic::recoverable(ErrorCode::DoubleOptimization, "twice", None);
        assert_eq!(sink.report(dup), SinkDecision::Continue);
        let fatal = Diagnostic::fatal(ErrorCode::AbruptCompletion, "throws", None);
        assert_eq!(sink.report(fatal), SinkDecision::Abort);
    }

    #[test]
    fn test_identical_reports_are_stored_once() {
        let mut sink = DiagnosticsSink::new(&AnalysisConfig::default());
        sink.report(side_effect(3));
        sink.report(side_effect(3));
        sink.report(side_effect(4));
        assert_eq!(sink.diagnostics().len(), 2);
    }

    #[test]
    fn test_conflicts_abort_once_after_all_reported() {
        let mut sink = DiagnosticsSink::new(&AnalysisConfig::default());
        assert_eq!(sink.report_conflicts(&[]), SinkDecision::Continue);
        let conflicts: Vec<_> = (1..=3)
            .map(|line| ConflictDiagnostic {
                location: loc(line),
                offending_candidate_name: "f".into(),
                writer: CallableId::new(0),
                reader: CallableId::new(1),
            })
            .collect();
        assert_eq!(sink.report_conflicts(&conflicts), SinkDecision::Abort);
        assert_eq!(sink.diagnostics().len(), 3);
        assert!(sink.diagnostics().iter().all(|d| d.code == ErrorCode::WriteConflict));
    }
}
