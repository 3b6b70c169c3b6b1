//! Fatal analysis errors.
//!
//! Every fatal error has already been reported to the diagnostics sink by
//! the time it is returned; the error value only says why the run stopped.

use thiserror::Error;

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::heap::CallableId;
use crate::span::SourceLocation;

/// Result type alias for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Why an analysis run was aborted.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("{descr} cannot be optimized: it is neither callable nor a component root")]
    InvalidCandidateTarget {
        descr: String,
        location: Option<SourceLocation>,
    },

    #[error("parameter #{index} of {name} is not a simple identifier")]
    UnsupportedParameterPattern {
        callable: CallableId,
        name: String,
        index: usize,
    },

    #[error("{name} is already optimized")]
    DoubleOptimization { callable: CallableId, name: String },

    #[error("side effect in {name} was escalated to an error")]
    SideEffectEscalated { callable: CallableId, name: String },

    #[error("{count} optimized function(s) always complete abruptly")]
    AbruptCompletion { count: usize },

    #[error("found {count} write conflict(s) between optimized functions")]
    WriteConflicts { count: usize },

    #[error("optimized functions nested deeper than {limit}")]
    DiscoveryDepthExceeded { limit: usize },

    #[error("candidate traversal finished with {depth} frame(s) still open")]
    TraversalNotUnwound { depth: usize },

    #[error(transparent)]
    Substrate(#[from] SubstrateError),
}

impl AnalysisError {
    /// The diagnostic code this error is reported under.
    pub fn code(&self) -> ErrorCode {
        match self {
            AnalysisError::InvalidCandidateTarget { .. } => ErrorCode::InvalidCandidateTarget,
            AnalysisError::UnsupportedParameterPattern { .. } => {
                ErrorCode::UnsupportedParameterPattern
            }
            AnalysisError::DoubleOptimization { .. } => ErrorCode::DoubleOptimization,
            AnalysisError::SideEffectEscalated { .. } => ErrorCode::SpeculativeSideEffect,
            AnalysisError::AbruptCompletion { .. } => ErrorCode::AbruptCompletion,
            AnalysisError::WriteConflicts { .. } => ErrorCode::WriteConflict,
            AnalysisError::DiscoveryDepthExceeded { .. } => ErrorCode::DiscoveryDepthExceeded,
            AnalysisError::TraversalNotUnwound { .. } => ErrorCode::TraversalNotUnwound,
            AnalysisError::Substrate(_) => ErrorCode::SubstrateFailure,
        }
    }
}

/// Errors a substrate returns from a speculative evaluation.
#[derive(Debug, Clone, Error)]
pub enum SubstrateError {
    /// A listener answered `Abort`; evaluation stopped where it was.
    #[error("evaluation aborted by the diagnostics sink")]
    Aborted,

    /// The substrate cannot evaluate the code.
    #[error("{message}")]
    Unsupported {
        message: String,
        location: Option<SourceLocation>,
    },
}

impl SubstrateError {
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            SubstrateError::Aborted => None,
            SubstrateError::Unsupported { location, .. } => location.as_ref(),
        }
    }
}

/// An aborted run: the error that stopped it plus everything reported.
///
/// The write-effects table of an aborted run is dropped, never returned.
#[derive(Debug, Clone)]
pub struct AnalysisFailure {
    pub error: AnalysisError,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisFailure {
    /// Diagnostics with the given code.
    pub fn with_code(&self, code: ErrorCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }
}

impl std::fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n  {diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AnalysisFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
