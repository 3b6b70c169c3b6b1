//! # fragcheck
//!
//! Independence verification for program fragments that an ahead-of-time
//! optimizer wants to re-emit separately and out of order.
//!
//! Each fragment ("candidate") is evaluated speculatively against an
//! abstract heap. What it creates and writes is recorded once. Candidates
//! revealed by another candidate's evaluation are discovered and captured
//! under that candidate's committed effects. Finally every candidate is
//! replayed and each property read or enumeration is checked against the
//! write-sets of all the others.
//!
//! ## Pipeline
//!
//! ```text
//! roots -> DiscoveryQueue -> EffectsRecorder -> WriteEffectsTable -> ConflictDetector
//!               ^                  |
//!               +---- nested ------+
//! ```
//!
//! The heap itself belongs to a [`Substrate`], an abstract interpreter this
//! crate only queries. [`model::HeapModel`] is a small in-memory substrate
//! for tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use fragcheck::model::{line, HeapModel, Op, Target};
//! use fragcheck::{CandidateRequest, IndependenceChecker, Value};
//!
//! let mut model = HeapModel::new("app.js");
//! let obj = model.object();
//! let x = model.key("x");
//! let f = model.define("f", vec![Op::Write {
//!     target: Target::Object(obj),
//!     key: x,
//!     value: Value::number(1.0),
//!     at: line(1),
//! }]);
//! let g = model.define("g", vec![Op::Read { target: Target::Object(obj), key: x, at: line(4) }]);
//!
//! let mut checker = IndependenceChecker::new(model);
//! let failure = checker
//!     .run([CandidateRequest::function(f), CandidateRequest::function(g)])
//!     .unwrap_err();
//! for diagnostic in &failure.diagnostics {
//!     eprintln!("{diagnostic}");
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`args`] - Placeholder arguments for candidates
//! - [`capture`] - Speculative effects capture
//! - [`discovery`] - Candidate traversal and nested discovery
//! - [`conflict`] - Read/write interference checking
//! - [`sink`] - Diagnostic collection and escalation
//! - [`driver`] - The two-phase run
//! - [`table`] - The write-effects table
//! - [`names`] - Candidate names
//! - [`substrate`] - The abstract interpreter interface
//! - [`heap`] - Heap identities, values and effects
//! - [`diagnostics`] - Diagnostics and rendering
//! - [`error`] - Fatal errors
//! - [`config`] - Configuration and logging setup
//! - [`span`] - Source location tracking
//! - [`model`] - In-memory reference substrate

pub mod args;
pub mod capture;
pub mod config;
pub mod conflict;
pub mod diagnostics;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod heap;
pub mod model;
pub mod names;
pub mod sink;
pub mod span;
pub mod substrate;
pub mod table;

// Re-export commonly used types
pub use capture::{Candidate, EffectsRecord, EffectsRecorder};
pub use config::{AnalysisConfig, LogLevel};
pub use conflict::{ConflictDetector, ConflictDiagnostic};
pub use diagnostics::{Diagnostic, DiagnosticEmitter, ErrorCode, Severity};
pub use discovery::{DiscoveryQueue, TraversalContext};
pub use driver::{IndependenceChecker, VerifiedCandidates};
pub use error::{AnalysisError, AnalysisFailure, AnalysisResult, SubstrateError};
pub use heap::{CallableId, Completion, Effects, ObjectId, PropertyBinding, PropertyKey, Value};
pub use names::NameResolver;
pub use sink::{DiagnosticsSink, ErrorHandler};
pub use span::{SourceLocation, Span};
pub use substrate::{CandidateRequest, EvaluationListener, SinkDecision, Substrate};
pub use table::WriteEffectsTable;
