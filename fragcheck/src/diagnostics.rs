//! Diagnostic reporting infrastructure.
//!
//! Every problem the analysis finds, fatal or not, becomes a [`Diagnostic`]
//! with an [`ErrorCode`], a [`Severity`] and (usually) a source location.
//!
//! # Error Codes
//!
//! - **E0100-E0199**: Candidate errors (bad targets, parameters, duplicates)
//! - **E0200-E0299**: Evaluation errors (side effects, abrupt completions,
//!   traversal failures)
//! - **E0300-E0399**: Interference errors (write conflicts)

use std::fmt;

use ariadne::{Color, Config, Label, Report, ReportKind};
use serde::{Deserialize, Serialize};

use crate::span::SourceLocation;

/// Analysis error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    // ============================================================
    // Candidate errors (E0100-E0199)
    // ============================================================
    /// Registered value is neither callable nor a composite root.
    InvalidCandidateTarget = 101,
    /// A formal parameter is not a simple name.
    UnsupportedParameterPattern = 102,
    /// A callable was registered as a candidate twice.
    DoubleOptimization = 103,

    // ============================================================
    // Evaluation errors (E0200-E0299)
    // ============================================================
    /// Externally observable mutation during pure evaluation.
    SpeculativeSideEffect = 201,
    /// A candidate always completes abruptly.
    AbruptCompletion = 202,
    /// Nested discovery went deeper than allowed.
    DiscoveryDepthExceeded = 203,
    /// The traversal stack did not unwind.
    TraversalNotUnwound = 204,
    /// The substrate failed to evaluate a candidate.
    SubstrateFailure = 205,

    // ============================================================
    // Interference errors (E0300-E0399)
    // ============================================================
    /// A read or enumeration observes another candidate's write.
    WriteConflict = 301,
}

impl ErrorCode {
    /// Get the formatted error code string (e.g., "E0301").
    pub fn as_str(&self) -> String {
        format!("E{:04}", *self as u16)
    }

    /// Get a help message suggesting how to fix the error.
    pub fn help(&self) -> Option<&'static str> {
        match self {
            ErrorCode::InvalidCandidateTarget => {
                Some("only functions and component roots can be optimized")
            }
            ErrorCode::UnsupportedParameterPattern => {
                Some("replace destructuring or rest parameters with plain names")
            }
            ErrorCode::DoubleOptimization => Some("register each function for optimization once"),
            ErrorCode::AbruptCompletion => {
                Some("make sure the function can return normally on some path")
            }
            ErrorCode::DiscoveryDepthExceeded => {
                Some("raise `max_nesting_depth` or flatten the nested optimized functions")
            }
            ErrorCode::WriteConflict => {
                Some("optimized functions must not read state other optimized functions write")
            }
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Analysis continues unless escalated.
    Warning,
    /// Analysis aborts unless the sink signals recovery.
    RecoverableError,
    /// Analysis always aborts.
    FatalError,
}

impl Severity {
    pub fn is_error(self) -> bool {
        !matches!(self, Severity::Warning)
    }

    fn to_report_kind(self) -> ReportKind<'static> {
        match self {
            Severity::Warning => ReportKind::Warning,
            Severity::RecoverableError | Severity::FatalError => ReportKind::Error,
        }
    }

    fn color(self) -> Color {
        match self {
            Severity::Warning => Color::Yellow,
            Severity::RecoverableError => Color::Magenta,
            Severity::FatalError => Color::Red,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::RecoverableError => write!(f, "error"),
            Severity::FatalError => write!(f, "fatal error"),
        }
    }
}

/// An analysis diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    /// The main message.
    pub message: String,
    /// The primary location, when one is known.
    pub location: Option<SourceLocation>,
    /// Additional labels pointing to relevant code.
    pub labels: Vec<DiagnosticLabel>,
    /// Suggestions for fixing the problem.
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a diagnostic with the code's help text attached.
    pub fn new(
        severity: Severity,
        code: ErrorCode,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        let mut suggestions = Vec::new();
        if let Some(help) = code.help() {
            suggestions.push(help.to_string());
        }
        Self {
            severity,
            code,
            message: message.into(),
            location,
            labels: Vec::new(),
            suggestions,
        }
    }

    /// Create a fatal error diagnostic.
    pub fn fatal(code: ErrorCode, message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::new(Severity::FatalError, code, message, location)
    }

    /// Create a recoverable error diagnostic.
    pub fn recoverable(
        code: ErrorCode,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::new(Severity::RecoverableError, code, message, location)
    }

    /// Create a warning diagnostic.
    pub fn warning(code: ErrorCode, message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::new(Severity::Warning, code, message, location)
    }

    /// Add a note pointing at related code.
    pub fn with_note(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.labels.push(DiagnosticLabel::secondary(location, message));
        self
    }

    /// Add a label.
    pub fn with_label(mut self, label: DiagnosticLabel) -> Self {
        self.labels.push(label);
        self
    }

    /// Add a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Whether two diagnostics describe the same problem at the same place.
    pub fn same_report(&self, other: &Diagnostic) -> bool {
        self.code == other.code && self.location == other.location && self.message == other.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

/// A secondary label in a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticLabel {
    pub location: SourceLocation,
    pub message: String,
    /// Whether this is the primary label.
    pub primary: bool,
}

impl DiagnosticLabel {
    pub fn primary(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
            primary: true,
        }
    }

    pub fn secondary(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
            primary: false,
        }
    }
}

/// Renders diagnostics against the source files they point into.
#[derive(Debug, Default)]
pub struct DiagnosticEmitter {
    files: Vec<(String, String)>,
    color: bool,
}

impl DiagnosticEmitter {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            color: true,
        }
    }

    /// Register the text of a source file.
    pub fn add_source(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.files.push((name.into(), text.into()));
    }

    /// Enable or disable ANSI colors.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Emit a diagnostic to stderr.
    pub fn emit(&self, diagnostic: &Diagnostic) {
        eprint!("{}", self.render(diagnostic));
    }

    /// Render a diagnostic into a string.
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let file = diagnostic
            .location
            .as_ref()
            .and_then(|loc| self.source_text(&loc.file).map(|text| (loc, text)));
        let Some((location, text)) = file else {
            return format!("{diagnostic}\n");
        };

        let message = format!("[{}] {}", diagnostic.code, diagnostic.message);
        let span = clamp(location.span.start..location.span.end, text.len());
        let mut builder = Report::build(
            diagnostic.severity.to_report_kind(),
            location.file.clone(),
            span.start,
        )
        .with_config(Config::default().with_color(self.color))
        .with_message(&message)
        .with_label(
            Label::new((location.file.clone(), span))
                .with_color(diagnostic.severity.color())
                .with_message(&diagnostic.message),
        );

        for label in &diagnostic.labels {
            let Some(label_text) = self.source_text(&label.location.file) else {
                continue;
            };
            let color = if label.primary {
                diagnostic.severity.color()
            } else {
                Color::Blue
            };
            let range = clamp(label.location.span.start..label.location.span.end, label_text.len());
            builder = builder.with_label(
                Label::new((label.location.file.clone(), range))
                    .with_color(color)
                    .with_message(&label.message),
            );
        }

        if !diagnostic.suggestions.is_empty() {
            builder = builder.with_help(diagnostic.suggestions.join("\n"));
        }

        let mut out = Vec::new();
        let cache = ariadne::sources(
            self.files
                .iter()
                .map(|(name, text)| (name.clone(), text.clone())),
        );
        match builder.finish().write(cache, &mut out) {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => format!("{diagnostic}\n"),
        }
    }

    fn source_text(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(file, _)| file == name)
            .map(|(_, text)| text.as_str())
    }
}

fn clamp(range: std::ops::Range<usize>, len: usize) -> std::ops::Range<usize> {
    let start = range.start.min(len);
    start..range.end.clamp(start, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn location(source: &str, needle: &str) -> SourceLocation {
        let start = source.find(needle).unwrap();
        SourceLocation::new("app.js", Span::from_range(start..start + needle.len(), source))
    }

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::InvalidCandidateTarget.as_str(), "E0101");
        assert_eq!(ErrorCode::WriteConflict.as_str(), "E0301");
        assert_eq!(ErrorCode::SpeculativeSideEffect.to_string(), "E0201");
    }

    #[test]
    fn test_help_attached_from_code() {
        let diag = Diagnostic::fatal(ErrorCode::UnsupportedParameterPattern, "bad", None);
        assert_eq!(diag.suggestions.len(), 1);
        let diag = Diagnostic::warning(ErrorCode::SpeculativeSideEffect, "side effect", None);
        assert!(diag.suggestions.is_empty());
    }

    #[test]
    fn test_same_report_ignores_labels() {
        let loc = SourceLocation::new("a.js", Span::new(1, 2, 1, 2));
        let a = Diagnostic::fatal(ErrorCode::WriteConflict, "conflict", Some(loc.clone()));
        let b = a.clone().with_note(loc.clone(), "written here");
        assert!(a.same_report(&b));
        let c = Diagnostic::fatal(ErrorCode::WriteConflict, "other", Some(loc));
        assert!(!a.same_report(&c));
    }

    #[test]
    fn test_render_without_source_is_plain() {
        let emitter = DiagnosticEmitter::new().with_color(false);
        let diag = Diagnostic::fatal(ErrorCode::AbruptCompletion, "always throws", None);
        assert_eq!(emitter.render(&diag), "fatal error[E0202]: always throws\n");
    }

    #[test]
    fn test_render_with_source() {
        let source = "function g() {\n  return obj.x;\n}\n";
        let mut emitter = DiagnosticEmitter::new().with_color(false);
        emitter.add_source("app.js", source);
        let diag = Diagnostic::fatal(
            ErrorCode::WriteConflict,
            "Property access conflicts with write in optimized function f",
            Some(location(source, "obj.x")),
        );
        let rendered = emitter.render(&diag);
        assert!(rendered.contains("E0301"));
        assert!(rendered.contains("app.js"));
        assert!(rendered.contains("return obj.x;"));
    }

    #[test]
    fn test_diagnostic_serializes() {
        let source = "obj.x";
        let diag = Diagnostic::warning(
            ErrorCode::SpeculativeSideEffect,
            "modification to property x",
            Some(location(source, "obj.x")),
        );
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["severity"], "Warning");
        assert_eq!(json["code"], "SpeculativeSideEffect");
        assert_eq!(json["location"]["file"], "app.js");
    }
}
