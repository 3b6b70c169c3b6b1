//! Source span and location tracking.
//!
//! Spans locate the reads, writes and calls a substrate reports, and
//! source locations (a span plus the file it belongs to) key every
//! diagnostic the analysis produces.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A span representing a contiguous region in source code.
///
/// Spans are byte offsets into the source text, along with cached
/// line/column information for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the start (inclusive).
    pub start: usize,
    /// Byte offset of the end (exclusive).
    pub end: usize,
    /// 1-indexed line number of the start.
    pub start_line: u32,
    /// 1-indexed column number of the start.
    pub start_col: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize, start_line: u32, start_col: u32) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
        }
    }

    /// Create a dummy span for synthesized code.
    pub fn dummy() -> Self {
        Self {
            start: 0,
            end: 0,
            start_line: 0,
            start_col: 0,
        }
    }

    /// Create a span from a byte range, computing line info from `source`.
    pub fn from_range(range: std::ops::Range<usize>, source: &str) -> Self {
        let (line, col) = line_col(source, range.start);
        Self {
            start: range.start,
            end: range.end,
            start_line: line,
            start_col: col,
        }
    }

    /// The length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether this span was synthesized rather than read from source.
    pub fn is_dummy(&self) -> bool {
        self.start_line == 0
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Span) -> Span {
        let start = self.start.min(other.start);
        let end = self.end.max(other.end);
        let (start_line, start_col) = if self.start <= other.start {
            (self.start_line, self.start_col)
        } else {
            (other.start_line, other.start_col)
        };
        Span {
            start,
            end,
            start_line,
            start_col,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

/// A span inside a named source file.
///
/// Conflict diagnostics are deduplicated on this type, so two accesses
/// are "the same site" exactly when file and span agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Name of the file, as registered with the diagnostic emitter.
    pub file: String,
    /// Region within the file.
    pub span: Span,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, span: Span) -> Self {
        Self {
            file: file.into(),
            span,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.is_dummy() {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}:{}", self.file, self.span.start_line, self.span.start_col)
        }
    }
}

/// Calculate line and column from byte offset.
/// Returns 1-indexed line and column numbers.
pub fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 1u32;
    let mut current = 0;

    for ch in source.chars() {
        if current >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
        current += ch.len_utf8();
    }

    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let source = "function f() {\n  obj.x = 1;\n}";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 9), (1, 10));
        assert_eq!(line_col(source, 15), (2, 1));
        assert_eq!(line_col(source, 17), (2, 3));
    }

    #[test]
    fn test_span_merge() {
        let s1 = Span::new(0, 5, 1, 1);
        let s2 = Span::new(10, 15, 1, 11);
        let merged = s1.merge(s2);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 15);
    }

    #[test]
    fn test_location_display() {
        let source = "a\nobj.x";
        let loc = SourceLocation::new("app.js", Span::from_range(2..7, source));
        assert_eq!(loc.to_string(), "app.js:2:1");
        assert_eq!(SourceLocation::new("app.js", Span::dummy()).to_string(), "app.js");
    }

    #[test]
    fn test_locations_compare_by_file_and_span() {
        let a = SourceLocation::new("a.js", Span::new(3, 4, 1, 4));
        let b = SourceLocation::new("b.js", Span::new(3, 4, 1, 4));
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
