//! Error kinds and the first-class `ERROR` value (`spec.md` §3.6, §7).
//!
//! Errors are ordinary values: a verb that receives one returns it
//! unchanged (except `try`). Internally, fallible operations return
//! `Result<T, RfError>`; the VM converts an `RfError` into an `ERROR`
//! value at the point a builtin call fails, attaching the current span.

use std::fmt;

/// Numeric error codes, matching
/// `examples/original_source/core/rayforce.h` (`ERR_*` / `OK` constants).
/// `spec.md` §7 names the same kinds informally; we additionally keep
/// `NotExist` and `Sys` distinct from `NotFound`/`Io` since the original
/// does and nothing in `spec.md` folds them together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum ErrorKind {
    Init = 1,
    Parse = 2,
    Eval = 3,
    Format = 4,
    Type = 5,
    Length = 6,
    Arity = 7,
    Index = 8,
    Heap = 9,
    Io = 10,
    Sys = 11,
    NotFound = 12,
    NotExist = 13,
    NotImplemented = 14,
    NotSupported = 15,
    StackOverflow = 16,
    Raise = 17,
    Unknown = 127,
}

impl ErrorKind {
    pub const fn code(self) -> i8 {
        self as i8
    }

    pub const fn name(self) -> &'static str {
        use ErrorKind::*;
        match self {
            Init => "INIT",
            Parse => "PARSE",
            Eval => "EVAL",
            Format => "FORMAT",
            Type => "TYPE",
            Length => "LENGTH",
            Arity => "ARITY",
            Index => "INDEX",
            Heap => "HEAP",
            Io => "IO",
            Sys => "SYS",
            NotFound => "NOT_FOUND",
            NotExist => "NOT_EXIST",
            NotImplemented => "NOT_IMPLEMENTED",
            NotSupported => "NOT_SUPPORTED",
            StackOverflow => "STACK_OVERFLOW",
            Raise => "RAISE",
            Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A source span, carried through compilation for runtime error location
/// (`spec.md` §4.5 "Spans").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_line: u32,
    pub end_line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl Span {
    pub const fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Span {
            start_line,
            end_line,
            start_col,
            end_col,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(
                f,
                "{}:{}-{}",
                self.start_line + 1,
                self.start_col + 1,
                self.end_col + 1
            )
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line + 1,
                self.start_col + 1,
                self.end_line + 1,
                self.end_col + 1
            )
        }
    }
}

/// An engine error: code, message, and an optional source span.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("[E{}] {kind}: {message}", .kind.code())]
pub struct RfError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
}

impl RfError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RfError {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn type_mismatch(verb: &str, t1: &str, t2: &str) -> Self {
        RfError::new(
            ErrorKind::Type,
            format!("{verb}: unsupported types: '{t1}, '{t2}'"),
        )
    }

    pub fn length_mismatch(verb: &str, l1: usize, l2: usize) -> Self {
        RfError::new(
            ErrorKind::Length,
            format!("{verb}: length mismatch: {l1} vs {l2}"),
        )
    }

    pub fn arity(verb: &str, expected: &str, got: usize) -> Self {
        RfError::new(
            ErrorKind::Arity,
            format!("{verb}: expected {expected} argument(s), got {got}"),
        )
    }

    /// Printed form per `spec.md` §7: `** [E<code>] error: <message>` plus
    /// the span on a following line when available.
    pub fn render(&self) -> String {
        let mut out = format!("** [E{}] error: {}", self.kind.code(), self.message);
        if let Some(span) = &self.span {
            out.push('\n');
            out.push_str(&span.to_string());
        }
        out
    }
}

pub type RfResult<T> = Result<T, RfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_matches_spec_format() {
        let err = RfError::new(ErrorKind::Type, "boom").with_span(Span::new(0, 0, 0, 3));
        let rendered = err.render();
        assert!(rendered.starts_with("** [E5] error: boom"));
        assert!(rendered.contains("1:1-1:4"));
    }

    #[test]
    fn type_mismatch_message_shape() {
        let err = RfError::type_mismatch("+", "symbol", "f64");
        assert_eq!(err.message, "+: unsupported types: 'symbol, 'f64'");
    }
}
