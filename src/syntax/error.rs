//! Syntax errors reported by the parser.

use thiserror::Error;

/// The category of a syntax error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An inconsistency in the parser itself, only reachable through a
    /// stray `)` that empties the parse stack.
    #[error("regexp/syntax: internal error")]
    InternalError,
    #[error("invalid character class")]
    InvalidCharClass,
    #[error("invalid character class range")]
    InvalidCharRange,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid named capture")]
    InvalidNamedCapture,
    #[error("invalid or unsupported Perl syntax")]
    InvalidPerlOp,
    #[error("invalid nested repetition operator")]
    InvalidRepeatOp,
    #[error("invalid repeat count")]
    InvalidRepeatSize,
    #[error("missing closing ]")]
    MissingBracket,
    #[error("missing closing )")]
    MissingParen,
    #[error("missing argument to repetition operator")]
    MissingRepeatArgument,
    #[error("trailing backslash at end of expression")]
    TrailingBackslash,
}

/// A syntax error: what went wrong, and the offending part of the pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("error parsing regexp: {kind}: `{expr}`")]
pub struct Error {
    pub kind: ErrorKind,
    pub expr: String,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, expr: impl Into<String>) -> Self {
        Self {
            kind,
            expr: expr.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }
}
