//! tacit - evaluation engine for a point-free array language
//!
//! Programs are written without naming their arguments. Source text is
//! compiled once into chains of composable *links*; a chain is then evaluated
//! against zero, one or two input values, and the arities of its links decide
//! how the inputs flow through it (forks, hooks and trains).
//!
//! ```text
//! D C          ; monadic chain: increment(double(x)), so 5 gives 11
//! +/           ; reduce by addition, so [1, 2, 3, 4] gives 10
//! +2%5µ`A      ; iterate (x + 2) mod 5 until a value repeats
//! ```
//!
//! ## Rank polymorphism
//!
//! Leaf primitives declare the depth at which they operate. The dispatcher
//! maps over nested sequences until operands reach that depth, so `+` adds
//! numbers, vectors and ragged matrices alike. Unequal lengths never fail: the
//! tail of the longer side is passed through unchanged.
//!
//! ## Arity inference
//!
//! Links built without a fixed arity are bound to the arity of the first
//! context that evaluates them, and that binding is permanent for the lifetime
//! of the [`program::Program`].
//!
//! ## Modules
//!
//! - `ast`: values (numbers, characters, nested sequences)
//! - `link`: links, chains and arities
//! - `builtinops`: leaf primitive registry and vocabulary
//! - `lexer`: source text to tokens
//! - `program`: token stream to program, including the combinator builder
//! - `evaluator`: chain evaluation, rank-polymorphic dispatch and combinators
//! - `host`: output sink and input source used during evaluation
//! - `json`: JSON interchange for values

use std::fmt;

/// Maximum parsing depth to prevent stack overflow attacks
/// This limits deeply nested list literals in the lexer
pub const MAX_PARSE_DEPTH: usize = 32;

/// Default maximum number of nested chain references during evaluation.
/// Only self-reference and cross-chain calls count; it can be changed
/// through `EvalConfig`.
pub const MAX_EVAL_DEPTH: usize = 128;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed literals)
    InvalidSyntax,
    /// Input ended before a literal was complete (unterminated string, unclosed bracket)
    Incomplete,
    /// List literal nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// A symbol that is not part of the vocabulary
    UnknownToken,
    /// A combinator found too few links before it
    MissingOperand,
    /// Implementation-imposed limit exceeded (depth, integer overflow, etc.)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given char offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        Self::with_context_and_found(kind, message, input, error_offset, None)
    }

    /// Create a ParseError with context and found token
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let context_start = error_offset.saturating_sub(20);
        let total_chars = input.chars().count();

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < total_chars {
            display_context.push_str("[...]");
        }

        // Programs may span lines; keep the snippet on one
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types for the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    EvalError(String),
    TypeError(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional link description
    },
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: link expected {expected} arguments but got {got}"
                ),
            },
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod host;
pub mod lexer;
pub mod link;
pub mod program;

#[cfg(feature = "json")]
pub mod json;

pub use ast::{Number, Value};
pub use evaluator::{EvalConfig, Evaluator};
pub use host::{Host, RecordingHost};
pub use link::{Arity, Chain, Link};
pub use program::{Program, parse_program};
