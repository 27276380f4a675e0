//! Error taxonomy shared by compilation and evaluation.
//!
//! Every failure the engine can produce is an [`Error`]. Errors raised by the
//! engine itself travel unchanged through executors, the function boundary and
//! the runtime wrapper; foreign failures (extension functions, panics) are
//! wrapped exactly once where they are caught.

use thiserror::Error;

use crate::value::Kind;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed foreign error, as returned by extension functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by compiling or evaluating an expression.
#[derive(Debug, Error)]
pub enum Error {
    /// The source exceeded the configured maximum length.
    #[error("expression exceeds the maximum length of {limit} bytes")]
    TooLong { limit: usize },

    /// The source stream could not be read or was not valid UTF-8.
    #[error("cannot read expression: {0}")]
    Io(#[from] std::io::Error),

    /// Lexer or parser rejection.
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Malformed numeric literal.
    #[error("invalid number at position {position}: {message}")]
    NumberFormat { position: usize, message: String },

    /// A value could not be coerced to the requested type.
    #[error("cannot convert {from} '{value}' to {to}")]
    Conversion { from: Kind, to: Kind, value: String },

    /// A variable was read that no symbols strategy defines.
    #[error("unknown symbol '{name}'")]
    UnknownSymbol { name: String },

    /// A substring bound evaluated to a number with a fractional part.
    #[error("unexpected fractional part in {value} at position {position}")]
    Fractional { position: usize, value: String },

    /// A substring bound evaluated to an integer outside the usable range.
    #[error("{value} is out of range at position {position}")]
    OutOfRange { position: usize, value: String },

    /// Function binding or invocation failure.
    #[error(transparent)]
    Function(#[from] FunctionError),

    /// Division or modulus by zero, invalid power, inexact rounding.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// A timed evaluation did not finish in time.
    #[error("evaluation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// A timed evaluation was cancelled before it produced a result.
    #[error("evaluation was interrupted")]
    Interrupted,

    /// Catch-all for unexpected failures during evaluation.
    #[error("evaluation failed: {message}")]
    Execution {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Failures tied to a named function.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("unknown function '{name}'")]
    Unknown { name: String },

    #[error("function '{name}' accepts at most {max} arguments, got {given}")]
    TooManyArguments { name: String, max: usize, given: usize },

    #[error("function '{name}' is missing required argument {index} ('{param}')")]
    MissingArgument { name: String, index: usize, param: String },

    #[error("function '{name}': bad argument {index}: {source}")]
    BadArgument {
        name: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("function '{name}': bad return value: {source}")]
    BadReturn {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("function '{name}' failed: {source}")]
    Invocation {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Raised deliberately by the `fail()` function.
    #[error("{message}")]
    Failed { message: String },
}

impl Error {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn conversion(from: Kind, to: Kind, value: impl Into<String>) -> Self {
        Error::Conversion {
            from,
            to,
            value: value.into(),
        }
    }

    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        Error::Arithmetic(message.into())
    }

    /// Wrap a panic payload caught by the runtime wrapper.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic during evaluation".to_owned()
        };
        Error::Execution {
            message,
            source: None,
        }
    }

    /// Source position carried by the error, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            Error::Syntax { position, .. }
            | Error::NumberFormat { position, .. }
            | Error::Fractional { position, .. }
            | Error::OutOfRange { position, .. } => Some(*position),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_message_carries_position() {
        let e = Error::syntax(7, "unexpected ')'");
        assert_eq!(e.to_string(), "syntax error at position 7: unexpected ')'");
        assert_eq!(e.position(), Some(7));
    }

    #[test]
    fn function_errors_are_transparent() {
        let e: Error = FunctionError::Unknown { name: "nope".into() }.into();
        assert_eq!(e.to_string(), "unknown function 'nope'");
        assert_eq!(e.position(), None);
    }

    #[test]
    fn panic_payloads_become_execution_errors() {
        let e = Error::from_panic(Box::new("boom"));
        assert!(matches!(e, Error::Execution { ref message, .. } if message == "boom"));
    }
}
