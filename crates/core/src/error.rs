//! Error types for the ivmc compiler.

use alloc::string::String;
use thiserror::Error;

/// Result type alias for ivmc operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Fatal errors raised while transforming or running a program.
///
/// No variant is recoverable: a transformation that returns an error
/// produces no output program.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The input program violates an assumption of the engine.
    #[error("Program error: {message}")]
    Program { message: String },
    /// An internal consistency check failed.
    #[error("Transformation error: {message}")]
    Transformation { message: String },
    /// Raised by the interpreter when a generated program misbehaves.
    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

impl Error {
    /// Creates a program error.
    pub fn program(message: impl Into<String>) -> Self {
        Error::Program {
            message: message.into(),
        }
    }

    /// Creates a transformation error.
    pub fn transformation(message: impl Into<String>) -> Self {
        Error::Transformation {
            message: message.into(),
        }
    }

    /// Creates a runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime {
            message: message.into(),
        }
    }

    /// Returns true for [`Error::Program`].
    pub fn is_program(&self) -> bool {
        matches!(self, Error::Program { .. })
    }

    /// Returns true for [`Error::Transformation`].
    pub fn is_transformation(&self) -> bool {
        matches!(self, Error::Transformation { .. })
    }

    /// Returns the error message without its kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Program { message }
            | Error::Transformation { message }
            | Error::Runtime { message } => message,
        }
    }
}
