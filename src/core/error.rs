use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error types for dispedit.
///
/// Malformed *document text* never produces an `Error`: the codecs degrade to
/// verbatim preservation instead, so nothing a user wrote is lost. Errors are
/// reserved for the JSON boundary and for API misuse.
#[derive(Debug, Error)]
pub enum Error {
    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Internal logic error
    #[error("Internal error: {0}")]
    #[allow(dead_code)] // Constructed in tests to verify display
    Internal(String),
}

/// Non-fatal findings collected during a parse call.
///
/// Warnings never block anything; they describe content the codec chose to
/// preserve verbatim rather than interpret, or content it interpreted but
/// does not recognize. Line numbers are 1-based for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ParseWarning {
    /// A declaration line contained a parameter without `=` and was kept raw.
    #[error("line {line}: parameter without '=', declaration kept verbatim")]
    RawDeclaration { line: usize },

    /// A declaration carried a parameter key the format does not define.
    #[error("port entry {index}: unknown parameter key {key}")]
    UnknownKey { index: usize, key: String },

    /// A recognized numeric parameter carried a value that does not parse.
    #[error("port entry {index}: unparsable value for {key}, kept as extra parameter")]
    UnparsableValue { index: usize, key: String },

    /// An `If` block ran to end of input without its closing `End`.
    #[error("If block starting at line {line} has no matching End, kept verbatim")]
    UnbalancedIf { line: usize },

    /// A balanced block could not be mapped into the structured model.
    #[error("block starting at line {line} kept verbatim: {reason}")]
    ComplexBlock { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
