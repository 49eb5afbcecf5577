//! dispedit - dispatcher configuration editing engine
//!
//! The parsing/editing/serialization core of a browser-based editor for two
//! text dialects of a network dispatcher: port-binding declarations and
//! URL-rewrite rule blocks.
//!
//! # Architecture
//!
//! - [`core`] - Codecs for both dialects, the port-reference scan, and error types
//! - [`validators`] - Advisory syntax checks and output sanitization
//!
//! # Guarantees
//!
//! - Round-trip fidelity: an unedited document reappears byte-identical
//!   after a parse/serialize cycle
//! - No loss: content the codecs do not understand is preserved verbatim,
//!   never rejected
//! - Purity: every operation is a synchronous function over its arguments,
//!   with no I/O and no shared mutable state
//!
//! The surrounding application owns everything else: authentication, edit
//! locking, version-control commits, and the UI that mutates entities
//! between a parse and the next serialize call.

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]

pub mod core;
pub mod validators;

// Re-export commonly used types
pub use crate::core::error::{Error, ParseWarning, Result};
pub use crate::core::integrity::{ReferenceReport, check_port_references};
pub use crate::core::ports::{LineKind, LineMapEntry, PortBody, PortDocument, PortEntry, PortParams};
pub use crate::core::rules::{ElseIfBranch, RuleAction, RuleBlock, RuleBody, RuleDocument, RuleLogic};
pub use crate::validators::{Finding, Severity, validate_document};
