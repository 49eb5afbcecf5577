//! Core codec functionality
//!
//! This module contains the parsing, editing, and serialization engine for the
//! two dispatcher configuration dialects. It provides:
//!
//! - [`ports`]: Codec for single-line port-binding declarations
//! - [`rules`]: Codec for nested `If`/`ElseIf`/`Else`/`End` rewrite-rule blocks
//! - [`integrity`]: Port-reference scan over raw rule text
//! - [`error`]: Error and warning types for codec operations
//!
//! Everything here is synchronous and pure: no I/O, no shared mutable state.
//! Both codecs guarantee round-trip fidelity, meaning an unedited document
//! reappears byte-identical after a parse/serialize cycle.

pub mod error;
pub mod integrity;
pub mod ports;
pub mod rules;

#[cfg(test)]
pub mod test_helpers;


/// Splits document text into lines without losing information.
///
/// Unlike [`str::lines`], a trailing newline is retained as a final empty
/// segment, so joining the result with `\n` reconstructs the input exactly.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Returns `true` if the line is a `#` comment, ignoring leading whitespace.
pub(crate) fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Strips the leading `#` markers and surrounding whitespace from a comment line.
pub(crate) fn strip_comment(line: &str) -> String {
    line.trim_start()
        .trim_start_matches('#')
        .trim()
        .to_string()
}
