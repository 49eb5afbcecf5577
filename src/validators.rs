//! Input validation and sanitization for dispedit
//!
//! Centralizes the advisory name checks for the rule dialect and the
//! sanitization applied to every string the serializers embed into output
//! lines. Name checks are deliberately non-blocking: unknown directives and
//! variables may be legitimate, so they are flagged, never rejected. The only
//! validator output meant to gate a save is a [`Severity::Error`] finding
//! from [`validate_document`].

use crate::core::rules::{is_end_line, is_if_line};
use crate::core::split_lines;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::IntoEnumIterator;

/// Directives the rule dialect defines. Matching is case-insensitive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Directive {
    Forward,
    Redirect,
    Rewrite,
    Deny,
    SetHeader,
    RemoveHeader,
}

/// Condition variables the rule dialect defines. Matching is exact; request
/// headers are additionally reachable through the open `HTTP_*` namespace.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum ConditionVariable {
    #[strum(serialize = "SERVER_PORT")]
    ServerPort,
    #[strum(serialize = "SERVER_PROTOCOL")]
    ServerProtocol,
    #[strum(serialize = "PATH")]
    Path,
    #[strum(serialize = "HOST")]
    Host,
    #[strum(serialize = "REMOTE_ADDR")]
    RemoteAddr,
    #[strum(serialize = "QUERY_STRING")]
    QueryString,
}

/// Protocols conventionally bound by port declarations. The set is open;
/// unknown values only draw an advisory note.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive, serialize_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
    Smtp,
    Router,
}

/// Severity of a document validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Advisory only; must not block a save.
    Warning,
    /// Structural problem; the commit path is expected to block on it.
    Error,
}

/// One finding from whole-document validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// 1-based line number, when the finding points at a specific line.
    pub line: Option<usize>,
    pub severity: Severity,
    pub message: String,
}

/// Sanitizes a string for safe embedding into a single output line.
///
/// Strips newline, carriage return, and NUL characters so injected content
/// cannot fabricate additional declaration lines or rule statements.
pub fn sanitize_value(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\0'))
        .collect()
}

/// Checks a directive name against the known set, case-insensitively.
///
/// Returns an advisory message for unknown names. This never blocks saving;
/// dispatcher installations may carry directives this editor does not know.
pub fn check_directive(name: &str) -> Option<String> {
    if Directive::from_str(name).is_ok() {
        return None;
    }
    Some(format!(
        "Unknown directive '{}' - known directives: {}",
        name,
        known_list(Directive::iter())
    ))
}

/// Checks a condition variable name: exact match against the known set, or
/// anything in the `HTTP_*` request-header namespace.
pub fn check_condition_variable(name: &str) -> Option<String> {
    if name.starts_with("HTTP_") {
        return None;
    }
    if ConditionVariable::from_str(name).is_ok() {
        return None;
    }
    Some(format!(
        "Unknown condition variable '{}' - known variables: {} (or HTTP_*)",
        name,
        known_list(ConditionVariable::iter())
    ))
}

/// Checks a protocol value against the conventional set, case-insensitively.
pub fn check_protocol(name: &str) -> Option<String> {
    if Protocol::from_str(name).is_ok() {
        return None;
    }
    Some(format!(
        "Unconventional protocol '{}' - typical values: {}",
        name,
        known_list(Protocol::iter())
    ))
}

fn known_list<I, T>(iter: I) -> String
where
    I: Iterator<Item = T>,
    T: std::fmt::Display,
{
    iter.map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

/// Validates `If`/`End` balance across a whole rule document.
///
/// Every non-blank, non-comment line is scanned: `If` increments a depth
/// counter, `End` decrements it. A decrement below zero is reported
/// immediately and the depth resets to zero so later lines are still checked.
/// Any depth remaining at end of document is reported once, with the count of
/// unclosed blocks. These are the only findings a commit path should block on.
pub fn validate_document(text: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut depth = 0usize;

    for (i, line) in split_lines(text).iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if is_if_line(line) {
            depth += 1;
        } else if is_end_line(line) {
            if depth == 0 {
                findings.push(Finding {
                    line: Some(i + 1),
                    severity: Severity::Error,
                    message: "'End' without matching 'If'".to_string(),
                });
            } else {
                depth -= 1;
            }
        }
    }

    if depth > 0 {
        let plural = if depth == 1 { "" } else { "s" };
        findings.push(Finding {
            line: None,
            severity: Severity::Error,
            message: format!("{depth} unclosed If block{plural} at end of document"),
        });
    }

    findings
}
