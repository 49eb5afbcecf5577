//! Port-reference integrity scan
//!
//! Answers "which rules mention this port?" before a port declaration is
//! deleted or renumbered. The scan works on raw rule text, line by line, with
//! no block-structure awareness: it only relies on the textual convention
//! that a port-scoped rule contains `%{SERVER_PORT} = <port>`. It never
//! fails and returns an empty report for empty input.

use crate::core::{is_comment_line, split_lines, strip_comment};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How far back to look for a comment to label a match with.
const COMMENT_LOOKBACK: usize = 5;

/// Longest snippet of the matching line used in a fallback label.
const SNIPPET_CHARS: usize = 80;

/// Result of a port-reference scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceReport {
    pub match_count: usize,
    /// One human-readable label per match: the nearest comment above the
    /// match, or a line-number snippet when no comment is close enough.
    pub labels: Vec<String>,
}

/// Scans rule text for references to the given port.
///
/// A reference is `%{SERVER_PORT} = <port>` followed by a word boundary,
/// comma, or closing parenthesis, matched case-insensitively, so port 80
/// does not fire on port 8080.
pub fn check_port_references(text: &str, port: u16) -> ReferenceReport {
    let pattern = format!(r"(?i)%\{{SERVER_PORT\}}\s*=\s*{port}(?:\b|,|\))");
    let Ok(re) = Regex::new(&pattern) else {
        return ReferenceReport::default();
    };

    let lines = split_lines(text);
    let mut report = ReferenceReport::default();
    for (i, line) in lines.iter().enumerate() {
        for _ in re.find_iter(line) {
            report.match_count += 1;
            report.labels.push(label_for(&lines, i));
        }
    }
    report
}

/// Builds the label for a match on line `index`: the nearest comment within
/// the lookback window, else a `line <n>` snippet. Pure function over the
/// immutable line array.
fn label_for(lines: &[&str], index: usize) -> String {
    if let Some(comment) = nearest_comment(lines, index) {
        return comment;
    }
    let snippet: String = lines[index].chars().take(SNIPPET_CHARS).collect();
    format!("line {}: {}", index + 1, snippet)
}

fn nearest_comment(lines: &[&str], index: usize) -> Option<String> {
    for back in 1..=COMMENT_LOOKBACK {
        let i = index.checked_sub(back)?;
        if is_comment_line(lines[i]) {
            return Some(strip_comment(lines[i]));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_reference() {
        let report = check_port_references("If %{SERVER_PORT} = 80\n  Forward x\nEnd", 80);
        assert_eq!(report.match_count, 1);
        assert_eq!(report.labels.len(), 1);
    }

    #[test]
    fn test_no_reference_for_other_port() {
        let report = check_port_references("If %{SERVER_PORT} = 80\n  Forward x\nEnd", 8080);
        assert_eq!(report.match_count, 0);
        assert!(report.labels.is_empty());
    }

    #[test]
    fn test_port_80_does_not_fire_on_8080() {
        let report = check_port_references("If %{SERVER_PORT} = 8080\n  Forward x\nEnd", 80);
        assert_eq!(report.match_count, 0);
    }

    #[test]
    fn test_case_insensitive_match() {
        let report = check_port_references("if %{server_port} = 443 && %{PATH} = ^/x", 443);
        assert_eq!(report.match_count, 1);
    }

    #[test]
    fn test_boundary_comma_and_paren() {
        let report = check_port_references("If (%{SERVER_PORT} = 80)\nIf %{SERVER_PORT} = 80,", 80);
        assert_eq!(report.match_count, 2);
    }

    #[test]
    fn test_comment_label_within_window() {
        let text = "# Public API rule\n\nIf %{SERVER_PORT} = 80\n  Forward x\nEnd";
        let report = check_port_references(text, 80);
        assert_eq!(report.labels, vec!["Public API rule".to_string()]);
    }

    #[test]
    fn test_snippet_label_outside_window() {
        let text = "# too far away\n\n\n\n\n\n\nIf %{SERVER_PORT} = 80\nEnd";
        let report = check_port_references(text, 80);
        assert_eq!(report.match_count, 1);
        assert!(report.labels[0].starts_with("line 8: "));
        assert!(report.labels[0].contains("%{SERVER_PORT} = 80"));
    }

    #[test]
    fn test_snippet_truncated_to_80_chars() {
        let long_tail = "x".repeat(200);
        let text = format!("If %{{SERVER_PORT}} = 80 && %{{PATH}} = ^/{long_tail}");
        let report = check_port_references(&text, 80);
        let label = &report.labels[0];
        let snippet = label.strip_prefix("line 1: ").unwrap();
        assert_eq!(snippet.chars().count(), 80);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(check_port_references("", 80), ReferenceReport::default());
    }

    #[test]
    fn test_multiple_references_each_labeled() {
        let text = "# ssh\nIf %{SERVER_PORT} = 22\nEnd\n# also ssh\nIf %{SERVER_PORT} = 22\nEnd";
        let report = check_port_references(text, 22);
        assert_eq!(report.match_count, 2);
        assert_eq!(report.labels.len(), 2);
        assert_eq!(report.labels[0], "ssh");
        assert_eq!(report.labels[1], "also ssh");
    }
}
