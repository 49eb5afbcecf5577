//! Rewrite-rule block codec
//!
//! Recovers nested `If`/`ElseIf`/`Else`/`End` conditional structure from flat
//! text and serializes it back. Structured editing is deliberately
//! conservative: a block with nested conditionals, a missing `End`, or a body
//! line the model cannot hold becomes [`RuleBody::Raw`] and is preserved
//! verbatim. Interstitial content (blank lines, standalone comments) travels
//! as document preamble, per-block leading lines, or document trailing lines,
//! so nothing between blocks is lost either.
//!
//! # Round-trip fidelity
//!
//! Each parsed block retains its original source span. The serializer
//! re-parses that span and emits the original bytes whenever they still
//! describe the block's current state; only edited blocks are rewritten in
//! canonical form (2-space action indent, fixed condition layout).

use crate::core::error::ParseWarning;
use crate::core::{is_comment_line, split_lines, strip_comment};
use crate::validators::sanitize_value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::LazyLock;
use tracing::{debug, warn};
use uuid::Uuid;

static IF_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?i:if)\s+(\S.*?)\s*$").expect("if pattern is valid"));
static ELSEIF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?i:elseif)\s+(\S.*?)\s*$").expect("elseif pattern is valid")
});
static ELSE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?i:else)\s*$").expect("else pattern is valid"));
static END_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?i:end)\s*$").expect("end pattern is valid"));
static PORT_PREDICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\{SERVER_PORT\}\s*=\s*(\d+)").expect("port predicate pattern is valid")
});

pub(crate) fn is_if_line(line: &str) -> bool {
    IF_LINE.is_match(line)
}

pub(crate) fn is_end_line(line: &str) -> bool {
    END_LINE.is_match(line)
}

/// One action inside a rule body: a directive name plus a trailing parameter
/// string whose format is directive-specific and opaque to the codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    pub directive: String,
    pub params: String,
}

/// One `ElseIf` branch: its condition and its actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElseIfBranch {
    pub condition: String,
    pub actions: Vec<RuleAction>,
}

/// Structured content of an editable block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLogic {
    /// Port from the `%{SERVER_PORT} = <n>` predicate; `None` means the rule
    /// is global.
    pub port: Option<u16>,
    /// Condition text besides the port predicate. May be empty.
    pub condition: String,
    /// Primary body actions.
    pub actions: Vec<RuleAction>,
    pub else_if: Vec<ElseIfBranch>,
    pub else_actions: Vec<RuleAction>,
}

/// Structured logic or the verbatim fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleBody {
    Logic(RuleLogic),
    /// The block's original lines, preserved exactly. Structured fields do
    /// not exist for such a block.
    Raw(Vec<String>),
}

/// One `If` block of the rule document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBlock {
    /// Stable identity for the editor UI, allocated at creation time.
    pub id: Uuid,
    /// `#` comment from the line directly above the `If`, if any.
    pub comment: Option<String>,
    /// Blank/comment lines that appeared between this block and the previous
    /// one. Emitted before the block, verbatim.
    pub leading_lines: Vec<String>,
    /// 0-based first line of the block span in the original document.
    /// `None` for blocks created in the editor.
    pub start_line: Option<usize>,
    /// 0-based last line of the block span in the original document.
    pub end_line: Option<usize>,
    /// Original source span (comment line included). Empty for new blocks.
    pub source: Vec<String>,
    pub body: RuleBody,
}

impl RuleBlock {
    /// Creates an empty global block with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            comment: None,
            leading_lines: Vec::new(),
            start_line: None,
            end_line: None,
            source: Vec::new(),
            body: RuleBody::Logic(RuleLogic::default()),
        }
    }

    /// Clones the block as new content: fresh identity, no source span, so
    /// the copy serializes canonically wherever the caller inserts it.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            comment: self.comment.clone(),
            leading_lines: Vec::new(),
            start_line: None,
            end_line: None,
            source: Vec::new(),
            body: self.body.clone(),
        }
    }

    /// Returns `true` if the block has no port-scoping predicate.
    pub fn is_global(&self) -> bool {
        match &self.body {
            RuleBody::Logic(logic) => logic.port.is_none(),
            RuleBody::Raw(_) => false,
        }
    }

    /// Returns `true` if the block is preserved verbatim instead of being
    /// structurally editable.
    pub fn is_complex(&self) -> bool {
        matches!(self.body, RuleBody::Raw(_))
    }
}

impl Default for RuleBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of parsing a rule document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub blocks: Vec<RuleBlock>,
    /// Content before the first block.
    pub preamble: Vec<String>,
    /// Content after the last block.
    pub trailing: Vec<String>,
    pub warnings: Vec<ParseWarning>,
}

impl RuleDocument {
    /// Serializes the document with its current block state.
    pub fn render(&self) -> String {
        serialize(&self.blocks, &self.preamble, &self.trailing)
    }

    /// Serializes the document state to JSON for the editor UI.
    pub fn to_json(&self) -> crate::core::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restores document state from JSON produced by [`RuleDocument::to_json`].
    pub fn from_json(json: &str) -> crate::core::error::Result<Self> {
        let doc: Self = serde_json::from_str(json)?;
        for block in &doc.blocks {
            if let RuleBody::Logic(logic) = &block.body
                && logic.port == Some(0)
            {
                return Err(crate::core::error::Error::Validation {
                    field: "port".to_string(),
                    message: format!("block {}: port must be between 1 and 65535", block.id),
                });
            }
        }
        Ok(doc)
    }
}

/// Parses a rule document.
///
/// Never fails: blocks the structured model cannot hold are preserved
/// verbatim with a warning, and everything outside blocks is retained as
/// preamble, leading, or trailing lines.
pub fn parse(text: &str) -> RuleDocument {
    let lines = split_lines(text);
    let mut blocks: Vec<RuleBlock> = Vec::new();
    let mut preamble: Vec<String> = Vec::new();
    let mut warnings: Vec<ParseWarning> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if !is_if_line(line) {
            pending.push(line.to_string());
            i += 1;
            continue;
        }

        // Block found. A comment directly above belongs to it and shifts the
        // effective start back by one.
        let mut comment = None;
        let mut source: Vec<String> = Vec::new();
        let mut start = i;
        if let Some(prev) = pending.last()
            && is_comment_line(prev)
        {
            comment = Some(strip_comment(prev));
            source.push(pending.pop().unwrap_or_default());
            start -= 1;
        }

        let leading = std::mem::take(&mut pending);

        // Depth scan: every nested `If` must find its `End` before the span
        // closes.
        let mut depth = 1usize;
        source.push(line.to_string());
        let mut j = i + 1;
        while j < lines.len() && depth > 0 {
            let body_line = lines[j];
            if is_if_line(body_line) {
                depth += 1;
            } else if is_end_line(body_line) {
                depth -= 1;
            }
            source.push(body_line.to_string());
            j += 1;
        }
        let end = j - 1;

        let body = if depth > 0 {
            // Point at the If line itself, not an attached comment line.
            warn!(line = i + 1, "If block without matching End");
            warnings.push(ParseWarning::UnbalancedIf { line: i + 1 });
            RuleBody::Raw(source.clone())
        } else {
            let first_body = if comment.is_some() { 1 } else { 0 };
            let span = &source[first_body..];
            match interpret_block(span) {
                Ok(logic) => RuleBody::Logic(logic),
                Err(reason) => {
                    warn!(line = start + 1, reason, "block kept verbatim");
                    warnings.push(ParseWarning::ComplexBlock {
                        line: start + 1,
                        reason: reason.to_string(),
                    });
                    RuleBody::Raw(source.clone())
                }
            }
        };

        let mut block = RuleBlock {
            id: Uuid::new_v4(),
            comment,
            leading_lines: Vec::new(),
            start_line: Some(start),
            end_line: Some(end),
            source,
            body,
        };
        if blocks.is_empty() {
            preamble = leading;
        } else {
            block.leading_lines = leading;
        }
        blocks.push(block);
        i = j;
    }

    let trailing = pending;

    debug!(
        blocks = blocks.len(),
        warnings = warnings.len(),
        "parsed rule document"
    );

    RuleDocument {
        blocks,
        preamble,
        trailing,
        warnings,
    }
}

/// Interprets a balanced block span (`If` line through `End` line, no comment
/// line) into structured logic. Returns the reason on failure; the caller
/// falls back to verbatim preservation.
fn interpret_block(span: &[String]) -> Result<RuleLogic, &'static str> {
    let Some(condition_line) = span.first() else {
        return Err("empty block span");
    };
    let Some(caps) = IF_LINE.captures(condition_line) else {
        return Err("block does not start with If");
    };
    let body = &span[1..span.len().saturating_sub(1)];

    // Any nesting is out of scope for structured editing.
    if body.iter().any(|l| is_if_line(l)) {
        return Err("nested If block");
    }

    let (port, condition) = extract_port_predicate(&caps[1]);
    let mut logic = RuleLogic {
        port,
        condition,
        ..RuleLogic::default()
    };

    #[derive(PartialEq)]
    enum Cursor {
        Primary,
        ElseIf,
        Else,
    }
    let mut cursor = Cursor::Primary;
    let mut open_branch: Option<ElseIfBranch> = None;

    for line in body {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_comment_line(trimmed) {
            continue;
        }
        if let Some(caps) = ELSEIF_LINE.captures(line) {
            if cursor == Cursor::Else {
                return Err("ElseIf after Else");
            }
            if let Some(branch) = open_branch.take() {
                logic.else_if.push(branch);
            }
            open_branch = Some(ElseIfBranch {
                condition: caps[1].to_string(),
                actions: Vec::new(),
            });
            cursor = Cursor::ElseIf;
            continue;
        }
        if ELSE_LINE.is_match(line) {
            if cursor == Cursor::Else {
                return Err("duplicate Else");
            }
            if let Some(branch) = open_branch.take() {
                logic.else_if.push(branch);
            }
            cursor = Cursor::Else;
            continue;
        }

        let (directive, params) = match trimmed.split_once(char::is_whitespace) {
            Some((d, p)) => (d, p.trim()),
            None => (trimmed, ""),
        };
        if directive.is_empty() {
            return Err("body line without directive");
        }
        let action = RuleAction {
            directive: directive.to_string(),
            params: params.to_string(),
        };
        match cursor {
            Cursor::Primary => logic.actions.push(action),
            Cursor::ElseIf => {
                if let Some(branch) = &mut open_branch {
                    branch.actions.push(action);
                }
            }
            Cursor::Else => logic.else_actions.push(action),
        }
    }
    if let Some(branch) = open_branch.take() {
        logic.else_if.push(branch);
    }

    Ok(logic)
}

/// Searches the condition for `%{SERVER_PORT} = <n>`. On a hit, the integer
/// becomes the block's port and the predicate (plus one adjoining `&&`) is
/// stripped; the remainder is the additional condition.
fn extract_port_predicate(condition: &str) -> (Option<u16>, String) {
    let Some(caps) = PORT_PREDICATE.captures(condition) else {
        return (None, condition.trim().to_string());
    };
    let Ok(port) = caps[1].parse::<u16>() else {
        return (None, condition.trim().to_string());
    };
    if port == 0 {
        return (None, condition.trim().to_string());
    }
    let Some(whole) = caps.get(0) else {
        return (None, condition.trim().to_string());
    };

    let before = &condition[..whole.start()];
    let after = &condition[whole.end()..];
    let (before, after) = if let Some(stripped) = before.trim_end().strip_suffix("&&") {
        (stripped, after)
    } else if let Some(stripped) = after.trim_start().strip_prefix("&&") {
        (before, stripped)
    } else {
        (before, after)
    };

    let remainder = format!("{} {}", before.trim(), after.trim());
    (Some(port), remainder.trim().to_string())
}

/// Serializes blocks back into document text.
///
/// Unedited blocks reappear byte-identical via their retained source span;
/// edited and new blocks are emitted canonically. A new block with no leading
/// lines gets a synthesized blank-line separator unless it is the very first
/// emitted content.
pub fn serialize(blocks: &[RuleBlock], preamble: &[String], trailing: &[String]) -> String {
    let mut out: Vec<String> = preamble.to_vec();

    for block in blocks {
        if block.leading_lines.is_empty() {
            if block.source.is_empty() && !out.is_empty() {
                out.push(String::new());
            }
        } else {
            out.extend(block.leading_lines.iter().cloned());
        }

        match &block.body {
            RuleBody::Raw(lines) => out.extend(lines.iter().cloned()),
            RuleBody::Logic(logic) => {
                if block_matches_source(block) {
                    out.extend(block.source.iter().cloned());
                } else {
                    emit_canonical(&mut out, block, logic);
                }
            }
        }
    }

    out.extend(trailing.iter().cloned());
    out.join("\n")
}

/// Fidelity check: re-parses the retained source span and compares it to the
/// block's current state. A match means the caller never edited the block, so
/// the original bytes can be emitted as-is.
fn block_matches_source(block: &RuleBlock) -> bool {
    if block.source.is_empty() {
        return false;
    }
    let reparsed = parse(&block.source.join("\n"));
    if reparsed.blocks.len() != 1 || !reparsed.preamble.is_empty() || !reparsed.trailing.is_empty()
    {
        return false;
    }
    let original = &reparsed.blocks[0];
    original.comment == block.comment && original.body == block.body
}

fn emit_canonical(out: &mut Vec<String>, block: &RuleBlock, logic: &RuleLogic) {
    if let Some(comment) = &block.comment
        && !comment.is_empty()
    {
        let mut line = String::new();
        let _ = write!(line, "# {}", sanitize_value(comment));
        out.push(line);
    }

    let condition = sanitize_value(&logic.condition);
    let condition_line = match (logic.port, condition.is_empty()) {
        (Some(port), false) => format!("If %{{SERVER_PORT}} = {port} && {condition}"),
        (Some(port), true) => format!("If %{{SERVER_PORT}} = {port}"),
        (None, false) => format!("If {condition}"),
        (None, true) => "If true".to_string(),
    };
    out.push(condition_line);

    for action in &logic.actions {
        out.push(action_line(action));
    }
    for branch in &logic.else_if {
        out.push(format!("ElseIf {}", sanitize_value(&branch.condition)));
        for action in &branch.actions {
            out.push(action_line(action));
        }
    }
    if !logic.else_actions.is_empty() {
        out.push("Else".to_string());
        for action in &logic.else_actions {
            out.push(action_line(action));
        }
    }
    out.push("End".to_string());
}

fn action_line(action: &RuleAction) -> String {
    let directive = sanitize_value(&action.directive);
    if action.params.is_empty() {
        format!("  {directive}")
    } else {
        format!("  {directive} {}", sanitize_value(&action.params))
    }
}
