//! Port declaration codec
//!
//! Parses and serializes single-line port-binding declarations of the form
//!
//! ```text
//! icm/server_port_<index> = KEY=VALUE,KEY=VALUE,...
//! ```
//!
//! # Round-trip fidelity
//!
//! Every input line is recorded in a [`LineMapEntry`]; the ordered
//! concatenation of map texts reconstructs the original document exactly.
//! The serializer walks that map and re-emits the *original bytes* of every
//! line whose entity the caller did not touch. Only edited entries are
//! rewritten in canonical form, and only deleted entries disappear.
//!
//! # Fallback
//!
//! A declaration whose value portion contains a parameter without `=` cannot
//! be interpreted safely. The whole line becomes [`PortBody::Raw`] and is
//! preserved verbatim; no typed interpretation is attempted. This is a
//! warning, never an error.

use crate::core::error::ParseWarning;
use crate::core::{is_comment_line, split_lines, strip_comment};
use crate::validators::sanitize_value;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Parameter name of the port declaration line, without the index suffix.
pub const DECLARATION_PREFIX: &str = "icm/server_port_";

/// The secure protocol variant; gates emission of [`PortParams::vclient`]
/// and [`PortParams::sslconfig`].
pub const SECURE_PROTOCOL: &str = "HTTPS";

/// Parameter keys the format defines but the typed model does not carry.
/// They land in [`PortParams::extra`] without an unknown-key warning.
const EXTRA_KEYS: [&str; 3] = ["PROCTIMEOUT", "EXTBIND", "ACLFILE"];

static DECLARATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^icm/server_port_(\d+)\s*=\s*(.*)$").expect("declaration pattern is valid")
});

/// One port-binding declaration.
///
/// Created by [`parse`] or by [`PortEntry::new`]; mutated only by the caller;
/// deleted by being omitted from the slice passed to [`serialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntry {
    /// Index from the declaration name. Uniqueness within a document is the
    /// caller's concern, not enforced here.
    pub index: usize,
    /// `#` comment from the line immediately above the declaration, if any.
    pub comment: Option<String>,
    /// 0-based line of the declaration in the original document. `None` for
    /// entries created in the editor; [`serialize`] appends those at the end
    /// even when their index matches a deleted entry's line.
    #[serde(default)]
    pub origin_line: Option<usize>,
    pub body: PortBody,
}

/// Interpreted parameters or the verbatim fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortBody {
    Params(PortParams),
    /// The original line, preserved exactly. Set when any parameter lacks `=`.
    Raw(String),
}

/// Typed view of a declaration's `KEY=VALUE` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortParams {
    /// `PROT` value as written (conventionally `HTTP`, `HTTPS`, `SMTP`, `ROUTER`).
    pub protocol: String,
    /// `PORT` value, 1-65535.
    pub port: Option<u16>,
    /// `TIMEOUT` value in seconds.
    pub timeout: Option<u32>,
    /// `HOST` value.
    pub host: Option<String>,
    /// `VCLIENT` value; emitted only when [`PortParams::protocol`] is `HTTPS`.
    pub vclient: Option<String>,
    /// `SSLCONFIG` value; emitted only when [`PortParams::protocol`] is `HTTPS`.
    pub sslconfig: Option<String>,
    /// Remaining parameters in insertion order.
    pub extra: IndexMap<String, String>,
    /// Keys the format does not define at all; surfaced as warnings.
    pub unknown_keys: Vec<String>,
}

impl PortEntry {
    /// Creates an empty declaration with the given index.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            comment: None,
            origin_line: None,
            body: PortBody::Params(PortParams::default()),
        }
    }

    /// Returns `true` if the entry is a verbatim fallback.
    pub fn is_raw(&self) -> bool {
        matches!(self.body, PortBody::Raw(_))
    }
}

impl PortParams {
    /// Returns `true` if the secure-only fields apply to this entry.
    pub fn is_secure(&self) -> bool {
        self.protocol.eq_ignore_ascii_case(SECURE_PROTOCOL)
    }
}

/// Classification of one original document line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    /// A declaration line, owned by the entry with this index.
    Port { index: usize },
    /// A comment line attached to the entry with this index.
    PortComment { index: usize },
    /// Content the codec does not interpret, preserved in order.
    Other,
}

/// One original document line with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMapEntry {
    /// 0-based line number in the original document.
    pub line: usize,
    /// Original text, byte-exact.
    pub text: String,
    pub kind: LineKind,
}

/// Result of parsing a port declaration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDocument {
    pub entries: Vec<PortEntry>,
    /// Uninterpreted lines in original order.
    pub other_lines: Vec<String>,
    pub line_map: Vec<LineMapEntry>,
    pub warnings: Vec<ParseWarning>,
}

impl PortDocument {
    /// Serializes the document with its current entity state.
    pub fn render(&self) -> String {
        serialize(&self.entries, &self.other_lines, &self.line_map)
    }

    /// Serializes the document state to JSON for the editor UI.
    pub fn to_json(&self) -> crate::core::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restores document state from JSON produced by [`PortDocument::to_json`].
    pub fn from_json(json: &str) -> crate::core::error::Result<Self> {
        let doc: Self = serde_json::from_str(json)?;
        for entry in &doc.entries {
            if let PortBody::Params(params) = &entry.body
                && params.port == Some(0)
            {
                return Err(crate::core::error::Error::Validation {
                    field: "port".to_string(),
                    message: format!("entry {}: port must be between 1 and 65535", entry.index),
                });
            }
        }
        Ok(doc)
    }
}

/// Parses a port declaration document.
///
/// Never fails: lines that do not match the declaration pattern are preserved
/// as "other" content, and declarations that cannot be interpreted become
/// verbatim [`PortBody::Raw`] entries with a warning.
pub fn parse(text: &str) -> PortDocument {
    let lines = split_lines(text);
    let mut entries: Vec<PortEntry> = Vec::new();
    let mut other_lines: Vec<String> = Vec::new();
    let mut line_map: Vec<LineMapEntry> = Vec::new();
    let mut warnings: Vec<ParseWarning> = Vec::new();

    for (line_no, line) in lines.iter().enumerate() {
        let Some((index, body)) = interpret_declaration(line) else {
            other_lines.push((*line).to_string());
            line_map.push(LineMapEntry {
                line: line_no,
                text: (*line).to_string(),
                kind: LineKind::Other,
            });
            continue;
        };

        // One-line lookback: a comment directly above the declaration belongs
        // to the entry, not to the "other" bucket.
        let mut comment = None;
        if let Some(prev) = line_map.last_mut()
            && prev.kind == LineKind::Other
            && is_comment_line(&prev.text)
        {
            comment = Some(strip_comment(&prev.text));
            prev.kind = LineKind::PortComment { index };
            other_lines.pop();
        }

        match &body {
            PortBody::Raw(_) => {
                warn!(line = line_no + 1, "declaration kept verbatim");
                warnings.push(ParseWarning::RawDeclaration { line: line_no + 1 });
            }
            PortBody::Params(params) => {
                for key in &params.unknown_keys {
                    warnings.push(ParseWarning::UnknownKey {
                        index,
                        key: key.clone(),
                    });
                }
                for key in invalid_value_keys(line) {
                    warnings.push(ParseWarning::UnparsableValue { index, key });
                }
            }
        }

        entries.push(PortEntry {
            index,
            comment,
            origin_line: Some(line_no),
            body,
        });
        line_map.push(LineMapEntry {
            line: line_no,
            text: (*line).to_string(),
            kind: LineKind::Port { index },
        });
    }

    debug!(
        entries = entries.len(),
        other = other_lines.len(),
        warnings = warnings.len(),
        "parsed port declaration document"
    );

    PortDocument {
        entries,
        other_lines,
        line_map,
        warnings,
    }
}

/// Interprets a single line as a declaration, if it matches the pattern.
///
/// Returns `None` for non-declaration lines. Used both by [`parse`] and by the
/// serializer's fidelity check against the original line text.
pub(crate) fn interpret_declaration(line: &str) -> Option<(usize, PortBody)> {
    let caps = DECLARATION_LINE.captures(line)?;
    let index: usize = caps[1].parse().ok()?;
    let Some(params) = interpret_params(&caps[2]) else {
        return Some((index, PortBody::Raw(line.to_string())));
    };
    Some((index, PortBody::Params(params)))
}

/// Splits the value portion into typed fields. Returns `None` if any pair
/// lacks `=`, which makes the whole line a raw fallback.
fn interpret_params(value: &str) -> Option<PortParams> {
    let mut params = PortParams::default();

    for pair in value.split(',') {
        let (key, val) = pair.split_once('=')?;
        let key = key.trim().to_ascii_uppercase();
        let val = val.trim();

        match key.as_str() {
            "PROT" => params.protocol = val.to_string(),
            "PORT" => match val.parse::<u16>() {
                Ok(port) if port >= 1 => params.port = Some(port),
                _ => {
                    params.extra.insert(key, val.to_string());
                }
            },
            "TIMEOUT" => match val.parse::<u32>() {
                Ok(timeout) => params.timeout = Some(timeout),
                Err(_) => {
                    params.extra.insert(key, val.to_string());
                }
            },
            "HOST" => params.host = Some(val.to_string()),
            "VCLIENT" => params.vclient = Some(val.to_string()),
            "SSLCONFIG" => params.sslconfig = Some(val.to_string()),
            _ => {
                if !EXTRA_KEYS.contains(&key.as_str()) {
                    params.unknown_keys.push(key.clone());
                }
                params.extra.insert(key, val.to_string());
            }
        }
    }

    // Secure-only fields on a non-secure entry would be silently dropped by
    // the fixed emission order. Retain them as extras instead.
    if !params.is_secure() {
        if let Some(vclient) = params.vclient.take() {
            params.extra.insert("VCLIENT".to_string(), vclient);
        }
        if let Some(sslconfig) = params.sslconfig.take() {
            params.extra.insert("SSLCONFIG".to_string(), sslconfig);
        }
    }

    Some(params)
}

/// Names the recognized numeric keys whose values failed to parse on this
/// line. Only used for warning generation; the values themselves are kept in
/// the extra-parameter map.
fn invalid_value_keys(line: &str) -> Vec<String> {
    let Some(caps) = DECLARATION_LINE.captures(line) else {
        return Vec::new();
    };
    let mut keys = Vec::new();
    for pair in caps[2].split(',') {
        if let Some((key, val)) = pair.split_once('=') {
            let key = key.trim().to_ascii_uppercase();
            let val = val.trim();
            let bad = match key.as_str() {
                "PORT" => !val.parse::<u16>().is_ok_and(|p| p >= 1),
                "TIMEOUT" => val.parse::<u32>().is_err(),
                _ => false,
            };
            if bad {
                keys.push(key);
            }
        }
    }
    keys
}

/// Reconstructs the canonical declaration line for an entry.
///
/// Field order is fixed: protocol, port, timeout, host, then the secure-only
/// fields when the protocol is the secure variant, then extra parameters in
/// insertion order. All values are sanitized so an injected newline cannot
/// fabricate additional declaration lines.
fn canonical_line(entry: &PortEntry) -> String {
    let params = match &entry.body {
        PortBody::Raw(raw) => return sanitize_value(raw),
        PortBody::Params(params) => params,
    };

    let mut pairs: Vec<String> = Vec::new();
    if !params.protocol.is_empty() {
        pairs.push(format!("PROT={}", sanitize_value(&params.protocol)));
    }
    if let Some(port) = params.port {
        pairs.push(format!("PORT={port}"));
    }
    if let Some(timeout) = params.timeout {
        pairs.push(format!("TIMEOUT={timeout}"));
    }
    if let Some(host) = &params.host {
        pairs.push(format!("HOST={}", sanitize_value(host)));
    }
    if params.is_secure() {
        if let Some(vclient) = &params.vclient {
            pairs.push(format!("VCLIENT={}", sanitize_value(vclient)));
        }
        if let Some(sslconfig) = &params.sslconfig {
            pairs.push(format!("SSLCONFIG={}", sanitize_value(sslconfig)));
        }
    }
    for (key, val) in &params.extra {
        pairs.push(format!(
            "{}={}",
            sanitize_value(key),
            sanitize_value(val)
        ));
    }

    format!("{DECLARATION_PREFIX}{} = {}", entry.index, pairs.join(","))
}

/// Serializes entries back into document text.
///
/// Walks the original line map in order: "other" lines are emitted from
/// `other_lines` verbatim, declaration lines are looked up by the origin
/// line [`parse`] recorded on each entry. A found entity whose content still
/// matches the original bytes is emitted byte-identically; an edited entity
/// is emitted in canonical form; a missing entity (deleted by the caller)
/// drops its line and its attached comment. Entries without an origin line
/// are caller-created, even when their index reuses a deleted entry's; they
/// are appended at the end, comment first, before the document's final
/// newline when it has one.
pub fn serialize(entries: &[PortEntry], other_lines: &[String], line_map: &[LineMapEntry]) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut consumed = vec![false; entries.len()];
    let mut other_iter = other_lines.iter();
    let mut pending_comment: Option<&LineMapEntry> = None;

    for map_entry in line_map {
        match map_entry.kind {
            LineKind::Other => {
                pending_comment = None;
                if let Some(line) = other_iter.next() {
                    out.push(line.clone());
                }
            }
            LineKind::PortComment { .. } => {
                // Re-emitted with the owning entry, or dropped with it.
                pending_comment = Some(map_entry);
            }
            LineKind::Port { .. } => {
                let found = entries
                    .iter()
                    .enumerate()
                    .position(|(pos, e)| e.origin_line == Some(map_entry.line) && !consumed[pos]);
                if let Some(pos) = found {
                    let entry = &entries[pos];
                    emit_comment(&mut out, entry, pending_comment);
                    emit_declaration(&mut out, entry, &map_entry.text);
                    consumed[pos] = true;
                }
                pending_comment = None;
            }
        }
    }

    let mut appended: Vec<String> = Vec::new();
    for (pos, entry) in entries.iter().enumerate() {
        if !consumed[pos] {
            emit_comment(&mut appended, entry, None);
            appended.push(canonical_line(entry));
        }
    }
    if !appended.is_empty() {
        // A trailing empty segment is the document's final newline; appended
        // declarations slot in ahead of it rather than after.
        let before_final_newline = line_map
            .last()
            .is_some_and(|m| m.kind == LineKind::Other && m.text.is_empty())
            && out.last().is_some_and(String::is_empty);
        if before_final_newline {
            let at = out.len() - 1;
            out.splice(at..at, appended);
        } else {
            out.append(&mut appended);
        }
    }

    out.join("\n")
}

fn emit_comment(out: &mut Vec<String>, entry: &PortEntry, original: Option<&LineMapEntry>) {
    let Some(comment) = &entry.comment else {
        return;
    };
    if let Some(orig) = original
        && strip_comment(&orig.text) == *comment
    {
        out.push(orig.text.clone());
        return;
    }
    if !comment.is_empty() {
        let mut line = String::new();
        let _ = write!(line, "# {}", sanitize_value(comment));
        out.push(line);
    }
}

fn emit_declaration(out: &mut Vec<String>, entry: &PortEntry, original: &str) {
    let unchanged = interpret_declaration(original)
        .is_some_and(|(index, body)| index == entry.index && body == entry.body);
    if unchanged {
        out.push(original.to_string());
    } else {
        out.push(canonical_line(entry));
    }
}

/// Returns the smallest non-negative index not used by any entry.
pub fn next_free_index(entries: &[PortEntry]) -> usize {
    let mut index = 0;
    while entries.iter().any(|e| e.index == index) {
        index += 1;
    }
    index
}
