//! Integration tests for dispedit
//!
//! End-to-end coverage of the public API: parse → (edit) → serialize flows
//! for both dialects, the reference scan, and whole-document validation.
//! Property tests at the bottom exercise the round-trip guarantees against
//! arbitrary input.

use dispedit::core::ports;
use dispedit::core::rules;
use dispedit::{
    PortBody, RuleBody, Severity, check_port_references, validate_document,
};

/// Profile text with every feature the port dialect has: comments, extras,
/// unknown keys, a raw-fallback line, and uninterpreted content.
const PORT_PROFILE: &str = "\
# WD1 profile
SAPSYSTEMNAME = WD1
icm/host_name_full = wd1.example

# Public HTTP
icm/server_port_0 = PROT=HTTP,PORT=80,TIMEOUT=60
# TLS with client verification
icm/server_port_1 = PROT=HTTPS,PORT=443,TIMEOUT=60,VCLIENT=1,SSLCONFIG=ssl_config_default
icm/server_port_2 = PROT=SMTP,PORT=25,HOST=mail.internal,PROCTIMEOUT=600
icm/server_port_3 = PROT=HTTP,LEGACY
";

const RULE_FILE: &str = "\
# Rewrite rules

# API traffic to the backend pool
If %{SERVER_PORT} = 80 && %{PATH} = ^/api
  Forward https://backend.example:8443
ElseIf %{PATH} = ^/legacy
  Redirect https://legacy.example
Else
  Deny
End

# Internal hosts bypass
If %{HOST} = internal.example
  SetHeader X-Internal 1
End
";

// ── round trip ──────────────────────────────────────────────────────────────

#[test]
fn test_port_profile_round_trip() {
    let doc = ports::parse(PORT_PROFILE);
    assert_eq!(doc.render(), PORT_PROFILE);
}

#[test]
fn test_rule_file_round_trip() {
    let doc = rules::parse(RULE_FILE);
    assert_eq!(doc.render(), RULE_FILE);
}

#[test]
fn test_port_round_trip_is_idempotent() {
    let once = ports::parse(PORT_PROFILE).render();
    let twice = ports::parse(&once).render();
    assert_eq!(twice, once);
}

#[test]
fn test_rule_round_trip_is_idempotent() {
    let once = rules::parse(RULE_FILE).render();
    let twice = rules::parse(&once).render();
    assert_eq!(twice, once);
}

#[test]
fn test_round_trip_preserves_unconventional_spacing() {
    // Spacing and key order the canonical form would normalize must still
    // survive an unedited cycle.
    let text = "icm/server_port_0 =  PORT=80 , PROT=HTTP\nIf   %{SERVER_PORT}=80\nEnd";
    assert_eq!(ports::parse(text).render(), text);
    assert_eq!(rules::parse(text).render(), text);
}

#[test]
fn test_edited_canonical_output_is_stable() {
    // After an edit canonicalizes a line, further cycles must not change it.
    let mut doc = ports::parse("icm/server_port_0 =  PORT=80 , PROT=HTTP");
    if let PortBody::Params(params) = &mut doc.entries[0].body {
        params.timeout = Some(30);
    }
    let once = doc.render();
    assert_eq!(once, "icm/server_port_0 = PROT=HTTP,PORT=80,TIMEOUT=30");
    assert_eq!(ports::parse(&once).render(), once);
}

// ── editing flows ───────────────────────────────────────────────────────────

#[test]
fn test_full_port_editing_session() {
    let mut doc = ports::parse(PORT_PROFILE);
    assert_eq!(doc.entries.len(), 4);

    // The raw-fallback line is untouchable but present.
    assert!(doc.entries[3].is_raw());

    // Edit one entry, delete another, add a third.
    if let PortBody::Params(params) = &mut doc.entries[0].body {
        params.port = Some(8080);
    }
    doc.entries.retain(|e| e.index != 2);
    let mut added = dispedit::PortEntry::new(ports::next_free_index(&doc.entries));
    if let PortBody::Params(params) = &mut added.body {
        params.protocol = "HTTP".to_string();
        params.port = Some(8100);
    }
    assert_eq!(added.index, 2);
    doc.entries.push(added);

    let rendered = doc.render();
    assert!(rendered.contains("icm/server_port_0 = PROT=HTTP,PORT=8080,TIMEOUT=60"));
    assert!(!rendered.contains("PROT=SMTP"));
    // The new entry is appended even though it reuses the freed index, and
    // the document's final newline stays final.
    assert!(rendered.ends_with("icm/server_port_2 = PROT=HTTP,PORT=8100\n"));
    // Unedited lines survive byte-identically.
    assert!(rendered.contains(
        "icm/server_port_1 = PROT=HTTPS,PORT=443,TIMEOUT=60,VCLIENT=1,SSLCONFIG=ssl_config_default"
    ));
    assert!(rendered.contains("icm/server_port_3 = PROT=HTTP,LEGACY"));
}

#[test]
fn test_full_rule_editing_session() {
    let mut doc = rules::parse(RULE_FILE);
    assert_eq!(doc.blocks.len(), 2);

    // Retarget the API rule and drop the internal-hosts rule.
    if let RuleBody::Logic(logic) = &mut doc.blocks[0].body {
        logic.actions[0].params = "https://pool.example:9443".to_string();
    }
    doc.blocks.remove(1);

    let rendered = doc.render();
    assert!(rendered.contains("  Forward https://pool.example:9443"));
    assert!(!rendered.contains("X-Internal"));
    // The edited block is canonical, its comment re-emitted.
    assert!(rendered.contains("# API traffic to the backend pool\nIf %{SERVER_PORT} = 80 && %{PATH} = ^/api"));
    // Preamble survives.
    assert!(rendered.starts_with("# Rewrite rules\n"));
}

#[test]
fn test_deleting_port_consults_rule_references_first() {
    // The editor flow: before deleting port 80, scan the rule text.
    let report = check_port_references(RULE_FILE, 80);
    assert_eq!(report.match_count, 1);
    assert_eq!(report.labels, vec!["API traffic to the backend pool".to_string()]);

    // Port 25 has no rules; deletion is clean.
    assert_eq!(check_port_references(RULE_FILE, 25).match_count, 0);
}

#[test]
fn test_commit_gate_blocks_on_structural_errors_only() {
    // Unknown directives are advisory; the document still validates.
    let text = "If %{SERVER_PORT} = 80\n  Teleport somewhere\nEnd";
    assert!(validate_document(text).is_empty());
    assert!(dispedit::validators::check_directive("Teleport").is_some());

    // An unclosed block is the gating case.
    let findings = validate_document("If a\nIf b\nEnd");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("1 unclosed If block"));
}

#[test]
fn test_no_loss_every_line_classified_once() {
    let doc = ports::parse(PORT_PROFILE);
    let lines: Vec<&str> = PORT_PROFILE.split('\n').collect();
    assert_eq!(doc.line_map.len(), lines.len());
    for (i, map_entry) in doc.line_map.iter().enumerate() {
        assert_eq!(map_entry.line, i);
        assert_eq!(map_entry.text, lines[i]);
    }

    let doc = rules::parse(RULE_FILE);
    let block_lines: usize = doc
        .blocks
        .iter()
        .map(|b| b.source.len() + b.leading_lines.len())
        .sum();
    let total = doc.preamble.len() + block_lines + doc.trailing.len();
    assert_eq!(total, RULE_FILE.split('\n').count());
}

#[test]
fn test_warnings_do_not_affect_round_trip() {
    let text = "icm/server_port_0 = PROT=HTTP,BROKEN\nIf %{SERVER_PORT} = 80\n  Deny";
    let port_doc = ports::parse(text);
    assert!(!port_doc.warnings.is_empty());
    assert_eq!(port_doc.render(), text);

    let rule_doc = rules::parse(text);
    assert!(!rule_doc.warnings.is_empty());
    assert_eq!(rule_doc.render(), text);
}

#[test]
fn test_json_boundary_carries_full_session_state() {
    let doc = ports::parse(PORT_PROFILE);
    let json = doc.to_json().unwrap();
    let mut restored = dispedit::PortDocument::from_json(&json).unwrap();
    // The UI can keep editing the restored state.
    restored.entries.retain(|e| e.index != 0);
    let rendered = restored.render();
    assert!(!rendered.contains("PORT=80,"));
    assert!(rendered.contains("PROT=HTTPS"));
}

// ── property tests ──────────────────────────────────────────────────────────

mod properties {
    use super::*;
    use proptest::prelude::*;

    /// Lines resembling dispatcher profile and rule content, plus arbitrary
    /// noise, to drive the round-trip properties over realistic mixtures.
    fn document_line() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[ -~]{0,40}".prop_map(|s| s),
            "# [ -~]{0,30}".prop_map(|s| s),
            (0usize..10, 1u16..1000).prop_map(|(i, p)| format!(
                "icm/server_port_{i} = PROT=HTTP,PORT={p}"
            )),
            (1u16..1000).prop_map(|p| format!("If %{{SERVER_PORT}} = {p}")),
            Just("  Forward https://backend".to_string()),
            Just("ElseIf %{PATH} = ^/x".to_string()),
            Just("Else".to_string()),
            Just("End".to_string()),
        ]
    }

    fn document() -> impl Strategy<Value = String> {
        proptest::collection::vec(document_line(), 0..30).prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        #[test]
        fn prop_port_round_trip_any_text(text in document()) {
            prop_assert_eq!(ports::parse(&text).render(), text);
        }

        #[test]
        fn prop_rule_round_trip_any_text(text in document()) {
            prop_assert_eq!(rules::parse(&text).render(), text);
        }

        #[test]
        fn prop_port_round_trip_arbitrary_unicode(text in "\\PC{0,200}") {
            prop_assert_eq!(ports::parse(&text).render(), text.clone());
        }

        #[test]
        fn prop_rule_round_trip_arbitrary_unicode(text in "\\PC{0,200}") {
            prop_assert_eq!(rules::parse(&text).render(), text.clone());
        }

        #[test]
        fn prop_serialize_parse_serialize_is_identity(text in document()) {
            let once = rules::parse(&text).render();
            prop_assert_eq!(rules::parse(&once).render(), once);
        }

        #[test]
        fn prop_validate_never_panics(text in document()) {
            let _ = validate_document(&text);
        }

        #[test]
        fn prop_reference_scan_never_panics(text in document(), port in 1u16..) {
            let report = check_port_references(&text, port);
            prop_assert_eq!(report.match_count, report.labels.len());
        }

        #[test]
        fn prop_well_formed_declarations_never_raw(
            index in 0usize..100,
            port in 1u16..,
            timeout in 0u32..100_000,
        ) {
            let text = format!("icm/server_port_{index} = PROT=HTTP,PORT={port},TIMEOUT={timeout}");
            let doc = ports::parse(&text);
            prop_assert_eq!(doc.entries.len(), 1);
            prop_assert!(!doc.entries[0].is_raw());
        }

        #[test]
        fn prop_balanced_blocks_never_complex(
            port in 1u16..,
            params in "[ -~]{0,30}",
        ) {
            let text = format!("If %{{SERVER_PORT}} = {port}\n  Forward {params}\nEnd");
            let doc = rules::parse(&text);
            prop_assert_eq!(doc.blocks.len(), 1);
            prop_assert!(!doc.blocks[0].is_complex());
        }
    }
}
