//! Shared test utilities for core module tests
//!
//! Provides fixture documents and entity builders used across test suites.
//! This module is only compiled in test mode.

use crate::core::ports::{PortBody, PortEntry, PortParams};
use crate::core::rules::{RuleAction, RuleBlock, RuleBody, RuleLogic};

/// A realistic port declaration document: comments, declarations with
/// varying parameter sets, and uninterpreted profile content.
pub const SAMPLE_PORTS: &str = "\
# Dispatcher instance profile
SAPSYSTEMNAME = WD1

# Public HTTP
icm/server_port_0 = PROT=HTTP,PORT=80,TIMEOUT=60
icm/server_port_1 = PROT=HTTPS,PORT=443,TIMEOUT=60,VCLIENT=1,SSLCONFIG=ssl_config_default
# Admin, loopback only
icm/server_port_2 = PROT=HTTP,PORT=8100,HOST=localhost,PROCTIMEOUT=600

wdisp/add_xforwardedfor_header = true
";

/// A realistic rule document: preamble, port-scoped and global blocks,
/// branches, and trailing content.
pub const SAMPLE_RULES: &str = "\
# Rewrite rules for WD1
# Managed by the dispatcher team

# API traffic
If %{SERVER_PORT} = 80 && %{PATH} = ^/api
  Forward https://backend.example:8443
ElseIf %{PATH} = ^/legacy
  Redirect https://legacy.example
Else
  Deny
End

If %{HOST} = internal.example
  SetHeader X-Internal 1
End

# end of rules
";

/// Builds a structured port entry the way the UI would create one.
pub fn port_entry(index: usize, protocol: &str, port: u16) -> PortEntry {
    PortEntry {
        index,
        comment: None,
        origin_line: None,
        body: PortBody::Params(PortParams {
            protocol: protocol.to_string(),
            port: Some(port),
            ..PortParams::default()
        }),
    }
}

/// Builds a port-scoped block with a single Forward action.
pub fn forward_block(port: u16, target: &str) -> RuleBlock {
    let mut block = RuleBlock::new();
    block.body = RuleBody::Logic(RuleLogic {
        port: Some(port),
        actions: vec![RuleAction {
            directive: "Forward".to_string(),
            params: target.to_string(),
        }],
        ..RuleLogic::default()
    });
    block
}
