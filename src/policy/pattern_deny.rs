//! Grounded on `MCPToolRule.blocked_patterns` in
//! `examples/original_source/camel/mcp_security.py`: a fixed per-tool list
//! of substrings that must never appear in a call's arguments (path
//! traversal, credential files, and similar).

use std::collections::HashMap;

use super::{Policy, PolicyContext};
use crate::tracker::CapabilityTracker;

/// Denies a tool call whose serialized arguments contain any of the
/// blocked substrings configured for that tool name.
pub struct PatternDenyPolicy {
    blocked_patterns: HashMap<String, Vec<String>>,
}

impl PatternDenyPolicy {
    /// An empty policy; add per-tool pattern lists with [`Self::with_tool`].
    pub fn new() -> Self {
        Self {
            blocked_patterns: HashMap::new(),
        }
    }

    /// Register blocked substrings for a given tool name.
    pub fn with_tool(mut self, tool_name: impl Into<String>, patterns: impl IntoIterator<Item = String>) -> Self {
        self.blocked_patterns
            .insert(tool_name.into(), patterns.into_iter().collect());
        self
    }

    /// The reference defaults, grounded on `MCPSecurityPolicy`'s built-in
    /// rules for `send_email`, `read_file`, and `create_followup_task`.
    pub fn with_reference_defaults(self) -> Self {
        self.with_tool(
            "read_file",
            ["../", "/etc/", "/root/", "passwords", "secrets", "keys", "tokens"].map(String::from),
        )
        .with_tool(
            "send_email",
            ["attacker", "evil", "malicious", "hacker", "exfiltrate", "steal", "dump", "leak"].map(String::from),
        )
        .with_tool(
            "create_followup_task",
            ["attacker", "evil", "malicious", "hacker", "exfiltrate"].map(String::from),
        )
    }
}

impl Default for PatternDenyPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for PatternDenyPolicy {
    fn name(&self) -> &str {
        "pattern_deny_policy"
    }

    fn check(&self, _operation: &str, _tracker: &CapabilityTracker, ctx: &PolicyContext<'_>) -> bool {
        let Some(tool_name) = ctx.tool_name else {
            return true;
        };
        let Some(patterns) = self.blocked_patterns.get(tool_name) else {
            return true;
        };
        let Some(arguments) = ctx.arguments else {
            return true;
        };
        let haystack = arguments.to_string().to_lowercase();
        !patterns.iter().any(|pattern| haystack.contains(&pattern.to_lowercase()))
    }
}
