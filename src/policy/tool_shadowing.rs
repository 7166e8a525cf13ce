//! Grounded on `ToolShadowingDetector` in
//! `examples/original_source/camel/mcp_security.py`: once a tool name has
//! been registered from a given source, registering the same name from a
//! different source is a shadowing attempt and is denied.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Policy, PolicyContext};
use crate::tracker::CapabilityTracker;

/// Denies `register_tool` operations that would shadow an already
/// registered tool name with a definition from a different source.
pub struct ToolShadowingDetector {
    registered: Mutex<HashMap<String, String>>,
    conflicts: Mutex<Vec<(String, String)>>,
}

impl ToolShadowingDetector {
    /// A detector with no tools registered yet.
    pub fn new() -> Self {
        Self {
            registered: Mutex::new(HashMap::new()),
            conflicts: Mutex::new(Vec::new()),
        }
    }

    /// All `(tool_name, source)` shadowing attempts denied so far, for
    /// diagnostics.
    pub fn conflicts(&self) -> Vec<(String, String)> {
        let conflicts = match self.conflicts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        conflicts.clone()
    }
}

impl Default for ToolShadowingDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for ToolShadowingDetector {
    fn name(&self) -> &str {
        "tool_shadowing_detector"
    }

    fn check(&self, operation: &str, _tracker: &CapabilityTracker, ctx: &PolicyContext<'_>) -> bool {
        if operation != "register_tool" {
            return true;
        }
        let Some(tool_name) = ctx.tool_name else {
            return true;
        };
        let source = ctx
            .arguments
            .and_then(|a| a.get("source"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        let mut registered = match self.registered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match registered.get(tool_name) {
            Some(existing) if existing != source => {
                let mut conflicts = match self.conflicts.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                conflicts.push((tool_name.to_string(), source.to_string()));
                false
            }
            Some(_) => true,
            None => {
                registered.insert(tool_name.to_string(), source.to_string());
                true
            }
        }
    }
}
