//! Policy engine (spec.md §4.3).
//!
//! A [`Policy`] is a predicate consulted by the [`crate::tracker::CapabilityTracker`]
//! before an operation is allowed to proceed. Policies must not raise; a
//! denial is signalled purely by returning `false`. The six reference
//! policies below are grounded on
//! `examples/pycckuu-wintermute/src/agent/policy.rs` (rate limiting),
//! `examples/pycckuu-wintermute/src/kernel/policy.rs` (label-aware checks),
//! and `examples/original_source/camel/mcp_security.py` (pattern
//! deny-lists, exfiltration heuristics, tool shadowing).

mod email;
mod exfiltration;
mod file_access;
mod pattern_deny;
mod rate_limit;
mod tool_shadowing;

use std::collections::HashMap;

pub use email::EmailRecipientPolicy;
pub use exfiltration::ExfiltrationHeuristicPolicy;
pub use file_access::FileAccessPolicy;
pub use pattern_deny::PatternDenyPolicy;
pub use rate_limit::RateLimitPolicy;
pub use tool_shadowing::ToolShadowingDetector;
use thiserror::Error;

use crate::algebra::CapabilitySet;
use crate::tracker::CapabilityTracker;

/// The inputs available to a policy's [`Policy::check`] call for a single
/// operation: the tool being invoked (if any), its concrete arguments, and
/// the names of interpreter identifiers whose capability sets are relevant.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext<'a> {
    /// The tool name this operation invokes, if it is a tool call.
    pub tool_name: Option<&'a str>,
    /// The concrete JSON arguments passed to the tool, if any.
    pub arguments: Option<&'a serde_json::Value>,
    /// Interpreter identifiers whose capability sets feed this operation,
    /// looked up through `tracker` by policies that need them.
    pub identifiers: Vec<&'a str>,
    /// The merged capability set of this operation's inputs, when the
    /// caller has already computed it (e.g. the interpreter merges
    /// argument capabilities while evaluating a call).
    pub input_capabilities: Option<&'a CapabilitySet>,
    /// Per-argument capability sets, keyed by the tool's declared argument
    /// name (from a keyword call, or the tool schema's `args` list zipped
    /// against a positional call). Lets a policy ask whether the value
    /// bound to one specific named argument (e.g. `"to"`, `"path"`) is
    /// untrusted, rather than conflating it with every other argument's
    /// taint the way [`Self::input_capabilities`] does.
    pub argument_capabilities: Option<&'a HashMap<String, CapabilitySet>>,
    /// A session identifier, used by policies that count calls over time.
    pub session_id: Option<&'a str>,
}

impl<'a> PolicyContext<'a> {
    /// A minimal context carrying no tool, arguments, or identifiers.
    pub fn new(_operation: &'a str) -> Self {
        Self::default()
    }

    /// Attach the tool name this operation invokes.
    pub fn with_tool(mut self, tool_name: &'a str) -> Self {
        self.tool_name = Some(tool_name);
        self
    }

    /// Attach the tool's concrete arguments.
    pub fn with_arguments(mut self, arguments: &'a serde_json::Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Attach the identifiers whose capabilities feed this operation.
    pub fn with_identifiers(mut self, identifiers: Vec<&'a str>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Attach the already-merged capability set of this operation's inputs.
    pub fn with_input_capabilities(mut self, capabilities: &'a CapabilitySet) -> Self {
        self.input_capabilities = Some(capabilities);
        self
    }

    /// Attach the per-argument capability sets, keyed by argument name.
    pub fn with_argument_capabilities(mut self, capabilities: &'a HashMap<String, CapabilitySet>) -> Self {
        self.argument_capabilities = Some(capabilities);
        self
    }

    /// Attach a session identifier.
    pub fn with_session(mut self, session_id: &'a str) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// A named predicate gating an operation. Implementations must not panic or
/// return an error: a denial is communicated solely by returning `false`.
pub trait Policy: Send + Sync {
    /// A short, stable name used in denial messages and logs.
    fn name(&self) -> &str;

    /// `true` if `operation` is allowed to proceed given the current
    /// capability bindings in `tracker` and the concrete `ctx`.
    fn check(&self, operation: &str, tracker: &CapabilityTracker, ctx: &PolicyContext<'_>) -> bool;
}

/// Errors raised by the policy engine itself (as opposed to a policy
/// denial, which is a normal, expected outcome reported as `Err` by
/// [`CapabilityTracker::check`](crate::tracker::CapabilityTracker::check)).
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A named policy denied the operation.
    #[error("policy '{policy}' denied operation '{operation}'")]
    Denied {
        /// The name of the policy that denied the operation.
        policy: String,
        /// The operation that was denied.
        operation: String,
    },
}
