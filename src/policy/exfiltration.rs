//! Grounded on `detect_data_exfiltration_pattern` in
//! `examples/original_source/camel/mcp_security.py`: arguments are scanned
//! for sensitive-data indicators, and a session is allowed at most a
//! handful of such exports before every further attempt is denied. Per
//! spec.md §4.3 the heuristic only gates send/reply operations — sending an
//! email or replying to a support ticket — not every tool call.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Policy, PolicyContext};
use crate::tracker::CapabilityTracker;

const DEFAULT_SENSITIVE_INDICATORS: &[&str] = &[
    "api_key",
    "password",
    "token",
    "secret",
    "credential",
    "financial",
    "revenue",
    "profit",
    "confidential",
    "internal",
    "proprietary",
    "ssn",
    "credit_card",
];

/// Operations this policy gates: sending an email, and replying to a
/// support ticket (the reference tool set's `create_followup_task`).
const GATED_OPERATIONS: &[&str] = &["send_email", "create_followup_task"];

/// Denies network-egress tool calls whose arguments look like sensitive
/// data once a session has made more than `max_exports` such attempts.
pub struct ExfiltrationHeuristicPolicy {
    sensitive_indicators: Vec<String>,
    max_exports: usize,
    export_counts: Mutex<HashMap<String, usize>>,
}

impl ExfiltrationHeuristicPolicy {
    /// Build a policy using the reference sensitive-indicator list and a
    /// session export budget of `max_exports` (the Python reference uses
    /// `2`, i.e. denies on the third attempt).
    pub fn new(max_exports: usize) -> Self {
        Self {
            sensitive_indicators: DEFAULT_SENSITIVE_INDICATORS.iter().map(|s| s.to_string()).collect(),
            max_exports,
            export_counts: Mutex::new(HashMap::new()),
        }
    }

    fn looks_sensitive(&self, haystack: &str) -> bool {
        self.sensitive_indicators.iter().any(|indicator| haystack.contains(indicator.as_str()))
    }
}

impl Policy for ExfiltrationHeuristicPolicy {
    fn name(&self) -> &str {
        "exfiltration_heuristic_policy"
    }

    fn check(&self, operation: &str, tracker: &CapabilityTracker, ctx: &PolicyContext<'_>) -> bool {
        if !GATED_OPERATIONS.contains(&operation) {
            return true;
        }
        let Some(arguments) = ctx.arguments else {
            return true;
        };
        let untrusted_from_identifiers = ctx
            .identifiers
            .iter()
            .any(|id| tracker.get(id).map(|caps| caps.is_untrusted()).unwrap_or(false));
        let untrusted_from_inputs = ctx.input_capabilities.map(|caps| caps.is_untrusted()).unwrap_or(false);
        let untrusted_source = untrusted_from_identifiers || untrusted_from_inputs;
        let haystack = arguments.to_string().to_lowercase();
        if !self.looks_sensitive(&haystack) && !untrusted_source {
            return true;
        }

        let session = ctx.session_id.unwrap_or("default");
        let mut counts = match self.export_counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = counts.entry(session.to_string()).or_insert(0);
        if *count >= self.max_exports {
            return false;
        }
        *count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Capability;

    #[test]
    fn allows_non_sensitive_trusted_arguments() {
        let policy = ExfiltrationHeuristicPolicy::new(2);
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"body": "meeting notes"});
        let ctx = PolicyContext::new("send_email").with_arguments(&args);
        assert!(policy.check("send_email", &tracker, &ctx));
    }

    #[test]
    fn allows_sensitive_export_under_the_budget() {
        let policy = ExfiltrationHeuristicPolicy::new(2);
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"body": "here is the api_key"});
        let ctx = PolicyContext::new("send_email").with_arguments(&args).with_session("s1");
        assert!(policy.check("send_email", &tracker, &ctx));
        assert!(policy.check("send_email", &tracker, &ctx));
    }

    #[test]
    fn denies_sensitive_export_once_budget_exhausted() {
        let policy = ExfiltrationHeuristicPolicy::new(2);
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"body": "here is the api_key"});
        let ctx = PolicyContext::new("send_email").with_arguments(&args).with_session("s1");
        assert!(policy.check("send_email", &tracker, &ctx));
        assert!(policy.check("send_email", &tracker, &ctx));
        assert!(!policy.check("send_email", &tracker, &ctx));
    }

    #[test]
    fn counts_sessions_independently() {
        let policy = ExfiltrationHeuristicPolicy::new(1);
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"body": "password dump"});
        let ctx_a = PolicyContext::new("send_email").with_arguments(&args).with_session("a");
        let ctx_b = PolicyContext::new("send_email").with_arguments(&args).with_session("b");
        assert!(policy.check("send_email", &tracker, &ctx_a));
        assert!(policy.check("send_email", &tracker, &ctx_b));
        assert!(!policy.check("send_email", &tracker, &ctx_a));
    }

    #[test]
    fn counts_untrusted_via_input_capabilities_even_without_sensitive_words() {
        let policy = ExfiltrationHeuristicPolicy::new(0);
        let tracker = CapabilityTracker::new();
        let mut caps = crate::algebra::CapabilitySet::new();
        caps.add(Capability::untrusted("email"));

        let args = serde_json::json!({"body": "hello there"});
        let ctx = PolicyContext::new("send_email")
            .with_arguments(&args)
            .with_input_capabilities(&caps);
        assert!(!policy.check("send_email", &tracker, &ctx));
    }

    #[test]
    fn counts_untrusted_sourced_exports_even_without_sensitive_words() {
        let policy = ExfiltrationHeuristicPolicy::new(0);
        let mut tracker = CapabilityTracker::new();
        let mut caps = crate::algebra::CapabilitySet::new();
        caps.add(Capability::untrusted("email"));
        tracker.assign("email_body", caps);

        let args = serde_json::json!({"body": "hello there"});
        let ctx = PolicyContext::new("send_email")
            .with_arguments(&args)
            .with_identifiers(vec!["email_body"]);
        assert!(!policy.check("send_email", &tracker, &ctx));
    }

    #[test]
    fn applies_to_ticket_replies_too() {
        let policy = ExfiltrationHeuristicPolicy::new(0);
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"description": "here is the api_key"});
        let ctx = PolicyContext::new("create_followup_task").with_arguments(&args).with_session("s1");
        assert!(!policy.check("create_followup_task", &tracker, &ctx));
    }

    #[test]
    fn ignores_operations_outside_the_gated_set() {
        let policy = ExfiltrationHeuristicPolicy::new(0);
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"path": "here is the api_key"});
        let ctx = PolicyContext::new("read_file").with_arguments(&args).with_session("s1");
        assert!(policy.check("read_file", &tracker, &ctx));
    }
}
