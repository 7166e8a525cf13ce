//! Capability tracker (spec.md §4.2).
//!
//! The tracker is a shadow environment mapping each interpreter identifier
//! to its [`CapabilitySet`], plus an ordered list of registered
//! [`Policy`] instances consulted before any side-effecting operation.
//! Grounded on the label/ceiling bookkeeping in
//! `examples/pycckuu-wintermute/src/kernel/policy.rs`'s `PolicyEngine`, and
//! on `CapabilityTracker` in `examples/original_source/camel/capabilities.py`.

use std::collections::HashMap;

use crate::algebra::CapabilitySet;
use crate::policy::{Policy, PolicyContext, PolicyError};

/// Tracks the capability set bound to each identifier in the current
/// interpreter run, and the ordered policies that gate operations.
#[derive(Default)]
pub struct CapabilityTracker {
    variable_capabilities: HashMap<String, CapabilitySet>,
    policies: Vec<Box<dyn Policy>>,
}

impl CapabilityTracker {
    /// An empty tracker with no bindings and no policies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a capability set to an identifier, replacing any prior binding.
    pub fn assign(&mut self, identifier: impl Into<String>, capabilities: CapabilitySet) {
        self.variable_capabilities.insert(identifier.into(), capabilities);
    }

    /// Look up the capability set bound to an identifier, if any.
    pub fn get(&self, identifier: &str) -> Option<&CapabilitySet> {
        self.variable_capabilities.get(identifier)
    }

    /// Compute the capabilities that a value derived from the named
    /// identifiers should carry, via [`CapabilitySet::derive_from`].
    ///
    /// Identifiers with no prior binding contribute no capabilities (they
    /// are treated as an empty set, not an error) — literals in the
    /// program have no identifier to look up.
    pub fn derive(&self, identifiers: &[&str]) -> CapabilitySet {
        let sets: Vec<&CapabilitySet> = identifiers
            .iter()
            .filter_map(|id| self.variable_capabilities.get(*id))
            .collect();
        CapabilitySet::derive_from(sets)
    }

    /// Register a policy. Policies are consulted in registration order and
    /// the check short-circuits on the first denial.
    pub fn add_policy(&mut self, policy: Box<dyn Policy>) {
        self.policies.push(policy);
    }

    /// Number of registered policies.
    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// Evaluate every registered policy against `operation`, short-circuiting
    /// on the first denial (a policy returning `false`).
    ///
    /// Returns `Ok(())` if every policy allows the operation, or
    /// `Err(PolicyError::Denied)` naming the first policy that denied it.
    pub fn check(&self, operation: &str, ctx: &PolicyContext<'_>) -> Result<(), PolicyError> {
        for policy in &self.policies {
            if !policy.check(operation, self, ctx) {
                return Err(PolicyError::Denied {
                    policy: policy.name().to_string(),
                    operation: operation.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Capability;

    struct AlwaysDeny;
    impl Policy for AlwaysDeny {
        fn name(&self) -> &str {
            "always_deny"
        }
        fn check(&self, _operation: &str, _tracker: &CapabilityTracker, _ctx: &PolicyContext<'_>) -> bool {
            false
        }
    }

    struct AlwaysAllow;
    impl Policy for AlwaysAllow {
        fn name(&self) -> &str {
            "always_allow"
        }
        fn check(&self, _operation: &str, _tracker: &CapabilityTracker, _ctx: &PolicyContext<'_>) -> bool {
            true
        }
    }

    #[test]
    fn assign_then_get_roundtrips() {
        let mut tracker = CapabilityTracker::new();
        let mut caps = CapabilitySet::new();
        caps.add(Capability::trusted("user"));
        tracker.assign("x", caps);
        assert!(tracker.get("x").unwrap().is_trusted());
        assert!(tracker.get("missing").is_none());
    }

    #[test]
    fn derive_combines_named_identifiers() {
        let mut tracker = CapabilityTracker::new();
        let mut a = CapabilitySet::new();
        a.add(Capability::trusted("user"));
        let mut b = CapabilitySet::new();
        b.add(Capability::untrusted("email"));
        tracker.assign("a", a);
        tracker.assign("b", b);

        let derived = tracker.derive(&["a", "b"]);
        assert!(derived.is_trusted());
        assert!(derived.is_untrusted());
    }

    #[test]
    fn derive_ignores_unbound_identifiers() {
        let tracker = CapabilityTracker::new();
        let derived = tracker.derive(&["literal"]);
        assert!(derived.is_empty());
    }

    #[test]
    fn check_short_circuits_on_first_denial() {
        let mut tracker = CapabilityTracker::new();
        tracker.add_policy(Box::new(AlwaysAllow));
        tracker.add_policy(Box::new(AlwaysDeny));
        tracker.add_policy(Box::new(AlwaysAllow));

        let ctx = PolicyContext::new("send_email");
        let err = tracker.check("send_email", &ctx).unwrap_err();
        match err {
            PolicyError::Denied { policy, .. } => assert_eq!(policy, "always_deny"),
        }
    }

    #[test]
    fn check_passes_when_all_policies_allow() {
        let mut tracker = CapabilityTracker::new();
        tracker.add_policy(Box::new(AlwaysAllow));
        let ctx = PolicyContext::new("send_email");
        assert!(tracker.check("send_email", &ctx).is_ok());
    }
}
