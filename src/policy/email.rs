//! Grounded on `EmailSecurityPolicy` in
//! `examples/original_source/camel/capabilities.py`: a fixed set of
//! known-malicious domains is always blocked regardless of trust, and the
//! domain allow-list is only consulted for recipients whose identifier is
//! UNTRUSTED (spec.md §4.3) — a trusted or unlabelled recipient may be sent
//! to any domain that is not itself blocked.

use std::collections::HashSet;

use super::{Policy, PolicyContext};
use crate::tracker::CapabilityTracker;

/// Denies `send_email` operations whose recipient is not covered by a
/// trusted domain or an explicit approval, and always denies a fixed set
/// of known-malicious domains.
pub struct EmailRecipientPolicy {
    trusted_domains: HashSet<String>,
    approved_recipients: HashSet<String>,
    blocked_domains: HashSet<String>,
}

impl EmailRecipientPolicy {
    /// Build a policy from the given trusted domains and individually
    /// approved recipient addresses. The blocked-domain list is fixed and
    /// cannot be overridden by configuration.
    pub fn new(
        trusted_domains: impl IntoIterator<Item = String>,
        approved_recipients: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            trusted_domains: trusted_domains.into_iter().collect(),
            approved_recipients: approved_recipients.into_iter().collect(),
            blocked_domains: ["evil.com", "malicious.com", "attacker.com", "hacker.com"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    fn domain_of(recipient: &str) -> Option<&str> {
        recipient.split('@').nth(1)
    }

    /// `untrusted` is whether the recipient identifier itself carries an
    /// UNTRUSTED capability. Blocked domains are denied unconditionally;
    /// otherwise the trusted-domain/approval requirement only applies to an
    /// untrusted recipient.
    fn recipient_allowed(&self, recipient: &str, untrusted: bool) -> bool {
        let domain = Self::domain_of(recipient);
        if let Some(domain) = domain {
            if self.blocked_domains.contains(domain) {
                return false;
            }
        }
        if !untrusted {
            return true;
        }
        if let Some(domain) = domain {
            if self.trusted_domains.contains(domain) {
                return true;
            }
        }
        self.approved_recipients.contains(recipient)
    }
}

impl Policy for EmailRecipientPolicy {
    fn name(&self) -> &str {
        "email_recipient_policy"
    }

    fn check(&self, operation: &str, _tracker: &CapabilityTracker, ctx: &PolicyContext<'_>) -> bool {
        if operation != "send_email" {
            return true;
        }
        let Some(arguments) = ctx.arguments else {
            return true;
        };
        let recipients: Vec<&str> = match arguments.get("to") {
            Some(serde_json::Value::String(s)) => vec![s.as_str()],
            Some(serde_json::Value::Array(items)) => {
                items.iter().filter_map(|v| v.as_str()).collect()
            }
            _ => return true,
        };
        let untrusted = ctx
            .argument_capabilities
            .and_then(|caps| caps.get("to"))
            .map(|caps| caps.is_untrusted())
            .unwrap_or(false);
        recipients.iter().all(|recipient| self.recipient_allowed(recipient, untrusted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Capability, CapabilitySet};
    use std::collections::HashMap;

    fn policy() -> EmailRecipientPolicy {
        EmailRecipientPolicy::new(
            ["company.com".to_string(), "trusted-partner.com".to_string()],
            ["vip@external.org".to_string()],
        )
    }

    fn untrusted_to() -> HashMap<String, CapabilitySet> {
        let mut caps = CapabilitySet::new();
        caps.add(Capability::untrusted("extractor"));
        HashMap::from([("to".to_string(), caps)])
    }

    #[test]
    fn allows_trusted_domain() {
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"to": "alice@company.com"});
        let ctx = PolicyContext::new("send_email").with_arguments(&args);
        assert!(policy().check("send_email", &tracker, &ctx));
    }

    #[test]
    fn allows_a_trusted_recipient_outside_the_domain_allow_list() {
        // No taint on "to" at all (the common case: a literal address
        // written into the program, or one seeded as trusted) means the
        // domain requirement never applies — only the fixed block-list does.
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"to": "rando@example.com"});
        let ctx = PolicyContext::new("send_email").with_arguments(&args);
        assert!(policy().check("send_email", &tracker, &ctx));
    }

    #[test]
    fn allows_individually_approved_untrusted_recipient() {
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"to": "vip@external.org"});
        let caps = untrusted_to();
        let ctx = PolicyContext::new("send_email")
            .with_arguments(&args)
            .with_argument_capabilities(&caps);
        assert!(policy().check("send_email", &tracker, &ctx));
    }

    #[test]
    fn denies_an_untrusted_recipient_outside_the_domain_allow_list() {
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"to": "rando@example.com"});
        let caps = untrusted_to();
        let ctx = PolicyContext::new("send_email")
            .with_arguments(&args)
            .with_argument_capabilities(&caps);
        assert!(!policy().check("send_email", &tracker, &ctx));
    }

    #[test]
    fn always_denies_blocked_domain_even_if_trusted_listed() {
        let mut p = policy();
        p.trusted_domains.insert("evil.com".to_string());
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"to": "attacker@evil.com"});
        let ctx = PolicyContext::new("send_email").with_arguments(&args);
        assert!(!p.check("send_email", &tracker, &ctx));
    }

    #[test]
    fn always_denies_blocked_domain_even_when_recipient_is_not_untrusted() {
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"to": "attacker@evil.com"});
        let ctx = PolicyContext::new("send_email").with_arguments(&args);
        assert!(!policy().check("send_email", &tracker, &ctx));
    }

    #[test]
    fn denies_if_any_of_multiple_untrusted_recipients_is_disallowed() {
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"to": ["alice@company.com", "rando@example.com"]});
        let caps = untrusted_to();
        let ctx = PolicyContext::new("send_email")
            .with_arguments(&args)
            .with_argument_capabilities(&caps);
        assert!(!policy().check("send_email", &tracker, &ctx));
    }

    #[test]
    fn ignores_other_operations() {
        let tracker = CapabilityTracker::new();
        let ctx = PolicyContext::new("read_file");
        assert!(policy().check("read_file", &tracker, &ctx));
    }
}
