//! Grounded on `FileAccessPolicy` in
//! `examples/original_source/camel/capabilities.py`: a `read_file`/
//! `write_file` path is confined to an allow-listed set of prefixes only
//! when the path identifier is UNTRUSTED (spec.md §4.3); a trusted or
//! unlabelled path is allowed regardless of prefix.
use super::{Policy, PolicyContext};
use crate::tracker::CapabilityTracker;

/// Denies `read_file`/`write_file` operations whose path is UNTRUSTED and
/// not under one of the configured allowed prefixes.
pub struct FileAccessPolicy {
    allowed_prefixes: Vec<String>,
}

impl FileAccessPolicy {
    /// Build a policy from the given allowed path prefixes (e.g.
    /// `"/documents/"`).
    pub fn new(allowed_prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed_prefixes: allowed_prefixes.into_iter().collect(),
        }
    }

    fn path_allowed(&self, path: &str) -> bool {
        self.allowed_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Policy for FileAccessPolicy {
    fn name(&self) -> &str {
        "file_access_policy"
    }

    fn check(&self, operation: &str, _tracker: &CapabilityTracker, ctx: &PolicyContext<'_>) -> bool {
        if operation != "read_file" && operation != "write_file" {
            return true;
        }
        let Some(arguments) = ctx.arguments else {
            return true;
        };
        let Some(path) = arguments.get("path").and_then(|v| v.as_str()) else {
            return true;
        };
        let untrusted = ctx
            .argument_capabilities
            .and_then(|caps| caps.get("path"))
            .map(|caps| caps.is_untrusted())
            .unwrap_or(false);
        if !untrusted {
            return true;
        }
        self.path_allowed(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Capability, CapabilitySet};
    use std::collections::HashMap;

    fn policy() -> FileAccessPolicy {
        FileAccessPolicy::new(["/documents/".to_string(), "/shared/".to_string(), "/public/".to_string()])
    }

    fn untrusted_path() -> HashMap<String, CapabilitySet> {
        let mut caps = CapabilitySet::new();
        caps.add(Capability::untrusted("extractor"));
        HashMap::from([("path".to_string(), caps)])
    }

    #[test]
    fn allows_path_under_allowed_prefix() {
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"path": "/documents/report.pdf"});
        let caps = untrusted_path();
        let ctx = PolicyContext::new("read_file")
            .with_arguments(&args)
            .with_argument_capabilities(&caps);
        assert!(policy().check("read_file", &tracker, &ctx));
    }

    #[test]
    fn denies_untrusted_path_outside_allowed_prefixes() {
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"path": "/etc/passwd"});
        let caps = untrusted_path();
        let ctx = PolicyContext::new("read_file")
            .with_arguments(&args)
            .with_argument_capabilities(&caps);
        assert!(!policy().check("read_file", &tracker, &ctx));
    }

    #[test]
    fn applies_to_write_file_too() {
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"path": "/root/.ssh/authorized_keys"});
        let caps = untrusted_path();
        let ctx = PolicyContext::new("write_file")
            .with_arguments(&args)
            .with_argument_capabilities(&caps);
        assert!(!policy().check("write_file", &tracker, &ctx));
    }

    #[test]
    fn allows_trusted_path_outside_allowed_prefixes() {
        // No taint on "path" at all means the prefix requirement never
        // applies to this call.
        let tracker = CapabilityTracker::new();
        let args = serde_json::json!({"path": "/etc/passwd"});
        let ctx = PolicyContext::new("read_file").with_arguments(&args);
        assert!(policy().check("read_file", &tracker, &ctx));
    }

    #[test]
    fn ignores_unrelated_operations() {
        let tracker = CapabilityTracker::new();
        let ctx = PolicyContext::new("send_email");
        assert!(policy().check("send_email", &tracker, &ctx));
    }
}
