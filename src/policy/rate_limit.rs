//! Grounded on `RateLimiter` in
//! `examples/pycckuu-wintermute/src/agent/policy.rs`: a sliding window of
//! call timestamps per tool, gated with interior mutability so the policy
//! can be consulted through a shared `&self`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{Policy, PolicyContext};
use crate::tracker::CapabilityTracker;

/// Denies a tool call once it has been invoked more than `max_calls` times
/// within the trailing `window`, per tool name.
pub struct RateLimitPolicy {
    max_calls: usize,
    window: Duration,
    history: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimitPolicy {
    /// Build a policy allowing at most `max_calls` invocations of any single
    /// tool within `window`.
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            history: Mutex::new(HashMap::new()),
        }
    }
}

impl Policy for RateLimitPolicy {
    fn name(&self) -> &str {
        "rate_limit_policy"
    }

    fn check(&self, _operation: &str, _tracker: &CapabilityTracker, ctx: &PolicyContext<'_>) -> bool {
        let Some(tool_name) = ctx.tool_name else {
            return true;
        };
        let now = Instant::now();
        let mut history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let timestamps = history.entry(tool_name.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);
        if timestamps.len() >= self.max_calls {
            return false;
        }
        timestamps.push(now);
        true
    }
}
