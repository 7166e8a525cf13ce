//! Tool registry (spec.md §4.6).
//!
//! Grounded on `CaMeLToolRegistry` in
//! `examples/original_source/camel/tools.py` (the wrap/schema/capabilities
//! shape) and on `examples/pycckuu-wintermute/src/tools/registry.rs` (the
//! registry API surface: `get`, lookup by name, a fixed registration path
//! rather than the teacher's file-watcher hot reload, which this runtime
//! has no use for).

use std::collections::HashMap;

use thiserror::Error;

use crate::algebra::CapabilitySet;
use crate::interpreter::eval::CallArg;
use crate::interpreter::{InterpreterError, Labeled, ToolInvoker, Value};
use crate::policy::PolicyContext;
use crate::tracker::CapabilityTracker;

/// A tool's concrete implementation: JSON arguments in, JSON result or
/// error out. Kept as a boxed closure so tests can register stand-ins
/// without a full tool struct.
pub type ToolFn = Box<dyn Fn(&serde_json::Value) -> Result<serde_json::Value, ToolError> + Send + Sync>;

/// Errors a tool invocation can produce.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The named tool is not registered.
    #[error("unknown tool: {0}")]
    NotFound(String),
    /// The tool's own logic failed.
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
    /// The tool required human approval and it was withheld.
    #[error("approval denied for tool: {0}")]
    ApprovalDenied(String),
    /// Registration was refused because the name is already registered
    /// from a different source (shadowing).
    #[error("tool '{0}' is already registered from a different source")]
    ShadowingDenied(String),
    /// A catch-all for failures surfaced from elsewhere (e.g. the
    /// interpreter) that do not have a more specific `ToolError` variant.
    #[error("{0}")]
    Other(String),
}

/// Approves or denies a tool call that has been flagged as requiring human
/// sign-off. Grounded on `require_user_approval` in
/// `examples/original_source/camel/tools.py`; simplified to a synchronous
/// call since a single interpreter run never needs the teacher's
/// `tokio::sync::oneshot`-based out-of-band queue
/// (`examples/pycckuu-wintermute/src/kernel/approval.rs`).
pub trait ApprovalOracle: Send + Sync {
    /// `true` if the human approved `action` given `message`.
    fn approve(&self, message: &str, action: &str) -> bool;
}

/// An oracle that always approves; used in tests and non-interactive runs
/// where approval gating is not under test.
pub struct AlwaysApprove;
impl ApprovalOracle for AlwaysApprove {
    fn approve(&self, _message: &str, _action: &str) -> bool {
        true
    }
}

/// An oracle that always denies.
pub struct AlwaysDeny;
impl ApprovalOracle for AlwaysDeny {
    fn approve(&self, _message: &str, _action: &str) -> bool {
        false
    }
}

/// How a tool's output should be labelled. Most tools derive their output
/// capabilities from their inputs; a handful of pure-trusted sources (e.g.
/// reading a value the orchestrator itself seeded) declare a fixed set.
pub enum OutputCapabilities {
    /// Output capabilities are `derive_from` the merged input capabilities.
    DerivedFromInputs,
    /// Output always carries exactly this fixed capability set.
    Fixed(CapabilitySet),
}

struct ToolDefinition {
    wrapper: ToolFn,
    schema: serde_json::Value,
    output_caps: OutputCapabilities,
    requires_approval: bool,
}

/// The set of tools available to a running program, plus the approval
/// oracle gating any tool marked `requires_approval`.
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
    approval_oracle: Box<dyn ApprovalOracle>,
}

impl ToolRegistry {
    /// An empty registry using the given approval oracle.
    pub fn new(approval_oracle: Box<dyn ApprovalOracle>) -> Self {
        Self {
            tools: HashMap::new(),
            approval_oracle,
        }
    }

    /// Register a tool. `source` names the origin of this registration
    /// (e.g. `"builtin"`, `"mcp:finance-server"`) and is checked against
    /// the tracker's [`crate::policy::ToolShadowingDetector`], if one is
    /// registered, before the tool is added.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        source: &str,
        wrapper: ToolFn,
        schema: serde_json::Value,
        output_caps: OutputCapabilities,
        requires_approval: bool,
        tracker: &CapabilityTracker,
    ) -> Result<(), ToolError> {
        let name = name.into();
        let args = serde_json::json!({ "source": source });
        let ctx = PolicyContext::new("register_tool").with_tool(&name).with_arguments(&args);
        if tracker.check("register_tool", &ctx).is_err() {
            return Err(ToolError::ShadowingDenied(name));
        }
        self.tools.insert(
            name,
            ToolDefinition {
                wrapper,
                schema,
                output_caps,
                requires_approval,
            },
        );
        Ok(())
    }

    /// The JSON schema describing every registered tool, for use building
    /// the planner's system prompt.
    pub fn schemas(&self) -> HashMap<&str, &serde_json::Value> {
        self.tools.iter().map(|(name, def)| (name.as_str(), &def.schema)).collect()
    }

    /// Whether a tool by this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The approval oracle this registry was built with, shared with the
    /// orchestrator's special functions (e.g. `require_user_approval`).
    pub fn approval_oracle(&self) -> &dyn ApprovalOracle {
        self.approval_oracle.as_ref()
    }
}

pub(crate) fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
    }
}

pub(crate) fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let mut map = std::collections::BTreeMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), json_to_value(v));
            }
            Value::Map(map)
        }
    }
}

impl ToolInvoker for ToolRegistry {
    fn known_functions(&self) -> std::collections::HashSet<String> {
        self.tools.keys().cloned().collect()
    }

    fn invoke(
        &self,
        name: &str,
        args: Vec<CallArg>,
        tracker: &mut CapabilityTracker,
    ) -> Result<Labeled, InterpreterError> {
        let def = self
            .tools
            .get(name)
            .ok_or_else(|| InterpreterError::ToolFailure(ToolError::NotFound(name.to_string()).to_string()))?;

        let merged_input_caps = CapabilitySet::derive_from(args.iter().map(|a| &a.labeled.capabilities));
        let identifiers: Vec<&str> = args.iter().filter_map(|a| a.identifier.as_deref()).collect();

        // Per-argument capabilities, keyed by the tool's declared argument
        // name, so a policy can gate on the taint of one specific argument
        // (e.g. `EmailRecipientPolicy` on `"to"`) instead of the call's
        // merged input taint. A keyword call supplies names directly; a
        // positional call is zipped against the tool's schema `args` list.
        let mut argument_caps: HashMap<String, CapabilitySet> = HashMap::new();
        if args.iter().any(|a| a.keyword.is_some()) {
            for arg in &args {
                if let Some(keyword) = &arg.keyword {
                    argument_caps.insert(keyword.clone(), arg.labeled.capabilities.clone());
                }
            }
        } else if let Some(names) = def.schema.get("args").and_then(|v| v.as_array()) {
            for (arg_name, arg) in names.iter().filter_map(|v| v.as_str()).zip(args.iter()) {
                argument_caps.insert(arg_name.to_string(), arg.labeled.capabilities.clone());
            }
        }

        // A call with any keyword argument builds a JSON object from the
        // keyword names (`send_email(to=recipient, body=text)`); otherwise
        // tools conventionally take either no arguments or a single map
        // literal of keyword arguments (`send_email({"to": ..., "body": ...})`),
        // so a solitary positional argument is passed through as-is rather
        // than wrapped in a one-element array.
        let json_args = if args.iter().any(|a| a.keyword.is_some()) {
            let mut obj = serde_json::Map::new();
            for arg in &args {
                if let Some(keyword) = &arg.keyword {
                    obj.insert(keyword.clone(), value_to_json(&arg.labeled.value));
                }
            }
            serde_json::Value::Object(obj)
        } else {
            match args.as_slice() {
                [] => serde_json::json!({}),
                [single] => value_to_json(&single.labeled.value),
                many => serde_json::Value::Array(many.iter().map(|a| value_to_json(&a.labeled.value)).collect()),
            }
        };

        let ctx = PolicyContext::new(name)
            .with_tool(name)
            .with_arguments(&json_args)
            .with_identifiers(identifiers)
            .with_input_capabilities(&merged_input_caps)
            .with_argument_capabilities(&argument_caps);
        tracker
            .check(name, &ctx)
            .map_err(|_| InterpreterError::PolicyDenied(name.to_string()))?;

        if def.requires_approval && !self.approval_oracle.approve(&json_args.to_string(), name) {
            return Err(InterpreterError::PolicyDenied(name.to_string()));
        }

        let result = (def.wrapper)(&json_args).map_err(|e| InterpreterError::ToolFailure(e.to_string()))?;

        let capabilities = match &def.output_caps {
            OutputCapabilities::DerivedFromInputs => merged_input_caps,
            OutputCapabilities::Fixed(caps) => caps.clone(),
        };

        Ok(Labeled {
            value: json_to_value(&result),
            capabilities,
        })
    }
}
