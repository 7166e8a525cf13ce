//! Dual-principal orchestrator (spec.md §4.5).
//!
//! Ties the privileged planner, the quarantined extractor, the tool
//! registry, and the interpreter together into the five-step protocol:
//! seed the request as trusted, have the planner generate a program from
//! tool schemas alone, validate and evaluate that program, bridge any
//! `query_quarantined_llm` calls to the extractor, and return the final
//! value. Grounded on `CaMeLSystem.execute` in
//! `examples/original_source/camel/core.py`, with the planner/extractor
//! split itself grounded on `examples/pycckuu-wintermute/src/kernel/planner.rs`
//! and `src/kernel/inference.rs`.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::algebra::{Capability, CapabilitySet};
use crate::interpreter::eval::CallArg;
use crate::interpreter::{self, Cancellation, ExecutionState, InterpreterError, Labeled, ToolInvoker, Value};
use crate::policy::PolicyError;
use crate::registry::{value_to_json, ApprovalOracle, ToolError, ToolRegistry};
use crate::schema::{self, ExtractorSchema};
use crate::tracker::CapabilityTracker;

/// Errors raised while orchestrating a single `execute` call.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A variable or tool name the generated program referenced does not
    /// exist.
    #[error("lookup error: {0}")]
    Lookup(String),
    /// The extractor's output failed schema validation.
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    /// The planner or extractor backend failed.
    #[error("model failure: {0}")]
    ModelFailure(String),
    /// Execution was cancelled cooperatively between statements.
    #[error("execution cancelled")]
    Cancelled,
    /// The generated program failed to parse, validate, or evaluate.
    #[error("interpreter error: {0}")]
    Interpreter(#[from] InterpreterError),
    /// A policy denied an operation outside of interpreter evaluation.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    /// A tool invocation failed outside of interpreter evaluation.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

/// The privileged principal. Sees the trusted user request and the tool
/// registry's schemas only — it never sees the content of any untrusted
/// payload a tool might later return (Invariant E, spec.md §4.5).
#[async_trait]
pub trait Planner: Send + Sync {
    /// Generate a restricted-language program that satisfies
    /// `user_request`, given the schemas of the tools available to it.
    async fn plan(
        &self,
        user_request: &str,
        tool_schemas: &HashMap<String, serde_json::Value>,
    ) -> Result<String, OrchestratorError>;
}

/// The quarantined principal. Sees untrusted payload content but has no
/// tool access and must return a schema-validated scalar; its output is
/// always stamped `UNTRUSTED` regardless of what it produces.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract a value satisfying `schema` from `payload`, following
    /// `instruction`. Must never follow imperative instructions found
    /// inside `payload` itself.
    async fn extract(
        &self,
        payload: &str,
        schema: ExtractorSchema,
        instruction: &str,
    ) -> Result<String, OrchestratorError>;
}

/// A planner that always returns the same fixed program, for tests and
/// scripted demonstrations where no real model backend is wired in.
pub struct ScriptedPlanner {
    program: String,
}

impl ScriptedPlanner {
    /// Build a planner that always emits `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(
        &self,
        _user_request: &str,
        _tool_schemas: &HashMap<String, serde_json::Value>,
    ) -> Result<String, OrchestratorError> {
        Ok(self.program.clone())
    }
}

/// An extractor that always returns the same fixed response, for tests.
pub struct ScriptedExtractor {
    response: String,
}

impl ScriptedExtractor {
    /// Build an extractor that always returns `response`.
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, _payload: &str, _schema: ExtractorSchema, _instruction: &str) -> Result<String, OrchestratorError> {
        Ok(self.response.clone())
    }
}

fn parse_schema_name(name: &str) -> Option<ExtractorSchema> {
    match name {
        "email" => Some(ExtractorSchema::Email),
        "string" => Some(ExtractorSchema::String),
        "filename" => Some(ExtractorSchema::Filename),
        "integer" => Some(ExtractorSchema::Integer),
        _ => None,
    }
}

fn expect_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, InterpreterError> {
    match value {
        Value::Str(s) => Ok(s.as_str()),
        _ => Err(InterpreterError::TypeError(format!("{what} must be a string"))),
    }
}

/// Dispatches interpreter calls to either the tool registry or one of the
/// two orchestrator special functions: `query_quarantined_llm` (bridges to
/// the [`Extractor`]) and `require_user_approval` (bridges to the
/// [`ApprovalOracle`]). Grounded on `_query_quarantined_llm` and
/// `_require_user_approval` in `examples/original_source/camel/core.py`.
struct CompositeInvoker<'a> {
    registry: &'a ToolRegistry,
    extractor: &'a dyn Extractor,
    approval_oracle: &'a dyn ApprovalOracle,
}

impl<'a> ToolInvoker for CompositeInvoker<'a> {
    fn known_functions(&self) -> std::collections::HashSet<String> {
        let mut functions = self.registry.known_functions();
        functions.insert("query_quarantined_llm".to_string());
        functions.insert("require_user_approval".to_string());
        functions
    }

    fn invoke(&self, name: &str, args: Vec<CallArg>, tracker: &mut CapabilityTracker) -> Result<Labeled, InterpreterError> {
        match name {
            "query_quarantined_llm" => self.invoke_quarantined_llm(args),
            "require_user_approval" => self.invoke_require_approval(args),
            _ => self.registry.invoke(name, args, tracker),
        }
    }
}

impl<'a> CompositeInvoker<'a> {
    fn invoke_quarantined_llm(&self, args: Vec<CallArg>) -> Result<Labeled, InterpreterError> {
        if args.len() != 3 {
            return Err(InterpreterError::TypeError(
                "query_quarantined_llm expects (payload, schema, instruction)".to_string(),
            ));
        }
        let payload = expect_str(&args[0].labeled.value, "payload")?;
        let schema_name = expect_str(&args[1].labeled.value, "schema")?;
        let instruction = expect_str(&args[2].labeled.value, "instruction")?;
        let schema = parse_schema_name(schema_name)
            .ok_or_else(|| InterpreterError::ModelFailure(format!("unknown extractor schema: {schema_name}")))?;

        // A single interpreter run is synchronous end to end; bridging to
        // the async extractor here with `tokio::task::block_in_place` would
        // panic on the current-thread runtime `#[tokio::test]` defaults to.
        // `pollster::block_on` drives the future on its own minimal executor
        // instead of delegating to the ambient Tokio runtime, so it never
        // panics regardless of runtime flavor.
        let raw = pollster::block_on(self.extractor.extract(payload, schema, instruction))
            .map_err(|e| InterpreterError::ModelFailure(e.to_string()))?;

        let validated =
            schema::validate(schema, &raw).map_err(|e| InterpreterError::SchemaViolation(e.to_string()))?;

        // Invariant: extractor output is always untrusted, regardless of
        // how trusted the data it was derived from was.
        let capabilities = CapabilitySet::from_capabilities([Capability::untrusted("extractor")]);
        Ok(Labeled {
            value: Value::Str(validated),
            capabilities,
        })
    }

    fn invoke_require_approval(&self, args: Vec<CallArg>) -> Result<Labeled, InterpreterError> {
        if args.len() != 1 {
            return Err(InterpreterError::TypeError("require_user_approval expects (message)".to_string()));
        }
        let message = expect_str(&args[0].labeled.value, "message")?;
        let approved = self.approval_oracle.approve(message, "require_user_approval");
        Ok(Labeled {
            value: Value::Bool(approved),
            capabilities: CapabilitySet::new(),
        })
    }
}

/// Ties the capability tracker, tool registry, planner, and extractor
/// together and runs the end-to-end request protocol.
pub struct Orchestrator {
    tracker: CapabilityTracker,
    registry: ToolRegistry,
    planner: Box<dyn Planner>,
    extractor: Box<dyn Extractor>,
    cancellation: Option<Cancellation>,
}

impl Orchestrator {
    /// Build an orchestrator from its four components. The tracker should
    /// already have its policies registered; the registry should already
    /// have its tools registered.
    pub fn new(
        tracker: CapabilityTracker,
        registry: ToolRegistry,
        planner: Box<dyn Planner>,
        extractor: Box<dyn Extractor>,
    ) -> Self {
        Self {
            tracker,
            registry,
            planner,
            extractor,
            cancellation: None,
        }
    }

    /// Attach a cooperative cancellation signal. [`Self::execute`] checks it
    /// between statements of the generated program and stops with
    /// [`OrchestratorError::Cancelled`] once it is set.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Seed a trusted value into the tracker under `identifier`, for data
    /// that originates from the operator or the system itself.
    pub fn seed_trusted(&mut self, identifier: impl Into<String>, source: &str) {
        let mut caps = CapabilitySet::new();
        caps.add(Capability::trusted(source));
        self.tracker.assign(identifier, caps);
    }

    /// Seed an untrusted value into the tracker under `identifier`, for
    /// data that originates from outside the trust boundary (an inbound
    /// email, a support ticket, a web page).
    pub fn seed_untrusted(&mut self, identifier: impl Into<String>, source: &str) {
        let mut caps = CapabilitySet::new();
        caps.add(Capability::untrusted(source));
        self.tracker.assign(identifier, caps);
    }

    /// The tracker backing this orchestrator, for introspection in tests
    /// and CLI diagnostics.
    pub fn tracker(&self) -> &CapabilityTracker {
        &self.tracker
    }

    /// Run the five-step protocol for a single trusted user request:
    /// seed it as trusted, ask the planner for a program, validate and
    /// evaluate that program against the registry and tracker, bridging
    /// any extractor calls, and render the result as a string.
    pub async fn execute(&mut self, user_request: &str) -> Result<String, OrchestratorError> {
        self.seed_trusted("user_request", "user");

        let schemas: HashMap<String, serde_json::Value> = self
            .registry
            .schemas()
            .into_iter()
            .map(|(name, schema)| (name.to_string(), schema.clone()))
            .collect();
        let program_source = self.planner.plan(user_request, &schemas).await?;

        let invoker = CompositeInvoker {
            registry: &self.registry,
            extractor: self.extractor.as_ref(),
            approval_oracle: self.registry.approval_oracle(),
        };

        let result = interpreter::run_cancellable(&program_source, &mut self.tracker, &invoker, self.cancellation.clone())?;
        match result.state {
            ExecutionState::Completed => Ok(render(&result.value.unwrap_or(Value::Null))),
            other => Err(OrchestratorError::ModelFailure(format!("unexpected terminal state: {other:?}"))),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => value_to_json(other).to_string(),
    }
}
