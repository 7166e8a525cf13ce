//! Top-level error taxonomy (spec.md §7).
//!
//! Each component defines its own `thiserror` error enum; [`CamelError`]
//! aggregates them into the seven kinds the orchestrator and CLI reason
//! about and maps onto the process exit codes in spec.md §6.

use thiserror::Error;

use crate::interpreter::InterpreterError;
use crate::orchestrator::OrchestratorError;
use crate::policy::PolicyError;
use crate::registry::ToolError;

/// The unified error type returned by [`crate::orchestrator::Orchestrator::execute`].
#[derive(Debug, Error)]
pub enum CamelError {
    /// The generated program failed to parse, failed validation, or hit a
    /// malformed-program runtime error (undefined variable, type error).
    #[error("parse/validate error: {0}")]
    ParseValidate(InterpreterError),

    /// A variable or tool name referenced by the program does not exist.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// A policy denied an operation.
    #[error("policy denied operation: {0}")]
    PolicyDenial(#[from] PolicyError),

    /// An extractor's output failed schema validation.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// A tool invocation failed.
    #[error("tool failure: {0}")]
    ToolFailure(#[from] ToolError),

    /// The planner or extractor model backend failed.
    #[error("model failure: {0}")]
    ModelFailure(String),

    /// Execution was cancelled cooperatively between statements.
    #[error("execution cancelled")]
    Cancelled,
}

impl From<OrchestratorError> for CamelError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Lookup(msg) => CamelError::Lookup(msg),
            OrchestratorError::SchemaViolation(msg) => CamelError::SchemaViolation(msg),
            OrchestratorError::ModelFailure(msg) => CamelError::ModelFailure(msg),
            OrchestratorError::Cancelled => CamelError::Cancelled,
            OrchestratorError::Interpreter(e) => e.into(),
            OrchestratorError::Policy(e) => CamelError::PolicyDenial(e),
            OrchestratorError::Tool(e) => CamelError::ToolFailure(e),
        }
    }
}

/// Classifies an interpreter-level failure into the error kind the
/// orchestrator and CLI exit code actually care about: a policy denial
/// raised mid-evaluation is a denial (exit code 1), not a parse/validate
/// failure (exit code 2), even though both originate in the interpreter.
impl From<InterpreterError> for CamelError {
    fn from(err: InterpreterError) -> Self {
        match err {
            InterpreterError::PolicyDenied(operation) => CamelError::PolicyDenial(PolicyError::Denied {
                policy: "interpreter".to_string(),
                operation,
            }),
            InterpreterError::ToolFailure(msg) => CamelError::ToolFailure(ToolError::Other(msg)),
            InterpreterError::ModelFailure(msg) => CamelError::ModelFailure(msg),
            InterpreterError::SchemaViolation(msg) => CamelError::SchemaViolation(msg),
            InterpreterError::Cancelled => CamelError::Cancelled,
            other => CamelError::ParseValidate(other),
        }
    }
}

impl CamelError {
    /// The process exit code this error maps to (spec.md §6):
    /// `1` policy/schema denial, `2` parse/validate failure, `3` tool/model
    /// failure or cancellation.
    pub fn exit_code(&self) -> i32 {
        match self {
            CamelError::PolicyDenial(_) | CamelError::SchemaViolation(_) => 1,
            CamelError::ParseValidate(_) => 2,
            CamelError::Lookup(_)
            | CamelError::ToolFailure(_)
            | CamelError::ModelFailure(_)
            | CamelError::Cancelled => 3,
        }
    }
}
