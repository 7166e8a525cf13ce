//! Restricted expression-language interpreter (spec.md §4.4).
//!
//! Three independent passes — parse, validate, evaluate — so that
//! `Parsed -> Validated` is an observable gate a caller can stop at
//! without ever reaching evaluation. Grounded throughout on
//! `examples/original_source/camel/interpreter.py`.

pub mod ast;
pub mod eval;
pub mod parser;
pub mod validator;

use thiserror::Error;

pub use ast::{Program, Value};
pub use eval::{Cancellation, Evaluator, ExecutionState, Labeled, ToolInvoker};
pub use eval::CallArg;

/// Errors raised while parsing, validating, or evaluating a program.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterpreterError {
    /// The source used a keyword that names a forbidden construct
    /// (`import`, `class`, `lambda`, `try`, `for`, `while`, `global`,
    /// `nonlocal`, `async`, `await`, and similar).
    #[error("forbidden construct: {0}")]
    ForbiddenConstruct(String),

    /// The tokenizer or parser encountered a token it does not accept.
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    /// The source ended in the middle of a token or construct.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A call referenced a function name that was not registered.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// An expression nested deeper than the validator allows.
    #[error("maximum expression nesting depth exceeded")]
    MaxNestingDepthExceeded,

    /// A name was referenced before it was assigned.
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// An operation was applied to operands of the wrong type.
    #[error("type error: {0}")]
    TypeError(String),

    /// A policy denied a call during evaluation.
    #[error("policy denied call to: {0}")]
    PolicyDenied(String),

    /// A tool invoked during evaluation failed.
    #[error("tool failure: {0}")]
    ToolFailure(String),

    /// A model-backed special function (e.g. the quarantined extractor)
    /// failed during evaluation.
    #[error("model failure: {0}")]
    ModelFailure(String),

    /// The quarantined extractor's output did not satisfy its declared
    /// schema.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// Evaluation was stopped by a [`eval::Cancellation`] signal observed
    /// between statements.
    #[error("evaluation cancelled")]
    Cancelled,
}

/// The outcome of a full `parse -> validate -> evaluate` run.
#[derive(Debug)]
pub struct ExecutionResult {
    /// The final lifecycle state.
    pub state: ExecutionState,
    /// The value returned by the program, if evaluation completed.
    pub value: Option<Value>,
}

/// Parse, validate, and evaluate `source` against `tracker` and `invoker`
/// in one call. This is the entry point the orchestrator uses once it has
/// a generated program to run; callers that need to stop after validation
/// (e.g. to report a parse/validate error without ever evaluating) should
/// call [`parser::parse`] and [`validator::validate`] directly instead.
pub fn run(
    source: &str,
    tracker: &mut crate::tracker::CapabilityTracker,
    invoker: &dyn ToolInvoker,
) -> Result<ExecutionResult, InterpreterError> {
    run_cancellable(source, tracker, invoker, None)
}

/// As [`run`], but accepts an optional cooperative [`Cancellation`] signal
/// the evaluator checks between statements.
pub fn run_cancellable(
    source: &str,
    tracker: &mut crate::tracker::CapabilityTracker,
    invoker: &dyn ToolInvoker,
    cancellation: Option<Cancellation>,
) -> Result<ExecutionResult, InterpreterError> {
    let program = parser::parse(source)?;
    validator::validate(&program, &invoker.known_functions())?;
    let mut evaluator = Evaluator::new(tracker, invoker);
    if let Some(cancellation) = cancellation {
        evaluator = evaluator.with_cancellation(cancellation);
    }
    match evaluator.run(&program) {
        Ok(labeled) => Ok(ExecutionResult {
            state: evaluator.state(),
            value: Some(labeled.value),
        }),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::CapabilityTracker;
    use std::collections::HashSet;

    struct NoopInvoker;
    impl ToolInvoker for NoopInvoker {
        fn known_functions(&self) -> HashSet<String> {
            HashSet::new()
        }
        fn invoke(&self, name: &str, _args: Vec<eval::CallArg>, _tracker: &mut CapabilityTracker) -> Result<Labeled, InterpreterError> {
            Err(InterpreterError::UnknownFunction(name.to_string()))
        }
    }

    #[test]
    fn full_pipeline_runs_a_simple_program() {
        let mut tracker = CapabilityTracker::new();
        let invoker = NoopInvoker;
        let result = run("x = 1 + 2; return x;", &mut tracker, &invoker).unwrap();
        assert_eq!(result.state, ExecutionState::Completed);
        assert_eq!(result.value, Some(Value::Int(3)));
    }

    #[test]
    fn full_pipeline_stops_at_validation_for_unknown_call() {
        let mut tracker = CapabilityTracker::new();
        let invoker = NoopInvoker;
        let err = run("x = delete_everything();", &mut tracker, &invoker).unwrap_err();
        assert!(matches!(err, InterpreterError::UnknownFunction(f) if f == "delete_everything"));
    }

    #[test]
    fn full_pipeline_rejects_forbidden_construct_before_validation() {
        let mut tracker = CapabilityTracker::new();
        let invoker = NoopInvoker;
        let err = run("import os;", &mut tracker, &invoker).unwrap_err();
        assert!(matches!(err, InterpreterError::ForbiddenConstruct(_)));
    }
}
