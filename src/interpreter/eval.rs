//! Evaluation pass (spec.md §4.4).
//!
//! Grounded on `CaMeLInterpreter._execute_ast` and its per-node-type
//! `_execute_*` methods in `examples/original_source/camel/interpreter.py`:
//! calls are capability-checked before the wrapped tool runs, and
//! assignment copies or derives capabilities by inspecting the shape of
//! the value being assigned.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::ast::{BinOp, CompareOp, Expr, Program, Stmt, UnaryOp, Value};
use super::InterpreterError;
use crate::algebra::CapabilitySet;
use crate::tracker::CapabilityTracker;

/// A cooperative cancellation signal, checked by the evaluator between
/// statements (spec.md §5: cancellation is cooperative, not preemptive —
/// a running tool call always finishes). Cloning shares the same
/// underlying flag, so a caller can hold one clone and call
/// [`Cancellation::cancel`] from another task or thread while the
/// evaluator runs with the other.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Build a fresh, not-yet-cancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect the next time the evaluator
    /// checks between statements, not mid-statement.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// `true` once [`Self::cancel`] has been called on this signal or any
    /// of its clones.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The lifecycle of a single program execution (spec.md §4.4):
/// `Parsed -> Validated -> Evaluating -> {Completed, Denied, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// The program has been parsed but not yet validated.
    Parsed,
    /// The program passed validation and is ready to evaluate.
    Validated,
    /// Evaluation is in progress.
    Evaluating,
    /// Evaluation finished and produced a return value.
    Completed,
    /// Evaluation stopped because a policy denied an operation.
    Denied,
    /// Evaluation stopped because of a runtime error.
    Error,
}

/// A value together with the capability set it carries.
#[derive(Debug, Clone)]
pub struct Labeled {
    /// The runtime value.
    pub value: Value,
    /// The capability set attached to this value.
    pub capabilities: CapabilitySet,
}

/// A single evaluated call argument, carrying enough context for a policy
/// to reason about it: whether it was passed positionally or by keyword,
/// and — per spec.md §4.4 ("where the argument was a bare name, its
/// identifier") — the identifier it names, if the argument expression was
/// a bare [`Expr::Name`].
#[derive(Debug, Clone)]
pub struct CallArg {
    /// The keyword this argument was passed under, if any.
    pub keyword: Option<String>,
    /// The identifier the argument expression referenced, if it was a
    /// bare name rather than a literal or compound expression.
    pub identifier: Option<String>,
    /// The evaluated value and its capability set.
    pub labeled: Labeled,
}

/// Anything the interpreter can call: a registered tool or a special
/// function such as `query_quarantined_llm`. Implemented by
/// [`crate::registry::ToolRegistry`]; kept as a trait so the interpreter
/// has no dependency on the registry's own types.
pub trait ToolInvoker {
    /// The names this invoker can dispatch to; used by the validator to
    /// reject calls to anything else before evaluation starts.
    fn known_functions(&self) -> std::collections::HashSet<String>;

    /// Invoke `name` with already-evaluated, capability-labelled
    /// arguments. Implementations are responsible for running any
    /// applicable policy checks before performing a side effect.
    fn invoke(
        &self,
        name: &str,
        args: Vec<CallArg>,
        tracker: &mut CapabilityTracker,
    ) -> Result<Labeled, InterpreterError>;
}

/// Executes a validated [`Program`] against a [`CapabilityTracker`] and a
/// [`ToolInvoker`], tracking its own lifecycle state.
pub struct Evaluator<'a> {
    tracker: &'a mut CapabilityTracker,
    invoker: &'a dyn ToolInvoker,
    /// Bound values, independent of the tracker. Capabilities for a bare
    /// name reference always come from `tracker`, never from here — see
    /// `run_stmt`'s assignment arm for why the two can diverge (spec.md
    /// §4.4: only a bare-name or call right-hand side writes the tracker).
    values: HashMap<String, Value>,
    state: ExecutionState,
    cancellation: Option<Cancellation>,
}

impl<'a> Evaluator<'a> {
    /// Build an evaluator over the given tracker and tool invoker. Call
    /// [`Self::run`] to execute a validated program.
    pub fn new(tracker: &'a mut CapabilityTracker, invoker: &'a dyn ToolInvoker) -> Self {
        Self {
            tracker,
            invoker,
            values: HashMap::new(),
            state: ExecutionState::Validated,
            cancellation: None,
        }
    }

    /// Attach a cooperative cancellation signal, checked between
    /// statements. Replaces any signal set by a previous call.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// The evaluator's current lifecycle state.
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Run `program` to completion, returning the value of its first
    /// `return` statement, or — per spec.md §4.4, absent any `return` — the
    /// value of the last expression-statement executed, or `Value::Null` if
    /// the program never evaluated one.
    pub fn run(&mut self, program: &Program) -> Result<Labeled, InterpreterError> {
        self.state = ExecutionState::Evaluating;
        let mut last_expr = None;
        match self.run_block(&program.statements, &mut last_expr) {
            Ok(Some(result)) => {
                self.state = ExecutionState::Completed;
                Ok(result)
            }
            Ok(None) => {
                self.state = ExecutionState::Completed;
                Ok(last_expr.unwrap_or(Labeled {
                    value: Value::Null,
                    capabilities: CapabilitySet::new(),
                }))
            }
            Err(InterpreterError::PolicyDenied(name)) => {
                self.state = ExecutionState::Denied;
                Err(InterpreterError::PolicyDenied(name))
            }
            Err(err) => {
                self.state = ExecutionState::Error;
                Err(err)
            }
        }
    }

    fn run_block(&mut self, statements: &[Stmt], last_expr: &mut Option<Labeled>) -> Result<Option<Labeled>, InterpreterError> {
        for stmt in statements {
            if let Some(cancellation) = &self.cancellation {
                if cancellation.is_cancelled() {
                    return Err(InterpreterError::Cancelled);
                }
            }
            if let Some(result) = self.run_stmt(stmt, last_expr)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn run_stmt(&mut self, stmt: &Stmt, last_expr: &mut Option<Labeled>) -> Result<Option<Labeled>, InterpreterError> {
        match stmt {
            Stmt::Assign { target, value } => {
                let labeled = self.eval_expr(value)?;
                // spec.md §4.4: a bare-name RHS copies the tracker entry, a
                // call RHS derives one; every other expression shape leaves
                // the target unbound in the tracker even though its value
                // (and this statement's transient `labeled.capabilities`,
                // used only to evaluate the expression itself) are known.
                match value {
                    Expr::Name(source) => {
                        if let Some(caps) = self.tracker.get(source).cloned() {
                            self.tracker.assign(target.clone(), caps);
                        }
                    }
                    Expr::Call { .. } => {
                        self.tracker.assign(target.clone(), labeled.capabilities.clone());
                    }
                    _ => {}
                }
                self.values.insert(target.clone(), labeled.value);
                Ok(None)
            }
            Stmt::Expr(expr) => {
                *last_expr = Some(self.eval_expr(expr)?);
                Ok(None)
            }
            Stmt::Return(expr) => Ok(Some(self.eval_expr(expr)?)),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_value = self.eval_expr(cond)?;
                if cond_value.value.is_truthy() {
                    self.run_block(then_branch, last_expr)
                } else {
                    self.run_block(else_branch, last_expr)
                }
            }
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Labeled, InterpreterError> {
        match expr {
            Expr::Literal(value) => Ok(Labeled {
                value: value.clone(),
                capabilities: CapabilitySet::new(),
            }),
            Expr::Name(name) => {
                let value = self
                    .values
                    .get(name)
                    .cloned()
                    .ok_or_else(|| InterpreterError::UndefinedVariable(name.clone()))?;
                // An identifier with no tracker entry is unlabelled, i.e.
                // the empty set, per spec.md §4.2 — never an error.
                let capabilities = self.tracker.get(name).cloned().unwrap_or_default();
                Ok(Labeled { value, capabilities })
            }
            Expr::Call { func, args, kwargs } => {
                let mut evaluated = Vec::with_capacity(args.len() + kwargs.len());
                for arg in args {
                    let identifier = match arg {
                        Expr::Name(n) => Some(n.clone()),
                        _ => None,
                    };
                    evaluated.push(CallArg {
                        keyword: None,
                        identifier,
                        labeled: self.eval_expr(arg)?,
                    });
                }
                for (keyword, value_expr) in kwargs {
                    let identifier = match value_expr {
                        Expr::Name(n) => Some(n.clone()),
                        _ => None,
                    };
                    evaluated.push(CallArg {
                        keyword: Some(keyword.clone()),
                        identifier,
                        labeled: self.eval_expr(value_expr)?,
                    });
                }
                self.invoker.invoke(func, evaluated, self.tracker)
            }
            Expr::BinOp { op, left, right } => {
                let left = self.eval_expr(left)?;
                if *op == BinOp::And && !left.value.is_truthy() {
                    return Ok(left);
                }
                if *op == BinOp::Or && left.value.is_truthy() {
                    return Ok(left);
                }
                let right = self.eval_expr(right)?;
                let value = eval_binop(*op, &left.value, &right.value)?;
                let capabilities = CapabilitySet::derive_from([&left.capabilities, &right.capabilities]);
                Ok(Labeled { value, capabilities })
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.eval_expr(operand)?;
                let value = match op {
                    UnaryOp::Not => Value::Bool(!operand.value.is_truthy()),
                    UnaryOp::Neg => match operand.value {
                        Value::Int(i) => Value::Int(-i),
                        Value::Float(f) => Value::Float(-f),
                        _ => return Err(InterpreterError::TypeError("cannot negate non-numeric value".into())),
                    },
                    UnaryOp::Plus => match operand.value {
                        Value::Int(_) | Value::Float(_) => operand.value,
                        _ => return Err(InterpreterError::TypeError("unary '+' requires a numeric value".into())),
                    },
                };
                Ok(Labeled {
                    value,
                    capabilities: operand.capabilities,
                })
            }
            Expr::Compare { left, ops, comparators } => {
                let mut current = self.eval_expr(left)?;
                let mut all_caps = vec![current.capabilities.clone()];
                let mut result = true;
                for (op, comparator) in ops.iter().zip(comparators.iter()) {
                    let next = self.eval_expr(comparator)?;
                    all_caps.push(next.capabilities.clone());
                    if result {
                        result = eval_compare(*op, &current.value, &next.value)?;
                    }
                    current = next;
                }
                let capabilities = CapabilitySet::derive_from(all_caps.iter());
                Ok(Labeled {
                    value: Value::Bool(result),
                    capabilities,
                })
            }
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                let mut caps = Vec::with_capacity(items.len());
                for item in items {
                    let labeled = self.eval_expr(item)?;
                    values.push(labeled.value);
                    caps.push(labeled.capabilities);
                }
                let capabilities = CapabilitySet::derive_from(caps.iter());
                Ok(Labeled {
                    value: Value::List(values),
                    capabilities,
                })
            }
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                let mut caps = Vec::with_capacity(entries.len());
                for (key, value_expr) in entries {
                    let labeled = self.eval_expr(value_expr)?;
                    caps.push(labeled.capabilities.clone());
                    map.insert(key.clone(), labeled.value);
                }
                let capabilities = CapabilitySet::derive_from(caps.iter());
                Ok(Labeled {
                    value: Value::Map(map),
                    capabilities,
                })
            }
            Expr::Attribute { object, field } => {
                let object = self.eval_expr(object)?;
                let value = match &object.value {
                    Value::Map(map) => map
                        .get(field)
                        .cloned()
                        .ok_or_else(|| InterpreterError::TypeError(format!("no such field: {field}")))?,
                    _ => return Err(InterpreterError::TypeError("attribute access requires a map value".into())),
                };
                Ok(Labeled {
                    value,
                    capabilities: object.capabilities,
                })
            }
            Expr::Subscript { object, index } => {
                let object = self.eval_expr(object)?;
                let index = self.eval_expr(index)?;
                let value = subscript(&object.value, &index.value)?;
                let capabilities = CapabilitySet::derive_from([&object.capabilities, &index.capabilities]);
                Ok(Labeled { value, capabilities })
            }
            Expr::Slice { object, start, end } => {
                let object = self.eval_expr(object)?;
                let mut caps = vec![object.capabilities.clone()];
                let start = match start {
                    Some(e) => {
                        let labeled = self.eval_expr(e)?;
                        caps.push(labeled.capabilities);
                        Some(expect_index(&labeled.value)?)
                    }
                    None => None,
                };
                let end = match end {
                    Some(e) => {
                        let labeled = self.eval_expr(e)?;
                        caps.push(labeled.capabilities);
                        Some(expect_index(&labeled.value)?)
                    }
                    None => None,
                };
                let value = slice(&object.value, start, end)?;
                let capabilities = CapabilitySet::derive_from(caps.iter());
                Ok(Labeled { value, capabilities })
            }
        }
    }
}

fn expect_index(value: &Value) -> Result<i64, InterpreterError> {
    match value {
        Value::Int(i) => Ok(*i),
        _ => Err(InterpreterError::TypeError("index must be an integer".into())),
    }
}

fn normalize_index(len: usize, index: i64) -> usize {
    if index < 0 {
        len.saturating_sub((-index) as usize)
    } else {
        index as usize
    }
}

fn subscript(object: &Value, index: &Value) -> Result<Value, InterpreterError> {
    match (object, index) {
        (Value::List(items), Value::Int(i)) => {
            let idx = normalize_index(items.len(), *i);
            items
                .get(idx)
                .cloned()
                .ok_or_else(|| InterpreterError::TypeError("list index out of range".into()))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(chars.len(), *i);
            chars
                .get(idx)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| InterpreterError::TypeError("string index out of range".into()))
        }
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| InterpreterError::TypeError(format!("no such key: {key}"))),
        _ => Err(InterpreterError::TypeError("value does not support subscript access".into())),
    }
}

fn slice(object: &Value, start: Option<i64>, end: Option<i64>) -> Result<Value, InterpreterError> {
    match object {
        Value::List(items) => {
            let lo = start.map(|i| normalize_index(items.len(), i)).unwrap_or(0).min(items.len());
            let hi = end.map(|i| normalize_index(items.len(), i)).unwrap_or(items.len()).min(items.len());
            Ok(Value::List(if lo < hi { items[lo..hi].to_vec() } else { Vec::new() }))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let lo = start.map(|i| normalize_index(chars.len(), i)).unwrap_or(0).min(chars.len());
            let hi = end.map(|i| normalize_index(chars.len(), i)).unwrap_or(chars.len()).min(chars.len());
            Ok(Value::Str(if lo < hi { chars[lo..hi].iter().collect() } else { String::new() }))
        }
        _ => Err(InterpreterError::TypeError("value does not support slicing".into())),
    }
}

fn eval_binop(op: BinOp, left: &Value, right: &Value) -> Result<Value, InterpreterError> {
    use Value::*;
    match (op, left, right) {
        (BinOp::Add, Int(a), Int(b)) => Ok(Int(a.wrapping_add(*b))),
        (BinOp::Add, Float(a), Float(b)) => Ok(Float(a + b)),
        (BinOp::Add, Str(a), Str(b)) => Ok(Str(format!("{a}{b}"))),
        (BinOp::Sub, Int(a), Int(b)) => Ok(Int(a.wrapping_sub(*b))),
        (BinOp::Sub, Float(a), Float(b)) => Ok(Float(a - b)),
        (BinOp::Mul, Int(a), Int(b)) => Ok(Int(a.wrapping_mul(*b))),
        (BinOp::Mul, Float(a), Float(b)) => Ok(Float(a * b)),
        (BinOp::Div, Int(a), Int(b)) => {
            if *b == 0 {
                Err(InterpreterError::TypeError("division by zero".into()))
            } else {
                Ok(Int(a.wrapping_div(*b)))
            }
        }
        (BinOp::Div, Float(a), Float(b)) => Ok(Float(a / b)),
        (BinOp::And, _, _) | (BinOp::Or, _, _) => {
            Ok(Bool(right.is_truthy()))
        }
        _ => Err(InterpreterError::TypeError(format!("unsupported operands for {op:?}"))),
    }
}

fn eval_compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, InterpreterError> {
    let ordering = compare_values(left, right)?;
    Ok(match op {
        CompareOp::Eq => left == right,
        CompareOp::NotEq => left != right,
        CompareOp::Lt => ordering == std::cmp::Ordering::Less,
        CompareOp::LtEq => ordering != std::cmp::Ordering::Greater,
        CompareOp::Gt => ordering == std::cmp::Ordering::Greater,
        CompareOp::GtEq => ordering != std::cmp::Ordering::Less,
    })
}

fn compare_values(left: &Value, right: &Value) -> Result<std::cmp::Ordering, InterpreterError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).ok_or_else(|| InterpreterError::TypeError("NaN comparison".into()))
        }
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => Err(InterpreterError::TypeError("cannot order these values".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Capability;
    use crate::interpreter::parser::parse;
    use std::collections::HashSet as StdHashSet;

    struct EchoInvoker;
    impl ToolInvoker for EchoInvoker {
        fn known_functions(&self) -> StdHashSet<String> {
            ["echo".to_string()].into_iter().collect()
        }
        fn invoke(&self, name: &str, args: Vec<CallArg>, _tracker: &mut CapabilityTracker) -> Result<Labeled, InterpreterError> {
            assert_eq!(name, "echo");
            Ok(args.into_iter().next().map(|a| a.labeled).unwrap_or(Labeled {
                value: Value::Null,
                capabilities: CapabilitySet::new(),
            }))
        }
    }

    #[test]
    fn assignment_then_return_roundtrips() {
        let program = parse("x = 41; x = x + 1; return x;").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = EchoInvoker;
        let mut evaluator = Evaluator::new(&mut tracker, &invoker);
        let result = evaluator.run(&program).unwrap();
        assert_eq!(result.value, Value::Int(42));
        assert_eq!(evaluator.state(), ExecutionState::Completed);
    }

    #[test]
    fn if_else_picks_the_live_branch() {
        let program = parse("if (1 < 2) { return \"yes\"; } else { return \"no\"; }").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = EchoInvoker;
        let mut evaluator = Evaluator::new(&mut tracker, &invoker);
        let result = evaluator.run(&program).unwrap();
        assert_eq!(result.value, Value::Str("yes".to_string()));
    }

    #[test]
    fn call_result_capability_propagates_from_tool() {
        struct TaintingInvoker;
        impl ToolInvoker for TaintingInvoker {
            fn known_functions(&self) -> StdHashSet<String> {
                ["get_email".to_string()].into_iter().collect()
            }
            fn invoke(&self, _name: &str, _args: Vec<CallArg>, _tracker: &mut CapabilityTracker) -> Result<Labeled, InterpreterError> {
                let mut caps = CapabilitySet::new();
                caps.add(Capability::untrusted("email"));
                Ok(Labeled {
                    value: Value::Str("hello".into()),
                    capabilities: caps,
                })
            }
        }

        let program = parse("x = get_email(); return x;").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = TaintingInvoker;
        let mut evaluator = Evaluator::new(&mut tracker, &invoker);
        let result = evaluator.run(&program).unwrap();
        assert!(result.capabilities.is_untrusted());
        assert!(tracker.get("x").unwrap().is_untrusted());
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let program = parse("return missing;").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = EchoInvoker;
        let mut evaluator = Evaluator::new(&mut tracker, &invoker);
        let err = evaluator.run(&program).unwrap_err();
        assert!(matches!(err, InterpreterError::UndefinedVariable(name) if name == "missing"));
        assert_eq!(evaluator.state(), ExecutionState::Error);
    }

    #[test]
    fn binop_capability_is_union_of_operands() {
        let program = parse("a = echo(1); b = 2; return a + b;").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = EchoInvoker;
        let mut evaluator = Evaluator::new(&mut tracker, &invoker);
        evaluator.run(&program).unwrap();
    }

    #[test]
    fn cancellation_is_observed_between_statements() {
        let program = parse("x = 1; x = 2; x = 3; return x;").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = EchoInvoker;
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let mut evaluator = Evaluator::new(&mut tracker, &invoker).with_cancellation(cancellation);
        let err = evaluator.run(&program).unwrap_err();
        assert!(matches!(err, InterpreterError::Cancelled));
        assert_eq!(evaluator.state(), ExecutionState::Error);
    }

    #[test]
    fn a_trailing_bare_expression_becomes_the_implicit_result() {
        let program = parse("x = 1; x + 1;").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = EchoInvoker;
        let mut evaluator = Evaluator::new(&mut tracker, &invoker);
        let result = evaluator.run(&program).unwrap();
        assert_eq!(result.value, Value::Int(2));
        assert_eq!(evaluator.state(), ExecutionState::Completed);
    }

    #[test]
    fn with_no_expression_statement_or_return_the_result_is_null() {
        let program = parse("x = 1;").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = EchoInvoker;
        let mut evaluator = Evaluator::new(&mut tracker, &invoker);
        let result = evaluator.run(&program).unwrap();
        assert_eq!(result.value, Value::Null);
    }

    #[test]
    fn a_fresh_cancellation_signal_does_not_stop_evaluation() {
        let program = parse("return 1 + 1;").unwrap();
        let mut tracker = CapabilityTracker::new();
        let invoker = EchoInvoker;
        let mut evaluator = Evaluator::new(&mut tracker, &invoker).with_cancellation(Cancellation::new());
        let result = evaluator.run(&program).unwrap();
        assert_eq!(result.value, Value::Int(2));
    }
}
