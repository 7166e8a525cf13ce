//! Validation pass (spec.md §4.4): a second, independent walk of the AST
//! that must succeed before evaluation begins. The parser already refuses
//! forbidden syntax, so this pass is defense in depth: it rejects calls to
//! functions that were never registered and caps expression nesting depth.

use std::collections::HashSet;

use super::ast::{Expr, Program, Stmt};
use super::InterpreterError;

/// Expressions nested deeper than this are rejected, bounding the
/// evaluator's recursion depth regardless of program shape.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Validate `program` against the set of callable names known to the
/// interpreter (registered tools plus special functions). Returns `Ok(())`
/// only if every call target is known and no expression exceeds
/// [`MAX_NESTING_DEPTH`].
pub fn validate(program: &Program, known_functions: &HashSet<String>) -> Result<(), InterpreterError> {
    for stmt in &program.statements {
        validate_stmt(stmt, known_functions, 0)?;
    }
    Ok(())
}

fn validate_stmt(stmt: &Stmt, known_functions: &HashSet<String>, depth: usize) -> Result<(), InterpreterError> {
    check_depth(depth)?;
    match stmt {
        Stmt::Assign { value, .. } => validate_expr(value, known_functions, depth + 1),
        Stmt::Expr(expr) => validate_expr(expr, known_functions, depth + 1),
        Stmt::Return(expr) => validate_expr(expr, known_functions, depth + 1),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            validate_expr(cond, known_functions, depth + 1)?;
            for s in then_branch {
                validate_stmt(s, known_functions, depth + 1)?;
            }
            for s in else_branch {
                validate_stmt(s, known_functions, depth + 1)?;
            }
            Ok(())
        }
    }
}

fn validate_expr(expr: &Expr, known_functions: &HashSet<String>, depth: usize) -> Result<(), InterpreterError> {
    check_depth(depth)?;
    match expr {
        Expr::Literal(_) | Expr::Name(_) => Ok(()),
        Expr::Call { func, args, kwargs } => {
            if !known_functions.contains(func) {
                return Err(InterpreterError::UnknownFunction(func.clone()));
            }
            for arg in args {
                validate_expr(arg, known_functions, depth + 1)?;
            }
            for (_, value) in kwargs {
                validate_expr(value, known_functions, depth + 1)?;
            }
            Ok(())
        }
        Expr::Attribute { object, .. } => validate_expr(object, known_functions, depth + 1),
        Expr::Subscript { object, index } => {
            validate_expr(object, known_functions, depth + 1)?;
            validate_expr(index, known_functions, depth + 1)
        }
        Expr::Slice { object, start, end } => {
            validate_expr(object, known_functions, depth + 1)?;
            if let Some(start) = start {
                validate_expr(start, known_functions, depth + 1)?;
            }
            if let Some(end) = end {
                validate_expr(end, known_functions, depth + 1)?;
            }
            Ok(())
        }
        Expr::BinOp { left, right, .. } => {
            validate_expr(left, known_functions, depth + 1)?;
            validate_expr(right, known_functions, depth + 1)
        }
        Expr::UnaryOp { operand, .. } => validate_expr(operand, known_functions, depth + 1),
        Expr::Compare { left, comparators, .. } => {
            validate_expr(left, known_functions, depth + 1)?;
            for c in comparators {
                validate_expr(c, known_functions, depth + 1)?;
            }
            Ok(())
        }
        Expr::List(items) => {
            for item in items {
                validate_expr(item, known_functions, depth + 1)?;
            }
            Ok(())
        }
        Expr::Map(entries) => {
            for (_, value) in entries {
                validate_expr(value, known_functions, depth + 1)?;
            }
            Ok(())
        }
    }
}

fn check_depth(depth: usize) -> Result<(), InterpreterError> {
    if depth > MAX_NESTING_DEPTH {
        Err(InterpreterError::MaxNestingDepthExceeded)
    } else {
        Ok(())
    }
}
