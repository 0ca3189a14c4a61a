//! Condition expression evaluator

use super::ast::{CompareOp, Expression, Literal};
use crate::workflow::state::WorkflowState;
use serde_json::{Number, Value};

/// Evaluate a condition expression against workflow state.
///
/// Evaluation only reads the state; the same expression over the same
/// state always gives the same answer.
pub fn evaluate(expr: &Expression, state: &WorkflowState) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Compare { left, op, right } => evaluate_compare(left, *op, right, state),
        Expression::And(left, right) => evaluate(left, state) && evaluate(right, state),
        Expression::Or(left, right) => evaluate(left, state) || evaluate(right, state),
        Expression::Not(inner) => !evaluate(inner, state),
    }
}

fn evaluate_compare(left: &str, op: CompareOp, right: &Literal, state: &WorkflowState) -> bool {
    let left_value = state.get_path(left);

    match op {
        CompareOp::Eq => values_equal(left_value, right),
        CompareOp::NotEq => !values_equal(left_value, right),
        CompareOp::Gt => compare_numbers(left_value, right, |a, b| a > b),
        CompareOp::Gte => compare_numbers(left_value, right, |a, b| a >= b),
        CompareOp::Lt => compare_numbers(left_value, right, |a, b| a < b),
        CompareOp::Lte => compare_numbers(left_value, right, |a, b| a <= b),
        CompareOp::Contains => check_contains(left_value, right),
    }
}

fn values_equal(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (None, Literal::Null) => true,
        (None, _) => false,
        (Some(Value::Null), Literal::Null) => true,
        (Some(Value::String(s)), Literal::String(rs)) => s == rs,
        (Some(Value::Number(n)), Literal::Number(rn)) => number_equals(n, *rn),
        (Some(Value::Bool(b)), Literal::Boolean(rb)) => b == rb,
        _ => false,
    }
}

/// Integers compare exactly; anything else compares as f64
fn number_equals(n: &Number, literal: f64) -> bool {
    let integral = literal.fract() == 0.0 && literal.abs() < 9.2e18;
    match (n.as_i64(), n.as_u64()) {
        (Some(i), _) if integral => i128::from(i) == literal as i128,
        (None, Some(u)) if integral => i128::from(u) == literal as i128,
        _ => n.as_f64() == Some(literal),
    }
}

fn compare_numbers<F>(left: Option<&Value>, right: &Literal, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (left, right) {
        (Some(Value::Number(n)), Literal::Number(rn)) => {
            n.as_f64().map(|f| cmp(f, *rn)).unwrap_or(false)
        }
        _ => false,
    }
}

fn check_contains(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (Some(Value::String(s)), Literal::String(substr)) => s.contains(substr.as_str()),
        (Some(Value::Array(arr)), Literal::String(val)) => {
            arr.iter().any(|v| v.as_str() == Some(val.as_str()))
        }
        (Some(Value::Array(arr)), Literal::Number(val)) => arr
            .iter()
            .any(|v| matches!(v, Value::Number(n) if number_equals(n, *val))),
        (Some(Value::Array(arr)), Literal::Boolean(val)) => {
            arr.iter().any(|v| v.as_bool() == Some(*val))
        }
        _ => false,
    }
}
