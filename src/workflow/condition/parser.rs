//! Simple condition expression parser
//!
//! Parses expressions like:
//! - `field == 'value'`
//! - `score >= 10`
//! - `a == 'x' and b > 5`
//! - `not (done == true or retries > 3)`
//!
//! `or` binds looser than `and`, which binds looser than `not`.

use super::ast::{CompareOp, Expression, Literal};
use thiserror::Error;

/// Longest condition accepted, in bytes
pub const MAX_CONDITION_LEN: usize = 4096;

/// Deepest nesting of `not` / parentheses accepted
pub const MAX_NESTING_DEPTH: usize = 64;

/// Errors produced while parsing a condition
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    #[error("Could not parse condition: {0}")]
    InvalidExpression(String),

    #[error("Could not parse literal: {0}")]
    InvalidLiteral(String),

    #[error("Unbalanced quotes or parentheses in: {0}")]
    Unbalanced(String),

    #[error("Condition is {len} bytes long, limit is {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("Condition nests deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let input = input.trim();

    if input.len() > MAX_CONDITION_LEN {
        return Err(ConditionError::TooLong {
            len: input.len(),
            limit: MAX_CONDITION_LEN,
        });
    }
    if input.is_empty() {
        return Err(ConditionError::InvalidExpression(input.to_string()));
    }
    if !is_balanced(input) {
        return Err(ConditionError::Unbalanced(input.to_string()));
    }

    parse_at(input, 0)
}

fn parse_at(input: &str, depth: usize) -> Result<Expression, ConditionError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ConditionError::TooDeep {
            limit: MAX_NESTING_DEPTH,
        });
    }
    let input = input.trim();
    if input.is_empty() {
        return Err(ConditionError::InvalidExpression(input.to_string()));
    }

    if input == "true" {
        return Ok(Expression::True);
    }
    if input == "false" {
        return Ok(Expression::False);
    }

    // Chains are split in one pass so `a or b or c ...` does not recurse per term
    let terms = split_all_top_level(input, " or ");
    if terms.len() > 1 {
        return fold_terms(terms, depth, Expression::Or);
    }
    let terms = split_all_top_level(input, " and ");
    if terms.len() > 1 {
        return fold_terms(terms, depth, Expression::And);
    }
    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::Not(Box::new(parse_at(rest, depth + 1)?)));
    }
    if let Some(inner) = strip_outer_parens(input) {
        return parse_at(inner, depth + 1);
    }

    parse_comparison(input)
}

/// Right-nested fold: `a or b or c` -> `Or(a, Or(b, c))`
fn fold_terms(
    terms: Vec<&str>,
    depth: usize,
    join: fn(Box<Expression>, Box<Expression>) -> Expression,
) -> Result<Expression, ConditionError> {
    let mut parsed = terms
        .into_iter()
        .map(|term| parse_at(term, depth + 1))
        .collect::<Result<Vec<_>, _>>()?;
    let mut acc = match parsed.pop() {
        Some(last) => last,
        None => return Err(ConditionError::InvalidExpression(String::new())),
    };
    while let Some(expr) = parsed.pop() {
        acc = join(Box::new(expr), Box::new(acc));
    }
    Ok(acc)
}

fn parse_comparison(input: &str) -> Result<Expression, ConditionError> {
    // Longest operators first so `>=` is not read as `>`
    let operators = [
        ("!=", CompareOp::NotEq),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        (" contains ", CompareOp::Contains),
    ];

    for (op_str, op) in operators {
        if let Some((left, right)) = split_top_level(input, op_str) {
            let left = left.trim();
            if left.is_empty() || left.contains(char::is_whitespace) {
                return Err(ConditionError::InvalidExpression(input.to_string()));
            }
            let right = parse_literal(right)?;
            return Ok(Expression::Compare {
                left: left.to_string(),
                op,
                right,
            });
        }
    }

    Err(ConditionError::InvalidExpression(input.to_string()))
}

/// Split at the first occurrence of `needle` outside quotes and parentheses
fn split_top_level<'a>(input: &'a str, needle: &str) -> Option<(&'a str, &'a str)> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if depth == 0 && input[i..].starts_with(needle) => {
                return Some((&input[..i], &input[i + needle.len()..]));
            }
            _ => {}
        }
    }
    None
}

fn split_all_top_level<'a>(input: &'a str, needle: &str) -> Vec<&'a str> {
    let mut terms = Vec::new();
    let mut rest = input;
    while let Some((left, right)) = split_top_level(rest, needle) {
        terms.push(left);
        rest = right;
    }
    terms.push(rest);
    terms
}

/// `(expr)` -> `expr`, only when the outer pair encloses everything
fn strip_outer_parens(input: &str) -> Option<&str> {
    let inner = input.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for c in inner.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(inner)
}

fn is_balanced(input: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && quote.is_none()
}

fn parse_literal(input: &str) -> Result<Literal, ConditionError> {
    let input = input.trim();

    if input == "null" {
        return Ok(Literal::Null);
    }

    if input == "true" {
        return Ok(Literal::Boolean(true));
    }
    if input == "false" {
        return Ok(Literal::Boolean(false));
    }

    // String (single or double quotes)
    if input.len() >= 2
        && ((input.starts_with('\'') && input.ends_with('\''))
            || (input.starts_with('"') && input.ends_with('"')))
    {
        let s = &input[1..input.len() - 1];
        return Ok(Literal::String(s.to_string()));
    }

    if let Ok(n) = input.parse::<f64>() {
        return Ok(Literal::Number(n));
    }

    Err(ConditionError::InvalidLiteral(input.to_string()))
}
