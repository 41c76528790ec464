//! Runtime evaluation of `Expression` and `Condition` trees.
//!
//! The parsing half of this sublanguage (AND/OR/NOT, six comparison
//! operators, `||` splitting) lives in `parser::statement_parser`; this
//! module is purely the evaluator side, shared by `IF`, `DO WHILE`/`UNTIL`,
//! and `EXIT UNLESS` exactly as spec §4.9 describes.

use std::collections::VecDeque;

use crate::ast::types::{ComparisonOperator, Condition, Expression};
use crate::interpreter::arithmetic::eval_binary_op;
use crate::interpreter::dispatcher::{dispatch, Dispatch};
use crate::interpreter::errors::{InterpreterError, SourceContext};
use crate::interpreter::types::ExecutionState;
use crate::interpreter::variables;
use crate::parser::interpolation::interpolate;
use crate::value::{compare_values, values_equal, Value};

fn ctx(state: &ExecutionState) -> SourceContext {
    SourceContext::new(
        state.current_line,
        state.source_lines.get(state.current_line.saturating_sub(1)).cloned().unwrap_or_default(),
        state.source_filename.clone(),
    )
}

/// Evaluate an `Expression` node to a `Value`, dispatching any function
/// calls it contains through `collab`.
pub async fn eval_expression(
    state: &mut ExecutionState,
    expr: &Expression,
    collab: &Dispatch<'_>,
) -> Result<Value, InterpreterError> {
    match expr {
        Expression::Literal(v) => Ok(v.clone()),
        Expression::Variable { name } => Ok(variables::get(state, name)),
        Expression::ArrayLiteral { elements } => {
            let mut out = Vec::with_capacity(elements.len());
            for e in elements {
                out.push(Box::pin(eval_expression(state, e, collab)).await?);
            }
            Ok(Value::Array(out))
        }
        Expression::BinaryOp { op, left, right } => {
            let l = Box::pin(eval_expression(state, left, collab)).await?;
            let r = Box::pin(eval_expression(state, right, collab)).await?;
            eval_binary_op(*op, &l, &r, ctx(state))
        }
        Expression::PipeOp { left, right } => {
            // The parser's `apply_pipe` already rewrites `a |> f(args)` into
            // `f`'s argument list at parse time; a `PipeOp` surviving to
            // evaluation only happens when the right-hand side isn't a call
            // (e.g. `a |> b`), so the left value is simply discarded in
            // favor of the right, matching a plain sequence-point read.
            let _ = Box::pin(eval_expression(state, left, collab)).await?;
            Box::pin(eval_expression(state, right, collab)).await
        }
        Expression::FunctionCall { command, params, positional } => {
            let mut args = Vec::with_capacity(params.len() + positional.len());
            for p in positional {
                let v = Box::pin(eval_expression(state, p, collab)).await?;
                args.push((None, v));
            }
            for (name, value_expr) in params {
                let v = Box::pin(eval_expression(state, value_expr, collab)).await?;
                args.push((Some(name.clone()), v));
            }
            dispatch(state, collab, command, args).await
        }
        Expression::InterpolatedString { template } => {
            let pattern = state.interpolation_pattern.clone();
            Ok(Value::String(interpolate(template, &pattern, &*state)))
        }
        Expression::Heredoc { content, delimiter } => {
            Value::from_heredoc(content, delimiter)
                .map_err(|e| InterpreterError::Json { message: e.message, context: ctx(state) })
        }
        Expression::Concatenation { parts } => {
            let mut out = String::new();
            for part in parts {
                let v = Box::pin(eval_expression(state, part, collab)).await?;
                out.push_str(&v.to_display_string());
            }
            Ok(Value::String(out))
        }
        Expression::ArrayAccess { variable, index } => {
            let idx_value = Box::pin(eval_expression(state, index, collab)).await?;
            let idx = idx_value.as_number().ok_or_else(|| InterpreterError::Type {
                message: format!("array index {:?} is not numeric", idx_value.to_display_string()),
                context: ctx(state),
            })? as i64;
            match variables::get(state, variable) {
                Value::Array(items) => {
                    if idx < 1 {
                        Err(InterpreterError::Type { message: "array index must be >= 1".to_string(), context: ctx(state) })
                    } else {
                        Ok(items.get((idx - 1) as usize).cloned().unwrap_or(Value::Null))
                    }
                }
                other => Err(InterpreterError::Type {
                    message: format!("{:?} is not an array", other.to_display_string()),
                    context: ctx(state),
                }),
            }
        }
    }
}

/// Evaluate a `Condition` tree to a boolean.
pub async fn eval_condition(
    state: &mut ExecutionState,
    cond: &Condition,
    collab: &Dispatch<'_>,
) -> Result<bool, InterpreterError> {
    match cond {
        Condition::Comparison { left, op, right } => {
            let l = Box::pin(eval_expression(state, left, collab)).await?;
            let r = Box::pin(eval_expression(state, right, collab)).await?;
            Ok(match op {
                ComparisonOperator::Eq => values_equal(&l, &r),
                ComparisonOperator::Ne => !values_equal(&l, &r),
                ComparisonOperator::Lt => compare_values(&l, &r) == std::cmp::Ordering::Less,
                ComparisonOperator::Le => compare_values(&l, &r) != std::cmp::Ordering::Greater,
                ComparisonOperator::Gt => compare_values(&l, &r) == std::cmp::Ordering::Greater,
                ComparisonOperator::Ge => compare_values(&l, &r) != std::cmp::Ordering::Less,
            })
        }
        Condition::Boolean { expression } => Ok(Box::pin(eval_expression(state, expression, collab)).await?.is_truthy()),
        Condition::LogicalAnd { parts } => {
            for p in parts {
                if !Box::pin(eval_condition(state, p, collab)).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::LogicalOr { parts } => {
            for p in parts {
                if Box::pin(eval_condition(state, p, collab)).await? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::LogicalNot { operand } => Ok(!Box::pin(eval_condition(state, operand, collab)).await?),
    }
}

/// Iterate a value for `DO var OVER array` (spec §4.7): strings as
/// character sequences, arrays as-is, array-like objects detected by
/// whether index `0` exists, and plain objects over their values.
pub fn iterate_over(value: &Value, ctx: SourceContext) -> Result<VecDeque<Value>, InterpreterError> {
    match value {
        Value::Array(items) => Ok(items.iter().cloned().collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(map) => {
            if map.contains_key("0") {
                let mut items: Vec<(usize, Value)> = map
                    .iter()
                    .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v.clone())))
                    .collect();
                items.sort_by_key(|(i, _)| *i);
                Ok(items.into_iter().map(|(_, v)| v).collect())
            } else {
                Ok(map.values().cloned().collect())
            }
        }
        other => Err(InterpreterError::Type { message: format!("{:?} is not iterable", other.to_display_string()), context: ctx }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{NoopAddressSender, NoopLibraryLoader, NullOutputSink, TestFunctionRegistry};
    use crate::ast::types::BinaryOperator;

    fn collab<'a>(registry: &'a TestFunctionRegistry, sender: &'a NoopAddressSender, loader: &'a NoopLibraryLoader, sink: &'a NullOutputSink) -> Dispatch<'a> {
        Dispatch { registry, address_sender: Some(sender), library_loader: loader, output: sink, script_loader: None }
    }

    #[tokio::test]
    async fn concatenation_joins_display_strings() {
        let mut state = ExecutionState::new();
        let (registry, sender, loader, sink) = (TestFunctionRegistry::default(), NoopAddressSender, NoopLibraryLoader, NullOutputSink);
        let d = collab(&registry, &sender, &loader, &sink);
        let expr = Expression::Concatenation {
            parts: vec![Expression::Literal(Value::String("sum=".into())), Expression::Literal(Value::Integer(5))],
        };
        let result = eval_expression(&mut state, &expr, &d).await.unwrap();
        assert_eq!(result, Value::String("sum=5".to_string()));
    }

    #[tokio::test]
    async fn comparison_uses_numeric_coercion() {
        let mut state = ExecutionState::new();
        let (registry, sender, loader, sink) = (TestFunctionRegistry::default(), NoopAddressSender, NoopLibraryLoader, NullOutputSink);
        let d = collab(&registry, &sender, &loader, &sink);
        let cond = Condition::Comparison {
            left: Expression::Literal(Value::String("10".into())),
            op: ComparisonOperator::Gt,
            right: Expression::Literal(Value::String("9".into())),
        };
        assert!(eval_condition(&mut state, &cond, &d).await.unwrap());
    }

    #[tokio::test]
    async fn binary_op_add_evaluates() {
        let mut state = ExecutionState::new();
        let (registry, sender, loader, sink) = (TestFunctionRegistry::default(), NoopAddressSender, NoopLibraryLoader, NullOutputSink);
        let d = collab(&registry, &sender, &loader, &sink);
        let expr = Expression::BinaryOp {
            op: BinaryOperator::Add,
            left: Box::new(Expression::Literal(Value::Integer(2))),
            right: Box::new(Expression::Literal(Value::Integer(3))),
        };
        assert_eq!(eval_expression(&mut state, &expr, &d).await.unwrap(), Value::Integer(5));
    }

    #[test]
    fn iterate_over_array_like_object_sorts_by_index() {
        let mut map = indexmap::IndexMap::new();
        map.insert("0".to_string(), Value::String("a".into()));
        map.insert("1".to_string(), Value::String("b".into()));
        let items = iterate_over(&Value::Object(map), SourceContext::default()).unwrap();
        assert_eq!(items.into_iter().collect::<Vec<_>>(), vec![Value::String("a".into()), Value::String("b".into())]);
    }
}
