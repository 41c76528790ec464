//! Numeric coercion and binary-operator evaluation (spec §4.6, §8
//! "Numeric coercion").

use crate::ast::types::BinaryOperator;
use crate::interpreter::errors::{InterpreterError, SourceContext};
use crate::value::Value;

/// Evaluate a binary arithmetic or concatenation operator. Arithmetic
/// operators require both operands to be numeric-coercible; `Concat`
/// never fails (it stringifies both sides).
pub fn eval_binary_op(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    ctx: SourceContext,
) -> Result<Value, InterpreterError> {
    if op == BinaryOperator::Concat {
        return Ok(Value::String(format!(
            "{}{}",
            left.to_display_string(),
            right.to_display_string()
        )));
    }

    let l = left.as_number().ok_or_else(|| InterpreterError::Type {
        message: format!("non-numeric operand {:?} to arithmetic operator", left.to_display_string()),
        context: ctx.clone(),
    })?;
    let r = right.as_number().ok_or_else(|| InterpreterError::Type {
        message: format!("non-numeric operand {:?} to arithmetic operator", right.to_display_string()),
        context: ctx.clone(),
    })?;

    let both_integral = left.is_integral() && right.is_integral();

    let result = match op {
        BinaryOperator::Add => l + r,
        BinaryOperator::Subtract => l - r,
        BinaryOperator::Multiply => l * r,
        BinaryOperator::Divide => {
            if r == 0.0 {
                return Err(InterpreterError::Arithmetic {
                    message: "division by zero".to_string(),
                    context: ctx,
                });
            }
            l / r
        }
        BinaryOperator::IntDivide => {
            if r == 0.0 {
                return Err(InterpreterError::Arithmetic {
                    message: "division by zero".to_string(),
                    context: ctx,
                });
            }
            (l / r).trunc()
        }
        BinaryOperator::Modulo => {
            if r == 0.0 {
                return Err(InterpreterError::Arithmetic {
                    message: "division by zero".to_string(),
                    context: ctx,
                });
            }
            l % r
        }
        BinaryOperator::Power => l.powf(r),
        BinaryOperator::Concat => unreachable!("handled above"),
    };

    if both_integral && result.fract() == 0.0 && result.abs() < 9.007e15 {
        Ok(Value::Integer(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SourceContext {
        SourceContext::new(1, "", None)
    }

    #[test]
    fn string_numbers_add_and_stay_integer() {
        let result = eval_binary_op(
            BinaryOperator::Add,
            &Value::String("3".to_string()),
            &Value::Integer(4),
            ctx(),
        )
        .unwrap();
        assert_eq!(result, Value::Integer(7));
    }

    #[test]
    fn non_numeric_operand_is_type_error() {
        let err = eval_binary_op(
            BinaryOperator::Add,
            &Value::String("three".to_string()),
            &Value::Integer(1),
            ctx(),
        );
        assert!(matches!(err, Err(InterpreterError::Type { .. })));
    }

    #[test]
    fn division_by_zero_is_arithmetic_error() {
        let err = eval_binary_op(BinaryOperator::Divide, &Value::Integer(1), &Value::Integer(0), ctx());
        assert!(matches!(err, Err(InterpreterError::Arithmetic { .. })));
        let err = eval_binary_op(BinaryOperator::IntDivide, &Value::Integer(1), &Value::Integer(0), ctx());
        assert!(matches!(err, Err(InterpreterError::Arithmetic { .. })));
    }

    #[test]
    fn concat_stringifies_both_sides_without_failing_on_non_numeric() {
        let result = eval_binary_op(
            BinaryOperator::Concat,
            &Value::String("sum=".to_string()),
            &Value::Integer(5),
            ctx(),
        )
        .unwrap();
        assert_eq!(result, Value::String("sum=5".to_string()));
    }

    #[test]
    fn power_promotes_to_float_on_fractional_result() {
        let result = eval_binary_op(BinaryOperator::Power, &Value::Integer(2), &Value::Float(0.5), ctx()).unwrap();
        match result {
            Value::Float(f) => assert!((f - std::f64::consts::SQRT_2).abs() < 1e-9),
            other => panic!("expected float, got {:?}", other),
        }
    }
}
