//! Loop-bookkeeping helpers shared by the tree-walking evaluator's `DO`
//! handling (spec §4.7). The actual body execution loop lives in
//! `execution_engine`, which is the only module that recurses on command
//! lists; this module only computes iteration plans and manages the
//! loop-variable shadow/restore contract.

use crate::interpreter::errors::{InterpreterError, SourceContext};
use crate::interpreter::types::ExecutionState;
use crate::interpreter::variables;
use crate::value::Value;

/// Compute the sequence of numeric values a `DO var = start TO end [BY
/// step]` loop iterates over. A zero step is a hard error; a step whose
/// sign disagrees with the start/end direction yields an empty plan (the
/// loop simply doesn't execute), matching spec §4.7.
pub fn numeric_range(start: f64, end: f64, step: f64, ctx: SourceContext) -> Result<Vec<f64>, InterpreterError> {
    if step == 0.0 {
        return Err(InterpreterError::Syntax { message: "DO loop step must not be zero".to_string(), context: ctx });
    }

    let ascending = step > 0.0;
    if (ascending && start > end) || (!ascending && start < end) {
        return Ok(Vec::new());
    }

    let mut values = Vec::new();
    let mut current = start;
    loop {
        if ascending {
            if current > end {
                break;
            }
        } else if current < end {
            break;
        }
        values.push(current);
        current += step;
    }
    Ok(values)
}

/// Captures whatever `name` was bound to before a loop starts, so it can
/// be restored afterward per the shadow/persistence contract: if the name
/// was previously bound, the prior value comes back; otherwise the
/// variable keeps its last-iterated value.
pub struct LoopVarGuard {
    name: String,
    prior: Option<Value>,
}

impl LoopVarGuard {
    pub fn capture(state: &ExecutionState, name: &str) -> Self {
        let prior = state.variables.get(name).cloned();
        Self { name: name.to_string(), prior }
    }

    /// Restore the prior binding if there was one; otherwise leave the
    /// loop's final value in place.
    pub fn restore(self, state: &mut ExecutionState) {
        if let Some(prior) = self.prior {
            variables::set(state, &self.name, prior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SourceContext {
        SourceContext::new(1, "", None)
    }

    #[test]
    fn ascending_range_with_step() {
        let values = numeric_range(1.0, 10.0, 2.0, ctx()).unwrap();
        assert_eq!(values, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn zero_step_is_syntax_error() {
        assert!(numeric_range(1.0, 10.0, 0.0, ctx()).is_err());
    }

    #[test]
    fn mismatched_direction_yields_empty_plan() {
        let values = numeric_range(10.0, 1.0, 1.0, ctx()).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn loop_var_guard_restores_previously_bound_value() {
        let mut state = ExecutionState::new();
        variables::set(&mut state, "i", Value::Integer(100));
        let guard = LoopVarGuard::capture(&state, "i");
        variables::set(&mut state, "i", Value::Integer(9));
        guard.restore(&mut state);
        assert_eq!(variables::get(&state, "i"), Value::Integer(100));
    }

    #[test]
    fn loop_var_guard_leaves_unbound_name_at_final_value() {
        let mut state = ExecutionState::new();
        let guard = LoopVarGuard::capture(&state, "i");
        variables::set(&mut state, "i", Value::Integer(9));
        guard.restore(&mut state);
        assert_eq!(variables::get(&state, "i"), Value::Integer(9));
    }
}
