//! PUSH/PULL/QUEUE stack (spec §4.6, §3 `ExecutionState.stack`).

use crate::interpreter::types::ExecutionState;
use crate::value::Value;

/// PUSH places a value at the front (LIFO order relative to PULL).
pub fn push(state: &mut ExecutionState, value: Value) {
    state.stack.push_front(value);
}

/// QUEUE places a value at the back (FIFO order relative to PULL).
pub fn queue(state: &mut ExecutionState, value: Value) {
    state.stack.push_back(value);
}

/// PULL removes from the front; an empty stack yields an empty string,
/// never an error.
pub fn pull(state: &mut ExecutionState) -> Value {
    state.stack.pop_front().unwrap_or_else(|| Value::String(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pull_is_lifo() {
        let mut state = ExecutionState::new();
        push(&mut state, Value::Integer(1));
        push(&mut state, Value::Integer(2));
        assert_eq!(pull(&mut state), Value::Integer(2));
        assert_eq!(pull(&mut state), Value::Integer(1));
    }

    #[test]
    fn queue_then_pull_is_fifo() {
        let mut state = ExecutionState::new();
        queue(&mut state, Value::Integer(1));
        queue(&mut state, Value::Integer(2));
        assert_eq!(pull(&mut state), Value::Integer(1));
        assert_eq!(pull(&mut state), Value::Integer(2));
    }

    #[test]
    fn pull_on_empty_stack_yields_empty_string() {
        let mut state = ExecutionState::new();
        assert_eq!(pull(&mut state), Value::String(String::new()));
    }
}
