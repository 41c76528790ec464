//! Label discovery and the small pieces of CALL/RETURN bookkeeping that
//! don't need to recurse into command execution (spec §4.8). The actual
//! CALL/RETURN control flow — which has to re-enter the command-list
//! walker — lives in `execution_engine`, which owns the only recursive
//! entry point in this crate.

use std::collections::HashMap;

use crate::ast::types::{Command, CommandKind};
use crate::interpreter::types::{ExecutionState, SubroutineInfo};
use crate::value::Value;

/// Index every `Label` in a flat command list by its uppercased name.
/// Nested bodies (inside `IF`/`DO`/`SELECT`) are not scanned: `SIGNAL` and
/// `CALL` targets resolve against the top-level list that is currently
/// executing, matching the `Jump{to_index}` contract in
/// `ControlOutcome`.
pub fn discover_labels(cmds: &[Command]) -> HashMap<String, usize> {
    let mut labels = HashMap::new();
    for (index, cmd) in cmds.iter().enumerate() {
        if let CommandKind::Label { name, .. } = &cmd.kind {
            labels.insert(name.to_ascii_uppercase(), index);
        }
    }
    labels
}

/// Build the subroutine table from the same label positions; a label is a
/// valid `CALL` target exactly when it is also a valid `SIGNAL` target.
pub fn discover_subroutines(cmds: &[Command]) -> HashMap<String, SubroutineInfo> {
    discover_labels(cmds)
        .into_iter()
        .map(|(name, start_index)| (name, SubroutineInfo { start_index }))
        .collect()
}

/// Resolve the runtime name of a `CALL` target. Direct calls already carry
/// their literal, uppercased name; `CALL (expr)` (`is_variable_call`)
/// resolves `subroutine` as a variable holding the target name instead.
pub fn resolve_call_name(state: &ExecutionState, subroutine: &str, is_variable_call: bool) -> String {
    if is_variable_call {
        crate::interpreter::variables::get(state, subroutine).to_display_string().to_ascii_uppercase()
    } else {
        subroutine.to_ascii_uppercase()
    }
}

/// Push a fresh `ARG`-binding frame for an entered subroutine.
pub fn push_args_frame(state: &mut ExecutionState, args: Vec<Value>) {
    state.call_args.push(args);
}

/// Pop the current frame when a subroutine returns.
pub fn pop_args_frame(state: &mut ExecutionState) {
    state.call_args.pop();
}

/// `ARG(n)`, 1-based, against the innermost active call frame. Missing
/// arguments read as an empty string, matching Rexx's untyped-arg rules.
pub fn arg(state: &ExecutionState, n: usize) -> Value {
    state
        .call_args
        .last()
        .and_then(|frame| frame.get(n.saturating_sub(1)))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()))
}

/// The conventional variable `RETURN` populates in addition to any
/// explicit `LET v = CALL ...` assignment target.
pub const RESULT_VARIABLE: &str = "RESULT";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::Expression;

    fn label(name: &str) -> Command {
        Command::new(1, format!("{}:", name), CommandKind::Label { name: name.to_string(), statement: None })
    }

    #[test]
    fn discover_labels_indexes_by_uppercased_name() {
        let cmds = vec![
            Command::new(1, "SAY 1", CommandKind::Say { expression: Expression::Literal(Value::Integer(1)) }),
            label("handler"),
        ];
        let labels = discover_labels(&cmds);
        assert_eq!(labels.get("HANDLER"), Some(&1));
    }

    #[test]
    fn arg_reads_from_innermost_frame() {
        let mut state = ExecutionState::new();
        push_args_frame(&mut state, vec![Value::Integer(10), Value::Integer(20)]);
        assert_eq!(arg(&state, 1), Value::Integer(10));
        assert_eq!(arg(&state, 2), Value::Integer(20));
        assert_eq!(arg(&state, 3), Value::String(String::new()));
        pop_args_frame(&mut state);
        assert!(state.call_args.is_empty());
    }

    #[test]
    fn resolve_call_name_uppercases_direct_calls() {
        let state = ExecutionState::new();
        assert_eq!(resolve_call_name(&state, "greet", false), "GREET");
    }

    #[test]
    fn resolve_call_name_looks_up_variable_for_indirect_calls() {
        let mut state = ExecutionState::new();
        crate::interpreter::variables::set(&mut state, "target", Value::String("greet".into()));
        assert_eq!(resolve_call_name(&state, "target", true), "GREET");
    }
}
