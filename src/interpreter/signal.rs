//! `SIGNAL ON/OFF ERROR`, error-record population, and `EXIT`/`EXIT
//! UNLESS` termination (spec §4.9).

use crate::ast::types::Expression;
use crate::interpreter::condition::eval_expression;
use crate::interpreter::dispatcher::Dispatch;
use crate::interpreter::errors::{snapshot_variables, InterpreterError};
use crate::interpreter::types::{ControlOutcome, ErrorHandler, ExecutionState};
use crate::interpreter::variables;
use crate::parser::interpolation::interpolate;
use crate::parser::statement_parser::parse_condition;
use crate::value::Value;

/// `SIGNAL ON <condition> [NAME label]`.
pub fn signal_on(state: &mut ExecutionState, condition: &str, label: Option<String>) {
    state.error_handlers.insert(condition.to_ascii_uppercase(), ErrorHandler { label, enabled: true });
}

/// `SIGNAL OFF <condition>`.
pub fn signal_off(state: &mut ExecutionState, condition: &str) {
    if let Some(handler) = state.error_handlers.get_mut(&condition.to_ascii_uppercase()) {
        handler.enabled = false;
    }
}

/// Populate `RC`/`ERRORTEXT`/`SIGL` from a raised error, per spec §4.9.
fn record_error(state: &mut ExecutionState, err: &InterpreterError) {
    variables::set(state, "RC", Value::Integer(err.rc_code() as i64));
    variables::set(state, "ERRORTEXT", Value::String(err.cleaned_message()));
    let line = err.context().map(|c| c.line).unwrap_or(state.current_line);
    variables::set(state, "SIGL", Value::Integer(line as i64));
}

/// A snapshot of the error and the variable table at the moment it was
/// raised, captured for the embedder's own reporting — deliberately
/// carries no back-reference to the interpreter (see DESIGN.md, "Cyclic
/// references in error captures").
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub error: InterpreterError,
    pub variables: std::collections::HashMap<String, Value>,
}

/// Outcome of running a raised error through the `ERROR` condition
/// handler: either a `Jump` to resume at the handler label, or the error
/// propagates unchanged (no handler registered, handler disabled, or
/// already inside a handler — error isolation per spec §8).
pub enum Disposition {
    Jump(ControlOutcome),
    Propagate(InterpreterError),
}

/// Run a raised error through `RC`/`ERRORTEXT`/`SIGL` population and the
/// `ERROR` condition handler lookup. Sets `state.in_error_handler` when
/// jumping; the caller must clear it once the handler body has run to
/// completion.
pub fn dispatch_error(state: &mut ExecutionState, err: InterpreterError) -> (Disposition, ErrorReport) {
    record_error(state, &err);
    let report = ErrorReport { error: err.clone(), variables: snapshot_variables(&state.variables) };

    if state.in_error_handler {
        return (Disposition::Propagate(err), report);
    }

    let handler = state.error_handlers.get("ERROR").cloned();
    let disposition = match handler {
        Some(h) if h.enabled => {
            let target = h.label.as_deref().map(|l| l.to_ascii_uppercase());
            match target.as_ref().and_then(|name| state.labels.get(name).copied()) {
                Some(to_index) => {
                    state.in_error_handler = true;
                    Disposition::Jump(ControlOutcome::Jump { to_index })
                }
                None => Disposition::Propagate(err),
            }
        }
        _ => Disposition::Propagate(err),
    };
    (disposition, report)
}

/// Clear the re-entrancy guard after an error-handler body finishes.
pub fn clear_handler_guard(state: &mut ExecutionState) {
    state.in_error_handler = false;
}

/// `EXIT UNLESS cond, message`: re-parse `condition_text` (done once at
/// evaluation time rather than at parse time, since the interpolation
/// pattern that governs `message` is instance-scoped), evaluate it, and
/// on false produce the interpolated/concatenated message text plus the
/// requested exit code.
pub async fn eval_exit_unless(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    condition_text: &str,
    message: &Expression,
    code: Option<i64>,
) -> Result<Option<(String, i32)>, InterpreterError> {
    let pattern = state.interpolation_pattern.clone();
    let condition = parse_condition(condition_text, state.current_line, &pattern)
        .map_err(|e| InterpreterError::Syntax { message: e.to_string(), context: source_ctx(state) })?;

    if crate::interpreter::condition::eval_condition(state, &condition, collab).await? {
        return Ok(None);
    }

    let text = match message {
        Expression::InterpolatedString { template } => interpolate(template, &pattern, &*state),
        other => Box::pin(eval_expression(state, other, collab)).await?.to_display_string(),
    };
    Ok(Some((text, code.unwrap_or(1) as i32)))
}

fn source_ctx(state: &ExecutionState) -> crate::interpreter::errors::SourceContext {
    crate::interpreter::errors::SourceContext::new(
        state.current_line,
        state.source_lines.get(state.current_line.saturating_sub(1)).cloned().unwrap_or_default(),
        state.source_filename.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{NoopAddressSender, NoopLibraryLoader, NullOutputSink, TestFunctionRegistry};
    use crate::interpreter::errors::SourceContext;

    fn collab<'a>(registry: &'a TestFunctionRegistry, sender: &'a NoopAddressSender, loader: &'a NoopLibraryLoader, sink: &'a NullOutputSink) -> Dispatch<'a> {
        Dispatch { registry, address_sender: Some(sender), library_loader: loader, output: sink, script_loader: None }
    }

    #[test]
    fn record_error_sets_rc_errortext_sigl() {
        let mut state = ExecutionState::new();
        state.current_line = 7;
        let err = InterpreterError::Function {
            name: "NO_SUCH_FUNCTION".to_string(),
            docs_url: None,
            context: SourceContext::new(7, "", None),
        };
        record_error(&mut state, &err);
        assert_eq!(variables::get(&state, "RC"), Value::Integer(1));
        assert_eq!(variables::get(&state, "SIGL"), Value::Integer(7));
        assert!(matches!(variables::get(&state, "ERRORTEXT"), Value::String(s) if s.contains("NO_SUCH_FUNCTION")));
    }

    #[test]
    fn dispatch_error_jumps_when_handler_enabled() {
        let mut state = ExecutionState::new();
        state.labels.insert("HANDLER".to_string(), 3);
        signal_on(&mut state, "ERROR", Some("HANDLER".to_string()));
        let err = InterpreterError::Function { name: "X".to_string(), docs_url: None, context: SourceContext::default() };
        let (disposition, _report) = dispatch_error(&mut state, err);
        assert!(matches!(disposition, Disposition::Jump(ControlOutcome::Jump { to_index: 3 })));
        assert!(state.in_error_handler);
    }

    #[test]
    fn dispatch_error_propagates_when_already_in_handler() {
        let mut state = ExecutionState::new();
        state.labels.insert("HANDLER".to_string(), 3);
        signal_on(&mut state, "ERROR", Some("HANDLER".to_string()));
        state.in_error_handler = true;
        let err = InterpreterError::Function { name: "X".to_string(), docs_url: None, context: SourceContext::default() };
        let (disposition, _report) = dispatch_error(&mut state, err);
        assert!(matches!(disposition, Disposition::Propagate(_)));
    }

    #[tokio::test]
    async fn exit_unless_false_condition_produces_message_and_code() {
        let mut state = ExecutionState::new();
        variables::set(&mut state, "status", Value::Integer(500));
        let registry = TestFunctionRegistry::default();
        let (sender, loader, sink) = (NoopAddressSender, NoopLibraryLoader, NullOutputSink);
        let d = collab(&registry, &sender, &loader, &sink);
        let message = Expression::InterpolatedString { template: "bad status: {{status}}".to_string() };
        let result = eval_exit_unless(&mut state, &d, "status = 200", &message, Some(1)).await.unwrap();
        assert_eq!(result, Some(("bad status: 500".to_string(), 1)));
    }

    #[tokio::test]
    async fn exit_unless_true_condition_is_none() {
        let mut state = ExecutionState::new();
        variables::set(&mut state, "status", Value::Integer(200));
        let registry = TestFunctionRegistry::default();
        let (sender, loader, sink) = (NoopAddressSender, NoopLibraryLoader, NullOutputSink);
        let d = collab(&registry, &sender, &loader, &sink);
        let message = Expression::InterpolatedString { template: "bad status: {{status}}".to_string() };
        let result = eval_exit_unless(&mut state, &d, "status = 200", &message, Some(1)).await.unwrap();
        assert_eq!(result, None);
    }
}
