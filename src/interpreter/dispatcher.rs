//! Single dispatch point for function calls (spec §4.10).
//!
//! Bundles the collaborator trait objects a running script needs; the
//! evaluator holds one borrowed for the duration of a top-level `exec`,
//! the way the teacher's `InterpreterContext` bundles `fs`/`executor`
//! borrows for the duration of one command execution.

use std::collections::HashMap;

use crate::collaborators::{AddressSender, FunctionRegistry, LibraryLoader, OutputSink, Params, ScriptLoader};
use crate::interpreter::errors::{InterpreterError, SourceContext};
use crate::interpreter::types::ExecutionState;
use crate::interpreter::variables;
use crate::value::Value;

pub struct Dispatch<'a> {
    pub registry: &'a dyn FunctionRegistry,
    pub address_sender: Option<&'a dyn AddressSender>,
    pub library_loader: &'a dyn LibraryLoader,
    pub output: &'a dyn OutputSink,
    pub script_loader: Option<&'a dyn ScriptLoader>,
}

/// Resolved call arguments: positional values in order, plus any named
/// arguments, exactly as the expression parser produced them.
pub type ResolvedArgs = Vec<(Option<String>, Value)>;

fn source_ctx(state: &ExecutionState) -> SourceContext {
    SourceContext::new(
        state.current_line,
        state.source_lines.get(state.current_line.saturating_sub(1)).cloned().unwrap_or_default(),
        state.source_filename.clone(),
    )
}

fn to_params(args: &ResolvedArgs) -> Params {
    let mut params = HashMap::new();
    let mut positional_index = 1;
    for (name, value) in args {
        match name {
            Some(n) => {
                params.insert(n.clone(), value.clone());
            }
            None => {
                params.insert(format!("_{}", positional_index), value.clone());
                positional_index += 1;
            }
        }
    }
    params
}

fn positional_values(args: &ResolvedArgs) -> Vec<Value> {
    args.iter().filter(|(name, _)| name.is_none()).map(|(_, v)| v.clone()).collect()
}

/// Apply a per-function positional-to-named converter (spec §4.10 step 3):
/// map resolved positional values onto the converter's declared parameter
/// names, in order.
fn apply_converter(converter: &[String], positional: &[Value]) -> Params {
    let mut params = HashMap::new();
    for (name, value) in converter.iter().zip(positional.iter()) {
        params.insert(name.clone(), value.clone());
    }
    params
}

/// Walk the 9-step dispatch order for a function call named `command`.
pub async fn dispatch(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    command: &str,
    args: ResolvedArgs,
) -> Result<Value, InterpreterError> {
    let upper = command.to_ascii_uppercase();

    // 1. REQUIRE bypasses the normal resolution loop.
    if upper == "REQUIRE" {
        let name = args
            .iter()
            .find(|(n, _)| n.is_none())
            .map(|(_, v)| v.to_display_string())
            .unwrap_or_default();
        let as_clause = args.iter().find(|(n, _)| n.as_deref() == Some("AS")).map(|(_, v)| v.to_display_string());
        return match collab.library_loader.require(&name, as_clause.as_deref()).await {
            Ok(regs) => {
                for reg in regs.address_targets {
                    state.address_targets.insert(
                        reg.name,
                        crate::interpreter::types::AddressTargetInfo { handler: Some(reg.handler), metadata: reg.metadata },
                    );
                }
                Ok(Value::Bool(true))
            }
            Err(message) => Err(InterpreterError::Library { message, context: source_ctx(state) }),
        };
    }

    // 2. Rexx built-in special variables.
    if matches!(upper.as_str(), "RC" | "ERRORTEXT" | "SIGL") {
        return Ok(variables::get(state, &upper));
    }

    // 3. Registered built-in function.
    if collab.registry.is_builtin(&upper) {
        let params = match collab.registry.get_converter(&upper) {
            Some(converter) => apply_converter(&converter, &positional_values(&args)),
            None => to_params(&args),
        };
        return collab.registry.call(&upper, params).await.map_err(|_| InterpreterError::Function {
            name: upper.clone(),
            docs_url: None,
            context: source_ctx(state),
        });
    }

    // 4. Registered operation (named-parameter convention).
    if collab.registry.is_operation(&upper) {
        return collab
            .registry
            .call(&upper, to_params(&args))
            .await
            .map_err(|message| InterpreterError::Library { message, context: source_ctx(state) });
    }

    // 5. External function previously loaded via REQUIRE is registered into
    // the same registry/operation tables by the loader, so it is already
    // covered by steps 3/4 above.

    // 6. Current ADDRESS target handler (if not "default").
    if state.address != "default" {
        if let Some(info) = state.address_targets.get(&state.address).cloned() {
            if let (Some(handler), Some(sender)) = (info.handler, collab.address_sender) {
                return sender
                    .send(&handler, &upper, to_params(&args))
                    .await
                    .map_err(|message| InterpreterError::Address { message, context: source_ctx(state) });
            }
        }
    }

    // 7. Browser-string-function shim: not applicable to this core; no-op.

    // 8/9. No AddressSender configured -> MissingFunction; otherwise send as RPC.
    match collab.address_sender {
        None => Err(InterpreterError::Function {
            name: upper.clone(),
            docs_url: Some(format!("https://example.invalid/docs/functions/{}", upper.to_ascii_lowercase())),
            context: source_ctx(state),
        }),
        Some(sender) => sender
            .send("rexx", &upper, to_params(&args))
            .await
            .map_err(|message| InterpreterError::Address { message, context: source_ctx(state) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{NoopAddressSender, NoopLibraryLoader, NullOutputSink, TestFunctionRegistry};

    #[tokio::test]
    async fn special_variables_short_circuit_dispatch() {
        let mut state = ExecutionState::new();
        state.variables.insert("RC".to_string(), Value::Integer(4));
        let registry = TestFunctionRegistry::default();
        let loader = NoopLibraryLoader;
        let sender = NoopAddressSender;
        let sink = NullOutputSink;
        let collab = Dispatch { registry: &registry, address_sender: Some(&sender), library_loader: &loader, output: &sink, script_loader: None };
        let result = dispatch(&mut state, &collab, "RC", vec![]).await.unwrap();
        assert_eq!(result, Value::Integer(4));
    }

    #[tokio::test]
    async fn missing_function_without_address_sender_is_function_error() {
        let mut state = ExecutionState::new();
        let registry = TestFunctionRegistry::default();
        let loader = NoopLibraryLoader;
        let sink = NullOutputSink;
        let collab = Dispatch { registry: &registry, address_sender: None, library_loader: &loader, output: &sink, script_loader: None };
        let result = dispatch(&mut state, &collab, "NO_SUCH_FUNCTION", vec![]).await;
        assert!(matches!(result, Err(InterpreterError::Function { .. })));
    }

    #[tokio::test]
    async fn registered_builtin_is_called_with_positional_params() {
        let mut state = ExecutionState::new();
        let mut registry = TestFunctionRegistry::default();
        registry.register("UPPER", |params| {
            let v = params.get("_1").cloned().unwrap_or(Value::Null);
            Ok(Value::String(v.to_display_string().to_ascii_uppercase()))
        });
        let loader = NoopLibraryLoader;
        let sender = NoopAddressSender;
        let sink = NullOutputSink;
        let collab = Dispatch { registry: &registry, address_sender: Some(&sender), library_loader: &loader, output: &sink, script_loader: None };
        let result = dispatch(&mut state, &collab, "upper", vec![(None, Value::String("hi".into()))]).await.unwrap();
        assert_eq!(result, Value::String("HI".to_string()));
    }
}
