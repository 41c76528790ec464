//! The tree-walking evaluator (spec §4.6): the single recursive entry
//! point that walks a command list, dispatching each `CommandKind` and
//! threading `ControlOutcome` back out of nested blocks.

use std::time::Duration;

use crate::ast::types::{Command, CommandKind, InterpretMode, LoopSpec, NumericSetting, ParseSource};
use crate::collaborators::ScriptLoader;
use crate::interpreter::condition::{eval_condition, eval_expression, iterate_over};
use crate::interpreter::control_flow::{numeric_range, LoopVarGuard};
use crate::interpreter::dispatcher::{dispatch, Dispatch};
use crate::interpreter::errors::{InterpreterError, SourceContext};
use crate::interpreter::signal::{self, Disposition};
use crate::interpreter::stack;
use crate::interpreter::subroutines;
use crate::interpreter::trace;
use crate::interpreter::types::{ControlOutcome, ExecutionLimits, ExecutionState};
use crate::interpreter::variables;
use crate::value::Value;

fn ctx(state: &ExecutionState) -> SourceContext {
    SourceContext::new(
        state.current_line,
        state.source_lines.get(state.current_line.saturating_sub(1)).cloned().unwrap_or_default(),
        state.source_filename.clone(),
    )
}

/// Run a freshly parsed script from the top: discovers labels/subroutines
/// against the whole list, then walks it from index 0.
pub async fn run_script(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    limits: &ExecutionLimits,
    cmds: &[Command],
) -> Result<ControlOutcome, InterpreterError> {
    state.labels = subroutines::discover_labels(cmds);
    state.subroutines = subroutines::discover_subroutines(cmds);
    execute_command_list(state, collab, limits, cmds, 0, true).await
}

/// Walk `cmds` starting at `start_index`. `top_level` governs whether a
/// `Jump` outcome (directly produced or bubbled up from a nested block) is
/// absorbed by this loop's own index or propagated to the caller: labels
/// are only ever indexed against the outermost list a script or
/// subroutine runs over (see `subroutines::discover_labels`), so only
/// that outermost call is allowed to resume itself at `to_index`.
pub async fn execute_command_list(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    limits: &ExecutionLimits,
    cmds: &[Command],
    start_index: usize,
    top_level: bool,
) -> Result<ControlOutcome, InterpreterError> {
    let mut index = start_index;
    while index < cmds.len() {
        state.command_count += 1;
        if state.command_count > limits.max_command_count {
            return Err(InterpreterError::LoopSafety { limit: limits.max_command_count, context: ctx(state) });
        }

        let cmd = &cmds[index];
        state.current_line = cmd.line_number;
        trace::trace_instruction(collab.output, state.trace_mode, cmd).await;

        let result = Box::pin(execute_command(state, collab, limits, cmds, cmd)).await;
        match result {
            Ok(ControlOutcome::Continue) => index += 1,
            Ok(ControlOutcome::Jump { to_index }) => {
                if top_level {
                    index = to_index;
                } else {
                    return Ok(ControlOutcome::Jump { to_index });
                }
            }
            Ok(ControlOutcome::SkipCommands { n }) => {
                if top_level {
                    index = (index + 1 + n).min(cmds.len());
                } else {
                    return Ok(ControlOutcome::SkipCommands { n });
                }
            }
            Ok(other) => return Ok(other),
            Err(err) if err.is_terminated() => return Err(err),
            Err(err) => {
                let (disposition, _report) = signal::dispatch_error(state, err);
                match disposition {
                    Disposition::Jump(ControlOutcome::Jump { to_index }) => {
                        if top_level {
                            index = to_index;
                        } else {
                            return Ok(ControlOutcome::Jump { to_index });
                        }
                    }
                    Disposition::Jump(other) => return Ok(other),
                    Disposition::Propagate(err) => return Err(err),
                }
            }
        }
    }
    Ok(ControlOutcome::Continue)
}

async fn execute_command(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    limits: &ExecutionLimits,
    cmds: &[Command],
    cmd: &Command,
) -> Result<ControlOutcome, InterpreterError> {
    match &cmd.kind {
        CommandKind::Nop | CommandKind::NoInterpret => Ok(ControlOutcome::Continue),

        CommandKind::Assignment { target, expression } => {
            let value = eval_expression(state, expression, collab).await?;
            variables::set(state, target, value);
            Ok(ControlOutcome::Continue)
        }

        CommandKind::FunctionCall { command, params } => {
            let mut args = Vec::with_capacity(params.len());
            for (name, expr) in params {
                let value = eval_expression(state, expr, collab).await?;
                args.push((Some(name.clone()), value));
            }
            dispatch(state, collab, command, args).await?;
            Ok(ControlOutcome::Continue)
        }

        CommandKind::Say { expression } => {
            let value = eval_expression(state, expression, collab).await?;
            collab.output.output(&value.to_display_string()).await;
            Ok(ControlOutcome::Continue)
        }

        CommandKind::If { condition, then_branch, else_branch } => {
            if eval_condition(state, condition, collab).await? {
                execute_command_list(state, collab, limits, then_branch, 0, false).await
            } else if let Some(else_branch) = else_branch {
                execute_command_list(state, collab, limits, else_branch, 0, false).await
            } else {
                Ok(ControlOutcome::Continue)
            }
        }

        CommandKind::Do { loop_spec, body } => execute_do(state, collab, limits, loop_spec, body).await,

        CommandKind::Select { when_clauses, otherwise } => {
            for when in when_clauses {
                if eval_condition(state, &when.condition, collab).await? {
                    trace::trace_branch(collab.output, state.trace_mode, "WHEN").await;
                    return execute_command_list(state, collab, limits, &when.body, 0, false).await;
                }
            }
            if let Some(otherwise) = otherwise {
                trace::trace_branch(collab.output, state.trace_mode, "OTHERWISE").await;
                execute_command_list(state, collab, limits, otherwise, 0, false).await
            } else {
                Ok(ControlOutcome::Continue)
            }
        }

        CommandKind::Call { subroutine, args, is_variable_call, assign_to, .. } => {
            execute_call(state, collab, limits, cmds, subroutine, args, *is_variable_call, assign_to.as_deref()).await
        }

        CommandKind::Return { value } => {
            let value = match value {
                Some(expr) => eval_expression(state, expr, collab).await?,
                None => Value::Null,
            };
            Ok(ControlOutcome::Returned { value })
        }

        CommandKind::SignalOn { condition, label } => {
            signal::signal_on(state, condition, label.clone());
            Ok(ControlOutcome::Continue)
        }

        CommandKind::SignalOff { condition } => {
            signal::signal_off(state, condition);
            Ok(ControlOutcome::Continue)
        }

        CommandKind::SignalTo { label } => {
            let key = label.to_ascii_uppercase();
            match state.labels.get(&key) {
                Some(&to_index) => Ok(ControlOutcome::Jump { to_index }),
                None => Err(InterpreterError::Reference { kind: "label", name: label.clone(), context: ctx(state) }),
            }
        }

        CommandKind::Label { statement, .. } => match statement {
            Some(inline) => Box::pin(execute_command(state, collab, limits, cmds, inline)).await,
            None => Ok(ControlOutcome::Continue),
        },

        CommandKind::Parse { source, input, template } => {
            execute_parse(state, collab, source, input, template).await
        }

        CommandKind::Push { expression } => {
            let value = eval_expression(state, expression, collab).await?;
            stack::push(state, value);
            Ok(ControlOutcome::Continue)
        }

        CommandKind::Pull { variable } => {
            let value = stack::pull(state);
            variables::set(state, variable, value);
            Ok(ControlOutcome::Continue)
        }

        CommandKind::Queue { expression } => {
            let value = eval_expression(state, expression, collab).await?;
            stack::queue(state, value);
            Ok(ControlOutcome::Continue)
        }

        CommandKind::Address { target } => {
            state.address = target.clone().unwrap_or_else(|| "default".to_string());
            Ok(ControlOutcome::Continue)
        }

        CommandKind::AddressWithString { target, command } => {
            let value = eval_expression(state, command, collab).await?;
            route_to_address(state, collab, &Some(target.clone()), value).await?;
            Ok(ControlOutcome::Continue)
        }

        CommandKind::AddressRemote { url, auth, as_name } => {
            let mut metadata = std::collections::HashMap::new();
            if let Some(auth) = auth {
                metadata.insert("auth".to_string(), auth.clone());
            }
            state.address_targets.insert(
                as_name.to_ascii_uppercase(),
                crate::interpreter::types::AddressTargetInfo { handler: Some(url.clone()), metadata },
            );
            Ok(ControlOutcome::Continue)
        }

        CommandKind::Trace { mode } => {
            state.trace_mode = *mode;
            Ok(ControlOutcome::Continue)
        }

        CommandKind::Numeric { setting, value } => {
            let value = eval_expression(state, value, collab).await?;
            let name = match setting {
                NumericSetting::Digits => "NUMERIC_DIGITS",
                NumericSetting::Fuzz => "NUMERIC_FUZZ",
                NumericSetting::Form => "NUMERIC_FORM",
            };
            variables::set(state, name, value);
            Ok(ControlOutcome::Continue)
        }

        CommandKind::Exit { code } => {
            let code = match code {
                Some(expr) => eval_expression(state, expr, collab).await?.as_number().unwrap_or(0.0) as i32,
                None => 0,
            };
            Err(InterpreterError::Terminated { code })
        }

        CommandKind::ExitUnless { code, condition_text, message } => {
            let code = match code {
                Some(expr) => Some(eval_expression(state, expr, collab).await?.as_number().unwrap_or(1.0) as i64),
                None => None,
            };
            match signal::eval_exit_unless(state, collab, condition_text, message, code).await? {
                Some((text, exit_code)) => {
                    collab.output.output(&text).await;
                    Err(InterpreterError::Terminated { code: exit_code })
                }
                None => Ok(ControlOutcome::Continue),
            }
        }

        CommandKind::Interpret { mode, expression, imports, exports } => {
            execute_interpret(state, collab, limits, *mode, expression, imports.as_deref(), exports.as_deref()).await
        }

        CommandKind::RetryOnStale { timeout, preserve, body } => {
            execute_retry_on_stale(state, collab, limits, timeout, preserve, body).await
        }

        CommandKind::HeredocString { content, delimiter, address_target } => {
            let value = Value::from_heredoc(content, delimiter)
                .map_err(|e| InterpreterError::Json { message: e.message, context: ctx(state) })?;
            route_to_address(state, collab, address_target, value).await?;
            Ok(ControlOutcome::Continue)
        }

        CommandKind::QuotedString { value } => {
            route_to_address(state, collab, &None, Value::String(value.clone())).await?;
            Ok(ControlOutcome::Continue)
        }
    }
}

/// Route a bare heredoc/quoted-string/`ADDRESS target "command"` payload
/// to the named (or current) `ADDRESS` target via the `AddressSender`.
async fn route_to_address(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    target: &Option<String>,
    value: Value,
) -> Result<Value, InterpreterError> {
    let target_name = target.clone().unwrap_or_else(|| state.address.clone());
    let handler = state
        .address_targets
        .get(&target_name)
        .and_then(|info| info.handler.clone())
        .unwrap_or_else(|| target_name.clone());

    let sender = collab.address_sender.ok_or_else(|| InterpreterError::Address {
        message: format!("no address sender configured for {}", target_name),
        context: ctx(state),
    })?;

    let mut params = std::collections::HashMap::new();
    params.insert("_1".to_string(), value);
    sender.send(&handler, "EXEC", params).await.map_err(|message| InterpreterError::Address { message, context: ctx(state) })
}

async fn execute_do(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    limits: &ExecutionLimits,
    loop_spec: &LoopSpec,
    body: &[Command],
) -> Result<ControlOutcome, InterpreterError> {
    match loop_spec {
        LoopSpec::Infinite => {
            Err(InterpreterError::Syntax { message: "DO without a loop specification is not allowed".to_string(), context: ctx(state) })
        }

        LoopSpec::Range { var, start, end } => {
            let start_value = eval_expression(state, start, collab).await?.as_number().ok_or_else(|| type_err(state, "DO range start is not numeric"))?;
            let end_value = eval_expression(state, end, collab).await?.as_number().ok_or_else(|| type_err(state, "DO range end is not numeric"))?;
            run_numeric_loop(state, collab, limits, var, start_value, end_value, 1.0, body).await
        }

        LoopSpec::RangeWithStep { var, start, end, step } => {
            let start_value = eval_expression(state, start, collab).await?.as_number().ok_or_else(|| type_err(state, "DO range start is not numeric"))?;
            let end_value = eval_expression(state, end, collab).await?.as_number().ok_or_else(|| type_err(state, "DO range end is not numeric"))?;
            let step_value = eval_expression(state, step, collab).await?.as_number().ok_or_else(|| type_err(state, "DO range step is not numeric"))?;
            run_numeric_loop(state, collab, limits, var, start_value, end_value, step_value, body).await
        }

        LoopSpec::While { cond } => {
            let mut iterations: u64 = 0;
            loop {
                if !eval_condition(state, cond, collab).await? {
                    return Ok(ControlOutcome::Continue);
                }
                iterations += 1;
                if iterations > limits.max_loop_iterations {
                    return Err(InterpreterError::LoopSafety { limit: limits.max_loop_iterations, context: ctx(state) });
                }
                match execute_command_list(state, collab, limits, body, 0, false).await? {
                    ControlOutcome::Continue => continue,
                    other => return Ok(other),
                }
            }
        }

        LoopSpec::Until { cond } => {
            let mut iterations: u64 = 0;
            loop {
                iterations += 1;
                if iterations > limits.max_loop_iterations {
                    return Err(InterpreterError::LoopSafety { limit: limits.max_loop_iterations, context: ctx(state) });
                }
                match execute_command_list(state, collab, limits, body, 0, false).await? {
                    ControlOutcome::Continue => {}
                    other => return Ok(other),
                }
                if eval_condition(state, cond, collab).await? {
                    return Ok(ControlOutcome::Continue);
                }
            }
        }

        LoopSpec::Repeat { count } => {
            let count = eval_expression(state, count, collab).await?.as_number().ok_or_else(|| type_err(state, "DO REPEAT count is not numeric"))?;
            if count < 0.0 {
                return Err(InterpreterError::Arithmetic { message: "REPEAT count must not be negative".to_string(), context: ctx(state) });
            }
            for _ in 0..(count as u64) {
                match execute_command_list(state, collab, limits, body, 0, false).await? {
                    ControlOutcome::Continue => continue,
                    other => return Ok(other),
                }
            }
            Ok(ControlOutcome::Continue)
        }

        LoopSpec::Over { var, array } => {
            let value = eval_expression(state, array, collab).await?;
            let items = iterate_over(&value, ctx(state))?;
            let guard = LoopVarGuard::capture(state, var);
            for item in items {
                variables::set(state, var, item);
                match execute_command_list(state, collab, limits, body, 0, false).await {
                    Ok(ControlOutcome::Continue) => continue,
                    Ok(other) => {
                        guard.restore(state);
                        return Ok(other);
                    }
                    Err(err) => {
                        guard.restore(state);
                        return Err(err);
                    }
                }
            }
            guard.restore(state);
            Ok(ControlOutcome::Continue)
        }
    }
}

fn type_err(state: &ExecutionState, message: &str) -> InterpreterError {
    InterpreterError::Type { message: message.to_string(), context: ctx(state) }
}

async fn run_numeric_loop(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    limits: &ExecutionLimits,
    var: &str,
    start: f64,
    end: f64,
    step: f64,
    body: &[Command],
) -> Result<ControlOutcome, InterpreterError> {
    let values = numeric_range(start, end, step, ctx(state))?;
    let guard = LoopVarGuard::capture(state, var);
    for value in values {
        variables::set(state, var, numeric_value(value));
        match execute_command_list(state, collab, limits, body, 0, false).await {
            Ok(ControlOutcome::Continue) => continue,
            Ok(other) => {
                guard.restore(state);
                return Ok(other);
            }
            Err(err) => {
                guard.restore(state);
                return Err(err);
            }
        }
    }
    guard.restore(state);
    Ok(ControlOutcome::Continue)
}

fn numeric_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007e15 {
        Value::Integer(n as i64)
    } else {
        Value::Float(n)
    }
}

async fn execute_call(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    limits: &ExecutionLimits,
    cmds: &[Command],
    subroutine: &str,
    args: &[crate::ast::types::Expression],
    is_variable_call: bool,
    assign_to: Option<&str>,
) -> Result<ControlOutcome, InterpreterError> {
    let mut arg_values = Vec::with_capacity(args.len());
    for expr in args {
        arg_values.push(eval_expression(state, expr, collab).await?);
    }

    // A quoted path (contains '/' or a dotted extension) that isn't an
    // indirect `(expr)` call is routed to the external `ScriptLoader`
    // rather than the in-process subroutine table.
    let looks_like_path = !is_variable_call && (subroutine.contains('/') || subroutine.contains('.'));
    let return_value = if looks_like_path {
        let loader = collab.script_loader.ok_or_else(|| InterpreterError::Library {
            message: format!("no script loader configured, cannot CALL \"{}\"", subroutine),
            context: ctx(state),
        })?;
        let loaded = loader.load_script(subroutine).await.map_err(|message| InterpreterError::Library { message, context: ctx(state) })?;
        subroutines::push_args_frame(state, arg_values);
        let result = run_script(state, collab, limits, &loaded.commands).await;
        subroutines::pop_args_frame(state);
        match result? {
            ControlOutcome::Returned { value } => value,
            _ => Value::Null,
        }
    } else {
        let name = subroutines::resolve_call_name(state, subroutine, is_variable_call);
        let start_index = state
            .subroutines
            .get(&name)
            .map(|s| s.start_index)
            .or_else(|| state.labels.get(&name).copied())
            .ok_or_else(|| InterpreterError::Reference { kind: "subroutine", name: name.clone(), context: ctx(state) })?;

        if state.call_depth + 1 > limits.max_call_depth {
            return Err(InterpreterError::LoopSafety { limit: limits.max_call_depth as u64, context: ctx(state) });
        }
        state.call_depth += 1;
        subroutines::push_args_frame(state, arg_values);
        let result = execute_command_list(state, collab, limits, cmds, start_index, true).await;
        subroutines::pop_args_frame(state);
        state.call_depth -= 1;
        match result? {
            ControlOutcome::Returned { value } => value,
            _ => Value::Null,
        }
    };

    variables::set(state, subroutines::RESULT_VARIABLE, return_value.clone());
    if let Some(target) = assign_to {
        variables::set(state, target, return_value);
    }
    Ok(ControlOutcome::Continue)
}

async fn execute_parse(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    source: &ParseSource,
    input: &Option<crate::ast::types::Expression>,
    template: &[String],
) -> Result<ControlOutcome, InterpreterError> {
    let source_text = match source {
        ParseSource::Arg => state
            .call_args
            .last()
            .map(|frame| frame.iter().map(|v| v.to_display_string()).collect::<Vec<_>>().join(" "))
            .unwrap_or_else(|| state.argv.join(" ")),
        ParseSource::Var(name) => variables::get(state, name).to_display_string(),
        ParseSource::Value(_) => {
            let expr = input.as_ref().expect("PARSE VALUE always carries its input expression");
            eval_expression(state, expr, collab).await?.to_display_string()
        }
    };

    let words: Vec<&str> = source_text.split_whitespace().collect();
    for (i, name) in template.iter().enumerate() {
        let value = if i + 1 == template.len() {
            words.get(i..).map(|rest| rest.join(" ")).unwrap_or_default()
        } else {
            words.get(i).map(|w| w.to_string()).unwrap_or_default()
        };
        variables::set(state, name, Value::String(value));
    }
    Ok(ControlOutcome::Continue)
}

async fn execute_interpret(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    limits: &ExecutionLimits,
    mode: InterpretMode,
    expression: &crate::ast::types::Expression,
    imports: Option<&[String]>,
    exports: Option<&[String]>,
) -> Result<ControlOutcome, InterpreterError> {
    let source = eval_expression(state, expression, collab).await?.to_display_string();
    let parsed = crate::parser::parse(&source).map_err(|e| InterpreterError::Syntax { message: e.to_string(), context: ctx(state) })?;

    match mode {
        InterpretMode::Normal => Box::pin(run_script(state, collab, limits, &parsed)).await,
        InterpretMode::Isolated => {
            let mut scratch = ExecutionState::new();
            scratch.interpolation_pattern = state.interpolation_pattern.clone();
            if let Some(imports) = imports {
                for name in imports {
                    scratch.variables.insert(name.clone(), variables::get(state, name));
                }
            }
            let outcome = Box::pin(run_script(&mut scratch, collab, limits, &parsed)).await?;
            if let Some(exports) = exports {
                for name in exports {
                    variables::set(state, name, variables::get(&scratch, name));
                }
            }
            Ok(outcome)
        }
    }
}

/// Run `body`, retrying while it raises the "stale element" categorised
/// error (`RC` 40) until `timeout` seconds have elapsed, restoring the
/// `preserve`d variables before each retry. The runtime semantics here
/// are this crate's own decision (spec.md names the statement form but
/// not its behavior) — see DESIGN.md.
async fn execute_retry_on_stale(
    state: &mut ExecutionState,
    collab: &Dispatch<'_>,
    limits: &ExecutionLimits,
    timeout: &crate::ast::types::Expression,
    preserve: &[String],
    body: &[Command],
) -> Result<ControlOutcome, InterpreterError> {
    let timeout_secs = eval_expression(state, timeout, collab).await?.as_number().unwrap_or(0.0).max(0.0);
    let deadline = std::time::Instant::now() + Duration::from_secs_f64(timeout_secs);

    loop {
        let saved: Vec<(String, Value)> = preserve.iter().map(|name| (name.clone(), variables::get(state, name))).collect();
        match execute_command_list(state, collab, limits, body, 0, false).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) if err.rc_code() == 40 && std::time::Instant::now() < deadline => {
                for (name, value) in saved {
                    variables::set(state, &name, value);
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
