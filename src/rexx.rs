//! Rexx Environment
//!
//! Main entry point for the interpreter. Ties together the parser,
//! evaluator, and the collaborator set a running script needs.

use std::collections::HashMap;

use crate::collaborators::{AddressSender, FunctionRegistry, LibraryLoader, NoopFunctionRegistry, NoopLibraryLoader, NullOutputSink, OutputSink, ScriptLoader};
use crate::interpreter::dispatcher::Dispatch;
use crate::interpreter::errors::InterpreterError;
use crate::interpreter::execution_engine::run_script;
use crate::interpreter::types::{ControlOutcome, ExecResult, ExecutionLimits, ExecutionState};

/// Options for creating a Rexx interpreter.
pub struct RexxOptions {
    /// Positional script arguments, readable via `ARG(n)`/`PARSE ARG`.
    pub argv: Option<Vec<String>>,
    /// Execution limits (loop/call-depth/command-count caps).
    pub limits: Option<ExecutionLimits>,
    pub registry: Option<Box<dyn FunctionRegistry>>,
    pub address_sender: Option<Box<dyn AddressSender>>,
    pub library_loader: Option<Box<dyn LibraryLoader>>,
    pub output: Option<Box<dyn OutputSink>>,
    pub script_loader: Option<Box<dyn ScriptLoader>>,
}

impl Default for RexxOptions {
    fn default() -> Self {
        Self {
            argv: None,
            limits: None,
            registry: None,
            address_sender: None,
            library_loader: None,
            output: None,
            script_loader: None,
        }
    }
}

/// The main Rexx interpreter. Owns one `ExecutionState` plus the
/// collaborator set a running script needs, the way the teacher's `Bash`
/// owns one `InterpreterState` plus its filesystem.
pub struct Interpreter {
    limits: ExecutionLimits,
    state: ExecutionState,
    registry: Box<dyn FunctionRegistry>,
    /// Left unset (`None`) rather than defaulted to a no-op fixture: the
    /// dispatcher's final fallback step distinguishes "no transport
    /// configured at all" (`MissingFunction`) from "a transport is
    /// configured but rejected the call" (`Address` error), and an
    /// embedder that never supplies one means the former.
    address_sender: Option<Box<dyn AddressSender>>,
    library_loader: Box<dyn LibraryLoader>,
    output: Box<dyn OutputSink>,
    script_loader: Option<Box<dyn ScriptLoader>>,
}

impl Interpreter {
    /// Create a new interpreter. Collaborators default to no-op fixtures
    /// (mirroring `Bash::new`'s default in-memory filesystem) — an
    /// embedder supplies real ones via `RexxOptions`.
    pub fn new(options: RexxOptions) -> Self {
        let limits = options.limits.unwrap_or_default();
        let mut state = ExecutionState::new();
        state.argv = options.argv.unwrap_or_default();

        Self {
            limits,
            state,
            registry: options.registry.unwrap_or_else(|| Box::new(NoopFunctionRegistry)),
            address_sender: options.address_sender,
            library_loader: options.library_loader.unwrap_or_else(|| Box::new(NoopLibraryLoader)),
            output: options.output.unwrap_or_else(|| Box::new(NullOutputSink)),
            script_loader: options.script_loader,
        }
    }

    /// Execute a script: parse, discover labels/subroutines, and run it
    /// from the top against the current `ExecutionState`, accumulating
    /// output from every `SAY`/heredoc-dispatch call this run produced.
    pub async fn exec(&mut self, script: &str) -> ExecResult {
        let trimmed = script.trim();
        if trimmed.is_empty() {
            return ExecResult::ok();
        }

        self.state.load_source(script, None);

        let ast = match crate::parser::parse(script) {
            Ok(ast) => ast,
            Err(e) => return ExecResult::new(String::new(), format!("syntax error: {}\n", e), 2),
        };

        let sink = crate::collaborators::CollectingOutputSink::default();
        let collab = Dispatch {
            registry: self.registry.as_ref(),
            address_sender: self.address_sender.as_deref(),
            library_loader: self.library_loader.as_ref(),
            output: &sink,
            script_loader: self.script_loader.as_deref(),
        };

        let result = run_script(&mut self.state, &collab, &self.limits, &ast).await;
        let stdout = sink.lines.lock().unwrap().join("\n");
        let stdout = if stdout.is_empty() { stdout } else { format!("{}\n", stdout) };

        match result {
            Ok(ControlOutcome::Returned { .. }) | Ok(ControlOutcome::Continue) => ExecResult::new(stdout, String::new(), 0),
            Ok(ControlOutcome::Jump { .. }) | Ok(ControlOutcome::SkipCommands { .. }) => {
                ExecResult::new(stdout, String::new(), 0)
            }
            Ok(ControlOutcome::Terminated { code }) => ExecResult::new(stdout, String::new(), code),
            Err(InterpreterError::Terminated { code }) => ExecResult::new(stdout, String::new(), code),
            Err(err) => ExecResult::new(stdout, format!("{}\n", err), 1),
        }
    }

    /// Current value of every bound variable, for embedder inspection.
    pub fn variables(&self) -> &HashMap<String, crate::value::Value> {
        &self.state.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_empty_script_is_ok() {
        let mut interp = Interpreter::new(RexxOptions::default());
        let result = interp.exec("").await;
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn exec_syntax_error_reports_exit_code_two() {
        let mut interp = Interpreter::new(RexxOptions::default());
        let result = interp.exec("IF THEN").await;
        assert_eq!(result.exit_code, 2);
        assert!(result.stderr.contains("syntax error"));
    }

    #[tokio::test]
    async fn exec_say_collects_stdout() {
        let mut interp = Interpreter::new(RexxOptions::default());
        let result = interp.exec("SAY \"hello\"").await;
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn exec_exit_sets_exit_code() {
        let mut interp = Interpreter::new(RexxOptions::default());
        let result = interp.exec("EXIT 42").await;
        assert_eq!(result.exit_code, 42);
    }
}
