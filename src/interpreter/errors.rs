//! Interpreter error taxonomy (spec §7).
//!
//! Every variant carries a `SourceContext` — a plain value type with no
//! back-reference to the interpreter, so error records can be cloned,
//! logged, or handed to an embedder without dragging the whole execution
//! state along (see DESIGN.md, Open Question "Cyclic references in error
//! captures").

use std::collections::HashMap;
use thiserror::Error;

use crate::value::Value;

/// Line, source text, and filename of the command that raised an error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceContext {
    pub line: usize,
    pub source_line: String,
    pub filename: Option<String>,
}

impl SourceContext {
    pub fn new(line: usize, source_line: impl Into<String>, filename: Option<String>) -> Self {
        Self { line, source_line: source_line.into(), filename }
    }
}

/// Every error the evaluator can raise, plus `Terminated` which is a
/// control-flow outcome rather than a failure (kept in this enum so the
/// evaluator has one `Result<_, InterpreterError>` return type throughout,
/// the way the teacher keeps `BreakError`/`ReturnError`/`ExitError` uniform
/// under one `InterpreterError`).
#[derive(Debug, Clone, Error)]
pub enum InterpreterError {
    #[error("syntax error at line {}: {message}", .context.line)]
    Syntax { message: String, context: SourceContext },

    #[error("reference error at line {}: unknown {kind} {name:?}", .context.line)]
    Reference { kind: &'static str, name: String, context: SourceContext },

    #[error("type error at line {}: {message}", .context.line)]
    Type { message: String, context: SourceContext },

    #[error("arithmetic error at line {}: {message}", .context.line)]
    Arithmetic { message: String, context: SourceContext },

    #[error("function error at line {}: missing function {name:?}", .context.line)]
    Function { name: String, docs_url: Option<String>, context: SourceContext },

    #[error("library error at line {}: {message}", .context.line)]
    Library { message: String, context: SourceContext },

    #[error("address error at line {}: {message}", .context.line)]
    Address { message: String, context: SourceContext },

    #[error("json error at line {}: {message}", .context.line)]
    Json { message: String, context: SourceContext },

    #[error("loop safety error at line {}: exceeded {limit} iterations", .context.line)]
    LoopSafety { limit: u64, context: SourceContext },

    /// Not a failure: `EXIT` / `EXIT UNLESS` fired. Carries the snapshot of
    /// accumulated output the same way the teacher's `ExitError` carries
    /// stdout/stderr through unwinding.
    #[error("terminated with exit code {code}")]
    Terminated { code: i32 },
}

impl InterpreterError {
    pub fn context(&self) -> Option<&SourceContext> {
        match self {
            InterpreterError::Syntax { context, .. }
            | InterpreterError::Reference { context, .. }
            | InterpreterError::Type { context, .. }
            | InterpreterError::Arithmetic { context, .. }
            | InterpreterError::Function { context, .. }
            | InterpreterError::Library { context, .. }
            | InterpreterError::Address { context, .. }
            | InterpreterError::Json { context, .. }
            | InterpreterError::LoopSafety { context, .. } => Some(context),
            InterpreterError::Terminated { .. } => None,
        }
    }

    /// The categorised `RC` code populated by the SIGNAL/error module
    /// (spec §4.9): 40 stale element, 41 element-not-found, 42 general
    /// DOM, else 1. This core has no DOM collaborator of its own, so only
    /// the generic fallback applies unless a collaborator surfaces one of
    /// those codes via `Address`/`Library`/`Function` message text.
    pub fn rc_code(&self) -> i32 {
        match self {
            InterpreterError::Address { message, .. } | InterpreterError::Library { message, .. } => {
                if message.contains("stale element") {
                    40
                } else if message.contains("element not found") {
                    41
                } else if message.contains("DOM") {
                    42
                } else {
                    1
                }
            }
            _ => 1,
        }
    }

    pub fn cleaned_message(&self) -> String {
        self.to_string()
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, InterpreterError::Terminated { .. })
    }
}

/// A variable snapshot captured alongside an unhandled error (spec §6.3).
pub fn snapshot_variables(variables: &HashMap<String, Value>) -> HashMap<String, Value> {
    variables.clone()
}

/// Error raised when execution limits are exceeded — distinct from
/// `LoopSafety` because it covers call depth and total command count, not
/// just WHILE/UNTIL iteration.
#[derive(Debug, Clone, Error)]
#[error("execution limit exceeded: {message}")]
pub struct ExecutionLimitError {
    pub message: String,
}
