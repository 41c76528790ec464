//! Interpreter Types
//!
//! The process-wide execution state threaded through every evaluator
//! function, plus the small value types (`ExecResult`, `ExecutionLimits`)
//! that cross the interpreter's outer boundary.

use std::collections::HashMap;

use crate::ast::types::Command;
use crate::value::Value;

/// An error handler registered by `SIGNAL ON <condition> [NAME label]`.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    pub label: Option<String>,
    pub enabled: bool,
}

/// Metadata describing an ADDRESS routing target, as registered by a
/// `LibraryLoader` or built in by the embedder.
#[derive(Debug, Clone, Default)]
pub struct AddressTargetInfo {
    pub handler: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// A subroutine discovered from a `Label` node with a following body, or
/// registered externally. `start_index` points into the command list that
/// owns it.
#[derive(Debug, Clone)]
pub struct SubroutineInfo {
    pub start_index: usize,
}

/// Interpolation delimiter pair, instance-scoped per §9's note that the
/// pattern must not be process-wide mutable state.
pub use crate::parser::InterpolationPattern;

/// Complete execution state for one running script. One instance per
/// interpreter; never shared across concurrently-running scripts.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    /// Flat variable store. Dotted stems (`a.b.c`) are stored as one key;
    /// nested navigation happens at read/write time via `variables.rs`.
    pub variables: HashMap<String, Value>,
    /// Positional script arguments for `ARG()`/`PARSE ARG`.
    pub argv: Vec<String>,
    /// PUSH/PULL/QUEUE double-ended value sequence.
    pub stack: std::collections::VecDeque<Value>,
    /// Uppercased label name -> command index within the currently
    /// executing top-level command list.
    pub labels: HashMap<String, usize>,
    /// Uppercased subroutine name -> subroutine record.
    pub subroutines: HashMap<String, SubroutineInfo>,
    /// Per-ARG-call binding stack, one frame per active CALL.
    pub call_args: Vec<Vec<Value>>,
    /// Condition name -> handler registration.
    pub error_handlers: HashMap<String, ErrorHandler>,
    /// Current ADDRESS target; `"default"` when unset.
    pub address: String,
    pub address_targets: HashMap<String, AddressTargetInfo>,
    pub current_line: usize,
    pub source_lines: Vec<String>,
    pub source_filename: Option<String>,
    pub trace_mode: crate::ast::types::TraceMode,
    /// Guards against re-entrant error-handler dispatch.
    pub in_error_handler: bool,
    pub interpolation_pattern: InterpolationPattern,
    /// Total commands executed so far (reset per top-level `exec`).
    pub command_count: u64,
    /// Current CALL nesting depth.
    pub call_depth: u32,
}

impl Default for ExecutionState {
    fn default() -> Self {
        let mut variables = HashMap::new();
        variables.insert("RC".to_string(), Value::Integer(0));
        variables.insert("ERRORTEXT".to_string(), Value::String(String::new()));
        variables.insert("SIGL".to_string(), Value::Integer(0));

        Self {
            variables,
            argv: Vec::new(),
            stack: std::collections::VecDeque::new(),
            labels: HashMap::new(),
            subroutines: HashMap::new(),
            call_args: Vec::new(),
            error_handlers: HashMap::new(),
            address: "default".to_string(),
            address_targets: HashMap::new(),
            current_line: 0,
            source_lines: Vec::new(),
            source_filename: None,
            trace_mode: crate::ast::types::TraceMode::Off,
            in_error_handler: false,
            interpolation_pattern: InterpolationPattern::handlebars(),
            command_count: 0,
            call_depth: 0,
        }
    }
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare state for executing a new top-level script: stash source
    /// lines for diagnostics/trace, reset the per-run command counter.
    pub fn load_source(&mut self, source: &str, filename: Option<String>) {
        self.source_lines = source.lines().map(|l| l.to_string()).collect();
        self.source_filename = filename;
        self.command_count = 0;
    }
}

/// Execution result returned from a top-level script run.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self { stdout, stderr, exit_code }
    }

    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        Self::new(String::new(), stderr.into(), 1)
    }
}

/// Configurable execution limits. The 10,000-iteration WHILE/UNTIL cap
/// named in spec §4.7/§9 is `max_loop_iterations`; it's configurable per
/// interpreter rather than a hardcoded constant.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub max_call_depth: u32,
    pub max_command_count: u64,
    pub max_loop_iterations: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 1000,
            max_command_count: 1_000_000,
            max_loop_iterations: 10_000,
        }
    }
}

/// Control-flow outcome threaded back out of nested command-list
/// execution. Mirrors spec §4.6's `Terminated` / `Jump` / `SkipCommands`
/// directives plus plain fall-through (`None` / `Continue`).
#[derive(Debug, Clone)]
pub enum ControlOutcome {
    /// Nothing special happened; continue with the next command.
    Continue,
    /// Script termination requested (`EXIT`, `EXIT UNLESS` firing).
    Terminated { code: i32 },
    /// `SIGNAL label` or error-handler dispatch: resume at this index in
    /// the *current* top-level command list.
    Jump { to_index: usize },
    /// Skip the next `n` sibling commands in the current list (reserved
    /// for evaluator-internal bookkeeping; no statement form currently
    /// produces this directly).
    SkipCommands { n: usize },
    /// `RETURN [expr]` inside a subroutine: unwinds back to the `CALL`
    /// site with the returned value.
    Returned { value: Value },
}

pub(crate) fn command_at<'a>(cmds: &'a [Command], index: usize) -> Option<&'a Command> {
    cmds.get(index)
}
