//! Interpreter module
//!
//! The tree-walking evaluator for the Rexx-family scripting language:
//! value/variable plumbing, expression and condition evaluation,
//! control-flow and loop bookkeeping, subroutine/label resolution,
//! signal/error dispatch, the single collaborator dispatch point, trace
//! output, and the top-level command-list walker that ties them together.

pub mod arithmetic;
pub mod condition;
pub mod control_flow;
pub mod dispatcher;
pub mod errors;
pub mod execution_engine;
pub mod signal;
pub mod stack;
pub mod subroutines;
pub mod trace;
pub mod types;
pub mod variables;

pub use dispatcher::Dispatch;
pub use errors::InterpreterError;
pub use execution_engine::run_script;
pub use types::{ControlOutcome, ExecResult, ExecutionLimits, ExecutionState};
