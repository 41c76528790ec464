//! rexxlang - an embeddable Rexx-family scripting language engine
//!
//! This library provides a complete parser and evaluator for a small,
//! modernized Rexx-family scripting language: lexer/preprocessor,
//! recursive-descent statement and expression parsers, and an async
//! tree-walking evaluator. The function library, `ADDRESS` transports,
//! `REQUIRE` loader, and output sinks are external collaborators reached
//! through traits in `collaborators`, never baked into the core.

pub mod ast;
pub mod collaborators;
pub mod interpreter;
pub mod parser;
pub mod rexx;
pub mod value;

pub use ast::types::{Command, CommandKind};
pub use interpreter::{ControlOutcome, Dispatch, ExecResult, ExecutionLimits, ExecutionState, InterpreterError};
pub use parser::{parse, ParseException, Parser};
pub use rexx::{Interpreter, RexxOptions};
pub use value::Value;
