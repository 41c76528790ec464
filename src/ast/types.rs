//! Command tree node types for the Rexx-family language.
//!
//! Mirrors the shape of the language spec's "Command"/"Expression"/
//! "Condition"/"LoopSpec" data model closely enough that the evaluator can
//! match on a node and find exactly the fields it needs.

use crate::value::Value;
use std::collections::HashMap;

/// Every command carries its originating line number and the original
/// source text, both used for diagnostics (SIGL, trace output, error
/// reporting).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub line_number: usize,
    pub original_line: String,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(line_number: usize, original_line: impl Into<String>, kind: CommandKind) -> Self {
        Self { line_number, original_line: original_line.into(), kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Assignment { target: String, expression: Expression },
    FunctionCall { command: String, params: HashMap<String, Expression> },
    Say { expression: Expression },
    If { condition: Condition, then_branch: Vec<Command>, else_branch: Option<Vec<Command>> },
    Do { loop_spec: LoopSpec, body: Vec<Command> },
    Select { when_clauses: Vec<WhenClause>, otherwise: Option<Vec<Command>> },
    Call { subroutine: String, display_name: String, args: Vec<Expression>, is_variable_call: bool, assign_to: Option<String> },
    Return { value: Option<Expression> },
    SignalOn { condition: String, label: Option<String> },
    SignalOff { condition: String },
    SignalTo { label: String },
    Label { name: String, statement: Option<Box<Command>> },
    Parse { source: ParseSource, input: Option<Expression>, template: Vec<String> },
    Push { expression: Expression },
    Pull { variable: String },
    Queue { expression: Expression },
    Address { target: Option<String> },
    AddressWithString { target: String, command: Expression },
    AddressRemote { url: String, auth: Option<String>, as_name: String },
    Trace { mode: TraceMode },
    Numeric { setting: NumericSetting, value: Expression },
    Exit { code: Option<Expression> },
    ExitUnless { code: Option<Expression>, condition_text: String, message: Expression },
    Interpret { mode: InterpretMode, expression: Expression, imports: Option<Vec<String>>, exports: Option<Vec<String>> },
    NoInterpret,
    RetryOnStale { timeout: Expression, preserve: Vec<String>, body: Vec<Command> },
    HeredocString { content: String, delimiter: String, address_target: Option<String> },
    QuotedString { value: String },
    Nop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseSource {
    Arg,
    Var(String),
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumericSetting {
    Digits,
    Fuzz,
    Form,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    Off,
    Normal,
    A,
    R,
    I,
    O,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretMode {
    Normal,
    Isolated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub condition: Condition,
    pub body: Vec<Command>,
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Variable { name: String },
    ArrayLiteral { elements: Vec<Expression> },
    BinaryOp { op: BinaryOperator, left: Box<Expression>, right: Box<Expression> },
    PipeOp { left: Box<Expression>, right: Box<Expression> },
    FunctionCall { command: String, params: HashMap<String, Expression>, positional: Vec<Expression> },
    InterpolatedString { template: String },
    Heredoc { content: String, delimiter: String },
    /// A raw, un-split text node resolved by the `||` concatenation
    /// evaluator at runtime (lets concatenation defer sub-parsing of each
    /// side until evaluation, matching how the statement parser treats `||`
    /// as a late-bound split rather than a parse-time one).
    Concatenation { parts: Vec<Expression> },
    ArrayAccess { variable: String, index: Box<Expression> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntDivide,
    Modulo,
    Power,
    Concat,
}

// =============================================================================
// CONDITIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Comparison { left: Expression, op: ComparisonOperator, right: Expression },
    Boolean { expression: Expression },
    LogicalAnd { parts: Vec<Condition> },
    LogicalOr { parts: Vec<Condition> },
    LogicalNot { operand: Box<Condition> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// =============================================================================
// LOOP SPECS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LoopSpec {
    Range { var: String, start: Expression, end: Expression },
    RangeWithStep { var: String, start: Expression, end: Expression, step: Expression },
    While { cond: Condition },
    Until { cond: Condition },
    Repeat { count: Expression },
    Over { var: String, array: Expression },
    /// Forbidden at runtime (a `DO` with no spec at all); kept as a variant
    /// so the parser can still build the node and the evaluator can reject
    /// it with a proper `SyntaxError` instead of failing to parse at all.
    Infinite,
}
