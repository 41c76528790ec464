//! Parser error types.

use thiserror::Error;

/// Errors raised while turning source text into a command tree. Carries
/// enough context (line number, offending text) to format a useful
/// diagnostic without back-referencing any interpreter state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseException {
    #[error("line {line}: unterminated heredoc, expected delimiter '{delimiter}' (opened at line {start_line})")]
    UnterminatedHeredoc { delimiter: String, start_line: usize, line: usize },

    #[error("line {line}: syntax error: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("line {line}: array access `{name}[...]` is not allowed in expressions; use ARRAY_GET")]
    ArrayAccessInExpression { line: usize, name: String },

    #[error("line {line}: EXIT UNLESS requires a comma between condition and message, found '{found}'")]
    ExitUnlessMissingComma { line: usize, found: String },

    #[error("line {line}: assignment target `{target}[...]` is not allowed; use ARRAY_SET")]
    ArrayAssignmentTarget { line: usize, target: String },

    #[error("line {line}: zero step in DO range is not allowed")]
    ZeroStep { line: usize },

    #[error("line {line}: unbalanced parentheses")]
    UnbalancedParens { line: usize },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
}

impl ParseException {
    pub fn line(&self) -> usize {
        match self {
            ParseException::UnterminatedHeredoc { line, .. } => *line,
            ParseException::SyntaxError { line, .. } => *line,
            ParseException::ArrayAccessInExpression { line, .. } => *line,
            ParseException::ExitUnlessMissingComma { line, .. } => *line,
            ParseException::ArrayAssignmentTarget { line, .. } => *line,
            ParseException::ZeroStep { line } => *line,
            ParseException::UnbalancedParens { line } => *line,
            ParseException::UnterminatedString { line } => *line,
        }
    }
}
