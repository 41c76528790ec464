//! Parser for the Rexx-family scripting language.
//!
//! Source text flows: preprocessor -> tokenizer -> statement parser
//! (calling into the expression parser for sub-expressions) -> command
//! tree.

pub mod expression_parser;
pub mod interpolation;
pub mod lexer;
pub mod parser;
pub mod preprocessor;
pub mod statement_parser;
pub mod types;

pub use interpolation::InterpolationPattern;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{parse, parse_with_pattern, Parser};
pub use types::ParseException;
