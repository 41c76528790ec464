//! Abstract Syntax Tree (AST) Types for the Rexx-family language.
//!
//! Architecture:
//!   Input -> preprocessor -> tokenizer -> statement parser (calling the
//!   expression parser on substrings) -> command tree -> evaluator.

pub mod types;
