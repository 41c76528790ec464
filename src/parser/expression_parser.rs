//! Expression parser
//!
//! Recursive-descent with precedence, lowest to highest:
//! pipe `|>` -> additive `+ -` -> multiplicative `* / % // **` -> factor.
//!
//! `**` groups with the multiplicative level rather than binding tighter,
//! matching this dialect's grammar rather than classic Rexx's.

use std::collections::HashMap;

use crate::ast::types::{BinaryOperator, Expression};
use crate::parser::interpolation::InterpolationPattern;
use crate::parser::types::ParseException;
use crate::value::Value;

pub struct ExpressionParser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    pattern: &'a InterpolationPattern,
}

impl<'a> ExpressionParser<'a> {
    pub fn new(source: &str, line: usize, pattern: &'a InterpolationPattern) -> Self {
        Self { chars: source.chars().collect(), pos: 0, line, pattern }
    }

    pub fn parse(source: &str, line: usize, pattern: &'a InterpolationPattern) -> Result<Expression, ParseException> {
        let mut parser = Self::new(source, line, pattern);
        parser.skip_ws();
        let expr = parser.parse_pipe()?;
        parser.skip_ws();
        if parser.pos < parser.chars.len() {
            return Err(ParseException::SyntaxError {
                line: parser.line,
                message: format!("unexpected trailing input: {}", parser.rest()),
            });
        }
        Ok(expr)
    }

    fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        let needle: Vec<char> = s.chars().collect();
        if self.pos + needle.len() > self.chars.len() {
            return false;
        }
        self.chars[self.pos..self.pos + needle.len()] == needle[..]
    }

    fn consume_str(&mut self, s: &str) -> bool {
        self.skip_ws();
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    // ---- pipe: lowest precedence ----

    fn parse_pipe(&mut self) -> Result<Expression, ParseException> {
        let mut left = self.parse_additive()?;
        loop {
            self.skip_ws();
            if self.consume_str("|>") {
                self.skip_ws();
                let rhs = self.parse_additive()?;
                left = apply_pipe(left, rhs)?;
            } else {
                break;
            }
        }
        Ok(left)
    }

    // ---- additive: + - ----

    fn parse_additive(&mut self) -> Result<Expression, ParseException> {
        let mut left = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            let op = if self.starts_with("+") {
                Some(BinaryOperator::Add)
            } else if self.starts_with("-") && !self.starts_with("->") {
                Some(BinaryOperator::Subtract)
            } else {
                None
            };
            match op {
                Some(op) => {
                    self.pos += 1;
                    self.skip_ws();
                    let right = self.parse_multiplicative()?;
                    left = Expression::BinaryOp { op, left: Box::new(left), right: Box::new(right) };
                }
                None => break,
            }
        }
        Ok(left)
    }

    // ---- multiplicative: * / % // ** ----

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseException> {
        let mut left = self.parse_factor()?;
        loop {
            self.skip_ws();
            let op = if self.starts_with("**") {
                self.pos += 2;
                Some(BinaryOperator::Power)
            } else if self.starts_with("//") {
                self.pos += 2;
                Some(BinaryOperator::IntDivide)
            } else if self.starts_with("*") {
                self.pos += 1;
                Some(BinaryOperator::Multiply)
            } else if self.starts_with("/") {
                self.pos += 1;
                Some(BinaryOperator::Divide)
            } else if self.starts_with("%") {
                self.pos += 1;
                Some(BinaryOperator::Modulo)
            } else {
                None
            };
            match op {
                Some(op) => {
                    self.skip_ws();
                    let right = self.parse_factor()?;
                    left = Expression::BinaryOp { op, left: Box::new(left), right: Box::new(right) };
                }
                None => break,
            }
        }
        Ok(left)
    }

    // ---- factor ----

    fn parse_factor(&mut self) -> Result<Expression, ParseException> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                self.skip_ws();
                let inner = self.parse_pipe()?;
                self.skip_ws();
                if !self.consume_str(")") {
                    return Err(ParseException::UnbalancedParens { line: self.line });
                }
                Ok(inner)
            }
            Some('"') | Some('\'') => self.parse_quoted_string(),
            Some('[') => self.parse_array_literal(),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some('-') if self.chars.get(self.pos + 1).is_some_and(|c| c.is_ascii_digit()) => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_identifier_like(),
            _ => Err(ParseException::SyntaxError {
                line: self.line,
                message: format!("unexpected token near '{}'", self.rest()),
            }),
        }
    }

    fn parse_quoted_string(&mut self) -> Result<Expression, ParseException> {
        let quote = self.peek().unwrap();
        self.pos += 1;
        let mut out = String::new();
        let mut terminated = false;
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                if let Some(next) = self.peek() {
                    out.push(match next {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' => '\\',
                        other => other,
                    });
                    self.pos += 1;
                }
                continue;
            }
            if c == quote {
                self.pos += 1;
                terminated = true;
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        if !terminated {
            return Err(ParseException::UnterminatedString { line: self.line });
        }
        if out.contains(self.pattern.start.as_str()) {
            Ok(Expression::InterpolatedString { template: out })
        } else {
            Ok(Expression::Literal(Value::String(out)))
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expression, ParseException> {
        let start = self.pos;
        self.pos += 1; // consume '['
        let mut depth = 1usize;
        while self.pos < self.chars.len() && depth > 0 {
            match self.chars[self.pos] {
                '[' => depth += 1,
                ']' => depth -= 1,
                _ => {}
            }
            self.pos += 1;
        }
        if depth != 0 {
            return Err(ParseException::SyntaxError { line: self.line, message: "unterminated array literal".to_string() });
        }
        let raw: String = self.chars[start..self.pos].iter().collect();

        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) {
            return Ok(Expression::Literal(Value::from_json(json)));
        }

        let inner = &raw[1..raw.len() - 1];
        let parts = split_top_level(inner, ',');
        let mut elements = Vec::with_capacity(parts.len());
        for part in parts {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            elements.push(ExpressionParser::parse(trimmed, self.line, self.pattern)?);
        }
        Ok(Expression::ArrayLiteral { elements })
    }

    fn parse_number(&mut self) -> Result<Expression, ParseException> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.chars.get(self.pos + 1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            let f: f64 = text.parse().map_err(|_| ParseException::SyntaxError {
                line: self.line,
                message: format!("invalid number literal '{}'", text),
            })?;
            Ok(Expression::Literal(Value::Float(f)))
        } else {
            let i: i64 = text.parse().map_err(|_| ParseException::SyntaxError {
                line: self.line,
                message: format!("invalid number literal '{}'", text),
            })?;
            Ok(Expression::Literal(Value::Integer(i)))
        }
    }

    fn parse_identifier_like(&mut self) -> Result<Expression, ParseException> {
        let start = self.pos;
        while self.pos < self.chars.len() && (self.chars[self.pos].is_alphanumeric() || self.chars[self.pos] == '_' || self.chars[self.pos] == '.') {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        match name.to_ascii_uppercase().as_str() {
            "TRUE" => return Ok(Expression::Literal(Value::Bool(true))),
            "FALSE" => return Ok(Expression::Literal(Value::Bool(false))),
            _ => {}
        }

        self.skip_ws();
        if self.peek() == Some('(') {
            return self.parse_function_call(name);
        }
        if self.peek() == Some('[') {
            return Err(ParseException::ArrayAccessInExpression { line: self.line, name });
        }
        Ok(Expression::Variable { name })
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expression, ParseException> {
        self.pos += 1; // consume '('
        let start = self.pos;
        let mut depth = 1usize;
        while self.pos < self.chars.len() && depth > 0 {
            match self.chars[self.pos] {
                '(' => depth += 1,
                ')' => depth -= 1,
                '"' | '\'' => {
                    let quote = self.chars[self.pos];
                    self.pos += 1;
                    while self.pos < self.chars.len() && self.chars[self.pos] != quote {
                        if self.chars[self.pos] == '\\' {
                            self.pos += 1;
                        }
                        self.pos += 1;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        if depth != 0 {
            return Err(ParseException::UnbalancedParens { line: self.line });
        }
        let args_text: String = self.chars[start..self.pos - 1].iter().collect();

        let raw_args = split_top_level(&args_text, ',');
        let mut positional = Vec::new();
        let mut params = HashMap::new();

        for raw in raw_args {
            let arg = raw.trim();
            if arg.is_empty() {
                continue;
            }
            if is_arrow_callback(arg) {
                positional.push(Expression::Literal(Value::String(arg.to_string())));
                continue;
            }
            if let Some(eq_pos) = find_named_param_eq(arg) {
                let param_name = arg[..eq_pos].trim().to_string();
                let value_text = arg[eq_pos + 1..].trim();
                let value_expr = ExpressionParser::parse(value_text, self.line, self.pattern)?;
                params.insert(param_name, value_expr);
            } else {
                positional.push(ExpressionParser::parse(arg, self.line, self.pattern)?);
            }
        }

        Ok(Expression::FunctionCall { command: name, params, positional })
    }
}

/// `name=` is a named-parameter marker only when the `=` isn't immediately
/// followed by `>` (that would make it an arrow-function argument).
fn find_named_param_eq(arg: &str) -> Option<usize> {
    let chars: Vec<char> = arg.chars().collect();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut byte_pos = 0usize;
    for (i, c) in chars.iter().enumerate() {
        if let Some(q) = in_string {
            if *c == q {
                in_string = None;
            }
            byte_pos += c.len_utf8();
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(*c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '=' if depth == 0 => {
                let next = chars.get(i + 1);
                if next != Some(&'>') && (i == 0 || chars[i - 1] != '=') && (i == 0 || chars[i - 1] != '!') && (i == 0 || chars[i - 1] != '<') && (i == 0 || chars[i - 1] != '>') {
                    return Some(byte_pos);
                }
            }
            _ => {}
        }
        byte_pos += c.len_utf8();
    }
    None
}

fn is_arrow_callback(arg: &str) -> bool {
    arg.contains("=>")
}

/// Split on `sep` at depth zero only, respecting parens/brackets and quoted
/// strings.
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = in_string {
            current.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                continue;
            }
            if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                current.push(c);
            }
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                parts.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current);
    }
    parts
}

/// `a |> f(args)` inserts `a` as the first positional argument of `f`,
/// unless one of `f`'s existing positional args is the placeholder `_`, in
/// which case `a` takes that slot and the rest shift left.
fn apply_pipe(left: Expression, right: Expression) -> Result<Expression, ParseException> {
    match right {
        Expression::FunctionCall { command, params, mut positional } => {
            if let Some(idx) = positional.iter().position(is_placeholder) {
                positional[idx] = left;
            } else {
                positional.insert(0, left);
            }
            Ok(Expression::FunctionCall { command, params, positional })
        }
        other => Ok(Expression::PipeOp { left: Box::new(left), right: Box::new(other) }),
    }
}

fn is_placeholder(expr: &Expression) -> bool {
    matches!(expr, Expression::Variable { name } if name == "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expression {
        let pattern = InterpolationPattern::handlebars();
        ExpressionParser::parse(src, 1, &pattern).unwrap()
    }

    #[test]
    fn parses_additive_left_to_right() {
        let expr = parse("1 + 2 - 3");
        match expr {
            Expression::BinaryOp { op: BinaryOperator::Subtract, .. } => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn power_groups_with_multiplicative() {
        // 2 + 3 ** 2 should parse as 2 + (3 ** 2), not (2+3) ** 2
        let expr = parse("2 + 3 ** 2");
        match expr {
            Expression::BinaryOp { op: BinaryOperator::Add, right, .. } => {
                match *right {
                    Expression::BinaryOp { op: BinaryOperator::Power, .. } => {}
                    other => panic!("unexpected rhs {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn array_access_in_expression_is_rejected() {
        let pattern = InterpolationPattern::handlebars();
        let err = ExpressionParser::parse("xs[1]", 1, &pattern).unwrap_err();
        matches!(err, ParseException::ArrayAccessInExpression { .. });
    }

    #[test]
    fn function_call_with_positional_and_named_args() {
        let expr = parse("f(1, x=2)");
        match expr {
            Expression::FunctionCall { command, params, positional } => {
                assert_eq!(command, "f");
                assert_eq!(positional.len(), 1);
                assert!(params.contains_key("x"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn arrow_callback_preserved_as_string_literal() {
        let expr = parse("ARRAY_MAP(xs, n => n * 2)");
        match expr {
            Expression::FunctionCall { positional, .. } => {
                assert_eq!(positional.len(), 2);
                match &positional[1] {
                    Expression::Literal(Value::String(s)) => assert_eq!(s, "n => n * 2"),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pipe_inserts_at_placeholder() {
        let expr = parse("x |> f(1, _, 3)");
        match expr {
            Expression::FunctionCall { positional, .. } => {
                assert_eq!(positional.len(), 3);
                assert_eq!(positional[1], Expression::Variable { name: "x".to_string() });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pipe_prepends_without_placeholder() {
        let expr = parse("x |> f(1, 2)");
        match expr {
            Expression::FunctionCall { positional, .. } => {
                assert_eq!(positional.len(), 3);
                assert_eq!(positional[0], Expression::Variable { name: "x".to_string() });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn array_literal_json_parses_first() {
        let expr = parse("[1, 2, 3]");
        match expr {
            Expression::Literal(Value::Array(items)) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }
}
