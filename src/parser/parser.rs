//! Top-level parser: wires preprocessor -> tokenizer -> statement parser,
//! and drives the block structures (`IF`/`DO`/`SELECT`/`RETRY_ON_STALE`)
//! that span more than one logical line.

use crate::ast::types::{Command, CommandKind, LoopSpec, WhenClause};
use crate::parser::interpolation::InterpolationPattern;
use crate::parser::lexer::{Lexer, Token, TokenKind};
use crate::parser::preprocessor::preprocess;
use crate::parser::statement_parser::{self, parse_condition, parse_rhs_expression};
use crate::parser::types::ParseException;

pub struct Parser {
    pattern: InterpolationPattern,
}

impl Parser {
    pub fn new() -> Self {
        Self { pattern: InterpolationPattern::default() }
    }

    pub fn with_pattern(pattern: InterpolationPattern) -> Self {
        Self { pattern }
    }

    pub fn parse(&self, source: &str) -> Result<Vec<Command>, ParseException> {
        let preprocessed = preprocess(source);
        let lexer = Lexer::new(&preprocessed);
        let tokens = lexer.tokenize()?;
        let (commands, _next) = parse_sequence(&tokens, 0, &self.pattern, &[])?;
        Ok(commands)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse(source: &str) -> Result<Vec<Command>, ParseException> {
    Parser::new().parse(source)
}

pub fn parse_with_pattern(source: &str, pattern: InterpolationPattern) -> Result<Vec<Command>, ParseException> {
    Parser::with_pattern(pattern).parse(source)
}

fn first_keyword(line: &str) -> String {
    line.split_whitespace().next().unwrap_or("").to_ascii_uppercase()
}

fn is_terminator(line: &str, terminators: &[&str]) -> bool {
    let kw = first_keyword(line);
    terminators.iter().any(|t| *t == kw)
}

/// Parse a run of statements until end-of-input or a line whose leading
/// keyword matches one of `terminators` (which is left unconsumed so the
/// caller can inspect and consume it itself). Returns the parsed commands
/// plus the index of the first unconsumed token.
fn parse_sequence(
    tokens: &[Token],
    mut i: usize,
    pattern: &InterpolationPattern,
    terminators: &[&str],
) -> Result<(Vec<Command>, usize), ParseException> {
    let mut commands = Vec::new();

    while i < tokens.len() {
        let (content, line_no) = match &tokens[i].kind {
            TokenKind::Line { content } => (content.clone(), tokens[i].line),
            TokenKind::Heredoc { .. } => {
                // Orphaned heredoc body with no owning Line token; skip.
                i += 1;
                continue;
            }
        };

        let trimmed = content.trim().to_string();
        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if is_terminator(&trimmed, terminators) {
            return Ok((commands, i));
        }

        let upper = trimmed.to_ascii_uppercase();

        if upper.starts_with("IF ") {
            let (cmd, next_i) = parse_if_block(tokens, i, pattern)?;
            commands.push(cmd);
            i = next_i;
            continue;
        }

        if first_keyword(&trimmed) == "DO" {
            let (cmd, next_i) = parse_do_block(tokens, i, pattern)?;
            commands.push(cmd);
            i = next_i;
            continue;
        }

        if upper == "SELECT" {
            let (cmd, next_i) = parse_select_block(tokens, i, pattern)?;
            commands.push(cmd);
            i = next_i;
            continue;
        }

        if upper.starts_with("RETRY_ON_STALE") {
            let (cmd, next_i) = parse_retry_block(tokens, i, pattern)?;
            commands.push(cmd);
            i = next_i;
            continue;
        }

        let heredoc = pending_heredoc(tokens, i, &trimmed);
        let cmd = statement_parser::parse_statement(&trimmed, line_no, pattern, heredoc.as_ref().map(|(c, d)| (c.as_str(), d.as_str())))?;
        commands.push(cmd);
        i += if heredoc.is_some() { 2 } else { 1 };
    }

    Ok((commands, i))
}

/// If the line at `i` opens a heredoc, the tokenizer already placed its
/// body as the very next token; return it so the caller can attach it.
fn pending_heredoc(tokens: &[Token], i: usize, trimmed: &str) -> Option<(String, String)> {
    if let Some(Token { kind: TokenKind::Heredoc { content, delimiter }, .. }) = tokens.get(i + 1) {
        if trimmed.ends_with(&format!("<<{}", delimiter)) {
            return Some((content.clone(), delimiter.clone()));
        }
    }
    None
}

fn line_text(tokens: &[Token], i: usize) -> Option<(String, usize)> {
    match tokens.get(i)?.kind {
        TokenKind::Line { .. } => {
            if let TokenKind::Line { content } = &tokens[i].kind {
                Some((content.trim().to_string(), tokens[i].line))
            } else {
                None
            }
        }
        TokenKind::Heredoc { .. } => None,
    }
}

/// `IF cond THEN [DO] ... [ELSE IF ...] [ELSE ...] ENDIF|END` block form.
/// The inline `IF cond THEN stmt` single-line form never reaches this
/// function (the caller only dispatches here when no inline statement
/// follows `THEN`).
fn parse_if_block(tokens: &[Token], i: usize, pattern: &InterpolationPattern) -> Result<(Command, usize), ParseException> {
    let (content, line_no) = line_text(tokens, i).expect("caller verified a Line token");
    let original = content.clone();
    let upper = content.to_ascii_uppercase();

    let if_prefix_len = if upper.starts_with("ELSE IF ") { "ELSE IF ".len() } else { "IF ".len() };
    let rest = &content[if_prefix_len..];
    let then_pos = find_then(rest).ok_or_else(|| ParseException::SyntaxError { line: line_no, message: "IF requires THEN".to_string() })?;
    let cond_text = rest[..then_pos].trim();
    let after_then = rest[then_pos + 4..].trim();
    let condition = parse_condition(cond_text, line_no, pattern)?;

    let mut idx = i + 1;

    if !after_then.is_empty() && !after_then.eq_ignore_ascii_case("DO") {
        // Defensive: statement_parser's inline-IF path should have already
        // handled this case before the block driver ever sees it.
        let stmt = statement_parser::parse_statement(after_then, line_no, pattern, None)?;
        return Ok((Command::new(line_no, original, CommandKind::If { condition, then_branch: vec![stmt], else_branch: None }), idx));
    }

    let (then_branch, next_idx) = parse_sequence(tokens, idx, pattern, &["ELSE", "ENDIF", "END"])?;
    idx = next_idx;

    let else_branch = match line_text(tokens, idx) {
        Some((line, _)) if line.to_ascii_uppercase().starts_with("ELSE IF ") => {
            let (nested, nested_next) = parse_if_block(tokens, idx, pattern)?;
            idx = nested_next;
            Some(vec![nested])
        }
        Some((line, _)) if line.to_ascii_uppercase() == "ELSE" => {
            idx += 1;
            let (body, after_else) = parse_sequence(tokens, idx, pattern, &["ENDIF", "END"])?;
            idx = after_else;
            idx += 1; // consume ENDIF/END
            Some(body)
        }
        Some((line, _)) if matches!(line.to_ascii_uppercase().as_str(), "ENDIF" | "END") => {
            idx += 1;
            None
        }
        _ => None,
    };

    Ok((Command::new(line_no, original, CommandKind::If { condition, then_branch, else_branch }), idx))
}

fn find_then(s: &str) -> Option<usize> {
    let upper = s.to_ascii_uppercase();
    let mut from = 0;
    while let Some(pos) = upper[from..].find("THEN") {
        let abs = from + pos;
        let before_ok = abs == 0 || !upper.as_bytes()[abs - 1].is_ascii_alphanumeric();
        let after = abs + 4;
        let after_ok = after >= upper.len() || !upper.as_bytes()[after].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return Some(abs);
        }
        from = abs + 4;
    }
    None
}

/// `DO spec ... END`.
fn parse_do_block(tokens: &[Token], i: usize, pattern: &InterpolationPattern) -> Result<(Command, usize), ParseException> {
    let (content, line_no) = line_text(tokens, i).expect("caller verified a Line token");
    let original = content.clone();
    let spec_text = content["DO".len()..].trim();
    let loop_spec = parse_loop_spec(spec_text, line_no, pattern)?;

    let (body, next_idx) = parse_sequence(tokens, i + 1, pattern, &["END"])?;
    let idx = next_idx + 1; // consume END
    Ok((Command::new(line_no, original, CommandKind::Do { loop_spec, body }), idx))
}

fn parse_loop_spec(spec_text: &str, line_no: usize, pattern: &InterpolationPattern) -> Result<LoopSpec, ParseException> {
    if spec_text.is_empty() {
        return Ok(LoopSpec::Infinite);
    }

    let upper = spec_text.to_ascii_uppercase();

    if let Some(rest) = strip_ci(spec_text, &upper, "WHILE ") {
        return Ok(LoopSpec::While { cond: parse_condition(rest, line_no, pattern)? });
    }
    if let Some(rest) = strip_ci(spec_text, &upper, "UNTIL ") {
        return Ok(LoopSpec::Until { cond: parse_condition(rest, line_no, pattern)? });
    }
    if let Some(rest) = strip_ci(spec_text, &upper, "REPEAT ") {
        return Ok(LoopSpec::Repeat { count: parse_rhs_expression(rest, line_no, pattern)? });
    }

    if let Some(over_pos) = find_keyword_ci(spec_text, "OVER") {
        let var = spec_text[..over_pos].trim().to_string();
        let array_text = spec_text[over_pos + 4..].trim();
        return Ok(LoopSpec::Over { var, array: parse_rhs_expression(array_text, line_no, pattern)? });
    }

    if let Some(eq_pos) = spec_text.find('=') {
        let var = spec_text[..eq_pos].trim().to_string();
        let rest = spec_text[eq_pos + 1..].trim();
        if let Some(to_pos) = find_keyword_ci(rest, "TO") {
            let start_text = rest[..to_pos].trim();
            let after_to = rest[to_pos + 2..].trim();
            if let Some(by_pos) = find_keyword_ci(after_to, "BY") {
                let end_text = after_to[..by_pos].trim();
                let step_text = after_to[by_pos + 2..].trim();
                return Ok(LoopSpec::RangeWithStep {
                    var,
                    start: parse_rhs_expression(start_text, line_no, pattern)?,
                    end: parse_rhs_expression(end_text, line_no, pattern)?,
                    step: parse_rhs_expression(step_text, line_no, pattern)?,
                });
            }
            return Ok(LoopSpec::Range {
                var,
                start: parse_rhs_expression(start_text, line_no, pattern)?,
                end: parse_rhs_expression(rest[to_pos + 2..].trim(), line_no, pattern)?,
            });
        }
    }

    // Bare `DO <count>` repeats the body `count` times.
    if let Ok(expr) = parse_rhs_expression(spec_text, line_no, pattern) {
        return Ok(LoopSpec::Repeat { count: expr });
    }

    Err(ParseException::SyntaxError { line: line_no, message: format!("unrecognised DO loop spec: {}", spec_text) })
}

fn strip_ci<'a>(original: &'a str, upper: &str, prefix: &str) -> Option<&'a str> {
    if upper.starts_with(prefix) {
        Some(original[prefix.len()..].trim())
    } else {
        None
    }
}

fn find_keyword_ci(s: &str, keyword: &str) -> Option<usize> {
    let upper = s.to_ascii_uppercase();
    let kw = keyword.to_ascii_uppercase();
    let mut from = 0;
    while let Some(pos) = upper[from..].find(&kw) {
        let abs = from + pos;
        let before_ok = abs == 0 || upper.as_bytes()[abs - 1] == b' ';
        let after = abs + kw.len();
        let after_ok = after >= upper.len() || upper.as_bytes()[after] == b' ';
        if before_ok && after_ok {
            return Some(abs);
        }
        from = abs + kw.len();
    }
    None
}

/// `SELECT ... WHEN cond THEN [DO] ... [OTHERWISE [DO] ...] END`.
fn parse_select_block(tokens: &[Token], i: usize, pattern: &InterpolationPattern) -> Result<(Command, usize), ParseException> {
    let (content, line_no) = line_text(tokens, i).expect("caller verified a Line token");
    let original = content.clone();
    let mut idx = i + 1;
    let mut when_clauses = Vec::new();
    let mut otherwise = None;

    loop {
        let Some((line, clause_line_no)) = line_text(tokens, idx) else {
            return Err(ParseException::SyntaxError { line: line_no, message: "SELECT missing END".to_string() });
        };
        let upper = line.to_ascii_uppercase();

        if upper == "END" {
            idx += 1;
            break;
        }

        if upper.starts_with("WHEN ") {
            let rest = &line["WHEN ".len()..];
            let then_pos = find_then(rest).ok_or_else(|| ParseException::SyntaxError { line: clause_line_no, message: "WHEN requires THEN".to_string() })?;
            let cond_text = rest[..then_pos].trim();
            let after_then = rest[then_pos + 4..].trim();
            let condition = parse_condition(cond_text, clause_line_no, pattern)?;

            if after_then.is_empty() || after_then.eq_ignore_ascii_case("DO") {
                idx += 1;
                let (body, next_idx) = parse_sequence(tokens, idx, pattern, &["WHEN", "OTHERWISE", "END"])?;
                idx = next_idx;
                when_clauses.push(WhenClause { condition, body });
            } else {
                let stmt = statement_parser::parse_statement(after_then, clause_line_no, pattern, None)?;
                idx += 1;
                when_clauses.push(WhenClause { condition, body: vec![stmt] });
            }
            continue;
        }

        if upper == "OTHERWISE" {
            idx += 1;
            let (body, next_idx) = parse_sequence(tokens, idx, pattern, &["END"])?;
            idx = next_idx;
            otherwise = Some(body);
            continue;
        }

        return Err(ParseException::SyntaxError { line: clause_line_no, message: format!("unexpected line inside SELECT: {}", line) });
    }

    Ok((Command::new(line_no, original, CommandKind::Select { when_clauses, otherwise }), idx))
}

/// `RETRY_ON_STALE timeout=N [PRESERVE v1,v2] ... END_RETRY`.
fn parse_retry_block(tokens: &[Token], i: usize, pattern: &InterpolationPattern) -> Result<(Command, usize), ParseException> {
    let (content, line_no) = line_text(tokens, i).expect("caller verified a Line token");
    let original = content.clone();
    let (timeout, preserve) = statement_parser::parse_retry_header(&content, line_no)?;

    let (body, next_idx) = parse_sequence(tokens, i + 1, pattern, &["END_RETRY"])?;
    let idx = next_idx + 1; // consume END_RETRY
    Ok((Command::new(line_no, original, CommandKind::RetryOnStale { timeout, preserve, body }), idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_assignment_and_say() {
        let cmds = parse("x = 1\nSAY x").unwrap();
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn parses_if_block_with_else() {
        let src = "IF x > 0 THEN DO\nSAY \"pos\"\nELSE\nSAY \"non-pos\"\nENDIF";
        let cmds = parse(src).unwrap();
        assert_eq!(cmds.len(), 1);
        match &cmds[0].kind {
            CommandKind::If { then_branch, else_branch, .. } => {
                assert_eq!(then_branch.len(), 1);
                assert!(else_branch.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_do_range_with_step() {
        let src = "DO i = 1 TO 10 BY 2\nSAY i\nEND";
        let cmds = parse(src).unwrap();
        match &cmds[0].kind {
            CommandKind::Do { loop_spec: LoopSpec::RangeWithStep { .. }, body } => assert_eq!(body.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_select_when_otherwise() {
        let src = "SELECT\nWHEN x = 1 THEN\nSAY \"one\"\nOTHERWISE\nSAY \"other\"\nEND";
        let cmds = parse(src).unwrap();
        match &cmds[0].kind {
            CommandKind::Select { when_clauses, otherwise } => {
                assert_eq!(when_clauses.len(), 1);
                assert!(otherwise.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_nested_if_inside_do() {
        let src = "DO i = 1 TO 3\nIF i = 2 THEN SAY \"two\"\nEND";
        let cmds = parse(src).unwrap();
        match &cmds[0].kind {
            CommandKind::Do { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_retry_on_stale_block() {
        let src = "RETRY_ON_STALE timeout=500 PRESERVE a,b\nSAY \"retrying\"\nEND_RETRY";
        let cmds = parse(src).unwrap();
        match &cmds[0].kind {
            CommandKind::RetryOnStale { preserve, body, .. } => {
                assert_eq!(preserve, &vec!["a".to_string(), "b".to_string()]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn heredoc_attaches_to_owning_assignment() {
        let src = "doc = <<EOF\nhello\nEOF\nSAY doc";
        let cmds = parse(src).unwrap();
        assert_eq!(cmds.len(), 2);
        match &cmds[0].kind {
            CommandKind::Assignment { expression, .. } => {
                matches!(expression, crate::ast::types::Expression::Heredoc { .. } | crate::ast::types::Expression::Literal(_));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
