//! Statement parser
//!
//! Matches each preprocessed, tokenized line against the language's
//! statement forms in priority order and builds a `Command`. Heredoc
//! bodies are threaded in from the caller (the tokenizer already split
//! them out as separate `Heredoc` tokens) rather than re-scanned here.

use crate::ast::types::{
    Command, CommandKind, ComparisonOperator, Condition, Expression, InterpretMode, LoopSpec,
    NumericSetting, ParseSource, TraceMode,
};
use crate::parser::expression_parser::ExpressionParser;
use crate::parser::interpolation::InterpolationPattern;
use crate::parser::types::ParseException;
use crate::value::Value;

/// Parse a single logical line into a `Command`. `heredoc` carries the
/// body of a trailing `<<DELIM` on this line, already collected by the
/// tokenizer, when one is pending.
pub fn parse_statement(
    raw_line: &str,
    line_number: usize,
    pattern: &InterpolationPattern,
    heredoc: Option<(&str, &str)>,
) -> Result<Command, ParseException> {
    let line = raw_line.trim();
    let original = raw_line.to_string();

    if line.is_empty() {
        return Ok(Command::new(line_number, original, CommandKind::Nop));
    }

    // 1. LABEL: optionally followed by an inline statement.
    if let Some((label, remainder)) = split_label(line) {
        let stmt = if remainder.trim().is_empty() {
            None
        } else {
            Some(Box::new(parse_statement(remainder, line_number, pattern, heredoc)?))
        };
        return Ok(Command::new(line_number, original, CommandKind::Label { name: label, statement: stmt }));
    }

    let upper = line.to_ascii_uppercase();

    // 2/3/4. ADDRESS forms.
    if upper.starts_with("ADDRESS") {
        return parse_address(line, line_number, &original, pattern, heredoc);
    }

    // 5. NUMERIC.
    if upper.starts_with("NUMERIC") {
        return parse_numeric(line, line_number, &original, pattern);
    }

    // 6. ARG / PARSE.
    if upper == "ARG" || upper.starts_with("ARG ") {
        let template = line[3..].trim();
        return Ok(Command::new(
            line_number,
            original,
            CommandKind::Parse { source: ParseSource::Arg, input: None, template: split_template(template) },
        ));
    }
    if upper.starts_with("PARSE") {
        return parse_parse(line, line_number, &original, pattern);
    }

    // 7. PUSH / PULL / QUEUE.
    if upper.starts_with("PUSH ") || upper == "PUSH" {
        let rest = line[4..].trim();
        let expr = parse_rhs_expression(rest, line_number, pattern)?;
        return Ok(Command::new(line_number, original, CommandKind::Push { expression: expr }));
    }
    if upper.starts_with("PULL ") || upper == "PULL" {
        let var = line[4..].trim().to_string();
        return Ok(Command::new(line_number, original, CommandKind::Pull { variable: var }));
    }
    if upper.starts_with("QUEUE ") || upper == "QUEUE" {
        let rest = line[5..].trim();
        let expr = parse_rhs_expression(rest, line_number, pattern)?;
        return Ok(Command::new(line_number, original, CommandKind::Queue { expression: expr }));
    }

    // 8. CALL name [args] / LET v = CALL name [args].
    if upper.starts_with("CALL ") || upper == "CALL" {
        return parse_call(&line[4..], line_number, &original, pattern, None);
    }
    if upper.starts_with("LET ") {
        let rest = line[4..].trim();
        if let Some((target, rhs)) = split_assignment(rest) {
            let rhs_trim = rhs.trim();
            if rhs_trim.to_ascii_uppercase().starts_with("CALL ") || rhs_trim.to_ascii_uppercase() == "CALL" {
                return parse_call(&rhs_trim[4..], line_number, &original, pattern, Some(target.to_string()));
            }
            return parse_let(target, rhs_trim, line_number, &original, pattern, heredoc);
        }
    }

    // 9. RETURN.
    if upper == "RETURN" || upper.starts_with("RETURN ") {
        let rest = line[6..].trim();
        if rest.is_empty() {
            return Ok(Command::new(line_number, original, CommandKind::Return { value: None }));
        }
        let expr = parse_rhs_expression(rest, line_number, pattern)?;
        return Ok(Command::new(line_number, original, CommandKind::Return { value: Some(expr) }));
    }

    // 10. TRACE.
    if upper.starts_with("TRACE") {
        let mode_text = line[5..].trim().to_ascii_uppercase();
        let mode = match mode_text.as_str() {
            "A" => TraceMode::A,
            "R" => TraceMode::R,
            "I" => TraceMode::I,
            "O" => TraceMode::O,
            "OFF" => TraceMode::Off,
            "NORMAL" | "" => TraceMode::Normal,
            other => {
                return Err(ParseException::SyntaxError {
                    line: line_number,
                    message: format!("unrecognised TRACE mode '{}'", other),
                })
            }
        };
        return Ok(Command::new(line_number, original, CommandKind::Trace { mode }));
    }

    // 11. RETRY_ON_STALE header/terminator are recognised by the block
    // driver in parser.rs, which calls `parse_retry_header` directly and
    // assembles the `RetryOnStale` node with its body. They should never
    // reach here as a plain statement.

    // 12. SIGNAL.
    if upper.starts_with("SIGNAL") {
        return parse_signal(line, &upper, line_number, &original);
    }

    // 14/15/16/17 handled by block driver (IF/DO/SELECT/INTERPRET headers);
    // recognise single-line IF and INTERPRET/NO-INTERPRET here.
    if upper.starts_with("IF ") {
        return parse_inline_if(line, line_number, &original, pattern);
    }
    if upper == "NO-INTERPRET" {
        return Ok(Command::new(line_number, original, CommandKind::NoInterpret));
    }
    if upper.starts_with("INTERPRET") {
        return parse_interpret(line, line_number, &original, pattern);
    }

    // 18. EXIT UNLESS / EXIT.
    if upper.starts_with("EXIT") {
        return parse_exit(line, line_number, &original, pattern);
    }

    // 19. SAY.
    if upper.starts_with("SAY ") || upper == "SAY" {
        let rest = if line.len() > 3 { line[3..].trim() } else { "" };
        let expr = parse_rhs_expression(rest, line_number, pattern)?;
        return Ok(Command::new(line_number, original, CommandKind::Say { expression: expr }));
    }

    // 20. Bare heredoc / bare quoted string routed to ADDRESS.
    if let Some((content, delimiter)) = heredoc {
        if line == format!("<<{}", delimiter) {
            return Ok(Command::new(
                line_number,
                original,
                CommandKind::HeredocString { content: content.to_string(), delimiter: delimiter.to_string(), address_target: None },
            ));
        }
    }
    if (line.starts_with('"') && line.ends_with('"') && line.len() >= 2) || (line.starts_with('\'') && line.ends_with('\'') && line.len() >= 2) {
        let value = line[1..line.len() - 1].to_string();
        return Ok(Command::new(line_number, original, CommandKind::QuotedString { value }));
    }

    // 21. Implicit assignment `name = expression`.
    if let Some((target, rhs)) = split_assignment(line) {
        if is_bare_target(target) {
            return parse_let(target, rhs.trim(), line_number, &original, pattern, heredoc);
        }
        if target.trim_end().ends_with(']') {
            return Err(ParseException::ArrayAssignmentTarget { line: line_number, target: target.trim().to_string() });
        }
    }

    // 22. Free-standing function call (fallback).
    let expr = parse_rhs_expression(line, line_number, pattern)?;
    match expr {
        Expression::FunctionCall { command, params, positional } => {
            let mut all_params = params;
            for (i, p) in positional.into_iter().enumerate() {
                all_params.insert(format!("_{}", i + 1), p);
            }
            Ok(Command::new(line_number, original, CommandKind::FunctionCall { command, params: all_params }))
        }
        other => Ok(Command::new(line_number, original, CommandKind::Say { expression: other })),
    }
}

fn split_label(line: &str) -> Option<(String, &str)> {
    let colon = line.find(':')?;
    let candidate = &line[..colon];
    if candidate.is_empty() || !candidate.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    if !candidate.chars().next().unwrap().is_alphabetic() && candidate.chars().next().unwrap() != '_' {
        return None;
    }
    Some((candidate.to_string(), line[colon + 1..].trim_start()))
}

fn parse_address(
    line: &str,
    line_number: usize,
    original: &str,
    pattern: &InterpolationPattern,
    heredoc: Option<(&str, &str)>,
) -> Result<Command, ParseException> {
    let rest = line["ADDRESS".len()..].trim();
    if rest.is_empty() {
        return Ok(Command::new(line_number, original, CommandKind::Address { target: None }));
    }

    if rest.starts_with('"') {
        // ADDRESS "url" [AUTH "token"] AS name
        if let Some(end) = rest[1..].find('"') {
            let url = rest[1..1 + end].to_string();
            let tail = rest[2 + end..].trim();
            let (auth, tail) = if tail.to_ascii_uppercase().starts_with("AUTH ") {
                let after_auth = tail[5..].trim();
                if after_auth.starts_with('"') {
                    if let Some(end2) = after_auth[1..].find('"') {
                        let token = after_auth[1..1 + end2].to_string();
                        (Some(token), after_auth[2 + end2..].trim())
                    } else {
                        (None, after_auth)
                    }
                } else {
                    (None, after_auth)
                }
            } else {
                (None, tail)
            };
            let upper_tail = tail.to_ascii_uppercase();
            if let Some(as_pos) = upper_tail.find("AS ") {
                let as_name = tail[as_pos + 3..].trim().to_string();
                return Ok(Command::new(line_number, original, CommandKind::AddressRemote { url, auth, as_name }));
            }
        }
        return Err(ParseException::SyntaxError { line: line_number, message: "malformed ADDRESS url form".to_string() });
    }

    // ADDRESS target "command-string" | ADDRESS target [<<DELIM]
    let mut parts = rest.splitn(2, char::is_whitespace);
    let target = parts.next().unwrap_or("").to_string();
    let tail = parts.next().unwrap_or("").trim();

    if let Some((content, delimiter)) = heredoc {
        if tail == format!("<<{}", delimiter) {
            return Ok(Command::new(
                line_number,
                original,
                CommandKind::HeredocString { content: content.to_string(), delimiter: delimiter.to_string(), address_target: Some(target) },
            ));
        }
    }

    if tail.is_empty() {
        return Ok(Command::new(line_number, original, CommandKind::Address { target: Some(target) }));
    }

    let command_expr = parse_rhs_expression(tail, line_number, pattern)?;
    Ok(Command::new(line_number, original, CommandKind::AddressWithString { target, command: command_expr }))
}

fn parse_numeric(line: &str, line_number: usize, original: &str, pattern: &InterpolationPattern) -> Result<Command, ParseException> {
    let rest = line["NUMERIC".len()..].trim();
    let mut parts = rest.splitn(2, char::is_whitespace);
    let setting_text = parts.next().unwrap_or("").to_ascii_uppercase();
    let value_text = parts.next().unwrap_or("").trim();
    let setting = match setting_text.as_str() {
        "DIGITS" => NumericSetting::Digits,
        "FUZZ" => NumericSetting::Fuzz,
        "FORM" => NumericSetting::Form,
        other => {
            return Err(ParseException::SyntaxError { line: line_number, message: format!("unrecognised NUMERIC setting '{}'", other) })
        }
    };
    let value = parse_rhs_expression(value_text, line_number, pattern)?;
    Ok(Command::new(line_number, original, CommandKind::Numeric { setting, value }))
}

fn parse_parse(line: &str, line_number: usize, original: &str, pattern: &InterpolationPattern) -> Result<Command, ParseException> {
    let rest = line["PARSE".len()..].trim();
    let upper_rest = rest.to_ascii_uppercase();

    if upper_rest.starts_with("ARG") {
        let template = rest[3..].trim();
        return Ok(Command::new(
            line_number,
            original,
            CommandKind::Parse { source: ParseSource::Arg, input: None, template: split_template(template) },
        ));
    }
    if upper_rest.starts_with("VAR ") {
        let tail = rest[4..].trim();
        let (var, template) = split_with_clause(tail);
        return Ok(Command::new(
            line_number,
            original,
            CommandKind::Parse { source: ParseSource::Var(var.to_string()), input: None, template: split_template(template) },
        ));
    }
    if upper_rest.starts_with("VALUE ") {
        let tail = rest[6..].trim();
        let (expr_text, template) = split_with_clause(tail);
        let input = parse_rhs_expression(expr_text, line_number, pattern)?;
        return Ok(Command::new(
            line_number,
            original,
            CommandKind::Parse { source: ParseSource::Value(expr_text.to_string()), input: Some(input), template: split_template(template) },
        ));
    }

    Err(ParseException::SyntaxError { line: line_number, message: format!("unrecognised PARSE form: {}", line) })
}

/// Split `"INPUT WITH template..."` into `(input_text, template_text)`.
fn split_with_clause(s: &str) -> (&str, &str) {
    if let Some(pos) = find_keyword(s, "WITH") {
        (s[..pos].trim(), s[pos + 4..].trim())
    } else {
        (s, "")
    }
}

fn find_keyword(s: &str, keyword: &str) -> Option<usize> {
    let upper = s.to_ascii_uppercase();
    let kw = keyword.to_ascii_uppercase();
    let mut search_from = 0;
    while let Some(idx) = upper[search_from..].find(&kw) {
        let abs = search_from + idx;
        let before_ok = abs == 0 || !upper.as_bytes()[abs - 1].is_ascii_alphanumeric();
        let after = abs + kw.len();
        let after_ok = after >= upper.len() || !upper.as_bytes()[after].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return Some(abs);
        }
        search_from = abs + kw.len();
    }
    None
}

fn split_template(s: &str) -> Vec<String> {
    s.split_whitespace().map(|x| x.to_string()).collect()
}

fn parse_call(
    rest: &str,
    line_number: usize,
    original: &str,
    pattern: &InterpolationPattern,
    assign_to: Option<String>,
) -> Result<Command, ParseException> {
    let rest = rest.trim();
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name_text = parts.next().unwrap_or("").trim();
    let args_text = parts.next().unwrap_or("").trim();

    let is_variable_call = name_text.starts_with('(') && name_text.ends_with(')');
    let display_name = name_text.trim_matches(|c| c == '(' || c == ')').trim_matches('"').trim_matches('\'').to_string();
    let subroutine = if is_variable_call {
        display_name.clone()
    } else {
        name_text.trim_matches('"').trim_matches('\'').to_string()
    };

    let separator = if args_text.contains(',') { ',' } else { ' ' };
    let raw_args: Vec<&str> = if args_text.is_empty() {
        Vec::new()
    } else if separator == ',' {
        args_text.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).collect()
    } else {
        args_text.split_whitespace().collect()
    };

    let mut args = Vec::with_capacity(raw_args.len());
    for a in raw_args {
        args.push(parse_rhs_expression(a, line_number, pattern)?);
    }

    let call = CommandKind::Call { subroutine, display_name, args, is_variable_call, assign_to };
    Ok(Command::new(line_number, original, call))
}

fn parse_let(
    target: &str,
    rhs: &str,
    line_number: usize,
    original: &str,
    pattern: &InterpolationPattern,
    heredoc: Option<(&str, &str)>,
) -> Result<Command, ParseException> {
    let target = target.trim();
    if target.ends_with(']') {
        return Err(ParseException::ArrayAssignmentTarget { line: line_number, target: target.to_string() });
    }
    let expr = match heredoc_rhs_expression(rhs, heredoc) {
        Some(expr) => expr,
        None => parse_rhs_expression(rhs, line_number, pattern)?,
    };
    Ok(Command::new(line_number, original, CommandKind::Assignment { target: target.to_string(), expression: expr }))
}

/// When `rhs` is exactly `<<DELIM` and a matching heredoc body was
/// collected for this line, build the `Heredoc` expression node directly
/// rather than feeding `<<DELIM` through the general expression parser
/// (which has no notion of heredoc syntax).
fn heredoc_rhs_expression(rhs: &str, heredoc: Option<(&str, &str)>) -> Option<Expression> {
    let (content, delimiter) = heredoc?;
    if rhs.trim() == format!("<<{}", delimiter) {
        Some(Expression::Heredoc { content: content.to_string(), delimiter: delimiter.to_string() })
    } else {
        None
    }
}

fn is_bare_target(target: &str) -> bool {
    let t = target.trim();
    !t.is_empty() && t.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
        && t.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Split `name = expr` at the first top-level `=` that isn't part of `==`,
/// `!=`, `<=`, `>=`, or `=>`.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let chars: Vec<char> = line.chars().collect();
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
                let prev = if i > 0 { chars.get(i - 1) } else { None };
                let next = chars.get(i + 1);
                let is_compound = matches!(prev, Some('=') | Some('!') | Some('<') | Some('>')) || next == Some(&'>') || next == Some(&'=');
                if !is_compound {
                    return Some((&line[..byte_pos], &line[byte_pos + 1..]));
                }
            }
            _ => {}
        }
        byte_pos += c.len_utf8();
    }
    None
}

/// Parse the RHS of a `LET`/`SAY`/`RETURN`/etc: honours `||` concatenation
/// at top level (outside strings/parens), and promotes a fully-quoted
/// string containing interpolation markers to an `InterpolatedString`.
pub(crate) fn parse_rhs_expression(text: &str, line_number: usize, pattern: &InterpolationPattern) -> Result<Expression, ParseException> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Expression::Literal(Value::Null));
    }

    let concat_parts = split_top_level_concat(text);
    if concat_parts.len() > 1 {
        let mut parts = Vec::with_capacity(concat_parts.len());
        for part in concat_parts {
            parts.push(parse_single_expression(part.trim(), line_number, pattern)?);
        }
        return Ok(Expression::Concatenation { parts });
    }

    parse_single_expression(text, line_number, pattern)
}

fn parse_single_expression(text: &str, line_number: usize, pattern: &InterpolationPattern) -> Result<Expression, ParseException> {
    ExpressionParser::parse(text, line_number, pattern)
}

fn split_top_level_concat(text: &str) -> Vec<&str> {
    let chars: Vec<char> = text.chars().collect();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut byte_pos = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            byte_pos += c.len_utf8();
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '|' if depth == 0 && chars.get(i + 1) == Some(&'|') && chars.get(i + 2) != Some(&'>') => {
                parts.push(&text[start..byte_pos]);
                byte_pos += 2;
                i += 2;
                start = byte_pos;
                continue;
            }
            _ => {}
        }
        byte_pos += c.len_utf8();
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// Parse a `RETRY_ON_STALE timeout=N [PRESERVE v1,v2]` header into its
/// timeout expression and preserved-variable list. Used by the block
/// driver in `parser.rs`, which supplies the body separately.
pub fn parse_retry_header(line: &str, line_number: usize) -> Result<(Expression, Vec<String>), ParseException> {
    let upper = line.to_ascii_uppercase();
    let timeout = if let Some(pos) = upper.find("TIMEOUT=") {
        let tail = &line[pos + 8..];
        let text: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        let n: i64 = text.parse().map_err(|_| ParseException::SyntaxError {
            line: line_number,
            message: "RETRY_ON_STALE requires a numeric timeout".to_string(),
        })?;
        Expression::Literal(Value::Integer(n))
    } else {
        return Err(ParseException::SyntaxError { line: line_number, message: "RETRY_ON_STALE requires timeout=N".to_string() });
    };

    let preserve = if let Some(pos) = upper.find("PRESERVE") {
        line[pos + 8..].trim().split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
    } else {
        Vec::new()
    };

    Ok((timeout, preserve))
}

fn parse_signal(line: &str, upper: &str, line_number: usize, original: &str) -> Result<Command, ParseException> {
    let rest = line["SIGNAL".len()..].trim();
    let upper_rest = upper["SIGNAL".len()..].trim();

    if upper_rest.starts_with("ON ERROR") {
        let after = rest["ON ERROR".len()..].trim();
        let label = if after.to_ascii_uppercase().starts_with("NAME ") {
            Some(after[5..].trim().to_string())
        } else {
            None
        };
        return Ok(Command::new(line_number, original, CommandKind::SignalOn { condition: "ERROR".to_string(), label }));
    }
    if upper_rest.starts_with("OFF ERROR") {
        return Ok(Command::new(line_number, original, CommandKind::SignalOff { condition: "ERROR".to_string() }));
    }
    if !rest.is_empty() {
        return Ok(Command::new(line_number, original, CommandKind::SignalTo { label: rest.to_string() }));
    }
    Err(ParseException::SyntaxError { line: line_number, message: "malformed SIGNAL statement".to_string() })
}

fn parse_inline_if(line: &str, line_number: usize, original: &str, pattern: &InterpolationPattern) -> Result<Command, ParseException> {
    let rest = &line[3..];
    let then_pos = find_keyword(rest, "THEN").ok_or_else(|| ParseException::SyntaxError {
        line: line_number,
        message: "IF requires THEN".to_string(),
    })?;
    let cond_text = rest[..then_pos].trim();
    let stmt_text = rest[then_pos + 4..].trim();
    let condition = parse_condition(cond_text, line_number, pattern)?;

    if stmt_text.is_empty() {
        // Block form: handled by the block-structure driver upstream.
        return Ok(Command::new(
            line_number,
            original,
            CommandKind::If { condition, then_branch: Vec::new(), else_branch: None },
        ));
    }

    let then_cmd = parse_statement(stmt_text, line_number, pattern, None)?;
    Ok(Command::new(line_number, original, CommandKind::If { condition, then_branch: vec![then_cmd], else_branch: None }))
}

fn parse_interpret(line: &str, line_number: usize, original: &str, pattern: &InterpolationPattern) -> Result<Command, ParseException> {
    let rest = line["INTERPRET".len()..].trim();
    let (expr_text, with_clause) = if let Some(pos) = find_keyword(rest, "WITH") {
        (rest[..pos].trim(), Some(rest[pos + 4..].trim()))
    } else {
        (rest, None)
    };

    let expression = parse_rhs_expression(expr_text, line_number, pattern)?;
    let mode = if with_clause.is_some() { InterpretMode::Isolated } else { InterpretMode::Normal };

    let mut imports = None;
    let mut exports = None;
    if let Some(clause) = with_clause {
        if let Some(start) = clause.to_ascii_uppercase().find("ISOLATED(") {
            if let Some(end) = clause[start..].find(')') {
                let list = &clause[start + 9..start + end];
                imports = Some(list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());
            }
        }
        if let Some(start) = clause.to_ascii_uppercase().find("EXPORT(") {
            if let Some(end) = clause[start..].find(')') {
                let list = &clause[start + 7..start + end];
                exports = Some(list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());
            }
        }
    }

    Ok(Command::new(line_number, original, CommandKind::Interpret { mode, expression, imports, exports }))
}

fn parse_exit(line: &str, line_number: usize, original: &str, pattern: &InterpolationPattern) -> Result<Command, ParseException> {
    if let Some(unless_pos) = find_keyword(line, "UNLESS") {
        // An optional numeric code sits between EXIT and UNLESS, e.g.
        // `EXIT 1 UNLESS cond, message`; bare `EXIT UNLESS ...` leaves it
        // unset and falls back to the default exit code of 1.
        let code_text = line["EXIT".len()..unless_pos].trim();
        let code = if code_text.is_empty() { None } else { Some(parse_rhs_expression(code_text, line_number, pattern)?) };

        let rest = line[unless_pos + "UNLESS".len()..].trim();

        if rest.contains('.') && !rest.contains(',') {
            return Err(ParseException::ExitUnlessMissingComma { line: line_number, found: ".".to_string() });
        }
        if rest.contains(';') && !rest.contains(',') {
            return Err(ParseException::ExitUnlessMissingComma { line: line_number, found: ";".to_string() });
        }

        let comma_pos = find_top_level_comma(rest).ok_or_else(|| ParseException::ExitUnlessMissingComma {
            line: line_number,
            found: rest.to_string(),
        })?;
        let cond_text = rest[..comma_pos].trim();
        let message_text = rest[comma_pos + 1..].trim();
        let condition_text = cond_text.to_string();
        let message = parse_rhs_expression(message_text, line_number, pattern)?;

        return Ok(Command::new(line_number, original, CommandKind::ExitUnless { code, condition_text, message }));
    }

    let rest = line[4..].trim();
    if rest.is_empty() {
        return Ok(Command::new(line_number, original, CommandKind::Exit { code: None }));
    }
    let expr = parse_rhs_expression(rest, line_number, pattern)?;
    Ok(Command::new(line_number, original, CommandKind::Exit { code: Some(expr) }))
}

fn find_top_level_comma(s: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut byte_pos = 0usize;
    for c in chars {
        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            byte_pos += c.len_utf8();
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => return Some(byte_pos),
            _ => {}
        }
        byte_pos += c.len_utf8();
    }
    None
}

// ---------------------------------------------------------------------
// Condition sublanguage, shared by IF, block DO-while/until, and
// EXIT UNLESS.
// ---------------------------------------------------------------------

pub fn parse_condition(text: &str, line_number: usize, pattern: &InterpolationPattern) -> Result<Condition, ParseException> {
    parse_or(text.trim(), line_number, pattern)
}

fn parse_or(text: &str, line_number: usize, pattern: &InterpolationPattern) -> Result<Condition, ParseException> {
    let parts = split_top_level_keyword(text, "OR");
    if parts.len() > 1 {
        let mut conds = Vec::with_capacity(parts.len());
        for p in parts {
            conds.push(parse_and(p.trim(), line_number, pattern)?);
        }
        return Ok(Condition::LogicalOr { parts: conds });
    }
    parse_and(text, line_number, pattern)
}

fn parse_and(text: &str, line_number: usize, pattern: &InterpolationPattern) -> Result<Condition, ParseException> {
    let parts = split_top_level_keyword(text, "AND");
    if parts.len() > 1 {
        let mut conds = Vec::with_capacity(parts.len());
        for p in parts {
            conds.push(parse_not(p.trim(), line_number, pattern)?);
        }
        return Ok(Condition::LogicalAnd { parts: conds });
    }
    parse_not(text, line_number, pattern)
}

fn parse_not(text: &str, line_number: usize, pattern: &InterpolationPattern) -> Result<Condition, ParseException> {
    let trimmed = text.trim();
    if trimmed.to_ascii_uppercase().starts_with("NOT ") {
        let inner = parse_not(&trimmed[3..], line_number, pattern)?;
        return Ok(Condition::LogicalNot { operand: Box::new(inner) });
    }
    parse_comparison(trimmed, line_number, pattern)
}

fn parse_comparison(text: &str, line_number: usize, pattern: &InterpolationPattern) -> Result<Condition, ParseException> {
    let trimmed = text.trim();
    if trimmed.starts_with('(') && trimmed.ends_with(')') && is_balanced_wrap(trimmed) {
        return parse_or(&trimmed[1..trimmed.len() - 1], line_number, pattern);
    }

    const OPS: &[(&str, ComparisonOperator)] = &[
        ("==", ComparisonOperator::Eq),
        ("!=", ComparisonOperator::Ne),
        ("<>", ComparisonOperator::Ne),
        ("<=", ComparisonOperator::Le),
        (">=", ComparisonOperator::Ge),
        ("=", ComparisonOperator::Eq),
        ("<", ComparisonOperator::Lt),
        (">", ComparisonOperator::Gt),
    ];

    for (token, op) in OPS {
        if let Some(pos) = find_top_level_operator(trimmed, token) {
            let left = parse_single_expression(trimmed[..pos].trim(), line_number, pattern)?;
            let right = parse_single_expression(trimmed[pos + token.len()..].trim(), line_number, pattern)?;
            return Ok(Condition::Comparison { left, op: *op, right });
        }
    }

    let expr = parse_single_expression(trimmed, line_number, pattern)?;
    Ok(Condition::Boolean { expression: expr })
}

fn is_balanced_wrap(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    let mut depth = 0i32;
    for (i, c) in chars.iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != chars.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn find_top_level_operator(s: &str, op: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    let op_chars: Vec<char> = op.chars().collect();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut byte_pos = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            byte_pos += c.len_utf8();
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && chars[i..].starts_with(&op_chars[..]) {
            return Some(byte_pos);
        }
        byte_pos += c.len_utf8();
        i += 1;
    }
    None
}

fn split_top_level_keyword<'a>(text: &'a str, keyword: &str) -> Vec<&'a str> {
    let upper = text.to_ascii_uppercase();
    let kw = format!(" {} ", keyword);
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let chars: Vec<char> = text.chars().collect();
    let mut start = 0usize;
    let mut byte_pos = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            byte_pos += c.len_utf8();
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && byte_pos + kw.len() <= upper.len() && &upper[byte_pos..byte_pos + kw.len()] == kw.as_str() {
            parts.push(&text[start..byte_pos]);
            byte_pos += kw.len();
            i += kw.chars().count();
            start = byte_pos;
            continue;
        }
        byte_pos += c.len_utf8();
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(line: &str) -> Command {
        let pattern = InterpolationPattern::handlebars();
        parse_statement(line, 1, &pattern, None).unwrap()
    }

    #[test]
    fn parses_implicit_assignment() {
        let cmd = p("x = 1 + 2");
        match cmd.kind {
            CommandKind::Assignment { target, .. } => assert_eq!(target, "x"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_array_assignment_target() {
        let pattern = InterpolationPattern::handlebars();
        let err = parse_statement("xs[1] = 5", 1, &pattern, None).unwrap_err();
        matches!(err, ParseException::ArrayAssignmentTarget { .. });
    }

    #[test]
    fn parses_say() {
        let cmd = p("SAY \"hi\"");
        matches!(cmd.kind, CommandKind::Say { .. });
    }

    #[test]
    fn free_standing_call_keys_positional_args_one_based() {
        let cmd = p("LOG(\"a\", \"b\")");
        match cmd.kind {
            CommandKind::FunctionCall { command, params } => {
                assert_eq!(command, "LOG");
                assert_eq!(params.get("_1"), Some(&Expression::Literal(Value::String("a".to_string()))));
                assert_eq!(params.get("_2"), Some(&Expression::Literal(Value::String("b".to_string()))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_label_with_inline_statement() {
        let cmd = p("loop: SAY \"hi\"");
        match cmd.kind {
            CommandKind::Label { name, statement } => {
                assert_eq!(name, "loop");
                assert!(statement.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_signal_on_error_with_name() {
        let cmd = p("SIGNAL ON ERROR NAME Handler");
        match cmd.kind {
            CommandKind::SignalOn { condition, label } => {
                assert_eq!(condition, "ERROR");
                assert_eq!(label, Some("Handler".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn exit_unless_requires_comma() {
        let pattern = InterpolationPattern::handlebars();
        let err = parse_statement("EXIT UNLESS x > 0. bad input", 1, &pattern, None).unwrap_err();
        matches!(err, ParseException::ExitUnlessMissingComma { .. });
    }

    #[test]
    fn exit_unless_parses_condition_and_message() {
        let cmd = p("EXIT UNLESS x > 0, \"bad input\"");
        match cmd.kind {
            CommandKind::ExitUnless { condition_text, code, .. } => {
                assert_eq!(condition_text, "x > 0");
                assert!(code.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn exit_unless_parses_leading_numeric_code() {
        let cmd = p("EXIT 1 UNLESS status = 200, \"bad status: {{status}}\"");
        match cmd.kind {
            CommandKind::ExitUnless { condition_text, code, .. } => {
                assert_eq!(condition_text, "status = 200");
                assert_eq!(code, Some(Expression::Literal(Value::Integer(1))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn condition_parses_and_or_not() {
        let pattern = InterpolationPattern::handlebars();
        let cond = parse_condition("a > 1 AND NOT b = 0", 1, &pattern).unwrap();
        matches!(cond, Condition::LogicalAnd { .. });
    }

    #[test]
    fn call_with_comma_separated_args() {
        let cmd = p("CALL Greet \"Ada\", 2");
        match cmd.kind {
            CommandKind::Call { subroutine, args, .. } => {
                assert_eq!(subroutine, "Greet");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn concatenation_split_outside_strings() {
        let cmd = p("x = a || \"literal || not split\" || b");
        match cmd.kind {
            CommandKind::Assignment { expression: Expression::Concatenation { parts }, .. } => {
                assert_eq!(parts.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
