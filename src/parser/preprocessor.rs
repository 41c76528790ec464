//! Source preprocessor
//!
//! Strips comments without descending into string literals, and merges
//! pipe-continuation lines (`|>` at the start of the next non-empty line)
//! into a single logical line.

/// Normalise `\r\n` to `\n`, strip comments, and merge pipe-continuation
/// lines. Returns the rewritten source, one logical statement's text per
/// output line (blank lines for stripped comment-only lines are preserved
/// so downstream line numbers stay aligned with the original source).
pub fn preprocess(source: &str) -> String {
    let normalized = source.replace("\r\n", "\n");
    let stripped = strip_comments(&normalized);
    merge_pipe_continuations(&stripped)
}

/// Remove `/* ... */` (may span lines), `// ...`, and `-- ...` comments,
/// without touching the contents of `"..."` or `'...'` strings. A quoted
/// span is passed through verbatim, honoring `\`-escaping of the closing
/// quote.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut in_block_comment = false;

    while i < chars.len() {
        let c = chars[i];

        if in_block_comment {
            if c == '*' && chars.get(i + 1) == Some(&'/') {
                in_block_comment = false;
                i += 2;
                continue;
            }
            if c == '\n' {
                out.push('\n');
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                let quote = c;
                out.push(c);
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    if ch == '\\' && i + 1 < chars.len() {
                        out.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    i += 1;
                    if ch == quote {
                        break;
                    }
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                in_block_comment = true;
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

const PIPE_CONTINUATION: &str = "|>";

/// Merge a line into the previous one whenever the next non-empty line
/// begins with `|>`, turning a pipeline spread across several lines back
/// into one logical line.
fn merge_pipe_continuations(source: &str) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut result: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let mut current = lines[i].to_string();
        let mut j = i + 1;
        loop {
            let Some(next_line) = lines.get(j) else { break };
            let trimmed = next_line.trim_start();
            if trimmed.is_empty() {
                // Blank lines between continuation parts don't break the merge,
                // but they do consume a line number slot, so record an empty
                // placeholder for each one we swallow.
                result.push(String::new());
                j += 1;
                continue;
            }
            if trimmed.starts_with(PIPE_CONTINUATION) {
                current.push(' ');
                current.push_str(trimmed);
                result.push(String::new());
                j += 1;
                continue;
            }
            break;
        }
        result.push(current);
        i = j;
    }

    result.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_comments_outside_strings() {
        let src = "LET a = 1 -- trailing comment\nLET b = \"-- not a comment\"";
        let out = strip_comments(src);
        assert!(out.contains("LET a = 1"));
        assert!(!out.contains("trailing comment"));
        assert!(out.contains("-- not a comment"));
    }

    #[test]
    fn strips_block_comments_spanning_lines() {
        let src = "LET a = 1\n/* this\nis a comment */\nLET b = 2";
        let out = strip_comments(src);
        assert!(!out.contains("this"));
        assert!(out.contains("LET a = 1"));
        assert!(out.contains("LET b = 2"));
    }

    #[test]
    fn merges_pipe_continuation() {
        let src = "LET ys = xs\n  |> ARRAY_MAP(\"n => n\")\nSAY ys";
        let merged = merge_pipe_continuations(src);
        let lines: Vec<&str> = merged.split('\n').collect();
        assert!(lines[0].contains("|> ARRAY_MAP"));
    }

    #[test]
    fn escaped_quote_inside_string_survives() {
        let src = r#"LET a = "he said \"hi\" -- not a comment""#;
        let out = strip_comments(src);
        assert!(out.contains("not a comment"));
    }
}
