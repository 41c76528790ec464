//! Interpolation engine
//!
//! Configurable `{var}` / `{{var}}` / `${var}` / `%var%` substitution. The
//! active pattern is instance-scoped on the interpreter (not process-wide
//! global state, per the design notes) so two interpreters in the same
//! process can run different patterns without racing each other.

use indexmap::IndexMap;

use crate::value::Value;

/// A pair of delimiters marking where a variable reference starts and ends
/// inside a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpolationPattern {
    pub start: String,
    pub end: String,
    /// `rexx`-style patterns balance nested braces inside the match.
    pub balanced: bool,
}

impl InterpolationPattern {
    pub fn handlebars() -> Self {
        Self { start: "{{".to_string(), end: "}}".to_string(), balanced: false }
    }

    pub fn rexx() -> Self {
        Self { start: "{".to_string(), end: "}".to_string(), balanced: true }
    }

    pub fn shell() -> Self {
        Self { start: "${".to_string(), end: "}".to_string(), balanced: false }
    }

    pub fn batch() -> Self {
        Self { start: "%".to_string(), end: "%".to_string(), balanced: false }
    }

    pub fn doubledollar() -> Self {
        Self { start: "$$".to_string(), end: "$$".to_string(), balanced: false }
    }

    pub fn brackets() -> Self {
        Self { start: "[".to_string(), end: "]".to_string(), balanced: false }
    }

    pub fn custom(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self { start: start.into(), end: end.into(), balanced: false }
    }

    /// Resolve a named interpolation preset by string, as used by a runtime
    /// "switch the active pattern" configuration operation.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "handlebars" => Some(Self::handlebars()),
            "rexx" => Some(Self::rexx()),
            "shell" => Some(Self::shell()),
            "batch" => Some(Self::batch()),
            "doubledollar" => Some(Self::doubledollar()),
            "brackets" => Some(Self::brackets()),
            _ => None,
        }
    }
}

impl Default for InterpolationPattern {
    fn default() -> Self {
        Self::handlebars()
    }
}

/// Anything that can resolve a dotted variable path to a displayable
/// value. The evaluator's variable store implements this; interpolation
/// itself never needs to know how variables are stored.
pub trait VariableLookup {
    fn lookup_dotted(&self, path: &str) -> Option<Value>;
}

/// Trivial lookup backed by a flat map, used by tests and by the
/// callback-expression scratch scope.
impl VariableLookup for IndexMap<String, Value> {
    fn lookup_dotted(&self, path: &str) -> Option<Value> {
        self.get(path).cloned()
    }
}

/// Substitute every delimited reference in `template` using `lookup`. If
/// the pattern's delimiters never appear in the template, the template is
/// returned unchanged (identity on non-matching input, per spec).
pub fn interpolate(template: &str, pattern: &InterpolationPattern, lookup: &dyn VariableLookup) -> String {
    if !template.contains(pattern.start.as_str()) {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let bytes: Vec<char> = template.chars().collect();
    let start_chars: Vec<char> = pattern.start.chars().collect();
    let end_chars: Vec<char> = pattern.end.chars().collect();
    let mut i = 0;

    while i < bytes.len() {
        if matches_at(&bytes, i, &start_chars) {
            let content_start = i + start_chars.len();
            if let Some(content_end) = find_matching_end(&bytes, content_start, &start_chars, &end_chars, pattern.balanced) {
                let name: String = bytes[content_start..content_end].iter().collect();
                let name = name.trim();
                match lookup.lookup_dotted(name) {
                    Some(value) => out.push_str(&value.to_display_string()),
                    None => {
                        // Unresolved reference: leave the raw match as-is.
                        out.extend(&bytes[i..content_end + end_chars.len()]);
                    }
                }
                i = content_end + end_chars.len();
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}

fn matches_at(haystack: &[char], pos: usize, needle: &[char]) -> bool {
    if pos + needle.len() > haystack.len() {
        return false;
    }
    haystack[pos..pos + needle.len()] == *needle
}

/// Find the index where the matching end delimiter begins, scanning from
/// `from`. When `balanced` is set, nested `start`/`end` occurrences are
/// tracked so `rexx`-style `{a{b}c}` balances correctly.
fn find_matching_end(haystack: &[char], from: usize, start: &[char], end: &[char], balanced: bool) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = from;
    while i < haystack.len() {
        if balanced && matches_at(haystack, i, start) {
            depth += 1;
            i += start.len();
            continue;
        }
        if matches_at(haystack, i, end) {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
            i += end.len();
            continue;
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::string(*v))).collect()
    }

    #[test]
    fn identity_when_no_delimiters_present() {
        let p = InterpolationPattern::handlebars();
        let v = vars(&[]);
        assert_eq!(interpolate("plain text", &p, &v), "plain text");
    }

    #[test]
    fn handlebars_default_pattern() {
        let p = InterpolationPattern::default();
        let v = vars(&[("status", "500")]);
        assert_eq!(interpolate("bad status: {{status}}", &p, &v), "bad status: 500");
    }

    #[test]
    fn shell_pattern() {
        let p = InterpolationPattern::shell();
        let v = vars(&[("name", "world")]);
        assert_eq!(interpolate("hi ${name}!", &p, &v), "hi world!");
    }

    #[test]
    fn batch_pattern() {
        let p = InterpolationPattern::batch();
        let v = vars(&[("x", "1")]);
        assert_eq!(interpolate("%x%", &p, &v), "1");
    }

    #[test]
    fn unresolved_reference_left_as_is() {
        let p = InterpolationPattern::handlebars();
        let v = vars(&[]);
        assert_eq!(interpolate("{{missing}}", &p, &v), "{{missing}}");
    }

    #[test]
    fn rexx_pattern_balances_nested_braces() {
        let p = InterpolationPattern::rexx();
        let v = vars(&[("a.b", "X")]);
        assert_eq!(interpolate("{a.b}", &p, &v), "X");
    }
}
