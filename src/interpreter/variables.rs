//! Variable store: dotted-path read/write over the flat `variables` map.
//!
//! A dotted name (`a.b.c`) is stored as nested `Object`/`Array` values under
//! the root key `a`; this module is the only place that walks those paths,
//! the way the teacher keeps all nameref/scoping logic behind one module
//! rather than scattering path-walking across callers.

use crate::interpreter::types::ExecutionState;
use crate::parser::interpolation::VariableLookup;
use crate::value::Value;

impl VariableLookup for ExecutionState {
    fn lookup_dotted(&self, path: &str) -> Option<Value> {
        if is_bound(self, path) {
            Some(get(self, path))
        } else {
            None
        }
    }
}

/// Split a dotted variable name into its root and the remaining path
/// segments, e.g. `"a.b.c"` -> `("a", ["b", "c"])`.
fn split_path(name: &str) -> (&str, Vec<&str>) {
    let mut parts = name.split('.');
    let root = parts.next().unwrap_or("");
    (root, parts.collect())
}

/// Read a variable by name, returning `Value::Null`-coercible defaults for
/// the always-readable special variables and missing dotted segments.
pub fn get(state: &ExecutionState, name: &str) -> Value {
    let (root, path) = split_path(name);
    let mut current = match state.variables.get(root) {
        Some(v) => v.clone(),
        None => return default_for(root),
    };
    for segment in path {
        current = match &current {
            Value::Object(map) => map.get(segment).cloned().unwrap_or(Value::Null),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i.saturating_sub(1)).cloned())
                .unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

fn default_for(root: &str) -> Value {
    match root {
        "RC" => Value::Integer(0),
        "SIGL" => Value::Integer(0),
        "ERRORTEXT" => Value::String(String::new()),
        _ => Value::Null,
    }
}

/// Write a variable, creating intermediate `Object` nesting for dotted
/// paths as needed. Writing through an array index extends the array with
/// `Null` padding if the index is beyond the current length.
pub fn set(state: &mut ExecutionState, name: &str, value: Value) {
    let (root, path) = split_path(name);
    if path.is_empty() {
        state.variables.insert(root.to_string(), value);
        return;
    }

    let entry = state
        .variables
        .entry(root.to_string())
        .or_insert_with(|| Value::Object(indexmap::IndexMap::new()));
    set_path(entry, &path, value);
}

fn set_path(current: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *current = value;
        return;
    };

    if !matches!(current, Value::Object(_)) {
        *current = Value::Object(indexmap::IndexMap::new());
    }
    let Value::Object(map) = current else { unreachable!() };

    if rest.is_empty() {
        map.insert((*head).to_string(), value);
    } else {
        let child = map
            .entry((*head).to_string())
            .or_insert_with(|| Value::Object(indexmap::IndexMap::new()));
        set_path(child, rest, value);
    }
}

/// True when `name` has ever been assigned (or is one of the
/// always-readable specials).
pub fn is_bound(state: &ExecutionState, name: &str) -> bool {
    let (root, _) = split_path(name);
    matches!(root, "RC" | "SIGL" | "ERRORTEXT") || state.variables.contains_key(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_missing_special_variables_as_defaults() {
        let state = ExecutionState::new();
        assert_eq!(get(&state, "RC"), Value::Integer(0));
        assert_eq!(get(&state, "ERRORTEXT"), Value::String(String::new()));
    }

    #[test]
    fn dotted_write_then_read_round_trips() {
        let mut state = ExecutionState::new();
        set(&mut state, "config.name", Value::String("widget".into()));
        set(&mut state, "config.count", Value::Integer(3));
        assert_eq!(get(&state, "config.name"), Value::String("widget".into()));
        assert_eq!(get(&state, "config.count"), Value::Integer(3));
    }

    #[test]
    fn unknown_plain_variable_reads_as_null() {
        let state = ExecutionState::new();
        assert_eq!(get(&state, "nope"), Value::Null);
    }
}
