//! End-to-end scenarios exercising the full parse -> evaluate pipeline
//! through the public `Interpreter` facade.

use rexxlang::collaborators::TestFunctionRegistry;
use rexxlang::rexx::{Interpreter, RexxOptions};
use rexxlang::value::Value;

#[tokio::test]
async fn assignment_say_and_concatenation() {
    let mut interp = Interpreter::new(RexxOptions::default());
    let script = r#"
LET a = 2
LET b = 3
SAY "sum=" || (a + b)
"#;
    let result = interp.exec(script).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim_end(), "sum=5");
}

#[tokio::test]
async fn do_range_with_step_and_label_persistence() {
    let mut interp = Interpreter::new(RexxOptions::default());
    let script = r#"
LET total = 0
DO i = 1 TO 10 BY 2
  LET total = total + i
END
SAY total
"#;
    let result = interp.exec(script).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim_end(), "25");
    assert_eq!(interp.variables().get("total"), Some(&Value::Integer(25)));
    assert_eq!(interp.variables().get("i"), Some(&Value::Integer(9)));
}

#[tokio::test]
async fn select_when_executes_exactly_one_branch() {
    let mut interp = Interpreter::new(RexxOptions::default());
    let script = r#"
LET x = 7
SELECT
  WHEN x < 5 THEN SAY "low"
  WHEN x < 10 THEN SAY "mid"
  OTHERWISE SAY "high"
END
"#;
    let result = interp.exec(script).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim_end(), "mid");
}

#[tokio::test]
async fn signal_on_error_catches_missing_function() {
    let mut interp = Interpreter::new(RexxOptions::default());
    let script = r#"
SIGNAL ON ERROR NAME HANDLER
LET x = NO_SUCH_FUNCTION()
SAY "unreached"
EXIT 0
HANDLER:
SAY "caught " || ERRORTEXT
EXIT 2
"#;
    let result = interp.exec(script).await;
    assert_eq!(result.exit_code, 2);
    assert!(result.stdout.starts_with("caught "), "stdout was: {:?}", result.stdout);
    assert!(!result.stdout.contains("unreached"));
}

#[tokio::test]
async fn exit_unless_with_interpolation() {
    let mut interp = Interpreter::new(RexxOptions::default());
    let script = r#"
LET status = 500
EXIT 1 UNLESS status = 200, "bad status: {{status}}"
SAY "ok"
"#;
    let result = interp.exec(script).await;
    assert_eq!(result.exit_code, 1);
    assert!(result.stdout.contains("bad status: 500"));
    assert!(!result.stdout.contains("ok"));
}

/// Square every element, keeping results above 5, then render as JSON -
/// exercises the pipe operator feeding positional args into a registered
/// function, and the registry-call path end to end.
#[tokio::test]
async fn pipe_and_array_transform() {
    let mut registry = TestFunctionRegistry::default();
    registry.register("ARRAY_MAP", |params| {
        let array = params.get("_1").cloned().unwrap_or(Value::Null);
        match array {
            Value::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(|v| {
                        let n = v.as_number().unwrap_or(0.0);
                        Value::Integer((n * n) as i64)
                    })
                    .collect(),
            )),
            other => Ok(other),
        }
    });
    registry.register("ARRAY_FILTER", |params| {
        let array = params.get("_1").cloned().unwrap_or(Value::Null);
        match array {
            Value::Array(items) => Ok(Value::Array(
                items.into_iter().filter(|v| v.as_number().unwrap_or(0.0) > 5.0).collect(),
            )),
            other => Ok(other),
        }
    });
    registry.register("JSON_STRINGIFY", |params| {
        let value = params.get("_1").cloned().unwrap_or(Value::Null);
        Ok(Value::String(serde_json::to_string(&value.to_json()).unwrap_or_default()))
    });

    let mut interp = Interpreter::new(RexxOptions {
        registry: Some(Box::new(registry)),
        ..Default::default()
    });
    let script = r#"
LET xs = [1, 2, 3, 4]
LET ys = xs |> ARRAY_MAP() |> ARRAY_FILTER()
SAY JSON_STRINGIFY(ys)
"#;
    let result = interp.exec(script).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim_end(), "[9,16]");
}
