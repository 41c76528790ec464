//! Trace output (spec §4.11): one line per executed instruction while
//! `TRACE` is active, plus SELECT/WHEN/OTHERWISE branch headers.

use crate::ast::types::{Command, TraceMode};
use crate::collaborators::OutputSink;

/// Emit the per-instruction trace line for `cmd`, if trace mode is
/// anything other than `Off`.
pub async fn trace_instruction(output: &dyn OutputSink, mode: TraceMode, cmd: &Command) {
    if mode == TraceMode::Off {
        return;
    }
    output.output(&format!("{:>3} *-* {}", cmd.line_number, cmd.original_line)).await;
}

/// Emit the header line for the `WHEN`/`OTHERWISE` branch a `SELECT` took.
pub async fn trace_branch(output: &dyn OutputSink, mode: TraceMode, header: &str) {
    if mode == TraceMode::Off {
        return;
    }
    output.output(&format!("    *-* {}", header)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::CommandKind;
    use crate::collaborators::CollectingOutputSink;
    use crate::value::Value;

    #[tokio::test]
    async fn trace_off_emits_nothing() {
        let sink = CollectingOutputSink::default();
        let cmd = Command::new(3, "SAY 1", CommandKind::Say { expression: crate::ast::types::Expression::Literal(Value::Integer(1)) });
        trace_instruction(&sink, TraceMode::Off, &cmd).await;
        assert!(sink.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn trace_normal_emits_line_with_original_source() {
        let sink = CollectingOutputSink::default();
        let cmd = Command::new(3, "SAY 1", CommandKind::Say { expression: crate::ast::types::Expression::Literal(Value::Integer(1)) });
        trace_instruction(&sink, TraceMode::Normal, &cmd).await;
        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("SAY 1"));
        assert!(lines[0].contains('3'));
    }
}
