//! Tests for the conversions between engine results and protocol messages

use std::collections::BTreeMap;

use livecode_core::script::Value;
use livecode_core::{Bindings, ExecutionReport, SyntaxError};
use tower_lsp::lsp_types::{DiagnosticSeverity, Position};

use crate::protocol::{summarize, to_diagnostic, ExecutionSettledParams};

fn report() -> ExecutionReport<Value> {
    let mut globals = BTreeMap::new();
    globals.insert("__source__".to_string(), Value::str("file:///tmp/a.py"));
    let mut locals = BTreeMap::new();
    locals.insert("xs".to_string(), Value::list(vec![Value::Int(1), Value::str("b")]));

    ExecutionReport {
        source_id: "file:///tmp/a.py".to_string(),
        stdout: "hi\n".to_string(),
        stderr: String::new(),
        bindings: Bindings { globals, locals },
        faulted: false,
        resumed_from: 2,
        evaluated: 3,
    }
}

#[test]
fn test_diagnostic_positions_are_zero_based() {
    let diagnostic = to_diagnostic(&SyntaxError::new(3, 5, "expected ':'"));
    assert_eq!(diagnostic.range.start, Position { line: 2, character: 4 });
    assert_eq!(diagnostic.range.end, Position { line: 2, character: 5 });
    assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::ERROR));
    assert_eq!(diagnostic.message, "expected ':'");
}

#[test]
fn test_diagnostic_clamps_zero_positions() {
    let diagnostic = to_diagnostic(&SyntaxError::new(0, 0, "invalid syntax"));
    assert_eq!(diagnostic.range.start, Position { line: 0, character: 0 });
}

#[test]
fn test_settled_params_render_bindings() {
    let params = ExecutionSettledParams::from(&report());
    assert_eq!(params.uri, "file:///tmp/a.py");
    assert_eq!(params.locals["xs"], "[1, 'b']");
    assert_eq!(params.globals["__source__"], "'file:///tmp/a.py'");

    let json = serde_json::to_value(&params).unwrap();
    assert_eq!(json["resumedFrom"], 2);
    assert_eq!(json["stdout"], "hi\n");
}

#[test]
fn test_summary_mentions_outcome() {
    let mut params = ExecutionSettledParams::from(&report());
    assert_eq!(summarize(&params), "file:///tmp/a.py: settled after 3 statement(s) from #2");
    params.faulted = true;
    assert!(summarize(&params).contains("faulted"));
}
