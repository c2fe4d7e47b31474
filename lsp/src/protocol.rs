//! Wire types exchanged with the editor beyond standard LSP

use std::collections::BTreeMap;

use livecode_core::script::Value;
use livecode_core::{ExecutionReport, SyntaxError};
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

pub const RUN_FROM_START: &str = "livecode.runFromStart";
pub const STOP: &str = "livecode.stop";

/// Sent after every execution cycle that ran to the end or faulted
pub enum ExecutionSettled {}

impl Notification for ExecutionSettled {
    type Params = ExecutionSettledParams;
    const METHOD: &'static str = "livecode/executionSettled";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSettledParams {
    pub uri: String,
    pub stdout: String,
    pub stderr: String,
    pub faulted: bool,
    pub resumed_from: usize,
    pub evaluated: usize,
    pub globals: BTreeMap<String, String>,
    pub locals: BTreeMap<String, String>,
}

impl From<&ExecutionReport<Value>> for ExecutionSettledParams {
    fn from(report: &ExecutionReport<Value>) -> Self {
        Self {
            uri: report.source_id.clone(),
            stdout: report.stdout.clone(),
            stderr: report.stderr.clone(),
            faulted: report.faulted,
            resumed_from: report.resumed_from,
            evaluated: report.evaluated,
            globals: render(&report.bindings.globals),
            locals: render(&report.bindings.locals),
        }
    }
}

fn render(bindings: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    bindings
        .iter()
        .map(|(name, value)| (name.clone(), value.repr()))
        .collect()
}

/// Diagnostic covering the character a syntax error points at
pub fn to_diagnostic(error: &SyntaxError) -> Diagnostic {
    let start = Position {
        line: error.line.saturating_sub(1) as u32,
        character: error.column.saturating_sub(1) as u32,
    };
    let end = Position {
        line: start.line,
        character: start.character + 1,
    };

    Diagnostic {
        range: Range { start, end },
        severity: Some(DiagnosticSeverity::ERROR),
        code: None,
        code_description: None,
        source: Some("livecode".to_string()),
        message: error.message.clone(),
        related_information: None,
        tags: None,
        data: None,
    }
}

/// One-line summary shown in the editor's log
pub fn summarize(params: &ExecutionSettledParams) -> String {
    let status = if params.faulted { "faulted" } else { "settled" };
    format!(
        "{}: {} after {} statement(s) from #{}",
        params.uri, status, params.evaluated, params.resumed_from
    )
}
