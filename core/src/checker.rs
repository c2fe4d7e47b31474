//! Syntax-checking pipeline
//!
//! A check parses the program, and on every syntax error repairs the broken
//! line in place and parses again, so one pass reports every error in the
//! text instead of only the first. A clean parse with run-after-check set is
//! forwarded to the executor pipeline.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::events::{EngineEvent, SharedSink};
use crate::executor::ExecutorPipeline;
use crate::frontend::{FrontEnd, Snapshot, SyntaxError};
use crate::queue::{Flow, Pending, Pipeline, Worker};
use crate::repair::RepairTable;
use crate::request::{CheckRequest, ExecRequest};

pub type CheckerPipeline<F> = Pipeline<CheckRequest, CheckerWorker<F>>;

/// Result of one repair-and-parse pass
#[derive(Debug)]
pub struct CheckOutcome<U> {
    /// Errors in the order they were found
    pub errors: Vec<SyntaxError>,
    /// Units of the final successful parse, if one was reached
    pub units: Option<Vec<U>>,
    /// Text after all repairs
    pub repaired: String,
    /// The pass gave up because a newer request arrived
    pub preempted: bool,
}

impl<U> CheckOutcome<U> {
    /// Units that can be executed: a clean parse with no repairs
    pub fn runnable(self) -> Option<Vec<U>> {
        if self.errors.is_empty() {
            self.units
        } else {
            None
        }
    }
}

/// Parse `text`, repairing broken lines until the parse succeeds
///
/// Stops early when the same line fails twice in a row (the repair made no
/// progress), when `has_newer` reports a newer request, or after one repair
/// per line of input.
pub fn check_program<F: FrontEnd>(
    frontend: &F,
    text: &str,
    source_id: &str,
    table: &RepairTable,
    mut has_newer: impl FnMut() -> bool,
) -> CheckOutcome<F::Unit> {
    let mut errors: Vec<SyntaxError> = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut current = text.to_string();
    let max_repairs = text.split('\n').count();

    loop {
        let error = match frontend.parse(&current, source_id) {
            Ok(units) => {
                return CheckOutcome {
                    errors,
                    units: Some(units),
                    repaired: current,
                    preempted: false,
                }
            }
            Err(error) => error,
        };

        if errors.last().is_some_and(|prev| prev.line == error.line) {
            debug!(line = error.line, "repair made no progress");
            break;
        }
        if has_newer() {
            debug!("check preempted by newer request");
            return CheckOutcome {
                errors,
                units: None,
                repaired: current,
                preempted: true,
            };
        }
        if errors.len() >= max_repairs {
            break;
        }

        if lines.is_empty() {
            lines = text.split('\n').map(str::to_string).collect();
        }
        table.repair(&mut lines, error.line);
        errors.push(error);
        current = lines.join("\n");
    }

    CheckOutcome {
        errors,
        units: None,
        repaired: current,
        preempted: false,
    }
}

pub struct CheckerWorker<F: FrontEnd> {
    frontend: Arc<F>,
    executor: ExecutorPipeline<F>,
    sink: SharedSink<F::Value>,
    table: RepairTable,
}

impl<F: FrontEnd> CheckerWorker<F> {
    pub fn new(frontend: Arc<F>, executor: ExecutorPipeline<F>, sink: SharedSink<F::Value>) -> Self {
        let table = frontend.repair_table();
        Self {
            frontend,
            executor,
            sink,
            table,
        }
    }

    fn check(
        &mut self,
        text: &str,
        source_id: &str,
        run_after_check: bool,
        pending: &Pending<'_, CheckRequest>,
    ) {
        self.sink.emit(EngineEvent::CheckStarted {
            source_id: source_id.to_string(),
        });

        let outcome = check_program(&*self.frontend, text, source_id, &self.table, || {
            pending.has_newer()
        });
        debug!(
            source_id,
            errors = outcome.errors.len(),
            preempted = outcome.preempted,
            "check finished"
        );

        self.sink.emit(EngineEvent::CheckEnded {
            source_id: source_id.to_string(),
            errors: outcome.errors.clone(),
        });

        if !run_after_check {
            return;
        }
        if let Some(units) = outcome.runnable() {
            let request = ExecRequest::Execute(Snapshot::new(source_id, units));
            if let Err(e) = self.executor.submit(request) {
                warn!(error = %e, "dropping execute request");
            }
        }
    }
}

impl<F: FrontEnd> Worker<CheckRequest> for CheckerWorker<F> {
    fn handle(&mut self, request: CheckRequest, pending: &Pending<'_, CheckRequest>) -> Flow {
        match request {
            CheckRequest::Check {
                text,
                source_id,
                run_after_check,
            } => {
                self.check(&text, &source_id, run_after_check, pending);
                Flow::Continue
            }
            CheckRequest::Terminate => Flow::Terminate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ToyFrontEnd;

    fn check(text: &str) -> CheckOutcome<crate::testing::ToyUnit> {
        check_program(&ToyFrontEnd::default(), text, "<test>", &RepairTable::default(), || false)
    }

    #[test]
    fn test_clean_program_has_no_errors() {
        let outcome = check("a = 1\nprint a");
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.units.map(|u| u.len()), Some(2));
    }

    #[test]
    fn test_every_broken_line_is_reported() {
        let outcome = check("a = 1\nb ? 2\nprint a\nc ? 3");
        let lines: Vec<usize> = outcome.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 4]);
        // The repaired text parsed, but it is not runnable
        assert!(outcome.units.is_some());
        assert!(outcome.runnable().is_none());
    }

    #[test]
    fn test_stops_when_same_line_fails_again() {
        // A fallback that reproduces the error cannot make progress
        let outcome = check_program(
            &ToyFrontEnd::default(),
            "a = 1\nb ? 2",
            "<test>",
            &RepairTable::new(Vec::new(), "b ? 2"),
            || false,
        );
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.units.is_none());
        assert!(!outcome.preempted);
    }

    #[test]
    fn test_newer_request_preempts_repair() {
        let outcome = check_program(
            &ToyFrontEnd::default(),
            "a ? 1\nb ? 2",
            "<test>",
            &RepairTable::default(),
            || true,
        );
        assert!(outcome.preempted);
        assert!(outcome.errors.is_empty());
        assert!(outcome.units.is_none());
    }

    #[test]
    fn test_repairs_bounded_by_line_count() {
        let text = "? ? ?\n? ?\n?";
        let outcome = check(text);
        assert!(outcome.errors.len() <= text.lines().count());
    }
}
