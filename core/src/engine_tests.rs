//! End-to-end tests driving both pipelines with the script front end

use std::collections::BTreeMap;
use std::time::Duration;

use maplit::btreemap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::error::EngineError;
use crate::events::ExecutionReport;
use crate::frontend::SyntaxError;
use crate::script::{ScriptFrontEnd, Value};

const WAIT: Duration = Duration::from_secs(10);

/* ===================== Helpers ===================== */

type Events = UnboundedReceiver<EngineEvent<Value>>;

fn engine() -> (LiveEngine<ScriptFrontEnd>, Events) {
    let config = EngineConfig {
        default_source_id: "main.py".to_string(),
        ..EngineConfig::default()
    };
    LiveEngine::with_channel(Arc::new(ScriptFrontEnd::default()), config)
}

async fn next_event(events: &mut Events) -> EngineEvent<Value> {
    timeout(WAIT, events.recv())
        .await
        .expect("Timed out waiting for an engine event")
        .expect("Event channel closed")
}

async fn next_settled(events: &mut Events) -> ExecutionReport<Value> {
    loop {
        if let EngineEvent::ExecutionSettled(report) = next_event(events).await {
            return report;
        }
    }
}

async fn next_check(events: &mut Events) -> Vec<SyntaxError> {
    loop {
        if let EngineEvent::CheckEnded { errors, .. } = next_event(events).await {
            return errors;
        }
    }
}

fn locals(report: &ExecutionReport<Value>) -> BTreeMap<String, String> {
    report
        .bindings
        .locals
        .iter()
        .map(|(name, value)| (name.clone(), value.repr()))
        .collect()
}

/* ===================== Tests ===================== */

#[tokio::test(flavor = "multi_thread")]
async fn test_edit_after_cursor_resumes_from_unchanged_prefix() {
    let (engine, mut events) = engine();

    assert_ok!(engine.submit_check("a = 1\nb = 2\n", None, true));
    let first = next_settled(&mut events).await;
    assert_eq!(first.resumed_from, 0);
    assert_eq!(first.evaluated, 2);

    assert_ok!(engine.submit_check("a = 1\nb = 2\nc = a + b\nprint(c)\n", None, true));
    let second = next_settled(&mut events).await;
    assert_eq!(second.resumed_from, 2);
    assert_eq!(second.evaluated, 2);
    assert_eq!(second.stdout, "3\n");
    assert_eq!(
        locals(&second),
        btreemap! {
            "a".to_string() => "1".to_string(),
            "b".to_string() => "2".to_string(),
            "c".to_string() => "3".to_string(),
        }
    );

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_report_is_not_changed_by_later_cycles() {
    let (engine, mut events) = engine();

    assert_ok!(engine.submit_check("xs = [1]\n", None, true));
    let first = next_settled(&mut events).await;
    assert_eq!(locals(&first)["xs"], "[1]");

    assert_ok!(engine.submit_check("xs = [1]\nxs.append(2)\n", None, true));
    let second = next_settled(&mut events).await;
    assert_eq!(second.resumed_from, 1);
    assert_eq!(locals(&second)["xs"], "[1, 2]");

    assert_eq!(locals(&first)["xs"], "[1]");

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resubmitting_unchanged_program_evaluates_nothing() {
    let (engine, mut events) = engine();
    let text = "x = 1\n# comment\nprint(x)\n";

    assert_ok!(engine.submit_check(text, None, true));
    assert_eq!(next_settled(&mut events).await.evaluated, 2);

    // Layout-only edits keep every statement equal
    assert_ok!(engine.submit_check("x=1\n\nprint( x )\n", None, true));
    let report = next_settled(&mut events).await;
    assert_eq!(report.evaluated, 0);
    assert_eq!(report.resumed_from, 2);
    assert_eq!(report.stdout, "1\n");

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_edit_before_cursor_reevaluates_from_start() {
    let (engine, mut events) = engine();

    assert_ok!(engine.submit_check("a = 1\nprint(a)\n", None, true));
    assert_eq!(next_settled(&mut events).await.stdout, "1\n");

    assert_ok!(engine.submit_check("a = 5\nprint(a)\n", None, true));
    let report = next_settled(&mut events).await;
    assert_eq!(report.resumed_from, 0);
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.stdout, "5\n");

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_syntax_errors_keep_program_from_running() {
    let (engine, mut events) = engine();

    assert_ok!(engine.submit_check("x = 1\nif x\n    y = (\n", None, true));
    let errors = next_check(&mut events).await;
    let lines: Vec<usize> = errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![2, 3]);

    assert_ok!(engine.submit_check("z = 2\n", None, true));
    assert!(next_check(&mut events).await.is_empty());
    let report = next_settled(&mut events).await;
    assert_eq!(
        locals(&report),
        btreemap! { "z".to_string() => "2".to_string() }
    );

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fault_stops_cycle_and_resets_the_next_one() {
    let (engine, mut events) = engine();

    assert_ok!(engine.submit_check("a = 1\nb = a / 0\nc = 3\n", None, true));
    let faulted = next_settled(&mut events).await;
    assert!(faulted.faulted);
    assert_eq!(faulted.evaluated, 2);
    assert!(faulted.stderr.contains("ZeroDivisionError"), "{}", faulted.stderr);
    assert!(faulted.stderr.contains("main.py:2"), "{}", faulted.stderr);
    assert!(!faulted.bindings.locals.contains_key("c"));

    // Resubmitting the same program starts over instead of resuming past the fault
    assert_ok!(engine.submit_check("a = 1\nb = a / 0\nc = 3\n", None, true));
    let unchanged = next_settled(&mut events).await;
    assert_eq!(unchanged.resumed_from, 0);
    assert_eq!(unchanged.evaluated, 2);
    assert_eq!(unchanged.stderr.matches("ZeroDivisionError").count(), 1);

    // Fixing a statement after the fault still starts over
    assert_ok!(engine.submit_check("a = 1\nb = a / 0\nc = 3\nd = 4\n", None, true));
    let rerun = next_settled(&mut events).await;
    assert_eq!(rerun.resumed_from, 0);
    assert!(rerun.faulted);

    assert_ok!(engine.submit_check("a = 1\nb = a / 1\nc = 3\n", None, true));
    let fixed = next_settled(&mut events).await;
    assert!(!fixed.faulted);
    assert_eq!(fixed.resumed_from, 0);
    assert_eq!(fixed.evaluated, 3);
    assert!(fixed.stderr.is_empty());

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_source_change_discards_session() {
    let (engine, mut events) = engine();

    assert_ok!(engine.submit_check("a = 1\n", Some("one.py"), true));
    let first = next_settled(&mut events).await;
    assert_eq!(first.bindings.globals["__source__"], Value::str("one.py"));

    assert_ok!(engine.submit_check("a = 1\n", Some("two.py"), true));
    let second = next_settled(&mut events).await;
    assert_eq!(second.source_id, "two.py");
    assert_eq!(second.resumed_from, 0);
    assert_eq!(second.evaluated, 1);
    assert_eq!(second.bindings.globals["__source__"], Value::str("two.py"));

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_from_start_reevaluates_everything() {
    let (engine, mut events) = engine();
    let text = "n = 0\nn += 1\nprint(n)\n";

    assert_ok!(engine.run_from_last(text, None));
    assert_eq!(next_settled(&mut events).await.stdout, "1\n");

    assert_ok!(engine.run_from_start(text, None));
    let report = next_settled(&mut events).await;
    assert_eq!(report.resumed_from, 0);
    assert_eq!(report.evaluated, 3);
    assert_eq!(report.stdout, "1\n");

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_rejects_later_submissions() {
    let (engine, mut events) = engine();
    assert_ok!(engine.submit_check("a = 1\n", None, true));
    next_settled(&mut events).await;

    engine.shutdown();
    timeout(WAIT, async {
        while !engine.is_terminated() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Pipelines should terminate");

    let err = assert_err!(engine.submit_check("a = 2\n", None, true));
    assert!(matches!(err, EngineError::PipelineTerminated { pipeline: "checker" }));
    assert!(engine.stop_execution().is_err());
}
