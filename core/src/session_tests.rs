//! Tests for the execution session and its compiled-unit cache

use super::*;
use crate::events::NullSink;
use crate::testing::{ToyFrontEnd, ToyUnit};

/* ===================== Helpers ===================== */

fn session() -> (Arc<ToyFrontEnd>, ExecutionSession<ToyFrontEnd>) {
    let frontend = Arc::new(ToyFrontEnd::default());
    let session = ExecutionSession::new(frontend.clone(), Arc::new(NullSink), "<test>", false);
    (frontend, session)
}

fn snapshot(frontend: &ToyFrontEnd, text: &str) -> Arc<Snapshot<ToyUnit>> {
    Snapshot::new("<test>", frontend.parse(text, "<test>").expect("Parse should succeed"))
}

fn run_to_end(session: &mut ExecutionSession<ToyFrontEnd>) {
    while !session.is_finished() && !session.is_faulted() {
        session.step();
    }
}

/* ===================== Cache ===================== */

#[test]
fn test_prepare_caches_each_index_once() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 1\nb = 2"));

    session.prepare(0).unwrap();
    session.prepare(0).unwrap();
    session.prepare(1).unwrap();

    assert_eq!(frontend.prepared().len(), 2);
    assert_eq!(session.cache_len(), 2);
}

#[test]
fn test_prepare_out_of_range_is_a_fault() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 1"));
    assert!(session.prepare(5).is_err());
}

#[test]
fn test_cache_survives_reset() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 1\nprint a"));
    run_to_end(&mut session);

    session.reset();
    run_to_end(&mut session);

    assert_eq!(frontend.prepared().len(), 2);
    assert_eq!(frontend.evaluated().len(), 4);
}

/* ===================== Evaluation ===================== */

#[test]
fn test_step_appends_output_and_advances() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 7\nprint a"));
    run_to_end(&mut session);

    assert_eq!(session.cursor(), 2);
    assert_eq!(session.output().stdout, "7\n");
    assert_eq!(session.env().locals.get("a"), Some(&7));
}

#[test]
fn test_fault_is_captured_not_propagated() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "print missing"));

    assert!(!session.step());
    assert!(session.is_faulted());
    assert!(session.output().stderr.contains("NameError"));
    assert!(session.output().stdout.is_empty());
}

#[test]
fn test_merged_output_copies_diagnostics_to_stdout() {
    let frontend = Arc::new(ToyFrontEnd::default());
    let mut session = ExecutionSession::new(frontend.clone(), Arc::new(NullSink), "<test>", true);
    session.adopt(snapshot(&frontend, "fail"));
    session.step();

    assert!(session.output().stdout.contains("Exception: boom"));
    assert_eq!(session.output().stdout, session.output().stderr);
}

#[test]
fn test_reset_clears_everything() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 1\nfail"));
    run_to_end(&mut session);
    assert!(session.is_faulted());

    session.reset();

    assert_eq!(session.cursor(), 0);
    assert!(!session.is_faulted());
    assert!(session.env().is_empty());
    assert_eq!(session.output(), &OutputBuffers::default());
}

/* ===================== Adopt ===================== */

#[test]
fn test_adopt_change_after_cursor_resumes() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 1\nb = 2"));
    run_to_end(&mut session);

    let action = session.adopt(snapshot(&frontend, "a = 1\nb = 2\nc = 3"));

    assert_eq!(action, SessionAction::Resume { cache_len: 2 });
    assert_eq!(session.cursor(), 2);
    assert_eq!(session.len(), 3);
}

#[test]
fn test_adopt_change_before_cursor_resets() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 1\nb = 2\nc = 3"));
    run_to_end(&mut session);

    let action = session.adopt(snapshot(&frontend, "a = 1\nb = 5\nc = 3"));

    assert_eq!(action, SessionAction::Reset { cache_len: 1 });
    assert_eq!(session.cursor(), 0);
    assert_eq!(session.cache_len(), 1);
    assert!(session.env().is_empty());
}

#[test]
fn test_adopt_unchanged_keeps_cache_and_cursor() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 1\nb = 2"));
    run_to_end(&mut session);

    // Whitespace does not change structure
    let action = session.adopt(snapshot(&frontend, "a   =   1\n\nb = 2\n"));

    assert_eq!(action, SessionAction::Keep);
    assert_eq!(session.cursor(), 2);
    assert_eq!(session.cache_len(), 2);
}

#[test]
fn test_switch_source_forgets_snapshot() {
    let (frontend, mut session) = session();
    session.adopt(snapshot(&frontend, "a = 1"));
    run_to_end(&mut session);

    session.switch_source("other.py");

    assert_eq!(session.source_id(), "other.py");
    assert_eq!(session.len(), 0);
    assert_eq!(session.cache_len(), 0);
    assert_eq!(session.cursor(), 0);
}
