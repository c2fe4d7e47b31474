//! Execution session and compiled-unit cache
//!
//! A session is created once per executor pipeline and reset in place
//! whenever the already-evaluated prefix of the program stops being valid.
//!
//! ## State
//! - `snapshot`: the program currently being executed
//! - `cache`: prepared units, index-aligned with `snapshot`
//! - `env` / `output`: bindings and captured streams
//! - `cursor`: index of the next statement to evaluate
//! - `faulted`: sticky flag set by a failing statement

use std::sync::Arc;

use tracing::{debug, info};

use crate::diff::{diff_point, plan, SessionAction};
use crate::events::{EngineEvent, ExecutionReport, SharedSink};
use crate::frontend::{Environment, EvalFault, FrontEnd, OutputBuffers, Snapshot};

pub struct ExecutionSession<F: FrontEnd> {
    frontend: Arc<F>,
    sink: SharedSink<F::Value>,
    source_id: String,
    snapshot: Option<Arc<Snapshot<F::Unit>>>,
    cache: Vec<F::Compiled>,
    env: Environment<F::Value>,
    output: OutputBuffers,
    cursor: usize,
    faulted: bool,
    merge_output: bool,
}

impl<F: FrontEnd> ExecutionSession<F> {
    pub fn new(
        frontend: Arc<F>,
        sink: SharedSink<F::Value>,
        source_id: impl Into<String>,
        merge_output: bool,
    ) -> Self {
        let source_id = source_id.into();
        let mut env = Environment::new();
        frontend.install_prelude(&mut env, &source_id);

        Self {
            frontend,
            sink,
            source_id,
            snapshot: None,
            cache: Vec::new(),
            env,
            output: OutputBuffers::default(),
            cursor: 0,
            faulted: false,
            merge_output,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn env(&self) -> &Environment<F::Value> {
        &self.env
    }

    pub fn output(&self) -> &OutputBuffers {
        &self.output
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of statements in the current snapshot
    pub fn len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.len()
    }

    /// Switch to another program identity
    ///
    /// Nothing from the previous program can be reused: the retained
    /// snapshot and cache are dropped and the session is reset.
    pub fn switch_source(&mut self, source_id: &str) {
        let untouched = self.snapshot.is_none() && self.cursor == 0;
        self.source_id = source_id.to_string();
        self.snapshot = None;
        self.cache.clear();
        if untouched {
            // Nothing was evaluated, so there is nothing to report as discarded
            debug!(source_id, "fresh session adopts source");
            self.clear_state();
            return;
        }
        info!(to = %source_id, "source changed, discarding session");
        self.reset();
    }

    /// Diff `next` against the retained snapshot and apply the invalidation policy
    pub fn adopt(&mut self, next: Arc<Snapshot<F::Unit>>) -> SessionAction {
        let previous = self.snapshot.as_ref().map(|s| s.units.as_slice());
        let point = diff_point(previous, &next.units);
        let action = plan(point, self.cursor);
        debug!(?point, ?action, cursor = self.cursor, "diffed snapshot");

        match action {
            SessionAction::Keep => {}
            SessionAction::Resume { cache_len } => {
                self.cache.truncate(cache_len);
                self.snapshot = Some(next);
            }
            SessionAction::Reset { cache_len } => {
                self.cache.truncate(cache_len);
                self.reset();
                self.snapshot = Some(next);
            }
        }
        action
    }

    /// Evaluable form of statement `index`, prepared on first access
    pub fn prepare(&mut self, index: usize) -> Result<&F::Compiled, EvalFault> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| EvalFault::new("InternalError", "no program loaded"))?;
        if index >= snapshot.len() {
            return Err(EvalFault::new(
                "InternalError",
                format!("statement {} out of range ({} statements)", index, snapshot.len()),
            ));
        }

        while self.cache.len() <= index {
            let unit = &snapshot.units[self.cache.len()];
            let compiled = self.frontend.prepare(unit, &self.source_id)?;
            self.cache.push(compiled);
        }
        Ok(&self.cache[index])
    }

    /// Evaluate statement `index`, capturing any fault into the error buffer
    ///
    /// Returns `false` when the statement faulted.
    pub fn evaluate(&mut self, index: usize) -> bool {
        if let Err(fault) = self.prepare(index).map(|_| ()) {
            self.record_fault(fault);
            return false;
        }

        let outcome = self
            .frontend
            .evaluate(&self.cache[index], &mut self.env, &mut self.output);
        match outcome {
            Ok(()) => true,
            Err(fault) => {
                self.record_fault(fault);
                false
            }
        }
    }

    /// Evaluate the statement under the cursor and advance
    pub fn step(&mut self) -> bool {
        let index = self.cursor;
        let ok = self.evaluate(index);
        self.cursor += 1;
        ok
    }

    fn record_fault(&mut self, fault: EvalFault) {
        debug!(%fault, "statement faulted");
        let rendered = fault.render(&self.source_id);
        self.output.write_err(&rendered);
        if self.merge_output {
            self.output.write_out(&rendered);
        }
        self.faulted = true;
    }

    /// Discard all evaluation state; the snapshot and cache survive
    pub fn reset(&mut self) {
        self.clear_state();
        info!(source_id = %self.source_id, "session reset");
        self.sink.emit(EngineEvent::SessionReset);
    }

    fn clear_state(&mut self) {
        self.env.clear();
        self.frontend.install_prelude(&mut self.env, &self.source_id);
        self.output.clear();
        self.cursor = 0;
        self.faulted = false;
    }

    /// Settled state of the session, detached from the live environment
    pub fn report(&self, resumed_from: usize, evaluated: usize) -> ExecutionReport<F::Value> {
        ExecutionReport {
            source_id: self.source_id.clone(),
            stdout: self.output.stdout.clone(),
            stderr: self.output.stderr.clone(),
            bindings: self.frontend.detach(&self.env),
            faulted: self.faulted,
            resumed_from,
            evaluated,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
