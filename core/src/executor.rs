//! Incremental execution pipeline
//!
//! Each Execute request runs one cycle:
//! 1. apply the reset left behind by a faulted cycle
//! 2. reset on a source identity change
//! 3. diff the new snapshot against the retained one and truncate/reset
//! 4. evaluate from the cursor, yielding to newer requests between statements
//! 5. report the settled state (end of program or fault)

use std::sync::Arc;

use tracing::{debug, info};

use crate::events::{EngineEvent, SharedSink};
use crate::frontend::{FrontEnd, Snapshot};
use crate::queue::{Flow, Pending, Pipeline, Worker};
use crate::request::ExecRequest;
use crate::session::ExecutionSession;

pub type ExecutorPipeline<F> = Pipeline<ExecRequest<<F as FrontEnd>::Unit>, ExecutorWorker<F>>;

/// How an execution cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every statement up to the end of the snapshot was evaluated
    Settled,
    /// A statement faulted; the session resets before the next cycle
    Faulted,
    /// A newer request arrived; nothing was reported
    Preempted,
}

pub struct ExecutorWorker<F: FrontEnd> {
    session: ExecutionSession<F>,
    sink: SharedSink<F::Value>,
}

impl<F: FrontEnd> ExecutorWorker<F> {
    pub fn new(session: ExecutionSession<F>, sink: SharedSink<F::Value>) -> Self {
        Self { session, sink }
    }

    pub fn session(&self) -> &ExecutionSession<F> {
        &self.session
    }

    /// Run one execution cycle against `snapshot`
    pub fn execute(
        &mut self,
        snapshot: Arc<Snapshot<F::Unit>>,
        pending: &Pending<'_, ExecRequest<F::Unit>>,
    ) -> CycleOutcome {
        if self.session.is_faulted() {
            debug!("applying reset left by previous fault");
            self.session.reset();
        }
        if snapshot.source_id != self.session.source_id() {
            self.session.switch_source(&snapshot.source_id);
        }
        self.session.adopt(snapshot);

        let resumed_from = self.session.cursor();
        let mut evaluated = 0;
        while !self.session.is_finished() {
            if pending.has_newer() {
                debug!(cursor = self.session.cursor(), "execution preempted by newer request");
                return CycleOutcome::Preempted;
            }

            let index = self.session.cursor();
            let ok = self.session.step();
            evaluated += 1;
            self.sink.emit(EngineEvent::StatementExecuted { index });

            if !ok {
                break;
            }
        }

        let outcome = if self.session.is_faulted() {
            CycleOutcome::Faulted
        } else {
            CycleOutcome::Settled
        };
        info!(
            source_id = %self.session.source_id(),
            resumed_from,
            evaluated,
            ?outcome,
            "execution settled"
        );
        self.sink
            .emit(EngineEvent::ExecutionSettled(self.session.report(resumed_from, evaluated)));
        outcome
    }
}

impl<F: FrontEnd> Worker<ExecRequest<F::Unit>> for ExecutorWorker<F> {
    fn handle(
        &mut self,
        request: ExecRequest<F::Unit>,
        pending: &Pending<'_, ExecRequest<F::Unit>>,
    ) -> Flow {
        match request {
            ExecRequest::Execute(snapshot) => {
                debug!(statements = snapshot.len(), "execute request");
                self.execute(snapshot, pending);
                Flow::Continue
            }
            ExecRequest::Stop => {
                debug!("stop request");
                self.session.reset();
                Flow::Continue
            }
            ExecRequest::Terminate => Flow::Terminate,
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
