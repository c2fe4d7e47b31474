//! Collaborator-facing engine: a checker and an executor pipeline sharing one sink

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

use crate::checker::{CheckerPipeline, CheckerWorker};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::events::{EngineEvent, SharedSink};
use crate::executor::{ExecutorPipeline, ExecutorWorker};
use crate::frontend::FrontEnd;
use crate::queue::Pipeline;
use crate::request::{CheckRequest, ExecRequest};
use crate::session::ExecutionSession;

pub struct LiveEngine<F: FrontEnd> {
    config: EngineConfig,
    checker: CheckerPipeline<F>,
    executor: ExecutorPipeline<F>,
}

impl<F: FrontEnd> LiveEngine<F> {
    pub fn new(frontend: Arc<F>, sink: SharedSink<F::Value>, config: EngineConfig) -> Self {
        let session = ExecutionSession::new(
            Arc::clone(&frontend),
            Arc::clone(&sink),
            config.default_source_id.clone(),
            config.merge_output_streams,
        );
        let executor = Pipeline::new("executor", ExecutorWorker::new(session, Arc::clone(&sink)));
        let checker = Pipeline::new("checker", CheckerWorker::new(frontend, executor.clone(), sink));

        Self {
            config,
            checker,
            executor,
        }
    }

    /// Engine whose events arrive on a tokio channel
    pub fn with_channel(
        frontend: Arc<F>,
        config: EngineConfig,
    ) -> (Self, UnboundedReceiver<EngineEvent<F::Value>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(frontend, Arc::new(tx), config), rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Queue a check of `text`; fire and forget
    ///
    /// Without a `source_id` the configured default identity is used.
    pub fn submit_check(
        &self,
        text: impl Into<String>,
        source_id: Option<&str>,
        run_after_check: bool,
    ) -> EngineResult<()> {
        let source_id = source_id.unwrap_or(&self.config.default_source_id);
        self.checker.submit(CheckRequest::Check {
            text: text.into(),
            source_id: source_id.to_string(),
            run_after_check,
        })
    }

    /// Reset the execution session; the executor stays usable
    pub fn stop_execution(&self) -> EngineResult<()> {
        self.executor.submit(ExecRequest::Stop)
    }

    /// Run the program again from its first statement
    pub fn run_from_start(&self, text: impl Into<String>, source_id: Option<&str>) -> EngineResult<()> {
        self.stop_execution()?;
        self.submit_check(text, source_id, true)
    }

    /// Bring the session up to date, reusing the evaluated prefix
    pub fn run_from_last(&self, text: impl Into<String>, source_id: Option<&str>) -> EngineResult<()> {
        self.submit_check(text, source_id, true)
    }

    pub fn terminate_executor(&self) -> EngineResult<()> {
        self.executor.close(ExecRequest::Terminate)
    }

    pub fn terminate_checker(&self) -> EngineResult<()> {
        self.checker.close(CheckRequest::Terminate)
    }

    /// Terminate both pipelines; later submissions are rejected
    pub fn shutdown(&self) {
        info!("shutting down engine");
        for result in [self.terminate_checker(), self.terminate_executor()] {
            if let Err(e) = result {
                debug!(error = %e, "pipeline already terminated");
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.checker.is_terminated() && self.executor.is_terminated()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
