//! Requests accepted by the two pipelines

use std::sync::Arc;

use crate::frontend::Snapshot;

/// Request for the checker pipeline
#[derive(Debug, Clone)]
pub enum CheckRequest {
    /// Parse `text`, report syntax errors and optionally execute it
    Check {
        text: String,
        source_id: String,
        run_after_check: bool,
    },
    /// Stop the pipeline for good
    Terminate,
}

/// Request for the executor pipeline
#[derive(Debug)]
pub enum ExecRequest<U> {
    /// Bring the session up to date with a freshly parsed program
    Execute(Arc<Snapshot<U>>),
    /// Reset the session, keep the pipeline alive
    Stop,
    /// Stop the pipeline for good
    Terminate,
}
