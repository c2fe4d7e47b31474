//! Notifications emitted by the pipelines
//!
//! Events are delivered from worker threads. Consumers pick how to marshal
//! them onto their own loop by choosing an [`EventSink`] implementation.

use crate::frontend::SyntaxError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Copy of the session bindings at the end of an execution cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings<V> {
    pub globals: BTreeMap<String, V>,
    pub locals: BTreeMap<String, V>,
}

/// Everything a console or renderer needs after a cycle settles
#[derive(Debug, Clone)]
pub struct ExecutionReport<V> {
    pub source_id: String,
    pub stdout: String,
    pub stderr: String,
    pub bindings: Bindings<V>,
    /// A statement raised; the session resets at the start of the next cycle
    pub faulted: bool,
    /// Cursor when evaluation started in this cycle
    pub resumed_from: usize,
    /// Number of statements evaluated in this cycle
    pub evaluated: usize,
}

#[derive(Debug, Clone)]
pub enum EngineEvent<V> {
    CheckStarted { source_id: String },
    CheckEnded { source_id: String, errors: Vec<SyntaxError> },
    StatementExecuted { index: usize },
    ExecutionSettled(ExecutionReport<V>),
    SessionReset,
}

/// Receiver of engine notifications
pub trait EventSink<V>: Send + Sync {
    fn emit(&self, event: EngineEvent<V>);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl<V> EventSink<V> for NullSink {
    fn emit(&self, _event: EngineEvent<V>) {}
}

impl<V: Send> EventSink<V> for tokio::sync::mpsc::UnboundedSender<EngineEvent<V>> {
    fn emit(&self, event: EngineEvent<V>) {
        // A closed receiver means nobody is listening anymore
        if self.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

pub type SharedSink<V> = Arc<dyn EventSink<V>>;
