//! Lazily started single-worker request queues
//!
//! Each pipeline owns one FIFO channel and at most one worker thread.
//! The worker is spawned by the first submission after the pipeline went
//! idle and exits as soon as it observes the queue empty. Handlers see a
//! [`Pending`] view of the queue so long-running work can notice that newer
//! requests arrived and give up early.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

use crate::error::{EngineError, EngineResult};

/// Evaluation recurses on the worker's stack
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// What the worker loop does after handling a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Read-only view of the requests queued behind the one being handled
pub struct Pending<'a, R> {
    rx: &'a UnboundedReceiver<R>,
}

impl<'a, R> Pending<'a, R> {
    pub(crate) fn new(rx: &'a UnboundedReceiver<R>) -> Self {
        Self { rx }
    }

    /// True when a newer request is waiting; checked at preemption points
    pub fn has_newer(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Request handler owned by a pipeline, kept across worker restarts
pub trait Worker<R>: Send + 'static {
    fn handle(&mut self, request: R, pending: &Pending<'_, R>) -> Flow;
}

#[derive(Debug, Default)]
struct WorkerState {
    active: bool,
    /// No more submissions are accepted
    closed: bool,
    /// The worker handled its final request and exited
    terminated: bool,
}

struct Shared<R, W> {
    name: &'static str,
    tx: UnboundedSender<R>,
    rx: Mutex<UnboundedReceiver<R>>,
    worker: Mutex<W>,
    state: Mutex<WorkerState>,
}

/// Handle to a pipeline; clones submit into the same queue
pub struct Pipeline<R, W> {
    shared: Arc<Shared<R, W>>,
}

impl<R, W> Clone for Pipeline<R, W> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R, W> Pipeline<R, W>
where
    R: Send + 'static,
    W: Worker<R>,
{
    pub fn new(name: &'static str, worker: W) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                name,
                tx,
                rx: Mutex::new(rx),
                worker: Mutex::new(worker),
                state: Mutex::new(WorkerState::default()),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Enqueue a request, starting a worker if none is running
    ///
    /// Never blocks on the worker. Fails once the pipeline was closed.
    pub fn submit(&self, request: R) -> EngineResult<()> {
        let mut state = lock(&self.shared.state);
        self.enqueue(&mut state, request)
    }

    /// Enqueue a final request; every later submission is rejected
    ///
    /// Requests submitted earlier are still handled in order.
    pub fn close(&self, request: R) -> EngineResult<()> {
        let mut state = lock(&self.shared.state);
        self.enqueue(&mut state, request)?;
        state.closed = true;
        Ok(())
    }

    fn enqueue(&self, state: &mut WorkerState, request: R) -> EngineResult<()> {
        let rejected = || EngineError::PipelineTerminated {
            pipeline: self.shared.name,
        };
        if state.closed {
            return Err(rejected());
        }

        // Sent under the state lock so an exiting worker re-checks the queue
        self.shared.tx.send(request).map_err(|_| rejected())?;

        if !state.active {
            let shared = Arc::clone(&self.shared);
            thread::Builder::new()
                .name(format!("livecode-{}", self.shared.name))
                .stack_size(WORKER_STACK_SIZE)
                .spawn(move || run_worker(shared))
                .map_err(|source| EngineError::WorkerSpawn {
                    pipeline: self.shared.name,
                    source,
                })?;
            state.active = true;
            debug!(pipeline = self.shared.name, "worker started");
        }
        Ok(())
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.shared.state).terminated
    }

    /// True when no worker thread is running
    pub fn is_idle(&self) -> bool {
        !lock(&self.shared.state).active
    }
}

fn run_worker<R, W>(shared: Arc<Shared<R, W>>)
where
    R: Send + 'static,
    W: Worker<R>,
{
    let mut rx = lock(&shared.rx);
    let mut worker = lock(&shared.worker);

    loop {
        let Ok(request) = rx.try_recv() else {
            let mut state = lock(&shared.state);
            // Submitters send while holding `state`, so this check cannot miss one
            if rx.is_empty() {
                state.active = false;
                debug!(pipeline = shared.name, "queue drained, worker exiting");
                return;
            }
            continue;
        };

        let pending = Pending::new(&rx);
        let flow = panic::catch_unwind(AssertUnwindSafe(|| worker.handle(request, &pending)))
            .unwrap_or_else(|_| {
                error!(pipeline = shared.name, "request handler panicked");
                Flow::Continue
            });

        if flow == Flow::Terminate {
            let mut state = lock(&shared.state);
            state.closed = true;
            rx.close();
            let mut dropped = 0;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            state.terminated = true;
            state.active = false;
            debug!(pipeline = shared.name, dropped, "pipeline terminated");
            return;
        }
    }
}
