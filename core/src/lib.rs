pub mod checker;
pub mod cli;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod frontend;
pub mod queue;
pub mod repair;
pub mod request;
pub mod script;
pub mod session;

#[cfg(test)]
pub mod testing;

// Re-export the collaborator-facing API
pub use config::{EngineConfig, ScriptConfig};
pub use engine::LiveEngine;
pub use error::{EngineError, EngineResult};
pub use events::{Bindings, EngineEvent, EventSink, ExecutionReport, NullSink, SharedSink};
pub use frontend::{Environment, EvalFault, FrontEnd, OutputBuffers, Snapshot, SyntaxError};
pub use repair::{RepairRule, RepairTable};
pub use script::ScriptFrontEnd;
