//! A small indentation-based scripting language
//!
//! Top-level statements are the units the engine diffs and caches. Function,
//! class and control-flow blocks belong to the statement that opens them, so
//! editing a function body replaces exactly one unit.

pub mod ast;
pub mod builtins;
pub mod interpreter;
pub mod ops;
pub mod parser;
pub mod validate;
pub mod value;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use tracing::trace;

use crate::config::ScriptConfig;
use crate::events::Bindings;
use crate::frontend::{Environment, EvalFault, FrontEnd, OutputBuffers, SyntaxError};

pub use ast::Stmt;
pub use interpreter::Interpreter;
pub use value::{Detacher, Value};

/// Name bound in globals to the program's source identifier
pub const SOURCE_BINDING: &str = "__source__";

/// Front end for the script language
#[derive(Debug, Clone)]
pub struct ScriptFrontEnd {
    max_steps: u64,
}

impl ScriptFrontEnd {
    pub fn new(config: &ScriptConfig) -> Self {
        Self {
            max_steps: config.max_steps,
        }
    }

    pub fn with_max_steps(max_steps: u64) -> Self {
        Self { max_steps }
    }
}

impl Default for ScriptFrontEnd {
    fn default() -> Self {
        Self::new(&ScriptConfig::default())
    }
}

impl FrontEnd for ScriptFrontEnd {
    type Unit = Stmt;
    type Compiled = Stmt;
    type Value = Value;

    fn parse(&self, text: &str, _source_id: &str) -> Result<Vec<Stmt>, SyntaxError> {
        parser::parse_program(text)
    }

    fn prepare(&self, unit: &Stmt, source_id: &str) -> Result<Stmt, EvalFault> {
        trace!(source_id, line = unit.line, "preparing statement");
        validate::validate(unit)?;
        Ok(unit.clone())
    }

    fn evaluate(
        &self,
        compiled: &Stmt,
        env: &mut Environment<Value>,
        output: &mut OutputBuffers,
    ) -> Result<(), EvalFault> {
        Interpreter::new(env, output, self.max_steps).run(compiled)
    }

    fn install_prelude(&self, env: &mut Environment<Value>, source_id: &str) {
        env.globals.insert(SOURCE_BINDING.to_string(), Value::str(source_id));
    }

    fn detach(&self, env: &Environment<Value>) -> Bindings<Value> {
        let mut detacher = Detacher::default();
        let mut copy = |names: &BTreeMap<String, Value>| -> BTreeMap<String, Value> {
            names
                .iter()
                .map(|(name, value)| (name.clone(), detacher.detach(value)))
                .collect()
        };
        let globals = copy(&env.globals);
        let locals = copy(&env.locals);
        Bindings { globals, locals }
    }
}
