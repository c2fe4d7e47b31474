//! Front-end capability the engine is polymorphic over
//!
//! The engine never looks inside a program. It asks a front end to:
//! 1. parse text into an ordered list of top-level statement units,
//! 2. prepare one unit into an evaluable form (cached by the session),
//! 3. evaluate a prepared unit against an [`Environment`].
//!
//! Statement units are compared with `PartialEq`, which must be structural:
//! two units that only differ in whitespace, comments or positions compare equal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::events::Bindings;
use crate::repair::RepairTable;

/* ===================== Errors ===================== */

/// A syntax error reported by [`FrontEnd::parse`]
///
/// `line` and `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// A failure raised while preparing or evaluating a statement
///
/// Faults are data: the session formats them into the error buffer and
/// never lets them escape the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalFault {
    /// Error class, e.g. `NameError`
    pub kind: String,
    pub message: String,
    /// 1-based line of the statement that raised, when known
    pub line: Option<usize>,
}

impl EvalFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            line: None,
        }
    }

    /// Attach a line if none was recorded closer to the failure
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    /// Render the fault as a diagnostic for the error buffer
    pub fn render(&self, source_id: &str) -> String {
        match self.line {
            Some(line) => format!(
                "error: {}: {}\n  --> {}:{}\n",
                self.kind, self.message, source_id, line
            ),
            None => format!("error: {}: {}\n  --> {}\n", self.kind, self.message, source_id),
        }
    }
}

impl fmt::Display for EvalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for EvalFault {}

/* ===================== Environment ===================== */

/// Module-level and local bindings of one execution session
///
/// Owned by the session and lent to the front end by `&mut` for the
/// duration of a single evaluation.
#[derive(Debug, Clone)]
pub struct Environment<V> {
    pub globals: BTreeMap<String, V>,
    pub locals: BTreeMap<String, V>,
}

impl<V> Environment<V> {
    pub fn new() -> Self {
        Self {
            globals: BTreeMap::new(),
            locals: BTreeMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.globals.clear();
        self.locals.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty() && self.locals.is_empty()
    }

    /// Look a name up in locals first, then globals
    pub fn get(&self, name: &str) -> Option<&V> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }
}

impl<V> Default for Environment<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Captured standard output and standard error of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffers {
    pub stdout: String,
    pub stderr: String,
}

impl OutputBuffers {
    pub fn write_out(&mut self, text: &str) {
        self.stdout.push_str(text);
    }

    pub fn write_err(&mut self, text: &str) {
        self.stderr.push_str(text);
    }

    pub fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
    }
}

/* ===================== Snapshot ===================== */

/// The statement units produced by one successful parse
#[derive(Debug)]
pub struct Snapshot<U> {
    pub source_id: String,
    pub units: Vec<U>,
}

impl<U> Snapshot<U> {
    pub fn new(source_id: impl Into<String>, units: Vec<U>) -> Arc<Self> {
        Arc::new(Self {
            source_id: source_id.into(),
            units,
        })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/* ===================== Front End ===================== */

/// Parse/prepare/evaluate capability for one language
pub trait FrontEnd: Send + Sync + 'static {
    /// One top-level statement, compared structurally
    type Unit: PartialEq + fmt::Debug + Send + Sync + 'static;
    /// Evaluable form of a unit, produced at most once per cache lifetime
    type Compiled: Send + 'static;
    /// Runtime value stored in the environment
    type Value: Clone + fmt::Debug + fmt::Display + Send + 'static;

    /// Parse a whole program into top-level statement units
    fn parse(&self, text: &str, source_id: &str) -> Result<Vec<Self::Unit>, SyntaxError>;

    /// Turn a unit into its evaluable form
    fn prepare(&self, unit: &Self::Unit, source_id: &str) -> Result<Self::Compiled, EvalFault>;

    /// Evaluate a prepared unit, writing any output into `output`
    fn evaluate(
        &self,
        compiled: &Self::Compiled,
        env: &mut Environment<Self::Value>,
        output: &mut OutputBuffers,
    ) -> Result<(), EvalFault>;

    /// Seed a freshly reset environment
    fn install_prelude(&self, _env: &mut Environment<Self::Value>, _source_id: &str) {}

    /// Copy the bindings of `env` out for delivery to consumers
    ///
    /// Reports leave the executor thread, so values sharing mutable storage
    /// with the session must be deep copied here.
    fn detach(&self, env: &Environment<Self::Value>) -> Bindings<Self::Value> {
        Bindings {
            globals: env.globals.clone(),
            locals: env.locals.clone(),
        }
    }

    /// Stand-ins the checker uses to repair broken lines
    fn repair_table(&self) -> RepairTable {
        RepairTable::block_keywords()
    }
}
