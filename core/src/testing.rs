//! Minimal line-based front end used by the unit tests
//!
//! One statement per line:
//! - `name = 42` binds a local
//! - `print name` writes the value to stdout
//! - `fail` raises
//! - any line containing `?` is a syntax error at that column

use std::sync::{Arc, Mutex};

use crate::frontend::{Environment, EvalFault, FrontEnd, OutputBuffers, SyntaxError};

#[derive(Debug, Clone, PartialEq)]
pub enum ToyUnit {
    Assign(String, i64),
    Print(String),
    Fail,
}

/// Front end that records every prepare and evaluate call
#[derive(Debug, Default)]
pub struct ToyFrontEnd {
    pub prepared: Arc<Mutex<Vec<ToyUnit>>>,
    pub evaluated: Arc<Mutex<Vec<ToyUnit>>>,
}

impl ToyFrontEnd {
    pub fn prepared(&self) -> Vec<ToyUnit> {
        self.prepared.lock().unwrap().clone()
    }

    pub fn evaluated(&self) -> Vec<ToyUnit> {
        self.evaluated.lock().unwrap().clone()
    }
}

impl FrontEnd for ToyFrontEnd {
    type Unit = ToyUnit;
    type Compiled = ToyUnit;
    type Value = i64;

    fn parse(&self, text: &str, _source_id: &str) -> Result<Vec<ToyUnit>, SyntaxError> {
        let mut units = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if let Some(col) = line.find('?') {
                return Err(SyntaxError::new(idx + 1, col + 1, "unexpected '?'"));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "fail" {
                units.push(ToyUnit::Fail);
            } else if let Some(name) = trimmed.strip_prefix("print ") {
                units.push(ToyUnit::Print(name.trim().to_string()));
            } else if let Some((name, value)) = trimmed.split_once('=') {
                let value = value
                    .trim()
                    .parse()
                    .map_err(|_| SyntaxError::new(idx + 1, 1, "expected a number"))?;
                units.push(ToyUnit::Assign(name.trim().to_string(), value));
            } else if trimmed == "pass" {
                continue;
            } else {
                return Err(SyntaxError::new(idx + 1, 1, "invalid syntax"));
            }
        }
        Ok(units)
    }

    fn prepare(&self, unit: &ToyUnit, _source_id: &str) -> Result<ToyUnit, EvalFault> {
        self.prepared.lock().unwrap().push(unit.clone());
        Ok(unit.clone())
    }

    fn evaluate(
        &self,
        compiled: &ToyUnit,
        env: &mut Environment<i64>,
        output: &mut OutputBuffers,
    ) -> Result<(), EvalFault> {
        self.evaluated.lock().unwrap().push(compiled.clone());
        match compiled {
            ToyUnit::Assign(name, value) => {
                env.locals.insert(name.clone(), *value);
                Ok(())
            }
            ToyUnit::Print(name) => {
                let value = env
                    .get(name)
                    .ok_or_else(|| EvalFault::new("NameError", format!("'{}' is not defined", name)))?;
                output.write_out(&format!("{}\n", value));
                Ok(())
            }
            ToyUnit::Fail => Err(EvalFault::new("Exception", "boom")),
        }
    }
}
