//! Tree-walking evaluator for one top-level statement
//!
//! Name resolution order: innermost function frame, then the session's
//! locals, then its globals, then builtins. Top-level assignments bind into
//! the session's locals.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::ast::{Expr, Handler, Stmt, StmtKind, Target, UnaryOp};
use super::builtins::Builtin;
use super::ops;
use super::value::{lock, BoundMethod, Class, ErrorValue, Function, Instance, ListOp, Value};
use crate::frontend::{Environment, EvalFault, OutputBuffers};

/// Nested calls allowed before `RecursionError`
const MAX_CALL_DEPTH: usize = 100;

/// Non-local exit from a statement
#[derive(Debug)]
enum Signal {
    Break,
    Continue,
    Return(Value),
    Raise(EvalFault),
}

impl From<EvalFault> for Signal {
    fn from(fault: EvalFault) -> Self {
        Signal::Raise(fault)
    }
}

type Exec<T> = Result<T, Signal>;

#[derive(Debug, Default)]
struct Frame {
    vars: BTreeMap<String, Value>,
    /// Names declared `global`; they bind at module level
    globals: Vec<String>,
}

pub struct Interpreter<'a> {
    env: &'a mut Environment<Value>,
    output: &'a mut OutputBuffers,
    frames: Vec<Frame>,
    steps: u64,
    max_steps: u64,
    /// Errors being handled by enclosing `except` blocks, innermost last
    handling: Vec<EvalFault>,
}

impl<'a> Interpreter<'a> {
    pub fn new(env: &'a mut Environment<Value>, output: &'a mut OutputBuffers, max_steps: u64) -> Self {
        Self {
            env,
            output,
            frames: Vec::new(),
            steps: 0,
            max_steps,
            handling: Vec::new(),
        }
    }

    /// Evaluate a top-level statement
    pub fn run(&mut self, stmt: &Stmt) -> Result<(), EvalFault> {
        match self.exec(stmt) {
            Ok(()) => Ok(()),
            Err(Signal::Raise(fault)) => Err(fault),
            Err(Signal::Return(_)) => Err(misplaced("'return' outside function", stmt.line)),
            Err(Signal::Break) => Err(misplaced("'break' outside loop", stmt.line)),
            Err(Signal::Continue) => Err(misplaced("'continue' not properly in loop", stmt.line)),
        }
    }

    fn tick(&mut self) -> Exec<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EvalFault::new(
                "StepLimitExceeded",
                format!("evaluation exceeded {} steps", self.max_steps),
            )
            .into());
        }
        Ok(())
    }

    /* ===================== Statements ===================== */

    fn exec_block(&mut self, body: &[Stmt]) -> Exec<()> {
        for stmt in body {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Exec<()> {
        self.exec_kind(&stmt.kind).map_err(|signal| match signal {
            Signal::Raise(fault) => Signal::Raise(fault.at_line(stmt.line)),
            other => other,
        })
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> Exec<()> {
        self.tick()?;
        match kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign { target, op, value } => {
                let rhs = self.eval(value)?;
                match target {
                    Target::Name(name) => {
                        let current = self.lookup(name)?;
                        self.set_name(name, ops::binary(*op, &current, &rhs)?);
                    }
                    Target::Index(object, index) => {
                        let object = self.eval(object)?;
                        let index = self.eval(index)?;
                        let current = ops::index(&object, &index)?;
                        ops::set_index(&object, &index, ops::binary(*op, &current, &rhs)?)?;
                    }
                    Target::Attr(object, attr) => {
                        let object = self.eval(object)?;
                        let current = self.get_attr(&object, attr)?;
                        set_attr(&object, attr, ops::binary(*op, &current, &rhs)?)?;
                    }
                }
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(orelse)?;
            }
            StmtKind::While { test, body } => {
                while self.eval(test)?.is_truthy() {
                    self.tick()?;
                    match self.exec_block(body) {
                        Ok(()) | Err(Signal::Continue) => {}
                        Err(Signal::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
            }
            StmtKind::For { var, iter, body } => {
                let items = ops::iterate(&self.eval(iter)?)?;
                for item in items {
                    self.tick()?;
                    self.set_name(var, item);
                    match self.exec_block(body) {
                        Ok(()) | Err(Signal::Continue) => {}
                        Err(Signal::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
            }
            StmtKind::Def { name, params, body } => {
                let function = Function {
                    name: name.clone(),
                    params: params.clone(),
                    body: Arc::clone(body),
                };
                self.set_name(name, Value::Function(Arc::new(function)));
            }
            StmtKind::Class { name, bases, body } => {
                let mut base_classes = Vec::new();
                for base in bases {
                    match self.eval(base)? {
                        Value::Class(class) => base_classes.push(class),
                        other => {
                            return Err(ops::type_error(format!(
                                "cannot inherit from '{}' object",
                                other.type_name()
                            ))
                            .into())
                        }
                    }
                }

                self.frames.push(Frame::default());
                let result = self.exec_block(body);
                let namespace = self.frames.pop().unwrap_or_default();
                result?;

                let class = Class::new(name.clone(), base_classes, namespace.vars);
                self.set_name(name, Value::Class(Arc::new(class)));
            }
            StmtKind::Try {
                body,
                handlers,
                finally,
            } => {
                let outcome = match self.exec_block(body) {
                    Err(Signal::Raise(fault)) => self.handle(fault, handlers),
                    other => other,
                };
                // A signal raised by `finally` replaces the pending one
                self.exec_block(finally)?;
                outcome?;
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Err(Signal::Return(value));
            }
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref())?.into()),
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.globals.extend(names.iter().cloned());
                }
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Err(Signal::Break),
            StmtKind::Continue => return Err(Signal::Continue),
        }
        Ok(())
    }

    /// Run the first handler matching `fault`, or keep propagating it
    fn handle(&mut self, fault: EvalFault, handlers: &[Handler]) -> Exec<()> {
        // Runaway evaluation must reach the session no matter what
        if fault.kind == "StepLimitExceeded" {
            return Err(fault.into());
        }
        let Some(handler) = handlers.iter().find(|h| match &h.class {
            None => true,
            Some(class) => class == "Exception" || *class == fault.kind,
        }) else {
            return Err(fault.into());
        };

        if let Some(binding) = &handler.binding {
            let error = ErrorValue {
                kind: fault.kind.clone(),
                message: fault.message.clone(),
            };
            self.set_name(binding, Value::Error(Arc::new(error)));
        }
        self.handling.push(fault);
        let result = self.exec_block(&handler.body);
        self.handling.pop();
        result
    }

    /// Fault described by a `raise` statement
    fn raise(&mut self, value: Option<&Expr>) -> Exec<EvalFault> {
        let Some(expr) = value else {
            return Ok(self
                .handling
                .last()
                .cloned()
                .unwrap_or_else(|| EvalFault::new("RuntimeError", "No active exception to reraise")));
        };
        let fault = match self.eval(expr)? {
            Value::Error(err) => EvalFault::new(err.kind.clone(), err.message.clone()),
            Value::Builtin(Builtin::ErrorType(kind)) => EvalFault::new(kind, ""),
            Value::Class(class) => EvalFault::new(class.name.clone(), ""),
            Value::Instance(inst) => {
                let message = inst.attrs().get("message").map(Value::to_string).unwrap_or_default();
                EvalFault::new(inst.class.name.clone(), message)
            }
            Value::Str(message) => EvalFault::new("Exception", message),
            other => ops::type_error(format!(
                "exceptions must derive from Exception, not '{}'",
                other.type_name()
            )),
        };
        Ok(fault)
    }

    /* ===================== Names ===================== */

    fn lookup(&self, name: &str) -> Exec<Value> {
        if let Some(frame) = self.frames.last() {
            if !frame.globals.iter().any(|g| g == name) {
                if let Some(value) = frame.vars.get(name) {
                    return Ok(value.clone());
                }
            }
        }
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        Builtin::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| EvalFault::new("NameError", format!("name '{}' is not defined", name)).into())
    }

    fn set_name(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.globals.iter().any(|g| g == name) => {
                frame.vars.insert(name.to_string(), value);
            }
            _ => {
                self.env.locals.insert(name.to_string(), value);
            }
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> Exec<()> {
        match target {
            Target::Name(name) => self.set_name(name, value),
            Target::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                ops::set_index(&object, &index, value)?;
            }
            Target::Attr(object, attr) => {
                let object = self.eval(object)?;
                set_attr(&object, attr, value)?;
            }
        }
        Ok(())
    }

    /* ===================== Expressions ===================== */

    fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        let value = match expr {
            Expr::None => Value::None,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(n) => Value::Int(*n),
            Expr::Float(f) => Value::Float(*f),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::List(items) => {
                let items = items.iter().map(|e| self.eval(e)).collect::<Exec<Vec<_>>>()?;
                Value::list(items)
            }
            Expr::Name(name) => self.lookup(name)?,
            Expr::Attr(object, attr) => {
                let object = self.eval(object)?;
                self.get_attr(&object, attr)?
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                ops::index(&object, &index)?
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let args = args.iter().map(|e| self.eval(e)).collect::<Exec<Vec<_>>>()?;
                self.call(callee, args)?
            }
            Expr::Unary(UnaryOp::Neg, operand) => ops::negate(&self.eval(operand)?)?,
            Expr::Unary(UnaryOp::Not, operand) => Value::Bool(!self.eval(operand)?.is_truthy()),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                ops::binary(*op, &lhs, &rhs)?
            }
            Expr::Compare(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Value::Bool(ops::compare(*op, &lhs, &rhs)?)
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.is_truthy() {
                    self.eval(rhs)?
                } else {
                    lhs
                }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.is_truthy() {
                    lhs
                } else {
                    self.eval(rhs)?
                }
            }
        };
        Ok(value)
    }

    fn get_attr(&self, object: &Value, attr: &str) -> Exec<Value> {
        let found = match object {
            Value::Instance(inst) => {
                let own = inst.attrs().get(attr).cloned();
                own.or_else(|| {
                    inst.class.lookup(attr).map(|value| match value {
                        Value::Function(function) => Value::Method(BoundMethod {
                            receiver: Arc::clone(inst),
                            function,
                        }),
                        other => other,
                    })
                })
            }
            Value::Class(class) => class.lookup(attr),
            Value::List(items) => match attr {
                "append" => Some(Value::ListMethod(Arc::clone(items), ListOp::Append)),
                "pop" => Some(Value::ListMethod(Arc::clone(items), ListOp::Pop)),
                _ => None,
            },
            Value::Error(err) if attr == "message" => Some(Value::Str(err.message.clone())),
            _ => None,
        };
        found.ok_or_else(|| {
            let message = match object {
                Value::Class(class) => {
                    format!("type object '{}' has no attribute '{}'", class.name, attr)
                }
                other => format!("'{}' object has no attribute '{}'", other.type_name(), attr),
            };
            EvalFault::new("AttributeError", message).into()
        })
    }

    /* ===================== Calls ===================== */

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Exec<Value> {
        match callee {
            Value::Builtin(builtin) => Ok(builtin.call(args, self.output, self.max_steps)?),
            Value::Function(function) => self.call_function(&function, args),
            Value::Method(method) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(Value::Instance(method.receiver));
                full.extend(args);
                self.call_function(&method.function, full)
            }
            Value::Class(class) => {
                let instance = Value::Instance(Arc::new(Instance::new(Arc::clone(&class))));
                match class.lookup("__init__") {
                    Some(Value::Function(init)) => {
                        let mut full = Vec::with_capacity(args.len() + 1);
                        full.push(instance.clone());
                        full.extend(args);
                        self.call_function(&init, full)?;
                    }
                    _ if !args.is_empty() => {
                        return Err(
                            ops::type_error(format!("{}() takes no arguments", class.name)).into()
                        )
                    }
                    _ => {}
                }
                Ok(instance)
            }
            Value::ListMethod(items, ListOp::Append) => {
                let [item]: [Value; 1] = args.try_into().map_err(|_| {
                    ops::type_error("append() takes exactly one argument")
                })?;
                lock(&items).push(item);
                Ok(Value::None)
            }
            Value::ListMethod(items, ListOp::Pop) => {
                let mut items = lock(&items);
                if items.is_empty() {
                    return Err(EvalFault::new("IndexError", "pop from empty list").into());
                }
                let index = match args.as_slice() {
                    [] => items.len() - 1,
                    [index] => ops::resolve_index(index, items.len(), "pop")?,
                    _ => return Err(ops::type_error("pop() takes at most 1 argument").into()),
                };
                Ok(items.remove(index))
            }
            other => Err(ops::type_error(format!("'{}' object is not callable", other.type_name())).into()),
        }
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>) -> Exec<Value> {
        self.tick()?;
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(EvalFault::new("RecursionError", "maximum recursion depth exceeded").into());
        }
        if args.len() != function.params.len() {
            return Err(ops::type_error(format!(
                "{}() takes {} positional argument{} but {} were given",
                function.name,
                function.params.len(),
                if function.params.len() == 1 { "" } else { "s" },
                args.len()
            ))
            .into());
        }

        let frame = Frame {
            vars: function.params.iter().cloned().zip(args).collect(),
            globals: Vec::new(),
        };
        self.frames.push(frame);
        let result = self.exec_block(&function.body);
        self.frames.pop();

        match result {
            Ok(()) => Ok(Value::None),
            Err(Signal::Return(value)) => Ok(value),
            Err(Signal::Raise(fault)) => Err(Signal::Raise(fault)),
            Err(Signal::Break | Signal::Continue) => {
                Err(EvalFault::new("SyntaxError", "'break' outside loop").into())
            }
        }
    }
}

fn set_attr(object: &Value, attr: &str, value: Value) -> Exec<()> {
    match object {
        Value::Instance(inst) => {
            inst.attrs().insert(attr.to_string(), value);
            Ok(())
        }
        other => Err(EvalFault::new(
            "AttributeError",
            format!("cannot set attribute '{}' on '{}' object", attr, other.type_name()),
        )
        .into()),
    }
}

fn misplaced(message: &str, line: usize) -> EvalFault {
    EvalFault::new("SyntaxError", message).at_line(line)
}
