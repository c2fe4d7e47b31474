//! Runtime values of the script language

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::ast::Stmt;
use super::builtins::Builtin;

pub type ListRef = Arc<Mutex<Vec<Value>>>;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(ListRef),
    Function(Arc<Function>),
    Builtin(Builtin),
    Class(Arc<Class>),
    Instance(Arc<Instance>),
    /// Function bound to the instance it was looked up on
    Method(BoundMethod),
    /// `append`/`pop` looked up on a list
    ListMethod(ListRef, ListOp),
    Error(Arc<ErrorValue>),
}

/// Receiver and function of a bound method
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Arc<Instance>,
    pub function: Arc<Function>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    Append,
    Pop,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Arc<Vec<Stmt>>,
}

#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub bases: Vec<Arc<Class>>,
    /// Fixed after the class body runs; behind a lock so copies can be filled in
    attrs: Mutex<BTreeMap<String, Value>>,
}

impl Class {
    pub fn new(name: impl Into<String>, bases: Vec<Arc<Class>>, attrs: BTreeMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            bases,
            attrs: Mutex::new(attrs),
        }
    }

    /// Attribute defined on this class or, depth first, on a base
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let own = lock(&self.attrs).get(name).cloned();
        own.or_else(|| self.bases.iter().find_map(|base| base.lookup(name)))
    }
}

#[derive(Debug)]
pub struct Instance {
    pub class: Arc<Class>,
    pub attrs: Mutex<BTreeMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Arc<Class>) -> Self {
        Self {
            class,
            attrs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn attrs(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        lock(&self.attrs)
    }
}

/// A raised error held as a value, e.g. bound by `except E as e`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub kind: String,
    pub message: String,
}

pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Method(_) => "method".to_string(),
            Value::Builtin(_) | Value::ListMethod(..) => "builtin_function_or_method".to_string(),
            Value::Class(_) => "type".to_string(),
            Value::Instance(inst) => inst.class.name.clone(),
            Value::Error(err) => err.kind.clone(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !lock(items).is_empty(),
            _ => true,
        }
    }

    /// Quoted form used inside containers
    pub fn repr(&self) -> String {
        self.repr_nested(0)
    }

    fn repr_nested(&self, depth: usize) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::Error(err) => format!("{}('{}')", err.kind, err.message),
            Value::List(items) => render_list(items, depth),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let a = lock(a).clone();
                let b = lock(b).clone();
                a == b
            }
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => {
                Arc::ptr_eq(&a.receiver, &b.receiver) && Arc::ptr_eq(&a.function, &b.function)
            }
            (Value::ListMethod(a, x), Value::ListMethod(b, y)) => Arc::ptr_eq(a, b) && x == y,
            (Value::Error(a), Value::Error(b)) => a == b,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

/// Numeric view used by arithmetic and comparisons
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            _ => self.to_f64() == other.to_f64(),
        }
    }
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }
}

impl Value {
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

/// Lists can contain themselves; past this depth they render as `[...]`
const MAX_RENDER_DEPTH: usize = 16;

fn render_list(items: &ListRef, depth: usize) -> String {
    if depth >= MAX_RENDER_DEPTH {
        return "[...]".to_string();
    }
    // Copy out so a nested reference to the same list does not lock it twice
    let items = lock(items).clone();
    let rendered: Vec<String> = items.iter().map(|v| v.repr_nested(depth + 1)).collect();
    format!("[{}]", rendered.join(", "))
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f == f.trunc() && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => write!(f, "{}", render_list(items, 0)),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Method(m) => write!(f, "<bound method {}.{}>", m.receiver.class.name, m.function.name),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Value::ListMethod(_, ListOp::Append) => write!(f, "<built-in method append>"),
            Value::ListMethod(_, ListOp::Pop) => write!(f, "<built-in method pop>"),
            Value::Class(class) => write!(f, "<class '{}'>", class.name),
            Value::Instance(inst) => write!(f, "<{} object>", inst.class.name),
            Value::Error(err) => write!(f, "{}", err.message),
        }
    }
}

/* ===================== Detaching ===================== */

/// Deep copies values out of a session
///
/// Lists, instances and classes are copied once each, so aliasing and
/// cycles between the originals carry over to the copies.
#[derive(Default)]
pub struct Detacher {
    lists: HashMap<usize, ListRef>,
    instances: HashMap<usize, Arc<Instance>>,
    classes: HashMap<usize, Arc<Class>>,
}

impl Detacher {
    pub fn detach(&mut self, value: &Value) -> Value {
        match value {
            Value::List(items) => Value::List(self.list(items)),
            Value::ListMethod(items, op) => Value::ListMethod(self.list(items), *op),
            Value::Instance(inst) => Value::Instance(self.instance(inst)),
            Value::Method(method) => Value::Method(BoundMethod {
                receiver: self.instance(&method.receiver),
                function: Arc::clone(&method.function),
            }),
            Value::Class(class) => Value::Class(self.class(class)),
            other => other.clone(),
        }
    }

    fn list(&mut self, items: &ListRef) -> ListRef {
        let key = Arc::as_ptr(items) as usize;
        if let Some(copy) = self.lists.get(&key) {
            return Arc::clone(copy);
        }
        let copy: ListRef = Arc::new(Mutex::new(Vec::new()));
        self.lists.insert(key, Arc::clone(&copy));

        let source = lock(items).clone();
        let detached: Vec<Value> = source.iter().map(|v| self.detach(v)).collect();
        *lock(&copy) = detached;
        copy
    }

    fn instance(&mut self, inst: &Arc<Instance>) -> Arc<Instance> {
        let key = Arc::as_ptr(inst) as usize;
        if let Some(copy) = self.instances.get(&key) {
            return Arc::clone(copy);
        }
        let copy = Arc::new(Instance::new(self.class(&inst.class)));
        self.instances.insert(key, Arc::clone(&copy));

        let source = inst.attrs().clone();
        let detached: BTreeMap<String, Value> = source
            .iter()
            .map(|(name, v)| (name.clone(), self.detach(v)))
            .collect();
        *copy.attrs() = detached;
        copy
    }

    /// Class attributes may hold lists, which may in turn hold instances of the class
    fn class(&mut self, class: &Arc<Class>) -> Arc<Class> {
        let key = Arc::as_ptr(class) as usize;
        if let Some(copy) = self.classes.get(&key) {
            return Arc::clone(copy);
        }
        let bases = class.bases.iter().map(|base| self.class(base)).collect();
        let copy = Arc::new(Class::new(class.name.clone(), bases, BTreeMap::new()));
        self.classes.insert(key, Arc::clone(&copy));

        let source = lock(&class.attrs).clone();
        let detached: BTreeMap<String, Value> = source
            .iter()
            .map(|(name, v)| (name.clone(), self.detach(v)))
            .collect();
        *lock(&copy.attrs) = detached;
        copy
    }
}
