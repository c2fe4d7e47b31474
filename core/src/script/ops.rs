//! Operators shared by the interpreter and the builtins

use std::cmp::Ordering;
use std::sync::Arc;

use super::ast::{BinOp, CmpOp};
use super::value::{lock, Number, Value};
use crate::frontend::EvalFault;

/// Longest sequence `*` may build
const MAX_REPEAT_LEN: usize = 1 << 24;

pub fn type_error(message: impl Into<String>) -> EvalFault {
    EvalFault::new("TypeError", message)
}

fn overflow() -> EvalFault {
    EvalFault::new("OverflowError", "integer overflow")
}

fn zero_division(message: &str) -> EvalFault {
    EvalFault::new("ZeroDivisionError", message)
}

fn unsupported(op: BinOp, lhs: &Value, rhs: &Value) -> EvalFault {
    type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

/* ===================== Arithmetic ===================== */

pub fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalFault> {
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        return numeric(op, a, b);
    }

    match (op, lhs, rhs) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = lock(a).clone();
            items.extend(lock(b).iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_number().is_some() => {
            let count = repeat_count(n, s.len())?;
            Ok(Value::Str(s.repeat(count)))
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_number().is_some() =>
        {
            let items = lock(items).clone();
            let count = repeat_count(n, items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => Err(unsupported(op, lhs, rhs)),
    }
}

fn repeat_count(n: &Value, len: usize) -> Result<usize, EvalFault> {
    let count = match n.as_number() {
        Some(Number::Int(n)) => usize::try_from(n.max(0)).map_err(|_| overflow())?,
        _ => return Err(type_error("can't multiply sequence by non-int")),
    };
    if len.saturating_mul(count) > MAX_REPEAT_LEN {
        return Err(EvalFault::new("OverflowError", "repeated sequence is too long"));
    }
    Ok(count)
}

fn numeric(op: BinOp, a: Number, b: Number) -> Result<Value, EvalFault> {
    if let (Number::Int(a), Number::Int(b)) = (a, b) {
        return int_arith(op, a, b);
    }
    let (a, b) = (a.to_f64(), b.to_f64());
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => a.powf(b),
    };
    Ok(Value::Float(value))
}

fn int_arith(op: BinOp, a: i64, b: i64) -> Result<Value, EvalFault> {
    let value = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            a.checked_div(b).map(|q| {
                if a % b != 0 && (a < 0) != (b < 0) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
        BinOp::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|b| a.checked_pow(b))
        }
    };
    value.map(Value::Int).ok_or_else(overflow)
}

pub fn negate(value: &Value) -> Result<Value, EvalFault> {
    match value.as_number() {
        Some(Number::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
        Some(Number::Float(f)) => Ok(Value::Float(-f)),
        None => Err(type_error(format!("bad operand type for unary -: '{}'", value.type_name()))),
    }
}

/* ===================== Comparison ===================== */

pub fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalFault> {
    let symbol = match op {
        CmpOp::Eq => return Ok(lhs == rhs),
        CmpOp::Ne => return Ok(lhs != rhs),
        CmpOp::In => return contains(rhs, lhs),
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
    };
    let Some(ordering) = order(lhs, rhs, symbol)? else {
        // NaN compares false both ways
        return Ok(false);
    };
    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

/// Ordering of two values, `None` when unordered (NaN)
pub fn order(lhs: &Value, rhs: &Value, symbol: &str) -> Result<Option<Ordering>, EvalFault> {
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        return Ok(match (a, b) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            _ => a.to_f64().partial_cmp(&b.to_f64()),
        });
    }
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            if Arc::ptr_eq(a, b) {
                return Ok(Some(Ordering::Equal));
            }
            // One lock at a time: an item may be the other list
            let a = lock(a).clone();
            let b = lock(b).clone();
            for (x, y) in a.iter().zip(b.iter()) {
                if x != y {
                    return order(x, y, symbol);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => Err(type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

pub fn contains(container: &Value, item: &Value) -> Result<bool, EvalFault> {
    match (container, item) {
        (Value::List(items), _) => {
            // Comparing may lock nested lists, including this one
            let items = lock(items).clone();
            Ok(items.iter().any(|v| v == item))
        }
        (Value::Str(s), Value::Str(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Str(_), _) => Err(type_error(format!(
            "'in <string>' requires string as left operand, not {}",
            item.type_name()
        ))),
        _ => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

/* ===================== Sequences ===================== */

/// Items produced by iterating `value`
pub fn iterate(value: &Value) -> Result<Vec<Value>, EvalFault> {
    match value {
        Value::List(items) => Ok(lock(items).clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(type_error(format!("'{}' object is not iterable", other.type_name()))),
    }
}

pub fn resolve_index(index: &Value, len: usize, what: &str) -> Result<usize, EvalFault> {
    let Some(Number::Int(i)) = index.as_number() else {
        return Err(type_error(format!(
            "{} indices must be integers, not {}",
            what,
            index.type_name()
        )));
    };
    let len = i64::try_from(len).map_err(|_| overflow())?;
    let resolved = if i < 0 { i + len } else { i };
    if resolved < 0 || resolved >= len {
        return Err(EvalFault::new("IndexError", format!("{} index out of range", what)));
    }
    usize::try_from(resolved).map_err(|_| overflow())
}

pub fn index(object: &Value, index: &Value) -> Result<Value, EvalFault> {
    match object {
        Value::List(items) => {
            let items = lock(items);
            let i = resolve_index(index, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(index, chars.len(), "string")?;
            Ok(Value::Str(chars[i].to_string()))
        }
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_index(object: &Value, index: &Value, value: Value) -> Result<(), EvalFault> {
    match object {
        Value::List(items) => {
            let mut items = lock(items);
            let i = resolve_index(index, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        other => Err(type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}
