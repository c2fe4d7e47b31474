//! Builtin functions and error types

use std::cmp::Ordering;
use std::sync::Arc;

use super::ast::BinOp;
use super::ops::{self, type_error};
use super::value::{lock, ErrorValue, Number, Value};
use crate::frontend::{EvalFault, OutputBuffers};

/// Error types callable as constructors and matchable by `except`
pub const ERROR_TYPES: &[&str] = &[
    "Exception",
    "ValueError",
    "TypeError",
    "NameError",
    "IndexError",
    "AttributeError",
    "ZeroDivisionError",
    "OverflowError",
    "RuntimeError",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Range,
    Str,
    Int,
    Float,
    Abs,
    Min,
    Max,
    Sum,
    ErrorType(&'static str),
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        let builtin = match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "range" => Builtin::Range,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "sum" => Builtin::Sum,
            _ => return ERROR_TYPES.iter().copied().find(|t| *t == name).map(Builtin::ErrorType),
        };
        Some(builtin)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::ErrorType(name) => name,
        }
    }

    /// Call the builtin; `max_items` bounds the size of `range` results
    pub fn call(self, args: Vec<Value>, output: &mut OutputBuffers, max_items: u64) -> Result<Value, EvalFault> {
        match self {
            Builtin::Print => {
                let line: Vec<String> = args.iter().map(Value::to_string).collect();
                output.write_out(&line.join(" "));
                output.write_out("\n");
                Ok(Value::None)
            }
            Builtin::Len => {
                let [value] = exactly(self, args)?;
                let len = match &value {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => lock(items).len(),
                    other => {
                        return Err(type_error(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                i64::try_from(len)
                    .map(Value::Int)
                    .map_err(|_| EvalFault::new("OverflowError", "length too large"))
            }
            Builtin::Range => range(args, max_items),
            Builtin::Str => match args.len() {
                0 => Ok(Value::str("")),
                _ => {
                    let [value] = exactly(self, args)?;
                    Ok(Value::Str(value.to_string()))
                }
            },
            Builtin::Int => {
                let [value] = exactly(self, args)?;
                to_int(&value)
            }
            Builtin::Float => {
                let [value] = exactly(self, args)?;
                to_float(&value)
            }
            Builtin::Abs => {
                let [value] = exactly(self, args)?;
                match value.as_number() {
                    Some(Number::Int(n)) => n
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| EvalFault::new("OverflowError", "integer overflow")),
                    Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
                    None => Err(type_error(format!(
                        "bad operand type for abs(): '{}'",
                        value.type_name()
                    ))),
                }
            }
            Builtin::Min => extreme(self, args, Ordering::Less),
            Builtin::Max => extreme(self, args, Ordering::Greater),
            Builtin::Sum => {
                let mut args = args.into_iter();
                let (Some(items), None) = (args.next(), args.next()) else {
                    return Err(type_error("sum() takes exactly one argument"));
                };
                ops::iterate(&items)?
                    .iter()
                    .try_fold(Value::Int(0), |acc, item| ops::binary(BinOp::Add, &acc, item))
            }
            Builtin::ErrorType(kind) => {
                let message = args.first().map(Value::to_string).unwrap_or_default();
                Ok(Value::Error(Arc::new(ErrorValue {
                    kind: kind.to_string(),
                    message,
                })))
            }
        }
    }
}

fn exactly<const N: usize>(builtin: Builtin, args: Vec<Value>) -> Result<[Value; N], EvalFault> {
    let given = args.len();
    args.try_into().map_err(|_| {
        type_error(format!(
            "{}() takes exactly {} argument{} ({} given)",
            builtin.name(),
            N,
            if N == 1 { "" } else { "s" },
            given
        ))
    })
}

fn int_arg(value: &Value) -> Result<i64, EvalFault> {
    match value.as_number() {
        Some(Number::Int(n)) => Ok(n),
        _ => Err(type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))),
    }
}

fn range(args: Vec<Value>, max_items: u64) -> Result<Value, EvalFault> {
    let ints = args.iter().map(int_arg).collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(type_error(format!("range expected 1 to 3 arguments, got {}", ints.len()))),
    };
    if step == 0 {
        return Err(EvalFault::new("ValueError", "range() arg 3 must not be zero"));
    }

    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let step_abs = i128::from(step).abs();
    let len = if span <= 0 { 0 } else { (span + step_abs - 1) / step_abs };
    if len > i128::from(max_items) {
        return Err(EvalFault::new(
            "StepLimitExceeded",
            format!("range of {} items exceeds the evaluation budget", len),
        ));
    }

    let mut items = Vec::new();
    let mut current = i128::from(start);
    for _ in 0..len {
        items.push(Value::Int(current as i64));
        current += i128::from(step);
    }
    Ok(Value::list(items))
}

fn to_int(value: &Value) -> Result<Value, EvalFault> {
    match value {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) if f.is_finite() && f.abs() < 9.2e18 => Ok(Value::Int(f.trunc() as i64)),
        Value::Float(_) => Err(EvalFault::new("OverflowError", "cannot convert float to integer")),
        Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
            EvalFault::new(
                "ValueError",
                format!("invalid literal for int() with base 10: {}", value.repr()),
            )
        }),
        other => Err(type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Value) -> Result<Value, EvalFault> {
    if let Some(n) = value.as_number() {
        return Ok(Value::Float(n.to_f64()));
    }
    match value {
        Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
            EvalFault::new(
                "ValueError",
                format!("could not convert string to float: {}", value.repr()),
            )
        }),
        other => Err(type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

/// `min`/`max` over one iterable argument or over the arguments themselves
fn extreme(builtin: Builtin, args: Vec<Value>, wanted: Ordering) -> Result<Value, EvalFault> {
    let items = match args.len() {
        0 => {
            return Err(type_error(format!(
                "{} expected at least 1 argument, got 0",
                builtin.name()
            )))
        }
        1 => ops::iterate(&args[0])?,
        _ => args,
    };

    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return Err(EvalFault::new(
            "ValueError",
            format!("{}() arg is an empty sequence", builtin.name()),
        ));
    };
    let symbol = if wanted == Ordering::Less { "<" } else { ">" };
    for item in items {
        if ops::order(&item, &best, symbol)? == Some(wanted) {
            best = item;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, EvalFault> {
        let mut output = OutputBuffers::default();
        Builtin::lookup(name).unwrap().call(args, &mut output, 1_000)
    }

    #[test]
    fn test_print_joins_arguments() {
        let mut output = OutputBuffers::default();
        Builtin::Print
            .call(vec![Value::Int(1), Value::str("a")], &mut output, 10)
            .unwrap();
        assert_eq!(output.stdout, "1 a\n");
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(call("range", vec![Value::Int(3)]).unwrap().to_string(), "[0, 1, 2]");
        assert_eq!(
            call("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)])
                .unwrap()
                .to_string(),
            "[5, 3, 1]"
        );
        assert_eq!(call("range", vec![Value::Int(0), Value::Int(0)]).unwrap().to_string(), "[]");
        assert_eq!(
            call("range", vec![Value::Int(1), Value::Int(2), Value::Int(0)]).unwrap_err().kind,
            "ValueError"
        );
    }

    #[test]
    fn test_range_is_bounded_by_budget() {
        let err = call("range", vec![Value::Int(1_000_000)]).unwrap_err();
        assert_eq!(err.kind, "StepLimitExceeded");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![Value::str(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(call("int", vec![Value::str("x")]).unwrap_err().kind, "ValueError");
        assert_eq!(call("float", vec![Value::str("2.5")]).unwrap(), Value::Float(2.5));
        assert_eq!(call("str", vec![Value::Bool(false)]).unwrap(), Value::str("False"));
    }

    #[test]
    fn test_aggregates() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call("min", vec![list.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call("max", vec![Value::Int(4), Value::Int(9)]).unwrap(), Value::Int(9));
        assert_eq!(call("sum", vec![list.clone()]).unwrap(), Value::Int(6));
        assert_eq!(call("len", vec![list]).unwrap(), Value::Int(3));
        assert_eq!(
            call("max", vec![Value::list(Vec::new())]).unwrap_err().kind,
            "ValueError"
        );
    }

    #[test]
    fn test_error_types_build_error_values() {
        let err = call("ValueError", vec![Value::str("bad")]).unwrap();
        assert_eq!(err.to_string(), "bad");
        assert_eq!(err.type_name(), "ValueError");
    }
}
