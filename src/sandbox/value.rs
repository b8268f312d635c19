//! Value semantics for action scripts
//!
//! Scripts operate on `serde_json::Value`, the same type tools exchange, so
//! tool results flow into scripts without conversion. Operators follow
//! Python's behavior for the types that exist here.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::core::{NetpilotError, Result};
use crate::sandbox::parser::BinOp;

/// Largest string (bytes) or list (items) a repetition may produce
pub const MAX_REPEAT_LEN: usize = 1 << 24;

fn type_error(msg: impl Into<String>) -> NetpilotError {
    NetpilotError::tool(format!("TypeError: {}", msg.into()))
}

/// Python-style type name
pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Python truthiness
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// `str(v)`
pub fn to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => repr(other),
    }
}

/// `repr(v)`, Python flavored
pub fn repr(v: &Value) -> String {
    match v {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e16 => format!("{:.1}", f),
            _ => n.to_string(),
        },
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(repr).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("'{}': {}", k, repr(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn is_int(v: &Value) -> bool {
    matches!(v, Value::Number(n) if !n.is_f64()) || v.is_boolean()
}

fn float_value(f: f64) -> Result<Value> {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| NetpilotError::tool("ValueError: result is not a finite number"))
}

/// Evaluate a binary operator
pub fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    match op {
        BinOp::Eq => Ok(Value::Bool(equals(l, r))),
        BinOp::Ne => Ok(Value::Bool(!equals(l, r))),
        BinOp::Lt => Ok(Value::Bool(compare(l, r)? == Ordering::Less)),
        BinOp::Le => Ok(Value::Bool(compare(l, r)? != Ordering::Greater)),
        BinOp::Gt => Ok(Value::Bool(compare(l, r)? == Ordering::Greater)),
        BinOp::Ge => Ok(Value::Bool(compare(l, r)? != Ordering::Less)),
        BinOp::In => Ok(Value::Bool(contains(r, l)?)),
        BinOp::NotIn => Ok(Value::Bool(!contains(r, l)?)),
        BinOp::Add => add(l, r),
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => {
            arithmetic(op, l, r)
        }
    }
}

fn add(l: &Value, r: &Value) -> Result<Value> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Array(out))
        }
        _ => arithmetic(BinOp::Add, l, r),
    }
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    // sequence repetition
    if op == BinOp::Mul {
        match (l, r) {
            (Value::String(s), n) | (n, Value::String(s)) if is_int(n) => {
                let times = repeat_count(s.len(), n)?;
                return Ok(Value::String(s.repeat(times)));
            }
            (Value::Array(a), n) | (n, Value::Array(a)) if is_int(n) => {
                let times = repeat_count(a.len(), n)?;
                return Ok(Value::Array(a.iter().cloned().cycle().take(a.len() * times).collect()));
            }
            _ => {}
        }
    }

    if is_int(l) && is_int(r) && op != BinOp::Div {
        let (a, b) = (as_int(l).unwrap_or(0), as_int(r).unwrap_or(0));
        let overflow = || NetpilotError::tool("OverflowError: integer overflow");
        let zero = || NetpilotError::tool("ZeroDivisionError: division by zero");
        let v = match op {
            BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
            BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
            BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
            BinOp::FloorDiv => {
                if b == 0 {
                    return Err(zero());
                }
                let q = a.checked_div(b).ok_or_else(overflow)?;
                if a % b != 0 && (a < 0) != (b < 0) {
                    q - 1
                } else {
                    q
                }
            }
            BinOp::Mod => {
                if b == 0 {
                    return Err(zero());
                }
                // only i64::MIN % -1 overflows, and its remainder is 0
                let r = a.checked_rem(b).unwrap_or(0);
                if r != 0 && (r < 0) != (b < 0) {
                    r + b
                } else {
                    r
                }
            }
            _ => unreachable!("non-arithmetic operator"),
        };
        return Ok(Value::from(v));
    }

    match (as_float(l), as_float(r)) {
        (Some(a), Some(b)) => {
            if matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) && b == 0.0 {
                return Err(NetpilotError::tool("ZeroDivisionError: division by zero"));
            }
            let v = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::FloorDiv => (a / b).floor(),
                BinOp::Mod => a - b * (a / b).floor(),
                _ => unreachable!("non-arithmetic operator"),
            };
            float_value(v)
        }
        _ => Err(type_error(format!(
            "unsupported operand types for {:?}: '{}' and '{}'",
            op,
            type_name(l),
            type_name(r)
        ))),
    }
}

/// Repetition count for `seq * n`, refusing results over [`MAX_REPEAT_LEN`]
fn repeat_count(len: usize, n: &Value) -> Result<usize> {
    let times = usize::try_from(as_int(n).unwrap_or(0).max(0))
        .map_err(|_| NetpilotError::tool("OverflowError: repeat count too large"))?;
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(NetpilotError::tool(format!(
            "MemoryError: repetition would exceed {} elements",
            MAX_REPEAT_LEN
        ))),
    }
}

/// Python `==`, with int/float cross-comparison
pub fn equals(l: &Value, r: &Value) -> bool {
    match (as_float(l), as_float(r)) {
        (Some(a), Some(b)) if !l.is_boolean() || !r.is_boolean() => a == b,
        _ => l == r,
    }
}

/// Ordering for `<`, `sorted`, `min`, `max`
pub fn compare(l: &Value, r: &Value) -> Result<Ordering> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match compare(x, y)? {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => match (as_float(l), as_float(r)) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| type_error("cannot compare NaN")),
            _ => Err(type_error(format!(
                "'<' not supported between '{}' and '{}'",
                type_name(l),
                type_name(r)
            ))),
        },
    }
}

/// `needle in haystack`
pub fn contains(haystack: &Value, needle: &Value) -> Result<bool> {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => Ok(s.contains(n.as_str())),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                type_name(other)
            ))),
        },
        Value::Array(items) => Ok(items.iter().any(|i| equals(i, needle))),
        Value::Object(map) => Ok(needle.as_str().is_some_and(|k| map.contains_key(k))),
        other => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            type_name(other)
        ))),
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let idx = if i < 0 { len as i64 + i } else { i };
    if idx >= 0 && (idx as usize) < len {
        Some(idx as usize)
    } else {
        None
    }
}

/// `value[index]`
pub fn index(value: &Value, idx: &Value) -> Result<Value> {
    match value {
        Value::Array(items) => {
            let i = as_int(idx).ok_or_else(|| type_error("list indices must be integers"))?;
            normalize_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| NetpilotError::tool("IndexError: list index out of range"))
        }
        Value::String(s) => {
            let i = as_int(idx).ok_or_else(|| type_error("string indices must be integers"))?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .map(|i| Value::String(chars[i].to_string()))
                .ok_or_else(|| NetpilotError::tool("IndexError: string index out of range"))
        }
        Value::Object(map) => {
            let key = to_display(idx);
            map.get(&key)
                .cloned()
                .ok_or_else(|| NetpilotError::tool(format!("KeyError: {}", repr(idx))))
        }
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

fn slice_bounds(start: Option<i64>, end: Option<i64>, len: usize) -> (usize, usize) {
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { len as i64 + i } else { i };
        i.clamp(0, len as i64) as usize
    };
    let s = start.map(clamp).unwrap_or(0);
    let e = end.map(clamp).unwrap_or(len);
    (s, e.max(s))
}

/// `value[start:end]`
pub fn slice(value: &Value, start: Option<&Value>, end: Option<&Value>) -> Result<Value> {
    let bound = |v: Option<&Value>| -> Result<Option<i64>> {
        match v {
            None | Some(Value::Null) => Ok(None),
            Some(v) => as_int(v)
                .map(Some)
                .ok_or_else(|| type_error("slice indices must be integers")),
        }
    };
    let (start, end) = (bound(start)?, bound(end)?);
    match value {
        Value::Array(items) => {
            let (s, e) = slice_bounds(start, end, items.len());
            Ok(Value::Array(items[s..e].to_vec()))
        }
        Value::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (s, e) = slice_bounds(start, end, chars.len());
            Ok(Value::String(chars[s..e].iter().collect()))
        }
        other => Err(type_error(format!(
            "'{}' object is not sliceable",
            type_name(other)
        ))),
    }
}

/// Items produced by `for x in value`
pub fn iterate(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(map) => Ok(map.keys().map(|k| Value::String(k.clone())).collect()),
        other => Err(type_error(format!(
            "'{}' object is not iterable",
            type_name(other)
        ))),
    }
}

/// Store `value` at `container[idx]`
pub fn set_index(container: &mut Value, idx: &Value, value: Value) -> Result<()> {
    match container {
        Value::Array(items) => {
            let i = as_int(idx).ok_or_else(|| type_error("list indices must be integers"))?;
            let len = items.len();
            let slot = normalize_index(i, len)
                .ok_or_else(|| NetpilotError::tool("IndexError: list assignment index out of range"))?;
            items[slot] = value;
            Ok(())
        }
        Value::Object(map) => {
            map.insert(to_display(idx), value);
            Ok(())
        }
        other => Err(type_error(format!(
            "'{}' object does not support item assignment",
            type_name(other)
        ))),
    }
}

/// Build a dict from evaluated key/value pairs
pub fn dict(entries: Vec<(Value, Value)>) -> Value {
    let mut map = Map::new();
    for (k, v) in entries {
        map.insert(to_display(&k), v);
    }
    Value::Object(map)
}
