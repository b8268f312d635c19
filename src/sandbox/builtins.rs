//! Built-in functions, methods and module functions for action scripts
//!
//! Everything here is pure apart from `time.time()`. Side-effecting calls
//! (`print`, `final_answer`, tool calls) are handled by the interpreter.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::{Regex, RegexBuilder};
use serde_json::{json, Map, Value};

use crate::core::{NetpilotError, Result};
use crate::sandbox::parser::BinOp;
use crate::sandbox::value::{self, repr, to_display, type_name};

/// Names resolvable as functions without an import
pub const BUILTINS: &[&str] = &[
    "abs",
    "all",
    "any",
    "bool",
    "dict",
    "enumerate",
    "final_answer",
    "float",
    "int",
    "len",
    "list",
    "max",
    "min",
    "print",
    "range",
    "repr",
    "round",
    "sorted",
    "str",
    "sum",
    "zip",
];

/// Methods that mutate their receiver in place
pub const MUTATING_METHODS: &[&str] = &[
    "append", "clear", "extend", "insert", "pop", "remove", "sort", "update",
];

const MATCH_KEY: &str = "__match__";

/// Keyword arguments as evaluated by the interpreter
pub type Kwargs = Vec<(String, Value)>;

fn kwarg<'k>(kwargs: &'k Kwargs, name: &str) -> Option<&'k Value> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

fn arg<'v>(args: &'v [Value], kwargs: &'v Kwargs, pos: usize, name: &str) -> Option<&'v Value> {
    args.get(pos).or_else(|| kwarg(kwargs, name))
}

fn type_error(msg: impl Into<String>) -> NetpilotError {
    NetpilotError::tool(format!("TypeError: {}", msg.into()))
}

fn value_error(msg: impl Into<String>) -> NetpilotError {
    NetpilotError::tool(format!("ValueError: {}", msg.into()))
}

fn expect_str<'v>(v: Option<&'v Value>, what: &str) -> Result<&'v str> {
    match v {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(type_error(format!(
            "{} must be str, not {}",
            what,
            type_name(other)
        ))),
        None => Err(type_error(format!("missing required argument {}", what))),
    }
}

fn expect_int(v: Option<&Value>, what: &str) -> Result<i64> {
    match v {
        Some(Value::Number(n)) if n.is_i64() => n.as_i64().ok_or_else(|| type_error(what.to_string())),
        Some(Value::Bool(b)) => Ok(*b as i64),
        Some(other) => Err(type_error(format!(
            "{} must be int, not {}",
            what,
            type_name(other)
        ))),
        None => Err(type_error(format!("missing required argument {}", what))),
    }
}

fn expect_float(v: Option<&Value>, what: &str) -> Result<f64> {
    match v {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| type_error(what.to_string())),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(other) => Err(type_error(format!(
            "{} must be a number, not {}",
            what,
            type_name(other)
        ))),
        None => Err(type_error(format!("missing required argument {}", what))),
    }
}

fn float(f: f64) -> Result<Value> {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| value_error("math domain error"))
}

fn sort_values(items: &mut [Value]) -> Result<()> {
    let mut failure = None;
    items.sort_by(|a, b| match value::compare(a, b) {
        Ok(order) => order,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

fn extreme(args: &[Value], want: Ordering, name: &str) -> Result<Value> {
    let items = match args {
        [single] => value::iterate(single)?,
        many => many.to_vec(),
    };
    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| value_error(format!("{}() arg is an empty sequence", name)))?;
    for item in iter {
        if value::compare(&item, &best)? == want {
            best = item;
        }
    }
    Ok(best)
}

/// Call a pure builtin
pub fn call_builtin(name: &str, args: Vec<Value>, kwargs: &Kwargs) -> Result<Value> {
    match name {
        "len" => match args.first() {
            Some(Value::String(s)) => Ok(json!(s.chars().count())),
            Some(Value::Array(a)) => Ok(json!(a.len())),
            Some(Value::Object(o)) => Ok(json!(o.len())),
            Some(other) => Err(type_error(format!(
                "object of type '{}' has no len()",
                type_name(other)
            ))),
            None => Err(type_error("len() takes exactly one argument")),
        },
        "str" => Ok(Value::String(args.first().map(to_display).unwrap_or_default())),
        "repr" => Ok(Value::String(args.first().map(repr).unwrap_or_default())),
        "bool" => Ok(Value::Bool(args.first().is_some_and(value::truthy))),
        "int" => match args.first() {
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| value_error(format!("invalid literal for int(): {}", repr(&args[0])))),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Ok(json!(i)),
                None => Ok(json!(n.as_f64().unwrap_or(0.0).trunc() as i64)),
            },
            Some(Value::Bool(b)) => Ok(json!(*b as i64)),
            None => Ok(json!(0)),
            Some(other) => Err(type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                type_name(other)
            ))),
        },
        "float" => match args.first() {
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| value_error(format!("could not convert string to float: {}", repr(&args[0]))))
                .and_then(float),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => float(expect_float(Some(v), "x")?),
            None => float(0.0),
            Some(other) => Err(type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                type_name(other)
            ))),
        },
        "list" => match args.first() {
            Some(v) => Ok(Value::Array(value::iterate(v)?)),
            None => Ok(json!([])),
        },
        "dict" => {
            let mut map = match args.first() {
                Some(Value::Object(o)) => o.clone(),
                Some(Value::Array(pairs)) => {
                    let mut map = Map::new();
                    for pair in pairs {
                        match pair {
                            Value::Array(kv) if kv.len() == 2 => {
                                map.insert(to_display(&kv[0]), kv[1].clone());
                            }
                            _ => return Err(value_error("dictionary update sequence element must be a pair")),
                        }
                    }
                    map
                }
                None => Map::new(),
                Some(other) => {
                    return Err(type_error(format!(
                        "'{}' object is not iterable as pairs",
                        type_name(other)
                    )))
                }
            };
            for (k, v) in kwargs {
                map.insert(k.clone(), v.clone());
            }
            Ok(Value::Object(map))
        }
        "sorted" => {
            let mut items = value::iterate(args.first().ok_or_else(|| type_error("sorted expected 1 argument"))?)?;
            sort_values(&mut items)?;
            if kwarg(kwargs, "reverse").is_some_and(value::truthy) {
                items.reverse();
            }
            Ok(Value::Array(items))
        }
        "sum" => {
            let items = value::iterate(args.first().ok_or_else(|| type_error("sum expected 1 argument"))?)?;
            let mut total = args.get(1).cloned().unwrap_or_else(|| json!(0));
            for item in &items {
                total = value::binary(BinOp::Add, &total, item)?;
            }
            Ok(total)
        }
        "min" => extreme(&args, Ordering::Less, "min"),
        "max" => extreme(&args, Ordering::Greater, "max"),
        "abs" => match args.first() {
            Some(Value::Number(n)) if n.is_i64() => Ok(json!(n.as_i64().unwrap_or(0).abs())),
            v => float(expect_float(v, "abs() argument")?.abs()),
        },
        "round" => {
            let x = expect_float(args.first(), "round() argument")?;
            match arg(&args, kwargs, 1, "ndigits") {
                None | Some(Value::Null) => Ok(json!(x.round_ties_even() as i64)),
                Some(n) => {
                    let factor = 10f64.powi(expect_int(Some(n), "ndigits")? as i32);
                    float((x * factor).round_ties_even() / factor)
                }
            }
        }
        "enumerate" => {
            let items = value::iterate(args.first().ok_or_else(|| type_error("enumerate expected 1 argument"))?)?;
            let start = match arg(&args, kwargs, 1, "start") {
                Some(v) => expect_int(Some(v), "start")?,
                None => 0,
            };
            Ok(Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| json!([start + i as i64, v]))
                    .collect(),
            ))
        }
        "zip" => {
            let columns = args
                .iter()
                .map(value::iterate)
                .collect::<Result<Vec<_>>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::Array(
                (0..len)
                    .map(|i| Value::Array(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        }
        "any" => Ok(Value::Bool(
            value::iterate(args.first().unwrap_or(&Value::Null))?
                .iter()
                .any(value::truthy),
        )),
        "all" => Ok(Value::Bool(
            value::iterate(args.first().unwrap_or(&Value::Null))?
                .iter()
                .all(value::truthy),
        )),
        other => Err(NetpilotError::NameNotAllowed(other.to_string())),
    }
}

/// `range(...)` materialized as a list, refusing more than `limit` items
pub fn range(args: &[Value], limit: usize) -> Result<Value> {
    let ints = args
        .iter()
        .map(|a| expect_int(Some(a), "range() argument"))
        .collect::<Result<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(type_error("range expected 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(value_error("range() arg 3 must not be zero"));
    }
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let span = if step > 0 { stop - start } else { start - stop };
    let count = if span <= 0 { 0 } else { (span - 1) / step.abs() + 1 };
    if count > limit as i128 {
        return Err(NetpilotError::tool(format!(
            "range of {} items exceeds the sandbox operation limit",
            count
        )));
    }
    Ok(Value::Array(
        (0..count).map(|i| json!((start + i * step) as i64)).collect(),
    ))
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

fn match_object(caps: &regex::Captures<'_>) -> Value {
    let groups: Vec<Value> = caps
        .iter()
        .map(|g| g.map_or(Value::Null, |m| Value::String(m.as_str().to_string())))
        .collect();
    let mut map = Map::new();
    map.insert(MATCH_KEY.to_string(), Value::Array(groups));
    Value::Object(map)
}

fn split_whitespace_or(s: &str, sep: Option<&Value>) -> Result<Vec<Value>> {
    let parts: Vec<Value> = match sep {
        None | Some(Value::Null) => s.split_whitespace().map(|p| json!(p)).collect(),
        Some(v) => {
            let sep = expect_str(Some(v), "separator")?;
            if sep.is_empty() {
                return Err(value_error("empty separator"));
            }
            s.split(sep).map(|p| json!(p)).collect()
        }
    };
    Ok(parts)
}

fn strip_chars<'s>(s: &'s str, chars: Option<&Value>, left: bool, right: bool) -> Result<&'s str> {
    let set: Option<Vec<char>> = match chars {
        None | Some(Value::Null) => None,
        Some(v) => Some(expect_str(Some(v), "chars")?.chars().collect()),
    };
    let pred = |c: char| match &set {
        Some(set) => set.contains(&c),
        None => c.is_whitespace(),
    };
    let mut out = s;
    if left {
        out = out.trim_start_matches(pred);
    }
    if right {
        out = out.trim_end_matches(pred);
    }
    Ok(out)
}

fn affix_match(s: &str, affix: &Value, test: fn(&str, &str) -> bool) -> Result<bool> {
    match affix {
        Value::String(a) => Ok(test(s, a)),
        Value::Array(options) => {
            for o in options {
                if test(s, expect_str(Some(o), "prefix")?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(type_error(format!(
            "expected str or list of str, got {}",
            type_name(other)
        ))),
    }
}

fn no_method(recv: &Value, method: &str) -> NetpilotError {
    NetpilotError::tool(format!(
        "AttributeError: '{}' object has no attribute '{}'",
        type_name(recv),
        method
    ))
}

/// Call a non-mutating method on a value
pub fn call_method(recv: &Value, method: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    match recv {
        Value::String(s) => string_method(s, method, args, kwargs).map_err(|e| match e {
            NetpilotError::NameNotAllowed(_) => no_method(recv, method),
            other => other,
        }),
        Value::Array(items) => match method {
            "index" => {
                let needle = args.first().ok_or_else(|| type_error("index expected 1 argument"))?;
                items
                    .iter()
                    .position(|i| value::equals(i, needle))
                    .map(|p| json!(p))
                    .ok_or_else(|| value_error(format!("{} is not in list", repr(needle))))
            }
            "count" => {
                let needle = args.first().ok_or_else(|| type_error("count expected 1 argument"))?;
                Ok(json!(items.iter().filter(|i| value::equals(i, needle)).count()))
            }
            "copy" => Ok(recv.clone()),
            _ => Err(no_method(recv, method)),
        },
        Value::Object(map) if map.contains_key(MATCH_KEY) => {
            let groups = map
                .get(MATCH_KEY)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            match method {
                "group" => {
                    let n = match args.first() {
                        Some(v) => expect_int(Some(v), "group index")?,
                        None => 0,
                    };
                    groups
                        .get(n as usize)
                        .cloned()
                        .ok_or_else(|| NetpilotError::tool("IndexError: no such group"))
                }
                "groups" => Ok(Value::Array(groups.into_iter().skip(1).collect())),
                _ => Err(NetpilotError::tool(format!(
                    "AttributeError: 're.Match' object has no attribute '{}'",
                    method
                ))),
            }
        }
        Value::Object(map) => match method {
            "get" => {
                let key = to_display(args.first().ok_or_else(|| type_error("get expected 1 argument"))?);
                Ok(map
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
            }
            "keys" => Ok(Value::Array(map.keys().map(|k| json!(k)).collect())),
            "values" => Ok(Value::Array(map.values().cloned().collect())),
            "items" => Ok(Value::Array(
                map.iter().map(|(k, v)| json!([k, v])).collect(),
            )),
            "copy" => Ok(recv.clone()),
            _ => Err(no_method(recv, method)),
        },
        _ => Err(no_method(recv, method)),
    }
}

fn string_method(s: &str, method: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    match method {
        "split" => Ok(Value::Array(split_whitespace_or(s, arg(args, kwargs, 0, "sep"))?)),
        "splitlines" => Ok(Value::Array(s.lines().map(|l| json!(l)).collect())),
        "strip" => Ok(json!(strip_chars(s, args.first(), true, true)?)),
        "lstrip" => Ok(json!(strip_chars(s, args.first(), true, false)?)),
        "rstrip" => Ok(json!(strip_chars(s, args.first(), false, true)?)),
        "lower" => Ok(json!(s.to_lowercase())),
        "upper" => Ok(json!(s.to_uppercase())),
        "replace" => {
            let old = expect_str(args.first(), "old")?;
            let new = expect_str(args.get(1), "new")?;
            Ok(json!(s.replace(old, new)))
        }
        "startswith" => Ok(Value::Bool(affix_match(
            s,
            args.first().ok_or_else(|| type_error("startswith expected 1 argument"))?,
            |s, a| s.starts_with(a),
        )?)),
        "endswith" => Ok(Value::Bool(affix_match(
            s,
            args.first().ok_or_else(|| type_error("endswith expected 1 argument"))?,
            |s, a| s.ends_with(a),
        )?)),
        "join" => {
            let items = value::iterate(args.first().ok_or_else(|| type_error("join expected 1 argument"))?)?;
            let parts = items
                .iter()
                .map(|i| match i {
                    Value::String(p) => Ok(p.as_str()),
                    other => Err(type_error(format!(
                        "sequence item: expected str instance, {} found",
                        type_name(other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(json!(parts.join(s)))
        }
        "find" => {
            let needle = expect_str(args.first(), "sub")?;
            let position = s
                .find(needle)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(json!(position))
        }
        "count" => {
            let needle = expect_str(args.first(), "sub")?;
            if needle.is_empty() {
                return Ok(json!(s.chars().count() + 1));
            }
            Ok(json!(s.matches(needle).count()))
        }
        "isdigit" => Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "title" => {
            let words: Vec<String> = s
                .split(' ')
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first
                            .to_uppercase()
                            .chain(chars.flat_map(char::to_lowercase))
                            .collect(),
                        None => String::new(),
                    }
                })
                .collect();
            Ok(json!(words.join(" ")))
        }
        other => Err(NetpilotError::NameNotAllowed(other.to_string())),
    }
}

/// Call a mutating method on a list or dict held in a variable
pub fn call_mut_method(recv: &mut Value, method: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    match recv {
        Value::Array(items) => match method {
            "append" => {
                items.push(args.first().cloned().ok_or_else(|| type_error("append expected 1 argument"))?);
                Ok(Value::Null)
            }
            "extend" => {
                items.extend(value::iterate(args.first().ok_or_else(|| type_error("extend expected 1 argument"))?)?);
                Ok(Value::Null)
            }
            "insert" => {
                let at = expect_int(args.first(), "index")?;
                let v = args.get(1).cloned().ok_or_else(|| type_error("insert expected 2 arguments"))?;
                let len = items.len() as i64;
                let at = if at < 0 { (len + at).max(0) } else { at.min(len) };
                items.insert(at as usize, v);
                Ok(Value::Null)
            }
            "pop" => {
                if items.is_empty() {
                    return Err(NetpilotError::tool("IndexError: pop from empty list"));
                }
                let len = items.len() as i64;
                let at = match args.first() {
                    Some(v) => expect_int(Some(v), "index")?,
                    None => -1,
                };
                let at = if at < 0 { len + at } else { at };
                if at < 0 || at >= len {
                    return Err(NetpilotError::tool("IndexError: pop index out of range"));
                }
                Ok(items.remove(at as usize))
            }
            "remove" => {
                let needle = args.first().ok_or_else(|| type_error("remove expected 1 argument"))?;
                let pos = items
                    .iter()
                    .position(|i| value::equals(i, needle))
                    .ok_or_else(|| value_error("list.remove(x): x not in list"))?;
                items.remove(pos);
                Ok(Value::Null)
            }
            "sort" => {
                sort_values(items)?;
                if kwarg(kwargs, "reverse").is_some_and(value::truthy) {
                    items.reverse();
                }
                Ok(Value::Null)
            }
            "clear" => {
                items.clear();
                Ok(Value::Null)
            }
            _ => call_method(recv, method, args, kwargs),
        },
        Value::Object(map) if !map.contains_key(MATCH_KEY) => match method {
            "update" => {
                match args.first() {
                    Some(Value::Object(other)) => {
                        for (k, v) in other {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                    Some(other) => {
                        return Err(type_error(format!(
                            "'{}' object is not a mapping",
                            type_name(other)
                        )))
                    }
                    None => {}
                }
                for (k, v) in kwargs {
                    map.insert(k.clone(), v.clone());
                }
                Ok(Value::Null)
            }
            "pop" => {
                let key = to_display(args.first().ok_or_else(|| type_error("pop expected 1 argument"))?);
                match (map.shift_remove(&key), args.get(1)) {
                    (Some(v), _) => Ok(v),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(NetpilotError::tool(format!("KeyError: '{}'", key))),
                }
            }
            "clear" => {
                map.clear();
                Ok(Value::Null)
            }
            _ => call_method(recv, method, args, kwargs),
        },
        _ => call_method(recv, method, args, kwargs),
    }
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

const RE_IGNORECASE: i64 = 2;
const RE_MULTILINE: i64 = 8;
const RE_DOTALL: i64 = 16;

/// Module-level constants such as `math.pi` or `re.IGNORECASE`
pub fn module_constant(module: &str, name: &str) -> Result<Value> {
    match (module, name) {
        ("math", "pi") => float(std::f64::consts::PI),
        ("math", "e") => float(std::f64::consts::E),
        ("re", "IGNORECASE" | "I") => Ok(json!(RE_IGNORECASE)),
        ("re", "MULTILINE" | "M") => Ok(json!(RE_MULTILINE)),
        ("re", "DOTALL" | "S") => Ok(json!(RE_DOTALL)),
        _ => Err(missing_attribute(module, name)),
    }
}

fn missing_attribute(module: &str, name: &str) -> NetpilotError {
    NetpilotError::tool(format!(
        "AttributeError: module '{}' has no attribute '{}' available in this sandbox. Use the provided tools instead.",
        module, name
    ))
}

fn compile(pattern: &str, flags: Option<&Value>) -> Result<Regex> {
    let flags = match flags {
        Some(v) => expect_int(Some(v), "flags")?,
        None => 0,
    };
    RegexBuilder::new(pattern)
        .case_insensitive(flags & RE_IGNORECASE != 0)
        .multi_line(flags & RE_MULTILINE != 0)
        .dot_matches_new_line(flags & RE_DOTALL != 0)
        .build()
        .map_err(|e| NetpilotError::tool(format!("re.error: {}", e)))
}

/// Translate a Python replacement template (`\1`, `\g<name>`) to regex syntax
fn replacement_template(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{}}}", group));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|&c| c != '>').collect();
                        out.push_str(&format!("${{{}}}", name));
                    } else {
                        out.push_str("\\g");
                    }
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

fn re_function(name: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    let pattern = expect_str(arg(args, kwargs, 0, "pattern"), "pattern")?;
    match name {
        "findall" => {
            let text = expect_str(arg(args, kwargs, 1, "string"), "string")?;
            let re = compile(pattern, arg(args, kwargs, 2, "flags"))?;
            let groups = re.captures_len() - 1;
            let found = re
                .captures_iter(text)
                .map(|caps| {
                    let group = |i: usize| json!(caps.get(i).map_or("", |m| m.as_str()));
                    match groups {
                        0 => group(0),
                        1 => group(1),
                        n => Value::Array((1..=n).map(group).collect()),
                    }
                })
                .collect();
            Ok(Value::Array(found))
        }
        "search" | "match" | "fullmatch" => {
            let text = expect_str(arg(args, kwargs, 1, "string"), "string")?;
            let re = compile(pattern, arg(args, kwargs, 2, "flags"))?;
            Ok(re
                .captures(text)
                .filter(|caps| {
                    let whole = caps.get(0);
                    match name {
                        "match" => whole.is_some_and(|m| m.start() == 0),
                        "fullmatch" => whole.is_some_and(|m| m.start() == 0 && m.end() == text.len()),
                        _ => true,
                    }
                })
                .map_or(Value::Null, |caps| match_object(&caps)))
        }
        "sub" => {
            let repl = expect_str(arg(args, kwargs, 1, "repl"), "repl")?;
            let text = expect_str(arg(args, kwargs, 2, "string"), "string")?;
            let re = compile(pattern, kwarg(kwargs, "flags"))?;
            let count = match arg(args, kwargs, 3, "count") {
                Some(v) => expect_int(Some(v), "count")?.max(0) as usize,
                None => 0,
            };
            Ok(json!(re
                .replacen(text, count, replacement_template(repl).as_str())
                .into_owned()))
        }
        "split" => {
            let text = expect_str(arg(args, kwargs, 1, "string"), "string")?;
            let re = compile(pattern, kwarg(kwargs, "flags"))?;
            Ok(Value::Array(re.split(text).map(|p| json!(p)).collect()))
        }
        "escape" => Ok(json!(regex::escape(pattern))),
        other => Err(missing_attribute("re", other)),
    }
}

fn json_function(name: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    match name {
        "dumps" => {
            let v = arg(args, kwargs, 0, "obj").ok_or_else(|| type_error("dumps expected 1 argument"))?;
            let text = match kwarg(kwargs, "indent") {
                Some(Value::Null) | None => serde_json::to_string(v)?,
                Some(_) => serde_json::to_string_pretty(v)?,
            };
            Ok(Value::String(text))
        }
        "loads" => {
            let text = expect_str(arg(args, kwargs, 0, "s"), "s")?;
            serde_json::from_str(text)
                .map_err(|e| NetpilotError::tool(format!("json.JSONDecodeError: {}", e)))
        }
        other => Err(missing_attribute("json", other)),
    }
}

fn math_function(name: &str, args: &[Value]) -> Result<Value> {
    let x = expect_float(args.first(), "x")?;
    match name {
        "floor" => Ok(json!(x.floor() as i64)),
        "ceil" => Ok(json!(x.ceil() as i64)),
        "sqrt" if x < 0.0 => Err(value_error("math domain error")),
        "sqrt" => float(x.sqrt()),
        "fabs" => float(x.abs()),
        "log" if x <= 0.0 => Err(value_error("math domain error")),
        "log" => match args.get(1) {
            Some(base) => float(x.ln() / expect_float(Some(base), "base")?.ln()),
            None => float(x.ln()),
        },
        "pow" => float(x.powf(expect_float(args.get(1), "y")?)),
        other => Err(missing_attribute("math", other)),
    }
}

/// Call `module.function(...)` for the modules that expose attributes
pub fn call_module(module: &str, name: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    match module {
        "re" => re_function(name, args, kwargs),
        "json" => json_function(name, args, kwargs),
        "math" => math_function(name, args),
        "time" if name == "time" => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| NetpilotError::tool(e.to_string()))?;
            float(now.as_secs_f64())
        }
        _ => Err(missing_attribute(module, name)),
    }
}
