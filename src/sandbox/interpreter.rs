//! Evaluator for action scripts
//!
//! Each code block gets a fresh [`Interpreter`]: nothing persists between
//! steps. Identifiers resolve, in order, to script variables, imported
//! modules, builtins and registered tools. Anything else is
//! `NameNotAllowed`.

use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::core::{CallTimeout, NetpilotError, ToolCall};
use crate::sandbox::builtins::{self, Kwargs, BUILTINS, MUTATING_METHODS};
use crate::sandbox::executor::invoke_tool;
use crate::sandbox::parser::{self, BinOp, Expr, FExpr, Stmt, Target};
use crate::sandbox::value;
use crate::sandbox::SandboxPolicy;
use crate::tools::ToolRegistry;

/// Something an identifier can be bound to
#[derive(Debug, Clone)]
enum Slot {
    Data(Value),
    Module(String),
    Func(Callable),
}

#[derive(Debug, Clone)]
enum Callable {
    Builtin(String),
    Module(String, String),
    Tool(String),
}

/// Non-local exits out of evaluation
enum Interrupt {
    Error(NetpilotError),
    Final(Value),
}

impl From<NetpilotError> for Interrupt {
    fn from(e: NetpilotError) -> Self {
        Interrupt::Error(e)
    }
}

type Eval<T> = std::result::Result<T, Interrupt>;

enum Flow {
    Normal,
    Break,
    Continue,
}

/// Result of running one script
#[derive(Debug, Default)]
pub struct ScriptRun {
    /// Text written with `print`
    pub stdout: String,
    /// Value of the last evaluated statement
    pub last_value: Value,
    /// Argument of `final_answer(...)` if the script called it
    pub final_answer: Option<Value>,
    /// Error that stopped the script, if any
    pub error: Option<NetpilotError>,
}

/// Single-use evaluator bound to a registry and policy
pub struct Interpreter<'a> {
    registry: &'a ToolRegistry,
    policy: &'a SandboxPolicy,
    scope: HashMap<String, Slot>,
    stdout: String,
    last_value: Value,
    operations: usize,
    /// Wall-clock bound; time spent in unbounded tool calls is added back
    deadline: Instant,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter with an empty scope
    pub fn new(registry: &'a ToolRegistry, policy: &'a SandboxPolicy) -> Self {
        Self {
            registry,
            policy,
            scope: HashMap::new(),
            stdout: String::new(),
            last_value: Value::Null,
            operations: 0,
            deadline: Instant::now() + policy.code_timeout,
        }
    }

    /// Parse and evaluate `source`, consuming the interpreter
    pub async fn run(mut self, source: &str) -> ScriptRun {
        let program = match parser::parse(source) {
            Ok(program) => program,
            Err(e) => {
                return ScriptRun {
                    error: Some(e),
                    ..Default::default()
                }
            }
        };

        let outcome = self.exec_block(&program).await;
        let mut run = ScriptRun {
            stdout: std::mem::take(&mut self.stdout),
            last_value: std::mem::take(&mut self.last_value),
            ..Default::default()
        };
        match outcome {
            Ok(Flow::Normal) => {}
            Ok(Flow::Break | Flow::Continue) => {
                run.error = Some(NetpilotError::tool("SyntaxError: 'break' or 'continue' outside loop"))
            }
            Err(Interrupt::Final(answer)) => run.final_answer = Some(answer),
            Err(Interrupt::Error(e)) => run.error = Some(e),
        }
        run
    }

    fn tick(&mut self) -> Eval<()> {
        self.operations += 1;
        if self.operations > self.policy.max_operations {
            return Err(NetpilotError::tool(format!(
                "Reached the max number of operations ({}). Simplify the code or split it over several steps.",
                self.policy.max_operations
            ))
            .into());
        }
        if Instant::now() >= self.deadline {
            return Err(NetpilotError::tool(format!(
                "code execution exceeded {:?} and was stopped",
                self.policy.code_timeout
            ))
            .into());
        }
        Ok(())
    }

    fn exec_block<'s>(&'s mut self, body: &'s [Stmt]) -> BoxFuture<'s, Eval<Flow>> {
        Box::pin(async move {
            for stmt in body {
                match self.exec(stmt).await? {
                    Flow::Normal => {}
                    other => return Ok(other),
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn exec<'s>(&'s mut self, stmt: &'s Stmt) -> BoxFuture<'s, Eval<Flow>> {
        Box::pin(async move {
            self.tick()?;
            match stmt {
                Stmt::Import(modules) => {
                    for (module, alias) in modules {
                        self.check_import(module)?;
                        self.scope.insert(alias.clone(), Slot::Module(module.clone()));
                    }
                }
                Stmt::FromImport { module, names } => {
                    self.check_import(module)?;
                    for (name, alias) in names.iter().filter(|(n, _)| n != "*") {
                        let slot = match builtins::module_constant(module, name) {
                            Ok(constant) => Slot::Data(constant),
                            Err(_) => Slot::Func(Callable::Module(module.clone(), name.clone())),
                        };
                        self.scope.insert(alias.clone(), slot);
                    }
                }
                Stmt::Assign { target, value } => {
                    let v = self.eval(value).await?;
                    self.last_value = v.clone();
                    self.assign(target, v).await?;
                }
                Stmt::AugAssign { target, op, value } => {
                    let current = self.eval(&target_expr(target)?).await?;
                    let rhs = self.eval(value).await?;
                    let updated = value::binary(*op, &current, &rhs)?;
                    self.last_value = updated.clone();
                    self.assign(target, updated).await?;
                }
                Stmt::For { target, iter, body } => {
                    let items = value::iterate(&self.eval(iter).await?)?;
                    for item in items {
                        self.tick()?;
                        self.assign(target, item).await?;
                        match self.exec_block(body).await? {
                            Flow::Break => break,
                            Flow::Continue | Flow::Normal => {}
                        }
                    }
                }
                Stmt::If { branches, orelse } => {
                    for (cond, body) in branches {
                        if value::truthy(&self.eval(cond).await?) {
                            return self.exec_block(body).await;
                        }
                    }
                    return self.exec_block(orelse).await;
                }
                Stmt::Expr(expr) => {
                    self.last_value = self.eval(expr).await?;
                }
                Stmt::Break => return Ok(Flow::Break),
                Stmt::Continue => return Ok(Flow::Continue),
                Stmt::Pass => {}
            }
            Ok(Flow::Normal)
        })
    }

    fn check_import(&self, module: &str) -> Eval<()> {
        if self.policy.allows_import(module) {
            Ok(())
        } else {
            Err(NetpilotError::CapabilityDenied(
                module.to_string(),
                self.policy.authorized_imports().join(", "),
            )
            .into())
        }
    }

    fn assign<'s>(&'s mut self, target: &'s Target, v: Value) -> BoxFuture<'s, Eval<()>> {
        Box::pin(async move {
            match target {
                Target::Name(name) => {
                    self.scope.insert(name.clone(), Slot::Data(v));
                }
                Target::Tuple(targets) => {
                    let items = value::iterate(&v)?;
                    if items.len() != targets.len() {
                        return Err(NetpilotError::tool(format!(
                            "ValueError: expected {} values to unpack, got {}",
                            targets.len(),
                            items.len()
                        ))
                        .into());
                    }
                    for (t, item) in targets.iter().zip(items) {
                        self.assign(t, item).await?;
                    }
                }
                Target::Index(container, idx) => {
                    // walk `a[i][j]` down to the variable that owns it
                    let mut path = vec![idx.as_ref()];
                    let mut base = container.as_ref();
                    while let Expr::Index(inner, i) = base {
                        path.push(i.as_ref());
                        base = inner.as_ref();
                    }
                    let Expr::Name(var) = base else {
                        return Err(NetpilotError::tool(
                            "SyntaxError: item assignment is only supported on variables",
                        )
                        .into());
                    };
                    let mut keys = Vec::with_capacity(path.len());
                    for key in path.iter().rev() {
                        keys.push(self.eval(key).await?);
                    }
                    let root = self.data_mut(var)?;
                    let (last, parents) = keys.split_last().ok_or_else(|| {
                        Interrupt::Error(NetpilotError::tool("empty subscript"))
                    })?;
                    let mut slot = root;
                    for key in parents {
                        slot = index_mut(slot, key)?;
                    }
                    value::set_index(slot, last, v)?;
                }
            }
            Ok(())
        })
    }

    fn data_mut(&mut self, name: &str) -> Eval<&mut Value> {
        match self.scope.get_mut(name) {
            Some(Slot::Data(v)) => Ok(v),
            Some(_) => Err(NetpilotError::tool(format!(
                "TypeError: '{}' does not support item assignment",
                name
            ))
            .into()),
            None => Err(NetpilotError::NameNotAllowed(name.to_string()).into()),
        }
    }

    fn lookup(&self, name: &str) -> Eval<Slot> {
        if let Some(slot) = self.scope.get(name) {
            return Ok(slot.clone());
        }
        if BUILTINS.contains(&name) {
            return Ok(Slot::Func(Callable::Builtin(name.to_string())));
        }
        if self.registry.contains(name) {
            return Ok(Slot::Func(Callable::Tool(name.to_string())));
        }
        Err(NetpilotError::NameNotAllowed(name.to_string()).into())
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> BoxFuture<'s, Eval<Value>> {
        Box::pin(async move {
            self.tick()?;
            match expr {
                Expr::Literal(v) => Ok(v.clone()),
                Expr::FString(parts) => {
                    let mut out = String::new();
                    for part in parts {
                        match part {
                            FExpr::Text(t) => out.push_str(t),
                            FExpr::Expr(e) => out.push_str(&value::to_display(&self.eval(e).await?)),
                        }
                    }
                    Ok(Value::String(out))
                }
                Expr::Name(name) => match self.lookup(name)? {
                    Slot::Data(v) => Ok(v),
                    Slot::Module(m) => Err(NetpilotError::tool(format!(
                        "TypeError: module '{}' cannot be used as a value",
                        m
                    ))
                    .into()),
                    Slot::Func(_) => Err(NetpilotError::tool(format!(
                        "TypeError: '{}' is a function; call it instead of using it as a value",
                        name
                    ))
                    .into()),
                },
                Expr::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval(item).await?);
                    }
                    Ok(Value::Array(out))
                }
                Expr::Dict(entries) => {
                    let mut out = Vec::with_capacity(entries.len());
                    for (k, v) in entries {
                        let key = self.eval(k).await?;
                        let val = self.eval(v).await?;
                        out.push((key, val));
                    }
                    Ok(value::dict(out))
                }
                Expr::Binary(l, op, r) => {
                    let lhs = self.eval(l).await?;
                    let rhs = self.eval(r).await?;
                    Ok(value::binary(*op, &lhs, &rhs)?)
                }
                Expr::And(l, r) => {
                    let lhs = self.eval(l).await?;
                    if !value::truthy(&lhs) {
                        return Ok(lhs);
                    }
                    self.eval(r).await
                }
                Expr::Or(l, r) => {
                    let lhs = self.eval(l).await?;
                    if value::truthy(&lhs) {
                        return Ok(lhs);
                    }
                    self.eval(r).await
                }
                Expr::Not(e) => Ok(Value::Bool(!value::truthy(&self.eval(e).await?))),
                Expr::Neg(e) => {
                    let v = self.eval(e).await?;
                    Ok(value::binary(BinOp::Sub, &Value::from(0), &v)?)
                }
                Expr::Ternary { cond, then, orelse } => {
                    if value::truthy(&self.eval(cond).await?) {
                        self.eval(then).await
                    } else {
                        self.eval(orelse).await
                    }
                }
                Expr::Index(container, idx) => {
                    let c = self.eval(container).await?;
                    let i = self.eval(idx).await?;
                    Ok(value::index(&c, &i)?)
                }
                Expr::Slice { value: v, start, end } => {
                    let target = self.eval(v).await?;
                    let start = match start {
                        Some(s) => Some(self.eval(s).await?),
                        None => None,
                    };
                    let end = match end {
                        Some(e) => Some(self.eval(e).await?),
                        None => None,
                    };
                    Ok(value::slice(&target, start.as_ref(), end.as_ref())?)
                }
                Expr::Attr(obj, attr) => match obj.as_ref() {
                    Expr::Name(name) => match self.lookup(name)? {
                        Slot::Module(module) => Ok(builtins::module_constant(&module, attr)?),
                        _ => Err(attribute_error(attr).into()),
                    },
                    _ => Err(attribute_error(attr).into()),
                },
                Expr::Call { func, args, kwargs } => self.call(func, args, kwargs).await,
            }
        })
    }

    async fn call(&mut self, func: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> Eval<Value> {
        // resolve the callee before evaluating arguments
        let target = match func {
            Expr::Name(name) => match self.lookup(name)? {
                Slot::Func(callable) => CallTarget::Func(callable),
                Slot::Module(m) => {
                    return Err(NetpilotError::tool(format!("TypeError: module '{}' is not callable", m)).into())
                }
                Slot::Data(v) => {
                    return Err(NetpilotError::tool(format!(
                        "TypeError: '{}' object is not callable",
                        value::type_name(&v)
                    ))
                    .into())
                }
            },
            Expr::Attr(recv, method) => match recv.as_ref() {
                Expr::Name(name) => match self.lookup(name)? {
                    Slot::Module(module) => CallTarget::Func(Callable::Module(module, method.clone())),
                    Slot::Data(_) if MUTATING_METHODS.contains(&method.as_str()) => {
                        CallTarget::MutMethod(name.clone(), method.clone())
                    }
                    Slot::Data(v) => CallTarget::Method(v, method.clone()),
                    Slot::Func(_) => return Err(attribute_error(method).into()),
                },
                other => {
                    let v = self.eval(other).await?;
                    CallTarget::Method(v, method.clone())
                }
            },
            other => {
                let v = self.eval(other).await?;
                return Err(NetpilotError::tool(format!(
                    "TypeError: '{}' object is not callable",
                    value::type_name(&v)
                ))
                .into());
            }
        };

        let mut positional = Vec::with_capacity(args.len());
        for a in args {
            positional.push(self.eval(a).await?);
        }
        let mut named: Kwargs = Vec::with_capacity(kwargs.len());
        for (k, e) in kwargs {
            let v = self.eval(e).await?;
            named.push((k.clone(), v));
        }

        match target {
            CallTarget::Func(Callable::Builtin(name)) => self.call_builtin(&name, positional, named),
            CallTarget::Func(Callable::Module(module, name)) => {
                Ok(builtins::call_module(&module, &name, &positional, &named)?)
            }
            CallTarget::Func(Callable::Tool(name)) => self.call_tool(&name, positional, named).await,
            CallTarget::Method(recv, method) => {
                Ok(builtins::call_method(&recv, &method, &positional, &named)?)
            }
            CallTarget::MutMethod(var, method) => {
                let recv = self.data_mut(&var)?;
                Ok(builtins::call_mut_method(recv, &method, &positional, &named)?)
            }
        }
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Eval<Value> {
        match name {
            "print" => {
                let sep = kwargs
                    .iter()
                    .find(|(k, _)| k == "sep")
                    .map(|(_, v)| value::to_display(v))
                    .unwrap_or_else(|| " ".to_string());
                let line: Vec<String> = args.iter().map(value::to_display).collect();
                self.stdout.push_str(&line.join(&sep));
                self.stdout.push('\n');
                Ok(Value::Null)
            }
            "final_answer" => {
                let answer = args
                    .into_iter()
                    .next()
                    .or_else(|| kwargs.into_iter().find(|(k, _)| k == "answer").map(|(_, v)| v))
                    .unwrap_or(Value::Null);
                Err(Interrupt::Final(answer))
            }
            "range" => Ok(builtins::range(&args, self.policy.max_operations)?),
            other => Ok(builtins::call_builtin(other, args, &kwargs)?),
        }
    }

    async fn call_tool(&mut self, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Eval<Value> {
        let spec = self.registry.spec(name)?;
        let delegated = spec.timeout == CallTimeout::Unbounded;
        if args.len() > spec.parameters.len() {
            return Err(NetpilotError::tool(format!(
                "{}() takes {} arguments but {} were given. Expected: {}",
                name,
                spec.parameters.len(),
                args.len(),
                spec.signature()
            ))
            .into());
        }

        let mut bound = Map::new();
        for (param, v) in spec.parameters.iter().zip(args) {
            bound.insert(param.name.clone(), v);
        }
        for (k, v) in kwargs {
            if bound.contains_key(&k) {
                return Err(NetpilotError::tool(format!(
                    "{}() got multiple values for argument '{}'",
                    name, k
                ))
                .into());
            }
            bound.insert(k, v);
        }

        let call = ToolCall::new(name, Value::Object(bound));
        let started = Instant::now();
        let result = invoke_tool(self.registry, &call, self.policy.tool_timeout).await;
        if delegated {
            // a delegated run does not eat into this block's own time
            self.deadline += started.elapsed();
        }
        Ok(result?)
    }
}

enum CallTarget {
    Func(Callable),
    Method(Value, String),
    MutMethod(String, String),
}

fn attribute_error(attr: &str) -> NetpilotError {
    NetpilotError::tool(format!("AttributeError: attribute '{}' is not available", attr))
}

/// Expression that reads the current value of an assignment target
fn target_expr(target: &Target) -> Result<Expr, NetpilotError> {
    match target {
        Target::Name(n) => Ok(Expr::Name(n.clone())),
        Target::Index(c, i) => Ok(Expr::Index(c.clone(), i.clone())),
        Target::Tuple(_) => Err(NetpilotError::tool(
            "SyntaxError: illegal expression for augmented assignment",
        )),
    }
}

fn index_mut<'v>(container: &'v mut Value, key: &Value) -> Eval<&'v mut Value> {
    let missing = || Interrupt::Error(NetpilotError::tool(format!("KeyError: {}", value::repr(key))));
    match container {
        Value::Object(map) => map.get_mut(&value::to_display(key)).ok_or_else(missing),
        Value::Array(items) => {
            let len = items.len() as i64;
            let i = key.as_i64().ok_or_else(missing)?;
            let i = if i < 0 { len + i } else { i };
            if i < 0 || i >= len {
                return Err(NetpilotError::tool("IndexError: list index out of range").into());
            }
            Ok(&mut items[i as usize])
        }
        _ => Err(NetpilotError::tool(format!(
            "TypeError: '{}' object is not subscriptable",
            value::type_name(container)
        ))
        .into()),
    }
}
