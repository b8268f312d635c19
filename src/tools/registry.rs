//! Tool registry - validates and dispatches tool calls
//!
//! Tools are registered once at session setup with a [`ToolSpec`] and a
//! [`ToolHandler`]. Registration checks that the handler's declared
//! parameters line up with the schema, so a mismatch fails at setup instead
//! of in the middle of a run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::core::{NetpilotError, Result, ToolCall, ToolDefinition, ToolSpec};

/// Bound arguments passed to a handler, keyed by parameter name
pub type ToolArgs = Map<String, Value>;

/// A callable tool implementation
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Parameter names the handler reads, in schema order
    fn parameters(&self) -> Vec<String>;

    /// Invoke the tool with validated arguments
    async fn call(&self, args: ToolArgs) -> Result<Value>;
}

type ToolFn = dyn Fn(ToolArgs) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Closure-backed tool handler
pub struct FnTool {
    params: Vec<String>,
    func: Box<ToolFn>,
}

impl FnTool {
    /// Wrap an async closure taking the bound argument map
    pub fn new<F, Fut>(params: &[&str], func: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            params: params.iter().map(|p| p.to_string()).collect(),
            func: Box::new(move |args| Box::pin(func(args))),
        }
    }
}

#[async_trait]
impl ToolHandler for FnTool {
    fn parameters(&self) -> Vec<String> {
        self.params.clone()
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        (self.func)(args).await
    }
}

/// Read a string argument, failing with a tool error when it is absent
pub fn required_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| NetpilotError::tool(format!("missing string argument '{}'", key)))
}

/// Read an optional string argument
pub fn optional_str<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

struct Entry {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    /// Entries in registration order
    entries: Vec<Entry>,
    /// Name -> position in `entries`
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    ///
    /// Fails with `DuplicateName` when the name is taken and with
    /// `SchemaMismatch` when the handler's parameters differ from the schema
    /// in name, order or count.
    pub fn register(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Result<()> {
        if self.index.contains_key(&spec.name) {
            return Err(NetpilotError::DuplicateName(spec.name));
        }

        let schema = spec.parameter_names();
        let declared = handler.parameters();
        if schema != declared {
            return Err(NetpilotError::SchemaMismatch {
                tool: spec.name,
                schema,
                handler: declared,
            });
        }

        tracing::debug!(tool = %spec.name, "registered tool");
        self.index.insert(spec.name.clone(), self.entries.len());
        self.entries.push(Entry { spec, handler });
        Ok(())
    }

    /// Look up a handler by name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolHandler>> {
        self.entry(name).map(|e| Arc::clone(&e.handler))
    }

    /// Look up a spec by name
    pub fn spec(&self, name: &str) -> Result<&ToolSpec> {
        self.entry(name).map(|e| &e.spec)
    }

    fn entry(&self, name: &str) -> Result<&Entry> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| NetpilotError::UnknownTool(name.to_string(), self.names().join(", ")))
    }

    /// Whether a tool with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All specs in registration order
    pub fn describe(&self) -> Vec<&ToolSpec> {
        self.entries.iter().map(|e| &e.spec).collect()
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.spec.name.clone()).collect()
    }

    /// JSON-schema catalogue for native tool-calling backends
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.spec.to_definition()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate a call's arguments against its spec and return the bound map
    pub fn bind(&self, call: &ToolCall) -> Result<(ToolArgs, &ToolSpec, Arc<dyn ToolHandler>)> {
        let entry = self.entry(&call.name)?;
        let args = bind_arguments(&entry.spec, &call.arguments)?;
        Ok((args, &entry.spec, Arc::clone(&entry.handler)))
    }
}

/// Check argument bindings against a spec
///
/// Unknown names, missing required parameters and type mismatches are tool
/// errors. Explicit `null` for an optional parameter is dropped.
pub fn bind_arguments(spec: &ToolSpec, arguments: &Value) -> Result<ToolArgs> {
    let provided = match arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(NetpilotError::tool(format!(
                "arguments for '{}' must be an object, got {}",
                spec.name, other
            )))
        }
    };

    if let Some(unknown) = provided
        .keys()
        .find(|k| !spec.parameters.iter().any(|p| &p.name == *k))
    {
        return Err(NetpilotError::tool(format!(
            "'{}' has no parameter '{}'. Expected: {}",
            spec.name,
            unknown,
            spec.signature()
        )));
    }

    let mut bound = Map::new();
    for param in &spec.parameters {
        match provided.get(&param.name) {
            Some(Value::Null) | None if param.required => {
                return Err(NetpilotError::tool(format!(
                    "missing required argument '{}' for {}",
                    param.name,
                    spec.signature()
                )));
            }
            Some(Value::Null) | None => {}
            Some(value) => {
                if !param.param_type.accepts(value) {
                    return Err(NetpilotError::tool(format!(
                        "argument '{}' of '{}' must be {}, got {}",
                        param.name, spec.name, param.param_type, value
                    )));
                }
                bound.insert(param.name.clone(), value.clone());
            }
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ParamType;
    use serde_json::json;

    fn ping_spec() -> ToolSpec {
        ToolSpec::new("ping", "Ping an address").param("ip", ParamType::String, "Target")
    }

    fn ping_handler() -> Arc<dyn ToolHandler> {
        Arc::new(FnTool::new(&["ip"], |_args| async { Ok(json!("reachable")) }))
    }

    #[test]
    fn test_register_then_resolve_returns_same_handler() {
        let mut registry = ToolRegistry::new();
        let handler = ping_handler();
        registry.register(ping_spec(), Arc::clone(&handler)).unwrap();

        let resolved = registry.resolve("ping").unwrap();
        assert!(Arc::ptr_eq(&resolved, &handler));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(ping_spec(), ping_handler()).unwrap();
        let err = registry.register(ping_spec(), ping_handler()).unwrap_err();
        assert!(matches!(err, NetpilotError::DuplicateName(name) if name == "ping"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let mut registry = ToolRegistry::new();
        let handler = Arc::new(FnTool::new(&["address"], |_| async { Ok(Value::Null) }));
        let err = registry.register(ping_spec(), handler).unwrap_err();
        assert!(matches!(err, NetpilotError::SchemaMismatch { .. }));

        let handler = Arc::new(FnTool::new(&["ip", "count"], |_| async { Ok(Value::Null) }));
        assert!(registry.register(ping_spec(), handler).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.resolve("nope"),
            Err(NetpilotError::UnknownTool(..))
        ));
    }

    #[test]
    fn test_describe_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(
                    ToolSpec::new(name, "t"),
                    Arc::new(FnTool::new(&[], |_| async { Ok(Value::Null) })),
                )
                .unwrap();
        }
        let names: Vec<&str> = registry.describe().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_bind_arguments() {
        let spec = ToolSpec::new("show", "t")
            .param("host", ParamType::String, "h")
            .optional_param("port", ParamType::Integer, "p");

        let bound = bind_arguments(&spec, &json!({"host": "r1", "port": null})).unwrap();
        assert_eq!(bound.len(), 1);

        assert!(bind_arguments(&spec, &json!({})).is_err());
        assert!(bind_arguments(&spec, &json!({"host": 5})).is_err());
        assert!(bind_arguments(&spec, &json!({"host": "r1", "extra": 1})).is_err());
        assert!(bind_arguments(&spec, &json!("r1")).is_err());
    }

    #[tokio::test]
    async fn test_fn_tool_call() {
        let handler = FnTool::new(&["ip"], |args| async move {
            let ip = required_str(&args, "ip")?;
            Ok::<_, NetpilotError>(json!(format!("pinged {}", ip)))
        });
        let mut args = Map::new();
        args.insert("ip".into(), json!("10.0.0.1"));
        assert_eq!(handler.call(args).await.unwrap(), json!("pinged 10.0.0.1"));
    }
}
