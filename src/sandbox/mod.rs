//! Constrained execution of model-authored actions
//!
//! Generated code is not handed to a general-purpose interpreter. It is
//! parsed into a small statement language and evaluated against an explicit
//! capability grant: an enumerated import allow-list and the tool registry.
//! Anything outside that grant is a step-level error.

pub mod builtins;
pub mod executor;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

use std::time::Duration;

use crate::core::Config;

pub use executor::{ExecutionOutcome, SandboxedExecutor};
pub use interpreter::Interpreter;

/// Modules every script may import, on top of configured extras
pub const BASE_IMPORTS: &[&str] = &[
    "collections",
    "datetime",
    "itertools",
    "json",
    "math",
    "queue",
    "random",
    "re",
    "stat",
    "statistics",
    "time",
    "unicodedata",
];

/// Capability grant and limits for one agent's sandbox
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    authorized_imports: Vec<String>,
    /// Default per-call timeout for tools without their own
    pub tool_timeout: Duration,
    /// Wall-clock bound on one code block
    pub code_timeout: Duration,
    /// Statement and expression evaluations allowed per code block
    pub max_operations: usize,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl SandboxPolicy {
    /// Base imports plus `extra`, sorted and deduplicated
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut authorized_imports: Vec<String> =
            BASE_IMPORTS.iter().map(|m| m.to_string()).collect();
        authorized_imports.extend(extra.into_iter().map(Into::into));
        authorized_imports.sort();
        authorized_imports.dedup();

        Self {
            authorized_imports,
            tool_timeout: Duration::from_secs(60),
            code_timeout: Duration::from_secs(300),
            max_operations: 100_000,
        }
    }

    /// Policy built from the `[sandbox]` config section
    pub fn from_config(config: &Config) -> Self {
        let mut policy = Self::new(config.sandbox.authorized_imports.iter().cloned());
        policy.tool_timeout = config.tool_timeout();
        policy.code_timeout = Duration::from_secs(config.sandbox.code_timeout_secs);
        policy.max_operations = config.sandbox.max_operations;
        policy
    }

    /// Whether `module` (or its top-level package) may be imported
    pub fn allows_import(&self, module: &str) -> bool {
        let root = module.split('.').next().unwrap_or(module);
        self.authorized_imports.iter().any(|m| m == module || m == root)
    }

    /// Sorted allow-list
    pub fn authorized_imports(&self) -> &[String] {
        &self.authorized_imports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_and_extra_imports() {
        let policy = SandboxPolicy::new(["netmiko", "re"]);
        assert!(policy.allows_import("re"));
        assert!(policy.allows_import("netmiko"));
        assert!(policy.allows_import("collections.abc"));
        assert!(!policy.allows_import("os"));
        assert!(!policy.allows_import("subprocess"));
        assert_eq!(
            policy.authorized_imports().iter().filter(|m| *m == "re").count(),
            1
        );
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.sandbox.max_operations = 42;
        let policy = SandboxPolicy::from_config(&config);
        assert_eq!(policy.max_operations, 42);
        assert!(policy.allows_import("paramiko"));
    }
}
