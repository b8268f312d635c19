//! Confined file access
//!
//! `read_file` and `write_file` are only registered when a root directory
//! is configured. Paths are resolved lexically against that root and any
//! path that would leave it is refused.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::core::{NetpilotError, ParamType, Result, ToolSpec};
use crate::tools::registry::{required_str, FnTool, ToolRegistry};

/// File access grant rooted at one directory
#[derive(Debug, Clone)]
pub struct FileGrant {
    root: PathBuf,
}

impl FileGrant {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a user path to a location under the root
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut relative = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => relative = PathBuf::new(),
                Component::ParentDir => {
                    if !relative.pop() {
                        return Err(NetpilotError::tool(format!(
                            "path '{}' escapes the file root",
                            path
                        )));
                    }
                }
            }
        }
        if relative.as_os_str().is_empty() {
            return Err(NetpilotError::tool(format!("path '{}' names no file", path)));
        }
        Ok(self.root.join(relative))
    }

    pub async fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| NetpilotError::tool(format!("cannot read '{}': {}", path, e)))
    }

    /// Write `content`, creating parent directories, and return bytes written
    pub async fn write(&self, path: &str, content: &str) -> Result<usize> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| NetpilotError::tool(format!("cannot write '{}': {}", path, e)))?;
        Ok(content.len())
    }

    /// Register `read_file` and `write_file`
    pub fn register(self, registry: &mut ToolRegistry) -> Result<()> {
        let grant = Arc::new(self);

        let reader = Arc::clone(&grant);
        registry.register(
            ToolSpec::new(
                "read_file",
                "Reads a text file under the granted directory and returns its content.",
            )
            .param("path", ParamType::String, "Path relative to the granted directory"),
            Arc::new(FnTool::new(&["path"], move |args| {
                let grant = Arc::clone(&reader);
                async move {
                    let content = grant.read(required_str(&args, "path")?).await?;
                    Ok::<_, NetpilotError>(Value::String(content))
                }
            })),
        )?;

        registry.register(
            ToolSpec::new(
                "write_file",
                "Writes text to a file under the granted directory, replacing it if it exists.",
            )
            .param("path", ParamType::String, "Path relative to the granted directory")
            .param("content", ParamType::String, "Text to write"),
            Arc::new(FnTool::new(&["path", "content"], move |args| {
                let grant = Arc::clone(&grant);
                async move {
                    let path = required_str(&args, "path")?;
                    let written = grant.write(path, required_str(&args, "content")?).await?;
                    Ok::<_, NetpilotError>(Value::String(format!(
                        "Wrote {} bytes to {}",
                        written, path
                    )))
                }
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_confines_to_root() {
        let grant = FileGrant::new("/srv/netpilot");
        assert_eq!(
            grant.resolve("configs/r1.txt").unwrap(),
            PathBuf::from("/srv/netpilot/configs/r1.txt")
        );
        assert_eq!(
            grant.resolve("/etc/passwd").unwrap(),
            PathBuf::from("/srv/netpilot/etc/passwd")
        );
        assert_eq!(
            grant.resolve("a/../b.txt").unwrap(),
            PathBuf::from("/srv/netpilot/b.txt")
        );
        tokio_test::assert_err!(grant.resolve("../secret"));
        tokio_test::assert_err!(grant.resolve("a/../../secret"));
        assert!(grant.resolve(".").is_err());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let grant = FileGrant::new(dir.path());
        assert_eq!(grant.write("backups/r1.cfg", "hostname r1").await.unwrap(), 11);
        assert_eq!(grant.read("backups/r1.cfg").await.unwrap(), "hostname r1");
        tokio_test::assert_err!(grant.read("missing.cfg").await);
    }

    #[tokio::test]
    async fn test_registered_tools() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        FileGrant::new(dir.path()).register(&mut registry).unwrap();
        assert!(registry.contains("read_file"));
        assert!(registry.contains("write_file"));

        let call = crate::core::ToolCall::new(
            "write_file",
            serde_json::json!({"path": "x.txt", "content": "abc"}),
        );
        let (args, _, handler) = registry.bind(&call).unwrap();
        let out = handler.call(args).await.unwrap();
        assert_eq!(out, Value::String("Wrote 3 bytes to x.txt".into()));
    }
}
