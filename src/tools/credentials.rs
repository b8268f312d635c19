//! Device credential store
//!
//! Backed by a JSON file mapping host to credentials:
//!
//! ```json
//! { "10.0.0.1": { "username": "admin", "password": "secret" } }
//! ```
//!
//! The file is read on every lookup so edits take effect without a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::{NetpilotError, Result};

/// Username and password for one device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Host -> credentials lookup over a hosts file
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, Credentials>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            NetpilotError::Credential(format!(
                "cannot read hosts file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            NetpilotError::Credential(format!(
                "invalid hosts file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Credentials for `host`
    pub async fn lookup(&self, host: &str) -> Result<Credentials> {
        let mut hosts = self.load().await?;
        hosts.remove(host).ok_or_else(|| {
            NetpilotError::Credential(format!(
                "no credentials for host '{}' in {}",
                host,
                self.path.display()
            ))
        })
    }

    /// Hosts listed in the file, sorted
    pub async fn hosts(&self) -> Result<Vec<String>> {
        let mut hosts: Vec<String> = self.load().await?.into_keys().collect();
        hosts.sort();
        Ok(hosts)
    }
}
