//! Device connectivity
//!
//! The tools only see [`DeviceConnector`] and [`DeviceSession`]. The shipped
//! implementation drives the system `ssh` client through `sshpass`, one exec
//! channel per command.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::{NetpilotError, Result};

/// Where and how to log in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub host: String,
    pub username: String,
    pub password: String,
    pub device_type: String,
}

/// An open session to a device
#[async_trait]
pub trait DeviceSession: Send {
    /// Run one command and return its output
    async fn send_command(&mut self, command: &str) -> Result<String>;
}

/// Opens device sessions
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceSession>>;
}

/// SSH via the system client
#[derive(Debug, Clone)]
pub struct SshConnector {
    port: u16,
    connect_timeout: Duration,
}

impl SshConnector {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check if sshpass is installed
    pub async fn is_available() -> bool {
        Command::new("sshpass")
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(22)
    }
}

#[async_trait]
impl DeviceConnector for SshConnector {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceSession>> {
        if !matches!(
            target.device_type.as_str(),
            "cisco_ios" | "cisco_xe" | "cisco_nxos" | "cisco_xr" | "linux" | "autodetect"
        ) {
            return Err(NetpilotError::device(format!(
                "unsupported device type '{}'",
                target.device_type
            )));
        }
        Ok(Box::new(SshSession {
            target: target.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout,
        }))
    }
}

struct SshSession {
    target: DeviceTarget,
    port: u16,
    connect_timeout: Duration,
}

#[async_trait]
impl DeviceSession for SshSession {
    async fn send_command(&mut self, command: &str) -> Result<String> {
        let mut cmd = Command::new("sshpass");
        cmd.arg("-e")
            .arg("ssh")
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-p")
            .arg(self.port.to_string())
            .arg(format!("{}@{}", self.target.username, self.target.host))
            .arg(command)
            .env("SSHPASS", &self.target.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(host = %self.target.host, command, "ssh exec");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NetpilotError::device("sshpass is not installed; it is required for password SSH logins")
            } else {
                NetpilotError::device(format!("failed to run ssh: {}", e))
            }
        })?;

        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            // sshpass reports a rejected password with exit status 5
            Some(5) => Err(NetpilotError::device(format!(
                "authentication failed for {}@{}",
                self.target.username, self.target.host
            ))),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(NetpilotError::device(format!(
                    "command on {} failed: {}",
                    self.target.host,
                    stderr.trim()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_device_type() {
        let target = DeviceTarget {
            host: "10.0.0.1".into(),
            username: "admin".into(),
            password: "secret".into(),
            device_type: "juniper_junos".into(),
        };
        let result = SshConnector::default().connect(&target).await;
        assert!(matches!(result, Err(NetpilotError::Device(m)) if m.contains("juniper_junos")));
    }
}
