//! Network device tools
//!
//! Thin adapters from tool calls to device sessions, the credential store
//! and the local `ping` binary.

use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;

use crate::core::{NetpilotError, ParamType, Result, ToolSpec};
use crate::tools::credentials::CredentialStore;
use crate::tools::device::{DeviceConnector, DeviceTarget};
use crate::tools::registry::{optional_str, required_str, ToolArgs, ToolHandler, ToolRegistry};

const SHOW_ONLY: &str =
    "Error! You are only allowed to run show commands. Try again and use a show command.";

static AGENT_PING_OK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"3 packets transmitted, 3 (packets )?received").expect("valid ping regex")
});

/// Shared state for tools that log into devices
#[derive(Clone)]
pub struct DeviceAccess {
    connector: Arc<dyn DeviceConnector>,
    credentials: Arc<CredentialStore>,
    default_device_type: String,
}

impl DeviceAccess {
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        credentials: Arc<CredentialStore>,
        default_device_type: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            credentials,
            default_device_type: default_device_type.into(),
        }
    }

    fn target(&self, args: &ToolArgs) -> Result<DeviceTarget> {
        Ok(DeviceTarget {
            host: required_str(args, "host")?.to_string(),
            username: required_str(args, "username")?.to_string(),
            password: required_str(args, "password")?.to_string(),
            device_type: optional_str(args, "device_type")
                .unwrap_or(&self.default_device_type)
                .to_string(),
        })
    }

    async fn run(&self, target: &DeviceTarget, command: &str) -> Result<String> {
        let mut session = self.connector.connect(target).await?;
        session.send_command(command).await
    }

    /// Run `command` on `host`, logging in with its stored credentials
    pub async fn run_trusted(&self, host: &str, command: &str) -> Result<String> {
        let creds = self.credentials.lookup(host).await?;
        let target = DeviceTarget {
            host: host.to_string(),
            username: creds.username,
            password: creds.password,
            device_type: self.default_device_type.clone(),
        };
        self.run(&target, command).await
    }
}

fn login_params(spec: ToolSpec) -> ToolSpec {
    spec.param("host", ParamType::String, "The IP address or hostname of the device")
        .param("username", ParamType::String, "The username for the device")
        .param("password", ParamType::String, "The password for the device")
        .optional_param(
            "device_type",
            ParamType::String,
            "The device type, e.g. cisco_ios (the default)",
        )
}

fn names(params: &[&str]) -> Vec<String> {
    params.iter().map(|p| p.to_string()).collect()
}

/// `get_username_password_for_device(ip_address)`
pub struct GetCredentials {
    credentials: Arc<CredentialStore>,
}

impl GetCredentials {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "get_username_password_for_device",
            "Returns the username and password separated by a comma for the given IP address or hostname.",
        )
        .param("ip_address", ParamType::String, "The IP address or hostname of the device")
    }
}

#[async_trait]
impl ToolHandler for GetCredentials {
    fn parameters(&self) -> Vec<String> {
        names(&["ip_address"])
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let creds = self.credentials.lookup(required_str(&args, "ip_address")?).await?;
        Ok(Value::String(format!("{},{}", creds.username, creds.password)))
    }
}

/// `run_ios_show_command_on_device(show_command, host, username, password, device_type)`
pub struct RunShowCommand {
    access: DeviceAccess,
}

impl RunShowCommand {
    pub fn spec() -> ToolSpec {
        login_params(
            ToolSpec::new(
                "run_ios_show_command_on_device",
                "Returns the output of the provided show command from the device with the given host, username, password, and device type.",
            )
            .param("show_command", ParamType::String, "The show command to run on the device"),
        )
    }
}

#[async_trait]
impl ToolHandler for RunShowCommand {
    fn parameters(&self) -> Vec<String> {
        names(&["show_command", "host", "username", "password", "device_type"])
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let command = required_str(&args, "show_command")?.trim();
        if !command.starts_with("sh") {
            return Ok(Value::String(SHOW_ONLY.to_string()));
        }
        let target = self.access.target(&args)?;
        Ok(Value::String(self.access.run(&target, command).await?))
    }
}

/// A tool that runs one fixed show command
pub struct FixedCommand {
    access: DeviceAccess,
    command: &'static str,
}

impl FixedCommand {
    /// `get_running_configuration`
    pub fn running_config(access: DeviceAccess) -> (ToolSpec, Self) {
        (
            login_params(ToolSpec::new(
                "get_running_configuration",
                "Returns the running configuration of the device with the given host, username, password, and device type.",
            )),
            Self {
                access,
                command: "show running-config",
            },
        )
    }

    /// `show_ip_route`
    pub fn ip_route(access: DeviceAccess) -> (ToolSpec, Self) {
        (
            login_params(ToolSpec::new(
                "show_ip_route",
                "Returns the routing table of the device with the given host, username, password, and device type.",
            )),
            Self {
                access,
                command: "show ip route",
            },
        )
    }
}

#[async_trait]
impl ToolHandler for FixedCommand {
    fn parameters(&self) -> Vec<String> {
        names(&["host", "username", "password", "device_type"])
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let target = self.access.target(&args)?;
        Ok(Value::String(self.access.run(&target, self.command).await?))
    }
}

/// `send_ping_from_device(ip_address_to_ping, host, username, password, device_type)`
pub struct PingFromDevice {
    access: DeviceAccess,
}

impl PingFromDevice {
    pub fn spec() -> ToolSpec {
        login_params(
            ToolSpec::new(
                "send_ping_from_device",
                "Pings the given IP address or hostname from the device and returns a success or fail message.",
            )
            .param("ip_address_to_ping", ParamType::String, "The IP address or hostname to ping"),
        )
    }
}

#[async_trait]
impl ToolHandler for PingFromDevice {
    fn parameters(&self) -> Vec<String> {
        names(&["ip_address_to_ping", "host", "username", "password", "device_type"])
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let destination = required_str(&args, "ip_address_to_ping")?;
        let target = self.access.target(&args)?;
        let output = self
            .access
            .run(&target, &format!("ping {}", destination))
            .await?;
        Ok(Value::String(ping_message(
            destination,
            output.contains("Success rate is 100 percent"),
        )))
    }
}

/// `get_last_logs(no_logs, host)`
pub struct GetLastLogs {
    access: DeviceAccess,
}

impl GetLastLogs {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "get_last_logs",
            "Returns the last log lines of the device with the given host. Credentials come from the hosts file.",
        )
        .param("no_logs", ParamType::Integer, "Number of log lines to return")
        .param("host", ParamType::String, "The IP address or hostname of the device")
    }
}

#[async_trait]
impl ToolHandler for GetLastLogs {
    fn parameters(&self) -> Vec<String> {
        names(&["no_logs", "host"])
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let count = args
            .get("no_logs")
            .and_then(Value::as_u64)
            .ok_or_else(|| NetpilotError::tool("no_logs must be a positive integer"))? as usize;
        let host = required_str(&args, "host")?;
        let output = self
            .access
            .run_trusted(host, &format!("show logging last {}", count))
            .await?;
        let lines: Vec<&str> = output.lines().collect();
        let start = lines.len().saturating_sub(count);
        Ok(Value::String(lines[start..].join("\n")))
    }
}

/// `send_ping_from_agent(ip_address)`
pub struct PingFromAgent;

impl PingFromAgent {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "send_ping_from_agent",
            "Pings the given IP address or hostname from the agent and returns a success or fail message.",
        )
        .param("ip_address", ParamType::String, "The IP address or hostname to ping")
    }
}

#[async_trait]
impl ToolHandler for PingFromAgent {
    fn parameters(&self) -> Vec<String> {
        names(&["ip_address"])
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let destination = required_str(&args, "ip_address")?;
        if destination.starts_with('-') {
            return Err(NetpilotError::tool(format!("invalid address '{}'", destination)));
        }

        let output = Command::new("ping")
            .args(["-c", "3", destination])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NetpilotError::tool(format!("failed to run ping: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(output = %stdout, "ping from agent");
        Ok(Value::String(ping_message(
            destination,
            AGENT_PING_OK.is_match(&stdout),
        )))
    }
}

fn ping_message(destination: &str, reachable: bool) -> String {
    if reachable {
        format!("Ping was successful: Host {} is reachable.", destination)
    } else {
        format!("Ping failed: Host {} is not reachable.", destination)
    }
}

/// Register every network tool
pub fn register_network_tools(registry: &mut ToolRegistry, access: DeviceAccess) -> Result<()> {
    registry.register(
        GetCredentials::spec(),
        Arc::new(GetCredentials {
            credentials: Arc::clone(&access.credentials),
        }),
    )?;
    registry.register(
        RunShowCommand::spec(),
        Arc::new(RunShowCommand {
            access: access.clone(),
        }),
    )?;
    let (spec, tool) = FixedCommand::running_config(access.clone());
    registry.register(spec, Arc::new(tool))?;
    let (spec, tool) = FixedCommand::ip_route(access.clone());
    registry.register(spec, Arc::new(tool))?;
    registry.register(
        PingFromDevice::spec(),
        Arc::new(PingFromDevice {
            access: access.clone(),
        }),
    )?;
    registry.register(GetLastLogs::spec(), Arc::new(GetLastLogs { access }))?;
    registry.register(PingFromAgent::spec(), Arc::new(PingFromAgent))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolCall;
    use crate::tools::device::DeviceSession;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Mutex;

    /// Records every command and answers from a canned map
    #[derive(Default)]
    struct FakeDevice {
        log: Arc<Mutex<Vec<(String, String)>>>,
    }

    struct FakeSession {
        host: String,
        log: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl DeviceSession for FakeSession {
        async fn send_command(&mut self, command: &str) -> Result<String> {
            self.log
                .lock()
                .unwrap()
                .push((self.host.clone(), command.to_string()));
            Ok(match command {
                "show ip route" => "S* 0.0.0.0/0 [1/0] via 10.0.0.254".to_string(),
                c if c.starts_with("ping") => "Success rate is 100 percent (5/5)".to_string(),
                c if c.starts_with("show logging") => "l1\nl2\nl3\nl4".to_string(),
                other => format!("output of {}", other),
            })
        }
    }

    #[async_trait]
    impl DeviceConnector for FakeDevice {
        async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceSession>> {
            if target.password != "cisco" {
                return Err(NetpilotError::device("authentication failed"));
            }
            Ok(Box::new(FakeSession {
                host: target.host.clone(),
                log: Arc::clone(&self.log),
            }))
        }
    }

    fn setup() -> (ToolRegistry, Arc<Mutex<Vec<(String, String)>>>, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"r1": {"username": "admin", "password": "cisco"}}"#)
            .unwrap();
        let device = FakeDevice::default();
        let log = Arc::clone(&device.log);
        let access = DeviceAccess::new(
            Arc::new(device),
            Arc::new(CredentialStore::new(file.path())),
            "cisco_ios",
        );
        let mut registry = ToolRegistry::new();
        register_network_tools(&mut registry, access).unwrap();
        (registry, log, file)
    }

    async fn call(registry: &ToolRegistry, name: &str, args: Value) -> Result<Value> {
        let (bound, _, handler) = registry.bind(&ToolCall::new(name, args))?;
        handler.call(bound).await
    }

    #[tokio::test]
    async fn test_credentials_tool() {
        let (registry, _, _file) = setup();
        let out = call(&registry, "get_username_password_for_device", json!({"ip_address": "r1"}))
            .await
            .unwrap();
        assert_eq!(out, json!("admin,cisco"));
    }

    #[tokio::test]
    async fn test_show_command_only() {
        let (registry, log, _file) = setup();
        let login = json!({"host": "r1", "username": "admin", "password": "cisco"});

        let mut args = login.clone();
        args["show_command"] = json!("reload");
        let out = call(&registry, "run_ios_show_command_on_device", args).await.unwrap();
        assert_eq!(out, json!(SHOW_ONLY));
        assert!(log.lock().unwrap().is_empty());

        let mut args = login;
        args["show_command"] = json!("sh version");
        let out = call(&registry, "run_ios_show_command_on_device", args).await.unwrap();
        assert_eq!(out, json!("output of sh version"));
    }

    #[tokio::test]
    async fn test_fixed_commands_and_ping() {
        let (registry, log, _file) = setup();
        let login = json!({"host": "r1", "username": "admin", "password": "cisco"});

        let out = call(&registry, "show_ip_route", login.clone()).await.unwrap();
        assert!(out.as_str().unwrap().contains("0.0.0.0/0"));

        let mut args = login;
        args["ip_address_to_ping"] = json!("8.8.8.8");
        let out = call(&registry, "send_ping_from_device", args).await.unwrap();
        assert_eq!(out, json!("Ping was successful: Host 8.8.8.8 is reachable."));

        let commands: Vec<String> = log.lock().unwrap().iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(commands, vec!["show ip route", "ping 8.8.8.8"]);
    }

    #[tokio::test]
    async fn test_last_logs_uses_hosts_file() {
        let (registry, _, _file) = setup();
        let out = call(&registry, "get_last_logs", json!({"no_logs": 2, "host": "r1"}))
            .await
            .unwrap();
        assert_eq!(out, json!("l3\nl4"));
    }

    #[tokio::test]
    async fn test_auth_failure_is_error() {
        let (registry, _, _file) = setup();
        let err = call(
            &registry,
            "get_running_configuration",
            json!({"host": "r1", "username": "admin", "password": "wrong"}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[test]
    fn test_agent_ping_output_match() {
        assert!(AGENT_PING_OK.is_match("3 packets transmitted, 3 received, 0% packet loss"));
        assert!(AGENT_PING_OK.is_match("3 packets transmitted, 3 packets received, 0.0% packet loss"));
        assert!(!AGENT_PING_OK.is_match("3 packets transmitted, 0 received, 100% packet loss"));
    }
}
