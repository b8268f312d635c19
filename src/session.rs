//! Session wiring
//!
//! Builds the tool registry, the optional search sub-agent and the manager
//! agent from configuration, and keeps the last run for inspection.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, AgentSettings, ManagedAgentBuilder, RunReport};
use crate::core::{Config, NetpilotError, Result};
use crate::inventory::{self, VersionFacts};
use crate::llm::{GenerateOptions, LLMProvider, OllamaClient};
use crate::sandbox::SandboxPolicy;
use crate::tools::{
    register_network_tools, CredentialStore, DeviceAccess, DeviceConnector, FileGrant,
    SshConnector, ToolRegistry, WebSearch,
};

/// Name of the manager agent
pub const MANAGER_NAME: &str = "netpilot";
/// Name the search sub-agent is registered under
pub const SEARCH_AGENT_NAME: &str = "search";

const SEARCH_DESCRIPTION: &str =
    "Runs web searches for you. Use it for documentation, release notes or error messages you cannot resolve from the devices.";

/// A configured manager agent and its collaborators
pub struct Session {
    config: Config,
    llm: Arc<dyn LLMProvider>,
    connector: Arc<dyn DeviceConnector>,
    access: DeviceAccess,
    agent: Agent,
    last_report: Option<RunReport>,
}

impl Session {
    /// Session over Ollama and the system SSH client
    pub fn new(config: Config) -> Result<Self> {
        let llm: Arc<dyn LLMProvider> = Arc::new(OllamaClient::from_config(&config)?);
        let connector: Arc<dyn DeviceConnector> =
            Arc::new(SshConnector::new(config.devices.ssh_port).with_connect_timeout(
                Duration::from_secs(config.devices.connect_timeout_secs),
            ));
        Self::with_backends(config, llm, connector)
    }

    /// Session over explicit backends
    pub fn with_backends(
        config: Config,
        llm: Arc<dyn LLMProvider>,
        connector: Arc<dyn DeviceConnector>,
    ) -> Result<Self> {
        let access = device_access(&config, &connector);
        let agent = build_agent(&config, &llm, &access)?;
        Ok(Self {
            config,
            llm,
            connector,
            access,
            agent,
            last_report: None,
        })
    }

    /// Check that the backend serves the configured model
    pub async fn initialize(&self) -> Result<()> {
        let model = &self.config.model.name;
        if !self.llm.is_model_available(model).await? {
            return Err(NetpilotError::ModelNotFound(model.clone()));
        }
        if !SshConnector::is_available().await {
            tracing::warn!("sshpass not found; device tools will fail until it is installed");
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Models the backend serves
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.llm.list_models().await
    }

    pub fn clear_report(&mut self) {
        self.last_report = None;
    }

    /// Run one task and keep its report
    pub async fn run(&mut self, task: &str) -> &RunReport {
        let report = self.agent.run_detailed(task).await;
        self.last_report.insert(report)
    }

    /// Apply a config change and rebuild the agents
    pub fn reconfigure(&mut self, change: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = self.config.clone();
        change(&mut config);
        let access = device_access(&config, &self.connector);
        self.agent = build_agent(&config, &self.llm, &access)?;
        self.access = access;
        self.config = config;
        Ok(())
    }

    /// Read `show version` from `host` and have the model extract its facts
    pub async fn version_facts(&self, host: &str) -> Result<VersionFacts> {
        let options = GenerateOptions {
            temperature: Some(self.config.model.temperature),
            num_ctx: Some(self.config.model.num_ctx),
            ..Default::default()
        };
        inventory::version_facts(
            self.llm.as_ref(),
            &self.config.model.name,
            options,
            &self.access,
            host,
        )
        .await
    }
}

fn device_access(config: &Config, connector: &Arc<dyn DeviceConnector>) -> DeviceAccess {
    DeviceAccess::new(
        Arc::clone(connector),
        Arc::new(CredentialStore::new(&config.devices.hosts_file)),
        config.devices.device_type.clone(),
    )
}

fn build_agent(config: &Config, llm: &Arc<dyn LLMProvider>, access: &DeviceAccess) -> Result<Agent> {
    let mut registry = ToolRegistry::new();
    register_network_tools(&mut registry, access.clone())?;

    if let Some(root) = &config.sandbox.file_root {
        FileGrant::new(root).register(&mut registry)?;
    }

    if config.search.enabled {
        let mut search_tools = ToolRegistry::new();
        WebSearch::new(&config.search.endpoint, config.search.max_results)?
            .register(&mut search_tools)?;
        ManagedAgentBuilder::new(SEARCH_AGENT_NAME, SEARCH_DESCRIPTION)
            .llm(Arc::clone(llm))
            .tools(Arc::new(search_tools))
            .policy(SandboxPolicy::from_config(config))
            .settings(AgentSettings::from_config(config))
            .max_steps(config.search.max_steps)
            .build()?
            .register(&mut registry)?;
    }

    tracing::debug!(tools = ?registry.names(), "tool registry built");
    Ok(Agent::new(
        MANAGER_NAME,
        Arc::clone(llm),
        Arc::new(registry),
        SandboxPolicy::from_config(config),
        AgentSettings::from_config(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Message, ToolDefinition};
    use crate::llm::{GenerateOptions, LLMResponse};
    use crate::tools::{DeviceSession, DeviceTarget};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl LLMProvider for Echo {
        async fn chat_with_tools(
            &self,
            _model: &str,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _options: Option<GenerateOptions>,
        ) -> Result<LLMResponse> {
            Ok(LLMResponse::text("Final Answer: ok"))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec!["qwen2.5:latest".into()])
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct NoDevices;

    #[async_trait]
    impl DeviceConnector for NoDevices {
        async fn connect(&self, _target: &DeviceTarget) -> Result<Box<dyn DeviceSession>> {
            Err(NetpilotError::device("offline"))
        }
    }

    fn session(config: Config) -> Session {
        Session::with_backends(config, Arc::new(Echo), Arc::new(NoDevices)).unwrap()
    }

    #[test]
    fn test_registry_follows_config() {
        let mut config = Config::default();
        config.search.enabled = false;
        config.sandbox.file_root = None;
        let mut s = session(config);
        let names = s.agent().registry().names();
        assert!(names.contains(&"run_ios_show_command_on_device".to_string()));
        assert!(!names.contains(&"read_file".to_string()));
        assert!(!names.contains(&SEARCH_AGENT_NAME.to_string()));

        s.reconfigure(|c| {
            c.search.enabled = true;
            c.sandbox.file_root = Some("/tmp".into());
        })
        .unwrap();
        let names = s.agent().registry().names();
        assert!(names.contains(&"read_file".to_string()));
        assert!(names.contains(&SEARCH_AGENT_NAME.to_string()));
        assert!(!names.contains(&"web_search".to_string()));
    }

    #[tokio::test]
    async fn test_run_keeps_report() {
        let mut s = session(Config::default());
        assert!(s.last_report().is_none());
        let report = s.run("say ok").await;
        assert_eq!(report.outcome.answer(), Some("ok"));
        assert!(s.last_report().is_some());
    }

    #[tokio::test]
    async fn test_version_facts_surfaces_device_errors() {
        let mut hosts = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut hosts, br#"{"r1": {"username": "u", "password": "p"}}"#)
            .unwrap();
        let mut config = Config::default();
        config.devices.hosts_file = hosts.path().to_path_buf();
        let err = session(config).version_facts("r1").await.unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[tokio::test]
    async fn test_initialize_checks_model() {
        let mut config = Config::default();
        config.model.name = "llama3".into();
        let err = session(config).initialize().await.unwrap_err();
        assert!(matches!(err, NetpilotError::ModelNotFound(_)));
    }
}
