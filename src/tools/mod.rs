//! Tools module - Tool implementations for the agent
//!
//! Contains the tool registry, the network device tools and their
//! collaborators, web search, and the optional file grant.

pub mod credentials;
pub mod device;
pub mod files;
pub mod network;
pub mod registry;
pub mod search;

pub use credentials::{CredentialStore, Credentials};
pub use device::{DeviceConnector, DeviceSession, DeviceTarget, SshConnector};
pub use files::FileGrant;
pub use network::{register_network_tools, DeviceAccess};
pub use registry::{optional_str, required_str, FnTool, ToolArgs, ToolHandler, ToolRegistry};
pub use search::WebSearch;
