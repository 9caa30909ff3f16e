//! Remote client abstraction
//!
//! The engine talks to the control plane only through [`RemoteClient`]. The
//! HTTPS implementation lives in the `kamatera-api` crate; tests substitute an
//! in-memory one.

use crate::action::ServerOperation;
use crate::error::RemoteError;
use crate::model::{ComputeInstanceState, InstanceId, NetworkId, PowerState};
use crate::wire::{
    WireCapabilities, WireCreateNetwork, WireCreateServer, WireDatacenter, WireImage, WireNetwork,
    WireNetworkCreated, WireSubnet, WireSubnetWrite,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Identifier of an asynchronous command in the remote queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub String);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a queued command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Complete { log: Option<String> },
    Failed { log: Option<String> },
}

impl CommandStatus {
    /// Server name reported in a completion log (`Name: <name>` line)
    pub fn created_name(&self) -> Option<&str> {
        let CommandStatus::Complete { log: Some(log) } = self else {
            return None;
        };
        log.lines()
            .find_map(|line| line.trim().strip_prefix("Name: "))
            .map(str::trim)
    }
}

/// How to find a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceLookup {
    Id(InstanceId),

    /// Regular expression matched against server names
    NameFilter(String),
}

impl InstanceLookup {
    /// Filter matching exactly one name
    pub fn exact_name(name: &str) -> Self {
        InstanceLookup::NameFilter(format!("^{}$", regex_escape(name)))
    }
}

impl fmt::Display for InstanceLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceLookup::Id(id) => write!(f, "id={id}"),
            InstanceLookup::NameFilter(filter) => write!(f, "name~{filter}"),
        }
    }
}

fn regex_escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Result of a create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInstance {
    pub commands: Vec<CommandId>,

    /// Present when the control plane generated the password
    pub generated_password: Option<String>,

    /// Set when an earlier, interrupted create was found and adopted
    pub adopted: Option<InstanceId>,
}

/// Control-plane operations used by the reconciliation engine.
///
/// Implementations must be shareable across tasks; the engine never holds a
/// lock around a call. Transient failures are retried inside the
/// implementation and only surface as [`RemoteError::TransientFailure`] once
/// the retry budget is spent.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Submit a server creation. Must not create a second server with the
    /// same name when the call itself is retried.
    async fn create_instance(&self, request: &WireCreateServer) -> RemoteResult<CreatedInstance>;

    /// Servers matching the lookup; zero matches is [`RemoteError::NotFound`]
    async fn read_instance(&self, lookup: &InstanceLookup) -> RemoteResult<Vec<ComputeInstanceState>>;

    /// Apply one in-place operation (configure, disk, rename or password)
    async fn update_instance(
        &self,
        id: &InstanceId,
        operation: &ServerOperation,
    ) -> RemoteResult<CommandId>;

    async fn set_power(&self, id: &InstanceId, state: PowerState) -> RemoteResult<CommandId>;

    /// Forced termination
    async fn destroy_instance(&self, id: &InstanceId) -> RemoteResult<CommandId>;

    async fn command_status(&self, id: &CommandId) -> RemoteResult<CommandStatus>;

    async fn list_datacenters(&self) -> RemoteResult<Vec<WireDatacenter>>;

    async fn list_images(&self, datacenter: &str) -> RemoteResult<Vec<WireImage>>;

    async fn capabilities(&self, datacenter: &str) -> RemoteResult<WireCapabilities>;

    async fn create_network(&self, request: &WireCreateNetwork) -> RemoteResult<WireNetworkCreated>;

    async fn read_networks(&self, datacenter: &str) -> RemoteResult<Vec<WireNetwork>>;

    async fn list_subnets(&self, datacenter: &str, network: NetworkId) -> RemoteResult<Vec<WireSubnet>>;

    /// Returns the new subnet id
    async fn create_subnet(&self, request: &WireSubnetWrite) -> RemoteResult<u64>;

    async fn edit_subnet(&self, request: &WireSubnetWrite) -> RemoteResult<()>;

    async fn delete_subnet(&self, subnet_id: u64) -> RemoteResult<()>;

    async fn destroy_network(&self, datacenter: &str, network_id: u64) -> RemoteResult<()>;
}
