//! Desired-state and observed-state records for servers and networks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default CPU type when none is given
pub const DEFAULT_CPU_TYPE: &str = "B";
pub const DEFAULT_CPU_CORES: u32 = 2;
pub const DEFAULT_RAM_MB: u32 = 1024;
pub const DEFAULT_DISK_SIZE_GB: u32 = 10;

/// Network name that attaches a public interface
pub const WAN_NETWORK: &str = "wan";

/// Password value asking the control plane to generate one
pub const GENERATE_PASSWORD: &str = "__generate__";

/// Remote-assigned server identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote-assigned network (VLAN) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cost accounting mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    #[default]
    Hourly,
    Monthly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Hourly => "hourly",
            BillingCycle::Monthly => "monthly",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(BillingCycle::Hourly),
            "monthly" => Ok(BillingCycle::Monthly),
            other => Err(format!(
                "billing cycle must be either 'hourly' or 'monthly', got '{other}'"
            )),
        }
    }
}

/// Power status of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn from_flag(power_on: bool) -> Self {
        if power_on { PowerState::On } else { PowerState::Off }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, PowerState::On)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

/// Requested network interface of a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// `wan` or the full name of a private network
    pub name: String,

    /// Fixed IP, `None` for auto allocation
    #[serde(default)]
    pub ip: Option<String>,
}

impl NetworkAttachment {
    pub fn wan() -> Self {
        Self {
            name: WAN_NETWORK.to_string(),
            ip: None,
        }
    }

    pub fn private(full_name: impl Into<String>) -> Self {
        Self {
            name: full_name.into(),
            ip: None,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn is_wan(&self) -> bool {
        self.name == WAN_NETWORK
    }
}

/// Desired state of a compute instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeInstanceSpec {
    pub name: String,
    pub datacenter: String,
    pub cpu_type: String,
    pub cpu_cores: u32,
    pub ram_mb: u32,

    /// First entry is the boot disk
    pub disk_sizes_gb: Vec<u32>,

    pub image_id: String,
    pub billing_cycle: BillingCycle,

    /// Only meaningful with monthly billing; the datacenter default applies when unset
    pub monthly_traffic_package: Option<String>,

    pub power_on: bool,
    pub networks: Vec<NetworkAttachment>,
    pub daily_backup: bool,
    pub managed: bool,
    pub password: Option<String>,
    pub ssh_pubkey: Option<String>,
    pub startup_script: Option<String>,
}

impl ComputeInstanceSpec {
    pub fn new(
        name: impl Into<String>,
        datacenter: impl Into<String>,
        image_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            datacenter: datacenter.into(),
            cpu_type: DEFAULT_CPU_TYPE.to_string(),
            cpu_cores: DEFAULT_CPU_CORES,
            ram_mb: DEFAULT_RAM_MB,
            disk_sizes_gb: vec![DEFAULT_DISK_SIZE_GB],
            image_id: image_id.into(),
            billing_cycle: BillingCycle::Hourly,
            monthly_traffic_package: None,
            power_on: true,
            networks: vec![NetworkAttachment::wan()],
            daily_backup: false,
            managed: false,
            password: None,
            ssh_pubkey: None,
            startup_script: None,
        }
    }

    pub fn with_cpu(mut self, cpu_type: impl Into<String>, cores: u32) -> Self {
        self.cpu_type = cpu_type.into();
        self.cpu_cores = cores;
        self
    }

    pub fn with_ram_mb(mut self, ram_mb: u32) -> Self {
        self.ram_mb = ram_mb;
        self
    }

    pub fn with_disks(mut self, disk_sizes_gb: Vec<u32>) -> Self {
        self.disk_sizes_gb = disk_sizes_gb;
        self
    }

    pub fn with_billing(mut self, cycle: BillingCycle) -> Self {
        self.billing_cycle = cycle;
        self
    }

    pub fn with_traffic_package(mut self, package: impl Into<String>) -> Self {
        self.monthly_traffic_package = Some(package.into());
        self
    }

    pub fn with_power_on(mut self, power_on: bool) -> Self {
        self.power_on = power_on;
        self
    }

    pub fn with_networks(mut self, networks: Vec<NetworkAttachment>) -> Self {
        self.networks = networks;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// CPU label as reported by the control plane, e.g. `2B`
    pub fn cpu_label(&self) -> String {
        format!("{}{}", self.cpu_cores, self.cpu_type)
    }

    pub fn desired_power(&self) -> PowerState {
        PowerState::from_flag(self.power_on)
    }

    pub fn boot_disk_gb(&self) -> Option<u32> {
        self.disk_sizes_gb.first().copied()
    }
}

/// A network interface as observed on a running server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedNetwork {
    /// Full network name, e.g. `wan-il-pt`
    pub network: String,
    pub ips: Vec<String>,

    /// Traffic allowance tier applying to this interface (public interfaces only)
    pub traffic_class: Option<String>,
}

impl AttachedNetwork {
    pub fn is_public(&self) -> bool {
        self.network.starts_with("wan-")
    }
}

/// Prices quoted by the control plane
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prices {
    pub monthly_on: Option<String>,
    pub hourly_on: Option<String>,
    pub hourly_off: Option<String>,
}

/// Observed state of a compute instance, produced from a live query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeInstanceState {
    pub id: InstanceId,
    pub name: String,
    pub datacenter: String,
    pub cpu_label: String,
    pub cpu_type: String,
    pub cpu_cores: u32,
    pub ram_mb: u32,
    pub disk_sizes_gb: Vec<u32>,
    pub power: PowerState,
    pub networks: Vec<AttachedNetwork>,
    pub billing_cycle: BillingCycle,
    pub traffic_package: Option<String>,
    pub managed: bool,
    pub daily_backup: bool,
    pub prices: Prices,
}

impl ComputeInstanceState {
    pub fn public_ips(&self) -> Vec<String> {
        self.networks
            .iter()
            .filter(|n| n.is_public())
            .flat_map(|n| n.ips.iter().cloned())
            .collect()
    }

    pub fn private_ips(&self) -> Vec<String> {
        self.networks
            .iter()
            .filter(|n| !n.is_public())
            .flat_map(|n| n.ips.iter().cloned())
            .collect()
    }
}

/// One IP subnet of a private network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub ip: String,
    pub bit: u8,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns1: String,
    #[serde(default)]
    pub dns2: String,

    /// Identifies the subnet across updates; unique within a network
    #[serde(default)]
    pub description: String,
}

impl SubnetSpec {
    pub fn new(ip: impl Into<String>, bit: u8) -> Self {
        Self {
            ip: ip.into(),
            bit,
            gateway: String::new(),
            dns1: String::new(),
            dns2: String::new(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// Attributes that can be edited in place
    pub fn differs_from(&self, other: &SubnetSpec) -> bool {
        self.ip != other.ip
            || self.bit != other.bit
            || self.gateway != other.gateway
            || self.dns1 != other.dns1
            || self.dns2 != other.dns2
    }
}

/// Desired state of a private network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub datacenter: String,
    pub name: String,
    pub subnets: Vec<SubnetSpec>,
}

impl NetworkSpec {
    pub fn new(datacenter: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            datacenter: datacenter.into(),
            name: name.into(),
            subnets: Vec::new(),
        }
    }

    pub fn with_subnet(mut self, subnet: SubnetSpec) -> Self {
        self.subnets.push(subnet);
        self
    }
}

/// A subnet as observed on the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedSubnet {
    pub id: u64,
    pub subnet: SubnetSpec,
}

/// Observed state of a private network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub id: NetworkId,
    pub datacenter: String,

    /// Short name as given at creation
    pub name: String,

    /// Name used when attaching the network to a server
    pub full_name: String,

    /// Internal network identifier, needed for deletion
    pub network_id: u64,

    pub subnets: Vec<ObservedSubnet>,
}

impl NetworkState {
    pub fn subnet_by_description(&self, description: &str) -> Option<&ObservedSubnet> {
        self.subnets
            .iter()
            .find(|s| s.subnet.description == description)
    }
}
