//! Wire representation of the Kamatera control-plane API
//!
//! Field names follow the JSON bodies of the API exactly; conversion to and
//! from the domain model lives in [`crate::mapper`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============ Servers ============

/// Body of `POST service/server`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCreateServer {
    pub name: String,
    pub password: String,
    #[serde(rename = "passwordValidate")]
    pub password_validate: String,
    #[serde(rename = "ssh-key")]
    pub ssh_key: String,
    pub datacenter: String,
    pub image: String,

    /// CPU label, e.g. `2B`
    pub cpu: String,
    pub ram: u32,

    /// Space separated `size=<gb>` entries
    pub disk: String,

    /// `yes` or `no`
    pub dailybackup: String,
    pub managed: String,

    /// Space separated `name=<net>,ip=<ip|auto>` entries
    pub network: String,
    pub quantity: String,
    pub billingcycle: String,
    pub monthlypackage: String,
    pub poweronaftercreate: String,
    #[serde(rename = "script-file")]
    pub script_file: String,
}

/// Response of `POST service/server`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireCreateResponse {
    Commands(Vec<String>),
    Generated {
        password: String,
        #[serde(rename = "commandIds")]
        command_ids: Vec<String>,
    },
}

impl WireCreateResponse {
    pub fn command_ids(&self) -> &[String] {
        match self {
            WireCreateResponse::Commands(ids) => ids,
            WireCreateResponse::Generated { command_ids, .. } => command_ids,
        }
    }

    pub fn generated_password(&self) -> Option<&str> {
        match self {
            WireCreateResponse::Commands(_) => None,
            WireCreateResponse::Generated { password, .. } => Some(password),
        }
    }
}

/// Body of `POST service/server/info`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WireServerLookup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name filter; the API treats it as a regular expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One network interface in a server info response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireServerNetwork {
    pub network: String,
    #[serde(default)]
    pub ips: Vec<String>,
}

/// One element of the `service/server/info` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireServer {
    pub id: String,
    pub name: String,
    pub datacenter: String,
    pub cpu: String,
    pub ram: f64,
    #[serde(rename = "diskSizes", default)]
    pub disk_sizes: Vec<f64>,

    /// `on` or `off`
    pub power: String,
    #[serde(default)]
    pub networks: Vec<WireServerNetwork>,
    #[serde(default)]
    pub billing: String,
    #[serde(default)]
    pub traffic: String,

    /// `0` or `1`
    #[serde(default)]
    pub managed: String,
    #[serde(default)]
    pub backup: String,
    #[serde(rename = "priceMonthlyOn", default)]
    pub price_monthly_on: Option<String>,
    #[serde(rename = "priceHourlyOn", default)]
    pub price_hourly_on: Option<String>,
    #[serde(rename = "priceHourlyOff", default)]
    pub price_hourly_off: Option<String>,
}

/// Body of `POST server/configure`; unset fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireConfigure {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dailybackup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billingcycle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthlypackage: Option<String>,
}

/// Body of `POST server/disk`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireDiskChange {
    pub id: String,

    /// New disk size, e.g. `20gb`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add: Option<String>,

    /// Index of the disk to resize
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Body of `POST service/server/{poweron,poweroff,terminate}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePowerOperation {
    pub id: String,
    pub force: bool,
}

/// Body of `POST service/server/rename`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRename {
    pub id: String,
    #[serde(rename = "new-name")]
    pub new_name: String,
}

/// Body of `POST service/server/password`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePasswordChange {
    pub id: String,
    pub password: String,
}

/// One element of the `service/queue` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCommand {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

// ============ Lookups ============

/// One element of `service/server?datacenter=1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDatacenter {
    pub id: String,

    /// City, e.g. `Petach Tikva`
    #[serde(rename = "subCategory")]
    pub sub_category: String,

    /// Country, e.g. `Israel`
    pub name: String,
}

/// One element of `service/server?images=1&datacenter=<dc>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireImage {
    pub id: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCpuType {
    pub id: String,
    pub name: String,
    #[serde(rename = "cpuCores")]
    pub cpu_cores: Vec<f64>,
    #[serde(rename = "ramMB")]
    pub ram_mb: Vec<f64>,
}

/// Response of `service/server?capabilities=1&datacenter=<dc>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCapabilities {
    #[serde(rename = "cpuTypes")]
    pub cpu_types: Vec<WireCpuType>,
    #[serde(rename = "monthlyTrafficPackage", default)]
    pub monthly_traffic_package: BTreeMap<String, String>,
    #[serde(rename = "diskSizeGB", default)]
    pub disk_size_gb: Vec<f64>,
    #[serde(rename = "defaultMonthlyTrafficPackage", default)]
    pub default_monthly_traffic_package: Option<String>,
}

// ============ Networks ============

/// Body of `POST service/network/create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCreateNetwork {
    pub datacenter: String,
    pub name: String,
    #[serde(rename = "subnetIp")]
    pub subnet_ip: String,
    #[serde(rename = "subnetBit")]
    pub subnet_bit: u8,
    pub gateway: String,
    pub dns1: String,
    pub dns2: String,
    #[serde(rename = "subnetDescription")]
    pub subnet_description: String,
}

/// Identifiers embedded (as a JSON string under `res`) in network/subnet creation responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireNetworkCreated {
    #[serde(rename = "networkId", default)]
    pub network_id: Option<u64>,
    #[serde(rename = "subnetId")]
    pub subnet_id: u64,
}

/// Envelope of creation responses: `{"res": "<json>"}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireResEnvelope {
    pub res: String,
}

/// One element of `service/networks?datacenter=<dc>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireNetwork {
    #[serde(rename = "vlanId")]
    pub vlan_id: u64,
    #[serde(default)]
    pub ids: Vec<u64>,
    #[serde(default)]
    pub names: Vec<String>,
}

/// One element of `service/network/subnets?datacenter=<dc>&vlanId=<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSubnet {
    #[serde(rename = "subnetId")]
    pub subnet_id: u64,
    #[serde(rename = "subnetIp")]
    pub subnet_ip: String,
    #[serde(rename = "subnetBit")]
    pub subnet_bit: u8,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns1: String,
    #[serde(default)]
    pub dns2: String,
    #[serde(rename = "subnetDescription", default)]
    pub subnet_description: String,
}

/// Body of `POST service/network/subnet/{create,edit}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSubnetWrite {
    pub datacenter: String,
    #[serde(rename = "vlanId")]
    pub vlan_id: String,

    /// Only for edits
    #[serde(rename = "subnetId", skip_serializing_if = "Option::is_none", default)]
    pub subnet_id: Option<u64>,
    #[serde(rename = "subnetIp")]
    pub subnet_ip: String,
    #[serde(rename = "subnetBit")]
    pub subnet_bit: u8,
    pub gateway: String,
    pub dns1: String,
    pub dns2: String,
    #[serde(rename = "subnetDescription")]
    pub subnet_description: String,
}

/// Body of `POST service/network/subnet/delete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDeleteSubnet {
    #[serde(rename = "subnetId")]
    pub subnet_id: u64,
}

/// Body of `POST service/network/delete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDeleteNetwork {
    pub datacenter: String,
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_response_variants() {
        let plain: WireCreateResponse = serde_json::from_value(json!(["123"])).unwrap();
        assert_eq!(plain.command_ids(), ["123".to_string()]);
        assert_eq!(plain.generated_password(), None);

        let generated: WireCreateResponse =
            serde_json::from_value(json!({"password": "s3cret", "commandIds": ["456"]})).unwrap();
        assert_eq!(generated.command_ids(), ["456".to_string()]);
        assert_eq!(generated.generated_password(), Some("s3cret"));
    }

    #[test]
    fn test_server_lookup_serializes_one_key() {
        let body = serde_json::to_value(WireServerLookup {
            id: None,
            name: Some("web.*".into()),
        })
        .unwrap();
        assert_eq!(body, json!({"name": "web.*"}));
    }

    #[test]
    fn test_server_info_parses_api_shape() {
        let server: WireServer = serde_json::from_value(json!({
            "id": "a1b2c3",
            "name": "terraformtest",
            "datacenter": "IL-PT",
            "cpu": "2B",
            "ram": 2048,
            "diskSizes": [15, 20, 30],
            "power": "on",
            "networks": [{"network": "wan-il-pt", "ips": ["203.0.113.5"]}],
            "billing": "monthly",
            "traffic": "t5000",
            "managed": "0",
            "backup": "0"
        }))
        .unwrap();
        assert_eq!(server.disk_sizes, vec![15.0, 20.0, 30.0]);
        assert_eq!(server.networks[0].network, "wan-il-pt");
        assert_eq!(server.price_monthly_on, None);
    }

    #[test]
    fn test_configure_omits_unchanged_fields() {
        let body = serde_json::to_value(WireConfigure {
            id: "a1".into(),
            ram: Some(1024),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"id": "a1", "ram": 1024}));
    }
}
