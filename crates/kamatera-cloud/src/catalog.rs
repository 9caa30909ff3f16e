//! Server offering catalog
//!
//! The catalog lists which CPU types, core counts, RAM sizes, disk sizes and
//! traffic packages each datacenter offers. Validation runs against a catalog
//! value and never against the network, so a catalog is built once (from the
//! built-in table or from the remote capabilities endpoint) and shared.

use crate::wire::WireCapabilities;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const COMMON_CORES: &[u32] = &[1, 2, 4, 6, 8, 12, 16, 20, 24, 28, 32];
const DEDICATED_CORES: &[u32] = &[2, 4, 6, 8, 12, 16, 20, 24, 28, 32];
const COMMON_RAM_MB: &[u32] = &[
    256, 512, 1024, 2048, 3072, 4096, 6144, 8192, 10240, 12288, 16384, 24576, 32768, 49152,
    65536, 98304, 131072,
];
const DEDICATED_RAM_MB: &[u32] = &[
    512, 1024, 2048, 3072, 4096, 6144, 8192, 10240, 12288, 16384, 24576, 32768, 49152, 65536,
    98304, 131072, 196608, 262144,
];
const DISK_SIZES_GB: &[u32] = &[
    5, 10, 15, 20, 30, 40, 50, 60, 80, 100, 150, 200, 250, 300, 350, 400, 450, 500, 600, 700,
    800, 900, 1000, 1500, 2000, 3000, 4000,
];
const DATACENTERS: &[&str] = &[
    "EU", "EU-FR", "EU-LO", "EU-ST", "US", "US-NY2", "US-SC", "US-TX", "CA-TR", "IL", "IL-PT",
    "IL-TA", "IL-RH", "AS",
];
const DEFAULT_TRAFFIC_PACKAGE: &str = "t5000";

/// CPU type offering with its permitted core counts and RAM sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTypeOptions {
    /// Single upper-case letter, e.g. `B`
    pub id: String,
    pub name: String,
    pub cores: Vec<u32>,
    pub ram_mb: Vec<u32>,
}

/// Offerings available in one datacenter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterOptions {
    pub cpu_types: Vec<CpuTypeOptions>,
    pub disk_sizes_gb: Vec<u32>,

    /// Package id -> description
    pub traffic_packages: BTreeMap<String, String>,

    pub default_traffic_package: Option<String>,
}

impl DatacenterOptions {
    pub fn cpu_type(&self, id: &str) -> Option<&CpuTypeOptions> {
        self.cpu_types.iter().find(|c| c.id == id)
    }

    pub fn supports_cpu(&self, cpu_type: &str, cores: u32) -> bool {
        self.cpu_type(cpu_type)
            .is_some_and(|c| c.cores.contains(&cores))
    }

    pub fn supports_ram(&self, cpu_type: &str, ram_mb: u32) -> bool {
        self.cpu_type(cpu_type)
            .is_some_and(|c| c.ram_mb.contains(&ram_mb))
    }

    pub fn supports_disk(&self, size_gb: u32) -> bool {
        self.disk_sizes_gb.contains(&size_gb)
    }

    pub fn supports_traffic_package(&self, package: &str) -> bool {
        self.traffic_packages.contains_key(package)
    }

    /// Human-readable listing of the offerings, used in lookup failures
    pub fn describe(&self) -> String {
        let mut lines: Vec<String> = self
            .cpu_types
            .iter()
            .map(|c| {
                format!(
                    "cpu_type=\"{}\" ({})\ncpu_cores={:?}\nram_mb={:?}",
                    c.id, c.name, c.cores, c.ram_mb
                )
            })
            .collect();
        lines.extend(
            self.traffic_packages
                .iter()
                .map(|(id, desc)| format!("monthly_traffic_package=\"{id}\" ({desc})")),
        );
        lines.push(format!("disk_sizes_gb={:?}", self.disk_sizes_gb));
        lines.join("\n\n")
    }
}

/// Catalog of offerings keyed by datacenter id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCatalog {
    datacenters: BTreeMap<String, DatacenterOptions>,
}

impl ServerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of the public offerings of the control plane
    pub fn builtin() -> Self {
        let cpu_types = vec![
            cpu_type("A", "Type A - Availability", COMMON_CORES, COMMON_RAM_MB),
            cpu_type("B", "Type B - General Purpose", COMMON_CORES, COMMON_RAM_MB),
            cpu_type("T", "Type T - Burstable", COMMON_CORES, COMMON_RAM_MB),
            cpu_type("D", "Type D - Dedicated", DEDICATED_CORES, DEDICATED_RAM_MB),
        ];
        let traffic_packages: BTreeMap<String, String> = [
            ("t5000", "5000GB/month on 10Gbit/sec port"),
            ("t20000", "20000GB/month on 10Gbit/sec port"),
            ("b50", "50Mbit/sec unlimited traffic"),
            ("b100", "100Mbit/sec unlimited traffic"),
        ]
        .into_iter()
        .map(|(id, desc)| (id.to_string(), desc.to_string()))
        .collect();

        let options = DatacenterOptions {
            cpu_types,
            disk_sizes_gb: DISK_SIZES_GB.to_vec(),
            traffic_packages,
            default_traffic_package: Some(DEFAULT_TRAFFIC_PACKAGE.to_string()),
        };

        let mut catalog = Self::new();
        for dc in DATACENTERS {
            catalog.insert(*dc, options.clone());
        }
        catalog
    }

    /// Build a single-datacenter catalog entry from the capabilities endpoint
    pub fn from_capabilities(datacenter: impl Into<String>, caps: &WireCapabilities) -> Self {
        let mut catalog = Self::new();
        catalog.merge_capabilities(datacenter, caps);
        catalog
    }

    /// Replace the entry of one datacenter with remote capabilities
    pub fn merge_capabilities(&mut self, datacenter: impl Into<String>, caps: &WireCapabilities) {
        let options = DatacenterOptions {
            cpu_types: caps
                .cpu_types
                .iter()
                .map(|c| CpuTypeOptions {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    cores: c.cpu_cores.iter().map(|v| *v as u32).collect(),
                    ram_mb: c.ram_mb.iter().map(|v| *v as u32).collect(),
                })
                .collect(),
            disk_sizes_gb: caps.disk_size_gb.iter().map(|v| *v as u32).collect(),
            traffic_packages: caps.monthly_traffic_package.clone(),
            default_traffic_package: caps
                .default_monthly_traffic_package
                .clone()
                .filter(|p| !p.is_empty()),
        };
        self.insert(datacenter, options);
    }

    pub fn insert(&mut self, datacenter: impl Into<String>, options: DatacenterOptions) {
        self.datacenters.insert(datacenter.into(), options);
    }

    pub fn datacenter(&self, id: &str) -> Option<&DatacenterOptions> {
        self.datacenters.get(id)
    }

    pub fn datacenter_ids(&self) -> impl Iterator<Item = &String> {
        self.datacenters.keys()
    }
}

fn cpu_type(id: &str, name: &str, cores: &[u32], ram_mb: &[u32]) -> CpuTypeOptions {
    CpuTypeOptions {
        id: id.to_string(),
        name: name.to_string(),
        cores: cores.to_vec(),
        ram_mb: ram_mb.to_vec(),
    }
}
