//! Server options bundles
//!
//! A [`ServerOptionsSelector`] names a server shape (datacenter, CPU, RAM,
//! disks, billing). Resolving it against a [`ServerCatalog`] checks every
//! attribute and fills the datacenter default traffic package, producing a
//! [`ServerOptions`] bundle with a stable offering id. A bundle is one of the
//! two equivalent ways to describe a server shape; the other is setting the
//! attributes on [`ComputeInstanceSpec`] directly.

use crate::catalog::ServerCatalog;
use crate::error::{ConfigIssue, ValidationError};
use crate::model::{
    BillingCycle, ComputeInstanceSpec, DEFAULT_CPU_CORES, DEFAULT_CPU_TYPE, DEFAULT_DISK_SIZE_GB,
    DEFAULT_RAM_MB,
};
use crate::validation::instance_issues;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested server shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOptionsSelector {
    pub datacenter: String,
    pub cpu_type: String,
    pub cpu_cores: u32,
    pub ram_mb: u32,
    pub disk_sizes_gb: Vec<u32>,
    pub billing_cycle: BillingCycle,
    pub monthly_traffic_package: Option<String>,
}

impl ServerOptionsSelector {
    pub fn new(datacenter: impl Into<String>) -> Self {
        Self {
            datacenter: datacenter.into(),
            cpu_type: DEFAULT_CPU_TYPE.to_string(),
            cpu_cores: DEFAULT_CPU_CORES,
            ram_mb: DEFAULT_RAM_MB,
            disk_sizes_gb: vec![DEFAULT_DISK_SIZE_GB],
            billing_cycle: BillingCycle::Hourly,
            monthly_traffic_package: None,
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

    /// Check the shape against the catalog and fill the default traffic package.
    pub fn resolve(&self, catalog: &ServerCatalog) -> Result<ServerOptions, ValidationError> {
        let shaped = self.apply_shape(ComputeInstanceSpec::new("", self.datacenter.clone(), ""));
        let issues = instance_issues(&shaped, catalog);
        if !issues.is_empty() {
            return Err(ValidationError::InvalidConfiguration(issues));
        }

        let monthly_traffic_package = match self.billing_cycle {
            BillingCycle::Hourly => None,
            BillingCycle::Monthly => self.monthly_traffic_package.clone().or_else(|| {
                catalog
                    .datacenter(&self.datacenter)
                    .and_then(|dc| dc.default_traffic_package.clone())
            }),
        };

        Ok(ServerOptions {
            datacenter: self.datacenter.clone(),
            cpu_type: self.cpu_type.clone(),
            cpu_cores: self.cpu_cores,
            ram_mb: self.ram_mb,
            disk_sizes_gb: self.disk_sizes_gb.clone(),
            billing_cycle: self.billing_cycle,
            monthly_traffic_package,
        })
    }

    fn apply_shape(&self, mut spec: ComputeInstanceSpec) -> ComputeInstanceSpec {
        spec.cpu_type = self.cpu_type.clone();
        spec.cpu_cores = self.cpu_cores;
        spec.ram_mb = self.ram_mb;
        spec.disk_sizes_gb = self.disk_sizes_gb.clone();
        spec.billing_cycle = self.billing_cycle;
        spec.monthly_traffic_package = self.monthly_traffic_package.clone();
        spec
    }
}

/// Resolved, validated server shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOptions {
    pub datacenter: String,
    pub cpu_type: String,
    pub cpu_cores: u32,
    pub ram_mb: u32,
    pub disk_sizes_gb: Vec<u32>,
    pub billing_cycle: BillingCycle,
    pub monthly_traffic_package: Option<String>,
}

impl ServerOptions {
    /// Offering id: `<dc>,<cpu_type>,<cores>,<ram>,<billing>,<traffic>,<disk>...`
    pub fn id(&self) -> String {
        let mut parts = vec![
            self.datacenter.clone(),
            self.cpu_type.clone(),
            self.cpu_cores.to_string(),
            self.ram_mb.to_string(),
            self.billing_cycle.to_string(),
            self.monthly_traffic_package.clone().unwrap_or_default(),
        ];
        parts.extend(self.disk_sizes_gb.iter().map(|gb| format!("{gb}GB")));
        parts.join(",")
    }

    /// Parse an offering id produced by [`ServerOptions::id`]
    pub fn parse(id: &str) -> Result<Self, ValidationError> {
        let malformed =
            || ValidationError::InvalidConfiguration(vec![ConfigIssue::MalformedOptionsId(id.to_string())]);

        let parts: Vec<&str> = id.split(',').collect();
        if parts.len() < 7 {
            return Err(malformed());
        }

        let cpu_cores = parts[2].parse().map_err(|_| malformed())?;
        let ram_mb = parts[3].parse().map_err(|_| malformed())?;
        let billing_cycle = parts[4].parse().map_err(|_| malformed())?;
        let monthly_traffic_package = Some(parts[5].to_string()).filter(|p| !p.is_empty());
        let disk_sizes_gb = parts[6..]
            .iter()
            .map(|d| parse_disk_size(d).ok_or_else(malformed))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            datacenter: parts[0].to_string(),
            cpu_type: parts[1].to_string(),
            cpu_cores,
            ram_mb,
            disk_sizes_gb,
            billing_cycle,
            monthly_traffic_package,
        })
    }

    pub fn cpu_label(&self) -> String {
        format!("{}{}", self.cpu_cores, self.cpu_type)
    }
}

impl fmt::Display for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl ComputeInstanceSpec {
    /// Build a spec whose shape comes from a resolved bundle
    pub fn from_options(
        name: impl Into<String>,
        image_id: impl Into<String>,
        options: &ServerOptions,
    ) -> Self {
        let mut spec = Self::new(name, options.datacenter.clone(), image_id);
        spec.cpu_type = options.cpu_type.clone();
        spec.cpu_cores = options.cpu_cores;
        spec.ram_mb = options.ram_mb;
        spec.disk_sizes_gb = options.disk_sizes_gb.clone();
        spec.billing_cycle = options.billing_cycle;
        spec.monthly_traffic_package = options.monthly_traffic_package.clone();
        spec
    }
}

/// Parse `20`, `20GB` or `2TB` into gigabytes
pub fn parse_disk_size(value: &str) -> Option<u32> {
    let value = value.trim();
    let lower = value.to_ascii_lowercase();
    if let Some(tb) = lower.strip_suffix("tb") {
        return tb.trim().parse::<u32>().ok()?.checked_mul(1000);
    }
    lower
        .strip_suffix("gb")
        .unwrap_or(&lower)
        .trim()
        .parse()
        .ok()
}
