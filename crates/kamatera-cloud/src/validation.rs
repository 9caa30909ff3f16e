//! Client-side validation
//!
//! Every check here is pure: it looks only at the desired-state record and a
//! [`ServerCatalog`] value, so invalid configurations are rejected before the
//! first remote round-trip.

use crate::catalog::ServerCatalog;
use crate::error::{ConfigIssue, NameViolation, ValidationError};
use crate::model::{BillingCycle, ComputeInstanceSpec, NetworkSpec};
use std::collections::HashSet;
use std::net::Ipv4Addr;

pub const NETWORK_NAME_ALLOWED: &str = "lowercase letters, digits, dashes (-) and dots (.)";
pub const NETWORK_NAME_MIN_LEN: usize = 1;
pub const NETWORK_NAME_MAX_LEN: usize = 20;

pub const SERVER_NAME_ALLOWED: &str = "letters, digits, dashes (-) and dots (.)";
pub const SERVER_NAME_MIN_LEN: usize = 4;
pub const SERVER_NAME_MAX_LEN: usize = 40;

pub const MAX_DISKS: usize = 4;
pub const MAX_NETWORKS: usize = 4;

/// Pre-flight validation against a catalog of offerings
pub trait Validate {
    fn validate(&self, catalog: &ServerCatalog) -> Result<(), ValidationError>;
}

impl Validate for ComputeInstanceSpec {
    fn validate(&self, catalog: &ServerCatalog) -> Result<(), ValidationError> {
        validate_server_name(&self.name)?;

        let issues = instance_issues(self, catalog);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InvalidConfiguration(issues))
        }
    }
}

impl Validate for NetworkSpec {
    fn validate(&self, _catalog: &ServerCatalog) -> Result<(), ValidationError> {
        validate_network_name(&self.name)?;

        let issues = subnet_issues(self);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InvalidConfiguration(issues))
        }
    }
}

/// Network names: `[a-z0-9-.]`, 1 to 20 characters
pub fn validate_network_name(name: &str) -> Result<(), ValidationError> {
    check_name(
        name,
        |c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.',
        NETWORK_NAME_ALLOWED,
        NETWORK_NAME_MIN_LEN,
        NETWORK_NAME_MAX_LEN,
    )
}

/// Server names: `[a-zA-Z0-9-.]`, 4 to 40 characters
pub fn validate_server_name(name: &str) -> Result<(), ValidationError> {
    check_name(
        name,
        |c| c.is_ascii_alphanumeric() || c == '-' || c == '.',
        SERVER_NAME_ALLOWED,
        SERVER_NAME_MIN_LEN,
        SERVER_NAME_MAX_LEN,
    )
}

fn check_name(
    name: &str,
    allowed: impl Fn(char) -> bool,
    allowed_desc: &'static str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    if !name.chars().all(allowed) {
        return Err(ValidationError::InvalidName(NameViolation::Characters {
            allowed: allowed_desc,
        }));
    }
    let len = name.chars().count();
    if len < min || len > max {
        return Err(ValidationError::InvalidName(NameViolation::Length {
            min,
            max,
        }));
    }
    Ok(())
}

pub(crate) fn instance_issues(spec: &ComputeInstanceSpec, catalog: &ServerCatalog) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    let Some(dc) = catalog.datacenter(&spec.datacenter) else {
        issues.push(ConfigIssue::UnsupportedDatacenter(spec.datacenter.clone()));
        return issues;
    };

    if !dc.supports_cpu(&spec.cpu_type, spec.cpu_cores) {
        issues.push(ConfigIssue::UnsupportedCpu(spec.cpu_label()));
    }
    if !dc.supports_ram(&spec.cpu_type, spec.ram_mb) {
        issues.push(ConfigIssue::UnsupportedRam {
            cpu_type: spec.cpu_type.clone(),
            ram_mb: spec.ram_mb,
        });
    }

    if spec.disk_sizes_gb.is_empty() {
        issues.push(ConfigIssue::NoDisks);
    } else if spec.disk_sizes_gb.len() > MAX_DISKS {
        issues.push(ConfigIssue::TooManyDisks {
            count: spec.disk_sizes_gb.len(),
            max: MAX_DISKS,
        });
    }
    for size in &spec.disk_sizes_gb {
        if !dc.supports_disk(*size) {
            issues.push(ConfigIssue::UnsupportedDiskSize(*size));
        }
    }

    match (spec.billing_cycle, spec.monthly_traffic_package.as_deref()) {
        (BillingCycle::Monthly, Some(package)) if !dc.supports_traffic_package(package) => {
            issues.push(ConfigIssue::UnsupportedTrafficPackage {
                datacenter: spec.datacenter.clone(),
                package: package.to_string(),
            });
        }
        (BillingCycle::Hourly, Some(_)) => {
            issues.push(ConfigIssue::TrafficPackageWithHourlyBilling);
        }
        _ => {}
    }

    if spec.networks.len() > MAX_NETWORKS {
        issues.push(ConfigIssue::TooManyNetworks {
            count: spec.networks.len(),
            max: MAX_NETWORKS,
        });
    }

    issues
}

fn subnet_issues(spec: &NetworkSpec) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    if spec.subnets.is_empty() {
        issues.push(ConfigIssue::NoSubnets);
    }

    let mut descriptions = HashSet::new();
    for subnet in &spec.subnets {
        if subnet.ip.parse::<Ipv4Addr>().is_err() || subnet.bit == 0 || subnet.bit > 32 {
            issues.push(ConfigIssue::InvalidSubnet {
                ip: subnet.ip.clone(),
                bit: subnet.bit,
            });
        }
        if !descriptions.insert(subnet.description.as_str()) {
            issues.push(ConfigIssue::DuplicateSubnetDescription(
                subnet.description.clone(),
            ));
        }
    }

    issues
}
