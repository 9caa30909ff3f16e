//! Error types for the reconciliation core
//!
//! The `Display` output of these errors is consumed by external drivers that
//! pattern-match on message substrings, so wording changes are breaking.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Client-side errors raised before any remote call is issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    InvalidName(NameViolation),

    #[error("invalid server configuration: {}", join_issues(.0))]
    InvalidConfiguration(Vec<ConfigIssue>),

    #[error("unsupported change to {field}: {reason}")]
    UnsupportedChange { field: String, reason: String },
}

/// Which naming rule a name broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameViolation {
    Characters { allowed: &'static str },
    Length { min: usize, max: usize },
}

impl fmt::Display for NameViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameViolation::Characters { allowed } => {
                write!(f, "invalid value for name (must contain only {allowed})")
            }
            NameViolation::Length { min, max } => {
                write!(f, "expected length of name to be in the range ({min} - {max})")
            }
        }
    }
}

/// A single rejected attribute of a server or network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    UnsupportedDatacenter(String),
    UnsupportedCpu(String),
    UnsupportedRam { cpu_type: String, ram_mb: u32 },
    UnsupportedDiskSize(u32),
    TooManyDisks { count: usize, max: usize },
    NoDisks,
    UnsupportedTrafficPackage { datacenter: String, package: String },
    TrafficPackageWithHourlyBilling,
    TooManyNetworks { count: usize, max: usize },
    NoSubnets,
    InvalidSubnet { ip: String, bit: u8 },
    DuplicateSubnetDescription(String),
    MalformedOptionsId(String),
    ConflictingImageSelectors,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::UnsupportedDatacenter(id) => write!(f, "unsupported datacenter ID: {id}"),
            ConfigIssue::UnsupportedCpu(cpu) => write!(f, "unsupported CPU: {cpu}"),
            ConfigIssue::UnsupportedRam { cpu_type, ram_mb } => {
                write!(f, "unsupported RAM size for CPU type {cpu_type}: {ram_mb} MB")
            }
            ConfigIssue::UnsupportedDiskSize(gb) => write!(f, "unsupported disk size: {gb} GB"),
            ConfigIssue::TooManyDisks { count, max } => {
                write!(f, "too many disks: {count} (at most {max})")
            }
            ConfigIssue::NoDisks => write!(f, "at least one disk is required"),
            ConfigIssue::UnsupportedTrafficPackage {
                datacenter,
                package,
            } => write!(
                f,
                "unsupported monthly traffic package for {datacenter} datacenter: {package}"
            ),
            ConfigIssue::TrafficPackageWithHourlyBilling => {
                write!(f, "for hourly billing cycle, monthly traffic package must not be set")
            }
            ConfigIssue::TooManyNetworks { count, max } => {
                write!(f, "too many networks: {count} (at most {max})")
            }
            ConfigIssue::NoSubnets => {
                write!(f, "when creating a new network, at least 1 subnet is required")
            }
            ConfigIssue::InvalidSubnet { ip, bit } => write!(f, "invalid subnet: {ip}/{bit}"),
            ConfigIssue::DuplicateSubnetDescription(desc) => {
                write!(f, "each subnet must have a unique description, duplicate: '{desc}'")
            }
            ConfigIssue::MalformedOptionsId(id) => write!(f, "malformed server options id: '{id}'"),
            ConfigIssue::ConflictingImageSelectors => write!(
                f,
                "when specifying private_image_name, other attributes must not be set"
            ),
        }
    }
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors observed after talking to the remote control plane.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{0}")]
    NotFound(String),

    #[error("reference not found: {kind} '{reference}'{}", available_suffix(.available))]
    ReferenceNotFound {
        kind: &'static str,
        reference: String,
        available: Vec<String>,
    },

    #[error("changing {field} requires recreation of {resource}")]
    ReplacementRequired { resource: String, field: String },

    #[error("timeout waiting for {operation} after {:?}", .waited)]
    ProvisioningTimeout { operation: String, waited: Duration },

    #[error("transient failure calling {endpoint} after {attempts} attempts: {message}")]
    TransientFailure {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("a {kind} named '{name}' already exists")]
    ConflictDuplicate { kind: &'static str, name: String },

    #[error("error response from Kamatera API ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("kamatera command failed: {0}")]
    CommandFailed(String),

    #[error("invalid response from Kamatera API: {0}")]
    InvalidResponse(String),
}

fn available_suffix(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(", available: {}", available.join(", "))
    }
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Umbrella error returned by the engine and lookups.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// True when the error was raised before any remote call.
    pub fn is_validation(&self) -> bool {
        matches!(self, CloudError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::Remote(e) if e.is_not_found())
    }

    /// True when a follow-up reconciliation may succeed without changing the input
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CloudError::Remote(
                RemoteError::TransientFailure { .. } | RemoteError::ProvisioningTimeout { .. }
            )
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_violation_messages() {
        let chars = ValidationError::InvalidName(NameViolation::Characters {
            allowed: "lowercase letters, digits, dashes (-) and dots (.)",
        });
        assert_eq!(
            chars.to_string(),
            "invalid value for name (must contain only lowercase letters, digits, dashes (-) and dots (.))"
        );

        let length = ValidationError::InvalidName(NameViolation::Length { min: 1, max: 20 });
        assert_eq!(
            length.to_string(),
            "expected length of name to be in the range (1 - 20)"
        );
    }

    #[test]
    fn test_configuration_issues_joined() {
        let err = ValidationError::InvalidConfiguration(vec![
            ConfigIssue::UnsupportedCpu("3B".into()),
            ConfigIssue::UnsupportedRam {
                cpu_type: "B".into(),
                ram_mb: 8096,
            },
        ]);
        assert_eq!(
            err.to_string(),
            "invalid server configuration: unsupported CPU: 3B, unsupported RAM size for CPU type B: 8096 MB"
        );
    }

    #[test]
    fn test_reference_not_found_lists_available() {
        let err = RemoteError::ReferenceNotFound {
            kind: "image",
            reference: "os=Ubuntu".into(),
            available: vec!["EU:6000C29".into()],
        };
        assert_eq!(
            err.to_string(),
            "reference not found: image 'os=Ubuntu', available: EU:6000C29"
        );
    }

    #[test]
    fn test_cloud_error_classification() {
        let err: CloudError = RemoteError::NotFound("No servers found".into()).into();
        assert!(err.is_not_found());
        assert!(!err.is_validation());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "No servers found");

        let transient: CloudError = RemoteError::TransientFailure {
            endpoint: "service/server/info".into(),
            attempts: 3,
            message: "502 Bad Gateway".into(),
        }
        .into();
        assert!(transient.is_retryable());
    }
}
