//! Operation plans for server reconciliation

use crate::model::{BillingCycle, PowerState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a changed attribute can be brought to the desired value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    /// Needs a new server; surfaced to the caller, never applied
    Immutable,
    /// One configure command on the running server
    InPlace,
    /// Dedicated power call
    PowerOnly,
}

impl fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeClass::Immutable => write!(f, "replace"),
            ChangeClass::InPlace => write!(f, "update"),
            ChangeClass::PowerOnly => write!(f, "power"),
        }
    }
}

/// A single remote mutation against an existing server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerOperation {
    Rename { name: String },
    ChangePassword { password: String },
    SetCpu { cpu_type: String, cores: u32 },
    SetRam { ram_mb: u32 },
    SetBilling {
        cycle: BillingCycle,
        traffic_package: Option<String>,
    },
    SetDailyBackup { enabled: bool },
    SetManaged { enabled: bool },
    /// Zero-based disk index; the boot disk is never resized
    ResizeDisk { index: usize, size_gb: u32 },
    AddDisk { size_gb: u32 },
    SetPower { state: PowerState },
}

impl ServerOperation {
    /// Execution rank; power changes always run last
    fn rank(&self) -> u8 {
        match self {
            ServerOperation::Rename { .. } => 0,
            ServerOperation::ChangePassword { .. } => 1,
            ServerOperation::SetCpu { .. } => 2,
            ServerOperation::SetRam { .. } => 3,
            ServerOperation::SetBilling { .. } => 4,
            ServerOperation::SetDailyBackup { .. } => 5,
            ServerOperation::SetManaged { .. } => 6,
            ServerOperation::ResizeDisk { .. } => 7,
            ServerOperation::AddDisk { .. } => 8,
            ServerOperation::SetPower { .. } => 9,
        }
    }

    /// Operation name for logs; never includes the payload
    pub fn kind(&self) -> &'static str {
        match self {
            ServerOperation::Rename { .. } => "rename",
            ServerOperation::ChangePassword { .. } => "change_password",
            ServerOperation::SetCpu { .. } => "set_cpu",
            ServerOperation::SetRam { .. } => "set_ram",
            ServerOperation::SetBilling { .. } => "set_billing",
            ServerOperation::SetDailyBackup { .. } => "set_daily_backup",
            ServerOperation::SetManaged { .. } => "set_managed",
            ServerOperation::ResizeDisk { .. } => "resize_disk",
            ServerOperation::AddDisk { .. } => "add_disk",
            ServerOperation::SetPower { .. } => "set_power",
        }
    }
}

/// One differing attribute and what to do about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    /// Attribute name, e.g. `ram_mb`
    pub field: String,
    pub class: ChangeClass,
    pub description: String,

    /// `None` for immutable changes
    pub operation: Option<ServerOperation>,
}

impl PlannedChange {
    pub fn immutable(field: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            class: ChangeClass::Immutable,
            description: description.into(),
            operation: None,
        }
    }

    pub fn in_place(
        field: impl Into<String>,
        description: impl Into<String>,
        operation: ServerOperation,
    ) -> Self {
        Self {
            field: field.into(),
            class: ChangeClass::InPlace,
            description: description.into(),
            operation: Some(operation),
        }
    }

    pub fn power(state: PowerState) -> Self {
        Self {
            field: "power_on".to_string(),
            class: ChangeClass::PowerOnly,
            description: format!("power {state}"),
            operation: Some(ServerOperation::SetPower { state }),
        }
    }

    fn rank(&self) -> u8 {
        self.operation.as_ref().map_or(0, ServerOperation::rank)
    }
}

/// Ordered set of changes that reconcile one server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPlan {
    changes: Vec<PlannedChange>,
}

impl OperationPlan {
    pub fn new(changes: Vec<PlannedChange>) -> Self {
        let mut plan = Self::empty();
        plan.extend(changes);
        plan
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, changes: impl IntoIterator<Item = PlannedChange>) {
        self.changes.extend(changes);
        self.changes.sort_by_key(PlannedChange::rank);
    }

    pub fn changes(&self) -> &[PlannedChange] {
        &self.changes
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Get changes by class
    pub fn changes_by_class(&self, class: ChangeClass) -> Vec<&PlannedChange> {
        self.changes.iter().filter(|c| c.class == class).collect()
    }

    /// First change that forces a new server, if any
    pub fn replacement(&self) -> Option<&PlannedChange> {
        self.changes.iter().find(|c| c.class == ChangeClass::Immutable)
    }

    pub fn is_power_only(&self) -> bool {
        self.has_changes() && self.changes.iter().all(|c| c.class == ChangeClass::PowerOnly)
    }

    /// Remote operations in execution order
    pub fn operations(&self) -> impl Iterator<Item = &ServerOperation> {
        self.changes.iter().filter_map(|c| c.operation.as_ref())
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            replace: self.changes_by_class(ChangeClass::Immutable).len(),
            update: self.changes_by_class(ChangeClass::InPlace).len(),
            power: self.changes_by_class(ChangeClass::PowerOnly).len(),
        }
    }
}

/// Summary of planned changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub replace: usize,
    pub update: usize,
    pub power: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} forcing replacement, {} to update in place, {} power change",
            self.replace, self.update, self.power
        )
    }
}
