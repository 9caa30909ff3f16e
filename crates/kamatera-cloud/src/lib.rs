//! Kamatera provider core
//!
//! Validation, resource mapping and reconciliation for Kamatera compute
//! servers and private networks. This crate performs no I/O of its own: all
//! control-plane traffic goes through the [`RemoteClient`] trait, implemented
//! over HTTPS by `kamatera-api`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        external driver (plan / apply tool)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │ desired-state records
//! ┌─────────────────▼───────────────────────────────┐
//! │                 kamatera-cloud                   │
//! │  ┌────────────┐ ┌────────────┐ ┌─────────────┐  │
//! │  │ Validation │ │   Mapper   │ │ Reconciler  │  │
//! │  │  (catalog) │ │ diff/wire  │ │ state mach. │  │
//! │  └────────────┘ └────────────┘ └──────┬──────┘  │
//! │              trait RemoteClient { ... }│         │
//! └────────────────────────────────────────┼────────┘
//!                                          │
//!                                 ┌────────▼────────┐
//!                                 │  kamatera-api   │
//!                                 │ (reqwest HTTPS) │
//!                                 └─────────────────┘
//! ```

pub mod action;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod mapper;
pub mod model;
pub mod options;
pub mod remote;
pub mod retry;
pub mod state;
pub mod validation;
pub mod wire;

// Re-exports
pub use action::{ChangeClass, OperationPlan, PlanSummary, PlannedChange, ServerOperation};
pub use catalog::{CpuTypeOptions, DatacenterOptions, ServerCatalog};
pub use engine::{ApplyOutcome, Reconciler};
pub use error::{CloudError, ConfigIssue, NameViolation, RemoteError, Result, ValidationError};
pub use lookup::{Datacenter, DatacenterQuery, Image, ImageQuery};
pub use model::{
    AttachedNetwork, BillingCycle, ComputeInstanceSpec, ComputeInstanceState, InstanceId,
    NetworkAttachment, NetworkId, NetworkSpec, NetworkState, ObservedSubnet, PowerState, Prices,
    SubnetSpec,
};
pub use options::{ServerOptions, ServerOptionsSelector};
pub use remote::{CommandId, CommandStatus, CreatedInstance, InstanceLookup, RemoteClient, RemoteResult};
pub use retry::{PollPolicy, RetryPolicy};
pub use state::{Lifecycle, LifecycleState, ManagedInstance, ManagedNetwork};
pub use validation::Validate;
