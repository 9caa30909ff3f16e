//! Kamatera API client
//!
//! [`KamateraClient`] implements [`kamatera_cloud::RemoteClient`] over the
//! Kamatera HTTPS control plane (`cloudcli.cloudwm.com`).
//!
//! ```no_run
//! use kamatera_api::{ClientConfig, KamateraClient};
//! use kamatera_cloud::Reconciler;
//! use std::sync::Arc;
//!
//! # fn main() -> kamatera_api::Result<()> {
//! let client = KamateraClient::new(ClientConfig::new("client-id", "secret"))?;
//! let reconciler = Reconciler::new(Arc::new(client));
//! # let _ = reconciler;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{ClientConfig, DEFAULT_API_URL, KamateraClient};
pub use error::{ApiError, Result};
