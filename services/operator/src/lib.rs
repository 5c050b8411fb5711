//! stratus tenant cluster operator.
//!
//! Reconciles the cloud infrastructure of tenant clusters: DNS delegation from
//! the installation's intermediate zone to each cluster's zone, the host-setup
//! stack in the control-plane account, and cleanup of EBS volumes left behind
//! by a deleted cluster.
//!
//! ## Architecture
//!
//! - **Resources**: `awsclient` (pass init), `cpi`, `bridgezone`, `ebsvolume`
//! - **Driver**: one long-lived task per cluster object, running create or
//!   delete passes on a resync interval with backoff on failure
//! - **Simulation**: seeds the in-memory cloud so the binary runs without a
//!   real provider

pub mod cluster;
pub mod config;
pub mod driver;
pub mod keys;
pub mod resources;
pub mod simulation;

pub use cluster::TenantCluster;
pub use config::Config;
pub use driver::{ClusterStatus, Driver, DriverConfig};
