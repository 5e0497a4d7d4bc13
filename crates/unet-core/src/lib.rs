//! Core library for the branch network monitoring engine.
//!
//! Provides the domain model (entities backing the current-state store),
//! the probing and classification logic (ICMP reachability, SNMP interface
//! discovery/metrics, interface classification), the alert engine (Condition
//! AST evaluation, deduplicated active problems, dependency suppression,
//! maintenance windows), and the ambient concerns (config, database,
//! logging, metrics, credential vault) shared by every binary that embeds it.

pub mod alerting;
pub mod classifier;
pub mod config;
pub mod database;
pub mod datastore;
pub mod entities;
pub mod error;
pub mod leader_election;
pub mod logging;
pub mod metrics;
pub mod ping;
pub mod scheduler;
pub mod secrets;
pub mod snmp;
pub mod timeseries;

pub use error::{Error, Result};

/// Commonly used types, re-exported for `use unet_core::prelude::*;`.
pub mod prelude {
    pub use crate::alerting::{ActiveProblemState, AlertEngine, Condition, DeviceSnapshot, Severity};
    pub use crate::classifier::{classify_interface, ip_suffix_isp_heuristic, InterfaceClass};
    pub use crate::config::Config;
    pub use crate::database::DatabaseManager;
    pub use crate::datastore::CurrentStateStore;
    pub use crate::error::{Error, Result};
    pub use crate::leader_election::LeaderLease;
    pub use crate::metrics::MetricsManager;
    pub use crate::ping::{transition, PingSampler, ReachabilityState, TransitionRing};
    pub use crate::scheduler::ScheduleStore;
    pub use crate::secrets::{CredentialVault, MasterKey};
    pub use crate::snmp::{InterfaceDiscovery, SnmpCredential, SnmpPoller};
    pub use crate::timeseries::{HttpTimeSeriesBackend, Sample, TimeSeriesBuffer};
}
