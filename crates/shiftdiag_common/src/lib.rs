//! Shiftdiag Common - diagnostic collection for MicroShift edge clusters
//!
//! Gathers an SOS bundle and per-namespace `oc adm inspect` output into a
//! timestamped workspace, archives the inspection data, and optionally pulls
//! the results back from a group of remote hosts.

pub mod archive;
pub mod bundle;
pub mod config;
pub mod credential;
pub mod error;
pub mod fetch;
pub mod namespaces;
pub mod runner;
pub mod summary;
pub mod workflow;
pub mod workspace;

pub use config::ShiftdiagConfig;
pub use error::{CollectError, Result};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use summary::{RunSummary, Step, StepReport, StepStatus};
pub use workflow::{CollectOptions, Collector};
