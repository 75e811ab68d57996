//! Immutable input model consumed by the simulation: the `Environment`
//! (clusters and machines) and the `Trace` (workflows and tasks).

pub mod environment;
pub mod trace;

pub use environment::{Cluster, Environment, Machine};
pub use trace::{Task, Trace, Workflow};

/// Simulated time. The native traces use milliseconds.
pub type Ticks = i64;

pub type TaskId = usize;
pub type WorkflowId = usize;
pub type MachineId = usize;
pub type ClusterId = usize;

pub const MILLIS_PER_HOUR: f64 = 1000. * 3600.;
