#![doc = include_str!("../readme.md")]

pub mod allocation;
pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod event_queue;
pub mod events;
pub mod log;
pub mod model;
pub mod monitoring;
pub mod observer;
pub mod scheduler;
pub mod simulation;
pub mod state;
pub mod task_queue;
pub mod task_state_monitor;
pub mod util;
pub mod workflow_state_monitor;
pub mod workload;

#[doc(hidden)]
pub use ::log as __log;

pub use allocation::{PolicySet, TaskOrderPolicyKind, TaskPlacementPolicy, TaskPlacementPolicyKind};
pub use config::sim_config::SimulationConfig;
pub use context::SimulationContext;
pub use error::{ConfigError, ModelError, SimulationError};
pub use events::{Event, EventData, EventType};
pub use model::{Environment, Ticks, Trace};
pub use observer::SimulationObserver;
pub use simulation::{Simulation, SimulationReport};
pub use workload::native::NativeTraceReader;
